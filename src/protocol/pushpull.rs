// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! PUSH/PULL: one-directional load-balanced fan-out and fan-in. Each side
//! only implements half of send/recv; the other half behaves as if the
//! portal were already closed, via `send_supported`/`recv_supported`
//! rather than by closing a shared channel handle.

use once_cell::sync::OnceCell;

use crate::endpoint::{Endpoint, Signature};
use crate::engine::{assert_compatible, ProtocolEngine};
use crate::id::Id;
use crate::neighborhood::Neighborhood;
use crate::peer::PeerEndpoint;

use super::numbers;

pub struct Push<T> {
    view: OnceCell<Endpoint<T>>,
    neighborhood: Neighborhood<PeerEndpoint<T>>,
}

impl<T> Push<T> {
    pub fn new() -> Push<T> {
        Push {
            view: OnceCell::new(),
            neighborhood: Neighborhood::new(),
        }
    }

    fn view(&self) -> &Endpoint<T> {
        self.view.get().expect("engine used before init")
    }
}

impl<T> Default for Push<T> {
    fn default() -> Self {
        Push::new()
    }
}

impl<T: Clone + Send + Sync + 'static> ProtocolEngine<T> for Push<T> {
    fn signature(&self) -> Signature {
        Signature {
            number: numbers::PUSH,
            peer_number: numbers::PULL,
            name: "push",
            peer_name: "pull",
        }
    }

    fn init(&self, view: Endpoint<T>) {
        let _ = self.view.set(view);
    }

    fn add_endpoint(&self, ep: Endpoint<T>) {
        assert_compatible(self.signature(), ep.signature());

        let peer = PeerEndpoint::new(ep);
        self.neighborhood.set_peer(peer.id(), peer.clone());
        tokio::spawn(push_send_loop(self.view().clone(), peer));
    }

    fn remove_endpoint(&self, id: Id) {
        self.neighborhood.drop_peer(id);
    }

    fn recv_supported(&self) -> bool {
        false
    }
}

/// One of these races per attached peer, all reading the same `chSend`
/// handle: whichever task is free when a message arrives wins it, giving
/// load-balanced fan-out across however many peers are currently attached.
async fn push_send_loop<T: Clone + Send + Sync + 'static>(view: Endpoint<T>, peer: PeerEndpoint<T>) {
    loop {
        tokio::select! {
            _ = peer.done().settled() => return,
            _ = view.close_channel().settled() => return,
            res = view.send_channel().recv() => {
                match res {
                    Ok(msg) => peer.notify(msg).await,
                    Err(_) => return,
                }
            }
        }
    }
}

pub struct Pull<T> {
    view: OnceCell<Endpoint<T>>,
    neighborhood: Neighborhood<PeerEndpoint<T>>,
}

impl<T> Pull<T> {
    pub fn new() -> Pull<T> {
        Pull {
            view: OnceCell::new(),
            neighborhood: Neighborhood::new(),
        }
    }

    fn view(&self) -> &Endpoint<T> {
        self.view.get().expect("engine used before init")
    }
}

impl<T> Default for Pull<T> {
    fn default() -> Self {
        Pull::new()
    }
}

impl<T: Clone + Send + Sync + 'static> ProtocolEngine<T> for Pull<T> {
    fn signature(&self) -> Signature {
        Signature {
            number: numbers::PULL,
            peer_number: numbers::PUSH,
            name: "pull",
            peer_name: "push",
        }
    }

    fn init(&self, view: Endpoint<T>) {
        let _ = self.view.set(view);
    }

    fn add_endpoint(&self, ep: Endpoint<T>) {
        assert_compatible(self.signature(), ep.signature());

        let peer = PeerEndpoint::new(ep);
        self.neighborhood.set_peer(peer.id(), peer.clone());
        tokio::spawn(pull_recv_loop(self.view().clone(), peer));
    }

    fn remove_endpoint(&self, id: Id) {
        self.neighborhood.drop_peer(id);
    }

    fn send_supported(&self) -> bool {
        false
    }
}

/// One per attached peer: merges that peer's announced messages into the
/// shared `chRecv`, giving fan-in across all currently attached peers.
async fn pull_recv_loop<T: Clone + Send + Sync + 'static>(view: Endpoint<T>, peer: PeerEndpoint<T>) {
    while let Some(msg) = peer.announce().await {
        tokio::select! {
            res = view.recv_channel().send(msg) => {
                if res.is_err() {
                    return;
                }
            }
            _ = view.close_channel().settled() => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::token::Token;
    use async_channel::bounded;

    fn make_endpoint<T>(
        sig: Signature,
    ) -> (
        Endpoint<T>,
        async_channel::Sender<Message<T>>,
        async_channel::Receiver<Message<T>>,
        Token,
    ) {
        let (send_tx, send_rx) = bounded(4);
        let (recv_tx, recv_rx) = bounded(4);
        let token = Token::new();
        let ep = Endpoint::new(Id::next(), sig, send_rx, recv_tx, token.clone());
        (ep, send_tx, recv_rx, token)
    }

    #[tokio::test]
    async fn push_distributes_to_an_attached_peer() {
        let push: Push<u32> = Push::new();
        let push_sig = push.signature();

        let (local_view, local_send_tx, _local_recv_rx, _local_token) = make_endpoint(push_sig);
        push.init(local_view);

        let pull_sig = Signature {
            number: numbers::PULL,
            peer_number: numbers::PUSH,
            name: "pull",
            peer_name: "push",
        };
        let (peer_ep, _peer_send_tx, peer_recv_rx, _peer_token) = make_endpoint(pull_sig);
        push.add_endpoint(peer_ep);

        local_send_tx.send(Message::new(7u32)).await.unwrap();

        let msg = peer_recv_rx.recv().await.unwrap();
        assert_eq!(*msg.payload(), 7);
        msg.free();
    }

    #[tokio::test]
    async fn pull_merges_from_every_peer() {
        let pull: Pull<u32> = Pull::new();
        let pull_sig = pull.signature();

        let (local_view, _local_send_tx, local_recv_rx, _local_token) = make_endpoint(pull_sig);
        pull.init(local_view);

        let push_sig = Signature {
            number: numbers::PUSH,
            peer_number: numbers::PULL,
            name: "push",
            peer_name: "pull",
        };
        let (peer_a, peer_a_send_tx, _peer_a_recv_rx, _a_token) = make_endpoint(push_sig);
        let (peer_b, peer_b_send_tx, _peer_b_recv_rx, _b_token) = make_endpoint(push_sig);
        pull.add_endpoint(peer_a);
        pull.add_endpoint(peer_b);

        peer_a_send_tx.send(Message::new(1u32)).await.unwrap();
        peer_b_send_tx.send(Message::new(2u32)).await.unwrap();

        let mut seen = vec![];
        for _ in 0..2 {
            let msg = local_recv_rx.recv().await.unwrap();
            seen.push(*msg.payload());
            msg.free();
        }
        seen.sort();
        assert_eq!(seen, vec![1, 2]);
    }
}
