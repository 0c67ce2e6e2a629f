// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! PAIR: exactly one peer at a time. A second attach is rejected outright
//! by closing the would-be peer's underlying portal.

use std::sync::Mutex;

use once_cell::sync::OnceCell;

use crate::endpoint::{Endpoint, Signature};
use crate::engine::{assert_compatible, ProtocolEngine};
use crate::id::Id;
use crate::peer::PeerEndpoint;

use super::numbers;

pub struct Pair<T> {
    view: OnceCell<Endpoint<T>>,
    peer: Mutex<Option<PeerEndpoint<T>>>,
}

impl<T> Pair<T> {
    pub fn new() -> Pair<T> {
        Pair {
            view: OnceCell::new(),
            peer: Mutex::new(None),
        }
    }

    fn view(&self) -> &Endpoint<T> {
        self.view.get().expect("engine used before init")
    }
}

impl<T> Default for Pair<T> {
    fn default() -> Self {
        Pair::new()
    }
}

impl<T: Clone + Send + Sync + 'static> ProtocolEngine<T> for Pair<T> {
    fn signature(&self) -> Signature {
        Signature {
            number: numbers::PAIR,
            peer_number: numbers::PAIR,
            name: "pair",
            peer_name: "pair",
        }
    }

    fn init(&self, view: Endpoint<T>) {
        let _ = self.view.set(view);
    }

    fn add_endpoint(&self, ep: Endpoint<T>) {
        assert_compatible(self.signature(), ep.signature());

        let mut guard = self.peer.lock().unwrap();
        if guard.is_some() {
            ep.close();
            return;
        }

        let peer = PeerEndpoint::new(ep);
        *guard = Some(peer.clone());
        drop(guard);

        let view = self.view().clone();
        tokio::spawn(send_loop(view.clone(), peer.clone()));
        tokio::spawn(recv_loop(view, peer));
    }

    fn remove_endpoint(&self, id: Id) {
        let mut guard = self.peer.lock().unwrap();
        let same_peer = matches!(guard.as_ref(), Some(peer) if peer.id() == id);
        if same_peer {
            let peer = guard.take().unwrap();
            drop(guard);
            peer.close();
        }
    }
}

/// Reads `chSend` and hands each message to the one peer. If the peer goes
/// away first, the loop simply stops; a message already in flight to
/// `notify` when the peer scope settles is freed rather than delivered,
/// matching the one-peer "no queueing, no retry" contract.
async fn send_loop<T: Clone + Send + Sync + 'static>(view: Endpoint<T>, peer: PeerEndpoint<T>) {
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

/// Reads the peer's announcements and writes them into `chRecv`.
async fn recv_loop<T: Clone + Send + Sync + 'static>(view: Endpoint<T>, peer: PeerEndpoint<T>) {
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
        let (send_tx, send_rx) = bounded(1);
        let (recv_tx, recv_rx) = bounded(1);
        let token = Token::new();
        let ep = Endpoint::new(Id::next(), sig, send_rx, recv_tx, token.clone());
        (ep, send_tx, recv_rx, token)
    }

    #[tokio::test]
    async fn second_peer_is_rejected() {
        let pair: Pair<u32> = Pair::new();
        let sig = pair.signature();

        let (local_view, local_send_tx, _local_recv_rx, local_token) = make_endpoint(sig);
        pair.init(local_view);

        let (peer_a, _a_tx, _a_rx, a_token) = make_endpoint(sig);
        pair.add_endpoint(peer_a);
        assert!(!a_token.is_settled());

        let (peer_b, _b_tx, _b_rx, b_token) = make_endpoint(sig);
        pair.add_endpoint(peer_b);
        b_token.settled().await;
        assert!(b_token.is_settled());

        local_token.settle();
        drop(local_send_tx);
    }
}
