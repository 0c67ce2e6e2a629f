// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! STAR: same peer-facing broadcast as BUS, except a message arriving from
//! a peer is also delivered locally in addition to being rebroadcast to
//! every other peer -- so a send from any one member of the star reaches
//! everybody, including the hub's own user.

use std::sync::Arc;

use async_channel::{Receiver, Sender};
use once_cell::sync::OnceCell;

use crate::endpoint::{Endpoint, Signature};
use crate::engine::{assert_compatible, ProtocolEngine};
use crate::id::Id;
use crate::message::Message;
use crate::neighborhood::{Neighborhood, PeerRecord};
use crate::peer::PeerEndpoint;

use super::numbers;

#[derive(Clone)]
struct StarPeer<T> {
    peer: PeerEndpoint<T>,
    queue: Sender<Message<T>>,
}

impl<T: Clone + Send + Sync + 'static> PeerRecord for StarPeer<T> {
    fn close(&self) {
        self.queue.close();
        self.peer.close();
    }
}

pub struct Star<T> {
    view: OnceCell<Endpoint<T>>,
    neighborhood: Arc<Neighborhood<StarPeer<T>>>,
}

impl<T> Star<T> {
    pub fn new() -> Star<T> {
        Star {
            view: OnceCell::new(),
            neighborhood: Arc::new(Neighborhood::new()),
        }
    }

    fn view(&self) -> &Endpoint<T> {
        self.view.get().expect("engine used before init")
    }
}

impl<T> Default for Star<T> {
    fn default() -> Self {
        Star::new()
    }
}

impl<T: Clone + Send + Sync + 'static> ProtocolEngine<T> for Star<T> {
    fn signature(&self) -> Signature {
        Signature {
            number: numbers::STAR,
            peer_number: numbers::STAR,
            name: "star",
            peer_name: "star",
        }
    }

    fn init(&self, view: Endpoint<T>) {
        let _ = self.view.set(view.clone());
        tokio::spawn(local_broadcast_loop(view, self.neighborhood.clone()));
    }

    fn add_endpoint(&self, ep: Endpoint<T>) {
        assert_compatible(self.signature(), ep.signature());

        let peer = PeerEndpoint::new(ep);
        let (queue_tx, queue_rx) = async_channel::bounded(1);
        let star_peer = StarPeer {
            peer: peer.clone(),
            queue: queue_tx,
        };
        self.neighborhood.set_peer(peer.id(), star_peer);

        tokio::spawn(forward_loop(peer.clone(), queue_rx));
        tokio::spawn(receive_loop(self.view().clone(), peer, self.neighborhood.clone()));
    }

    fn remove_endpoint(&self, id: Id) {
        self.neighborhood.drop_peer(id);
    }
}

/// Same shape as BUS's broadcast: skip the peer matching `origin`, enqueue a
/// ref'd copy on every other peer's private queue, race each against that
/// peer's close signal, wait for all before returning.
async fn broadcast<T: Clone + Send + Sync + 'static>(
    neighborhood: &Neighborhood<StarPeer<T>>,
    msg: &Message<T>,
    origin: Option<Id>,
) {
    let snapshot = neighborhood.rmap();
    let mut handles = Vec::with_capacity(snapshot.len());

    for (id, star_peer) in snapshot {
        if origin == Some(id) {
            continue;
        }

        let copy = msg.ref_();
        let queue = star_peer.queue.clone();
        let done = star_peer.peer.done().clone();

        handles.push(tokio::spawn(async move {
            tokio::select! {
                res = queue.send(copy) => {
                    if let Err(e) = res {
                        e.0.free();
                    }
                }
                _ = done.settled() => {}
            }
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }
}

async fn forward_loop<T: Clone + Send + Sync + 'static>(peer: PeerEndpoint<T>, queue: Receiver<Message<T>>) {
    loop {
        tokio::select! {
            _ = peer.done().settled() => return,
            res = queue.recv() => {
                match res {
                    Ok(msg) => peer.notify(msg).await,
                    Err(_) => return,
                }
            }
        }
    }
}

/// A message arriving from a peer is rebroadcast to every *other* peer, and
/// additionally delivered upward locally -- the one place STAR departs from
/// BUS, where a peer-originated message never reaches the hub's own user.
async fn receive_loop<T: Clone + Send + Sync + 'static>(
    view: Endpoint<T>,
    peer: PeerEndpoint<T>,
    neighborhood: Arc<Neighborhood<StarPeer<T>>>,
) {
    let origin = peer.id();

    loop {
        tokio::select! {
            _ = peer.done().settled() => return,
            next = peer.announce() => {
                let msg = match next {
                    Some(msg) => msg,
                    None => return,
                };

                let stamped = Message::with_origin(msg.payload().clone(), origin);
                msg.free();

                broadcast(&neighborhood, &stamped, Some(origin)).await;

                tokio::select! {
                    res = view.recv_channel().send(stamped) => {
                        if res.is_err() {
                            return;
                        }
                    }
                    _ = view.close_channel().settled() => return,
                }
            }
        }
    }
}

async fn local_broadcast_loop<T: Clone + Send + Sync + 'static>(
    view: Endpoint<T>,
    neighborhood: Arc<Neighborhood<StarPeer<T>>>,
) {
    loop {
        tokio::select! {
            _ = view.close_channel().settled() => return,
            res = view.send_channel().recv() => {
                match res {
                    Ok(msg) => {
                        broadcast(&neighborhood, &msg, None).await;
                        msg.free();
                    }
                    Err(_) => return,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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
    async fn client_send_reaches_hub_and_every_other_peer() {
        let star: Star<bool> = Star::new();
        let sig = star.signature();

        let (hub_view, _hub_send_tx, hub_recv_rx, _hub_token) = make_endpoint(sig);
        star.init(hub_view);

        let (c1, c1_send_tx, _c1_recv_rx, _c1_token) = make_endpoint(sig);
        let (c2, _c2_send_tx, c2_recv_rx, _c2_token) = make_endpoint(sig);
        let (c3, _c3_send_tx, c3_recv_rx, _c3_token) = make_endpoint(sig);
        star.add_endpoint(c1);
        star.add_endpoint(c2);
        star.add_endpoint(c3);

        c1_send_tx.send(Message::new(true)).await.unwrap();

        let hub = hub_recv_rx.recv().await.unwrap();
        assert!(*hub.payload());
        hub.free();

        let at_c2 = c2_recv_rx.recv().await.unwrap();
        let at_c3 = c3_recv_rx.recv().await.unwrap();
        assert!(*at_c2.payload());
        assert!(*at_c3.payload());
        at_c2.free();
        at_c3.free();
    }

    #[tokio::test]
    async fn hub_send_reaches_every_peer() {
        let star: Star<u32> = Star::new();
        let sig = star.signature();

        let (hub_view, hub_send_tx, _hub_recv_rx, _hub_token) = make_endpoint(sig);
        star.init(hub_view);

        let (c1, _c1_send_tx, c1_recv_rx, _c1_token) = make_endpoint(sig);
        let (c2, _c2_send_tx, c2_recv_rx, _c2_token) = make_endpoint(sig);
        star.add_endpoint(c1);
        star.add_endpoint(c2);

        hub_send_tx.send(Message::new(7u32)).await.unwrap();

        let a = c1_recv_rx.recv().await.unwrap();
        let b = c2_recv_rx.recv().await.unwrap();
        assert_eq!(*a.payload(), 7);
        assert_eq!(*b.payload(), 7);
        a.free();
        b.free();
    }
}
