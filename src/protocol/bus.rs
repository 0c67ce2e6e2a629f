// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! BUS: a locally originated `Send` is broadcast to every attached peer; a
//! peer-originated message is delivered upward only, stamped with the peer
//! it arrived from, and is never itself rebroadcast to the other peers.

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

/// A peer as BUS sees it: the underlying peer plus a private one-slot
/// queue, so a slow peer never stalls the broadcaster itself -- broadcast
/// only has to get a copy into this queue, not all the way to the peer.
#[derive(Clone)]
struct BusPeer<T> {
    peer: PeerEndpoint<T>,
    queue: Sender<Message<T>>,
}

impl<T: Clone + Send + Sync + 'static> PeerRecord for BusPeer<T> {
    fn close(&self) {
        self.queue.close();
        self.peer.close();
    }
}

pub struct Bus<T> {
    view: OnceCell<Endpoint<T>>,
    neighborhood: Arc<Neighborhood<BusPeer<T>>>,
}

impl<T> Bus<T> {
    pub fn new() -> Bus<T> {
        Bus {
            view: OnceCell::new(),
            neighborhood: Arc::new(Neighborhood::new()),
        }
    }

    fn view(&self) -> &Endpoint<T> {
        self.view.get().expect("engine used before init")
    }
}

impl<T> Default for Bus<T> {
    fn default() -> Self {
        Bus::new()
    }
}

impl<T: Clone + Send + Sync + 'static> ProtocolEngine<T> for Bus<T> {
    fn signature(&self) -> Signature {
        Signature {
            number: numbers::BUS,
            peer_number: numbers::BUS,
            name: "bus",
            peer_name: "bus",
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
        let bus_peer = BusPeer {
            peer: peer.clone(),
            queue: queue_tx,
        };
        self.neighborhood.set_peer(peer.id(), bus_peer);

        tokio::spawn(forward_loop(peer.clone(), queue_rx));
        tokio::spawn(receive_loop(self.view().clone(), peer));
    }

    fn remove_endpoint(&self, id: Id) {
        self.neighborhood.drop_peer(id);
    }
}

/// For every attached peer: `ref` the message and enqueue a copy on the
/// peer's private queue, selecting against the peer's close signal, which
/// frees the copy if it loses. Waits for every per-peer enqueue before
/// returning. Only ever called for locally originated sends -- a
/// peer-originated message is delivered upward and never rebroadcast.
async fn broadcast<T: Clone + Send + Sync + 'static>(neighborhood: &Neighborhood<BusPeer<T>>, msg: &Message<T>) {
    let snapshot = neighborhood.rmap();
    let mut handles = Vec::with_capacity(snapshot.len());

    for (_id, bus_peer) in snapshot {
        let copy = msg.ref_();
        let queue = bus_peer.queue.clone();
        let done = bus_peer.peer.done().clone();

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

/// Delivers a peer-originated message upward only, tagged with its origin.
/// BUS never rebroadcasts on the recv path -- that's STAR's distinguishing
/// behavior, not BUS's; a peer send only reaches the other peers via the
/// portal's own subsequent `Send` of that same payload, same as any other
/// locally originated message.
async fn receive_loop<T: Clone + Send + Sync + 'static>(view: Endpoint<T>, peer: PeerEndpoint<T>) {
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
    neighborhood: Arc<Neighborhood<BusPeer<T>>>,
) {
    loop {
        tokio::select! {
            _ = view.close_channel().settled() => return,
            res = view.send_channel().recv() => {
                match res {
                    Ok(msg) => {
                        broadcast(&neighborhood, &msg).await;
                        msg.free();
                    }
                    Err(_) => return,
                }
            }
        }
    }
}
