// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! PUB/SUB.
//!
//! PUB only ever sends; `Recv` is not supported by the protocol. SUB only
//! ever receives, filtered by whatever predicates are currently active --
//! with payloads opaque, a predicate is the generalization of a byte-prefix
//! topic filter: any `Fn(&T) -> bool` works, not just prefix matching, and
//! a `Sub` with no active predicates delivers nothing.

use std::sync::{Arc, Mutex};

use async_channel::{Receiver, Sender};
use once_cell::sync::OnceCell;

use crate::endpoint::{Endpoint, Signature};
use crate::engine::{assert_compatible, HookDisposition, ProtocolEngine, ProtocolOption};
use crate::id::Id;
use crate::message::Message;
use crate::neighborhood::{Neighborhood, PeerRecord};
use crate::peer::PeerEndpoint;

use super::numbers;

#[derive(Clone)]
struct PubPeer<T> {
    peer: PeerEndpoint<T>,
    queue: Sender<Message<T>>,
}

impl<T: Clone + Send + Sync + 'static> PeerRecord for PubPeer<T> {
    fn close(&self) {
        self.queue.close();
        self.peer.close();
    }
}

pub struct Pub<T> {
    view: OnceCell<Endpoint<T>>,
    neighborhood: Arc<Neighborhood<PubPeer<T>>>,
}

impl<T> Pub<T> {
    pub fn new() -> Pub<T> {
        Pub {
            view: OnceCell::new(),
            neighborhood: Arc::new(Neighborhood::new()),
        }
    }

    fn view(&self) -> &Endpoint<T> {
        self.view.get().expect("engine used before init")
    }
}

impl<T> Default for Pub<T> {
    fn default() -> Self {
        Pub::new()
    }
}

impl<T: Clone + Send + Sync + 'static> ProtocolEngine<T> for Pub<T> {
    fn signature(&self) -> Signature {
        Signature {
            number: numbers::PUB,
            peer_number: numbers::SUB,
            name: "pub",
            peer_name: "sub",
        }
    }

    fn init(&self, view: Endpoint<T>) {
        let _ = self.view.set(view.clone());
        tokio::spawn(broadcast_loop(view, self.neighborhood.clone()));
    }

    fn add_endpoint(&self, ep: Endpoint<T>) {
        assert_compatible(self.signature(), ep.signature());

        let peer = PeerEndpoint::new(ep);
        let (queue_tx, queue_rx) = async_channel::bounded(1);
        let pub_peer = PubPeer {
            peer: peer.clone(),
            queue: queue_tx,
        };
        self.neighborhood.set_peer(peer.id(), pub_peer);
        tokio::spawn(forward_loop(peer, queue_rx));
    }

    fn remove_endpoint(&self, id: Id) {
        self.neighborhood.drop_peer(id);
    }

    fn recv_supported(&self) -> bool {
        false
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

async fn broadcast_loop<T: Clone + Send + Sync + 'static>(view: Endpoint<T>, neighborhood: Arc<Neighborhood<PubPeer<T>>>) {
    loop {
        tokio::select! {
            _ = view.close_channel().settled() => return,
            res = view.send_channel().recv() => {
                match res {
                    Ok(msg) => {
                        let snapshot = neighborhood.rmap();
                        let mut handles = Vec::with_capacity(snapshot.len());

                        for (_id, peer) in snapshot {
                            let copy = msg.ref_();
                            let queue = peer.queue.clone();
                            let done = peer.peer.done().clone();

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

                        msg.free();
                    }
                    Err(_) => return,
                }
            }
        }
    }
}

pub struct Sub<T> {
    view: OnceCell<Endpoint<T>>,
    neighborhood: Neighborhood<PeerEndpoint<T>>,
    filters: Mutex<Vec<Box<dyn Fn(&T) -> bool + Send + Sync>>>,
}

impl<T> Sub<T> {
    pub fn new() -> Sub<T> {
        Sub {
            view: OnceCell::new(),
            neighborhood: Neighborhood::new(),
            filters: Mutex::new(Vec::new()),
        }
    }

    fn view(&self) -> &Endpoint<T> {
        self.view.get().expect("engine used before init")
    }

    fn matches(&self, payload: &T) -> bool {
        self.filters.lock().unwrap().iter().any(|f| f(payload))
    }
}

impl<T> Default for Sub<T> {
    fn default() -> Self {
        Sub::new()
    }
}

impl<T: Clone + Send + Sync + 'static> ProtocolEngine<T> for Sub<T> {
    fn signature(&self) -> Signature {
        Signature {
            number: numbers::SUB,
            peer_number: numbers::PUB,
            name: "sub",
            peer_name: "pub",
        }
    }

    fn init(&self, view: Endpoint<T>) {
        let _ = self.view.set(view);
    }

    fn add_endpoint(&self, ep: Endpoint<T>) {
        assert_compatible(self.signature(), ep.signature());

        let peer = PeerEndpoint::new(ep);
        self.neighborhood.set_peer(peer.id(), peer.clone());
        tokio::spawn(recv_loop(self.view().clone(), peer));
    }

    fn remove_endpoint(&self, id: Id) {
        self.neighborhood.drop_peer(id);
    }

    fn send_supported(&self) -> bool {
        false
    }

    fn recv_hook(&self, msg: &Message<T>) -> HookDisposition {
        if self.matches(msg.payload()) {
            HookDisposition::Keep
        } else {
            HookDisposition::Drop
        }
    }

    fn set_option(&self, opt: ProtocolOption<T>) {
        match opt {
            ProtocolOption::Subscribe(predicate) => self.filters.lock().unwrap().push(predicate),
        }
    }
}

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
