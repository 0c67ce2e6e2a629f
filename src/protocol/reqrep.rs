// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! REQ/REP.
//!
//! REQ ships one-shot semantics here: each `Send` is handed to whichever
//! attached peer's forwarding task is free next (the same race-for-one-chSend
//! shape as PUSH), and every peer's replies are merged upward (the same
//! fan-in shape as PULL). No request is held for retransmission across a
//! reconnect.
//!
//! REP serializes: only one announce/reply turn is in flight at a time
//! across the whole engine, because `chSend`/`chRecv` are shared, unlabeled
//! queues with no way to correlate a reply with the request that asked for
//! it other than "this is the only turn open right now".

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tokio::sync::Mutex as AsyncMutex;

use crate::endpoint::{Endpoint, Signature};
use crate::engine::{assert_compatible, ProtocolEngine};
use crate::id::Id;
use crate::neighborhood::Neighborhood;
use crate::peer::PeerEndpoint;

use super::numbers;

pub struct Req<T> {
    view: OnceCell<Endpoint<T>>,
    neighborhood: Neighborhood<PeerEndpoint<T>>,
}

impl<T> Req<T> {
    pub fn new() -> Req<T> {
        Req {
            view: OnceCell::new(),
            neighborhood: Neighborhood::new(),
        }
    }

    fn view(&self) -> &Endpoint<T> {
        self.view.get().expect("engine used before init")
    }
}

impl<T> Default for Req<T> {
    fn default() -> Self {
        Req::new()
    }
}

impl<T: Clone + Send + Sync + 'static> ProtocolEngine<T> for Req<T> {
    fn signature(&self) -> Signature {
        Signature {
            number: numbers::REQ,
            peer_number: numbers::REP,
            name: "req",
            peer_name: "rep",
        }
    }

    fn init(&self, view: Endpoint<T>) {
        let _ = self.view.set(view);
    }

    fn add_endpoint(&self, ep: Endpoint<T>) {
        assert_compatible(self.signature(), ep.signature());

        let peer = PeerEndpoint::new(ep);
        self.neighborhood.set_peer(peer.id(), peer.clone());
        let view = self.view().clone();
        tokio::spawn(req_send_loop(view.clone(), peer.clone()));
        tokio::spawn(req_recv_loop(view, peer));
    }

    fn remove_endpoint(&self, id: Id) {
        self.neighborhood.drop_peer(id);
    }
}

async fn req_send_loop<T: Clone + Send + Sync + 'static>(view: Endpoint<T>, peer: PeerEndpoint<T>) {
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

async fn req_recv_loop<T: Clone + Send + Sync + 'static>(view: Endpoint<T>, peer: PeerEndpoint<T>) {
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

pub struct Rep<T> {
    view: OnceCell<Endpoint<T>>,
    neighborhood: Neighborhood<PeerEndpoint<T>>,
    turn: Arc<AsyncMutex<()>>,
}

impl<T> Rep<T> {
    pub fn new() -> Rep<T> {
        Rep {
            view: OnceCell::new(),
            neighborhood: Neighborhood::new(),
            turn: Arc::new(AsyncMutex::new(())),
        }
    }

    fn view(&self) -> &Endpoint<T> {
        self.view.get().expect("engine used before init")
    }
}

impl<T> Default for Rep<T> {
    fn default() -> Self {
        Rep::new()
    }
}

impl<T: Clone + Send + Sync + 'static> ProtocolEngine<T> for Rep<T> {
    fn signature(&self) -> Signature {
        Signature {
            number: numbers::REP,
            peer_number: numbers::REQ,
            name: "rep",
            peer_name: "req",
        }
    }

    fn init(&self, view: Endpoint<T>) {
        let _ = self.view.set(view);
    }

    fn add_endpoint(&self, ep: Endpoint<T>) {
        assert_compatible(self.signature(), ep.signature());

        let peer = PeerEndpoint::new(ep);
        self.neighborhood.set_peer(peer.id(), peer.clone());
        tokio::spawn(rep_serve_loop(self.view().clone(), peer, self.turn.clone()));
    }

    fn remove_endpoint(&self, id: Id) {
        self.neighborhood.drop_peer(id);
    }
}

/// One task per peer, but only one of them may be mid-turn at a time: each
/// iteration announces a request, delivers it to the user, then holds the
/// engine-wide turn lock until either a reply comes back (sent to this same
/// peer) or the turn is abandoned by peer disconnect or portal close.
async fn rep_serve_loop<T: Clone + Send + Sync + 'static>(
    view: Endpoint<T>,
    peer: PeerEndpoint<T>,
    turn: Arc<AsyncMutex<()>>,
) {
    while let Some(msg) = peer.announce().await {
        let guard = turn.lock().await;

        tokio::select! {
            _ = view.close_channel().settled() => {
                drop(guard);
                return;
            }
            res = view.recv_channel().send(msg) => {
                if res.is_err() {
                    drop(guard);
                    return;
                }

                tokio::select! {
                    _ = view.close_channel().settled() => {}
                    _ = peer.done().settled() => {}
                    res = view.send_channel().recv() => {
                        if let Ok(reply) = res {
                            peer.notify(reply).await;
                        }
                    }
                }
            }
        }

        drop(guard);
    }
}
