// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! The protocol-private, concurrently-readable set of peers a protocol
//! engine multiplexes over.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::id::Id;
use crate::peer::PeerEndpoint;

/// A peer record stored in a [`Neighborhood`]. Peer records are
/// reference-counted handles (an `Endpoint`'s channels and close token are
/// themselves cheap `Arc` clones), so storing and cloning them out of the
/// map is inexpensive.
pub trait PeerRecord: Clone {
    fn close(&self);
}

impl<T> PeerRecord for PeerEndpoint<T> {
    fn close(&self) {
        PeerEndpoint::close(self)
    }
}

/// Protocol-private map from peer id to peer record.
pub struct Neighborhood<P> {
    peers: RwLock<HashMap<Id, P>>,
}

impl<P: PeerRecord> Neighborhood<P> {
    pub fn new() -> Neighborhood<P> {
        Neighborhood {
            peers: RwLock::new(HashMap::new()),
        }
    }

    pub fn set_peer(&self, id: Id, peer: P) {
        self.peers.write().unwrap().insert(id, peer);
    }

    pub fn get_peer(&self, id: Id) -> Option<P> {
        self.peers.read().unwrap().get(&id).cloned()
    }

    /// Removes the peer and closes its cancellation scope, always outside
    /// the lock that protects the map.
    pub fn drop_peer(&self, id: Id) {
        let removed = {
            let mut guard = self.peers.write().unwrap();
            guard.remove(&id)
        };

        if let Some(peer) = removed {
            peer.close();
        }
    }

    /// A coherent snapshot of the current peer set, safe to iterate over
    /// across `.await` points: this takes the "copy" option explicitly
    /// allowed for `RMap`, cloning the map and releasing the read lock
    /// immediately rather than holding it across a broadcast's per-peer
    /// sends.
    pub fn rmap(&self) -> HashMap<Id, P> {
        self.peers.read().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.peers.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().unwrap().is_empty()
    }
}

impl<P: PeerRecord> Default for Neighborhood<P> {
    fn default() -> Self {
        Neighborhood::new()
    }
}
