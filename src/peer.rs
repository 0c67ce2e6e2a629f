// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! A peer-local decorator over an [`Endpoint`], used by the protocol
//! engines that need to tear down a single peer relation without touching
//! the remote portal itself (PAIR rejecting a second connection is the one
//! case that reaches past this and closes the remote endpoint outright;
//! everything else, including PAIR's accepted peer, goes through here).

use crate::endpoint::{Endpoint, Signature};
use crate::id::Id;
use crate::message::Message;
use crate::token::Token;

/// `Endpoint` plus a second, independent cancellation scope local to the
/// protocol engine holding it. `done()` returns this peer-scoped token, not
/// the underlying endpoint's own close signal.
#[derive(Clone)]
pub struct PeerEndpoint<T> {
    endpoint: Endpoint<T>,
    scope: Token,
}

impl<T> PeerEndpoint<T> {
    pub fn new(endpoint: Endpoint<T>) -> PeerEndpoint<T> {
        PeerEndpoint {
            endpoint,
            scope: Token::new(),
        }
    }

    pub fn id(&self) -> Id {
        self.endpoint.id()
    }

    pub fn signature(&self) -> Signature {
        self.endpoint.signature()
    }

    /// The peer-scoped token: settled by `close`, independent of the
    /// underlying portal's own lifetime.
    pub fn done(&self) -> &Token {
        &self.scope
    }

    /// Tears down this single peer relation without closing the remote
    /// portal.
    pub fn close(&self) {
        self.scope.settle();
    }

    /// Reads the peer's next outgoing message, or `None` once the peer's
    /// send channel is drained and closed.
    pub async fn announce(&self) -> Option<Message<T>> {
        self.endpoint.send_channel().recv().await.ok()
    }

    /// Delivers a message to the peer, i.e. pushes it into the peer's own
    /// `chRecv`. Races against this peer-local scope: if `close` settles
    /// first (peer gone, or this relation torn down) the message is freed
    /// rather than left blocked forever on a queue nobody will ever drain
    /// again.
    pub async fn notify(&self, msg: Message<T>) {
        tokio::select! {
            res = self.endpoint.recv_channel().send(msg) => {
                if let Err(e) = res {
                    e.0.free();
                }
            }
            _ = self.scope.settled() => {}
        }
    }

    pub fn endpoint(&self) -> &Endpoint<T> {
        &self.endpoint
    }
}
