// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! The protocol-facing view of a portal.
//!
//! A portal hands exactly this shape to its own engine (as the "portal
//! view" passed to `Init`) and to whichever remote engine attaches to it
//! (via `AddEndpoint`) -- the same four fields serve both roles, which is
//! what lets a single `tokio::select!` in a protocol engine multiplex over
//! `{chSend, chRecv, close}` without an intermediate dispatcher.

use async_channel::{Receiver, Sender};

use crate::id::Id;
use crate::message::Message;
use crate::token::Token;

/// The `(Number, PeerNumber, Name, PeerName)` tuple identifying a pattern,
/// and the one the far side must carry for the two to attach.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    pub number: u16,
    pub peer_number: u16,
    pub name: &'static str,
    pub peer_name: &'static str,
}

impl Signature {
    /// `a.number == b.peer_number && b.number == a.peer_number`.
    pub fn compatible(&self, other: &Signature) -> bool {
        self.number == other.peer_number && other.number == self.peer_number
    }
}

/// The protocol-facing view of a portal: id, signature, and direct access
/// to both of its channels plus its close signal. Direction is always from
/// the owning portal's point of view, so a protocol engine holding a peer's
/// `Endpoint` reads the peer's outgoing messages from `send_channel` and
/// writes replies into `recv_channel`.
pub struct Endpoint<T> {
    id: Id,
    signature: Signature,
    send_channel: Receiver<Message<T>>,
    recv_channel: Sender<Message<T>>,
    close: Token,
}

impl<T> Endpoint<T> {
    pub(crate) fn new(
        id: Id,
        signature: Signature,
        send_channel: Receiver<Message<T>>,
        recv_channel: Sender<Message<T>>,
        close: Token,
    ) -> Endpoint<T> {
        Endpoint {
            id,
            signature,
            send_channel,
            recv_channel,
            close,
        }
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn signature(&self) -> Signature {
        self.signature
    }

    /// The owning portal's `chSend`: messages it wants to emit, read-only
    /// from here.
    pub fn send_channel(&self) -> &Receiver<Message<T>> {
        &self.send_channel
    }

    /// The owning portal's `chRecv`: messages destined for its user,
    /// write-only from here.
    pub fn recv_channel(&self) -> &Sender<Message<T>> {
        &self.recv_channel
    }

    pub fn close_channel(&self) -> &Token {
        &self.close
    }

    /// Settles the *underlying portal's* own root token, not just a
    /// peer-local scope. PAIR uses this to hard-reject a second connection
    /// attempt; every other pattern tears down via `PeerEndpoint::close`
    /// instead, which leaves the remote portal running.
    pub fn close(&self) {
        self.close.settle();
    }
}

impl<T> Clone for Endpoint<T> {
    fn clone(&self) -> Self {
        Endpoint {
            id: self.id,
            signature: self.signature,
            send_channel: self.send_channel.clone(),
            recv_channel: self.recv_channel.clone(),
            close: self.close.clone(),
        }
    }
}
