// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! The contract every pattern (pair, push, bus, ...) implements.
//!
//! Send/recv hooks are plain trait methods with no-op defaults, so a
//! pattern that doesn't need to filter outgoing or incoming messages
//! simply doesn't override them -- no runtime capability probing.

use crate::endpoint::{Endpoint, Signature};
use crate::id::Id;
use crate::message::Message;

/// What a send- or recv-hook wants done with the message it inspected.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HookDisposition {
    /// Let the message continue on its way.
    Keep,
    /// Free the message and deliver it nowhere.
    Drop,
}

/// A pattern-specific knob set through [`ProtocolEngine::set_option`].
/// Only SUB has one today: the predicate an incoming message must satisfy
/// to be delivered. Payloads are opaque, so this is the generalization of
/// the byte-prefix topic filter a fixed wire format would otherwise use.
pub enum ProtocolOption<T> {
    Subscribe(Box<dyn Fn(&T) -> bool + Send + Sync>),
}

/// A protocol engine: the state machine behind one pattern. One instance is
/// created per portal and owns that portal's neighborhood for its entire
/// lifetime.
pub trait ProtocolEngine<T>: Send + Sync
where
    T: Clone + Send + Sync + 'static,
{
    /// This pattern's `(Number, PeerNumber, Name, PeerName)`.
    fn signature(&self) -> Signature;

    /// Wires the engine to its owning portal: `view` gives read access to
    /// `chSend`, write access to `chRecv`, and read access to the close
    /// signal. Called exactly once, at portal construction.
    fn init(&self, view: Endpoint<T>);

    /// Attaches a newly connected peer. Implementations must check
    /// [`Signature::compatible`] and panic on mismatch -- a signature
    /// mismatch is a programmer error, not a recoverable runtime condition.
    fn add_endpoint(&self, ep: Endpoint<T>);

    /// Detaches a peer: drop it from the neighborhood, close its scope,
    /// release anything pending for it. Never fails outwardly; the only
    /// contract is that the peer ends up gone.
    fn remove_endpoint(&self, id: Id);

    /// Inspected inline, on the sending task, before a user or internal
    /// send reaches `chSend`.
    fn send_hook(&self, _msg: &Message<T>) -> HookDisposition {
        HookDisposition::Keep
    }

    /// Inspected inline, on the receiving task, before a message dequeued
    /// from `chRecv` is handed to the user. Kept distinct from `send_hook`
    /// so a pattern can filter outgoing and incoming messages independently.
    fn recv_hook(&self, _msg: &Message<T>) -> HookDisposition {
        HookDisposition::Keep
    }

    /// Whether `Recv` makes sense for this pattern (`false` for PUSH).
    fn recv_supported(&self) -> bool {
        true
    }

    /// Whether `Send` makes sense for this pattern (`false` for PULL).
    fn send_supported(&self) -> bool {
        true
    }

    /// Applies a pattern-specific option. A no-op for patterns that don't
    /// have any.
    fn set_option(&self, _opt: ProtocolOption<T>) {}
}

/// Panics if `a` and `b` are not mutual peers: an incompatible attach is a
/// wiring bug, not a recoverable runtime condition.
pub fn assert_compatible(a: Signature, b: Signature) {
    assert!(
        a.compatible(&b),
        "incompatible protocol signatures: {}({}) attached to {}({})",
        a.name,
        a.number,
        b.name,
        b.number
    );
}
