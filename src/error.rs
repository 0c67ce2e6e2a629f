// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::error;
use std::fmt;

/// Errors surfaced by the portal runtime.
///
/// `Bind`/`Connect` return these directly; `Send`/`Recv` raise them fatally
/// while `TrySend`/`TryRecv` hand back a recoverable value instead (see
/// [`TrySendError`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// `bind` was called on an address that already has a bound endpoint.
    AddressInUse(String),
    /// `connect` was called on an address with no bound endpoint.
    AddressNotFound(String),
    /// Two endpoints attached with protocol signatures that are not mutual peers.
    Incompatible,
    /// `send`/`recv` called before a successful `bind`/`connect`, or after `close`.
    NotReady,
    /// The operation observed the portal's close signal while in flight.
    Closed,
    /// The protocol does not implement this half of the portal (e.g. `Push::recv`).
    Unsupported(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::AddressInUse(addr) => write!(f, "address in use: {}", addr),
            Error::AddressNotFound(addr) => write!(f, "address not found: {}", addr),
            Error::Incompatible => write!(f, "incompatible protocol signatures"),
            Error::NotReady => write!(f, "portal not ready"),
            Error::Closed => write!(f, "portal closed"),
            Error::Unsupported(op) => write!(f, "{} not supported by protocol", op),
        }
    }
}

impl error::Error for Error {}

pub fn address_in_use(addr: &str) -> Error {
    Error::AddressInUse(addr.to_owned())
}

pub fn address_not_found(addr: &str) -> Error {
    Error::AddressNotFound(addr.to_owned())
}

/// Recoverable counterpart of [`Error`] for the non-blocking `try_send` path.
///
/// Mirrors `std::sync::mpsc::TrySendError`: on failure the payload is handed
/// back so the caller can retry or drop it.
pub enum TrySendError<T> {
    /// The queue is full and the portal is configured to block rather than drop.
    Full(T),
    /// The portal (or the attached peer) is closed.
    Closed(T),
    /// `send` was called before a successful `bind`/`connect`.
    NotReady(T),
}

impl<T> TrySendError<T> {
    /// Recovers the payload that failed to send.
    pub fn into_inner(self) -> T {
        match self {
            TrySendError::Full(v) | TrySendError::Closed(v) | TrySendError::NotReady(v) => v,
        }
    }
}

impl<T> fmt::Debug for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrySendError::Full(_) => f.write_str("Full(..)"),
            TrySendError::Closed(_) => f.write_str("Closed(..)"),
            TrySendError::NotReady(_) => f.write_str("NotReady(..)"),
        }
    }
}

impl<T> fmt::Display for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrySendError::Full(_) => f.write_str("queue full"),
            TrySendError::Closed(_) => f.write_str("portal closed"),
            TrySendError::NotReady(_) => f.write_str("portal not ready"),
        }
    }
}

impl<T: fmt::Debug> error::Error for TrySendError<T> {}
