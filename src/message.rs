// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! The envelope that flows through a portal's queues.
//!
//! A message's lifetime is reference counted: `ref_` takes out another
//! handle, `free` gives one back, and its completion signal fires once the
//! last handle is gone. `Clone` and `Drop` give us exactly that discipline
//! for free: a [`Message`] is an `Arc`-backed handle, `ref_` is `Clone`, and
//! the completion signal fires the moment the *last* handle is dropped, with
//! no hand-counted bookkeeping and no way to double-free or leak one by
//! accident.

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

use crate::id::Id;

struct CompletionState {
    settled: AtomicBool,
    notify: Notify,
}

/// A detached handle that can be waited on after the [`Message`] it came
/// from has been handed off, without itself holding the message alive.
#[derive(Clone)]
pub struct Completion(Arc<CompletionState>);

impl Completion {
    fn new() -> Completion {
        Completion(Arc::new(CompletionState {
            settled: AtomicBool::new(false),
            notify: Notify::new(),
        }))
    }

    fn settle(&self) {
        self.0.settled.store(true, Ordering::SeqCst);
        self.0.notify.notify_waiters();
    }

    /// Blocks until the message this completion was taken from has been
    /// fully released (its last reference dropped).
    pub async fn wait(&self) {
        // Subscribe before checking the flag, so a settle landing between
        // the check and the await can't be missed.
        let notified = self.0.notify.notified();
        if self.0.settled.load(Ordering::SeqCst) {
            return;
        }
        tokio::pin!(notified);
        notified.await;
    }
}

struct Inner<T> {
    payload: T,
    origin: Option<Id>,
    completion: Completion,
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        self.completion.settle();
    }
}

/// An envelope carrying an opaque payload through a portal's queues.
///
/// Payload and origin are written once, at construction, and are read-only
/// thereafter; the type is `Send + Sync` whenever `T` is, so it can cross
/// between the tasks a protocol engine spawns per peer.
pub struct Message<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Message<T> {
    /// Creates a message with no origin, reference count 1.
    pub fn new(payload: T) -> Message<T> {
        Message {
            inner: Arc::new(Inner {
                payload,
                origin: None,
                completion: Completion::new(),
            }),
        }
    }

    /// Creates a message stamped with the id of the peer it originated
    /// from, used by broadcast protocols to suppress echo to the sender.
    pub fn with_origin(payload: T, origin: Id) -> Message<T> {
        Message {
            inner: Arc::new(Inner {
                payload,
                origin: Some(origin),
                completion: Completion::new(),
            }),
        }
    }

    /// The peer id this message was broadcast from, if any.
    pub fn origin(&self) -> Option<Id> {
        self.inner.origin
    }

    /// Borrows the payload.
    pub fn payload(&self) -> &T {
        &self.inner.payload
    }

    /// Increments the reference count, yielding another handle to the same
    /// envelope. Each one must eventually be `free`d.
    pub fn ref_(&self) -> Message<T> {
        Message {
            inner: self.inner.clone(),
        }
    }

    /// Decrements the reference count. A thin, explicit alias over simply
    /// dropping the handle -- kept so call sites document the hand-off
    /// point even though the compiler enforces the balance structurally.
    pub fn free(self) {}

    /// Takes a detached handle that can be awaited independently of this
    /// message's own lifetime, to learn when the envelope is fully released.
    pub fn completion(&self) -> Completion {
        self.inner.completion.clone()
    }
}

impl<T> Clone for Message<T> {
    /// Equivalent to [`Message::ref_`].
    fn clone(&self) -> Self {
        self.ref_()
    }
}

impl<T> Deref for Message<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.payload()
    }
}
