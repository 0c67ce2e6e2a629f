// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! A write-once cancellation signal that composes.
//!
//! This is the primitive every close path in the crate is built from: a
//! portal's own lifetime, a peer-local teardown scope, and the "close if
//! either side goes away" link used to glue a portal to a freshly attached
//! peer all reduce to a [`Token`]. It wraps `tokio_util`'s
//! [`CancellationToken`](tokio_util::sync::CancellationToken) for the
//! settle/wait/child-of-parent mechanics and layers two things that
//! primitive does not provide on its own: `link`, which composes two
//! *unrelated* tokens with OR semantics, and `on_settle`, a callback that
//! fires exactly once, immediately if the token is already settled.

use std::sync::Mutex;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

type Callback = Box<dyn FnOnce() + Send + 'static>;

struct Inner {
    cancel: CancellationToken,
    callbacks: Mutex<Option<Vec<Callback>>>,
}

/// A settle-once cancellation signal; cheap to clone, all clones share state.
#[derive(Clone)]
pub struct Token {
    inner: Arc<Inner>,
}

impl Token {
    /// Creates a fresh root token, settled by nobody but its own `settle`/`close`.
    pub fn new() -> Token {
        Token::wrap(CancellationToken::new())
    }

    fn wrap(cancel: CancellationToken) -> Token {
        let inner = Arc::new(Inner {
            cancel,
            callbacks: Mutex::new(Some(Vec::new())),
        });
        let token = Token { inner };
        token.spawn_watcher();
        token
    }

    fn spawn_watcher(&self) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner.cancel.cancelled().await;
            Token { inner }.fire_callbacks();
        });
    }

    fn fire_callbacks(&self) {
        let callbacks = self.inner.callbacks.lock().unwrap().take();
        if let Some(callbacks) = callbacks {
            for callback in callbacks {
                callback();
            }
        }
    }

    /// Produces a child settled whenever `self` settles, in addition to
    /// whatever settles the child directly. Used to compose an external
    /// `parent-cancel` option with a portal's own root token.
    pub fn child(&self) -> Token {
        Token::wrap(self.inner.cancel.child_token())
    }

    /// Produces a token settled when *either* `a` or `b` settles, even
    /// though neither is an ancestor of the other. This is the mechanism
    /// behind `ConnectEndpoint`'s "close if either side goes away" link.
    pub fn link(a: &Token, b: &Token) -> Token {
        let child = Token::new();

        let watch_a = child.clone();
        let a = a.clone();
        tokio::spawn(async move {
            a.settled().await;
            watch_a.settle();
        });

        let watch_b = child.clone();
        let b = b.clone();
        tokio::spawn(async move {
            b.settled().await;
            watch_b.settle();
        });

        child
    }

    /// Settles the token. Idempotent: settling an already-settled token is a no-op.
    pub fn settle(&self) {
        self.inner.cancel.cancel();
        self.fire_callbacks();
    }

    /// Non-blocking check of whether the token has settled.
    pub fn is_settled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Waits until the token settles.
    pub async fn settled(&self) {
        self.inner.cancel.cancelled().await;
    }

    /// Registers a callback that runs exactly once, the first time the token
    /// settles. If the token has already settled, `f` runs immediately,
    /// inline, on the caller's task.
    pub fn on_settle<F: FnOnce() + Send + 'static>(&self, f: F) {
        let mut guard = self.inner.callbacks.lock().unwrap();
        match guard.as_mut() {
            Some(pending) => {
                pending.push(Box::new(f));
            }
            None => {
                drop(guard);
                f();
            }
        }
    }
}

impl Default for Token {
    fn default() -> Self {
        Token::new()
    }
}

#[cfg(test)]
mod tests {
    use super::Token;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn settle_is_idempotent_and_wakes_waiters() {
        let token = Token::new();
        assert!(!token.is_settled());

        token.settle();
        token.settle();

        assert!(token.is_settled());
        token.settled().await;
    }

    #[tokio::test]
    async fn child_settles_when_parent_does() {
        let parent = Token::new();
        let child = parent.child();

        parent.settle();
        child.settled().await;
        assert!(child.is_settled());
    }

    #[tokio::test]
    async fn link_settles_on_either_side() {
        let a = Token::new();
        let b = Token::new();
        let linked = Token::link(&a, &b);

        b.settle();
        linked.settled().await;
        assert!(linked.is_settled());
        assert!(!a.is_settled());
    }

    #[tokio::test]
    async fn on_settle_runs_once_and_runs_immediately_if_late() {
        let token = Token::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counted = calls.clone();
        token.on_settle(move || {
            counted.fetch_add(1, Ordering::SeqCst);
        });

        token.settle();
        token.settled().await;
        // give the watcher task a chance to run the callback
        tokio::task::yield_now().await;

        let late = calls.clone();
        token.on_settle(move || {
            late.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
