// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! The user-facing endpoint: bind/connect, send/recv, and the lifecycle
//! that ties a portal to its attached peers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_channel::{Receiver, Sender, TrySendError as ChanTrySendError};

use crate::endpoint::Endpoint;
use crate::engine::{HookDisposition, ProtocolEngine, ProtocolOption};
use crate::error::{Error, TrySendError};
use crate::id::Id;
use crate::message::Message;
use crate::options::PortalOptions;
use crate::registry::{self, AttachFn};
use crate::token::Token;

/// A user-facing entry point into one communication pattern.
///
/// Owns its protocol engine exclusively for its whole lifetime, two bounded
/// channels (`chSend`/`chRecv`), a `ready` flag, and a cancellation token
/// that may be a child of an externally supplied one.
pub struct Portal<T> {
    id: Id,
    engine: Arc<dyn ProtocolEngine<T>>,
    self_endpoint: Endpoint<T>,
    send_tx: Sender<Message<T>>,
    recv_rx: Receiver<Message<T>>,
    token: Token,
    ready: Arc<AtomicBool>,
    drop_when_full: bool,
    synchronous: bool,
}

impl<T> Portal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Builds a portal around `engine`, wiring it via `ProtocolEngine::init`
    /// before anything else can touch it.
    pub fn new(engine: Arc<dyn ProtocolEngine<T>>, options: PortalOptions) -> Portal<T> {
        let capacity = options.channel_capacity();
        let (send_tx, send_rx) = async_channel::bounded(capacity);
        let (recv_tx, recv_rx) = async_channel::bounded(capacity);

        let token = match &options.parent {
            Some(parent) => parent.child(),
            None => Token::new(),
        };

        let id = Id::next();
        let signature = engine.signature();
        let view = Endpoint::new(id, signature, send_rx.clone(), recv_tx, token.clone());

        engine.init(view.clone());
        Self::spawn_drain_on_close(&token, send_rx, recv_rx.clone());

        Portal {
            id,
            engine,
            self_endpoint: view,
            send_tx,
            recv_rx,
            token,
            ready: Arc::new(AtomicBool::new(false)),
            drop_when_full: options.drop_when_full,
            synchronous: options.is_synchronous(),
        }
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Applies a pattern-specific option (e.g. SUB's `Subscribe` filter).
    pub fn set_option(&self, opt: ProtocolOption<T>) {
        self.engine.set_option(opt);
    }

    /// Registers this portal's endpoint under `addr`. The entry is removed
    /// automatically when this portal closes.
    pub fn bind(&self, addr: &str) -> Result<(), Error> {
        let engine = self.engine.clone();
        let local_token = self.token.clone();
        let attach: AttachFn<T> = Arc::new(move |peer: Endpoint<T>| {
            Self::connect_endpoint(&engine, &local_token, peer);
        });

        registry::assign(addr, self.self_endpoint.clone(), attach, self.token.clone())?;
        self.mark_ready();
        Ok(())
    }

    /// Looks up the portal bound at `addr` and performs the mutual
    /// `ConnectEndpoint` handshake: each side's engine receives the other's
    /// endpoint, and each side installs its own half of the close-if-either
    /// teardown link.
    pub fn connect(&self, addr: &str) -> Result<(), Error> {
        let (remote_endpoint, remote_attach) = registry::lookup::<T>(addr)?;

        remote_attach(self.self_endpoint.clone());
        Self::connect_endpoint(&self.engine, &self.token, remote_endpoint);
        self.mark_ready();
        Ok(())
    }

    fn connect_endpoint(engine: &Arc<dyn ProtocolEngine<T>>, local_token: &Token, peer: Endpoint<T>) {
        engine.add_endpoint(peer.clone());

        let combined = Token::link(local_token, peer.close_channel());
        let engine = engine.clone();
        let peer_id = peer.id();
        combined.on_settle(move || engine.remove_endpoint(peer_id));
    }

    fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
        let ready = self.ready.clone();
        self.token.on_settle(move || ready.store(false, Ordering::SeqCst));
    }

    /// Sends `v`. Blocks until consumed (or dropped) downstream when the
    /// portal is unbuffered; otherwise the wait is detached to a background
    /// task and this returns as soon as the message is queued.
    pub async fn send(&self, v: T) -> Result<(), Error> {
        if !self.is_ready() {
            return Err(Error::NotReady);
        }
        if !self.engine.send_supported() {
            return Err(Error::Unsupported("send"));
        }

        let msg = Message::new(v);
        let completion = msg.completion();
        self.send_msg(msg).await;

        if self.synchronous {
            completion.wait().await;
        } else {
            tokio::spawn(async move {
                completion.wait().await;
            });
        }

        Ok(())
    }

    /// Receives the next payload, or `None` if the portal closed while
    /// waiting.
    pub async fn recv(&self) -> Result<Option<T>, Error> {
        if !self.is_ready() {
            return Err(Error::NotReady);
        }
        if !self.engine.recv_supported() {
            return Err(Error::Unsupported("recv"));
        }

        Ok(self.recv_msg().await.map(|msg| {
            let v = msg.payload().clone();
            msg.free();
            v
        }))
    }

    /// Non-blocking `send`: never waits on queue space or on downstream
    /// consumption.
    pub fn try_send(&self, v: T) -> Result<(), TrySendError<T>> {
        if !self.is_ready() {
            return Err(TrySendError::NotReady(v));
        }
        if !self.engine.send_supported() {
            return Err(TrySendError::NotReady(v));
        }

        let msg = Message::new(v);
        if self.engine.send_hook(&msg) == HookDisposition::Drop {
            msg.free();
            return Ok(());
        }

        match self.send_tx.try_send(msg) {
            Ok(()) => Ok(()),
            Err(ChanTrySendError::Full(msg)) => {
                let v = msg.payload().clone();
                msg.free();
                Err(TrySendError::Full(v))
            }
            Err(ChanTrySendError::Closed(msg)) => {
                let v = msg.payload().clone();
                msg.free();
                Err(TrySendError::Closed(v))
            }
        }
    }

    /// Non-blocking `recv`: `Ok(None)` both when the queue is momentarily
    /// empty and when the portal is closed.
    pub fn try_recv(&self) -> Result<Option<T>, Error> {
        if !self.is_ready() {
            return Err(Error::NotReady);
        }
        if !self.engine.recv_supported() {
            return Err(Error::Unsupported("recv"));
        }

        loop {
            match self.recv_rx.try_recv() {
                Ok(msg) => {
                    if self.engine.recv_hook(&msg) == HookDisposition::Drop {
                        msg.free();
                        continue;
                    }
                    let v = msg.payload().clone();
                    msg.free();
                    return Ok(Some(v));
                }
                Err(_) => return Ok(None),
            }
        }
    }

    /// Settles the portal's token. Idempotent. Runs every registered
    /// teardown callback: deregisters any binding, clears `ready`, tears
    /// down peers, and drains/frees whatever is still queued.
    pub fn close(&self) {
        self.token.settle();
    }

    pub(crate) async fn send_msg(&self, msg: Message<T>) {
        if self.engine.send_hook(&msg) == HookDisposition::Drop {
            msg.free();
            return;
        }

        if self.drop_when_full {
            match self.send_tx.try_send(msg) {
                Ok(()) => {}
                Err(ChanTrySendError::Full(msg)) | Err(ChanTrySendError::Closed(msg)) => msg.free(),
            }
        } else {
            tokio::select! {
                res = self.send_tx.send(msg) => {
                    if let Err(e) = res {
                        e.0.free();
                    }
                }
                _ = self.token.settled() => {}
            }
        }
    }

    async fn recv_msg(&self) -> Option<Message<T>> {
        loop {
            tokio::select! {
                res = self.recv_rx.recv() => {
                    match res {
                        Ok(msg) => {
                            if self.engine.recv_hook(&msg) == HookDisposition::Drop {
                                msg.free();
                                continue;
                            }
                            return Some(msg);
                        }
                        Err(_) => return None,
                    }
                }
                _ = self.token.settled() => return None,
            }
        }
    }

    fn spawn_drain_on_close(token: &Token, send_rx: Receiver<Message<T>>, recv_rx: Receiver<Message<T>>) {
        token.on_settle(move || {
            while let Ok(msg) = send_rx.try_recv() {
                msg.free();
            }
            while let Ok(msg) = recv_rx.try_recv() {
                msg.free();
            }
        });
    }
}

impl<T> Drop for Portal<T> {
    fn drop(&mut self) {
        self.token.settle();
    }
}
