// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Portal configuration, collapsed to the three knobs this runtime
//! actually exposes: queue capacity, full-queue policy, and an optional
//! external cancellation parent.

use crate::token::Token;

/// Builder for [`Portal`](crate::portal::Portal) construction options.
#[derive(Clone, Default)]
pub struct PortalOptions {
    pub(crate) size: usize,
    pub(crate) drop_when_full: bool,
    pub(crate) parent: Option<Token>,
}

impl PortalOptions {
    pub fn new() -> PortalOptions {
        PortalOptions::default()
    }

    /// Capacity of both `chSend` and `chRecv`. `0` means unbuffered: `Send`
    /// does not return until its message has actually been consumed or
    /// dropped downstream.
    pub fn size(mut self, size: usize) -> PortalOptions {
        self.size = size;
        self
    }

    /// When the queue is full: `true` drops the newest arrival instead of
    /// blocking the sender.
    pub fn drop_when_full(mut self, drop_when_full: bool) -> PortalOptions {
        self.drop_when_full = drop_when_full;
        self
    }

    /// An external cancellation token the portal's own token becomes a
    /// child of. If unset, the portal creates a fresh root token.
    pub fn parent_cancel(mut self, parent: Token) -> PortalOptions {
        self.parent = Some(parent);
        self
    }

    pub(crate) fn is_synchronous(&self) -> bool {
        self.size == 0
    }

    pub(crate) fn channel_capacity(&self) -> usize {
        self.size.max(1)
    }
}
