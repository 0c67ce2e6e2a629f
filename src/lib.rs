// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! In-process scalability protocols: pair, push/pull, req/rep, pub/sub, bus
//! and star messaging patterns, built on async tasks and channels rather
//! than a wire transport. A [`Portal`] is the user-facing entry point;
//! `bind`/`connect` wire two portals together in-process, and `send`/`recv`
//! move payloads through whichever [`ProtocolEngine`] implements the
//! pattern's fan-out/fan-in/broadcast semantics.
//!
//! ```no_run
//! use portals::{Portal, PortalOptions};
//! use portals::protocol::{Push, Pull};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), portals::Error> {
//! // A non-zero `size` makes `send` asynchronous: it returns as soon as the
//! // message is queued, without waiting for `pull` to actually consume it.
//! // At the default size of 0, `send` is a true rendezvous and must be
//! // paired with a concurrent `recv` (e.g. via `tokio::join!`) or it would
//! // never return.
//! let push = Portal::new(Arc::new(Push::new()), PortalOptions::new().size(1));
//! let pull = Portal::new(Arc::new(Pull::new()), PortalOptions::new().size(1));
//!
//! push.bind("local://example")?;
//! pull.connect("local://example")?;
//!
//! push.send(vec![65u8, 66, 67]).await?;
//! let received = pull.recv().await?;
//! assert_eq!(received, Some(vec![65, 66, 67]));
//! # Ok(())
//! # }
//! ```

pub mod endpoint;
pub mod engine;
pub mod error;
pub mod id;
pub mod message;
pub mod neighborhood;
pub mod options;
pub mod peer;
pub mod portal;
pub mod protocol;
pub mod registry;
pub mod token;

pub use engine::{HookDisposition, ProtocolEngine, ProtocolOption};
pub use error::{Error, TrySendError};
pub use id::Id;
pub use options::PortalOptions;
pub use portal::Portal;
pub use token::Token;
