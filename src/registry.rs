// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! The process-wide address registry used to resolve `bind`/`connect`.
//!
//! Addresses are opaque strings; a binding is type-erased (`Box<dyn Any>`)
//! because the registry itself has no notion of the payload type carried by
//! any given portal. A lookup against the right address but the wrong
//! payload type is indistinguishable, from the caller's point of view, from
//! the address simply not existing -- there is no cross-type handshake in
//! this system -- so it surfaces the same `AddressNotFound`.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

use crate::endpoint::Endpoint;
use crate::error::{self, Error};
use crate::token::Token;

/// Invoked with the connecting side's endpoint; attaches it to the bound
/// side's engine and installs that side's half of the close-if-either
/// teardown link.
pub type AttachFn<T> = Arc<dyn Fn(Endpoint<T>) + Send + Sync>;

struct Binding<T> {
    endpoint: Endpoint<T>,
    attach: AttachFn<T>,
}

static REGISTRY: Lazy<RwLock<HashMap<String, Box<dyn Any + Send + Sync>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Registers `endpoint` as the bound side of `addr`. The entry is removed
/// automatically the moment `token` settles.
pub fn assign<T: Send + Sync + 'static>(
    addr: &str,
    endpoint: Endpoint<T>,
    attach: AttachFn<T>,
    token: Token,
) -> Result<(), Error> {
    let mut map = REGISTRY.write().unwrap();

    if map.contains_key(addr) {
        return Err(error::address_in_use(addr));
    }

    map.insert(addr.to_owned(), Box::new(Binding { endpoint, attach }));
    drop(map);

    let owned_addr = addr.to_owned();
    token.on_settle(move || deregister(&owned_addr));

    Ok(())
}

fn deregister(addr: &str) {
    REGISTRY.write().unwrap().remove(addr);
}

/// Returns the bound endpoint for `addr` and its attach callback, or
/// `AddressNotFound` if nothing is bound there (or it was bound with a
/// different payload type).
pub fn lookup<T: Send + Sync + 'static>(addr: &str) -> Result<(Endpoint<T>, AttachFn<T>), Error> {
    let map = REGISTRY.read().unwrap();
    let entry = map.get(addr).ok_or_else(|| error::address_not_found(addr))?;
    let binding = entry
        .downcast_ref::<Binding<T>>()
        .ok_or_else(|| error::address_not_found(addr))?;

    Ok((binding.endpoint.clone(), binding.attach.clone()))
}

#[cfg(test)]
pub(crate) fn is_bound(addr: &str) -> bool {
    REGISTRY.read().unwrap().contains_key(addr)
}
