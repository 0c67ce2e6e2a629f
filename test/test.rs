// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::sync::Arc;
use std::time::Duration;

use portals::protocol::{Bus, Pair, Pub, Pull, Push, Rep, Req, Star, Sub};
use portals::{Portal, PortalOptions, ProtocolOption};

fn addr(name: &str) -> String {
    format!("local://{}", name)
}

/// A few slots of buffer turns `send` asynchronous: it returns as soon as
/// the message is queued rather than waiting for a peer to actually consume
/// it. Most of the scenarios below are about routing, not about exercising
/// the unbuffered rendezvous itself, so they use this to stay free of having
/// to pair every send with a concurrently running receive.
fn buffered() -> PortalOptions {
    PortalOptions::new().size(8)
}

#[tokio::test]
async fn pair_ping_pong() {
    let _ = env_logger::try_init();

    let a = Portal::new(Arc::new(Pair::new()), buffered());
    let b = Portal::new(Arc::new(Pair::new()), buffered());

    let address = addr("pair-ping-pong");
    a.bind(&address).unwrap();
    b.connect(&address).unwrap();

    a.send(1u32).await.unwrap();
    assert_eq!(b.recv().await.unwrap(), Some(1));

    b.send(2u32).await.unwrap();
    assert_eq!(a.recv().await.unwrap(), Some(2));

    a.close();
    b.close();
}

/// At the default `size` of 0, `send` is a true rendezvous: per §4.4 it
/// does not return until the message has been consumed (or dropped)
/// downstream. That means a synchronous `send` must be driven concurrently
/// with the matching `recv`, never sequentially in the same task -- this is
/// the shape §8's scenario 2 calls out explicitly ("B.Send concurrently
/// with B.Recv").
#[tokio::test]
async fn pair_send_is_a_rendezvous_at_the_default_size() {
    let _ = env_logger::try_init();

    let a = Portal::new(Arc::new(Pair::new()), PortalOptions::new());
    let b = Portal::new(Arc::new(Pair::new()), PortalOptions::new());

    let address = addr("pair-rendezvous");
    a.bind(&address).unwrap();
    b.connect(&address).unwrap();

    let (sent, received) = tokio::join!(a.send(7u32), b.recv());
    sent.unwrap();
    assert_eq!(received.unwrap(), Some(7));

    a.close();
    b.close();
}

#[tokio::test]
async fn pair_rejects_a_second_peer() {
    let _ = env_logger::try_init();

    let hub = Portal::new(Arc::new(Pair::new()), PortalOptions::new());
    let first = Portal::new(Arc::new(Pair::new()), PortalOptions::new());
    let second = Portal::new(Arc::new(Pair::new()), PortalOptions::new());

    let address = addr("pair-reject-second");
    hub.bind(&address).unwrap();
    first.connect(&address).unwrap();
    second.connect(&address).unwrap();

    let result = tokio::time::timeout(Duration::from_millis(200), second.recv()).await;
    match result {
        Ok(r) => assert!(r.is_err() || r.unwrap().is_none()),
        Err(_) => panic!("second peer's portal never observed its own close"),
    }
}

#[tokio::test]
async fn push_pull_load_balances_across_peers() {
    let _ = env_logger::try_init();

    let push = Portal::new(Arc::new(Push::new()), buffered());
    let pull_a = Portal::new(Arc::new(Pull::new()), buffered());
    let pull_b = Portal::new(Arc::new(Pull::new()), buffered());

    let address = addr("push-pull-balance");
    push.bind(&address).unwrap();
    pull_a.connect(&address).unwrap();
    pull_b.connect(&address).unwrap();

    for i in 0..10u32 {
        push.send(i).await.unwrap();
    }

    let mut seen = Vec::new();

    // Drain both sides until every message has been accounted for exactly once.
    let deadline = tokio::time::Instant::now() + Duration::from_millis(500);
    while seen.len() < 10 && tokio::time::Instant::now() < deadline {
        if let Ok(Some(v)) = pull_a.try_recv() {
            seen.push(v);
        }
        if let Ok(Some(v)) = pull_b.try_recv() {
            seen.push(v);
        }
        tokio::task::yield_now().await;
    }

    seen.sort();
    assert_eq!(seen, (0..10).collect::<Vec<_>>());
}

#[tokio::test]
async fn req_rep_round_trip() {
    let _ = env_logger::try_init();

    let rep = Portal::new(Arc::new(Rep::new()), buffered());
    let req = Portal::new(Arc::new(Req::new()), buffered());

    let address = addr("req-rep-round-trip");
    rep.bind(&address).unwrap();
    req.connect(&address).unwrap();

    req.send(vec![65u8, 66, 67]).await.unwrap();
    let request = rep.recv().await.unwrap().unwrap();
    assert_eq!(request, vec![65, 66, 67]);

    rep.send(vec![67u8, 66, 65]).await.unwrap();
    let reply = req.recv().await.unwrap().unwrap();
    assert_eq!(reply, vec![67, 66, 65]);
}

#[tokio::test]
async fn pub_sub_filters_by_predicate() {
    let _ = env_logger::try_init();

    let publisher = Portal::new(Arc::new(Pub::new()), buffered());
    let subscriber = Portal::new(Arc::new(Sub::new()), buffered());

    subscriber.set_option(ProtocolOption::Subscribe(Box::new(|topic: &(char, u8)| topic.0 == 'A')));

    let address = addr("pub-sub-filter");
    publisher.bind(&address).unwrap();
    subscriber.connect(&address).unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;

    publisher.send(('B', 1)).await.unwrap();
    publisher.send(('A', 2)).await.unwrap();

    let received = tokio::time::timeout(Duration::from_millis(200), subscriber.recv())
        .await
        .expect("subscriber should have received the matching message")
        .unwrap()
        .unwrap();

    assert_eq!(received, ('A', 2));
}

#[tokio::test]
async fn bus_broadcasts_without_echo() {
    let _ = env_logger::try_init();

    let hub = Portal::new(Arc::new(Bus::new()), buffered());
    let c1 = Portal::new(Arc::new(Bus::new()), buffered());
    let c2 = Portal::new(Arc::new(Bus::new()), buffered());
    let c3 = Portal::new(Arc::new(Bus::new()), buffered());

    let address = addr("bus-broadcast");
    hub.bind(&address).unwrap();
    c1.connect(&address).unwrap();
    c2.connect(&address).unwrap();
    c3.connect(&address).unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;

    hub.send(true).await.unwrap();

    assert_eq!(c1.recv().await.unwrap(), Some(true));
    assert_eq!(c2.recv().await.unwrap(), Some(true));
    assert_eq!(c3.recv().await.unwrap(), Some(true));

    let nothing = tokio::time::timeout(Duration::from_millis(10), hub.recv()).await;
    assert!(nothing.is_err(), "hub must not receive its own broadcast");
}

/// §8 scenario 2, exercised with the default unbuffered/rendezvous size so
/// `hub.send` genuinely waits for every subscriber's copy to be consumed --
/// which requires driving the send concurrently with the three receives.
#[tokio::test]
async fn bus_broadcast_is_a_rendezvous_at_the_default_size() {
    let _ = env_logger::try_init();

    let hub = Portal::new(Arc::new(Bus::new()), PortalOptions::new());
    let c1 = Portal::new(Arc::new(Bus::new()), PortalOptions::new());
    let c2 = Portal::new(Arc::new(Bus::new()), PortalOptions::new());
    let c3 = Portal::new(Arc::new(Bus::new()), PortalOptions::new());

    let address = addr("bus-broadcast-rendezvous");
    hub.bind(&address).unwrap();
    c1.connect(&address).unwrap();
    c2.connect(&address).unwrap();
    c3.connect(&address).unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;

    let (sent, a, b, c) = tokio::join!(hub.send(true), c1.recv(), c2.recv(), c3.recv());
    sent.unwrap();
    assert_eq!(a.unwrap(), Some(true));
    assert_eq!(b.unwrap(), Some(true));
    assert_eq!(c.unwrap(), Some(true));
}

#[tokio::test]
async fn bus_relays_a_client_send_but_not_back_to_it() {
    let _ = env_logger::try_init();

    let hub = Portal::new(Arc::new(Bus::new()), buffered());
    let c1 = Portal::new(Arc::new(Bus::new()), buffered());
    let c2 = Portal::new(Arc::new(Bus::new()), buffered());
    let c3 = Portal::new(Arc::new(Bus::new()), buffered());

    let address = addr("bus-from-client");
    hub.bind(&address).unwrap();
    c1.connect(&address).unwrap();
    c2.connect(&address).unwrap();
    c3.connect(&address).unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;

    c1.send(true).await.unwrap();

    assert_eq!(hub.recv().await.unwrap(), Some(true));

    let at_c2 = tokio::time::timeout(Duration::from_millis(10), c2.recv()).await;
    let at_c3 = tokio::time::timeout(Duration::from_millis(10), c3.recv()).await;
    assert!(at_c2.is_err(), "bus does not relay peer sends to other peers");
    assert!(at_c3.is_err(), "bus does not relay peer sends to other peers");
}

#[tokio::test]
async fn star_relays_a_client_send_to_hub_and_every_other_peer() {
    let _ = env_logger::try_init();

    let hub = Portal::new(Arc::new(Star::new()), buffered());
    let c1 = Portal::new(Arc::new(Star::new()), buffered());
    let c2 = Portal::new(Arc::new(Star::new()), buffered());
    let c3 = Portal::new(Arc::new(Star::new()), buffered());

    let address = addr("star-from-client");
    hub.bind(&address).unwrap();
    c1.connect(&address).unwrap();
    c2.connect(&address).unwrap();
    c3.connect(&address).unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;

    c1.send(true).await.unwrap();

    assert_eq!(hub.recv().await.unwrap(), Some(true));
    assert_eq!(c2.recv().await.unwrap(), Some(true));
    assert_eq!(c3.recv().await.unwrap(), Some(true));

    let at_c1 = tokio::time::timeout(Duration::from_millis(10), c1.recv()).await;
    assert!(at_c1.is_err(), "the sender must never see its own message come back");
}

/// §8 scenario 6: send N messages into an unbuffered PAIR with nobody ever
/// receiving, then close mid-flight. Every message -- whether still stuck
/// behind the single-slot `chSend` buffer, mid-handoff to the peer, or
/// already sitting in the peer's own `chRecv` -- must still reach refcount
/// zero within a bounded time. The sends are driven from separate tasks
/// (the default size is 0, a true rendezvous, so each `send` call blocks
/// until its message is released one way or another).
#[tokio::test]
async fn close_drains_pending_messages() {
    let _ = env_logger::try_init();

    let a = Arc::new(Portal::new(Arc::new(Pair::new()), PortalOptions::new()));
    let b = Portal::new(Arc::new(Pair::new()), PortalOptions::new());

    let address = addr("close-drains");
    a.bind(&address).unwrap();
    b.connect(&address).unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;

    let senders: Vec<_> = (0..5u32)
        .map(|i| {
            let a = a.clone();
            tokio::spawn(async move { a.send(i).await })
        })
        .collect();

    // Give the sends a chance to queue up behind the single-slot channel
    // and block on delivery before anyone cancels anything.
    tokio::time::sleep(Duration::from_millis(20)).await;

    a.close();
    b.close();

    let drained = tokio::time::timeout(Duration::from_millis(500), async move {
        for handle in senders {
            handle.await.unwrap().unwrap();
        }
    })
    .await;

    assert!(drained.is_ok(), "not every pending message was released within the deadline");
    assert_eq!(b.try_recv().unwrap_or(None), None);
}
