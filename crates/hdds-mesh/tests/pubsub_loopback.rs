// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end publish/subscribe over the in-process multicast bus.

use hdds_mesh::config::MeshConfig;
use hdds_mesh::transport::{
    AddressState, InterfaceAddress, LoopbackFault, LoopbackNetwork, MulticastSocket,
    SocketFactory,
};
use hdds_mesh::{
    mesh_loop, Error, EventHandler, InitStage, MeshPublish, PollOutcome, SubscriptionScope,
};
use parking_lot::Mutex;
use std::net::Ipv6Addr;
use std::sync::Arc;
use std::thread;

type Node = MeshPublish<LoopbackNetwork, LoopbackNetwork>;

type Log = Arc<Mutex<Vec<(String, String, String)>>>;

fn network() -> LoopbackNetwork {
    let net = LoopbackNetwork::new();
    net.add_interface("th1");
    net
}

fn node(net: &LoopbackNetwork) -> Node {
    MeshPublish::with_transport(MeshConfig::default(), net.clone(), net.clone())
}

fn recorder(log: &Log, tag: &'static str) -> EventHandler {
    let log = Arc::clone(log);
    EventHandler::new(move |event, data| {
        log.lock()
            .push((tag.to_string(), event.to_string(), data.to_string()));
    })
}

fn drain(node: &mut Node) -> Vec<PollOutcome> {
    let mut outcomes = Vec::new();
    loop {
        match mesh_loop(node).unwrap() {
            PollOutcome::NoData | PollOutcome::Inactive => return outcomes,
            outcome => outcomes.push(outcome),
        }
    }
}

#[test]
fn test_event_reaches_every_node() {
    let net = network();
    let mut sensor = node(&net);
    let mut display = node(&net);
    let log: Log = Arc::default();

    display.subscribe("temp/", recorder(&log, "display")).unwrap();
    sensor.publish("temp/room1", "21.5").unwrap();

    assert_eq!(net.group_members(&"ff03::1:1001".parse().unwrap()), 2);
    assert_eq!(drain(&mut display), vec![PollOutcome::Dispatched(1)]);
    assert_eq!(
        log.lock().clone(),
        vec![(
            "display".to_string(),
            "temp/room1".to_string(),
            "21.5".to_string()
        )]
    );

    // Publisher also receives its own event, with no handler registered
    assert_eq!(drain(&mut sensor), vec![PollOutcome::Dispatched(0)]);
}

#[test]
fn test_prefix_dispatch_in_registration_order() {
    let net = network();
    let mut mesh = node(&net);
    let log: Log = Arc::default();

    mesh.subscribe("temp/", recorder(&log, "A")).unwrap();
    mesh.subscribe("temp/room1", recorder(&log, "B")).unwrap();
    mesh.subscribe("hum/", recorder(&log, "C")).unwrap();

    mesh.publish("temp/room1", "21.5").unwrap();
    assert_eq!(mesh.poll().unwrap(), PollOutcome::Dispatched(2));
    {
        let seen = log.lock();
        let tags: Vec<&str> = seen.iter().map(|(tag, _, _)| tag.as_str()).collect();
        assert_eq!(tags, ["A", "B"]);
        assert!(seen.iter().all(|(_, event, data)| event == "temp/room1" && data == "21.5"));
    }
    log.lock().clear();

    mesh.publish("temp/room2", "19.0").unwrap();
    assert_eq!(mesh.poll().unwrap(), PollOutcome::Dispatched(1));
    assert_eq!(log.lock()[0].0, "A");
}

#[test]
fn test_empty_payload_is_delivered() {
    let net = network();
    let mut mesh = node(&net);
    let log: Log = Arc::default();

    mesh.subscribe("", recorder(&log, "all")).unwrap();
    mesh.publish("ping", "").unwrap();
    assert_eq!(mesh.poll().unwrap(), PollOutcome::Dispatched(1));
    assert_eq!(log.lock()[0].1, "ping");
    assert_eq!(log.lock()[0].2, "");
}

#[test]
fn test_identical_subscription_when_full() {
    let net = network();
    let mut mesh = node(&net);
    let log: Log = Arc::default();
    let handler = recorder(&log, "h");

    for prefix in ["a/", "b/", "c/", "d/", "e/"] {
        mesh.subscribe(prefix, handler.clone()).unwrap();
    }
    assert!(mesh.subscriptions().is_full());
    assert!(matches!(
        mesh.subscribe("f/", handler.clone()),
        Err(Error::NoMemory)
    ));
    mesh.subscribe("c/", handler.clone()).unwrap();
    mesh.subscribe_scoped("c/", handler, SubscriptionScope::MyDevices, None)
        .unwrap();
    assert_eq!(mesh.subscriptions().len(), 5);
}

#[test]
fn test_all_devices_scope_is_separate_subscription() {
    let net = network();
    let mut mesh = node(&net);
    let log: Log = Arc::default();
    let handler = recorder(&log, "h");

    mesh.subscribe("temp/", handler.clone()).unwrap();
    mesh.subscribe_scoped("temp/", handler, SubscriptionScope::AllDevices, Some("dev42"))
        .unwrap();
    assert_eq!(mesh.subscriptions().len(), 2);

    mesh.publish("temp/x", "1").unwrap();
    assert_eq!(mesh.poll().unwrap(), PollOutcome::Dispatched(2));
}

#[test]
fn test_init_failure_is_retried_on_next_call() {
    let net = network();
    let mut mesh = node(&net);

    net.fail_next(LoopbackFault::Bind, libc::EADDRINUSE);
    let err = mesh.publish("temp/a", "1").unwrap_err();
    assert!(matches!(
        err,
        Error::Init {
            stage: InitStage::Bind,
            ..
        }
    ));
    assert_eq!(err.raw_os_error(), Some(libc::EADDRINUSE));
    assert!(!mesh.is_active());
    assert_eq!(mesh.poll().unwrap(), PollOutcome::Inactive);
    assert_eq!(net.open_sockets(), 0);

    mesh.publish("temp/a", "1").unwrap();
    assert!(mesh.is_active());
}

#[test]
fn test_missing_interface_aborts_init() {
    let net = LoopbackNetwork::new();
    let mut mesh = node(&net);
    let err = mesh.publish("temp/a", "1").unwrap_err();
    assert!(matches!(
        err,
        Error::Init {
            stage: InitStage::ResolveInterface,
            ..
        }
    ));
}

#[test]
fn test_send_failure_keeps_session() {
    let net = network();
    let mut mesh = node(&net);
    mesh.subscribe("x", EventHandler::new(|_, _| {})).unwrap();

    net.fail_next(LoopbackFault::Send, libc::ENETUNREACH);
    let err = mesh.publish("x", "1").unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
    assert_eq!(err.raw_os_error(), Some(libc::ENETUNREACH));
    assert!(mesh.is_active());

    mesh.publish("x", "2").unwrap();
    assert_eq!(mesh.poll().unwrap(), PollOutcome::Dispatched(1));
}

#[test]
fn test_oversize_and_nul_rejected_before_send() {
    let net = network();
    let mut mesh = node(&net);
    mesh.publish("warmup", "").unwrap();
    let before = net.datagrams_sent();

    let big = "x".repeat(1300);
    assert!(matches!(
        mesh.publish("t", &big),
        Err(Error::FrameTooLarge { .. })
    ));
    assert!(matches!(mesh.publish("a\0b", "c"), Err(Error::EmbeddedNul)));
    assert_eq!(net.datagrams_sent(), before);
}

#[test]
fn test_shutdown_leaves_group() {
    let net = network();
    let group: Ipv6Addr = "ff03::1:1001".parse().unwrap();
    let mut a = node(&net);
    let mut b = node(&net);
    a.publish("x", "1").unwrap();
    b.subscribe("x", EventHandler::new(|_, _| {})).unwrap();
    assert_eq!(net.group_members(&group), 2);

    b.shutdown();
    assert_eq!(net.group_members(&group), 1);
    assert_eq!(b.poll().unwrap(), PollOutcome::Inactive);

    drop(a);
    assert_eq!(net.group_members(&group), 0);
    assert_eq!(net.open_sockets(), 0);
}

#[test]
fn test_nodes_on_other_group_do_not_hear() {
    let net = network();
    let mut a = node(&net);
    let mut b: Node = MeshPublish::with_transport(
        MeshConfig::default().group("ff03::1:2002"),
        net.clone(),
        net.clone(),
    );
    b.subscribe("", EventHandler::new(|_, _| {})).unwrap();
    a.publish("x", "1").unwrap();
    assert_eq!(b.poll().unwrap(), PollOutcome::NoData);
}

#[test]
fn test_local_address_selection() {
    let net = LoopbackNetwork::new();
    let th1 = net.add_interface("th1");
    let rloc: Ipv6Addr = "fd00:db8::ff:fe00:1c00".parse().unwrap();
    net.add_address(
        th1,
        InterfaceAddress::v6("fe80::1c00".parse().unwrap(), th1, AddressState::Preferred),
    );
    net.add_address(th1, InterfaceAddress::v6(rloc, th1, AddressState::Preferred));

    let mesh = node(&net);
    assert_eq!(mesh.local_address(), rloc);

    let bare = network();
    assert_eq!(node(&bare).local_address(), Ipv6Addr::UNSPECIFIED);
}

#[test]
fn test_shared_facade_across_threads() {
    let net = network();
    let mesh = Arc::new(Mutex::new(node(&net)));
    let log: Log = Arc::default();

    mesh.lock().subscribe("evt/", recorder(&log, "main")).unwrap();

    let publishers: Vec<_> = (0..4)
        .map(|i| {
            let mesh = Arc::clone(&mesh);
            thread::spawn(move || {
                for j in 0..5 {
                    mesh.lock()
                        .publish(&format!("evt/{}", i), &j.to_string())
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in publishers {
        handle.join().unwrap();
    }

    let outcomes = drain(&mut mesh.lock());
    assert_eq!(outcomes.len(), 20);
    assert_eq!(log.lock().len(), 20);
}

#[test]
fn test_bad_datagram_does_not_stop_polling() {
    let mut net = network();
    let mut mesh = node(&net);
    let log: Log = Arc::default();
    mesh.subscribe("temp/", recorder(&log, "A")).unwrap();

    let mut peer = net.create().unwrap();
    peer.bind(0, 1).unwrap();
    let dest = std::net::SocketAddrV6::new("ff03::1:1001".parse().unwrap(), 36969, 0, 1);
    let mut oversize = b"temp/big\0".to_vec();
    oversize.extend(std::iter::repeat(b'd').take(1500));
    oversize.push(0);
    peer.send_to(&oversize, dest).unwrap();
    peer.send_to(b"temp/cut\0no terminator", dest).unwrap();
    peer.send_to(b"temp/ok\x001\0", dest).unwrap();

    assert!(matches!(mesh.poll(), Err(Error::MalformedFrame)));
    assert!(matches!(mesh.poll(), Err(Error::MalformedFrame)));
    assert_eq!(mesh.poll().unwrap(), PollOutcome::Dispatched(1));
    assert!(mesh.is_active());
    assert_eq!(log.lock()[0].1, "temp/ok");
    assert_eq!(log.lock()[0].2, "1");
}
