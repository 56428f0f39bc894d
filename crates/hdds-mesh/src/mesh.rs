// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Mesh publish/subscribe facade.
//!
//! [`MeshPublish`] ties a [`MulticastSession`] to a [`HandlerTable`]. The
//! session is brought up on the first `publish` or `subscribe`; `poll` reads
//! at most one datagram and never blocks.
//!
//! All operations take `&mut self` and are meant to run on the application's
//! main loop. Hosts that need the facade on several threads wrap the whole
//! value in one mutex.

use crate::config::{MeshConfig, MAX_SUBSCRIPTIONS};
use crate::error::Result;
use crate::subscriptions::{EventHandler, HandlerTable, SubscriptionScope};
use crate::transport::{
    InterfaceAddress, InterfaceQuery, MulticastSession, SocketFactory, SystemInterfaces,
    UdpSocketFactory,
};
use std::net::{IpAddr, Ipv6Addr};

/// Result of one [`MeshPublish::poll`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// No session yet (nothing published or subscribed); nothing was read.
    Inactive,
    /// Session active but no datagram was pending. Normal and frequent.
    NoData,
    /// A datagram was dispatched to this many handlers (possibly zero).
    Dispatched(usize),
}

/// Publish/subscribe endpoint on the mesh multicast group.
pub struct MeshPublish<
    F: SocketFactory = UdpSocketFactory,
    Q: InterfaceQuery = SystemInterfaces,
    const N: usize = MAX_SUBSCRIPTIONS,
> {
    session: MulticastSession<F, Q>,
    subscriptions: HandlerTable<N>,
}

impl MeshPublish {
    /// Endpoint on host sockets, configured from the environment.
    pub fn new() -> Self {
        let config = MeshConfig::from_env();
        let factory = UdpSocketFactory::new(config.multicast_hops);
        Self::with_transport(config, factory, SystemInterfaces)
    }

    /// Endpoint on host sockets with an explicit configuration.
    pub fn with_config(config: MeshConfig) -> Self {
        let factory = UdpSocketFactory::new(config.multicast_hops);
        Self::with_transport(config, factory, SystemInterfaces)
    }
}

impl Default for MeshPublish {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: SocketFactory, Q: InterfaceQuery, const N: usize> MeshPublish<F, Q, N> {
    /// Endpoint over caller-supplied socket and interface collaborators.
    pub fn with_transport(config: MeshConfig, factory: F, interfaces: Q) -> Self {
        Self {
            session: MulticastSession::new(config, factory, interfaces),
            subscriptions: HandlerTable::new(),
        }
    }

    /// Broadcast an event to every node in the group.
    ///
    /// Neither `topic` nor `data` may contain NUL bytes.
    pub fn publish(&mut self, topic: &str, data: &str) -> Result<()> {
        self.session.ensure_initialized()?;
        self.session.send(topic, data)
    }

    /// Register `handler` for events whose name starts with `prefix`.
    ///
    /// Uses [`SubscriptionScope::MyDevices`] and no device restriction.
    pub fn subscribe(&mut self, prefix: &str, handler: impl Into<EventHandler>) -> Result<()> {
        self.subscribe_scoped(prefix, handler, SubscriptionScope::MyDevices, None)
    }

    /// Register `handler` with an explicit scope and optional device id.
    ///
    /// The device id only takes part in duplicate detection.
    pub fn subscribe_scoped(
        &mut self,
        prefix: &str,
        handler: impl Into<EventHandler>,
        scope: SubscriptionScope,
        device_id: Option<&str>,
    ) -> Result<()> {
        self.session.ensure_initialized()?;
        self.subscriptions
            .add(prefix, handler.into(), scope, device_id)
            .map_err(|e| {
                log::warn!("[mesh] subscribe '{}' failed: {}", prefix, e);
                e
            })
    }

    /// Receive at most one datagram and dispatch it.
    ///
    /// An `Err` concerns that one datagram (a malformed or oversize frame
    /// from a peer, or a failed read); the session stays active and the next
    /// call reads the next datagram.
    pub fn poll(&mut self) -> Result<PollOutcome> {
        if !self.session.is_active() {
            return Ok(PollOutcome::Inactive);
        }

        match self.session.receive() {
            Ok(Some(frame)) => {
                let invoked = self.subscriptions.dispatch(frame.topic, frame.data);
                log::trace!(
                    "[mesh] event '{}' dispatched to {} handler(s)",
                    frame.topic,
                    invoked
                );
                Ok(PollOutcome::Dispatched(invoked))
            }
            Ok(None) => Ok(PollOutcome::NoData),
            Err(e) => {
                log::debug!("[mesh] poll failed: {}", e);
                Err(e)
            }
        }
    }

    /// Mesh-local IPv6 address of this node.
    ///
    /// First address on the mesh interface that is not link-local, is
    /// scoped, and is preferred. `::` when there is none or the interface
    /// cannot be queried.
    pub fn local_address(&self) -> Ipv6Addr {
        let interfaces = self.session.interfaces();
        let name = &self.session.config().interface;

        let addrs = match interfaces
            .index_by_name(name)
            .and_then(|index| interfaces.addresses(index))
        {
            Ok(addrs) => addrs,
            Err(e) => {
                log::debug!("[mesh] address query on {} failed: {}", name, e);
                return Ipv6Addr::UNSPECIFIED;
            }
        };
        select_local_address(&addrs)
    }

    /// Leave the group and release the socket. The next publish/subscribe
    /// brings the session back up; subscriptions are kept.
    pub fn shutdown(&mut self) {
        self.session.teardown();
    }

    /// `true` once publish or subscribe brought the session up, until
    /// [`shutdown`](Self::shutdown).
    pub fn is_active(&self) -> bool {
        self.session.is_active()
    }

    /// Registered subscriptions.
    pub fn subscriptions(&self) -> &HandlerTable<N> {
        &self.subscriptions
    }

    /// Interface, group, port and hop limit in use.
    pub fn config(&self) -> &MeshConfig {
        self.session.config()
    }
}

/// Periodic-loop entry point: one [`MeshPublish::poll`].
pub fn mesh_loop<F: SocketFactory, Q: InterfaceQuery, const N: usize>(
    mesh: &mut MeshPublish<F, Q, N>,
) -> Result<PollOutcome> {
    mesh.poll()
}

fn select_local_address(addrs: &[InterfaceAddress]) -> Ipv6Addr {
    addrs
        .iter()
        .find_map(|record| match record.addr {
            IpAddr::V6(v6)
                if !record.is_link_local() && record.scope_id != 0 && record.is_preferred() =>
            {
                Some(v6)
            }
            _ => None,
        })
        .unwrap_or(Ipv6Addr::UNSPECIFIED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::subscriptions::EventHandlerFn;
    use crate::transport::{AddressState, LoopbackFault, LoopbackNetwork};
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    type TestMesh = MeshPublish<LoopbackNetwork, LoopbackNetwork>;

    fn mesh_on(net: &LoopbackNetwork) -> TestMesh {
        MeshPublish::with_transport(MeshConfig::default(), net.clone(), net.clone())
    }

    fn network() -> LoopbackNetwork {
        let net = LoopbackNetwork::new();
        net.add_interface("th1");
        net
    }

    fn noop(_: &str, _: &str) {}

    #[test]
    fn test_poll_before_start_is_inactive() {
        let net = network();
        let mut mesh = mesh_on(&net);
        assert_eq!(mesh.poll().unwrap(), PollOutcome::Inactive);
        assert_eq!(net.open_sockets(), 0);
    }

    #[test]
    fn test_subscribe_starts_session() {
        let net = network();
        let mut mesh = mesh_on(&net);
        mesh.subscribe("temp/", noop as EventHandlerFn).unwrap();
        assert!(mesh.is_active());
        assert_eq!(mesh.subscriptions().len(), 1);
        assert_eq!(mesh.poll().unwrap(), PollOutcome::NoData);
    }

    #[test]
    fn test_subscribe_fails_when_session_cannot_start() {
        let net = network();
        let mut mesh = mesh_on(&net);
        net.fail_next(LoopbackFault::Join, libc::ENOBUFS);
        assert!(mesh.subscribe("temp/", noop as EventHandlerFn).unwrap_err().is_init_failure());
        assert!(mesh.subscriptions().is_empty());

        mesh.subscribe("temp/", noop as EventHandlerFn).unwrap();
        assert_eq!(mesh.subscriptions().len(), 1);
    }

    #[test]
    fn test_publish_dispatches_locally() {
        let net = network();
        let mut mesh = mesh_on(&net);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        mesh.subscribe(
            "temp/",
            EventHandler::new(move |event, data| {
                assert_eq!(event, "temp/a");
                assert_eq!(data, "1");
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();

        mesh.publish("temp/a", "1").unwrap();
        assert_eq!(mesh_loop(&mut mesh).unwrap(), PollOutcome::Dispatched(1));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(mesh.poll().unwrap(), PollOutcome::NoData);
    }

    #[test]
    fn test_unmatched_event_reports_zero_handlers() {
        let net = network();
        let mut mesh = mesh_on(&net);
        mesh.subscribe("hum/", noop as EventHandlerFn).unwrap();
        mesh.publish("temp/a", "1").unwrap();
        assert_eq!(mesh.poll().unwrap(), PollOutcome::Dispatched(0));
    }

    #[test]
    fn test_table_full_only_fails_that_subscription() {
        let net = network();
        let mut mesh = mesh_on(&net);
        for prefix in ["a", "b", "c", "d", "e"] {
            mesh.subscribe(prefix, noop as EventHandlerFn).unwrap();
        }
        assert!(matches!(
            mesh.subscribe("f", noop as EventHandlerFn),
            Err(Error::NoMemory)
        ));
        mesh.subscribe("a", noop as EventHandlerFn).unwrap();

        // Facade remains usable
        mesh.publish("a/x", "1").unwrap();
        assert_eq!(mesh.poll().unwrap(), PollOutcome::Dispatched(1));
    }

    #[test]
    fn test_shutdown_and_restart_keeps_subscriptions() {
        let net = network();
        let mut mesh = mesh_on(&net);
        mesh.subscribe("temp/", noop as EventHandlerFn).unwrap();
        mesh.shutdown();
        assert!(!mesh.is_active());
        assert_eq!(net.open_sockets(), 0);
        assert_eq!(mesh.poll().unwrap(), PollOutcome::Inactive);

        mesh.publish("temp/x", "y").unwrap();
        assert!(mesh.is_active());
        assert_eq!(mesh.poll().unwrap(), PollOutcome::Dispatched(1));
    }

    #[test]
    fn test_select_local_address() {
        let mesh_local: Ipv6Addr = "fd11:22::abcd".parse().unwrap();
        let addrs = [
            InterfaceAddress {
                addr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
                scope_id: 3,
                state: AddressState::Preferred,
            },
            InterfaceAddress::v6("fe80::1".parse().unwrap(), 3, AddressState::Preferred),
            InterfaceAddress::v6("fd11:22::1".parse().unwrap(), 0, AddressState::Preferred),
            InterfaceAddress::v6("fd11:22::2".parse().unwrap(), 3, AddressState::Deprecated),
            InterfaceAddress::v6("fd11:22::3".parse().unwrap(), 3, AddressState::Tentative),
            InterfaceAddress::v6(mesh_local, 3, AddressState::Preferred),
            InterfaceAddress::v6("fd11:22::ffff".parse().unwrap(), 3, AddressState::Preferred),
        ];
        assert_eq!(select_local_address(&addrs), mesh_local);
        assert_eq!(select_local_address(&addrs[..5]), Ipv6Addr::UNSPECIFIED);
        assert_eq!(select_local_address(&[]), Ipv6Addr::UNSPECIFIED);
    }

    #[test]
    fn test_local_address_via_interfaces() {
        let net = LoopbackNetwork::new();
        let th1 = net.add_interface("th1");
        let ml_eid: Ipv6Addr = "fd11:22:0:0:1234:5678:9abc:def0".parse().unwrap();
        net.add_address(th1, InterfaceAddress::v6("fe80::2".parse().unwrap(), th1, AddressState::Preferred));
        net.add_address(th1, InterfaceAddress::v6(ml_eid, th1, AddressState::Preferred));

        let mesh = mesh_on(&net);
        assert_eq!(mesh.local_address(), ml_eid);
        // Read-only: no session side effects
        assert!(!mesh.is_active());
        assert_eq!(net.open_sockets(), 0);
    }

    #[test]
    fn test_local_address_missing_interface() {
        let net = LoopbackNetwork::new();
        let mesh = mesh_on(&net);
        assert_eq!(mesh.local_address(), Ipv6Addr::UNSPECIFIED);
    }
}
