// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport layer for mesh publish/subscribe.
//!
//! The session logic talks to the network through three narrow traits so the
//! same code runs over real sockets, over the in-process loopback bus, or on
//! a platform with its own UDP stack.
//!
//! # Modules
//!
//! - `session` - Uninitialized/Active lifecycle, framing on send/receive
//! - `udp` - `socket2`-backed IPv6 multicast socket
//! - `netif` - Interface index and address queries against the host OS
//! - `loopback` - In-process multicast bus for tests and simulation
//!
//! # Example
//!
//! ```no_run
//! use hdds_mesh::config::MeshConfig;
//! use hdds_mesh::transport::{MulticastSession, SystemInterfaces, UdpSocketFactory};
//!
//! let config = MeshConfig::default().interface("eth0");
//! let mut session = MulticastSession::new(config, UdpSocketFactory::default(), SystemInterfaces);
//! session.ensure_initialized().unwrap();
//! session.send("temp/room1", "21.5").unwrap();
//! ```

use std::io;
use std::net::{IpAddr, Ipv6Addr, SocketAddrV6};

/// In-process multicast bus.
pub mod loopback;
/// Host interface queries.
pub mod netif;
/// Multicast session lifecycle.
pub mod session;
/// `socket2` UDP multicast socket.
pub mod udp;

pub use loopback::{LoopbackFault, LoopbackNetwork, LoopbackSocket};
pub use netif::SystemInterfaces;
pub use session::MulticastSession;
pub use udp::{UdpMulticastSocket, UdpSocketFactory};

/// UDP socket primitive consumed by the session.
///
/// Receives are non-blocking: `Ok(None)` means nothing is pending.
pub trait MulticastSocket {
    /// Reserve at least `size` bytes of receive queue.
    ///
    /// A larger platform default is kept; the queue is never shrunk.
    fn set_recv_buffer_size(&mut self, size: usize) -> io::Result<()>;

    /// Bind to `port` and route multicast through `interface_index`.
    fn bind(&mut self, port: u16, interface_index: u32) -> io::Result<()>;

    /// Join `group` on `interface_index`.
    fn join_multicast(&mut self, group: &Ipv6Addr, interface_index: u32) -> io::Result<()>;

    /// Leave `group` on `interface_index`.
    fn leave_multicast(&mut self, group: &Ipv6Addr, interface_index: u32) -> io::Result<()>;

    /// Send one datagram. Returns the number of bytes written.
    fn send_to(&mut self, packet: &[u8], dest: SocketAddrV6) -> io::Result<usize>;

    /// Read one pending datagram into `buf`, truncating if it does not fit.
    fn try_recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>>;
}

/// Creates fresh, unbound sockets for a session.
pub trait SocketFactory {
    /// Socket type produced.
    type Socket: MulticastSocket;

    /// Create a socket.
    fn create(&mut self) -> io::Result<Self::Socket>;
}

/// Address state as tracked by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressState {
    /// Duplicate address detection has not completed.
    Tentative,
    /// Valid and preferred for new traffic.
    Preferred,
    /// Still valid, but should not be used for new traffic.
    Deprecated,
}

/// One address record of a network interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceAddress {
    /// The address (family is carried by the variant).
    pub addr: IpAddr,
    /// Zone/scope identifier; 0 when unscoped.
    pub scope_id: u32,
    /// Platform address state.
    pub state: AddressState,
}

impl InterfaceAddress {
    /// IPv6 record helper.
    pub const fn v6(addr: Ipv6Addr, scope_id: u32, state: AddressState) -> Self {
        Self {
            addr: IpAddr::V6(addr),
            scope_id,
            state,
        }
    }

    /// `true` for `fe80::/10`.
    pub fn is_link_local(&self) -> bool {
        match self.addr {
            IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) == 0xfe80,
            IpAddr::V4(v4) => v4.is_link_local(),
        }
    }

    /// `true` when the address is usable as a source (not tentative or
    /// deprecated).
    pub fn is_preferred(&self) -> bool {
        self.state == AddressState::Preferred
    }
}

/// Interface lookups consumed by the session and the facade.
pub trait InterfaceQuery {
    /// Resolve an interface index from its name.
    fn index_by_name(&self, name: &str) -> io::Result<u32>;

    /// All address records on the interface.
    fn addresses(&self, interface_index: u32) -> io::Result<Vec<InterfaceAddress>>;
}
