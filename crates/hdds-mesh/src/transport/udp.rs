// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP socket for IPv6 mesh multicast.
//!
//! Sockets are created non-blocking with `SO_REUSEADDR`, so several
//! processes on one node can bind the mesh port and each receive a copy of
//! every group datagram. Multicast loopback stays enabled: a node sees its
//! own publications, as peers do.
//!
//! On Linux `IPV6_MULTICAST_ALL` is cleared, so a socket only receives the
//! groups it joined itself, not every group joined on the host for its port.

use crate::config::DEFAULT_MULTICAST_HOPS;
use crate::transport::{MulticastSocket, SocketFactory};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::{self, Read};
use std::net::{Ipv6Addr, SocketAddrV6};

/// IPv6 UDP socket backed by `socket2`.
#[derive(Debug)]
pub struct UdpMulticastSocket {
    socket: Socket,
}

impl UdpMulticastSocket {
    /// Create an unbound, non-blocking IPv6 UDP socket.
    pub fn new(multicast_hops: u32) -> io::Result<Self> {
        let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_only_v6(true)?;
        socket.set_nonblocking(true)?;
        socket.set_multicast_loop_v6(true)?;
        socket.set_multicast_hops_v6(multicast_hops)?;
        #[cfg(target_os = "linux")]
        if let Err(e) = socket.set_multicast_all_v6(false) {
            // Kernels before 4.20 lack the option
            log::debug!("[mesh/udp] IPV6_MULTICAST_ALL not cleared: {}", e);
        }
        Ok(Self { socket })
    }

    /// Local address once bound.
    pub fn local_addr(&self) -> io::Result<SocketAddrV6> {
        self.socket
            .local_addr()?
            .as_socket_ipv6()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "socket is not IPv6"))
    }
}

impl MulticastSocket for UdpMulticastSocket {
    fn set_recv_buffer_size(&mut self, size: usize) -> io::Result<()> {
        let current = self.socket.recv_buffer_size()?;
        if current >= size {
            return Ok(());
        }
        self.socket.set_recv_buffer_size(size)?;
        log::debug!(
            "[mesh/udp] SO_RCVBUF {} -> {} bytes",
            current,
            self.socket.recv_buffer_size()?
        );
        Ok(())
    }

    fn bind(&mut self, port: u16, interface_index: u32) -> io::Result<()> {
        if interface_index != 0 {
            self.socket.set_multicast_if_v6(interface_index)?;
        }
        let addr = SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, port, 0, 0);
        self.socket.bind(&SockAddr::from(addr))?;
        log::debug!(
            "[mesh/udp] bind [::]:{} multicast_if={}",
            port,
            interface_index
        );
        Ok(())
    }

    fn join_multicast(&mut self, group: &Ipv6Addr, interface_index: u32) -> io::Result<()> {
        self.socket.join_multicast_v6(group, interface_index)?;
        log::debug!(
            "[mesh/udp] join_multicast_v6({}) on if={}",
            group,
            interface_index
        );
        Ok(())
    }

    fn leave_multicast(&mut self, group: &Ipv6Addr, interface_index: u32) -> io::Result<()> {
        self.socket.leave_multicast_v6(group, interface_index)
    }

    fn send_to(&mut self, packet: &[u8], dest: SocketAddrV6) -> io::Result<usize> {
        self.socket.send_to(packet, &SockAddr::from(dest))
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        match self.socket.read(buf) {
            Ok(n) => Ok(Some(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Creates [`UdpMulticastSocket`]s with a fixed hop limit.
#[derive(Debug, Clone, Copy)]
pub struct UdpSocketFactory {
    multicast_hops: u32,
}

impl UdpSocketFactory {
    /// Factory whose sockets send with `multicast_hops` as hop limit.
    pub const fn new(multicast_hops: u32) -> Self {
        Self { multicast_hops }
    }
}

impl Default for UdpSocketFactory {
    fn default() -> Self {
        Self::new(DEFAULT_MULTICAST_HOPS)
    }
}

impl SocketFactory for UdpSocketFactory {
    type Socket = UdpMulticastSocket;

    fn create(&mut self) -> io::Result<UdpMulticastSocket> {
        UdpMulticastSocket::new(self.multicast_hops)
    }
}
