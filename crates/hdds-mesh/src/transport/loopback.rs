// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process multicast bus.
//!
//! [`LoopbackNetwork`] is both a [`SocketFactory`] and an [`InterfaceQuery`],
//! so several sessions can be wired together without touching the host
//! network. Every datagram sent to `group:port` is copied into the inbox of
//! each socket bound to `port` that joined `group`, the sender included
//! (multicast loop on, as with real sockets). A socket's inbox holds at
//! most its receive buffer size in bytes; datagrams that do not fit are
//! dropped, as a full kernel queue drops them.
//!
//! One-shot faults can be armed per operation to exercise error paths.

use crate::transport::{InterfaceAddress, InterfaceQuery, MulticastSocket, SocketFactory};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::{Ipv6Addr, SocketAddrV6};
use std::sync::Arc;

/// Operation a one-shot fault applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopbackFault {
    /// `SocketFactory::create`
    Create,
    /// `MulticastSocket::set_recv_buffer_size`
    Buffer,
    /// `MulticastSocket::bind`
    Bind,
    /// `MulticastSocket::join_multicast`
    Join,
    /// `MulticastSocket::leave_multicast`
    Leave,
    /// `MulticastSocket::send_to`
    Send,
    /// `MulticastSocket::try_recv`
    Recv,
}

#[derive(Debug, Default)]
struct Member {
    port: Option<u16>,
    interface_index: u32,
    recv_buffer: Option<usize>,
    groups: Vec<Ipv6Addr>,
    inbox: VecDeque<Vec<u8>>,
    queued_bytes: usize,
    dropped: u64,
}

impl Member {
    fn enqueue(&mut self, packet: &[u8]) {
        if let Some(cap) = self.recv_buffer {
            if self.queued_bytes + packet.len() > cap {
                self.dropped += 1;
                return;
            }
        }
        self.queued_bytes += packet.len();
        self.inbox.push_back(packet.to_vec());
    }
}

#[derive(Debug)]
struct NetInterface {
    name: String,
    addresses: Vec<InterfaceAddress>,
}

#[derive(Debug, Default)]
struct Bus {
    next_socket_id: u64,
    members: HashMap<u64, Member>,
    interfaces: Vec<NetInterface>,
    faults: HashMap<LoopbackFault, i32>,
    datagrams_sent: u64,
}

impl Bus {
    fn take_fault(&mut self, op: LoopbackFault) -> io::Result<()> {
        match self.faults.remove(&op) {
            Some(code) => Err(io::Error::from_raw_os_error(code)),
            None => Ok(()),
        }
    }

    fn has_interface(&self, index: u32) -> bool {
        index >= 1 && (index as usize) <= self.interfaces.len()
    }
}

/// Shared in-process network. Clones refer to the same bus.
#[derive(Debug, Clone, Default)]
pub struct LoopbackNetwork {
    bus: Arc<Mutex<Bus>>,
}

impl LoopbackNetwork {
    /// Create an empty network with no interfaces.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an interface and return its index (1-based, in creation order).
    pub fn add_interface(&self, name: &str) -> u32 {
        let mut bus = self.bus.lock();
        bus.interfaces.push(NetInterface {
            name: name.to_string(),
            addresses: Vec::new(),
        });
        bus.interfaces.len() as u32
    }

    /// Attach an address record to interface `index`.
    pub fn add_address(&self, index: u32, address: InterfaceAddress) {
        let mut bus = self.bus.lock();
        if let Some(iface) = bus.interfaces.get_mut((index as usize).wrapping_sub(1)) {
            iface.addresses.push(address);
        }
    }

    /// Make the next `op` fail with OS error `code`.
    pub fn fail_next(&self, op: LoopbackFault, code: i32) {
        self.bus.lock().faults.insert(op, code);
    }

    /// Number of sockets currently alive.
    pub fn open_sockets(&self) -> usize {
        self.bus.lock().members.len()
    }

    /// Number of live sockets joined to `group`.
    pub fn group_members(&self, group: &Ipv6Addr) -> usize {
        self.bus
            .lock()
            .members
            .values()
            .filter(|m| m.groups.contains(group))
            .count()
    }

    /// Total datagrams accepted for delivery.
    pub fn datagrams_sent(&self) -> u64 {
        self.bus.lock().datagrams_sent
    }

    /// Datagrams dropped because a receiver's queue was full.
    pub fn datagrams_dropped(&self) -> u64 {
        self.bus.lock().members.values().map(|m| m.dropped).sum()
    }
}

impl SocketFactory for LoopbackNetwork {
    type Socket = LoopbackSocket;

    fn create(&mut self) -> io::Result<LoopbackSocket> {
        let mut bus = self.bus.lock();
        bus.take_fault(LoopbackFault::Create)?;
        let id = bus.next_socket_id;
        bus.next_socket_id += 1;
        bus.members.insert(id, Member::default());
        Ok(LoopbackSocket {
            id,
            bus: Arc::clone(&self.bus),
        })
    }
}

impl InterfaceQuery for LoopbackNetwork {
    fn index_by_name(&self, name: &str) -> io::Result<u32> {
        let bus = self.bus.lock();
        bus.interfaces
            .iter()
            .position(|iface| iface.name == name)
            .map(|pos| pos as u32 + 1)
            .ok_or_else(|| io::Error::from_raw_os_error(libc::ENODEV))
    }

    fn addresses(&self, interface_index: u32) -> io::Result<Vec<InterfaceAddress>> {
        let bus = self.bus.lock();
        if !bus.has_interface(interface_index) {
            return Err(io::Error::from_raw_os_error(libc::ENODEV));
        }
        Ok(bus.interfaces[interface_index as usize - 1].addresses.clone())
    }
}

/// Socket handle on a [`LoopbackNetwork`]. Dropping it leaves all groups.
#[derive(Debug)]
pub struct LoopbackSocket {
    id: u64,
    bus: Arc<Mutex<Bus>>,
}

impl LoopbackSocket {
    fn with_member<T>(
        &self,
        op: LoopbackFault,
        f: impl FnOnce(&mut Member) -> io::Result<T>,
    ) -> io::Result<T> {
        let mut bus = self.bus.lock();
        bus.take_fault(op)?;
        let member = bus
            .members
            .get_mut(&self.id)
            .ok_or_else(|| io::Error::from_raw_os_error(libc::EBADF))?;
        f(member)
    }
}

impl MulticastSocket for LoopbackSocket {
    fn set_recv_buffer_size(&mut self, size: usize) -> io::Result<()> {
        self.with_member(LoopbackFault::Buffer, |m| {
            m.recv_buffer = Some(m.recv_buffer.map_or(size, |cur| cur.max(size)));
            Ok(())
        })
    }

    fn bind(&mut self, port: u16, interface_index: u32) -> io::Result<()> {
        let mut bus = self.bus.lock();
        bus.take_fault(LoopbackFault::Bind)?;
        if interface_index != 0 && !bus.has_interface(interface_index) {
            return Err(io::Error::from_raw_os_error(libc::ENODEV));
        }
        let member = bus
            .members
            .get_mut(&self.id)
            .ok_or_else(|| io::Error::from_raw_os_error(libc::EBADF))?;
        if member.port.is_some() {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        member.port = Some(port);
        member.interface_index = interface_index;
        Ok(())
    }

    fn join_multicast(&mut self, group: &Ipv6Addr, _interface_index: u32) -> io::Result<()> {
        self.with_member(LoopbackFault::Join, |m| {
            if !group.is_multicast() {
                return Err(io::Error::from_raw_os_error(libc::EINVAL));
            }
            if m.groups.contains(group) {
                return Err(io::Error::from_raw_os_error(libc::EADDRINUSE));
            }
            m.groups.push(*group);
            Ok(())
        })
    }

    fn leave_multicast(&mut self, group: &Ipv6Addr, _interface_index: u32) -> io::Result<()> {
        self.with_member(LoopbackFault::Leave, |m| {
            let before = m.groups.len();
            m.groups.retain(|g| g != group);
            if m.groups.len() == before {
                return Err(io::Error::from_raw_os_error(libc::EADDRNOTAVAIL));
            }
            Ok(())
        })
    }

    fn send_to(&mut self, packet: &[u8], dest: SocketAddrV6) -> io::Result<usize> {
        let mut bus = self.bus.lock();
        bus.take_fault(LoopbackFault::Send)?;
        for member in bus.members.values_mut() {
            if member.port == Some(dest.port()) && member.groups.contains(dest.ip()) {
                member.enqueue(packet);
            }
        }
        bus.datagrams_sent += 1;
        Ok(packet.len())
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        self.with_member(LoopbackFault::Recv, |m| {
            Ok(m.inbox.pop_front().map(|datagram| {
                m.queued_bytes -= datagram.len();
                let n = datagram.len().min(buf.len());
                buf[..n].copy_from_slice(&datagram[..n]);
                n
            }))
        })
    }
}

impl Drop for LoopbackSocket {
    fn drop(&mut self) {
        self.bus.lock().members.remove(&self.id);
    }
}
