// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Mesh publish/subscribe configuration.
//!
//! - **Static**: compile-time constants (group literal, port, slot sizes)
//! - **Dynamic**: [`MeshConfig`], seeded from the constants and optionally
//!   overridden from the environment
//!
//! # Environment Variables
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `HDDS_MESH_IFACE` | Mesh interface name (default `th1`) |
//! | `HDDS_MESH_GROUP` | IPv6 multicast group literal (default `ff03::1:1001`) |
//! | `HDDS_MESH_PORT` | UDP port (default 36969) |
//! | `HDDS_MESH_HOPS` | Multicast hop limit (default 255) |

use std::io;
use std::net::Ipv6Addr;

/// Multicast group every mesh node joins (realm-local scope).
pub const MULTICAST_ADDR: &str = "ff03::1:1001";

/// UDP port for mesh publish traffic.
pub const PORT: u16 = 36969;

/// Name of the mesh (Thread) network interface.
pub const MESH_INTERFACE: &str = "th1";

/// Maximum datagram length, sized to the IPv6 minimum MTU minus headers.
pub const MAX_PACKET_LEN: usize = 1232;

/// Full-size datagrams the kernel receive queue must hold between two polls.
pub const RECV_QUEUE_DATAGRAMS: usize = 32;

/// Default multicast hop limit. Realm-local scope already bounds propagation.
pub const DEFAULT_MULTICAST_HOPS: u32 = 255;

/// Bytes available to a subscription filter.
pub const FILTER_CAPACITY: usize = 64;

/// Bytes in the device id buffer, including the terminator.
pub const DEVICE_ID_CAPACITY: usize = 25;

/// Default number of subscription slots.
pub const MAX_SUBSCRIPTIONS: usize = 5;

/// Runtime configuration for a mesh publish session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshConfig {
    /// Interface the session binds to and joins on.
    pub interface: String,
    /// Multicast group literal. Parsed on every use, never cached.
    pub group: String,
    /// UDP port for bind and destination.
    pub port: u16,
    /// Multicast hop limit for outbound datagrams.
    pub multicast_hops: u32,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            interface: MESH_INTERFACE.to_string(),
            group: MULTICAST_ADDR.to_string(),
            port: PORT,
            multicast_hops: DEFAULT_MULTICAST_HOPS,
        }
    }
}

impl MeshConfig {
    /// Set the mesh interface name.
    #[must_use]
    pub fn interface(mut self, name: impl Into<String>) -> Self {
        self.interface = name.into();
        self
    }

    /// Set the multicast group literal.
    #[must_use]
    pub fn group(mut self, literal: impl Into<String>) -> Self {
        self.group = literal.into();
        self
    }

    /// Set the UDP port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the multicast hop limit.
    #[must_use]
    pub fn multicast_hops(mut self, hops: u32) -> Self {
        self.multicast_hops = hops;
        self
    }

    /// Create from defaults plus `HDDS_MESH_*` environment overrides.
    ///
    /// Unparseable values are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(name) = std::env::var("HDDS_MESH_IFACE") {
            if !name.is_empty() {
                config.interface = name;
            }
        }

        if let Ok(group) = std::env::var("HDDS_MESH_GROUP") {
            match group.parse::<Ipv6Addr>() {
                Ok(addr) if addr.is_multicast() => config.group = group,
                _ => log::debug!("[mesh] ignoring invalid HDDS_MESH_GROUP='{}'", group),
            }
        }

        if let Ok(val) = std::env::var("HDDS_MESH_PORT") {
            match val.parse::<u16>() {
                Ok(port) if port != 0 => config.port = port,
                _ => log::debug!("[mesh] ignoring invalid HDDS_MESH_PORT='{}'", val),
            }
        }

        if let Ok(val) = std::env::var("HDDS_MESH_HOPS") {
            match val.parse::<u32>() {
                Ok(hops) if hops <= 255 => config.multicast_hops = hops,
                _ => log::debug!("[mesh] ignoring invalid HDDS_MESH_HOPS='{}'", val),
            }
        }

        config
    }

    /// Parse the configured multicast group.
    ///
    /// Fails with `InvalidInput` if the literal is not an IPv6 multicast address.
    pub fn multicast_group(&self) -> io::Result<Ipv6Addr> {
        let addr: Ipv6Addr = self.group.parse().map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid IPv6 literal '{}'", self.group),
            )
        })?;
        if !addr.is_multicast() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("'{}' is not a multicast address", self.group),
            ));
        }
        Ok(addr)
    }
}
