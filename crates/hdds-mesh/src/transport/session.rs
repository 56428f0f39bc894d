// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Multicast session lifecycle.
//!
//! ```text
//!                ensure_initialized()
//! Uninitialized ----------------------> Active
//!       ^                                  |
//!       +---------- teardown() / drop -----+
//! ```
//!
//! The socket exists only in the `Active` state, and is always bound and
//! joined there. A failed initialization drops whatever it had acquired and
//! leaves the session `Uninitialized`, so the next call simply retries.
//!
//! The receive buffer is one byte longer than [`MAX_PACKET_LEN`]: a read
//! that fills it came from an oversize datagram the socket cut short.

use crate::config::{MeshConfig, MAX_PACKET_LEN, RECV_QUEUE_DATAGRAMS};
use crate::error::{Error, InitStage, Result};
use crate::frame::{self, Frame};
use crate::transport::{InterfaceQuery, MulticastSocket, SocketFactory};
use std::io;
use std::net::SocketAddrV6;

enum SessionState<S> {
    Uninitialized,
    Active { socket: S, interface_index: u32 },
}

/// Lazily created multicast socket plus its framing buffers.
pub struct MulticastSession<F: SocketFactory, Q: InterfaceQuery> {
    config: MeshConfig,
    factory: F,
    interfaces: Q,
    state: SessionState<F::Socket>,
    rx_buf: Box<[u8]>,
    tx_buf: Vec<u8>,
}

fn init_error(stage: InitStage) -> impl FnOnce(io::Error) -> Error {
    move |source| {
        log::debug!("[mesh] session init failed at {}: {}", stage, source);
        Error::Init { stage, source }
    }
}

impl<F: SocketFactory, Q: InterfaceQuery> MulticastSession<F, Q> {
    /// Create an uninitialized session. No network resources are touched.
    pub fn new(config: MeshConfig, factory: F, interfaces: Q) -> Self {
        Self {
            config,
            factory,
            interfaces,
            state: SessionState::Uninitialized,
            rx_buf: vec![0u8; MAX_PACKET_LEN + 1].into_boxed_slice(),
            tx_buf: Vec::with_capacity(MAX_PACKET_LEN),
        }
    }

    /// `true` while the socket is bound and joined.
    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Active { .. })
    }

    /// Interface index resolved at initialization, if active.
    pub fn interface_index(&self) -> Option<u32> {
        match self.state {
            SessionState::Active {
                interface_index, ..
            } => Some(interface_index),
            SessionState::Uninitialized => None,
        }
    }

    /// Configuration the session was created with.
    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    /// Interface query collaborator, shared with address lookups.
    pub fn interfaces(&self) -> &Q {
        &self.interfaces
    }

    /// Bring the session up if it is not already.
    ///
    /// Steps: resolve interface, create socket, reserve room for
    /// [`RECV_QUEUE_DATAGRAMS`] full-size datagrams in the receive queue, bind,
    /// parse group, join. The first failing step's I/O error is returned
    /// as-is inside [`Error::Init`].
    pub fn ensure_initialized(&mut self) -> Result<()> {
        if self.is_active() {
            return Ok(());
        }

        let interface_index = self
            .interfaces
            .index_by_name(&self.config.interface)
            .map_err(init_error(InitStage::ResolveInterface))?;

        let mut socket = self
            .factory
            .create()
            .map_err(init_error(InitStage::CreateSocket))?;
        socket
            .set_recv_buffer_size(RECV_QUEUE_DATAGRAMS * MAX_PACKET_LEN)
            .map_err(init_error(InitStage::ConfigureBuffer))?;
        socket
            .bind(self.config.port, interface_index)
            .map_err(init_error(InitStage::Bind))?;
        let group = self
            .config
            .multicast_group()
            .map_err(init_error(InitStage::GroupAddress))?;
        socket
            .join_multicast(&group, interface_index)
            .map_err(init_error(InitStage::JoinGroup))?;

        log::info!(
            "[mesh] session active iface={} (#{}) group=[{}]:{}",
            self.config.interface,
            interface_index,
            group,
            self.config.port
        );
        self.state = SessionState::Active {
            socket,
            interface_index,
        };
        Ok(())
    }

    /// Leave the group and release the socket. No-op when uninitialized.
    ///
    /// Leaving is best effort: a failure is logged and the socket is
    /// released anyway.
    pub fn teardown(&mut self) {
        let SessionState::Active {
            mut socket,
            interface_index,
        } = std::mem::replace(&mut self.state, SessionState::Uninitialized)
        else {
            return;
        };

        match self.config.multicast_group() {
            Ok(group) => {
                if let Err(e) = socket.leave_multicast(&group, interface_index) {
                    log::debug!("[mesh] leave_multicast_v6({}) failed: {}", group, e);
                }
            }
            Err(e) => log::debug!("[mesh] cannot leave group: {}", e),
        }
        drop(socket);
        log::info!("[mesh] session closed");
    }

    /// Send `(topic, data)` as one datagram to the group.
    pub fn send(&mut self, topic: &str, data: &str) -> Result<()> {
        let SessionState::Active {
            socket,
            interface_index,
        } = &mut self.state
        else {
            return Err(Error::NotInitialized);
        };

        let group = self.config.multicast_group().map_err(Error::Transport)?;
        let dest = SocketAddrV6::new(group, self.config.port, 0, *interface_index);

        self.tx_buf.clear();
        frame::encode_into(topic, data, &mut self.tx_buf)?;

        let sent = socket
            .send_to(&self.tx_buf, dest)
            .map_err(Error::Transport)?;
        if sent != self.tx_buf.len() {
            return Err(Error::Transport(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short datagram write: {} of {} bytes", sent, self.tx_buf.len()),
            )));
        }

        log::trace!("[mesh] sent '{}' ({} bytes) -> {}", topic, sent, dest);
        Ok(())
    }

    /// Read at most one pending datagram.
    ///
    /// `Ok(None)` when nothing is waiting. Empty datagrams carry no event and
    /// also yield `Ok(None)`. A datagram longer than [`MAX_PACKET_LEN`], or
    /// one that is not two NUL-terminated strings, yields
    /// [`Error::MalformedFrame`]; the next call reads the next datagram.
    pub fn receive(&mut self) -> Result<Option<Frame<'_>>> {
        let SessionState::Active { socket, .. } = &mut self.state else {
            return Err(Error::NotInitialized);
        };

        let len = match socket.try_recv(&mut self.rx_buf).map_err(Error::Transport)? {
            None | Some(0) => return Ok(None),
            Some(len) => len,
        };
        if len > MAX_PACKET_LEN {
            log::debug!("[mesh] dropping datagram over {} bytes", MAX_PACKET_LEN);
            return Err(Error::MalformedFrame);
        }
        log::trace!("[mesh] parse packet {}", len);

        frame::decode(&self.rx_buf[..len]).map(Some)
    }
}

impl<F: SocketFactory, Q: InterfaceQuery> Drop for MulticastSession<F, Q> {
    fn drop(&mut self) {
        self.teardown();
    }
}
