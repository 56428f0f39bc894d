// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for mesh publish/subscribe.

use std::fmt;
use std::io;

/// Result type for mesh operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Step of multicast session setup that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStage {
    /// Resolving the mesh interface index from its name.
    ResolveInterface,
    /// Creating the UDP socket.
    CreateSocket,
    /// Sizing the receive buffer.
    ConfigureBuffer,
    /// Binding to the mesh port on the interface.
    Bind,
    /// Parsing the multicast group literal.
    GroupAddress,
    /// Joining the multicast group.
    JoinGroup,
}

impl fmt::Display for InitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InitStage::ResolveInterface => "resolve interface",
            InitStage::CreateSocket => "create socket",
            InitStage::ConfigureBuffer => "configure buffer",
            InitStage::Bind => "bind",
            InitStage::GroupAddress => "group address",
            InitStage::JoinGroup => "join group",
        };
        f.write_str(name)
    }
}

/// Errors returned by mesh publish/subscribe operations.
///
/// I/O failures carry the underlying [`io::Error`] untouched so callers can
/// inspect the platform code with [`Error::raw_os_error`].
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Registry Errors
    // ========================================================================
    /// Every handler slot is occupied.
    NoMemory,

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Send/receive attempted without an active multicast session.
    NotInitialized,
    /// Multicast session setup failed at `stage`.
    Init {
        /// Setup step that failed.
        stage: InitStage,
        /// Underlying cause.
        source: io::Error,
    },
    /// Socket send or receive failed.
    Transport(io::Error),

    // ========================================================================
    // Frame Errors
    // ========================================================================
    /// Received datagram has no topic terminator or is not valid UTF-8.
    MalformedFrame,
    /// Topic or data contains a NUL byte, which the frame format cannot carry.
    EmbeddedNul,
    /// Encoded frame exceeds the maximum datagram length.
    FrameTooLarge {
        /// Encoded length in bytes.
        len: usize,
        /// Maximum allowed length.
        max: usize,
    },
}

impl Error {
    /// Platform error code of the underlying I/O failure, if any.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Error::Init { source, .. } => source.raw_os_error(),
            Error::Transport(e) => e.raw_os_error(),
            _ => None,
        }
    }

    /// `true` for failures that happened while bringing the session up.
    pub fn is_init_failure(&self) -> bool {
        matches!(self, Error::Init { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NoMemory => write!(f, "No free subscription slot"),
            Error::NotInitialized => write!(f, "Multicast session not initialized"),
            Error::Init { stage, source } => {
                write!(f, "Multicast session init failed ({}): {}", stage, source)
            }
            Error::Transport(e) => write!(f, "Transport error: {}", e),
            Error::MalformedFrame => write!(f, "Malformed frame"),
            Error::EmbeddedNul => write!(f, "Topic or data contains a NUL byte"),
            Error::FrameTooLarge { len, max } => {
                write!(f, "Frame too large: {} bytes (max: {})", len, max)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Init { source, .. } => Some(source),
            Error::Transport(e) => Some(e),
            _ => None,
        }
    }
}
