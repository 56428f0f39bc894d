// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # HDDS Mesh - Publish/Subscribe over IPv6 Multicast
//!
//! Lightweight event bus for nodes sharing a mesh network (Thread, 6LoWPAN
//! or any IPv6 link). Every node joins one multicast group; an event is a
//! `(topic, data)` pair of text strings broadcast to the group and delivered
//! to local handlers whose prefix matches the topic.
//!
//! ## Architecture
//!
//! ```text
//! +-----------------------------------------+
//! |  Application                            |
//! +-----------------------------------------+
//!           v publish        ^ handlers
//! +-----------------------------------------+
//! |  MeshPublish (facade, poll / mesh_loop) |
//! +-----------------------------------------+
//!           v                    ^
//! +------------------+  +-------------------+
//! |  Frame codec     |  |  HandlerTable     |
//! |  topic\0data\0   |  |  prefix dispatch  |
//! +------------------+  +-------------------+
//!           v                    ^
//! +-----------------------------------------+
//! |  MulticastSession (lazy init, teardown) |
//! +-----------------------------------------+
//!           v                    ^
//! +-----------------------------------------+
//! |  MulticastSocket / InterfaceQuery       |
//! |  (socket2 UDP, host netif, loopback)    |
//! +-----------------------------------------+
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use hdds_mesh::{mesh_loop, MeshPublish, PollOutcome};
//!
//! fn on_temp(event: &str, data: &str) {
//!     println!("{} = {}", event, data);
//! }
//!
//! let mut mesh = MeshPublish::new();
//! mesh.subscribe("temp/", on_temp as hdds_mesh::EventHandlerFn)?;
//! mesh.publish("temp/room1", "21.5")?;
//! loop {
//!     match mesh_loop(&mut mesh) {
//!         Ok(PollOutcome::Dispatched(_)) => continue,
//!         Ok(_) => {}
//!         // One bad datagram from a peer; the next poll reads the next one
//!         Err(e) => log::warn!("mesh poll: {}", e),
//!     }
//!     std::thread::sleep(std::time::Duration::from_millis(10));
//! }
//! # Ok::<(), hdds_mesh::Error>(())
//! ```
//!
//! Errors from `poll`/`mesh_loop` concern a single datagram (malformed
//! frame, read failure) and do not stop the session: keep polling.
//!
//! Delivery is best-effort: no acknowledgement, retransmission or ordering.

/// Defaults and runtime configuration
pub mod config;

/// Error types for HDDS Mesh
pub mod error;

/// `topic\0data\0` datagram codec
pub mod frame;

/// Publish/subscribe facade
pub mod mesh;

/// Fixed-capacity prefix subscription table
pub mod subscriptions;

/// Multicast session and socket/interface collaborators
pub mod transport;

pub use crate::config::MeshConfig;
pub use crate::error::{Error, InitStage, Result};
pub use crate::mesh::{mesh_loop, MeshPublish, PollOutcome};
pub use crate::subscriptions::{EventHandler, EventHandlerFn, HandlerTable, SubscriptionScope};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
