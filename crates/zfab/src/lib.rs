// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # zfab - function library for the ZeroMQ messaging fabric
//!
//! A small toolkit that turns the unreliable many-to-many messaging
//! fabric into things applications can actually lean on: an
//! at-most-once, failover-capable RPC channel, a configuration tree
//! with two loaders, and a launcher for the fabric's built-in proxy
//! devices.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use zfab::{Message, RpcClient, RpcServer, Result};
//!
//! fn main() -> Result<()> {
//!     let context = zmq::Context::new();
//!
//!     // Server side: identity "master", listening for clients
//!     let server = RpcServer::new(&context, "master")?;
//!     server.bind("tcp://*:5001")?;
//!
//!     // Client side: connect and call
//!     let client = RpcClient::new(&context)?;
//!     client.connect("master", "tcp://127.0.0.1:5001")?;
//!     let mut request = Message::new();
//!     request.body_set("ping");
//!     let reply = client.call(request)?;
//!     assert_eq!(reply.body_str(), "pong");
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                      Application Layer                       |
//! |     call(request) -> reply     |     recv() / send(reply)    |
//! +--------------------------------------------------------------+
//! |                      Coordinator Layer                       |
//! |  RpcClient: server registry, liveness, LRU dispatch, seq nr  |
//! |  RpcServer: client leases, request FIFO, single hand-off     |
//! +--------------------------------------------------------------+
//! |                       Message Layer                          |
//! |        Message: multipart frames + address envelopes         |
//! +--------------------------------------------------------------+
//! |                     Messaging Fabric                         |
//! |   router/dealer sockets | inproc pipes | built-in proxies    |
//! +--------------------------------------------------------------+
//! ```
//!
//! Each coordinator is one background thread that owns all of its
//! component's state and blocks only in the fabric's poll primitive;
//! the user thread talks to it exclusively over a pair of in-process
//! pipes. Heartbeats flow continuously in both directions, independent
//! of user calls.
//!
//! ## Key types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Message`] | Multipart fabric message with envelope operations |
//! | [`RpcClient`] | Synchronous calls over any number of server replicas |
//! | [`RpcServer`] | Adapts one application to any number of clients |
//! | [`PropertyTree`] | Hierarchical configuration, text or JSON |
//! | [`Device`] | Config-driven proxy launcher (queue/forwarder/streamer) |

/// Configuration-driven proxy device launcher.
pub mod device;
/// Crate-wide error taxonomy.
pub mod error;
/// Multipart fabric message with address-envelope operations.
pub mod msg;
/// Reliable request/reply RPC (client dispatcher + server adapter).
pub mod rpc;
/// Hierarchical property tree and its loaders.
pub mod tree;

pub use device::Device;
pub use error::{Error, Result};
pub use msg::Message;
pub use rpc::{RpcClient, RpcServer};
pub use tree::{NodeId, PropertyTree};
