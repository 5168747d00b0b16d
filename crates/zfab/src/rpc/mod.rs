// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reliable request/reply RPC over the messaging fabric.
//!
//! An [`RpcClient`] dispatches synchronous calls across any number of
//! connected servers; an [`RpcServer`] adapts one server application to
//! any number of clients. Together they turn the unreliable
//! many-to-many fabric into an at-most-once RPC channel with
//! heartbeat-based liveness, least-recently-used load balancing across
//! replicas, per-request sequence numbering and bounded response
//! timeouts.
//!
//! # Wire envelope
//!
//! All frames are opaque byte strings; `[]` marks an empty frame.
//!
//! | Direction | Frames | Meaning |
//! |-----------|--------|---------|
//! | client -> server | `server_id + [] + seq + body` | request |
//! | server -> client | `server_id + [] + seq + body` | matching reply |
//! | client -> server | `server_id + []` | heartbeat |
//! | server -> client | `client_id + []` | heartbeat echo |
//!
//! The leading id frame is consumed by the fabric's routing layer and
//! reappears on the peer as the sender address. `seq` is the decimal
//! ASCII rendering of the client's sequence counter; replies carrying
//! any other value are stale and silently dropped.
//!
//! # Concurrency contract
//!
//! Each end owns exactly one background coordinator thread. The user
//! thread and the coordinator communicate only through a pair of
//! in-process pipes, `data` for requests/replies and `ctrl` for
//! administrative commands. Two pipes, not one: a control command may
//! arrive while a data exchange is in flight, and muxing them on one
//! pipe would couple their ordering.

mod client;
mod server;

pub use client::RpcClient;
pub use server::RpcServer;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

static PIPE_NUMBER: AtomicU64 = AtomicU64::new(0);

/// Allocate a fresh `(data, ctrl)` in-process endpoint pair, unique for
/// the lifetime of the process so any number of clients and servers can
/// coexist on one context.
pub(crate) fn pipe_endpoints(kind: &str) -> (String, String) {
    let number = PIPE_NUMBER.fetch_add(1, Ordering::Relaxed);
    (
        format!("inproc://zfab/{}/{:04X}/data", kind, number),
        format!("inproc://zfab/{}/{:04X}/ctrl", kind, number),
    )
}

/// Milliseconds until `deadline`, clamped to zero when the deadline has
/// already passed and rounded up so a deadline under a millisecond away
/// does not busy-spin the poll loop.
pub(crate) fn timeout_ms(now: Instant, deadline: Instant) -> i64 {
    let micros = deadline.saturating_duration_since(now).as_micros();
    i64::try_from(micros.div_ceil(1000)).unwrap_or(i64::MAX)
}
