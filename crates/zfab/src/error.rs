// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error taxonomy for the zfab crate.
//!
//! | Class | Surfaced as | Handling |
//! |-------|-------------|----------|
//! | Configuration (unparseable file, missing `type`, no service) | [`Error::Config`] | aborts launcher startup |
//! | Fabric (bind/connect/set-option failed) | [`Error::Fabric`] | reported upstream from `connect`/`bind` acks |
//! | Context shutdown | [`Error::Terminated`] | coordinator exits its loop cleanly |
//! | File I/O | [`Error::Io`] | aborts config loading |
//!
//! Two failure classes never become values: stale replies (wrong
//! sequence number or wrong server) are silently discarded, and peers
//! that miss their heartbeat deadline silently transition to dead.
//! Inside the coordinators every fabric error except shutdown is
//! downgraded to drop-and-continue.

use std::fmt;
use std::io;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the zfab public API
#[derive(Debug)]
pub enum Error {
    /// Configuration file rejected, or a required property is missing
    Config(String),

    /// The messaging fabric refused an operation
    Fabric(zmq::Error),

    /// The fabric context is shutting down
    Terminated,

    /// Reading a configuration file failed
    Io(io::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
            Self::Fabric(e) => write!(f, "fabric error: {}", e),
            Self::Terminated => write!(f, "fabric context terminated"),
            Self::Io(e) => write!(f, "i/o error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<zmq::Error> for Error {
    fn from(e: zmq::Error) -> Self {
        // ETERM means the context is being torn down, which is a clean
        // shutdown signal rather than a fault.
        if e == zmq::Error::ETERM {
            Self::Terminated
        } else {
            Self::Fabric(e)
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eterm_maps_to_terminated() {
        let err: Error = zmq::Error::ETERM.into();
        assert!(matches!(err, Error::Terminated));
    }

    #[test]
    fn test_other_fabric_errors_keep_errno() {
        let err: Error = zmq::Error::EADDRINUSE.into();
        match err {
            Error::Fabric(e) => assert_eq!(e, zmq::Error::EADDRINUSE),
            other => panic!("unexpected variant: {}", other),
        }
    }

    #[test]
    fn test_display_includes_detail() {
        let err = Error::config("no service found");
        assert!(err.to_string().contains("no service found"));
    }
}
