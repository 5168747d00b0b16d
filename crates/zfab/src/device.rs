// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Configuration-driven device launcher.
//!
//! A device is a named service block in a property tree describing one
//! of the fabric's built-in proxy topologies: a request broker
//! (`zmq_queue`), a pub/sub proxy (`zmq_forwarder`) or a pipeline proxy
//! (`zmq_streamer`). The launcher opens the two sockets the device type
//! mandates, applies the configured socket options, and hands the pair
//! to the fabric's proxy primitive.
//!
//! ```text
//! main
//!     type = zmq_queue
//!     frontend
//!         option
//!             hwm = 1000
//!         bind = tcp://*:5555
//!     backend
//!         bind = tcp://*:5556
//! ```

use crate::error::{Error, Result};
use crate::tree::PropertyTree;
use std::path::Path;

/// Device launcher bound to one loaded configuration tree.
pub struct Device {
    tree: PropertyTree,
    context: zmq::Context,
    verbose: bool,
}

impl Device {
    /// Build a launcher from a configuration tree. The optional
    /// `context` block configures the fabric: `iothreads` (1..=255,
    /// default 1) and `verbose` (0/1, default 0).
    pub fn new(tree: PropertyTree) -> Result<Device> {
        let iothreads: i32 = match tree.resolve("context/iothreads", "1").parse() {
            Ok(n @ 1..=255) => n,
            _ => {
                return Err(Error::config(format!(
                    "context/iothreads must be 1..255, got '{}'",
                    tree.resolve("context/iothreads", "1")
                )))
            }
        };
        let verbose = tree.resolve("context/verbose", "0") != "0";

        let context = zmq::Context::new();
        if iothreads != 1 {
            context.set_io_threads(iothreads)?;
        }
        Ok(Device {
            tree,
            context,
            verbose,
        })
    }

    /// Load a configuration file (JSON or text-property format) and
    /// build a launcher from it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Device> {
        Self::new(PropertyTree::load(path)?)
    }

    /// The fabric context the device's sockets live in.
    #[must_use]
    pub fn context(&self) -> &zmq::Context {
        &self.context
    }

    /// Name of the nth configured service: top-level children of the
    /// tree, skipping the `context` block.
    #[must_use]
    pub fn service(&self, index: usize) -> Option<&str> {
        let mut child = self.tree.child(self.tree.root());
        let mut remaining = index;
        while let Some(node) = child {
            if self.tree.name(node) != "context" {
                if remaining == 0 {
                    return Some(self.tree.name(node));
                }
                remaining -= 1;
            }
            child = self.tree.next(node);
        }
        None
    }

    /// A service property by relative path, or the empty string.
    #[must_use]
    pub fn property(&self, service: &str, path: &str) -> &str {
        match self.tree.locate(service) {
            Some(node) => match self.tree.locate_from(node, path) {
                Some(leaf) => self.tree.string(leaf),
                None => "",
            },
            None => "",
        }
    }

    /// Create a socket of `socket_type` and configure it from the
    /// `service/name` sub-tree: `bind` and `connect` leaves act
    /// directly, leaves under `option` go through the typed setter
    /// table. Unknown leaves are ignored, or reported when the device
    /// is verbose. Any fabric or parse failure closes the socket and
    /// returns the error.
    pub fn socket(&self, service: &str, name: &str, socket_type: zmq::SocketType) -> Result<zmq::Socket> {
        let sub_tree = self
            .tree
            .locate(service)
            .and_then(|node| self.tree.locate_from(node, name))
            .ok_or_else(|| Error::config(format!("no such socket block: {}/{}", service, name)))?;

        let socket = self.context.socket(socket_type)?;
        let mut child = self.tree.child(sub_tree);
        while let Some(node) = child {
            let result = match self.tree.name(node) {
                "bind" => socket.bind(self.tree.string(node)).map_err(Error::from),
                "connect" => socket.connect(self.tree.string(node)).map_err(Error::from),
                "option" => self.apply_options(&socket, node),
                other => {
                    if self.verbose {
                        log::warn!("[DEVICE] ignoring unknown leaf {}/{}/{}", service, name, other);
                    }
                    Ok(())
                }
            };
            if let Err(e) = result {
                log::warn!(
                    "[DEVICE] configuring {}/{}/{} failed: {}",
                    service,
                    name,
                    self.tree.name(node),
                    e
                );
                return Err(e);
            }
            child = self.tree.next(node);
        }
        Ok(socket)
    }

    /// Apply every leaf under an `option` node. Each recognized option
    /// has a fixed numeric width; the table below is the whole coercion
    /// story, there is no generic string-to-anything conversion.
    fn apply_options(&self, socket: &zmq::Socket, option_node: crate::tree::NodeId) -> Result<()> {
        let mut child = self.tree.child(option_node);
        while let Some(node) = child {
            let name = self.tree.name(node);
            let value = self.tree.string(node);
            match name {
                "hwm" => {
                    let hwm = parse_int::<u64>(name, value)?;
                    let hwm = int_option(name, hwm)?;
                    socket.set_sndhwm(hwm)?;
                    socket.set_rcvhwm(hwm)?;
                }
                "affinity" => socket.set_affinity(parse_int::<u64>(name, value)?)?,
                "identity" => socket.set_identity(self.tree.value(node).unwrap_or_default())?,
                "subscribe" => socket.set_subscribe(self.tree.value(node).unwrap_or_default())?,
                "rate" => {
                    let rate = parse_int::<i64>(name, value)?;
                    socket.set_rate(int_option(name, rate)?)?;
                }
                "recovery_ivl" => {
                    let ivl = parse_int::<i64>(name, value)?;
                    socket.set_recovery_ivl(int_option(name, ivl)?)?;
                }
                "sndbuf" => {
                    let size = parse_int::<u64>(name, value)?;
                    socket.set_sndbuf(int_option(name, size)?)?;
                }
                "rcvbuf" => {
                    let size = parse_int::<u64>(name, value)?;
                    socket.set_rcvbuf(int_option(name, size)?)?;
                }
                "swap" | "mcast_loop" => {
                    // Validated for the legacy configs that still carry
                    // them, but the modern fabric has no such options.
                    parse_int::<i64>(name, value)?;
                    log::warn!("[DEVICE] option {} is not supported by this fabric", name);
                }
                other => {
                    if self.verbose {
                        log::warn!("[DEVICE] ignoring unknown option {}", other);
                    }
                }
            }
            child = self.tree.next(node);
        }
        Ok(())
    }

    /// Bring up a configured service and run it: resolve the device
    /// type, create and configure both sockets, then hand them to the
    /// fabric's proxy primitive. Blocks until the context terminates.
    pub fn start(&self, service: &str) -> Result<()> {
        if self.tree.locate(service).is_none() {
            return Err(Error::config(format!("no such service: {}", service)));
        }
        let device_type = self.property(service, "type").to_string();
        if device_type.is_empty() {
            return Err(Error::config(format!("service {} has no type", service)));
        }
        let (frontend_type, backend_type) = device_sockets(&device_type)?;

        let frontend = self.socket(service, "frontend", frontend_type)?;
        let backend = self.socket(service, "backend", backend_type)?;

        if self.verbose {
            log::info!("[DEVICE] starting {} ({})", service, device_type);
        }
        run_proxy(&frontend, &backend)
    }

    /// Bring up a device without a configuration file, following the
    /// standing conventions: the queue broker binds both sides, the
    /// forwarder connects its subscriber and binds its publisher, the
    /// streamer binds its puller and connects its pusher. Blocks until
    /// the context terminates.
    pub fn start_automatic(device_type: &str, frontend_endpoint: &str, backend_endpoint: &str) -> Result<()> {
        let (frontend_type, backend_type) = device_sockets(device_type)?;

        let context = zmq::Context::new();
        let frontend = context.socket(frontend_type)?;
        let backend = context.socket(backend_type)?;

        match device_type {
            "zmq_queue" => {
                log::info!("[DEVICE] binding {} for client connections", frontend_endpoint);
                frontend.bind(frontend_endpoint)?;
                log::info!("[DEVICE] binding {} for service connections", backend_endpoint);
                backend.bind(backend_endpoint)?;
            }
            "zmq_forwarder" => {
                log::info!("[DEVICE] connecting to publisher at {}", frontend_endpoint);
                frontend.connect(frontend_endpoint)?;
                log::info!("[DEVICE] binding {} for subscribers", backend_endpoint);
                backend.bind(backend_endpoint)?;
            }
            _ => {
                log::info!("[DEVICE] binding {} for upstream nodes", frontend_endpoint);
                frontend.bind(frontend_endpoint)?;
                log::info!("[DEVICE] connecting downstream to {}", backend_endpoint);
                backend.connect(backend_endpoint)?;
            }
        }
        run_proxy(&frontend, &backend)
    }
}

/// Socket pair mandated by a device type.
fn device_sockets(device_type: &str) -> Result<(zmq::SocketType, zmq::SocketType)> {
    match device_type {
        "zmq_queue" => Ok((zmq::ROUTER, zmq::DEALER)),
        "zmq_forwarder" => Ok((zmq::SUB, zmq::PUB)),
        "zmq_streamer" => Ok((zmq::PULL, zmq::PUSH)),
        other => Err(Error::config(format!("invalid device type '{}'", other))),
    }
}

/// Run the proxy until the context terminates; termination is a clean
/// exit, not an error.
fn run_proxy(frontend: &zmq::Socket, backend: &zmq::Socket) -> Result<()> {
    match zmq::proxy(frontend, backend) {
        Ok(()) => Ok(()),
        Err(zmq::Error::ETERM) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Parse one option value with its table-mandated integer width.
fn parse_int<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::config(format!("option {} has invalid value '{}'", name, value)))
}

/// Narrow a table-width integer to the fabric's setter width.
fn int_option<T: TryInto<i32> + std::fmt::Display + Copy>(name: &str, value: T) -> Result<i32> {
    value
        .try_into()
        .map_err(|_| Error::config(format!("option {} value {} out of range", name, value)))
}
