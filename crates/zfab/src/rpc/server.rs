// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Server side of the reliable RPC pair.
//!
//! [`RpcServer`] presents one blocking `recv`/`send` pair to the server
//! application. Its coordinator funnels any number of clients through a
//! single-in-flight hand-off: the application sees the next request only
//! after its previous reply has gone out. Clients are tracked by the
//! heartbeats they send and evaporate silently when they fall silent.

use crate::error::{Error, Result};
use crate::msg::Message;
use crate::rpc::client::control_error;
use crate::rpc::{pipe_endpoints, timeout_ms};
use std::collections::{HashSet, VecDeque};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How long a client may stay silent before its record is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_micros(1_000_000);

/// Reliable RPC server adapter.
///
/// # Example
///
/// ```rust,no_run
/// use zfab::RpcServer;
///
/// fn main() -> zfab::Result<()> {
///     let context = zmq::Context::new();
///     let server = RpcServer::new(&context, "master")?;
///     server.bind("tcp://*:5001")?;
///
///     loop {
///         let mut request = server.recv()?;
///         request.body_set("pong");
///         server.send(request)?;
///     }
/// }
/// ```
pub struct RpcServer {
    /// Receives requests, sends replies
    data: zmq::Socket,
    /// Administers the coordinator (bind, stop)
    ctrl: zmq::Socket,
    coordinator: Option<JoinHandle<()>>,
}

impl RpcServer {
    /// Spin up the coordinator under the routing identity `server_id`
    /// and bind the in-process pipes.
    pub fn new(context: &zmq::Context, server_id: &str) -> Result<RpcServer> {
        let (data_endpoint, ctrl_endpoint) = pipe_endpoints("rpc-server");

        let data = context.socket(zmq::REP)?;
        data.bind(&data_endpoint)?;
        let ctrl = context.socket(zmq::REQ)?;
        ctrl.bind(&ctrl_endpoint)?;

        let thread_context = context.clone();
        let identity = server_id.as_bytes().to_vec();
        let coordinator = thread::Builder::new()
            .name("zfab-rpc-server".to_string())
            .spawn(move || {
                match Coordinator::new(&thread_context, &identity, &data_endpoint, &ctrl_endpoint)
                {
                    Ok(mut coordinator) => coordinator.event_loop(),
                    Err(e) => log::error!("[RPC-SERVER] coordinator failed to start: {}", e),
                }
            })
            .map_err(Error::Io)?;

        Ok(RpcServer {
            data,
            ctrl,
            coordinator: Some(coordinator),
        })
    }

    /// Bind the outward-facing socket so clients can connect. May be
    /// called more than once to listen on several endpoints. Blocks
    /// until the coordinator acknowledges; a fabric refusal is reported
    /// as [`Error::Fabric`].
    pub fn bind(&self, endpoint: &str) -> Result<()> {
        let mut msg = Message::new();
        msg.body_set(endpoint);
        msg.push("bind");
        msg.send(&self.ctrl)?;

        let mut reply = Message::recv(&self.ctrl)?;
        match reply.pop().as_deref() {
            Some(b"ok") => Ok(()),
            Some(b"err") => Err(control_error(&mut reply)),
            _ => Err(Error::Fabric(zmq::Error::EPROTO)),
        }
    }

    /// Receive the next request. Blocks until one is available. The
    /// returned message still carries its client address envelope; pass
    /// it back through [`RpcServer::send`] unchanged apart from the
    /// body.
    pub fn recv(&self) -> Result<Message> {
        Message::recv(&self.data)
    }

    /// Send the reply to the request most recently received.
    pub fn send(&self, reply: Message) -> Result<()> {
        reply.send(&self.data)
    }
}

impl Drop for RpcServer {
    fn drop(&mut self) {
        let mut stop = Message::new();
        stop.body_set("stop");
        if let Err(e) = stop.send(&self.ctrl) {
            log::warn!("[RPC-SERVER] stop request failed: {}", e);
        }
        if let Some(handle) = self.coordinator.take() {
            let _ = handle.join();
        }
    }
}

/// A client as viewed by this server.
struct ClientRecord {
    client_id: Vec<u8>,
    /// Time of the most recent heartbeat or request
    last_seen: Instant,
}

/// Coordinator state, owned entirely by the background thread.
struct Coordinator {
    /// Client requests and heartbeats
    frontend: zmq::Socket,
    /// Hand-off to the server application (data pipe peer)
    backend: zmq::Socket,
    /// Receives administrative commands (ctrl pipe peer)
    control: zmq::Socket,
    /// Connected clients ordered by `last_seen` ascending; refreshes
    /// re-append at the tail, so the front is always the next to expire
    clients: VecDeque<ClientRecord>,
    /// Known client ids
    registry: HashSet<Vec<u8>>,
    /// Pending requests in arrival order, address envelopes preserved
    msg_queue: VecDeque<Message>,
    /// True while the application holds a request without having replied
    server_busy: bool,
}

impl Coordinator {
    fn new(
        context: &zmq::Context,
        identity: &[u8],
        data_endpoint: &str,
        ctrl_endpoint: &str,
    ) -> Result<Coordinator> {
        let frontend = context.socket(zmq::ROUTER)?;
        frontend.set_identity(identity)?;
        let backend = context.socket(zmq::REQ)?;
        backend.connect(data_endpoint)?;
        let control = context.socket(zmq::REP)?;
        control.connect(ctrl_endpoint)?;

        Ok(Coordinator {
            frontend,
            backend,
            control,
            clients: VecDeque::new(),
            registry: HashSet::new(),
            msg_queue: VecDeque::new(),
            server_busy: false,
        })
    }

    fn event_loop(&mut self) {
        let mut stopped = false;
        while !stopped {
            let timeout = self.poll_timeout();
            let (frontend_ready, backend_ready, control_ready) =
                match self.poll_channels(timeout) {
                    Ok(ready) => ready,
                    Err(Error::Fabric(zmq::Error::EINTR)) => continue,
                    Err(e) => {
                        log::debug!("[RPC-SERVER] poll ended: {}", e);
                        break;
                    }
                };

            if frontend_ready {
                // Either a request or a heartbeat
                if self.handle(Self::frontend_event) {
                    break;
                }
            }
            if backend_ready {
                // The application's reply to the request in flight
                if self.handle(Self::backend_event) {
                    break;
                }
            }
            if control_ready {
                match self.control_event() {
                    Ok(stop) => stopped = stop,
                    Err(Error::Terminated) => break,
                    Err(e) => log::warn!("[RPC-SERVER] control error: {}", e),
                }
            }

            if self.run_chores().is_err() {
                break;
            }
        }
        log::debug!("[RPC-SERVER] coordinator stopped");
    }

    fn handle(&mut self, event: fn(&mut Self) -> Result<()>) -> bool {
        match event(self) {
            Ok(()) => false,
            Err(Error::Terminated) => true,
            Err(e) => {
                log::warn!("[RPC-SERVER] fabric error: {}", e);
                false
            }
        }
    }

    fn poll_channels(&self, timeout: i64) -> Result<(bool, bool, bool)> {
        let mut items = [
            self.frontend.as_poll_item(zmq::POLLIN),
            self.backend.as_poll_item(zmq::POLLIN),
            self.control.as_poll_item(zmq::POLLIN),
        ];
        zmq::poll(&mut items, timeout)?;
        Ok((
            items[0].is_readable(),
            items[1].is_readable(),
            items[2].is_readable(),
        ))
    }

    /// Wait at most until the first client lease expires; with no
    /// clients there is nothing to time.
    fn poll_timeout(&self) -> i64 {
        match self.clients.front() {
            Some(front) => timeout_ms(Instant::now(), front.last_seen + HEARTBEAT_INTERVAL),
            None => -1,
        }
    }

    /// Handle a frame from a client: queue a request, or echo a
    /// heartbeat straight back. Either way the client's lease renews.
    fn frontend_event(&mut self) -> Result<()> {
        let mut msg = Message::recv(&self.frontend)?;
        let Some(client_id) = msg.unwrap() else {
            return Ok(());
        };
        let now = Instant::now();

        if !self.registry.contains(&client_id) {
            self.registry.insert(client_id.clone());
            self.clients.push_back(ClientRecord {
                client_id: client_id.clone(),
                last_seen: now,
            });
            log::debug!("[RPC-SERVER] client {} connected", id_text(&client_id));
        }

        if msg.is_empty() {
            // Heartbeat: echo immediately
            msg.wrap(client_id.clone(), Some(b""));
            msg.send(&self.frontend)?;
        } else {
            // Request: keep the address envelope for the reply path
            msg.wrap(client_id.clone(), None);
            self.msg_queue.push_back(msg);
        }

        // Renew the lease and move the record to the tail, keeping the
        // queue sorted by last_seen
        if let Some(pos) = self
            .clients
            .iter()
            .position(|record| record.client_id == client_id)
        {
            if let Some(mut record) = self.clients.remove(pos) {
                record.last_seen = now;
                self.clients.push_back(record);
            }
        }
        Ok(())
    }

    /// Forward the application's reply to its client and free the
    /// hand-off slot.
    fn backend_event(&mut self) -> Result<()> {
        let msg = Message::recv(&self.backend)?;
        debug_assert!(self.server_busy);
        self.server_busy = false;
        msg.send(&self.frontend)?;
        Ok(())
    }

    /// Handle a control command. Returns true for `stop`.
    fn control_event(&mut self) -> Result<bool> {
        let mut msg = Message::recv(&self.control)?;
        let command = msg.pop().unwrap_or_default();
        match command.as_slice() {
            b"stop" => Ok(true),
            b"bind" => {
                let endpoint = msg
                    .pop()
                    .and_then(|frame| String::from_utf8(frame).ok())
                    .unwrap_or_default();
                let mut reply = Message::new();
                match self.frontend.bind(&endpoint) {
                    Ok(()) => {
                        log::info!("[RPC-SERVER] listening on {}", endpoint);
                        reply.body_set("ok");
                    }
                    Err(e) => {
                        log::warn!("[RPC-SERVER] bind to {} failed: {}", endpoint, e);
                        reply.body_set(e.to_raw().to_string());
                        reply.push("err");
                    }
                }
                reply.send(&self.control)?;
                Ok(false)
            }
            other => {
                log::warn!(
                    "[RPC-SERVER] unknown control command {:?}",
                    String::from_utf8_lossy(other)
                );
                let mut reply = Message::new();
                reply.body_set(zmq::Error::EINVAL.to_raw().to_string());
                reply.push("err");
                reply.send(&self.control)?;
                Ok(false)
            }
        }
    }

    /// Periodic chores: drop clients whose lease ran out, then hand the
    /// next queued request to the application if it is free.
    fn run_chores(&mut self) -> Result<()> {
        let now = Instant::now();

        while let Some(front) = self.clients.front() {
            if now < front.last_seen + HEARTBEAT_INTERVAL {
                break;
            }
            if let Some(record) = self.clients.pop_front() {
                self.registry.remove(&record.client_id);
                log::debug!("[RPC-SERVER] client {} expired", id_text(&record.client_id));
            }
        }

        if !self.server_busy {
            if let Some(msg) = self.msg_queue.pop_front() {
                msg.send(&self.backend)?;
                self.server_busy = true;
            }
        }
        Ok(())
    }
}

fn id_text(id: &[u8]) -> String {
    String::from_utf8_lossy(id).into_owned()
}
