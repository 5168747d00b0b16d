// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client side of the reliable RPC pair.
//!
//! [`RpcClient`] is a thin handle around two in-process pipes; all the
//! routing intelligence lives in a background coordinator thread that
//! tracks connected servers through heartbeat decay, dispatches one
//! pending call at a time to the least recently used live server, and
//! silently discards replies that arrive too late.

use crate::error::{Error, Result};
use crate::msg::Message;
use crate::rpc::{pipe_endpoints, timeout_ms};
use std::collections::{HashMap, VecDeque};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Heartbeat rate towards connected servers.
const HEARTBEAT_INTERVAL: Duration = Duration::from_micros(500_000);

/// Maximum time we wait for a server's reply before giving the request
/// to the next server.
const MAX_PROCESSING_TIME: Duration = Duration::from_micros(2_000_000);

/// Reliable RPC client handle.
///
/// `connect` any number of servers, then issue strictly serialized
/// synchronous calls; the coordinator picks a live server per call and
/// fails over transparently when one goes silent.
///
/// # Example
///
/// ```rust,no_run
/// use zfab::{Message, RpcClient};
///
/// fn main() -> zfab::Result<()> {
///     let context = zmq::Context::new();
///     let client = RpcClient::new(&context)?;
///     client.connect("master", "tcp://127.0.0.1:5001")?;
///
///     let mut request = Message::new();
///     request.body_set("ping");
///     let reply = client.call(request)?;
///     println!("{}", reply.body_str());
///     Ok(())
/// }
/// ```
pub struct RpcClient {
    /// Sends requests, receives replies
    data: zmq::Socket,
    /// Administers the coordinator (connect, stop)
    ctrl: zmq::Socket,
    coordinator: Option<JoinHandle<()>>,
}

impl RpcClient {
    /// Spin up the coordinator thread and bind the in-process pipes.
    pub fn new(context: &zmq::Context) -> Result<RpcClient> {
        let (data_endpoint, ctrl_endpoint) = pipe_endpoints("rpc-client");

        let data = context.socket(zmq::REQ)?;
        data.bind(&data_endpoint)?;
        let ctrl = context.socket(zmq::REQ)?;
        ctrl.bind(&ctrl_endpoint)?;

        let thread_context = context.clone();
        let coordinator = thread::Builder::new()
            .name("zfab-rpc-client".to_string())
            .spawn(move || {
                match Coordinator::new(&thread_context, &data_endpoint, &ctrl_endpoint) {
                    Ok(mut coordinator) => coordinator.event_loop(),
                    Err(e) => log::error!("[RPC-CLIENT] coordinator failed to start: {}", e),
                }
            })
            .map_err(Error::Io)?;

        Ok(RpcClient {
            data,
            ctrl,
            coordinator: Some(coordinator),
        })
    }

    /// Open a route to a server. `server_id` is the routing identity the
    /// server registered on its outward socket; it must not already be
    /// connected on this client. Blocks until the coordinator
    /// acknowledges; a fabric refusal is reported as [`Error::Fabric`].
    pub fn connect(&self, server_id: &str, endpoint: &str) -> Result<()> {
        let mut msg = Message::new();
        msg.body_set(endpoint);
        msg.push(server_id);
        msg.push("connect");
        msg.send(&self.ctrl)?;

        let mut reply = Message::recv(&self.ctrl)?;
        match reply.pop().as_deref() {
            Some(b"ok") => Ok(()),
            Some(b"err") => Err(control_error(&mut reply)),
            _ => Err(Error::Fabric(zmq::Error::EPROTO)),
        }
    }

    /// Make a remote procedure call: send the request, block until the
    /// reply arrives. Routing, retries and failover are invisible here;
    /// the call simply waits until some live server answers.
    pub fn call(&self, request: Message) -> Result<Message> {
        request.send(&self.data)?;
        Message::recv(&self.data)
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        let mut stop = Message::new();
        stop.body_set("stop");
        if let Err(e) = stop.send(&self.ctrl) {
            log::warn!("[RPC-CLIENT] stop request failed: {}", e);
        }
        if let Some(handle) = self.coordinator.take() {
            let _ = handle.join();
        }
    }
}

/// Decode the errno a coordinator reported over a control pipe.
pub(crate) fn control_error(reply: &mut Message) -> Error {
    let raw = reply
        .pop()
        .and_then(|frame| String::from_utf8(frame).ok())
        .and_then(|text| text.parse::<i32>().ok());
    match raw {
        Some(errno) => zmq::Error::from_raw(errno).into(),
        None => Error::Fabric(zmq::Error::EPROTO),
    }
}

/// A server as viewed by this client.
struct ServerRecord {
    server_id: Vec<u8>,
    /// True iff the server's heart is beating
    alive: bool,
    /// Until when we wait for the next heartbeat
    heartbeat_deadline: Instant,
}

/// Coordinator state, owned entirely by the background thread.
///
/// `servers` is an arena: records are created on `connect` and live
/// until shutdown, so the ordering queues hold plain indices into it.
struct Coordinator {
    /// Replies to the user thread (data pipe peer)
    frontend: zmq::Socket,
    /// Talks to RPC servers
    backend: zmq::Socket,
    /// Receives administrative commands (ctrl pipe peer)
    control: zmq::Socket,
    /// All connected servers, in connect order (heartbeat fan-out)
    servers: Vec<ServerRecord>,
    /// server_id -> index into `servers`
    registry: HashMap<Vec<u8>, usize>,
    /// Alive servers ordered by heartbeat deadline; refreshes append at
    /// the tail, so the front is always the next to expire
    alive_servers: VecDeque<usize>,
    /// Alive servers, least recently dispatched first
    lru_queue: VecDeque<usize>,
    /// Label of the next dispatch; replies must echo it exactly
    sequence_nr: u64,
    /// Pending user request, kept untouched to become the reply envelope
    request: Option<Message>,
    /// Server working on `request`, if any
    current_server: Option<usize>,
    next_heartbeat: Instant,
    /// Until when `current_server` may still answer
    processing_deadline: Instant,
}

impl Coordinator {
    fn new(context: &zmq::Context, data_endpoint: &str, ctrl_endpoint: &str) -> Result<Coordinator> {
        let frontend = context.socket(zmq::REP)?;
        frontend.connect(data_endpoint)?;
        let control = context.socket(zmq::REP)?;
        control.connect(ctrl_endpoint)?;
        let backend = context.socket(zmq::ROUTER)?;

        let now = Instant::now();
        Ok(Coordinator {
            frontend,
            backend,
            control,
            servers: Vec::new(),
            registry: HashMap::new(),
            alive_servers: VecDeque::new(),
            lru_queue: VecDeque::new(),
            sequence_nr: 0,
            request: None,
            current_server: None,
            next_heartbeat: now,
            processing_deadline: now,
        })
    }

    /// Single-threaded cooperative loop: wait for fabric events with a
    /// computed timeout, dispatch ready channels, then run the periodic
    /// chores (heartbeats, liveness reaping, late-response detection,
    /// request dispatch).
    fn event_loop(&mut self) {
        let mut stopped = false;
        while !stopped {
            let timeout = self.poll_timeout();
            let (backend_ready, frontend_ready, control_ready) =
                match self.poll_channels(timeout) {
                    Ok(ready) => ready,
                    Err(Error::Fabric(zmq::Error::EINTR)) => continue,
                    Err(e) => {
                        log::debug!("[RPC-CLIENT] poll ended: {}", e);
                        break;
                    }
                };

            if backend_ready {
                // Either a reply or a heartbeat echo
                if self.handle(Self::backend_event) {
                    break;
                }
            }
            if frontend_ready {
                // A fresh request from the user thread
                if self.handle(Self::frontend_event) {
                    break;
                }
            }
            if control_ready {
                // Either connect or stop
                match self.control_event() {
                    Ok(stop) => stopped = stop,
                    Err(Error::Terminated) => break,
                    Err(e) => log::warn!("[RPC-CLIENT] control error: {}", e),
                }
            }

            if self.run_chores().is_err() {
                break;
            }
        }
        log::debug!("[RPC-CLIENT] coordinator stopped");
    }

    /// Run one event handler, downgrading fabric errors to
    /// drop-and-continue. Returns true only on context shutdown.
    fn handle(&mut self, event: fn(&mut Self) -> Result<()>) -> bool {
        match event(self) {
            Ok(()) => false,
            Err(Error::Terminated) => true,
            Err(e) => {
                log::warn!("[RPC-CLIENT] fabric error: {}", e);
                false
            }
        }
    }

    fn poll_channels(&self, timeout: i64) -> Result<(bool, bool, bool)> {
        let mut items = [
            self.backend.as_poll_item(zmq::POLLIN),
            self.frontend.as_poll_item(zmq::POLLIN),
            self.control.as_poll_item(zmq::POLLIN),
        ];
        zmq::poll(&mut items, timeout)?;
        Ok((
            items[0].is_readable(),
            items[1].is_readable(),
            items[2].is_readable(),
        ))
    }

    /// Wait at most until the nearest deadline: next heartbeat sweep,
    /// first liveness expiry, or the processing deadline of an
    /// outstanding dispatch. With no servers connected there is nothing
    /// to time, so wait indefinitely.
    fn poll_timeout(&self) -> i64 {
        if self.servers.is_empty() {
            return -1;
        }
        let mut deadline = self.next_heartbeat;
        if let Some(&slot) = self.alive_servers.front() {
            deadline = deadline.min(self.servers[slot].heartbeat_deadline);
        }
        if self.current_server.is_some() {
            deadline = deadline.min(self.processing_deadline);
        }
        timeout_ms(Instant::now(), deadline)
    }

    /// Handle a message from a server: a heartbeat echo refreshes the
    /// liveness bookkeeping, a two-frame payload is a candidate reply.
    fn backend_event(&mut self) -> Result<()> {
        let mut msg = Message::recv(&self.backend)?;
        let Some(server_id) = msg.unwrap() else {
            return Ok(());
        };
        let Some(&slot) = self.registry.get(&server_id) else {
            log::debug!("[RPC-CLIENT] frame from unknown peer dropped");
            return Ok(());
        };

        if msg.is_empty() {
            // Heartbeat echo. Dead servers re-enter the LRU queue; in
            // either case the record moves to the tail of the deadline
            // queue, which keeps it sorted by expiry.
            if self.servers[slot].alive {
                remove_index(&mut self.alive_servers, slot);
            } else {
                self.lru_queue.push_back(slot);
                self.servers[slot].alive = true;
                log::debug!("[RPC-CLIENT] server {} alive", id_text(&server_id));
            }
            self.servers[slot].heartbeat_deadline = Instant::now() + HEARTBEAT_INTERVAL;
            self.alive_servers.push_back(slot);
        } else if msg.parts() == 2 {
            // Candidate reply: only the server we dispatched to may
            // answer, and only with the current sequence number.
            // Anything else is a stale reply and vanishes here.
            if self.current_server == Some(slot) {
                let sequence = msg
                    .pop()
                    .and_then(|frame| String::from_utf8(frame).ok())
                    .and_then(|text| text.parse::<u64>().ok());
                if sequence == Some(self.sequence_nr) {
                    let body = msg.pop().unwrap_or_default();
                    self.sequence_nr += 1;
                    self.current_server = None;
                    if let Some(mut request) = self.request.take() {
                        request.body_set(body);
                        request.send(&self.frontend)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Store the user's request; dispatch happens in the chores so the
    /// LRU choice sees the freshest liveness state.
    fn frontend_event(&mut self) -> Result<()> {
        let msg = Message::recv(&self.frontend)?;
        debug_assert!(self.request.is_none());
        debug_assert!(self.current_server.is_none());
        self.request = Some(msg);
        Ok(())
    }

    /// Handle a control command. Returns true for `stop`.
    fn control_event(&mut self) -> Result<bool> {
        let mut msg = Message::recv(&self.control)?;
        let command = msg.pop().unwrap_or_default();
        match command.as_slice() {
            b"stop" => Ok(true),
            b"connect" => {
                let server_id = msg.pop().unwrap_or_default();
                let endpoint = msg
                    .pop()
                    .and_then(|frame| String::from_utf8(frame).ok())
                    .unwrap_or_default();
                assert!(
                    !self.registry.contains_key(&server_id),
                    "duplicate connect for server id {}",
                    id_text(&server_id)
                );

                let mut reply = Message::new();
                match self.backend.connect(&endpoint) {
                    Ok(()) => {
                        let slot = self.servers.len();
                        self.servers.push(ServerRecord {
                            server_id: server_id.clone(),
                            alive: false,
                            heartbeat_deadline: Instant::now(),
                        });
                        self.registry.insert(server_id, slot);
                        reply.body_set("ok");
                    }
                    Err(e) => {
                        log::warn!("[RPC-CLIENT] connect to {} failed: {}", endpoint, e);
                        reply.body_set(e.to_raw().to_string());
                        reply.push("err");
                    }
                }
                reply.send(&self.control)?;
                Ok(false)
            }
            other => {
                log::warn!(
                    "[RPC-CLIENT] unknown control command {:?}",
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

    /// Periodic chores, run once per loop iteration.
    fn run_chores(&mut self) -> Result<()> {
        let now = Instant::now();

        // Heartbeat sweep over every connected server
        if now >= self.next_heartbeat {
            self.send_heartbeats()?;
            self.next_heartbeat = now + HEARTBEAT_INTERVAL;
        }

        // Reap servers whose heartbeats stopped. The deadline queue is
        // sorted, so only the front can have expired.
        while let Some(&slot) = self.alive_servers.front() {
            if now < self.servers[slot].heartbeat_deadline {
                break;
            }
            self.alive_servers.pop_front();
            remove_index(&mut self.lru_queue, slot);
            self.servers[slot].alive = false;
            log::debug!(
                "[RPC-CLIENT] server {} died",
                id_text(&self.servers[slot].server_id)
            );
        }

        // A server sitting on our request past its deadline forfeits it;
        // the request stays pending and is re-dispatched below.
        if self.current_server.is_some() && now >= self.processing_deadline {
            self.current_server = None;
        }

        // Forward the pending request to the least recently used server
        if self.request.is_some() && self.current_server.is_none() {
            if let Some(slot) = self.lru_queue.pop_front() {
                let body: Vec<u8> = self
                    .request
                    .as_ref()
                    .and_then(Message::body)
                    .map(<[u8]>::to_vec)
                    .unwrap_or_default();

                let mut msg = Message::new();
                msg.body_set(body);
                msg.push(self.sequence_nr.to_string());
                msg.wrap(self.servers[slot].server_id.clone(), None);
                msg.send(&self.backend)?;

                self.current_server = Some(slot);
                self.processing_deadline = now + MAX_PROCESSING_TIME;
                self.lru_queue.push_back(slot);
            }
        }
        Ok(())
    }

    /// Emit `[server_id, empty]` towards every connected server.
    /// Frames for peers that are not reachable fall on the floor.
    fn send_heartbeats(&mut self) -> Result<()> {
        for slot in 0..self.servers.len() {
            let mut msg = Message::new();
            msg.wrap(self.servers[slot].server_id.clone(), Some(b""));
            match msg.send(&self.backend) {
                Ok(()) => {}
                Err(Error::Terminated) => return Err(Error::Terminated),
                Err(e) => log::debug!("[RPC-CLIENT] heartbeat send failed: {}", e),
            }
        }
        Ok(())
    }
}

/// Remove one occurrence of `index` from an ordering queue.
fn remove_index(queue: &mut VecDeque<usize>, index: usize) {
    if let Some(pos) = queue.iter().position(|&i| i == index) {
        queue.remove(pos);
    }
}

/// Printable rendering of a routing id for log lines.
fn id_text(id: &[u8]) -> String {
    String::from_utf8_lossy(id).into_owned()
}
