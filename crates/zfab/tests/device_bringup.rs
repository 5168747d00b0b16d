// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bringing up proxy devices from configuration and from the automatic
//! conventions, then pushing traffic through them.

use std::thread;
use std::time::Duration;
use zfab::{Device, PropertyTree};

const QUEUE_CONFIG: &str = "\
main
    type = zmq_queue
    frontend
        bind = inproc://device-queue-frontend
    backend
        bind = inproc://device-queue-backend
";

#[test]
fn queue_device_brokers_requests() {
    let device = Device::new(PropertyTree::from_zpl(QUEUE_CONFIG)).unwrap();
    assert_eq!(device.service(0), Some("main"));
    let context = device.context().clone();

    thread::spawn(move || {
        let _ = device.start("main");
    });
    thread::sleep(Duration::from_millis(100));

    let worker = context.socket(zmq::REP).unwrap();
    worker.connect("inproc://device-queue-backend").unwrap();
    let client = context.socket(zmq::REQ).unwrap();
    client.connect("inproc://device-queue-frontend").unwrap();

    client.send("hello", 0).unwrap();
    let request = worker.recv_string(0).unwrap().unwrap();
    assert_eq!(request, "hello");
    worker.send("world", 0).unwrap();
    let reply = client.recv_string(0).unwrap().unwrap();
    assert_eq!(reply, "world");
}

#[test]
fn forwarder_device_relays_publications() {
    let config = "\
main
    type = zmq_forwarder
    frontend
        option
            subscribe = ''
        connect = inproc://device-fwd-upstream
    backend
        bind = inproc://device-fwd-downstream
";
    let device = Device::new(PropertyTree::from_zpl(config)).unwrap();
    let context = device.context().clone();

    // The forwarder connects upstream, so the publisher binds first
    let publisher = context.socket(zmq::PUB).unwrap();
    publisher.bind("inproc://device-fwd-upstream").unwrap();

    thread::spawn(move || {
        let _ = device.start("main");
    });
    thread::sleep(Duration::from_millis(100));

    let subscriber = context.socket(zmq::SUB).unwrap();
    subscriber.set_subscribe(b"").unwrap();
    subscriber.connect("inproc://device-fwd-downstream").unwrap();
    thread::sleep(Duration::from_millis(100));

    // Publish until the relay delivers; pub/sub joins are asynchronous
    let mut delivered = None;
    for _ in 0..50 {
        publisher.send("tick", 0).unwrap();
        match subscriber.recv_string(zmq::DONTWAIT) {
            Ok(Ok(text)) => {
                delivered = Some(text);
                break;
            }
            _ => thread::sleep(Duration::from_millis(20)),
        }
    }
    assert_eq!(delivered.as_deref(), Some("tick"));
}

#[test]
fn automatic_streamer_pipes_messages() {
    thread::spawn(|| {
        let _ = Device::start_automatic(
            "zmq_streamer",
            "tcp://127.0.0.1:28655",
            "tcp://127.0.0.1:28656",
        );
    });

    let context = zmq::Context::new();
    let sink = context.socket(zmq::PULL).unwrap();
    sink.bind("tcp://127.0.0.1:28656").unwrap();
    let source = context.socket(zmq::PUSH).unwrap();
    source.connect("tcp://127.0.0.1:28655").unwrap();

    source.send("payload", 0).unwrap();
    sink.set_rcvtimeo(5000).unwrap();
    let delivered = sink.recv_string(0).unwrap().unwrap();
    assert_eq!(delivered, "payload");
}

#[test]
fn device_loads_json_configuration() {
    let json = r#"
    {
        "context": { "iothreads": 1, "verbose": 0 },
        "relay": {
            "type": "zmq_streamer",
            "frontend": { "bind": "inproc://device-json-frontend" },
            "backend": { "connect": "inproc://device-json-backend" }
        }
    }
    "#;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("relay.json");
    std::fs::write(&path, json).unwrap();

    let device = Device::load(&path).unwrap();
    assert_eq!(device.service(0), Some("relay"));
    assert_eq!(device.property("relay", "type"), "zmq_streamer");
    assert_eq!(
        device.property("relay", "frontend/bind"),
        "inproc://device-json-frontend"
    );
}
