// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device launcher: starts a queue, forwarder or streamer device from a
//! configuration file, or automagically from the command line.
//!
//! ```text
//! zfab-device CONFIG
//! zfab-device zmq_queue tcp://*:5555 tcp://*:5556
//! ```

use std::io::Read;
use zfab::{Device, PropertyTree};

fn main() {
    let args: Vec<String> = std::env::args().collect();

    match args.len() {
        2 => start_configured_device(&args[1]),
        4 => start_automatic_device(&args[1], &args[2], &args[3]),
        _ => usage(),
    }
}

/// Start the first service configured in a JSON or text-property file.
/// `-` means read the configuration from stdin.
fn start_configured_device(filename: &str) {
    let tree = if filename == "-" {
        let mut input = String::new();
        if let Err(e) = std::io::stdin().read_to_string(&mut input) {
            fail(&format!("cannot read stdin: {}", e));
        }
        PropertyTree::from_config_str(&input)
    } else {
        match PropertyTree::load(filename) {
            Ok(tree) => tree,
            Err(e) => fail(&format!("'{}' cannot be loaded: {}", filename, e)),
        }
    };

    let device = match Device::new(tree) {
        Ok(device) => device,
        Err(e) => fail(&e.to_string()),
    };
    let Some(service) = device.service(0).map(str::to_string) else {
        fail("no service specified in configuration");
    };

    println!("I: starting device '{}'...", service);
    if let Err(e) = device.start(&service) {
        fail(&e.to_string());
    }
}

/// Start a device without a configuration file: the queue binds both
/// sides, the forwarder connects its frontend and binds its backend,
/// the streamer binds its frontend and connects its backend.
fn start_automatic_device(device_type: &str, frontend: &str, backend: &str) {
    if let Err(e) = Device::start_automatic(device_type, frontend, backend) {
        fail(&e.to_string());
    }
}

fn usage() {
    println!();
    println!("zfab-device - start a standard fabric device");
    println!();
    println!("zfab-device CONFIG | TYPE FRONTEND BACKEND");
    println!();
    println!("CONFIG:");
    println!("    Configuration file (JSON or text properties), or '-' for stdin");
    println!("TYPE:");
    println!("    'zmq_queue', 'zmq_forwarder', or 'zmq_streamer'");
    println!("FRONTEND:");
    println!("    Endpoint for the device frontend socket");
    println!("BACKEND:");
    println!("    Endpoint for the device backend socket");
}

fn fail(message: &str) -> ! {
    eprintln!("E: {}", message);
    std::process::exit(1);
}
