// Copyright (c) 2025 - Cowboy AI, Inc.
//! Test Fixtures for cim-quorum
//!
//! Simulated workers with controllable latency and reliability, plus a
//! helper that starts a station service on an ephemeral port.
//!
//! # Design Principles
//! - Latencies are whole milliseconds so paused-clock tests stay exact
//! - Workers never block a thread; they sleep on the tokio timer

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use cim_quorum::config::TransportConfig;
use cim_quorum::eventual::{self, Eventual};
use cim_quorum::transport::{RpcServer, TcpTransport, Transport};
use cim_quorum::weather::StationHandler;
use rand::Rng;

/// Peers in the standard fan-out
pub const PEERS: usize = 10;

/// Deadline used by the scenario tests
pub const DEADLINE: Duration = Duration::from_millis(300);

/// A worker that answers with a random number after 100-299ms
///
/// Stragglers answer after 400-799ms instead. Unreliable workers wait the
/// same time and then abandon their value.
pub fn slow_function(straggler: bool, unreliable: bool) -> Eventual<u32> {
    let mut rng = rand::thread_rng();
    let delay = if straggler {
        rng.gen_range(400..800)
    } else {
        rng.gen_range(100..300)
    };
    let value = rng.gen_range(0..=10_000);

    eventual::spawn_optional(async move {
        tokio::time::sleep(Duration::from_millis(delay)).await;
        if unreliable {
            None
        } else {
            Some(value)
        }
    })
}

/// A worker that answers `value` after exactly `delay_ms`
pub fn answer_after(value: u32, delay_ms: u64) -> Eventual<u32> {
    eventual::spawn(async move {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        value
    })
}

/// Start `handler` on an ephemeral port and connect a client to it
pub async fn station_service(handler: StationHandler) -> (RpcServer, Arc<dyn Transport>) {
    let server = RpcServer::bind("127.0.0.1:0", handler)
        .await
        .expect("Failed to bind station service");

    let config = TransportConfig {
        addr: server.local_addr().to_string(),
        ..TransportConfig::default()
    };
    let transport = TcpTransport::connect(&config)
        .await
        .expect("Failed to connect to station service");

    (server, Arc::new(transport))
}
