// Copyright (c) 2025 - Cowboy AI, Inc.
//! Weather Station Service
//!
//! Serves simulated stations: station `id` reports `id * 2.0` °C.
//!
//! Run with: cargo run --bin weather-station
//!
//! Environment:
//! - `QUORUM_TRANSPORT` - `tcp` (default) or `nats`
//! - `WEATHER_RPC_ADDR` - listen address for tcp (default `127.0.0.1:51000`)
//! - `STATION_LATENCY_MS` - delay before every reply (default 200)
//! - `STATION_SILENT` - comma separated ids that never reply
//! - `NATS_URL`, `NATS_SUBJECT_PREFIX` - see `NatsConfig`

use anyhow::{bail, Context, Result};
use cim_quorum::{
    config::{NatsConfig, TransportConfig},
    transport::{NatsResponder, RpcServer},
    weather::StationHandler,
};
use std::time::Duration;
use tracing::info;

fn handler_from_env() -> Result<StationHandler> {
    let latency_ms: u64 = match std::env::var("STATION_LATENCY_MS") {
        Ok(raw) => raw.parse().context("Invalid STATION_LATENCY_MS")?,
        Err(_) => 200,
    };

    let mut handler = StationHandler::with_latency(Duration::from_millis(latency_ms));
    if let Ok(silent) = std::env::var("STATION_SILENT") {
        for id in silent.split(',').filter(|s| !s.trim().is_empty()) {
            let id: i64 = id.trim().parse().context("Invalid STATION_SILENT id")?;
            handler = handler.silent(id);
        }
    }
    Ok(handler)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let handler = handler_from_env()?;
    info!("Station handler: {:?}", handler);

    let transport = std::env::var("QUORUM_TRANSPORT").unwrap_or_else(|_| "tcp".to_string());
    match transport.as_str() {
        "tcp" => {
            let config = TransportConfig::from_env().context("Invalid transport configuration")?;
            let server = RpcServer::bind(config.addr.as_str(), handler)
                .await
                .context("Failed to bind station service")?;
            info!("Stations listening on {}", server.local_addr());
            tokio::signal::ctrl_c().await?;
        }
        "nats" => {
            let responder = NatsResponder::start(NatsConfig::from_env(), handler)
                .await
                .context("Failed to start NATS responder")?;
            info!("Stations answering on {}", responder.subject());
            tokio::signal::ctrl_c().await?;
        }
        other => bail!("Unknown transport {:?} (expected tcp or nats)", other),
    }

    info!("Shutting down");
    Ok(())
}
