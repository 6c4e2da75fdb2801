// Copyright (c) 2025 - Cowboy AI, Inc.
//! Weather Gather Driver
//!
//! Asks a set of weather stations for their temperature and reports the
//! first quorum of replies that arrives before the deadline.
//!
//! Run with: cargo run --bin weather-gather
//!
//! Environment:
//! - `QUORUM_TRANSPORT` - `tcp` (default) or `nats`
//! - `WEATHER_STATIONS` - ids as a range (`2-11`) or a list (`2,3,5`); default `2-11`
//! - `WEATHER_HEAT_WAVE` - set to `1` to keep only heat-wave readings
//! - `QUORUM_TARGET`, `QUORUM_DEADLINE_MS` - see `GatherConfig`
//! - `WEATHER_RPC_ADDR`, `WEATHER_CONNECT_TIMEOUT_MS` - see `TransportConfig`
//! - `NATS_URL`, `NATS_SUBJECT_PREFIX` - see `NatsConfig`

use anyhow::{bail, Context, Result};
use cim_quorum::{
    config::{GatherConfig, NatsConfig, TransportConfig},
    gather::Gather,
    transport::{NatsTransport, TcpTransport, Transport},
    weather::{get_weather_data, heat_wave_warning},
};
use std::sync::Arc;
use tracing::{info, warn};

/// Configuration for the driver
#[derive(Debug, Clone)]
struct DriverConfig {
    transport: String,
    stations: Vec<i64>,
    heat_wave_only: bool,
    gather: GatherConfig,
}

impl DriverConfig {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        let transport = std::env::var("QUORUM_TRANSPORT").unwrap_or_else(|_| "tcp".to_string());

        let stations = parse_stations(
            &std::env::var("WEATHER_STATIONS").unwrap_or_else(|_| "2-11".to_string()),
        )?;

        let heat_wave_only = std::env::var("WEATHER_HEAT_WAVE")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let gather = GatherConfig::from_env().context("Invalid gather configuration")?;

        Ok(Self {
            transport,
            stations,
            heat_wave_only,
            gather,
        })
    }
}

/// Parse `2-11` or `2,3,5` into station ids
fn parse_stations(raw: &str) -> Result<Vec<i64>> {
    if let Some((start, end)) = raw.split_once('-') {
        let start: i64 = start.trim().parse().context("Invalid station range start")?;
        let end: i64 = end.trim().parse().context("Invalid station range end")?;
        if end < start {
            bail!("Empty station range {}", raw);
        }
        return Ok((start..=end).collect());
    }

    raw.split(',')
        .map(|id| id.trim().parse::<i64>().context("Invalid station id"))
        .collect()
}

async fn connect(kind: &str) -> Result<Arc<dyn Transport>> {
    match kind {
        "tcp" => {
            let config = TransportConfig::from_env().context("Invalid transport configuration")?;
            info!("Connecting to stations at {}", config.addr);
            let transport = TcpTransport::connect(&config)
                .await
                .context("Failed to connect to station service")?;
            Ok(Arc::new(transport))
        }
        "nats" => {
            let config = NatsConfig::from_env();
            info!("Connecting to NATS at {:?}", config.servers);
            let transport = NatsTransport::new(config)
                .await
                .context("Failed to connect to NATS")?;
            Ok(Arc::new(transport))
        }
        other => bail!("Unknown transport {:?} (expected tcp or nats)", other),
    }
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

    let config = DriverConfig::from_env()?;
    let target = config.gather.target_for(config.stations.len());
    info!("Configuration loaded:");
    info!("  - Transport: {}", config.transport);
    info!("  - Stations: {:?}", config.stations);
    info!("  - Target: {}", target);
    info!("  - Deadline: {:?}", config.gather.deadline());
    info!("  - Heat wave only: {}", config.heat_wave_only);

    let transport = connect(&config.transport).await?;

    let readings = config
        .stations
        .iter()
        .map(|&id| get_weather_data(Arc::clone(&transport), id))
        .collect();

    let mut gather = Gather::new(readings)
        .target(target)
        .deadline(config.gather.deadline());
    if config.heat_wave_only {
        gather = gather.filter(heat_wave_warning);
    }
    let gathered = gather.run().await;

    info!(
        "Gather finished ({}) after {:?}: {} accepted, {} rejected, {} abandoned, {} pending",
        gathered.exit,
        gathered.elapsed,
        gathered.accepted.len(),
        gathered.rejected,
        gathered.abandoned,
        gathered.pending
    );

    for reading in &gathered.accepted {
        match reading {
            Ok(temperature) => info!("  - {:.1} °C", temperature),
            Err(e) => warn!("  - station error: {}", e),
        }
    }

    if !gathered.reached_target() {
        warn!("Quorum of {} not reached", target);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_station_range() {
        assert_eq!(parse_stations("2-5").unwrap(), vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_parse_station_list() {
        assert_eq!(parse_stations("7, 3,9").unwrap(), vec![7, 3, 9]);
    }

    #[test]
    fn test_parse_station_garbage() {
        assert!(parse_stations("north").is_err());
        assert!(parse_stations("9-2").is_err());
    }
}
