// Copyright (c) 2025 - Cowboy AI, Inc.
//! Weather Station Quorum
//!
//! Asks many weather stations for their temperature and keeps the first
//! timely, valid readings. The station side is a [`StationHandler`] that
//! can be served over any transport.
//!
//! # Example
//!
//! ```rust,no_run
//! use cim_quorum::config::TransportConfig;
//! use cim_quorum::gather::Gather;
//! use cim_quorum::transport::{TcpTransport, Transport};
//! use cim_quorum::weather::{get_weather_data, heat_wave_warning};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport: Arc<dyn Transport> =
//!         Arc::new(TcpTransport::connect(&TransportConfig::default()).await?);
//!
//!     let readings = (2..12)
//!         .map(|id| get_weather_data(Arc::clone(&transport), id))
//!         .collect();
//!
//!     let hot = Gather::new(readings)
//!         .target(3)
//!         .deadline(Duration::from_secs(2))
//!         .filter(heat_wave_warning)
//!         .run()
//!         .await;
//!     println!("{} stations report a heat wave", hot.accepted.len());
//!     Ok(())
//! }
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{QuorumError, QuorumResult};
use crate::eventual::{self, Eventual};
use crate::request;
use crate::transport::{RequestHandler, Transport};

/// Method name stations answer to
pub const GET_TEMPERATURE: &str = "WeatherService.GetTemperature";

/// Readings strictly above this count as a heat wave
pub const HEAT_WAVE_THRESHOLD_CELSIUS: f64 = 35.0;

/// Ask a station for its current temperature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemperatureRequest {
    pub station_id: String,
}

impl TemperatureRequest {
    pub fn for_station(id: i64) -> Self {
        Self {
            station_id: id.to_string(),
        }
    }
}

/// A station's temperature reading in degrees Celsius
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureResponse {
    pub temperature: f64,
}

/// A reading, or the reason the station could not give one
pub type WeatherData = QuorumResult<f64>;

/// Request the temperature from station `id`
///
/// Returns at once; the reading arrives through the `Eventual`.
pub fn get_weather_data(transport: Arc<dyn Transport>, id: i64) -> Eventual<WeatherData> {
    fetch_temperature(transport, id.to_string())
}

/// Request the temperature for a raw station id
///
/// Ids are validated by the station, so a malformed id still completes,
/// with [`QuorumError::Validation`].
pub fn fetch_temperature(
    transport: Arc<dyn Transport>,
    station_id: impl Into<String>,
) -> Eventual<WeatherData> {
    let body = TemperatureRequest {
        station_id: station_id.into(),
    };
    eventual::spawn(async move {
        request::call::<_, TemperatureResponse>(transport, GET_TEMPERATURE.to_string(), body)
            .await
            .map(|response| response.temperature)
    })
}

/// Keep only successful readings above [`HEAT_WAVE_THRESHOLD_CELSIUS`]
pub fn heat_wave_warning(data: &WeatherData) -> bool {
    matches!(data, Ok(temperature) if *temperature > HEAT_WAVE_THRESHOLD_CELSIUS)
}

/// Station service reporting `id * 2.0` degrees
///
/// Latency and silence are configurable so a fleet of stations can be
/// simulated from one handler.
#[derive(Debug, Clone)]
pub struct StationHandler {
    latency: Duration,
    slow: Option<(i64, Duration)>,
    silent: BTreeSet<i64>,
}

impl Default for StationHandler {
    fn default() -> Self {
        Self::with_latency(Duration::from_millis(200))
    }
}

impl StationHandler {
    /// Every station answers after `latency`
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            slow: None,
            silent: BTreeSet::new(),
        }
    }

    /// Stations with an id above `above` take `extra` longer
    pub fn slow_above(mut self, above: i64, extra: Duration) -> Self {
        self.slow = Some((above, extra));
        self
    }

    /// Station `id` accepts requests and never answers
    pub fn silent(mut self, id: i64) -> Self {
        self.silent.insert(id);
        self
    }

    /// The reading station `id` reports
    pub fn reading(id: i64) -> f64 {
        id as f64 * 2.0
    }
}

#[async_trait]
impl RequestHandler for StationHandler {
    type Request = TemperatureRequest;
    type Response = TemperatureResponse;

    fn method(&self) -> &str {
        GET_TEMPERATURE
    }

    async fn handle(&self, request: TemperatureRequest) -> QuorumResult<TemperatureResponse> {
        let id: i64 = request.station_id.trim().parse().map_err(|_| {
            warn!("Rejecting station id {:?}", request.station_id);
            QuorumError::Validation("invalid station ID".to_string())
        })?;

        tokio::time::sleep(self.latency).await;

        if self.silent.contains(&id) {
            debug!("Station {} is not answering", id);
            futures::future::pending::<()>().await;
        }

        if let Some((above, extra)) = self.slow {
            if id > above {
                tokio::time::sleep(extra).await;
            }
        }

        Ok(TemperatureResponse {
            temperature: Self::reading(id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventual::Outcome;
    use serde_json::Value;

    /// Calls the handler in-process, no wire involved
    struct Local(StationHandler);

    #[async_trait]
    impl Transport for Local {
        async fn call(&self, method: &str, params: Value) -> QuorumResult<Value> {
            assert_eq!(method, GET_TEMPERATURE);
            let request: TemperatureRequest = serde_json::from_value(params)?;
            let response = self.0.handle(request).await?;
            Ok(serde_json::to_value(response)?)
        }
    }

    fn local(handler: StationHandler) -> Arc<dyn Transport> {
        Arc::new(Local(handler))
    }

    #[test]
    fn test_heat_wave_warning() {
        assert!(heat_wave_warning(&Ok(35.5)));
        assert!(!heat_wave_warning(&Ok(35.0)));
        assert!(!heat_wave_warning(&Ok(-4.0)));
        assert!(!heat_wave_warning(&Err(QuorumError::Disconnected)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_station_reports_double_its_id() {
        let reading = get_weather_data(local(StationHandler::default()), 21);

        assert_eq!(reading.observe().await, Outcome::Completed(Ok(42.0)));
    }

    #[tokio::test]
    async fn test_invalid_station_id_completes_with_validation_error() {
        let reading = fetch_temperature(local(StationHandler::default()), "north-ridge");

        assert_eq!(
            reading.observe().await,
            Outcome::Completed(Err(QuorumError::Validation(
                "invalid station ID".to_string()
            )))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_station_never_completes() {
        let handler = StationHandler::default().silent(1);
        let reading = get_weather_data(local(handler), 1);

        tokio::time::sleep(Duration::from_secs(30)).await;

        assert!(!reading.is_terminal());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_stations_answer_late() {
        let handler = StationHandler::default().slow_above(7, Duration::from_millis(400));
        let transport = local(handler);
        let fast = get_weather_data(Arc::clone(&transport), 7);
        let slow = get_weather_data(transport, 8);

        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(fast.try_outcome(), Some(Outcome::Completed(Ok(14.0))));
        assert_eq!(slow.try_outcome(), None);

        assert_eq!(slow.observe().await, Outcome::Completed(Ok(16.0)));
    }

    #[test]
    fn test_request_wire_format() {
        let encoded = serde_json::to_value(TemperatureRequest::for_station(3)).unwrap();
        assert_eq!(encoded, serde_json::json!({"station_id": "3"}));
    }
}
