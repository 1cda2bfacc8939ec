//! Weather data sources
//!
//! The data access layer depends only on the `WeatherGateway` trait; how the
//! snapshot is produced (a simulated generator here, an HTTP API elsewhere)
//! stays behind it.

mod mock;

pub use mock::MockWeatherGateway;

use async_trait::async_trait;
use thiserror::Error;

use crate::data::WeatherSnapshot;

/// Errors that can occur when fetching weather data
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The source could not be reached
    #[error("Network request failed: {0}")]
    Transport(String),

    /// The source answered but had no data for the location
    #[error("No weather data for location {0}")]
    NotFound(String),
}

/// Fetches a fresh weather snapshot for a location
#[async_trait]
pub trait WeatherGateway: Send + Sync {
    async fn fetch_weather(&self, location_id: &str) -> Result<WeatherSnapshot, GatewayError>;
}
