//! Core data models for the weather dashboard
//!
//! The snapshot types mirror the JSON the dashboard renders, so they
//! serialize with camelCase field names and are stored verbatim in the
//! offline cache.

pub mod location;

pub use location::{get_location_by_id, search_locations, LOCATIONS};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A location the dashboard can show weather for
///
/// Uses `&'static str` fields so the catalog can be a static array; only
/// `Serialize` is derived for that reason. Snapshots embed an owned
/// `LocationSummary` instead.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Location {
    pub id: &'static str,
    pub name: &'static str,
    pub region: &'static str,
    pub country: &'static str,
    pub latitude: f64,
    pub longitude: f64,
}

/// Display details of the location a snapshot belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSummary {
    pub name: String,
    pub region: String,
    pub country: String,
}

impl From<&Location> for LocationSummary {
    fn from(location: &Location) -> Self {
        Self {
            name: location.name.to_string(),
            region: location.region.to_string(),
            country: location.country.to_string(),
        }
    }
}

/// Everything the dashboard shows for one location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherSnapshot {
    pub location_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationSummary>,
    pub current: CurrentConditions,
    pub hourly: Vec<HourlyForecast>,
    pub daily: Vec<DailyForecast>,
    #[serde(default)]
    pub alerts: Vec<WeatherAlert>,
    pub last_updated: DateTime<Utc>,
}

/// Current conditions (temperatures in °F, speeds in mph)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentConditions {
    pub temperature: i32,
    pub feels_like: i32,
    /// Relative humidity percentage (0-100)
    pub humidity: u8,
    pub wind_speed: u32,
    /// Compass point the wind blows from (e.g. "NW")
    pub wind_direction: String,
    /// Visibility in miles
    pub visibility: u32,
    /// Pressure in hPa
    pub pressure: u32,
    pub condition: WeatherCondition,
    pub description: String,
    pub precipitation_chance: u8,
    pub uv_index: u8,
    pub high_today: i32,
    pub low_today: i32,
    pub sunrise: DateTime<Utc>,
    pub sunset: DateTime<Utc>,
    pub air_quality: AirQuality,
    pub pollen: Pollen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AirQuality {
    pub aqi: u32,
    pub pm25: u32,
    pub ozone: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pollen {
    pub overall: PollenLevel,
    pub tree: u8,
    pub grass: u8,
    pub weed: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PollenLevel {
    Low,
    Moderate,
    High,
}

/// Forecast for a single hour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyForecast {
    pub time: DateTime<Utc>,
    pub temperature: i32,
    pub condition: WeatherCondition,
    pub precipitation_chance: u8,
    pub wind_speed: u32,
}

/// Forecast for a single day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyForecast {
    pub date: NaiveDate,
    pub high: i32,
    pub low: i32,
    pub condition: WeatherCondition,
    pub summary: String,
    pub precipitation_chance: u8,
    pub wind_speed: u32,
}

/// Hourly and daily series cut from one snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub hourly: Vec<HourlyForecast>,
    pub daily: Vec<DailyForecast>,
}

/// An active weather alert for a location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherAlert {
    pub id: String,
    pub severity: AlertSeverity,
    pub title: String,
    pub description: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Advisory,
    Watch,
    Warning,
}

impl AlertSeverity {
    /// Badge text shown next to an alert
    pub fn label(&self) -> &'static str {
        match self {
            AlertSeverity::Advisory => "ADVISORY",
            AlertSeverity::Watch => "WATCH",
            AlertSeverity::Warning => "WARNING",
        }
    }
}

/// Types of weather conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WeatherCondition {
    Sunny,
    PartlyCloudy,
    Cloudy,
    Rainy,
    Stormy,
}

impl WeatherCondition {
    /// All conditions, in increasing order of severity
    pub const ALL: [WeatherCondition; 5] = [
        WeatherCondition::Sunny,
        WeatherCondition::PartlyCloudy,
        WeatherCondition::Cloudy,
        WeatherCondition::Rainy,
        WeatherCondition::Stormy,
    ];

    /// Human-readable description shown next to the condition icon
    pub fn description(&self) -> &'static str {
        match self {
            WeatherCondition::Sunny => "Sunny",
            WeatherCondition::PartlyCloudy => "Partly Cloudy",
            WeatherCondition::Cloudy => "Cloudy",
            WeatherCondition::Rainy => "Light Rain",
            WeatherCondition::Stormy => "Thunderstorms",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_weather_condition_uses_kebab_case() {
        let json = serde_json::to_string(&WeatherCondition::PartlyCloudy).unwrap();
        assert_eq!(json, "\"partly-cloudy\"");

        let parsed: WeatherCondition = serde_json::from_str("\"stormy\"").unwrap();
        assert_eq!(parsed, WeatherCondition::Stormy);
    }

    #[test]
    fn test_weather_condition_descriptions() {
        assert_eq!(WeatherCondition::Sunny.description(), "Sunny");
        assert_eq!(WeatherCondition::Rainy.description(), "Light Rain");
        assert_eq!(WeatherCondition::Stormy.description(), "Thunderstorms");
    }

    #[test]
    fn test_alert_severity_orders_by_urgency() {
        assert!(AlertSeverity::Warning > AlertSeverity::Watch);
        assert!(AlertSeverity::Watch > AlertSeverity::Advisory);
    }

    #[test]
    fn test_location_summary_from_catalog_entry() {
        let location = get_location_by_id("1").unwrap();
        let summary = LocationSummary::from(location);
        assert_eq!(summary.name, "San Francisco");
        assert_eq!(summary.country, "United States");
    }

    #[test]
    fn test_hourly_forecast_serializes_camel_case() {
        let hour = HourlyForecast {
            time: Utc.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap(),
            temperature: 68,
            condition: WeatherCondition::Cloudy,
            precipitation_chance: 20,
            wind_speed: 8,
        };

        let value = serde_json::to_value(&hour).unwrap();

        assert_eq!(value["precipitationChance"], 20);
        assert_eq!(value["windSpeed"], 8);
        assert_eq!(value["condition"], "cloudy");
    }

    #[test]
    fn test_alert_severity_labels_and_serialization() {
        assert_eq!(AlertSeverity::Warning.label(), "WARNING");
        assert_eq!(
            serde_json::to_string(&AlertSeverity::Advisory).unwrap(),
            "\"advisory\""
        );
    }
}
