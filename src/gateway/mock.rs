//! Simulated weather source
//!
//! Generates plausible snapshots instead of calling a real API. Output is
//! seeded by location id and the current hour, so repeated fetches within
//! the same hour agree with each other.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, DurationRound, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{GatewayError, WeatherGateway};
use crate::clock::{Clock, SystemClock};
use crate::config::GatewayConfig;
use crate::data::{
    get_location_by_id, AirQuality, AlertSeverity, CurrentConditions, DailyForecast,
    HourlyForecast, LocationSummary, Pollen, PollenLevel, WeatherAlert, WeatherCondition,
    WeatherSnapshot,
};

/// Hours of hourly forecast in a generated snapshot
pub const HOURLY_HOURS: usize = 48;

/// Days of daily forecast in a generated snapshot
pub const DAILY_DAYS: usize = 10;

const CURRENT_CONDITIONS: [WeatherCondition; 4] = [
    WeatherCondition::Sunny,
    WeatherCondition::PartlyCloudy,
    WeatherCondition::Cloudy,
    WeatherCondition::Rainy,
];

/// Hours of hourly forecast checked for thunderstorms
const STORM_LOOKAHEAD_HOURS: usize = 12;

const HIGH_UV_INDEX: u8 = 9;

const UNHEALTHY_AQI: u32 = 100;

const WIND_DIRECTIONS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];

const SUMMARIES: [&str; 5] = [
    "Pleasant weather expected",
    "Ideal conditions for outdoor activities",
    "Typical seasonal weather",
    "Comfortable temperatures throughout the day",
    "Great day to be outside",
];

/// Weather source backed by a seeded random generator
#[derive(Debug)]
pub struct MockWeatherGateway {
    clock: Arc<dyn Clock>,
    latency: Duration,
    reachable: AtomicBool,
    fetches: AtomicU64,
}

impl Default for MockWeatherGateway {
    fn default() -> Self {
        Self::new(&GatewayConfig::default())
    }
}

impl MockWeatherGateway {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            clock: Arc::new(SystemClock),
            latency: Duration::from_millis(config.latency_ms),
            reachable: AtomicBool::new(true),
            fetches: AtomicU64::new(0),
        }
    }

    /// Replaces the clock used to timestamp generated snapshots
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Simulates losing (or regaining) the network path to the source
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Number of fetches attempted so far
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Builds the snapshot for `location_id` as of `now`
    pub fn generate(&self, location_id: &str, now: DateTime<Utc>) -> WeatherSnapshot {
        let hour = now.duration_trunc(ChronoDuration::hours(1)).unwrap_or(now);
        let midnight = now.duration_trunc(ChronoDuration::days(1)).unwrap_or(now);
        let mut rng = StdRng::seed_from_u64(seed_for(location_id, hour));

        let condition = *CURRENT_CONDITIONS
            .choose(&mut rng)
            .unwrap_or(&WeatherCondition::PartlyCloudy);
        let base_temp = 65.0 + rng.gen::<f64>() * 25.0;

        let current = CurrentConditions {
            temperature: base_temp.round() as i32,
            feels_like: (base_temp + (rng.gen::<f64>() - 0.5) * 8.0).round() as i32,
            humidity: rng.gen_range(40..80),
            wind_speed: rng.gen_range(3..18),
            wind_direction: WIND_DIRECTIONS
                .choose(&mut rng)
                .copied()
                .unwrap_or("N")
                .to_string(),
            visibility: rng.gen_range(5..15),
            pressure: rng.gen_range(1000..1050),
            condition,
            description: condition.description().to_string(),
            precipitation_chance: rng.gen_range(0..60),
            uv_index: rng.gen_range(1..11),
            high_today: (base_temp + 5.0).round() as i32,
            low_today: (base_temp - 10.0).round() as i32,
            sunrise: midnight + ChronoDuration::minutes(6 * 60 + 30),
            sunset: midnight + ChronoDuration::minutes(18 * 60 + 30),
            air_quality: AirQuality {
                aqi: rng.gen_range(20..120),
                pm25: rng.gen_range(5..35),
                ozone: rng.gen_range(40..120),
            },
            pollen: Pollen {
                overall: *[PollenLevel::Low, PollenLevel::Moderate, PollenLevel::High]
                    .choose(&mut rng)
                    .unwrap_or(&PollenLevel::Low),
                tree: rng.gen_range(0..5),
                grass: rng.gen_range(0..5),
                weed: rng.gen_range(0..5),
            },
        };

        let hourly: Vec<HourlyForecast> = (0..HOURLY_HOURS)
            .map(|i| HourlyForecast {
                time: hour + ChronoDuration::hours(i as i64),
                temperature: (base_temp + (rng.gen::<f64>() - 0.5) * 10.0).round() as i32,
                condition: if i % 6 == 0 {
                    random_condition(&mut rng)
                } else {
                    condition
                },
                precipitation_chance: rng.gen_range(0..50),
                wind_speed: rng.gen_range(4..16),
            })
            .collect();

        let daily = (0..DAILY_DAYS)
            .map(|i| DailyForecast {
                date: (midnight + ChronoDuration::days(i as i64)).date_naive(),
                high: (base_temp + (rng.gen::<f64>() - 0.3) * 15.0).round() as i32,
                low: (base_temp - 15.0 + (rng.gen::<f64>() - 0.3) * 10.0).round() as i32,
                condition: random_condition(&mut rng),
                summary: SUMMARIES
                    .choose(&mut rng)
                    .copied()
                    .unwrap_or(SUMMARIES[0])
                    .to_string(),
                precipitation_chance: rng.gen_range(0..70),
                wind_speed: rng.gen_range(5..20),
            })
            .collect();

        let alerts = alerts_for(location_id, &current, &hourly, hour);

        WeatherSnapshot {
            location_id: location_id.to_string(),
            location: get_location_by_id(location_id).map(LocationSummary::from),
            current,
            hourly,
            daily,
            alerts,
            last_updated: now,
        }
    }
}

#[async_trait]
impl WeatherGateway for MockWeatherGateway {
    async fn fetch_weather(&self, location_id: &str) -> Result<WeatherSnapshot, GatewayError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if !self.reachable.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport(
                "weather service unreachable".to_string(),
            ));
        }
        if location_id.trim().is_empty() {
            return Err(GatewayError::NotFound(location_id.to_string()));
        }

        debug!(location_id, "Generated weather snapshot");
        Ok(self.generate(location_id, self.clock.now()))
    }
}

/// Alerts implied by the generated conditions, most severe first
fn alerts_for(
    location_id: &str,
    current: &CurrentConditions,
    hourly: &[HourlyForecast],
    hour: DateTime<Utc>,
) -> Vec<WeatherAlert> {
    let mut alerts = Vec::new();
    let alert = |kind: &str,
                 severity: AlertSeverity,
                 title: &str,
                 description: String,
                 starts_at: DateTime<Utc>,
                 hours: i64| WeatherAlert {
        id: format!("{}-{}-{}", location_id, kind, starts_at.timestamp()),
        severity,
        title: title.to_string(),
        description,
        starts_at,
        ends_at: starts_at + ChronoDuration::hours(hours),
    };

    if let Some(storm) = hourly
        .iter()
        .take(STORM_LOOKAHEAD_HOURS)
        .find(|forecast| forecast.condition == WeatherCondition::Stormy)
    {
        alerts.push(alert(
            "storm",
            AlertSeverity::Warning,
            "Severe Thunderstorm Warning",
            format!(
                "Thunderstorms expected from {} with winds up to {} mph",
                storm.time.format("%H:%M UTC"),
                storm.wind_speed + 20
            ),
            storm.time,
            3,
        ));
    }

    if current.uv_index >= HIGH_UV_INDEX {
        alerts.push(alert(
            "uv",
            AlertSeverity::Watch,
            "High UV Index",
            format!("UV index of {}; limit time in direct sun", current.uv_index),
            hour,
            8,
        ));
    }

    if current.air_quality.aqi >= UNHEALTHY_AQI {
        alerts.push(alert(
            "air",
            AlertSeverity::Advisory,
            "Air Quality Advisory",
            format!(
                "AQI of {}; sensitive groups should reduce outdoor activity",
                current.air_quality.aqi
            ),
            hour,
            12,
        ));
    }

    alerts.sort_by(|a, b| b.severity.cmp(&a.severity));
    alerts
}

fn random_condition(rng: &mut StdRng) -> WeatherCondition {
    *WeatherCondition::ALL
        .choose(rng)
        .unwrap_or(&WeatherCondition::PartlyCloudy)
}

/// FNV-1a over the location id, mixed with the hour bucket
fn seed_for(location_id: &str, hour: DateTime<Utc>) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in location_id.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash ^ (hour.timestamp() as u64)
}
