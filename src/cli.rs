//! Command-line interface parsing for hypercast
//!
//! This module handles parsing of CLI arguments using clap, including the
//! global `--offline` flag that simulates a host without connectivity and
//! the `--ttl` duration syntax (`90s`, `30m`, `6h`, `2d`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// The TTL is not a positive number followed by s, m, h or d
    #[error("Invalid TTL: '{0}'. Use a positive number with a unit, e.g. 90s, 30m, 6h, 2d")]
    InvalidTtl(String),

    /// Location ids cannot be blank
    #[error("Invalid location: '{0}'. Location ids cannot be empty")]
    InvalidLocation(String),

    /// A capacity of zero would evict every entry on write
    #[error("Invalid cache capacity: {0}. Must be at least 1")]
    InvalidCapacity(usize),
}

/// hypercast - offline-aware weather lookups
#[derive(Parser, Debug)]
#[command(name = "hypercast")]
#[command(about = "Weather lookups backed by an offline cache")]
#[command(version)]
pub struct Cli {
    /// Directory holding the persisted cache and network status
    #[arg(long, value_name = "DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Start as if the host had no network connectivity
    #[arg(long, global = true)]
    pub offline: bool,

    /// Override the maximum number of cached entries
    #[arg(long, value_name = "N", global = true)]
    pub max_entries: Option<usize>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show weather for a location
    Weather {
        #[arg(value_parser = parse_location_arg)]
        location: String,
        /// Fetch even if a valid cached entry exists
        #[arg(long)]
        refresh: bool,
        /// Neither read nor write the cache
        #[arg(long)]
        no_cache: bool,
        /// Lifetime of the cached result (e.g. 30m, 6h)
        #[arg(long, value_parser = parse_ttl_arg)]
        ttl: Option<Duration>,
    },
    /// Show the hourly and daily forecast for a location
    Forecast {
        #[arg(value_parser = parse_location_arg)]
        location: String,
        #[arg(long, default_value_t = 48)]
        hours: usize,
        #[arg(long, default_value_t = 10)]
        days: usize,
    },
    /// Cache weather for locations ahead of going offline
    Preload {
        #[arg(required = true, value_parser = parse_location_arg)]
        locations: Vec<String>,
    },
    /// Search known locations by name, region or country
    Search { query: String },
    /// Inspect or maintain the offline cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Inspect or simulate connectivity changes
    Network {
        #[command(subcommand)]
        action: NetworkAction,
    },
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAction {
    /// Entry counts, storage size and network status
    Info,
    /// Drop every cached entry
    Clear,
    /// Sweep expired entries and trim to the low-water mark
    Cleanup,
    /// List cached weather locations, newest first
    Locations,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkAction {
    /// Show the persisted network status
    Status,
    /// Record a transition to online
    Online,
    /// Record a transition to offline
    Offline,
}

/// Settings derived from CLI arguments for application startup
#[derive(Debug, Clone)]
pub struct StartupConfig {
    /// Configuration after CLI overrides
    pub config: Config,
    /// Storage directory, if overridden
    pub data_dir: Option<PathBuf>,
    /// Host reachability at startup
    pub online: bool,
}

impl StartupConfig {
    /// Applies CLI overrides on top of the loaded configuration.
    pub fn from_cli(cli: &Cli, mut config: Config) -> Result<Self, CliError> {
        if let Some(max_entries) = cli.max_entries {
            if max_entries == 0 {
                return Err(CliError::InvalidCapacity(max_entries));
            }
            config.cache.max_entries = max_entries;
        }

        Ok(StartupConfig {
            config,
            data_dir: cli.data_dir.clone(),
            online: !cli.offline,
        })
    }
}

/// Parses a location id argument, trimming surrounding whitespace.
pub fn parse_location_arg(s: &str) -> Result<String, CliError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(CliError::InvalidLocation(s.to_string()));
    }
    Ok(trimmed.to_string())
}

/// Parses a TTL such as `90s`, `30m`, `6h` or `2d`.
///
/// A bare number is taken as seconds. Zero is rejected.
pub fn parse_ttl_arg(s: &str) -> Result<Duration, CliError> {
    let invalid = || CliError::InvalidTtl(s.to_string());
    let trimmed = s.trim();

    let (digits, unit_secs) = match trimmed.char_indices().last() {
        Some((i, 's')) => (&trimmed[..i], 1),
        Some((i, 'm')) => (&trimmed[..i], 60),
        Some((i, 'h')) => (&trimmed[..i], 60 * 60),
        Some((i, 'd')) => (&trimmed[..i], 24 * 60 * 60),
        Some(_) => (trimmed, 1),
        None => return Err(invalid()),
    };

    let amount: u64 = digits.parse().map_err(|_| invalid())?;
    if amount == 0 {
        return Err(invalid());
    }
    amount
        .checked_mul(unit_secs)
        .map(Duration::from_secs)
        .ok_or_else(invalid)
}
