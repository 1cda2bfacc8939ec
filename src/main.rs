//! hypercast - weather lookups that keep working offline
//!
//! Serves weather from a local cache when the network is unavailable and
//! refreshes cached entries in the background when it is.

use clap::Parser;
use std::error::Error;
use std::io;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hypercast::cache::{CacheInfo, CachedLocation};
use hypercast::cli::{CacheAction, Cli, Command, NetworkAction, StartupConfig};
use hypercast::clock::SystemClock;
use hypercast::config::Config;
use hypercast::data::{get_location_by_id, search_locations, Forecast, WeatherSnapshot};
use hypercast::gateway::MockWeatherGateway;
use hypercast::network::NetworkStatus;
use hypercast::storage::{FileStorage, KeyValueStore, MemoryStorage};
use hypercast::{ConnectivityEvent, Context, FetchOptions, Fetched};

fn init_tracing() {
    // RUST_LOG controls the level, e.g. RUST_LOG=hypercast=debug
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("Error: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = Config::load().unwrap_or_else(|error| {
        warn!(%error, "Ignoring unusable config file, using defaults");
        Config::default()
    });
    let startup = StartupConfig::from_cli(&cli, config)?;
    startup.config.validate()?;

    let context = Context::new(
        startup.config.clone(),
        open_storage(&startup),
        Arc::new(SystemClock),
        startup.online,
    );
    let gateway = Arc::new(MockWeatherGateway::new(&context.config().gateway));
    gateway.set_reachable(startup.online);
    let access = context.data_access(gateway);

    match cli.command {
        Command::Weather {
            location,
            refresh,
            no_cache,
            ttl,
        } => {
            let options = FetchOptions {
                use_cache: !no_cache,
                force_refresh: refresh,
                ttl,
            };
            let fetched = access.get_weather(&location, options).await?;
            if cli.json {
                print_json(&weather_report(&fetched))?;
            } else {
                print_weather(&fetched);
            }
            finish_refresh(fetched).await;
        }
        Command::Forecast {
            location,
            hours,
            days,
        } => {
            let fetched = access
                .forecast(&location, hours, days, FetchOptions::default())
                .await?;
            if cli.json {
                let report = serde_json::json!({
                    "source": fetched.provenance.label(),
                    "flags": fetched.flags(),
                    "hourly": fetched.data.hourly,
                    "daily": fetched.data.daily,
                });
                print_json(&report)?;
            } else {
                print_forecast(&fetched, &location);
            }
            finish_refresh(fetched).await;
        }
        Command::Preload { locations } => {
            if !context.network().is_online() {
                println!("Offline: nothing to preload");
            } else {
                let stored = access.preload_locations(&locations).await;
                println!("Preloaded {} of {} locations", stored, locations.len());
            }
        }
        Command::Search { query } => {
            let matches = search_locations(&query);
            if cli.json {
                print_json(&matches)?;
            } else if matches.is_empty() {
                println!("No locations match '{query}'");
            } else {
                for location in matches {
                    println!(
                        "{:>3}  {}, {}, {}",
                        location.id, location.name, location.region, location.country
                    );
                }
            }
        }
        Command::Cache { action } => match action {
            CacheAction::Info => {
                let info = context.cache().info();
                if cli.json {
                    print_json(&info)?;
                } else {
                    print_cache_info(&info);
                }
            }
            CacheAction::Clear => {
                context.cache().clear();
                println!("Cache cleared");
            }
            CacheAction::Cleanup => {
                let removed = context.cache().cleanup();
                println!("Removed {removed} entries");
            }
            CacheAction::Locations => {
                let locations = context.cache().cached_locations();
                if cli.json {
                    print_json(&locations)?;
                } else {
                    print_cached_locations(&locations);
                }
            }
        },
        Command::Network { action } => {
            match action {
                NetworkAction::Status => {}
                NetworkAction::Online => context.network().handle(ConnectivityEvent::Online),
                NetworkAction::Offline => context.network().handle(ConnectivityEvent::Offline),
            }
            let status = context.network().status();
            if cli.json {
                print_json(&status)?;
            } else {
                print_network_status(&status);
            }
        }
    }

    Ok(())
}

/// File storage under `--data-dir` or the platform data directory,
/// falling back to memory when neither is available.
fn open_storage(startup: &StartupConfig) -> Arc<dyn KeyValueStore> {
    let quota = startup.config.cache.quota_bytes;
    let file_storage = match &startup.data_dir {
        Some(dir) => Some(FileStorage::with_dir(dir.clone())),
        None => FileStorage::new(),
    };

    match file_storage {
        Some(storage) => Arc::new(storage.with_quota(quota)),
        None => {
            warn!("No data directory available, cache will not persist");
            match quota {
                Some(quota) => Arc::new(MemoryStorage::with_quota(quota)),
                None => Arc::new(MemoryStorage::new()),
            }
        }
    }
}

/// Lets a background refresh land in the cache before the process exits
async fn finish_refresh<T>(fetched: Fetched<T>) {
    if let Some(refresh) = fetched.refresh {
        refresh.wait().await;
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn weather_report(fetched: &Fetched<WeatherSnapshot>) -> serde_json::Value {
    serde_json::json!({
        "source": fetched.provenance.label(),
        "flags": fetched.flags(),
        "cachedAt": fetched.cached_at,
        "expiresAt": fetched.expires_at,
        "error": fetched.error,
        "data": fetched.data,
    })
}

fn location_name(snapshot: &WeatherSnapshot) -> String {
    match &snapshot.location {
        Some(location) => format!(
            "{}, {}, {}",
            location.name, location.region, location.country
        ),
        None => format!("Location {}", snapshot.location_id),
    }
}

/// Status line shared by weather and forecast output
fn print_source<T>(fetched: &Fetched<T>, name: &str) {
    println!("[{}] {}", fetched.provenance.label(), name);
    if let Some(cached_at) = fetched.cached_at {
        println!("  Cached {}", cached_at.format("%Y-%m-%d %H:%M UTC"));
    }
    if let Some(error) = &fetched.error {
        println!("  Using cached data: {error}");
    }
}

fn print_weather(fetched: &Fetched<WeatherSnapshot>) {
    let snapshot = &fetched.data;
    let current = &snapshot.current;

    print_source(fetched, &location_name(snapshot));
    println!(
        "  {}°F {} (feels like {}°F)",
        current.temperature, current.description, current.feels_like
    );
    println!(
        "  High {}°F / Low {}°F  Humidity {}%  Wind {} mph {}",
        current.high_today,
        current.low_today,
        current.humidity,
        current.wind_speed,
        current.wind_direction
    );
    println!(
        "  Precipitation {}%  UV {}  AQI {}",
        current.precipitation_chance, current.uv_index, current.air_quality.aqi
    );
    for alert in &snapshot.alerts {
        println!("  ! {}: {}", alert.severity.label(), alert.title);
        println!("    {}", alert.description);
    }
}

fn print_forecast(fetched: &Fetched<Forecast>, location_id: &str) {
    let name = match get_location_by_id(location_id) {
        Some(location) => format!("{}, {}, {}", location.name, location.region, location.country),
        None => format!("Location {location_id}"),
    };
    print_source(fetched, &name);

    if !fetched.data.hourly.is_empty() {
        println!("\n  Hourly");
        for hour in &fetched.data.hourly {
            println!(
                "  {}  {:>4}°F  {:<14} {:>3}%",
                hour.time.format("%a %H:%M"),
                hour.temperature,
                hour.condition.description(),
                hour.precipitation_chance
            );
        }
    }

    if !fetched.data.daily.is_empty() {
        println!("\n  Daily");
        for day in &fetched.data.daily {
            println!(
                "  {}  {:>4}/{:<4} {:<14} {}",
                day.date.format("%a %m-%d"),
                day.high,
                day.low,
                day.condition.description(),
                day.summary
            );
        }
    }
}

fn print_cache_info(info: &CacheInfo) {
    println!(
        "Entries: {} ({} valid, {} expired)",
        info.total_entries, info.valid_entries, info.expired_entries
    );
    println!("Storage: {} bytes", info.storage_bytes);
    print_network_status(&info.network_status);
}

fn print_cached_locations(locations: &[CachedLocation]) {
    if locations.is_empty() {
        println!("No cached locations");
        return;
    }
    for location in locations {
        println!(
            "{:>3}  {:<16} cached {}  expires {}",
            location.identifier,
            location.location_name,
            location.cached_at.format("%Y-%m-%d %H:%M"),
            location.expires_at.format("%Y-%m-%d %H:%M")
        );
    }
}

fn print_network_status(status: &NetworkStatus) {
    let state = if status.is_online { "online" } else { "offline" };
    println!(
        "Network: {} (last online {})",
        state,
        status.last_online.format("%Y-%m-%d %H:%M UTC")
    );
}
