use std::path::PathBuf;

use anyhow::{Context, Result};
use argh::FromArgs;
use nimbus_core::{AppError, Config, Units};
use nimbus_weather::units::{format_pressure, speed_symbol, temperature_symbol};
use nimbus_weather::{DataSource, Fetched, GeoPoint, WeatherService};
use tokio_util::sync::CancellationToken;

#[derive(FromArgs)]
/// Weather conditions and forecasts from the command line
struct Args {
    /// path to the configuration file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Search(SearchArgs),
    Current(CurrentArgs),
    Forecast(ForecastArgs),
}

#[derive(FromArgs)]
/// List places matching a name
#[argh(subcommand, name = "search")]
struct SearchArgs {
    /// place name to look up
    #[argh(positional)]
    query: String,
}

#[derive(FromArgs)]
/// Show current conditions for a place
#[argh(subcommand, name = "current")]
struct CurrentArgs {
    /// place name to look up
    #[argh(positional)]
    query: String,

    /// show imperial units
    #[argh(switch)]
    imperial: bool,
}

#[derive(FromArgs)]
/// Show the daily outlook for a place
#[argh(subcommand, name = "forecast")]
struct ForecastArgs {
    /// place name to look up
    #[argh(positional)]
    query: String,

    /// show imperial units
    #[argh(switch)]
    imperial: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    nimbus_core::init()?;

    let args: Args = argh::from_env();

    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Err(e) = config.check() {
        tracing::error!("{}", e);
        anyhow::bail!("{}", AppError::from(e).user_message());
    }

    let service = WeatherService::from_config(&config).context("Failed to set up weather provider")?;
    service.start();

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupted, cancelling requests");
                cancel.cancel();
            }
        }
    });

    let units_for = |imperial: bool| {
        if imperial {
            Units::Imperial
        } else {
            config.weather.display_units
        }
    };

    let outcome = match args.command {
        Command::Search(cmd) => search(&service, &cmd.query, &cancel).await,
        Command::Current(cmd) => current(&service, &cmd.query, units_for(cmd.imperial), &cancel).await,
        Command::Forecast(cmd) => forecast(&service, &cmd.query, units_for(cmd.imperial), &cancel).await,
    };

    service.shutdown();

    if let Err(e) = outcome {
        tracing::debug!("Command failed: {:?}", e);
        anyhow::bail!("{}", e.user_message());
    }
    Ok(())
}

async fn resolve(service: &WeatherService, query: &str, cancel: &CancellationToken) -> Result<GeoPoint, AppError> {
    service
        .search(query, cancel)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| nimbus_core::WeatherError::LocationNotFound(query.to_string()).into())
}

async fn search(service: &WeatherService, query: &str, cancel: &CancellationToken) -> Result<(), AppError> {
    let places = service.search(query, cancel).await?;
    if places.is_empty() {
        println!("No places match \"{}\"", query);
    }
    for place in places {
        println!("{:<40} {:>9.4} {:>10.4}", place.display_name(), place.lat, place.lon);
    }
    Ok(())
}

async fn current(
    service: &WeatherService,
    query: &str,
    units: Units,
    cancel: &CancellationToken,
) -> Result<(), AppError> {
    let place = resolve(service, query, cancel).await?;
    let Fetched { value, source } = service.current(&place, units, cancel).await?;
    let temp_unit = temperature_symbol(units);

    println!("{}", place.display_name());
    if let Some(condition) = value.condition() {
        println!("  {} ({})", condition.description, condition.main);
    }
    println!(
        "  {:.1}{} (feels like {:.1}{})",
        value.main.temp, temp_unit, value.main.feels_like, temp_unit
    );
    println!("  Humidity {}%", value.main.humidity);
    println!("  Pressure {}", format_pressure(value.main.pressure, units));
    println!(
        "  Wind {:.0} {} from {:.0}°",
        value.wind.speed,
        speed_symbol(units),
        value.wind.deg
    );
    print_source(&place, &source);
    Ok(())
}

async fn forecast(
    service: &WeatherService,
    query: &str,
    units: Units,
    cancel: &CancellationToken,
) -> Result<(), AppError> {
    let place = resolve(service, query, cancel).await?;
    let Fetched { value, source } = service.forecast(&place, units, cancel).await?;
    let temp_unit = temperature_symbol(units);

    // Local date at the place, from its UTC offset
    let today = (chrono::Utc::now() + chrono::Duration::seconds(i64::from(value.timezone))).date_naive();

    println!("{}", place.display_name());
    for day in value.outlook(today) {
        println!(
            "  {}  {:>6.1}{} / {:>6.1}{}  {}",
            day.date.format("%a %d %b"),
            day.temp_min,
            temp_unit,
            day.temp_max,
            temp_unit,
            day.condition.description
        );
    }
    print_source(&place, &source);
    Ok(())
}

fn print_source(place: &GeoPoint, source: &DataSource) {
    if let Some(note) = source_note(place, source) {
        println!("  ({})", note);
    }
}

/// Offline notice for snapshot data, naming the snapshot's location when it
/// is not the place asked for
fn source_note(place: &GeoPoint, source: &DataSource) -> Option<String> {
    let DataSource::Snapshot { saved_at, location_key } = source else {
        return None;
    };
    let saved = saved_at.format("%Y-%m-%d %H:%M UTC");
    if *location_key == place.location_key() {
        Some(format!("offline: showing data saved {}", saved))
    } else {
        Some(format!(
            "offline: showing data saved {} for {}, not {}",
            saved,
            location_key,
            place.display_name()
        ))
    }
}
