use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use skyglass_core::{App, AppError};
use skyglass_weather::{Phase, UnitSystem, WeatherSnapshot};

/// Current weather and a daily forecast for a place.
///
/// Without LOCATION the configured device position or default location is
/// used.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Place to look up, e.g. "Lisbon"
    location: Option<String>,

    /// Report in imperial units
    #[arg(long, conflicts_with = "metric")]
    imperial: bool,

    /// Report in metric units
    #[arg(long)]
    metric: bool,

    /// Switch units after the first lookup and fetch again
    #[arg(long)]
    toggle_unit: bool,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Config file to use instead of the default location
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(Phase::Failed) => ExitCode::FAILURE,
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("{}", e.user_message());
            eprintln!("  {}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(args: Args) -> Result<Phase, AppError> {
    skyglass_core::init()?;

    let app = match args.config.as_deref() {
        Some(path) => App::from_config_file(path)?,
        None => App::new()?,
    };
    let controller = app.controller();

    if args.imperial {
        controller.set_unit(UnitSystem::Imperial).await;
    } else if args.metric {
        controller.set_unit(UnitSystem::Metric).await;
    }

    match args.location.as_deref() {
        Some(location) => {
            controller.commit_location(location).await;
        }
        None => {
            app.start().await;
        }
    }

    if args.toggle_unit {
        controller.toggle_unit().await;
    }

    let snapshot = controller.snapshot();
    tracing::debug!("Finished in phase {:?}", snapshot.phase);

    if args.json {
        let json = serde_json::to_string_pretty(&snapshot).map_err(anyhow::Error::from)?;
        println!("{}", json);
    } else {
        print!("{}", render(&snapshot));
    }

    Ok(snapshot.phase)
}

fn render(snapshot: &WeatherSnapshot) -> String {
    let unit = snapshot.unit;
    let temp = unit.temperature_symbol();

    let (Phase::Ready, Some(current)) = (snapshot.phase, snapshot.current.as_ref()) else {
        return match snapshot.phase {
            Phase::Idle => "No location. Pass one as an argument or set location.default_location.\n"
                .to_string(),
            _ => format!("No weather data for {}\n", snapshot.location),
        };
    };

    let mut out = String::new();
    out.push_str(&format!("{}\n", snapshot.location));
    out.push_str(&format!(
        "  {:.1}{}  {}\n",
        current.temperature, temp, current.condition
    ));
    out.push_str(&format!("  Feels like  {:.1}{}\n", current.feels_like, temp));
    out.push_str(&format!("  Humidity    {}%\n", current.humidity));
    out.push_str(&format!(
        "  Wind speed  {:.1} {}\n",
        current.wind_speed,
        unit.speed_unit()
    ));

    let days = snapshot.forecast.as_deref().unwrap_or_default();
    if !days.is_empty() {
        out.push_str(&format!("\n{}-Day Forecast\n", days.len()));
        for day in days {
            out.push_str(&format!(
                "  {}  {:>6.1}{}  {}\n",
                day.date, day.temperature, temp, day.condition
            ));
        }
    }
    out
}
