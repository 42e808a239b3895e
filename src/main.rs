use std::path::Path;

use clap::Parser;
use derive_more::{Display, Error};
use error_stack::{Report, ResultExt};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use price_forecaster::config::{self, AppConfig};
use price_forecaster::forecaster::{IterativeForecaster, TrainingReport};
use price_forecaster::indicator::{IndicatorEngine, IndicatorSet};
use price_forecaster::model::{ForecastPoint, PricePoint};
use price_forecaster::predictor::lstm::LstmRegressor;

#[derive(Debug, Display, Error)]
pub enum AppError {
    #[display("configuration error")]
    Config,
    #[display("price history error")]
    Input,
    #[display("training error")]
    Training,
    #[display("forecast error")]
    Forecast,
    #[display("output error")]
    Output,
}

#[derive(Parser)]
#[command(
    name = "price-forecaster",
    about = "Forecast a price series and compute technical indicators"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Path to a JSON array of `{ "date", "price", "volume" }` points, oldest first
    #[arg(long)]
    history: String,

    /// Override `forecast.horizon`
    #[arg(long)]
    horizon: Option<usize>,

    /// Override `forecast.epochs`
    #[arg(long)]
    epochs: Option<usize>,
}

#[derive(Serialize)]
struct Output<'a> {
    training: &'a TrainingReport,
    forecast: &'a [ForecastPoint],
    indicators: &'a IndicatorSet,
}

#[tokio::main]
async fn main() {
    if let Err(report) = run().await {
        eprintln!("{report:?}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Report<AppError>> {
    let cli = Cli::parse();
    let mut config = config::load(Path::new(&cli.config)).change_context(AppError::Config)?;
    apply_overrides(&mut config, &cli)?;

    init_tracing(&config);

    // ── Price history ─────────────────────────────────────────────────────────
    let history = load_history(Path::new(&cli.history))?;
    info!(
        points = history.len(),
        first = ?history.first().map(|p| p.date),
        last = ?history.last().map(|p| p.date),
        "price history loaded"
    );

    let mut indicators =
        IndicatorEngine::new(&config.indicators).change_context(AppError::Config)?;

    // ── Training and rollout ──────────────────────────────────────────────────
    let lookback = config.forecast.lookback;
    let mut forecaster = IterativeForecaster::new(
        LstmRegressor::new(config.model.lstm()),
        config.forecast.validation_fraction,
    );

    let report = forecaster
        .train(&history, config.forecast.epochs, lookback)
        .await
        .change_context(AppError::Training)?;

    let forecast = forecaster
        .forecast(&history, lookback, config.forecast.horizon)
        .change_context(AppError::Forecast)?;

    let output = Output {
        training: &report,
        forecast: &forecast,
        indicators: indicators.series(&history),
    };
    let json = serde_json::to_string_pretty(&output).change_context(AppError::Output)?;
    println!("{json}");

    Ok(())
}

/// Apply `--horizon` / `--epochs` on top of the loaded config. Both must
/// stay positive.
fn apply_overrides(config: &mut AppConfig, cli: &Cli) -> Result<(), Report<AppError>> {
    if let Some(horizon) = cli.horizon {
        config.forecast.horizon = horizon;
    }
    if let Some(epochs) = cli.epochs {
        config.forecast.epochs = epochs;
    }
    for (flag, value) in [
        ("horizon", config.forecast.horizon),
        ("epochs", config.forecast.epochs),
    ] {
        if value == 0 {
            return Err(Report::new(AppError::Config))
                .attach_with(|| format!("--{flag} / forecast.{flag} must be > 0"));
        }
    }
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::new(&config.general.log_level);
    match config.general.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

fn load_history(path: &Path) -> Result<Vec<PricePoint>, Report<AppError>> {
    let content = std::fs::read_to_string(path)
        .change_context(AppError::Input)
        .attach_with(|| format!("path: {}", path.display()))?;

    let history: Vec<PricePoint> = serde_json::from_str(&content)
        .change_context(AppError::Input)
        .attach_with(|| format!("path: {}", path.display()))?;

    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["price-forecaster", "--history", "prices.json"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn overrides_replace_config_values() {
        let mut config = AppConfig::default();
        apply_overrides(&mut config, &cli(&["--horizon", "3", "--epochs", "7"])).unwrap();
        assert_eq!(config.forecast.horizon, 3);
        assert_eq!(config.forecast.epochs, 7);
    }

    #[test]
    fn zero_horizon_names_the_flag() {
        let mut config = AppConfig::default();
        let err = apply_overrides(&mut config, &cli(&["--horizon", "0"])).unwrap_err();
        assert!(matches!(err.current_context(), AppError::Config));
        let rendered = format!("{err:?}");
        assert!(rendered.contains("--horizon"), "{rendered}");
    }

    #[test]
    fn zero_epochs_names_the_flag() {
        let mut config = AppConfig::default();
        let err = apply_overrides(&mut config, &cli(&["--epochs", "0"])).unwrap_err();
        let rendered = format!("{err:?}");
        assert!(rendered.contains("--epochs"), "{rendered}");
        assert!(!rendered.contains("--horizon"), "{rendered}");
    }
}
