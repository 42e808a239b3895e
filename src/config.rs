use std::path::Path;

use error_stack::{Report, ResultExt};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::indicator::rsi;
use crate::predictor::lstm::LstmConfig;

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}

fn default_lookback() -> usize {
    60
}

fn default_horizon() -> usize {
    7
}

fn default_epochs() -> usize {
    50
}

fn default_validation_fraction() -> f64 {
    0.1
}

fn default_hidden_size() -> usize {
    32
}

fn default_learning_rate() -> f64 {
    0.01
}

fn default_batch_size() -> usize {
    32
}

fn default_gradient_clip() -> f64 {
    1.0
}

fn default_seed() -> u64 {
    42
}

fn default_sma_period() -> usize {
    20
}

fn default_ema_period() -> usize {
    12
}

fn default_rsi_period() -> usize {
    rsi::DEFAULT_PERIOD
}

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub forecast: ForecastConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub indicators: IndicatorsConfig,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Accepted values: `"text"` | `"json"`
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ForecastConfig {
    #[serde(default = "default_lookback")]
    pub lookback: usize,
    #[serde(default = "default_horizon")]
    pub horizon: usize,
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    /// Trailing share of the sequence dataset held out from parameter updates.
    #[serde(default = "default_validation_fraction")]
    pub validation_fraction: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            lookback: default_lookback(),
            horizon: default_horizon(),
            epochs: default_epochs(),
            validation_fraction: default_validation_fraction(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_hidden_size")]
    pub hidden_size: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_gradient_clip")]
    pub gradient_clip: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            hidden_size: default_hidden_size(),
            learning_rate: default_learning_rate(),
            batch_size: default_batch_size(),
            gradient_clip: default_gradient_clip(),
            seed: default_seed(),
        }
    }
}

impl ModelConfig {
    pub fn lstm(&self) -> LstmConfig {
        LstmConfig {
            hidden_size: self.hidden_size,
            learning_rate: self.learning_rate,
            batch_size: self.batch_size,
            gradient_clip: self.gradient_clip,
            seed: self.seed,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct IndicatorsConfig {
    #[serde(default = "default_sma_period")]
    pub sma_period: usize,
    #[serde(default = "default_ema_period")]
    pub ema_period: usize,
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,
}

impl Default for IndicatorsConfig {
    fn default() -> Self {
        Self {
            sma_period: default_sma_period(),
            ema_period: default_ema_period(),
            rsi_period: default_rsi_period(),
        }
    }
}

/// Load and validate an `AppConfig` from a TOML file at `path`.
pub fn load(path: &Path) -> Result<AppConfig, Report<ConfigError>> {
    let content = std::fs::read_to_string(path)
        .change_context(ConfigError::ReadFile)
        .attach_with(|| format!("path: {}", path.display()))?;

    parse(&content)
}

/// Parse and validate an `AppConfig` from TOML text.
pub fn parse(content: &str) -> Result<AppConfig, Report<ConfigError>> {
    let config: AppConfig = toml::from_str(content).change_context(ConfigError::Parse {
        reason: "invalid TOML syntax or schema mismatch".into(),
    })?;

    validate(&config)?;

    Ok(config)
}

const VALID_LOG_FORMATS: &[&str] = &["text", "json"];

fn validate(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    validate_general(&config.general)?;
    validate_forecast(&config.forecast)?;
    validate_model(&config.model)?;
    validate_indicators(&config.indicators)?;
    Ok(())
}

fn invalid(field: String) -> Report<ConfigError> {
    Report::new(ConfigError::Validation { field })
}

fn validate_general(general: &GeneralConfig) -> Result<(), Report<ConfigError>> {
    if !VALID_LOG_FORMATS.contains(&general.log_format.as_str()) {
        return Err(invalid(format!(
            "general.log_format \"{}\" is not valid",
            general.log_format
        )));
    }
    Ok(())
}

fn validate_forecast(forecast: &ForecastConfig) -> Result<(), Report<ConfigError>> {
    for (name, value) in [
        ("lookback", forecast.lookback),
        ("horizon", forecast.horizon),
        ("epochs", forecast.epochs),
    ] {
        if value == 0 {
            return Err(invalid(format!("forecast.{name} must be > 0")));
        }
    }
    if !(0.0..1.0).contains(&forecast.validation_fraction) {
        return Err(invalid(format!(
            "forecast.validation_fraction {} must lie in [0, 1)",
            forecast.validation_fraction
        )));
    }
    Ok(())
}

fn validate_model(model: &ModelConfig) -> Result<(), Report<ConfigError>> {
    if model.hidden_size == 0 {
        return Err(invalid("model.hidden_size must be > 0".into()));
    }
    if model.batch_size == 0 {
        return Err(invalid("model.batch_size must be > 0".into()));
    }
    for (name, value) in [
        ("learning_rate", model.learning_rate),
        ("gradient_clip", model.gradient_clip),
    ] {
        if !(value.is_finite() && value > 0.0) {
            return Err(invalid(format!("model.{name} must be a positive number")));
        }
    }
    Ok(())
}

fn validate_indicators(indicators: &IndicatorsConfig) -> Result<(), Report<ConfigError>> {
    for (name, value) in [
        ("sma_period", indicators.sma_period),
        ("ema_period", indicators.ema_period),
        ("rsi_period", indicators.rsi_period),
    ] {
        if value == 0 {
            return Err(invalid(format!("indicators.{name} must be > 0")));
        }
    }
    Ok(())
}
