use derive_more::{Display, Error};

#[derive(Debug, Display, Error)]
pub enum ConfigError {
    #[display("failed to read config file")]
    ReadFile,
    #[display("failed to parse config: {reason}")]
    Parse { reason: String },
    #[display("invalid config: {field}")]
    Validation { field: String },
}

/// Failures of the forecasting pipeline (scaling, windowing, training, rollout).
#[derive(Debug, Display, Error)]
pub enum ForecastError {
    #[display("invalid input: {reason}")]
    InvalidInput { reason: String },
    #[display("insufficient data: need {required}, got {available}")]
    InsufficientData { required: usize, available: usize },
    #[display("training failed: {reason}")]
    Training { reason: String },
    #[display("model is not trained")]
    NotTrained,
    #[display("window length mismatch: expected {expected}, got {actual}")]
    Shape { expected: usize, actual: usize },
}

#[derive(Debug, Display, Error)]
pub enum IndicatorError {
    #[display("invalid parameter: {name}")]
    InvalidParameter { name: String },
}
