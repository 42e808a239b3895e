//! Price forecasting pipeline: min-max scaling, sequence windowing, a
//! trainable recurrent regressor with iterative multi-step rollout, and
//! technical indicators (SMA, EMA, RSI) over the same price history.

pub mod config;
pub mod error;
pub mod forecaster;
pub mod indicator;
pub mod model;
pub mod predictor;
pub mod scaler;
pub mod window;
