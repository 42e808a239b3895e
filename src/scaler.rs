use error_stack::{Report, bail};
use serde::{Deserialize, Serialize};

use crate::error::ForecastError;

/// Min-max normalization fitted to exactly one series.
///
/// Every constructor, deserialization included, goes through
/// [`Scaler::from_bounds`], which rejects non-finite and flat bounds, so
/// `min < max` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ScalerBounds")]
pub struct Scaler {
    min: f64,
    max: f64,
}

#[derive(Deserialize)]
struct ScalerBounds {
    min: f64,
    max: f64,
}

impl TryFrom<ScalerBounds> for Scaler {
    type Error = Report<ForecastError>;

    fn try_from(bounds: ScalerBounds) -> Result<Self, Self::Error> {
        Self::from_bounds(bounds.min, bounds.max)
    }
}

impl Scaler {
    pub fn fit(series: &[f64]) -> Result<Self, Report<ForecastError>> {
        if series.is_empty() {
            bail!(ForecastError::InvalidInput {
                reason: "cannot fit scaler on an empty series".into(),
            });
        }
        if let Some(index) = series.iter().position(|v| !v.is_finite()) {
            bail!(ForecastError::InvalidInput {
                reason: format!("non-finite value at index {index}"),
            });
        }

        let min = series.iter().copied().fold(f64::INFINITY, f64::min);
        let max = series.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Self::from_bounds(min, max)
    }

    /// Build a scaler from explicit bounds; requires finite `min < max`.
    pub fn from_bounds(min: f64, max: f64) -> Result<Self, Report<ForecastError>> {
        if !min.is_finite() || !max.is_finite() {
            bail!(ForecastError::InvalidInput {
                reason: format!("non-finite scaler bounds [{min}, {max}]"),
            });
        }
        if max == min {
            bail!(ForecastError::InvalidInput {
                reason: format!("flat series (every value is {min}) cannot be normalized"),
            });
        }
        if max < min {
            bail!(ForecastError::InvalidInput {
                reason: format!("scaler bounds are inverted: min {min} > max {max}"),
            });
        }

        Ok(Self { min, max })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// Map values into the fitted `[0, 1]` range. Values outside the fitted
    /// range map outside `[0, 1]`.
    pub fn normalize(&self, series: &[f64]) -> Vec<f64> {
        let range = self.max - self.min;
        series.iter().map(|&x| (x - self.min) / range).collect()
    }

    pub fn denormalize(&self, series: &[f64]) -> Vec<f64> {
        let range = self.max - self.min;
        series.iter().map(|&x| x * range + self.min).collect()
    }
}
