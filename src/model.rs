use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One daily observation supplied by the price source.
///
/// Serialized dates use the ISO 8601 calendar form (`"2024-01-10"`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: f64,
    #[serde(default)]
    pub volume: u64,
}

/// A single predicted value for a future calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub value: f64,
}

impl fmt::Display for ForecastPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:.4}", self.date, self.value)
    }
}
