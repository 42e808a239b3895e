pub mod ma;
pub mod rsi;

use chrono::NaiveDate;
use error_stack::Report;
use serde::Serialize;

use crate::config::IndicatorsConfig;
use crate::error::IndicatorError;
use crate::model::PricePoint;

use self::ma::{Ema, Sma};
use self::rsi::Rsi;

/// Marker for positions without enough lookback to produce a value.
pub const UNDEFINED: f64 = f64::NAN;

/// A technical indicator computed over a price series.
///
/// Prices must be in ascending chronological order (oldest first). Output is
/// positionally aligned with the input: same length, with [`UNDEFINED`] in
/// every position before the indicator has enough history.
pub trait Indicator: Send {
    /// Unique name of this indicator (e.g., "rsi", "sma").
    fn name(&self) -> &str;

    fn calculate(&self, prices: &[f64]) -> Vec<f64>;
}

/// Extract prices from a slice of price points.
pub fn prices(history: &[PricePoint]) -> Vec<f64> {
    history.iter().map(|p| p.price).collect()
}

/// Simple moving average of `prices` over `period`, aligned with the input.
pub fn moving_average(prices: &[f64], period: usize) -> Result<Vec<f64>, Report<IndicatorError>> {
    Ok(Sma::new(period)?.calculate(prices))
}

/// Relative strength index of `prices`, aligned with the input.
pub fn rsi(prices: &[f64], period: usize) -> Result<Vec<f64>, Report<IndicatorError>> {
    Ok(Rsi::new(period)?.calculate(prices))
}

/// Prefix `values` with [`UNDEFINED`] so the result has `total_len` entries.
fn align_series(total_len: usize, values: Vec<f64>) -> Vec<f64> {
    let offset = total_len.saturating_sub(values.len());
    let mut output = vec![UNDEFINED; offset];
    output.extend(values);
    output
}

/// Indicator series for one price history, ready for presentation.
#[derive(Debug, Clone, Serialize)]
pub struct IndicatorSet {
    pub dates: Vec<NaiveDate>,
    pub sma: Vec<f64>,
    pub ema: Vec<f64>,
    pub rsi: Vec<f64>,
}

struct CachedSeries {
    history: Vec<(NaiveDate, f64)>,
    set: IndicatorSet,
}

impl CachedSeries {
    fn matches(&self, history: &[PricePoint]) -> bool {
        self.history.len() == history.len()
            && self
                .history
                .iter()
                .zip(history)
                .all(|(&(date, price), point)| date == point.date && price == point.price)
    }
}

/// Computes the configured indicators and keeps the last result, recomputing
/// only when the price history changes.
pub struct IndicatorEngine {
    sma: Sma,
    ema: Ema,
    rsi: Rsi,
    cached: Option<CachedSeries>,
    computations: u64,
}

impl IndicatorEngine {
    pub fn new(config: &IndicatorsConfig) -> Result<Self, Report<IndicatorError>> {
        Ok(Self {
            sma: Sma::new(config.sma_period)?,
            ema: Ema::new(config.ema_period)?,
            rsi: Rsi::new(config.rsi_period)?,
            cached: None,
            computations: 0,
        })
    }

    /// Number of times the series were actually computed.
    pub fn computations(&self) -> u64 {
        self.computations
    }

    pub fn series(&mut self, history: &[PricePoint]) -> &IndicatorSet {
        match self.cached.take() {
            Some(cached) if cached.matches(history) => &self.cached.insert(cached).set,
            _ => {
                let set = self.compute(history);
                self.computations += 1;
                tracing::debug!(
                    points = history.len(),
                    computations = self.computations,
                    "indicator series recomputed"
                );
                let cached = CachedSeries {
                    history: history.iter().map(|p| (p.date, p.price)).collect(),
                    set,
                };
                &self.cached.insert(cached).set
            }
        }
    }

    fn compute(&self, history: &[PricePoint]) -> IndicatorSet {
        let prices = prices(history);
        IndicatorSet {
            dates: history.iter().map(|p| p.date).collect(),
            sma: self.sma.calculate(&prices),
            ema: self.ema.calculate(&prices),
            rsi: self.rsi.calculate(&prices),
        }
    }
}
