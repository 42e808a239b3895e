use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::{Indicator, align_series};

pub const DEFAULT_PERIOD: usize = 14;

/// RSI (Relative Strength Index) over a simple trailing average of gains and
/// losses.
///
/// Every value averages exactly the last `period` price changes; there is no
/// Wilder smoothing carried between windows.
#[derive(Debug, Clone, Copy)]
pub struct Rsi {
    period: usize,
}

impl Rsi {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        if period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "period must be > 0".into(),
            });
        }
        Ok(Self { period })
    }
}

impl Default for Rsi {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD,
        }
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        "rsi"
    }

    fn calculate(&self, prices: &[f64]) -> Vec<f64> {
        let deltas: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();

        let values = deltas
            .windows(self.period)
            .map(|window| {
                let avg_gain =
                    window.iter().map(|&d| d.max(0.0)).sum::<f64>() / self.period as f64;
                let avg_loss =
                    window.iter().map(|&d| (-d).max(0.0)).sum::<f64>() / self.period as f64;
                rsi_value(avg_gain, avg_loss)
            })
            .collect();

        align_series(prices.len(), values)
    }
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    (100.0 - 100.0 / (1.0 + rs)).clamp(0.0, 100.0)
}
