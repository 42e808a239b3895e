use error_stack::{Report, bail};

use crate::error::ForecastError;

/// Chronologically ordered `(window, target)` pairs built from one series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequenceDataset {
    windows: Vec<Vec<f64>>,
    targets: Vec<f64>,
}

impl SequenceDataset {
    pub fn windows(&self) -> &[Vec<f64>] {
        &self.windows
    }

    pub fn targets(&self) -> &[f64] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Window length shared by every sample (0 for an empty dataset).
    pub fn lookback(&self) -> usize {
        self.windows.first().map_or(0, Vec::len)
    }

    /// Number of leading samples used for training when the trailing
    /// `validation_fraction` of the dataset is held out.
    pub fn training_len(&self, validation_fraction: f64) -> usize {
        let held_out = (self.len() as f64 * validation_fraction).floor() as usize;
        self.len() - held_out.min(self.len())
    }
}

/// Slice `series` into sliding windows of `lookback` values, each paired with
/// the value that immediately follows it.
pub fn make_sequences(
    series: &[f64],
    lookback: usize,
) -> Result<SequenceDataset, Report<ForecastError>> {
    if lookback == 0 {
        bail!(ForecastError::InvalidInput {
            reason: "lookback must be > 0".into(),
        });
    }
    if series.len() <= lookback {
        bail!(ForecastError::InsufficientData {
            required: lookback + 1,
            available: series.len(),
        });
    }

    let (windows, targets) = (lookback..series.len())
        .map(|i| (series[i - lookback..i].to_vec(), series[i]))
        .unzip();

    Ok(SequenceDataset { windows, targets })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_windows_and_targets() {
        let dataset = make_sequences(&[1.0, 2.0, 3.0, 4.0, 5.0], 2).unwrap();
        assert_eq!(
            dataset.windows(),
            &[vec![1.0, 2.0], vec![2.0, 3.0], vec![3.0, 4.0]]
        );
        assert_eq!(dataset.targets(), &[3.0, 4.0, 5.0]);
        assert_eq!(dataset.lookback(), 2);
    }

    #[test]
    fn output_length_is_series_minus_lookback() {
        let series: Vec<f64> = (0..50).map(f64::from).collect();
        let dataset = make_sequences(&series, 10).unwrap();
        assert_eq!(dataset.len(), 40);
        // Last target is the last value of the series
        assert_eq!(dataset.targets().last(), Some(&49.0));
        assert_eq!(dataset.windows()[39], (39..49).map(f64::from).collect::<Vec<_>>());
    }

    #[test]
    fn series_equal_to_lookback_is_insufficient() {
        let err = make_sequences(&[1.0, 2.0, 3.0], 3).unwrap_err();
        assert!(matches!(
            err.current_context(),
            ForecastError::InsufficientData {
                required: 4,
                available: 3
            }
        ));
    }

    #[test]
    fn zero_lookback_is_invalid() {
        let err = make_sequences(&[1.0, 2.0], 0).unwrap_err();
        assert!(matches!(
            err.current_context(),
            ForecastError::InvalidInput { .. }
        ));
    }

    #[test]
    fn training_len_holds_out_trailing_fraction() {
        let series: Vec<f64> = (0..21).map(f64::from).collect();
        let dataset = make_sequences(&series, 1).unwrap();
        assert_eq!(dataset.len(), 20);
        assert_eq!(dataset.training_len(0.0), 20);
        assert_eq!(dataset.training_len(0.1), 18);
        assert_eq!(dataset.training_len(0.25), 15);
    }
}
