use std::collections::VecDeque;

use chrono::Days;
use error_stack::{Report, ResultExt, bail};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::error::ForecastError;
use crate::indicator::prices;
use crate::model::{ForecastPoint, PricePoint};
use crate::predictor::{FitHistory, ForecastModel};
use crate::scaler::Scaler;
use crate::window::make_sequences;

/// Summary of one `train` call.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub run_id: String,
    pub model_name: String,
    pub lookback: usize,
    pub epochs: usize,
    pub scaler: Scaler,
    pub history: FitHistory,
}

struct Trained<M> {
    scaler: Scaler,
    model: M,
    lookback: usize,
    report: TrainingReport,
}

/// Trains a [`ForecastModel`] on a price history and rolls it forward to
/// produce multi-step forecasts.
///
/// The scaler and the trained model are stored together and only ever
/// replaced as a pair, so `forecast` always sees a consistent scale.
pub struct IterativeForecaster<M> {
    prototype: M,
    validation_fraction: f64,
    trained: Option<Trained<M>>,
}

impl<M> IterativeForecaster<M>
where
    M: ForecastModel + Clone + 'static,
{
    /// `prototype` is cloned, untrained, for every training run.
    pub fn new(prototype: M, validation_fraction: f64) -> Self {
        Self {
            prototype,
            validation_fraction,
            trained: None,
        }
    }

    pub fn is_trained(&self) -> bool {
        self.trained.is_some()
    }

    /// Lookback the current model was trained with.
    pub fn lookback(&self) -> Option<usize> {
        self.trained.as_ref().map(|t| t.lookback)
    }

    pub fn scaler(&self) -> Option<&Scaler> {
        self.trained.as_ref().map(|t| &t.scaler)
    }

    pub fn last_report(&self) -> Option<&TrainingReport> {
        self.trained.as_ref().map(|t| &t.report)
    }

    /// Fit a fresh scaler and model to `history`.
    ///
    /// The numeric work runs on the blocking thread pool. On success the
    /// previous model is disposed and replaced; on failure it is kept.
    pub async fn train(
        &mut self,
        history: &[PricePoint],
        epochs: usize,
        lookback: usize,
    ) -> Result<TrainingReport, Report<ForecastError>> {
        let run_id = Uuid::new_v4().to_string();
        let series = prices(history);
        let mut model = self.prototype.clone();
        let validation_fraction = self.validation_fraction;

        info!(
            run_id = %run_id,
            model = model.name(),
            points = series.len(),
            lookback,
            epochs,
            "training started"
        );

        let handle = tokio::task::spawn_blocking(move || {
            let scaler = Scaler::fit(&series)?;
            let normalized = scaler.normalize(&series);
            let dataset = make_sequences(&normalized, lookback)?;
            let history = model.fit(&dataset, epochs, validation_fraction)?;
            Ok::<_, Report<ForecastError>>((scaler, model, history))
        });

        let (scaler, model, history) = handle
            .await
            .change_context(ForecastError::Training {
                reason: "training task did not complete".into(),
            })
            .attach_with(|| format!("run_id: {run_id}"))??;

        let report = TrainingReport {
            run_id,
            model_name: model.name().to_string(),
            lookback,
            epochs,
            scaler,
            history,
        };

        info!(
            run_id = %report.run_id,
            train_samples = report.history.train_samples,
            validation_samples = report.history.validation_samples,
            train_loss = ?report.history.final_train_loss(),
            validation_loss = ?report.history.final_validation_loss(),
            "training finished"
        );

        if let Some(mut previous) = self.trained.take() {
            info!(run_id = %previous.report.run_id, "replacing previously trained model");
            previous.model.dispose();
        }
        self.trained = Some(Trained {
            scaler,
            model,
            lookback,
            report: report.clone(),
        });

        Ok(report)
    }

    /// Predict `horizon` daily values following `history`, feeding each
    /// prediction back in as input for the next step.
    pub fn forecast(
        &self,
        history: &[PricePoint],
        lookback: usize,
        horizon: usize,
    ) -> Result<Vec<ForecastPoint>, Report<ForecastError>> {
        let Some(trained) = &self.trained else {
            bail!(ForecastError::NotTrained);
        };
        if horizon == 0 {
            bail!(ForecastError::InvalidInput {
                reason: "horizon must be > 0".into(),
            });
        }
        if lookback == 0 {
            bail!(ForecastError::InvalidInput {
                reason: "lookback must be > 0".into(),
            });
        }
        if history.len() < lookback {
            bail!(ForecastError::InsufficientData {
                required: lookback,
                available: history.len(),
            });
        }
        let Some(last) = history.last() else {
            bail!(ForecastError::InvalidInput {
                reason: "history is empty".into(),
            });
        };

        let normalized = trained.scaler.normalize(&prices(history));
        let mut window: VecDeque<f64> = normalized[normalized.len() - lookback..]
            .iter()
            .copied()
            .collect();

        let mut predictions = Vec::with_capacity(horizon);
        for _ in 0..horizon {
            let next = trained.model.predict_one(window.make_contiguous())?;
            predictions.push(next);
            window.pop_front();
            window.push_back(next);
        }

        let values = trained.scaler.denormalize(&predictions);
        let points = values
            .into_iter()
            .enumerate()
            .map(|(step, value)| {
                let date = last
                    .date
                    .checked_add_days(Days::new(step as u64 + 1))
                    .ok_or_else(|| {
                        Report::new(ForecastError::InvalidInput {
                            reason: format!("forecast date overflows after {}", last.date),
                        })
                    })?;
                Ok(ForecastPoint { date, value })
            })
            .collect::<Result<Vec<_>, Report<ForecastError>>>()?;

        tracing::debug!(
            run_id = %trained.report.run_id,
            horizon,
            last_date = %last.date,
            "forecast produced"
        );

        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::ModelStatus;
    use crate::predictor::lstm::{LstmConfig, LstmRegressor};
    use chrono::NaiveDate;

    fn points_from_prices(start: NaiveDate, prices: &[f64]) -> Vec<PricePoint> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &price)| PricePoint {
                date: start + chrono::Duration::days(i as i64),
                price,
                volume: 1_000,
            })
            .collect()
    }

    fn wave_history(len: usize) -> Vec<PricePoint> {
        let prices: Vec<f64> = (0..len)
            .map(|i| 100.0 + 10.0 * (i as f64 * 0.25).sin() + i as f64 * 0.1)
            .collect();
        points_from_prices(NaiveDate::from_ymd_opt(2023, 12, 1).unwrap(), &prices)
    }

    fn forecaster() -> IterativeForecaster<LstmRegressor> {
        let config = LstmConfig {
            hidden_size: 4,
            learning_rate: 0.02,
            batch_size: 8,
            gradient_clip: 1.0,
            seed: 11,
        };
        IterativeForecaster::new(LstmRegressor::new(config), 0.1)
    }

    /// Records every lifecycle call so replacement can be observed.
    #[derive(Clone)]
    struct LastValueModel {
        lookback: Option<usize>,
        disposed: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    }

    impl ForecastModel for LastValueModel {
        fn name(&self) -> &str {
            "last_value"
        }

        fn status(&self) -> ModelStatus {
            if self.lookback.is_some() {
                ModelStatus::Trained
            } else {
                ModelStatus::Untrained
            }
        }

        fn fit(
            &mut self,
            dataset: &crate::window::SequenceDataset,
            epochs: usize,
            _validation_fraction: f64,
        ) -> Result<FitHistory, Report<ForecastError>> {
            if dataset.is_empty() {
                bail!(ForecastError::Training {
                    reason: "empty".into(),
                });
            }
            self.lookback = Some(dataset.lookback());
            Ok(FitHistory {
                train_samples: dataset.len(),
                validation_samples: 0,
                train_loss: vec![0.0; epochs],
                validation_loss: Vec::new(),
            })
        }

        fn predict_one(&self, window: &[f64]) -> Result<f64, Report<ForecastError>> {
            let Some(lookback) = self.lookback else {
                bail!(ForecastError::NotTrained);
            };
            if window.len() != lookback {
                bail!(ForecastError::Shape {
                    expected: lookback,
                    actual: window.len(),
                });
            }
            // Echo the newest value plus a fixed normalized step
            Ok(window[lookback - 1] + 0.1)
        }

        fn dispose(&mut self) {
            self.lookback = None;
            self.disposed
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    fn stub_forecaster() -> (
        IterativeForecaster<LastValueModel>,
        std::sync::Arc<std::sync::atomic::AtomicUsize>,
    ) {
        let disposed = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let model = LastValueModel {
            lookback: None,
            disposed: disposed.clone(),
        };
        (IterativeForecaster::new(model, 0.0), disposed)
    }

    #[test]
    fn forecast_before_train_is_not_trained() {
        let forecaster = forecaster();
        let history = wave_history(30);
        let err = forecaster.forecast(&history, 5, 3).unwrap_err();
        assert!(matches!(err.current_context(), ForecastError::NotTrained));
        assert!(!forecaster.is_trained());
    }

    #[tokio::test]
    async fn train_with_short_history_is_insufficient_data() {
        let mut forecaster = forecaster();
        let history = wave_history(5);
        let err = forecaster.train(&history, 2, 5).await.unwrap_err();
        assert!(matches!(
            err.current_context(),
            ForecastError::InsufficientData {
                required: 6,
                available: 5
            }
        ));
        assert!(!forecaster.is_trained());
    }

    #[tokio::test]
    async fn train_on_flat_history_is_invalid_input() {
        let mut forecaster = forecaster();
        let history = points_from_prices(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), &[50.0; 20]);
        let err = forecaster.train(&history, 2, 3).await.unwrap_err();
        assert!(matches!(
            err.current_context(),
            ForecastError::InvalidInput { .. }
        ));
    }

    #[tokio::test]
    async fn train_reports_run_and_stores_scaler() {
        let mut forecaster = forecaster();
        let history = wave_history(40);
        let report = forecaster.train(&history, 3, 5).await.unwrap();

        assert_eq!(report.model_name, "lstm");
        assert_eq!(report.lookback, 5);
        assert_eq!(report.history.train_loss.len(), 3);
        assert_eq!(report.history.train_samples + report.history.validation_samples, 35);
        assert!(!report.run_id.is_empty());

        let scaler = forecaster.scaler().unwrap();
        assert_eq!(*scaler, report.scaler);
        assert_eq!(forecaster.lookback(), Some(5));
        assert_eq!(forecaster.last_report().unwrap().run_id, report.run_id);
    }

    #[tokio::test]
    async fn forecast_dates_are_contiguous_after_last_known_date() {
        let mut forecaster = forecaster();
        let prices: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
        let history = points_from_prices(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), &prices);
        assert_eq!(
            history.last().unwrap().date,
            NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()
        );

        forecaster.train(&history, 2, 3).await.unwrap();
        let forecast = forecaster.forecast(&history, 3, 7).unwrap();

        assert_eq!(forecast.len(), 7);
        let expected: Vec<NaiveDate> = (11..=17)
            .map(|d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap())
            .collect();
        let dates: Vec<NaiveDate> = forecast.iter().map(|p| p.date).collect();
        assert_eq!(dates, expected);
        assert!(forecast.iter().all(|p| p.value.is_finite()));
    }

    #[tokio::test]
    async fn forecast_is_deterministic() {
        let mut forecaster = forecaster();
        let history = wave_history(40);
        forecaster.train(&history, 2, 6).await.unwrap();

        let first = forecaster.forecast(&history, 6, 5).unwrap();
        let second = forecaster.forecast(&history, 6, 5).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn rollout_feeds_predictions_back_into_window() {
        let (mut forecaster, _) = stub_forecaster();
        // Prices 0..=10 -> scaler [0, 10], a normalized step of 0.1 is one price unit
        let prices: Vec<f64> = (0..=10).map(f64::from).collect();
        let history = points_from_prices(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(), &prices);
        forecaster.train(&history, 1, 3).await.unwrap();

        let forecast = forecaster.forecast(&history, 3, 4).unwrap();
        let values: Vec<f64> = forecast.iter().map(|p| p.value).collect();
        for (value, expected) in values.iter().zip([11.0, 12.0, 13.0, 14.0]) {
            assert!((value - expected).abs() < 1e-9, "{value} != {expected}");
        }
    }

    #[tokio::test]
    async fn forecast_uses_stored_scaler() {
        let (mut forecaster, _) = stub_forecaster();
        let prices: Vec<f64> = (0..=10).map(f64::from).collect();
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        forecaster
            .train(&points_from_prices(start, &prices), 1, 2)
            .await
            .unwrap();

        // A history outside the fitted range still uses the [0, 10] scale
        let later: Vec<f64> = vec![20.0, 30.0];
        let forecast = forecaster
            .forecast(&points_from_prices(start, &later), 2, 1)
            .unwrap();
        assert!((forecast[0].value - 31.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn forecast_with_mismatched_lookback_is_shape_error() {
        let (mut forecaster, _) = stub_forecaster();
        let history = wave_history(20);
        forecaster.train(&history, 1, 4).await.unwrap();

        let err = forecaster.forecast(&history, 6, 2).unwrap_err();
        assert!(matches!(
            err.current_context(),
            ForecastError::Shape {
                expected: 4,
                actual: 6
            }
        ));
    }

    #[tokio::test]
    async fn forecast_rejects_zero_horizon_and_short_history() {
        let (mut forecaster, _) = stub_forecaster();
        let history = wave_history(20);
        forecaster.train(&history, 1, 4).await.unwrap();

        assert!(matches!(
            forecaster.forecast(&history, 4, 0).unwrap_err().current_context(),
            ForecastError::InvalidInput { .. }
        ));
        assert!(matches!(
            forecaster.forecast(&history[..3], 4, 2).unwrap_err().current_context(),
            ForecastError::InsufficientData {
                required: 4,
                available: 3
            }
        ));
    }

    #[tokio::test]
    async fn retraining_disposes_previous_model() {
        let (mut forecaster, disposed) = stub_forecaster();
        let history = wave_history(20);

        let first = forecaster.train(&history, 1, 3).await.unwrap();
        assert_eq!(disposed.load(std::sync::atomic::Ordering::SeqCst), 0);

        let second = forecaster.train(&history, 1, 5).await.unwrap();
        assert_eq!(disposed.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_ne!(first.run_id, second.run_id);
        assert_eq!(forecaster.lookback(), Some(5));
    }

    #[tokio::test]
    async fn failed_retraining_keeps_previous_model() {
        let (mut forecaster, disposed) = stub_forecaster();
        let history = wave_history(20);
        let report = forecaster.train(&history, 1, 3).await.unwrap();

        assert!(forecaster.train(&history[..2], 1, 3).await.is_err());
        assert_eq!(disposed.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert_eq!(forecaster.last_report().unwrap().run_id, report.run_id);
        assert!(forecaster.forecast(&history, 3, 2).is_ok());
    }
}
