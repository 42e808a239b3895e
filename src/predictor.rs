pub mod lstm;
pub mod optimizer;

use std::fmt;

use error_stack::Report;
use serde::Serialize;

use crate::error::ForecastError;
use crate::window::SequenceDataset;

/// Lifecycle of a [`ForecastModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ModelStatus {
    Untrained,
    Trained,
    Disposed,
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Untrained => write!(f, "untrained"),
            Self::Trained => write!(f, "trained"),
            Self::Disposed => write!(f, "disposed"),
        }
    }
}

/// Loss curves recorded while fitting.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FitHistory {
    pub train_samples: usize,
    pub validation_samples: usize,
    /// Mean squared error over the training split, one entry per epoch.
    pub train_loss: Vec<f64>,
    /// Mean squared error over the held-out split, one entry per epoch.
    /// Empty when nothing was held out.
    pub validation_loss: Vec<f64>,
}

impl FitHistory {
    pub fn final_train_loss(&self) -> Option<f64> {
        self.train_loss.last().copied()
    }

    pub fn final_validation_loss(&self) -> Option<f64> {
        self.validation_loss.last().copied()
    }
}

/// A trainable regressor mapping a window of normalized values to the next one.
///
/// Implementations work purely in normalized space and know nothing about the
/// original price scale.
pub trait ForecastModel: Send {
    /// Short identifier of the architecture (e.g., "lstm").
    fn name(&self) -> &str;

    fn status(&self) -> ModelStatus;

    /// Train on `dataset`, holding out its trailing `validation_fraction`.
    ///
    /// The held-out samples are only evaluated, never used for updates.
    /// A successful fit replaces any previously trained state.
    fn fit(
        &mut self,
        dataset: &SequenceDataset,
        epochs: usize,
        validation_fraction: f64,
    ) -> Result<FitHistory, Report<ForecastError>>;

    /// Predict the value following `window`, which must have the length the
    /// model was fitted with.
    fn predict_one(&self, window: &[f64]) -> Result<f64, Report<ForecastError>>;

    /// Release trained state. Every later `predict_one` fails with `NotTrained`.
    fn dispose(&mut self);
}
