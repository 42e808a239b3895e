//! Single-layer LSTM regressor over a scalar series.
//!
//! Each window is fed one value per time step; the final hidden state goes
//! through a linear read-out to produce the next-value estimate. Training is
//! mini-batch backpropagation through time with Adam.

use error_stack::{Report, bail};
use ndarray::{Array1, Array2, Axis, s};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::error::ForecastError;
use crate::predictor::optimizer::Adam;
use crate::predictor::{FitHistory, ForecastModel, ModelStatus};
use crate::window::SequenceDataset;

/// Hyperparameters of [`LstmRegressor`].
#[derive(Debug, Clone, PartialEq)]
pub struct LstmConfig {
    pub hidden_size: usize,
    pub learning_rate: f64,
    pub batch_size: usize,
    /// Maximum global L2 norm of a batch gradient.
    pub gradient_clip: f64,
    /// Seed for weight initialization and per-epoch shuffling.
    pub seed: u64,
}

impl Default for LstmConfig {
    fn default() -> Self {
        Self {
            hidden_size: 32,
            learning_rate: 0.01,
            batch_size: 32,
            gradient_clip: 1.0,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
enum State {
    Untrained,
    Trained(LstmNetwork),
    Disposed,
}

/// Recurrent implementation of [`ForecastModel`].
#[derive(Debug, Clone)]
pub struct LstmRegressor {
    config: LstmConfig,
    state: State,
}

impl LstmRegressor {
    pub fn new(config: LstmConfig) -> Self {
        Self {
            config,
            state: State::Untrained,
        }
    }

    pub fn config(&self) -> &LstmConfig {
        &self.config
    }

    fn validate(
        &self,
        epochs: usize,
        validation_fraction: f64,
    ) -> Result<(), Report<ForecastError>> {
        if epochs == 0 {
            bail!(ForecastError::InvalidInput {
                reason: "epochs must be > 0".into(),
            });
        }
        if !(0.0..1.0).contains(&validation_fraction) {
            bail!(ForecastError::InvalidInput {
                reason: format!("validation fraction {validation_fraction} is outside [0, 1)"),
            });
        }
        if self.config.hidden_size == 0 || self.config.batch_size == 0 {
            bail!(ForecastError::InvalidInput {
                reason: "hidden_size and batch_size must be > 0".into(),
            });
        }
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(self.config.learning_rate) || !positive(self.config.gradient_clip) {
            bail!(ForecastError::InvalidInput {
                reason: "learning_rate and gradient_clip must be > 0".into(),
            });
        }
        Ok(())
    }
}

impl ForecastModel for LstmRegressor {
    fn name(&self) -> &str {
        "lstm"
    }

    fn status(&self) -> ModelStatus {
        match self.state {
            State::Untrained => ModelStatus::Untrained,
            State::Trained(_) => ModelStatus::Trained,
            State::Disposed => ModelStatus::Disposed,
        }
    }

    fn fit(
        &mut self,
        dataset: &SequenceDataset,
        epochs: usize,
        validation_fraction: f64,
    ) -> Result<FitHistory, Report<ForecastError>> {
        if matches!(self.state, State::Disposed) {
            bail!(ForecastError::Training {
                reason: "model has been disposed".into(),
            });
        }
        if dataset.is_empty() {
            bail!(ForecastError::Training {
                reason: "dataset is empty".into(),
            });
        }
        self.validate(epochs, validation_fraction)?;

        let lookback = dataset.lookback();
        if let Some(bad) = dataset.windows().iter().find(|w| w.len() != lookback) {
            bail!(ForecastError::Shape {
                expected: lookback,
                actual: bad.len(),
            });
        }

        let train_len = dataset.training_len(validation_fraction);
        if train_len == 0 {
            bail!(ForecastError::Training {
                reason: "validation split leaves no training samples".into(),
            });
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut network = LstmNetwork::new(self.config.hidden_size, lookback, &mut rng);
        let mut optimizer = Adam::new(self.config.learning_rate);

        let windows = dataset.windows();
        let targets = dataset.targets();
        let mut order: Vec<usize> = (0..train_len).collect();
        let validation: Vec<usize> = (train_len..dataset.len()).collect();

        let mut history = FitHistory {
            train_samples: train_len,
            validation_samples: validation.len(),
            ..FitHistory::default()
        };

        for epoch in 0..epochs {
            order.shuffle(&mut rng);

            for batch in order.chunks(self.config.batch_size) {
                let mut grads = Gradients::zeros(self.config.hidden_size);
                let scale = 1.0 / batch.len() as f64;
                for &index in batch {
                    network.accumulate(&windows[index], targets[index], scale, &mut grads);
                }
                grads.clip(self.config.gradient_clip);
                network.apply(&mut optimizer, &grads);
            }

            let train_loss = network.mse(windows, targets, &order);
            if !train_loss.is_finite() {
                bail!(ForecastError::Training {
                    reason: format!("loss diverged at epoch {}", epoch + 1),
                });
            }
            history.train_loss.push(train_loss);

            let validation_loss = if validation.is_empty() {
                None
            } else {
                let loss = network.mse(windows, targets, &validation);
                history.validation_loss.push(loss);
                Some(loss)
            };

            tracing::debug!(
                epoch = epoch + 1,
                epochs,
                train_loss,
                validation_loss = ?validation_loss,
                "epoch finished"
            );
        }

        self.state = State::Trained(network);
        Ok(history)
    }

    fn predict_one(&self, window: &[f64]) -> Result<f64, Report<ForecastError>> {
        let State::Trained(network) = &self.state else {
            bail!(ForecastError::NotTrained);
        };
        if window.len() != network.lookback {
            bail!(ForecastError::Shape {
                expected: network.lookback,
                actual: window.len(),
            });
        }
        Ok(network.forward(window))
    }

    fn dispose(&mut self) {
        self.state = State::Disposed;
    }
}

#[derive(Debug, Clone)]
struct LstmNetwork {
    hidden: usize,
    lookback: usize,
    /// Input weights for the stacked gates `[i, f, g, o]`, shape `[4H]`.
    w_x: Array1<f64>,
    /// Recurrent weights, shape `[4H, H]`.
    w_h: Array2<f64>,
    bias: Array1<f64>,
    w_out: Array1<f64>,
    b_out: Array1<f64>,
}

/// Activations of one time step kept for the backward pass.
struct Step {
    x: f64,
    h_prev: Array1<f64>,
    c_prev: Array1<f64>,
    i: Array1<f64>,
    f: Array1<f64>,
    g: Array1<f64>,
    o: Array1<f64>,
    tanh_c: Array1<f64>,
    h: Array1<f64>,
    c: Array1<f64>,
}

struct Gradients {
    w_x: Array1<f64>,
    w_h: Array2<f64>,
    bias: Array1<f64>,
    w_out: Array1<f64>,
    b_out: Array1<f64>,
}

impl Gradients {
    fn zeros(hidden: usize) -> Self {
        Self {
            w_x: Array1::zeros(4 * hidden),
            w_h: Array2::zeros((4 * hidden, hidden)),
            bias: Array1::zeros(4 * hidden),
            w_out: Array1::zeros(hidden),
            b_out: Array1::zeros(1),
        }
    }

    fn norm(&self) -> f64 {
        let squares = self.w_x.mapv(|v| v * v).sum()
            + self.w_h.mapv(|v| v * v).sum()
            + self.bias.mapv(|v| v * v).sum()
            + self.w_out.mapv(|v| v * v).sum()
            + self.b_out.mapv(|v| v * v).sum();
        squares.sqrt()
    }

    fn clip(&mut self, max_norm: f64) {
        let norm = self.norm();
        if norm > max_norm {
            let factor = max_norm / norm;
            self.w_x *= factor;
            self.w_h *= factor;
            self.bias *= factor;
            self.w_out *= factor;
            self.b_out *= factor;
        }
    }
}

impl LstmNetwork {
    fn new(hidden: usize, lookback: usize, rng: &mut StdRng) -> Self {
        let limit = (1.0 / hidden as f64).sqrt();
        let mut uniform = || rng.gen_range(-limit..limit);

        let w_x = Array1::from_shape_fn(4 * hidden, |_| uniform());
        let w_h = Array2::from_shape_fn((4 * hidden, hidden), |_| uniform());
        let w_out = Array1::from_shape_fn(hidden, |_| uniform());

        let mut bias = Array1::zeros(4 * hidden);
        // Forget gate starts open
        bias.slice_mut(s![hidden..2 * hidden]).fill(1.0);

        Self {
            hidden,
            lookback,
            w_x,
            w_h,
            bias,
            w_out,
            b_out: Array1::zeros(1),
        }
    }

    fn step(&self, x: f64, h_prev: &Array1<f64>, c_prev: &Array1<f64>) -> Step {
        let hs = self.hidden;
        let z = &self.w_x * x + self.w_h.dot(h_prev) + &self.bias;

        let i = z.slice(s![0..hs]).mapv(sigmoid);
        let f = z.slice(s![hs..2 * hs]).mapv(sigmoid);
        let g = z.slice(s![2 * hs..3 * hs]).mapv(f64::tanh);
        let o = z.slice(s![3 * hs..]).mapv(sigmoid);

        let c = &f * c_prev + &i * &g;
        let tanh_c = c.mapv(f64::tanh);
        let h = &o * &tanh_c;

        Step {
            x,
            h_prev: h_prev.clone(),
            c_prev: c_prev.clone(),
            i,
            f,
            g,
            o,
            tanh_c,
            h,
            c,
        }
    }

    fn unroll(&self, window: &[f64]) -> Vec<Step> {
        let mut steps: Vec<Step> = Vec::with_capacity(window.len());
        let mut h = Array1::zeros(self.hidden);
        let mut c = Array1::zeros(self.hidden);
        for &x in window {
            let step = self.step(x, &h, &c);
            h = step.h.clone();
            c = step.c.clone();
            steps.push(step);
        }
        steps
    }

    fn read_out(&self, h: &Array1<f64>) -> f64 {
        self.w_out.dot(h) + self.b_out[0]
    }

    fn forward(&self, window: &[f64]) -> f64 {
        let mut h = Array1::zeros(self.hidden);
        let mut c = Array1::zeros(self.hidden);
        for &x in window {
            let step = self.step(x, &h, &c);
            h = step.h;
            c = step.c;
        }
        self.read_out(&h)
    }

    /// Add the gradient of `scale * (y - target)^2` to `grads`.
    fn accumulate(&self, window: &[f64], target: f64, scale: f64, grads: &mut Gradients) {
        let hs = self.hidden;
        let steps = self.unroll(window);
        let Some(last) = steps.last() else {
            return;
        };

        let dy = 2.0 * (self.read_out(&last.h) - target) * scale;
        grads.w_out.scaled_add(dy, &last.h);
        grads.b_out[0] += dy;

        let mut dh = &self.w_out * dy;
        let mut dc: Array1<f64> = Array1::zeros(hs);

        for step in steps.iter().rev() {
            let d_o = &dh * &step.tanh_c;
            let dc_total = &dc + &(&dh * &step.o * &step.tanh_c.mapv(|t| 1.0 - t * t));
            let d_f = &dc_total * &step.c_prev;
            let d_i = &dc_total * &step.g;
            let d_g = &dc_total * &step.i;

            let mut dz: Array1<f64> = Array1::zeros(4 * hs);
            dz.slice_mut(s![0..hs])
                .assign(&(&d_i * &step.i.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![hs..2 * hs])
                .assign(&(&d_f * &step.f.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![2 * hs..3 * hs])
                .assign(&(&d_g * &step.g.mapv(|v| 1.0 - v * v)));
            dz.slice_mut(s![3 * hs..])
                .assign(&(&d_o * &step.o.mapv(|v| v * (1.0 - v))));

            grads.w_x.scaled_add(step.x, &dz);
            let outer = dz
                .view()
                .insert_axis(Axis(1))
                .dot(&step.h_prev.view().insert_axis(Axis(0)));
            grads.w_h += &outer;
            grads.bias += &dz;

            dh = self.w_h.t().dot(&dz);
            dc = &dc_total * &step.f;
        }
    }

    fn apply(&mut self, optimizer: &mut Adam, grads: &Gradients) {
        optimizer.begin_step();
        optimizer.apply(0, &mut self.w_x, &grads.w_x);
        optimizer.apply(1, &mut self.w_h, &grads.w_h);
        optimizer.apply(2, &mut self.bias, &grads.bias);
        optimizer.apply(3, &mut self.w_out, &grads.w_out);
        optimizer.apply(4, &mut self.b_out, &grads.b_out);
    }

    fn mse(&self, windows: &[Vec<f64>], targets: &[f64], indices: &[usize]) -> f64 {
        if indices.is_empty() {
            return 0.0;
        }
        let total: f64 = indices
            .iter()
            .map(|&i| {
                let err = self.forward(&windows[i]) - targets[i];
                err * err
            })
            .sum();
        total / indices.len() as f64
    }
}

fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}
