//! Adam optimizer over `ndarray` parameter tensors.
//!
//! ```text
//! m = beta1 * m + (1 - beta1) * g
//! v = beta2 * v + (1 - beta2) * g^2
//! param -= lr * m_hat / (sqrt(v_hat) + epsilon)
//! ```

use ndarray::{Array, Dimension};

#[derive(Debug, Clone, Default)]
struct Moments {
    first: Vec<f64>,
    second: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    t: i32,
    slots: Vec<Moments>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Self::with_params(learning_rate, 0.9, 0.999, 1e-8)
    }

    pub fn with_params(learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            t: 0,
            slots: Vec::new(),
        }
    }

    /// Advance the bias-correction timestep. Call once per update, before the
    /// `apply` calls for each parameter tensor.
    pub fn begin_step(&mut self) {
        self.t = self.t.saturating_add(1);
    }

    /// Update one parameter tensor. `slot` identifies the tensor so its moment
    /// estimates persist between steps.
    pub fn apply<D: Dimension>(
        &mut self,
        slot: usize,
        params: &mut Array<f64, D>,
        grads: &Array<f64, D>,
    ) {
        if self.slots.len() <= slot {
            self.slots.resize_with(slot + 1, Moments::default);
        }
        let moments = &mut self.slots[slot];
        if moments.first.len() != params.len() {
            moments.first = vec![0.0; params.len()];
            moments.second = vec![0.0; params.len()];
        }

        let t = self.t.max(1);
        let correction1 = 1.0 - self.beta1.powi(t);
        let correction2 = 1.0 - self.beta2.powi(t);

        for (i, (p, g)) in params.iter_mut().zip(grads.iter()).enumerate() {
            moments.first[i] = self.beta1 * moments.first[i] + (1.0 - self.beta1) * g;
            moments.second[i] = self.beta2 * moments.second[i] + (1.0 - self.beta2) * g * g;

            let m_hat = moments.first[i] / correction1;
            let v_hat = moments.second[i] / correction2;
            *p -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
        }
    }
}
