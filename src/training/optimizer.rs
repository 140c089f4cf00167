//! AdamW optimizer over candle `Var` tensors.
//!
//! - Per-parameter moment estimates (m, v)
//! - Linear warmup + cosine decay schedule
//! - Global-norm gradient clipping
//! - Decoupled weight decay

use candle_core::{Tensor, Var};

use crate::error::{DanError, DanResult};

/// AdamW optimizer configuration.
#[derive(Debug, Clone)]
pub struct AdamWConfig {
    /// Base learning rate.
    pub lr: f64,
    /// First moment exponential decay rate.
    pub beta1: f64,
    /// Second moment exponential decay rate.
    pub beta2: f64,
    /// Numerical stability constant.
    pub epsilon: f64,
    /// Decoupled weight decay coefficient.
    pub weight_decay: f64,
    /// Maximum global gradient norm before clipping.
    pub max_grad_norm: f64,
    /// Total number of training steps (for the schedule).
    pub total_steps: usize,
    /// Fraction of total steps spent in linear warmup.
    pub warmup_fraction: f64,
}

impl Default for AdamWConfig {
    fn default() -> Self {
        Self {
            lr: 1e-4,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            weight_decay: 0.01,
            max_grad_norm: 1.0,
            total_steps: 1000,
            warmup_fraction: 0.1,
        }
    }
}

/// A tracked parameter with its moment estimates.
struct TrackedParam {
    var: Var,
    m: Tensor,
    v: Tensor,
}

/// AdamW optimizer.
pub struct AdamW {
    config: AdamWConfig,
    params: Vec<TrackedParam>,
    step: usize,
}

impl AdamW {
    /// Create an optimizer over the given trainable variables.
    pub fn new(vars: Vec<Var>, config: AdamWConfig) -> DanResult<Self> {
        let mut params = Vec::with_capacity(vars.len());
        for var in vars {
            let tensor = var.as_tensor();
            let m = Tensor::zeros(tensor.shape(), tensor.dtype(), tensor.device())
                .map_err(map_candle)?;
            let v = Tensor::zeros(tensor.shape(), tensor.dtype(), tensor.device())
                .map_err(map_candle)?;
            params.push(TrackedParam { var, m, v });
        }
        Ok(Self {
            config,
            params,
            step: 0,
        })
    }

    /// Current learning rate under warmup + cosine decay.
    pub fn current_lr(&self) -> f64 {
        let warmup_steps = (self.config.total_steps as f64 * self.config.warmup_fraction) as usize;
        if self.step < warmup_steps {
            self.config.lr * (self.step as f64 / warmup_steps.max(1) as f64)
        } else {
            let decay_steps = self.config.total_steps.saturating_sub(warmup_steps);
            let progress = (self.step - warmup_steps) as f64 / decay_steps.max(1) as f64;
            let cosine_factor = 0.5 * (1.0 + (std::f64::consts::PI * progress).cos());
            self.config.lr * cosine_factor
        }
    }

    /// Run the backward pass for `loss` and apply one AdamW update.
    pub fn step(&mut self, loss: &Tensor) -> DanResult<()> {
        self.step += 1;
        let t = self.step as i32;

        let grads = loss.backward().map_err(map_candle)?;

        // Global gradient norm, before any parameter is touched.
        let mut total_sq = 0.0f64;
        for param in &self.params {
            if let Some(grad) = grads.get(param.var.as_tensor()) {
                let sq_sum: f32 = grad
                    .sqr()
                    .and_then(|g| g.sum_all())
                    .and_then(|g| g.to_scalar())
                    .map_err(map_candle)?;
                total_sq += sq_sum as f64;
            }
        }
        let total_norm = total_sq.sqrt();
        let clip_scale = if total_norm > self.config.max_grad_norm {
            self.config.max_grad_norm / (total_norm + self.config.epsilon)
        } else {
            1.0
        };

        let lr = self.current_lr();
        let bc1 = 1.0 - self.config.beta1.powi(t);
        let bc2 = 1.0 - self.config.beta2.powi(t);

        for param in &mut self.params {
            let grad = match grads.get(param.var.as_tensor()) {
                Some(g) => g,
                None => continue, // no gradient reached this parameter
            };

            let grad = if (clip_scale - 1.0).abs() > 1e-9 {
                grad.affine(clip_scale, 0.0).map_err(map_candle)?
            } else {
                grad.clone()
            };

            // m = b1 * m + (1 - b1) * g; detached, moments are optimizer
            // state, not graph nodes.
            param.m = param
                .m
                .affine(self.config.beta1, 0.0)
                .and_then(|m| m + grad.affine(1.0 - self.config.beta1, 0.0)?)
                .map_err(map_candle)?
                .detach();

            // v = b2 * v + (1 - b2) * g^2
            param.v = param
                .v
                .affine(self.config.beta2, 0.0)
                .and_then(|v| v + grad.sqr()?.affine(1.0 - self.config.beta2, 0.0)?)
                .map_err(map_candle)?
                .detach();

            let m_hat = param.m.affine(1.0 / bc1, 0.0).map_err(map_candle)?;
            let v_hat = param.v.affine(1.0 / bc2, 0.0).map_err(map_candle)?;

            // theta -= lr * m_hat / (sqrt(v_hat) + eps), plus decoupled decay.
            let denom = v_hat
                .sqrt()
                .and_then(|v| v.affine(1.0, self.config.epsilon))
                .map_err(map_candle)?;
            let update = m_hat
                .div(&denom)
                .and_then(|u| u.affine(-lr, 0.0))
                .map_err(map_candle)?;
            let current = param.var.as_tensor().clone();
            let decay = current
                .affine(-lr * self.config.weight_decay, 0.0)
                .map_err(map_candle)?;
            let new_value = current
                .add(&update)
                .and_then(|v| v.add(&decay))
                .map_err(map_candle)?
                .detach();

            param.var.set(&new_value).map_err(map_candle)?;
        }

        Ok(())
    }

    /// Current global step.
    pub fn global_step(&self) -> usize {
        self.step
    }

    /// Number of tracked parameters.
    pub fn num_params(&self) -> usize {
        self.params.len()
    }

    /// The optimizer configuration.
    pub fn config(&self) -> &AdamWConfig {
        &self.config
    }
}

fn map_candle(e: candle_core::Error) -> DanError {
    DanError::Tensor {
        message: format!("optimizer error: {e}"),
    }
}
