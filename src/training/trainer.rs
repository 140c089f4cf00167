//! Training loop for the domain-adversarial model.
//!
//! Each step composes three signals into one loss — label cross-entropy,
//! the gated contrastive domain loss (through the gradient-reversal
//! layer), and the VAE's next-window reconstruction loss — then runs a
//! single AdamW update. Per-epoch averages of all three curves plus
//! accuracy are kept in a [`TrainingHistory`], with best-checkpoint
//! saving and early stopping driven by evaluation accuracy.

use std::path::{Path, PathBuf};

use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::DanConfig;
use crate::data::SignalBatch;
use crate::error::{DanError, DanResult};
use crate::models::Dan;

use super::loss::ContrastiveLoss;
use super::optimizer::{AdamW, AdamWConfig};

/// Adversarial ramp for the gradient-reversal strength:
/// `2 / (1 + exp(-10 p)) - 1` over training progress `p` in `[0, 1]`.
///
/// Starts at 0 (no adversarial signal while the encoder is still random)
/// and saturates near 1.
pub fn grl_alpha(progress: f64) -> f64 {
    2.0 / (1.0 + (-10.0 * progress.clamp(0.0, 1.0)).exp()) - 1.0
}

/// Trainer configuration.
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    /// Number of training epochs.
    pub epochs: u32,
    /// Evaluate every N epochs.
    pub eval_every: u32,
    /// Directory for saved checkpoints.
    pub checkpoint_dir: PathBuf,
    /// Early stopping patience in epochs without an accuracy improvement.
    pub early_stopping_patience: u32,
    /// Random seed for the pairing shuffle.
    pub seed: u64,
    /// Weight of the contrastive domain loss in the combined loss.
    pub lambda_domain: f64,
    /// Weight of the VAE reconstruction loss in the combined loss.
    pub lambda_recon: f64,
    /// Contrastive margin for different-domain pairs.
    pub margin: f64,
    /// Optimizer configuration.
    pub optimizer: AdamWConfig,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            epochs: 50,
            eval_every: 5,
            checkpoint_dir: PathBuf::from("models/dan"),
            early_stopping_patience: 10,
            seed: 42,
            lambda_domain: 1.0,
            lambda_recon: 1.0,
            margin: 1.0,
            optimizer: AdamWConfig::default(),
        }
    }
}

/// Scalar loss values for one training step.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepMetrics {
    /// Label cross-entropy.
    pub label_loss: f32,
    /// Contrastive domain loss.
    pub domain_loss: f32,
    /// VAE reconstruction loss (0 for the CNN encoder).
    pub recon_loss: f32,
    /// Combined weighted loss driving the update.
    pub total_loss: f32,
}

impl StepMetrics {
    fn accumulate(&mut self, other: &StepMetrics) {
        self.label_loss += other.label_loss;
        self.domain_loss += other.domain_loss;
        self.recon_loss += other.recon_loss;
        self.total_loss += other.total_loss;
    }

    fn scale(&mut self, factor: f32) {
        self.label_loss *= factor;
        self.domain_loss *= factor;
        self.recon_loss *= factor;
        self.total_loss *= factor;
    }
}

/// Result of a single epoch.
#[derive(Debug, Clone)]
pub struct EpochResult {
    /// Epoch number (1-indexed).
    pub epoch: u32,
    /// Average step metrics across the epoch.
    pub avg: StepMetrics,
    /// Number of batches processed.
    pub num_batches: usize,
    /// Evaluation accuracy, when evaluation ran this epoch.
    pub accuracy: Option<f32>,
    /// Whether this epoch became the new best.
    pub is_best: bool,
}

/// Training curves accumulated across epochs — label loss, domain loss,
/// total loss and accuracy per epoch.
#[derive(Debug, Clone, Default)]
pub struct TrainingHistory {
    /// Per-epoch results.
    pub epochs: Vec<EpochResult>,
    /// Best evaluation accuracy achieved.
    pub best_accuracy: f32,
    /// Epoch that achieved it.
    pub best_epoch: u32,
    /// Whether early stopping triggered.
    pub early_stopped: bool,
    /// Total optimizer steps.
    pub total_steps: usize,
}

/// Trainer owning the model, its variables and the optimizer.
pub struct DanTrainer {
    model: Dan,
    varmap: VarMap,
    optimizer: AdamW,
    domain_loss: ContrastiveLoss,
    config: TrainerConfig,
    history: TrainingHistory,
    rng: StdRng,
    device: Device,
}

impl DanTrainer {
    /// Build a fresh model and trainer from the two configurations.
    pub fn new(model_config: DanConfig, config: TrainerConfig) -> DanResult<Self> {
        let device = model_config.device.device()?;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = Dan::new(model_config, vb)?;
        let optimizer = AdamW::new(varmap.all_vars(), config.optimizer.clone())?;
        let domain_loss = ContrastiveLoss::new(config.margin);
        let rng = StdRng::seed_from_u64(config.seed);

        tracing::info!(
            params = optimizer.num_params(),
            epochs = config.epochs,
            "trainer initialized"
        );

        Ok(Self {
            model,
            varmap,
            optimizer,
            domain_loss,
            config,
            history: TrainingHistory::default(),
            rng,
            device,
        })
    }

    /// The model under training.
    pub fn model(&self) -> &Dan {
        &self.model
    }

    /// The trainer configuration.
    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// The accumulated training history.
    pub fn history(&self) -> &TrainingHistory {
        &self.history
    }

    /// Run one optimization step on a batch.
    ///
    /// `alpha` is the gradient-reversal strength; callers typically pass
    /// [`grl_alpha`] of the current training progress.
    pub fn train_step(&mut self, batch: &SignalBatch, alpha: f64) -> DanResult<StepMetrics> {
        let out = self.model.forward_train(batch, alpha, &mut self.rng)?;

        let labels = batch.labels_tensor(&self.device)?;
        let label_loss = candle_nn::loss::cross_entropy(&out.label_logits, &labels)
            .map_err(map_candle)?;
        let domain_loss = self.domain_loss.compute(
            &out.domain_logits.0,
            &out.domain_logits.1,
            &out.pairing_labels,
            None,
        )?;

        let mut total = label_loss
            .add(
                &domain_loss
                    .affine(self.config.lambda_domain, 0.0)
                    .map_err(map_candle)?,
            )
            .map_err(map_candle)?;
        let mut recon_value = 0.0f32;
        if let Some(recon) = &out.recon_loss {
            recon_value = recon.to_scalar().map_err(map_candle)?;
            total = total
                .add(
                    &recon
                        .affine(self.config.lambda_recon, 0.0)
                        .map_err(map_candle)?,
                )
                .map_err(map_candle)?;
        }

        let metrics = StepMetrics {
            label_loss: label_loss.to_scalar().map_err(map_candle)?,
            domain_loss: domain_loss.to_scalar().map_err(map_candle)?,
            recon_loss: recon_value,
            total_loss: total.to_scalar().map_err(map_candle)?,
        };

        self.optimizer.step(&total)?;
        self.history.total_steps += 1;

        Ok(metrics)
    }

    /// Argmax accuracy of the label classifier on a batch.
    pub fn evaluate(&self, batch: &SignalBatch) -> DanResult<f32> {
        let logits = self.model.predict(&batch.signals, &batch.lengths)?;
        let predictions: Vec<u32> = logits
            .argmax(1)
            .and_then(|p| p.to_vec1())
            .map_err(map_candle)?;
        let correct = predictions
            .iter()
            .zip(batch.labels.iter())
            .filter(|(p, l)| p == l)
            .count();
        Ok(correct as f32 / batch.batch_size().max(1) as f32)
    }

    /// Train one epoch over the given batches, evaluating afterwards when
    /// `eval` is provided and the epoch hits the `eval_every` cadence.
    pub fn train_epoch(
        &mut self,
        batches: &[SignalBatch],
        eval: Option<&SignalBatch>,
        epoch: u32,
    ) -> DanResult<EpochResult> {
        let total_steps = self.config.optimizer.total_steps.max(1);
        let mut avg = StepMetrics::default();
        for batch in batches {
            let progress = self.history.total_steps as f64 / total_steps as f64;
            let step = self.train_step(batch, grl_alpha(progress))?;
            avg.accumulate(&step);
        }
        if !batches.is_empty() {
            avg.scale(1.0 / batches.len() as f32);
        }

        let accuracy = match eval {
            Some(batch) if epoch % self.config.eval_every == 0 => Some(self.evaluate(batch)?),
            _ => None,
        };

        tracing::info!(
            epoch,
            label_loss = avg.label_loss,
            domain_loss = avg.domain_loss,
            total_loss = avg.total_loss,
            accuracy = accuracy.unwrap_or(f32::NAN),
            "epoch complete"
        );

        Ok(EpochResult {
            epoch,
            avg,
            num_batches: batches.len(),
            accuracy,
            is_best: false,
        })
    }

    /// Record an epoch result, updating best-accuracy bookkeeping.
    ///
    /// Returns `false` when early stopping triggers.
    pub fn record_epoch(&mut self, mut result: EpochResult) -> bool {
        let is_best = result
            .accuracy
            .map(|a| a > self.history.best_accuracy)
            .unwrap_or(false);
        if is_best {
            self.history.best_accuracy = result.accuracy.unwrap_or(0.0);
            self.history.best_epoch = result.epoch;
        }
        result.is_best = is_best;
        self.history.epochs.push(result);

        let epochs_since_best = self.history.epochs.len() as u32 - self.history.best_epoch;
        if epochs_since_best > self.config.early_stopping_patience && self.history.best_epoch > 0 {
            self.history.early_stopped = true;
            return false;
        }
        true
    }

    /// Full training run: epochs, periodic evaluation, best-checkpoint
    /// saving and early stopping.
    pub fn fit(
        &mut self,
        batches: &[SignalBatch],
        eval: Option<&SignalBatch>,
    ) -> DanResult<&TrainingHistory> {
        for epoch in 1..=self.config.epochs {
            let result = self.train_epoch(batches, eval, epoch)?;
            let is_best = result
                .accuracy
                .map(|a| a > self.history.best_accuracy)
                .unwrap_or(false);
            let keep_going = self.record_epoch(result);
            if is_best {
                self.save_best()?;
            }
            if !keep_going {
                tracing::info!(
                    epoch,
                    best_epoch = self.history.best_epoch,
                    "early stopping triggered"
                );
                break;
            }
        }
        Ok(&self.history)
    }

    /// Save all model parameters as a safetensors checkpoint.
    pub fn save_checkpoint(&self, path: &Path) -> DanResult<()> {
        self.varmap.save(path).map_err(map_candle)?;
        tracing::info!(path = %path.display(), "checkpoint saved");
        Ok(())
    }

    /// Save the best checkpoint under the configured checkpoint directory.
    pub fn save_best(&self) -> DanResult<()> {
        std::fs::create_dir_all(&self.config.checkpoint_dir)?;
        let path = self.config.checkpoint_dir.join("dan_best.safetensors");
        self.save_checkpoint(&path)
    }

    /// Load model parameters from a safetensors checkpoint.
    pub fn load_checkpoint(&mut self, path: &Path) -> DanResult<()> {
        self.varmap.load(path).map_err(map_candle)
    }
}

fn map_candle(e: candle_core::Error) -> DanError {
    DanError::Tensor {
        message: format!("trainer error: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EncoderKind;

    fn small_model_config() -> DanConfig {
        DanConfig {
            encoder: EncoderKind::Vae,
            c_dim: 3,
            input_height: 4,
            input_width: 8,
            resampling: 8,
            ..Default::default()
        }
    }

    fn small_trainer_config() -> TrainerConfig {
        TrainerConfig {
            epochs: 2,
            eval_every: 1,
            optimizer: AdamWConfig {
                lr: 1e-3,
                warmup_fraction: 0.0,
                total_steps: 10,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn alpha_schedule_ramps_from_zero_toward_one() {
        assert!(grl_alpha(0.0).abs() < 1e-9);
        // 2 / (1 + exp(-10)) - 1 = tanh(5).
        assert!((grl_alpha(1.0) - 0.99991).abs() < 1e-4);
        assert!(grl_alpha(0.25) < grl_alpha(0.5));
        assert!(grl_alpha(0.5) < grl_alpha(0.75));
        // Progress is clamped, so overshoot saturates rather than grows.
        assert!((grl_alpha(2.0) - grl_alpha(1.0)).abs() < 1e-9);
    }

    #[test]
    fn train_step_produces_finite_metrics() {
        let mut trainer =
            DanTrainer::new(small_model_config(), small_trainer_config()).unwrap();
        let batch = SignalBatch::synthetic(4, 24, &[24, 16, 16, 8], 5, &Device::Cpu).unwrap();

        let metrics = trainer.train_step(&batch, 0.5).unwrap();
        assert!(metrics.label_loss.is_finite());
        assert!(metrics.domain_loss.is_finite());
        assert!(metrics.recon_loss.is_finite() && metrics.recon_loss >= 0.0);
        assert!(metrics.total_loss.is_finite());
        assert_eq!(trainer.history().total_steps, 1);
    }

    #[test]
    fn evaluate_returns_a_fraction() {
        let trainer = DanTrainer::new(small_model_config(), small_trainer_config()).unwrap();
        let batch = SignalBatch::synthetic(4, 24, &[24, 16], 5, &Device::Cpu).unwrap();
        let accuracy = trainer.evaluate(&batch).unwrap();
        assert!((0.0..=1.0).contains(&accuracy));
    }

    #[test]
    fn record_epoch_tracks_best_and_early_stops() {
        let config = TrainerConfig {
            early_stopping_patience: 1,
            ..small_trainer_config()
        };
        let mut trainer = DanTrainer::new(small_model_config(), config).unwrap();

        let epoch = |n: u32, accuracy: Option<f32>| EpochResult {
            epoch: n,
            avg: StepMetrics::default(),
            num_batches: 1,
            accuracy,
            is_best: false,
        };

        assert!(trainer.record_epoch(epoch(1, Some(0.6))));
        assert_eq!(trainer.history().best_epoch, 1);
        assert!(trainer.record_epoch(epoch(2, Some(0.5))));
        // Third epoch without improvement exceeds patience 1.
        assert!(!trainer.record_epoch(epoch(3, Some(0.4))));
        assert!(trainer.history().early_stopped);
        assert!((trainer.history().best_accuracy - 0.6).abs() < 1e-6);
    }

    #[test]
    fn checkpoint_round_trip_restores_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dan.safetensors");
        let batch = SignalBatch::synthetic(4, 24, &[24, 16], 5, &Device::Cpu).unwrap();

        let mut trainer =
            DanTrainer::new(small_model_config(), small_trainer_config()).unwrap();
        trainer.train_step(&batch, 0.1).unwrap();
        trainer.save_checkpoint(&path).unwrap();
        let expected: Vec<Vec<f32>> = trainer
            .model()
            .predict(&batch.signals, &batch.lengths)
            .unwrap()
            .to_vec2()
            .unwrap();

        let mut restored =
            DanTrainer::new(small_model_config(), small_trainer_config()).unwrap();
        restored.load_checkpoint(&path).unwrap();
        let actual: Vec<Vec<f32>> = restored
            .model()
            .predict(&batch.signals, &batch.lengths)
            .unwrap()
            .to_vec2()
            .unwrap();

        for (row_a, row_b) in expected.iter().zip(actual.iter()) {
            for (a, b) in row_a.iter().zip(row_b.iter()) {
                assert!((a - b).abs() < 1e-6, "restored prediction differs: {a} vs {b}");
            }
        }
    }
}
