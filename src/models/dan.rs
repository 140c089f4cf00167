//! Domain-adversarial model: segmenter, label classifier and domain
//! discriminator over windowed latent sequences.
//!
//! A raw signal batch is sliced into consecutive fixed-width windows, each
//! window is encoded to a `c_dim` latent vector, and the per-sample latent
//! sequences feed two single-layer LSTM heads: a binary label classifier,
//! and a domain discriminator that sees the latents through the
//! gradient-reversal layer. In train mode the forward pass also builds the
//! shuffled second view of the batch and its same-domain pairing labels.

use candle_core::{DType, Device, Tensor};
use candle_nn::{linear, lstm, Linear, LSTMConfig, Module, RNN, LSTM};
use rand::Rng;

use crate::config::{DanConfig, EncoderKind, Mode};
use crate::data::SignalBatch;
use crate::error::{DanError, DanResult};
use crate::models::cnn::CnnEncoder;
use crate::models::grl::reverse_gradient;
use crate::models::pairing::{pairing_labels, pairing_order};
use crate::models::vae::VaeEncoder;

/// The windowed encoder behind the segmenter.
pub enum WindowedEncoder {
    Vae(VaeEncoder),
    Cnn(CnnEncoder),
}

/// Latent sequences for one batch, plus the accumulated auxiliary
/// reconstruction loss when the VAE encoder is active.
#[derive(Debug)]
pub struct LatentSequences {
    /// Shape `(batch, max_windows, c_dim)`; rows past each sample's own
    /// window count are zero vectors.
    pub latents: Tensor,
    /// Mean next-window reconstruction MSE (VAE encoder only).
    pub recon_loss: Option<Tensor>,
}

/// Full adversarial output of a train-mode forward pass.
pub struct TrainOutput {
    /// Label logits, shape `(batch, 2)`.
    pub label_logits: Tensor,
    /// Domain-feature logits for the original and the paired view,
    /// each `(batch, num_domains)`.
    pub domain_logits: (Tensor, Tensor),
    /// Same-domain indicator per pair, shape `(batch,)`.
    pub pairing_labels: Tensor,
    /// The permutation that produced the second view.
    pub pairing_order: Vec<usize>,
    /// Auxiliary reconstruction loss (VAE encoder only).
    pub recon_loss: Option<Tensor>,
}

/// Output of [`Dan::forward`], depending on the configured mode.
pub enum DanOutput {
    /// Train mode: the full adversarial tuple.
    Train(TrainOutput),
    /// Any other mode: label logits only.
    Inference {
        /// Label logits, shape `(batch, 2)`.
        label_logits: Tensor,
    },
}

/// Domain-adversarial network over windowed latent sequences.
pub struct Dan {
    config: DanConfig,
    encoder: WindowedEncoder,
    label_rnn: LSTM,
    label_fc: Linear,
    domain_rnn: LSTM,
    domain_fc: Linear,
    device: Device,
}

impl Dan {
    /// Build the model under the given variable scope.
    ///
    /// Validates the configuration first, so inconsistent window geometry
    /// fails here with a descriptive error rather than as a shape mismatch
    /// inside a later forward pass.
    pub fn new(config: DanConfig, vb: candle_nn::VarBuilder) -> DanResult<Self> {
        config.validate()?;
        let device = vb.device().clone();

        let encoder = match config.encoder {
            EncoderKind::Vae => WindowedEncoder::Vae(VaeEncoder::new(
                config.input_height,
                config.input_width,
                config.c_dim,
                config.stochastic,
                vb.pp("encoder"),
            )?),
            EncoderKind::Cnn => WindowedEncoder::Cnn(CnnEncoder::new(
                config.input_height,
                config.input_width,
                config.c_dim,
                vb.pp("encoder"),
            )?),
        };

        let label_rnn = lstm(
            config.c_dim,
            config.hidden_size,
            LSTMConfig::default(),
            vb.pp("label_rnn"),
        )
        .map_err(map_candle)?;
        let label_fc = linear(config.hidden_size, 2, vb.pp("label_fc")).map_err(map_candle)?;

        let domain_rnn = lstm(
            config.c_dim,
            config.hidden_size,
            LSTMConfig::default(),
            vb.pp("domain_rnn"),
        )
        .map_err(map_candle)?;
        let domain_fc =
            linear(config.hidden_size, config.num_domains, vb.pp("domain_fc")).map_err(map_candle)?;

        tracing::debug!(
            encoder = ?config.encoder,
            c_dim = config.c_dim,
            num_domains = config.num_domains,
            "constructed domain-adversarial model"
        );

        Ok(Self {
            config,
            encoder,
            label_rnn,
            label_fc,
            domain_rnn,
            domain_fc,
            device,
        })
    }

    /// The model configuration.
    pub fn config(&self) -> &DanConfig {
        &self.config
    }

    /// Slice every signal into consecutive `resampling`-wide windows,
    /// encode each window, and assemble zero-padded latent sequences.
    ///
    /// `signals` has shape `(batch, height, time)`; `lengths[i]` is the
    /// true length of sample `i`. The sequence depth is the maximum window
    /// count over the whole batch, so batch ordering carries no contract.
    /// `train` selects the encoder's batch-norm statistics mode.
    pub fn segment(
        &self,
        signals: &Tensor,
        lengths: &[usize],
        train: bool,
    ) -> DanResult<LatentSequences> {
        let (batch, _height, time) = signals.dims3().map_err(|e| DanError::ShapeMismatch {
            expected: "(batch, height, time)".into(),
            actual: format!("{:?} ({e})", signals.shape()),
        })?;
        if lengths.len() != batch {
            return Err(DanError::LengthMismatch {
                expected: batch,
                actual: lengths.len(),
            });
        }
        for (index, &length) in lengths.iter().enumerate() {
            if length > time {
                return Err(DanError::LengthExceedsSignal {
                    index,
                    length,
                    padded: time,
                });
            }
        }

        let resampling = self.config.resampling;
        let window_counts: Vec<usize> = lengths.iter().map(|l| l / resampling).collect();
        let max_windows = window_counts.iter().copied().max().unwrap_or(0);
        if max_windows == 0 {
            return Err(DanError::InsufficientSignalLength {
                max_length: lengths.iter().copied().max().unwrap_or(0),
                resampling,
            });
        }

        let mut recon_acc = Tensor::zeros((), DType::F32, &self.device).map_err(map_candle)?;
        let mut recon_pairs = 0usize;
        let mut sequences = Vec::with_capacity(batch);

        for (i, &count) in window_counts.iter().enumerate() {
            let sample = signals.get(i).map_err(map_candle)?;
            let mut latents = Vec::with_capacity(count);
            for j in 0..count {
                let window = sample
                    .narrow(1, j * resampling, resampling)
                    .map_err(map_candle)?;
                let latent = match &self.encoder {
                    WindowedEncoder::Vae(vae) => {
                        let (latent, reconstruction) = vae.encode_decode(&window)?;
                        if j + 1 < count {
                            let next = sample
                                .narrow(1, (j + 1) * resampling, resampling)
                                .map_err(map_candle)?;
                            let mse = (reconstruction - next)
                                .and_then(|d| d.sqr())
                                .and_then(|d| d.mean_all())
                                .map_err(map_candle)?;
                            recon_acc = (recon_acc + mse).map_err(map_candle)?;
                            recon_pairs += 1;
                        }
                        latent
                    }
                    WindowedEncoder::Cnn(cnn) => cnn.encode(&window, train)?,
                };
                latents.push(latent);
            }

            let sequence = if latents.is_empty() {
                Tensor::zeros((max_windows, self.config.c_dim), DType::F32, &self.device)
                    .map_err(map_candle)?
            } else {
                let encoded = Tensor::stack(&latents, 0).map_err(map_candle)?;
                if count < max_windows {
                    let padding = Tensor::zeros(
                        (max_windows - count, self.config.c_dim),
                        DType::F32,
                        &self.device,
                    )
                    .map_err(map_candle)?;
                    Tensor::cat(&[encoded, padding], 0).map_err(map_candle)?
                } else {
                    encoded
                }
            };
            sequences.push(sequence);
        }

        let latents = Tensor::stack(&sequences, 0).map_err(map_candle)?;

        let recon_loss = match self.encoder {
            WindowedEncoder::Vae(_) => {
                if recon_pairs == 0 {
                    tracing::warn!(
                        "batch has windows but no (window, next-window) pair; \
                         reconstruction loss is zero"
                    );
                    Some(recon_acc)
                } else {
                    Some(
                        recon_acc
                            .affine(1.0 / recon_pairs as f64, 0.0)
                            .map_err(map_candle)?,
                    )
                }
            }
            WindowedEncoder::Cnn(_) => None,
        };

        Ok(LatentSequences { latents, recon_loss })
    }

    /// Run a latent sequence through an LSTM head and project the final
    /// hidden state.
    fn head(&self, rnn: &LSTM, fc: &Linear, latents: &Tensor) -> DanResult<Tensor> {
        let states = rnn.seq(latents).map_err(map_candle)?;
        let last = states.last().ok_or_else(|| DanError::ShapeMismatch {
            expected: "latent sequence with at least one step".into(),
            actual: "empty sequence".into(),
        })?;
        fc.forward(last.h()).map_err(map_candle)
    }

    /// Label logits from a latent sequence, shape `(batch, 2)`.
    pub fn classify(&self, latents: &Tensor) -> DanResult<Tensor> {
        self.head(&self.label_rnn, &self.label_fc, latents)
    }

    /// Domain-feature logits for both views of the batch.
    ///
    /// Each view passes through the gradient-reversal layer with the same
    /// `alpha`, then the shared discriminator LSTM and projection. The
    /// outputs are compared pairwise by the contrastive loss; they are not
    /// a direct classification target.
    pub fn discriminate(
        &self,
        latents: &Tensor,
        paired_latents: &Tensor,
        alpha: f64,
    ) -> DanResult<(Tensor, Tensor)> {
        let reversed_1 = reverse_gradient(latents, alpha)?;
        let reversed_2 = reverse_gradient(paired_latents, alpha)?;
        let logits_1 = self.head(&self.domain_rnn, &self.domain_fc, &reversed_1)?;
        let logits_2 = self.head(&self.domain_rnn, &self.domain_fc, &reversed_2)?;
        Ok((logits_1, logits_2))
    }

    /// Full train-mode forward pass.
    pub fn forward_train<R: Rng + ?Sized>(
        &self,
        batch: &SignalBatch,
        alpha: f64,
        rng: &mut R,
    ) -> DanResult<TrainOutput> {
        let segmented = self.segment(&batch.signals, &batch.lengths, true)?;
        let label_logits = self.classify(&segmented.latents)?;

        let n = batch.batch_size();
        let order = pairing_order(n, rng);
        let labels = pairing_labels(&batch.domains, &order);

        let order_ids: Vec<u32> = order.iter().map(|&p| p as u32).collect();
        let order_tensor =
            Tensor::from_vec(order_ids, n, &self.device).map_err(map_candle)?;
        let paired_latents = segmented
            .latents
            .index_select(&order_tensor, 0)
            .map_err(map_candle)?;

        let domain_logits = self.discriminate(&segmented.latents, &paired_latents, alpha)?;
        let pairing = Tensor::from_vec(labels, n, &self.device).map_err(map_candle)?;

        Ok(TrainOutput {
            label_logits,
            domain_logits,
            pairing_labels: pairing,
            pairing_order: order,
            recon_loss: segmented.recon_loss,
        })
    }

    /// Inference path: label logits only, batch-norm in eval mode.
    pub fn predict(&self, signals: &Tensor, lengths: &[usize]) -> DanResult<Tensor> {
        let segmented = self.segment(signals, lengths, false)?;
        self.classify(&segmented.latents)
    }

    /// Mode-dispatched forward pass: the configured [`Mode`] decides
    /// whether the full adversarial tuple or only the label logits come
    /// back.
    pub fn forward<R: Rng + ?Sized>(
        &self,
        batch: &SignalBatch,
        alpha: f64,
        rng: &mut R,
    ) -> DanResult<DanOutput> {
        match self.config.mode {
            Mode::Train => Ok(DanOutput::Train(self.forward_train(batch, alpha, rng)?)),
            Mode::Inference => Ok(DanOutput::Inference {
                label_logits: self.predict(&batch.signals, &batch.lengths)?,
            }),
        }
    }
}

fn map_candle(e: candle_core::Error) -> DanError {
    DanError::Tensor {
        message: format!("DAN forward error: {e}"),
    }
}
