//! Domain-adversarial classification of long multivariate signal
//! recordings.
//!
//! A recording is sliced into consecutive fixed-width windows, each window
//! is encoded to a compact latent vector (feed-forward autoencoder or CNN),
//! and the zero-padded latent sequences feed two recurrent heads:
//!
//! - a **label classifier** producing binary class logits, and
//! - a **domain discriminator** behind a gradient-reversal layer, trained
//!   with a margin contrastive loss over shuffled same/different-domain
//!   pairs so the encoder learns domain-invariant features.
//!
//! # Quick start
//!
//! ```no_run
//! use signal_dan::{DanConfig, DanTrainer, SignalBatch, TrainerConfig};
//! use candle_core::Device;
//!
//! # fn main() -> signal_dan::DanResult<()> {
//! let batch = SignalBatch::synthetic(100, 2000, &[2000, 1500, 1000, 500], 5, &Device::Cpu)?;
//! let mut trainer = DanTrainer::new(DanConfig::default(), TrainerConfig::default())?;
//! let history = trainer.fit(std::slice::from_ref(&batch), Some(&batch))?;
//! println!("best accuracy {:.3}", history.best_accuracy);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod models;
pub mod training;

pub use config::{DanConfig, DeviceSelector, EncoderKind, Mode};
pub use data::SignalBatch;
pub use error::{DanError, DanResult};
pub use models::{Dan, DanOutput, TrainOutput};
pub use training::{
    grl_alpha, AdamWConfig, ContrastiveLoss, DanTrainer, TrainerConfig, TrainingHistory,
};
