//! Configuration surface for the domain-adversarial model.
//!
//! All knobs live here: encoder choice, window geometry, latent width,
//! device placement and operating mode. `DanConfig::validate` rejects
//! inconsistent settings at construction time so shape mismatches never
//! surface as opaque tensor errors deep inside a forward pass.

use candle_core::Device;
use serde::{Deserialize, Serialize};

use crate::error::{DanError, DanResult};

/// Which windowed encoder backs the segmenter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderKind {
    /// Feed-forward autoencoder with an auxiliary next-window
    /// reconstruction loss.
    Vae,
    /// Four-stage convolutional encoder, no reconstruction loss.
    Cnn,
}

/// Operating mode of the forward pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Full adversarial output: label logits, paired domain logits,
    /// pairing labels and (VAE) reconstruction loss.
    Train,
    /// Label logits only.
    Inference,
}

/// Device placement. Placement is a configuration concern, not a
/// correctness one; every tensor in one expression must share a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceSelector {
    Cpu,
    /// CUDA device by ordinal. Requires the `cuda` feature.
    Cuda(usize),
}

impl DeviceSelector {
    /// Resolve to a candle device.
    pub fn device(&self) -> DanResult<Device> {
        match self {
            DeviceSelector::Cpu => Ok(Device::Cpu),
            DeviceSelector::Cuda(ordinal) => {
                Device::new_cuda(*ordinal).map_err(|e| DanError::Tensor {
                    message: format!("CUDA device {ordinal} unavailable: {e}"),
                })
            }
        }
    }
}

/// Model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DanConfig {
    /// Encoder variant.
    pub encoder: EncoderKind,
    /// Latent vector width produced per window.
    pub c_dim: usize,
    /// Window height (signal channels).
    pub input_height: usize,
    /// Window width (time samples per window).
    pub input_width: usize,
    /// Resampling stride: a signal of true length `l` yields
    /// `l / resampling` windows. Must equal `input_width`.
    pub resampling: usize,
    /// Number of distinct source domains (width of the discriminator head).
    pub num_domains: usize,
    /// Hidden width of both recurrent heads.
    pub hidden_size: usize,
    /// Enable the VAE reparameterization path (sample
    /// `mu + eps * exp(0.5 * logvar)` instead of the deterministic latent).
    pub stochastic: bool,
    /// Device placement.
    pub device: DeviceSelector,
    /// Operating mode.
    pub mode: Mode,
}

impl Default for DanConfig {
    fn default() -> Self {
        Self {
            encoder: EncoderKind::Vae,
            c_dim: 32,
            input_height: 100,
            input_width: 500,
            resampling: 500,
            num_domains: 5,
            hidden_size: 64,
            stochastic: false,
            device: DeviceSelector::Cpu,
            mode: Mode::Train,
        }
    }
}

impl DanConfig {
    /// Fail-fast validation of the whole configuration.
    pub fn validate(&self) -> DanResult<()> {
        if self.input_height == 0 || self.input_width == 0 {
            return Err(DanError::Config {
                message: format!(
                    "window shape ({}, {}) must be non-zero in both dimensions",
                    self.input_height, self.input_width
                ),
            });
        }
        if self.c_dim == 0 {
            return Err(DanError::Config {
                message: "latent dimension c_dim must be non-zero".into(),
            });
        }
        if self.hidden_size == 0 {
            return Err(DanError::Config {
                message: "recurrent hidden_size must be non-zero".into(),
            });
        }
        if self.resampling != self.input_width {
            return Err(DanError::Config {
                message: format!(
                    "resampling width {} must equal window width {}: each window \
                     is exactly one resampling stride of the raw signal",
                    self.resampling, self.input_width
                ),
            });
        }
        if self.num_domains < 2 {
            return Err(DanError::Config {
                message: format!("num_domains must be at least 2, got {}", self.num_domains),
            });
        }
        if self.encoder == EncoderKind::Cnn {
            // Four 2x2 poolings floor-halve each spatial dim; none may collapse.
            let (h, w) = Self::pooled_shape(self.input_height, self.input_width);
            if h == 0 || w == 0 {
                return Err(DanError::Config {
                    message: format!(
                        "window shape ({}, {}) collapses to ({h}, {w}) after four \
                         2x2 poolings; CNN encoder needs at least 16x16 input",
                        self.input_height, self.input_width
                    ),
                });
            }
        }
        Ok(())
    }

    /// Spatial shape after the CNN encoder's four floor-halving poolings.
    pub fn pooled_shape(height: usize, width: usize) -> (usize, usize) {
        let mut h = height;
        let mut w = width;
        for _ in 0..4 {
            h /= 2;
            w /= 2;
        }
        (h, w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        DanConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_latent_dim_rejected() {
        let config = DanConfig {
            c_dim: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(DanError::Config { .. })
        ));
    }

    #[test]
    fn resampling_must_match_window_width() {
        let config = DanConfig {
            input_width: 500,
            resampling: 250,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(format!("{err}").contains("resampling"));
    }

    #[test]
    fn cnn_window_too_small_rejected() {
        let config = DanConfig {
            encoder: EncoderKind::Cnn,
            input_height: 8,
            input_width: 8,
            resampling: 8,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(format!("{err}").contains("four"));
    }

    #[test]
    fn pooled_shape_floor_halves() {
        // The original deployment geometry: 100x500 -> 6x31.
        assert_eq!(DanConfig::pooled_shape(100, 500), (6, 31));
        assert_eq!(DanConfig::pooled_shape(64, 64), (4, 4));
        assert_eq!(DanConfig::pooled_shape(17, 17), (1, 1));
    }

    #[test]
    fn config_serde_round_trip() {
        let config = DanConfig {
            encoder: EncoderKind::Cnn,
            mode: Mode::Inference,
            device: DeviceSelector::Cuda(1),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: DanConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.encoder, EncoderKind::Cnn);
        assert_eq!(back.mode, Mode::Inference);
        assert_eq!(back.device, DeviceSelector::Cuda(1));
    }
}
