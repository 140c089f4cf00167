//! Windowed encoder, convolutional variant.
//!
//! Four conv → batch-norm → ReLU → 2x2 max-pool stages over the window
//! treated as a single-channel image, then a fully-connected projection to
//! the latent width. The flatten size is derived analytically from the
//! configured window shape; a window too small to survive four poolings is
//! rejected at construction, never as a shape panic mid-forward.

use candle_core::Tensor;
use candle_nn::{batch_norm, conv2d, linear, BatchNorm, BatchNormConfig, Conv2d, Conv2dConfig,
    Linear, Module, ModuleT, VarBuilder};

use crate::config::DanConfig;
use crate::error::{DanError, DanResult};

/// Channel widths of the four convolution stages.
const CHANNELS: [usize; 5] = [1, 16, 32, 64, 32];

/// Convolutional windowed encoder.
#[derive(Debug)]
pub struct CnnEncoder {
    convs: Vec<Conv2d>,
    norms: Vec<BatchNorm>,
    fc: Linear,
    height: usize,
    width: usize,
    flat_dim: usize,
}

impl CnnEncoder {
    /// Build the four-stage encoder under the given variable scope.
    ///
    /// Fails fast when `(height, width)` collapses to a zero spatial dim
    /// after the four floor-halving poolings.
    pub fn new(height: usize, width: usize, c_dim: usize, vb: VarBuilder) -> DanResult<Self> {
        let (pooled_h, pooled_w) = DanConfig::pooled_shape(height, width);
        if pooled_h == 0 || pooled_w == 0 {
            return Err(DanError::Config {
                message: format!(
                    "CNN encoder window ({height}, {width}) pools down to \
                     ({pooled_h}, {pooled_w}); both dims must stay non-zero"
                ),
            });
        }
        let flat_dim = CHANNELS[4] * pooled_h * pooled_w;

        let conv_cfg = Conv2dConfig {
            padding: 2,
            stride: 1,
            ..Default::default()
        };
        let mut convs = Vec::with_capacity(4);
        let mut norms = Vec::with_capacity(4);
        for stage in 0..4 {
            convs.push(
                conv2d(
                    CHANNELS[stage],
                    CHANNELS[stage + 1],
                    5,
                    conv_cfg,
                    vb.pp(format!("conv{stage}")),
                )
                .map_err(map_candle)?,
            );
            norms.push(
                batch_norm(
                    CHANNELS[stage + 1],
                    BatchNormConfig::default(),
                    vb.pp(format!("bn{stage}")),
                )
                .map_err(map_candle)?,
            );
        }
        let fc = linear(flat_dim, c_dim, vb.pp("fc")).map_err(map_candle)?;

        Ok(Self {
            convs,
            norms,
            fc,
            height,
            width,
            flat_dim,
        })
    }

    /// Analytically derived flatten width (channels * pooled spatial dims).
    pub fn flat_dim(&self) -> usize {
        self.flat_dim
    }

    /// Encode one `(height, width)` window into a `(c_dim,)` latent vector.
    ///
    /// `train` selects batch-norm statistics: batch stats while training,
    /// running stats otherwise.
    pub fn encode(&self, window: &Tensor, train: bool) -> DanResult<Tensor> {
        let mut x = window
            .reshape((1, 1, self.height, self.width))
            .map_err(map_candle)?;
        for (conv, norm) in self.convs.iter().zip(self.norms.iter()) {
            x = conv.forward(&x).map_err(map_candle)?;
            x = norm.forward_t(&x, train).map_err(map_candle)?;
            x = x.relu().map_err(map_candle)?;
            x = x.max_pool2d(2).map_err(map_candle)?;
        }
        let flat = x.flatten_from(1).map_err(map_candle)?;
        let actual = flat.dim(1).map_err(map_candle)?;
        if actual != self.flat_dim {
            return Err(DanError::ShapeMismatch {
                expected: format!("flatten width {}", self.flat_dim),
                actual: format!("flatten width {actual}"),
            });
        }
        let latent = self.fc.forward(&flat).map_err(map_candle)?;
        latent.squeeze(0).map_err(map_candle)
    }
}

fn map_candle(e: candle_core::Error) -> DanError {
    DanError::Tensor {
        message: format!("CNN encoder error: {e}"),
    }
}
