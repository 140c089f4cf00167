//! Windowed encoder, autoencoder variant.
//!
//! Maps one `(height, width)` window to a `c_dim` latent vector through a
//! feed-forward stack, and decodes the latent back to window shape through
//! the mirrored stack with a final sigmoid. The decoded window is scored
//! against the *next* window of the same signal by the segmenter, which
//! turns the decoder into a one-step-ahead predictor.
//!
//! The variational reparameterization path (`mu + eps * exp(0.5 * logvar)`)
//! is kept behind an explicit `stochastic` switch instead of dead code; it
//! is off by default so the encoder behaves as a deterministic autoencoder.

use candle_core::Tensor;
use candle_nn::{linear, ops, Linear, Module, VarBuilder};

use crate::error::{DanError, DanResult};

/// Feed-forward windowed autoencoder.
pub struct VaeEncoder {
    enc1: Linear,
    enc2: Linear,
    enc3: Linear,
    dec1: Linear,
    dec2: Linear,
    dec3: Linear,
    /// Mean head, present only in stochastic mode.
    fc_mu: Option<Linear>,
    /// Log-variance head, present only in stochastic mode.
    fc_logvar: Option<Linear>,
    height: usize,
    width: usize,
}

impl VaeEncoder {
    /// Build the encoder/decoder stacks under the given variable scope.
    pub fn new(
        height: usize,
        width: usize,
        c_dim: usize,
        stochastic: bool,
        vb: VarBuilder,
    ) -> DanResult<Self> {
        let flat = height * width;
        let enc1 = linear(flat, 512, vb.pp("enc1")).map_err(map_candle)?;
        let enc2 = linear(512, 128, vb.pp("enc2")).map_err(map_candle)?;
        let enc3 = linear(128, c_dim, vb.pp("enc3")).map_err(map_candle)?;
        let dec1 = linear(c_dim, 128, vb.pp("dec1")).map_err(map_candle)?;
        let dec2 = linear(128, 512, vb.pp("dec2")).map_err(map_candle)?;
        let dec3 = linear(512, flat, vb.pp("dec3")).map_err(map_candle)?;
        let (fc_mu, fc_logvar) = if stochastic {
            (
                Some(linear(c_dim, c_dim, vb.pp("fc_mu")).map_err(map_candle)?),
                Some(linear(c_dim, c_dim, vb.pp("fc_logvar")).map_err(map_candle)?),
            )
        } else {
            (None, None)
        };
        Ok(Self {
            enc1,
            enc2,
            enc3,
            dec1,
            dec2,
            dec3,
            fc_mu,
            fc_logvar,
            height,
            width,
        })
    }

    /// Encode one window and decode the latent back to window shape.
    ///
    /// Input: `(height, width)`. Output: latent `(c_dim,)` and
    /// reconstruction `(height, width)` with values in `(0, 1)`.
    pub fn encode_decode(&self, window: &Tensor) -> DanResult<(Tensor, Tensor)> {
        let flat = window
            .reshape((1, self.height * self.width))
            .map_err(map_candle)?;

        let x = self.enc1.forward(&flat).map_err(map_candle)?;
        let x = x.relu().map_err(map_candle)?;
        let x = self.enc2.forward(&x).map_err(map_candle)?;
        let x = x.relu().map_err(map_candle)?;
        let z = self.enc3.forward(&x).map_err(map_candle)?;

        let z = match (&self.fc_mu, &self.fc_logvar) {
            (Some(fc_mu), Some(fc_logvar)) => {
                let mu = fc_mu.forward(&z).map_err(map_candle)?;
                let logvar = fc_logvar.forward(&z).map_err(map_candle)?;
                reparameterize(&mu, &logvar)?
            }
            _ => z,
        };

        let y = self.dec1.forward(&z).map_err(map_candle)?;
        let y = y.relu().map_err(map_candle)?;
        let y = self.dec2.forward(&y).map_err(map_candle)?;
        let y = y.relu().map_err(map_candle)?;
        let y = self.dec3.forward(&y).map_err(map_candle)?;
        let decoded = ops::sigmoid(&y).map_err(map_candle)?;

        let latent = z.squeeze(0).map_err(map_candle)?;
        let reconstruction = decoded
            .reshape((self.height, self.width))
            .map_err(map_candle)?;
        Ok((latent, reconstruction))
    }
}

/// Draw `mu + eps * exp(0.5 * logvar)` with `eps ~ N(0, 1)`.
fn reparameterize(mu: &Tensor, logvar: &Tensor) -> DanResult<Tensor> {
    let std = logvar
        .affine(0.5, 0.0)
        .and_then(|t| t.exp())
        .map_err(map_candle)?;
    let eps = std.randn_like(0.0, 1.0).map_err(map_candle)?;
    (mu + (eps * std).map_err(map_candle)?).map_err(map_candle)
}

fn map_candle(e: candle_core::Error) -> DanError {
    DanError::Tensor {
        message: format!("VAE encoder error: {e}"),
    }
}
