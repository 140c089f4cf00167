//! Margin-based contrastive loss for the paired domain discriminator
//! outputs.
//!
//! Same-domain pairs are pulled together (their squared distance is the
//! penalty); different-domain pairs are pushed apart up to the margin. The
//! distance carries a fixed 100x scale and a 0.01 additive floor so the
//! square root stays away from zero.

use candle_core::Tensor;

use crate::error::{DanError, DanResult};

/// Batch reduction applied to the per-pair losses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    Mean,
    Sum,
}

/// Contrastive loss configuration.
#[derive(Debug, Clone)]
pub struct ContrastiveLoss {
    /// Push-apart margin for different-domain pairs.
    pub margin: f64,
    /// Batch reduction (mean by default).
    pub reduction: Reduction,
}

impl Default for ContrastiveLoss {
    fn default() -> Self {
        Self {
            margin: 1.0,
            reduction: Reduction::Mean,
        }
    }
}

impl ContrastiveLoss {
    /// Create a loss with the given margin and mean reduction.
    pub fn new(margin: f64) -> Self {
        Self {
            margin,
            ..Default::default()
        }
    }

    /// Compute the loss over paired discriminator outputs.
    ///
    /// `output1`/`output2` are `(batch, features)`, `target` is `(batch,)`
    /// with `1.0` for same-domain pairs and `0.0` otherwise. `gate` is an
    /// optional `(batch,)` mask multiplied into the per-pair losses, e.g.
    /// to disable individual domains.
    ///
    /// `distance = 100 * sum((output2 - output1)^2) + 0.01`
    /// `loss = 0.5 * [t * distance + (1 - t) * max(0, margin - sqrt(distance))^2]`
    pub fn compute(
        &self,
        output1: &Tensor,
        output2: &Tensor,
        target: &Tensor,
        gate: Option<&Tensor>,
    ) -> DanResult<Tensor> {
        let distances = (output2 - output1)
            .and_then(|d| d.sqr())
            .and_then(|d| d.sum(1))
            .and_then(|d| d.affine(100.0, 0.01))
            .map_err(map_candle)?;

        let pulled = (target * &distances).map_err(map_candle)?;

        // max(0, margin - sqrt(distance))^2 for the different-domain side.
        let hinge = distances
            .sqrt()
            .and_then(|d| d.affine(-1.0, self.margin))
            .map_err(map_candle)?;
        let zeros = Tensor::zeros_like(&hinge).map_err(map_candle)?;
        let pushed = hinge
            .maximum(&zeros)
            .and_then(|h| h.sqr())
            .map_err(map_candle)?;
        let inverted_target = target.affine(-1.0, 1.0).map_err(map_candle)?;
        let pushed = (inverted_target * pushed).map_err(map_candle)?;

        let mut losses = (pulled + pushed)
            .and_then(|l| l.affine(0.5, 0.0))
            .map_err(map_candle)?;
        if let Some(gate) = gate {
            losses = (losses * gate).map_err(map_candle)?;
        }

        match self.reduction {
            Reduction::Mean => losses.mean_all().map_err(map_candle),
            Reduction::Sum => losses.sum_all().map_err(map_candle),
        }
    }
}

fn map_candle(e: candle_core::Error) -> DanError {
    DanError::Tensor {
        message: format!("contrastive loss error: {e}"),
    }
}
