//! Gradient-reversal layer.
//!
//! Identity on the forward pass; on the backward pass the incoming
//! gradient is negated and scaled by `alpha` before it continues to the
//! encoder parameters. A single optimizer step therefore trains the
//! discriminator to separate domains while training the shared encoder
//! to confuse it — no explicit min-max loop is needed.
//!
//! Expressed as a `candle_core::CustomOp1` so the reversed gradient is
//! part of the regular autograd graph.

use candle_core::backend::BackendStorage;
use candle_core::{CpuStorage, CudaStorage, CustomOp1, Layout, MetalStorage, Shape, Tensor};

use crate::error::{DanError, DanResult};

struct ReverseGrad {
    alpha: f64,
}

impl CustomOp1 for ReverseGrad {
    fn name(&self) -> &'static str {
        "reverse-grad"
    }

    fn cpu_fwd(&self, storage: &CpuStorage, layout: &Layout) -> candle_core::Result<(CpuStorage, Shape)> {
        Ok((storage.try_clone(layout)?, layout.shape().clone()))
    }

    fn cuda_fwd(
        &self,
        storage: &CudaStorage,
        layout: &Layout,
    ) -> candle_core::Result<(CudaStorage, Shape)> {
        Ok((storage.try_clone(layout)?, layout.shape().clone()))
    }

    fn metal_fwd(
        &self,
        storage: &MetalStorage,
        layout: &Layout,
    ) -> candle_core::Result<(MetalStorage, Shape)> {
        Ok((storage.try_clone(layout)?, layout.shape().clone()))
    }

    fn bwd(
        &self,
        _arg: &Tensor,
        _res: &Tensor,
        grad_res: &Tensor,
    ) -> candle_core::Result<Option<Tensor>> {
        Ok(Some(grad_res.affine(-self.alpha, 0.0)?))
    }
}

/// Apply the gradient-reversal layer.
///
/// Numerically `y == x`; the gradient that reaches `x` during
/// backpropagation is `-alpha * dL/dy`. `alpha = 0` blocks the adversarial
/// signal entirely, `alpha = 1` reverses it at full strength.
pub fn reverse_gradient(x: &Tensor, alpha: f64) -> DanResult<Tensor> {
    x.contiguous()
        .and_then(|x| x.apply_op1(ReverseGrad { alpha }))
        .map_err(|e| DanError::Tensor {
            message: format!("gradient reversal failed: {e}"),
        })
}
