//! Batch container for raw multivariate signals.
//!
//! A batch carries the padded signal tensor together with each sample's
//! true length, binary class label and source-domain id. Construction
//! validates every cross-array invariant up front so the segmenter can
//! assume a well-formed batch.

use candle_core::{Device, Tensor};

use crate::error::{DanError, DanResult};

/// One padded batch of recordings.
#[derive(Debug, Clone)]
pub struct SignalBatch {
    /// Padded signals, shape `(batch, height, time)`, f32.
    pub signals: Tensor,
    /// True length of each signal in time samples (`<= time`).
    pub lengths: Vec<usize>,
    /// Binary class label per sample.
    pub labels: Vec<u32>,
    /// Source-domain id per sample.
    pub domains: Vec<u32>,
}

impl SignalBatch {
    /// Build a batch, validating shape agreement between all four parts.
    pub fn new(
        signals: Tensor,
        lengths: Vec<usize>,
        labels: Vec<u32>,
        domains: Vec<u32>,
    ) -> DanResult<Self> {
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
        if labels.len() != batch {
            return Err(DanError::LengthMismatch {
                expected: batch,
                actual: labels.len(),
            });
        }
        if domains.len() != batch {
            return Err(DanError::LengthMismatch {
                expected: batch,
                actual: domains.len(),
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

        Ok(Self {
            signals,
            lengths,
            labels,
            domains,
        })
    }

    /// Number of samples in the batch.
    pub fn batch_size(&self) -> usize {
        self.lengths.len()
    }

    /// Class labels as a `(batch,)` u32 tensor on the given device.
    pub fn labels_tensor(&self, device: &Device) -> DanResult<Tensor> {
        Tensor::from_vec(self.labels.clone(), self.labels.len(), device).map_err(|e| {
            DanError::Tensor {
                message: format!("label tensor construction failed: {e}"),
            }
        })
    }

    /// Deterministic synthetic batch for tests and smoke runs.
    ///
    /// Every sample `i` gets true length `lengths[i]`, label `i % 2` and
    /// domain `i % num_domains`; signal values are a bounded sinusoid so
    /// sigmoid reconstructions are comparable.
    pub fn synthetic(
        height: usize,
        padded_time: usize,
        lengths: &[usize],
        num_domains: u32,
        device: &Device,
    ) -> DanResult<Self> {
        let batch = lengths.len();
        let total = batch * height * padded_time;
        let data: Vec<f32> = (0..total)
            .map(|i| 0.5 + 0.4 * (i as f32 * 0.13).sin())
            .collect();
        let signals = Tensor::from_vec(data, (batch, height, padded_time), device)
            .map_err(|e| DanError::Tensor {
                message: format!("synthetic batch construction failed: {e}"),
            })?;
        let labels: Vec<u32> = (0..batch as u32).map(|i| i % 2).collect();
        let domains: Vec<u32> = (0..batch as u32).map(|i| i % num_domains).collect();
        Self::new(signals, lengths.to_vec(), labels, domains)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;

    #[test]
    fn synthetic_batch_is_well_formed() {
        let batch =
            SignalBatch::synthetic(4, 40, &[40, 30, 20, 10], 5, &Device::Cpu).unwrap();
        assert_eq!(batch.batch_size(), 4);
        assert_eq!(batch.signals.dims(), &[4, 4, 40]);
        assert_eq!(batch.labels, vec![0, 1, 0, 1]);
        assert_eq!(batch.domains, vec![0, 1, 2, 3]);
    }

    #[test]
    fn length_beyond_padding_rejected() {
        let signals = Tensor::zeros((2, 4, 10), DType::F32, &Device::Cpu).unwrap();
        let err = SignalBatch::new(signals, vec![10, 11], vec![0, 1], vec![0, 1]).unwrap_err();
        assert!(matches!(err, DanError::LengthExceedsSignal { index: 1, .. }));
    }

    #[test]
    fn mismatched_label_count_rejected() {
        let signals = Tensor::zeros((2, 4, 10), DType::F32, &Device::Cpu).unwrap();
        let err = SignalBatch::new(signals, vec![10, 10], vec![0], vec![0, 1]).unwrap_err();
        assert!(matches!(
            err,
            DanError::LengthMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn non_rank3_signals_rejected() {
        let signals = Tensor::zeros((2, 10), DType::F32, &Device::Cpu).unwrap();
        let err = SignalBatch::new(signals, vec![10, 10], vec![0, 1], vec![0, 1]).unwrap_err();
        assert!(matches!(err, DanError::ShapeMismatch { .. }));
    }

    #[test]
    fn labels_tensor_shape_and_dtype() {
        let batch = SignalBatch::synthetic(2, 20, &[20, 20], 2, &Device::Cpu).unwrap();
        let labels = batch.labels_tensor(&Device::Cpu).unwrap();
        assert_eq!(labels.dims(), &[2]);
        assert_eq!(labels.dtype(), DType::U32);
    }
}
