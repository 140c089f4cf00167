//! Training: contrastive domain loss, AdamW, and the epoch loop.

pub mod loss;
pub mod optimizer;
pub mod trainer;

pub use loss::{ContrastiveLoss, Reduction};
pub use optimizer::{AdamW, AdamWConfig};
pub use trainer::{
    grl_alpha, DanTrainer, EpochResult, StepMetrics, TrainerConfig, TrainingHistory,
};
