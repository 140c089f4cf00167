//! Model components: windowed encoders, gradient reversal, pairing and
//! the domain-adversarial network that wires them together.

pub mod cnn;
pub mod dan;
pub mod grl;
pub mod pairing;
pub mod vae;

pub use cnn::CnnEncoder;
pub use dan::{Dan, DanOutput, LatentSequences, TrainOutput, WindowedEncoder};
pub use grl::reverse_gradient;
pub use pairing::{pairing_labels, pairing_order};
pub use vae::VaeEncoder;
