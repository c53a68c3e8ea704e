//! Layer primitives built on `candle_core` tensors and variables.

pub mod dropout;
pub mod feed_forward;
pub mod linear;
pub mod param_store;
pub mod recurrent;

pub use dropout::Dropout;
pub use feed_forward::FeedForward;
pub use linear::Linear;
pub use param_store::ParamStore;
pub use recurrent::{RecurrentConfig, RecurrentEncoder, RnnState, RnnType};

use candle_core::Tensor;

/// Negative slope used by every feed-forward stack in the network.
pub const LEAKY_SLOPE: f64 = 0.01;

/// `max(x, slope * x)`
pub fn leaky_relu(x: &Tensor, slope: f64) -> candle_core::Result<Tensor> {
    x.maximum(&x.affine(slope, 0.0)?)
}

/// `1 / (1 + exp(-x))`
pub fn sigmoid(x: &Tensor) -> candle_core::Result<Tensor> {
    x.neg()?.exp()?.affine(1.0, 1.0)?.recip()
}
