//! Capabilities shared by the optional feature stages of a DeepLIO network.

use candle_core::Tensor;

use super::input::ImuInput;
use crate::error::Result;

/// A stage that emits `[B, S, F]` features with a width fixed at
/// construction time.
pub trait FeatureStage {
    fn name(&self) -> &str;

    /// Declared output shape `[1, seq_size, F]`.
    fn output_shape(&self) -> [usize; 3];

    fn output_width(&self) -> usize {
        self.output_shape()[2]
    }
}

/// Maps range images `[B, S, C, H, W]` to `[B, S, F]`.
pub trait LidarFeatNet: FeatureStage {
    fn forward(&self, frames: &Tensor, train: bool) -> Result<Tensor>;
}

/// Maps IMU windows to `[B, S, H]`.
pub trait ImuFeatNet: FeatureStage {
    fn forward(&self, imu: &ImuInput, train: bool) -> Result<Tensor>;
}

/// Combines the LiDAR and IMU features, either of which may be absent.
pub trait FusionNet: FeatureStage {
    fn forward(&self, features: [Option<&Tensor>; 2]) -> Result<Tensor>;
}

/// Refines `[B, S, F]` features into `[B, S, F']`.
pub trait OdomFeatNet: FeatureStage {
    fn forward(&self, x: &Tensor, train: bool) -> Result<Tensor>;
}
