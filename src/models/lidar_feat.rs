//! LiDAR range-image feature extractor.

use std::sync::Arc;

use candle_core::Tensor;

use super::stage::{FeatureStage, LidarFeatNet};
use crate::config::{ConfigContainer, HiddenSize, LidarFeatParams};
use crate::error::{DeepLioError, Result};
use crate::nn::{FeedForward, ParamStore};

const DEFAULT_HIDDEN: [usize; 1] = [32];

/// Global average pooling of every channel over the image plane, followed
/// by a feed-forward stack. Input `[B, S, C, H, W]`, output `[B, S, F]`.
pub struct LidarFeatPool {
    net: FeedForward,
    in_channels: usize,
    output_shape: [usize; 3],
}

impl LidarFeatPool {
    /// `in_channels` counts the channels of both frames of a pair.
    pub fn new(
        params: &LidarFeatParams,
        container: Arc<ConfigContainer>,
        in_channels: usize,
        store: &mut ParamStore,
    ) -> Result<Self> {
        let hidden = params
            .hidden_size
            .as_ref()
            .map(HiddenSize::layers)
            .unwrap_or_else(|| DEFAULT_HIDDEN.to_vec());
        let net = FeedForward::new(store, "lidar_feat_pool", in_channels, &hidden, params.dropout)?;
        let output_shape = [1, container.seq_size, net.out_dim()];
        Ok(Self {
            net,
            in_channels,
            output_shape,
        })
    }
}

impl FeatureStage for LidarFeatPool {
    fn name(&self) -> &str {
        "lidar-pool"
    }

    fn output_shape(&self) -> [usize; 3] {
        self.output_shape
    }
}

impl LidarFeatNet for LidarFeatPool {
    fn forward(&self, frames: &Tensor, train: bool) -> Result<Tensor> {
        let (_, _, c, _, _) = frames.dims5()?;
        if c != self.in_channels {
            return Err(DeepLioError::InvalidInput(format!(
                "LiDAR net expects {} channels, got frames of shape {:?}",
                self.in_channels,
                frames.dims()
            )));
        }
        let pooled = frames.mean(4)?.mean(3)?;
        self.net.forward(&pooled, train)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    #[test]
    fn test_output_shape() {
        let container = ConfigContainer::cpu(3);
        let mut store = ParamStore::new(&Device::Cpu, 0);
        let params = LidarFeatParams {
            hidden_size: Some(HiddenSize::Layers(vec![16, 12])),
            dropout: 0.0,
        };
        let net = LidarFeatPool::new(&params, container, 4, &mut store).unwrap();
        assert_eq!(net.output_shape(), [1, 3, 12]);

        let frames = Tensor::randn(0f32, 1f32, (2, 3, 4, 8, 16), &Device::Cpu).unwrap();
        assert_eq!(net.forward(&frames, false).unwrap().dims(), &[2, 3, 12]);
    }

    #[test]
    fn test_rejects_channel_mismatch() {
        let container = ConfigContainer::cpu(1);
        let mut store = ParamStore::new(&Device::Cpu, 0);
        let net = LidarFeatPool::new(&LidarFeatParams::default(), container, 4, &mut store).unwrap();
        let frames = Tensor::zeros((1, 1, 2, 8, 8), DType::F32, &Device::Cpu).unwrap();
        assert!(matches!(net.forward(&frames, false), Err(DeepLioError::InvalidInput(_))));
    }
}
