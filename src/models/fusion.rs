//! Fusion of LiDAR and IMU features.

use std::sync::Arc;

use candle_core::Tensor;

use super::stage::{FeatureStage, FusionNet};
use crate::config::{ConfigContainer, FusionParams};
use crate::error::{DeepLioError, Result};

/// Supported ways of combining modality features.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionType {
    /// Concatenation along the feature axis
    Cat,
}

impl FusionType {
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "cat" => Ok(FusionType::Cat),
            other => Err(DeepLioError::NotImplemented(format!("fusion type '{}'", other))),
        }
    }
}

/// Combines `[B, S, N_lidar]` and `[B, S, N_imu]` into `[B, S, N_lidar + N_imu]`.
///
/// The fusion type is checked when the layer is built, so a bad
/// configuration fails before any data is seen.
pub struct DeepLioFusionLayer {
    fusion_type: FusionType,
    input_shapes: Vec<[usize; 3]>,
    output_shape: [usize; 3],
}

impl DeepLioFusionLayer {
    /// `input_shapes` are the declared shapes of the stages feeding the
    /// layer, LiDAR first.
    pub fn new(
        input_shapes: &[[usize; 3]],
        params: &FusionParams,
        container: Arc<ConfigContainer>,
    ) -> Result<Self> {
        let fusion_type = FusionType::parse(&params.fusion_type)?;
        if input_shapes.is_empty() {
            return Err(DeepLioError::MissingStage(
                "fusion layer needs at least one input stage".to_string(),
            ));
        }
        let width = input_shapes.iter().map(|s| s[2]).sum();
        Ok(Self {
            fusion_type,
            input_shapes: input_shapes.to_vec(),
            output_shape: [1, container.seq_size, width],
        })
    }

    pub fn fusion_type(&self) -> FusionType {
        self.fusion_type
    }

    pub fn input_shapes(&self) -> &[[usize; 3]] {
        &self.input_shapes
    }
}

impl FeatureStage for DeepLioFusionLayer {
    fn name(&self) -> &str {
        "fusion-layer"
    }

    fn output_shape(&self) -> [usize; 3] {
        self.output_shape
    }
}

impl FusionNet for DeepLioFusionLayer {
    fn forward(&self, features: [Option<&Tensor>; 2]) -> Result<Tensor> {
        let present: Vec<&Tensor> = features.into_iter().flatten().collect();
        if present.is_empty() {
            return Err(DeepLioError::MissingStage(
                "fusion layer received neither LiDAR nor IMU features".to_string(),
            ));
        }
        match self.fusion_type {
            FusionType::Cat => Ok(Tensor::cat(&present, 2)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_cat_shape_and_values() {
        let container = ConfigContainer::cpu(3);
        let layer =
            DeepLioFusionLayer::new(&[[1, 3, 4], [1, 3, 2]], &FusionParams::default(), container)
                .unwrap();
        assert_eq!(layer.output_shape(), [1, 3, 6]);

        let lidar = Tensor::randn(0f32, 1f32, (2, 3, 4), &Device::Cpu).unwrap();
        let imu = Tensor::randn(0f32, 1f32, (2, 3, 2), &Device::Cpu).unwrap();
        let out = layer.forward([Some(&lidar), Some(&imu)]).unwrap();
        assert_eq!(out.dims(), &[2, 3, 6]);

        let out = out.to_vec3::<f32>().unwrap();
        let lidar = lidar.to_vec3::<f32>().unwrap();
        let imu = imu.to_vec3::<f32>().unwrap();
        for b in 0..2 {
            for s in 0..3 {
                let mut expected = lidar[b][s].clone();
                expected.extend_from_slice(&imu[b][s]);
                assert_eq!(out[b][s], expected);
            }
        }
    }

    #[test]
    fn test_unsupported_type_fails_at_construction() {
        let params = FusionParams {
            fusion_type: "attention".to_string(),
        };
        let result = DeepLioFusionLayer::new(&[[1, 3, 4]], &params, ConfigContainer::cpu(3));
        assert!(matches!(result, Err(DeepLioError::NotImplemented(_))));
    }

    #[test]
    fn test_single_modality_passes_through() {
        let layer =
            DeepLioFusionLayer::new(&[[1, 2, 5]], &FusionParams::default(), ConfigContainer::cpu(2))
                .unwrap();
        let imu = Tensor::randn(0f32, 1f32, (1, 2, 5), &Device::Cpu).unwrap();
        let out = layer.forward([None, Some(&imu)]).unwrap();
        assert_eq!(out.to_vec3::<f32>().unwrap(), imu.to_vec3::<f32>().unwrap());
        assert!(matches!(layer.forward([None, None]), Err(DeepLioError::MissingStage(_))));
    }
}
