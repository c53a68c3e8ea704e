//! Parameter structures for the DeepLIO network stages

use serde::{Deserialize, Serialize};

/// Hidden width of a stage, either one width or one width per layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HiddenSize {
    Single(usize),
    Layers(Vec<usize>),
}

impl HiddenSize {
    /// Widths of every layer, in order.
    pub fn layers(&self) -> Vec<usize> {
        match self {
            HiddenSize::Single(h) => vec![*h],
            HiddenSize::Layers(hs) => hs.clone(),
        }
    }

    /// Width of the last layer, which is the width the stage emits.
    pub fn last(&self) -> Option<usize> {
        match self {
            HiddenSize::Single(h) => Some(*h),
            HiddenSize::Layers(hs) => hs.last().copied(),
        }
    }
}

fn default_num_layers() -> usize {
    2
}

fn default_rnn_type() -> String {
    "lstm".to_string()
}

fn default_imu_name() -> String {
    "imu-rnn0".to_string()
}

fn default_fusion_type() -> String {
    "cat".to_string()
}

fn default_beta() -> f64 {
    1.0
}

/// IMU feature network parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ImuFeatParams {
    /// Variant selector: `imu-fc`, `imu-rnn0` or `imu-rnn1`
    #[serde(default = "default_imu_name")]
    pub name: String,
    /// Dropout probability (final layer for FC, between layers for RNNs)
    #[serde(default)]
    pub dropout: f64,
    /// Width of a single IMU sample
    pub input_size: usize,
    /// Number of recurrent layers
    #[serde(default = "default_num_layers")]
    pub num_layers: usize,
    /// Hidden width(s); defaults to 6 for RNNs and [6, 6] for FC
    #[serde(default)]
    pub hidden_size: Option<HiddenSize>,
    /// Recurrent cell family, `gru` or anything else for LSTM
    #[serde(rename = "type", default = "default_rnn_type")]
    pub rnn_type: String,
    /// Run the recurrent encoder in both directions
    #[serde(default)]
    pub bidirectional: bool,
}

impl Default for ImuFeatParams {
    fn default() -> Self {
        Self {
            name: default_imu_name(),
            dropout: 0.0,
            input_size: 6,
            num_layers: default_num_layers(),
            hidden_size: None,
            rnn_type: default_rnn_type(),
            bidirectional: false,
        }
    }
}

/// LiDAR feature network parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LidarFeatParams {
    /// Widths of the feed-forward stack applied after pooling
    #[serde(default)]
    pub hidden_size: Option<HiddenSize>,
    /// Dropout after the last layer
    #[serde(default)]
    pub dropout: f64,
}

impl Default for LidarFeatParams {
    fn default() -> Self {
        Self {
            hidden_size: Some(HiddenSize::Layers(vec![32])),
            dropout: 0.0,
        }
    }
}

/// Fusion layer parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionParams {
    /// Combination method; only `cat` is supported
    #[serde(rename = "type", default = "default_fusion_type")]
    pub fusion_type: String,
}

impl Default for FusionParams {
    fn default() -> Self {
        Self {
            fusion_type: default_fusion_type(),
        }
    }
}

/// Odometry feature network parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OdomFeatParams {
    /// Widths of the feed-forward stack
    #[serde(default)]
    pub hidden_size: Option<HiddenSize>,
    /// Dropout after the last layer
    #[serde(default)]
    pub dropout: f64,
}

impl Default for OdomFeatParams {
    fn default() -> Self {
        Self {
            hidden_size: Some(HiddenSize::Layers(vec![64])),
            dropout: 0.0,
        }
    }
}

/// Top-level network parameters: regression head plus the optional stages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeepLioParams {
    /// Dropout before the regression heads
    #[serde(default)]
    pub dropout: f64,
    /// Weight of the orientation term in the training loss
    #[serde(default = "default_beta")]
    pub beta: f64,
    #[serde(default)]
    pub lidar_feat_net: Option<LidarFeatParams>,
    #[serde(default)]
    pub imu_feat_net: Option<ImuFeatParams>,
    #[serde(default)]
    pub fusion_net: Option<FusionParams>,
    #[serde(default)]
    pub odom_feat_net: Option<OdomFeatParams>,
}

impl Default for DeepLioParams {
    fn default() -> Self {
        Self {
            dropout: 0.25,
            beta: default_beta(),
            lidar_feat_net: Some(LidarFeatParams::default()),
            imu_feat_net: Some(ImuFeatParams::default()),
            fusion_net: Some(FusionParams::default()),
            odom_feat_net: None,
        }
    }
}
