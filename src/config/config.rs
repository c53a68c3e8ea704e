//! Main configuration structures for DeepLIO

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::params::*;

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlError(#[from] toml::de::Error),
    #[error("Failed to serialize TOML: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),
    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main DeepLIO configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeepLioConfig {
    /// Range-image channels fed to the LiDAR network
    pub channels: Vec<usize>,
    /// Compute device: `cpu`, `cuda[:N]` or `metal[:N]`
    #[serde(default = "default_device")]
    pub device: String,
    /// Dataset and sequence parameters
    pub datasets: DatasetsConfig,
    /// Network parameters
    pub deeplio: DeepLioParams,
}

fn default_device() -> String {
    "cpu".to_string()
}

/// Sequence parameters shared by every dataset, plus one entry per dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DatasetsConfig {
    /// Number of frame-pairs per training sample
    pub sequence_size: usize,
    /// Frame-index pairs compared to form one odometry estimate
    pub combinations: Vec<[usize; 2]>,
    /// Whether samples carry timestamps
    #[serde(default)]
    pub timestamps: bool,
    /// Key of the dataset in use
    pub current_dataset: String,
    /// Per-dataset configuration, keyed by dataset name
    #[serde(flatten)]
    pub datasets: BTreeMap<String, DatasetConfig>,
}

/// Range-image geometry of one dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DatasetConfig {
    pub image_width: usize,
    pub image_height: usize,
    /// Rows and columns cropped on each side: `[height, width]`
    #[serde(default)]
    pub crop_factors: [usize; 2],
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            image_width: 720,
            image_height: 64,
            crop_factors: [0, 0],
        }
    }
}

impl DatasetConfig {
    /// Image size after cropping, as `(height, width)`.
    pub fn cropped_size(&self) -> Result<(usize, usize), ConfigError> {
        let [crop_h, crop_w] = self.crop_factors;
        let height = self.image_height.checked_sub(2 * crop_h).filter(|h| *h > 0);
        let width = self.image_width.checked_sub(2 * crop_w).filter(|w| *w > 0);
        match (height, width) {
            (Some(h), Some(w)) => Ok((h, w)),
            _ => Err(ConfigError::Invalid(format!(
                "crop factors {:?} leave no pixels of a {}x{} image",
                self.crop_factors, self.image_height, self.image_width
            ))),
        }
    }
}

impl Default for DeepLioConfig {
    fn default() -> Self {
        Self::kitti()
    }
}

/// Configuration loader supporting YAML and TOML
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file, picking the format from the extension
    pub fn load<P: AsRef<Path>>(path: P) -> Result<DeepLioConfig, ConfigError> {
        let path = path.as_ref();
        let extension = path.extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        match extension.to_lowercase().as_str() {
            "yaml" | "yml" => Self::load_yaml(path),
            "toml" => Self::load_toml(path),
            _ => Err(ConfigError::UnsupportedFormat(extension.to_string())),
        }
    }

    /// Load configuration from YAML file
    pub fn load_yaml<P: AsRef<Path>>(path: P) -> Result<DeepLioConfig, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: DeepLioConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn load_toml<P: AsRef<Path>>(path: P) -> Result<DeepLioConfig, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: DeepLioConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn save_yaml<P: AsRef<Path>>(config: &DeepLioConfig, path: P) -> Result<(), ConfigError> {
        let content = serde_yaml::to_string(config)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Save configuration to TOML file
    pub fn save_toml<P: AsRef<Path>>(config: &DeepLioConfig, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string(config)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl DeepLioConfig {
    /// LiDAR + IMU network on KITTI range images
    pub fn kitti() -> Self {
        let mut datasets = BTreeMap::new();
        datasets.insert(
            "kitti".to_string(),
            DatasetConfig {
                image_width: 720,
                image_height: 64,
                crop_factors: [0, 0],
            },
        );
        Self {
            channels: vec![0, 1],
            device: default_device(),
            datasets: DatasetsConfig {
                sequence_size: 3,
                combinations: vec![[0, 1]],
                timestamps: false,
                current_dataset: "kitti".to_string(),
                datasets,
            },
            deeplio: DeepLioParams::default(),
        }
    }

    /// IMU-only network (DeepIO)
    pub fn deepio() -> Self {
        let mut config = Self::kitti();
        config.deeplio = DeepLioParams {
            dropout: 0.0,
            lidar_feat_net: None,
            fusion_net: None,
            odom_feat_net: None,
            ..DeepLioParams::default()
        };
        config
    }

    /// LiDAR-only network (DeepLO)
    pub fn deeplo() -> Self {
        let mut config = Self::kitti();
        config.deeplio = DeepLioParams {
            imu_feat_net: None,
            fusion_net: None,
            odom_feat_net: Some(OdomFeatParams::default()),
            ..DeepLioParams::default()
        };
        config
    }

    /// Configuration of the dataset selected by `current-dataset`
    pub fn current_dataset(&self) -> Result<&DatasetConfig, ConfigError> {
        self.datasets
            .datasets
            .get(&self.datasets.current_dataset)
            .ok_or_else(|| ConfigError::UnknownDataset(self.datasets.current_dataset.clone()))
    }

    /// Number of range-image channels per frame; six configured channels
    /// means the image carries normals, which count as three.
    pub fn n_channels(&self) -> usize {
        match self.channels.len() {
            6 => 3,
            n => n,
        }
    }

    /// Check cross-field constraints serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.datasets.sequence_size == 0 {
            return Err(ConfigError::Invalid("sequence-size must be positive".to_string()));
        }
        if self.datasets.combinations.is_empty() {
            return Err(ConfigError::Invalid("combinations must not be empty".to_string()));
        }
        self.current_dataset()?.cropped_size()?;
        if self.deeplio.dropout < 0.0 || self.deeplio.dropout >= 1.0 {
            return Err(ConfigError::Invalid(format!(
                "deeplio dropout must be in [0, 1), got {}",
                self.deeplio.dropout
            )));
        }
        if let Some(imu) = &self.deeplio.imu_feat_net {
            if imu.input_size == 0 {
                return Err(ConfigError::Invalid("imu-feat-net input-size must be positive".to_string()));
            }
        }
        Ok(())
    }
}
