//! Configuration module for DeepLIO
//!
//! This module provides file configuration loading and the shared
//! configuration container handed to every network stage.

pub mod config;
pub mod container;
pub mod params;

pub use config::{ConfigError, ConfigLoader, DatasetConfig, DatasetsConfig, DeepLioConfig};
pub use container::{parse_device, ConfigContainer};
pub use params::{
    DeepLioParams, FusionParams, HiddenSize, ImuFeatParams, LidarFeatParams, OdomFeatParams,
};
