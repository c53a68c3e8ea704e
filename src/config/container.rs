//! Read-only sequence/dataset parameters shared by every network stage.
//!
//! The container is built once per process by the worker and handed to each
//! stage constructor as an `Arc`, so the sharing stays visible in the
//! constructor signatures.

use std::sync::Arc;

use candle_core::Device;
use log::{debug, warn};

use super::config::{ConfigError, DatasetConfig, DatasetsConfig, DeepLioConfig};

/// Shared, immutable view of the configuration every stage reads.
#[derive(Debug, Clone)]
pub struct ConfigContainer {
    /// Frame-pairs per sample
    pub seq_size: usize,
    /// Frame-index pairs forming one odometry estimate
    pub combinations: Vec<[usize; 2]>,
    /// Device every tensor is allocated on
    pub device: Device,
    /// Dataset section of the configuration
    pub ds_cfg: DatasetsConfig,
    /// Configuration of the dataset in use
    pub curr_dataset_cfg: DatasetConfig,
    /// Whether samples carry timestamps
    pub timestamps: bool,
    /// LiDAR frames loaded per sample (`seq_size + 1`)
    pub seq_size_data: usize,
}

impl ConfigContainer {
    /// Build the container from a validated configuration.
    pub fn build(cfg: &DeepLioConfig) -> Result<Arc<Self>, ConfigError> {
        cfg.validate()?;
        let curr_dataset_cfg = cfg.current_dataset()?.clone();
        let device = parse_device(&cfg.device)?;
        let seq_size = cfg.datasets.sequence_size;

        debug!(
            "config container: seq_size={}, combinations={:?}, device={:?}",
            seq_size, cfg.datasets.combinations, device
        );

        Ok(Arc::new(Self {
            seq_size,
            combinations: cfg.datasets.combinations.clone(),
            device,
            ds_cfg: cfg.datasets.clone(),
            curr_dataset_cfg,
            timestamps: cfg.datasets.timestamps,
            seq_size_data: seq_size + 1,
        }))
    }

    /// Minimal CPU container, for building stages outside a worker.
    pub fn cpu(seq_size: usize) -> Arc<Self> {
        let mut cfg = DeepLioConfig::default();
        cfg.datasets.sequence_size = seq_size.max(1);
        let ds_cfg = cfg.datasets.clone();
        let curr_dataset_cfg = cfg.current_dataset().cloned().unwrap_or_default();
        Arc::new(Self {
            seq_size: ds_cfg.sequence_size,
            combinations: ds_cfg.combinations.clone(),
            device: Device::Cpu,
            timestamps: ds_cfg.timestamps,
            seq_size_data: ds_cfg.sequence_size + 1,
            ds_cfg,
            curr_dataset_cfg,
        })
    }
}

/// Parse `cpu`, `cuda`, `cuda:N`, `metal` or `metal:N`. Accelerators that
/// are not compiled in or not present fall back to the CPU.
pub fn parse_device(name: &str) -> Result<Device, ConfigError> {
    let name = name.trim().to_lowercase();
    let (kind, ordinal) = match name.split_once(':') {
        Some((kind, idx)) => {
            let ordinal = idx
                .parse::<usize>()
                .map_err(|_| ConfigError::Invalid(format!("bad device ordinal in '{}'", name)))?;
            (kind.to_string(), ordinal)
        }
        None => (name.clone(), 0),
    };

    let device = match kind.as_str() {
        "cpu" => Ok(Device::Cpu),
        "cuda" | "gpu" => Device::new_cuda(ordinal),
        "metal" | "mps" => Device::new_metal(ordinal),
        other => return Err(ConfigError::Invalid(format!("unknown device '{}'", other))),
    };

    Ok(device.unwrap_or_else(|err| {
        warn!("device '{}' unavailable ({}), using cpu", name, err);
        Device::Cpu
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_from_default() {
        let container = ConfigContainer::build(&DeepLioConfig::default()).unwrap();
        assert_eq!(container.seq_size, 3);
        assert_eq!(container.seq_size_data, 4);
        assert_eq!(container.combinations, vec![[0, 1]]);
        assert!(container.device.is_cpu());
    }

    #[test]
    fn test_build_rejects_invalid() {
        let mut cfg = DeepLioConfig::default();
        cfg.datasets.sequence_size = 0;
        assert!(ConfigContainer::build(&cfg).is_err());
    }

    #[test]
    fn test_cpu_container() {
        let container = ConfigContainer::cpu(5);
        assert_eq!(container.seq_size, 5);
        assert_eq!(container.curr_dataset_cfg.image_height, 64);
    }

    #[test]
    fn test_parse_device() {
        assert!(parse_device("cpu").unwrap().is_cpu());
        assert!(parse_device("CPU").unwrap().is_cpu());
        assert!(parse_device("tpu").is_err());
        assert!(parse_device("cuda:x").is_err());
    }
}
