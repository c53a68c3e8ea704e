//! # DeepLIO
//!
//! Deep LiDAR-inertial odometry: neural networks that regress the relative
//! motion between consecutive LiDAR scans from range images and the IMU
//! samples recorded in between.
//!
//! ## Overview
//!
//! - [`config`]: YAML/TOML configuration and the shared [`config::ConfigContainer`]
//! - [`nn`]: layer primitives on `candle_core` (linear, dropout, GRU/LSTM)
//! - [`models`]: feature stages, fusion and the [`models::DeepLio`] network
//! - [`worker`]: run directories, logging, meters and the train/test workers
//!
//! ## Example
//!
//! ```rust
//! use deeplio::config::{ConfigContainer, DeepLioConfig};
//! use deeplio::models::DeepLio;
//! use deeplio::nn::ParamStore;
//! use deeplio::test_utils::{synthetic_batch, SyntheticConfig};
//!
//! let cfg = DeepLioConfig::deepio();
//! let container = ConfigContainer::build(&cfg).unwrap();
//! let mut store = ParamStore::new(&container.device, 42);
//! let net = DeepLio::from_config(&cfg, container.clone(), &mut store).unwrap();
//!
//! let batch = synthetic_batch(&SyntheticConfig::for_config(&cfg, 2).unwrap(), &container.device).unwrap();
//! let (pos, ori) = net.forward_batch(&batch, false).unwrap();
//! assert_eq!(pos.dims(), &[6, 3]);
//! assert_eq!(ori.dims(), &[6, 4]);
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod nn;
pub mod test_utils;
pub mod worker;

pub use config::{ConfigContainer, ConfigError, ConfigLoader, DeepLioConfig};
pub use error::{DeepLioError, Result};
pub use models::{DeepLio, OdometryNet, SequenceBatch};
pub use worker::{Tester, Trainer, Worker, WorkerArgs};
