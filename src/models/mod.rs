//! DeepLIO network stages and their composition.

pub mod deeplio;
pub mod fusion;
pub mod imu_feat;
pub mod input;
pub mod lidar_feat;
pub mod odom_feat;
pub mod stage;


pub use deeplio::{DeepLio, OdometryNet, ORIENTATION_DIM, POSITION_DIM};
pub use fusion::{DeepLioFusionLayer, FusionType};
pub use imu_feat::{build_imu_feat_net, ImuFeatFc, ImuFeatRnn0, ImuFeatRnn1};
pub use input::{ImuInput, SequenceBatch};
pub use lidar_feat::LidarFeatPool;
pub use odom_feat::OdomFeatFc;
pub use stage::{FeatureStage, FusionNet, ImuFeatNet, LidarFeatNet, OdomFeatNet};
