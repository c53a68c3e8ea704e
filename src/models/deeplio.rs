//! DeepLIO network: optional feature stages followed by the pose regression
//! heads.

use std::sync::Arc;

use candle_core::Tensor;
use log::{debug, info};

use super::fusion::DeepLioFusionLayer;
use super::imu_feat::build_imu_feat_net;
use super::input::{ImuInput, SequenceBatch};
use super::lidar_feat::LidarFeatPool;
use super::odom_feat::OdomFeatFc;
use super::stage::{FeatureStage, FusionNet, ImuFeatNet, LidarFeatNet, OdomFeatNet};
use crate::config::{ConfigContainer, DeepLioConfig, DeepLioParams};
use crate::error::{DeepLioError, Result};
use crate::nn::{Dropout, Linear, ParamStore};

/// Width of the translation head.
pub const POSITION_DIM: usize = 3;
/// Width of the rotation (quaternion) head.
pub const ORIENTATION_DIM: usize = 4;

/// Contract every odometry network variant fulfils.
pub trait OdometryNet {
    /// Present feature stages, in head-selection priority order.
    fn get_feat_networks(&self) -> Vec<&dyn FeatureStage>;

    /// Create the regression heads; call after assigning the stages.
    fn initialize(&mut self, store: &mut ParamStore) -> Result<()>;

    /// Predict `(position [B*S, 3], orientation [B*S, 4])`.
    fn forward(
        &self,
        lidar: Option<&Tensor>,
        imu: Option<&ImuInput>,
        train: bool,
    ) -> Result<(Tensor, Tensor)>;
}

struct RegressionHeads {
    in_width: usize,
    drop: Option<Dropout>,
    fc_pos: Linear,
    fc_ori: Linear,
}

pub struct DeepLio {
    container: Arc<ConfigContainer>,
    p: f64,
    lidar_feat_net: Option<Box<dyn LidarFeatNet>>,
    imu_feat_net: Option<Box<dyn ImuFeatNet>>,
    fusion_net: Option<Box<dyn FusionNet>>,
    odom_feat_net: Option<Box<dyn OdomFeatNet>>,
    heads: Option<RegressionHeads>,
}

impl DeepLio {
    /// Empty network; assign stages, then [`OdometryNet::initialize`].
    pub fn new(params: &DeepLioParams, container: Arc<ConfigContainer>) -> Self {
        Self {
            container,
            p: params.dropout,
            lidar_feat_net: None,
            imu_feat_net: None,
            fusion_net: None,
            odom_feat_net: None,
            heads: None,
        }
    }

    /// Build every stage the configuration enables and initialize the heads.
    pub fn from_config(
        cfg: &DeepLioConfig,
        container: Arc<ConfigContainer>,
        store: &mut ParamStore,
    ) -> Result<Self> {
        let params = &cfg.deeplio;
        let mut net = Self::new(params, container.clone());

        if let Some(lidar) = &params.lidar_feat_net {
            // both frames of a pair are stacked along the channel axis
            let in_channels = 2 * cfg.n_channels();
            net.lidar_feat_net = Some(Box::new(LidarFeatPool::new(
                lidar,
                container.clone(),
                in_channels,
                store,
            )?));
        }

        if let Some(imu) = &params.imu_feat_net {
            net.imu_feat_net = Some(build_imu_feat_net(imu, container.clone(), store)?);
        }

        if let Some(fusion) = &params.fusion_net {
            let mut shapes = Vec::new();
            if let Some(lidar) = &net.lidar_feat_net {
                shapes.push(lidar.output_shape());
            }
            if let Some(imu) = &net.imu_feat_net {
                shapes.push(imu.output_shape());
            }
            net.fusion_net = Some(Box::new(DeepLioFusionLayer::new(
                &shapes,
                fusion,
                container.clone(),
            )?));
        }

        if let Some(odom) = &params.odom_feat_net {
            let in_width = net
                .last_stage_width()
                .ok_or_else(|| DeepLioError::MissingStage("odometry net has no input stage".to_string()))?;
            net.odom_feat_net = Some(Box::new(OdomFeatFc::new(odom, container, in_width, store)?));
        }

        net.initialize(store)?;
        info!(
            "DeepLIO built: stages [{}], {} parameters",
            net.get_feat_networks()
                .iter()
                .map(|s| s.name())
                .collect::<Vec<_>>()
                .join(", "),
            store.num_parameters()
        );
        Ok(net)
    }

    pub fn set_lidar_feat_net(&mut self, net: Box<dyn LidarFeatNet>) {
        self.lidar_feat_net = Some(net);
    }

    pub fn set_imu_feat_net(&mut self, net: Box<dyn ImuFeatNet>) {
        self.imu_feat_net = Some(net);
    }

    pub fn set_fusion_net(&mut self, net: Box<dyn FusionNet>) {
        self.fusion_net = Some(net);
    }

    pub fn set_odom_feat_net(&mut self, net: Box<dyn OdomFeatNet>) {
        self.odom_feat_net = Some(net);
    }

    pub fn container(&self) -> &ConfigContainer {
        &self.container
    }

    pub fn is_initialized(&self) -> bool {
        self.heads.is_some()
    }

    /// Feature width the regression heads were sized for.
    pub fn head_input_width(&self) -> Option<usize> {
        self.heads.as_ref().map(|h| h.in_width)
    }

    /// Output width of the highest-priority present stage.
    fn last_stage_width(&self) -> Option<usize> {
        self.get_feat_networks().first().map(|s| s.output_width())
    }

    /// Run [`OdometryNet::forward`] on the modalities of a batch.
    pub fn forward_batch(&self, batch: &SequenceBatch, train: bool) -> Result<(Tensor, Tensor)> {
        self.forward(batch.lidar.as_ref(), batch.imu.as_ref(), train)
    }
}

impl OdometryNet for DeepLio {
    fn get_feat_networks(&self) -> Vec<&dyn FeatureStage> {
        let mut nets: Vec<&dyn FeatureStage> = Vec::with_capacity(4);
        if let Some(net) = self.odom_feat_net.as_deref() {
            nets.push(net);
        }
        if let Some(net) = self.fusion_net.as_deref() {
            nets.push(net);
        }
        if let Some(net) = self.imu_feat_net.as_deref() {
            nets.push(net);
        }
        if let Some(net) = self.lidar_feat_net.as_deref() {
            nets.push(net);
        }
        nets
    }

    fn initialize(&mut self, store: &mut ParamStore) -> Result<()> {
        let in_width = self.last_stage_width().ok_or_else(|| {
            DeepLioError::MissingStage("DeepLIO needs at least one feature stage".to_string())
        })?;

        let drop = if self.p > 0.0 {
            Some(Dropout::new(self.p, store.fork_rng())?)
        } else {
            None
        };
        let fc_pos = Linear::new(store, "fc_pos", in_width, POSITION_DIM)?;
        let fc_ori = Linear::new(store, "fc_ori", in_width, ORIENTATION_DIM)?;
        debug!("regression heads sized for {} features (dropout {})", in_width, self.p);

        self.heads = Some(RegressionHeads {
            in_width,
            drop,
            fc_pos,
            fc_ori,
        });
        Ok(())
    }

    fn forward(
        &self,
        lidar: Option<&Tensor>,
        imu: Option<&ImuInput>,
        train: bool,
    ) -> Result<(Tensor, Tensor)> {
        let heads = self.heads.as_ref().ok_or(DeepLioError::NotInitialized)?;
        let mut last_feat: Option<Tensor> = None;

        let feat_lidar = match (&self.lidar_feat_net, lidar) {
            (Some(net), Some(frames)) => Some(net.forward(frames, train)?),
            (Some(_), None) => {
                return Err(DeepLioError::InvalidInput(
                    "LiDAR feature net present but no LiDAR frames given".to_string(),
                ))
            }
            (None, _) => None,
        };
        if feat_lidar.is_some() {
            last_feat = feat_lidar.clone();
        }

        let feat_imu = match (&self.imu_feat_net, imu) {
            (Some(net), Some(meas)) => Some(net.forward(meas, train)?),
            (Some(_), None) => {
                return Err(DeepLioError::InvalidInput(
                    "IMU feature net present but no IMU measurements given".to_string(),
                ))
            }
            (None, _) => None,
        };
        if feat_imu.is_some() {
            last_feat = feat_imu.clone();
        }

        if let Some(fusion) = &self.fusion_net {
            last_feat = Some(fusion.forward([feat_lidar.as_ref(), feat_imu.as_ref()])?);
        }

        if let Some(odom) = &self.odom_feat_net {
            let input = last_feat.as_ref().ok_or_else(|| {
                DeepLioError::MissingStage("odometry net has no input features".to_string())
            })?;
            last_feat = Some(odom.forward(input, train)?);
        }

        let feat = last_feat.ok_or_else(|| {
            DeepLioError::MissingStage("no feature stage produced an output".to_string())
        })?;
        let (b, s, f) = feat.dims3()?;
        let mut flat = feat.reshape((b * s, f))?;
        if let Some(drop) = &heads.drop {
            flat = drop.forward(&flat, train)?;
        }

        let pos = heads.fc_pos.forward(&flat)?;
        let ori = heads.fc_ori.forward(&flat)?;
        Ok((pos, ori))
    }
}
