//! Odometry feature refinement after fusion.

use std::sync::Arc;

use candle_core::Tensor;

use super::stage::{FeatureStage, OdomFeatNet};
use crate::config::{ConfigContainer, HiddenSize, OdomFeatParams};
use crate::error::Result;
use crate::nn::{FeedForward, ParamStore};

const DEFAULT_HIDDEN: [usize; 1] = [64];

/// Feed-forward refinement `[B, S, F_in]` -> `[B, S, F_out]`.
pub struct OdomFeatFc {
    net: FeedForward,
    output_shape: [usize; 3],
}

impl OdomFeatFc {
    pub fn new(
        params: &OdomFeatParams,
        container: Arc<ConfigContainer>,
        in_width: usize,
        store: &mut ParamStore,
    ) -> Result<Self> {
        let hidden = params
            .hidden_size
            .as_ref()
            .map(HiddenSize::layers)
            .unwrap_or_else(|| DEFAULT_HIDDEN.to_vec());
        let net = FeedForward::new(store, "odom_feat_fc", in_width, &hidden, params.dropout)?;
        let output_shape = [1, container.seq_size, net.out_dim()];
        Ok(Self { net, output_shape })
    }
}

impl FeatureStage for OdomFeatFc {
    fn name(&self) -> &str {
        "odom-fc"
    }

    fn output_shape(&self) -> [usize; 3] {
        self.output_shape
    }
}

impl OdomFeatNet for OdomFeatFc {
    fn forward(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        self.net.forward(x, train)
    }
}
