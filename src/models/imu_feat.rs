//! IMU feature extractors.
//!
//! Three interchangeable strategies reduce every IMU window (the samples
//! recorded between two LiDAR scans) to one `H`-wide feature:
//! - [`ImuFeatFc`]: per-sample feed-forward stack, summed over the window
//! - [`ImuFeatRnn0`]: one padded recurrent pass per sequence step, state
//!   carried from step to step
//! - [`ImuFeatRnn1`]: one independent recurrent pass per window

use std::sync::Arc;

use candle_core::Tensor;
use log::{debug, warn};

use super::input::ImuInput;
use super::stage::{FeatureStage, ImuFeatNet};
use crate::config::{ConfigContainer, ConfigError, HiddenSize, ImuFeatParams};
use crate::error::{DeepLioError, Result};
use crate::nn::{FeedForward, ParamStore, RecurrentConfig, RecurrentEncoder, RnnType};

const DEFAULT_FC_HIDDEN: [usize; 2] = [6, 6];
const DEFAULT_RNN_HIDDEN: usize = 6;

/// Build the IMU network selected by `params.name`.
pub fn build_imu_feat_net(
    params: &ImuFeatParams,
    container: Arc<ConfigContainer>,
    store: &mut ParamStore,
) -> Result<Box<dyn ImuFeatNet>> {
    let net: Box<dyn ImuFeatNet> = match params.name.trim().to_lowercase().as_str() {
        "imu-fc" | "fc" => Box::new(ImuFeatFc::new(params, container, store)?),
        "imu-rnn0" | "rnn0" => Box::new(ImuFeatRnn0::new(params, container, store)?),
        "imu-rnn1" | "rnn1" => Box::new(ImuFeatRnn1::new(params, container, store)?),
        other => {
            return Err(ConfigError::Invalid(format!("unknown IMU feature network '{}'", other)).into())
        }
    };
    debug!("IMU feature net '{}' -> {:?}", net.name(), net.output_shape());
    Ok(net)
}

/// Feed-forward variant: every sample goes through the same stack, the
/// window feature is the sum over its samples.
pub struct ImuFeatFc {
    net: FeedForward,
    output_shape: [usize; 3],
    container: Arc<ConfigContainer>,
}

impl ImuFeatFc {
    pub fn new(
        params: &ImuFeatParams,
        container: Arc<ConfigContainer>,
        store: &mut ParamStore,
    ) -> Result<Self> {
        let hidden = params
            .hidden_size
            .as_ref()
            .map(HiddenSize::layers)
            .unwrap_or_else(|| DEFAULT_FC_HIDDEN.to_vec());
        let net = FeedForward::new(store, "imu_feat_fc", params.input_size, &hidden, params.dropout)?;
        let output_shape = [1, container.seq_size, net.out_dim()];
        Ok(Self {
            net,
            output_shape,
            container,
        })
    }
}

impl FeatureStage for ImuFeatFc {
    fn name(&self) -> &str {
        "imu-fc"
    }

    fn output_shape(&self) -> [usize; 3] {
        self.output_shape
    }
}

impl ImuFeatNet for ImuFeatFc {
    fn forward(&self, imu: &ImuInput, train: bool) -> Result<Tensor> {
        let windows = imu.windows()?;
        let (b, s) = (windows.len(), imu.seq_len()?);
        if s != self.container.seq_size {
            debug!("imu-fc: got {} windows per sequence, configured {}", s, self.container.seq_size);
        }

        let mut pooled = Vec::with_capacity(b * s);
        for w in windows.iter().flatten() {
            pooled.push(self.net.forward(w, train)?.sum(0)?);
        }
        let out = Tensor::stack(&pooled, 0)?;
        Ok(out.reshape((b, s, self.output_width()))?)
    }
}

fn recurrent_config(params: &ImuFeatParams) -> RecurrentConfig {
    let hidden_size = match &params.hidden_size {
        None => DEFAULT_RNN_HIDDEN,
        Some(HiddenSize::Single(h)) => *h,
        Some(HiddenSize::Layers(hs)) => {
            let h = hs.last().copied().unwrap_or(DEFAULT_RNN_HIDDEN);
            if hs.len() > 1 {
                warn!("recurrent IMU net takes a single hidden size, using {} from {:?}", h, hs);
            }
            h
        }
    };
    RecurrentConfig {
        rnn_type: RnnType::from_name(&params.rnn_type),
        input_size: params.input_size,
        hidden_size,
        num_layers: params.num_layers,
        bidirectional: params.bidirectional,
        dropout: params.dropout,
    }
}

/// Forward-direction output of the last timestep: `[B, T, D*H]` -> `[B, H]`.
fn last_forward_output(out: &Tensor, hidden: usize) -> Result<Tensor> {
    let (_, t, _) = out.dims3()?;
    Ok(out.narrow(1, t - 1, 1)?.squeeze(1)?.narrow(1, 0, hidden)?)
}

/// Single-pass recurrent variant. Windows of one sequence step are encoded
/// together in one padded call, and the recurrent state of step `s` seeds
/// step `s + 1`.
pub struct ImuFeatRnn0 {
    rnn: RecurrentEncoder,
    output_shape: [usize; 3],
}

impl ImuFeatRnn0 {
    pub fn new(
        params: &ImuFeatParams,
        container: Arc<ConfigContainer>,
        store: &mut ParamStore,
    ) -> Result<Self> {
        let rnn = RecurrentEncoder::new(store, "imu_feat_rnn0", recurrent_config(params))?;
        let output_shape = [1, container.seq_size, rnn.hidden_size()];
        Ok(Self { rnn, output_shape })
    }
}

impl FeatureStage for ImuFeatRnn0 {
    fn name(&self) -> &str {
        "imu-rnn0"
    }

    fn output_shape(&self) -> [usize; 3] {
        self.output_shape
    }
}

impl ImuFeatNet for ImuFeatRnn0 {
    fn forward(&self, imu: &ImuInput, train: bool) -> Result<Tensor> {
        if let ImuInput::Ragged(_) = imu {
            debug!("imu-rnn0: padding ragged IMU windows");
        }
        let padded = imu.to_padded()?;
        let (_, s, _, _) = padded.dims4()?;

        let mut state = None;
        let mut outputs = Vec::with_capacity(s);
        for seq in 0..s {
            let x = padded.narrow(1, seq, 1)?.squeeze(1)?;
            let (out, next) = self.rnn.forward(&x, state.as_ref(), train)?;
            outputs.push(last_forward_output(&out, self.rnn.hidden_size())?);
            state = Some(next);
        }
        Ok(Tensor::stack(&outputs, 1)?)
    }
}

/// Per-chunk recurrent variant: every window is encoded on its own, so
/// ragged window lengths need no padding.
pub struct ImuFeatRnn1 {
    rnn: RecurrentEncoder,
    output_shape: [usize; 3],
}

impl ImuFeatRnn1 {
    pub fn new(
        params: &ImuFeatParams,
        container: Arc<ConfigContainer>,
        store: &mut ParamStore,
    ) -> Result<Self> {
        let rnn = RecurrentEncoder::new(store, "imu_feat_rnn1", recurrent_config(params))?;
        let output_shape = [1, container.seq_size, rnn.hidden_size()];
        Ok(Self { rnn, output_shape })
    }
}

impl FeatureStage for ImuFeatRnn1 {
    fn name(&self) -> &str {
        "imu-rnn1"
    }

    fn output_shape(&self) -> [usize; 3] {
        self.output_shape
    }
}

impl ImuFeatNet for ImuFeatRnn1 {
    fn forward(&self, imu: &ImuInput, train: bool) -> Result<Tensor> {
        let windows = imu.windows()?;
        let (b, s) = (windows.len(), imu.seq_len()?);

        let mut outputs = Vec::with_capacity(b * s);
        for w in windows.iter().flatten() {
            let (out, _) = self.rnn.forward(&w.unsqueeze(0)?, None, train)?;
            outputs.push(last_forward_output(&out, self.rnn.hidden_size())?.squeeze(0)?);
        }
        if outputs.is_empty() {
            return Err(DeepLioError::InvalidInput("no IMU windows".to_string()));
        }
        let out = Tensor::stack(&outputs, 0)?;
        Ok(out.reshape((b, s, self.output_width()))?)
    }
}
