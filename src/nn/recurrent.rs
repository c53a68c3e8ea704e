//! Multi-layer, optionally bidirectional GRU/LSTM encoder.
//!
//! Inputs are batch-first `[B, T, N]`. Gate layouts follow the usual
//! conventions: GRU rows are `r | z | n`, LSTM rows are `i | f | g | o`.

use candle_core::{Tensor, Var};
use log::debug;

use super::{sigmoid, Dropout, ParamStore};
use crate::error::{DeepLioError, Result};

/// Recurrent cell family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RnnType {
    Gru,
    Lstm,
}

impl RnnType {
    /// `gru` selects a GRU; any other name falls back to LSTM.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "gru" => RnnType::Gru,
            "lstm" => RnnType::Lstm,
            other => {
                debug!("unknown rnn type '{}', using lstm", other);
                RnnType::Lstm
            }
        }
    }

    fn gates(self) -> usize {
        match self {
            RnnType::Gru => 3,
            RnnType::Lstm => 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecurrentConfig {
    pub rnn_type: RnnType,
    pub input_size: usize,
    pub hidden_size: usize,
    pub num_layers: usize,
    pub bidirectional: bool,
    /// Applied to the output of every layer but the last, in training mode
    pub dropout: f64,
}

struct CellWeights {
    w_ih: Var,
    w_hh: Var,
    b_ih: Var,
    b_hh: Var,
}

/// Final hidden (and, for LSTMs, cell) state of every layer and direction,
/// indexed `layer * num_directions + direction`, each `[B, H]`.
#[derive(Debug, Clone)]
pub struct RnnState {
    pub h: Vec<Tensor>,
    pub c: Option<Vec<Tensor>>,
}

pub struct RecurrentEncoder {
    config: RecurrentConfig,
    cells: Vec<CellWeights>,
    dropout: Dropout,
}

impl RecurrentEncoder {
    pub fn new(store: &mut ParamStore, name: &str, config: RecurrentConfig) -> Result<Self> {
        if config.num_layers == 0 || config.hidden_size == 0 {
            return Err(DeepLioError::InvalidInput(format!(
                "recurrent encoder needs at least one layer and a positive width, got {:?}",
                config
            )));
        }

        let dirs = if config.bidirectional { 2 } else { 1 };
        let h = config.hidden_size;
        let rows = config.rnn_type.gates() * h;
        let bound = 1.0 / (h as f64).sqrt();

        let mut cells = Vec::with_capacity(config.num_layers * dirs);
        for layer in 0..config.num_layers {
            let in_size = if layer == 0 { config.input_size } else { h * dirs };
            for dir in 0..dirs {
                let suffix = if dir == 1 { "_reverse" } else { "" };
                let p = |w: &str| format!("{}.{}_l{}{}", name, w, layer, suffix);
                cells.push(CellWeights {
                    w_ih: store.uniform(&p("weight_ih"), &[rows, in_size], bound)?,
                    w_hh: store.uniform(&p("weight_hh"), &[rows, h], bound)?,
                    b_ih: store.uniform(&p("bias_ih"), &[rows], bound)?,
                    b_hh: store.uniform(&p("bias_hh"), &[rows], bound)?,
                });
            }
        }

        let dropout = Dropout::new(config.dropout, store.fork_rng())?;
        Ok(Self {
            config,
            cells,
            dropout,
        })
    }

    pub fn config(&self) -> &RecurrentConfig {
        &self.config
    }

    pub fn num_directions(&self) -> usize {
        if self.config.bidirectional {
            2
        } else {
            1
        }
    }

    pub fn hidden_size(&self) -> usize {
        self.config.hidden_size
    }

    /// Width of every output timestep: `num_directions * hidden_size`.
    pub fn output_size(&self) -> usize {
        self.num_directions() * self.config.hidden_size
    }

    /// Encode `[B, T, N]` into `[B, T, D*H]`, starting from `state` when given
    /// and from zeros otherwise.
    pub fn forward(
        &self,
        x: &Tensor,
        state: Option<&RnnState>,
        train: bool,
    ) -> Result<(Tensor, RnnState)> {
        let (b, t, n) = x.dims3()?;
        if n != self.config.input_size || t == 0 {
            return Err(DeepLioError::InvalidInput(format!(
                "recurrent encoder expects [B, T>0, {}], got {:?}",
                self.config.input_size,
                x.dims()
            )));
        }
        if let Some(state) = state {
            if state.h.len() != self.cells.len() {
                return Err(DeepLioError::InvalidInput(format!(
                    "state holds {} hidden tensors, encoder has {} cells",
                    state.h.len(),
                    self.cells.len()
                )));
            }
        }

        let dirs = self.num_directions();
        let is_lstm = self.config.rnn_type == RnnType::Lstm;
        let mut h_out = Vec::with_capacity(self.cells.len());
        let mut c_out = Vec::with_capacity(self.cells.len());
        let mut layer_input = x.clone();

        for layer in 0..self.config.num_layers {
            let mut dir_outputs = Vec::with_capacity(dirs);
            for dir in 0..dirs {
                let idx = layer * dirs + dir;
                let zeros = || Tensor::zeros((b, self.config.hidden_size), x.dtype(), x.device());
                let h0 = match state {
                    Some(s) => s.h[idx].clone(),
                    None => zeros()?,
                };
                let c0 = if is_lstm {
                    match state.and_then(|s| s.c.as_ref()).and_then(|c| c.get(idx)) {
                        Some(c) => Some(c.clone()),
                        None => Some(zeros()?),
                    }
                } else {
                    None
                };

                let (outputs, h, c) =
                    self.run_direction(&self.cells[idx], &layer_input, h0, c0, dir == 1)?;
                dir_outputs.push(outputs);
                h_out.push(h);
                if let Some(c) = c {
                    c_out.push(c);
                }
            }

            let out = if dir_outputs.len() == 1 {
                dir_outputs.remove(0)
            } else {
                Tensor::cat(&dir_outputs, 2)?
            };
            layer_input = if layer + 1 < self.config.num_layers {
                self.dropout.forward(&out, train)?
            } else {
                out
            };
        }

        let state = RnnState {
            h: h_out,
            c: if is_lstm { Some(c_out) } else { None },
        };
        Ok((layer_input, state))
    }

    fn run_direction(
        &self,
        cell: &CellWeights,
        input: &Tensor,
        mut h: Tensor,
        mut c: Option<Tensor>,
        reverse: bool,
    ) -> Result<(Tensor, Tensor, Option<Tensor>)> {
        let (b, t, n) = input.dims3()?;
        let hs = self.config.hidden_size;
        let rows = self.config.rnn_type.gates() * hs;

        // Input projections for all timesteps at once.
        let proj = input
            .reshape((b * t, n))?
            .matmul(&cell.w_ih.as_tensor().t()?)?
            .broadcast_add(cell.b_ih.as_tensor())?
            .reshape((b, t, rows))?;
        let w_hh_t = cell.w_hh.as_tensor().t()?;

        let steps: Vec<usize> = if reverse {
            (0..t).rev().collect()
        } else {
            (0..t).collect()
        };
        let mut outputs: Vec<Option<Tensor>> = vec![None; t];

        for step in steps {
            let gi = proj.narrow(1, step, 1)?.squeeze(1)?;
            let gh = h.matmul(&w_hh_t)?.broadcast_add(cell.b_hh.as_tensor())?;

            match self.config.rnn_type {
                RnnType::Gru => {
                    let r = sigmoid(&gi.narrow(1, 0, hs)?.add(&gh.narrow(1, 0, hs)?)?)?;
                    let z = sigmoid(&gi.narrow(1, hs, hs)?.add(&gh.narrow(1, hs, hs)?)?)?;
                    let candidate = gi
                        .narrow(1, 2 * hs, hs)?
                        .add(&r.mul(&gh.narrow(1, 2 * hs, hs)?)?)?
                        .tanh()?;
                    // (1 - z) * n + z * h
                    h = candidate.add(&z.mul(&h.sub(&candidate)?)?)?;
                }
                RnnType::Lstm => {
                    let gates = gi.add(&gh)?;
                    let i = sigmoid(&gates.narrow(1, 0, hs)?)?;
                    let f = sigmoid(&gates.narrow(1, hs, hs)?)?;
                    let g = gates.narrow(1, 2 * hs, hs)?.tanh()?;
                    let o = sigmoid(&gates.narrow(1, 3 * hs, hs)?)?;
                    let prev = match c.take() {
                        Some(prev) => prev,
                        None => Tensor::zeros((b, hs), h.dtype(), h.device())?,
                    };
                    let next = f.mul(&prev)?.add(&i.mul(&g)?)?;
                    h = o.mul(&next.tanh()?)?;
                    c = Some(next);
                }
            }
            outputs[step] = Some(h.clone());
        }

        let outputs: Vec<Tensor> = outputs.into_iter().flatten().collect();
        let stacked = Tensor::stack(&outputs, 1)?;
        Ok((stacked, h, c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    fn config(rnn_type: RnnType, bidirectional: bool, num_layers: usize) -> RecurrentConfig {
        RecurrentConfig {
            rnn_type,
            input_size: 6,
            hidden_size: 5,
            num_layers,
            bidirectional,
            dropout: 0.0,
        }
    }

    fn input(b: usize, t: usize) -> Tensor {
        Tensor::randn(0f32, 1f32, (b, t, 6), &Device::Cpu).unwrap()
    }

    #[test]
    fn test_rnn_type_from_name() {
        assert_eq!(RnnType::from_name("GRU"), RnnType::Gru);
        assert_eq!(RnnType::from_name("lstm"), RnnType::Lstm);
        assert_eq!(RnnType::from_name("elman"), RnnType::Lstm);
    }

    #[test]
    fn test_gru_shapes() {
        let mut store = ParamStore::new(&Device::Cpu, 1);
        let rnn = RecurrentEncoder::new(&mut store, "rnn", config(RnnType::Gru, false, 2)).unwrap();
        let (out, state) = rnn.forward(&input(3, 7), None, false).unwrap();
        assert_eq!(out.dims(), &[3, 7, 5]);
        assert_eq!(state.h.len(), 2);
        assert!(state.c.is_none());
        assert_eq!(store.num_parameters(), 3 * 5 * (6 + 5 + 2) + 3 * 5 * (5 + 5 + 2));
    }

    #[test]
    fn test_bidirectional_lstm_shapes() {
        let mut store = ParamStore::new(&Device::Cpu, 1);
        let rnn = RecurrentEncoder::new(&mut store, "rnn", config(RnnType::Lstm, true, 2)).unwrap();
        assert_eq!(rnn.output_size(), 10);
        let (out, state) = rnn.forward(&input(2, 4), None, true).unwrap();
        assert_eq!(out.dims(), &[2, 4, 10]);
        assert_eq!(state.h.len(), 4);
        assert_eq!(state.c.as_ref().map(|c| c.len()), Some(4));
    }

    #[test]
    fn test_last_output_equals_final_state() {
        let mut store = ParamStore::new(&Device::Cpu, 2);
        let rnn = RecurrentEncoder::new(&mut store, "rnn", config(RnnType::Gru, false, 1)).unwrap();
        let (out, state) = rnn.forward(&input(2, 5), None, false).unwrap();
        let last = out.narrow(1, 4, 1).unwrap().squeeze(1).unwrap();
        let diff = last.sub(&state.h[0]).unwrap().abs().unwrap().max_all().unwrap();
        assert!(diff.to_scalar::<f32>().unwrap() < 1e-6);
    }

    #[test]
    fn test_state_is_carried() {
        let mut store = ParamStore::new(&Device::Cpu, 3);
        let rnn = RecurrentEncoder::new(&mut store, "rnn", config(RnnType::Lstm, false, 1)).unwrap();
        let x = input(1, 3);
        let (fresh, state) = rnn.forward(&x, None, false).unwrap();
        let (carried, _) = rnn.forward(&x, Some(&state), false).unwrap();
        let diff = fresh.sub(&carried).unwrap().abs().unwrap().sum_all().unwrap();
        assert!(diff.to_scalar::<f32>().unwrap() > 0.0);
    }

    #[test]
    fn test_rejects_wrong_input_width() {
        let mut store = ParamStore::new(&Device::Cpu, 1);
        let rnn = RecurrentEncoder::new(&mut store, "rnn", config(RnnType::Gru, false, 1)).unwrap();
        let x = Tensor::zeros((1, 3, 4), DType::F32, &Device::Cpu).unwrap();
        assert!(matches!(rnn.forward(&x, None, false), Err(DeepLioError::InvalidInput(_))));
    }
}
