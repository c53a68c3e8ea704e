//! Fully connected layer.

use candle_core::{Tensor, Var};

use super::ParamStore;
use crate::error::{DeepLioError, Result};

/// `y = x W^T + b` over the last axis of `x`.
pub struct Linear {
    weight: Var,
    bias: Var,
    in_dim: usize,
    out_dim: usize,
}

impl Linear {
    pub fn new(store: &mut ParamStore, name: &str, in_dim: usize, out_dim: usize) -> Result<Self> {
        let (weight, bias) = store.linear(name, in_dim, out_dim)?;
        Ok(Self {
            weight,
            bias,
            in_dim,
            out_dim,
        })
    }

    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    /// Accepts `[..., in_dim]` and returns `[..., out_dim]`.
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let dims = x.dims().to_vec();
        match dims.last() {
            Some(&last) if last == self.in_dim => {}
            _ => {
                return Err(DeepLioError::InvalidInput(format!(
                    "linear layer expects last dim {}, got shape {:?}",
                    self.in_dim, dims
                )))
            }
        }

        let rows: usize = dims[..dims.len() - 1].iter().product();
        let y = x
            .reshape((rows, self.in_dim))?
            .matmul(&self.weight.as_tensor().t()?)?
            .broadcast_add(self.bias.as_tensor())?;

        let mut out_dims = dims;
        if let Some(last) = out_dims.last_mut() {
            *last = self.out_dim;
        }
        Ok(y.reshape(out_dims)?)
    }
}
