//! Stacked linear layers with leaky-ReLU activations.

use candle_core::Tensor;

use super::{leaky_relu, Dropout, Linear, ParamStore, LEAKY_SLOPE};
use crate::error::{DeepLioError, Result};

/// `Linear -> leaky_relu` for every width in `widths`, then dropout.
pub struct FeedForward {
    layers: Vec<Linear>,
    dropout: Dropout,
}

impl FeedForward {
    pub fn new(
        store: &mut ParamStore,
        name: &str,
        in_dim: usize,
        widths: &[usize],
        dropout: f64,
    ) -> Result<Self> {
        if widths.is_empty() {
            return Err(DeepLioError::InvalidInput(format!(
                "{} needs at least one layer width",
                name
            )));
        }

        let mut layers = Vec::with_capacity(widths.len());
        let mut prev = in_dim;
        for (i, &width) in widths.iter().enumerate() {
            layers.push(Linear::new(store, &format!("{}.{}", name, i), prev, width)?);
            prev = width;
        }
        let dropout = Dropout::new(dropout, store.fork_rng())?;
        Ok(Self { layers, dropout })
    }

    pub fn in_dim(&self) -> usize {
        self.layers[0].in_dim()
    }

    pub fn out_dim(&self) -> usize {
        self.layers[self.layers.len() - 1].out_dim()
    }

    pub fn forward(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let mut y = x.clone();
        for layer in &self.layers {
            y = leaky_relu(&layer.forward(&y)?, LEAKY_SLOPE)?;
        }
        self.dropout.forward(&y, train)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    #[test]
    fn test_stack_widths() {
        let mut store = ParamStore::new(&Device::Cpu, 0);
        let ff = FeedForward::new(&mut store, "ff", 6, &[16, 8], 0.0).unwrap();
        assert_eq!(ff.in_dim(), 6);
        assert_eq!(ff.out_dim(), 8);
        let x = Tensor::ones((10, 6), DType::F32, &Device::Cpu).unwrap();
        assert_eq!(ff.forward(&x, false).unwrap().dims(), &[10, 8]);
    }

    #[test]
    fn test_empty_widths_rejected() {
        let mut store = ParamStore::new(&Device::Cpu, 0);
        assert!(FeedForward::new(&mut store, "ff", 6, &[], 0.0).is_err());
    }
}
