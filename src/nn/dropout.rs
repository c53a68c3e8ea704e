//! Inverted dropout with a seeded mask generator.

use std::sync::Mutex;

use candle_core::Tensor;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::error::{DeepLioError, Result};

pub struct Dropout {
    p: f64,
    rng: Mutex<ChaCha8Rng>,
}

impl Dropout {
    pub fn new(p: f64, rng: ChaCha8Rng) -> Result<Self> {
        if !(0.0..1.0).contains(&p) {
            return Err(DeepLioError::InvalidInput(format!(
                "dropout probability must be in [0, 1), got {}",
                p
            )));
        }
        Ok(Self {
            p,
            rng: Mutex::new(rng),
        })
    }

    pub fn p(&self) -> f64 {
        self.p
    }

    /// Identity in evaluation mode; in training mode each entry is zeroed
    /// with probability `p` and survivors are scaled by `1/(1-p)`.
    pub fn forward(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        if !train || self.p == 0.0 {
            return Ok(x.clone());
        }

        let keep = (1.0 / (1.0 - self.p)) as f32;
        let mask: Vec<f32> = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            (0..x.elem_count())
                .map(|_| if rng.gen::<f64>() < self.p { 0.0 } else { keep })
                .collect()
        };
        let mask = Tensor::from_vec(mask, x.dims(), x.device())?.to_dtype(x.dtype())?;
        Ok(x.mul(&mask)?)
    }
}
