//! Trainable parameter storage with seeded initialization.

use candle_core::backprop::GradStore;
use candle_core::{Device, Tensor, Var};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::Result;

/// Owns every trainable variable of a network.
///
/// Initial values come from a `ChaCha8Rng`, so two stores created with the
/// same seed hand out identical parameters in the same order.
pub struct ParamStore {
    device: Device,
    rng: ChaCha8Rng,
    vars: Vec<(String, Var)>,
}

impl ParamStore {
    pub fn new(device: &Device, seed: u64) -> Self {
        Self {
            device: device.clone(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            vars: Vec::new(),
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Create a variable drawn from `U(-bound, bound)`.
    pub fn uniform(&mut self, name: &str, shape: &[usize], bound: f64) -> Result<Var> {
        let n: usize = shape.iter().product();
        let bound = bound as f32;
        let data: Vec<f32> = (0..n)
            .map(|_| {
                if bound > 0.0 {
                    self.rng.gen_range(-bound..bound)
                } else {
                    0.0
                }
            })
            .collect();
        let tensor = Tensor::from_vec(data, shape, &self.device)?;
        let var = Var::from_tensor(&tensor)?;
        self.vars.push((name.to_string(), var.clone()));
        Ok(var)
    }

    /// Weight `[out, in]` and bias `[out]` with the `1/sqrt(fan_in)` bound.
    pub fn linear(&mut self, name: &str, in_dim: usize, out_dim: usize) -> Result<(Var, Var)> {
        let bound = 1.0 / (in_dim.max(1) as f64).sqrt();
        let weight = self.uniform(&format!("{}.weight", name), &[out_dim, in_dim], bound)?;
        let bias = self.uniform(&format!("{}.bias", name), &[out_dim], bound)?;
        Ok((weight, bias))
    }

    /// Independent RNG derived from the store's stream, for dropout masks.
    pub fn fork_rng(&mut self) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.rng.gen())
    }

    pub fn vars(&self) -> Vec<Var> {
        self.vars.iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn named_vars(&self) -> &[(String, Var)] {
        &self.vars
    }

    pub fn num_parameters(&self) -> usize {
        self.vars.iter().map(|(_, v)| v.elem_count()).sum()
    }

    /// Plain gradient descent on every variable that received a gradient.
    /// Returns the number of variables updated.
    pub fn sgd_step(&self, grads: &GradStore, lr: f64) -> Result<usize> {
        let mut updated = 0;
        for (_, var) in &self.vars {
            if let Some(grad) = grads.get(var.as_tensor()) {
                var.set(&var.as_tensor().sub(&grad.affine(lr, 0.0)?)?)?;
                updated += 1;
            }
        }
        Ok(updated)
    }

    /// Current values of every variable, flattened in creation order.
    pub fn snapshot(&self) -> Result<Vec<f32>> {
        let mut out = Vec::with_capacity(self.num_parameters());
        for (_, var) in &self.vars {
            out.extend(var.as_tensor().flatten_all()?.to_vec1::<f32>()?);
        }
        Ok(out)
    }
}
