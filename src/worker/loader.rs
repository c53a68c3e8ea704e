//! Synthetic batch loading, optionally spread over data-loading threads.

use std::thread;

use candle_core::Device;
use log::debug;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::seed::worker_init_fn;
use crate::error::{DeepLioError, Result};
use crate::models::SequenceBatch;
use crate::test_utils::{augment_imu, batch_from_rng, SyntheticConfig};

/// Builds batches the way a data loader would: the sampler fixes the content
/// of every batch up front, data workers build and augment them.
///
/// With `num_workers == 0` batches are built in the calling thread and
/// augmented from the sampler stream. Otherwise batch `i` goes to data
/// worker `i % num_workers`, which is seeded through [`worker_init_fn`].
pub struct SyntheticLoader {
    synth: SyntheticConfig,
    num_workers: usize,
    device: Device,
}

impl SyntheticLoader {
    pub fn new(synth: SyntheticConfig, num_workers: usize, device: Device) -> Self {
        Self {
            synth,
            num_workers,
            device,
        }
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    fn build(&self, batch_seed: u64, augment: &mut ChaCha8Rng) -> Result<SequenceBatch> {
        let mut rng = ChaCha8Rng::seed_from_u64(batch_seed);
        let mut batch = batch_from_rng(&self.synth, &mut rng, &self.device)?;
        augment_imu(&mut batch, self.synth.imu_noise, augment)?;
        Ok(batch)
    }

    /// Draw `n` batches, in sampler order.
    pub fn load(&self, n: usize, sampler: &mut ChaCha8Rng) -> Result<Vec<SequenceBatch>> {
        let seeds: Vec<u64> = (0..n).map(|_| sampler.gen()).collect();
        if self.num_workers == 0 {
            return seeds.iter().map(|&seed| self.build(seed, sampler)).collect();
        }

        let workers = self.num_workers.min(n.max(1));
        debug!("loading {} batches with {} data workers", n, workers);
        let results: Vec<Result<Vec<(usize, SequenceBatch)>>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|worker_id| {
                    let seeds = &seeds;
                    scope.spawn(move || -> Result<Vec<(usize, SequenceBatch)>> {
                        let mut rngs = worker_init_fn(worker_id);
                        let mut built = Vec::new();
                        for i in (worker_id..seeds.len()).step_by(workers) {
                            built.push((i, self.build(seeds[i], &mut rngs.host)?));
                        }
                        Ok(built)
                    })
                })
                .collect();
            handles
                .into_iter()
                .enumerate()
                .map(|(worker_id, handle)| {
                    handle
                        .join()
                        .unwrap_or(Err(DeepLioError::DataWorkerPanicked(worker_id)))
                })
                .collect()
        });

        let mut slots: Vec<Option<SequenceBatch>> = vec![None; n];
        for built in results {
            for (i, batch) in built? {
                slots[i] = Some(batch);
            }
        }
        Ok(slots.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gt(batches: &[SequenceBatch]) -> Vec<Vec<Vec<f32>>> {
        batches.iter().map(|b| b.gt_pos.to_vec2::<f32>().unwrap()).collect()
    }

    fn imu0(batch: &SequenceBatch) -> Vec<Vec<f32>> {
        batch.imu.as_ref().unwrap().windows().unwrap()[0][0].to_vec2::<f32>().unwrap()
    }

    #[test]
    fn test_content_independent_of_worker_count() {
        let mut outputs = Vec::new();
        for workers in [0, 1, 3] {
            let loader = SyntheticLoader::new(SyntheticConfig::default(), workers, Device::Cpu);
            let mut sampler = ChaCha8Rng::seed_from_u64(7);
            let batches = loader.load(5, &mut sampler).unwrap();
            assert_eq!(batches.len(), 5);
            outputs.push((gt(&batches), imu0(&batches[4])));
        }
        assert_eq!(outputs[0], outputs[1]);
        assert_eq!(outputs[1], outputs[2]);
    }

    #[test]
    fn test_data_workers_augment_identically() {
        let synth = SyntheticConfig {
            imu_noise: 0.05,
            ..SyntheticConfig::default()
        };
        let loader = SyntheticLoader::new(synth.clone(), 2, Device::Cpu);
        let a = loader.load(4, &mut ChaCha8Rng::seed_from_u64(7)).unwrap();
        let b = loader.load(4, &mut ChaCha8Rng::seed_from_u64(7)).unwrap();
        assert_eq!(imu0(&a[3]), imu0(&b[3]));

        let clean = SyntheticLoader::new(SyntheticConfig::default(), 2, Device::Cpu)
            .load(4, &mut ChaCha8Rng::seed_from_u64(7))
            .unwrap();
        assert_eq!(gt(&a), gt(&clean));
        assert_ne!(imu0(&a[0]), imu0(&clean[0]));
    }

    #[test]
    fn test_more_workers_than_batches() {
        let loader = SyntheticLoader::new(SyntheticConfig::default(), 8, Device::Cpu);
        let batches = loader.load(2, &mut ChaCha8Rng::seed_from_u64(1)).unwrap();
        assert_eq!(batches.len(), 2);
    }
}
