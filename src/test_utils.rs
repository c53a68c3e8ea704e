//! Synthetic data for exercising networks and workers without a dataset.
//!
//! IMU windows are random, with ground truth derived from them, so a
//! network can actually fit the data:
//! - position delta = 0.01 * sum of the accelerometer columns over a window
//! - orientation delta = normalized `[1, 0.005 * sum of the gyro columns]`
//!
//! ```
//! use deeplio::test_utils::{synthetic_batch, SyntheticConfig};
//! use candle_core::Device;
//!
//! let batch = synthetic_batch(&SyntheticConfig::default(), &Device::Cpu).unwrap();
//! assert_eq!(batch.gt_pos.dims(), &[6, 3]);
//! ```

use candle_core::{Device, Tensor};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::config::DeepLioConfig;
use crate::error::{DeepLioError, Result};
use crate::models::{ImuInput, SequenceBatch};

/// Shape of the generated batches.
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub batch_size: usize,
    pub seq_size: usize,
    /// Inclusive range of IMU samples per window
    pub imu_len: (usize, usize),
    pub imu_width: usize,
    pub with_imu: bool,
    /// `(channels, height, width)` of the range images; `None` skips LiDAR
    pub lidar: Option<(usize, usize, usize)>,
    /// Amplitude of the uniform noise [`augment_imu`] adds to IMU readings
    pub imu_noise: f32,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            batch_size: 2,
            seq_size: 3,
            imu_len: (4, 10),
            imu_width: 6,
            with_imu: true,
            lidar: None,
            imu_noise: 0.0,
            seed: 42,
        }
    }
}

impl SyntheticConfig {
    /// Batches matching the modalities and image geometry of `cfg`.
    pub fn for_config(cfg: &DeepLioConfig, batch_size: usize) -> Result<Self> {
        let lidar = match cfg.deeplio.lidar_feat_net {
            Some(_) => {
                let (h, w) = cfg.current_dataset()?.cropped_size()?;
                Some((2 * cfg.n_channels(), h, w))
            }
            None => None,
        };
        let imu_width = cfg
            .deeplio
            .imu_feat_net
            .as_ref()
            .map(|p| p.input_size)
            .unwrap_or(6);
        Ok(Self {
            batch_size,
            seq_size: cfg.datasets.sequence_size,
            imu_width,
            with_imu: cfg.deeplio.imu_feat_net.is_some(),
            lidar,
            ..Self::default()
        })
    }
}

fn uniform(rng: &mut ChaCha8Rng, n: usize, lo: f32, hi: f32) -> Vec<f32> {
    (0..n).map(|_| rng.gen_range(lo..hi)).collect()
}

/// One batch drawn from `rng`.
pub fn batch_from_rng(cfg: &SyntheticConfig, rng: &mut ChaCha8Rng, device: &Device) -> Result<SequenceBatch> {
    if cfg.imu_width == 0 {
        return Err(DeepLioError::InvalidInput("IMU samples need a positive width".to_string()));
    }
    let (b, s) = (cfg.batch_size, cfg.seq_size);
    let (min_len, max_len) = (cfg.imu_len.0.max(1), cfg.imu_len.1.max(cfg.imu_len.0.max(1)));
    let mut windows = Vec::with_capacity(b);
    let mut gt_pos = Vec::with_capacity(b * s * 3);
    let mut gt_ori = Vec::with_capacity(b * s * 4);

    for _ in 0..b {
        let mut seq = Vec::with_capacity(s);
        for _ in 0..s {
            let len = rng.gen_range(min_len..=max_len);
            let data = uniform(rng, len * cfg.imu_width, -1.0, 1.0);

            let mut acc = [0f32; 3];
            let mut gyro = [0f32; 3];
            for row in data.chunks(cfg.imu_width) {
                for k in 0..3 {
                    acc[k] += row.get(k).copied().unwrap_or(0.0);
                    gyro[k] += row.get(k + 3).copied().unwrap_or(0.0);
                }
            }
            gt_pos.extend(acc.iter().map(|a| 0.01 * a));
            let q = [1.0, 0.005 * gyro[0], 0.005 * gyro[1], 0.005 * gyro[2]];
            let norm = q.iter().map(|v| v * v).sum::<f32>().sqrt();
            gt_ori.extend(q.iter().map(|v| v / norm));

            seq.push(Tensor::from_vec(data, (len, cfg.imu_width), device)?);
        }
        windows.push(seq);
    }

    let lidar = match cfg.lidar {
        Some((c, h, w)) => {
            let data = uniform(rng, b * s * c * h * w, 0.0, 1.0);
            Some(Tensor::from_vec(data, (b, s, c, h, w), device)?)
        }
        None => None,
    };

    Ok(SequenceBatch {
        lidar,
        imu: cfg.with_imu.then_some(ImuInput::Ragged(windows)),
        gt_pos: Tensor::from_vec(gt_pos, (b * s, 3), device)?,
        gt_ori: Tensor::from_vec(gt_ori, (b * s, 4), device)?,
    })
}

/// Add `U(-noise, noise)` to every IMU reading of `batch`. Ground truth is
/// left untouched.
pub fn augment_imu(batch: &mut SequenceBatch, noise: f32, rng: &mut ChaCha8Rng) -> Result<()> {
    if noise <= 0.0 {
        return Ok(());
    }
    let Some(imu) = batch.imu.as_ref() else {
        return Ok(());
    };
    let mut windows = imu.windows()?;
    for w in windows.iter_mut().flatten() {
        let (len, n) = w.dims2()?;
        let jitter = Tensor::from_vec(uniform(rng, len * n, -noise, noise), (len, n), w.device())?;
        *w = w.add(&jitter)?;
    }
    batch.imu = Some(ImuInput::Ragged(windows));
    Ok(())
}

/// One batch drawn from a generator seeded with `cfg.seed`.
pub fn synthetic_batch(cfg: &SyntheticConfig, device: &Device) -> Result<SequenceBatch> {
    let mut rng = ChaCha8Rng::seed_from_u64(cfg.seed);
    batch_from_rng(cfg, &mut rng, device)
}

/// `n` different batches from one seeded stream.
pub fn synthetic_batches(cfg: &SyntheticConfig, n: usize, device: &Device) -> Result<Vec<SequenceBatch>> {
    let mut rng = ChaCha8Rng::seed_from_u64(cfg.seed);
    (0..n).map(|_| batch_from_rng(cfg, &mut rng, device)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_shapes() {
        let cfg = SyntheticConfig {
            lidar: Some((4, 8, 16)),
            ..SyntheticConfig::default()
        };
        let batch = synthetic_batch(&cfg, &Device::Cpu).unwrap();
        assert_eq!(batch.dims().unwrap(), (2, 3));
        assert_eq!(batch.lidar.as_ref().unwrap().dims(), &[2, 3, 4, 8, 16]);
        assert_eq!(batch.gt_pos.dims(), &[6, 3]);
        assert_eq!(batch.gt_ori.dims(), &[6, 4]);
        batch.imu.as_ref().unwrap().check().unwrap();
    }

    #[test]
    fn test_orientation_rows_are_unit_quaternions() {
        let batch = synthetic_batch(&SyntheticConfig::default(), &Device::Cpu).unwrap();
        for row in batch.gt_ori.to_vec2::<f32>().unwrap() {
            let norm: f32 = row.iter().map(|v| v * v).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_same_seed_same_batch() {
        let a = synthetic_batch(&SyntheticConfig::default(), &Device::Cpu).unwrap();
        let b = synthetic_batch(&SyntheticConfig::default(), &Device::Cpu).unwrap();
        assert_eq!(
            a.gt_pos.to_vec2::<f32>().unwrap(),
            b.gt_pos.to_vec2::<f32>().unwrap()
        );
        let many = synthetic_batches(&SyntheticConfig::default(), 2, &Device::Cpu).unwrap();
        assert_ne!(
            many[0].gt_pos.to_vec2::<f32>().unwrap(),
            many[1].gt_pos.to_vec2::<f32>().unwrap()
        );
    }

    #[test]
    fn test_zero_width_is_rejected() {
        let cfg = SyntheticConfig {
            imu_width: 0,
            ..SyntheticConfig::default()
        };
        assert!(matches!(
            synthetic_batch(&cfg, &Device::Cpu),
            Err(DeepLioError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_augment_keeps_ground_truth() {
        let clean = synthetic_batch(&SyntheticConfig::default(), &Device::Cpu).unwrap();
        let mut noisy = clean.clone();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        augment_imu(&mut noisy, 0.1, &mut rng).unwrap();

        let a = clean.imu.as_ref().unwrap().windows().unwrap();
        let b = noisy.imu.as_ref().unwrap().windows().unwrap();
        let diff = a[0][0].sub(&b[0][0]).unwrap().abs().unwrap().max_all().unwrap();
        let diff = diff.to_scalar::<f32>().unwrap();
        assert!(diff > 0.0 && diff <= 0.1);
        assert_eq!(
            clean.gt_pos.to_vec2::<f32>().unwrap(),
            noisy.gt_pos.to_vec2::<f32>().unwrap()
        );
    }

    #[test]
    fn test_for_config_follows_modalities() {
        let imu_only = SyntheticConfig::for_config(&DeepLioConfig::deepio(), 1).unwrap();
        assert!(imu_only.lidar.is_none());
        assert!(imu_only.with_imu);

        let lidar_only = SyntheticConfig::for_config(&DeepLioConfig::deeplo(), 1).unwrap();
        assert_eq!(lidar_only.lidar, Some((4, 64, 720)));
        assert!(!lidar_only.with_imu);
    }
}
