//! Network inputs: IMU windows and sequence batches.

use candle_core::Tensor;

use crate::error::{DeepLioError, Result};

/// IMU samples of a batch, `B` sequences of `S` windows each.
///
/// A window holds the samples recorded between two LiDAR scans, so window
/// lengths usually differ. `Ragged` keeps every window as its own `[T_i, N]`
/// tensor; `Padded` is a single `[B, S, T, N]` tensor whose windows are
/// zero-padded at the end, with the real length of every window.
#[derive(Debug, Clone)]
pub enum ImuInput {
    Ragged(Vec<Vec<Tensor>>),
    Padded {
        data: Tensor,
        /// `lengths[b][s]` real samples of window `(b, s)`
        lengths: Vec<Vec<usize>>,
    },
}

impl ImuInput {
    /// Padded input whose windows all span the full `T` axis.
    pub fn padded(data: Tensor) -> Result<Self> {
        let (b, s, t, _) = data.dims4()?;
        Ok(ImuInput::Padded {
            data,
            lengths: vec![vec![t; s]; b],
        })
    }

    pub fn batch_size(&self) -> Result<usize> {
        match self {
            ImuInput::Ragged(seqs) => Ok(seqs.len()),
            ImuInput::Padded { data, .. } => Ok(data.dims4()?.0),
        }
    }

    /// Number of windows per sequence; all sequences must agree.
    pub fn seq_len(&self) -> Result<usize> {
        match self {
            ImuInput::Ragged(seqs) => {
                let s = seqs.first().map(|w| w.len()).unwrap_or(0);
                if seqs.iter().any(|w| w.len() != s) {
                    return Err(DeepLioError::InvalidInput(
                        "IMU sequences hold different numbers of windows".to_string(),
                    ));
                }
                Ok(s)
            }
            ImuInput::Padded { data, .. } => Ok(data.dims4()?.1),
        }
    }

    /// Width of one IMU sample.
    pub fn sample_width(&self) -> Result<usize> {
        match self {
            ImuInput::Ragged(seqs) => seqs
                .iter()
                .flatten()
                .next()
                .map(|w| w.dims2().map(|(_, n)| n))
                .transpose()?
                .ok_or_else(|| DeepLioError::InvalidInput("empty IMU batch".to_string())),
            ImuInput::Padded { data, .. } => Ok(data.dims4()?.3),
        }
    }

    /// Real number of samples of every window.
    pub fn lengths(&self) -> Result<Vec<Vec<usize>>> {
        match self {
            ImuInput::Ragged(seqs) => seqs
                .iter()
                .map(|seq| seq.iter().map(|w| Ok(w.dims2()?.0)).collect())
                .collect(),
            ImuInput::Padded { lengths, .. } => Ok(lengths.clone()),
        }
    }

    /// Per-window view: `windows[b][s]` is `[T_bs, N]`, padding stripped.
    pub fn windows(&self) -> Result<Vec<Vec<Tensor>>> {
        self.check()?;
        match self {
            ImuInput::Ragged(seqs) => Ok(seqs.clone()),
            ImuInput::Padded { data, lengths } => {
                let mut out = Vec::with_capacity(lengths.len());
                for (bi, seq_lengths) in lengths.iter().enumerate() {
                    let seq = data.get(bi)?;
                    let mut row = Vec::with_capacity(seq_lengths.len());
                    for (si, &len) in seq_lengths.iter().enumerate() {
                        row.push(seq.get(si)?.narrow(0, 0, len)?);
                    }
                    out.push(row);
                }
                Ok(out)
            }
        }
    }

    /// Padded form of this input, keeping the real window lengths.
    pub fn pad(&self) -> Result<ImuInput> {
        Ok(ImuInput::Padded {
            data: self.to_padded()?,
            lengths: self.lengths()?,
        })
    }

    /// Stack into `[B, S, T_max, N]`, zero-padding short windows at the end.
    pub fn to_padded(&self) -> Result<Tensor> {
        self.check()?;
        let seqs = match self {
            ImuInput::Padded { data, .. } => return Ok(data.clone()),
            ImuInput::Ragged(seqs) => seqs,
        };

        let width = self.sample_width()?;
        let t_max = seqs
            .iter()
            .flatten()
            .map(|w| w.dims()[0])
            .max()
            .unwrap_or(0);

        let mut rows = Vec::with_capacity(seqs.len());
        for seq in seqs {
            let mut windows = Vec::with_capacity(seq.len());
            for w in seq {
                let len = w.dims()[0];
                let padded = if len < t_max {
                    let pad = Tensor::zeros((t_max - len, width), w.dtype(), w.device())?;
                    Tensor::cat(&[w, &pad], 0)?
                } else {
                    w.clone()
                };
                windows.push(padded);
            }
            rows.push(Tensor::stack(&windows, 0)?);
        }
        Ok(Tensor::stack(&rows, 0)?)
    }

    /// Every window must be a non-empty `[T, N]` tensor with a common `N`.
    pub fn check(&self) -> Result<()> {
        match self {
            ImuInput::Padded { data, lengths } => {
                let (b, s, t, _) = data.dims4()?;
                if b == 0 || s == 0 || t == 0 {
                    return Err(DeepLioError::InvalidInput(format!(
                        "empty padded IMU tensor {:?}",
                        data.dims()
                    )));
                }
                let fits = lengths.len() == b
                    && lengths
                        .iter()
                        .all(|seq| seq.len() == s && seq.iter().all(|&len| len > 0 && len <= t));
                if !fits {
                    return Err(DeepLioError::InvalidInput(format!(
                        "window lengths {:?} do not fit padded IMU tensor {:?}",
                        lengths,
                        data.dims()
                    )));
                }
            }
            ImuInput::Ragged(seqs) => {
                let s = self.seq_len()?;
                if seqs.is_empty() || s == 0 {
                    return Err(DeepLioError::InvalidInput("empty IMU batch".to_string()));
                }
                let width = self.sample_width()?;
                for w in seqs.iter().flatten() {
                    let (len, n) = w.dims2()?;
                    if len == 0 || n != width {
                        return Err(DeepLioError::InvalidInput(format!(
                            "IMU window of shape {:?}, expected [T>0, {}]",
                            w.dims(),
                            width
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// One training/inference batch.
#[derive(Debug, Clone)]
pub struct SequenceBatch {
    /// Range images of every frame-pair, `[B, S, C, H, W]`
    pub lidar: Option<Tensor>,
    pub imu: Option<ImuInput>,
    /// Ground-truth translation deltas, `[B*S, 3]`
    pub gt_pos: Tensor,
    /// Ground-truth rotation deltas as quaternions, `[B*S, 4]`
    pub gt_ori: Tensor,
}

impl SequenceBatch {
    /// `(B, S)` read from whichever modality is present.
    pub fn dims(&self) -> Result<(usize, usize)> {
        if let Some(lidar) = &self.lidar {
            let (b, s, _, _, _) = lidar.dims5()?;
            return Ok((b, s));
        }
        if let Some(imu) = &self.imu {
            return Ok((imu.batch_size()?, imu.seq_len()?));
        }
        Err(DeepLioError::InvalidInput("batch carries neither LiDAR nor IMU data".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    fn window(len: usize, value: f32) -> Tensor {
        (Tensor::ones((len, 6), DType::F32, &Device::Cpu).unwrap() * value as f64).unwrap()
    }

    fn ragged() -> ImuInput {
        ImuInput::Ragged(vec![
            vec![window(3, 1.0), window(5, 2.0)],
            vec![window(4, 3.0), window(2, 4.0)],
        ])
    }

    #[test]
    fn test_ragged_dims() {
        let imu = ragged();
        assert_eq!(imu.batch_size().unwrap(), 2);
        assert_eq!(imu.seq_len().unwrap(), 2);
        assert_eq!(imu.sample_width().unwrap(), 6);
    }

    #[test]
    fn test_to_padded() {
        let padded = ragged().to_padded().unwrap();
        assert_eq!(padded.dims(), &[2, 2, 5, 6]);
        let first = padded.get(0).unwrap().get(0).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(first[2][0], 1.0);
        assert_eq!(first[3][0], 0.0);
        assert_eq!(first[4][5], 0.0);
    }

    #[test]
    fn test_padded_windows_strip_padding() {
        let padded = ragged().pad().unwrap();
        assert_eq!(padded.lengths().unwrap(), vec![vec![3, 5], vec![4, 2]]);
        let windows = padded.windows().unwrap();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0][1].dims(), &[5, 6]);
        assert_eq!(windows[1][1].dims(), &[2, 6]);
        assert_eq!(windows[1][1].to_vec2::<f32>().unwrap()[1][0], 4.0);
    }

    #[test]
    fn test_full_length_padded_input() {
        let data = Tensor::ones((1, 2, 4, 6), DType::F32, &Device::Cpu).unwrap();
        let imu = ImuInput::padded(data).unwrap();
        assert_eq!(imu.lengths().unwrap(), vec![vec![4, 4]]);
        assert_eq!(imu.windows().unwrap()[0][1].dims(), &[4, 6]);
    }

    #[test]
    fn test_rejects_lengths_beyond_padding() {
        let imu = ImuInput::Padded {
            data: Tensor::zeros((1, 2, 3, 6), DType::F32, &Device::Cpu).unwrap(),
            lengths: vec![vec![3, 4]],
        };
        assert!(matches!(imu.check(), Err(DeepLioError::InvalidInput(_))));
        let missing = ImuInput::Padded {
            data: Tensor::zeros((1, 2, 3, 6), DType::F32, &Device::Cpu).unwrap(),
            lengths: vec![vec![3]],
        };
        assert!(missing.windows().is_err());
    }

    #[test]
    fn test_rejects_uneven_sequences() {
        let imu = ImuInput::Ragged(vec![vec![window(3, 1.0)], vec![]]);
        assert!(imu.seq_len().is_err());
        assert!(imu.check().is_err());
    }

    #[test]
    fn test_rejects_empty_window() {
        let imu = ImuInput::Ragged(vec![vec![window(3, 1.0), window(0, 1.0)]]);
        assert!(matches!(imu.check(), Err(DeepLioError::InvalidInput(_))));
    }

    #[test]
    fn test_batch_dims_from_imu() {
        let batch = SequenceBatch {
            lidar: None,
            imu: Some(ragged()),
            gt_pos: Tensor::zeros((4, 3), DType::F32, &Device::Cpu).unwrap(),
            gt_ori: Tensor::zeros((4, 4), DType::F32, &Device::Cpu).unwrap(),
        };
        assert_eq!(batch.dims().unwrap(), (2, 2));
    }
}
