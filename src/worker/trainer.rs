//! Training worker: SGD on the pose regression loss.

use std::time::Instant;

use candle_core::Tensor;

use super::meters::{AverageMeter, ProgressMeter};
use super::worker::{Worker, WorkerArgs, WorkerBase};
use crate::config::DeepLioConfig;
use crate::error::{DeepLioError, Result};
use crate::models::{DeepLio, SequenceBatch};
use crate::nn::ParamStore;

/// Learning rate schedule with linear warmup followed by cosine decay,
/// stepped once per epoch.
#[derive(Debug, Clone)]
pub struct LrScheduler {
    base_lr: f64,
    warmup_epochs: usize,
    total_epochs: usize,
}

impl LrScheduler {
    pub fn new(base_lr: f64, warmup_epochs: usize, total_epochs: usize) -> Self {
        Self {
            base_lr,
            warmup_epochs,
            total_epochs,
        }
    }

    pub fn get_lr(&self, epoch: usize) -> f64 {
        if epoch < self.warmup_epochs {
            // first warmup epoch trains at a fraction, never at zero
            self.base_lr * (epoch + 1) as f64 / (self.warmup_epochs + 1) as f64
        } else {
            let decay_span = self.total_epochs.saturating_sub(self.warmup_epochs).max(1);
            let progress = epoch.saturating_sub(self.warmup_epochs) as f64 / decay_span as f64;
            self.base_lr * 0.5 * (1.0 + (progress * std::f64::consts::PI).cos())
        }
    }
}

/// Mean squared errors of both heads. Returns the combined loss
/// `mse(pos) + beta * mse(ori)` together with the two parts as scalars.
pub fn pose_loss(
    pos: &Tensor,
    ori: &Tensor,
    gt_pos: &Tensor,
    gt_ori: &Tensor,
    beta: f64,
) -> Result<(Tensor, f32, f32)> {
    if pos.dims() != gt_pos.dims() || ori.dims() != gt_ori.dims() {
        return Err(DeepLioError::InvalidInput(format!(
            "prediction shapes {:?}/{:?} do not match ground truth {:?}/{:?}",
            pos.dims(),
            ori.dims(),
            gt_pos.dims(),
            gt_ori.dims()
        )));
    }
    let loss_pos = pos.sub(gt_pos)?.sqr()?.mean_all()?;
    let loss_ori = ori.sub(gt_ori)?.sqr()?.mean_all()?;
    let lp = loss_pos.to_scalar::<f32>()?;
    let lo = loss_ori.to_scalar::<f32>()?;
    let loss = loss_pos.add(&loss_ori.affine(beta, 0.0)?)?;
    Ok((loss, lp, lo))
}

/// Averages of one epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochStats {
    pub loss: f64,
    pub loss_pos: f64,
    pub loss_ori: f64,
    pub lr: f64,
}

pub struct Trainer {
    base: WorkerBase,
    store: ParamStore,
    net: DeepLio,
    batches: Vec<SequenceBatch>,
    scheduler: LrScheduler,
    beta: f64,
    loss_history: Vec<f64>,
}

impl Trainer {
    pub fn new(args: WorkerArgs, cfg: &DeepLioConfig, batches: Vec<SequenceBatch>) -> Result<Self> {
        let base = WorkerBase::new("train", args, cfg)?;
        Self::from_base(base, cfg, batches)
    }

    /// Trainer over `n_batches` synthetic batches drawn from its own seeded
    /// streams.
    pub fn synthetic(args: WorkerArgs, cfg: &DeepLioConfig, n_batches: usize) -> Result<Self> {
        let mut base = WorkerBase::new("train", args, cfg)?;
        let batches = base.load_synthetic(n_batches)?;
        Self::from_base(base, cfg, batches)
    }

    fn from_base(mut base: WorkerBase, cfg: &DeepLioConfig, batches: Vec<SequenceBatch>) -> Result<Self> {
        let args = base.args();
        let scheduler = LrScheduler::new(args.lr, args.warmup_epochs, args.epochs);
        let mut store = base.param_store();
        let net = DeepLio::from_config(cfg, base.container(), &mut store)?;
        base.logger().info(&format!(
            "trainer ready: {} batches, {} parameters",
            batches.len(),
            store.num_parameters()
        ));
        Ok(Self {
            base,
            store,
            net,
            batches,
            scheduler,
            beta: cfg.deeplio.beta,
            loss_history: Vec::new(),
        })
    }

    pub fn net(&self) -> &DeepLio {
        &self.net
    }

    pub fn store(&self) -> &ParamStore {
        &self.store
    }

    /// Average loss of every finished epoch.
    pub fn loss_history(&self) -> &[f64] {
        &self.loss_history
    }

    pub fn train_epoch(&mut self, epoch: usize) -> Result<EpochStats> {
        let lr = self.scheduler.get_lr(epoch);
        let print_freq = self.base.args().print_freq.max(1);
        let progress = ProgressMeter::new(self.batches.len(), &format!("Epoch: [{}]", epoch));
        let mut batch_time = AverageMeter::with_precision("Time", 3);
        let mut losses = AverageMeter::with_precision("Loss", 4);
        let mut losses_pos = AverageMeter::with_precision("LossPos", 4);
        let mut losses_ori = AverageMeter::with_precision("LossOri", 4);

        if self.batches.is_empty() {
            self.base.logger().warn("no training batches");
        }

        for (i, batch) in self.batches.iter().enumerate() {
            let start = Instant::now();
            let (pos, ori) = self.net.forward_batch(batch, true)?;
            let (loss, lp, lo) = pose_loss(&pos, &ori, &batch.gt_pos, &batch.gt_ori, self.beta)?;
            let grads = loss.backward()?;
            self.store.sgd_step(&grads, lr)?;

            let n = pos.dim(0)?;
            losses.update(loss.to_scalar::<f32>()? as f64, n);
            losses_pos.update(lp as f64, n);
            losses_ori.update(lo as f64, n);
            batch_time.update(start.elapsed().as_secs_f64(), 1);

            if i % print_freq == 0 {
                progress.display(
                    self.base.logger(),
                    i,
                    &[&batch_time, &losses, &losses_pos, &losses_ori],
                );
            }
        }

        let stats = EpochStats {
            loss: losses.avg,
            loss_pos: losses_pos.avg,
            loss_ori: losses_ori.avg,
            lr,
        };
        let metrics = self.base.metrics();
        metrics.add_scalar("train/loss", stats.loss, epoch)?;
        metrics.add_scalar("train/loss_pos", stats.loss_pos, epoch)?;
        metrics.add_scalar("train/loss_ori", stats.loss_ori, epoch)?;
        metrics.add_scalar("train/lr", lr, epoch)?;
        self.base.logger().info(&format!(
            "epoch {} done: loss {:.6}, lr {:.6}",
            epoch, stats.loss, lr
        ));
        self.loss_history.push(stats.loss);
        Ok(stats)
    }
}

impl Worker for Trainer {
    fn base(&self) -> &WorkerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WorkerBase {
        &mut self.base
    }

    fn run(&mut self) -> Result<()> {
        self.base.mark_running()?;
        let epochs = self.base.args().epochs;
        for epoch in 0..epochs {
            self.train_epoch(epoch)?;
        }
        self.base.metrics().flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_scheduler_warmup_then_cosine() {
        let sched = LrScheduler::new(0.1, 2, 10);
        assert!(sched.get_lr(0) > 0.0);
        assert!(sched.get_lr(0) < sched.get_lr(1));
        assert!((sched.get_lr(2) - 0.1).abs() < 1e-12);
        assert!(sched.get_lr(9) < sched.get_lr(5));
        assert!(sched.get_lr(9) > 0.0);
    }

    #[test]
    fn test_scheduler_without_warmup_starts_at_base() {
        let sched = LrScheduler::new(0.01, 0, 4);
        assert!((sched.get_lr(0) - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_pose_loss_weights_orientation() {
        let dev = Device::Cpu;
        let pos = Tensor::ones((2, 3), candle_core::DType::F32, &dev).unwrap();
        let ori = Tensor::ones((2, 4), candle_core::DType::F32, &dev).unwrap();
        let gt_pos = pos.zeros_like().unwrap();
        let gt_ori = ori.affine(3.0, 0.0).unwrap();
        let (loss, lp, lo) = pose_loss(&pos, &ori, &gt_pos, &gt_ori, 0.5).unwrap();
        assert!((lp - 1.0).abs() < 1e-6);
        assert!((lo - 4.0).abs() < 1e-6);
        assert!((loss.to_scalar::<f32>().unwrap() - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_pose_loss_shape_mismatch() {
        let dev = Device::Cpu;
        let pos = Tensor::zeros((2, 3), candle_core::DType::F32, &dev).unwrap();
        let ori = Tensor::zeros((2, 4), candle_core::DType::F32, &dev).unwrap();
        let gt_pos = Tensor::zeros((3, 3), candle_core::DType::F32, &dev).unwrap();
        assert!(matches!(
            pose_loss(&pos, &ori, &gt_pos, &ori, 1.0),
            Err(DeepLioError::InvalidInput(_))
        ));
    }
}
