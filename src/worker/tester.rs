//! Inference worker.

use std::time::Instant;

use super::meters::{AverageMeter, PredDisplay, ProgressMeter};
use super::trainer::pose_loss;
use super::worker::{Worker, WorkerArgs, WorkerBase};
use crate::config::DeepLioConfig;
use crate::error::Result;
use crate::models::{DeepLio, SequenceBatch};

pub struct Tester {
    base: WorkerBase,
    net: DeepLio,
    batches: Vec<SequenceBatch>,
    beta: f64,
    losses: AverageMeter,
    preds: PredDisplay,
}

impl Tester {
    pub fn new(args: WorkerArgs, cfg: &DeepLioConfig, batches: Vec<SequenceBatch>) -> Result<Self> {
        let base = WorkerBase::new("test", args, cfg)?;
        Self::from_base(base, cfg, batches)
    }

    /// Tester over `n_batches` synthetic batches drawn from its own seeded
    /// streams.
    pub fn synthetic(args: WorkerArgs, cfg: &DeepLioConfig, n_batches: usize) -> Result<Self> {
        let mut base = WorkerBase::new("test", args, cfg)?;
        let batches = base.load_synthetic(n_batches)?;
        Self::from_base(base, cfg, batches)
    }

    fn from_base(mut base: WorkerBase, cfg: &DeepLioConfig, batches: Vec<SequenceBatch>) -> Result<Self> {
        let mut store = base.param_store();
        let net = DeepLio::from_config(cfg, base.container(), &mut store)?;
        Ok(Self {
            base,
            net,
            batches,
            beta: cfg.deeplio.beta,
            losses: AverageMeter::with_precision("Loss", 4),
            preds: PredDisplay::default(),
        })
    }

    pub fn losses(&self) -> &AverageMeter {
        &self.losses
    }

    /// First position row of the last batch next to its ground truth.
    pub fn last_prediction(&self) -> &PredDisplay {
        &self.preds
    }
}

impl Worker for Tester {
    fn base(&self) -> &WorkerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WorkerBase {
        &mut self.base
    }

    fn run(&mut self) -> Result<()> {
        self.base.mark_running()?;
        let print_freq = self.base.args().print_freq.max(1);
        let progress = ProgressMeter::new(self.batches.len(), "Test: ");
        let mut batch_time = AverageMeter::with_precision("Time", 3);
        self.losses.reset();

        for (i, batch) in self.batches.iter().enumerate() {
            let start = Instant::now();
            let (pos, ori) = self.net.forward_batch(batch, false)?;
            let (loss, _, _) = pose_loss(&pos, &ori, &batch.gt_pos, &batch.gt_ori, self.beta)?;
            self.losses.update(loss.to_scalar::<f32>()? as f64, pos.dim(0)?);
            self.preds.update(
                pos.get(0)?.to_vec1::<f32>()?,
                batch.gt_pos.get(0)?.to_vec1::<f32>()?,
            );
            batch_time.update(start.elapsed().as_secs_f64(), 1);

            if i % print_freq == 0 {
                progress.display(self.base.logger(), i, &[&batch_time, &self.losses, &self.preds]);
            }
        }

        let avg = self.losses.avg;
        let batches = self.batches.len();
        self.base.metrics().add_scalar("test/loss", avg, batches)?;
        self.base.metrics().flush()?;
        self.base
            .logger()
            .info(&format!("test done: {} batches, loss {:.6}", batches, avg));
        Ok(())
    }
}
