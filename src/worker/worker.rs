//! Shared training-loop scaffolding: run directories, seeding, logging and
//! the metrics sink.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{info, LevelFilter};

use super::loader::SyntheticLoader;
use super::logger::AppLogger;
use super::metrics::MetricsWriter;
use super::seed::{set_seed, SeededRngs, SEED};
use crate::config::{ConfigContainer, DeepLioConfig};
use crate::error::{DeepLioError, Result};
use crate::models::SequenceBatch;
use crate::nn::ParamStore;
use crate::test_utils::SyntheticConfig;

/// Run-time arguments of a worker (normally from the command line).
#[derive(Debug, Clone)]
pub struct WorkerArgs {
    pub batch_size: usize,
    /// Data-loading workers
    pub workers: usize,
    pub debug: bool,
    pub epochs: usize,
    pub lr: f64,
    pub warmup_epochs: usize,
    /// Print a progress line every this many batches
    pub print_freq: usize,
    /// Directory that receives `outputs/`
    pub output_root: PathBuf,
}

impl Default for WorkerArgs {
    fn default() -> Self {
        Self {
            batch_size: 2,
            workers: 0,
            debug: false,
            epochs: 1,
            lr: 1e-3,
            warmup_epochs: 0,
            print_freq: 10,
            output_root: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Constructed,
    Running,
    Closed,
}

/// State every worker owns.
pub struct WorkerBase {
    action: String,
    args: WorkerArgs,
    cfg: DeepLioConfig,
    container: Arc<ConfigContainer>,
    im_height: usize,
    im_width: usize,
    n_channels: usize,
    out_dir: PathBuf,
    runs_dir: PathBuf,
    rngs: SeededRngs,
    logger: AppLogger,
    metrics: MetricsWriter,
    state: WorkerState,
}

fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|source| DeepLioError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

impl WorkerBase {
    pub fn new(action: &str, args: WorkerArgs, cfg: &DeepLioConfig) -> Result<Self> {
        let container = ConfigContainer::build(cfg)?;
        let (im_height, im_width) = container.curr_dataset_cfg.cropped_size()?;
        let n_channels = cfg.n_channels();

        let ts = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
        let outputs = args.output_root.join("outputs");
        let out_dir = outputs.join(format!("{}_{}", action, ts));
        let runs_dir = outputs.join(format!("{}_runs", action)).join(&ts);
        create_dir(&out_dir)?;
        create_dir(&runs_dir)?;

        let rngs = set_seed(SEED, &container.device);

        let level = if args.debug {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        };
        let logger = AppLogger::open(out_dir.join(format!("{}_{}.log", action, ts)), level)?;
        let metrics = MetricsWriter::open(&runs_dir)?;

        logger.info(&format!(
            "{} worker: image {}x{}, {} channels, seq-size {}, device {:?}",
            action, im_height, im_width, n_channels, container.seq_size, container.device
        ));
        logger.debug(&format!("output dir {}", out_dir.display()));

        Ok(Self {
            action: action.to_string(),
            args,
            cfg: cfg.clone(),
            container,
            im_height,
            im_width,
            n_channels,
            out_dir,
            runs_dir,
            rngs,
            logger,
            metrics,
            state: WorkerState::Constructed,
        })
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn args(&self) -> &WorkerArgs {
        &self.args
    }

    pub fn cfg(&self) -> &DeepLioConfig {
        &self.cfg
    }

    pub fn container(&self) -> Arc<ConfigContainer> {
        self.container.clone()
    }

    /// Cropped image size `(height, width)`.
    pub fn image_size(&self) -> (usize, usize) {
        (self.im_height, self.im_width)
    }

    pub fn n_channels(&self) -> usize {
        self.n_channels
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn runs_dir(&self) -> &Path {
        &self.runs_dir
    }

    pub fn rngs(&self) -> &SeededRngs {
        &self.rngs
    }

    pub fn rngs_mut(&mut self) -> &mut SeededRngs {
        &mut self.rngs
    }

    /// Fresh parameter store seeded from the host stream.
    pub fn param_store(&mut self) -> ParamStore {
        ParamStore::new(&self.container.device, self.rngs.next_param_seed())
    }

    /// `n` synthetic batches shaped after the worker's config, sampled from
    /// the numeric stream and built by `args.workers` data workers.
    pub fn load_synthetic(&mut self, n: usize) -> Result<Vec<SequenceBatch>> {
        let synth = SyntheticConfig::for_config(&self.cfg, self.args.batch_size.max(1))?;
        let loader = SyntheticLoader::new(synth, self.args.workers, self.container.device.clone());
        let batches = loader.load(n, &mut self.rngs.numeric)?;
        self.logger.debug(&format!(
            "loaded {} synthetic batches with {} data workers",
            batches.len(),
            loader.num_workers()
        ));
        Ok(batches)
    }

    pub fn logger(&self) -> &AppLogger {
        &self.logger
    }

    pub fn metrics(&mut self) -> &mut MetricsWriter {
        &mut self.metrics
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn mark_running(&mut self) -> Result<()> {
        match self.state {
            WorkerState::Closed => Err(DeepLioError::WorkerClosed),
            _ => {
                self.state = WorkerState::Running;
                Ok(())
            }
        }
    }

    pub fn close(&mut self) -> Result<()> {
        if self.state == WorkerState::Closed {
            return Ok(());
        }
        self.logger.info(&format!("stopping {} worker", self.action));
        self.state = WorkerState::Closed;
        std::thread::sleep(Duration::from_millis(500));
        self.metrics.close()?;
        self.logger.close()?;
        info!("{} worker closed", self.action);
        Ok(())
    }
}

/// A training or inference job.
pub trait Worker {
    fn base(&self) -> &WorkerBase;

    fn base_mut(&mut self) -> &mut WorkerBase;

    fn run(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()> {
        self.base_mut().close()
    }

    fn name(&self) -> &str {
        self.base().action()
    }
}
