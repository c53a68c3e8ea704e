//! Training-loop scaffolding and the concrete workers.

pub mod loader;
pub mod logger;
pub mod meters;
pub mod metrics;
pub mod seed;
pub mod tester;
pub mod trainer;
#[allow(clippy::module_inception)]
pub mod worker;


pub use loader::SyntheticLoader;
pub use logger::AppLogger;
pub use meters::{AverageMeter, PredDisplay, ProgressMeter};
pub use metrics::{MetricsWriter, ScalarRecord, SCALARS_FILE};
pub use seed::{set_seed, worker_init_fn, SeededRngs, SEED};
pub use tester::Tester;
pub use trainer::{pose_loss, EpochStats, LrScheduler, Trainer};
pub use worker::{Worker, WorkerArgs, WorkerBase, WorkerState};
