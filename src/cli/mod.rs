//! DeepLIO CLI entrypoint.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, ValueEnum};
use log::{debug, error, info};
use serde_json::json;
use thiserror::Error;

use crate::config::{ConfigError, ConfigLoader, DeepLioConfig};
use crate::error::DeepLioError;
use crate::worker::{Tester, Trainer, Worker, WorkerArgs};

/// DeepLIO command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "deeplio", version, about = "Deep LiDAR-inertial odometry")]
struct CliArgs {
    /// Path to a YAML or TOML configuration file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Job to run.
    #[arg(long, value_enum, default_value_t = Action::Train)]
    action: Action,
    #[arg(long, value_name = "N", default_value_t = 2)]
    batch_size: usize,
    /// Data-loading workers.
    #[arg(long, value_name = "N", default_value_t = 0)]
    workers: usize,
    #[arg(long, value_name = "N", default_value_t = 1)]
    epochs: usize,
    /// Base learning rate.
    #[arg(long, value_name = "LR", default_value_t = 1e-3)]
    lr: f64,
    #[arg(long, value_name = "N", default_value_t = 0)]
    warmup_epochs: usize,
    /// Print a progress line every N batches.
    #[arg(long, value_name = "N", default_value_t = 10)]
    print_freq: usize,
    /// Number of synthetic batches per epoch.
    #[arg(long, value_name = "N", default_value_t = 8)]
    batches: usize,
    /// Directory that receives `outputs/`.
    #[arg(long, value_name = "DIR", default_value = ".")]
    output_root: PathBuf,
    /// Debug logging, in the console and the run log.
    #[arg(long)]
    debug: bool,
    /// Console log format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum Action {
    Train,
    Test,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Error, Debug)]
enum CliError {
    #[error("failed to load config {path}: {source}")]
    ConfigLoad { path: PathBuf, source: ConfigError },
    #[error("{0}")]
    Worker(#[from] DeepLioError),
}

impl CliError {
    fn exit_code(&self) -> ExitCode {
        match self {
            CliError::ConfigLoad { .. } | CliError::Worker(DeepLioError::Config(_)) => {
                ExitCode::from(1)
            }
            CliError::Worker(_) => ExitCode::from(2),
        }
    }
}

pub fn run() -> ExitCode {
    let start = Instant::now();
    let cli = CliArgs::parse();

    let level = resolve_log_level(&cli);
    init_logger(&level, cli.log_format);

    match execute(&cli) {
        Ok(()) => {
            info!(
                "{:?} finished in {:.1}s",
                cli.action,
                start.elapsed().as_secs_f64()
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{:?} failed: {}", cli.action, err);
            eprintln!("Error: {}", err);
            err.exit_code()
        }
    }
}

fn execute(cli: &CliArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let args = worker_args(cli);
    debug!("worker args: {:?}", args);

    let mut worker: Box<dyn Worker> = match cli.action {
        Action::Train => Box::new(Trainer::synthetic(args, &config, cli.batches)?),
        Action::Test => Box::new(Tester::synthetic(args, &config, cli.batches)?),
    };
    info!("running {} worker in {}", worker.name(), worker.base().out_dir().display());

    let result = worker.run();
    worker.close()?;
    result?;
    Ok(())
}

fn load_config(cli: &CliArgs) -> Result<DeepLioConfig, CliError> {
    match &cli.config {
        Some(path) => ConfigLoader::load(path).map_err(|source| CliError::ConfigLoad {
            path: path.clone(),
            source,
        }),
        None => {
            info!("no config given, using the KITTI defaults");
            Ok(DeepLioConfig::kitti())
        }
    }
}

fn worker_args(cli: &CliArgs) -> WorkerArgs {
    WorkerArgs {
        batch_size: cli.batch_size,
        workers: cli.workers,
        debug: cli.debug,
        epochs: cli.epochs,
        lr: cli.lr,
        warmup_epochs: cli.warmup_epochs,
        print_freq: cli.print_freq,
        output_root: cli.output_root.clone(),
    }
}

fn resolve_log_level(cli: &CliArgs) -> String {
    if cli.debug {
        return "debug".to_string();
    }
    if let Ok(level) = std::env::var("RUST_LOG") {
        if !level.trim().is_empty() {
            return level;
        }
    }
    "info".to_string()
}

fn init_logger(level: &str, format: LogFormat) {
    let mut builder = env_logger::Builder::new();
    builder.target(env_logger::Target::Stderr);
    builder.filter_level(log::LevelFilter::Info);
    builder.parse_filters(level);
    builder.format(move |buf, record| {
        use std::io::Write;
        let module = record.module_path().unwrap_or(record.target());
        match format {
            LogFormat::Json => {
                let payload = json!({
                    "timestamp": buf.timestamp_millis().to_string(),
                    "level": record.level().to_string(),
                    "target": module,
                    "message": record.args().to_string(),
                });
                writeln!(buf, "{}", payload)
            }
            LogFormat::Text => writeln!(
                buf,
                "{} [{}] {}: {}",
                buf.timestamp_millis(),
                record.level(),
                module,
                record.args()
            ),
        }
    });

    if let Err(err) = builder.try_init() {
        eprintln!("Failed to initialize logger: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = CliArgs::try_parse_from(["deeplio"]).unwrap();
        assert_eq!(cli.action, Action::Train);
        assert_eq!(cli.batch_size, 2);
        assert_eq!(cli.print_freq, 10);
        assert!(cli.config.is_none());
        assert!(!cli.debug);
    }

    #[test]
    fn test_flags_reach_worker_args() {
        let cli = CliArgs::try_parse_from([
            "deeplio",
            "--action",
            "test",
            "--batch-size",
            "4",
            "--epochs",
            "3",
            "--lr",
            "0.01",
            "--warmup-epochs",
            "1",
            "--output-root",
            "/tmp/runs",
            "--debug",
        ])
        .unwrap();
        assert_eq!(cli.action, Action::Test);
        let args = worker_args(&cli);
        assert_eq!(args.batch_size, 4);
        assert_eq!(args.epochs, 3);
        assert_eq!(args.warmup_epochs, 1);
        assert!((args.lr - 0.01).abs() < 1e-12);
        assert_eq!(args.output_root, PathBuf::from("/tmp/runs"));
        assert!(args.debug);
        assert_eq!(resolve_log_level(&cli), "debug");
    }

    #[test]
    fn test_unknown_action_rejected() {
        assert!(CliArgs::try_parse_from(["deeplio", "--action", "export"]).is_err());
    }

    #[test]
    fn test_execute_train_on_synthetic_data() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("deepio.yaml");
        ConfigLoader::save_yaml(&DeepLioConfig::deepio(), &config_path).unwrap();
        let root = dir.path().to_string_lossy().to_string();
        let cfg = config_path.to_string_lossy().to_string();
        let cli = CliArgs::try_parse_from([
            "deeplio",
            "--config",
            cfg.as_str(),
            "--batches",
            "2",
            "--output-root",
            root.as_str(),
        ])
        .unwrap();
        execute(&cli).unwrap();
        assert!(dir.path().join("outputs").join("train_runs").is_dir());
    }

    #[test]
    fn test_missing_config_exit_code() {
        let cli = CliArgs::try_parse_from(["deeplio", "--config", "/nonexistent/deeplio.yaml"]).unwrap();
        let err = execute(&cli).unwrap_err();
        assert!(matches!(err, CliError::ConfigLoad { .. }));
        assert_eq!(err.exit_code(), ExitCode::from(1));
    }
}
