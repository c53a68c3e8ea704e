use candle_core::Device;
use deeplio::config::DeepLioConfig;
use deeplio::test_utils::{synthetic_batches, SyntheticConfig};
use deeplio::worker::{MetricsWriter, Trainer, Worker, WorkerArgs, WorkerState, SCALARS_FILE};

#[test]
fn train_run_writes_logs_and_metrics() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = DeepLioConfig::deepio();
    let synth = SyntheticConfig::for_config(&cfg, 2).expect("synthetic config");
    let batches = synthetic_batches(&synth, 3, &Device::Cpu).expect("batches");

    let args = WorkerArgs {
        epochs: 2,
        lr: 0.01,
        print_freq: 2,
        debug: true,
        output_root: dir.path().to_path_buf(),
        ..WorkerArgs::default()
    };
    let mut trainer = Trainer::new(args, &cfg, batches).expect("trainer");
    trainer.run().expect("run");
    assert_eq!(trainer.base().state(), WorkerState::Running);

    let out_dir = trainer.base().out_dir().to_path_buf();
    let runs_dir = trainer.base().runs_dir().to_path_buf();
    trainer.close().expect("close");
    trainer.close().expect("second close");

    let log_name = format!("{}.log", out_dir.file_name().unwrap().to_string_lossy());
    let log = std::fs::read_to_string(out_dir.join(log_name)).expect("log file");
    assert!(log.contains("Epoch: [0][0/3]"));
    assert!(log.contains("Epoch: [1][2/3]"));
    assert!(log.contains("[DEBUG]"));
    assert!(log.contains("stopping train worker"));

    let records = MetricsWriter::read_scalars(runs_dir.join(SCALARS_FILE)).expect("scalars");
    let lrs: Vec<f64> = records
        .iter()
        .filter(|r| r.tag == "train/lr")
        .map(|r| r.value)
        .collect();
    assert_eq!(lrs.len(), 2);
    assert!(lrs[1] < lrs[0]);
}

#[test]
fn closed_worker_refuses_to_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let args = WorkerArgs {
        output_root: dir.path().to_path_buf(),
        ..WorkerArgs::default()
    };
    let mut trainer = Trainer::new(args, &DeepLioConfig::deepio(), Vec::new()).expect("trainer");
    trainer.close().expect("close");
    assert!(trainer.run().is_err());
}
