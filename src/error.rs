//! Error types shared by the network and worker modules.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised while building, running or training a DeepLIO network.
#[derive(Error, Debug)]
pub enum DeepLioError {
    #[error("tensor operation failed: {0}")]
    Candle(#[from] candle_core::Error),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to create directory {path}: {source}")]
    CreateDir { path: PathBuf, source: std::io::Error },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize metrics: {0}")]
    Json(#[from] serde_json::Error),
    #[error("not implemented: {0}")]
    NotImplemented(String),
    #[error("network used before initialize() was called")]
    NotInitialized,
    #[error("no feature stage available: {0}")]
    MissingStage(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("worker is closed")]
    WorkerClosed,
    #[error("data worker {0} panicked")]
    DataWorkerPanicked(usize),
}

pub type Result<T> = std::result::Result<T, DeepLioError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_implemented_message() {
        let err = DeepLioError::NotImplemented("fusion type 'sum'".to_string());
        assert_eq!(format!("{}", err), "not implemented: fusion type 'sum'");
    }

    #[test]
    fn test_candle_error_converts() {
        let err: DeepLioError = candle_core::Error::Msg("bad shape".to_string()).into();
        assert!(matches!(err, DeepLioError::Candle(_)));
    }
}
