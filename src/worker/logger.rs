//! Per-worker application log file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{log, Level, LevelFilter};

use crate::error::Result;

/// Writes `"{timestamp} [LEVEL] message"` lines to a file and forwards every
/// message to the `log` facade.
pub struct AppLogger {
    path: PathBuf,
    level: LevelFilter,
    writer: Mutex<Option<BufWriter<File>>>,
}

impl AppLogger {
    pub fn open<P: AsRef<Path>>(path: P, level: LevelFilter) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            level,
            writer: Mutex::new(Some(BufWriter::new(file))),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }

    pub fn is_closed(&self) -> bool {
        self.writer
            .lock()
            .map(|w| w.is_none())
            .unwrap_or_else(|e| e.into_inner().is_none())
    }

    fn write(&self, level: Level, msg: &str) {
        log!(level, "{}", msg);
        if level > self.level {
            return;
        }
        let mut guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(writer) = guard.as_mut() {
            let ts = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
            // a failed log line must not abort a training run
            let _ = writeln!(writer, "{} [{}] {}", ts, level, msg);
        }
    }

    pub fn info(&self, msg: &str) {
        self.write(Level::Info, msg);
    }

    pub fn debug(&self, msg: &str) {
        self.write(Level::Debug, msg);
    }

    pub fn warn(&self, msg: &str) {
        self.write(Level::Warn, msg);
    }

    /// Progress output; logged at info level.
    pub fn print(&self, msg: &str) {
        self.info(msg);
    }

    /// Flush and release the file. Later messages only reach the `log` facade.
    pub fn close(&self) -> Result<()> {
        let mut guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(mut writer) = guard.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl Drop for AppLogger {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_respect_level() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.log");
        let logger = AppLogger::open(&path, LevelFilter::Info).unwrap();
        logger.info("epoch started");
        logger.debug("hidden detail");
        logger.warn("slow batch");
        logger.close().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("[INFO] epoch started"));
        assert!(lines[1].ends_with("[WARN] slow batch"));
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let logger = AppLogger::open(dir.path().join("a.log"), LevelFilter::Debug).unwrap();
        logger.debug("x");
        logger.close().unwrap();
        logger.close().unwrap();
        assert!(logger.is_closed());
        logger.info("after close");
        let text = std::fs::read_to_string(logger.path()).unwrap();
        assert_eq!(text.lines().count(), 1);
    }
}
