//! Scalar metrics sink: one JSON object per line in `scalars.jsonl`.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const SCALARS_FILE: &str = "scalars.jsonl";

/// One logged scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarRecord {
    pub tag: String,
    pub value: f64,
    pub step: usize,
    /// Seconds since the Unix epoch
    pub wall_time: f64,
}

pub struct MetricsWriter {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl MetricsWriter {
    pub fn open<P: AsRef<Path>>(runs_dir: P) -> Result<Self> {
        let path = runs_dir.as_ref().join(SCALARS_FILE);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            log::warn!("metrics sink closed, dropping scalar {}", tag);
            return Ok(());
        };
        let wall_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        let record = ScalarRecord {
            tag: tag.to_string(),
            value,
            step,
            wall_time,
        };
        serde_json::to_writer(&mut *writer, &record)?;
        writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        self.flush()?;
        self.writer = None;
        Ok(())
    }

    /// Parse every record of a `scalars.jsonl` file.
    pub fn read_scalars<P: AsRef<Path>>(path: P) -> Result<Vec<ScalarRecord>> {
        let text = std::fs::read_to_string(path)?;
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(Into::into))
            .collect()
    }
}

impl Drop for MetricsWriter {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalars_are_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = MetricsWriter::open(dir.path()).unwrap();
        writer.add_scalar("train/loss", 0.5, 0).unwrap();
        writer.add_scalar("train/loss", 0.25, 1).unwrap();
        writer.close().unwrap();

        let records = MetricsWriter::read_scalars(dir.path().join(SCALARS_FILE)).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].tag, "train/loss");
        assert_eq!(records[1].value, 0.25);
        assert_eq!(records[1].step, 1);
        assert!(records[0].wall_time > 0.0);
    }

    #[test]
    fn test_add_after_close_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = MetricsWriter::open(dir.path()).unwrap();
        writer.close().unwrap();
        writer.add_scalar("x", 1.0, 0).unwrap();
        writer.close().unwrap();
        assert!(MetricsWriter::read_scalars(writer.path()).unwrap().is_empty());
    }
}
