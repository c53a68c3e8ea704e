//! Running metrics and progress lines printed during an epoch.

use std::fmt;

use super::logger::AppLogger;

/// Computes and stores the average and current value of a scalar.
#[derive(Debug, Clone)]
pub struct AverageMeter {
    pub name: String,
    pub val: f64,
    pub sum: f64,
    pub count: usize,
    pub avg: f64,
    precision: usize,
}

impl AverageMeter {
    pub fn new(name: &str) -> Self {
        Self::with_precision(name, 6)
    }

    pub fn with_precision(name: &str, precision: usize) -> Self {
        Self {
            name: name.to_string(),
            val: 0.0,
            sum: 0.0,
            count: 0,
            avg: 0.0,
            precision,
        }
    }

    pub fn reset(&mut self) {
        self.val = 0.0;
        self.sum = 0.0;
        self.count = 0;
        self.avg = 0.0;
    }

    /// Record `val` as the mean of `n` samples.
    pub fn update(&mut self, val: f64, n: usize) {
        self.val = val;
        self.sum += val * n as f64;
        self.count += n;
        if self.count > 0 {
            self.avg = self.sum / self.count as f64;
        }
    }
}

impl fmt::Display for AverageMeter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:.p$} ({:.p$})",
            self.name,
            self.val,
            self.avg,
            p = self.precision
        )
    }
}

/// Latest prediction next to its ground truth, for display only.
#[derive(Debug, Clone)]
pub struct PredDisplay {
    pub name: String,
    pub pred: Option<Vec<f32>>,
    pub gt: Option<Vec<f32>>,
}

impl Default for PredDisplay {
    fn default() -> Self {
        Self::new("Preds-vs-GT")
    }
}

impl PredDisplay {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            pred: None,
            gt: None,
        }
    }

    pub fn update(&mut self, pred: Vec<f32>, gt: Vec<f32>) {
        self.pred = Some(pred);
        self.gt = Some(gt);
    }
}

fn fmt_values(values: &Option<Vec<f32>>) -> String {
    match values {
        Some(v) => format!(
            "[{}]",
            v.iter().map(|x| format!("{:.4}", x)).collect::<Vec<_>>().join(", ")
        ),
        None => "None".to_string(),
    }
}

impl fmt::Display for PredDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} -> {}", self.name, fmt_values(&self.pred), fmt_values(&self.gt))
    }
}

/// Formats `prefix[batch/total]` followed by every meter, tab separated.
#[derive(Debug, Clone)]
pub struct ProgressMeter {
    num_batches: usize,
    width: usize,
    prefix: String,
}

impl ProgressMeter {
    pub fn new(num_batches: usize, prefix: &str) -> Self {
        Self {
            num_batches,
            width: num_batches.to_string().len(),
            prefix: prefix.to_string(),
        }
    }

    pub fn format(&self, batch: usize, meters: &[&dyn fmt::Display]) -> String {
        let mut entries = vec![format!(
            "{}[{:>w$}/{}]",
            self.prefix,
            batch,
            self.num_batches,
            w = self.width
        )];
        entries.extend(meters.iter().map(|m| m.to_string()));
        entries.join("\t")
    }

    pub fn display(&self, logger: &AppLogger, batch: usize, meters: &[&dyn fmt::Display]) {
        logger.print(&self.format(batch, meters));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_meter_weighted_mean() {
        let mut meter = AverageMeter::new("Loss");
        let updates = [(1.0, 2), (4.0, 1), (0.5, 4)];
        for (v, n) in updates {
            meter.update(v, n);
        }
        let expected = (1.0 * 2.0 + 4.0 + 0.5 * 4.0) / 7.0;
        assert!((meter.avg - expected).abs() < 1e-12);
        assert_eq!(meter.val, 0.5);
        assert_eq!(meter.count, 7);
        assert!((meter.avg - meter.sum / meter.count as f64).abs() < 1e-12);
    }

    #[test]
    fn test_average_meter_reset() {
        let mut meter = AverageMeter::new("Loss");
        meter.update(3.0, 3);
        meter.reset();
        assert_eq!(meter.val, 0.0);
        assert_eq!(meter.sum, 0.0);
        assert_eq!(meter.count, 0);
        assert_eq!(meter.avg, 0.0);
    }

    #[test]
    fn test_average_meter_display() {
        let mut meter = AverageMeter::with_precision("Time", 3);
        meter.update(0.5, 1);
        meter.update(1.5, 1);
        assert_eq!(meter.to_string(), "Time 1.500 (1.000)");
    }

    #[test]
    fn test_pred_display() {
        let mut pred = PredDisplay::default();
        assert_eq!(pred.to_string(), "Preds-vs-GT None -> None");
        pred.update(vec![0.1, 0.2], vec![0.0, 0.25]);
        assert_eq!(pred.to_string(), "Preds-vs-GT [0.1000, 0.2000] -> [0.0000, 0.2500]");
    }

    #[test]
    fn test_progress_meter_pads_batch_index() {
        let progress = ProgressMeter::new(120, "Epoch: [3]");
        let mut loss = AverageMeter::with_precision("Loss", 2);
        loss.update(0.25, 1);
        let line = progress.format(7, &[&loss]);
        assert_eq!(line, "Epoch: [3][  7/120]\tLoss 0.25 (0.25)");
    }
}
