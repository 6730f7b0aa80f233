//! Aggregation of a benchmark's sample set.

use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::error::BenchError;
use crate::options::{Mode, TimeUnit};

/// Confidence level of the reported error margin.
pub const CONFIDENCE: f64 = 0.999;

/// Percentile ladder reported in sample-distribution mode.
pub const PERCENTILES: [f64; 8] = [0.0, 0.5, 0.9, 0.95, 0.99, 0.999, 0.9999, 1.0];

/// Statistics over per-operation samples, all in nanoseconds.
#[derive(Clone, Debug, PartialEq)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
    /// Half-width of the confidence interval; `None` below two samples.
    pub error: Option<f64>,
    /// `(p, value)` pairs, empty unless requested.
    pub percentiles: Vec<(f64, f64)>,
}

/// Value at `ceil(p * n) - 1`, clamped into the slice.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let n = sorted.len();
    let rank = (p * n as f64).ceil() as i64 - 1;
    let idx = rank.clamp(0, n as i64 - 1) as usize;
    sorted[idx]
}

fn error_margin(std_dev: f64, n: usize) -> Result<Option<f64>, BenchError> {
    if n < 2 {
        return Ok(None);
    }
    let dist = StudentsT::new(0.0, 1.0, (n - 1) as f64)
        .map_err(|e| BenchError::Stats(e.to_string()))?;
    let t = dist.inverse_cdf(1.0 - (1.0 - CONFIDENCE) / 2.0);
    Ok(Some(t * std_dev / (n as f64).sqrt()))
}

pub fn summarize(samples: &[f64], with_percentiles: bool) -> Result<Summary, BenchError> {
    let n = samples.len();
    if n == 0 {
        return Err(BenchError::Stats("empty sample set".to_string()));
    }

    let mean = samples.iter().sum::<f64>() / n as f64;
    let std_dev = if n < 2 {
        0.0
    } else {
        let ss: f64 = samples.iter().map(|s| (s - mean) * (s - mean)).sum();
        (ss / (n - 1) as f64).sqrt()
    };

    // Stable sort keeps equal samples in temporal order.
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let percentiles = if with_percentiles {
        PERCENTILES
            .iter()
            .map(|&p| (p, percentile(&sorted, p)))
            .collect()
    } else {
        Vec::new()
    };

    Ok(Summary {
        count: n,
        mean,
        min: sorted[0],
        max: sorted[n - 1],
        std_dev,
        error: error_margin(std_dev, n)?,
        percentiles,
    })
}

/// A summary expressed in a mode's reporting unit.
#[derive(Clone, Debug, PartialEq)]
pub struct Score {
    pub value: f64,
    pub error: Option<f64>,
    pub unit: String,
}

pub fn score(summary: &Summary, mode: Mode, unit: TimeUnit) -> Score {
    let scale = unit.as_nanos();
    match mode {
        Mode::Throughput => {
            if summary.mean <= 0.0 {
                return Score {
                    value: 0.0,
                    error: None,
                    unit: format!("ops/{}", unit.label()),
                };
            }
            let value = scale / summary.mean;
            Score {
                value,
                error: summary.error.map(|e| value * e / summary.mean),
                unit: format!("ops/{}", unit.label()),
            }
        }
        _ => Score {
            value: summary.mean / scale,
            error: summary.error.map(|e| e / scale),
            unit: format!("{}/op", unit.label()),
        },
    }
}
