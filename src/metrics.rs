// src/metrics.rs
//
// Run metrics.
// - OnlineStats: Welford running mean and variance.
// - Window: one performance window of an experiment.
// - Metrics: every window recorded so far; what callbacks get to see.

use serde::{Deserialize, Serialize};

use crate::xcs::Xcs;

/// Streaming summary of a sample. Non-finite inputs are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnlineStats {
    n: u64,
    mean: f64,
    m2: f64,
}

impl OnlineStats {
    pub fn add(&mut self, x: f64) {
        if !x.is_finite() {
            return;
        }
        self.n += 1;
        let d = x - self.mean;
        self.mean += d / self.n as f64;
        self.m2 += d * (x - self.mean);
    }

    pub fn n(&self) -> u64 {
        self.n
    }

    /// Zero when empty.
    pub fn mean(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample standard deviation (n - 1 denominator).
    pub fn stddev(&self) -> f64 {
        if self.n <= 1 {
            0.0
        } else {
            (self.m2 / (self.n - 1) as f64).sqrt()
        }
    }
}

/// Snapshot taken at the end of a performance window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    /// Explore/exploit pairs completed when the window closed.
    pub trials: u32,
    /// Mean exploit performance over the window.
    pub performance: f64,
    /// Sample standard deviation of exploit performance over the window.
    pub performance_sd: f64,
    /// Mean exploit system error over the window.
    pub error: f64,
    pub error_sd: f64,
    pub pop_num: u32,
    pub pop_len: usize,
    pub mset_size: f64,
    pub mfrac: f64,
    pub time: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Metrics {
    windows: Vec<Window>,
}

impl Metrics {
    /// Close a window over the exploit `performance` and `error` samples.
    pub fn record(&mut self, trials: u32, performance: &OnlineStats, error: &OnlineStats, xcs: &Xcs) {
        let run = xcs.run_state();
        self.windows.push(Window {
            trials,
            performance: performance.mean(),
            performance_sd: performance.stddev(),
            error: error.mean(),
            error_sd: error.stddev(),
            pop_num: xcs.population().num_sum(),
            pop_len: xcs.population().len(),
            mset_size: run.mset_size,
            mfrac: run.mfrac,
            time: run.time,
        });
    }

    pub fn windows(&self) -> &[Window] {
        &self.windows
    }

    pub fn last(&self) -> Option<&Window> {
        self.windows.last()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Highest windowed performance seen.
    pub fn best_performance(&self) -> Option<f64> {
        self.windows
            .iter()
            .map(|w| w.performance)
            .fold(None, |best, p| Some(best.map_or(p, |b: f64| b.max(p))))
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
