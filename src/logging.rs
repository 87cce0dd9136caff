// src/logging.rs
//
// Per-trial telemetry sinks.
// - EventSink: trait used by the experiment loop
// - NoopSink:  discards all records
// - FileSink:  one JSON object per trial (JSONL)
//
// Aggregate progress goes through `tracing`; sinks are for raw per-trial
// traces that would be too noisy as log lines.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::rl::TrialOutcome;
use crate::xcs::Xcs;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    /// Index of the explore/exploit pair.
    pub trial: u32,
    pub explore: bool,
    pub performance: f64,
    pub error: f64,
    pub steps: u32,
    pub time: u32,
    pub pop_num: u32,
    pub pop_len: usize,
}

impl TrialRecord {
    pub fn new(trial: u32, explore: bool, outcome: &TrialOutcome, xcs: &Xcs) -> Self {
        Self {
            trial,
            explore,
            performance: outcome.performance,
            error: outcome.error,
            steps: outcome.steps,
            time: xcs.time(),
            pop_num: xcs.population().num_sum(),
            pop_len: xcs.population().len(),
        }
    }
}

pub trait EventSink {
    fn log_trial(&mut self, record: &TrialRecord);

    fn flush(&mut self) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn log_trial(&mut self, _record: &TrialRecord) {}
}

/// JSONL file sink. I/O failures are dropped so a full disk never stops a
/// run.
pub struct FileSink {
    writer: BufWriter<File>,
    explore: bool,
}

impl FileSink {
    /// Create (truncating) `path`. Only exploit trials are written.
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            explore: false,
        })
    }

    /// Also write explore trials.
    pub fn with_explore(mut self, explore: bool) -> Self {
        self.explore = explore;
        self
    }
}

impl EventSink for FileSink {
    fn log_trial(&mut self, record: &TrialRecord) {
        if record.explore && !self.explore {
            return;
        }
        if serde_json::to_writer(&mut self.writer, record).is_ok() {
            let _ = self.writer.write_all(b"\n");
        }
    }

    fn flush(&mut self) {
        let _ = self.writer.flush();
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(trial: u32, explore: bool) -> TrialRecord {
        TrialRecord {
            trial,
            explore,
            performance: 1.0,
            error: 0.25,
            steps: 1,
            time: trial,
            pop_num: 10,
            pop_len: 8,
        }
    }

    #[test]
    fn test_file_sink_writes_exploit_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trials.jsonl");
        {
            let mut sink = FileSink::create(&path).unwrap();
            sink.log_trial(&record(0, true));
            sink.log_trial(&record(0, false));
            sink.log_trial(&record(1, false));
        }
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let back: TrialRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(back, record(1, false));
    }

    #[test]
    fn test_file_sink_with_explore_keeps_everything() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("all.jsonl");
        let mut sink = FileSink::create(&path).unwrap().with_explore(true);
        sink.log_trial(&record(0, true));
        sink.log_trial(&record(0, false));
        sink.flush();
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 2);
    }
}
