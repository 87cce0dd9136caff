// src/callback.rs
//
// Hooks invoked by `Xcs::experiment` after each performance window.
// - Callback: trait; `run` returns true to stop the experiment.
// - SnapshotCallback: checkpoints the full run to `<dir>/<time>.bin`.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{ConfigError, XcsError};
use crate::metrics::Metrics;
use crate::xcs::Xcs;

pub trait Callback {
    /// Called once per performance window. Returning `Ok(true)` stops the
    /// experiment after the current window.
    fn run(&mut self, xcs: &Xcs, metrics: &Metrics) -> Result<bool, XcsError>;

    /// Called once when the experiment ends, whether stopped early or not.
    fn finish(&mut self, _xcs: &Xcs, _metrics: &Metrics) -> Result<(), XcsError> {
        Ok(())
    }
}

/// Writes a checkpoint every `save_freq` windows. A frequency of zero only
/// saves on `finish`. Never asks the run to stop.
#[derive(Debug)]
pub struct SnapshotCallback {
    dir: PathBuf,
    save_freq: u64,
    verbose: bool,
    windows: u64,
    last_time: Option<u32>,
    saved: Vec<PathBuf>,
}

impl SnapshotCallback {
    pub fn new<P: AsRef<Path>>(dir: P, save_freq: i64, verbose: bool) -> Result<Self, ConfigError> {
        let save_freq = u64::try_from(save_freq).map_err(|_| ConfigError::Invalid {
            field: "save_freq",
            message: format!("must be >= 0, got {save_freq}"),
        })?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
            save_freq,
            verbose,
            windows: 0,
            last_time: None,
            saved: Vec::new(),
        })
    }

    /// Paths written so far, oldest first.
    pub fn saved(&self) -> &[PathBuf] {
        &self.saved
    }

    fn snapshot(&mut self, xcs: &Xcs) -> Result<(), XcsError> {
        if self.last_time == Some(xcs.time()) {
            return Ok(());
        }
        let path = self.dir.join(format!("{}.bin", xcs.time()));
        let bytes = xcs.save(&path)?;
        if self.verbose {
            info!(path = %path.display(), bytes, "snapshot");
        }
        self.last_time = Some(xcs.time());
        self.saved.push(path);
        Ok(())
    }
}

impl Callback for SnapshotCallback {
    fn run(&mut self, xcs: &Xcs, _metrics: &Metrics) -> Result<bool, XcsError> {
        self.windows += 1;
        if self.save_freq > 0 && self.windows % self.save_freq == 0 {
            self.snapshot(xcs)?;
        }
        Ok(false)
    }

    fn finish(&mut self, xcs: &Xcs, _metrics: &Metrics) -> Result<(), XcsError> {
        self.snapshot(xcs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn xcs() -> Xcs {
        let mut cfg = Config::new(2, 1, 2);
        cfg.general.pop_size = 5;
        Xcs::new(cfg).unwrap()
    }

    #[test]
    fn test_negative_frequency_rejected() {
        let err = SnapshotCallback::new("/tmp", -1, false).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "save_freq", .. }));
    }

    #[test]
    fn test_saves_every_nth_window_and_once_at_finish() {
        let dir = tempfile::tempdir().unwrap();
        let mut cb = SnapshotCallback::new(dir.path(), 2, false).unwrap();
        let mut x = xcs();
        let m = Metrics::default();
        assert!(!cb.run(&x, &m).unwrap());
        assert!(cb.saved().is_empty());
        assert!(!cb.run(&x, &m).unwrap());
        assert_eq!(cb.saved().len(), 1);
        // same time step: finish does not write a duplicate
        cb.finish(&x, &m).unwrap();
        assert_eq!(cb.saved().len(), 1);

        x.run.time = 7;
        cb.finish(&x, &m).unwrap();
        assert_eq!(cb.saved().len(), 2);
        assert!(dir.path().join("7.bin").is_file());
    }

    #[test]
    fn test_zero_frequency_only_saves_at_finish() {
        let dir = tempfile::tempdir().unwrap();
        let mut cb = SnapshotCallback::new(dir.path(), 0, true).unwrap();
        let x = xcs();
        let m = Metrics::default();
        for _ in 0..5 {
            cb.run(&x, &m).unwrap();
        }
        assert!(cb.saved().is_empty());
        cb.finish(&x, &m).unwrap();
        let back = Xcs::load(&cb.saved()[0]).unwrap();
        assert_eq!(back.population().num_sum(), 5);
    }
}
