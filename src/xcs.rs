// src/xcs.rs
//
// Run context: owns the configuration, the population, the RNG, the
// step-scoped match/action sets and the trial-scoped state used by the RL
// driver in `rl`. Nothing here is global; independent runs are independent
// values.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::classifier::Classifier;
use crate::clset::ClassifierSet;
use crate::config::Config;
use crate::error::{ConfigError, XcsError};
use crate::pa::PredictionArray;
use crate::persist::{self, StateReader, StateWriter};
use crate::population::{ClassifierId, Population};
use crate::random;
use crate::rl::TrialState;

/// Scalar run statistics persisted ahead of the parameters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunState {
    /// Explore steps taken so far.
    pub time: u32,
    /// Running mean of per-trial system error.
    pub error: f64,
    /// Running mean match-set numerosity.
    pub mset_size: f64,
    /// Running mean fraction of the population that matched.
    pub mfrac: f64,
    /// Whether the current trial explores.
    pub explore: bool,
}

pub struct Xcs {
    pub(crate) cfg: Config,
    pub(crate) run: RunState,
    pub(crate) pop: Population,
    pub(crate) rng: ChaCha8Rng,
    pub(crate) pa: PredictionArray,
    pub(crate) mset: ClassifierSet,
    pub(crate) aset: ClassifierSet,
    pub(crate) trial: TrialState,
    #[cfg(feature = "parallel")]
    pub(crate) pool: Option<rayon::ThreadPool>,
}

#[cfg(feature = "parallel")]
fn build_pool(cfg: &Config) -> Option<rayon::ThreadPool> {
    match rayon::ThreadPoolBuilder::new()
        .num_threads(cfg.general.num_threads.max(1) as usize)
        .build()
    {
        Ok(pool) => Some(pool),
        Err(e) => {
            tracing::warn!(error = %e, "could not build thread pool; using the global pool");
            None
        }
    }
}

impl Xcs {
    /// Validate `cfg`, seed the RNG and (if `pop_init`) the population.
    pub fn new(mut cfg: Config) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let mut rng = ChaCha8Rng::seed_from_u64(cfg.seed);
        if cfg.cond.gp_cons.len() != cfg.cond.gp_num_cons {
            let (min, max) = (cfg.cond.min, cfg.cond.max);
            cfg.cond.gp_cons = (0..cfg.cond.gp_num_cons)
                .map(|_| random::uniform(&mut rng, min, max))
                .collect();
        }
        let mut pop = Population::new();
        if cfg.general.pop_init {
            pop.seed_random(&cfg, &mut rng, 0);
        }
        let run = RunState {
            error: cfg.cl.eps_0,
            ..RunState::default()
        };
        info!(
            x_dim = cfg.x_dim,
            n_actions = cfg.n_actions,
            pop_size = cfg.general.pop_size,
            condition = %cfg.cond.kind,
            prediction = %cfg.pred.kind,
            action = %cfg.act.kind,
            "initialised run"
        );
        Ok(Self::assemble(cfg, run, pop, rng))
    }

    fn assemble(cfg: Config, run: RunState, pop: Population, rng: ChaCha8Rng) -> Self {
        Self {
            pa: PredictionArray::new(cfg.n_actions),
            #[cfg(feature = "parallel")]
            pool: build_pool(&cfg),
            cfg,
            run,
            pop,
            rng,
            mset: ClassifierSet::new(),
            aset: ClassifierSet::new(),
            trial: TrialState::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn run_state(&self) -> &RunState {
        &self.run
    }

    pub fn time(&self) -> u32 {
        self.run.time
    }

    pub fn explore(&self) -> bool {
        self.run.explore
    }

    pub fn set_explore(&mut self, explore: bool) {
        self.run.explore = explore;
    }

    pub fn population(&self) -> &Population {
        &self.pop
    }

    pub fn population_mut(&mut self) -> &mut Population {
        &mut self.pop
    }

    /// Add an externally built classifier to the population.
    pub fn insert_classifier(&mut self, cl: Classifier) -> ClassifierId {
        self.pop.insert(cl)
    }

    pub fn prediction_array(&self) -> &PredictionArray {
        &self.pa
    }

    pub fn match_set(&self) -> &ClassifierSet {
        &self.mset
    }

    pub fn action_set(&self) -> &ClassifierSet {
        &self.aset
    }

    /// Classifiers deleted during the current trial.
    pub fn kill_set(&self) -> &ClassifierSet {
        &self.trial.kset
    }

    #[cfg(feature = "parallel")]
    pub(crate) fn build_pa(&mut self, x: &[f64]) {
        let (cfg, pop, mset) = (&self.cfg, &self.pop, &self.mset);
        let pa = &mut self.pa;
        match &self.pool {
            Some(pool) => pool.install(|| pa.build(cfg, pop, mset, x)),
            None => pa.build(cfg, pop, mset, x),
        }
    }

    #[cfg(not(feature = "parallel"))]
    pub(crate) fn build_pa(&mut self, x: &[f64]) {
        self.pa.build(&self.cfg, &self.pop, &self.mset, x);
    }

    /// Population as a JSON array of classifiers.
    pub fn population_json(&self) -> serde_json::Value {
        let cls: Vec<serde_json::Value> = self.pop.iter().map(|(_, cl)| cl.to_json()).collect();
        json!({ "classifiers": cls })
    }

    /// Write run state, parameters and population to `w`.
    pub fn save_to<W: Write>(&self, w: W) -> Result<usize, XcsError> {
        let mut w = StateWriter::new(w);
        persist::save_params(&mut w, &self.run, &self.cfg)?;
        self.pop.save(&mut w)?;
        w.flush()?;
        Ok(w.written())
    }

    /// Full checkpoint to `path`. Returns bytes written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<usize, XcsError> {
        let file = File::create(path.as_ref()).map_err(crate::error::PersistError::from)?;
        let n = self.save_to(BufWriter::new(file))?;
        info!(path = %path.as_ref().display(), bytes = n, "saved run");
        Ok(n)
    }

    /// Rebuild a run from `save_to` output. The RNG restarts from the
    /// saved seed; step and trial state start empty.
    pub fn load_from<R: Read>(r: R) -> Result<Self, XcsError> {
        let mut r = StateReader::new(r);
        let (run, cfg) = persist::load_params(&mut r)?;
        cfg.validate()?;
        let pop = Population::load(&mut r, &cfg)?;
        let rng = ChaCha8Rng::seed_from_u64(cfg.seed);
        Ok(Self::assemble(cfg, run, pop, rng))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, XcsError> {
        let file = File::open(path.as_ref()).map_err(crate::error::PersistError::from)?;
        let xcs = Self::load_from(BufReader::new(file))?;
        info!(
            path = %path.as_ref().display(),
            classifiers = xcs.pop.len(),
            "loaded run"
        );
        Ok(xcs)
    }
}

impl std::fmt::Debug for Xcs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Xcs")
            .field("run", &self.run)
            .field("classifiers", &self.pop.len())
            .field("numerosity", &self.pop.num_sum())
            .finish()
    }
}
