// src/config.rs
//
// Central configuration for an xcsrl run.
// This is the single source of truth for every learning parameter
// (general, multi-step, rule discovery, subsumption, classifier,
// condition/prediction/action representation) plus the problem
// dimensions and the RNG seed.
//
// Defaults mirror the classic XCSF parameter set. Setters clamp
// out-of-range values to the nearest valid bound and log a warning
// instead of failing; `validate()` rejects structurally impossible runs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;
use crate::neural::Activation;

/// Build version reported alongside saved state.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Length of the fixed neuron-count arrays in the persisted layout.
pub const MAX_LAYERS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Input dimensionality.
    pub x_dim: usize,
    /// Payoff (prediction output) dimensionality.
    pub y_dim: usize,
    /// Number of discrete actions.
    pub n_actions: usize,
    /// Seed for the run's ChaCha8 generator.
    pub seed: u64,
    pub general: GeneralConfig,
    pub multistep: MultistepConfig,
    pub ea: EaConfig,
    pub subsumption: SubsumptionConfig,
    pub cl: ClassifierConfig,
    pub cond: ConditionConfig,
    pub pred: PredictionConfig,
    pub act: ActionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Worker threads for the parallel prediction-array build.
    pub num_threads: i32,
    /// Seed the population with random classifiers at start-up.
    pub pop_init: bool,
    /// Explore/exploit trial pairs run by an experiment.
    pub max_trials: u32,
    /// Trials per performance window.
    pub perf_trials: u32,
    /// Maximum sum of numerosities in the population.
    pub pop_size: u32,
    /// Error function used by the classifier error update.
    pub loss_func: LossFunc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultistepConfig {
    /// Step cap per trial.
    pub teletransportation: u32,
    /// Discount applied to the next step's best value.
    pub gamma: f64,
    /// Probability of a random action while exploring.
    pub p_explore: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EaConfig {
    pub select_type: SelectType,
    /// Fraction of the set that enters a tournament.
    pub select_size: f64,
    /// Mean time since last discovery needed before the EA fires.
    pub theta_ea: f64,
    /// Offspring produced per EA invocation.
    pub lambda: u32,
    /// Per-dimension swap probability used by crossover.
    pub p_crossover: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsumptionConfig {
    /// Absorb offspring into an accurate, more general parent.
    pub ea_subsumption: bool,
    /// Absorb action-set members into the most general subsumer.
    pub set_subsumption: bool,
    /// Experience required before a classifier may subsume.
    pub theta_sub: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Error below which a classifier counts as accurate.
    pub eps_0: f64,
    /// Accuracy fall-off multiplier.
    pub alpha: f64,
    /// Accuracy fall-off exponent.
    pub nu: f64,
    /// Learning rate for error, fitness and set-size updates.
    pub beta: f64,
    /// Fitness fraction below which deletion votes are inflated.
    pub delta: f64,
    /// Experience required before deletion votes are inflated.
    pub theta_del: u32,
    pub init_fitness: f64,
    pub init_error: f64,
    /// Offspring error multiplier.
    pub err_reduc: f64,
    /// Offspring fitness multiplier.
    pub fit_reduc: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionConfig {
    pub kind: ConditionType,
    /// Rate at which a rectangle centre tracks matched inputs.
    pub eta: f64,
    /// Lower bound of the input space.
    pub min: f64,
    /// Upper bound of the input space.
    pub max: f64,
    /// Minimum half-spread of a rectangle dimension.
    pub spread_min: f64,
    /// Size of the shared constants table.
    pub gp_num_cons: usize,
    /// Shared constants table, drawn in `[min, max]` at run start.
    pub gp_cons: Vec<f64>,
    /// Hidden neurons per layer for network representations.
    pub num_neurons: Vec<i32>,
    /// Hidden-neuron cap per layer when neurons evolve.
    pub max_neurons: Vec<i32>,
    /// Largest hidden-layer change a single mutation may make.
    pub max_neuron_grow: i32,
    pub evolve_weights: bool,
    pub evolve_neurons: bool,
    pub hidden_activation: Activation,
    pub output_activation: Activation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionConfig {
    pub kind: PredictionType,
    /// Self-adapt the NLMS learning rate.
    pub evolve_eta: bool,
    /// NLMS learning rate (upper bound when self-adapted).
    pub eta: f64,
    /// Re-initialise offspring predictions instead of inheriting them.
    pub reset: bool,
    /// Bias input for linear predictions.
    pub x0: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionConfig {
    pub kind: ActionType,
}

/// Condition representation, fixed for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionType {
    Rectangle,
    Neural,
}

/// Action representation, fixed for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    Integer,
    Neural,
}

/// Prediction representation, fixed for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictionType {
    Constant,
    NlmsLinear,
}

/// Parent selection scheme used by rule discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectType {
    Roulette,
    Tournament,
}

/// Classifier error function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LossFunc {
    Mae,
    Mse,
    Rmse,
}

/// Shared name/code table for the closed representation enums.
macro_rules! named_codes {
    ($ty:ident, $kind:literal, [$(($variant:ident, $code:literal, $name:literal)),+ $(,)?]) => {
        impl $ty {
            pub fn code(self) -> i32 {
                match self {
                    $($ty::$variant => $code,)+
                }
            }

            pub fn from_code(code: i32) -> Result<Self, ConfigError> {
                match code {
                    $($code => Ok($ty::$variant),)+
                    other => Err(ConfigError::UnknownRepresentation {
                        kind: $kind,
                        name: other.to_string(),
                        valid: Self::valid_names(),
                    }),
                }
            }

            pub fn as_str(self) -> &'static str {
                match self {
                    $($ty::$variant => $name,)+
                }
            }

            fn valid_names() -> String {
                [$($name),+].join(", ")
            }
        }

        impl FromStr for $ty {
            type Err = ConfigError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($name => Ok($ty::$variant),)+
                    _ => Err(ConfigError::UnknownRepresentation {
                        kind: $kind,
                        name: s.to_string(),
                        valid: Self::valid_names(),
                    }),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

named_codes!(ConditionType, "condition", [
    (Rectangle, 0, "ub_hyperrectangle"),
    (Neural, 1, "neural"),
]);

named_codes!(ActionType, "action", [
    (Integer, 0, "integer"),
    (Neural, 1, "neural"),
]);

named_codes!(PredictionType, "prediction", [
    (Constant, 0, "constant"),
    (NlmsLinear, 1, "nlms_linear"),
]);

named_codes!(SelectType, "selection", [
    (Roulette, 0, "roulette"),
    (Tournament, 1, "tournament"),
]);

named_codes!(LossFunc, "loss", [
    (Mae, 0, "mae"),
    (Mse, 1, "mse"),
    (Rmse, 2, "rmse"),
]);

impl LossFunc {
    /// Error between a prediction and a target of the same length.
    pub fn apply(self, pred: &[f64], y: &[f64]) -> f64 {
        let n = pred.len().min(y.len());
        if n == 0 {
            return 0.0;
        }
        let pairs = pred.iter().zip(y);
        match self {
            LossFunc::Mae => pairs.map(|(p, t)| (t - p).abs()).sum::<f64>() / n as f64,
            LossFunc::Mse => pairs.map(|(p, t)| (t - p).powi(2)).sum::<f64>() / n as f64,
            LossFunc::Rmse => (pairs.map(|(p, t)| (t - p).powi(2)).sum::<f64>() / n as f64).sqrt(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            x_dim: 1,
            y_dim: 1,
            n_actions: 2,
            seed: 0,
            general: GeneralConfig {
                num_threads: 8,
                pop_init: true,
                max_trials: 100_000,
                perf_trials: 1_000,
                pop_size: 2_000,
                loss_func: LossFunc::Mae,
            },
            multistep: MultistepConfig {
                teletransportation: 50,
                gamma: 0.95,
                p_explore: 0.9,
            },
            ea: EaConfig {
                select_type: SelectType::Roulette,
                select_size: 0.4,
                theta_ea: 50.0,
                lambda: 2,
                p_crossover: 0.8,
            },
            subsumption: SubsumptionConfig {
                ea_subsumption: false,
                set_subsumption: false,
                theta_sub: 100,
            },
            cl: ClassifierConfig {
                eps_0: 0.01,
                alpha: 0.1,
                nu: 5.0,
                beta: 0.1,
                delta: 0.1,
                theta_del: 20,
                init_fitness: 0.01,
                init_error: 0.0,
                err_reduc: 1.0,
                fit_reduc: 0.1,
            },
            cond: ConditionConfig {
                kind: ConditionType::Rectangle,
                eta: 0.0,
                min: 0.0,
                max: 1.0,
                spread_min: 0.1,
                gp_num_cons: 100,
                gp_cons: Vec::new(),
                num_neurons: vec![1],
                max_neurons: vec![10],
                max_neuron_grow: 1,
                evolve_weights: true,
                evolve_neurons: true,
                hidden_activation: Activation::Logistic,
                output_activation: Activation::Logistic,
            },
            pred: PredictionConfig {
                kind: PredictionType::NlmsLinear,
                evolve_eta: true,
                eta: 0.1,
                reset: false,
                x0: 1.0,
            },
            act: ActionConfig {
                kind: ActionType::Integer,
            },
        }
    }
}

/// Clamp `value` into `[min, max]`, warning when it had to move.
fn clamped<T>(name: &str, value: T, min: T, max: T) -> T
where
    T: PartialOrd + Copy + fmt::Display,
{
    if value < min {
        warn!(param = name, value = %value, min = %min, "parameter below minimum, clamping");
        min
    } else if value > max {
        warn!(param = name, value = %value, max = %max, "parameter above maximum, clamping");
        max
    } else {
        value
    }
}

/// Parse numeric override `key`, warning and returning None on failure.
fn env_override<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, raw = %raw, "could not parse environment override; using default");
            None
        }
    }
}

impl Config {
    /// Defaults for a problem of the given shape.
    pub fn new(x_dim: usize, y_dim: usize, n_actions: usize) -> Self {
        Self {
            x_dim,
            y_dim,
            n_actions,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Defaults plus any `XCSRL_*` environment overrides:
    ///
    ///   - XCSRL_SEED          (u64)
    ///   - XCSRL_POP_SIZE      (u32)
    ///   - XCSRL_MAX_TRIALS    (u32)
    ///   - XCSRL_PERF_TRIALS   (u32)
    ///   - XCSRL_P_EXPLORE     (f64)
    ///   - XCSRL_BETA          (f64)
    ///   - XCSRL_COND_TYPE     (ub_hyperrectangle | neural)
    ///   - XCSRL_ACT_TYPE      (integer | neural)
    ///   - XCSRL_PRED_TYPE     (constant | nlms_linear)
    ///
    /// Unparsable numbers are ignored with a warning and out-of-range ones
    /// are clamped. An unknown representation name is an error.
    pub fn from_env_or_default() -> Result<Self, ConfigError> {
        Self::from_overrides(|key| std::env::var(key).ok())
    }

    /// `from_env_or_default` over an arbitrary key lookup.
    pub fn from_overrides<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(v) = env_override::<u64>(&lookup, "XCSRL_SEED") {
            cfg.seed = v;
        }
        if let Some(v) = env_override::<u32>(&lookup, "XCSRL_POP_SIZE") {
            cfg.set_pop_size(v);
        }
        if let Some(v) = env_override::<u32>(&lookup, "XCSRL_MAX_TRIALS") {
            cfg.set_max_trials(v);
        }
        if let Some(v) = env_override::<u32>(&lookup, "XCSRL_PERF_TRIALS") {
            cfg.set_perf_trials(v);
        }
        if let Some(v) = env_override::<f64>(&lookup, "XCSRL_P_EXPLORE") {
            cfg.set_p_explore(v);
        }
        if let Some(v) = env_override::<f64>(&lookup, "XCSRL_BETA") {
            cfg.set_beta(v);
        }
        if let Some(name) = lookup("XCSRL_COND_TYPE") {
            cfg.set_condition_type(&name)?;
        }
        if let Some(name) = lookup("XCSRL_ACT_TYPE") {
            cfg.set_action_type(&name)?;
        }
        if let Some(name) = lookup("XCSRL_PRED_TYPE") {
            cfg.set_prediction_type(&name)?;
        }
        Ok(cfg)
    }

    /// Select the condition representation by name.
    pub fn set_condition_type(&mut self, name: &str) -> Result<(), ConfigError> {
        self.cond.kind = name.parse()?;
        Ok(())
    }

    /// Select the action representation by name.
    pub fn set_action_type(&mut self, name: &str) -> Result<(), ConfigError> {
        self.act.kind = name.parse()?;
        Ok(())
    }

    /// Select the prediction representation by name.
    pub fn set_prediction_type(&mut self, name: &str) -> Result<(), ConfigError> {
        self.pred.kind = name.parse()?;
        Ok(())
    }

    pub fn set_num_threads(&mut self, v: i32) {
        self.general.num_threads = clamped("num_threads", v, 1, 1000);
    }

    pub fn set_pop_size(&mut self, v: u32) {
        self.general.pop_size = clamped("pop_size", v, 1, i32::MAX as u32);
    }

    pub fn set_max_trials(&mut self, v: u32) {
        self.general.max_trials = clamped("max_trials", v, 1, i32::MAX as u32);
    }

    pub fn set_perf_trials(&mut self, v: u32) {
        self.general.perf_trials = clamped("perf_trials", v, 1, i32::MAX as u32);
    }

    pub fn set_teletransportation(&mut self, v: u32) {
        self.multistep.teletransportation = clamped("teletransportation", v, 1, i32::MAX as u32);
    }

    pub fn set_gamma(&mut self, v: f64) {
        self.multistep.gamma = clamped("gamma", v, 0.0, 1.0);
    }

    pub fn set_p_explore(&mut self, v: f64) {
        self.multistep.p_explore = clamped("p_explore", v, 0.0, 1.0);
    }

    pub fn set_beta(&mut self, v: f64) {
        self.cl.beta = clamped("beta", v, 0.0, 1.0);
    }

    pub fn set_eps_0(&mut self, v: f64) {
        self.cl.eps_0 = clamped("eps_0", v, 0.0, f64::MAX);
    }

    pub fn set_theta_ea(&mut self, v: f64) {
        self.ea.theta_ea = clamped("theta_ea", v, 0.0, f64::MAX);
    }

    pub fn set_lambda(&mut self, v: u32) {
        self.ea.lambda = clamped("lambda", v, 1, i32::MAX as u32);
    }

    pub fn set_p_crossover(&mut self, v: f64) {
        self.ea.p_crossover = clamped("p_crossover", v, 0.0, 1.0);
    }

    pub fn set_select_size(&mut self, v: f64) {
        self.ea.select_size = clamped("select_size", v, 0.0, 1.0);
    }

    pub fn set_spread_min(&mut self, v: f64) {
        self.cond.spread_min = clamped("spread_min", v, 0.0, f64::MAX);
    }

    /// Reject runs that cannot start. Called by `Xcs::new`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive: [(&'static str, i64); 9] = [
            ("x_dim", self.x_dim as i64),
            ("y_dim", self.y_dim as i64),
            ("n_actions", self.n_actions as i64),
            ("pop_size", self.general.pop_size as i64),
            ("max_trials", self.general.max_trials as i64),
            ("perf_trials", self.general.perf_trials as i64),
            ("teletransportation", self.multistep.teletransportation as i64),
            ("lambda", self.ea.lambda as i64),
            ("gp_num_cons", self.cond.gp_num_cons as i64),
        ];
        for (field, value) in positive {
            if value < 1 {
                return Err(ConfigError::NonPositive { field, value });
            }
        }
        if !(self.cond.min < self.cond.max) {
            return Err(ConfigError::Invalid {
                field: "cond.min/cond.max",
                message: format!("min {} must be below max {}", self.cond.min, self.cond.max),
            });
        }
        if self.cond.spread_min < 0.0 {
            return Err(ConfigError::Invalid {
                field: "cond.spread_min",
                message: format!("{} is negative", self.cond.spread_min),
            });
        }
        if self.cl.beta <= 0.0 || self.cl.beta > 1.0 {
            return Err(ConfigError::Invalid {
                field: "cl.beta",
                message: format!("{} is outside (0, 1]", self.cl.beta),
            });
        }
        if self.cl.eps_0 <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "cl.eps_0",
                message: format!("{} must be positive", self.cl.eps_0),
            });
        }
        validate_layers("cond.num_neurons", &self.cond.num_neurons)?;
        validate_layers("cond.max_neurons", &self.cond.max_neurons)?;
        if self.cond.num_neurons[0] > self.cond.max_neurons[0] {
            return Err(ConfigError::Invalid {
                field: "cond.num_neurons",
                message: "initial neurons exceed the cap".to_string(),
            });
        }
        Ok(())
    }

    /// Pretty JSON dump of the whole parameter tree.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

fn validate_layers(field: &'static str, layers: &[i32]) -> Result<(), ConfigError> {
    if layers.is_empty() || layers.len() > MAX_LAYERS || layers.iter().any(|&n| n < 1) {
        return Err(ConfigError::Invalid {
            field,
            message: format!("expected 1..={} positive layer sizes, got {:?}", MAX_LAYERS, layers),
        });
    }
    Ok(())
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "VERSION={}, X_DIM={}, Y_DIM={}, N_ACTIONS={}, SEED={}, POP_SIZE={}, POP_INIT={}, \
             MAX_TRIALS={}, PERF_TRIALS={}, LOSS_FUNC={}, TELETRANSPORTATION={}, GAMMA={}, \
             P_EXPLORE={}, EA_SELECT_TYPE={}, EA_SELECT_SIZE={}, THETA_EA={}, LAMBDA={}, \
             P_CROSSOVER={}, EA_SUBSUMPTION={}, SET_SUBSUMPTION={}, THETA_SUB={}, E0={}, \
             ALPHA={}, NU={}, BETA={}, DELTA={}, THETA_DEL={}, INIT_FITNESS={}, INIT_ERROR={}, \
             ERR_REDUC={}, FIT_REDUC={}, COND_TYPE={}, COND_ETA={}, COND_MIN={}, COND_MAX={}, \
             COND_SPREAD_MIN={}, GP_NUM_CONS={}, PRED_TYPE={}, PRED_EVOLVE_ETA={}, PRED_ETA={}, \
             PRED_RESET={}, PRED_X0={}, ACT_TYPE={}",
            VERSION,
            self.x_dim,
            self.y_dim,
            self.n_actions,
            self.seed,
            self.general.pop_size,
            self.general.pop_init,
            self.general.max_trials,
            self.general.perf_trials,
            self.general.loss_func,
            self.multistep.teletransportation,
            self.multistep.gamma,
            self.multistep.p_explore,
            self.ea.select_type,
            self.ea.select_size,
            self.ea.theta_ea,
            self.ea.lambda,
            self.ea.p_crossover,
            self.subsumption.ea_subsumption,
            self.subsumption.set_subsumption,
            self.subsumption.theta_sub,
            self.cl.eps_0,
            self.cl.alpha,
            self.cl.nu,
            self.cl.beta,
            self.cl.delta,
            self.cl.theta_del,
            self.cl.init_fitness,
            self.cl.init_error,
            self.cl.err_reduc,
            self.cl.fit_reduc,
            self.cond.kind,
            self.cond.eta,
            self.cond.min,
            self.cond.max,
            self.cond.spread_min,
            self.cond.gp_num_cons,
            self.pred.kind,
            self.pred.evolve_eta,
            self.pred.eta,
            self.pred.reset,
            self.pred.x0,
            self.act.kind,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let cfg = Config::new(2, 1, 2);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.general.pop_size, 2_000);
        assert!((cfg.multistep.gamma - 0.95).abs() < 1e-12);
        assert_eq!(cfg.cond.kind, ConditionType::Rectangle);
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let cfg = Config::new(0, 1, 2);
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::NonPositive { field: "x_dim", value: 0 })
        );
        let cfg = Config::new(2, 1, 0);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::NonPositive { field: "n_actions", .. })
        ));
    }

    #[test]
    fn test_unknown_condition_name_is_config_error() {
        let mut cfg = Config::default();
        let err = cfg.set_condition_type("hyperellipsoid").unwrap_err();
        match err {
            ConfigError::UnknownRepresentation { kind, name, valid } => {
                assert_eq!(kind, "condition");
                assert_eq!(name, "hyperellipsoid");
                assert!(valid.contains("neural"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(cfg.cond.kind, ConditionType::Rectangle);
    }

    #[test]
    fn test_names_parse_case_insensitively() {
        let mut cfg = Config::default();
        cfg.set_condition_type("Neural").unwrap();
        cfg.set_prediction_type("CONSTANT").unwrap();
        cfg.set_action_type("integer").unwrap();
        assert_eq!(cfg.cond.kind, ConditionType::Neural);
        assert_eq!(cfg.pred.kind, PredictionType::Constant);
        assert!(cfg.set_action_type("softmax").is_err());
    }

    #[test]
    fn test_codes_round_trip() {
        for t in [ConditionType::Rectangle, ConditionType::Neural] {
            assert_eq!(ConditionType::from_code(t.code()).unwrap(), t);
        }
        assert!(PredictionType::from_code(9).is_err());
    }

    #[test]
    fn test_setters_clamp() {
        let mut cfg = Config::default();
        cfg.set_p_explore(1.5);
        assert_eq!(cfg.multistep.p_explore, 1.0);
        cfg.set_beta(-0.2);
        assert_eq!(cfg.cl.beta, 0.0);
        cfg.set_num_threads(5000);
        assert_eq!(cfg.general.num_threads, 1000);
        cfg.set_pop_size(0);
        assert_eq!(cfg.general.pop_size, 1);
    }

    #[test]
    fn test_inverted_input_range_rejected() {
        let mut cfg = Config::new(2, 1, 2);
        cfg.cond.min = 1.0;
        cfg.cond.max = 0.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_loss_functions() {
        let p = [1.0, 3.0];
        let y = [2.0, 1.0];
        assert!((LossFunc::Mae.apply(&p, &y) - 1.5).abs() < 1e-12);
        assert!((LossFunc::Mse.apply(&p, &y) - 2.5).abs() < 1e-12);
        assert!((LossFunc::Rmse.apply(&p, &y) - 2.5f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_display_and_json() {
        let cfg = Config::new(3, 1, 4);
        let line = format!("{}", cfg);
        assert!(line.starts_with("VERSION="));
        assert!(line.contains("X_DIM=3"));
        assert!(line.contains("COND_TYPE=ub_hyperrectangle"));
        let json = cfg.to_json();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: std::collections::HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_overrides_apply_and_clamp() {
        let cfg = Config::from_overrides(lookup(&[
            ("XCSRL_SEED", "42"),
            ("XCSRL_POP_SIZE", "0"),
            ("XCSRL_BETA", "not-a-number"),
            ("XCSRL_P_EXPLORE", "1.5"),
            ("XCSRL_COND_TYPE", "Neural"),
            ("XCSRL_PRED_TYPE", "constant"),
        ]))
        .unwrap();
        assert_eq!(cfg.seed, 42);
        assert_eq!(cfg.general.pop_size, 1);
        assert!((cfg.cl.beta - 0.1).abs() < 1e-12);
        assert!((cfg.multistep.p_explore - 1.0).abs() < 1e-12);
        assert_eq!(cfg.cond.kind, ConditionType::Neural);
        assert_eq!(cfg.pred.kind, PredictionType::Constant);
        assert_eq!(cfg.act.kind, ActionType::Integer);
    }

    #[test]
    fn test_unknown_representation_override_is_an_error() {
        for key in ["XCSRL_COND_TYPE", "XCSRL_ACT_TYPE", "XCSRL_PRED_TYPE"] {
            let err = Config::from_overrides(lookup(&[(key, "ellipse")])).unwrap_err();
            assert!(
                matches!(err, ConfigError::UnknownRepresentation { ref name, .. } if name == "ellipse"),
                "{key}: {err}"
            );
        }
        assert_eq!(Config::from_overrides(lookup(&[])).unwrap(), Config::default());
    }
}
