//! xcsrl core library.
//!
//! An XCS-family learning classifier system for reinforcement learning:
//! a population of condition/action/prediction rules, learned online by
//! credit assignment and evolved by a steady-state genetic algorithm.
//!
//! Typical use: build a [`Config`], create an [`Xcs`], implement
//! [`Environment`] for the problem and call [`Xcs::experiment`] (or drive
//! [`Xcs::trial`] yourself). Progress is reported through `tracing`;
//! install a subscriber to see it.

pub mod action;
pub mod callback;
pub mod classifier;
pub mod clset;
pub mod condition;
pub mod config;
pub mod ea;
pub mod env;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod neural;
pub mod pa;
pub mod persist;
pub mod population;
pub mod prediction;
pub mod random;
pub mod rl;
pub mod sam;
pub mod xcs;

// --- Re-exports for ergonomic external use ---------------------------------

pub use config::{
    ActionType, ConditionType, Config, LossFunc, PredictionType, SelectType, MAX_LAYERS, VERSION,
};
pub use error::{ConfigError, PersistError, XcsError};

pub use action::{Action, IntegerAction, NeuralAction};
pub use condition::{Condition, NeuralCondition, UbRectangle};
pub use prediction::{ConstantPrediction, NlmsPrediction, Prediction};

pub use classifier::Classifier;
pub use clset::ClassifierSet;
pub use pa::PredictionArray;
pub use population::{ClassifierId, Population};

pub use env::Environment;
pub use rl::{ExperimentSummary, TrialOutcome};
pub use xcs::{RunState, Xcs};

pub use callback::{Callback, SnapshotCallback};
pub use logging::{EventSink, FileSink, NoopSink, TrialRecord};
pub use metrics::{Metrics, OnlineStats, Window};
