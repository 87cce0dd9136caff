// src/condition/mod.rs
//
// Condition representations. The variant is chosen once per run from
// `Config::cond.kind`; every classifier in a population carries the same one.

pub mod neural;
pub mod rectangle;

use std::fmt;

use rand::Rng;

use crate::config::{ConditionType, Config};
use crate::error::PersistError;
use crate::persist::{StateReader, StateWriter};

pub use neural::NeuralCondition;
pub use rectangle::UbRectangle;

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Rectangle(UbRectangle),
    Neural(NeuralCondition),
}

impl Condition {
    /// Random condition of the configured representation.
    pub fn init<R: Rng + ?Sized>(cfg: &Config, rng: &mut R) -> Self {
        match cfg.cond.kind {
            ConditionType::Rectangle => Condition::Rectangle(UbRectangle::init(cfg, rng)),
            ConditionType::Neural => Condition::Neural(NeuralCondition::init(cfg, rng)),
        }
    }

    pub fn kind(&self) -> ConditionType {
        match self {
            Condition::Rectangle(_) => ConditionType::Rectangle,
            Condition::Neural(_) => ConditionType::Neural,
        }
    }

    /// Generalise to match `x`.
    pub fn cover<R: Rng + ?Sized>(&mut self, cfg: &Config, rng: &mut R, x: &[f64]) {
        match self {
            Condition::Rectangle(c) => c.cover(cfg, rng, x),
            Condition::Neural(c) => c.cover(rng, x),
        }
    }

    pub fn matches(&self, x: &[f64]) -> bool {
        match self {
            Condition::Rectangle(c) => c.matches(x),
            Condition::Neural(c) => c.matches(x),
        }
    }

    pub fn mutate<R: Rng + ?Sized>(&mut self, cfg: &Config, rng: &mut R) -> bool {
        match self {
            Condition::Rectangle(c) => c.mutate(cfg, rng),
            Condition::Neural(c) => c.mutate(cfg, rng),
        }
    }

    /// Only like representations recombine.
    pub fn crossover<R: Rng + ?Sized>(
        &mut self,
        other: &mut Condition,
        cfg: &Config,
        rng: &mut R,
    ) -> bool {
        match (self, other) {
            (Condition::Rectangle(a), Condition::Rectangle(b)) => a.crossover(b, cfg, rng),
            _ => false,
        }
    }

    pub fn is_more_general_than(&self, other: &Condition) -> bool {
        match (self, other) {
            (Condition::Rectangle(a), Condition::Rectangle(b)) => a.is_more_general_than(b),
            _ => false,
        }
    }

    pub fn update(&mut self, cfg: &Config, x: &[f64]) {
        if let Condition::Rectangle(c) = self {
            c.update(cfg, x);
        }
    }

    pub fn size(&self) -> f64 {
        match self {
            Condition::Rectangle(c) => c.size(),
            Condition::Neural(c) => c.size(),
        }
    }

    pub fn save<W: std::io::Write>(&self, w: &mut StateWriter<W>) -> Result<(), PersistError> {
        w.write_i32(self.kind().code())?;
        match self {
            Condition::Rectangle(c) => c.save(w),
            Condition::Neural(c) => c.save(w),
        }
    }

    pub fn load<R: std::io::Read>(
        r: &mut StateReader<R>,
        cfg: &Config,
    ) -> Result<Self, PersistError> {
        let tag = r.read_i32("condition.tag")?;
        match ConditionType::from_code(tag) {
            Ok(ConditionType::Rectangle) => Ok(Condition::Rectangle(UbRectangle::load(r, cfg)?)),
            Ok(ConditionType::Neural) => Ok(Condition::Neural(NeuralCondition::load(r, cfg)?)),
            Err(_) => Err(PersistError::UnknownTag {
                kind: "condition",
                tag,
            }),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Condition::Rectangle(c) => c.to_json(),
            Condition::Neural(c) => c.to_json(),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Rectangle(c) => fmt::Display::fmt(c, f),
            Condition::Neural(c) => fmt::Display::fmt(c, f),
        }
    }
}
