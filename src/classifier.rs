// src/classifier.rs
//
// A single condition -> action -> prediction rule plus its XCS statistics
// (error, fitness, numerosity, experience, set-size estimate).
//
// The update rules here are the per-member half of credit assignment; the
// set-level half (fitness sharing, subsumption) lives in `clset`.

use std::fmt;

use rand::Rng;
use serde_json::json;

use crate::action::Action;
use crate::condition::Condition;
use crate::config::Config;
use crate::error::PersistError;
use crate::persist::{StateReader, StateWriter};
use crate::prediction::Prediction;

#[derive(Debug, Clone, PartialEq)]
pub struct Classifier {
    pub cond: Condition,
    pub act: Action,
    pub pred: Prediction,
    /// Running payoff error estimate.
    pub err: f64,
    /// Accuracy-based fitness shared across numerosity.
    pub fit: f64,
    /// Number of identical copies this record stands for.
    pub num: u32,
    /// Updates received.
    pub exp: u32,
    /// Action-set size estimate.
    pub size: f64,
    /// Time of the last rule-discovery pass over a set holding this rule.
    pub time: u32,
    /// Time of creation.
    pub age: u32,
    /// Action advocated for the most recent input.
    pub action: usize,
    /// Whether the most recent input matched.
    pub matched: bool,
    /// Inputs matched so far.
    pub mtotal: u32,
}

impl Classifier {
    /// Assemble a classifier from explicit payloads with initial statistics.
    pub fn from_parts(
        cfg: &Config,
        cond: Condition,
        act: Action,
        pred: Prediction,
        size: f64,
        time: u32,
    ) -> Self {
        let zeros = vec![0.0; cfg.x_dim];
        let action = act.compute(&zeros);
        Self {
            cond,
            act,
            pred,
            err: cfg.cl.init_error,
            fit: cfg.cl.init_fitness,
            num: 1,
            exp: 0,
            size,
            time,
            age: time,
            action,
            matched: false,
            mtotal: 0,
        }
    }

    /// Random rule of the configured representations.
    pub fn random<R: Rng + ?Sized>(cfg: &Config, rng: &mut R, size: f64, time: u32) -> Self {
        let cond = Condition::init(cfg, rng);
        let act = Action::init(cfg, rng);
        let pred = Prediction::init(cfg, rng);
        Self::from_parts(cfg, cond, act, pred, size, time)
    }

    /// New rule matching `x` and advocating `action`.
    pub fn cover<R: Rng + ?Sized>(
        cfg: &Config,
        rng: &mut R,
        x: &[f64],
        action: usize,
        size: f64,
        time: u32,
    ) -> Self {
        let mut cl = Self::random(cfg, rng, size, time);
        cl.cond.cover(cfg, rng, x);
        cl.act.cover(rng, x, action);
        cl.action = action;
        cl
    }

    /// Offspring copy: payloads and estimates cloned, counters reset.
    pub fn offspring(&self, time: u32) -> Self {
        Self {
            num: 1,
            exp: 0,
            time,
            age: time,
            matched: false,
            mtotal: 0,
            ..self.clone()
        }
    }

    /// Test `x` and record the outcome (and advocated action) on the rule.
    pub fn matches(&mut self, x: &[f64]) -> bool {
        self.matched = self.cond.matches(x);
        if self.matched {
            self.mtotal += 1;
            self.action = self.act.compute(x);
        }
        self.matched
    }

    pub fn predict(&self, cfg: &Config, x: &[f64]) -> Vec<f64> {
        self.pred.compute(cfg, x)
    }

    /// Per-member credit assignment against payoff `y`.
    ///
    /// Error is updated from the prediction before it moves. While
    /// `exp < 1/beta` running means replace the beta-weighted steps.
    pub fn update(&mut self, cfg: &Config, x: &[f64], y: &[f64], set_size: u32) {
        self.exp += 1;
        let beta = cfg.cl.beta;
        let warm = (self.exp as f64) * beta < 1.0;
        let rate = if warm { 1.0 / self.exp as f64 } else { beta };

        let loss = cfg.general.loss_func.apply(&self.predict(cfg, x), y);
        self.err += rate * (loss - self.err);
        self.pred.update(cfg, x, y, self.exp);
        self.size += rate * (set_size as f64 - self.size);
        self.cond.update(cfg, x);
    }

    /// `1` when accurate, otherwise a steep power-law fall-off.
    pub fn accuracy(&self, cfg: &Config) -> f64 {
        let c = &cfg.cl;
        if self.err < c.eps_0 {
            1.0
        } else {
            c.alpha * (self.err / c.eps_0).powf(-c.nu)
        }
    }

    /// Move fitness towards this rule's share of the set's accuracy.
    pub fn update_fitness(&mut self, cfg: &Config, acc: f64, acc_sum: f64) {
        if acc_sum <= 0.0 {
            return;
        }
        let share = acc * self.num as f64 / acc_sum;
        self.fit += cfg.cl.beta * (share - self.fit);
    }

    /// Deletion weight; inflated for experienced rules with low fitness.
    pub fn deletion_vote(&self, cfg: &Config, avg_fit: f64) -> f64 {
        let num = self.num as f64;
        let vote = self.size * num;
        let fit_per_copy = self.fit / num;
        if self.exp > cfg.cl.theta_del && fit_per_copy < cfg.cl.delta * avg_fit && fit_per_copy > 0.0 {
            vote * avg_fit / fit_per_copy
        } else {
            vote
        }
    }

    /// Experienced and accurate enough to absorb others.
    pub fn could_subsume(&self, cfg: &Config) -> bool {
        self.exp > cfg.subsumption.theta_sub && self.err < cfg.cl.eps_0
    }

    pub fn is_more_general_than(&self, other: &Classifier) -> bool {
        self.cond.is_more_general_than(&other.cond) && self.act.is_more_general_than(&other.act)
    }

    pub fn subsumes(&self, cfg: &Config, other: &Classifier) -> bool {
        self.could_subsume(cfg) && self.is_more_general_than(other)
    }

    pub fn mutate<R: Rng + ?Sized>(&mut self, cfg: &Config, rng: &mut R) -> bool {
        let c = self.cond.mutate(cfg, rng);
        let a = self.act.mutate(cfg, rng);
        let p = self.pred.mutate(cfg, rng);
        c || a || p
    }

    pub fn crossover<R: Rng + ?Sized>(
        &mut self,
        other: &mut Classifier,
        cfg: &Config,
        rng: &mut R,
    ) -> bool {
        let c = self.cond.crossover(&mut other.cond, cfg, rng);
        let a = self.act.crossover(&mut other.act);
        let p = self.pred.crossover(&mut other.pred);
        c || a || p
    }

    pub fn save<W: std::io::Write>(&self, w: &mut StateWriter<W>) -> Result<(), PersistError> {
        w.write_f64(self.err)?;
        w.write_f64(self.fit)?;
        w.write_u32(self.num)?;
        w.write_u32(self.exp)?;
        w.write_f64(self.size)?;
        w.write_u32(self.time)?;
        w.write_u32(self.age)?;
        w.write_usize(self.action)?;
        w.write_bool(self.matched)?;
        w.write_u32(self.mtotal)?;
        self.cond.save(w)?;
        self.act.save(w)?;
        self.pred.save(w)
    }

    pub fn load<R: std::io::Read>(
        r: &mut StateReader<R>,
        cfg: &Config,
    ) -> Result<Self, PersistError> {
        let err = r.read_f64("cl.err")?;
        let fit = r.read_f64("cl.fit")?;
        let num = r.read_positive("cl.num")? as u32;
        let exp = r.read_u32("cl.exp")?;
        let size = r.read_f64("cl.size")?;
        let time = r.read_u32("cl.time")?;
        let age = r.read_u32("cl.age")?;
        let action = r.read_count("cl.action")?;
        let matched = r.read_bool("cl.matched")?;
        let mtotal = r.read_u32("cl.mtotal")?;
        let cond = Condition::load(r, cfg)?;
        let act = Action::load(r, cfg)?;
        let pred = Prediction::load(r, cfg)?;
        Ok(Self {
            cond,
            act,
            pred,
            err,
            fit,
            num,
            exp,
            size,
            time,
            age,
            action,
            matched,
            mtotal,
        })
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "error": self.err,
            "fitness": self.fit,
            "numerosity": self.num,
            "experience": self.exp,
            "set_size": self.size,
            "time": self.time,
            "age": self.age,
            "mtotal": self.mtotal,
            "condition": self.cond.to_json(),
            "action": self.act.to_json(),
            "prediction": self.pred.to_json(),
        })
    }
}

impl fmt::Display for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.cond)?;
        writeln!(f, "{}", self.pred)?;
        writeln!(f, "{}", self.act)?;
        write!(
            f,
            "err={:.5} fit={:.5} num={} exp={} size={:.2} time={} age={} mtotal={}",
            self.err, self.fit, self.num, self.exp, self.size, self.time, self.age, self.mtotal
        )
    }
}
