// src/pa.rs
//
// Prediction array: per-action fitness-weighted mean prediction of the
// match set, plus action selection over it.
//
// With the `parallel` feature the accumulation is fork-joined across the
// match set; partial sums are combined with one additive reduction, so
// results may differ from the sequential build in the last bits.

use rand::Rng;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::classifier::Classifier;
use crate::clset::ClassifierSet;
use crate::config::Config;
use crate::population::Population;
use crate::random;

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionArray {
    values: Vec<f64>,
    support: Vec<f64>,
}

/// Per-action `(Σ prediction * fitness, Σ fitness)`.
type Sums = (Vec<f64>, Vec<f64>);

fn empty_sums(n: usize) -> Sums {
    (vec![0.0; n], vec![0.0; n])
}

fn accumulate(mut acc: Sums, cfg: &Config, x: &[f64], cl: &Classifier) -> Sums {
    if let Some(norm) = acc.1.get_mut(cl.action) {
        *norm += cl.fit;
        acc.0[cl.action] += cl.predict(cfg, x)[0] * cl.fit;
    }
    acc
}

fn join(mut a: Sums, b: Sums) -> Sums {
    for (l, r) in a.0.iter_mut().zip(b.0) {
        *l += r;
    }
    for (l, r) in a.1.iter_mut().zip(b.1) {
        *l += r;
    }
    a
}

impl PredictionArray {
    pub fn new(n_actions: usize) -> Self {
        Self {
            values: vec![0.0; n_actions],
            support: vec![0.0; n_actions],
        }
    }

    pub fn n_actions(&self) -> usize {
        self.values.len()
    }

    /// Rebuild from the match set's members for input `x`.
    pub fn build(&mut self, cfg: &Config, pop: &Population, mset: &ClassifierSet, x: &[f64]) {
        let n = self.n_actions();
        let members: Vec<&Classifier> = mset.iter(pop).map(|(_, cl)| cl).collect();

        #[cfg(feature = "parallel")]
        let (sums, norms) = members
            .par_iter()
            .fold(|| empty_sums(n), |acc, cl| accumulate(acc, cfg, x, cl))
            .reduce(|| empty_sums(n), join);

        #[cfg(not(feature = "parallel"))]
        let (sums, norms) = members
            .iter()
            .fold(empty_sums(n), |acc, cl| accumulate(acc, cfg, x, cl));

        for a in 0..n {
            self.support[a] = norms[a];
            self.values[a] = if norms[a] != 0.0 { sums[a] / norms[a] } else { 0.0 };
        }
    }

    /// Greatest value; ties go to the lowest action index.
    pub fn best_action(&self) -> usize {
        let mut best = 0;
        for (a, v) in self.values.iter().enumerate().skip(1) {
            if *v > self.values[best] {
                best = a;
            }
        }
        best
    }

    pub fn best_value(&self) -> f64 {
        self.values.get(self.best_action()).copied().unwrap_or(0.0)
    }

    /// Uniform draw among actions with nonzero support.
    ///
    /// Panics if no action has support; match-set covering guarantees one.
    pub fn random_action<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        assert!(
            self.support.iter().any(|s| *s != 0.0),
            "random_action on a prediction array without support"
        );
        loop {
            let a = random::index(rng, self.n_actions());
            if self.support[a] != 0.0 {
                return a;
            }
        }
    }

    /// Value of `action`. Panics if `action` is out of range.
    pub fn value(&self, action: usize) -> f64 {
        assert!(
            action < self.n_actions(),
            "action {} out of range for {} actions",
            action,
            self.n_actions()
        );
        self.values[action]
    }

    pub fn support(&self, action: usize) -> f64 {
        self.support.get(action).copied().unwrap_or(0.0)
    }

    pub fn has_support(&self, action: usize) -> bool {
        self.support(action) != 0.0
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[cfg(test)]
    pub(crate) fn from_values(values: Vec<f64>, support: Vec<f64>) -> Self {
        Self { values, support }
    }
}
