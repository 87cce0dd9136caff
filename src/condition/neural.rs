// src/condition/neural.rs
//
// Neural condition: a dense network with a single logistic output that
// matches an input when the output exceeds one half.

use std::fmt;

use rand::Rng;
use serde_json::json;

use crate::config::Config;
use crate::error::PersistError;
use crate::neural::{Activation, Network};
use crate::persist::{StateReader, StateWriter};
use crate::sam::{self, SamType};

/// Resampling attempts before covering falls back to shifting the bias.
pub const COVER_MAX_ATTEMPTS: usize = 1000;

/// Output pre-activation after a forced cover; logistic(0.01) > 0.5.
const COVER_MARGIN: f64 = 0.01;

/// Weight rate, neuron-growth rate.
const MU_TYPE: [SamType; 2] = [SamType::LogNormal, SamType::LogNormal];

#[derive(Debug, Clone, PartialEq)]
pub struct NeuralCondition {
    pub net: Network,
    pub mu: Vec<f64>,
}

impl NeuralCondition {
    pub fn init<R: Rng + ?Sized>(cfg: &Config, rng: &mut R) -> Self {
        let c = &cfg.cond;
        let n_hidden = c.num_neurons.first().copied().unwrap_or(1).max(1) as usize;
        Self {
            net: Network::new(
                rng,
                cfg.x_dim,
                n_hidden,
                1,
                c.hidden_activation,
                Activation::Logistic,
            ),
            mu: sam::seeded(rng, &MU_TYPE),
        }
    }

    pub fn output(&self, x: &[f64]) -> f64 {
        self.net.forward(x)[0]
    }

    pub fn matches(&self, x: &[f64]) -> bool {
        self.output(x) > 0.5
    }

    /// Resample weights until `x` matches; after `COVER_MAX_ATTEMPTS`
    /// failures force the match through the output bias.
    pub fn cover<R: Rng + ?Sized>(&mut self, rng: &mut R, x: &[f64]) {
        for _ in 0..COVER_MAX_ATTEMPTS {
            self.net.randomize(rng);
            if self.matches(x) {
                return;
            }
        }
        self.force_match(x);
    }

    /// Shift the output bias so the pre-activation on `x` equals
    /// `COVER_MARGIN`.
    pub fn force_match(&mut self, x: &[f64]) {
        let hidden = self.net.hidden_outputs(x);
        let sum = self.net.output.weighted_sums(&hidden)[0];
        self.net.output.biases[0] += COVER_MARGIN - sum;
    }

    pub fn mutate<R: Rng + ?Sized>(&mut self, cfg: &Config, rng: &mut R) -> bool {
        let c = &cfg.cond;
        sam::adapt(rng, &mut self.mu, &MU_TYPE);
        let mut changed = false;
        if c.evolve_weights {
            changed |= self.net.mutate_weights(rng, self.mu[0]);
        }
        if c.evolve_neurons {
            let cap = c.max_neurons.first().copied().unwrap_or(1).max(1) as usize;
            let grow = c.max_neuron_grow.max(0) as usize;
            changed |= self.net.mutate_neurons(rng, self.mu[1], grow, cap);
        }
        changed
    }

    /// Active hidden neurons.
    pub fn size(&self) -> f64 {
        self.net.n_hidden() as f64
    }

    pub fn save<W: std::io::Write>(&self, w: &mut StateWriter<W>) -> Result<(), PersistError> {
        self.net.save(w)?;
        w.write_f64_slice(&self.mu)
    }

    pub fn load<R: std::io::Read>(
        r: &mut StateReader<R>,
        cfg: &Config,
    ) -> Result<Self, PersistError> {
        let net = Network::load(r)?;
        if net.hidden.n_inputs != cfg.x_dim || net.n_outputs() != 1 {
            return Err(PersistError::Inconsistent {
                field: "neural_condition.shape",
                value: net.hidden.n_inputs as i64,
            });
        }
        let mu = r.read_f64_vec(MU_TYPE.len(), "neural_condition.mu")?;
        Ok(Self { net, mu })
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "type": "neural",
            "n_hidden": self.net.n_hidden(),
            "hidden_weights": self.net.hidden.weights,
            "hidden_biases": self.net.hidden.biases,
            "output_weights": self.net.output.weights,
            "output_biases": self.net.output.biases,
            "mutation": self.mu,
        })
    }
}

impl fmt::Display for NeuralCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "neural condition: {}", self.net)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_cover_always_matches() {
        let mut cfg = Config::new(4, 1, 2);
        cfg.cond.num_neurons = vec![3];
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let mut c = NeuralCondition::init(&cfg, &mut rng);
        for _ in 0..200 {
            let x: Vec<f64> = (0..4).map(|_| random::uniform(&mut rng, -5.0, 5.0)).collect();
            c.cover(&mut rng, &x);
            assert!(c.matches(&x));
        }
    }

    #[test]
    fn test_force_match_from_rejecting_network() {
        let cfg = Config::new(2, 1, 2);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut c = NeuralCondition::init(&cfg, &mut rng);
        let x = [0.3, 0.7];
        c.net.output.biases[0] = -50.0;
        assert!(!c.matches(&x));
        c.force_match(&x);
        assert!(c.matches(&x));
        assert!(c.output(&x) < 0.51);
    }

    #[test]
    fn test_mutate_respects_neuron_cap() {
        let mut cfg = Config::new(2, 1, 2);
        cfg.cond.num_neurons = vec![2];
        cfg.cond.max_neurons = vec![4];
        cfg.cond.max_neuron_grow = 2;
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut c = NeuralCondition::init(&cfg, &mut rng);
        for _ in 0..300 {
            c.mutate(&cfg, &mut rng);
            assert!(c.size() >= 1.0 && c.size() <= 4.0);
        }
    }
}
