// src/action.rs
//
// Action representations.
// - Integer: a fixed action index.
// - Neural:  a dense network scoring every action; the arg-max is advocated.

use std::fmt;

use rand::Rng;
use serde_json::json;

use crate::condition::neural::COVER_MAX_ATTEMPTS;
use crate::config::{ActionType, Config};
use crate::error::PersistError;
use crate::neural::{Activation, Network};
use crate::persist::{StateReader, StateWriter};
use crate::random;
use crate::sam::{self, SamType};

const INTEGER_MU_TYPE: [SamType; 1] = [SamType::LogNormal];
const NEURAL_MU_TYPE: [SamType; 2] = [SamType::LogNormal, SamType::LogNormal];

/// Lead a forced cover gives the requested action over the runner-up.
const COVER_MARGIN: f64 = 0.01;

#[derive(Debug, Clone, PartialEq)]
pub struct IntegerAction {
    pub action: usize,
    pub mu: Vec<f64>,
}

impl IntegerAction {
    pub fn new(action: usize) -> Self {
        Self {
            action,
            mu: vec![sam::MU_MIN; INTEGER_MU_TYPE.len()],
        }
    }

    /// Redraw to a different action with probability `mu`.
    fn mutate<R: Rng + ?Sized>(&mut self, cfg: &Config, rng: &mut R) -> bool {
        sam::adapt(rng, &mut self.mu, &INTEGER_MU_TYPE);
        if cfg.n_actions < 2 || !random::chance(rng, self.mu[0]) {
            return false;
        }
        let mut next = random::index(rng, cfg.n_actions - 1);
        if next >= self.action {
            next += 1;
        }
        self.action = next;
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NeuralAction {
    pub net: Network,
    pub mu: Vec<f64>,
}

impl NeuralAction {
    fn init<R: Rng + ?Sized>(cfg: &Config, rng: &mut R) -> Self {
        let c = &cfg.cond;
        let n_hidden = c.num_neurons.first().copied().unwrap_or(1).max(1) as usize;
        Self {
            net: Network::new(
                rng,
                cfg.x_dim,
                n_hidden,
                cfg.n_actions,
                c.hidden_activation,
                Activation::Linear,
            ),
            mu: sam::seeded(rng, &NEURAL_MU_TYPE),
        }
    }

    /// Arg-max over the outputs; ties go to the lowest index.
    pub fn compute(&self, x: &[f64]) -> usize {
        let out = self.net.forward(x);
        let mut best = 0;
        for (i, v) in out.iter().enumerate().skip(1) {
            if *v > out[best] {
                best = i;
            }
        }
        best
    }

    fn cover<R: Rng + ?Sized>(&mut self, rng: &mut R, x: &[f64], action: usize) {
        for _ in 0..COVER_MAX_ATTEMPTS {
            self.net.randomize(rng);
            if self.compute(x) == action {
                return;
            }
        }
        self.force_action(x, action);
    }

    /// Lift the requested output's bias just above every other output.
    pub fn force_action(&mut self, x: &[f64], action: usize) {
        let out = self.net.forward(x);
        let rival = out
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != action)
            .map(|(_, v)| *v)
            .fold(f64::NEG_INFINITY, f64::max);
        if rival.is_finite() && out[action] <= rival {
            self.net.output.biases[action] += rival - out[action] + COVER_MARGIN;
        }
    }

    fn mutate<R: Rng + ?Sized>(&mut self, cfg: &Config, rng: &mut R) -> bool {
        let c = &cfg.cond;
        sam::adapt(rng, &mut self.mu, &NEURAL_MU_TYPE);
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
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Integer(IntegerAction),
    Neural(NeuralAction),
}

impl Action {
    pub fn init<R: Rng + ?Sized>(cfg: &Config, rng: &mut R) -> Self {
        match cfg.act.kind {
            ActionType::Integer => {
                let mut a = IntegerAction::new(random::index(rng, cfg.n_actions));
                sam::init(rng, &mut a.mu, &INTEGER_MU_TYPE);
                Action::Integer(a)
            }
            ActionType::Neural => Action::Neural(NeuralAction::init(cfg, rng)),
        }
    }

    pub fn kind(&self) -> ActionType {
        match self {
            Action::Integer(_) => ActionType::Integer,
            Action::Neural(_) => ActionType::Neural,
        }
    }

    /// Action advocated for input `x`.
    pub fn compute(&self, x: &[f64]) -> usize {
        match self {
            Action::Integer(a) => a.action,
            Action::Neural(a) => a.compute(x),
        }
    }

    /// Make this payload advocate `action` for `x`.
    pub fn cover<R: Rng + ?Sized>(&mut self, rng: &mut R, x: &[f64], action: usize) {
        match self {
            Action::Integer(a) => a.action = action,
            Action::Neural(a) => a.cover(rng, x, action),
        }
    }

    pub fn mutate<R: Rng + ?Sized>(&mut self, cfg: &Config, rng: &mut R) -> bool {
        match self {
            Action::Integer(a) => a.mutate(cfg, rng),
            Action::Neural(a) => a.mutate(cfg, rng),
        }
    }

    pub fn crossover(&mut self, _other: &mut Action) -> bool {
        false
    }

    pub fn is_more_general_than(&self, other: &Action) -> bool {
        match (self, other) {
            (Action::Integer(a), Action::Integer(b)) => a.action == b.action,
            _ => false,
        }
    }

    pub fn size(&self) -> f64 {
        match self {
            Action::Integer(_) => 1.0,
            Action::Neural(a) => a.net.n_hidden() as f64,
        }
    }

    pub fn save<W: std::io::Write>(&self, w: &mut StateWriter<W>) -> Result<(), PersistError> {
        w.write_i32(self.kind().code())?;
        match self {
            Action::Integer(a) => {
                w.write_usize(a.action)?;
                w.write_f64_slice(&a.mu)
            }
            Action::Neural(a) => {
                a.net.save(w)?;
                w.write_f64_slice(&a.mu)
            }
        }
    }

    pub fn load<R: std::io::Read>(
        r: &mut StateReader<R>,
        cfg: &Config,
    ) -> Result<Self, PersistError> {
        let tag = r.read_i32("action.tag")?;
        match ActionType::from_code(tag) {
            Ok(ActionType::Integer) => {
                let action = r.read_count("action.value")?;
                if action >= cfg.n_actions {
                    return Err(PersistError::Inconsistent {
                        field: "action.value",
                        value: action as i64,
                    });
                }
                let mu = r.read_f64_vec(INTEGER_MU_TYPE.len(), "action.mu")?;
                Ok(Action::Integer(IntegerAction { action, mu }))
            }
            Ok(ActionType::Neural) => {
                let net = Network::load(r)?;
                if net.n_outputs() != cfg.n_actions {
                    return Err(PersistError::Inconsistent {
                        field: "neural_action.n_outputs",
                        value: net.n_outputs() as i64,
                    });
                }
                let mu = r.read_f64_vec(NEURAL_MU_TYPE.len(), "neural_action.mu")?;
                Ok(Action::Neural(NeuralAction { net, mu }))
            }
            Err(_) => Err(PersistError::UnknownTag { kind: "action", tag }),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Action::Integer(a) => json!({ "type": "integer", "action": a.action, "mutation": a.mu }),
            Action::Neural(a) => json!({
                "type": "neural",
                "n_hidden": a.net.n_hidden(),
                "n_outputs": a.net.n_outputs(),
                "mutation": a.mu,
            }),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Integer(a) => write!(f, "action: {}", a.action),
            Action::Neural(a) => write!(f, "neural action: {}", a.net),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_integer_mutation_always_picks_a_different_action() {
        let cfg = Config::new(2, 1, 4);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut a = IntegerAction::new(2);
        a.mu[0] = 1.0;
        let mut moved = 0;
        for _ in 0..200 {
            let before = a.action;
            if a.mutate(&cfg, &mut rng) {
                assert_ne!(a.action, before);
                moved += 1;
            }
            assert!(a.action < 4);
        }
        assert!(moved > 0);
    }

    #[test]
    fn test_single_action_never_mutates() {
        let cfg = Config::new(2, 1, 1);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut a = Action::Integer(IntegerAction::new(0));
        for _ in 0..50 {
            assert!(!a.mutate(&cfg, &mut rng));
        }
    }

    #[test]
    fn test_integer_generality_is_equality() {
        let a = Action::Integer(IntegerAction::new(1));
        let b = Action::Integer(IntegerAction::new(1));
        let c = Action::Integer(IntegerAction::new(0));
        assert!(a.is_more_general_than(&b));
        assert!(!a.is_more_general_than(&c));
    }

    #[test]
    fn test_neural_cover_advocates_requested_action() {
        let mut cfg = Config::new(3, 1, 5);
        cfg.act.kind = ActionType::Neural;
        cfg.cond.num_neurons = vec![4];
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let mut a = Action::init(&cfg, &mut rng);
        let x = [0.1, 0.6, 0.3];
        for target in 0..5 {
            a.cover(&mut rng, &x, target);
            assert_eq!(a.compute(&x), target);
        }
    }

    #[test]
    fn test_neural_force_action() {
        let mut cfg = Config::new(2, 1, 3);
        cfg.act.kind = ActionType::Neural;
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut a = NeuralAction::init(&cfg, &mut rng);
        let x = [0.5, 0.5];
        a.net.output.biases[2] = -100.0;
        assert_ne!(a.compute(&x), 2);
        a.force_action(&x, 2);
        assert_eq!(a.compute(&x), 2);
    }

    #[test]
    fn test_load_rejects_out_of_range_action() {
        let cfg = Config::new(2, 1, 2);
        let a = Action::Integer(IntegerAction::new(1));
        let mut w = StateWriter::new(Vec::new());
        a.save(&mut w).unwrap();
        let bytes = w.into_inner();
        assert_eq!(Action::load(&mut StateReader::new(bytes.as_slice()), &cfg).unwrap(), a);
        let small = Config::new(2, 1, 1);
        assert!(Action::load(&mut StateReader::new(bytes.as_slice()), &small).is_err());
    }
}
