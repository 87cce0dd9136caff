// tests/rl_step_tests.rs
//
// End-to-end behaviour of the trial driver.
//
// These tests verify:
// 1. A hand-built population: only matching rules feed the prediction
//    array, the greedy action follows it, and only the action set learns.
// 2. Multi-step trials stop at the teleportation limit.
// 3. Single-step learning on a threshold problem beats chance.

use xcsrl::{
    Action, Classifier, Condition, Config, ConstantPrediction, Environment, IntegerAction,
    Prediction, PredictionType, UbRectangle, Xcs,
};

fn rule(cfg: &Config, lower: [f64; 2], upper: [f64; 2], action: usize, p: f64) -> Classifier {
    Classifier::from_parts(
        cfg,
        Condition::Rectangle(UbRectangle::from_bounds(lower.to_vec(), upper.to_vec())),
        Action::Integer(IntegerAction::new(action)),
        Prediction::Constant(ConstantPrediction::new(vec![p])),
        1.0,
        0,
    )
}

fn empty_run(x_dim: usize, n_actions: usize) -> Xcs {
    let mut cfg = Config::new(x_dim, 1, n_actions).with_seed(11);
    cfg.general.pop_init = false;
    cfg.pred.kind = PredictionType::Constant;
    Xcs::new(cfg).unwrap()
}

/// Snapshot of the learned statistics of a classifier.
fn stats(cl: &Classifier, cfg: &Config) -> (u32, f64, f64, f64, f64) {
    (cl.exp, cl.err, cl.fit, cl.size, cl.predict(cfg, &[0.0, 0.0])[0])
}

#[test]
fn test_hand_built_population_single_exploit_step() {
    let mut xcs = empty_run(2, 2);
    let cfg = xcs.config().clone();
    let a = xcs.insert_classifier(rule(&cfg, [0.0, 0.0], [0.5, 0.5], 0, 10.0));
    let b = xcs.insert_classifier(rule(&cfg, [0.1, 0.1], [0.4, 0.4], 1, 20.0));
    let c = xcs.insert_classifier(rule(&cfg, [0.8, 0.8], [1.0, 1.0], 0, 50.0));

    let before: Vec<_> = [a, b, c]
        .iter()
        .map(|id| stats(xcs.population().get(*id).unwrap(), &cfg))
        .collect();

    let x = [0.25, 0.25];
    xcs.set_explore(false);
    xcs.init_trial();
    xcs.init_step();
    let action = xcs.decision(&x);

    // no covering was needed
    assert_eq!(xcs.population().len(), 3);
    assert_eq!(xcs.match_set().len(), 2);
    let pa = xcs.prediction_array();
    assert!((pa.value(0) - 10.0).abs() < 1e-12);
    assert!((pa.value(1) - 20.0).abs() < 1e-12);
    assert_eq!(action, 1);

    xcs.update(&x, action, 1.0, true);
    assert_eq!(xcs.action_set().ids(), &[b]);
    let err = xcs.error(action, 1.0, true, 1.0);
    assert!((err - 19.0).abs() < 1e-12);
    xcs.end_step(&x, action, 1.0);
    xcs.end_trial();

    let after: Vec<_> = [a, b, c]
        .iter()
        .map(|id| stats(xcs.population().get(*id).unwrap(), &cfg))
        .collect();
    assert_eq!(after[0], before[0]);
    assert_eq!(after[2], before[2]);
    assert_ne!(after[1], before[1]);
    assert_eq!(after[1].0, 1);
    // first update of a constant prediction jumps to the target
    assert!((after[1].4 - 1.0).abs() < 1e-12);
    // exploit steps do not advance time
    assert_eq!(xcs.time(), 0);
}

/// Walks forever; never resets.
struct Corridor {
    pos: [f64; 1],
}

impl Environment for Corridor {
    fn reset(&mut self) {
        self.pos = [0.0];
    }
    fn state(&self) -> &[f64] {
        &self.pos
    }
    fn execute(&mut self, action: usize) -> f64 {
        self.pos[0] = if action == 0 { 0.25 } else { 0.75 };
        0.0
    }
    fn is_reset(&self) -> bool {
        false
    }
    fn max_payoff(&self) -> f64 {
        1.0
    }
    fn is_multistep(&self) -> bool {
        true
    }
}

#[test]
fn test_multistep_trial_stops_at_teleportation_limit() {
    let mut xcs = empty_run(1, 2);
    let mut cfg = xcs.config().clone();
    cfg.set_teletransportation(5);
    cfg.general.pop_size = 40;
    let mut xcs2 = Xcs::new(cfg).unwrap();
    let mut env = Corridor { pos: [0.0] };

    let out = xcs2.trial(&mut env, true);
    assert_eq!(out.steps, 5);
    assert_eq!(out.performance, 5.0);
    assert_eq!(xcs2.time(), 5);
    assert!(xcs2.kill_set().is_empty());

    // default limit is 50
    let out = xcs.trial(&mut env, false);
    assert_eq!(out.steps, 50);
}

/// Reward 1 when the action says whether x > 0.5.
struct Threshold {
    x: [f64; 1],
    n: u32,
    done: bool,
}

impl Environment for Threshold {
    fn reset(&mut self) {
        self.n = self.n.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        self.x = [(self.n >> 8) as f64 / (1u32 << 24) as f64];
        self.done = false;
    }
    fn state(&self) -> &[f64] {
        &self.x
    }
    fn execute(&mut self, action: usize) -> f64 {
        self.done = true;
        if (action == 1) == (self.x[0] > 0.5) {
            1.0
        } else {
            0.0
        }
    }
    fn is_reset(&self) -> bool {
        self.done
    }
    fn max_payoff(&self) -> f64 {
        1.0
    }
    fn is_multistep(&self) -> bool {
        false
    }
}

#[test]
fn test_single_step_learning_beats_chance() {
    let mut cfg = Config::new(1, 1, 2).with_seed(2);
    cfg.general.pop_size = 200;
    cfg.general.max_trials = 3000;
    cfg.general.perf_trials = 500;
    cfg.pred.kind = PredictionType::Constant;
    let mut xcs = Xcs::new(cfg).unwrap();
    let mut env = Threshold { x: [0.0], n: 7, done: false };
    let summary = xcs
        .experiment(&mut env, &mut xcsrl::NoopSink, &mut [])
        .unwrap();
    assert_eq!(summary.trials, 3000);
    assert_eq!(summary.metrics.len(), 6);
    let last = summary.metrics.last().unwrap();
    assert!(last.performance > 0.7, "performance {}", last.performance);
    assert!(last.pop_num <= 200);
}
