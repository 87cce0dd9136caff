// src/rl.rs
//
// Reinforcement-learning trial driver.
//
// A trial is: init_trial, then per step
//   init_step -> decision -> (environment) -> update -> error -> end_step
// until the environment resets or the teleportation limit is hit, then
// end_trial. The primitives are public so callers can drive their own
// loop; `trial` and `experiment` are the packaged versions.

use serde::Serialize;
use tracing::info;

use crate::callback::Callback;
use crate::clset::{self, ClassifierSet};
use crate::ea;
use crate::env::Environment;
use crate::error::XcsError;
use crate::logging::{EventSink, TrialRecord};
use crate::metrics::{Metrics, OnlineStats};
use crate::random;
use crate::xcs::Xcs;

/// State that survives across the steps of one trial.
#[derive(Debug, Clone, Default)]
pub(crate) struct TrialState {
    pub(crate) prev_aset: Option<ClassifierSet>,
    pub(crate) kset: ClassifierSet,
    pub(crate) prev_state: Vec<f64>,
    pub(crate) prev_reward: f64,
    pub(crate) prev_pred: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrialOutcome {
    /// 1/0 for single-step problems, steps taken for multi-step ones.
    pub performance: f64,
    /// Mean per-step system error.
    pub error: f64,
    pub steps: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentSummary {
    /// Explore/exploit trial pairs completed.
    pub trials: u32,
    /// Mean exploit performance over all completed pairs.
    pub mean_performance: f64,
    /// Mean exploit error over all completed pairs.
    pub mean_error: f64,
    /// A callback asked the run to stop.
    pub stopped_early: bool,
    pub metrics: Metrics,
}

impl Xcs {
    pub fn init_trial(&mut self) {
        self.trial.prev_aset = None;
        self.trial.prev_state.clear();
        self.trial.prev_reward = 0.0;
        self.trial.prev_pred = 0.0;
    }

    /// Drop the previous action set and free every classifier deleted
    /// during the trial.
    pub fn end_trial(&mut self) {
        self.trial.prev_aset = None;
        for id in self.trial.kset.drain() {
            self.pop.release(id);
        }
        self.trial.prev_state.clear();
        self.mset.clear();
        self.aset.clear();
    }

    pub fn init_step(&mut self) {
        self.mset.clear();
        self.aset.clear();
    }

    /// Form the match set for `x`, build the prediction array and pick an
    /// action: random with probability `p_explore` while exploring,
    /// otherwise the best.
    pub fn decision(&mut self, x: &[f64]) -> usize {
        self.mset = clset::match_set(
            &self.cfg,
            &mut self.pop,
            &mut self.rng,
            x,
            self.run.time,
            &mut self.trial.kset,
        );
        self.build_pa(x);

        let beta = self.cfg.cl.beta;
        self.run.mset_size += beta * (self.mset.size() as f64 - self.run.mset_size);
        let frac = if self.pop.is_empty() {
            0.0
        } else {
            self.mset.len() as f64 / self.pop.len() as f64
        };
        self.run.mfrac += beta * (frac - self.run.mfrac);

        let supported = (0..self.pa.n_actions()).any(|a| self.pa.has_support(a));
        if self.run.explore
            && supported
            && random::chance(&mut self.rng, self.cfg.multistep.p_explore)
        {
            self.pa.random_action(&mut self.rng)
        } else {
            self.pa.best_action()
        }
    }

    /// Form the action set and assign credit: the previous action set gets
    /// the discounted payoff against the previous input; on reset the
    /// current action set also gets the immediate reward. Rule discovery
    /// follows each update while exploring.
    pub fn update(&mut self, x: &[f64], action: usize, reward: f64, reset: bool) {
        self.aset = clset::action_set(&self.pop, &self.mset, action);
        let explore = self.run.explore;
        let time = self.run.time;

        if let Some(mut prev) = self.trial.prev_aset.take() {
            let payoff = self.trial.prev_reward + self.cfg.multistep.gamma * self.pa.best_value();
            let y = vec![payoff; self.cfg.y_dim];
            clset::update(
                &self.cfg,
                &mut self.pop,
                &mut prev,
                &self.trial.prev_state,
                &y,
                &mut self.trial.kset,
            );
            if explore {
                ea::run(&self.cfg, &mut self.pop, &mut self.rng, &mut prev, time, &mut self.trial.kset);
            }
            self.trial.prev_aset = Some(prev);
        }

        if reset {
            let y = vec![reward; self.cfg.y_dim];
            clset::update(&self.cfg, &mut self.pop, &mut self.aset, x, &y, &mut self.trial.kset);
            if explore {
                ea::run(&self.cfg, &mut self.pop, &mut self.rng, &mut self.aset, time, &mut self.trial.kset);
            }
        }
    }

    /// Normalised system error for this step, measured against the current
    /// best prediction-array value. `action` must be in range.
    pub fn error(&self, action: usize, reward: f64, reset: bool, max_payoff: f64) -> f64 {
        debug_assert!(action < self.pa.n_actions());
        let scale = if max_payoff > 0.0 { max_payoff } else { 1.0 };
        let value = self.pa.best_value();
        let mut err = 0.0;
        if self.trial.prev_aset.is_some() {
            err += (self.cfg.multistep.gamma * value + self.trial.prev_reward - self.trial.prev_pred)
                .abs()
                / scale;
        }
        if reset {
            err += (reward - value).abs() / scale;
        }
        err
    }

    /// Retain this step's input, reward, prediction and action set as
    /// "previous" for the next step.
    pub fn end_step(&mut self, x: &[f64], action: usize, reward: f64) {
        self.trial.prev_aset = Some(std::mem::take(&mut self.aset));
        self.trial.prev_reward = reward;
        self.trial.prev_pred = self.pa.value(action);
        self.trial.prev_state.clear();
        self.trial.prev_state.extend_from_slice(x);
        self.mset.clear();
        if self.run.explore {
            self.run.time += 1;
        }
    }

    /// Run one episode against `env`.
    pub fn trial<E: Environment + ?Sized>(&mut self, env: &mut E, explore: bool) -> TrialOutcome {
        env.reset();
        self.set_explore(explore);
        self.init_trial();

        let limit = self.cfg.multistep.teletransportation;
        let max_payoff = env.max_payoff();
        let mut err = 0.0;
        let mut reward = 0.0;
        let mut reset = false;
        let mut steps = 0u32;
        while steps < limit && !reset {
            self.init_step();
            let state = env.state().to_vec();
            let action = self.decision(&state);
            reward = env.execute(action);
            reset = env.is_reset();
            self.update(&state, action, reward, reset);
            err += self.error(action, reward, reset, max_payoff);
            self.end_step(&state, action, reward);
            steps += 1;
        }
        self.end_trial();

        let error = if steps > 0 { err / steps as f64 } else { 0.0 };
        self.run.error += self.cfg.cl.beta * (error - self.run.error);
        let performance = if env.is_multistep() {
            steps as f64
        } else if reward > 0.0 {
            1.0
        } else {
            0.0
        };
        TrialOutcome {
            performance,
            error,
            steps,
        }
    }

    /// Run `max_trials` explore/exploit pairs. Every `perf_trials` pairs the
    /// windowed exploit performance is logged, recorded in the metrics and
    /// handed to each callback; any callback returning `true` stops the run.
    pub fn experiment<E, S>(
        &mut self,
        env: &mut E,
        sink: &mut S,
        callbacks: &mut [Box<dyn Callback>],
    ) -> Result<ExperimentSummary, XcsError>
    where
        E: Environment + ?Sized,
        S: EventSink + ?Sized,
    {
        let max_trials = self.cfg.general.max_trials;
        let perf_trials = self.cfg.general.perf_trials.max(1);
        let mut metrics = Metrics::default();
        let mut window_perf = OnlineStats::default();
        let mut window_err = OnlineStats::default();
        let mut total_perf = OnlineStats::default();
        let mut total_err = OnlineStats::default();
        let mut trials = 0;
        let mut stopped_early = false;

        for cnt in 0..max_trials {
            let explore = self.trial(env, true);
            sink.log_trial(&TrialRecord::new(cnt, true, &explore, self));
            let exploit = self.trial(env, false);
            sink.log_trial(&TrialRecord::new(cnt, false, &exploit, self));

            window_perf.add(exploit.performance);
            window_err.add(exploit.error);
            total_perf.add(exploit.performance);
            total_err.add(exploit.error);
            trials = cnt + 1;

            if trials % perf_trials == 0 {
                metrics.record(trials, &window_perf, &window_err, self);
                info!(
                    trials,
                    performance = window_perf.mean(),
                    error = window_err.mean(),
                    pop_num = self.pop.num_sum(),
                    pop_len = self.pop.len(),
                    mset_size = self.run.mset_size,
                    "performance window"
                );
                window_perf = OnlineStats::default();
                window_err = OnlineStats::default();

                let mut stop = false;
                for cb in callbacks.iter_mut() {
                    stop |= cb.run(self, &metrics)?;
                }
                if stop {
                    info!(trials, "stopped by callback");
                    stopped_early = true;
                    break;
                }
            }
        }

        for cb in callbacks.iter_mut() {
            cb.finish(self, &metrics)?;
        }
        sink.flush();

        Ok(ExperimentSummary {
            trials,
            mean_performance: total_perf.mean(),
            mean_error: total_err.mean(),
            stopped_early,
            metrics,
        })
    }
}
