// src/env.rs
//
// Contract between the trial driver and a problem environment.

/// A single- or multi-step decision problem.
///
/// The driver calls `reset` at trial start, then repeatedly reads `state`,
/// picks an action, calls `execute` and checks `is_reset`.
pub trait Environment {
    /// Start a new episode.
    fn reset(&mut self);

    /// Current input vector; its length must equal the run's `x_dim`.
    fn state(&self) -> &[f64];

    /// Apply `action` and return the immediate reward.
    fn execute(&mut self, action: usize) -> f64;

    /// Whether the episode reached a terminal state.
    fn is_reset(&self) -> bool;

    /// Largest reward the environment can pay; used to normalise errors.
    fn max_payoff(&self) -> f64;

    /// Multi-step problems report steps taken as performance; single-step
    /// problems report whether the final reward was positive.
    fn is_multistep(&self) -> bool;
}
