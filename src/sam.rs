// src/sam.rs
//
// Self-adaptive mutation (SAM).
//
// Each representation owns a short vector of mutation rates. Every entry is
// tagged with the rule used to adapt it; the rates are adapted in place right
// before they scale that step's mutation, so they evolve with the rule.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::PersistError;
use crate::random;

/// Smallest rate any rule may produce.
pub const MU_MIN: f64 = 0.0005;

/// Discrete ladder used by `SamType::RateSelect`.
pub const RATE_LADDER: [f64; 10] = [
    0.0005, 0.001, 0.002, 0.003, 0.005, 0.01, 0.015, 0.02, 0.05, 0.1,
];

/// Probability that a rate-select entry is redrawn on adaptation.
const RATE_SELECT_P: f64 = 0.1;

/// Adaptation rule for one mutation-rate entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SamType {
    /// Multiplicative log-normal: `mu *= exp(N(0, 1))`.
    LogNormal,
    /// Occasionally redraw from `RATE_LADDER`.
    RateSelect,
}

impl SamType {
    pub fn code(self) -> i32 {
        match self {
            SamType::LogNormal => 0,
            SamType::RateSelect => 1,
        }
    }

    pub fn from_code(code: i32) -> Result<Self, PersistError> {
        match code {
            0 => Ok(SamType::LogNormal),
            1 => Ok(SamType::RateSelect),
            tag => Err(PersistError::UnknownTag { kind: "sam", tag }),
        }
    }

    fn prior<R: Rng + ?Sized>(self, rng: &mut R) -> f64 {
        match self {
            SamType::LogNormal => random::uniform(rng, MU_MIN, 1.0),
            SamType::RateSelect => RATE_LADDER[random::index(rng, RATE_LADDER.len())],
        }
    }

    fn adapt<R: Rng + ?Sized>(self, rng: &mut R, mu: f64) -> f64 {
        match self {
            SamType::LogNormal => {
                let next = mu * random::gaussian(rng, 0.0, 1.0).exp();
                next.clamp(MU_MIN, 1.0)
            }
            SamType::RateSelect => {
                if random::chance(rng, RATE_SELECT_P) {
                    RATE_LADDER[random::index(rng, RATE_LADDER.len())]
                } else {
                    mu
                }
            }
        }
    }
}

/// Seed every entry from its rule's prior.
pub fn init<R: Rng + ?Sized>(rng: &mut R, mu: &mut [f64], types: &[SamType]) {
    debug_assert_eq!(mu.len(), types.len());
    for (m, t) in mu.iter_mut().zip(types) {
        *m = t.prior(rng);
    }
}

/// Allocate and seed a rate vector for `types`.
pub fn seeded<R: Rng + ?Sized>(rng: &mut R, types: &[SamType]) -> Vec<f64> {
    let mut mu = vec![0.0; types.len()];
    init(rng, &mut mu, types);
    mu
}

/// Perturb every entry in place according to its rule.
pub fn adapt<R: Rng + ?Sized>(rng: &mut R, mu: &mut [f64], types: &[SamType]) {
    debug_assert_eq!(mu.len(), types.len());
    for (m, t) in mu.iter_mut().zip(types) {
        *m = t.adapt(rng, *m);
    }
}
