// src/condition/rectangle.rs
//
// Unordered-bound hyperrectangle condition.
//
// Each input dimension carries two bounds that may arrive in either order
// (mutation and crossover move them independently); `reorder_and_resize`
// restores `lower <= upper` and a minimum half-spread after every change.

use std::fmt;

use rand::Rng;
use serde_json::json;

use crate::config::Config;
use crate::error::PersistError;
use crate::persist::{StateReader, StateWriter};
use crate::random;
use crate::sam::{self, SamType, MU_MIN};

const MU_TYPE: [SamType; 1] = [SamType::LogNormal];

#[derive(Debug, Clone, PartialEq)]
pub struct UbRectangle {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    /// Self-adaptive mutation rate.
    pub mu: Vec<f64>,
}

impl UbRectangle {
    /// Rectangle with explicit bounds. Bounds are used as given; call
    /// `reorder_and_resize` to normalise them.
    pub fn from_bounds(lower: Vec<f64>, upper: Vec<f64>) -> Self {
        debug_assert_eq!(lower.len(), upper.len());
        Self {
            lower,
            upper,
            mu: vec![MU_MIN; MU_TYPE.len()],
        }
    }

    /// Random bounds drawn uniformly over the input range.
    pub fn init<R: Rng + ?Sized>(cfg: &Config, rng: &mut R) -> Self {
        let c = &cfg.cond;
        let mut rect = Self {
            lower: (0..cfg.x_dim).map(|_| random::uniform(rng, c.min, c.max)).collect(),
            upper: (0..cfg.x_dim).map(|_| random::uniform(rng, c.min, c.max)).collect(),
            mu: sam::seeded(rng, &MU_TYPE),
        };
        rect.reorder_and_resize(c.spread_min);
        rect
    }

    pub fn dims(&self) -> usize {
        self.lower.len()
    }

    pub fn center(&self, i: usize) -> f64 {
        (self.lower[i] + self.upper[i]) / 2.0
    }

    pub fn half_spread(&self, i: usize) -> f64 {
        (self.upper[i] - self.lower[i]) / 2.0
    }

    /// Swap inverted bounds, then widen any dimension whose half-spread is
    /// below `spread_min` symmetrically about its centre. Afterwards
    /// `half_spread(i) >= spread_min` holds exactly, so a second pass is a
    /// no-op.
    pub fn reorder_and_resize(&mut self, spread_min: f64) {
        for i in 0..self.dims() {
            if self.lower[i] > self.upper[i] {
                std::mem::swap(&mut self.lower[i], &mut self.upper[i]);
            }
            if self.half_spread(i) < spread_min {
                let c = self.center(i);
                self.lower[i] = c - spread_min;
                self.upper[i] = c + spread_min;
                // rounding can leave the spread an ulp short
                while self.half_spread(i) < spread_min && self.upper[i].is_finite() {
                    self.upper[i] = next_up(self.upper[i]);
                }
            }
        }
    }

    /// Chebyshev distance to the centre scaled by the half-spread:
    /// 0 at the centre, 1 on the border.
    pub fn distance(&self, x: &[f64]) -> f64 {
        let mut dist: f64 = 0.0;
        for (i, xi) in x.iter().enumerate().take(self.dims()) {
            let offset = (xi - self.center(i)).abs();
            let half = self.half_spread(i);
            let d = if half > 0.0 {
                offset / half
            } else if offset == 0.0 {
                0.0
            } else {
                f64::INFINITY
            };
            dist = dist.max(d);
        }
        dist
    }

    pub fn matches(&self, x: &[f64]) -> bool {
        self.distance(x) < 1.0
    }

    pub fn cover<R: Rng + ?Sized>(&mut self, cfg: &Config, rng: &mut R, x: &[f64]) {
        let c = &cfg.cond;
        let max_spread = (c.max - c.min).abs();
        for (i, xi) in x.iter().enumerate().take(self.dims()) {
            let s = random::uniform(rng, c.spread_min, max_spread);
            self.lower[i] = xi - s;
            self.upper[i] = xi + s;
        }
        self.reorder_and_resize(c.spread_min);
    }

    pub fn mutate<R: Rng + ?Sized>(&mut self, cfg: &Config, rng: &mut R) -> bool {
        let c = &cfg.cond;
        sam::adapt(rng, &mut self.mu, &MU_TYPE);
        let mu = self.mu[0];
        let mut changed = false;
        for b in self.lower.iter_mut().chain(self.upper.iter_mut()) {
            let orig = *b;
            *b = (*b + random::gaussian(rng, 0.0, mu)).clamp(c.min, c.max);
            changed |= *b != orig;
        }
        self.reorder_and_resize(c.spread_min);
        changed
    }

    /// Independent per-dimension swaps of lower and upper bounds.
    pub fn crossover<R: Rng + ?Sized>(
        &mut self,
        other: &mut UbRectangle,
        cfg: &Config,
        rng: &mut R,
    ) -> bool {
        let p = cfg.ea.p_crossover;
        let mut changed = false;
        for i in 0..self.dims().min(other.dims()) {
            if random::chance(rng, p) {
                std::mem::swap(&mut self.lower[i], &mut other.lower[i]);
                changed = true;
            }
            if random::chance(rng, p) {
                std::mem::swap(&mut self.upper[i], &mut other.upper[i]);
                changed = true;
            }
        }
        if changed {
            self.reorder_and_resize(cfg.cond.spread_min);
            other.reorder_and_resize(cfg.cond.spread_min);
        }
        changed
    }

    /// True iff `self` contains `other` in every dimension.
    pub fn is_more_general_than(&self, other: &UbRectangle) -> bool {
        self.dims() == other.dims()
            && (0..self.dims())
                .all(|i| self.lower[i] <= other.lower[i] && self.upper[i] >= other.upper[i])
    }

    /// Drift the centre towards `x`, keeping each spread.
    pub fn update(&mut self, cfg: &Config, x: &[f64]) {
        let eta = cfg.cond.eta;
        if eta <= 0.0 {
            return;
        }
        for (i, xi) in x.iter().enumerate().take(self.dims()) {
            let half = self.half_spread(i);
            let c = self.center(i) + eta * (xi - self.center(i));
            self.lower[i] = c - half;
            self.upper[i] = c + half;
        }
    }

    pub fn size(&self) -> f64 {
        self.dims() as f64
    }

    pub fn save<W: std::io::Write>(&self, w: &mut StateWriter<W>) -> Result<(), PersistError> {
        w.write_usize(self.dims())?;
        w.write_f64_slice(&self.lower)?;
        w.write_f64_slice(&self.upper)?;
        w.write_f64_slice(&self.mu)
    }

    pub fn load<R: std::io::Read>(
        r: &mut StateReader<R>,
        cfg: &Config,
    ) -> Result<Self, PersistError> {
        let dims = r.read_positive("rectangle.dims")?;
        if dims != cfg.x_dim {
            return Err(PersistError::Inconsistent {
                field: "rectangle.dims",
                value: dims as i64,
            });
        }
        Ok(Self {
            lower: r.read_f64_vec(dims, "rectangle.lower")?,
            upper: r.read_f64_vec(dims, "rectangle.upper")?,
            mu: r.read_f64_vec(MU_TYPE.len(), "rectangle.mu")?,
        })
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "type": "ub_hyperrectangle",
            "lower": self.lower,
            "upper": self.upper,
            "mutation": self.mu,
        })
    }
}

impl fmt::Display for UbRectangle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rectangle:")?;
        for i in 0..self.dims() {
            write!(f, " ({:.5}, {:.5})", self.lower[i], self.upper[i])?;
        }
        Ok(())
    }
}

/// Smallest float greater than finite `x`.
fn next_up(x: f64) -> f64 {
    if x == 0.0 {
        f64::from_bits(1)
    } else if x > 0.0 {
        f64::from_bits(x.to_bits() + 1)
    } else {
        f64::from_bits(x.to_bits() - 1)
    }
}
