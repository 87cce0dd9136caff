// src/prediction.rs
//
// Payoff estimators carried by each classifier.
// - Constant:   one scalar per output, Widrow-Hoff with MAM warm-up.
// - NlmsLinear: normalised least-mean-squares over `[x0, x...]`, with an
//               optionally self-adapted learning rate.

use std::fmt;

use rand::Rng;
use serde_json::json;

use crate::config::{Config, PredictionType};
use crate::error::PersistError;
use crate::persist::{StateReader, StateWriter};
use crate::random;
use crate::sam::{self, SamType};

/// Floor for a self-adapted NLMS learning rate.
const ETA_MIN: f64 = 0.0001;

const NLMS_MU_TYPE: [SamType; 1] = [SamType::LogNormal];

#[derive(Debug, Clone, PartialEq)]
pub struct ConstantPrediction {
    pub p: Vec<f64>,
}

impl ConstantPrediction {
    pub fn new(p: Vec<f64>) -> Self {
        Self { p }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NlmsPrediction {
    /// Row-major `[y_dim][x_dim + 1]`; column 0 multiplies `x0`.
    pub weights: Vec<f64>,
    pub eta: f64,
    pub mu: Vec<f64>,
    x_dim: usize,
}

impl NlmsPrediction {
    fn init<R: Rng + ?Sized>(cfg: &Config, rng: &mut R) -> Self {
        let (eta, mu) = if cfg.pred.evolve_eta {
            (
                random::uniform(rng, ETA_MIN, cfg.pred.eta),
                sam::seeded(rng, &NLMS_MU_TYPE),
            )
        } else {
            (cfg.pred.eta, vec![sam::MU_MIN; NLMS_MU_TYPE.len()])
        };
        Self {
            weights: vec![0.0; cfg.y_dim * (cfg.x_dim + 1)],
            eta,
            mu,
            x_dim: cfg.x_dim,
        }
    }

    fn row(&self, j: usize) -> &[f64] {
        let n = self.x_dim + 1;
        &self.weights[j * n..(j + 1) * n]
    }

    fn outputs(&self) -> usize {
        self.weights.len() / (self.x_dim + 1)
    }

    fn compute(&self, x0: f64, x: &[f64]) -> Vec<f64> {
        (0..self.outputs())
            .map(|j| {
                let w = self.row(j);
                w[0] * x0 + w[1..].iter().zip(x).map(|(wi, xi)| wi * xi).sum::<f64>()
            })
            .collect()
    }

    fn update(&mut self, x0: f64, x: &[f64], y: &[f64]) {
        let pred = self.compute(x0, x);
        let norm = x0 * x0 + x.iter().map(|v| v * v).sum::<f64>();
        if norm <= 0.0 {
            return;
        }
        let n = self.x_dim + 1;
        for (j, (p, t)) in pred.iter().zip(y).enumerate() {
            let correction = self.eta * (t - p) / norm;
            let w = &mut self.weights[j * n..(j + 1) * n];
            w[0] += correction * x0;
            for (wi, xi) in w[1..].iter_mut().zip(x) {
                *wi += correction * xi;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    Constant(ConstantPrediction),
    Nlms(NlmsPrediction),
}

impl Prediction {
    pub fn init<R: Rng + ?Sized>(cfg: &Config, rng: &mut R) -> Self {
        match cfg.pred.kind {
            PredictionType::Constant => {
                Prediction::Constant(ConstantPrediction::new(vec![0.0; cfg.y_dim]))
            }
            PredictionType::NlmsLinear => Prediction::Nlms(NlmsPrediction::init(cfg, rng)),
        }
    }

    pub fn kind(&self) -> PredictionType {
        match self {
            Prediction::Constant(_) => PredictionType::Constant,
            Prediction::Nlms(_) => PredictionType::NlmsLinear,
        }
    }

    /// Predicted payoff vector for `x`.
    pub fn compute(&self, cfg: &Config, x: &[f64]) -> Vec<f64> {
        match self {
            Prediction::Constant(c) => c.p.clone(),
            Prediction::Nlms(n) => n.compute(cfg.pred.x0, x),
        }
    }

    /// Move towards target `y`; `exp` is the owner's experience after
    /// this update was counted.
    pub fn update(&mut self, cfg: &Config, x: &[f64], y: &[f64], exp: u32) {
        match self {
            Prediction::Constant(c) => {
                let beta = cfg.cl.beta;
                let rate = if (exp as f64) * beta < 1.0 {
                    1.0 / exp.max(1) as f64
                } else {
                    beta
                };
                for (p, t) in c.p.iter_mut().zip(y) {
                    *p += rate * (t - *p);
                }
            }
            Prediction::Nlms(n) => n.update(cfg.pred.x0, x, y),
        }
    }

    pub fn mutate<R: Rng + ?Sized>(&mut self, cfg: &Config, rng: &mut R) -> bool {
        match self {
            Prediction::Nlms(n) if cfg.pred.evolve_eta => {
                sam::adapt(rng, &mut n.mu, &NLMS_MU_TYPE);
                let orig = n.eta;
                n.eta = (n.eta + random::gaussian(rng, 0.0, n.mu[0])).clamp(ETA_MIN, cfg.pred.eta);
                n.eta != orig
            }
            _ => false,
        }
    }

    pub fn crossover(&mut self, _other: &mut Prediction) -> bool {
        false
    }

    pub fn size(&self) -> f64 {
        match self {
            Prediction::Constant(c) => c.p.len() as f64,
            Prediction::Nlms(n) => n.weights.len() as f64,
        }
    }

    pub fn save<W: std::io::Write>(&self, w: &mut StateWriter<W>) -> Result<(), PersistError> {
        w.write_i32(self.kind().code())?;
        match self {
            Prediction::Constant(c) => {
                w.write_usize(c.p.len())?;
                w.write_f64_slice(&c.p)
            }
            Prediction::Nlms(n) => {
                w.write_usize(n.weights.len())?;
                w.write_f64_slice(&n.weights)?;
                w.write_f64(n.eta)?;
                w.write_f64_slice(&n.mu)
            }
        }
    }

    pub fn load<R: std::io::Read>(
        r: &mut StateReader<R>,
        cfg: &Config,
    ) -> Result<Self, PersistError> {
        let tag = r.read_i32("prediction.tag")?;
        let kind = PredictionType::from_code(tag).map_err(|_| PersistError::UnknownTag {
            kind: "prediction",
            tag,
        })?;
        let n = r.read_positive("prediction.len")?;
        match kind {
            PredictionType::Constant => {
                if n != cfg.y_dim {
                    return Err(PersistError::Inconsistent {
                        field: "prediction.len",
                        value: n as i64,
                    });
                }
                Ok(Prediction::Constant(ConstantPrediction::new(
                    r.read_f64_vec(n, "prediction.p")?,
                )))
            }
            PredictionType::NlmsLinear => {
                if n != cfg.y_dim * (cfg.x_dim + 1) {
                    return Err(PersistError::Inconsistent {
                        field: "prediction.len",
                        value: n as i64,
                    });
                }
                Ok(Prediction::Nlms(NlmsPrediction {
                    weights: r.read_f64_vec(n, "prediction.weights")?,
                    eta: r.read_f64("prediction.eta")?,
                    mu: r.read_f64_vec(NLMS_MU_TYPE.len(), "prediction.mu")?,
                    x_dim: cfg.x_dim,
                }))
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Prediction::Constant(c) => json!({ "type": "constant", "prediction": c.p }),
            Prediction::Nlms(n) => json!({
                "type": "nlms_linear",
                "weights": n.weights,
                "eta": n.eta,
                "mutation": n.mu,
            }),
        }
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prediction::Constant(c) => write!(f, "constant prediction: {:?}", c.p),
            Prediction::Nlms(n) => write!(f, "nlms prediction: eta={:.5} w={:?}", n.eta, n.weights),
        }
    }
}
