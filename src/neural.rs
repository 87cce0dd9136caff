// src/neural.rs
//
// Minimal dense feed-forward network shared by the neural condition and the
// neural action: one hidden layer, forward pass, weight mutation and
// hidden-layer growth. No gradient training lives here.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::PersistError;
use crate::persist::{StateReader, StateWriter};
use crate::random;

/// Range weights are drawn from on (re)initialisation.
const WEIGHT_RANGE: f64 = 1.0;
/// Magnitude cap applied after mutation.
const WEIGHT_CLAMP: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    Logistic,
    Relu,
    Tanh,
    Linear,
    Gaussian,
    SoftPlus,
}

impl Activation {
    pub fn apply(self, x: f64) -> f64 {
        match self {
            Activation::Logistic => 1.0 / (1.0 + (-x).exp()),
            Activation::Relu => x.max(0.0),
            Activation::Tanh => x.tanh(),
            Activation::Linear => x,
            Activation::Gaussian => (-x * x).exp(),
            Activation::SoftPlus => (1.0 + x.exp()).ln(),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Activation::Logistic => 0,
            Activation::Relu => 1,
            Activation::Tanh => 2,
            Activation::Linear => 3,
            Activation::Gaussian => 4,
            Activation::SoftPlus => 5,
        }
    }

    pub fn from_code(code: i32) -> Result<Self, PersistError> {
        Ok(match code {
            0 => Activation::Logistic,
            1 => Activation::Relu,
            2 => Activation::Tanh,
            3 => Activation::Linear,
            4 => Activation::Gaussian,
            5 => Activation::SoftPlus,
            tag => return Err(PersistError::UnknownTag { kind: "activation", tag }),
        })
    }
}

/// Fully connected layer; `weights` is row-major `[n_outputs][n_inputs]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub n_inputs: usize,
    pub n_outputs: usize,
    pub weights: Vec<f64>,
    pub biases: Vec<f64>,
    pub activation: Activation,
}

impl Layer {
    pub fn new<R: Rng + ?Sized>(
        rng: &mut R,
        n_inputs: usize,
        n_outputs: usize,
        activation: Activation,
    ) -> Self {
        let mut layer = Self {
            n_inputs,
            n_outputs,
            weights: vec![0.0; n_inputs * n_outputs],
            biases: vec![0.0; n_outputs],
            activation,
        };
        layer.randomize(rng);
        layer
    }

    pub fn randomize<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        for w in self.weights.iter_mut().chain(self.biases.iter_mut()) {
            *w = random::uniform(rng, -WEIGHT_RANGE, WEIGHT_RANGE);
        }
    }

    /// Pre-activation sums.
    pub fn weighted_sums(&self, input: &[f64]) -> Vec<f64> {
        (0..self.n_outputs)
            .map(|o| {
                let row = &self.weights[o * self.n_inputs..(o + 1) * self.n_inputs];
                self.biases[o] + row.iter().zip(input).map(|(w, x)| w * x).sum::<f64>()
            })
            .collect()
    }

    pub fn forward(&self, input: &[f64]) -> Vec<f64> {
        self.weighted_sums(input)
            .into_iter()
            .map(|s| self.activation.apply(s))
            .collect()
    }

    fn mutate<R: Rng + ?Sized>(&mut self, rng: &mut R, mu: f64) -> bool {
        let mut changed = false;
        for w in self.weights.iter_mut().chain(self.biases.iter_mut()) {
            let orig = *w;
            *w = (*w + random::gaussian(rng, 0.0, mu)).clamp(-WEIGHT_CLAMP, WEIGHT_CLAMP);
            changed |= *w != orig;
        }
        changed
    }

    fn save<W: std::io::Write>(&self, w: &mut StateWriter<W>) -> Result<(), PersistError> {
        w.write_usize(self.n_inputs)?;
        w.write_usize(self.n_outputs)?;
        w.write_i32(self.activation.code())?;
        w.write_f64_slice(&self.weights)?;
        w.write_f64_slice(&self.biases)
    }

    fn load<R: std::io::Read>(r: &mut StateReader<R>) -> Result<Self, PersistError> {
        let n_inputs = r.read_count("layer.n_inputs")?;
        let n_outputs = r.read_count("layer.n_outputs")?;
        let activation = Activation::from_code(r.read_i32("layer.activation")?)?;
        let weights = r.read_f64_vec(n_inputs * n_outputs, "layer.weights")?;
        let biases = r.read_f64_vec(n_outputs, "layer.biases")?;
        Ok(Self {
            n_inputs,
            n_outputs,
            weights,
            biases,
            activation,
        })
    }
}

/// Inputs -> hidden -> outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub hidden: Layer,
    pub output: Layer,
}

impl Network {
    pub fn new<R: Rng + ?Sized>(
        rng: &mut R,
        n_inputs: usize,
        n_hidden: usize,
        n_outputs: usize,
        hidden_activation: Activation,
        output_activation: Activation,
    ) -> Self {
        let n_hidden = n_hidden.max(1);
        Self {
            hidden: Layer::new(rng, n_inputs, n_hidden, hidden_activation),
            output: Layer::new(rng, n_hidden, n_outputs, output_activation),
        }
    }

    pub fn n_hidden(&self) -> usize {
        self.hidden.n_outputs
    }

    pub fn n_outputs(&self) -> usize {
        self.output.n_outputs
    }

    pub fn hidden_outputs(&self, x: &[f64]) -> Vec<f64> {
        self.hidden.forward(x)
    }

    pub fn forward(&self, x: &[f64]) -> Vec<f64> {
        self.output.forward(&self.hidden.forward(x))
    }

    pub fn randomize<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.hidden.randomize(rng);
        self.output.randomize(rng);
    }

    /// Perturb every weight and bias by `N(0, mu)`.
    pub fn mutate_weights<R: Rng + ?Sized>(&mut self, rng: &mut R, mu: f64) -> bool {
        let a = self.hidden.mutate(rng, mu);
        let b = self.output.mutate(rng, mu);
        a || b
    }

    /// Add or remove up to `max_grow` hidden neurons, keeping the layer
    /// within `[1, max_hidden]`. Returns whether the layer changed size.
    pub fn mutate_neurons<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        mu: f64,
        max_grow: usize,
        max_hidden: usize,
    ) -> bool {
        if max_grow == 0 || !random::chance(rng, mu) {
            return false;
        }
        let step = 1 + random::index(rng, max_grow);
        let current = self.n_hidden();
        let target = if random::chance(rng, 0.5) {
            (current + step).min(max_hidden.max(1))
        } else {
            current.saturating_sub(step).max(1)
        };
        if target == current {
            return false;
        }
        self.resize_hidden(rng, target);
        true
    }

    fn resize_hidden<R: Rng + ?Sized>(&mut self, rng: &mut R, n_hidden: usize) {
        let n_in = self.hidden.n_inputs;
        let n_out = self.output.n_outputs;
        let old = self.n_hidden();
        self.hidden.weights.resize(n_hidden * n_in, 0.0);
        self.hidden.biases.resize(n_hidden, 0.0);
        for w in self.hidden.weights[old.min(n_hidden) * n_in..]
            .iter_mut()
            .chain(self.hidden.biases[old.min(n_hidden)..].iter_mut())
        {
            *w = random::uniform(rng, -WEIGHT_RANGE, WEIGHT_RANGE);
        }
        self.hidden.n_outputs = n_hidden;

        // Output rows are indexed by hidden neuron, so rebuild them column-wise.
        let mut weights = vec![0.0; n_out * n_hidden];
        for o in 0..n_out {
            for h in 0..n_hidden {
                weights[o * n_hidden + h] = if h < old {
                    self.output.weights[o * old + h]
                } else {
                    random::uniform(rng, -WEIGHT_RANGE, WEIGHT_RANGE)
                };
            }
        }
        self.output.weights = weights;
        self.output.n_inputs = n_hidden;
    }

    pub fn save<W: std::io::Write>(&self, w: &mut StateWriter<W>) -> Result<(), PersistError> {
        self.hidden.save(w)?;
        self.output.save(w)
    }

    pub fn load<R: std::io::Read>(r: &mut StateReader<R>) -> Result<Self, PersistError> {
        let hidden = Layer::load(r)?;
        let output = Layer::load(r)?;
        if output.n_inputs != hidden.n_outputs {
            return Err(PersistError::Inconsistent {
                field: "network.output.n_inputs",
                value: output.n_inputs as i64,
            });
        }
        Ok(Self { hidden, output })
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "network[{}-{}-{}]",
            self.hidden.n_inputs,
            self.n_hidden(),
            self.n_outputs()
        )
    }
}
