// src/persist.rs
//
// Fixed-order little-endian state layout.
// - StateWriter / StateReader: i32, f64 and single-byte bool primitives.
// - save_params / load_params: run state followed by every parameter
//   section, in a fixed order.
//
// The layout carries no magic number or format version; the build version
// is reported separately via `config::VERSION`. Readers must therefore be
// paired with writers from the same build.

use std::io::{self, Read, Write};

use crate::config::{
    ActionConfig, ActionType, ClassifierConfig, ConditionConfig, ConditionType, Config, EaConfig,
    GeneralConfig, LossFunc, MultistepConfig, PredictionConfig, PredictionType, SelectType,
    SubsumptionConfig, MAX_LAYERS,
};
use crate::error::PersistError;
use crate::neural::Activation;
use crate::xcs::RunState;

pub struct StateWriter<W: Write> {
    inner: W,
    written: usize,
}

impl<W: Write> StateWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    /// Bytes written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn flush(&mut self) -> Result<(), PersistError> {
        self.inner.flush()?;
        Ok(())
    }

    fn put(&mut self, bytes: &[u8]) -> Result<(), PersistError> {
        self.inner.write_all(bytes)?;
        self.written += bytes.len();
        Ok(())
    }

    pub fn write_i32(&mut self, v: i32) -> Result<(), PersistError> {
        self.put(&v.to_le_bytes())
    }

    /// Counts and dimensions are stored as `i32`.
    pub fn write_usize(&mut self, v: usize) -> Result<(), PersistError> {
        let v = i32::try_from(v).map_err(|_| PersistError::Inconsistent {
            field: "count",
            value: v as i64,
        })?;
        self.write_i32(v)
    }

    pub fn write_u32(&mut self, v: u32) -> Result<(), PersistError> {
        self.write_usize(v as usize)
    }

    pub fn write_f64(&mut self, v: f64) -> Result<(), PersistError> {
        self.put(&v.to_le_bytes())
    }

    pub fn write_bool(&mut self, v: bool) -> Result<(), PersistError> {
        self.put(&[v as u8])
    }

    pub fn write_f64_slice(&mut self, v: &[f64]) -> Result<(), PersistError> {
        for x in v {
            self.write_f64(*x)?;
        }
        Ok(())
    }

    /// Fixed-length `MAX_LAYERS` array, zero padded.
    pub fn write_layers(&mut self, layers: &[i32]) -> Result<(), PersistError> {
        for i in 0..MAX_LAYERS {
            self.write_i32(layers.get(i).copied().unwrap_or(0))?;
        }
        Ok(())
    }
}

pub struct StateReader<R: Read> {
    inner: R,
}

impl<R: Read> StateReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    fn take<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], PersistError> {
        let mut buf = [0u8; N];
        match self.inner.read_exact(&mut buf) {
            Ok(()) => Ok(buf),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                Err(PersistError::Truncated { field })
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn read_i32(&mut self, field: &'static str) -> Result<i32, PersistError> {
        Ok(i32::from_le_bytes(self.take::<4>(field)?))
    }

    /// A non-negative `i32` count.
    pub fn read_count(&mut self, field: &'static str) -> Result<usize, PersistError> {
        let v = self.read_i32(field)?;
        usize::try_from(v).map_err(|_| PersistError::Inconsistent {
            field,
            value: v as i64,
        })
    }

    /// A strictly positive `i32` count.
    pub fn read_positive(&mut self, field: &'static str) -> Result<usize, PersistError> {
        let v = self.read_i32(field)?;
        if v < 1 {
            return Err(PersistError::Inconsistent {
                field,
                value: v as i64,
            });
        }
        Ok(v as usize)
    }

    pub fn read_u32(&mut self, field: &'static str) -> Result<u32, PersistError> {
        Ok(self.read_count(field)? as u32)
    }

    pub fn read_f64(&mut self, field: &'static str) -> Result<f64, PersistError> {
        Ok(f64::from_le_bytes(self.take::<8>(field)?))
    }

    pub fn read_bool(&mut self, field: &'static str) -> Result<bool, PersistError> {
        Ok(self.take::<1>(field)?[0] != 0)
    }

    pub fn read_f64_vec(&mut self, n: usize, field: &'static str) -> Result<Vec<f64>, PersistError> {
        (0..n).map(|_| self.read_f64(field)).collect()
    }

    /// Reads a zero-padded `MAX_LAYERS` array, keeping the leading
    /// non-zero entries.
    pub fn read_layers(&mut self, field: &'static str) -> Result<Vec<i32>, PersistError> {
        let mut raw = Vec::with_capacity(MAX_LAYERS);
        for _ in 0..MAX_LAYERS {
            raw.push(self.read_i32(field)?);
        }
        Ok(raw.into_iter().take_while(|&n| n > 0).collect())
    }
}

fn tag_error(kind: &'static str, code: i32) -> PersistError {
    PersistError::UnknownTag { kind, tag: code }
}

/// Writes run state then every parameter section.
pub fn save_params<W: Write>(
    w: &mut StateWriter<W>,
    run: &RunState,
    cfg: &Config,
) -> Result<(), PersistError> {
    w.write_u32(run.time)?;
    w.write_f64(run.error)?;
    w.write_f64(run.mset_size)?;
    w.write_f64(run.mfrac)?;
    w.write_bool(run.explore)?;
    w.write_usize(cfg.x_dim)?;
    w.write_usize(cfg.y_dim)?;
    w.write_usize(cfg.n_actions)?;

    // general
    let g = &cfg.general;
    w.write_i32(g.num_threads)?;
    w.write_bool(g.pop_init)?;
    w.write_u32(g.max_trials)?;
    w.write_u32(g.perf_trials)?;
    w.write_u32(g.pop_size)?;
    w.write_i32(g.loss_func.code())?;
    // seed is split into two halves to stay within the i32/f64 primitive set
    w.write_i32((cfg.seed >> 32) as u32 as i32)?;
    w.write_i32(cfg.seed as u32 as i32)?;

    // multistep
    w.write_u32(cfg.multistep.teletransportation)?;
    w.write_f64(cfg.multistep.gamma)?;
    w.write_f64(cfg.multistep.p_explore)?;

    // ea
    let ea = &cfg.ea;
    w.write_i32(ea.select_type.code())?;
    w.write_f64(ea.select_size)?;
    w.write_f64(ea.theta_ea)?;
    w.write_u32(ea.lambda)?;
    w.write_f64(ea.p_crossover)?;

    // subsumption
    w.write_bool(cfg.subsumption.ea_subsumption)?;
    w.write_bool(cfg.subsumption.set_subsumption)?;
    w.write_u32(cfg.subsumption.theta_sub)?;

    // classifier general
    let cl = &cfg.cl;
    w.write_f64(cl.eps_0)?;
    w.write_f64(cl.alpha)?;
    w.write_f64(cl.nu)?;
    w.write_f64(cl.beta)?;
    w.write_f64(cl.delta)?;
    w.write_u32(cl.theta_del)?;
    w.write_f64(cl.init_fitness)?;
    w.write_f64(cl.init_error)?;
    w.write_f64(cl.err_reduc)?;
    w.write_f64(cl.fit_reduc)?;

    // condition
    let c = &cfg.cond;
    w.write_i32(c.kind.code())?;
    w.write_f64(c.eta)?;
    w.write_f64(c.min)?;
    w.write_f64(c.max)?;
    w.write_f64(c.spread_min)?;
    w.write_usize(c.gp_cons.len())?;
    w.write_f64_slice(&c.gp_cons)?;
    w.write_layers(&c.num_neurons)?;
    w.write_layers(&c.max_neurons)?;
    w.write_i32(c.max_neuron_grow)?;
    w.write_bool(c.evolve_weights)?;
    w.write_bool(c.evolve_neurons)?;
    w.write_i32(c.hidden_activation.code())?;
    w.write_i32(c.output_activation.code())?;

    // prediction
    let p = &cfg.pred;
    w.write_i32(p.kind.code())?;
    w.write_bool(p.evolve_eta)?;
    w.write_f64(p.eta)?;
    w.write_bool(p.reset)?;
    w.write_f64(p.x0)?;

    // action
    w.write_i32(cfg.act.kind.code())
}

/// Reads what `save_params` wrote.
pub fn load_params<R: Read>(r: &mut StateReader<R>) -> Result<(RunState, Config), PersistError> {
    let run = RunState {
        time: r.read_u32("time")?,
        error: r.read_f64("error")?,
        mset_size: r.read_f64("mset_size")?,
        mfrac: r.read_f64("mfrac")?,
        explore: r.read_bool("explore")?,
    };
    let x_dim = r.read_positive("x_dim")?;
    let y_dim = r.read_positive("y_dim")?;
    let n_actions = r.read_positive("n_actions")?;

    let num_threads = r.read_i32("num_threads")?;
    let pop_init = r.read_bool("pop_init")?;
    let max_trials = r.read_u32("max_trials")?;
    let perf_trials = r.read_u32("perf_trials")?;
    let pop_size = r.read_u32("pop_size")?;
    let loss_code = r.read_i32("loss_func")?;
    let loss_func = LossFunc::from_code(loss_code).map_err(|_| tag_error("loss", loss_code))?;
    let seed_hi = r.read_i32("seed")? as u32 as u64;
    let seed_lo = r.read_i32("seed")? as u32 as u64;
    let general = GeneralConfig {
        num_threads,
        pop_init,
        max_trials,
        perf_trials,
        pop_size,
        loss_func,
    };

    let multistep = MultistepConfig {
        teletransportation: r.read_u32("teletransportation")?,
        gamma: r.read_f64("gamma")?,
        p_explore: r.read_f64("p_explore")?,
    };

    let select_code = r.read_i32("ea.select_type")?;
    let ea = EaConfig {
        select_type: SelectType::from_code(select_code)
            .map_err(|_| tag_error("selection", select_code))?,
        select_size: r.read_f64("ea.select_size")?,
        theta_ea: r.read_f64("ea.theta_ea")?,
        lambda: r.read_u32("ea.lambda")?,
        p_crossover: r.read_f64("ea.p_crossover")?,
    };

    let subsumption = SubsumptionConfig {
        ea_subsumption: r.read_bool("ea_subsumption")?,
        set_subsumption: r.read_bool("set_subsumption")?,
        theta_sub: r.read_u32("theta_sub")?,
    };

    let cl = ClassifierConfig {
        eps_0: r.read_f64("eps_0")?,
        alpha: r.read_f64("alpha")?,
        nu: r.read_f64("nu")?,
        beta: r.read_f64("beta")?,
        delta: r.read_f64("delta")?,
        theta_del: r.read_u32("theta_del")?,
        init_fitness: r.read_f64("init_fitness")?,
        init_error: r.read_f64("init_error")?,
        err_reduc: r.read_f64("err_reduc")?,
        fit_reduc: r.read_f64("fit_reduc")?,
    };

    let cond_code = r.read_i32("cond.type")?;
    let kind = ConditionType::from_code(cond_code).map_err(|_| tag_error("condition", cond_code))?;
    let eta = r.read_f64("cond.eta")?;
    let min = r.read_f64("cond.min")?;
    let max = r.read_f64("cond.max")?;
    let spread_min = r.read_f64("cond.spread_min")?;
    let gp_num_cons = r.read_positive("gp_num_cons")?;
    let gp_cons = r.read_f64_vec(gp_num_cons, "gp_cons")?;
    let num_neurons = r.read_layers("cond.num_neurons")?;
    let max_neurons = r.read_layers("cond.max_neurons")?;
    let max_neuron_grow = r.read_i32("cond.max_neuron_grow")?;
    let evolve_weights = r.read_bool("cond.evolve_weights")?;
    let evolve_neurons = r.read_bool("cond.evolve_neurons")?;
    let hidden_activation = Activation::from_code(r.read_i32("cond.hidden_activation")?)?;
    let output_activation = Activation::from_code(r.read_i32("cond.output_activation")?)?;
    let cond = ConditionConfig {
        kind,
        eta,
        min,
        max,
        spread_min,
        gp_num_cons,
        gp_cons,
        num_neurons,
        max_neurons,
        max_neuron_grow,
        evolve_weights,
        evolve_neurons,
        hidden_activation,
        output_activation,
    };

    let pred_code = r.read_i32("pred.type")?;
    let pred = PredictionConfig {
        kind: PredictionType::from_code(pred_code)
            .map_err(|_| tag_error("prediction", pred_code))?,
        evolve_eta: r.read_bool("pred.evolve_eta")?,
        eta: r.read_f64("pred.eta")?,
        reset: r.read_bool("pred.reset")?,
        x0: r.read_f64("pred.x0")?,
    };

    let act_code = r.read_i32("act.type")?;
    let act = ActionConfig {
        kind: ActionType::from_code(act_code).map_err(|_| tag_error("action", act_code))?,
    };

    let cfg = Config {
        x_dim,
        y_dim,
        n_actions,
        seed: (seed_hi << 32) | seed_lo,
        general,
        multistep,
        ea,
        subsumption,
        cl,
        cond,
        pred,
        act,
    };
    Ok((run, cfg))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated() -> (RunState, Config) {
        let mut cfg = Config::new(3, 2, 5).with_seed(0xDEAD_BEEF_1234_5678);
        cfg.set_condition_type("neural").unwrap();
        cfg.set_prediction_type("constant").unwrap();
        cfg.multistep.gamma = 0.71;
        cfg.ea.select_type = SelectType::Tournament;
        cfg.subsumption.set_subsumption = true;
        cfg.cl.theta_del = 33;
        cfg.cond.gp_num_cons = 4;
        cfg.cond.gp_cons = vec![0.25, -1.5, 3.0, 7.75];
        cfg.cond.num_neurons = vec![5, 3];
        cfg.cond.max_neurons = vec![12, 6];
        cfg.pred.x0 = 0.5;
        let run = RunState {
            time: 4242,
            error: 0.125,
            mset_size: 17.5,
            mfrac: 0.33,
            explore: true,
        };
        (run, cfg)
    }

    fn encode(run: &RunState, cfg: &Config) -> Vec<u8> {
        let mut w = StateWriter::new(Vec::new());
        save_params(&mut w, run, cfg).unwrap();
        w.into_inner()
    }

    #[test]
    fn test_params_round_trip_preserves_every_field() {
        let (run, cfg) = populated();
        let bytes = encode(&run, &cfg);
        let (run2, cfg2) = load_params(&mut StateReader::new(bytes.as_slice())).unwrap();
        assert_eq!(run2, run);
        assert_eq!(cfg2, cfg);
        assert_eq!(cfg2.cond.gp_cons, vec![0.25, -1.5, 3.0, 7.75]);
    }

    #[test]
    fn test_run_state_prefix_layout() {
        let (run, cfg) = populated();
        let bytes = encode(&run, &cfg);
        assert_eq!(i32::from_le_bytes(bytes[0..4].try_into().unwrap()), 4242);
        assert_eq!(f64::from_le_bytes(bytes[4..12].try_into().unwrap()), 0.125);
        assert_eq!(bytes[28], 1);
        assert_eq!(i32::from_le_bytes(bytes[29..33].try_into().unwrap()), 3);
    }

    #[test]
    fn test_truncated_stream_is_error() {
        let (run, cfg) = populated();
        let bytes = encode(&run, &cfg);
        for cut in [0, 3, 30, bytes.len() / 2, bytes.len() - 1] {
            let err = load_params(&mut StateReader::new(&bytes[..cut])).unwrap_err();
            assert!(matches!(err, PersistError::Truncated { .. }), "cut {cut}: {err:?}");
        }
    }

    #[test]
    fn test_zero_dimension_is_inconsistent() {
        let (run, mut cfg) = populated();
        cfg.x_dim = 0;
        let bytes = encode(&run, &cfg);
        let err = load_params(&mut StateReader::new(bytes.as_slice())).unwrap_err();
        assert!(matches!(err, PersistError::Inconsistent { field: "x_dim", value: 0 }));
    }

    #[test]
    fn test_empty_constants_table_is_inconsistent() {
        let (run, mut cfg) = populated();
        cfg.cond.gp_cons.clear();
        let bytes = encode(&run, &cfg);
        let err = load_params(&mut StateReader::new(bytes.as_slice())).unwrap_err();
        assert!(matches!(err, PersistError::Inconsistent { field: "gp_num_cons", .. }));
    }

    #[test]
    fn test_bad_condition_tag() {
        let (run, cfg) = populated();
        let mut bytes = encode(&run, &cfg);
        // condition tag follows run state (41), general (4+1+4*3+4+8),
        // multistep (4+16), ea (4+16+4+8), subsumption (2+4), classifier (9*8+4)
        let offset = 41 + 29 + 20 + 32 + 6 + 76;
        bytes[offset..offset + 4].copy_from_slice(&99i32.to_le_bytes());
        let err = load_params(&mut StateReader::new(bytes.as_slice())).unwrap_err();
        assert!(matches!(err, PersistError::UnknownTag { kind: "condition", tag: 99 }));
    }
}
