// src/ea.rs
//
// Rule discovery over an action set.
//
// Fires when the set's numerosity-weighted mean time since its last pass
// reaches `theta_ea`. Parents are picked by roulette or tournament on
// fitness; offspring are copied, recombined, mutated, optionally absorbed
// by a subsuming parent and inserted. The population is then shrunk back to
// `pop_size`, with deleted classifiers moving to the kill set.

use rand::Rng;
use tracing::debug;

use crate::classifier::Classifier;
use crate::clset::ClassifierSet;
use crate::config::{Config, SelectType};
use crate::population::{ClassifierId, Population};
use crate::prediction::Prediction;
use crate::random;

/// Run one rule-discovery pass over `set` if it is due. Returns whether
/// the pass fired.
pub fn run<R: Rng + ?Sized>(
    cfg: &Config,
    pop: &mut Population,
    rng: &mut R,
    set: &mut ClassifierSet,
    time: u32,
    kset: &mut ClassifierSet,
) -> bool {
    set.validate(pop);
    if set.is_empty() || (time as f64) - set.mean_time(pop) < cfg.ea.theta_ea {
        return false;
    }
    for id in set.ids() {
        if let Some(cl) = pop.get_mut(*id) {
            cl.time = time;
        }
    }

    let lambda = cfg.ea.lambda as usize;
    let mut produced = 0;
    while produced < lambda {
        let (Some(p1), Some(p2)) = (select(cfg, pop, rng, set), select(cfg, pop, rng, set)) else {
            break;
        };
        let (Some(parent1), Some(parent2)) = (pop.get(p1), pop.get(p2)) else {
            break;
        };
        let mut c1 = parent1.offspring(time);
        let mut c2 = parent2.offspring(time);
        let err = cfg.cl.err_reduc * (parent1.err + parent2.err) / 2.0;
        let fit = cfg.cl.fit_reduc
            * (parent1.fit / parent1.num as f64 + parent2.fit / parent2.num as f64)
            / 2.0;

        let crossed = c1.crossover(&mut c2, cfg, rng);
        let m1 = c1.mutate(cfg, rng);
        let m2 = c2.mutate(cfg, rng);
        for (child, mutated) in [(&mut c1, m1), (&mut c2, m2)] {
            if crossed || mutated {
                child.err = err;
                child.fit = fit.max(f64::MIN_POSITIVE);
            }
            if cfg.pred.reset {
                child.pred = Prediction::init(cfg, rng);
            }
        }

        insert_offspring(cfg, pop, c1, [p1, p2]);
        produced += 1;
        if produced < lambda {
            insert_offspring(cfg, pop, c2, [p1, p2]);
            produced += 1;
        }
    }

    pop.enforce_capacity(cfg, rng, kset);
    debug!(time, produced, "rule discovery");
    true
}

/// Absorb `child` into a subsuming parent, otherwise add it.
fn insert_offspring(cfg: &Config, pop: &mut Population, child: Classifier, parents: [ClassifierId; 2]) {
    if cfg.subsumption.ea_subsumption {
        for pid in parents {
            let absorbs = pop.get(pid).is_some_and(|p| p.subsumes(cfg, &child));
            if absorbs {
                if let Some(p) = pop.get_mut(pid) {
                    p.num += 1;
                }
                return;
            }
        }
    }
    pop.insert(child);
}

fn select<R: Rng + ?Sized>(
    cfg: &Config,
    pop: &Population,
    rng: &mut R,
    set: &ClassifierSet,
) -> Option<ClassifierId> {
    match cfg.ea.select_type {
        SelectType::Roulette => roulette(pop, rng, set),
        SelectType::Tournament => tournament(cfg, pop, rng, set),
    }
}

fn roulette<R: Rng + ?Sized>(pop: &Population, rng: &mut R, set: &ClassifierSet) -> Option<ClassifierId> {
    let total: f64 = set.iter(pop).map(|(_, cl)| cl.fit).sum();
    if total <= 0.0 {
        return set.ids().get(random::index(rng, set.len())).copied();
    }
    let spin = random::uniform(rng, 0.0, total);
    let mut acc = 0.0;
    let mut last = None;
    for (id, cl) in set.iter(pop) {
        acc += cl.fit;
        last = Some(id);
        if acc >= spin {
            return Some(id);
        }
    }
    last
}

/// Each member enters with probability `select_size`; the fittest entrant
/// wins. Redraws until someone enters.
fn tournament<R: Rng + ?Sized>(
    cfg: &Config,
    pop: &Population,
    rng: &mut R,
    set: &ClassifierSet,
) -> Option<ClassifierId> {
    if set.is_empty() {
        return None;
    }
    if cfg.ea.select_size <= 0.0 {
        return set.ids().get(random::index(rng, set.len())).copied();
    }
    loop {
        let mut winner: Option<(ClassifierId, f64)> = None;
        for (id, cl) in set.iter(pop) {
            if random::chance(rng, cfg.ea.select_size)
                && winner.map_or(true, |(_, best)| cl.fit > best)
            {
                winner = Some((id, cl.fit));
            }
        }
        if let Some((id, _)) = winner {
            return Some(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, IntegerAction};
    use crate::condition::{Condition, UbRectangle};
    use crate::prediction::ConstantPrediction;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn rule(cfg: &Config, lower: f64, upper: f64) -> Classifier {
        Classifier::from_parts(
            cfg,
            Condition::Rectangle(UbRectangle::from_bounds(vec![lower; 2], vec![upper; 2])),
            Action::Integer(IntegerAction::new(0)),
            Prediction::Constant(ConstantPrediction::new(vec![1.0])),
            2.0,
            0,
        )
    }

    fn filled(cfg: &Config, n: usize) -> (Population, ClassifierSet) {
        let mut pop = Population::new();
        let mut set = ClassifierSet::new();
        for i in 0..n {
            let id = pop.insert(rule(cfg, 0.1 * i as f64 / n as f64, 0.9));
            set.add(id, 1);
        }
        (pop, set)
    }

    #[test]
    fn test_not_due_does_nothing() {
        let cfg = Config::new(2, 1, 2);
        let (mut pop, mut set) = filled(&cfg, 4);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut kset = ClassifierSet::new();
        assert!(!run(&cfg, &mut pop, &mut rng, &mut set, 10, &mut kset));
        assert_eq!(pop.len(), 4);
    }

    #[test]
    fn test_fires_stamps_and_respects_capacity() {
        let mut cfg = Config::new(2, 1, 2);
        cfg.general.pop_size = 5;
        cfg.ea.lambda = 3;
        let (mut pop, mut set) = filled(&cfg, 5);
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut kset = ClassifierSet::new();
        assert!(run(&cfg, &mut pop, &mut rng, &mut set, 100, &mut kset));
        assert!(pop.num_sum() <= 5);
        assert_eq!(kset.len(), 3);
        for (_, cl) in set.iter(&pop) {
            assert_eq!(cl.time, 100);
        }
        assert!(!run(&cfg, &mut pop, &mut rng, &mut set, 120, &mut kset));
    }

    #[test]
    fn test_ea_subsumption_increments_parent() {
        // a single action keeps offspring actions equal to the parent's
        let mut cfg = Config::new(2, 1, 1);
        cfg.subsumption.ea_subsumption = true;
        cfg.ea.lambda = 2;
        cfg.ea.p_crossover = 0.0;
        let mut pop = Population::new();
        let mut parent = rule(&cfg, 0.0, 1.0);
        parent.exp = cfg.subsumption.theta_sub + 1;
        parent.err = 0.0;
        parent.fit = 1.0;
        let pid = pop.insert(parent);
        let mut set = ClassifierSet::new();
        set.add(pid, 1);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut kset = ClassifierSet::new();
        assert!(run(&cfg, &mut pop, &mut rng, &mut set, 100, &mut kset));
        // bounds are clamped to [0, 1], so every child is contained
        assert_eq!(pop.len(), 1);
        assert_eq!(pop.get(pid).unwrap().num, 3);
    }

    #[test]
    fn test_tournament_prefers_fitter() {
        let mut cfg = Config::new(2, 1, 2);
        cfg.ea.select_type = SelectType::Tournament;
        cfg.ea.select_size = 1.0;
        let (mut pop, set) = filled(&cfg, 3);
        let strong = set.ids()[1];
        pop.get_mut(strong).unwrap().fit = 0.9;
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        for _ in 0..20 {
            assert_eq!(select(&cfg, &pop, &mut rng, &set), Some(strong));
        }
    }

    #[test]
    fn test_roulette_never_picks_outside_set() {
        let cfg = Config::new(2, 1, 2);
        let (pop, set) = filled(&cfg, 6);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        for _ in 0..200 {
            let id = select(&cfg, &pop, &mut rng, &set).unwrap();
            assert!(set.contains(id));
        }
    }
}
