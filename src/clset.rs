// src/clset.rs
//
// Non-owning classifier sets plus the set-level operations of a step:
// match-set formation (with covering), action-set formation, credit
// assignment over a set and action-set subsumption.
//
// A set is a list of population ids with a cached numerosity sum. Dropping
// or clearing a set never touches the population. Ids may go stale when
// the population deletes a member; `validate` prunes them.

use rand::Rng;
use tracing::{debug, warn};

use crate::classifier::Classifier;
use crate::config::Config;
use crate::population::{ClassifierId, Population};

/// Covering/deletion rounds before giving up on full action coverage.
const MAX_COVER_ROUNDS: usize = 100;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifierSet {
    ids: Vec<ClassifierId>,
    size: u32,
}

impl ClassifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Distinct members.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Sum of member numerosities as of the last add/validate.
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn ids(&self) -> &[ClassifierId] {
        &self.ids
    }

    pub fn contains(&self, id: ClassifierId) -> bool {
        self.ids.contains(&id)
    }

    pub fn add(&mut self, id: ClassifierId, num: u32) {
        self.ids.push(id);
        self.size += num;
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.size = 0;
    }

    /// Take every id out of the set.
    pub fn drain(&mut self) -> Vec<ClassifierId> {
        self.size = 0;
        std::mem::take(&mut self.ids)
    }

    /// Drop ids that no longer name a live classifier and refresh `size`.
    pub fn validate(&mut self, pop: &Population) {
        self.ids.retain(|id| pop.contains(*id));
        self.size = self
            .ids
            .iter()
            .filter_map(|id| pop.get(*id))
            .map(|cl| cl.num)
            .sum();
    }

    /// Live members, in set order.
    pub fn iter<'a>(
        &'a self,
        pop: &'a Population,
    ) -> impl Iterator<Item = (ClassifierId, &'a Classifier)> + 'a {
        self.ids
            .iter()
            .filter_map(move |id| pop.get(*id).map(|cl| (*id, cl)))
    }

    /// Numerosity-weighted mean of the members' discovery time-stamps.
    pub fn mean_time(&self, pop: &Population) -> f64 {
        let (sum, num) = self.iter(pop).fold((0.0, 0u64), |(s, n), (_, cl)| {
            (s + cl.time as f64 * cl.num as f64, n + cl.num as u64)
        });
        if num == 0 {
            0.0
        } else {
            sum / num as f64
        }
    }
}

/// Every classifier matching `x`, covering each action left without an
/// advocate. Covering may push the population over capacity; deletions go
/// to `kset` and are pruned from the returned set.
pub fn match_set<R: Rng + ?Sized>(
    cfg: &Config,
    pop: &mut Population,
    rng: &mut R,
    x: &[f64],
    time: u32,
    kset: &mut ClassifierSet,
) -> ClassifierSet {
    let mut mset = ClassifierSet::new();
    for (id, cl) in pop.iter_mut() {
        if cl.matches(x) {
            mset.add(id, cl.num);
        }
    }

    for round in 0.. {
        let mut covered = vec![false; cfg.n_actions];
        for (_, cl) in mset.iter(pop) {
            if let Some(slot) = covered.get_mut(cl.action) {
                *slot = true;
            }
        }
        let missing: Vec<usize> = (0..cfg.n_actions).filter(|a| !covered[*a]).collect();
        if missing.is_empty() {
            break;
        }
        if round == MAX_COVER_ROUNDS {
            warn!(
                missing = missing.len(),
                pop_size = cfg.general.pop_size,
                "covering could not support every action; population too small?"
            );
            break;
        }
        for action in missing {
            let size = mset.size().max(1) as f64;
            let mut cl = Classifier::cover(cfg, rng, x, action, size, time);
            cl.matched = true;
            cl.mtotal = 1;
            let num = cl.num;
            let id = pop.insert(cl);
            mset.add(id, num);
            debug!(id = %id, action, "covered");
        }
        pop.enforce_capacity(cfg, rng, kset);
        mset.validate(pop);
    }
    mset
}

/// Members of `mset` advocating `action`.
pub fn action_set(pop: &Population, mset: &ClassifierSet, action: usize) -> ClassifierSet {
    let mut aset = ClassifierSet::new();
    for (id, cl) in mset.iter(pop) {
        if cl.action == action {
            aset.add(id, cl.num);
        }
    }
    aset
}

/// Credit assignment: update each member against payoff `y`, then share
/// fitness across the set, then (optionally) subsume within it.
pub fn update(
    cfg: &Config,
    pop: &mut Population,
    set: &mut ClassifierSet,
    x: &[f64],
    y: &[f64],
    kset: &mut ClassifierSet,
) {
    set.validate(pop);
    let size = set.size();
    for id in set.ids() {
        if let Some(cl) = pop.get_mut(*id) {
            cl.update(cfg, x, y, size);
        }
    }
    update_fitness(cfg, pop, set);
    if cfg.subsumption.set_subsumption {
        subsume(cfg, pop, set, kset);
    }
}

fn update_fitness(cfg: &Config, pop: &mut Population, set: &ClassifierSet) {
    let accs: Vec<(ClassifierId, f64)> = set
        .iter(pop)
        .map(|(id, cl)| (id, cl.accuracy(cfg)))
        .collect();
    let acc_sum: f64 = accs
        .iter()
        .filter_map(|(id, acc)| pop.get(*id).map(|cl| acc * cl.num as f64))
        .sum();
    for (id, acc) in accs {
        if let Some(cl) = pop.get_mut(id) {
            cl.update_fitness(cfg, acc, acc_sum);
        }
    }
}

/// Action-set subsumption: the most general eligible subsumer absorbs
/// every member it is more general than.
pub fn subsume(cfg: &Config, pop: &mut Population, set: &mut ClassifierSet, kset: &mut ClassifierSet) {
    let mut subsumer: Option<(ClassifierId, &Classifier)> = None;
    for (id, cl) in set.iter(pop) {
        if !cl.could_subsume(cfg) {
            continue;
        }
        let better = match subsumer {
            None => true,
            Some((_, best)) => cl.is_more_general_than(best),
        };
        if better {
            subsumer = Some((id, cl));
        }
    }
    let Some((sid, sub)) = subsumer else {
        return;
    };
    let victims: Vec<(ClassifierId, u32)> = set
        .iter(pop)
        .filter(|(id, cl)| *id != sid && sub.is_more_general_than(cl))
        .map(|(id, cl)| (id, cl.num))
        .collect();
    if victims.is_empty() {
        return;
    }

    let absorbed: u32 = victims.iter().map(|(_, n)| n).sum();
    for (id, _) in &victims {
        pop.retire(*id);
        kset.add(*id, 0);
    }
    if let Some(sub) = pop.get_mut(sid) {
        sub.num += absorbed;
    }
    debug!(id = %sid, absorbed, "set subsumption");
    set.validate(pop);
}
