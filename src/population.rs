// src/population.rs
//
// Sole owner of classifier storage.
//
// Classifiers live in a generational arena. Sets refer to them by
// `ClassifierId { index, generation }`; freeing a slot bumps its generation
// so a stale id held by any set can never reach a newer occupant.
//
// Slot lifecycle: Live -> Retired (removed from the population, still held
// by the kill set until trial end) -> Vacant (reusable).

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classifier::Classifier;
use crate::clset::ClassifierSet;
use crate::config::Config;
use crate::error::PersistError;
use crate::persist::{StateReader, StateWriter};
use crate::random;

/// Stable handle to a population slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassifierId {
    index: u32,
    generation: u32,
}

impl ClassifierId {
    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ClassifierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone)]
enum Slot {
    Live(Classifier),
    Retired(Classifier),
    Vacant,
}

#[derive(Debug, Clone)]
struct Entry {
    generation: u32,
    slot: Slot,
}

#[derive(Debug, Clone, Default)]
pub struct Population {
    entries: Vec<Entry>,
    free: Vec<u32>,
    live: usize,
}

impl Population {
    pub fn new() -> Self {
        Self::default()
    }

    /// Distinct live classifiers.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Sum of live numerosities.
    pub fn num_sum(&self) -> u32 {
        self.iter().map(|(_, cl)| cl.num).sum()
    }

    pub fn insert(&mut self, cl: Classifier) -> ClassifierId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let entry = &mut self.entries[index as usize];
            entry.slot = Slot::Live(cl);
            return ClassifierId {
                index,
                generation: entry.generation,
            };
        }
        let index = self.entries.len() as u32;
        self.entries.push(Entry {
            generation: 0,
            slot: Slot::Live(cl),
        });
        ClassifierId {
            index,
            generation: 0,
        }
    }

    fn entry(&self, id: ClassifierId) -> Option<&Entry> {
        self.entries
            .get(id.index as usize)
            .filter(|e| e.generation == id.generation)
    }

    fn entry_mut(&mut self, id: ClassifierId) -> Option<&mut Entry> {
        self.entries
            .get_mut(id.index as usize)
            .filter(|e| e.generation == id.generation)
    }

    /// Live classifier behind `id`, if any.
    pub fn get(&self, id: ClassifierId) -> Option<&Classifier> {
        match self.entry(id).map(|e| &e.slot) {
            Some(Slot::Live(cl)) => Some(cl),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, id: ClassifierId) -> Option<&mut Classifier> {
        match self.entry_mut(id).map(|e| &mut e.slot) {
            Some(Slot::Live(cl)) => Some(cl),
            _ => None,
        }
    }

    pub fn contains(&self, id: ClassifierId) -> bool {
        self.get(id).is_some()
    }

    /// Whether `id` names a retired classifier awaiting release.
    pub fn is_retired(&self, id: ClassifierId) -> bool {
        matches!(self.entry(id).map(|e| &e.slot), Some(Slot::Retired(_)))
    }

    /// Take a live classifier out of the population without freeing its
    /// slot. Returns false if `id` is not live.
    pub fn retire(&mut self, id: ClassifierId) -> bool {
        let Some(entry) = self.entry_mut(id) else {
            return false;
        };
        match std::mem::replace(&mut entry.slot, Slot::Vacant) {
            Slot::Live(cl) => {
                entry.slot = Slot::Retired(cl);
                self.live -= 1;
                true
            }
            other => {
                entry.slot = other;
                false
            }
        }
    }

    /// Free a retired slot for reuse, invalidating every id that names it.
    pub fn release(&mut self, id: ClassifierId) -> Option<Classifier> {
        let entry = self.entry_mut(id)?;
        match std::mem::replace(&mut entry.slot, Slot::Vacant) {
            Slot::Retired(cl) => {
                entry.generation = entry.generation.wrapping_add(1);
                self.free.push(id.index);
                Some(cl)
            }
            other => {
                entry.slot = other;
                None
            }
        }
    }

    /// Remove a live classifier and free its slot immediately.
    pub fn remove(&mut self, id: ClassifierId) -> Option<Classifier> {
        if !self.retire(id) {
            return None;
        }
        self.release(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ClassifierId, &Classifier)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| match &e.slot {
                Slot::Live(cl) => Some((
                    ClassifierId {
                        index: i as u32,
                        generation: e.generation,
                    },
                    cl,
                )),
                _ => None,
            })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ClassifierId, &mut Classifier)> {
        self.entries
            .iter_mut()
            .enumerate()
            .filter_map(|(i, e)| {
                let generation = e.generation;
                match &mut e.slot {
                    Slot::Live(cl) => Some((
                        ClassifierId {
                            index: i as u32,
                            generation,
                        },
                        cl,
                    )),
                    _ => None,
                }
            })
    }

    pub fn ids(&self) -> Vec<ClassifierId> {
        self.iter().map(|(id, _)| id).collect()
    }

    /// Fitness per unit of numerosity across the population.
    pub fn mean_fitness(&self) -> f64 {
        let (fit, num) = self
            .iter()
            .fold((0.0, 0u64), |(f, n), (_, cl)| (f + cl.fit, n + cl.num as u64));
        if num == 0 {
            0.0
        } else {
            fit / num as f64
        }
    }

    /// Fill with random classifiers until `pop_size` is reached.
    pub fn seed_random<R: Rng + ?Sized>(&mut self, cfg: &Config, rng: &mut R, time: u32) {
        while self.num_sum() < cfg.general.pop_size {
            self.insert(Classifier::random(cfg, rng, 1.0, time));
        }
    }

    /// Remove one copy chosen by roulette over deletion votes. A classifier
    /// whose numerosity reaches zero is retired into `kset`.
    pub fn delete_one<R: Rng + ?Sized>(
        &mut self,
        cfg: &Config,
        rng: &mut R,
        kset: &mut ClassifierSet,
    ) -> Option<ClassifierId> {
        let avg_fit = self.mean_fitness();
        let votes: Vec<(ClassifierId, f64)> = self
            .iter()
            .map(|(id, cl)| (id, cl.deletion_vote(cfg, avg_fit)))
            .collect();
        let total: f64 = votes.iter().map(|(_, v)| v).sum();
        let victim = if total > 0.0 {
            let spin = random::uniform(rng, 0.0, total);
            let mut acc = 0.0;
            votes
                .iter()
                .find(|(_, v)| {
                    acc += v;
                    acc >= spin
                })
                .or(votes.last())
                .map(|(id, _)| *id)
        } else {
            votes.get(random::index(rng, votes.len())).map(|(id, _)| *id)
        }?;

        let cl = self.get_mut(victim)?;
        cl.num -= 1;
        if cl.num == 0 {
            self.retire(victim);
            kset.add(victim, 0);
            debug!(id = %victim, "deleted classifier");
        }
        Some(victim)
    }

    /// Delete until the numerosity sum fits `pop_size`.
    pub fn enforce_capacity<R: Rng + ?Sized>(
        &mut self,
        cfg: &Config,
        rng: &mut R,
        kset: &mut ClassifierSet,
    ) {
        let mut total = self.num_sum();
        while total > cfg.general.pop_size {
            if self.delete_one(cfg, rng, kset).is_none() {
                break;
            }
            total -= 1;
        }
    }

    /// Count followed by each live classifier.
    pub fn save<W: std::io::Write>(&self, w: &mut StateWriter<W>) -> Result<(), PersistError> {
        w.write_usize(self.live)?;
        for (_, cl) in self.iter() {
            cl.save(w)?;
        }
        Ok(())
    }

    /// Replaces the contents with what `save` wrote.
    pub fn load<R: std::io::Read>(
        r: &mut StateReader<R>,
        cfg: &Config,
    ) -> Result<Self, PersistError> {
        let n = r.read_count("pop.count")?;
        let mut pop = Self::new();
        for _ in 0..n {
            pop.insert(Classifier::load(r, cfg)?);
        }
        Ok(pop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn cfg() -> Config {
        Config::new(2, 1, 2)
    }

    #[test]
    fn test_stale_id_never_aliases_new_occupant() {
        let cfg = cfg();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut pop = Population::new();
        let a = pop.insert(Classifier::random(&cfg, &mut rng, 1.0, 0));
        assert!(pop.retire(a));
        assert!(pop.get(a).is_none());
        assert!(pop.is_retired(a));
        assert!(pop.release(a).is_some());
        let b = pop.insert(Classifier::random(&cfg, &mut rng, 1.0, 0));
        assert_eq!(a.index(), b.index());
        assert_ne!(a, b);
        assert!(pop.get(a).is_none());
        assert!(pop.get(b).is_some());
        assert!(!pop.retire(a));
        assert!(pop.release(a).is_none());
    }

    #[test]
    fn test_release_requires_retirement() {
        let cfg = cfg();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut pop = Population::new();
        let a = pop.insert(Classifier::random(&cfg, &mut rng, 1.0, 0));
        assert!(pop.release(a).is_none());
        assert!(pop.contains(a));
        assert!(pop.remove(a).is_some());
        assert!(pop.is_empty());
    }

    #[test]
    fn test_enforce_capacity_bounds_numerosity() {
        let mut cfg = cfg();
        cfg.general.pop_size = 20;
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut pop = Population::new();
        for _ in 0..15 {
            let mut cl = Classifier::random(&cfg, &mut rng, 1.0, 0);
            cl.num = 3;
            pop.insert(cl);
        }
        let mut kset = ClassifierSet::new();
        pop.enforce_capacity(&cfg, &mut rng, &mut kset);
        assert!(pop.num_sum() <= 20);
        assert_eq!(pop.num_sum(), 20);
        for id in kset.ids() {
            assert!(pop.is_retired(*id));
        }
    }

    #[test]
    fn test_seed_random_fills_to_capacity() {
        let mut cfg = cfg();
        cfg.general.pop_size = 50;
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut pop = Population::new();
        pop.seed_random(&cfg, &mut rng, 0);
        assert_eq!(pop.num_sum(), 50);
        assert_eq!(pop.len(), 50);
    }

    #[test]
    fn test_save_load() {
        let mut cfg = cfg();
        cfg.general.pop_size = 10;
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut pop = Population::new();
        pop.seed_random(&cfg, &mut rng, 3);
        let mut w = StateWriter::new(Vec::new());
        pop.save(&mut w).unwrap();
        let bytes = w.into_inner();
        let back = Population::load(&mut StateReader::new(bytes.as_slice()), &cfg).unwrap();
        let a: Vec<&Classifier> = pop.iter().map(|(_, c)| c).collect();
        let b: Vec<&Classifier> = back.iter().map(|(_, c)| c).collect();
        assert_eq!(a, b);
    }
}
