use std::collections::HashMap;
use std::collections::HashSet;
use std::hash::BuildHasherDefault;

use nohash::BuildNoHashHasher;

use crate::error::NetworkError;
use crate::rates::DistanceGrowth;
use crate::Lineage;

/// Key for an unordered pair of lineages.
///
/// The smaller index goes in the high half, so `(a, b)` and `(b, a)`
/// map to the same key.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
struct PairKey(u64);

impl nohash::IsEnabled for PairKey {}

impl PairKey {
    fn new(a: Lineage, b: Lineage) -> Self {
        let (lo, hi) = if a.0 <= b.0 { (a.0, b.0) } else { (b.0, a.0) };
        debug_assert!(hi <= u32::MAX as usize);
        Self(((lo as u64) << 32) | hi as u64)
    }
}

/// Distance `base` as of time `since`.
#[derive(Debug, Copy, Clone)]
struct PairDistance {
    base: f64,
    since: f64,
}

type LineageHash = HashSet<Lineage, BuildNoHashHasher<usize>>;
type PairMap = HashMap<PairKey, PairDistance, BuildNoHashHasher<u64>>;

/// Pairwise distances between extant lineages.
///
/// Stored values are snapshots; the growth rule is applied when a
/// distance is read, so advancing time costs nothing.
#[derive(Debug)]
pub struct DistanceTracker<G> {
    growth: G,
    now: f64,
    extant: LineageHash,
    pairs: PairMap,
}

impl<G: DistanceGrowth> DistanceTracker<G> {
    pub fn new(growth: G) -> Self {
        Self {
            growth,
            now: 0.0,
            extant: LineageHash::with_hasher(BuildHasherDefault::default()),
            pairs: PairMap::with_hasher(BuildHasherDefault::default()),
        }
    }

    /// Forgets every lineage and rewinds the clock to `time`.
    pub fn reset(&mut self, time: f64) {
        self.now = time;
        self.extant.clear();
        self.pairs.clear();
    }

    pub fn now(&self) -> f64 {
        self.now
    }

    /// Advances the clock. Time never runs backwards.
    pub fn set_time(&mut self, time: f64) {
        debug_assert!(time >= self.now, "{time} < {}", self.now);
        self.now = self.now.max(time);
    }

    pub fn num_extant(&self) -> usize {
        self.extant.len()
    }

    pub fn is_extant(&self, lineage: Lineage) -> bool {
        self.extant.contains(&lineage)
    }

    /// Adds founding lineages, all at distance zero from each other.
    pub fn add_roots(&mut self, lineages: &[Lineage]) {
        for &lineage in lineages {
            for &other in self.extant.iter() {
                self.pairs.insert(
                    PairKey::new(lineage, other),
                    PairDistance {
                        base: 0.0,
                        since: self.now,
                    },
                );
            }
            self.extant.insert(lineage);
        }
    }

    fn check(&self, lineage: Lineage) -> Result<(), NetworkError> {
        if self.extant.contains(&lineage) {
            Ok(())
        } else {
            Err(NetworkError::UnknownLineage(lineage))
        }
    }

    pub fn distance(&self, i: Lineage, j: Lineage) -> Result<f64, NetworkError> {
        self.check(i)?;
        self.check(j)?;
        if i == j {
            return Ok(0.0);
        }
        let pair = self
            .pairs
            .get(&PairKey::new(i, j))
            .ok_or(NetworkError::UnknownLineage(j))?;
        Ok(self.growth.grow(pair.base, self.now - pair.since))
    }

    fn insert_distance(&mut self, i: Lineage, j: Lineage, base: f64) {
        self.pairs.insert(
            PairKey::new(i, j),
            PairDistance {
                base,
                since: self.now,
            },
        );
    }

    /// `parent` splits into `child_a` and `child_b`.
    ///
    /// Both children start where the parent is now, and at distance
    /// zero from each other.
    pub fn on_speciation(
        &mut self,
        parent: Lineage,
        child_a: Lineage,
        child_b: Lineage,
    ) -> Result<(), NetworkError> {
        self.check(parent)?;
        let others = self.others(&[parent]);
        for other in others {
            let d = self.distance(parent, other)?;
            self.insert_distance(child_a, other, d);
            self.insert_distance(child_b, other, d);
        }
        self.insert_distance(child_a, child_b, 0.0);
        self.remove(parent);
        self.extant.insert(child_a);
        self.extant.insert(child_b);
        Ok(())
    }

    pub fn on_extinction(&mut self, lineage: Lineage) -> Result<(), NetworkError> {
        self.check(lineage)?;
        self.remove(lineage);
        Ok(())
    }

    /// `parents` merge into `child`, which sits halfway between them.
    pub fn on_hybridization(
        &mut self,
        parents: (Lineage, Lineage),
        child: Lineage,
    ) -> Result<(), NetworkError> {
        let (a, b) = parents;
        self.check(a)?;
        self.check(b)?;
        let others = self.others(&[a, b]);
        for other in others {
            let d = 0.5 * (self.distance(a, other)? + self.distance(b, other)?);
            self.insert_distance(child, other, d);
        }
        self.remove(a);
        self.remove(b);
        self.extant.insert(child);
        Ok(())
    }

    fn others(&self, excluded: &[Lineage]) -> Vec<Lineage> {
        self.extant
            .iter()
            .filter(|l| !excluded.contains(l))
            .copied()
            .collect()
    }

    fn remove(&mut self, lineage: Lineage) {
        self.extant.remove(&lineage);
        for &other in self.extant.iter() {
            self.pairs.remove(&PairKey::new(lineage, other));
        }
    }
}
