//! Random trees from Aldous' beta-splitting model.

use std::collections::HashMap;
use std::hash::BuildHasherDefault;

use nohash::BuildNoHashHasher;
use rand::Rng;

use crate::error::ConfigurationError;
use crate::error::NetworkError;
use crate::graph::{EdgeKind, NetworkGraph, NodeKind};
use crate::rng::{sample_uniform, select_weighted};
use crate::Node;

/// Smallest β for which the split distribution exists.
///
/// This is the comb limit, where every split is `(1, n - 1)`. β = -1
/// only favours unbalanced splits.
pub const MIN_BETA: f64 = -2.0;

type SplitCache = HashMap<usize, Vec<f64>, BuildNoHashHasher<usize>>;

/// A clade still waiting to be built.
#[derive(Debug, Clone, Copy)]
struct SplitState {
    size: usize,
    parent: Option<Node>,
    time: f64,
}

/// Builds binary trees by recursively splitting the taxon set.
///
/// A clade of `n` taxa splits into `i` and `n - i` with probability
/// proportional to `C(n, i) B(i + β + 1, n - i + β + 1)`. β = 0 is the
/// Yule model, larger values balance the tree and β = -2 is the comb.
#[derive(Debug, Clone)]
pub struct BetaSplittingTreeGenerator {
    beta: f64,
    level_increment: f64,
    cache: SplitCache,
}

impl BetaSplittingTreeGenerator {
    pub fn new(beta: f64, level_increment: f64) -> Result<Self, ConfigurationError> {
        if !(beta >= MIN_BETA) || !beta.is_finite() {
            return Err(ConfigurationError::BetaOutOfDomain(beta));
        }
        crate::rates::non_negative("level increment", level_increment)?;
        Ok(Self {
            beta,
            level_increment,
            cache: SplitCache::with_hasher(BuildHasherDefault::default()),
        })
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    pub fn level_increment(&self) -> f64 {
        self.level_increment
    }

    /// Probabilities of splitting `n` taxa into `i` and `n - i`, for
    /// `i = 1..n` (entry `i - 1`).
    ///
    /// Empty for `n < 2`.
    pub fn split_weights(&mut self, n: usize) -> &[f64] {
        let beta = self.beta;
        self.cache
            .entry(n)
            .or_insert_with(|| split_distribution(n, beta))
    }

    /// Samples the size of the first part of a split of `n > 1` taxa.
    pub fn sample_split<R: Rng + ?Sized>(&mut self, n: usize, rng: &mut R) -> usize {
        debug_assert!(n > 1);
        let x = sample_uniform(rng);
        select_weighted(self.split_weights(n), x) + 1
    }

    /// Generates a tree with `num_leaves` leaves.
    ///
    /// The root sits at time zero and every child one level increment
    /// below its parent. A single leaf is returned as a lone node.
    pub fn generate<R: Rng + ?Sized>(
        &mut self,
        num_leaves: usize,
        rng: &mut R,
    ) -> Result<NetworkGraph, NetworkError> {
        if num_leaves == 0 {
            return Err(ConfigurationError::LeafCount(0).into());
        }
        let mut graph = NetworkGraph::with_capacity(2 * num_leaves - 1);
        let mut stack = vec![SplitState {
            size: num_leaves,
            parent: None,
            time: 0.0,
        }];
        while let Some(state) = stack.pop() {
            let kind = match (state.size, state.parent) {
                (1, _) => NodeKind::Leaf,
                (_, None) => NodeKind::Root,
                (_, Some(_)) => NodeKind::Speciation,
            };
            let node = graph.add_node(state.time, kind);
            if let Some(parent) = state.parent {
                graph.add_edge(parent, node, EdgeKind::Tree)?;
            }
            if state.size > 1 {
                let i = self.sample_split(state.size, rng);
                let time = state.time + self.level_increment;
                // Pushed in reverse so the first part is built first.
                for size in [state.size - i, i] {
                    stack.push(SplitState {
                        size,
                        parent: Some(node),
                        time,
                    });
                }
            }
        }
        Ok(graph)
    }
}

fn split_distribution(n: usize, beta: f64) -> Vec<f64> {
    if n < 2 {
        return vec![];
    }
    let mut weights = vec![0.0; n - 1];
    if beta <= MIN_BETA {
        weights[0] += 0.5;
        weights[n - 2] += 0.5;
        return weights;
    }
    // log C(n, i) + log B(i + β + 1, n - i + β + 1), without the terms
    // that do not depend on i.
    let log_weight = |i: usize| {
        let (i, j) = (i as f64, (n - i) as f64);
        libm::lgamma(i + beta + 1.0) + libm::lgamma(j + beta + 1.0)
            - libm::lgamma(i + 1.0)
            - libm::lgamma(j + 1.0)
    };
    for (slot, i) in weights.iter_mut().zip(1..n) {
        *slot = log_weight(i);
    }
    let max = weights.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    for w in weights.iter_mut() {
        *w = libm::exp(*w - max);
    }
    let total: f64 = weights.iter().sum();
    for w in weights.iter_mut() {
        *w /= total;
    }
    weights
}
