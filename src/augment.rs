//! Turning trees into networks by adding reticulation edges.

use std::collections::VecDeque;

use log::{debug, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, InsufficientCandidates, NetworkError};
use crate::graph::{EdgeKind, NetworkGraph, NodeKind};
use crate::rng::{sample_uniform, sample_weighted};
use crate::Edge;
use crate::Node;
use crate::NodeHash;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AugmentationMode {
    /// Every candidate is equally likely.
    #[default]
    Uniform,
    /// Candidates are weighted by their [`LocalityWeight`].
    Local,
}

/// Where a new edge is attached.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attachment {
    /// Join two existing nodes.
    #[default]
    Nodes,
    /// Subdivide two existing edges and join the new nodes.
    Edges,
}

/// Weight of a candidate in local mode.
///
/// `hops` is the number of steps between the two ends in the
/// undirected network, `usize::MAX` if they are not connected.
/// `time_difference` is never negative.
pub trait LocalityWeight {
    fn weight(&self, hops: usize, time_difference: f64) -> f64;
}

impl<F: Fn(usize, f64) -> f64> LocalityWeight for F {
    fn weight(&self, hops: usize, time_difference: f64) -> f64 {
        self(hops, time_difference)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Locality {
    /// Probability that a walk stopping with `stop_probability` after
    /// each step is still going after `hops - 1` steps.
    RandomWalk { stop_probability: f64 },
    /// exp(−Δt / scale)
    Temporal { scale: f64 },
}

impl Default for Locality {
    fn default() -> Self {
        Locality::RandomWalk {
            stop_probability: 0.2,
        }
    }
}

impl Locality {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        match *self {
            Locality::RandomWalk { stop_probability } => {
                if stop_probability > 0.0 && stop_probability < 1.0 {
                    Ok(())
                } else {
                    Err(ConfigurationError::NotAProbability {
                        name: "stop probability",
                        value: stop_probability,
                    })
                }
            }
            Locality::Temporal { scale } => crate::rates::positive("locality scale", scale),
        }
    }
}

impl LocalityWeight for Locality {
    fn weight(&self, hops: usize, time_difference: f64) -> f64 {
        match *self {
            Locality::RandomWalk { stop_probability } => {
                if hops == 0 || hops == usize::MAX {
                    0.0
                } else {
                    libm::pow(1.0 - stop_probability, (hops - 1) as f64)
                }
            }
            Locality::Temporal { scale } => libm::exp(-time_difference / scale),
        }
    }
}

/// What an augmentation run did.
#[derive(Debug, Clone, PartialEq)]
pub struct AugmentationReport {
    pub requested: usize,
    /// The new hybrid edges, in insertion order.
    pub added: Vec<Edge>,
}

impl AugmentationReport {
    /// `Some` if fewer edges than requested were added.
    pub fn shortfall(&self) -> Option<InsufficientCandidates> {
        if self.added.len() < self.requested {
            Some(InsufficientCandidates {
                requested: self.requested,
                added: self.added.len(),
            })
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct EdgeAugmenter<L = Locality> {
    mode: AugmentationMode,
    attachment: Attachment,
    locality: L,
}

impl<L: LocalityWeight> EdgeAugmenter<L> {
    pub fn new(mode: AugmentationMode, attachment: Attachment, locality: L) -> Self {
        Self {
            mode,
            attachment,
            locality,
        }
    }

    pub fn mode(&self) -> AugmentationMode {
        self.mode
    }

    pub fn attachment(&self) -> Attachment {
        self.attachment
    }

    /// Adds up to `requested` hybrid edges to `graph`.
    ///
    /// Running out of candidates is not an error: the edges placed so
    /// far stay, and the report's [`AugmentationReport::shortfall`]
    /// says how many are missing.
    pub fn augment<R: Rng + ?Sized>(
        &self,
        graph: &mut NetworkGraph,
        requested: usize,
        rng: &mut R,
    ) -> Result<AugmentationReport, NetworkError> {
        let added = match self.attachment {
            Attachment::Nodes => self.augment_nodes(graph, requested, rng)?,
            Attachment::Edges => self.augment_edges(graph, requested, rng)?,
        };
        let report = AugmentationReport { requested, added };
        match report.shortfall() {
            Some(shortfall) => warn!("{shortfall}"),
            None => debug!("added {requested} edges"),
        }
        Ok(report)
    }

    /// Ordered node pairs `(u, v)` that may be joined by `u -> v`, in
    /// node id order.
    pub fn node_candidates(&self, graph: &NetworkGraph) -> Vec<(Node, Node)> {
        let ancestry = ancestor_sets(graph);
        let mut rv = vec![];
        for u in graph.nodes() {
            for v in graph.nodes() {
                if joinable_nodes(graph, u, v)
                    && !ancestry[v.as_index()].contains(&u)
                    && !ancestry[u.as_index()].contains(&v)
                {
                    rv.push((u, v));
                }
            }
        }
        rv
    }

    /// Ordered edge pairs `(a, b)` such that a new edge can run from
    /// somewhere on `a` to somewhere on `b`, in edge id order.
    pub fn edge_candidates(&self, graph: &NetworkGraph) -> Vec<(Edge, Edge)> {
        let ancestry = ancestor_sets(graph);
        let mut rv = vec![];
        for a in graph.edges() {
            let Some(&ra) = graph.edge(a) else { continue };
            for b in graph.edges() {
                let Some(&rb) = graph.edge(b) else { continue };
                if a != b
                    && graph.time(ra.source) <= graph.time(rb.target)
                    && rb.target != ra.source
                    && !ancestry[ra.source.as_index()].contains(&rb.target)
                {
                    rv.push((a, b));
                }
            }
        }
        rv
    }

    fn augment_nodes<R: Rng + ?Sized>(
        &self,
        graph: &mut NetworkGraph,
        requested: usize,
        rng: &mut R,
    ) -> Result<Vec<Edge>, NetworkError> {
        let mut added = vec![];
        if requested == 0 {
            return Ok(added);
        }
        let mut candidates = self.node_candidates(graph);
        let mut weights = match self.mode {
            AugmentationMode::Uniform => vec![1.0; candidates.len()],
            AugmentationMode::Local => {
                let mut hops = HopCache::new(graph);
                candidates
                    .iter()
                    .map(|&(u, v)| {
                        let dt = graph.time(v) - graph.time(u);
                        self.locality.weight(hops.get(u, v), dt)
                    })
                    .collect()
            }
        };
        while added.len() < requested {
            let Some(i) = sample_weighted(rng, &weights) else {
                break;
            };
            let (u, v) = candidates.swap_remove(i);
            weights.swap_remove(i);
            // Earlier insertions may have connected the pair.
            if !joinable_nodes(graph, u, v) || graph.is_ancestor(u, v) || graph.is_ancestor(v, u)
            {
                continue;
            }
            added.push(graph.add_edge(u, v, EdgeKind::Hybrid)?);
        }
        Ok(added)
    }

    fn augment_edges<R: Rng + ?Sized>(
        &self,
        graph: &mut NetworkGraph,
        requested: usize,
        rng: &mut R,
    ) -> Result<Vec<Edge>, NetworkError> {
        let mut added = vec![];
        while added.len() < requested {
            let candidates = self.edge_candidates(graph);
            let weights = match self.mode {
                AugmentationMode::Uniform => vec![1.0; candidates.len()],
                AugmentationMode::Local => self.edge_weights(graph, &candidates),
            };
            let Some(i) = sample_weighted(rng, &weights) else {
                break;
            };
            let (a, b) = candidates[i];
            added.push(join_edges(graph, a, b, rng)?);
        }
        Ok(added)
    }

    fn edge_weights(&self, graph: &NetworkGraph, candidates: &[(Edge, Edge)]) -> Vec<f64> {
        let mut hops = HopCache::new(graph);
        let mut rv = Vec::with_capacity(candidates.len());
        for &(a, b) in candidates {
            let (Some(&ra), Some(&rb)) = (graph.edge(a), graph.edge(b)) else {
                rv.push(0.0);
                continue;
            };
            // Distance in the line graph: adjacent edges are one step apart.
            let d = [
                (ra.source, rb.source),
                (ra.source, rb.target),
                (ra.target, rb.source),
                (ra.target, rb.target),
            ]
            .into_iter()
            .map(|(x, y)| hops.get(x, y))
            .min()
            .unwrap_or(usize::MAX)
            .saturating_add(1);
            let gap = (graph.time(rb.source) - graph.time(ra.target)).max(0.0);
            rv.push(self.locality.weight(d, gap));
        }
        rv
    }
}

/// Everything except ancestry that `u -> v` needs.
///
/// `u` keeps a child so the leaf set does not change, and `v` must
/// have exactly one parent: the root stays the root and nodes with
/// two parents are full.
fn joinable_nodes(graph: &NetworkGraph, u: Node, v: Node) -> bool {
    u != v
        && graph.time(u) < graph.time(v)
        && graph.out_degree(u) > 0
        && graph.in_degree(v) == 1
        && !graph.contains_edge(u, v)
}

/// Subdivides `a` at `tx` and `b` at `ty >= tx` and adds a hybrid edge
/// between the two new nodes.
fn join_edges<R: Rng + ?Sized>(
    graph: &mut NetworkGraph,
    a: Edge,
    b: Edge,
    rng: &mut R,
) -> Result<Edge, NetworkError> {
    let ra = *graph.edge(a).ok_or(crate::error::InvalidEdge::UnknownEdge(a))?;
    let rb = *graph.edge(b).ok_or(crate::error::InvalidEdge::UnknownEdge(b))?;
    let (a_start, a_end) = (graph.time(ra.source), graph.time(ra.target));
    let (b_start, b_end) = (graph.time(rb.source), graph.time(rb.target));

    let x_end = a_end.min(b_end);
    let tx = (a_start + sample_uniform(rng) * (x_end - a_start)).min(x_end);
    let y_start = tx.max(b_start);
    let ty = (y_start + sample_uniform(rng) * (b_end - y_start)).min(b_end);

    let x = graph.subdivide_edge(a, tx, NodeKind::Speciation)?;
    let y = graph.subdivide_edge(b, ty, NodeKind::Hybridization)?;
    Ok(graph.add_edge(x, y, EdgeKind::Hybrid)?)
}

fn ancestor_sets(graph: &NetworkGraph) -> Vec<NodeHash> {
    graph
        .nodes()
        .map(|node| graph.ancestors(node).collect::<NodeHash>())
        .collect()
}

/// Undirected hop counts, one breadth-first search per source node.
struct HopCache<'graph> {
    graph: &'graph NetworkGraph,
    from: Vec<Option<Vec<usize>>>,
}

impl<'graph> HopCache<'graph> {
    fn new(graph: &'graph NetworkGraph) -> Self {
        Self {
            graph,
            from: vec![None; graph.num_nodes()],
        }
    }

    fn get(&mut self, u: Node, v: Node) -> usize {
        let graph = self.graph;
        let distances = self.from[u.as_index()].get_or_insert_with(|| breadth_first(graph, u));
        distances[v.as_index()]
    }
}

fn breadth_first(graph: &NetworkGraph, start: Node) -> Vec<usize> {
    let mut distances = vec![usize::MAX; graph.num_nodes()];
    let mut queue = VecDeque::new();
    distances[start.as_index()] = 0;
    queue.push_back(start);
    while let Some(node) = queue.pop_front() {
        let next = distances[node.as_index()] + 1;
        for neighbor in graph.parents(node).chain(graph.children(node)) {
            if distances[neighbor.as_index()] == usize::MAX {
                distances[neighbor.as_index()] = next;
                queue.push_back(neighbor);
            }
        }
    }
    distances
}

#[cfg(test)]
mod test_edge_augmenter {
    use super::*;
    use crate::beta_splitting::BetaSplittingTreeGenerator;
    use proptest::prelude::*;
    use rand::SeedableRng;

    //       0
    //     /   \
    //    1     2
    //   / \   / \
    //  3   4 5   6
    //
    // Internal nodes at time 1, leaves at 2 and 3.
    fn cherry_pair() -> NetworkGraph {
        let mut graph = NetworkGraph::new();
        let root = graph.add_node(0.0, NodeKind::Root);
        let left = graph.add_node(1.0, NodeKind::Speciation);
        let right = graph.add_node(1.0, NodeKind::Speciation);
        for (parent, child) in [(root, left), (root, right)] {
            graph.add_edge(parent, child, EdgeKind::Tree).unwrap();
        }
        for (parent, time) in [(left, 2.0), (left, 2.0), (right, 3.0), (right, 3.0)] {
            let leaf = graph.add_node(time, NodeKind::Leaf);
            graph.add_edge(parent, leaf, EdgeKind::Tree).unwrap();
        }
        graph
    }

    fn hybrid_edges(graph: &NetworkGraph) -> usize {
        graph
            .edges()
            .filter(|&e| graph.edge(e).unwrap().kind == EdgeKind::Hybrid)
            .count()
    }

    #[test]
    fn test_node_candidates() {
        let graph = cherry_pair();
        let augmenter =
            EdgeAugmenter::new(AugmentationMode::Uniform, Attachment::Nodes, Locality::default());
        let candidates = augmenter.node_candidates(&graph);
        // The root reaches everything and 2 -> 1 is not forward in time.
        assert_eq!(
            candidates,
            vec![
                (Node(1), Node(5)),
                (Node(1), Node(6)),
                (Node(2), Node(3)),
                (Node(2), Node(4)),
            ]
        );
    }

    #[test]
    fn test_node_shortfall() {
        let mut graph = cherry_pair();
        let mut rng = rand::rngs::StdRng::seed_from_u64(5);
        let augmenter =
            EdgeAugmenter::new(AugmentationMode::Uniform, Attachment::Nodes, Locality::default());
        let report = augmenter.augment(&mut graph, 6, &mut rng).unwrap();
        assert_eq!(report.added.len(), 4);
        assert_eq!(
            report.shortfall(),
            Some(InsufficientCandidates {
                requested: 6,
                added: 4
            })
        );
        assert_eq!(hybrid_edges(&graph), 4);
        assert_eq!(graph.reticulations().len(), 4);
        assert_eq!(graph.leaves().len(), 4);
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_edge_candidates_exclude_ancestors() {
        let graph = cherry_pair();
        let augmenter =
            EdgeAugmenter::new(AugmentationMode::Uniform, Attachment::Edges, Locality::default());
        for (a, b) in augmenter.edge_candidates(&graph) {
            let ra = graph.edge(a).unwrap();
            let rb = graph.edge(b).unwrap();
            assert_ne!(a, b);
            assert!(!graph.is_ancestor(rb.target, ra.source));
            assert_ne!(rb.target, ra.source);
        }
    }

    #[test]
    fn test_join_edges() {
        let mut graph = cherry_pair();
        let mut rng = rand::rngs::StdRng::seed_from_u64(9);
        let augmenter =
            EdgeAugmenter::new(AugmentationMode::Uniform, Attachment::Edges, Locality::default());
        let report = augmenter.augment(&mut graph, 3, &mut rng).unwrap();
        assert_eq!(report.shortfall(), None);
        assert_eq!(report.added.len(), 3);
        // Each insertion adds two nodes and three edges.
        assert_eq!(graph.num_nodes(), 7 + 6);
        assert_eq!(graph.num_edges(), 6 + 9);
        assert_eq!(graph.leaves().len(), 4);
        for &e in &report.added {
            let record = graph.edge(e).unwrap();
            assert_eq!(record.kind, EdgeKind::Hybrid);
            assert_eq!(graph.kind(record.target), NodeKind::Hybridization);
            assert_eq!(graph.in_degree(record.target), 2);
        }
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_nothing_to_join() {
        let mut graph = NetworkGraph::new();
        graph.add_node(0.0, NodeKind::Leaf);
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        let augmenter = EdgeAugmenter::new(
            AugmentationMode::Local,
            Attachment::Edges,
            Locality::Temporal { scale: 1.0 },
        );
        let report = augmenter.augment(&mut graph, 1, &mut rng).unwrap();
        assert!(report.added.is_empty());
        assert!(report.shortfall().is_some());
        assert_eq!(graph.num_nodes(), 1);
    }

    #[test]
    fn test_locality_weights() {
        let walk = Locality::RandomWalk {
            stop_probability: 0.5,
        };
        assert_eq!(walk.weight(1, 0.0), 1.0);
        assert_eq!(walk.weight(3, 0.0), 0.25);
        assert_eq!(walk.weight(usize::MAX, 0.0), 0.0);
        let temporal = Locality::Temporal { scale: 2.0 };
        assert_eq!(temporal.weight(4, 0.0), 1.0);
        assert!(temporal.weight(1, 1.0) > temporal.weight(1, 2.0));
        assert!(Locality::RandomWalk {
            stop_probability: 1.0
        }
        .validate()
        .is_err());
        assert!(Locality::Temporal { scale: 0.0 }.validate().is_err());
    }

    #[test]
    fn test_local_prefers_near_pairs() {
        // Only hop distances matter; far pairs get no weight at all.
        let near = |hops: usize, _: f64| if hops <= 3 { 1.0 } else { 0.0 };
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let mut generator = BetaSplittingTreeGenerator::new(0.0, 1.0).unwrap();
        let tree = generator.generate(12, &mut rng).unwrap();
        let mut graph = tree.clone();
        let augmenter = EdgeAugmenter::new(AugmentationMode::Local, Attachment::Nodes, near);
        let report = augmenter.augment(&mut graph, 50, &mut rng).unwrap();
        for &e in &report.added {
            let record = *graph.edge(e).unwrap();
            let hops = breadth_first(&tree, record.source)[record.target.as_index()];
            assert!(hops <= 3, "{record:?} spans {hops} hops");
        }
        assert!(graph.validate().is_ok());
    }

    proptest! {
        #[test]
        fn test_augmented_networks_stay_valid(
            leaves in 2usize..15,
            requested in 0usize..8,
            local in any::<bool>(),
            nodes in any::<bool>(),
            seed in any::<u64>(),
        ) {
            let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
            let mut generator = BetaSplittingTreeGenerator::new(0.0, 1.0).unwrap();
            let mut graph = generator.generate(leaves, &mut rng).unwrap();
            let mode = if local { AugmentationMode::Local } else { AugmentationMode::Uniform };
            let attachment = if nodes { Attachment::Nodes } else { Attachment::Edges };
            let augmenter = EdgeAugmenter::new(mode, attachment, Locality::default());
            let report = augmenter.augment(&mut graph, requested, &mut rng).unwrap();
            prop_assert!(graph.validate().is_ok());
            prop_assert_eq!(graph.leaves().len(), leaves);
            prop_assert_eq!(hybrid_edges(&graph), report.added.len());
            if !nodes {
                prop_assert_eq!(report.added.len(), requested);
            }
            for e in graph.edges() {
                prop_assert!(graph.edge_length(e).unwrap() >= 0.0);
            }
        }
    }
}
