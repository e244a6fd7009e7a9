use std::collections::BinaryHeap;
use std::hash::BuildHasherDefault;

use crate::error::InvalidEdge;
use crate::error::NetworkError;
use crate::Edge;
use crate::Node;
use crate::NodeHash;

/// The event that created a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Root,
    Speciation,
    Extinction,
    Hybridization,
    HgtDonor,
    HgtRecipient,
    Leaf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    Tree,
    Hybrid,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeRecord {
    pub source: Node,
    pub target: Node,
    pub kind: EdgeKind,
}

/// A time-stamped phylogenetic network.
///
/// Node attributes are stored column-wise and indexed by [`Node`].
/// Incoming and outgoing edge lists keep insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkGraph {
    time: Vec<f64>,
    kind: Vec<NodeKind>,
    in_edges: Vec<Vec<Edge>>,
    out_edges: Vec<Vec<Edge>>,
    edges: Vec<EdgeRecord>,
}

// Constructors
impl NetworkGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(num_nodes: usize) -> Self {
        Self {
            time: Vec::with_capacity(num_nodes),
            kind: Vec::with_capacity(num_nodes),
            in_edges: Vec::with_capacity(num_nodes),
            out_edges: Vec::with_capacity(num_nodes),
            edges: Vec::with_capacity(num_nodes),
        }
    }
}

// Mutation
impl NetworkGraph {
    pub fn add_node(&mut self, time: f64, kind: NodeKind) -> Node {
        debug_assert!(time.is_finite() && time >= 0.0, "{time}");
        self.time.push(time);
        self.kind.push(kind);
        self.in_edges.push(vec![]);
        self.out_edges.push(vec![]);
        Node(self.time.len() - 1)
    }

    /// Checks everything [`NetworkGraph::add_edge`] requires without
    /// touching the graph.
    pub fn check_edge(&self, source: Node, target: Node) -> Result<(), InvalidEdge> {
        self.check_node(source)?;
        self.check_node(target)?;
        if source == target {
            return Err(InvalidEdge::SelfLoop(source));
        }
        let source_time = self.time[source.as_index()];
        let target_time = self.time[target.as_index()];
        if source_time > target_time {
            return Err(InvalidEdge::TimeInconsistent {
                parent: source,
                child: target,
                parent_time: source_time,
                child_time: target_time,
            });
        }
        if self.in_edges[target.as_index()].len() >= 2 {
            return Err(InvalidEdge::InDegreeExceeded(target));
        }
        if self.contains_edge(source, target) {
            return Err(InvalidEdge::Duplicate {
                parent: source,
                child: target,
            });
        }
        if self.is_ancestor(target, source) {
            return Err(InvalidEdge::Cycle {
                parent: source,
                child: target,
            });
        }
        Ok(())
    }

    /// Adds `source -> target`.
    ///
    /// The graph is unchanged if the edge is rejected.
    pub fn add_edge(
        &mut self,
        source: Node,
        target: Node,
        kind: EdgeKind,
    ) -> Result<Edge, InvalidEdge> {
        self.check_edge(source, target)?;
        Ok(self.push_edge(source, target, kind))
    }

    fn push_edge(&mut self, source: Node, target: Node, kind: EdgeKind) -> Edge {
        let edge = Edge(self.edges.len());
        self.edges.push(EdgeRecord {
            source,
            target,
            kind,
        });
        self.out_edges[source.as_index()].push(edge);
        self.in_edges[target.as_index()].push(edge);
        edge
    }

    /// Inserts a new node at `time` on `edge`.
    ///
    /// The lower half keeps the id and kind of `edge`, so an edge into
    /// a reticulation stays one. The upper half is a new tree edge
    /// that takes the place of `edge` in the source's outgoing list.
    pub fn subdivide_edge(
        &mut self,
        edge: Edge,
        time: f64,
        kind: NodeKind,
    ) -> Result<Node, InvalidEdge> {
        let record = *self.edge(edge).ok_or(InvalidEdge::UnknownEdge(edge))?;
        let upper = self.time[record.source.as_index()];
        let lower = self.time[record.target.as_index()];
        if !(time >= upper && time <= lower) {
            return Err(InvalidEdge::OutsideEdge { edge, time });
        }
        let node = self.add_node(time, kind);
        let upper_edge = Edge(self.edges.len());
        self.edges.push(EdgeRecord {
            source: record.source,
            target: node,
            kind: EdgeKind::Tree,
        });
        self.edges[edge.as_index()].source = node;
        self.in_edges[node.as_index()].push(upper_edge);
        self.out_edges[node.as_index()].push(edge);
        for e in self.out_edges[record.source.as_index()].iter_mut() {
            if *e == edge {
                *e = upper_edge;
            }
        }
        Ok(node)
    }

    fn check_node(&self, node: Node) -> Result<(), InvalidEdge> {
        if node.as_index() < self.time.len() {
            Ok(())
        } else {
            Err(InvalidEdge::UnknownNode(node))
        }
    }
}

// Queries
impl NetworkGraph {
    pub fn num_nodes(&self) -> usize {
        self.time.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn nodes(&self) -> impl DoubleEndedIterator<Item = Node> {
        (0..self.num_nodes()).map(Node)
    }

    pub fn edges(&self) -> impl DoubleEndedIterator<Item = Edge> {
        (0..self.num_edges()).map(Edge)
    }

    // NOTE: the per-node accessors panic if the node is out of bounds
    pub fn time(&self, node: Node) -> f64 {
        self.time[node.as_index()]
    }

    pub fn kind(&self, node: Node) -> NodeKind {
        self.kind[node.as_index()]
    }

    pub fn in_edges(&self, node: Node) -> &[Edge] {
        &self.in_edges[node.as_index()]
    }

    pub fn out_edges(&self, node: Node) -> &[Edge] {
        &self.out_edges[node.as_index()]
    }

    pub fn in_degree(&self, node: Node) -> usize {
        self.in_edges[node.as_index()].len()
    }

    pub fn out_degree(&self, node: Node) -> usize {
        self.out_edges[node.as_index()].len()
    }

    pub fn parents(&self, node: Node) -> impl Iterator<Item = Node> + '_ {
        self.in_edges[node.as_index()]
            .iter()
            .map(|e| self.edges[e.as_index()].source)
    }

    pub fn children(&self, node: Node) -> impl Iterator<Item = Node> + '_ {
        self.out_edges[node.as_index()]
            .iter()
            .map(|e| self.edges[e.as_index()].target)
    }

    pub fn edge(&self, edge: Edge) -> Option<&EdgeRecord> {
        self.edges.get(edge.as_index())
    }

    /// `target.time - source.time`
    pub fn edge_length(&self, edge: Edge) -> Option<f64> {
        self.edge(edge)
            .map(|r| self.time[r.target.as_index()] - self.time[r.source.as_index()])
    }

    pub fn contains_edge(&self, source: Node, target: Node) -> bool {
        self.out_edges
            .get(source.as_index())
            .map(|out| {
                out.iter()
                    .any(|e| self.edges[e.as_index()].target == target)
            })
            .unwrap_or(false)
    }

    /// The first node without parents.
    pub fn root(&self) -> Option<Node> {
        self.nodes().find(|&n| self.in_degree(n) == 0)
    }

    /// Nodes without children, in id order.
    pub fn leaves(&self) -> Vec<Node> {
        self.nodes().filter(|&n| self.out_degree(n) == 0).collect()
    }

    /// Nodes with two parents, in id order.
    pub fn reticulations(&self) -> Vec<Node> {
        self.nodes().filter(|&n| self.in_degree(n) == 2).collect()
    }

    pub fn is_tree(&self) -> bool {
        self.nodes().all(|n| self.in_degree(n) <= 1)
    }

    /// The lineages alive at `time`, one entry per branch.
    ///
    /// Each branch `u -> v` with `u.time <= time < v.time` is
    /// represented by `v`, so a reticulation whose incoming branches
    /// both span `time` shows up twice. Leaf tips sampled exactly at
    /// `time` count as alive. The result is in id order.
    pub fn extant_at(&self, time: f64) -> Vec<Node> {
        let mut rv = vec![];
        for node in self.nodes() {
            let t = self.time(node);
            if t == time && matches!(self.kind(node), NodeKind::Leaf) {
                rv.push(node);
            } else if t > time {
                let spanning = self.parents(node).filter(|&p| self.time(p) <= time).count();
                rv.extend(std::iter::repeat(node).take(spanning));
            }
        }
        rv
    }

    /// Iterates over the strict ancestors of `node`, latest first.
    pub fn ancestors(&self, node: Node) -> Ancestors<'_> {
        Ancestors::new(self, node)
    }

    /// `true` if there is a directed path from `a` to `b`.
    ///
    /// A node is not its own ancestor.
    pub fn is_ancestor(&self, a: Node, b: Node) -> bool {
        if a == b || a.as_index() >= self.num_nodes() || b.as_index() >= self.num_nodes() {
            return false;
        }
        let a_time = self.time(a);
        // Ancestors come out latest first, so once we are
        // earlier than `a` it cannot show up anymore.
        for ancestor in self.ancestors(b) {
            if ancestor == a {
                return true;
            }
            if self.time(ancestor) < a_time {
                return false;
            }
        }
        false
    }

    /// Checks every structural invariant of a phylogenetic network.
    pub fn validate(&self) -> Result<(), NetworkError> {
        let roots = self.nodes().filter(|&n| self.in_degree(n) == 0).count();
        if roots != 1 {
            return Err(NetworkError::Malformed(format!(
                "expected exactly one root, found {roots}"
            )));
        }
        for node in self.nodes() {
            if self.in_degree(node) > 2 {
                return Err(InvalidEdge::InDegreeExceeded(node).into());
            }
            let parents = self.parents(node).collect::<Vec<_>>();
            if parents.len() == 2 && parents[0] == parents[1] {
                return Err(InvalidEdge::Duplicate {
                    parent: parents[0],
                    child: node,
                }
                .into());
            }
        }
        for record in &self.edges {
            let parent_time = self.time(record.source);
            let child_time = self.time(record.target);
            if parent_time > child_time {
                return Err(InvalidEdge::TimeInconsistent {
                    parent: record.source,
                    child: record.target,
                    parent_time,
                    child_time,
                }
                .into());
            }
        }
        if let Some(node) = self.find_cycle() {
            return Err(NetworkError::Malformed(format!("{node:?} lies on a cycle")));
        }
        Ok(())
    }

    // Kahn's algorithm; returns a node that could not be ordered.
    fn find_cycle(&self) -> Option<Node> {
        let mut in_degree = self.nodes().map(|n| self.in_degree(n)).collect::<Vec<_>>();
        let mut stack = self
            .nodes()
            .filter(|&n| in_degree[n.as_index()] == 0)
            .collect::<Vec<_>>();
        let mut visited = 0;
        while let Some(node) = stack.pop() {
            visited += 1;
            for child in self.children(node) {
                in_degree[child.as_index()] -= 1;
                if in_degree[child.as_index()] == 0 {
                    stack.push(child);
                }
            }
        }
        if visited == self.num_nodes() {
            None
        } else {
            self.nodes().find(|n| in_degree[n.as_index()] > 0)
        }
    }
}

//BOILER PLATE ALERT
#[derive(Debug, Copy, Clone)]
struct QueuedNode {
    node: Node,
    time: f64,
}

impl PartialEq for QueuedNode {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node
    }
}

impl Eq for QueuedNode {}

impl PartialOrd for QueuedNode {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedNode {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.time
            .total_cmp(&other.time)
            .then_with(|| self.node.cmp(&other.node))
    }
}

/// Walks parent links from a node, popping the latest pending node
/// first.
pub struct Ancestors<'graph> {
    graph: &'graph NetworkGraph,
    queued_nodes: NodeHash,
    node_queue: BinaryHeap<QueuedNode>,
}

impl<'graph> Ancestors<'graph> {
    fn new(graph: &'graph NetworkGraph, node: Node) -> Self {
        let mut rv = Self {
            graph,
            queued_nodes: NodeHash::with_hasher(BuildHasherDefault::default()),
            node_queue: BinaryHeap::new(),
        };
        if node.as_index() < graph.num_nodes() {
            rv.enqueue_parents(node);
        }
        rv
    }

    fn enqueue_parents(&mut self, node: Node) {
        for parent in self.graph.parents(node) {
            if self.queued_nodes.insert(parent) {
                self.node_queue.push(QueuedNode {
                    node: parent,
                    time: self.graph.time(parent),
                });
            }
        }
    }
}

impl<'graph> Iterator for Ancestors<'graph> {
    type Item = Node;
    fn next(&mut self) -> Option<Self::Item> {
        let queued = self.node_queue.pop()?;
        self.enqueue_parents(queued.node);
        Some(queued.node)
    }
}

// Reconstructed networks
impl NetworkGraph {
    /// Restricts the network to ancestors of leaf-kind nodes.
    ///
    /// Dead branches are removed, then nodes left with one parent and
    /// one child are suppressed and parallel edges merged until
    /// nothing changes. The root always stays. Surviving nodes keep
    /// their relative order; an edge into a node with a single parent
    /// becomes a tree edge.
    pub fn prune_extinct(&self) -> Result<NetworkGraph, InvalidEdge> {
        let n = self.num_nodes();
        let mut live = vec![false; n];
        let mut stack = self
            .nodes()
            .filter(|&node| matches!(self.kind(node), NodeKind::Leaf))
            .collect::<Vec<_>>();
        for node in &stack {
            live[node.as_index()] = true;
        }
        while let Some(node) = stack.pop() {
            for parent in self.parents(node) {
                if !live[parent.as_index()] {
                    live[parent.as_index()] = true;
                    stack.push(parent);
                }
            }
        }
        if let Some(root) = self.root() {
            live[root.as_index()] = true;
        }

        let mut parents: Vec<Vec<(Node, EdgeKind)>> = vec![vec![]; n];
        let mut children: Vec<Vec<Node>> = vec![vec![]; n];
        for node in self.nodes().filter(|node| live[node.as_index()]) {
            for &e in self.in_edges(node) {
                let record = self.edges[e.as_index()];
                parents[node.as_index()].push((record.source, record.kind));
                children[record.source.as_index()].push(node);
            }
        }

        let mut removed = live.iter().map(|alive| !alive).collect::<Vec<_>>();
        let mut work = self
            .nodes()
            .rev()
            .filter(|node| live[node.as_index()])
            .collect::<Vec<_>>();
        while let Some(node) = work.pop() {
            let v = node.as_index();
            if removed[v] {
                continue;
            }
            if parents[v].len() == 2 && parents[v][0].0 == parents[v][1].0 {
                let parent = parents[v][0].0;
                parents[v].truncate(1);
                parents[v][0].1 = EdgeKind::Tree;
                if let Some(i) = children[parent.as_index()].iter().position(|&c| c == node) {
                    children[parent.as_index()].remove(i);
                }
                work.push(parent);
                work.push(node);
                continue;
            }
            if parents[v].len() == 1 && children[v].len() == 1 {
                let (parent, _) = parents[v][0];
                let child = children[v][0];
                for entry in parents[child.as_index()].iter_mut() {
                    if entry.0 == node {
                        entry.0 = parent;
                    }
                }
                for c in children[parent.as_index()].iter_mut() {
                    if *c == node {
                        *c = child;
                    }
                }
                removed[v] = true;
                work.push(parent);
                work.push(child);
            }
        }

        let mut new_ids = vec![None; n];
        let mut rv = NetworkGraph::with_capacity(n);
        for node in self.nodes().filter(|node| !removed[node.as_index()]) {
            new_ids[node.as_index()] = Some(rv.add_node(self.time(node), self.kind(node)));
        }
        for node in self.nodes().filter(|node| !removed[node.as_index()]) {
            let entries = &parents[node.as_index()];
            for &(parent, kind) in entries {
                let kind = if entries.len() == 1 {
                    EdgeKind::Tree
                } else {
                    kind
                };
                let source = new_ids[parent.as_index()].ok_or(InvalidEdge::UnknownNode(parent))?;
                let target = new_ids[node.as_index()].ok_or(InvalidEdge::UnknownNode(node))?;
                rv.add_edge(source, target, kind)?;
            }
        }
        Ok(rv)
    }
}
