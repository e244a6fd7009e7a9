//! Continuous-time birth-death simulation with reticulation.
//!
//! Rates are re-evaluated after every event and the waiting time to
//! the next event is exponential in their sum (Gillespie). Lineages
//! and lineage pairs are always visited in list order, which keeps
//! runs reproducible for a given generator state.

use log::{debug, info, trace};
use rand::Rng;

use crate::distance::DistanceTracker;
use crate::error::NetworkError;
use crate::flags::SimulationOptions;
use crate::graph::{EdgeKind, NetworkGraph, NodeKind};
use crate::rates::{DistanceGrowth, HybridizationRate};
use crate::rng::{sample_exponential, sample_uniform, select_weighted};
use crate::Lineage;
use crate::Node;

/// The third event type of the extended model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reticulation<H> {
    None,
    /// Unordered pairs merge at rate ν(distance).
    Hybridization(H),
    /// Every ordered (donor, recipient) pair transfers at this rate.
    Hgt(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    Speciation(Lineage),
    Extinction(Lineage),
    Hybridization(Lineage, Lineage),
    Hgt { donor: Lineage, recipient: Lineage },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ActiveLineage {
    lineage: Lineage,
    node: Node,
}

/// Birth-death parameters shared by every attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BirthDeath {
    pub target_leaf_count: usize,
    pub speciation_rate: f64,
    pub extinction_rate: f64,
    pub max_restarts: usize,
}

#[derive(Debug, Default)]
struct Rates {
    speciation: f64,
    extinction: f64,
    // One entry per unordered pair, in (i < j) order.
    hybridization: Vec<f64>,
    hybridization_total: f64,
    hgt: f64,
}

impl Rates {
    fn total(&self) -> f64 {
        self.speciation + self.extinction + self.hybridization_total + self.hgt
    }
}

enum Outcome {
    Reached,
    Extinct,
}

pub struct EventScheduler<H, G> {
    parameters: BirthDeath,
    reticulation: Reticulation<H>,
    options: SimulationOptions,
    tracker: DistanceTracker<G>,
    graph: NetworkGraph,
    lineages: Vec<ActiveLineage>,
    next_lineage: usize,
    now: f64,
    rates: Rates,
}

impl<H: HybridizationRate, G: DistanceGrowth> EventScheduler<H, G> {
    pub fn new(
        parameters: BirthDeath,
        reticulation: Reticulation<H>,
        growth: G,
        options: SimulationOptions,
    ) -> Self {
        Self {
            parameters,
            reticulation,
            options,
            tracker: DistanceTracker::new(growth),
            graph: NetworkGraph::new(),
            lineages: vec![],
            next_lineage: 0,
            now: 0.0,
            rates: Rates::default(),
        }
    }

    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn num_extant(&self) -> usize {
        self.lineages.len()
    }

    pub fn tracker(&self) -> &DistanceTracker<G> {
        &self.tracker
    }

    pub fn graph(&self) -> &NetworkGraph {
        &self.graph
    }

    /// Runs attempts until one reaches the target leaf count.
    ///
    /// An attempt in which every lineage dies is thrown away and the
    /// simulation starts over from a fresh root, at most
    /// `max_restarts` times.
    pub fn run<R: Rng + ?Sized>(mut self, rng: &mut R) -> Result<NetworkGraph, NetworkError> {
        let attempts = self.parameters.max_restarts + 1;
        for attempt in 0..attempts {
            self.start();
            match self.simulate(rng)? {
                Outcome::Reached => {
                    self.finish(rng)?;
                    info!(
                        "reached {} lineages at time {} after {} restart(s); {} nodes, {} reticulations",
                        self.parameters.target_leaf_count,
                        self.now,
                        attempt,
                        self.graph.num_nodes(),
                        self.graph.reticulations().len()
                    );
                    let graph = std::mem::take(&mut self.graph);
                    return if self.options.keep_extinct_lineages() {
                        Ok(graph)
                    } else {
                        Ok(graph.prune_extinct()?)
                    };
                }
                Outcome::Extinct => {
                    debug!("attempt {attempt} went extinct at time {}", self.now)
                }
            }
        }
        Err(NetworkError::SimulationExhausted { attempts })
    }

    fn new_lineage(&mut self, node: Node) -> ActiveLineage {
        let lineage = Lineage(self.next_lineage);
        self.next_lineage += 1;
        ActiveLineage { lineage, node }
    }

    /// Resets everything to a lone root.
    pub fn start(&mut self) {
        self.graph = NetworkGraph::new();
        self.lineages.clear();
        self.next_lineage = 0;
        self.now = 0.0;
        self.tracker.reset(0.0);
        let root = self.graph.add_node(0.0, NodeKind::Root);
        let founders = if self.options.stem_start() || self.parameters.target_leaf_count < 2 {
            1
        } else {
            2
        };
        for _ in 0..founders {
            let founder = self.new_lineage(root);
            self.lineages.push(founder);
        }
        let ids = self.lineages.iter().map(|l| l.lineage).collect::<Vec<_>>();
        self.tracker.add_roots(&ids);
    }

    fn simulate<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Outcome, NetworkError> {
        loop {
            if self.lineages.is_empty() {
                return Ok(Outcome::Extinct);
            }
            if self.lineages.len() == self.parameters.target_leaf_count {
                return Ok(Outcome::Reached);
            }
            self.step(rng)?;
        }
    }

    /// Draws and applies one event.
    pub fn step<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Event, NetworkError> {
        self.update_rates()?;
        let total = self.rates.total();
        if !(total > 0.0) {
            return Err(NetworkError::Malformed(format!(
                "total event rate is {total} with {} lineages",
                self.lineages.len()
            )));
        }
        self.now += sample_exponential(rng, total);
        self.tracker.set_time(self.now);
        let event = self.choose_event(sample_uniform(rng) * total);
        trace!("t = {}: {event:?}", self.now);
        self.apply(event)?;
        Ok(event)
    }

    fn update_rates(&mut self) -> Result<(), NetworkError> {
        let n = self.lineages.len();
        self.rates.speciation = self.parameters.speciation_rate * n as f64;
        self.rates.extinction = self.parameters.extinction_rate * n as f64;
        self.rates.hybridization.clear();
        self.rates.hybridization_total = 0.0;
        self.rates.hgt = 0.0;
        match &self.reticulation {
            Reticulation::None => (),
            Reticulation::Hybridization(nu) => {
                for i in 0..n {
                    for j in (i + 1)..n {
                        let (a, b) = (self.lineages[i], self.lineages[j]);
                        // Sisters without any event since their split
                        // would merge back into a parallel edge.
                        let rate = if a.node == b.node {
                            0.0
                        } else {
                            nu.rate(self.tracker.distance(a.lineage, b.lineage)?)
                        };
                        self.rates.hybridization.push(rate);
                        self.rates.hybridization_total += rate;
                    }
                }
            }
            Reticulation::Hgt(rate) => {
                if n > 1 {
                    self.rates.hgt = rate * (n * (n - 1)) as f64;
                }
            }
        }
        Ok(())
    }

    // `x` is uniform on [0, total rate). Rounding can leave it just
    // past the last term; that case goes to the last positive term.
    fn choose_event(&self, x: f64) -> Event {
        let n = self.lineages.len();
        let last = self.lineages[n - 1].lineage;
        let pick = |x: f64, rate: f64, count: usize| ((x / rate) as usize).min(count - 1);
        if x < self.rates.speciation {
            let i = pick(x, self.parameters.speciation_rate, n);
            return Event::Speciation(self.lineages[i].lineage);
        }
        let x = x - self.rates.speciation;
        if x < self.rates.extinction {
            let i = pick(x, self.parameters.extinction_rate, n);
            return Event::Extinction(self.lineages[i].lineage);
        }
        let x = x - self.rates.extinction;
        if self.rates.hybridization_total > 0.0 {
            let pair = select_weighted(&self.rates.hybridization, x);
            let (i, j) = unrank_pair(pair, n);
            return Event::Hybridization(self.lineages[i].lineage, self.lineages[j].lineage);
        }
        match self.reticulation {
            Reticulation::Hgt(rate) if self.rates.hgt > 0.0 => {
                let k = pick(x, rate, n * (n - 1));
                let donor = k / (n - 1);
                let r = k % (n - 1);
                let recipient = if r >= donor { r + 1 } else { r };
                Event::Hgt {
                    donor: self.lineages[donor].lineage,
                    recipient: self.lineages[recipient].lineage,
                }
            }
            _ if self.rates.extinction > 0.0 => Event::Extinction(last),
            _ => Event::Speciation(last),
        }
    }

    fn position(&self, lineage: Lineage) -> Result<usize, NetworkError> {
        self.lineages
            .iter()
            .position(|l| l.lineage == lineage)
            .ok_or(NetworkError::UnknownLineage(lineage))
    }

    /// Applies `event` at the current time.
    pub fn apply(&mut self, event: Event) -> Result<(), NetworkError> {
        match event {
            Event::Speciation(lineage) => {
                let i = self.position(lineage)?;
                let parent = self.lineages[i];
                let node = self.graph.add_node(self.now, NodeKind::Speciation);
                self.graph.add_edge(parent.node, node, EdgeKind::Tree)?;
                let a = self.new_lineage(node);
                let b = self.new_lineage(node);
                self.tracker.on_speciation(lineage, a.lineage, b.lineage)?;
                self.lineages[i] = a;
                self.lineages.insert(i + 1, b);
            }
            Event::Extinction(lineage) => {
                let i = self.position(lineage)?;
                let dying = self.lineages.remove(i);
                let node = self.graph.add_node(self.now, NodeKind::Extinction);
                self.graph.add_edge(dying.node, node, EdgeKind::Tree)?;
                self.tracker.on_extinction(lineage)?;
            }
            Event::Hybridization(first, second) => {
                let i = self.position(first)?;
                let j = self.position(second)?;
                let (a, b) = (self.lineages[i], self.lineages[j]);
                let node = self.graph.add_node(self.now, NodeKind::Hybridization);
                self.graph.add_edge(a.node, node, EdgeKind::Hybrid)?;
                self.graph.add_edge(b.node, node, EdgeKind::Hybrid)?;
                let child = self.new_lineage(node);
                self.tracker
                    .on_hybridization((a.lineage, b.lineage), child.lineage)?;
                let (keep, drop) = if i < j { (i, j) } else { (j, i) };
                self.lineages[keep] = child;
                self.lineages.remove(drop);
            }
            Event::Hgt { donor, recipient } => {
                let i = self.position(donor)?;
                let j = self.position(recipient)?;
                let donor_node = self.graph.add_node(self.now, NodeKind::HgtDonor);
                self.graph
                    .add_edge(self.lineages[i].node, donor_node, EdgeKind::Tree)?;
                let recipient_node = self.graph.add_node(self.now, NodeKind::HgtRecipient);
                self.graph
                    .add_edge(self.lineages[j].node, recipient_node, EdgeKind::Tree)?;
                self.graph
                    .add_edge(donor_node, recipient_node, EdgeKind::Hybrid)?;
                self.lineages[i].node = donor_node;
                self.lineages[j].node = recipient_node;
            }
        }
        Ok(())
    }

    /// Samples every surviving lineage.
    ///
    /// The process runs on for one more waiting time, so the last
    /// event does not sit exactly on the sampling time.
    fn finish<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), NetworkError> {
        self.update_rates()?;
        let total = self.rates.total();
        if total > 0.0 {
            self.now += sample_exponential(rng, total);
            self.tracker.set_time(self.now);
        }
        for lineage in std::mem::take(&mut self.lineages) {
            let leaf = self.graph.add_node(self.now, NodeKind::Leaf);
            self.graph.add_edge(lineage.node, leaf, EdgeKind::Tree)?;
        }
        Ok(())
    }
}

/// Maps the rank of an unordered pair back to `(i, j)`, `i < j`,
/// using the order (0, 1), (0, 2), …, (0, n-1), (1, 2), …
fn unrank_pair(mut rank: usize, n: usize) -> (usize, usize) {
    for i in 0..n {
        let row = n - i - 1;
        if rank < row {
            return (i, i + 1 + rank);
        }
        rank -= row;
    }
    (n.saturating_sub(2), n.saturating_sub(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rates::{GrowthRule, RateFunction};
    use rand::SeedableRng;

    fn birth_death(target: usize, lambda: f64, mu: f64) -> BirthDeath {
        BirthDeath {
            target_leaf_count: target,
            speciation_rate: lambda,
            extinction_rate: mu,
            max_restarts: 1000,
        }
    }

    fn pure_birth(target: usize) -> EventScheduler<RateFunction, GrowthRule> {
        EventScheduler::new(
            birth_death(target, 1.0, 0.0),
            Reticulation::None,
            GrowthRule::default(),
            SimulationOptions::default(),
        )
    }

    #[test]
    fn test_unrank_pair() {
        let n = 5;
        let mut rank = 0;
        for i in 0..n {
            for j in (i + 1)..n {
                assert_eq!(unrank_pair(rank, n), (i, j));
                rank += 1;
            }
        }
    }

    #[test]
    fn test_crown_start() {
        let mut scheduler = pure_birth(4);
        scheduler.start();
        assert_eq!(scheduler.num_extant(), 2);
        assert_eq!(scheduler.graph().num_nodes(), 1);
        assert_eq!(scheduler.tracker().num_extant(), 2);
    }

    #[test]
    fn test_pure_birth_is_binary_tree() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let graph = pure_birth(5).run(&mut rng).unwrap();
        assert!(graph.validate().is_ok());
        assert!(graph.is_tree());
        assert_eq!(graph.leaves().len(), 5);
        for node in graph.nodes() {
            match graph.kind(node) {
                NodeKind::Root | NodeKind::Speciation => {
                    assert_eq!(graph.out_degree(node), 2)
                }
                NodeKind::Leaf => assert_eq!(graph.out_degree(node), 0),
                kind => panic!("unexpected {kind:?}"),
            }
        }
        // root + 3 speciations + 5 leaves
        assert_eq!(graph.num_nodes(), 9);
    }

    #[test]
    fn test_speciation_event() {
        let mut scheduler = pure_birth(10);
        scheduler.start();
        scheduler.apply(Event::Speciation(Lineage(0))).unwrap();
        assert_eq!(scheduler.num_extant(), 3);
        assert!(!scheduler.tracker().is_extant(Lineage(0)));
        assert_eq!(scheduler.graph().num_edges(), 1);
        assert_eq!(
            scheduler.apply(Event::Speciation(Lineage(0))),
            Err(NetworkError::UnknownLineage(Lineage(0)))
        );
    }

    #[test]
    fn test_hybridization_event() {
        let mut scheduler = EventScheduler::new(
            birth_death(10, 1.0, 0.0),
            Reticulation::Hybridization(RateFunction::Constant { rate: 1.0 }),
            GrowthRule::default(),
            SimulationOptions::default(),
        );
        scheduler.start();
        // lineages 0, 1 at the root; 0 -> 2, 3
        scheduler.apply(Event::Speciation(Lineage(0))).unwrap();
        scheduler
            .apply(Event::Hybridization(Lineage(3), Lineage(1)))
            .unwrap();
        assert_eq!(scheduler.num_extant(), 2);
        let graph = scheduler.graph();
        let hybrid = graph.reticulations();
        assert_eq!(hybrid.len(), 1);
        assert_eq!(graph.kind(hybrid[0]), NodeKind::Hybridization);
        for &e in graph.in_edges(hybrid[0]) {
            assert_eq!(graph.edge(e).unwrap().kind, EdgeKind::Hybrid);
        }
    }

    #[test]
    fn test_sisters_do_not_hybridize() {
        let mut scheduler = EventScheduler::new(
            birth_death(10, 1.0, 0.0),
            Reticulation::Hybridization(RateFunction::Constant { rate: 5.0 }),
            GrowthRule::default(),
            SimulationOptions::default(),
        );
        scheduler.start();
        scheduler.update_rates().unwrap();
        // both founders hang off the root
        assert_eq!(scheduler.rates.hybridization, vec![0.0]);
        scheduler.apply(Event::Speciation(Lineage(0))).unwrap();
        scheduler.update_rates().unwrap();
        // pairs (2, 3), (2, 1), (3, 1)
        assert_eq!(scheduler.rates.hybridization, vec![0.0, 5.0, 5.0]);
        assert_eq!(scheduler.rates.hybridization_total, 10.0);
    }

    #[test]
    fn test_hgt_event_keeps_lineage_count() {
        let mut scheduler = EventScheduler::new(
            birth_death(10, 1.0, 0.0),
            Reticulation::<RateFunction>::Hgt(0.5),
            GrowthRule::default(),
            SimulationOptions::default(),
        );
        scheduler.start();
        scheduler
            .apply(Event::Hgt {
                donor: Lineage(0),
                recipient: Lineage(1),
            })
            .unwrap();
        assert_eq!(scheduler.num_extant(), 2);
        let graph = scheduler.graph();
        let recipient = graph.reticulations()[0];
        assert_eq!(graph.kind(recipient), NodeKind::HgtRecipient);
        let kinds = graph
            .in_edges(recipient)
            .iter()
            .map(|&e| graph.edge(e).unwrap().kind)
            .collect::<Vec<_>>();
        assert_eq!(kinds, vec![EdgeKind::Tree, EdgeKind::Hybrid]);
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_extinction_is_pruned() {
        let options = SimulationOptions::default();
        for seed in 0..20 {
            let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
            let scheduler = EventScheduler::new(
                birth_death(8, 1.0, 0.5),
                Reticulation::<RateFunction>::None,
                GrowthRule::default(),
                options,
            );
            let graph = scheduler.run(&mut rng).unwrap();
            assert!(graph.validate().is_ok());
            assert_eq!(graph.leaves().len(), 8);
            assert!(graph
                .nodes()
                .all(|n| graph.kind(n) != NodeKind::Extinction));
        }
    }

    #[test]
    fn test_keep_extinct_lineages() {
        let options = SimulationOptions::default().with_keep_extinct_lineages();
        for seed in 0..20 {
            let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
            let scheduler = EventScheduler::new(
                birth_death(8, 1.0, 0.5),
                Reticulation::<RateFunction>::None,
                GrowthRule::default(),
                options,
            );
            let graph = scheduler.run(&mut rng).unwrap();
            assert!(graph.validate().is_ok());
            let leaves = graph.leaves();
            let extant = leaves
                .iter()
                .filter(|&&n| graph.kind(n) == NodeKind::Leaf)
                .count();
            assert_eq!(extant, 8);
            let tip = leaves
                .iter()
                .find(|&&n| graph.kind(n) == NodeKind::Leaf)
                .unwrap();
            let sampled_at = graph.time(*tip);
            assert_eq!(graph.extant_at(sampled_at).len(), 8);
        }
    }

    #[test]
    fn test_exhaustion() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        let scheduler = EventScheduler::new(
            BirthDeath {
                target_leaf_count: 50,
                speciation_rate: 0.01,
                extinction_rate: 100.0,
                max_restarts: 4,
            },
            Reticulation::<RateFunction>::None,
            GrowthRule::default(),
            SimulationOptions::default(),
        );
        assert_eq!(
            scheduler.run(&mut rng),
            Err(NetworkError::SimulationExhausted { attempts: 5 })
        );
    }

    #[test]
    fn test_single_leaf() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let graph = pure_birth(1).run(&mut rng).unwrap();
        assert_eq!(graph.num_nodes(), 2);
        assert_eq!(graph.leaves().len(), 1);
        assert!(graph.validate().is_ok());
    }
}
