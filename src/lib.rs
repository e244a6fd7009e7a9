//! Random phylogenetic networks.
//!
//! Two generators are provided:
//!
//! * [`simulate_heath_network`] runs a birth-death process extended by
//!   distance dependent hybridization or by horizontal gene transfer.
//! * [`simulate_beta_splitting_network`] draws a beta-splitting tree
//!   and adds hybrid edges to it.
//!
//! Both are deterministic functions of their configuration, seed
//! included. The engines behind them ([`scheduler::EventScheduler`],
//! [`beta_splitting::BetaSplittingTreeGenerator`],
//! [`augment::EdgeAugmenter`]) take any [`rand::Rng`] and are public
//! for callers that need their own rate functions.

use std::collections::HashSet;

use log::info;
use nohash::BuildNoHashHasher;
use rand::rngs::StdRng;
use rand::SeedableRng;

pub mod augment;
pub mod beta_splitting;
pub mod config;
pub mod distance;
pub mod error;
pub mod graph;
pub mod rates;
pub mod scheduler;

mod flags;
mod rng;

pub use config::{BetaSplittingConfig, HeathConfig, ReticulationModel};
pub use error::{ConfigurationError, InsufficientCandidates, InvalidEdge, NetworkError};
pub use flags::SimulationOptions;
pub use graph::{EdgeKind, EdgeRecord, NetworkGraph, NodeKind};

use augment::EdgeAugmenter;
use beta_splitting::BetaSplittingTreeGenerator;
use rates::{GrowthRule, RateFunction};
use scheduler::{EventScheduler, Reticulation};

#[repr(transparent)]
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct Node(usize);

impl Node {
    pub fn as_index(&self) -> usize {
        self.0
    }
}

#[repr(transparent)]
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct Edge(usize);

impl Edge {
    pub fn as_index(&self) -> usize {
        self.0
    }
}

/// A branch alive during a birth-death run.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct Lineage(usize);

type NodeHash = HashSet<Node, BuildNoHashHasher<usize>>;

/// A beta-splitting network and, if the augmenter ran short of
/// candidates, how short.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedNetwork {
    pub network: NetworkGraph,
    pub warning: Option<InsufficientCandidates>,
}

/// Simulates the extended birth-death model.
///
/// # Errors
///
/// * [`NetworkError::Configuration`] if `config` does not validate.
/// * [`NetworkError::SimulationExhausted`] if every attempt died out.
pub fn simulate_heath_network(config: &HeathConfig) -> Result<NetworkGraph, NetworkError> {
    let parameters = config.birth_death()?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let network = match config.reticulation {
        ReticulationModel::None => EventScheduler::new(
            parameters,
            Reticulation::<RateFunction>::None,
            GrowthRule::default(),
            config.options,
        )
        .run(&mut rng)?,
        ReticulationModel::Hybridization { rate, growth } => EventScheduler::new(
            parameters,
            Reticulation::Hybridization(rate),
            growth,
            config.options,
        )
        .run(&mut rng)?,
        ReticulationModel::Hgt { rate } => EventScheduler::new(
            parameters,
            Reticulation::<RateFunction>::Hgt(rate),
            GrowthRule::default(),
            config.options,
        )
        .run(&mut rng)?,
    };
    info!(
        "birth-death network: {} nodes, {} edges, {} leaves",
        network.num_nodes(),
        network.num_edges(),
        network.leaves().len()
    );
    Ok(network)
}

/// Draws a beta-splitting tree and adds `edge_count` hybrid edges.
///
/// A shortfall of candidates is not an error; it is reported in
/// [`GeneratedNetwork::warning`].
pub fn simulate_beta_splitting_network(
    config: &BetaSplittingConfig,
) -> Result<GeneratedNetwork, NetworkError> {
    config.validate()?;
    let leaf_count = usize::try_from(config.leaf_count)
        .map_err(|_| ConfigurationError::LeafCount(config.leaf_count))?;
    let edge_count = usize::try_from(config.edge_count)
        .map_err(|_| ConfigurationError::EdgeCount(config.edge_count))?;
    let mut rng = StdRng::seed_from_u64(config.seed);

    let mut generator = BetaSplittingTreeGenerator::new(config.beta, config.level_increment)?;
    let mut network = generator.generate(leaf_count, &mut rng)?;
    let augmenter = EdgeAugmenter::new(config.mode, config.attachment, config.locality);
    let report = augmenter.augment(&mut network, edge_count, &mut rng)?;
    info!(
        "beta-splitting network: {} leaves, {} of {} extra edges",
        leaf_count,
        report.added.len(),
        edge_count
    );
    Ok(GeneratedNetwork {
        network,
        warning: report.shortfall(),
    })
}
