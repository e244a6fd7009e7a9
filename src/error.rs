use thiserror::Error;

use crate::Lineage;
use crate::Node;

/// Reasons an edge insertion is refused.
///
/// A correct caller never sees one of these from the generators:
/// they indicate a broken invariant inside a run.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum InvalidEdge {
    #[error("node {0:?} does not exist")]
    UnknownNode(Node),
    #[error("edge {0:?} does not exist")]
    UnknownEdge(crate::Edge),
    #[error("self loop on {0:?}")]
    SelfLoop(Node),
    #[error("edge {parent:?} -> {child:?} goes back in time ({parent_time} > {child_time})")]
    TimeInconsistent {
        parent: Node,
        child: Node,
        parent_time: f64,
        child_time: f64,
    },
    #[error("edge {parent:?} -> {child:?} would close a cycle")]
    Cycle { parent: Node, child: Node },
    #[error("{0:?} already has two parents")]
    InDegreeExceeded(Node),
    #[error("edge {parent:?} -> {child:?} already exists")]
    Duplicate { parent: Node, child: Node },
    #[error("time {time} is outside of edge {edge:?}")]
    OutsideEdge { edge: crate::Edge, time: f64 },
}

/// Invalid or out-of-domain parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("{name} is {value}, but must be a non-negative number")]
    NegativeRate { name: &'static str, value: f64 },
    #[error("{name} is {value}, but must be strictly positive")]
    NonPositive { name: &'static str, value: f64 },
    #[error("{name} is {value}, but must lie in (0, 1)")]
    NotAProbability { name: &'static str, value: f64 },
    #[error("beta is {0}, but must be >= -2")]
    BetaOutOfDomain(f64),
    #[error("target leaf count is {0}, but must be at least 1")]
    LeafCount(i64),
    #[error("edge count is {0}, but must not be negative")]
    EdgeCount(i64),
}

/// The requested number of extra edges could not be placed.
///
/// This is a warning: it travels next to a usable, partially
/// augmented network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("only {added} of {requested} requested edges could be added")]
pub struct InsufficientCandidates {
    pub requested: usize,
    pub added: usize,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NetworkError {
    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("every lineage went extinct in each of {attempts} attempts")]
    SimulationExhausted { attempts: usize },
    #[error("invalid edge: {0}")]
    InvalidEdge(#[from] InvalidEdge),
    #[error("lineage {0:?} is not extant")]
    UnknownLineage(Lineage),
    #[error("malformed network: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_converts() {
        let e: NetworkError = ConfigurationError::LeafCount(0).into();
        assert!(matches!(e, NetworkError::Configuration(_)));
        assert!(e.to_string().contains("at least 1"));
    }

    #[test]
    fn test_probability_interval_is_open() {
        let e = ConfigurationError::NotAProbability {
            name: "stop probability",
            value: 1.0,
        };
        assert_eq!(
            e.to_string(),
            "stop probability is 1, but must lie in (0, 1)"
        );
    }

    #[test]
    fn test_shortfall_display() {
        let w = InsufficientCandidates {
            requested: 5,
            added: 2,
        };
        assert_eq!(w.to_string(), "only 2 of 5 requested edges could be added");
    }
}
