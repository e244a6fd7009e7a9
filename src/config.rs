//! Configuration records for the two generators.
//!
//! Every field has a default, so a record can be read from a partial
//! document in any serde format. Nothing is checked while
//! deserializing; call `validate` (the entry points do) before use.

use serde::{Deserialize, Serialize};

use crate::augment::{AugmentationMode, Attachment, Locality};
use crate::beta_splitting::MIN_BETA;
use crate::error::ConfigurationError;
use crate::flags::SimulationOptions;
use crate::rates::{non_negative, positive, GrowthRule, RateFunction};
use crate::scheduler::BirthDeath;

/// The reticulation process added to birth and death.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum ReticulationModel {
    #[default]
    None,
    Hybridization {
        rate: RateFunction,
        #[serde(default)]
        growth: GrowthRule,
    },
    Hgt {
        rate: f64,
    },
}

impl ReticulationModel {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        match self {
            ReticulationModel::None => Ok(()),
            ReticulationModel::Hybridization { rate, growth } => {
                rate.validate()?;
                growth.validate()
            }
            ReticulationModel::Hgt { rate } => non_negative("hgt rate", *rate),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HeathConfig {
    pub target_leaf_count: i64,
    pub speciation_rate: f64,
    pub extinction_rate: f64,
    pub reticulation: ReticulationModel,
    /// Fresh starts allowed after total extinction.
    pub max_restarts: usize,
    pub seed: u64,
    pub options: SimulationOptions,
}

impl Default for HeathConfig {
    fn default() -> Self {
        Self {
            target_leaf_count: 10,
            speciation_rate: 1.0,
            extinction_rate: 0.0,
            reticulation: ReticulationModel::None,
            max_restarts: 1000,
            seed: 0,
            options: SimulationOptions::default(),
        }
    }
}

impl HeathConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.target_leaf_count < 1 {
            return Err(ConfigurationError::LeafCount(self.target_leaf_count));
        }
        positive("speciation rate", self.speciation_rate)?;
        non_negative("extinction rate", self.extinction_rate)?;
        self.reticulation.validate()
    }

    /// The birth-death part of the record, checked.
    pub fn birth_death(&self) -> Result<BirthDeath, ConfigurationError> {
        self.validate()?;
        Ok(BirthDeath {
            target_leaf_count: usize::try_from(self.target_leaf_count)
                .map_err(|_| ConfigurationError::LeafCount(self.target_leaf_count))?,
            speciation_rate: self.speciation_rate,
            extinction_rate: self.extinction_rate,
            max_restarts: self.max_restarts,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BetaSplittingConfig {
    pub leaf_count: i64,
    pub beta: f64,
    /// Time between a node and its children.
    pub level_increment: f64,
    /// Hybrid edges to add to the tree.
    pub edge_count: i64,
    pub mode: AugmentationMode,
    pub attachment: Attachment,
    /// Only used in local mode.
    pub locality: Locality,
    pub seed: u64,
}

impl Default for BetaSplittingConfig {
    fn default() -> Self {
        Self {
            leaf_count: 10,
            beta: 0.0,
            level_increment: 1.0,
            edge_count: 0,
            mode: AugmentationMode::default(),
            attachment: Attachment::default(),
            locality: Locality::default(),
            seed: 0,
        }
    }
}

impl BetaSplittingConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.leaf_count < 1 {
            return Err(ConfigurationError::LeafCount(self.leaf_count));
        }
        if !(self.beta >= MIN_BETA) || !self.beta.is_finite() {
            return Err(ConfigurationError::BetaOutOfDomain(self.beta));
        }
        non_negative("level increment", self.level_increment)?;
        if self.edge_count < 0 {
            return Err(ConfigurationError::EdgeCount(self.edge_count));
        }
        self.locality.validate()
    }
}

#[cfg(test)]
mod test_configuration {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(HeathConfig::default().validate().is_ok());
        assert!(BetaSplittingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_documents() {
        let config: HeathConfig = serde_json::from_str(
            r#"{
                "target_leaf_count": 5,
                "extinction_rate": 0.25,
                "reticulation": {
                    "model": "hybridization",
                    "rate": {"form": "exponential", "rate": 1.0, "decay": 2.0}
                }
            }"#,
        )
        .unwrap();
        assert_eq!(config.target_leaf_count, 5);
        assert_eq!(config.speciation_rate, 1.0);
        assert_eq!(config.max_restarts, 1000);
        assert_eq!(
            config.reticulation,
            ReticulationModel::Hybridization {
                rate: RateFunction::Exponential {
                    rate: 1.0,
                    decay: 2.0
                },
                growth: GrowthRule::Linear { rate: 1.0 },
            }
        );

        let config: BetaSplittingConfig = serde_json::from_str(
            r#"{"leaf_count": 20, "edge_count": 3, "mode": "local",
                "locality": {"kind": "temporal", "scale": 0.5}}"#,
        )
        .unwrap();
        assert_eq!(config.mode, AugmentationMode::Local);
        assert_eq!(config.attachment, Attachment::Nodes);
        assert_eq!(config.locality, Locality::Temporal { scale: 0.5 });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        assert!(serde_json::from_str::<HeathConfig>(r#"{"target_leaves": 5}"#).is_err());
    }

    #[test]
    fn test_options_survive_serialization() {
        let config = HeathConfig {
            options: SimulationOptions::default()
                .with_stem_start()
                .with_keep_extinct_lineages(),
            reticulation: ReticulationModel::Hgt { rate: 0.1 },
            ..Default::default()
        };
        let text = serde_json::to_string(&config).unwrap();
        let back: HeathConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back, config);
        assert!(back.options.stem_start());
    }

    #[test]
    fn test_heath_rejections() {
        let bad = [
            HeathConfig {
                target_leaf_count: 0,
                ..Default::default()
            },
            HeathConfig {
                target_leaf_count: -3,
                ..Default::default()
            },
            HeathConfig {
                speciation_rate: 0.0,
                ..Default::default()
            },
            HeathConfig {
                extinction_rate: -0.1,
                ..Default::default()
            },
            HeathConfig {
                reticulation: ReticulationModel::Hgt { rate: -1.0 },
                ..Default::default()
            },
            HeathConfig {
                reticulation: ReticulationModel::Hybridization {
                    rate: RateFunction::Constant { rate: 1.0 },
                    growth: GrowthRule::Linear { rate: -2.0 },
                },
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{config:?}");
            assert!(config.birth_death().is_err());
        }
        assert_eq!(
            HeathConfig {
                target_leaf_count: -3,
                ..Default::default()
            }
            .validate(),
            Err(ConfigurationError::LeafCount(-3))
        );
    }

    #[test]
    fn test_beta_splitting_rejections() {
        let config = BetaSplittingConfig {
            beta: -2.5,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigurationError::BetaOutOfDomain(-2.5))
        );
        let config = BetaSplittingConfig {
            edge_count: -1,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigurationError::EdgeCount(-1)));
        let config = BetaSplittingConfig {
            leaf_count: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigurationError::LeafCount(0)));
        let config = BetaSplittingConfig {
            level_increment: f64::INFINITY,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
