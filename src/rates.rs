//! Pluggable rate functions.
//!
//! The functional forms of the hybridization rate and of distance
//! growth are model hyperparameters. The engines only see the traits;
//! the enums are serializable families for configuration files and
//! none of them is privileged.

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Rate ν(d) at which two lineages at distance `d` hybridize.
///
/// Implementations must be non-increasing in `d` and never negative.
pub trait HybridizationRate {
    fn rate(&self, distance: f64) -> f64;
}

/// Evolves a pairwise distance over elapsed time.
///
/// `grow(base, 0.0) == base`, non-decreasing in `elapsed`, and
/// `grow(grow(d, s), t) == grow(d, s + t)` so that applying it lazily
/// gives the same result as applying it on every tick.
pub trait DistanceGrowth {
    fn grow(&self, base: f64, elapsed: f64) -> f64;
}

impl<F: Fn(f64) -> f64> HybridizationRate for F {
    fn rate(&self, distance: f64) -> f64 {
        self(distance)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "form", rename_all = "snake_case")]
pub enum RateFunction {
    /// ν(d) = rate
    Constant { rate: f64 },
    /// ν(d) = rate · exp(−decay · d)
    Exponential { rate: f64, decay: f64 },
    /// ν(d) = rate · max(0, 1 − d / max_distance)
    Linear { rate: f64, max_distance: f64 },
    /// ν(d) = rate if d ≤ max_distance, else 0
    Threshold { rate: f64, max_distance: f64 },
}

impl RateFunction {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        match *self {
            RateFunction::Constant { rate } => non_negative("hybridization rate", rate),
            RateFunction::Exponential { rate, decay } => {
                non_negative("hybridization rate", rate)?;
                non_negative("hybridization decay", decay)
            }
            RateFunction::Linear { rate, max_distance }
            | RateFunction::Threshold { rate, max_distance } => {
                non_negative("hybridization rate", rate)?;
                positive("maximum hybridization distance", max_distance)
            }
        }
    }
}

impl HybridizationRate for RateFunction {
    fn rate(&self, distance: f64) -> f64 {
        match *self {
            RateFunction::Constant { rate } => rate,
            RateFunction::Exponential { rate, decay } => rate * libm::exp(-decay * distance),
            RateFunction::Linear { rate, max_distance } => {
                rate * (1.0 - distance / max_distance).max(0.0)
            }
            RateFunction::Threshold { rate, max_distance } => {
                if distance <= max_distance {
                    rate
                } else {
                    0.0
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum GrowthRule {
    /// d + rate · t
    Linear { rate: f64 },
    /// limit − (limit − d) · exp(−rate · t), for d ≤ limit
    Saturating { rate: f64, limit: f64 },
}

impl Default for GrowthRule {
    fn default() -> Self {
        GrowthRule::Linear { rate: 1.0 }
    }
}

impl GrowthRule {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        match *self {
            GrowthRule::Linear { rate } => non_negative("distance growth rate", rate),
            GrowthRule::Saturating { rate, limit } => {
                non_negative("distance growth rate", rate)?;
                positive("distance limit", limit)
            }
        }
    }
}

impl DistanceGrowth for GrowthRule {
    fn grow(&self, base: f64, elapsed: f64) -> f64 {
        match *self {
            GrowthRule::Linear { rate } => base + rate * elapsed,
            GrowthRule::Saturating { rate, limit } => {
                if base >= limit {
                    base
                } else {
                    limit - (limit - base) * libm::exp(-rate * elapsed)
                }
            }
        }
    }
}

pub(crate) fn non_negative(name: &'static str, value: f64) -> Result<(), ConfigurationError> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigurationError::NegativeRate { name, value })
    }
}

pub(crate) fn positive(name: &'static str, value: f64) -> Result<(), ConfigurationError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigurationError::NonPositive { name, value })
    }
}
