//! Wind-speed ambiguity resolution for the ocean retrieval.
//!
//! The ocean search runs once per wind-speed node of the reduced table and
//! yields one cost minimum per node. Two selection rules exist and stay
//! separate: lowest cost, or the node nearest a reference (ECMWF) wind.

use crate::core::cost::CostMinimum;
use crate::types::AerosolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AmbiguityStrategy {
    /// Keep the wind node with the lowest cost
    #[default]
    MinimumCost,
    /// Keep the wind node closest to the reference wind speed
    NearestReference,
}

impl fmt::Display for AmbiguityStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmbiguityStrategy::MinimumCost => write!(f, "minimumCost"),
            AmbiguityStrategy::NearestReference => write!(f, "nearestReference"),
        }
    }
}

impl FromStr for AmbiguityStrategy {
    type Err = AerosolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "minimumcost" | "minimum_cost" | "cost" => Ok(AmbiguityStrategy::MinimumCost),
            "nearestreference" | "nearest_reference" | "ecmwf" => Ok(AmbiguityStrategy::NearestReference),
            other => Err(AerosolError::Configuration(format!(
                "Unknown ambiguity strategy: {}",
                other
            ))),
        }
    }
}

impl TryFrom<String> for AmbiguityStrategy {
    type Error = AerosolError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<AmbiguityStrategy> for String {
    fn from(strategy: AmbiguityStrategy) -> String {
        strategy.to_string()
    }
}

/// Cost minimum found at one wind-speed node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindSolution {
    pub wind_speed: f64,
    pub minimum: CostMinimum,
}

impl AmbiguityStrategy {
    /// Pick one solution among the non-degenerate ones
    ///
    /// `NearestReference` without a finite reference falls back to the
    /// minimum-cost rule. Ties keep the earlier solution.
    pub fn select(&self, solutions: &[WindSolution], reference_wind: Option<f64>) -> Option<WindSolution> {
        let usable = solutions.iter().filter(|s| !s.minimum.is_degenerate());
        match (self, reference_wind.filter(|w| w.is_finite())) {
            (AmbiguityStrategy::NearestReference, Some(reference)) => usable
                .fold(None, |best: Option<&WindSolution>, s| match best {
                    None => Some(s),
                    Some(b) => {
                        let db = (b.wind_speed - reference).abs();
                        let ds = (s.wind_speed - reference).abs();
                        if ds < db || (ds == db && s.minimum.cost < b.minimum.cost) {
                            Some(s)
                        } else {
                            Some(b)
                        }
                    }
                })
                .copied(),
            _ => usable
                .fold(None, |best: Option<&WindSolution>, s| match best {
                    Some(b) if b.minimum.cost <= s.minimum.cost => Some(b),
                    _ => Some(s),
                })
                .copied(),
        }
    }
}
