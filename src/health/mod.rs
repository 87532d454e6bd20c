//! Deterministic health formulas
//!
//! Everything here is plain arithmetic over the profile and check-in. None
//! of it calls a model: numbers that end up in front of the user must be
//! reproducible. Results are rough wellness estimates, not medical advice.

pub mod benchmarks;
pub mod body;
pub mod pillars;
pub mod snapshot;

pub use benchmarks::*;
pub use body::*;
pub use pillars::*;
pub use snapshot::*;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Millilitres in one glass of water
pub const ML_PER_GLASS: f64 = 250.0;

/// Three-step risk scale used by several pillar indicators
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

impl RiskLevel {
    /// One step worse, saturating at high
    pub fn escalate(self) -> Self {
        match self {
            RiskLevel::Low => RiskLevel::Moderate,
            RiskLevel::Moderate | RiskLevel::High => RiskLevel::High,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Moderate => "moderate",
            RiskLevel::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Round half away from zero to `places` decimals
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Clamp an additive score onto the 1-10 scale
pub(crate) fn clamp_score(score: i32) -> u8 {
    score.clamp(1, 10) as u8
}
