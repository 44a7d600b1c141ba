use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::simulation::config;

/// The configured urgency of an emergency trip. Severities form a closed enumeration; anything
/// else must be rejected at the boundary before the core is invoked.
#[derive(PartialEq, Eq, Debug, ValueEnum, Clone, Copy, Serialize, Deserialize)]
pub enum Severity {
    Critical,
    High,
    Medium,
}

impl Severity {
    /// Additive shift toward the time weight.
    pub fn shift(&self) -> f64 {
        match self {
            Severity::Critical => 0.15,
            Severity::High => 0.08,
            Severity::Medium => 0.05,
        }
    }
}

/// Normalized split between the distance and the time component of an edge cost.
///
/// Invariants: both weights lie in [0.25, 0.75] when produced by [`WeightPair::from_shift`], and
/// the weights always sum to 1. The time weight is derived after the distance weight is clamped,
/// never clamped independently, which preserves the sum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeightPair {
    w_distance: f64,
    w_time: f64,
}

impl WeightPair {
    pub const MIN: f64 = 0.25;
    pub const MAX: f64 = 0.75;

    /// Applies an additive shift away from the even 0.5/0.5 base toward the time weight.
    pub fn from_shift(shift: f64) -> Self {
        let w_distance = (0.5 - shift).clamp(Self::MIN, Self::MAX);
        let pair = WeightPair {
            w_distance,
            w_time: 1.0 - w_distance,
        };
        pair.check();
        pair
    }

    /// A pair with an arbitrary distance weight in [0, 1]. This bypasses the adaptive bounds and
    /// exists for diagnostic comparison searches, e.g. forcing (1, 0) to compare against a pure
    /// shortest-distance search.
    pub fn fixed(w_distance: f64) -> Self {
        assert!(
            (0.0..=1.0).contains(&w_distance),
            "distance weight {w_distance} outside [0, 1]"
        );
        WeightPair {
            w_distance,
            w_time: 1.0 - w_distance,
        }
    }

    pub fn distance(&self) -> f64 {
        self.w_distance
    }

    pub fn time(&self) -> f64 {
        self.w_time
    }

    fn check(&self) {
        assert!(
            ((self.w_distance + self.w_time) - 1.0).abs() < 1e-9,
            "weights {self:?} do not sum to 1"
        );
        assert!(
            (Self::MIN..=Self::MAX).contains(&self.w_distance),
            "distance weight {} outside [{}, {}]",
            self.w_distance,
            Self::MIN,
            Self::MAX
        );
    }
}

/// Strategy for pricing edges during a search. The router recomputes the pair at every node
/// expansion, so implementations must be pure functions of their inputs.
pub trait Weighting {
    fn weights(&self, progress: f64, time_of_day: u32) -> WeightPair;
}

/// Context-adaptive weighting: starts from an even base and shifts toward the time weight with
/// emergency severity, trip progress and time of day.
#[derive(Debug, Clone)]
pub struct AdaptiveWeights {
    severity: Severity,
    rush_hours: Vec<config::TimeWindow>,
}

/// maximum additional shift as the vehicle approaches its goal
const PROGRESS_MAX_SHIFT: f64 = 0.20;
/// additional shift inside a configured rush-hour window
const RUSH_HOUR_SHIFT: f64 = 0.05;

impl AdaptiveWeights {
    pub fn new(severity: Severity, routing: &config::Routing) -> Self {
        AdaptiveWeights {
            severity,
            rush_hours: routing.rush_hours.clone(),
        }
    }

    fn temporal_shift(&self, time_of_day: u32) -> f64 {
        let time_of_day = time_of_day % 86400;
        if self.rush_hours.iter().any(|w| w.contains(time_of_day)) {
            RUSH_HOUR_SHIFT
        } else {
            0.0
        }
    }
}

impl Weighting for AdaptiveWeights {
    fn weights(&self, progress: f64, time_of_day: u32) -> WeightPair {
        let progress = progress.clamp(0.0, 1.0);
        let shift =
            self.severity.shift() + PROGRESS_MAX_SHIFT * progress + self.temporal_shift(time_of_day);
        WeightPair::from_shift(shift)
    }
}

/// Weighting that ignores all context. Used for diagnostic searches and for comparing the
/// adaptive router against fixed-weight baselines.
#[derive(Debug, Clone)]
pub struct FixedWeights(pub WeightPair);

impl Weighting for FixedWeights {
    fn weights(&self, _progress: f64, _time_of_day: u32) -> WeightPair {
        self.0
    }
}
