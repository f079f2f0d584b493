//! Cross-view correspondence matching.
//!
//! Builds a weighted multi-feature cost matrix between the detections of the
//! two views at one synchronized instant, solves the rectangular linear sum
//! assignment problem on it, and keeps the assigned pairs whose cost is below
//! the configured threshold.

use std::collections::BTreeMap;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::detection::Detection;
use crate::distances::{distance_by_name, FeatureDistance, FeatureDistanceFunction};
use crate::features::FeatureKind;
use crate::internal::scipy::linear_sum_assignment;
use crate::{Error, Result};

/// Allowed deviation of the weight sum from 1.0.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-5;

/// Cost substituted for non-finite cost entries. Never accepted by any
/// reasonable threshold.
pub const UNMATCHABLE_COST: f64 = 1e6;

/// Per-feature weights of the combined cost.
///
/// Non-negative, finite and summing to 1.0 (within [`WEIGHT_SUM_TOLERANCE`]).
/// Features absent from the map do not contribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureWeights(BTreeMap<FeatureKind, f64>);

impl FeatureWeights {
    /// Create validated weights.
    ///
    /// # Errors
    /// `InvalidConfig` if a weight is negative or non-finite, or the weights
    /// do not sum to 1.0.
    pub fn new(weights: impl IntoIterator<Item = (FeatureKind, f64)>) -> Result<Self> {
        let weights = Self(weights.into_iter().collect());
        weights.validate()?;
        Ok(weights)
    }

    pub fn validate(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(Error::InvalidConfig("feature weights are empty".to_string()));
        }

        for (kind, &w) in &self.0 {
            if !w.is_finite() || w < 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "weight for {} must be finite and non-negative, got {}",
                    kind, w
                )));
            }
        }

        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(Error::InvalidConfig(format!(
                "feature weights must sum to 1.0, got {}",
                sum
            )));
        }

        Ok(())
    }

    pub fn get(&self, kind: FeatureKind) -> f64 {
        self.0.get(&kind).copied().unwrap_or(0.0)
    }

    pub fn sum(&self) -> f64 {
        self.0.values().sum()
    }

    /// Features with a strictly positive weight, in [`FeatureKind`] order.
    pub fn active(&self) -> impl Iterator<Item = (FeatureKind, f64)> + '_ {
        self.0.iter().filter(|(_, &w)| w > 0.0).map(|(&k, &w)| (k, w))
    }
}

impl Default for FeatureWeights {
    fn default() -> Self {
        Self(BTreeMap::from([
            (FeatureKind::Appearance, 0.3),
            (FeatureKind::ColorHist, 0.2),
            (FeatureKind::FieldCoords, 0.4),
            (FeatureKind::Pose, 0.1),
        ]))
    }
}

/// Configuration for [`CorrespondenceMatcher`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Per-feature weights.
    pub weights: FeatureWeights,

    /// Assigned pairs are accepted only when their cost is strictly below this.
    pub max_cost: f64,

    /// Field-plane distance that maps to a field cost of 1.0.
    pub field_distance_scale: f64,

    /// Denominator epsilon of the chi-squared histogram distance.
    pub chi_squared_eps: f64,

    /// Per-feature distance overrides by name (see [`distance_by_name`]).
    /// Features without an entry use their built-in distance.
    pub distances: BTreeMap<FeatureKind, String>,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            weights: FeatureWeights::default(),
            max_cost: 0.8,
            field_distance_scale: 100.0,
            chi_squared_eps: 1e-10,
            distances: BTreeMap::new(),
        }
    }
}

impl MatcherConfig {
    pub fn validate(&self) -> Result<()> {
        self.weights.validate()?;

        if !self.max_cost.is_finite() || self.max_cost <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "max_cost must be finite and positive, got {}",
                self.max_cost
            )));
        }
        if !self.field_distance_scale.is_finite() || self.field_distance_scale <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "field_distance_scale must be finite and positive, got {}",
                self.field_distance_scale
            )));
        }
        if !self.chi_squared_eps.is_finite() || self.chi_squared_eps <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "chi_squared_eps must be finite and positive, got {}",
                self.chi_squared_eps
            )));
        }
        for name in self.distances.values() {
            distance_by_name(name)?;
        }
        Ok(())
    }
}

/// An accepted correspondence between detections of the two views.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchedPair {
    /// Index into the first view's detection list.
    pub first: usize,

    /// Index into the second view's detection list.
    pub second: usize,

    /// Combined cost of the pair.
    pub cost: f64,
}

/// Result of matching one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameMatches {
    /// Accepted pairs, ascending by `first`.
    pub pairs: Vec<MatchedPair>,

    /// First-view indices without an accepted partner, ascending.
    pub unmatched_first: Vec<usize>,

    /// Second-view indices without an accepted partner, ascending.
    pub unmatched_second: Vec<usize>,
}

impl FrameMatches {
    fn all_unmatched(n_first: usize, n_second: usize) -> Self {
        Self {
            pairs: Vec::new(),
            unmatched_first: (0..n_first).collect(),
            unmatched_second: (0..n_second).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Solves one-to-one correspondences between the two views' detections.
///
/// Stateless between calls apart from its configuration.
#[derive(Debug, Clone)]
pub struct CorrespondenceMatcher {
    config: MatcherConfig,
    distances: Vec<(FeatureKind, f64, FeatureDistanceFunction)>,
}

impl CorrespondenceMatcher {
    /// Create a matcher.
    ///
    /// # Errors
    /// `InvalidConfig` if the weights or thresholds are invalid, and
    /// `UnknownDistance` for an unrecognised distance override.
    pub fn new(config: MatcherConfig) -> Result<Self> {
        config.validate()?;

        let mut distances = Vec::new();
        for (kind, w) in config.weights.active() {
            let d = match config.distances.get(&kind) {
                Some(name) => distance_by_name(name)?,
                None => FeatureDistanceFunction::for_kind(kind, &config),
            };
            debug!(feature = %kind, weight = w, distance = d.name(), "matcher feature");
            distances.push((kind, w, d));
        }

        Ok(Self { config, distances })
    }

    /// Create a matcher with custom weights and default thresholds.
    pub fn with_weights(weights: FeatureWeights) -> Result<Self> {
        Self::new(MatcherConfig {
            weights,
            ..MatcherConfig::default()
        })
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Combined cost of a single pair.
    ///
    /// May be non-finite when a sub-vector pair cannot be compared.
    pub fn pairwise_cost(&self, a: &Detection, b: &Detection) -> f64 {
        self.distances
            .iter()
            .map(|(kind, w, d)| w * d.distance(a.features.get(*kind), b.features.get(*kind)))
            .sum()
    }

    /// Weighted cost matrix of shape `(first.len(), second.len())`.
    ///
    /// Entries that come out non-finite are replaced by [`UNMATCHABLE_COST`]
    /// and negative rounding residue is floored at 0, so every entry is finite
    /// and non-negative.
    pub fn cost_matrix(&self, first: &[Detection], second: &[Detection]) -> DMatrix<f64> {
        let mut cost = DMatrix::zeros(first.len(), second.len());

        for (kind, w, d) in &self.distances {
            let a: Vec<&[f64]> = first.iter().map(|det| det.features.get(*kind)).collect();
            let b: Vec<&[f64]> = second.iter().map(|det| det.features.get(*kind)).collect();
            cost += d.pairwise(&a, &b) * *w;
        }

        let mut replaced = 0usize;
        for c in cost.iter_mut() {
            if !c.is_finite() {
                *c = UNMATCHABLE_COST;
                replaced += 1;
            } else if *c < 0.0 {
                *c = 0.0;
            }
        }
        if replaced > 0 {
            warn!(replaced, "non-finite entries in cost matrix marked unmatchable");
        }

        cost
    }

    /// Match the detections of the two views at one instant.
    ///
    /// Pairs are solved as a global minimum-cost assignment and then gated:
    /// a pair is accepted only when its cost is strictly below `max_cost`.
    /// An empty list on either side yields no pairs without solving.
    pub fn match_frame(&self, first: &[Detection], second: &[Detection]) -> Result<FrameMatches> {
        if first.is_empty() || second.is_empty() {
            warn!(
                first = first.len(),
                second = second.len(),
                "empty detection list, nothing to match"
            );
            return Ok(FrameMatches::all_unmatched(first.len(), second.len()));
        }

        let cost = self.cost_matrix(first, second);
        let solution = linear_sum_assignment(&cost)?;
        debug!(
            assigned = solution.assignments.len(),
            total_cost = solution.total_cost(&cost),
            "solved assignment"
        );

        let mut unmatched_first = solution.unmatched_rows;
        let mut unmatched_second = solution.unmatched_cols;
        let mut pairs = Vec::with_capacity(solution.assignments.len());

        for a in &solution.assignments {
            let c = cost[(a.row_idx, a.col_idx)];
            if c < self.config.max_cost {
                debug!(
                    first = %first[a.row_idx].key(),
                    second = %second[a.col_idx].key(),
                    cost = c,
                    "accepted correspondence"
                );
                pairs.push(MatchedPair {
                    first: a.row_idx,
                    second: a.col_idx,
                    cost: c,
                });
            } else {
                unmatched_first.push(a.row_idx);
                unmatched_second.push(a.col_idx);
            }
        }
        unmatched_first.sort_unstable();
        unmatched_second.sort_unstable();

        Ok(FrameMatches {
            pairs,
            unmatched_first,
            unmatched_second,
        })
    }
}
