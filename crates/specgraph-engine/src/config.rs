//! Engine configuration
//!
//! Thresholds and policies shared by the analyzers, validators and
//! mutations. Loadable from TOML; every field has a default.

use crate::graph::EdgeFilter;
use serde::{Deserialize, Serialize};

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Coupling above this value raises a high-coupling issue
    pub high_coupling_threshold: f64,
    /// Fan-out above this value raises a high-fan-out issue
    pub high_fan_out_threshold: usize,
    /// Length of the most-connected list
    pub most_connected_limit: usize,
    /// Minimum normalized similarity for a repair suggestion (exclusive)
    pub similarity_threshold: f64,
    /// Maximum suggestions per broken reference
    pub max_suggestions: usize,
    /// Coverage percentage (0..=100) below which a recommendation is emitted
    pub min_coverage_percentage: f64,
    /// Edges followed by cycle detection
    pub cycle_edges: EdgeFilter,
    /// Accept references from a node to itself
    pub allow_self_reference: bool,
    /// Accept supersessions whose new version lies on a dependency cycle
    pub allow_supersession_cycles: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            high_coupling_threshold: 0.5,
            high_fan_out_threshold: 10,
            most_connected_limit: 10,
            similarity_threshold: 0.6,
            max_suggestions: 3,
            min_coverage_percentage: 80.0,
            cycle_edges: EdgeFilter::Dependencies,
            allow_self_reference: false,
            allow_supersession_cycles: false,
        }
    }
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration from TOML; missing keys keep their defaults
    ///
    /// # Errors
    ///
    /// Returns the TOML error when the document is malformed or a value has the wrong type.
    pub fn from_toml_str(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }

    /// With high-coupling threshold
    #[inline]
    #[must_use]
    pub fn with_high_coupling_threshold(mut self, threshold: f64) -> Self {
        self.high_coupling_threshold = threshold;
        self
    }

    /// With high-fan-out threshold
    #[inline]
    #[must_use]
    pub fn with_high_fan_out_threshold(mut self, threshold: usize) -> Self {
        self.high_fan_out_threshold = threshold;
        self
    }

    /// With most-connected list length
    #[inline]
    #[must_use]
    pub fn with_most_connected_limit(mut self, limit: usize) -> Self {
        self.most_connected_limit = limit;
        self
    }

    /// With suggestion similarity threshold
    #[inline]
    #[must_use]
    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// With maximum suggestions per reference
    #[inline]
    #[must_use]
    pub fn with_max_suggestions(mut self, max: usize) -> Self {
        self.max_suggestions = max;
        self
    }

    /// With minimum coverage percentage
    #[inline]
    #[must_use]
    pub fn with_min_coverage(mut self, percentage: f64) -> Self {
        self.min_coverage_percentage = percentage;
        self
    }

    /// With cycle edge filter
    #[inline]
    #[must_use]
    pub fn with_cycle_edges(mut self, filter: EdgeFilter) -> Self {
        self.cycle_edges = filter;
        self
    }

    /// With self-reference policy
    #[inline]
    #[must_use]
    pub fn with_self_reference(mut self, allow: bool) -> Self {
        self.allow_self_reference = allow;
        self
    }

    /// With supersession cycle policy
    #[inline]
    #[must_use]
    pub fn with_supersession_cycles(mut self, allow: bool) -> Self {
        self.allow_supersession_cycles = allow;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert!((config.high_coupling_threshold - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.high_fan_out_threshold, 10);
        assert_eq!(config.max_suggestions, 3);
        assert_eq!(config.cycle_edges, EdgeFilter::Dependencies);
        assert!(!config.allow_supersession_cycles);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            high_fan_out_threshold = 4
            cycle_edges = "all"
            "#,
        )
        .unwrap();

        assert_eq!(config.high_fan_out_threshold, 4);
        assert_eq!(config.cycle_edges, EdgeFilter::All);
        assert_eq!(config.most_connected_limit, 10);
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(EngineConfig::from_toml_str("high_fan_out_threshold = \"many\"").is_err());
    }

    #[test]
    fn builders_chain() {
        let config = EngineConfig::new().with_max_suggestions(5).with_self_reference(true);
        assert_eq!(config.max_suggestions, 5);
        assert!(config.allow_self_reference);
    }
}
