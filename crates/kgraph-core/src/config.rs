//! Engine configuration.
//!
//! [`EngineConfig`] groups the tunables of the relationship engine:
//! validation limits, traversal defaults and analysis defaults. Every
//! section is `#[serde(default)]`, so a partial TOML or JSON document
//! only overrides what it names.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ============================================================================
// Configuration structs
// ============================================================================

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Limits applied when validating relationship input.
    pub validation: ValidationLimits,

    /// Defaults for path finding and neighborhood expansion.
    pub traversal: TraversalDefaults,

    /// Defaults for whole-graph analysis.
    pub analysis: AnalysisDefaults,

    /// Maximum ancestor depth walked when guarding hierarchical edges
    /// against cycles.
    pub hierarchy_max_depth: usize,
}

/// Limits applied to relationship metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationLimits {
    /// Maximum characters in a metadata string value.
    pub max_string_length: usize,

    /// Maximum items in a metadata array.
    pub max_array_items: usize,

    /// Maximum serialized metadata size in bytes.
    pub max_metadata_bytes: usize,

    /// Maximum nesting depth of metadata objects and arrays.
    pub max_metadata_depth: usize,
}

/// Defaults for traversal calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraversalDefaults {
    /// Hop cutoff for shortest-path search.
    pub max_depth: usize,

    /// Hop cutoff for all-paths enumeration.
    pub all_paths_max_depth: usize,

    /// Maximum number of paths returned by all-paths enumeration.
    pub all_paths_max_paths: usize,

    /// Default neighborhood radius.
    pub neighborhood_depth: usize,

    /// Whether edges flagged `bidirectional` are walkable in reverse.
    pub honor_bidirectional: bool,
}

/// Defaults for analysis calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisDefaults {
    /// PageRank damping factor.
    pub damping_factor: f64,

    /// PageRank power-iteration count.
    pub pagerank_iterations: usize,

    /// Number of sampled nodes for approximate statistics.
    pub sample_size: usize,

    /// Maximum cycle length searched by cycle detection.
    pub cycle_max_depth: usize,

    /// Maximum number of cycles reported.
    pub max_cycles: usize,

    /// Clusters smaller than this are dropped.
    pub min_cluster_size: usize,

    /// Radius of the local neighborhood used by centrality proxies.
    pub local_radius: usize,
}

// ============================================================================
// Default implementations
// ============================================================================

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            validation: ValidationLimits::default(),
            traversal: TraversalDefaults::default(),
            analysis: AnalysisDefaults::default(),
            hierarchy_max_depth: 100,
        }
    }
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_string_length: 4096,
            max_array_items: 1000,
            max_metadata_bytes: 64 * 1024,
            max_metadata_depth: 32,
        }
    }
}

impl Default for TraversalDefaults {
    fn default() -> Self {
        Self {
            max_depth: 10,
            all_paths_max_depth: 5,
            all_paths_max_paths: 100,
            neighborhood_depth: 2,
            honor_bidirectional: true,
        }
    }
}

impl Default for AnalysisDefaults {
    fn default() -> Self {
        Self {
            damping_factor: 0.85,
            pagerank_iterations: 20,
            sample_size: 100,
            cycle_max_depth: 10,
            max_cycles: 100,
            min_cluster_size: 2,
            local_radius: 2,
        }
    }
}

impl EngineConfig {
    /// Check that the configured values are usable.
    pub fn validate(&self) -> Result<()> {
        let analysis = &self.analysis;
        if !(analysis.damping_factor > 0.0 && analysis.damping_factor < 1.0) {
            return Err(Error::config(format!(
                "analysis.damping_factor must be in (0, 1), got {}",
                analysis.damping_factor
            )));
        }
        if analysis.pagerank_iterations == 0 {
            return Err(Error::config("analysis.pagerank_iterations must be > 0"));
        }
        if analysis.sample_size == 0 {
            return Err(Error::config("analysis.sample_size must be > 0"));
        }
        if self.hierarchy_max_depth == 0 {
            return Err(Error::config("hierarchy_max_depth must be > 0"));
        }
        if self.validation.max_metadata_depth == 0 {
            return Err(Error::config("validation.max_metadata_depth must be > 0"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();

        assert_eq!(config.validation.max_string_length, 4096);
        assert_eq!(config.validation.max_array_items, 1000);
        assert_eq!(config.validation.max_metadata_bytes, 65536);
        assert_eq!(config.analysis.damping_factor, 0.85);
        assert_eq!(config.analysis.pagerank_iterations, 20);
        assert!(config.traversal.honor_bidirectional);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_overrides_only_named_fields() {
        let config: EngineConfig = toml::from_str(
            r#"
            hierarchy_max_depth = 7

            [analysis]
            damping_factor = 0.5
            "#,
        )
        .unwrap();

        assert_eq!(config.hierarchy_max_depth, 7);
        assert_eq!(config.analysis.damping_factor, 0.5);
        assert_eq!(config.analysis.pagerank_iterations, 20);
        assert_eq!(config.traversal, TraversalDefaults::default());
    }

    #[test]
    fn test_validate_rejects_bad_damping() {
        let mut config = EngineConfig::default();
        config.analysis.damping_factor = 1.5;

        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_validate_rejects_zero_iterations() {
        let mut config = EngineConfig::default();
        config.analysis.pagerank_iterations = 0;

        assert!(config.validate().is_err());
    }
}
