//! Configuration for the kgraph CLI.
//!
//! Provides the [`KgraphConfig`] struct that loads from TOML files,
//! environment variables, and defaults using the `confyg` crate.
//!
//! # Loading Priority
//!
//! 1. Explicit `--config <path>` flag
//! 2. `KGRAPH_CONFIG` environment variable
//! 3. XDG default: `~/.config/kgraph/config.toml`
//! 4. Built-in defaults
//!
//! `KGRAPH_SNAPSHOT_PATH` overrides `snapshot.path` from any of the above.

use confyg::{Confygery, env};
use kgraph_core::{EngineConfig, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "KGRAPH_CONFIG";

/// File name used for the default snapshot.
pub const SNAPSHOT_FILE_NAME: &str = "graph.json";

// ============================================================================
// Configuration structs
// ============================================================================

/// Main configuration for the kgraph CLI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KgraphConfig {
    /// Where the relationship snapshot lives.
    pub snapshot: SnapshotConfig,

    /// Engine tunables.
    pub engine: EngineConfig,
}

/// Snapshot storage configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Path to the JSON snapshot file.
    pub path: Option<String>,
}

// ============================================================================
// Config loading
// ============================================================================

impl KgraphConfig {
    /// Load configuration from file, environment, and defaults.
    ///
    /// The loaded engine section is validated before it is returned.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder =
            Confygery::new().map_err(|e| Error::config(format!("config init: {e}")))?;

        if let Some(path) = Self::resolve_config_path(config_path)
            && path.exists()
        {
            builder
                .add_file(&path.to_string_lossy())
                .map_err(|e| Error::config(format!("config file: {e}")))?;
        }

        let mut env_opts = env::Options::with_top_level("KGRAPH");
        env_opts.add_section("snapshot");
        builder
            .add_env(env_opts)
            .map_err(|e| Error::config(format!("config env: {e}")))?;

        let config: Self = builder
            .build()
            .map_err(|e| Error::config(format!("config build: {e}")))?;

        config.engine.validate()?;
        Ok(config)
    }

    /// Resolve the config file path from explicit flag, env var, or XDG default.
    pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(PathBuf::from(path));
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Some(PathBuf::from(path));
        }

        Self::default_config_path()
    }

    /// Return the XDG default config path.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("kgraph").join("config.toml"))
    }

    /// Return the platform default snapshot path.
    pub fn default_snapshot_path() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("kgraph").join(SNAPSHOT_FILE_NAME))
    }

    /// Resolve the snapshot path: explicit flag, then `snapshot.path`,
    /// then the platform data directory.
    pub fn snapshot_path(&self, explicit: Option<&str>) -> Result<PathBuf> {
        if let Some(path) = explicit.or(self.snapshot.path.as_deref()) {
            return Ok(PathBuf::from(path));
        }
        Self::default_snapshot_path()
            .ok_or_else(|| Error::config("Could not determine data directory for this platform"))
    }

    /// Serialize this config to a pretty-printed TOML string.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // ------------------------------------------------------------------------
    // Default tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_kgraph_config_default() {
        let config = KgraphConfig::default();
        assert!(config.snapshot.path.is_none());
        assert_eq!(config.engine, EngineConfig::default());
    }

    // ------------------------------------------------------------------------
    // Serialization tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_kgraph_config_from_toml() {
        let toml_str = r#"
            [snapshot]
            path = "/data/graph.json"

            [engine]
            hierarchy_max_depth = 50

            [engine.traversal]
            max_depth = 4
            honor_bidirectional = false

            [engine.analysis]
            damping_factor = 0.9
        "#;

        let config: KgraphConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.snapshot.path.as_deref(), Some("/data/graph.json"));
        assert_eq!(config.engine.hierarchy_max_depth, 50);
        assert_eq!(config.engine.traversal.max_depth, 4);
        assert!(!config.engine.traversal.honor_bidirectional);
        assert_eq!(config.engine.analysis.damping_factor, 0.9);
        // Untouched sections keep their defaults.
        assert_eq!(config.engine.validation, EngineConfig::default().validation);
    }

    #[test]
    fn test_kgraph_config_to_toml() {
        let config = KgraphConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("[engine.traversal]"));
        assert!(toml_str.contains("max_depth = 10"));

        let parsed: KgraphConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    // ------------------------------------------------------------------------
    // Loading tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_kgraph_config_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
                [engine.analysis]
                max_cycles = 7
            "#,
        )
        .unwrap();

        let config = KgraphConfig::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.engine.analysis.max_cycles, 7);
        assert_eq!(config.engine.analysis.pagerank_iterations, 20);
    }

    #[test]
    fn test_kgraph_config_load_defaults() {
        let config = KgraphConfig::load(Some("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn test_kgraph_config_load_rejects_invalid_engine() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
                [engine.analysis]
                damping_factor = 1.5
            "#,
        )
        .unwrap();

        let err = KgraphConfig::load(Some(path.to_str().unwrap())).unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    // ------------------------------------------------------------------------
    // Path resolution tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_resolve_config_path_explicit() {
        let path = KgraphConfig::resolve_config_path(Some("/explicit/config.toml"));
        assert_eq!(path, Some(PathBuf::from("/explicit/config.toml")));
    }

    #[test]
    fn test_default_config_path() {
        if let Some(path) = KgraphConfig::default_config_path() {
            assert!(path.ends_with("kgraph/config.toml"));
        }
    }

    #[test]
    fn test_snapshot_path_precedence() {
        let mut config = KgraphConfig::default();
        config.snapshot.path = Some("/from/config.json".to_string());

        assert_eq!(
            config.snapshot_path(Some("/from/flag.json")).unwrap(),
            PathBuf::from("/from/flag.json")
        );
        assert_eq!(
            config.snapshot_path(None).unwrap(),
            PathBuf::from("/from/config.json")
        );
    }

    #[test]
    fn test_snapshot_path_falls_back_to_data_dir() {
        let config = KgraphConfig::default();
        if let Some(expected) = KgraphConfig::default_snapshot_path() {
            assert_eq!(config.snapshot_path(None).unwrap(), expected);
            assert!(expected.ends_with("kgraph/graph.json"));
        }
    }
}
