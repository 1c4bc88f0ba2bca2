//! The kgraph CLI application.
//!
//! Loads configuration, opens the snapshot, dispatches the command and
//! saves the snapshot again when the command changed it.

use crate::cli::{CliArgs, Command};
use crate::config::KgraphConfig;
use crate::{config_handlers, graph_handlers};
use kgraph_core::Result;
use kgraph_engine::RelationshipService;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

// ============================================================================
// KgraphCli
// ============================================================================

/// CLI application bound to a loaded configuration.
pub struct KgraphCli {
    config: KgraphConfig,
    version: String,
}

impl KgraphCli {
    /// Create from CLI args, loading config from file/env.
    pub fn from_args(args: &CliArgs) -> Result<Self> {
        let config = KgraphConfig::load(args.config.as_deref())?;
        Ok(Self::new(config))
    }

    /// Create an application over an explicit configuration.
    pub fn new(config: KgraphConfig) -> Self {
        Self {
            config,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &KgraphConfig {
        &self.config
    }

    /// Initialise tracing-based logging.
    ///
    /// Uses `RUST_LOG` env var if set, otherwise defaults based on verbosity
    /// flags. Engine `log` records are forwarded to the same subscriber.
    pub fn init_logging(verbose: bool, quiet: bool) {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else if quiet {
            EnvFilter::new("warn")
        } else if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        };

        // Ignore error if a subscriber is already set (e.g. in tests).
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    }

    /// Run one command.
    pub async fn run(&self, args: CliArgs) -> Result<()> {
        let Some(command) = args.command else {
            println!("kgraph {} (use --help for usage)", self.version);
            return Ok(());
        };

        if let Command::Config(config_cmd) = command {
            return config_handlers::handle_config_command(
                args.config.as_deref(),
                config_cmd.command,
            );
        }

        let snapshot = self.config.snapshot_path(args.snapshot.as_deref())?;
        tracing::debug!(snapshot = %snapshot.display(), "opening snapshot");
        let service = graph_handlers::open_service(&self.config.engine, &snapshot)?;

        let mutating = command.is_mutating();
        self.dispatch(&service, command).await?;

        if mutating {
            graph_handlers::save_service(&service, &snapshot).await?;
            tracing::info!(snapshot = %snapshot.display(), "snapshot saved");
        }
        Ok(())
    }

    /// Snapshot path the application would use for `explicit`.
    pub fn snapshot_path(&self, explicit: Option<&str>) -> Result<PathBuf> {
        self.config.snapshot_path(explicit)
    }

    async fn dispatch(&self, service: &RelationshipService, command: Command) -> Result<()> {
        match command {
            Command::Add(add) => graph_handlers::handle_add(service, add).await.map(drop),
            Command::Update(update) => graph_handlers::handle_update(service, update)
                .await
                .map(drop),
            Command::Remove { ids } => graph_handlers::handle_remove(service, ids).await.map(drop),
            Command::Get { id } => graph_handlers::handle_get(service, &id).await,
            Command::List(list) => graph_handlers::handle_list(service, list).await.map(drop),
            Command::Import { file } => graph_handlers::handle_import(service, Path::new(&file))
                .await
                .map(drop),
            Command::Stats { sample_size, seed } => {
                graph_handlers::handle_stats(service, sample_size, seed).await
            }
            Command::Path {
                from,
                to,
                algorithm,
                max_depth,
                direction,
            } => graph_handlers::handle_path(service, &from, &to, algorithm, max_depth, direction)
                .await
                .map(drop),
            Command::Paths {
                from,
                to,
                max_depth,
                max_paths,
                direction,
            } => graph_handlers::handle_paths(service, &from, &to, max_depth, max_paths, direction)
                .await
                .map(drop),
            Command::Neighborhood {
                node,
                depth,
                direction,
                types,
            } => graph_handlers::handle_neighborhood(service, &node, depth, direction, types)
                .await
                .map(drop),
            Command::Importance {
                algorithm,
                normalized,
                limit,
            } => graph_handlers::handle_importance(service, algorithm, normalized, limit)
                .await
                .map(drop),
            Command::Communities {
                algorithm,
                min_size,
            } => graph_handlers::handle_communities(service, algorithm, min_size)
                .await
                .map(drop),
            Command::Cycles {
                max_depth,
                max_cycles,
            } => graph_handlers::handle_cycles(service, max_depth, max_cycles)
                .await
                .map(drop),
            Command::Export { format, output } => {
                graph_handlers::handle_export(service, format, output.as_deref().map(Path::new))
                    .await
            }
            Command::Config(config_cmd) => {
                config_handlers::handle_config_command(None, config_cmd.command)
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::Parser;
    use kgraph_engine::load_snapshot;
    use tempfile::TempDir;

    fn args(snapshot: &Path, rest: &[&str]) -> CliArgs {
        let mut argv = vec!["kgraph", "--snapshot", snapshot.to_str().unwrap()];
        argv.extend_from_slice(rest);
        CliArgs::parse_from(argv)
    }

    #[tokio::test]
    async fn test_mutating_command_saves_snapshot() {
        let dir = TempDir::new().unwrap();
        let snapshot = dir.path().join("graph.json");
        let app = KgraphCli::new(KgraphConfig::default());

        app.run(args(&snapshot, &["add", "a", "b", "-t", "part_of"]))
            .await
            .unwrap();
        app.run(args(&snapshot, &["add", "b", "c", "-t", "part_of"]))
            .await
            .unwrap();

        let export = load_snapshot(&snapshot).unwrap();
        assert_eq!(export.relationships.len(), 2);
        assert_eq!(export.statistics.node_count, 3);
    }

    #[tokio::test]
    async fn test_cycle_rejected_and_snapshot_unchanged() {
        let dir = TempDir::new().unwrap();
        let snapshot = dir.path().join("graph.json");
        let app = KgraphCli::new(KgraphConfig::default());

        app.run(args(&snapshot, &["add", "a", "b", "-t", "parent_child"]))
            .await
            .unwrap();
        let err = app
            .run(args(&snapshot, &["add", "b", "a", "-t", "parent_child"]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CYCLE");

        let export = load_snapshot(&snapshot).unwrap();
        assert_eq!(export.relationships.len(), 1);
    }

    #[tokio::test]
    async fn test_read_command_does_not_create_snapshot() {
        let dir = TempDir::new().unwrap();
        let snapshot = dir.path().join("graph.json");
        let app = KgraphCli::new(KgraphConfig::default());

        app.run(args(&snapshot, &["stats"])).await.unwrap();
        assert!(!snapshot.exists());
    }

    #[tokio::test]
    async fn test_no_command_prints_version() {
        let app = KgraphCli::new(KgraphConfig::default());
        app.run(CliArgs::parse_from(["kgraph"])).await.unwrap();
    }

    #[test]
    fn test_snapshot_path_prefers_flag() {
        let app = KgraphCli::new(KgraphConfig::default());
        assert_eq!(
            app.snapshot_path(Some("/tmp/x.json")).unwrap(),
            PathBuf::from("/tmp/x.json")
        );
    }
}
