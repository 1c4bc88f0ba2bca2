//! Command-line front end for the kgraph relationship engine.
//!
//! Graph commands run against a JSON snapshot file. Configuration comes
//! from TOML, `KGRAPH_*` environment variables and built-in defaults.
//!
//! # Key Abstractions
//!
//! - `KgraphCli`: Loads config, opens the snapshot and dispatches commands
//! - `KgraphConfig`: Snapshot location plus engine tunables

pub mod app;
pub mod cli;
pub mod config;
pub mod config_handlers;
pub mod graph_handlers;

pub use app::KgraphCli;
pub use cli::{CliArgs, Command, ConfigAction};
pub use config::KgraphConfig;
