//! kgraph Core: shared error types and engine configuration.
//!
//! This crate provides the foundational types used across all kgraph crates.
//! It has no internal kgraph dependencies (dependency level 0).
//!
//! # Modules
//!
//! - [`error`]: Error taxonomy, field violations and the `Result` alias
//! - [`config`]: Engine configuration sections with built-in defaults

pub mod config;
pub mod error;

// Re-export key types at crate root for convenience
pub use config::{AnalysisDefaults, EngineConfig, TraversalDefaults, ValidationLimits};
pub use error::{Error, FieldViolation, Result, ViolationCode};

/// Identifier of an external knowledge node.
///
/// Nodes are not owned by the engine; it only ever sees their ids.
pub type NodeId = String;
