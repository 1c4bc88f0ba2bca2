//! Error types for kgraph operations.
//!
//! This module provides the common `Error` type and `Result<T>` alias used
//! across all kgraph crates. Uses `thiserror` for derive macros.
//!
//! "No path found" and similar empty answers are never errors; they are
//! represented as `None` or empty collections by the query APIs.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::NodeId;

// ============================================================================
// Field violations
// ============================================================================

/// Machine-readable code attached to a single validation violation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationCode {
    /// A required field is missing.
    Required,
    /// A field has the wrong JSON type.
    InvalidType,
    /// A value is not a member of a closed enumeration.
    InvalidEnum,
    /// A numeric value is outside its allowed range.
    OutOfRange,
    /// Source and target ids are equal.
    SelfReference,
    /// A string field is empty.
    Empty,
    /// A metadata key does not match `[a-zA-Z0-9_]+`.
    InvalidKey,
    /// A metadata key is reserved for relationship fields.
    ReservedKey,
    /// A metadata string exceeds the configured length.
    StringTooLong,
    /// A metadata array exceeds the configured item count.
    ArrayTooLarge,
    /// Serialized metadata exceeds the configured size, or nests too deeply.
    MetadataTooLarge,
}

impl ViolationCode {
    /// The wire name of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Required => "REQUIRED",
            Self::InvalidType => "INVALID_TYPE",
            Self::InvalidEnum => "INVALID_ENUM",
            Self::OutOfRange => "OUT_OF_RANGE",
            Self::SelfReference => "SELF_REFERENCE",
            Self::Empty => "EMPTY",
            Self::InvalidKey => "INVALID_KEY",
            Self::ReservedKey => "RESERVED_KEY",
            Self::StringTooLong => "STRING_TOO_LONG",
            Self::ArrayTooLarge => "ARRAY_TOO_LARGE",
            Self::MetadataTooLarge => "METADATA_TOO_LARGE",
        }
    }
}

impl fmt::Display for ViolationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single validation failure tied to an input field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    /// Dotted path of the offending field (e.g. `metadata.tags`).
    pub field: String,
    /// Human-readable message.
    pub message: String,
    /// Machine-readable code.
    pub code: ViolationCode,
}

impl FieldViolation {
    /// Create a new violation.
    pub fn new(field: impl Into<String>, code: ViolationCode, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code,
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} [{}]", self.field, self.message, self.code)
    }
}

// ============================================================================
// Error
// ============================================================================

/// Errors that can occur in kgraph operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or out-of-range input; every violation is collected.
    #[error("Validation failed: {}", format_violations(.0))]
    Validation(Vec<FieldViolation>),

    /// One or more referenced nodes do not exist.
    #[error("Nodes not found: {}", .0.join(", "))]
    NodesNotFound(Vec<NodeId>),

    /// The relationship does not exist.
    #[error("Relationship not found: {0}")]
    RelationshipNotFound(String),

    /// A relationship with the same (source, target, type) triple exists.
    #[error("Relationship {source_id} -[{relationship_type}]-> {target_id} already exists")]
    Duplicate {
        /// Source node id.
        source_id: NodeId,
        /// Target node id.
        target_id: NodeId,
        /// Relationship type name.
        relationship_type: String,
    },

    /// Creating the edge would close a cycle in a hierarchical edge type.
    #[error(
        "Relationship {source_id} -[{relationship_type}]-> {target_id} would create a cycle"
    )]
    Cycle {
        /// Source node id.
        source_id: NodeId,
        /// Target node id.
        target_id: NodeId,
        /// Relationship type name.
        relationship_type: String,
    },

    /// A persistence collaborator failed; the original cause is preserved.
    #[error("Persistence error: {context}")]
    Persistence {
        /// What the engine was doing when the failure happened.
        context: String,
        /// The collaborator's error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A traversal or analysis call cannot complete.
    #[error("Analysis error: {0}")]
    Analysis(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

fn format_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Create a validation error from a list of violations.
    pub fn validation(violations: Vec<FieldViolation>) -> Self {
        Self::Validation(violations)
    }

    /// Create a validation error with a single violation.
    pub fn invalid(field: impl Into<String>, code: ViolationCode, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldViolation::new(field, code, message)])
    }

    /// Create a relationship not found error.
    pub fn relationship_not_found(id: impl Into<String>) -> Self {
        Self::RelationshipNotFound(id.into())
    }

    /// Create a duplicate error.
    pub fn duplicate(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        relationship_type: impl Into<String>,
    ) -> Self {
        Self::Duplicate {
            source_id: source_id.into(),
            target_id: target_id.into(),
            relationship_type: relationship_type.into(),
        }
    }

    /// Create a cycle error.
    pub fn cycle(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        relationship_type: impl Into<String>,
    ) -> Self {
        Self::Cycle {
            source_id: source_id.into(),
            target_id: target_id.into(),
            relationship_type: relationship_type.into(),
        }
    }

    /// Wrap a collaborator failure.
    pub fn persistence(
        context: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Persistence {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Create an analysis error.
    pub fn analysis(msg: impl Into<String>) -> Self {
        Self::Analysis(msg.into())
    }

    /// Create a serialization error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NodesNotFound(_) | Self::RelationshipNotFound(_) => "NOT_FOUND",
            Self::Duplicate { .. } => "DUPLICATE",
            Self::Cycle { .. } => "CYCLE",
            Self::Persistence { .. } => "PERSISTENCE_ERROR",
            Self::Analysis(_) => "ANALYSIS_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Field violations carried by a validation error (empty otherwise).
    pub fn violations(&self) -> &[FieldViolation] {
        match self {
            Self::Validation(violations) => violations,
            _ => &[],
        }
    }

    /// Whether this is a not-found error (node or relationship).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NodesNotFound(_) | Self::RelationshipNotFound(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias using kgraph's Error type.
pub type Result<T> = std::result::Result<T, Error>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_codes() {
        assert_eq!(Error::validation(vec![]).code(), "VALIDATION_ERROR");
        assert_eq!(Error::NodesNotFound(vec!["a".into()]).code(), "NOT_FOUND");
        assert_eq!(Error::relationship_not_found("r1").code(), "NOT_FOUND");
        assert_eq!(Error::duplicate("a", "b", "related_to").code(), "DUPLICATE");
        assert_eq!(Error::cycle("a", "b", "parent_child").code(), "CYCLE");
        assert_eq!(Error::analysis("bad").code(), "ANALYSIS_ERROR");
        assert_eq!(Error::config("bad").code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_validation_display_lists_every_violation() {
        let err = Error::validation(vec![
            FieldViolation::new("sourceId", ViolationCode::Required, "sourceId is required"),
            FieldViolation::new("weight", ViolationCode::OutOfRange, "weight must be in [0, 1]"),
        ]);

        let msg = err.to_string();
        assert!(msg.contains("sourceId is required"));
        assert!(msg.contains("OUT_OF_RANGE"));
        assert_eq!(err.violations().len(), 2);
    }

    #[test]
    fn test_nodes_not_found_names_every_id() {
        let err = Error::NodesNotFound(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "Nodes not found: a, b");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_persistence_preserves_source() {
        let io = std::io::Error::other("disk on fire");
        let err = Error::persistence("create relationship", io);

        assert_eq!(err.code(), "PERSISTENCE_ERROR");
        let source = err.source().map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("disk on fire"));
    }

    #[test]
    fn test_from_serde_json() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = parse_err.into();
        assert_eq!(err.code(), "SERIALIZATION_ERROR");
    }

    #[test]
    fn test_violation_code_serialization() {
        let json = serde_json::to_string(&ViolationCode::SelfReference).unwrap();
        assert_eq!(json, "\"SELF_REFERENCE\"");
        assert_eq!(ViolationCode::ReservedKey.as_str(), "RESERVED_KEY");
    }
}
