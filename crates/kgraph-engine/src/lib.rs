//! Relationship graph engine for kgraph.
//!
//! This crate owns the typed, weighted, directed relationships between
//! external knowledge nodes: validation, traversal, analysis, export and
//! the service façade that ties them together.
//!
//! # Features
//!
//! - `test-utils`: Expose `RecordingEventSink` outside the crate
//!
//! # Key Abstractions
//!
//! - `RelationshipRepository` trait: Storage collaborator; an in-memory
//!   implementation is included
//! - `NodeRegistry` trait: Node-existence collaborator
//! - `EventSink` trait: Fire-and-forget lifecycle events
//! - `RelationshipService`: The entry point for writes, bulk operations
//!   and export

pub mod analysis;
pub mod events;
pub mod export;
pub mod nodes;
pub mod persistence;
pub mod repository;
pub mod service;
pub mod traversal;
pub mod types;
pub mod validation;

// Re-exports
pub use analysis::{
    Cluster, CommunityAlgorithm, CommunityOptions, CycleOptions, CycleReport, DegreeDistribution,
    GraphAnalyzer, GraphStatistics, ImportanceAlgorithm, ImportanceOptions, NodeImportance,
    StatisticsOptions,
};
pub use events::{BroadcastEventSink, EventSink, LogEventSink, NoopEventSink, RelationshipEvent};
pub use export::{ExportFormat, GraphExport, parse_json_export, referenced_nodes, render};
pub use nodes::{AllowAllNodes, InMemoryNodeRegistry, NodeRegistry};
pub use persistence::{load_snapshot, load_snapshot_from_str, save_snapshot};
pub use repository::{InMemoryRelationshipRepository, RelationshipRepository};
pub use service::{BulkItemError, BulkResult, RelationshipService};
pub use traversal::{
    AllPathsOptions, GraphTraversal, Neighborhood, NeighborhoodOptions, Path, PathAlgorithm,
    PathOptions,
};
pub use types::{
    Direction, Metadata, MetadataValue, NewRelationship, Relationship, RelationshipFilter,
    RelationshipType, UpdateRelationship,
};
pub use validation::RelationshipValidator;

#[cfg(any(test, feature = "test-utils"))]
pub use events::RecordingEventSink;

pub use kgraph_core::{EngineConfig, Error, NodeId, Result};
