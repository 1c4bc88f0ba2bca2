//! Relationship data model.
//!
//! A [`Relationship`] is a directed, typed, weighted edge between two
//! external node ids. Relationships form a multigraph: several edges may
//! join the same pair of nodes as long as their types differ.

use chrono::{DateTime, Utc};
use kgraph_core::{Error, NodeId, Result, ViolationCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Relationship type
// ============================================================================

/// Closed set of relationship types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    /// Hierarchical parent → child.
    ParentChild,
    /// Generic association.
    RelatedTo,
    /// Source cites target.
    References,
    /// Source was derived from target.
    DerivedFrom,
    /// Hierarchical part → whole.
    PartOf,
    /// Source contradicts target.
    Contradicts,
    /// Source supports target.
    Supports,
    /// Domain-specific relationship; details live in metadata.
    Custom,
}

impl RelationshipType {
    /// Every relationship type, in declaration order.
    pub const ALL: [RelationshipType; 8] = [
        Self::ParentChild,
        Self::RelatedTo,
        Self::References,
        Self::DerivedFrom,
        Self::PartOf,
        Self::Contradicts,
        Self::Supports,
        Self::Custom,
    ];

    /// The wire name of this type.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ParentChild => "parent_child",
            Self::RelatedTo => "related_to",
            Self::References => "references",
            Self::DerivedFrom => "derived_from",
            Self::PartOf => "part_of",
            Self::Contradicts => "contradicts",
            Self::Supports => "supports",
            Self::Custom => "custom",
        }
    }

    /// Hierarchical types must stay acyclic.
    pub fn is_hierarchical(&self) -> bool {
        matches!(self, Self::ParentChild | Self::PartOf)
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RelationshipType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name() == s)
            .ok_or_else(|| {
                Error::invalid(
                    "type",
                    ViolationCode::InvalidEnum,
                    format!("unknown relationship type '{s}'"),
                )
            })
    }
}

// ============================================================================
// Metadata
// ============================================================================

/// A JSON-shaped metadata value.
///
/// Serialized untagged, so the wire form is plain JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// JSON `null`.
    Null,
    /// JSON boolean.
    Bool(bool),
    /// JSON number.
    Number(f64),
    /// JSON string.
    String(String),
    /// JSON array.
    Array(Vec<MetadataValue>),
    /// JSON object.
    Object(BTreeMap<String, MetadataValue>),
}

/// Metadata bag attached to a relationship.
pub type Metadata = BTreeMap<String, MetadataValue>;

impl MetadataValue {
    /// Return the string value, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Convert a `serde_json::Value` into a metadata value.
    ///
    /// Numbers that do not fit an `f64` become `Null`.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => n.as_f64().map(Self::Number).unwrap_or(Self::Null),
            serde_json::Value::String(s) => Self::String(s.clone()),
            serde_json::Value::Array(items) => {
                Self::Array(items.iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => Self::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<f64> for MetadataValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

// ============================================================================
// Relationship
// ============================================================================

/// A stored relationship.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    /// Unique id, assigned at creation.
    pub id: String,
    /// Source node id.
    pub source_id: NodeId,
    /// Target node id.
    pub target_id: NodeId,
    /// Relationship type.
    #[serde(rename = "type")]
    pub relationship_type: RelationshipType,
    /// Strength in `[0, 1]`.
    pub weight: f64,
    /// Hint that readers may treat the edge as undirected.
    #[serde(default)]
    pub bidirectional: bool,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: Metadata,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Relationship {
    /// Traversal cost of this edge (`1 - weight`, never negative).
    pub fn cost(&self) -> f64 {
        (1.0 - self.weight).max(0.0)
    }

    /// The `(source, target, type)` triple that must be unique.
    pub fn key(&self) -> (&str, &str, RelationshipType) {
        (&self.source_id, &self.target_id, self.relationship_type)
    }

    /// Whether the edge touches `node_id`.
    pub fn touches(&self, node_id: &str) -> bool {
        self.source_id == node_id || self.target_id == node_id
    }

    /// Short human-readable form, e.g. `a -[related_to]-> b`.
    pub fn describe(&self) -> String {
        format!(
            "{} -[{}]-> {}",
            self.source_id, self.relationship_type, self.target_id
        )
    }
}

/// Input for creating a relationship.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRelationship {
    /// Source node id.
    pub source_id: NodeId,
    /// Target node id.
    pub target_id: NodeId,
    /// Relationship type.
    #[serde(rename = "type")]
    pub relationship_type: RelationshipType,
    /// Strength in `[0, 1]`.
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Undirected hint.
    #[serde(default)]
    pub bidirectional: bool,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: Metadata,
}

fn default_weight() -> f64 {
    1.0
}

impl NewRelationship {
    /// Create input with default weight (1.0) and no metadata.
    pub fn new(
        source_id: impl Into<NodeId>,
        target_id: impl Into<NodeId>,
        relationship_type: RelationshipType,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            relationship_type,
            weight: default_weight(),
            bidirectional: false,
            metadata: Metadata::new(),
        }
    }

    /// Set the weight.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Mark as bidirectional.
    pub fn bidirectional(mut self) -> Self {
        self.bidirectional = true;
        self
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Materialize into a stored relationship with a fresh id and timestamps.
    pub fn into_relationship(self, now: DateTime<Utc>) -> Relationship {
        Relationship {
            id: uuid::Uuid::new_v4().to_string(),
            source_id: self.source_id,
            target_id: self.target_id,
            relationship_type: self.relationship_type,
            weight: self.weight,
            bidirectional: self.bidirectional,
            metadata: self.metadata,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update. Endpoints and type are immutable.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRelationship {
    /// New weight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    /// New bidirectional flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bidirectional: Option<bool>,
    /// Replacement metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl UpdateRelationship {
    /// Set the weight.
    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Set the bidirectional flag.
    pub fn bidirectional(mut self, bidirectional: bool) -> Self {
        self.bidirectional = Some(bidirectional);
        self
    }

    /// Replace the metadata.
    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Whether no field is set.
    pub fn is_empty(&self) -> bool {
        self.weight.is_none() && self.bidirectional.is_none() && self.metadata.is_none()
    }

    /// Apply the present fields to `relationship`.
    pub fn apply_to(&self, relationship: &mut Relationship, now: DateTime<Utc>) {
        if let Some(weight) = self.weight {
            relationship.weight = weight;
        }
        if let Some(bidirectional) = self.bidirectional {
            relationship.bidirectional = bidirectional;
        }
        if let Some(ref metadata) = self.metadata {
            relationship.metadata = metadata.clone();
        }
        relationship.updated_at = now;
    }
}

// ============================================================================
// Direction and filters
// ============================================================================

/// Edge direction relative to a node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Edges leaving the node.
    #[default]
    Outgoing,
    /// Edges arriving at the node.
    Incoming,
    /// Both.
    Both,
}

impl Direction {
    /// Whether `relationship` is attached to `node_id` in this direction.
    pub fn matches(&self, relationship: &Relationship, node_id: &str) -> bool {
        match self {
            Self::Outgoing => relationship.source_id == node_id,
            Self::Incoming => relationship.target_id == node_id,
            Self::Both => relationship.touches(node_id),
        }
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "outgoing" | "out" => Ok(Self::Outgoing),
            "incoming" | "in" => Ok(Self::Incoming),
            "both" => Ok(Self::Both),
            other => Err(Error::invalid(
                "direction",
                ViolationCode::InvalidEnum,
                format!("unknown direction '{other}'"),
            )),
        }
    }
}

/// Filter for repository queries.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipFilter {
    /// Only edges leaving this node.
    pub source_id: Option<NodeId>,
    /// Only edges arriving at this node.
    pub target_id: Option<NodeId>,
    /// Only edges of this type.
    #[serde(rename = "type")]
    pub relationship_type: Option<RelationshipType>,
    /// Inclusive lower weight bound.
    pub min_weight: Option<f64>,
    /// Inclusive upper weight bound.
    pub max_weight: Option<f64>,
    /// Page size.
    pub limit: Option<usize>,
    /// Page offset.
    pub offset: Option<usize>,
}

impl RelationshipFilter {
    /// Filter by source.
    pub fn source(mut self, id: impl Into<NodeId>) -> Self {
        self.source_id = Some(id.into());
        self
    }

    /// Filter by target.
    pub fn target(mut self, id: impl Into<NodeId>) -> Self {
        self.target_id = Some(id.into());
        self
    }

    /// Filter by type.
    pub fn of_type(mut self, relationship_type: RelationshipType) -> Self {
        self.relationship_type = Some(relationship_type);
        self
    }

    /// Filter by minimum weight.
    pub fn min_weight(mut self, weight: f64) -> Self {
        self.min_weight = Some(weight);
        self
    }

    /// Filter by maximum weight.
    pub fn max_weight(mut self, weight: f64) -> Self {
        self.max_weight = Some(weight);
        self
    }

    /// Limit the result count.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first `offset` results.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Whether `relationship` passes the non-paging criteria.
    pub fn matches(&self, relationship: &Relationship) -> bool {
        self.source_id
            .as_ref()
            .is_none_or(|id| *id == relationship.source_id)
            && self
                .target_id
                .as_ref()
                .is_none_or(|id| *id == relationship.target_id)
            && self
                .relationship_type
                .is_none_or(|t| t == relationship.relationship_type)
            && self.min_weight.is_none_or(|w| relationship.weight >= w)
            && self.max_weight.is_none_or(|w| relationship.weight <= w)
    }
}

// ============================================================================
// Tests
// ============================================================================
