//! Relationship validation and structural-safety checks.
//!
//! [`RelationshipValidator`] covers three layers:
//!
//! - Shape: ids, type, weight and metadata limits. Every violation is
//!   collected, not just the first.
//! - Existence: both endpoints must be known to the node registry.
//! - Structure: duplicate triples and cycles in hierarchical edge types.

use kgraph_core::{Error, FieldViolation, NodeId, Result, ValidationLimits, ViolationCode};
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use crate::nodes::NodeRegistry;
use crate::repository::RelationshipRepository;
use crate::types::{
    Direction, Metadata, MetadataValue, NewRelationship, Relationship, RelationshipFilter,
    RelationshipType, UpdateRelationship,
};

/// Metadata keys that collide with relationship fields.
pub const RESERVED_METADATA_KEYS: [&str; 7] = [
    "id",
    "sourceId",
    "targetId",
    "type",
    "weight",
    "createdAt",
    "updatedAt",
];

static METADATA_KEY: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[a-zA-Z0-9_]+$").expect("metadata key pattern is valid")
});

// ============================================================================
// Validator
// ============================================================================

/// Validation front door for relationship writes.
#[derive(Clone)]
pub struct RelationshipValidator {
    limits: ValidationLimits,
    hierarchy_max_depth: usize,
    repository: Arc<dyn RelationshipRepository>,
    nodes: Arc<dyn NodeRegistry>,
}

impl RelationshipValidator {
    /// Create a validator.
    pub fn new(
        repository: Arc<dyn RelationshipRepository>,
        nodes: Arc<dyn NodeRegistry>,
        limits: ValidationLimits,
        hierarchy_max_depth: usize,
    ) -> Self {
        Self {
            limits,
            hierarchy_max_depth,
            repository,
            nodes,
        }
    }

    /// The configured limits.
    pub fn limits(&self) -> &ValidationLimits {
        &self.limits
    }

    // ------------------------------------------------------------------------
    // Shape
    // ------------------------------------------------------------------------

    /// Validate creation input.
    pub fn validate_create(&self, input: &NewRelationship) -> Result<()> {
        let mut violations = Vec::new();
        check_ids(Some(&input.source_id), Some(&input.target_id), &mut violations);
        check_weight(input.weight, &mut violations);
        self.check_metadata(&input.metadata, &mut violations);
        into_result(violations)
    }

    /// Validate a partial update; only present fields are checked.
    pub fn validate_update(&self, update: &UpdateRelationship) -> Result<()> {
        let mut violations = Vec::new();
        if let Some(weight) = update.weight {
            check_weight(weight, &mut violations);
        }
        if let Some(ref metadata) = update.metadata {
            self.check_metadata(metadata, &mut violations);
        }
        into_result(violations)
    }

    /// Check that a stored relationship satisfies the shape invariants.
    pub fn validate_stored(&self, relationship: &Relationship) -> Result<()> {
        let mut violations = Vec::new();
        if relationship.id.trim().is_empty() {
            violations.push(FieldViolation::new(
                "id",
                ViolationCode::Empty,
                "id must not be empty",
            ));
        }
        check_ids(
            Some(&relationship.source_id),
            Some(&relationship.target_id),
            &mut violations,
        );
        check_weight(relationship.weight, &mut violations);
        self.check_metadata(&relationship.metadata, &mut violations);
        into_result(violations)
    }

    /// Parse and validate raw JSON creation input.
    ///
    /// Reports type errors and semantic errors together.
    pub fn parse_create(&self, value: &Value) -> Result<NewRelationship> {
        let Some(object) = value.as_object() else {
            return Err(Error::invalid(
                "",
                ViolationCode::InvalidType,
                "relationship input must be an object",
            ));
        };

        let mut violations = Vec::new();
        let source_id = required_string(object.get("sourceId"), "sourceId", &mut violations);
        let target_id = required_string(object.get("targetId"), "targetId", &mut violations);
        check_ids(source_id.as_ref(), target_id.as_ref(), &mut violations);

        let relationship_type = match object.get("type") {
            None | Some(Value::Null) => {
                violations.push(FieldViolation::new(
                    "type",
                    ViolationCode::Required,
                    "type is required",
                ));
                None
            }
            Some(Value::String(s)) => match s.parse::<RelationshipType>() {
                Ok(t) => Some(t),
                Err(_) => {
                    violations.push(FieldViolation::new(
                        "type",
                        ViolationCode::InvalidEnum,
                        format!(
                            "type must be one of: {}",
                            RelationshipType::ALL.map(|t| t.name()).join(", ")
                        ),
                    ));
                    None
                }
            },
            Some(_) => {
                violations.push(FieldViolation::new(
                    "type",
                    ViolationCode::InvalidType,
                    "type must be a string",
                ));
                None
            }
        };

        let weight = optional_weight(object.get("weight"), &mut violations).unwrap_or(1.0);
        let bidirectional = optional_bool(object.get("bidirectional"), &mut violations);
        let metadata = self.optional_metadata(object.get("metadata"), &mut violations);

        match (source_id, target_id, relationship_type) {
            (Some(source_id), Some(target_id), Some(relationship_type))
                if violations.is_empty() =>
            {
                Ok(NewRelationship {
                    source_id,
                    target_id,
                    relationship_type,
                    weight,
                    bidirectional: bidirectional.unwrap_or(false),
                    metadata: metadata.unwrap_or_default(),
                })
            }
            _ => Err(Error::validation(violations)),
        }
    }

    /// Parse and validate raw JSON update input.
    pub fn parse_update(&self, value: &Value) -> Result<UpdateRelationship> {
        let Some(object) = value.as_object() else {
            return Err(Error::invalid(
                "",
                ViolationCode::InvalidType,
                "update input must be an object",
            ));
        };

        let mut violations = Vec::new();
        let weight = optional_weight(object.get("weight"), &mut violations);
        let bidirectional = optional_bool(object.get("bidirectional"), &mut violations);
        let metadata = self.optional_metadata(object.get("metadata"), &mut violations);

        into_result(violations)?;
        Ok(UpdateRelationship {
            weight,
            bidirectional,
            metadata,
        })
    }

    fn optional_metadata(
        &self,
        value: Option<&Value>,
        violations: &mut Vec<FieldViolation>,
    ) -> Option<Metadata> {
        match value {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => {
                let metadata: Metadata = map
                    .iter()
                    .map(|(k, v)| (k.clone(), MetadataValue::from_json(v)))
                    .collect();
                self.check_metadata(&metadata, violations);
                Some(metadata)
            }
            Some(_) => {
                violations.push(FieldViolation::new(
                    "metadata",
                    ViolationCode::InvalidType,
                    "metadata must be an object",
                ));
                None
            }
        }
    }

    fn check_metadata(&self, metadata: &Metadata, violations: &mut Vec<FieldViolation>) {
        for key in metadata.keys() {
            if RESERVED_METADATA_KEYS.contains(&key.as_str()) {
                violations.push(FieldViolation::new(
                    format!("metadata.{key}"),
                    ViolationCode::ReservedKey,
                    format!("'{key}' is a reserved key"),
                ));
            }
        }
        for (key, value) in metadata {
            self.check_entry("metadata", key, value, 1, violations);
        }

        match serde_json::to_vec(metadata) {
            Ok(bytes) if bytes.len() > self.limits.max_metadata_bytes => {
                violations.push(FieldViolation::new(
                    "metadata",
                    ViolationCode::MetadataTooLarge,
                    format!(
                        "serialized metadata is {} bytes, limit is {}",
                        bytes.len(),
                        self.limits.max_metadata_bytes
                    ),
                ));
            }
            Ok(_) => {}
            Err(e) => violations.push(FieldViolation::new(
                "metadata",
                ViolationCode::InvalidType,
                format!("metadata is not serializable: {e}"),
            )),
        }
    }

    fn check_entry(
        &self,
        parent: &str,
        key: &str,
        value: &MetadataValue,
        depth: usize,
        violations: &mut Vec<FieldViolation>,
    ) {
        let path = format!("{parent}.{key}");
        if !METADATA_KEY.is_match(key) {
            violations.push(FieldViolation::new(
                &path,
                ViolationCode::InvalidKey,
                "keys must match [a-zA-Z0-9_]+",
            ));
        }
        self.check_value(&path, value, depth, violations);
    }

    fn check_value(
        &self,
        path: &str,
        value: &MetadataValue,
        depth: usize,
        violations: &mut Vec<FieldViolation>,
    ) {
        if depth > self.limits.max_metadata_depth {
            violations.push(FieldViolation::new(
                path,
                ViolationCode::MetadataTooLarge,
                format!("nesting exceeds {} levels", self.limits.max_metadata_depth),
            ));
            return;
        }
        match value {
            MetadataValue::Null | MetadataValue::Bool(_) => {}
            MetadataValue::Number(n) => {
                if !n.is_finite() {
                    violations.push(FieldViolation::new(
                        path,
                        ViolationCode::OutOfRange,
                        "numbers must be finite",
                    ));
                }
            }
            MetadataValue::String(s) => {
                let len = s.chars().count();
                if len > self.limits.max_string_length {
                    violations.push(FieldViolation::new(
                        path,
                        ViolationCode::StringTooLong,
                        format!(
                            "string is {len} characters, limit is {}",
                            self.limits.max_string_length
                        ),
                    ));
                }
            }
            MetadataValue::Array(items) => {
                if items.len() > self.limits.max_array_items {
                    violations.push(FieldViolation::new(
                        path,
                        ViolationCode::ArrayTooLarge,
                        format!(
                            "array has {} items, limit is {}",
                            items.len(),
                            self.limits.max_array_items
                        ),
                    ));
                }
                for (i, item) in items.iter().enumerate() {
                    self.check_value(&format!("{path}[{i}]"), item, depth + 1, violations);
                }
            }
            MetadataValue::Object(map) => {
                for (key, item) in map {
                    self.check_entry(path, key, item, depth + 1, violations);
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Existence and structure
    // ------------------------------------------------------------------------

    /// Verify that every node id exists.
    pub async fn verify_nodes_exist(&self, ids: &[NodeId]) -> Result<()> {
        self.nodes.verify_exist(ids).await
    }

    /// Whether an edge with the same triple is already stored.
    pub async fn check_duplicate(
        &self,
        source_id: &str,
        target_id: &str,
        relationship_type: RelationshipType,
    ) -> Result<bool> {
        let filter = RelationshipFilter::default()
            .source(source_id)
            .target(target_id)
            .of_type(relationship_type)
            .limit(1);
        Ok(!self.repository.query(&filter).await?.is_empty())
    }

    /// Whether adding `source → target` of a hierarchical type would close
    /// a cycle, i.e. `target` is already an ancestor of `source`.
    ///
    /// Non-hierarchical types always return `false`. The ancestor walk is
    /// capped at `hierarchy_max_depth` levels; if the cap is reached with
    /// ancestors left unexplored the edge is allowed and a warning logged.
    pub async fn check_cycle_creation(
        &self,
        source_id: &str,
        target_id: &str,
        relationship_type: RelationshipType,
    ) -> Result<bool> {
        if !relationship_type.is_hierarchical() {
            return Ok(false);
        }
        if source_id == target_id {
            return Ok(true);
        }

        let mut visited: HashSet<NodeId> = HashSet::from([source_id.to_string()]);
        let mut frontier: Vec<NodeId> = vec![source_id.to_string()];

        for _ in 0..self.hierarchy_max_depth {
            let edges = self
                .repository
                .get_relationships_for_nodes(&frontier, Direction::Incoming)
                .await?;

            let mut next = Vec::new();
            for edge in edges
                .iter()
                .filter(|e| e.relationship_type == relationship_type)
            {
                if edge.source_id == target_id {
                    log::debug!(
                        "cycle guard: {target_id} is an ancestor of {source_id} via {}",
                        edge.describe()
                    );
                    return Ok(true);
                }
                if visited.insert(edge.source_id.clone()) {
                    next.push(edge.source_id.clone());
                }
            }

            if next.is_empty() {
                return Ok(false);
            }
            frontier = next;
        }

        log::warn!(
            "cycle guard for {source_id} -[{relationship_type}]-> {target_id} stopped at depth {}",
            self.hierarchy_max_depth
        );
        Ok(false)
    }
}

// ============================================================================
// Field helpers
// ============================================================================

fn into_result(violations: Vec<FieldViolation>) -> Result<()> {
    if violations.is_empty() {
        Ok(())
    } else {
        Err(Error::validation(violations))
    }
}

fn check_ids(
    source_id: Option<&NodeId>,
    target_id: Option<&NodeId>,
    violations: &mut Vec<FieldViolation>,
) {
    for (field, id) in [("sourceId", source_id), ("targetId", target_id)] {
        if let Some(id) = id {
            if id.trim().is_empty() {
                violations.push(FieldViolation::new(
                    field,
                    ViolationCode::Empty,
                    format!("{field} must not be empty"),
                ));
            }
        }
    }
    if let (Some(source), Some(target)) = (source_id, target_id) {
        if source == target && !source.trim().is_empty() {
            violations.push(FieldViolation::new(
                "targetId",
                ViolationCode::SelfReference,
                "a relationship cannot reference itself (sourceId == targetId)",
            ));
        }
    }
}

fn check_weight(weight: f64, violations: &mut Vec<FieldViolation>) {
    if !(0.0..=1.0).contains(&weight) {
        violations.push(FieldViolation::new(
            "weight",
            ViolationCode::OutOfRange,
            format!("weight must be in [0, 1], got {weight}"),
        ));
    }
}

fn required_string(
    value: Option<&Value>,
    field: &str,
    violations: &mut Vec<FieldViolation>,
) -> Option<String> {
    match value {
        None | Some(Value::Null) => {
            violations.push(FieldViolation::new(
                field,
                ViolationCode::Required,
                format!("{field} is required"),
            ));
            None
        }
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            violations.push(FieldViolation::new(
                field,
                ViolationCode::InvalidType,
                format!("{field} must be a string"),
            ));
            None
        }
    }
}

fn optional_weight(value: Option<&Value>, violations: &mut Vec<FieldViolation>) -> Option<f64> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => match n.as_f64() {
            Some(w) => {
                check_weight(w, violations);
                Some(w)
            }
            None => {
                violations.push(FieldViolation::new(
                    "weight",
                    ViolationCode::OutOfRange,
                    "weight is not representable",
                ));
                None
            }
        },
        Some(_) => {
            violations.push(FieldViolation::new(
                "weight",
                ViolationCode::InvalidType,
                "weight must be a number",
            ));
            None
        }
    }
}

fn optional_bool(value: Option<&Value>, violations: &mut Vec<FieldViolation>) -> Option<bool> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::Bool(b)) => Some(*b),
        Some(_) => {
            violations.push(FieldViolation::new(
                "bidirectional",
                ViolationCode::InvalidType,
                "bidirectional must be a boolean",
            ));
            None
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
