//! Relationship service: the façade callers use for every write.
//!
//! Creation runs, in order: shape validation, node existence, duplicate
//! check, hierarchical cycle check, persistence, event. A failure at any
//! step returns before anything is written.
//!
//! Bulk operations process items independently and report per-item
//! failures instead of aborting the batch. They are not transactional.

use chrono::Utc;
use kgraph_core::{EngineConfig, Error, FieldViolation, NodeId, Result, ViolationCode};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::analysis::{GraphAnalyzer, StatisticsOptions};
use crate::events::{EventSink, RelationshipEvent};
use crate::export::{ExportFormat, GraphExport, parse_json_export, referenced_nodes, render};
use crate::nodes::NodeRegistry;
use crate::repository::RelationshipRepository;
use crate::traversal::GraphTraversal;
use crate::types::{
    Direction, NewRelationship, Relationship, RelationshipFilter, RelationshipType,
    UpdateRelationship,
};
use crate::validation::RelationshipValidator;

// ============================================================================
// Bulk results
// ============================================================================

/// Why one item of a bulk call failed.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkItemError {
    /// Position of the item in the input.
    pub index: usize,
    /// Relationship id, for update and delete items.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Field violations, for validation failures.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<FieldViolation>,
}

impl BulkItemError {
    fn new(index: usize, id: Option<String>, err: &Error) -> Self {
        Self {
            index,
            id,
            code: err.code().to_string(),
            message: err.to_string(),
            violations: err.violations().to_vec(),
        }
    }
}

/// Outcome of a bulk call.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BulkResult<T> {
    /// Items that succeeded, in input order.
    pub succeeded: Vec<T>,
    /// Items that failed, in input order.
    pub failed: Vec<BulkItemError>,
}

impl<T> Default for BulkResult<T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<T> BulkResult<T> {
    /// Whether every item succeeded.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

// ============================================================================
// Service
// ============================================================================

/// Orchestrates validation, persistence and events for relationships.
#[derive(Clone)]
pub struct RelationshipService {
    repository: Arc<dyn RelationshipRepository>,
    events: Arc<dyn EventSink>,
    validator: RelationshipValidator,
    traversal: GraphTraversal,
    analyzer: GraphAnalyzer,
}

/// Log a persistence failure with context and hand it back unchanged.
fn logged<T>(context: &str, result: Result<T>) -> Result<T> {
    if let Err(ref e @ Error::Persistence { .. }) = result {
        log::error!("{context}: {e}");
    }
    result
}

impl RelationshipService {
    /// Wire a service and its components over the given collaborators.
    pub fn new(
        repository: Arc<dyn RelationshipRepository>,
        nodes: Arc<dyn NodeRegistry>,
        events: Arc<dyn EventSink>,
        config: &EngineConfig,
    ) -> Self {
        let validator = RelationshipValidator::new(
            repository.clone(),
            nodes,
            config.validation.clone(),
            config.hierarchy_max_depth,
        );
        let traversal = GraphTraversal::new(repository.clone(), config.traversal.clone());
        let analyzer =
            GraphAnalyzer::new(repository.clone(), traversal.clone(), config.analysis.clone());
        Self {
            repository,
            events,
            validator,
            traversal,
            analyzer,
        }
    }

    /// The validator.
    pub fn validator(&self) -> &RelationshipValidator {
        &self.validator
    }

    /// Path and neighborhood queries.
    pub fn traversal(&self) -> &GraphTraversal {
        &self.traversal
    }

    /// Whole-graph analysis.
    pub fn analyzer(&self) -> &GraphAnalyzer {
        &self.analyzer
    }

    /// The underlying repository.
    pub fn repository(&self) -> &Arc<dyn RelationshipRepository> {
        &self.repository
    }

    // ------------------------------------------------------------------------
    // Single-item writes
    // ------------------------------------------------------------------------

    /// Create a relationship.
    pub async fn create_relationship(&self, input: NewRelationship) -> Result<Relationship> {
        self.validator.validate_create(&input)?;
        self.validator
            .verify_nodes_exist(&[input.source_id.clone(), input.target_id.clone()])
            .await?;

        let (source, target, ty) = (&input.source_id, &input.target_id, input.relationship_type);
        if logged(
            "check duplicate",
            self.validator.check_duplicate(source, target, ty).await,
        )? {
            return Err(Error::duplicate(source, target, ty.name()));
        }
        if logged(
            "check cycle",
            self.validator.check_cycle_creation(source, target, ty).await,
        )? {
            return Err(Error::cycle(source, target, ty.name()));
        }

        let relationship = input.into_relationship(Utc::now());
        let created = logged(
            "create relationship",
            self.repository.create(relationship).await,
        )?;

        log::info!("created {} ({})", created.describe(), created.id);
        self.events.emit(RelationshipEvent::Created(created.clone()));
        Ok(created)
    }

    /// Update weight, bidirectional flag or metadata.
    ///
    /// Endpoints and type cannot change, so no duplicate or cycle check
    /// is needed.
    pub async fn update_relationship(
        &self,
        id: &str,
        update: UpdateRelationship,
    ) -> Result<Relationship> {
        self.validator.validate_update(&update)?;
        self.get_relationship(id).await?;

        let updated = logged(
            "update relationship",
            self.repository.update(id, &update, Utc::now()).await,
        )?;

        log::info!("updated {} ({})", updated.describe(), updated.id);
        self.events.emit(RelationshipEvent::Updated(updated.clone()));
        Ok(updated)
    }

    /// Hard-delete a relationship and return its last state.
    pub async fn delete_relationship(&self, id: &str) -> Result<Relationship> {
        let existing = self.get_relationship(id).await?;
        logged("delete relationship", self.repository.delete(id).await)?;

        log::info!("deleted {} ({})", existing.describe(), existing.id);
        self.events.emit(RelationshipEvent::Deleted(existing.clone()));
        Ok(existing)
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Fetch a relationship, failing when it does not exist.
    pub async fn get_relationship(&self, id: &str) -> Result<Relationship> {
        logged("get relationship", self.repository.get_by_id(id).await)?
            .ok_or_else(|| Error::relationship_not_found(id))
    }

    /// Filtered, paged query.
    pub async fn find_relationships(&self, filter: &RelationshipFilter) -> Result<Vec<Relationship>> {
        logged("query relationships", self.repository.query(filter).await)
    }

    /// Edges attached to a node.
    pub async fn get_node_relationships(
        &self,
        node_id: &str,
        direction: Direction,
    ) -> Result<Vec<Relationship>> {
        logged(
            "get node relationships",
            self.repository.get_node_relationships(node_id, direction).await,
        )
    }

    // ------------------------------------------------------------------------
    // Bulk
    // ------------------------------------------------------------------------

    /// Create each item independently.
    pub async fn bulk_create(&self, inputs: Vec<NewRelationship>) -> BulkResult<Relationship> {
        let mut result = BulkResult::default();
        for (index, input) in inputs.into_iter().enumerate() {
            match self.create_relationship(input).await {
                Ok(rel) => result.succeeded.push(rel),
                Err(e) => {
                    log::warn!("bulk create item {index} failed: {e}");
                    result.failed.push(BulkItemError::new(index, None, &e));
                }
            }
        }
        result
    }

    /// Create from a raw JSON array.
    ///
    /// Fails as a whole only when `value` is not an array; items that do
    /// not parse are reported like any other per-item failure.
    pub async fn bulk_create_json(&self, value: &Value) -> Result<BulkResult<Relationship>> {
        let Some(items) = value.as_array() else {
            return Err(Error::invalid(
                "",
                ViolationCode::InvalidType,
                "bulk input must be an array",
            ));
        };

        let mut result = BulkResult::default();
        for (index, item) in items.iter().enumerate() {
            let created = match self.validator.parse_create(item) {
                Ok(input) => self.create_relationship(input).await,
                Err(e) => Err(e),
            };
            match created {
                Ok(rel) => result.succeeded.push(rel),
                Err(e) => {
                    log::warn!("bulk create item {index} failed: {e}");
                    result.failed.push(BulkItemError::new(index, None, &e));
                }
            }
        }
        Ok(result)
    }

    /// Update each `(id, update)` pair independently.
    pub async fn bulk_update(
        &self,
        updates: Vec<(String, UpdateRelationship)>,
    ) -> BulkResult<Relationship> {
        let mut result = BulkResult::default();
        for (index, (id, update)) in updates.into_iter().enumerate() {
            match self.update_relationship(&id, update).await {
                Ok(rel) => result.succeeded.push(rel),
                Err(e) => {
                    log::warn!("bulk update item {index} ({id}) failed: {e}");
                    result.failed.push(BulkItemError::new(index, Some(id), &e));
                }
            }
        }
        result
    }

    /// Delete each id independently; succeeded holds the deleted ids.
    pub async fn bulk_delete(&self, ids: Vec<String>) -> BulkResult<String> {
        let mut result = BulkResult::default();
        for (index, id) in ids.into_iter().enumerate() {
            match self.delete_relationship(&id).await {
                Ok(_) => result.succeeded.push(id),
                Err(e) => {
                    log::warn!("bulk delete item {index} ({id}) failed: {e}");
                    result.failed.push(BulkItemError::new(index, Some(id), &e));
                }
            }
        }
        result
    }

    // ------------------------------------------------------------------------
    // Export / import
    // ------------------------------------------------------------------------

    /// Current relationships plus statistics, as one document.
    pub async fn export_snapshot(&self) -> Result<GraphExport> {
        let relationships = logged("export relationships", self.repository.all().await)?;
        let statistics = self
            .analyzer
            .compute_statistics(&relationships, &StatisticsOptions::default())?;
        Ok(GraphExport {
            statistics,
            relationships,
        })
    }

    /// Serialize the whole graph in `format`.
    pub async fn export_graph_data(&self, format: ExportFormat) -> Result<String> {
        let export = self.export_snapshot().await?;
        log::debug!(
            "exporting {} relationship(s) as {format}",
            export.relationships.len()
        );
        render(format, &export)
    }

    /// Load relationships from a JSON export, keeping their ids and
    /// timestamps. The import is checked against every invariant before
    /// anything is written; statistics in the document are ignored.
    pub async fn import_graph_data(&self, json: &str) -> Result<usize> {
        let export = parse_json_export(json)?;
        let relationships = export.relationships;

        let mut violations = Vec::new();
        for (index, rel) in relationships.iter().enumerate() {
            if let Err(e) = self.validator.validate_stored(rel) {
                violations.extend(e.violations().iter().map(|v| {
                    FieldViolation::new(
                        format!("relationships[{index}].{}", v.field),
                        v.code,
                        v.message.clone(),
                    )
                }));
            }
        }
        if !violations.is_empty() {
            return Err(Error::validation(violations));
        }

        self.validator
            .verify_nodes_exist(&referenced_nodes(&relationships))
            .await?;
        self.ensure_hierarchies_acyclic(&relationships).await?;

        let created = logged(
            "import relationships",
            self.repository.bulk_create(relationships).await,
        )?;
        let count = created.len();

        log::info!("imported {count} relationship(s)");
        self.events.emit(RelationshipEvent::Imported { count });
        Ok(count)
    }

    /// Check that adding `incoming` keeps each hierarchical type acyclic.
    async fn ensure_hierarchies_acyclic(&self, incoming: &[Relationship]) -> Result<()> {
        for ty in RelationshipType::ALL.into_iter().filter(|t| t.is_hierarchical()) {
            let added: Vec<&Relationship> = incoming
                .iter()
                .filter(|r| r.relationship_type == ty)
                .collect();
            if added.is_empty() {
                continue;
            }
            let existing = logged(
                "query hierarchy",
                self.repository
                    .query(&RelationshipFilter::default().of_type(ty))
                    .await,
            )?;

            let mut graph: DiGraph<NodeId, ()> = DiGraph::new();
            let mut index: HashMap<&str, NodeIndex> = HashMap::new();
            for rel in existing.iter().chain(added.iter().copied()) {
                let s = *index
                    .entry(rel.source_id.as_str())
                    .or_insert_with(|| graph.add_node(rel.source_id.clone()));
                let t = *index
                    .entry(rel.target_id.as_str())
                    .or_insert_with(|| graph.add_node(rel.target_id.clone()));
                graph.add_edge(s, t, ());
            }

            if let Err(cycle) = toposort(&graph, None) {
                let node = &graph[cycle.node_id()];
                let culprit = added
                    .iter()
                    .find(|r| r.touches(node))
                    .map(|r| (r.source_id.as_str(), r.target_id.as_str()))
                    .unwrap_or((node.as_str(), node.as_str()));
                return Err(Error::cycle(culprit.0, culprit.1, ty.name()));
            }
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
    use crate::events::RecordingEventSink;
    use crate::export::to_json;
    use crate::nodes::{AllowAllNodes, InMemoryNodeRegistry};
    use crate::repository::InMemoryRelationshipRepository;
    use serde_json::json;

    struct Fixture {
        service: RelationshipService,
        events: Arc<RecordingEventSink>,
    }

    fn fixture_with(nodes: Arc<dyn NodeRegistry>) -> Fixture {
        let events = Arc::new(RecordingEventSink::new());
        let service = RelationshipService::new(
            Arc::new(InMemoryRelationshipRepository::new()),
            nodes,
            events.clone(),
            &EngineConfig::default(),
        );
        Fixture { service, events }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(AllowAllNodes))
    }

    fn related(s: &str, t: &str) -> NewRelationship {
        NewRelationship::new(s, t, RelationshipType::RelatedTo)
    }

    // ------------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_create_emits_event() {
        let f = fixture();
        let rel = f
            .service
            .create_relationship(related("a", "b").with_weight(0.5))
            .await
            .unwrap();

        assert_eq!(rel.weight, 0.5);
        assert_eq!(rel.created_at, rel.updated_at);
        assert_eq!(f.events.names(), vec!["relationship.created"]);
    }

    #[tokio::test]
    async fn test_missing_nodes_abort_before_write() {
        let f = fixture_with(Arc::new(InMemoryNodeRegistry::new(["a"])));
        let err = f
            .service
            .create_relationship(related("a", "ghost"))
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert!(f.service.repository().all().await.unwrap().is_empty());
        assert!(f.events.names().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_rejected() {
        let f = fixture();
        f.service.create_relationship(related("a", "b")).await.unwrap();
        let err = f
            .service
            .create_relationship(related("a", "b").with_weight(0.9))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "DUPLICATE");

        // A different type between the same nodes is allowed.
        f.service
            .create_relationship(NewRelationship::new("a", "b", RelationshipType::Supports))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_hierarchical_cycle_rejected() {
        let f = fixture();
        f.service
            .create_relationship(NewRelationship::new("a", "b", RelationshipType::ParentChild))
            .await
            .unwrap();
        let err = f
            .service
            .create_relationship(NewRelationship::new("b", "a", RelationshipType::ParentChild))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CYCLE");

        // Non-hierarchical edges may close loops.
        f.service.create_relationship(related("b", "a")).await.unwrap();
    }

    // ------------------------------------------------------------------------
    // Update / delete
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_update_bumps_timestamp_and_emits() {
        let f = fixture();
        let rel = f.service.create_relationship(related("a", "b")).await.unwrap();

        let updated = f
            .service
            .update_relationship(&rel.id, UpdateRelationship::default().weight(0.2))
            .await
            .unwrap();

        assert_eq!(updated.weight, 0.2);
        assert!(updated.updated_at >= rel.updated_at);
        assert_eq!(updated.created_at, rel.created_at);
        assert_eq!(
            f.events.names(),
            vec!["relationship.created", "relationship.updated"]
        );
    }

    #[tokio::test]
    async fn test_update_validates_and_checks_existence() {
        let f = fixture();
        let rel = f.service.create_relationship(related("a", "b")).await.unwrap();

        let err = f
            .service
            .update_relationship(&rel.id, UpdateRelationship::default().weight(2.0))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let err = f
            .service
            .update_relationship("missing", UpdateRelationship::default().weight(0.1))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_then_get_is_not_found() {
        let f = fixture();
        let rel = f.service.create_relationship(related("a", "b")).await.unwrap();

        let deleted = f.service.delete_relationship(&rel.id).await.unwrap();
        assert_eq!(deleted.id, rel.id);
        assert!(f.service.get_relationship(&rel.id).await.unwrap_err().is_not_found());
        assert_eq!(
            f.events.names(),
            vec!["relationship.created", "relationship.deleted"]
        );
    }

    // ------------------------------------------------------------------------
    // Bulk
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_bulk_create_partial_failure() {
        let f = fixture();
        let result = f
            .service
            .bulk_create(vec![
                related("a", "b"),
                related("b", "c"),
                related("c", "d"),
                related("d", "d"),
            ])
            .await;

        assert_eq!(result.succeeded.len(), 3);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].index, 3);
        assert_eq!(result.failed[0].code, "VALIDATION_ERROR");
        assert_eq!(result.failed[0].violations[0].code, ViolationCode::SelfReference);
    }

    #[tokio::test]
    async fn test_bulk_create_json() {
        let f = fixture();
        let result = f
            .service
            .bulk_create_json(&json!([
                {"sourceId": "a", "targetId": "b", "type": "supports"},
                {"sourceId": "a", "type": "supports"},
                "not an object"
            ]))
            .await
            .unwrap();

        assert_eq!(result.succeeded.len(), 1);
        let indexes: Vec<usize> = result.failed.iter().map(|e| e.index).collect();
        assert_eq!(indexes, vec![1, 2]);

        let err = f.service.bulk_create_json(&json!({"a": 1})).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_bulk_update_and_delete() {
        let f = fixture();
        let rel = f.service.create_relationship(related("a", "b")).await.unwrap();

        let updates = f
            .service
            .bulk_update(vec![
                (rel.id.clone(), UpdateRelationship::default().bidirectional(true)),
                ("nope".into(), UpdateRelationship::default().weight(0.3)),
            ])
            .await;
        assert_eq!(updates.succeeded.len(), 1);
        assert_eq!(updates.failed[0].id.as_deref(), Some("nope"));
        assert_eq!(updates.failed[0].code, "NOT_FOUND");

        let deletes = f
            .service
            .bulk_delete(vec![rel.id.clone(), rel.id.clone()])
            .await;
        assert_eq!(deletes.succeeded, vec![rel.id.clone()]);
        assert_eq!(deletes.failed.len(), 1);
        assert!(!deletes.is_complete());
    }

    // ------------------------------------------------------------------------
    // Export / import
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_export_formats() {
        let f = fixture();
        f.service
            .create_relationship(related("a", "b").with_weight(0.4))
            .await
            .unwrap();

        let json: Value =
            serde_json::from_str(&f.service.export_graph_data(ExportFormat::Json).await.unwrap())
                .unwrap();
        assert_eq!(json["statistics"]["nodeCount"], 2);
        assert_eq!(json["relationships"][0]["weight"], 0.4);

        let graphml = f.service.export_graph_data(ExportFormat::Graphml).await.unwrap();
        assert!(graphml.contains(r#"<edge source="a" target="b">"#));

        let gexf = f.service.export_graph_data(ExportFormat::Gexf).await.unwrap();
        assert!(gexf.contains(r#"<edge id="0" source="a" target="b">"#));
    }

    #[tokio::test]
    async fn test_import_preserves_ids_and_emits() {
        let source = fixture();
        let a = source.service.create_relationship(related("a", "b")).await.unwrap();
        let json = to_json(&source.service.export_snapshot().await.unwrap()).unwrap();

        let target = fixture();
        let count = target.service.import_graph_data(&json).await.unwrap();

        assert_eq!(count, 1);
        assert_eq!(target.service.get_relationship(&a.id).await.unwrap(), a);
        assert_eq!(target.events.names(), vec!["relationship.imported"]);
    }

    #[tokio::test]
    async fn test_import_rejects_hierarchy_cycle() {
        let f = fixture();
        f.service
            .create_relationship(NewRelationship::new("a", "b", RelationshipType::PartOf))
            .await
            .unwrap();

        let back = NewRelationship::new("b", "a", RelationshipType::PartOf)
            .into_relationship(Utc::now());
        let json = to_json(&GraphExport {
            statistics: Default::default(),
            relationships: vec![back],
        })
        .unwrap();

        let err = f.service.import_graph_data(&json).await.unwrap_err();
        assert_eq!(err.code(), "CYCLE");
        assert_eq!(f.service.repository().all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_import_rejects_invalid_items() {
        let f = fixture();
        let mut bad = related("a", "b").into_relationship(Utc::now());
        bad.weight = 3.0;
        let json = to_json(&GraphExport {
            statistics: Default::default(),
            relationships: vec![bad],
        })
        .unwrap();

        let err = f.service.import_graph_data(&json).await.unwrap_err();
        assert_eq!(err.violations()[0].field, "relationships[0].weight");
    }
}
