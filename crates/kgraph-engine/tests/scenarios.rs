//! End-to-end scenarios against the relationship service with in-memory
//! collaborators.
#![allow(clippy::unwrap_used, clippy::panic)]

use std::collections::BTreeSet;
use std::sync::Arc;

use kgraph_core::ViolationCode;
use kgraph_engine::{
    AllPathsOptions, BroadcastEventSink, Direction, EngineConfig, EventSink, ExportFormat,
    ImportanceAlgorithm, ImportanceOptions, InMemoryNodeRegistry, InMemoryRelationshipRepository,
    NeighborhoodOptions, NewRelationship, NodeRegistry, PathAlgorithm, PathOptions,
    RelationshipEvent, RelationshipRepository, RelationshipService, RelationshipType,
    UpdateRelationship,
};
use serde_json::json;
use tokio::sync::broadcast;

const NODES: [&str; 8] = ["A", "B", "C", "D", "E", "L1", "L2", "X"];

fn setup() -> (RelationshipService, broadcast::Receiver<RelationshipEvent>) {
    let repository: Arc<dyn RelationshipRepository> = Arc::new(InMemoryRelationshipRepository::new());
    let nodes: Arc<dyn NodeRegistry> = Arc::new(InMemoryNodeRegistry::new(NODES));
    let sink = Arc::new(BroadcastEventSink::new(64));
    let receiver = sink.subscribe();
    let events: Arc<dyn EventSink> = sink;
    let service = RelationshipService::new(repository, nodes, events, &EngineConfig::default());
    (service, receiver)
}

fn rel(source: &str, target: &str, relationship_type: RelationshipType) -> NewRelationship {
    NewRelationship::new(source, target, relationship_type)
}

// -----------------------------------------------------------------------
// Concrete scenarios
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_duplicate_triple_rejected() {
    let (service, _events) = setup();

    service
        .create_relationship(rel("A", "B", RelationshipType::RelatedTo).with_weight(0.5))
        .await
        .unwrap();
    let err = service
        .create_relationship(rel("A", "B", RelationshipType::RelatedTo).with_weight(0.9))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "DUPLICATE");
}

#[tokio::test]
async fn test_self_reference_rejected() {
    let (service, _events) = setup();

    let err = service
        .create_relationship(rel("A", "A", RelationshipType::RelatedTo))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "VALIDATION_ERROR");
    assert!(
        err.violations()
            .iter()
            .any(|v| v.code == ViolationCode::SelfReference)
    );
}

#[tokio::test]
async fn test_hierarchical_cycle_rejected() {
    let (service, _events) = setup();

    service
        .create_relationship(rel("A", "B", RelationshipType::ParentChild))
        .await
        .unwrap();
    let err = service
        .create_relationship(rel("B", "A", RelationshipType::ParentChild))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "CYCLE");
}

#[tokio::test]
async fn test_chain_shortest_path() {
    let (service, _events) = setup();
    for (s, t) in [("A", "B"), ("B", "C"), ("C", "D")] {
        service
            .create_relationship(rel(s, t, RelationshipType::RelatedTo).with_weight(1.0))
            .await
            .unwrap();
    }

    let path = service
        .traversal()
        .find_shortest_path(
            "A",
            "D",
            &PathOptions::default().algorithm(PathAlgorithm::Bfs),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(path.nodes, vec!["A", "B", "C", "D"]);
    assert_eq!(path.length, 3);
    assert_eq!(path.relationships.len(), 3);
}

#[tokio::test]
async fn test_star_degree_importance() {
    let (service, _events) = setup();
    for leaf in ["L1", "L2"] {
        service
            .create_relationship(rel("C", leaf, RelationshipType::RelatedTo))
            .await
            .unwrap();
    }

    let ranked = service
        .analyzer()
        .calculate_node_importance(
            ImportanceAlgorithm::Degree,
            &ImportanceOptions::default().normalized(),
        )
        .await
        .unwrap();

    assert_eq!(ranked.len(), 3);
    assert_eq!(ranked[0].node_id, "C");
    assert_eq!(ranked[0].score, 1.0);
    assert_eq!(ranked[0].rank, 1);
    for leaf in &ranked[1..] {
        assert_eq!(leaf.score, 0.5);
    }
}

#[tokio::test]
async fn test_bulk_create_reports_per_item_errors() {
    let (service, _events) = setup();

    let result = service
        .bulk_create(vec![
            rel("A", "B", RelationshipType::RelatedTo),
            rel("B", "C", RelationshipType::Supports),
            rel("C", "D", RelationshipType::References),
            rel("D", "E", RelationshipType::RelatedTo).with_weight(1.5),
        ])
        .await;

    assert_eq!(result.succeeded.len(), 3);
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].index, 3);
    assert_eq!(result.failed[0].code, "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_bulk_create_json_mixed_input() {
    let (service, _events) = setup();

    let result = service
        .bulk_create_json(&json!([
            {"sourceId": "A", "targetId": "B", "type": "related_to"},
            {"sourceId": "A", "targetId": "B", "type": "likes"},
            {"sourceId": "A", "targetId": "Z", "type": "related_to"},
        ]))
        .await
        .unwrap();

    assert_eq!(result.succeeded.len(), 1);
    let codes: Vec<_> = result.failed.iter().map(|f| f.code.as_str()).collect();
    assert_eq!(codes, vec!["VALIDATION_ERROR", "NOT_FOUND"]);
}

// -----------------------------------------------------------------------
// Properties
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_weight_out_of_range_rejected_on_create_and_update() {
    let (service, _events) = setup();

    let err = service
        .create_relationship(rel("A", "B", RelationshipType::RelatedTo).with_weight(-0.1))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");

    let created = service
        .create_relationship(rel("A", "B", RelationshipType::RelatedTo))
        .await
        .unwrap();
    let err = service
        .update_relationship(&created.id, UpdateRelationship::default().weight(1.01))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");

    let stored = service.get_relationship(&created.id).await.unwrap();
    assert_eq!(stored.weight, 1.0);
}

#[tokio::test]
async fn test_shortest_path_not_longer_than_any_enumerated_path() {
    let (service, _events) = setup();
    for (s, t) in [
        ("A", "B"),
        ("B", "C"),
        ("C", "D"),
        ("A", "C"),
        ("B", "E"),
        ("E", "D"),
    ] {
        service
            .create_relationship(rel(s, t, RelationshipType::RelatedTo).with_weight(0.7))
            .await
            .unwrap();
    }

    for direction in [Direction::Outgoing, Direction::Both] {
        let shortest = service
            .traversal()
            .find_shortest_path("A", "D", &PathOptions::default().direction(direction))
            .await
            .unwrap()
            .unwrap();
        let all = service
            .traversal()
            .find_all_paths("A", "D", &AllPathsOptions::default().direction(direction))
            .await
            .unwrap();

        assert!(!all.is_empty());
        for path in &all {
            assert!(shortest.length <= path.length);
        }
    }
}

#[tokio::test]
async fn test_neighborhood_depth_zero_is_center_only() {
    let (service, _events) = setup();
    service
        .create_relationship(rel("A", "B", RelationshipType::RelatedTo))
        .await
        .unwrap();

    let hood = service
        .traversal()
        .get_neighborhood("A", 0, &NeighborhoodOptions::default().direction(Direction::Both))
        .await
        .unwrap();

    assert_eq!(hood.nodes, vec!["A"]);
    assert!(hood.edges.is_empty());
}

#[tokio::test]
async fn test_json_export_round_trip() {
    let (source, _events) = setup();
    source
        .create_relationship(
            rel("A", "B", RelationshipType::PartOf)
                .with_weight(0.25)
                .with_metadata("section", "intro"),
        )
        .await
        .unwrap();
    source
        .create_relationship(rel("B", "C", RelationshipType::DerivedFrom).bidirectional())
        .await
        .unwrap();

    let json = source.export_graph_data(ExportFormat::Json).await.unwrap();

    let (target, _events) = setup();
    assert_eq!(target.import_graph_data(&json).await.unwrap(), 2);

    let identity = |rels: Vec<kgraph_engine::Relationship>| -> BTreeSet<(String, String, String, String, u64)> {
        rels.into_iter()
            .map(|r| {
                (
                    r.id,
                    r.source_id,
                    r.target_id,
                    r.relationship_type.to_string(),
                    r.weight.to_bits(),
                )
            })
            .collect()
    };
    let before = identity(source.repository().all().await.unwrap());
    let after = identity(target.repository().all().await.unwrap());
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_import_rejects_hierarchy_cycle_atomically() {
    let (service, _events) = setup();
    let document = json!({
        "statistics": {},
        "relationships": [
            {
                "id": "r1", "sourceId": "A", "targetId": "B", "type": "parent_child",
                "weight": 1.0, "createdAt": "2026-01-01T00:00:00Z",
                "updatedAt": "2026-01-01T00:00:00Z"
            },
            {
                "id": "r2", "sourceId": "B", "targetId": "A", "type": "parent_child",
                "weight": 1.0, "createdAt": "2026-01-01T00:00:00Z",
                "updatedAt": "2026-01-01T00:00:00Z"
            }
        ]
    });

    let err = service
        .import_graph_data(&document.to_string())
        .await
        .unwrap_err();

    assert_eq!(err.code(), "CYCLE");
    assert!(service.repository().all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_then_get_is_not_found() {
    let (service, mut events) = setup();
    let created = service
        .create_relationship(rel("A", "B", RelationshipType::Supports))
        .await
        .unwrap();

    let deleted = service.delete_relationship(&created.id).await.unwrap();
    assert_eq!(deleted.id, created.id);

    let err = service.get_relationship(&created.id).await.unwrap_err();
    assert!(err.is_not_found());

    let names: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
        .map(|e| e.name())
        .collect();
    assert_eq!(names, vec!["relationship.created", "relationship.deleted"]);
}

#[tokio::test]
async fn test_missing_nodes_rejected() {
    let (service, _events) = setup();

    let err = service
        .create_relationship(rel("A", "Nowhere", RelationshipType::RelatedTo))
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert!(err.to_string().contains("Nowhere"));
}
