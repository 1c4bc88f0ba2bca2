//! Relationship persistence interface and the in-memory implementation.
//!
//! The engine never talks to a database directly. Everything it needs is
//! expressed by [`RelationshipRepository`]; production deployments plug in
//! their own store. [`InMemoryRelationshipRepository`] is the reference
//! implementation used by the CLI snapshot mode and by tests.
//!
//! Implementations are expected to enforce the `(source, target, type)`
//! uniqueness constraint themselves. The service's duplicate check runs
//! before the write and is not atomic with it, so the store is the
//! authoritative backstop.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kgraph_core::{Error, NodeId, Result};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use crate::types::{Direction, Relationship, RelationshipFilter, RelationshipType, UpdateRelationship};

// ============================================================================
// Trait
// ============================================================================

/// Storage interface for relationships.
///
/// All methods may fail with a persistence error; callers wrap and
/// propagate, never swallow.
#[async_trait]
pub trait RelationshipRepository: Send + Sync {
    /// Store a fully materialized relationship.
    async fn create(&self, relationship: Relationship) -> Result<Relationship>;

    /// Fetch by id.
    async fn get_by_id(&self, id: &str) -> Result<Option<Relationship>>;

    /// Apply a partial update and return the new state.
    async fn update(
        &self,
        id: &str,
        update: &UpdateRelationship,
        updated_at: DateTime<Utc>,
    ) -> Result<Relationship>;

    /// Hard-delete by id.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Filtered, paged query in storage order.
    async fn query(&self, filter: &RelationshipFilter) -> Result<Vec<Relationship>>;

    /// Edges attached to `node_id` in `direction`.
    async fn get_node_relationships(
        &self,
        node_id: &str,
        direction: Direction,
    ) -> Result<Vec<Relationship>>;

    /// Edges attached to any of `node_ids`, deduplicated by id.
    ///
    /// Traversals call this once per frontier. The default implementation
    /// issues one `get_node_relationships` per node; stores that can batch
    /// should override it.
    async fn get_relationships_for_nodes(
        &self,
        node_ids: &[NodeId],
        direction: Direction,
    ) -> Result<Vec<Relationship>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for node_id in node_ids {
            for rel in self.get_node_relationships(node_id, direction).await? {
                if seen.insert(rel.id.clone()) {
                    out.push(rel);
                }
            }
        }
        Ok(out)
    }

    /// Store many relationships.
    ///
    /// The default implementation stops at the first failure.
    async fn bulk_create(&self, relationships: Vec<Relationship>) -> Result<Vec<Relationship>> {
        let mut created = Vec::with_capacity(relationships.len());
        for rel in relationships {
            created.push(self.create(rel).await?);
        }
        Ok(created)
    }

    /// Delete many relationships.
    async fn bulk_delete(&self, ids: &[String]) -> Result<()> {
        for id in ids {
            self.delete(id).await?;
        }
        Ok(())
    }

    /// Every stored relationship.
    async fn all(&self) -> Result<Vec<Relationship>> {
        self.query(&RelationshipFilter::default()).await
    }
}

// ============================================================================
// In-memory implementation
// ============================================================================

type TripleKey = (NodeId, NodeId, RelationshipType);

#[derive(Debug, Default)]
struct MemoryState {
    /// Insertion-ordered edges.
    edges: Vec<Relationship>,
    /// Id → position in `edges`.
    positions: HashMap<String, usize>,
    /// Uniqueness constraint.
    triples: HashSet<TripleKey>,
}

impl MemoryState {
    fn triple(rel: &Relationship) -> TripleKey {
        let (source, target, ty) = rel.key();
        (source.to_string(), target.to_string(), ty)
    }

    fn insert(&mut self, rel: Relationship) -> Result<Relationship> {
        if self.positions.contains_key(&rel.id) {
            return Err(Error::persistence(
                format!("insert relationship {}", rel.id),
                format!("primary key '{}' already exists", rel.id),
            ));
        }
        let key = Self::triple(&rel);
        if self.triples.contains(&key) {
            return Err(Error::duplicate(
                &rel.source_id,
                &rel.target_id,
                rel.relationship_type.name(),
            ));
        }
        self.triples.insert(key);
        self.positions.insert(rel.id.clone(), self.edges.len());
        self.edges.push(rel.clone());
        Ok(rel)
    }

    fn remove(&mut self, id: &str) -> Option<Relationship> {
        let pos = self.positions.remove(id)?;
        let rel = self.edges.remove(pos);
        self.triples.remove(&Self::triple(&rel));
        for p in self.positions.values_mut() {
            if *p > pos {
                *p -= 1;
            }
        }
        Some(rel)
    }
}

/// Insertion-ordered in-memory relationship store.
///
/// Query results come back in insertion order, which keeps traversal
/// tie-breaking deterministic.
#[derive(Debug, Default)]
pub struct InMemoryRelationshipRepository {
    state: RwLock<MemoryState>,
}

impl InMemoryRelationshipRepository {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `relationships`.
    ///
    /// Fails on the first duplicate id or triple.
    pub fn with_relationships(relationships: Vec<Relationship>) -> Result<Self> {
        let mut state = MemoryState::default();
        for rel in relationships {
            state.insert(rel)?;
        }
        Ok(Self {
            state: RwLock::new(state),
        })
    }

    /// Number of stored relationships.
    pub async fn len(&self) -> usize {
        self.state.read().await.edges.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.edges.is_empty()
    }
}

#[async_trait]
impl RelationshipRepository for InMemoryRelationshipRepository {
    async fn create(&self, relationship: Relationship) -> Result<Relationship> {
        self.state.write().await.insert(relationship)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Relationship>> {
        let state = self.state.read().await;
        Ok(state.positions.get(id).map(|&pos| state.edges[pos].clone()))
    }

    async fn update(
        &self,
        id: &str,
        update: &UpdateRelationship,
        updated_at: DateTime<Utc>,
    ) -> Result<Relationship> {
        let mut state = self.state.write().await;
        let pos = *state
            .positions
            .get(id)
            .ok_or_else(|| Error::relationship_not_found(id))?;
        let rel = &mut state.edges[pos];
        update.apply_to(rel, updated_at);
        Ok(rel.clone())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.state
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::relationship_not_found(id))
    }

    async fn query(&self, filter: &RelationshipFilter) -> Result<Vec<Relationship>> {
        let state = self.state.read().await;
        let offset = filter.offset.unwrap_or(0);
        let limit = filter.limit.unwrap_or(usize::MAX);
        Ok(state
            .edges
            .iter()
            .filter(|rel| filter.matches(rel))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_node_relationships(
        &self,
        node_id: &str,
        direction: Direction,
    ) -> Result<Vec<Relationship>> {
        let state = self.state.read().await;
        Ok(state
            .edges
            .iter()
            .filter(|rel| direction.matches(rel, node_id))
            .cloned()
            .collect())
    }

    async fn get_relationships_for_nodes(
        &self,
        node_ids: &[NodeId],
        direction: Direction,
    ) -> Result<Vec<Relationship>> {
        let wanted: HashSet<&str> = node_ids.iter().map(String::as_str).collect();
        let state = self.state.read().await;
        Ok(state
            .edges
            .iter()
            .filter(|rel| match direction {
                Direction::Outgoing => wanted.contains(rel.source_id.as_str()),
                Direction::Incoming => wanted.contains(rel.target_id.as_str()),
                Direction::Both => {
                    wanted.contains(rel.source_id.as_str())
                        || wanted.contains(rel.target_id.as_str())
                }
            })
            .cloned()
            .collect())
    }

    async fn bulk_create(&self, relationships: Vec<Relationship>) -> Result<Vec<Relationship>> {
        // All-or-nothing: validate the whole batch against a scratch copy first.
        let mut state = self.state.write().await;
        let mut ids: HashSet<String> = state.positions.keys().cloned().collect();
        let mut triples = state.triples.clone();
        for rel in &relationships {
            if !ids.insert(rel.id.clone()) {
                return Err(Error::persistence(
                    "bulk insert relationships",
                    format!("primary key '{}' already exists", rel.id),
                ));
            }
            if !triples.insert(MemoryState::triple(rel)) {
                return Err(Error::duplicate(
                    &rel.source_id,
                    &rel.target_id,
                    rel.relationship_type.name(),
                ));
            }
        }
        let mut created = Vec::with_capacity(relationships.len());
        for rel in relationships {
            created.push(state.insert(rel)?);
        }
        Ok(created)
    }

    async fn bulk_delete(&self, ids: &[String]) -> Result<()> {
        let mut state = self.state.write().await;
        for id in ids {
            state.remove(id);
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
