//! Node-existence collaborator.
//!
//! Knowledge nodes live outside the engine. Before an edge is written the
//! service asks a [`NodeRegistry`] whether both endpoints exist.

use async_trait::async_trait;
use kgraph_core::{Error, NodeId, Result};
use std::collections::HashSet;
use tokio::sync::RwLock;

/// Existence check for external nodes.
#[async_trait]
pub trait NodeRegistry: Send + Sync {
    /// Succeed if every id exists, otherwise fail with
    /// [`Error::NodesNotFound`] naming every missing id.
    async fn verify_exist(&self, ids: &[NodeId]) -> Result<()>;
}

/// Registry backed by an explicit set of node ids.
#[derive(Debug, Default)]
pub struct InMemoryNodeRegistry {
    nodes: RwLock<HashSet<NodeId>>,
}

impl InMemoryNodeRegistry {
    /// Create a registry with the given nodes.
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        Self {
            nodes: RwLock::new(ids.into_iter().map(Into::into).collect()),
        }
    }

    /// Register a node.
    pub async fn insert(&self, id: impl Into<NodeId>) {
        self.nodes.write().await.insert(id.into());
    }

    /// Forget a node.
    pub async fn remove(&self, id: &str) -> bool {
        self.nodes.write().await.remove(id)
    }
}

#[async_trait]
impl NodeRegistry for InMemoryNodeRegistry {
    async fn verify_exist(&self, ids: &[NodeId]) -> Result<()> {
        let nodes = self.nodes.read().await;
        let mut missing: Vec<NodeId> = Vec::new();
        for id in ids {
            if !nodes.contains(id) && !missing.contains(id) {
                missing.push(id.clone());
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::NodesNotFound(missing))
        }
    }
}

/// Registry that treats every id as existing.
///
/// Used when the engine runs without a node store (CLI snapshot mode).
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAllNodes;

#[async_trait]
impl NodeRegistry for AllowAllNodes {
    async fn verify_exist(&self, _ids: &[NodeId]) -> Result<()> {
        Ok(())
    }
}
