//! Path finding and neighborhood expansion.
//!
//! [`GraphTraversal`] never loads the whole graph. Adjacency is pulled from
//! the repository one frontier at a time and cached for the duration of a
//! single call, so memory is bounded by the part of the graph actually
//! explored.
//!
//! # Direction handling
//!
//! Every operation takes a [`Direction`]. With `honor_bidirectional` set
//! (the default), an edge stored with `bidirectional = true` can also be
//! walked against its stored direction.

use kgraph_core::{Error, NodeId, Result, TraversalDefaults};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::repository::RelationshipRepository;
use crate::types::{Direction, Relationship, RelationshipType};

// ============================================================================
// Options
// ============================================================================

/// Shortest-path algorithm.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathAlgorithm {
    /// Fewest hops; edges treated as unweighted.
    #[default]
    Bfs,
    /// Lowest total cost, where an edge costs `1 - weight`.
    Dijkstra,
}

impl FromStr for PathAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bfs" => Ok(Self::Bfs),
            "dijkstra" => Ok(Self::Dijkstra),
            other => Err(Error::analysis(format!("unknown path algorithm '{other}'"))),
        }
    }
}

/// Options for [`GraphTraversal::find_shortest_path`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PathOptions {
    /// Algorithm to use.
    pub algorithm: PathAlgorithm,
    /// Hop cutoff; defaults to `TraversalDefaults::max_depth`.
    pub max_depth: Option<usize>,
    /// Walk direction.
    pub direction: Direction,
    /// Override `TraversalDefaults::honor_bidirectional`.
    pub honor_bidirectional: Option<bool>,
    /// Only walk edges of these types.
    pub relationship_types: Option<Vec<RelationshipType>>,
}

impl PathOptions {
    /// Use the given algorithm.
    pub fn algorithm(mut self, algorithm: PathAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Set the hop cutoff.
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    /// Set the walk direction.
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Whether bidirectional edges may be walked backwards.
    pub fn honor_bidirectional(mut self, honor: bool) -> Self {
        self.honor_bidirectional = Some(honor);
        self
    }

    /// Restrict to the given relationship types.
    pub fn relationship_types(mut self, types: Vec<RelationshipType>) -> Self {
        self.relationship_types = Some(types);
        self
    }
}

/// Options for [`GraphTraversal::find_all_paths`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AllPathsOptions {
    /// Hop cutoff; defaults to `TraversalDefaults::all_paths_max_depth`.
    pub max_depth: Option<usize>,
    /// Result cap; defaults to `TraversalDefaults::all_paths_max_paths`.
    pub max_paths: Option<usize>,
    /// Walk direction.
    pub direction: Direction,
    /// Override `TraversalDefaults::honor_bidirectional`.
    pub honor_bidirectional: Option<bool>,
}

impl AllPathsOptions {
    /// Set the hop cutoff.
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    /// Set the result cap.
    pub fn max_paths(mut self, max_paths: usize) -> Self {
        self.max_paths = Some(max_paths);
        self
    }

    /// Set the walk direction.
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Whether bidirectional edges may be walked backwards.
    pub fn honor_bidirectional(mut self, honor: bool) -> Self {
        self.honor_bidirectional = Some(honor);
        self
    }
}

/// Predicate over node ids.
pub type NodePredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Predicate over relationships.
pub type EdgePredicate = Arc<dyn Fn(&Relationship) -> bool + Send + Sync>;

/// Options for [`GraphTraversal::get_neighborhood`].
///
/// Filters are applied while expanding: a rejected node is never
/// enqueued, so nothing is reached through it.
#[derive(Clone, Default)]
pub struct NeighborhoodOptions {
    /// Walk direction.
    pub direction: Direction,
    /// Override `TraversalDefaults::honor_bidirectional`.
    pub honor_bidirectional: Option<bool>,
    /// Only walk edges of these types.
    pub relationship_types: Option<Vec<RelationshipType>>,
    /// Admit only nodes passing this predicate (the center always passes).
    pub node_filter: Option<NodePredicate>,
    /// Walk only edges passing this predicate.
    pub edge_filter: Option<EdgePredicate>,
}

impl NeighborhoodOptions {
    /// Set the walk direction.
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Whether bidirectional edges may be walked backwards.
    pub fn honor_bidirectional(mut self, honor: bool) -> Self {
        self.honor_bidirectional = Some(honor);
        self
    }

    /// Restrict to the given relationship types.
    pub fn relationship_types(mut self, types: Vec<RelationshipType>) -> Self {
        self.relationship_types = Some(types);
        self
    }

    /// Admit only nodes passing `filter`.
    pub fn node_filter(mut self, filter: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.node_filter = Some(Arc::new(filter));
        self
    }

    /// Walk only edges passing `filter`.
    pub fn edge_filter(
        mut self,
        filter: impl Fn(&Relationship) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.edge_filter = Some(Arc::new(filter));
        self
    }
}

impl fmt::Debug for NeighborhoodOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NeighborhoodOptions")
            .field("direction", &self.direction)
            .field("honor_bidirectional", &self.honor_bidirectional)
            .field("relationship_types", &self.relationship_types)
            .field("node_filter", &self.node_filter.is_some())
            .field("edge_filter", &self.edge_filter.is_some())
            .finish()
    }
}

// ============================================================================
// Results
// ============================================================================

/// A walk from one node to another.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Path {
    /// Visited nodes, endpoints included.
    pub nodes: Vec<NodeId>,
    /// Edges walked, one fewer than `nodes`.
    pub relationships: Vec<Relationship>,
    /// Number of hops.
    pub length: usize,
    /// Sum of edge weights.
    pub total_weight: f64,
    /// Sum of edge costs (`1 - weight`).
    pub total_cost: f64,
}

impl Path {
    fn single(node: &str) -> Self {
        Self {
            nodes: vec![node.to_string()],
            relationships: Vec::new(),
            length: 0,
            total_weight: 0.0,
            total_cost: 0.0,
        }
    }

    fn from_steps(start: &str, steps: Vec<(Relationship, NodeId)>) -> Self {
        let mut nodes = Vec::with_capacity(steps.len() + 1);
        nodes.push(start.to_string());
        let mut relationships = Vec::with_capacity(steps.len());
        for (rel, node) in steps {
            relationships.push(rel);
            nodes.push(node);
        }
        let total_weight = relationships.iter().map(|r| r.weight).sum();
        let total_cost = relationships.iter().map(Relationship::cost).sum();
        Self {
            length: relationships.len(),
            nodes,
            relationships,
            total_weight,
            total_cost,
        }
    }
}

/// Nodes and edges within a hop radius of a center node.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Neighborhood {
    /// The node expansion started from.
    pub center: NodeId,
    /// Center first, then in discovery order.
    pub nodes: Vec<NodeId>,
    /// Edges walked during expansion, deduplicated.
    pub edges: Vec<Relationship>,
    /// Hop distance from the center for every node.
    pub distances: BTreeMap<NodeId, usize>,
}

// ============================================================================
// Walker
// ============================================================================

/// Per-call adjacency cache with direction and type rules applied.
struct Walker<'r> {
    repository: &'r dyn RelationshipRepository,
    direction: Direction,
    honor_bidirectional: bool,
    types: Option<Vec<RelationshipType>>,
    cache: HashMap<NodeId, Vec<Relationship>>,
}

impl<'r> Walker<'r> {
    fn new(
        repository: &'r dyn RelationshipRepository,
        direction: Direction,
        honor_bidirectional: bool,
        types: Option<Vec<RelationshipType>>,
    ) -> Self {
        Self {
            repository,
            direction,
            honor_bidirectional,
            types,
            cache: HashMap::new(),
        }
    }

    /// Bidirectional edges can be walked backwards, so one-way walks that
    /// honor them must see edges stored in both directions.
    fn fetch_direction(&self) -> Direction {
        if self.honor_bidirectional {
            Direction::Both
        } else {
            self.direction
        }
    }

    /// Make sure adjacency for every node in `nodes` is cached, with one
    /// repository call for all missing ones.
    async fn load(&mut self, nodes: &[NodeId]) -> Result<()> {
        let mut seen = HashSet::new();
        let missing: Vec<NodeId> = nodes
            .iter()
            .filter(|n| !self.cache.contains_key(*n) && seen.insert(n.as_str()))
            .cloned()
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let fetch = self.fetch_direction();
        let edges = self
            .repository
            .get_relationships_for_nodes(&missing, fetch)
            .await?;

        for id in &missing {
            self.cache.entry(id.clone()).or_default();
        }
        // Only lists created by this call are filled; an endpoint cached
        // earlier already holds the edge.
        let fresh: HashSet<&str> = missing.iter().map(String::as_str).collect();
        for rel in edges {
            if let Some(types) = &self.types {
                if !types.contains(&rel.relationship_type) {
                    continue;
                }
            }
            for endpoint in [&rel.source_id, &rel.target_id] {
                if fresh.contains(endpoint.as_str()) && fetch.matches(&rel, endpoint) {
                    if let Some(list) = self.cache.get_mut(endpoint) {
                        list.push(rel.clone());
                    }
                }
            }
        }
        Ok(())
    }

    /// The node reached by walking `rel` away from `from`, if allowed.
    fn step<'a>(&self, rel: &'a Relationship, from: &str) -> Option<&'a str> {
        let forward = rel.source_id == from;
        let backward = rel.target_id == from;
        let reverse_ok = self.honor_bidirectional && rel.bidirectional;
        match self.direction {
            Direction::Outgoing if forward => Some(rel.target_id.as_str()),
            Direction::Outgoing if backward && reverse_ok => Some(rel.source_id.as_str()),
            Direction::Incoming if backward => Some(rel.source_id.as_str()),
            Direction::Incoming if forward && reverse_ok => Some(rel.target_id.as_str()),
            Direction::Both if forward => Some(rel.target_id.as_str()),
            Direction::Both if backward => Some(rel.source_id.as_str()),
            _ => None,
        }
    }

    /// Walkable `(edge, neighbor)` pairs from a loaded node, in storage order.
    fn steps<'s>(&'s self, node: &'s str) -> impl Iterator<Item = (&'s Relationship, &'s str)> + 's {
        self.cache
            .get(node)
            .into_iter()
            .flatten()
            .filter_map(move |rel| self.step(rel, node).map(|next| (rel, next)))
    }
}

/// Dijkstra frontier entry. Lowest cost first, then earliest insertion.
#[derive(Debug)]
struct Frontier {
    cost: f64,
    seq: usize,
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

/// A Dijkstra label: one way of reaching `node`.
struct Label {
    node: NodeId,
    cost: f64,
    hops: usize,
    prev: Option<(usize, Relationship)>,
}

fn dominated(settled: &[(f64, usize)], cost: f64, hops: usize) -> bool {
    settled.iter().any(|&(c, h)| c <= cost && h <= hops)
}

// ============================================================================
// GraphTraversal
// ============================================================================

/// Path and neighborhood queries over the repository.
#[derive(Clone)]
pub struct GraphTraversal {
    repository: Arc<dyn RelationshipRepository>,
    defaults: TraversalDefaults,
}

impl GraphTraversal {
    /// Create a traversal over `repository`.
    pub fn new(repository: Arc<dyn RelationshipRepository>, defaults: TraversalDefaults) -> Self {
        Self {
            repository,
            defaults,
        }
    }

    /// The configured defaults.
    pub fn defaults(&self) -> &TraversalDefaults {
        &self.defaults
    }

    fn walker(
        &self,
        direction: Direction,
        honor_bidirectional: Option<bool>,
        types: Option<Vec<RelationshipType>>,
    ) -> Walker<'_> {
        Walker::new(
            self.repository.as_ref(),
            direction,
            honor_bidirectional.unwrap_or(self.defaults.honor_bidirectional),
            types,
        )
    }

    /// Find a shortest path from `source_id` to `target_id`.
    ///
    /// Returns `Ok(None)` when no path exists within the hop cutoff.
    pub async fn find_shortest_path(
        &self,
        source_id: &str,
        target_id: &str,
        options: &PathOptions,
    ) -> Result<Option<Path>> {
        if source_id == target_id {
            return Ok(Some(Path::single(source_id)));
        }
        let max_depth = options.max_depth.unwrap_or(self.defaults.max_depth);
        let mut walker = self.walker(
            options.direction,
            options.honor_bidirectional,
            options.relationship_types.clone(),
        );

        log::debug!(
            "shortest path {source_id} -> {target_id} ({:?}, max depth {max_depth})",
            options.algorithm
        );
        match options.algorithm {
            PathAlgorithm::Bfs => bfs(&mut walker, source_id, target_id, max_depth).await,
            PathAlgorithm::Dijkstra => dijkstra(&mut walker, source_id, target_id, max_depth).await,
        }
    }

    /// Enumerate simple paths from `source_id` to `target_id`.
    ///
    /// Depth-first, with the visited set scoped to the current branch.
    /// Results are ordered by hop count (discovery order within a hop
    /// count) and truncated to `max_paths`.
    pub async fn find_all_paths(
        &self,
        source_id: &str,
        target_id: &str,
        options: &AllPathsOptions,
    ) -> Result<Vec<Path>> {
        let max_depth = options.max_depth.unwrap_or(self.defaults.all_paths_max_depth);
        let max_paths = options.max_paths.unwrap_or(self.defaults.all_paths_max_paths);
        if max_paths == 0 {
            return Err(Error::analysis("max_paths must be at least 1"));
        }
        if source_id == target_id {
            return Ok(vec![Path::single(source_id)]);
        }

        let mut walker = self.walker(options.direction, options.honor_bidirectional, None);
        let mut found: Vec<Path> = Vec::new();

        // Each stack entry is a branch: its node sequence and the edges
        // walked. The branch's own nodes are its visited set.
        let mut stack: Vec<(Vec<NodeId>, Vec<Relationship>)> =
            vec![(vec![source_id.to_string()], Vec::new())];

        while let Some((nodes, rels)) = stack.pop() {
            let Some(current) = nodes.last().cloned() else {
                continue;
            };
            if current == target_id {
                let steps = rels.into_iter().zip(nodes.into_iter().skip(1)).collect();
                found.push(Path::from_steps(source_id, steps));
                continue;
            }
            if rels.len() >= max_depth {
                continue;
            }

            walker.load(std::slice::from_ref(&current)).await?;
            let branches: Vec<(Relationship, NodeId)> = walker
                .steps(&current)
                .filter(|(_, next)| !nodes.iter().any(|n| n == next))
                .map(|(rel, next)| (rel.clone(), next.to_string()))
                .collect();

            // Reverse so the first stored edge is explored first.
            for (rel, next) in branches.into_iter().rev() {
                let mut branch_nodes = nodes.clone();
                branch_nodes.push(next);
                let mut branch_rels = rels.clone();
                branch_rels.push(rel);
                stack.push((branch_nodes, branch_rels));
            }
        }

        found.sort_by_key(|p| p.length);
        found.truncate(max_paths);
        log::debug!(
            "found {} path(s) {source_id} -> {target_id} within {max_depth} hops",
            found.len()
        );
        Ok(found)
    }

    /// Expand breadth-first from `node_id` up to `depth` hops.
    pub async fn get_neighborhood(
        &self,
        node_id: &str,
        depth: usize,
        options: &NeighborhoodOptions,
    ) -> Result<Neighborhood> {
        let mut distances = BTreeMap::from([(node_id.to_string(), 0)]);
        let mut nodes = vec![node_id.to_string()];
        let mut edges = Vec::new();
        let mut edge_ids = HashSet::new();

        let mut walker = self.walker(
            options.direction,
            options.honor_bidirectional,
            options.relationship_types.clone(),
        );
        let mut frontier = vec![node_id.to_string()];

        for level in 1..=depth {
            walker.load(&frontier).await?;
            let mut next = Vec::new();
            for current in &frontier {
                for (rel, neighbor) in walker.steps(current) {
                    if options.edge_filter.as_ref().is_some_and(|f| !f(rel)) {
                        continue;
                    }
                    if !distances.contains_key(neighbor) {
                        if options.node_filter.as_ref().is_some_and(|f| !f(neighbor)) {
                            continue;
                        }
                        distances.insert(neighbor.to_string(), level);
                        nodes.push(neighbor.to_string());
                        next.push(neighbor.to_string());
                    }
                    if edge_ids.insert(rel.id.clone()) {
                        edges.push(rel.clone());
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        Ok(Neighborhood {
            center: node_id.to_string(),
            nodes,
            edges,
            distances,
        })
    }
}

async fn bfs(
    walker: &mut Walker<'_>,
    source_id: &str,
    target_id: &str,
    max_depth: usize,
) -> Result<Option<Path>> {
    let mut visited: HashSet<NodeId> = HashSet::from([source_id.to_string()]);
    let mut parent: HashMap<NodeId, (NodeId, Relationship)> = HashMap::new();
    let mut frontier = vec![source_id.to_string()];

    for _ in 0..max_depth {
        walker.load(&frontier).await?;
        let mut next = Vec::new();
        for current in &frontier {
            for (rel, neighbor) in walker.steps(current) {
                if !visited.insert(neighbor.to_string()) {
                    continue;
                }
                parent.insert(neighbor.to_string(), (current.clone(), rel.clone()));
                if neighbor == target_id {
                    return Ok(Some(rebuild(&parent, source_id, target_id)));
                }
                next.push(neighbor.to_string());
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }
    Ok(None)
}

fn rebuild(
    parent: &HashMap<NodeId, (NodeId, Relationship)>,
    source_id: &str,
    target_id: &str,
) -> Path {
    let mut steps = Vec::new();
    let mut current = target_id.to_string();
    while current != source_id {
        let Some((prev, rel)) = parent.get(&current) else {
            break;
        };
        steps.push((rel.clone(), current.clone()));
        current = prev.clone();
    }
    steps.reverse();
    Path::from_steps(source_id, steps)
}

async fn dijkstra(
    walker: &mut Walker<'_>,
    source_id: &str,
    target_id: &str,
    max_depth: usize,
) -> Result<Option<Path>> {
    let mut labels = vec![Label {
        node: source_id.to_string(),
        cost: 0.0,
        hops: 0,
        prev: None,
    }];
    let mut heap = BinaryHeap::from([Frontier { cost: 0.0, seq: 0 }]);
    let mut settled: HashMap<NodeId, Vec<(f64, usize)>> = HashMap::new();

    while let Some(Frontier { seq, .. }) = heap.pop() {
        let (node, cost, hops) = {
            let label = &labels[seq];
            (label.node.clone(), label.cost, label.hops)
        };

        if node == target_id {
            let mut steps = Vec::new();
            let mut at = seq;
            while let Some((prev, rel)) = &labels[at].prev {
                steps.push((rel.clone(), labels[at].node.clone()));
                at = *prev;
            }
            steps.reverse();
            return Ok(Some(Path::from_steps(source_id, steps)));
        }

        let done = settled.entry(node.clone()).or_default();
        if dominated(done, cost, hops) {
            continue;
        }
        done.push((cost, hops));

        if hops >= max_depth {
            continue;
        }

        walker.load(std::slice::from_ref(&node)).await?;
        for (rel, neighbor) in walker.steps(&node) {
            let next_cost = cost + rel.cost();
            if settled
                .get(neighbor)
                .is_some_and(|s| dominated(s, next_cost, hops + 1))
            {
                continue;
            }
            let next_seq = labels.len();
            labels.push(Label {
                node: neighbor.to_string(),
                cost: next_cost,
                hops: hops + 1,
                prev: Some((seq, rel.clone())),
            });
            heap.push(Frontier {
                cost: next_cost,
                seq: next_seq,
            });
        }
    }
    Ok(None)
}

// ============================================================================
// Tests
// ============================================================================
