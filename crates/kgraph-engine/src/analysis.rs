//! Whole-graph statistics, importance ranking, clustering and cycle audit.
//!
//! Each call takes a point-in-time snapshot of the edge set from the
//! repository and builds a petgraph `DiGraph` over the distinct node ids
//! it references. Nothing is cached between calls.
//!
//! Several results are approximate by construction:
//!
//! - Average path length and clustering coefficient are computed on a
//!   random node sample.
//! - Betweenness is ego-network betweenness.
//! - Closeness is harmonic closeness inside a small hop radius.

use kgraph_core::{AnalysisDefaults, Error, NodeId, Result};
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::unionfind::UnionFind;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::repository::RelationshipRepository;
use crate::traversal::{GraphTraversal, NeighborhoodOptions};
use crate::types::{Direction, Relationship, RelationshipType};

// ============================================================================
// Types
// ============================================================================

/// Node counts per total-degree bucket.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DegreeDistribution {
    /// Degree 1.
    #[serde(rename = "1")]
    pub one: usize,
    /// Degree 2 to 5.
    #[serde(rename = "2-5")]
    pub two_to_five: usize,
    /// Degree 6 to 10.
    #[serde(rename = "6-10")]
    pub six_to_ten: usize,
    /// Degree 11 to 50.
    #[serde(rename = "11-50")]
    pub eleven_to_fifty: usize,
    /// Degree above 50.
    #[serde(rename = "51+")]
    pub over_fifty: usize,
}

impl DegreeDistribution {
    fn record(&mut self, degree: usize) {
        match degree {
            0 | 1 => self.one += 1,
            2..=5 => self.two_to_five += 1,
            6..=10 => self.six_to_ten += 1,
            11..=50 => self.eleven_to_fifty += 1,
            _ => self.over_fifty += 1,
        }
    }
}

/// Whole-graph statistics.
///
/// Missing fields deserialize to zero, so an imported document may carry
/// partial or empty statistics.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GraphStatistics {
    /// Distinct node ids referenced by at least one edge.
    pub node_count: usize,
    /// Stored relationships.
    pub edge_count: usize,
    /// `edge_count / (n (n - 1) / 2)`; may exceed 1 in a multigraph.
    pub density: f64,
    /// Mean total (in + out) degree.
    pub average_degree: f64,
    /// Weakly connected components.
    pub connected_components: usize,
    /// Node counts per degree bucket.
    pub degree_distribution: DegreeDistribution,
    /// Edge counts per relationship type name.
    pub relationship_type_counts: BTreeMap<String, usize>,
    /// Mean hop distance between reachable pairs (undirected, sampled).
    pub approximate_average_path_length: f64,
    /// Mean local clustering coefficient (undirected, sampled).
    pub approximate_clustering_coefficient: f64,
    /// Number of nodes the approximations were computed from.
    pub sample_size: usize,
}

/// Options for [`GraphAnalyzer::get_graph_statistics`].
#[derive(Clone, Debug, Default)]
pub struct StatisticsOptions {
    /// Nodes to sample; defaults to `AnalysisDefaults::sample_size`.
    pub sample_size: Option<usize>,
    /// Seed for reproducible sampling.
    pub seed: Option<u64>,
    /// Abort when cancelled.
    pub cancel: Option<CancellationToken>,
}

impl StatisticsOptions {
    /// Set the sample size.
    pub fn sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = Some(sample_size);
        self
    }

    /// Seed the sampler.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Attach a cancellation token.
    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Node importance algorithm.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportanceAlgorithm {
    /// Power-iteration PageRank.
    PageRank,
    /// In + out degree.
    Degree,
    /// Ego-network betweenness (approximate).
    Betweenness,
    /// Harmonic closeness within a local radius (approximate).
    Closeness,
}

impl FromStr for ImportanceAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pagerank" => Ok(Self::PageRank),
            "degree" => Ok(Self::Degree),
            "betweenness" => Ok(Self::Betweenness),
            "closeness" => Ok(Self::Closeness),
            other => Err(Error::analysis(format!(
                "unknown importance algorithm '{other}'"
            ))),
        }
    }
}

/// Options for [`GraphAnalyzer::calculate_node_importance`].
#[derive(Clone, Debug, Default)]
pub struct ImportanceOptions {
    /// Divide every score by the maximum score.
    pub normalized: bool,
    /// PageRank damping; defaults to `AnalysisDefaults::damping_factor`.
    pub damping_factor: Option<f64>,
    /// PageRank iterations; defaults to `AnalysisDefaults::pagerank_iterations`.
    pub iterations: Option<usize>,
    /// Closeness radius; defaults to `AnalysisDefaults::local_radius`.
    pub local_radius: Option<usize>,
    /// Keep only the top `limit` entries.
    pub limit: Option<usize>,
    /// Abort when cancelled.
    pub cancel: Option<CancellationToken>,
}

impl ImportanceOptions {
    /// Normalize scores to `[0, 1]`.
    pub fn normalized(mut self) -> Self {
        self.normalized = true;
        self
    }

    /// Set the PageRank damping factor.
    pub fn damping_factor(mut self, damping: f64) -> Self {
        self.damping_factor = Some(damping);
        self
    }

    /// Set the PageRank iteration count.
    pub fn iterations(mut self, iterations: usize) -> Self {
        self.iterations = Some(iterations);
        self
    }

    /// Set the closeness radius.
    pub fn local_radius(mut self, radius: usize) -> Self {
        self.local_radius = Some(radius);
        self
    }

    /// Keep only the top `limit` entries.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Attach a cancellation token.
    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// One ranked node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeImportance {
    /// The node.
    pub node_id: NodeId,
    /// Algorithm score.
    pub score: f64,
    /// 1-based rank.
    pub rank: usize,
}

/// Community detection algorithm.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommunityAlgorithm {
    /// Weakly connected components (exact).
    #[default]
    ConnectedComponents,
    /// Currently answered with connected components.
    Louvain,
    /// Currently answered with connected components.
    LabelPropagation,
}

impl FromStr for CommunityAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "connected-components" => Ok(Self::ConnectedComponents),
            "louvain" => Ok(Self::Louvain),
            "label-propagation" => Ok(Self::LabelPropagation),
            other => Err(Error::analysis(format!(
                "unknown community algorithm '{other}'"
            ))),
        }
    }
}

/// Options for [`GraphAnalyzer::detect_communities`].
#[derive(Clone, Debug, Default)]
pub struct CommunityOptions {
    /// Drop clusters smaller than this; defaults to
    /// `AnalysisDefaults::min_cluster_size`.
    pub min_size: Option<usize>,
}

/// A group of structurally connected nodes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    /// Position in the result, largest cluster first.
    pub id: usize,
    /// Member nodes, sorted.
    pub nodes: Vec<NodeId>,
    /// Member count.
    pub size: usize,
    /// Edges with both endpoints in the cluster.
    pub edge_count: usize,
    /// `edge_count / (size (size - 1) / 2)`.
    pub density: f64,
    /// Most frequent relationship type inside the cluster.
    pub dominant_type: Option<RelationshipType>,
}

/// Options for [`GraphAnalyzer::detect_cycles`].
#[derive(Clone, Debug, Default)]
pub struct CycleOptions {
    /// Longest cycle (in nodes) to list; defaults to
    /// `AnalysisDefaults::cycle_max_depth`.
    pub max_depth: Option<usize>,
    /// Most cycles to list; defaults to `AnalysisDefaults::max_cycles`.
    pub max_cycles: Option<usize>,
    /// Abort when cancelled.
    pub cancel: Option<CancellationToken>,
}

/// Result of a cycle audit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    /// Whether the directed edge set contains any cycle.
    pub has_cycles: bool,
    /// Cycles found within the search bounds, each without the closing
    /// repeat of its first node.
    pub cycles: Vec<Vec<NodeId>>,
}

// ============================================================================
// Snapshot
// ============================================================================

/// Indexed view of one edge set.
struct Snapshot {
    graph: DiGraph<NodeId, RelationshipType>,
    /// Distinct out-neighbors per node, in storage order.
    out: Vec<Vec<usize>>,
    /// Distinct neighbors ignoring direction.
    undirected: Vec<BTreeSet<usize>>,
}

impl Snapshot {
    fn build(edges: &[Relationship]) -> Self {
        let mut graph = DiGraph::new();
        let mut index: HashMap<&str, NodeIndex> = HashMap::new();
        let mut ends = Vec::with_capacity(edges.len());

        for rel in edges {
            let s = *index
                .entry(rel.source_id.as_str())
                .or_insert_with(|| graph.add_node(rel.source_id.clone()));
            let t = *index
                .entry(rel.target_id.as_str())
                .or_insert_with(|| graph.add_node(rel.target_id.clone()));
            graph.add_edge(s, t, rel.relationship_type);
            ends.push((s.index(), t.index()));
        }

        let n = graph.node_count();
        let mut out: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut undirected = vec![BTreeSet::new(); n];
        for (s, t) in ends {
            if !out[s].contains(&t) {
                out[s].push(t);
            }
            undirected[s].insert(t);
            undirected[t].insert(s);
        }

        Self {
            graph,
            out,
            undirected,
        }
    }

    fn len(&self) -> usize {
        self.graph.node_count()
    }

    fn id(&self, i: usize) -> &NodeId {
        &self.graph[NodeIndex::new(i)]
    }

    /// Total degree counting parallel edges.
    fn degree(&self, i: usize) -> usize {
        let node = NodeIndex::new(i);
        self.graph
            .neighbors_directed(node, petgraph::Direction::Outgoing)
            .count()
            + self
                .graph
                .neighbors_directed(node, petgraph::Direction::Incoming)
                .count()
    }

    fn component_labels(&self) -> Vec<usize> {
        let mut uf = UnionFind::new(self.len());
        for edge in self.graph.raw_edges() {
            uf.union(edge.source().index(), edge.target().index());
        }
        uf.into_labeling()
    }

    /// Hop distances from `start` ignoring direction.
    fn distances_from(&self, start: usize) -> Vec<Option<usize>> {
        let mut dist = vec![None; self.len()];
        dist[start] = Some(0);
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            let d = dist[node].unwrap_or(0);
            for &next in &self.undirected[node] {
                if dist[next].is_none() {
                    dist[next] = Some(d + 1);
                    queue.push_back(next);
                }
            }
        }
        dist
    }

    fn local_clustering(&self, i: usize) -> f64 {
        let neighbors: Vec<usize> = self.undirected[i].iter().copied().collect();
        let k = neighbors.len();
        if k < 2 {
            return 0.0;
        }
        let mut links = 0usize;
        for (a_pos, &a) in neighbors.iter().enumerate() {
            for &b in &neighbors[a_pos + 1..] {
                if self.undirected[a].contains(&b) {
                    links += 1;
                }
            }
        }
        links as f64 / (k * (k - 1) / 2) as f64
    }

    /// Ego-network betweenness: for every pair of non-adjacent neighbors,
    /// the share of their two-step connections that pass through `i`.
    fn ego_betweenness(&self, i: usize) -> f64 {
        let neighbors: Vec<usize> = self.undirected[i].iter().copied().collect();
        let mut score = 0.0;
        for (a_pos, &a) in neighbors.iter().enumerate() {
            for &b in &neighbors[a_pos + 1..] {
                if self.undirected[a].contains(&b) {
                    continue;
                }
                let brokers = self.undirected[a]
                    .intersection(&self.undirected[b])
                    .filter(|&&c| c == i || self.undirected[i].contains(&c))
                    .count();
                if brokers > 0 {
                    score += 1.0 / brokers as f64;
                }
            }
        }
        score
    }
}

fn check_cancelled(cancel: &Option<CancellationToken>) -> Result<()> {
    match cancel {
        Some(token) if token.is_cancelled() => Err(Error::analysis("cancelled")),
        _ => Ok(()),
    }
}

/// Sort by score descending then node id, assign ranks, truncate.
fn rank(scores: Vec<(NodeId, f64)>, normalized: bool, limit: Option<usize>) -> Vec<NodeImportance> {
    let max = scores.iter().map(|(_, s)| *s).fold(0.0_f64, f64::max);
    let mut ranked: Vec<NodeImportance> = scores
        .into_iter()
        .map(|(node_id, score)| NodeImportance {
            node_id,
            score: if normalized && max > 0.0 {
                score / max
            } else {
                score
            },
            rank: 0,
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.node_id.cmp(&b.node_id))
    });
    if let Some(limit) = limit {
        ranked.truncate(limit);
    }
    for (i, entry) in ranked.iter_mut().enumerate() {
        entry.rank = i + 1;
    }
    ranked
}

// ============================================================================
// GraphAnalyzer
// ============================================================================

/// Structural analysis over the repository's edge set.
#[derive(Clone)]
pub struct GraphAnalyzer {
    repository: Arc<dyn RelationshipRepository>,
    traversal: GraphTraversal,
    defaults: AnalysisDefaults,
}

impl GraphAnalyzer {
    /// Create an analyzer.
    pub fn new(
        repository: Arc<dyn RelationshipRepository>,
        traversal: GraphTraversal,
        defaults: AnalysisDefaults,
    ) -> Self {
        Self {
            repository,
            traversal,
            defaults,
        }
    }

    async fn snapshot(&self) -> Result<(Vec<Relationship>, Snapshot)> {
        let edges = self.repository.all().await?;
        let snapshot = Snapshot::build(&edges);
        log::debug!(
            "analysis snapshot: {} nodes, {} edges",
            snapshot.len(),
            edges.len()
        );
        Ok((edges, snapshot))
    }

    // ------------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------------

    /// Statistics over the current edge set.
    pub async fn get_graph_statistics(
        &self,
        options: &StatisticsOptions,
    ) -> Result<GraphStatistics> {
        let edges = self.repository.all().await?;
        self.compute_statistics(&edges, options)
    }

    /// Statistics over an explicit edge set.
    pub fn compute_statistics(
        &self,
        edges: &[Relationship],
        options: &StatisticsOptions,
    ) -> Result<GraphStatistics> {
        let sample_size = options.sample_size.unwrap_or(self.defaults.sample_size);
        if sample_size == 0 {
            return Err(Error::analysis("sample_size must be at least 1"));
        }
        check_cancelled(&options.cancel)?;

        let snapshot = Snapshot::build(edges);
        let n = snapshot.len();
        let edge_count = edges.len();

        let density = if n > 1 {
            edge_count as f64 / (n * (n - 1) / 2) as f64
        } else {
            0.0
        };
        let average_degree = if n > 0 {
            2.0 * edge_count as f64 / n as f64
        } else {
            0.0
        };

        let mut degree_distribution = DegreeDistribution::default();
        for i in 0..n {
            degree_distribution.record(snapshot.degree(i));
        }

        let mut relationship_type_counts = BTreeMap::new();
        for rel in edges {
            *relationship_type_counts
                .entry(rel.relationship_type.name().to_string())
                .or_insert(0) += 1;
        }

        let labels = snapshot.component_labels();
        let connected_components = labels.iter().collect::<BTreeSet<_>>().len();

        // Sampled approximations.
        let mut sample: Vec<usize> = (0..n).collect();
        if n > sample_size {
            let mut rng = match options.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            sample = sample
                .choose_multiple(&mut rng, sample_size)
                .copied()
                .collect();
        }

        let mut path_total = 0usize;
        let mut path_pairs = 0usize;
        let mut clustering_total = 0.0;
        for &node in &sample {
            check_cancelled(&options.cancel)?;
            for d in snapshot.distances_from(node).into_iter().flatten() {
                if d > 0 {
                    path_total += d;
                    path_pairs += 1;
                }
            }
            clustering_total += snapshot.local_clustering(node);
        }

        let approximate_average_path_length = if path_pairs > 0 {
            path_total as f64 / path_pairs as f64
        } else {
            0.0
        };
        let approximate_clustering_coefficient = if sample.is_empty() {
            0.0
        } else {
            clustering_total / sample.len() as f64
        };

        Ok(GraphStatistics {
            node_count: n,
            edge_count,
            density,
            average_degree,
            connected_components,
            degree_distribution,
            relationship_type_counts,
            approximate_average_path_length,
            approximate_clustering_coefficient,
            sample_size: sample.len(),
        })
    }

    // ------------------------------------------------------------------------
    // Importance
    // ------------------------------------------------------------------------

    /// Rank nodes by structural importance.
    pub async fn calculate_node_importance(
        &self,
        algorithm: ImportanceAlgorithm,
        options: &ImportanceOptions,
    ) -> Result<Vec<NodeImportance>> {
        let damping = options.damping_factor.unwrap_or(self.defaults.damping_factor);
        let iterations = options
            .iterations
            .unwrap_or(self.defaults.pagerank_iterations);
        if !(damping > 0.0 && damping < 1.0) {
            return Err(Error::analysis(format!(
                "damping_factor must be in (0, 1), got {damping}"
            )));
        }
        if iterations == 0 {
            return Err(Error::analysis("iterations must be at least 1"));
        }
        check_cancelled(&options.cancel)?;

        let (_, snapshot) = self.snapshot().await?;
        let n = snapshot.len();

        let scores: Vec<f64> = match algorithm {
            ImportanceAlgorithm::PageRank => {
                pagerank(&snapshot, damping, iterations, &options.cancel)?
            }
            ImportanceAlgorithm::Degree => (0..n).map(|i| snapshot.degree(i) as f64).collect(),
            ImportanceAlgorithm::Betweenness => {
                let mut scores = Vec::with_capacity(n);
                for i in 0..n {
                    check_cancelled(&options.cancel)?;
                    scores.push(snapshot.ego_betweenness(i));
                }
                scores
            }
            ImportanceAlgorithm::Closeness => {
                let radius = options.local_radius.unwrap_or(self.defaults.local_radius);
                let neighborhood = NeighborhoodOptions::default().direction(Direction::Both);
                let mut scores = Vec::with_capacity(n);
                for i in 0..n {
                    check_cancelled(&options.cancel)?;
                    let hood = self
                        .traversal
                        .get_neighborhood(snapshot.id(i), radius, &neighborhood)
                        .await?;
                    let harmonic: f64 = hood
                        .distances
                        .values()
                        .filter(|&&d| d > 0)
                        .map(|&d| 1.0 / d as f64)
                        .sum();
                    scores.push(harmonic);
                }
                scores
            }
        };

        let scores = scores
            .into_iter()
            .enumerate()
            .map(|(i, s)| (snapshot.id(i).clone(), s))
            .collect();
        let ranked = rank(scores, options.normalized, options.limit);
        log::debug!("{algorithm:?} importance ranked {} node(s)", ranked.len());
        Ok(ranked)
    }

    // ------------------------------------------------------------------------
    // Communities
    // ------------------------------------------------------------------------

    /// Group nodes into clusters.
    pub async fn detect_communities(
        &self,
        algorithm: CommunityAlgorithm,
        options: &CommunityOptions,
    ) -> Result<Vec<Cluster>> {
        if algorithm != CommunityAlgorithm::ConnectedComponents {
            log::warn!(
                "community algorithm {algorithm:?} is answered with connected components"
            );
        }
        let min_size = options.min_size.unwrap_or(self.defaults.min_cluster_size);

        let (edges, snapshot) = self.snapshot().await?;
        let labels = snapshot.component_labels();

        let mut members: BTreeMap<usize, Vec<NodeId>> = BTreeMap::new();
        for (i, label) in labels.iter().enumerate() {
            members
                .entry(*label)
                .or_default()
                .push(snapshot.id(i).clone());
        }

        let position: HashMap<&str, usize> = (0..snapshot.len())
            .map(|i| (snapshot.id(i).as_str(), i))
            .collect();
        let mut type_counts: HashMap<usize, BTreeMap<RelationshipType, usize>> = HashMap::new();
        for rel in &edges {
            if let Some(&s) = position.get(rel.source_id.as_str()) {
                *type_counts
                    .entry(labels[s])
                    .or_default()
                    .entry(rel.relationship_type)
                    .or_insert(0) += 1;
            }
        }

        let mut clusters: Vec<Cluster> = members
            .into_iter()
            .filter(|(_, nodes)| nodes.len() >= min_size)
            .map(|(label, mut nodes)| {
                nodes.sort();
                let size = nodes.len();
                let counts = type_counts.remove(&label).unwrap_or_default();
                let edge_count: usize = counts.values().sum();
                let dominant_type = counts
                    .iter()
                    .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
                    .map(|(t, _)| *t);
                Cluster {
                    id: 0,
                    nodes,
                    size,
                    edge_count,
                    density: if size > 1 {
                        edge_count as f64 / (size * (size - 1) / 2) as f64
                    } else {
                        0.0
                    },
                    dominant_type,
                }
            })
            .collect();

        clusters.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.nodes.cmp(&b.nodes)));
        for (i, cluster) in clusters.iter_mut().enumerate() {
            cluster.id = i;
        }
        Ok(clusters)
    }

    // ------------------------------------------------------------------------
    // Cycles
    // ------------------------------------------------------------------------

    /// Audit the whole edge set for directed cycles, regardless of type.
    pub async fn detect_cycles(&self, options: &CycleOptions) -> Result<CycleReport> {
        let max_depth = options.max_depth.unwrap_or(self.defaults.cycle_max_depth);
        let max_cycles = options.max_cycles.unwrap_or(self.defaults.max_cycles);
        check_cancelled(&options.cancel)?;

        let (_, snapshot) = self.snapshot().await?;
        let has_cycles = is_cyclic_directed(&snapshot.graph);
        if !has_cycles {
            return Ok(CycleReport::default());
        }

        let n = snapshot.len();
        let mut found: Vec<Vec<usize>> = Vec::new();
        let mut on_path = vec![false; n];

        // Cycles are listed from their smallest-index node, walking only
        // through larger indices, so each is reported once.
        'starts: for start in 0..n {
            check_cancelled(&options.cancel)?;
            let mut path = vec![start];
            on_path[start] = true;
            let mut stack: Vec<(usize, usize)> = vec![(start, 0)];

            while let Some(top) = stack.last_mut() {
                if found.len() >= max_cycles {
                    break 'starts;
                }
                let (node, next_pos) = *top;
                let Some(&next) = snapshot.out[node].get(next_pos) else {
                    stack.pop();
                    path.pop();
                    on_path[node] = false;
                    continue;
                };
                top.1 += 1;

                if next == start {
                    found.push(path.clone());
                } else if next > start && !on_path[next] && path.len() < max_depth {
                    path.push(next);
                    on_path[next] = true;
                    stack.push((next, 0));
                }
            }
        }

        let cycles = found
            .into_iter()
            .map(|cycle| cycle.into_iter().map(|i| snapshot.id(i).clone()).collect())
            .collect();
        Ok(CycleReport { has_cycles, cycles })
    }
}

fn pagerank(
    snapshot: &Snapshot,
    damping: f64,
    iterations: usize,
    cancel: &Option<CancellationToken>,
) -> Result<Vec<f64>> {
    let n = snapshot.len();
    if n == 0 {
        return Ok(Vec::new());
    }
    let graph = &snapshot.graph;
    let out_degree: Vec<usize> = graph
        .node_indices()
        .map(|i| {
            graph
                .neighbors_directed(i, petgraph::Direction::Outgoing)
                .count()
        })
        .collect();

    let base = (1.0 - damping) / n as f64;
    let mut rank = vec![1.0 / n as f64; n];

    for _ in 0..iterations {
        check_cancelled(cancel)?;
        let dangling: f64 = (0..n).filter(|&i| out_degree[i] == 0).map(|i| rank[i]).sum();
        let mut next = vec![base + damping * dangling / n as f64; n];
        for edge in graph.raw_edges() {
            let s = edge.source().index();
            next[edge.target().index()] += damping * rank[s] / out_degree[s] as f64;
        }
        rank = next;
    }
    Ok(rank)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRelationshipRepository;
    use crate::types::NewRelationship;
    use chrono::Utc;
    use kgraph_core::TraversalDefaults;

    fn rel(s: &str, t: &str, ty: RelationshipType) -> Relationship {
        NewRelationship::new(s, t, ty).into_relationship(Utc::now())
    }

    fn analyzer(edges: Vec<Relationship>) -> GraphAnalyzer {
        let repo: Arc<dyn RelationshipRepository> =
            Arc::new(InMemoryRelationshipRepository::with_relationships(edges).unwrap());
        let traversal = GraphTraversal::new(repo.clone(), TraversalDefaults::default());
        GraphAnalyzer::new(repo, traversal, AnalysisDefaults::default())
    }

    fn star() -> GraphAnalyzer {
        analyzer(vec![
            rel("C", "L1", RelationshipType::RelatedTo),
            rel("C", "L2", RelationshipType::RelatedTo),
        ])
    }

    fn score(ranked: &[NodeImportance], id: &str) -> f64 {
        ranked.iter().find(|n| n.node_id == id).unwrap().score
    }

    // ------------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_statistics_counts() {
        let a = analyzer(vec![
            rel("a", "b", RelationshipType::RelatedTo),
            rel("b", "c", RelationshipType::References),
            rel("a", "b", RelationshipType::Supports),
            rel("x", "y", RelationshipType::RelatedTo),
        ]);
        let stats = a
            .get_graph_statistics(&StatisticsOptions::default())
            .await
            .unwrap();

        assert_eq!(stats.node_count, 5);
        assert_eq!(stats.edge_count, 4);
        assert_eq!(stats.connected_components, 2);
        assert!((stats.density - 0.4).abs() < 1e-12);
        assert!((stats.average_degree - 1.6).abs() < 1e-12);
        assert_eq!(stats.relationship_type_counts["related_to"], 2);
        assert_eq!(stats.relationship_type_counts["references"], 1);
        assert_eq!(stats.degree_distribution.one, 3);
        assert_eq!(stats.degree_distribution.two_to_five, 2);
        assert_eq!(stats.sample_size, 5);
    }

    #[tokio::test]
    async fn test_statistics_empty_graph() {
        let stats = analyzer(Vec::new())
            .get_graph_statistics(&StatisticsOptions::default())
            .await
            .unwrap();
        assert_eq!(stats, GraphStatistics::default());
    }

    #[tokio::test]
    async fn test_statistics_path_length_and_clustering() {
        let a = analyzer(vec![
            rel("a", "b", RelationshipType::RelatedTo),
            rel("b", "c", RelationshipType::RelatedTo),
            rel("c", "a", RelationshipType::RelatedTo),
        ]);
        let stats = a
            .get_graph_statistics(&StatisticsOptions::default())
            .await
            .unwrap();

        assert!((stats.approximate_average_path_length - 1.0).abs() < 1e-12);
        assert!((stats.approximate_clustering_coefficient - 1.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_statistics_sampling_is_seedable() {
        let edges: Vec<Relationship> = (0..30)
            .map(|i| rel(&format!("n{i}"), &format!("n{}", i + 1), RelationshipType::RelatedTo))
            .collect();
        let a = analyzer(edges);
        let options = StatisticsOptions::default().sample_size(5).seed(7);

        let first = a.get_graph_statistics(&options).await.unwrap();
        let second = a.get_graph_statistics(&options).await.unwrap();

        assert_eq!(first.sample_size, 5);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_statistics_rejects_zero_sample() {
        let err = star()
            .get_graph_statistics(&StatisticsOptions::default().sample_size(0))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ANALYSIS_ERROR");
    }

    #[tokio::test]
    async fn test_cancelled_statistics() {
        let token = CancellationToken::new();
        token.cancel();
        let err = star()
            .get_graph_statistics(&StatisticsOptions::default().cancel(token))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), Error::analysis("cancelled").to_string());
    }

    // ------------------------------------------------------------------------
    // Importance
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_degree_normalized_star() {
        let ranked = star()
            .calculate_node_importance(
                ImportanceAlgorithm::Degree,
                &ImportanceOptions::default().normalized(),
            )
            .await
            .unwrap();

        assert_eq!(ranked[0].node_id, "C");
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(score(&ranked, "C"), 1.0);
        assert_eq!(score(&ranked, "L1"), 0.5);
        assert_eq!(score(&ranked, "L2"), 0.5);
        assert_eq!(ranked[1].node_id, "L1");
    }

    #[tokio::test]
    async fn test_pagerank_favours_sink() {
        let a = analyzer(vec![
            rel("a", "hub", RelationshipType::References),
            rel("b", "hub", RelationshipType::References),
            rel("c", "hub", RelationshipType::References),
        ]);
        let ranked = a
            .calculate_node_importance(ImportanceAlgorithm::PageRank, &ImportanceOptions::default())
            .await
            .unwrap();

        assert_eq!(ranked[0].node_id, "hub");
        let total: f64 = ranked.iter().map(|r| r.score).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_pagerank_rejects_bad_damping() {
        let err = star()
            .calculate_node_importance(
                ImportanceAlgorithm::PageRank,
                &ImportanceOptions::default().damping_factor(1.0),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ANALYSIS_ERROR");
    }

    #[tokio::test]
    async fn test_betweenness_ego_proxy() {
        let ranked = star()
            .calculate_node_importance(
                ImportanceAlgorithm::Betweenness,
                &ImportanceOptions::default(),
            )
            .await
            .unwrap();

        // L1 and L2 only connect through C.
        assert_eq!(score(&ranked, "C"), 1.0);
        assert_eq!(score(&ranked, "L1"), 0.0);
    }

    #[tokio::test]
    async fn test_closeness_local_proxy() {
        let a = analyzer(vec![
            rel("a", "b", RelationshipType::RelatedTo),
            rel("b", "c", RelationshipType::RelatedTo),
        ]);
        let ranked = a
            .calculate_node_importance(ImportanceAlgorithm::Closeness, &ImportanceOptions::default())
            .await
            .unwrap();

        assert_eq!(ranked[0].node_id, "b");
        assert!((score(&ranked, "b") - 2.0).abs() < 1e-12);
        assert!((score(&ranked, "a") - 1.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_importance_limit() {
        let ranked = star()
            .calculate_node_importance(
                ImportanceAlgorithm::Degree,
                &ImportanceOptions::default().limit(1),
            )
            .await
            .unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].node_id, "C");
    }

    // ------------------------------------------------------------------------
    // Communities
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_connected_components() {
        let a = analyzer(vec![
            rel("a", "b", RelationshipType::Supports),
            rel("b", "c", RelationshipType::Supports),
            rel("c", "a", RelationshipType::Contradicts),
            rel("x", "y", RelationshipType::RelatedTo),
        ]);
        let clusters = a
            .detect_communities(CommunityAlgorithm::ConnectedComponents, &CommunityOptions::default())
            .await
            .unwrap();

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].id, 0);
        assert_eq!(clusters[0].nodes, vec!["a", "b", "c"]);
        assert_eq!(clusters[0].edge_count, 3);
        assert!((clusters[0].density - 1.0).abs() < 1e-12);
        assert_eq!(clusters[0].dominant_type, Some(RelationshipType::Supports));
        assert_eq!(clusters[1].size, 2);
    }

    #[tokio::test]
    async fn test_min_cluster_size_filter() {
        let a = analyzer(vec![
            rel("a", "b", RelationshipType::Supports),
            rel("b", "c", RelationshipType::Supports),
            rel("x", "y", RelationshipType::RelatedTo),
        ]);
        let clusters = a
            .detect_communities(
                CommunityAlgorithm::ConnectedComponents,
                &CommunityOptions { min_size: Some(3) },
            )
            .await
            .unwrap();
        assert_eq!(clusters.len(), 1);
    }

    #[tokio::test]
    async fn test_louvain_matches_connected_components() {
        let a = analyzer(vec![
            rel("a", "b", RelationshipType::Supports),
            rel("x", "y", RelationshipType::RelatedTo),
        ]);
        let components = a
            .detect_communities(CommunityAlgorithm::ConnectedComponents, &CommunityOptions::default())
            .await
            .unwrap();
        let louvain = a
            .detect_communities(CommunityAlgorithm::Louvain, &CommunityOptions::default())
            .await
            .unwrap();
        assert_eq!(components, louvain);
    }

    // ------------------------------------------------------------------------
    // Cycles
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_acyclic_graph() {
        let report = star().detect_cycles(&CycleOptions::default()).await.unwrap();
        assert!(!report.has_cycles);
        assert!(report.cycles.is_empty());
    }

    #[tokio::test]
    async fn test_cycles_listed_once_across_types() {
        let a = analyzer(vec![
            rel("a", "b", RelationshipType::RelatedTo),
            rel("b", "c", RelationshipType::Supports),
            rel("c", "a", RelationshipType::References),
            rel("b", "a", RelationshipType::ParentChild),
        ]);
        let report = a.detect_cycles(&CycleOptions::default()).await.unwrap();

        assert!(report.has_cycles);
        assert_eq!(
            report.cycles,
            vec![vec!["a", "b", "c"], vec!["a", "b"]]
        );
    }

    #[tokio::test]
    async fn test_cycle_listing_is_bounded() {
        let a = analyzer(vec![
            rel("a", "b", RelationshipType::RelatedTo),
            rel("b", "c", RelationshipType::RelatedTo),
            rel("c", "a", RelationshipType::RelatedTo),
        ]);
        let report = a
            .detect_cycles(&CycleOptions {
                max_depth: Some(2),
                ..CycleOptions::default()
            })
            .await
            .unwrap();

        // The cycle exists but is longer than the listing bound.
        assert!(report.has_cycles);
        assert!(report.cycles.is_empty());
    }

    #[test]
    fn test_algorithm_names() {
        assert_eq!(
            "pagerank".parse::<ImportanceAlgorithm>().unwrap(),
            ImportanceAlgorithm::PageRank
        );
        assert_eq!(
            "label-propagation".parse::<CommunityAlgorithm>().unwrap(),
            CommunityAlgorithm::LabelPropagation
        );
        assert!("eigenvector".parse::<ImportanceAlgorithm>().is_err());
    }
}
