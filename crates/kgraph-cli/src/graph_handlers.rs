//! Handler functions for graph CLI commands.
//!
//! Each handler runs one relationship-service operation and prints the
//! outcome. Opening and saving the snapshot is the caller's job; see
//! [`open_service`] and [`save_service`].

use crate::cli::{AddArgs, ListArgs, UpdateArgs};
use kgraph_core::{EngineConfig, Error, Result, ViolationCode};
use kgraph_engine::{
    AllPathsOptions, AllowAllNodes, CommunityAlgorithm, CommunityOptions, CycleOptions, Direction,
    EventSink, ExportFormat, ImportanceAlgorithm, ImportanceOptions, InMemoryRelationshipRepository,
    LogEventSink, NeighborhoodOptions, NodeRegistry, Path as GraphPath, PathAlgorithm, PathOptions,
    Relationship, RelationshipFilter, RelationshipRepository, RelationshipService,
    RelationshipType, StatisticsOptions, load_snapshot, save_snapshot,
};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;

// ============================================================================
// Snapshot plumbing
// ============================================================================

/// Build a service over the snapshot at `path`; a missing file is an
/// empty graph.
pub fn open_service(config: &EngineConfig, path: &Path) -> Result<RelationshipService> {
    let relationships = if path.exists() {
        load_snapshot(path)?.relationships
    } else {
        log::debug!("no snapshot at {}, starting empty", path.display());
        Vec::new()
    };
    log::debug!(
        "loaded {} relationship(s) from {}",
        relationships.len(),
        path.display()
    );

    let repository: Arc<dyn RelationshipRepository> =
        Arc::new(InMemoryRelationshipRepository::with_relationships(relationships)?);
    let nodes: Arc<dyn NodeRegistry> = Arc::new(AllowAllNodes);
    let events: Arc<dyn EventSink> = Arc::new(LogEventSink);
    Ok(RelationshipService::new(repository, nodes, events, config))
}

/// Write the service's current relationships back to `path`.
pub async fn save_service(service: &RelationshipService, path: &Path) -> Result<()> {
    let export = service.export_snapshot().await?;
    save_snapshot(&export, path)
}

/// Parse a JSON command-line argument.
fn parse_json_arg(field: &str, raw: &str) -> Result<Value> {
    serde_json::from_str(raw).map_err(|e| {
        Error::invalid(
            field,
            ViolationCode::InvalidType,
            format!("{field} is not valid JSON: {e}"),
        )
    })
}

fn print_relationship(rel: &Relationship) {
    println!("  {}  {}  weight={:.2}", rel.id, rel.describe(), rel.weight);
}

// ============================================================================
// Writes
// ============================================================================

/// Create one relationship.
pub async fn handle_add(service: &RelationshipService, args: AddArgs) -> Result<Relationship> {
    let mut input = json!({
        "sourceId": args.source,
        "targetId": args.target,
        "type": args.relationship_type,
        "bidirectional": args.bidirectional,
    });
    if let Some(weight) = args.weight {
        input["weight"] = json!(weight);
    }
    if let Some(raw) = args.metadata.as_deref() {
        input["metadata"] = parse_json_arg("metadata", raw)?;
    }

    let new = service.validator().parse_create(&input)?;
    let created = service.create_relationship(new).await?;
    println!("Created {} ({})", created.describe(), created.id);
    Ok(created)
}

/// Apply a partial update.
pub async fn handle_update(
    service: &RelationshipService,
    args: UpdateArgs,
) -> Result<Relationship> {
    let mut input = json!({});
    if let Some(weight) = args.weight {
        input["weight"] = json!(weight);
    }
    if let Some(bidirectional) = args.bidirectional {
        input["bidirectional"] = json!(bidirectional);
    }
    if let Some(raw) = args.metadata.as_deref() {
        input["metadata"] = parse_json_arg("metadata", raw)?;
    }

    let update = service.validator().parse_update(&input)?;
    let updated = service.update_relationship(&args.id, update).await?;
    println!("Updated {} ({})", updated.describe(), updated.id);
    Ok(updated)
}

/// Delete relationships. A single id fails loudly; several ids are
/// deleted independently and failures are reported.
pub async fn handle_remove(service: &RelationshipService, ids: Vec<String>) -> Result<usize> {
    if let [id] = ids.as_slice() {
        let deleted = service.delete_relationship(id).await?;
        println!("Deleted {} ({})", deleted.describe(), deleted.id);
        return Ok(1);
    }

    let result = service.bulk_delete(ids).await;
    println!("Deleted {} relationship(s)", result.succeeded.len());
    for failure in &result.failed {
        println!(
            "  FAILED [{}] {}: {}",
            failure.code,
            failure.id.as_deref().unwrap_or("?"),
            failure.message
        );
    }
    Ok(result.succeeded.len())
}

/// Import a JSON file: an array is bulk-created, an export document is
/// imported atomically.
pub async fn handle_import(service: &RelationshipService, file: &Path) -> Result<usize> {
    let text = std::fs::read_to_string(file)?;
    let value: Value = serde_json::from_str(&text)?;

    match value {
        Value::Array(_) => {
            let result = service.bulk_create_json(&value).await?;
            println!(
                "Imported {} relationship(s), {} failed",
                result.succeeded.len(),
                result.failed.len()
            );
            for failure in &result.failed {
                println!(
                    "  FAILED [{}] item {}: {}",
                    failure.code, failure.index, failure.message
                );
            }
            Ok(result.succeeded.len())
        }
        Value::Object(_) => {
            let count = service.import_graph_data(&text).await?;
            println!("Imported {count} relationship(s) from export document");
            Ok(count)
        }
        _ => Err(Error::invalid(
            "",
            ViolationCode::InvalidType,
            "import file must hold a JSON array or an export document",
        )),
    }
}

// ============================================================================
// Reads
// ============================================================================

/// Show one relationship as JSON.
pub async fn handle_get(service: &RelationshipService, id: &str) -> Result<()> {
    let rel = service.get_relationship(id).await?;
    println!("{}", serde_json::to_string_pretty(&rel)?);
    Ok(())
}

/// List relationships matching a filter.
pub async fn handle_list(service: &RelationshipService, args: ListArgs) -> Result<usize> {
    let filter = RelationshipFilter {
        source_id: args.source,
        target_id: args.target,
        relationship_type: args.relationship_type,
        min_weight: args.min_weight,
        max_weight: args.max_weight,
        limit: args.limit,
        offset: args.offset,
    };
    let relationships = service.find_relationships(&filter).await?;
    for rel in &relationships {
        print_relationship(rel);
    }
    println!("{} relationship(s)", relationships.len());
    Ok(relationships.len())
}

// ============================================================================
// Analysis
// ============================================================================

/// Show graph statistics.
pub async fn handle_stats(
    service: &RelationshipService,
    sample_size: Option<usize>,
    seed: Option<u64>,
) -> Result<()> {
    let options = StatisticsOptions {
        sample_size,
        seed,
        ..StatisticsOptions::default()
    };
    let stats = service.analyzer().get_graph_statistics(&options).await?;

    println!("Graph Statistics");
    println!("================");
    println!("Nodes:          {}", stats.node_count);
    println!("Edges:          {}", stats.edge_count);
    println!("Density:        {:.4}", stats.density);
    println!("Avg degree:     {:.2}", stats.average_degree);
    println!("Components:     {}", stats.connected_components);
    println!(
        "Avg path len:   {:.2} (sampled {} node(s))",
        stats.approximate_average_path_length, stats.sample_size
    );
    println!(
        "Clustering:     {:.4}",
        stats.approximate_clustering_coefficient
    );

    let degrees = &stats.degree_distribution;
    println!("\nDegree distribution:");
    println!("  1:     {}", degrees.one);
    println!("  2-5:   {}", degrees.two_to_five);
    println!("  6-10:  {}", degrees.six_to_ten);
    println!("  11-50: {}", degrees.eleven_to_fifty);
    println!("  51+:   {}", degrees.over_fifty);

    if !stats.relationship_type_counts.is_empty() {
        println!("\nRelationships:");
        let mut counts: Vec<_> = stats.relationship_type_counts.iter().collect();
        counts.sort_by(|a, b| b.1.cmp(a.1));
        for (name, count) in counts {
            println!("  {name}: {count}");
        }
    }

    Ok(())
}

fn print_path(path: &GraphPath) {
    println!(
        "  {} (length {}, weight {:.2}, cost {:.2})",
        path.nodes.join(" -> "),
        path.length,
        path.total_weight,
        path.total_cost
    );
}

/// Find the shortest path between two nodes.
pub async fn handle_path(
    service: &RelationshipService,
    from: &str,
    to: &str,
    algorithm: PathAlgorithm,
    max_depth: Option<usize>,
    direction: Direction,
) -> Result<Option<GraphPath>> {
    let options = PathOptions {
        algorithm,
        max_depth,
        direction,
        ..PathOptions::default()
    };
    let path = service
        .traversal()
        .find_shortest_path(from, to, &options)
        .await?;

    match &path {
        Some(path) => {
            println!("Shortest path from {from} to {to}:");
            print_path(path);
        }
        None => println!("No path from {from} to {to}"),
    }
    Ok(path)
}

/// Enumerate simple paths between two nodes.
pub async fn handle_paths(
    service: &RelationshipService,
    from: &str,
    to: &str,
    max_depth: Option<usize>,
    max_paths: Option<usize>,
    direction: Direction,
) -> Result<usize> {
    let options = AllPathsOptions {
        max_depth,
        max_paths,
        direction,
        ..AllPathsOptions::default()
    };
    let paths = service
        .traversal()
        .find_all_paths(from, to, &options)
        .await?;

    println!("{} path(s) from {from} to {to}:", paths.len());
    for path in &paths {
        print_path(path);
    }
    Ok(paths.len())
}

/// Show the neighborhood of a node.
pub async fn handle_neighborhood(
    service: &RelationshipService,
    node: &str,
    depth: Option<usize>,
    direction: Direction,
    types: Vec<RelationshipType>,
) -> Result<usize> {
    let depth = depth.unwrap_or(service.traversal().defaults().neighborhood_depth);
    let mut options = NeighborhoodOptions::default().direction(direction);
    if !types.is_empty() {
        options = options.relationship_types(types);
    }
    let hood = service
        .traversal()
        .get_neighborhood(node, depth, &options)
        .await?;

    println!("Neighborhood of {node} (depth {depth}):");
    for id in &hood.nodes {
        let distance = hood.distances.get(id).copied().unwrap_or_default();
        println!("  [{distance}] {id}");
    }
    println!("\nEdges: {}", hood.edges.len());
    for rel in &hood.edges {
        print_relationship(rel);
    }
    Ok(hood.nodes.len())
}

/// Rank nodes by importance.
pub async fn handle_importance(
    service: &RelationshipService,
    algorithm: ImportanceAlgorithm,
    normalized: bool,
    limit: Option<usize>,
) -> Result<usize> {
    let options = ImportanceOptions {
        normalized,
        limit,
        ..ImportanceOptions::default()
    };
    let ranked = service
        .analyzer()
        .calculate_node_importance(algorithm, &options)
        .await?;

    println!("Node importance ({algorithm:?}):");
    for entry in &ranked {
        println!("  {:>4}. {}  {:.6}", entry.rank, entry.node_id, entry.score);
    }
    Ok(ranked.len())
}

/// Group nodes into clusters.
pub async fn handle_communities(
    service: &RelationshipService,
    algorithm: CommunityAlgorithm,
    min_size: Option<usize>,
) -> Result<usize> {
    let clusters = service
        .analyzer()
        .detect_communities(algorithm, &CommunityOptions { min_size })
        .await?;

    println!("{} cluster(s)", clusters.len());
    for cluster in &clusters {
        let dominant = cluster
            .dominant_type
            .map(|t| t.name())
            .unwrap_or("none");
        println!(
            "\nCluster #{}: {} node(s), {} edge(s), density {:.3}, dominant {dominant}",
            cluster.id, cluster.size, cluster.edge_count, cluster.density
        );
        for node in &cluster.nodes {
            println!("  - {node}");
        }
    }
    Ok(clusters.len())
}

/// Audit the graph for directed cycles.
pub async fn handle_cycles(
    service: &RelationshipService,
    max_depth: Option<usize>,
    max_cycles: Option<usize>,
) -> Result<bool> {
    let options = CycleOptions {
        max_depth,
        max_cycles,
        ..CycleOptions::default()
    };
    let report = service.analyzer().detect_cycles(&options).await?;

    if report.has_cycles {
        println!("Graph has cycles ({} listed):", report.cycles.len());
        for cycle in &report.cycles {
            let mut closed = cycle.clone();
            if let Some(first) = cycle.first() {
                closed.push(first.clone());
            }
            println!("  {}", closed.join(" -> "));
        }
    } else {
        println!("Graph is acyclic.");
    }
    Ok(report.has_cycles)
}

/// Export the graph to a file or stdout.
pub async fn handle_export(
    service: &RelationshipService,
    format: ExportFormat,
    output: Option<&Path>,
) -> Result<()> {
    let rendered = service.export_graph_data(format).await?;
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, rendered)?;
            println!("Exported {format} to {}", path.display());
        }
        None => print!("{rendered}"),
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
