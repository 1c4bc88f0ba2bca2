//! CLI argument parsing and command definitions.
//!
//! Every graph command works against a JSON snapshot: the snapshot is
//! loaded into an in-memory repository, the command runs through the
//! relationship service, and mutating commands write the snapshot back.

use clap::{Args, Parser, Subcommand};
use kgraph_engine::{
    CommunityAlgorithm, Direction, ExportFormat, ImportanceAlgorithm, PathAlgorithm,
    RelationshipType,
};

// ============================================================================
// CLI argument types
// ============================================================================

/// Top-level CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "kgraph", author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file.
    #[arg(short, long, env = "KGRAPH_CONFIG")]
    pub config: Option<String>,

    /// Path to the relationship snapshot (overrides `snapshot.path`).
    #[arg(short, long, env = "KGRAPH_SNAPSHOT")]
    pub snapshot: Option<String>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress non-essential output.
    #[arg(short, long)]
    pub quiet: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a relationship.
    Add(AddArgs),

    /// Update a relationship's weight, bidirectional flag or metadata.
    Update(UpdateArgs),

    /// Delete relationships by id.
    Remove {
        /// Relationship ids.
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Show one relationship.
    Get {
        /// Relationship id.
        id: String,
    },

    /// List relationships matching a filter.
    List(ListArgs),

    /// Import relationships from a JSON file.
    ///
    /// A JSON array is bulk-created item by item; a JSON export document
    /// is imported all-or-nothing with ids and timestamps preserved.
    Import {
        /// Path to the JSON file.
        file: String,
    },

    /// Show graph statistics.
    Stats {
        /// Nodes sampled for path length and clustering.
        #[arg(long)]
        sample_size: Option<usize>,

        /// Seed for reproducible sampling.
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Find the shortest path between two nodes.
    Path {
        /// Start node.
        from: String,

        /// End node.
        to: String,

        /// Path algorithm: bfs or dijkstra.
        #[arg(short, long, default_value = "bfs")]
        algorithm: PathAlgorithm,

        /// Hop cutoff.
        #[arg(long)]
        max_depth: Option<usize>,

        /// Walk direction: outgoing, incoming or both.
        #[arg(short, long, default_value = "outgoing")]
        direction: Direction,
    },

    /// Enumerate simple paths between two nodes.
    Paths {
        /// Start node.
        from: String,

        /// End node.
        to: String,

        /// Hop cutoff.
        #[arg(long)]
        max_depth: Option<usize>,

        /// Result cap.
        #[arg(long)]
        max_paths: Option<usize>,

        /// Walk direction: outgoing, incoming or both.
        #[arg(short, long, default_value = "outgoing")]
        direction: Direction,
    },

    /// Show the nodes and edges around a node.
    Neighborhood {
        /// Center node.
        node: String,

        /// Hop radius.
        #[arg(long)]
        depth: Option<usize>,

        /// Walk direction: outgoing, incoming or both.
        #[arg(short, long, default_value = "outgoing")]
        direction: Direction,

        /// Only walk edges of this type (repeatable).
        #[arg(short = 't', long = "type")]
        types: Vec<RelationshipType>,
    },

    /// Rank nodes by importance.
    Importance {
        /// Algorithm: pagerank, degree, betweenness or closeness.
        #[arg(short, long, default_value = "pagerank")]
        algorithm: ImportanceAlgorithm,

        /// Normalize scores to [0, 1].
        #[arg(short, long)]
        normalized: bool,

        /// Show only the top N nodes.
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Group nodes into clusters.
    Communities {
        /// Algorithm: connected-components, louvain or label-propagation.
        #[arg(short, long, default_value = "connected-components")]
        algorithm: CommunityAlgorithm,

        /// Drop clusters smaller than this.
        #[arg(long)]
        min_size: Option<usize>,
    },

    /// Audit the graph for directed cycles.
    Cycles {
        /// Longest cycle to list, in nodes.
        #[arg(long)]
        max_depth: Option<usize>,

        /// Most cycles to list.
        #[arg(long)]
        max_cycles: Option<usize>,
    },

    /// Export the graph.
    Export {
        /// Output format: json, graphml or gexf.
        #[arg(short, long, default_value = "json")]
        format: ExportFormat,

        /// Output file (defaults to stdout).
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Configuration operations.
    Config(ConfigCommand),
}

/// Arguments for `kgraph add`.
#[derive(Args, Debug)]
pub struct AddArgs {
    /// Source node id.
    pub source: String,

    /// Target node id.
    pub target: String,

    /// Relationship type, e.g. related_to or part_of.
    #[arg(short = 't', long = "type")]
    pub relationship_type: String,

    /// Strength in [0, 1].
    #[arg(short, long)]
    pub weight: Option<f64>,

    /// Mark the relationship as bidirectional.
    #[arg(short, long)]
    pub bidirectional: bool,

    /// Metadata as a JSON object.
    #[arg(short, long)]
    pub metadata: Option<String>,
}

/// Arguments for `kgraph update`.
#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Relationship id.
    pub id: String,

    /// New weight.
    #[arg(short, long)]
    pub weight: Option<f64>,

    /// New bidirectional flag.
    #[arg(short, long)]
    pub bidirectional: Option<bool>,

    /// Replacement metadata as a JSON object.
    #[arg(short, long)]
    pub metadata: Option<String>,
}

/// Arguments for `kgraph list`.
#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Only edges leaving this node.
    #[arg(long)]
    pub source: Option<String>,

    /// Only edges arriving at this node.
    #[arg(long)]
    pub target: Option<String>,

    /// Only edges of this type.
    #[arg(short = 't', long = "type")]
    pub relationship_type: Option<RelationshipType>,

    /// Inclusive lower weight bound.
    #[arg(long)]
    pub min_weight: Option<f64>,

    /// Inclusive upper weight bound.
    #[arg(long)]
    pub max_weight: Option<f64>,

    /// Page size.
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Page offset.
    #[arg(long)]
    pub offset: Option<usize>,
}

/// Config-specific subcommands.
#[derive(Parser, Debug)]
pub struct ConfigCommand {
    /// Config subcommand to execute.
    #[command(subcommand)]
    pub command: ConfigAction,
}

/// Available config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the resolved config file path.
    Path,

    /// Print the effective configuration as TOML.
    Show,

    /// Create a default configuration file.
    Init {
        /// Output file path (defaults to XDG config path).
        #[arg(short, long)]
        file: Option<String>,

        /// Overwrite existing file.
        #[arg(long)]
        force: bool,
    },
}

impl Command {
    /// Whether the command changes the snapshot.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::Add(_) | Self::Update(_) | Self::Remove { .. } | Self::Import { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
