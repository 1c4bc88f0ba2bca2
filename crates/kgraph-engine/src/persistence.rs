//! Snapshot persistence.
//!
//! A snapshot is the JSON export document written to disk. Loading it
//! back yields the relationships with their ids and timestamps intact,
//! ready to seed an [`InMemoryRelationshipRepository`].
//!
//! [`InMemoryRelationshipRepository`]: crate::repository::InMemoryRelationshipRepository

use kgraph_core::{Error, Result};
use std::path::Path;

use crate::export::{GraphExport, parse_json_export, to_json};

/// Save a snapshot as pretty-printed JSON, creating parent directories.
pub fn save_snapshot(export: &GraphExport, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let json = to_json(export)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::persistence(format!("create {}", parent.display()), e))?;
    }
    std::fs::write(path, json)
        .map_err(|e| Error::persistence(format!("write snapshot {}", path.display()), e))?;

    log::debug!(
        "saved snapshot with {} relationship(s) to {}",
        export.relationships.len(),
        path.display()
    );
    Ok(())
}

/// Load a snapshot from a JSON file.
pub fn load_snapshot(path: impl AsRef<Path>) -> Result<GraphExport> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)
        .map_err(|e| Error::persistence(format!("read snapshot {}", path.display()), e))?;
    load_snapshot_from_str(&json)
}

/// Load a snapshot from a JSON string.
pub fn load_snapshot_from_str(json: &str) -> Result<GraphExport> {
    parse_json_export(json)
        .map_err(|e| Error::serialization(format!("failed to parse snapshot: {e}")))
}
