//! Graph export in JSON, GraphML and GEXF.
//!
//! All three formats list nodes as the distinct ids referenced by the
//! exported relationships, in order of first appearance.

use kgraph_core::{Error, NodeId, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::{self, Write};
use std::str::FromStr;

use crate::analysis::GraphStatistics;
use crate::types::Relationship;

/// Supported export formats.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// `{statistics, relationships}` JSON document.
    #[default]
    Json,
    /// GraphML XML.
    Graphml,
    /// GEXF 1.2 XML.
    Gexf,
}

impl ExportFormat {
    /// Conventional file extension.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Graphml => "graphml",
            Self::Gexf => "gexf",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "graphml" => Ok(Self::Graphml),
            "gexf" => Ok(Self::Gexf),
            other => Err(Error::serialization(format!(
                "unknown export format '{other}'"
            ))),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// The JSON export document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphExport {
    /// Statistics at export time.
    pub statistics: GraphStatistics,
    /// Every relationship, in storage order.
    pub relationships: Vec<Relationship>,
}

/// Distinct node ids referenced by `relationships`, first appearance first.
pub fn referenced_nodes(relationships: &[Relationship]) -> Vec<NodeId> {
    let mut seen = HashSet::new();
    let mut nodes = Vec::new();
    for rel in relationships {
        for id in [&rel.source_id, &rel.target_id] {
            if seen.insert(id.as_str()) {
                nodes.push(id.clone());
            }
        }
    }
    nodes
}

/// Render `export` in the requested format.
pub fn render(format: ExportFormat, export: &GraphExport) -> Result<String> {
    match format {
        ExportFormat::Json => to_json(export),
        ExportFormat::Graphml => to_graphml(&export.relationships),
        ExportFormat::Gexf => to_gexf(&export.relationships),
    }
}

/// Pretty-printed JSON export.
pub fn to_json(export: &GraphExport) -> Result<String> {
    Ok(serde_json::to_string_pretty(export)?)
}

/// Parse a JSON export back into its parts.
pub fn parse_json_export(json: &str) -> Result<GraphExport> {
    Ok(serde_json::from_str(json)?)
}

// ============================================================================
// XML formats
// ============================================================================

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// GraphML document with `weight` (double) and `type` (string) edge keys.
pub fn to_graphml(relationships: &[Relationship]) -> Result<String> {
    write_graphml(relationships).map_err(|e| Error::serialization(e.to_string()))
}

fn write_graphml(relationships: &[Relationship]) -> std::result::Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(out, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
    writeln!(
        out,
        r#"<graphml xmlns="http://graphml.graphdrawing.org/xmlns">"#
    )?;
    writeln!(
        out,
        r#"  <key id="weight" for="edge" attr.name="weight" attr.type="double"/>"#
    )?;
    writeln!(
        out,
        r#"  <key id="type" for="edge" attr.name="type" attr.type="string"/>"#
    )?;
    writeln!(out, r#"  <graph id="G" edgedefault="directed">"#)?;
    for node in referenced_nodes(relationships) {
        writeln!(out, r#"    <node id="{}"/>"#, escape(&node))?;
    }
    for rel in relationships {
        writeln!(
            out,
            r#"    <edge source="{}" target="{}">"#,
            escape(&rel.source_id),
            escape(&rel.target_id)
        )?;
        writeln!(out, r#"      <data key="weight">{}</data>"#, rel.weight)?;
        writeln!(
            out,
            r#"      <data key="type">{}</data>"#,
            rel.relationship_type
        )?;
        writeln!(out, "    </edge>")?;
    }
    writeln!(out, "  </graph>")?;
    writeln!(out, "</graphml>")?;
    Ok(out)
}

/// GEXF 1.2 document with `weight` (id 0) and `type` (id 1) edge attributes.
pub fn to_gexf(relationships: &[Relationship]) -> Result<String> {
    write_gexf(relationships).map_err(|e| Error::serialization(e.to_string()))
}

fn write_gexf(relationships: &[Relationship]) -> std::result::Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(out, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
    writeln!(
        out,
        r#"<gexf xmlns="http://www.gexf.net/1.2draft" version="1.2">"#
    )?;
    writeln!(out, r#"  <graph mode="static" defaultedgetype="directed">"#)?;
    writeln!(out, r#"    <attributes class="edge">"#)?;
    writeln!(
        out,
        r#"      <attribute id="0" title="weight" type="float"/>"#
    )?;
    writeln!(
        out,
        r#"      <attribute id="1" title="type" type="string"/>"#
    )?;
    writeln!(out, "    </attributes>")?;

    writeln!(out, "    <nodes>")?;
    for node in referenced_nodes(relationships) {
        let node = escape(&node);
        writeln!(out, r#"      <node id="{node}" label="{node}"/>"#)?;
    }
    writeln!(out, "    </nodes>")?;

    writeln!(out, "    <edges>")?;
    for (index, rel) in relationships.iter().enumerate() {
        writeln!(
            out,
            r#"      <edge id="{index}" source="{}" target="{}">"#,
            escape(&rel.source_id),
            escape(&rel.target_id)
        )?;
        writeln!(out, "        <attvalues>")?;
        writeln!(
            out,
            r#"          <attvalue for="0" value="{}"/>"#,
            rel.weight
        )?;
        writeln!(
            out,
            r#"          <attvalue for="1" value="{}"/>"#,
            rel.relationship_type
        )?;
        writeln!(out, "        </attvalues>")?;
        writeln!(out, "      </edge>")?;
    }
    writeln!(out, "    </edges>")?;
    writeln!(out, "  </graph>")?;
    writeln!(out, "</gexf>")?;
    Ok(out)
}

// ============================================================================
// Tests
// ============================================================================
