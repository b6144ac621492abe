//! Hierarchy export as JSON or YAML.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DutError;
use crate::types::{ArrayDescriptor, DiscoveryStats, HierarchyMapping, SignalMetadata};
use crate::util::hierarchy_fingerprint;

/// Serialization format for [`export_hierarchy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Yaml,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Yaml => "yaml",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// One exported node, keyed by path in [`ExportDocument::nodes`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportNode {
    #[serde(rename = "type")]
    pub type_name: String,
    pub is_scope: bool,
    pub depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_constant: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SignalMetadata>,
}

/// Exported hierarchy with sorted keys throughout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub root: String,
    pub fingerprint: String,
    pub nodes: BTreeMap<String, ExportNode>,
    pub arrays: BTreeMap<String, ArrayDescriptor>,
    pub stats: DiscoveryStats,
}

impl ExportDocument {
    pub fn from_mapping(mapping: &HierarchyMapping) -> Self {
        let nodes = mapping
            .iter()
            .map(|node| {
                (
                    node.path.clone(),
                    ExportNode {
                        type_name: node.runtime_type_name.clone(),
                        is_scope: node.is_scope,
                        depth: node.depth,
                        width: node.width,
                        is_constant: node.is_constant,
                        metadata: node.metadata,
                    },
                )
            })
            .collect();
        ExportDocument {
            root: mapping.root.clone(),
            fingerprint: hierarchy_fingerprint(mapping),
            nodes,
            arrays: mapping.arrays.clone(),
            stats: mapping.stats.clone(),
        }
    }
}

/// Serialize a mapping in the requested format.
pub fn export_hierarchy(mapping: &HierarchyMapping, format: ExportFormat) -> Result<String, DutError> {
    let doc = ExportDocument::from_mapping(mapping);
    match format {
        ExportFormat::Json => serde_json::to_string_pretty(&doc)
            .map(|mut text| {
                text.push('\n');
                text
            })
            .map_err(|e| DutError::internal(format!("failed to encode JSON export: {}", e))),
        ExportFormat::Yaml => serde_yaml::to_string(&doc)
            .map_err(|e| DutError::internal(format!("failed to encode YAML export: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{SnapshotHandle, SnapshotNode};
    use crate::walker::discover;

    fn sample() -> HierarchyMapping {
        let root = SnapshotNode::scope(
            "top",
            vec![
                SnapshotNode::signal("rst_n", "LogicObject", 1),
                SnapshotNode::signal("clk", "LogicObject", 1),
                SnapshotNode::signal("mem[0]", "LogicArrayObject", 8),
            ],
        );
        let mut handle = SnapshotHandle::new(&root);
        discover(&mut handle, 4, false).unwrap()
    }

    #[test]
    fn json_export_has_sorted_node_keys() {
        let text = export_hierarchy(&sample(), ExportFormat::Json).unwrap();
        let clk = text.find("\"top.clk\"").unwrap();
        let rst = text.find("\"top.rst_n\"").unwrap();
        assert!(clk < rst);
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["nodes"]["top.clk"]["type"], "LogicObject");
        assert_eq!(value["nodes"]["top.clk"]["metadata"]["category"], "clock");
        assert_eq!(value["arrays"]["top.mem"]["dimensions"][0][1], 0);
    }

    #[test]
    fn yaml_export_decodes_back() {
        let text = export_hierarchy(&sample(), ExportFormat::Yaml).unwrap();
        let doc: ExportDocument = serde_yaml::from_str(&text).unwrap();
        assert_eq!(doc.root, "top");
        assert_eq!(doc.nodes.len(), 4);
        assert!(doc.nodes["top"].is_scope);
    }
}
