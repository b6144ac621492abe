//! In-memory hierarchy snapshots and their [`SimHandle`] adapter.
//!
//! A snapshot is a JSON document describing a dumped DUT hierarchy, as
//! written by a simulator-side dumper:
//!
//! ```json
//! {
//!   "simulator": "icarus",
//!   "root": {
//!     "name": "cpu",
//!     "type": "HierarchyObject",
//!     "children": [
//!       { "name": "clk", "type": "LogicObject", "width": 1, "direction": "input" },
//!       { "name": "u_alu", "type": "HierarchyObject", "children": [] }
//!     ]
//!   }
//! }
//! ```
//!
//! A node carrying an `error` string fails to materialize, which is how
//! dumpers record branches the simulator refused to expose.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::handle::{HandleError, SimHandle};
use crate::types::Direction;

fn default_type() -> String {
    "SimHandleBase".to_string()
}

/// One node of a dumped hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotNode {
    pub name: String,
    #[serde(rename = "type", default = "default_type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constant: Option<bool>,
    /// Explicit scope flag; inferred from children and type when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SnapshotNode>,
    /// Materialization failure reported by the dumper.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SnapshotNode {
    /// A scope node with the given children.
    pub fn scope(name: impl Into<String>, children: Vec<SnapshotNode>) -> Self {
        SnapshotNode {
            name: name.into(),
            type_name: "HierarchyObject".to_string(),
            width: None,
            direction: None,
            signed: None,
            constant: None,
            scope: Some(true),
            children,
            error: None,
        }
    }

    /// A leaf signal.
    pub fn signal(name: impl Into<String>, type_name: impl Into<String>, width: u32) -> Self {
        SnapshotNode {
            name: name.into(),
            type_name: type_name.into(),
            width: Some(width),
            direction: None,
            signed: None,
            constant: None,
            scope: Some(false),
            children: Vec::new(),
            error: None,
        }
    }

    pub fn with_direction(mut self, direction: &str) -> Self {
        self.direction = Some(direction.to_string());
        self
    }

    pub fn with_error(mut self, reason: &str) -> Self {
        self.error = Some(reason.to_string());
        self
    }

    pub fn with_constant(mut self, constant: bool) -> Self {
        self.constant = Some(constant);
        self
    }

    pub fn with_signed(mut self, signed: bool) -> Self {
        self.signed = Some(signed);
        self
    }

    /// True if the node can contain children.
    pub fn is_scope(&self) -> bool {
        self.scope
            .unwrap_or_else(|| !self.children.is_empty() || self.type_name.contains("Hierarchy"))
    }
}

/// A dumped hierarchy document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDocument {
    /// Simulator that produced the dump, if recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulator: Option<String>,
    pub root: SnapshotNode,
}

impl SnapshotDocument {
    pub fn new(root: SnapshotNode) -> Self {
        SnapshotDocument {
            simulator: None,
            root,
        }
    }

    /// Decode a snapshot from JSON text.
    pub fn from_json(text: &str) -> Result<Self, HandleError> {
        serde_json::from_str(text).map_err(|e| HandleError::Snapshot(e.to_string()))
    }

    /// Read and decode a snapshot file.
    pub fn from_path(path: &Path) -> Result<Self, HandleError> {
        let text = fs::read_to_string(path)
            .map_err(|e| HandleError::Snapshot(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    /// Encode as pretty JSON.
    pub fn to_json(&self) -> Result<String, HandleError> {
        serde_json::to_string_pretty(self).map_err(|e| HandleError::Snapshot(e.to_string()))
    }

    /// Handle onto the root node.
    pub fn handle(&self) -> SnapshotHandle<'_> {
        SnapshotHandle::new(&self.root)
    }
}

/// [`SimHandle`] over a borrowed [`SnapshotNode`].
///
/// Children are only enumerable after `materialize_children` succeeded,
/// mirroring runtimes that populate sub-handles lazily.
#[derive(Debug)]
pub struct SnapshotHandle<'a> {
    node: &'a SnapshotNode,
    materialized: bool,
}

impl<'a> SnapshotHandle<'a> {
    pub fn new(node: &'a SnapshotNode) -> Self {
        SnapshotHandle {
            node,
            materialized: false,
        }
    }
}

impl SimHandle for SnapshotHandle<'_> {
    fn name(&self) -> &str {
        &self.node.name
    }

    fn type_name(&self) -> &str {
        &self.node.type_name
    }

    fn has_nested_children(&self) -> bool {
        self.node.is_scope()
    }

    fn materialize_children(&mut self) -> Result<(), HandleError> {
        if let Some(reason) = &self.node.error {
            return Err(HandleError::Materialize {
                name: self.node.name.clone(),
                reason: reason.clone(),
            });
        }
        self.materialized = true;
        Ok(())
    }

    fn enumerate_children(&self) -> Result<Vec<(String, Box<dyn SimHandle + '_>)>, HandleError> {
        if !self.materialized {
            return Err(HandleError::Enumerate {
                name: self.node.name.clone(),
                reason: "children not materialized".to_string(),
            });
        }
        Ok(self
            .node
            .children
            .iter()
            .map(|child| {
                let handle: Box<dyn SimHandle + '_> = Box::new(SnapshotHandle::new(child));
                (child.name.clone(), handle)
            })
            .collect())
    }

    fn introspect_width(&self) -> Result<u32, HandleError> {
        self.node.width.ok_or(HandleError::Unsupported)
    }

    fn introspect_direction(&self) -> Result<Direction, HandleError> {
        self.node
            .direction
            .as_deref()
            .and_then(Direction::parse)
            .ok_or(HandleError::Unsupported)
    }

    fn introspect_signedness(&self) -> Result<bool, HandleError> {
        self.node.signed.ok_or(HandleError::Unsupported)
    }

    fn introspect_constant(&self) -> Result<bool, HandleError> {
        self.node.constant.ok_or(HandleError::Unsupported)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_minimal_document() {
        let doc = SnapshotDocument::from_json(
            r#"{"root": {"name": "top", "children": [{"name": "clk", "type": "LogicObject", "width": 1}]}}"#,
        )
        .unwrap();
        assert_eq!(doc.root.type_name, "SimHandleBase");
        assert!(doc.root.is_scope());
        assert!(!doc.root.children[0].is_scope());
    }

    #[test]
    fn rejects_malformed_document() {
        let err = SnapshotDocument::from_json("{\"root\": 3}").unwrap_err();
        assert!(matches!(err, HandleError::Snapshot(_)));
    }

    #[test]
    fn children_require_materialization() {
        let root = SnapshotNode::scope("top", vec![SnapshotNode::signal("clk", "LogicObject", 1)]);
        let mut handle = SnapshotHandle::new(&root);
        assert!(handle.enumerate_children().is_err());
        handle.materialize_children().unwrap();
        handle.materialize_children().unwrap();
        let children = handle.enumerate_children().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].0, "clk");
    }

    #[test]
    fn error_field_fails_materialization() {
        let node = SnapshotNode::scope("bad", vec![]).with_error("access denied");
        let mut handle = SnapshotHandle::new(&node);
        let err = handle.materialize_children().unwrap_err();
        assert!(err.to_string().contains("access denied"));
    }

    #[test]
    fn introspection_reports_unavailable_fields() {
        let node = SnapshotNode::signal("data", "LogicObject", 8).with_direction("out");
        let handle = SnapshotHandle::new(&node);
        assert_eq!(handle.introspect_width(), Ok(8));
        assert_eq!(handle.introspect_direction(), Ok(Direction::Output));
        assert_eq!(handle.introspect_signedness(), Err(HandleError::Unsupported));
    }

    #[test]
    fn type_name_infers_scope() {
        let mut node = SnapshotNode::signal("genblk", "HierarchyArrayObject", 0);
        node.scope = None;
        assert!(node.is_scope());
    }
}
