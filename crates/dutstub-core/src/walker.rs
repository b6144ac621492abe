//! Hierarchy discovery.
//!
//! [`discover`] walks a root [`SimHandle`] depth-first in the runtime's own
//! child order and produces a [`HierarchyMapping`].
//!
//! ## Failure policy
//!
//! - A non-positive depth bound is a `Configuration` error, raised before any
//!   handle is touched.
//! - Visiting a node deeper than the bound raises `DepthExceeded` for the
//!   whole call. The check runs on every descent.
//! - A node whose children fail to materialize or enumerate is still
//!   recorded, its subtree is skipped, one error is counted, and traversal
//!   continues with its siblings.
//! - Introspection failures are "unavailable", never errors.
//!
//! ## Deduplication
//!
//! A path is marked as seen before recursing into it, so a runtime that
//! re-exposes the same path through an alias is only visited once.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::arrays::{is_array_element, ArrayCollector};
use crate::classify::{classify, is_constant};
use crate::error::DutError;
use crate::handle::SimHandle;
use crate::types::{join_path, DiscoveredNode, HierarchyMapping, NodeFailure};

/// Discovery parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryOptions {
    /// Maximum depth below the root (root = 0). Must be positive.
    pub max_depth: i64,
    /// Keep compile-time constants in the mapping.
    pub include_constants: bool,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        DiscoveryOptions {
            max_depth: 50,
            include_constants: false,
        }
    }
}

/// Discover the hierarchy below `root`.
pub fn discover(
    root: &mut dyn SimHandle,
    max_depth: i64,
    include_constants: bool,
) -> Result<HierarchyMapping, DutError> {
    if max_depth <= 0 {
        return Err(DutError::configuration(format!(
            "max_depth must be positive, got {}",
            max_depth
        )));
    }

    let root_name = root.name().to_string();
    let mut walker = Walker {
        max_depth: max_depth as usize,
        include_constants,
        mapping: HierarchyMapping::new(root_name.clone()),
        seen: HashSet::new(),
        arrays: ArrayCollector::new(),
    };
    walker.visit(&root_name, root, &[], 0)?;
    Ok(walker.finish())
}

/// Discover with an options record.
pub fn discover_with(
    root: &mut dyn SimHandle,
    options: &DiscoveryOptions,
) -> Result<HierarchyMapping, DutError> {
    discover(root, options.max_depth, options.include_constants)
}

struct Walker {
    max_depth: usize,
    include_constants: bool,
    mapping: HierarchyMapping,
    seen: HashSet<String>,
    arrays: ArrayCollector,
}

impl Walker {
    fn visit(
        &mut self,
        name: &str,
        handle: &mut (dyn SimHandle + '_),
        parent: &[String],
        depth: usize,
    ) -> Result<(), DutError> {
        let mut segments = parent.to_vec();
        segments.push(name.to_string());
        let path = join_path(&segments);

        if depth > self.max_depth {
            return Err(DutError::DepthExceeded {
                path,
                max_depth: self.max_depth,
            });
        }

        if !self.seen.insert(path.clone()) {
            debug!(path = %path, "skipping already visited path");
            self.mapping.stats.duplicates_skipped += 1;
            return Ok(());
        }

        let stats = &mut self.mapping.stats;
        stats.total_objects += 1;
        stats.max_depth_reached = stats.max_depth_reached.max(depth);

        let is_scope = handle.has_nested_children();
        let constant = !is_scope && is_constant(handle, name);
        if constant && !self.include_constants {
            debug!(path = %path, "skipping constant");
            self.mapping.stats.constants_skipped += 1;
            return Ok(());
        }

        let mut node = DiscoveredNode::new(segments, handle.type_name(), is_scope);
        node.width = handle.introspect_width().ok();
        node.is_constant = constant;
        if !is_scope {
            node.metadata = Some(classify(name, &path, Some(&*handle)));
        }
        debug!(path = %path, type_name = %node.runtime_type_name, is_scope, "discovered");

        if !is_scope {
            self.record(node);
            return Ok(());
        }

        if let Err(err) = handle.materialize_children() {
            self.record_failure(node, err.to_string());
            return Ok(());
        }
        let children = match handle.enumerate_children() {
            Ok(children) => children,
            Err(err) => {
                self.record_failure(node, err.to_string());
                return Ok(());
            }
        };

        if node.width.is_none()
            && !children.is_empty()
            && children.iter().all(|(child, _)| is_array_element(child))
        {
            node.width = Some(children.len() as u32);
        }
        let segments = node.segments.clone();
        self.record(node);

        for (child_name, mut child) in children {
            self.visit(&child_name, child.as_mut(), &segments, depth + 1)?;
        }
        Ok(())
    }

    fn record(&mut self, node: DiscoveredNode) {
        self.arrays.observe(&node.path, &node.runtime_type_name);
        self.mapping.insert(node);
    }

    fn record_failure(&mut self, node: DiscoveredNode, reason: String) {
        warn!(path = %node.path, %reason, "skipping subtree after discovery error");
        let stats = &mut self.mapping.stats;
        stats.errors_encountered += 1;
        stats.failures.push(NodeFailure {
            path: node.path.clone(),
            reason,
        });
        self.record(node);
    }

    fn finish(mut self) -> HierarchyMapping {
        let arrays = self.arrays.finish();
        self.mapping.stats.arrays_detected = arrays.len();
        self.mapping.arrays = arrays;
        self.mapping
    }
}

// ============================================================================
// Tests
// ============================================================================
