//! Interface validation and hierarchy complexity metrics.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::arrays::is_array_element;
use crate::types::HierarchyMapping;

/// Result of checking a discovered hierarchy against expected signal names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceValidation {
    pub valid: bool,
    /// Expected names with no matching node.
    pub missing: Vec<String>,
    /// Relative paths of nodes no expected name refers to.
    pub extra: Vec<String>,
    pub total_expected: usize,
    pub total_actual: usize,
}

/// Check that every expected name is present.
///
/// An expected name matches a node by its root-relative path or its trailing
/// segment, so `clk` and `u_core.clk` both match `top.u_core.clk`.
pub fn validate_interface<S: AsRef<str>>(
    mapping: &HierarchyMapping,
    expected: &[S],
) -> InterfaceValidation {
    let expected_set: BTreeSet<&str> = expected.iter().map(|s| s.as_ref()).collect();

    let mut actual: BTreeSet<String> = BTreeSet::new();
    let mut extra = Vec::new();
    let mut total_actual = 0;
    for node in mapping.sorted() {
        if node.is_root() {
            continue;
        }
        total_actual += 1;
        let relative = node.relative_path();
        let name = node.name().to_string();
        if !expected_set.contains(relative.as_str()) && !expected_set.contains(name.as_str()) {
            extra.push(relative.clone());
        }
        actual.insert(relative);
        actual.insert(name);
    }

    let missing: Vec<String> = expected_set
        .iter()
        .filter(|name| !actual.contains(**name))
        .map(|name| name.to_string())
        .collect();

    let result = InterfaceValidation {
        valid: missing.is_empty(),
        missing,
        extra,
        total_expected: expected_set.len(),
        total_actual,
    };
    if result.valid {
        info!(expected = result.total_expected, "interface validation passed");
    } else {
        info!(missing = ?result.missing, "interface validation failed");
    }
    result
}

/// Hierarchy complexity metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplexityReport {
    /// Every recorded node, root included.
    pub total_signals: usize,
    pub max_depth: usize,
    /// Nodes with at least one recorded descendant.
    pub module_count: usize,
    /// Detected array descriptors.
    pub array_count: usize,
    /// Recorded nodes that are indexed array elements.
    pub array_elements: usize,
    /// Histogram of runtime type names.
    pub signal_types: BTreeMap<String, usize>,
    /// Histogram of leaf categories.
    pub categories: BTreeMap<String, usize>,
    /// Histogram of leaf bus protocols.
    pub bus_protocols: BTreeMap<String, usize>,
}

/// Compute complexity metrics for a discovered hierarchy.
pub fn analyze_complexity(mapping: &HierarchyMapping) -> ComplexityReport {
    let mut report = ComplexityReport {
        total_signals: mapping.len(),
        max_depth: 0,
        module_count: 0,
        array_count: mapping.arrays.len(),
        array_elements: 0,
        signal_types: BTreeMap::new(),
        categories: BTreeMap::new(),
        bus_protocols: BTreeMap::new(),
    };

    for node in mapping.iter() {
        report.max_depth = report.max_depth.max(node.depth);
        if mapping.has_descendants(&node.path) {
            report.module_count += 1;
        }
        if is_array_element(&node.path) {
            report.array_elements += 1;
        }
        *report
            .signal_types
            .entry(node.runtime_type_name.clone())
            .or_default() += 1;
        if let Some(meta) = node.metadata {
            *report
                .categories
                .entry(meta.category.as_str().to_string())
                .or_default() += 1;
            *report
                .bus_protocols
                .entry(meta.bus_protocol.as_str().to_string())
                .or_default() += 1;
        }
    }
    report
}
