//! Coverage of a discovered hierarchy by a previously rendered stub.
//!
//! The stub is parsed structurally, never regenerated. A node counts as
//! covered when its absolute path, its root-relative path, or its trailing
//! segment is declared. An artifact that does not parse yields zero coverage
//! with the diagnostic attached.

use std::collections::BTreeSet;

use dutstub_core::types::leaf_name;
use dutstub_core::HierarchyMapping;
use serde::Serialize;
use tracing::{info, warn};

use crate::stubs::ParsedStub;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageReport {
    pub coverage_ratio: f64,
    pub total: usize,
    pub covered: usize,
    /// Root-relative paths of nodes the stub does not declare.
    pub missing: Vec<String>,
    /// Declared names that match no node and no array base.
    pub extra: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
}

impl CoverageReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty() && self.parse_error.is_none()
    }
}

/// Compare `mapping` against the declarations of `artifact`.
pub fn analyze_coverage(mapping: &HierarchyMapping, artifact: &str) -> CoverageReport {
    let (declared, parse_error) = match ParsedStub::parse(artifact) {
        Ok(stub) => (stub.declared_names(), None),
        Err(err) => {
            warn!(line = err.line, col = err.col, "coverage artifact does not parse: {}", err.message);
            (BTreeSet::new(), Some(err.to_string()))
        }
    };
    let report = coverage_from_names(mapping, &declared, parse_error);
    info!(
        total = report.total,
        covered = report.covered,
        ratio = report.coverage_ratio,
        "coverage analyzed"
    );
    report
}

/// Coverage against an already extracted set of declared names.
pub fn coverage_from_names(
    mapping: &HierarchyMapping,
    declared: &BTreeSet<String>,
    parse_error: Option<String>,
) -> CoverageReport {
    let nodes: Vec<_> = mapping.sorted().into_iter().filter(|n| !n.is_root()).collect();
    let total = nodes.len();

    if parse_error.is_some() {
        let mut missing: Vec<String> = nodes.iter().map(|n| n.relative_path()).collect();
        missing.sort();
        return CoverageReport {
            coverage_ratio: 0.0,
            total,
            covered: 0,
            missing,
            extra: Vec::new(),
            parse_error,
        };
    }

    let mut known = BTreeSet::new();
    let mut missing = Vec::new();
    let mut covered = 0;
    for node in &nodes {
        let relative = node.relative_path();
        let forms = [node.path.as_str(), relative.as_str(), node.name()];
        if forms.iter().any(|form| declared.contains(*form)) {
            covered += 1;
        } else {
            missing.push(relative.clone());
        }
        known.extend(forms.iter().map(|f| f.to_string()));
    }
    for base in mapping.arrays.keys() {
        known.insert(base.clone());
        known.insert(leaf_name(base).to_string());
        if let Some((_, relative)) = base.split_once('.') {
            known.insert(relative.to_string());
        }
    }

    let extra: Vec<String> = declared
        .iter()
        .filter(|name| !known.contains(*name))
        .cloned()
        .collect();
    missing.sort();

    let coverage_ratio = if total == 0 {
        0.0
    } else {
        covered as f64 / total as f64
    };
    CoverageReport {
        coverage_ratio,
        total,
        covered,
        missing,
        extra,
        parse_error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::render;
    use dutstub_core::snapshot::{SnapshotHandle, SnapshotNode};
    use dutstub_core::walker::discover;
    use dutstub_core::{OutputFormat, RenderOptions};

    fn sample() -> HierarchyMapping {
        let root = SnapshotNode::scope(
            "top",
            vec![
                SnapshotNode::signal("clk", "LogicObject", 1),
                SnapshotNode::signal("!special!", "LogicObject", 1),
                SnapshotNode::signal("mem[0]", "LogicObject", 8),
                SnapshotNode::signal("mem[1]", "LogicObject", 8),
                SnapshotNode::scope(
                    "u_core",
                    vec![
                        SnapshotNode::signal("valid", "LogicObject", 1),
                        SnapshotNode::scope("regs", vec![SnapshotNode::signal("regs[0]", "LogicObject", 32)]),
                    ],
                ),
            ],
        );
        let mut handle = SnapshotHandle::new(&root);
        discover(&mut handle, 8, false).unwrap()
    }

    mod round_trip {
        use super::*;

        #[test]
        fn rendered_stub_fully_covers_its_hierarchy() {
            let mapping = sample();
            for flat in [false, true] {
                for format in [OutputFormat::StubInterface, OutputFormat::ModuleSource] {
                    let options = RenderOptions {
                        flat_hierarchy: flat,
                        output_format: format,
                        ..RenderOptions::default()
                    };
                    let text = render(&mapping, &options).unwrap();
                    let report = analyze_coverage(&mapping, &text);
                    assert_eq!(report.coverage_ratio, 1.0, "flat={flat} format={format}");
                    assert!(report.missing.is_empty(), "{:?}", report.missing);
                    assert!(report.extra.is_empty(), "{:?}", report.extra);
                }
            }
        }
    }

    mod partial {
        use super::*;

        #[test]
        fn missing_and_extra_are_sorted() {
            let stub = "class Top:\n    zzz: int\n    clk: int\n    aaa: int\n";
            let report = analyze_coverage(&sample(), stub);
            assert_eq!(report.covered, 1);
            assert_eq!(report.total, 8);
            assert_eq!(report.extra, vec!["aaa".to_string(), "zzz".to_string()]);
            assert_eq!(report.missing.first().map(String::as_str), Some("!special!"));
            let mut sorted = report.missing.clone();
            sorted.sort();
            assert_eq!(report.missing, sorted);
        }

        #[test]
        fn full_and_relative_paths_match() {
            let stub = "class Top:\n    def __getitem__(self, key: Literal[\"top.clk\", \"u_core.valid\"]) -> int: ...\n";
            let report = analyze_coverage(&sample(), stub);
            assert_eq!(report.covered, 2);
        }

        #[test]
        fn array_bases_are_not_extra() {
            let stub = "class Top:\n    mem: MemArray\n";
            let report = analyze_coverage(&sample(), stub);
            assert!(report.extra.is_empty());
            assert_eq!(report.covered, 0);
        }
    }

    mod failures {
        use super::*;

        #[test]
        fn unparsable_artifact_is_zero_coverage() {
            let report = analyze_coverage(&sample(), "class Top(:\n");
            assert_eq!(report.coverage_ratio, 0.0);
            assert_eq!(report.covered, 0);
            assert_eq!(report.missing.len(), report.total);
            assert!(report.parse_error.is_some());
        }

        #[test]
        fn empty_hierarchy_ratio_is_zero() {
            let mapping = HierarchyMapping::new("top");
            let report = analyze_coverage(&mapping, "");
            assert_eq!(report.total, 0);
            assert_eq!(report.coverage_ratio, 0.0);
        }
    }
}
