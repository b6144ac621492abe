//! End-to-end pipeline tests: snapshot JSON, discovery, rendering, the
//! syntax gate, coverage and verification.

use std::time::Duration;

use dutstub_core::{discover, HierarchyMapping, OutputFormat, RenderOptions, SnapshotDocument};
use dutstub_python::{
    analyze_coverage, generate_testbench, render, verify_artifact, ParsedStub, TestbenchOptions,
    VerificationMode, VerificationStatus,
};

const SNAPSHOT: &str = r#"{
  "simulator": "icarus",
  "root": {
    "name": "riscv_core",
    "type": "HierarchyObject",
    "children": [
      { "name": "clk", "type": "LogicObject", "width": 1, "direction": "input" },
      { "name": "rst_n", "type": "LogicObject", "width": 1, "direction": "input" },
      { "name": "instr_addr", "type": "LogicArrayObject", "width": 32, "direction": "output" },
      { "name": "XLEN", "type": "IntegerObject", "width": 32, "constant": true },
      {
        "name": "u_regfile",
        "type": "HierarchyObject",
        "children": [
          { "name": "regs[0]", "type": "LogicArrayObject", "width": 32 },
          { "name": "regs[1]", "type": "LogicArrayObject", "width": 32 },
          { "name": "regs[2]", "type": "LogicArrayObject", "width": 32 },
          { "name": "regs[3]", "type": "LogicArrayObject", "width": 32 }
        ]
      },
      {
        "name": "u_alu",
        "type": "HierarchyObject",
        "children": [
          { "name": "op_a", "type": "LogicArrayObject", "width": 32 },
          { "name": "op_b", "type": "LogicArrayObject", "width": 32 },
          { "name": "\\result$ ", "type": "LogicArrayObject", "width": 32 }
        ]
      },
      {
        "name": "u_debug",
        "type": "HierarchyObject",
        "error": "access denied by simulator"
      }
    ]
  }
}"#;

fn mapping() -> HierarchyMapping {
    let doc = SnapshotDocument::from_json(SNAPSHOT).unwrap();
    let mut handle = doc.handle();
    discover(&mut handle, 16, false).unwrap()
}

// ============================================================================
// Discovery
// ============================================================================

#[test]
fn discovery_records_failures_and_drops_constants() {
    let mapping = mapping();
    assert!(mapping.contains("riscv_core.clk"));
    assert!(!mapping.contains("riscv_core.XLEN"));
    assert_eq!(mapping.arrays["riscv_core.u_regfile.regs"].len(), 4);
    assert!(mapping
        .stats
        .failures
        .iter()
        .any(|f| f.path == "riscv_core.u_debug"));
}

// ============================================================================
// Rendering and coverage
// ============================================================================

#[test]
fn rendered_artifacts_parse_and_cover_everything() {
    let mapping = mapping();
    for flat in [false, true] {
        for format in [OutputFormat::StubInterface, OutputFormat::ModuleSource] {
            let options = RenderOptions {
                flat_hierarchy: flat,
                include_metadata: true,
                output_format: format,
                ..RenderOptions::default()
            };
            let text = render(&mapping, &options).unwrap();
            let stub = ParsedStub::parse(&text).unwrap();
            assert!(
                stub.aliases.iter().any(|(name, _)| name == "DutType"),
                "flat={flat} format={format}"
            );

            let report = analyze_coverage(&mapping, &text);
            assert!(report.is_complete(), "flat={flat} format={format}: {report:?}");
            assert_eq!(report.coverage_ratio, 1.0);
        }
    }
}

#[test]
fn nested_stub_has_one_class_per_scope() {
    let mapping = mapping();
    let text = render(&mapping, &RenderOptions::default()).unwrap();
    let stub = ParsedStub::parse(&text).unwrap();
    let root_class = stub
        .aliases
        .iter()
        .find(|(name, _)| name == "DutType")
        .map(|(_, value)| value.clone())
        .unwrap();
    let root = stub.class(&root_class).unwrap();
    let attrs: Vec<&str> = root.attributes.iter().map(|a| a.name.as_str()).collect();
    assert!(attrs.contains(&"clk"));
    assert!(attrs.contains(&"u_alu"));
    assert!(attrs.contains(&"u_regfile"));
    // the odd escaped identifier is reachable by key only
    assert!(stub.declared_names().contains("\\result$ "));
}

#[test]
fn documentation_formats_pass_through() {
    let mapping = mapping();
    let options = RenderOptions {
        output_format: OutputFormat::Markdown,
        ..RenderOptions::default()
    };
    let text = render(&mapping, &options).unwrap();
    assert!(text.starts_with("# riscv\\_core Hierarchy\n"));
    assert!(!text.contains("DutType ="));
}

#[test]
fn coverage_of_a_stale_stub_reports_new_signals() {
    let mapping = mapping();
    let stale = "class RiscvCore(HierarchyObject):\n    clk: LogicObject\n    rst_n: LogicObject\n    old_port: LogicObject\n";
    let report = analyze_coverage(&mapping, stale);
    assert_eq!(report.covered, 2);
    assert!(report.missing.contains(&"instr_addr".to_string()));
    assert_eq!(report.extra, vec!["old_port".to_string()]);
    assert!(report.coverage_ratio > 0.0 && report.coverage_ratio < 1.0);
}

// ============================================================================
// Testbench and verification
// ============================================================================

#[test]
fn testbench_uses_detected_clock_and_reset() {
    let mapping = mapping();
    let options = TestbenchOptions {
        comprehensive: true,
        stub_module: "riscv_core".to_string(),
    };
    let text = generate_testbench(&mapping, &options).unwrap();
    assert!(text.contains("from riscv_core import DutType"));
    assert!(text.contains("Clock(self.dut.clk"));
    assert!(text.contains("self.dut.rst_n.value = 0"));
}

#[test]
fn written_stub_passes_gate_verification() {
    let mapping = mapping();
    let text = render(&mapping, &RenderOptions::default()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("riscv_core.pyi");
    std::fs::write(&path, &text).unwrap();
    let result = verify_artifact(&path, VerificationMode::Gate, Duration::from_secs(10)).unwrap();
    assert_eq!(result.status, VerificationStatus::Passed);
}
