//! CLI end-to-end tests.
//!
//! These tests spawn the actual `dutstub` binary against a temporary project
//! holding a hierarchy snapshot, and validate stdout, stderr and exit codes.
//!
//! Exit code expectations:
//! - 0: Success
//! - 1: Any discovery, generation or check failure
//! - 2: Argument errors reported by clap

use std::fs;
use std::path::Path;
use std::process::Command;

use serde_json::Value;
use tempfile::TempDir;

const SNAPSHOT: &str = r#"{
  "simulator": "icarus",
  "root": {
    "name": "uart_top",
    "type": "HierarchyObject",
    "children": [
      { "name": "clk", "type": "LogicObject", "width": 1, "direction": "input" },
      { "name": "rst_n", "type": "LogicObject", "width": 1, "direction": "input" },
      { "name": "tx", "type": "LogicObject", "width": 1, "direction": "output" },
      { "name": "rx", "type": "LogicObject", "width": 1, "direction": "input" },
      { "name": "BAUD_DIV", "type": "IntegerObject", "width": 32, "constant": true },
      {
        "name": "u_fifo",
        "type": "HierarchyObject",
        "children": [
          { "name": "mem[0]", "type": "LogicArrayObject", "width": 8 },
          { "name": "mem[1]", "type": "LogicArrayObject", "width": 8 },
          { "name": "count", "type": "LogicArrayObject", "width": 3 }
        ]
      }
    ]
  }
}"#;

/// Run dutstub with given arguments and return (stdout, stderr, exit_code).
fn run_dutstub(cwd: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_dutstub"))
        .args(args)
        .current_dir(cwd)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to execute dutstub");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let exit_code = output.status.code().unwrap_or(-1);

    (stdout, stderr, exit_code)
}

/// Temporary project with `uart_top.hierarchy.json` at its root.
fn project() -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    fs::write(dir.path().join("uart_top.hierarchy.json"), SNAPSHOT).expect("write snapshot");
    dir
}

fn json(stdout: &str) -> Value {
    serde_json::from_str(stdout).expect("stdout should be valid JSON")
}

// ============================================================================
// Help and Version
// ============================================================================

#[test]
fn help_and_version_exit_zero() {
    let dir = TempDir::new().unwrap();
    for flag in ["--help", "--version"] {
        let (stdout, _stderr, exit_code) = run_dutstub(dir.path(), &[flag]);
        assert_eq!(exit_code, 0, "{flag}");
        assert!(stdout.contains("dutstub"), "{flag}: {stdout}");
    }
}

// ============================================================================
// Generate
// ============================================================================

#[test]
fn generate_writes_stub_and_reports_json() {
    let dir = project();
    let (stdout, stderr, exit_code) =
        run_dutstub(dir.path(), &["generate", "--top", "uart_top", "--stats"]);
    assert_eq!(exit_code, 0, "stderr: {stderr}");

    let response = json(&stdout);
    assert_eq!(response["status"], "ok");
    assert_eq!(response["schema_version"], "1");
    assert_eq!(response["format"], "stub-interface");
    assert_eq!(response["backend"]["strategy"], "project-search");
    assert_eq!(response["stats"]["constants_skipped"], 1);

    let stub = fs::read_to_string(dir.path().join("uart_top.pyi")).unwrap();
    assert!(stub.contains("DutType = "));
    assert!(stub.contains("clk: "));
    assert!(!stub.contains("BAUD_DIV"));
}

#[test]
fn generate_module_to_explicit_outfile() {
    let dir = project();
    let out = dir.path().join("stubs/uart.py");
    let (stdout, stderr, exit_code) = run_dutstub(
        dir.path(),
        &[
            "generate",
            "--top",
            "uart_top",
            "--format",
            "module",
            "--flat",
            "--verify",
            "gate",
            "--outfile",
            out.to_str().unwrap(),
        ],
    );
    assert_eq!(exit_code, 0, "stderr: {stderr}");
    let response = json(&stdout);
    assert_eq!(response["verification"]["status"], "passed");
    let module = fs::read_to_string(&out).unwrap();
    assert!(module.starts_with("# This is an auto-generated Python module"));
    assert!(module.contains("from __future__ import annotations"));
}

#[test]
fn generate_is_deterministic() {
    let dir = project();
    let args = ["generate", "--top", "uart_top", "--metadata"];
    assert_eq!(run_dutstub(dir.path(), &args).2, 0);
    let first = fs::read(dir.path().join("uart_top.pyi")).unwrap();
    assert_eq!(run_dutstub(dir.path(), &args).2, 0);
    let second = fs::read(dir.path().join("uart_top.pyi")).unwrap();
    assert_eq!(first, second);
}

#[test]
fn config_file_controls_output_dir() {
    let dir = project();
    fs::write(
        dir.path().join(".dutstub.toml"),
        "[render]\nclass_suffix = \"Handle\"\n\n[output]\ndir = \"generated\"\n",
    )
    .unwrap();
    let (_stdout, stderr, exit_code) = run_dutstub(dir.path(), &["generate", "--top", "uart_top"]);
    assert_eq!(exit_code, 0, "stderr: {stderr}");
    let stub = fs::read_to_string(dir.path().join("generated/uart_top.pyi")).unwrap();
    assert!(stub.contains("Handle("));
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn unknown_top_is_simulator_unavailable() {
    let dir = project();
    let (stdout, stderr, exit_code) = run_dutstub(dir.path(), &["generate", "--top", "spi_top"]);
    assert_eq!(exit_code, 1);
    assert!(stdout.is_empty());
    assert!(
        stderr.starts_with("error[simulator-unavailable]: "),
        "stderr: {stderr}"
    );
    assert!(!stderr.contains("panicked"));
}

#[test]
fn json_flag_adds_error_envelope() {
    let dir = project();
    let (stdout, _stderr, exit_code) = run_dutstub(
        dir.path(),
        &["--json", "generate", "--top", "spi_top"],
    );
    assert_eq!(exit_code, 1);
    let response = json(&stdout);
    assert_eq!(response["status"], "error");
    assert_eq!(response["error"]["category"], "simulator-unavailable");
    assert_eq!(response["error"]["details"].as_array().unwrap().len(), 3);
}

#[test]
fn depth_bound_is_enforced() {
    let dir = project();
    let (_stdout, stderr, exit_code) =
        run_dutstub(dir.path(), &["analyze", "--top", "uart_top", "--max-depth", "1"]);
    assert_eq!(exit_code, 1);
    assert!(stderr.starts_with("error[depth-exceeded]: "), "stderr: {stderr}");

    let (_stdout, stderr, exit_code) =
        run_dutstub(dir.path(), &["analyze", "--top", "uart_top", "--max-depth", "0"]);
    assert_eq!(exit_code, 1);
    assert!(stderr.starts_with("error[configuration]: "), "stderr: {stderr}");
}

#[test]
fn malformed_config_is_configuration_error() {
    let dir = project();
    fs::write(dir.path().join(".dutstub.toml"), "[discovery\nmax_depth = ").unwrap();
    let (_stdout, stderr, exit_code) = run_dutstub(dir.path(), &["analyze", "--top", "uart_top"]);
    assert_eq!(exit_code, 1);
    assert!(stderr.starts_with("error[configuration]: "), "stderr: {stderr}");
}

// ============================================================================
// Other Commands
// ============================================================================

#[test]
fn coverage_round_trip_then_stale_stub() {
    let dir = project();
    assert_eq!(run_dutstub(dir.path(), &["generate", "--top", "uart_top"]).2, 0);

    let (stdout, stderr, exit_code) = run_dutstub(
        dir.path(),
        &["coverage", "--top", "uart_top", "--stub", "uart_top.pyi"],
    );
    assert_eq!(exit_code, 0, "stderr: {stderr}");
    let response = json(&stdout);
    assert_eq!(response["coverage_ratio"], 1.0);
    assert_eq!(response["passed"], true);

    fs::write(
        dir.path().join("stale.pyi"),
        "class UartTop(HierarchyObject):\n    clk: LogicObject\n",
    )
    .unwrap();
    let (stdout, stderr, exit_code) = run_dutstub(
        dir.path(),
        &["coverage", "--top", "uart_top", "--stub", "stale.pyi", "--fail-under", "0.5"],
    );
    assert_eq!(exit_code, 1);
    assert!(stderr.contains("below --fail-under 0.5"), "stderr: {stderr}");
    let response = json(&stdout);
    assert_eq!(response["passed"], false);
    assert_eq!(response["covered"], 1);
}

#[test]
fn docs_testbench_export_and_validate() {
    let dir = project();

    let (_stdout, stderr, exit_code) =
        run_dutstub(dir.path(), &["docs", "--top", "uart_top", "--format", "html"]);
    assert_eq!(exit_code, 0, "stderr: {stderr}");
    assert!(fs::read_to_string(dir.path().join("uart_top.html"))
        .unwrap()
        .contains("<html"));

    let (_stdout, stderr, exit_code) =
        run_dutstub(dir.path(), &["testbench", "--top", "uart_top", "--comprehensive"]);
    assert_eq!(exit_code, 0, "stderr: {stderr}");
    let bench = fs::read_to_string(dir.path().join("test_uart_top.py")).unwrap();
    assert!(bench.contains("from uart_top import DutType"));

    let (stdout, stderr, exit_code) =
        run_dutstub(dir.path(), &["export", "--top", "uart_top", "--format", "yaml"]);
    assert_eq!(exit_code, 0, "stderr: {stderr}");
    assert_eq!(json(&stdout)["format"], "yaml");
    assert!(dir.path().join("uart_top.export.yaml").is_file());

    let (stdout, _stderr, exit_code) = run_dutstub(
        dir.path(),
        &["validate", "--top", "uart_top", "--expect", "clk,tx,u_fifo.count"],
    );
    assert_eq!(exit_code, 0);
    assert_eq!(json(&stdout)["valid"], true);

    let (_stdout, stderr, exit_code) = run_dutstub(
        dir.path(),
        &["validate", "--top", "uart_top", "--expect", "clk,cts"],
    );
    assert_eq!(exit_code, 1);
    assert!(stderr.contains("cts"));
}

#[test]
fn simulators_lists_the_table() {
    let dir = TempDir::new().unwrap();
    let (stdout, _stderr, exit_code) = run_dutstub(dir.path(), &["simulators"]);
    assert_eq!(exit_code, 0);
    let response = json(&stdout);
    let names: Vec<&str> = response["simulators"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec!["icarus", "verilator", "questa", "modelsim", "xcelium", "vcs", "ghdl", "nvc"]
    );
}
