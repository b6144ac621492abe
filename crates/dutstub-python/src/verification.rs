//! Artifact verification.
//!
//! The in-crate syntax gate always runs. `Interpreter` mode additionally
//! compiles the written file with `python3 -m py_compile`, killed after a
//! timeout.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use dutstub_core::DutError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use wait_timeout::ChildExt;

use crate::parser::parse_module;

// ============================================================================
// Types
// ============================================================================

/// How much verification to run on a written artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMode {
    /// In-crate parser only.
    #[default]
    Gate,
    /// Syntax gate plus the external interpreter.
    Interpreter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Passed,
    Failed,
    Skipped,
}

/// Result of a single verification check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationCheck {
    /// Check name (`syntax-gate`, `py_compile`).
    pub name: String,
    pub status: VerificationStatus,
    pub duration_ms: u64,
    /// Diagnostic output, when there is any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// Result of the verification pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub status: VerificationStatus,
    pub mode: VerificationMode,
    pub checks: Vec<VerificationCheck>,
}

impl VerificationResult {
    fn from_checks(mode: VerificationMode, checks: Vec<VerificationCheck>) -> Self {
        let status = if checks.iter().any(|c| c.status == VerificationStatus::Failed) {
            VerificationStatus::Failed
        } else {
            VerificationStatus::Passed
        };
        VerificationResult {
            status,
            mode,
            checks,
        }
    }

    /// First failing check, if any.
    pub fn first_failure(&self) -> Option<&VerificationCheck> {
        self.checks
            .iter()
            .find(|c| c.status == VerificationStatus::Failed)
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum VerificationError {
    /// No Python interpreter on `PATH`.
    #[error("no Python interpreter found on PATH (tried python3, python)")]
    InterpreterNotFound,

    /// A check ran and failed.
    #[error("{check} failed: {output}")]
    Failed { check: String, output: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl From<VerificationError> for DutError {
    fn from(err: VerificationError) -> Self {
        match err {
            VerificationError::InterpreterNotFound => DutError::configuration(err.to_string()),
            VerificationError::Failed { .. } => DutError::RenderValidation {
                message: err.to_string(),
                line: 0,
                col: 0,
            },
            VerificationError::Io(e) => DutError::Internal {
                message: format!("verification I/O failed: {}", e),
            },
        }
    }
}

pub type VerificationResultType<T> = Result<T, VerificationError>;

// ============================================================================
// Verification Functions
// ============================================================================

/// Locate a Python interpreter.
pub fn find_python() -> VerificationResultType<PathBuf> {
    which::which("python3")
        .or_else(|_| which::which("python"))
        .map_err(|_| VerificationError::InterpreterNotFound)
}

/// Verify a written artifact.
///
/// Failing checks are reported in the result, not as errors; errors mean a
/// check could not be run at all.
pub fn verify_artifact(
    path: &Path,
    mode: VerificationMode,
    timeout: Duration,
) -> VerificationResultType<VerificationResult> {
    let source = std::fs::read_to_string(path)?;
    let mut checks = vec![run_syntax_gate(&source)];

    if mode == VerificationMode::Interpreter {
        let python = find_python()?;
        checks.push(run_py_compile(&python, path, timeout)?);
    }

    let result = VerificationResult::from_checks(mode, checks);
    info!(
        path = %path.display(),
        status = ?result.status,
        "artifact verified"
    );
    Ok(result)
}

/// Run the in-crate parser as a check.
pub fn run_syntax_gate(source: &str) -> VerificationCheck {
    let start = Instant::now();
    let (status, output) = match parse_module(source) {
        Ok(_) => (VerificationStatus::Passed, None),
        Err(err) => (VerificationStatus::Failed, Some(err.to_string())),
    };
    VerificationCheck {
        name: "syntax-gate".to_string(),
        status,
        duration_ms: start.elapsed().as_millis() as u64,
        output,
    }
}

/// Compile `file` with `python -m py_compile`.
pub fn run_py_compile(
    python_path: &Path,
    file: &Path,
    timeout: Duration,
) -> VerificationResultType<VerificationCheck> {
    let start = Instant::now();
    let mut child = Command::new(python_path)
        .args(["-m", "py_compile"])
        .arg(file)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let Some(exit) = child.wait_timeout(timeout)? else {
        let _ = child.kill();
        let _ = child.wait();
        warn!(timeout_ms = timeout.as_millis() as u64, "py_compile timed out");
        return Ok(VerificationCheck {
            name: "py_compile".to_string(),
            status: VerificationStatus::Failed,
            duration_ms: start.elapsed().as_millis() as u64,
            output: Some(format!("timed out after {:?}", timeout)),
        });
    };

    let mut combined = String::new();
    if let Some(mut stdout) = child.stdout.take() {
        stdout.read_to_string(&mut combined)?;
    }
    if let Some(mut stderr) = child.stderr.take() {
        stderr.read_to_string(&mut combined)?;
    }

    Ok(VerificationCheck {
        name: "py_compile".to_string(),
        status: if exit.success() {
            VerificationStatus::Passed
        } else {
            VerificationStatus::Failed
        },
        duration_ms: start.elapsed().as_millis() as u64,
        output: if combined.is_empty() {
            None
        } else {
            Some(combined)
        },
    })
}

// ============================================================================
// Tests
// ============================================================================
