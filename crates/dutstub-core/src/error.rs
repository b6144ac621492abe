//! Error types and error categories for dutstub.
//!
//! This module provides a unified error type (`DutError`) that bridges
//! subsystem errors (simulator handles, stub parsing, external verification)
//! into one taxonomy suitable for the one-line CLI diagnostic and for JSON
//! error envelopes.
//!
//! ## Error Categories
//!
//! Every variant maps to a stable kebab-case label:
//! - `configuration`: invalid caller parameters (e.g. a non-positive depth bound)
//! - `depth-exceeded`: traversal hit the depth bound; fatal to the whole discovery
//! - `render-validation`: a rendered artifact failed the syntax gate
//! - `simulator-unavailable`: no backend strategy produced a root handle
//! - `invalid-arguments`: malformed request from the caller
//! - `io`: reading or writing an artifact failed
//! - `internal`: bugs, unexpected state
//!
//! Per-node discovery failures are deliberately absent: they are recorded as
//! [`NodeFailure`](crate::types::NodeFailure) entries in the discovery
//! statistics and never raised.

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::handle::HandleError;

/// Exit code used by the CLI for every propagated failure.
pub const FAILURE_EXIT_CODE: u8 = 1;

// ============================================================================
// Error Categories
// ============================================================================

/// Category of a propagated error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    Configuration,
    DepthExceeded,
    RenderValidation,
    SimulatorUnavailable,
    InvalidArguments,
    Io,
    Internal,
}

impl ErrorCategory {
    /// Stable label used in diagnostics and JSON output.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::DepthExceeded => "depth-exceeded",
            ErrorCategory::RenderValidation => "render-validation",
            ErrorCategory::SimulatorUnavailable => "simulator-unavailable",
            ErrorCategory::InvalidArguments => "invalid-arguments",
            ErrorCategory::Io => "io",
            ErrorCategory::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Strategy Attempts
// ============================================================================

/// One attempt to obtain a root handle from the simulator collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyAttempt {
    /// Strategy name (e.g. `snapshot-file`, `project-search`, `dumper-command`).
    pub strategy: String,
    /// Why the strategy did not produce a handle.
    pub outcome: String,
}

impl StrategyAttempt {
    pub fn new(strategy: impl Into<String>, outcome: impl Into<String>) -> Self {
        StrategyAttempt {
            strategy: strategy.into(),
            outcome: outcome.into(),
        }
    }
}

fn format_attempts(attempts: &[StrategyAttempt]) -> String {
    if attempts.is_empty() {
        return "no strategies".to_string();
    }
    attempts
        .iter()
        .map(|a| format!("{}: {}", a.strategy, a.outcome))
        .collect::<Vec<_>>()
        .join("; ")
}

// ============================================================================
// Unified Error Type
// ============================================================================

/// Unified error type for library callers and CLI output.
#[derive(Debug, Error)]
pub enum DutError {
    /// Caller supplied invalid parameters.
    #[error("invalid configuration: {message}")]
    Configuration { message: String },

    /// Traversal would exceed the depth bound.
    #[error("maximum hierarchy depth ({max_depth}) exceeded at path: {path}")]
    DepthExceeded { path: String, max_depth: usize },

    /// Rendered artifact failed the syntax gate.
    #[error("rendered artifact is not valid source at {line}:{col}: {message}")]
    RenderValidation { message: String, line: u32, col: u32 },

    /// No backend strategy could produce a root handle.
    #[error("no simulator backend could provide '{top}' ({})", format_attempts(.strategies))]
    SimulatorUnavailable {
        top: String,
        strategies: Vec<StrategyAttempt>,
    },

    /// Invalid arguments from caller.
    #[error("invalid arguments: {message}")]
    InvalidArguments { message: String },

    /// Reading or writing a file failed.
    #[error("{path}: {message}")]
    Io { path: String, message: String },

    /// Internal error (bug or unexpected state).
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl From<&DutError> for ErrorCategory {
    fn from(err: &DutError) -> Self {
        match err {
            DutError::Configuration { .. } => ErrorCategory::Configuration,
            DutError::DepthExceeded { .. } => ErrorCategory::DepthExceeded,
            DutError::RenderValidation { .. } => ErrorCategory::RenderValidation,
            DutError::SimulatorUnavailable { .. } => ErrorCategory::SimulatorUnavailable,
            DutError::InvalidArguments { .. } => ErrorCategory::InvalidArguments,
            DutError::Io { .. } => ErrorCategory::Io,
            DutError::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

impl From<HandleError> for DutError {
    fn from(err: HandleError) -> Self {
        DutError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<io::Error> for DutError {
    fn from(err: io::Error) -> Self {
        DutError::Io {
            path: "<io>".to_string(),
            message: err.to_string(),
        }
    }
}

impl DutError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        DutError::Configuration {
            message: message.into(),
        }
    }

    /// Create an invalid arguments error.
    pub fn invalid_args(message: impl Into<String>) -> Self {
        DutError::InvalidArguments {
            message: message.into(),
        }
    }

    /// Create an I/O error tied to a path.
    pub fn io(path: impl fmt::Display, err: impl fmt::Display) -> Self {
        DutError::Io {
            path: path.to_string(),
            message: err.to_string(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        DutError::Internal {
            message: message.into(),
        }
    }

    /// Get the category for this error.
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::from(self)
    }

    /// Structured details for JSON output, when the variant carries any.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            DutError::DepthExceeded { path, max_depth } => Some(serde_json::json!({
                "path": path,
                "max_depth": max_depth,
            })),
            DutError::RenderValidation { line, col, .. } => Some(serde_json::json!({
                "line": line,
                "col": col,
            })),
            DutError::SimulatorUnavailable { strategies, .. } => {
                serde_json::to_value(strategies).ok()
            }
            _ => None,
        }
    }

    /// One-line categorized diagnostic, e.g. `error[depth-exceeded]: ...`.
    pub fn diagnostic(&self) -> String {
        format!("error[{}]: {}", self.category(), self)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod category_mapping {
        use super::*;

        #[test]
        fn configuration_maps_to_configuration() {
            let err = DutError::configuration("max_depth must be positive");
            assert_eq!(err.category(), ErrorCategory::Configuration);
        }

        #[test]
        fn depth_exceeded_maps_to_depth_exceeded() {
            let err = DutError::DepthExceeded {
                path: "top.a.b".to_string(),
                max_depth: 1,
            };
            assert_eq!(err.category(), ErrorCategory::DepthExceeded);
        }

        #[test]
        fn handle_errors_bridge_to_internal() {
            let err: DutError = HandleError::Unsupported.into();
            assert_eq!(err.category(), ErrorCategory::Internal);
        }

        #[test]
        fn labels_are_kebab_case() {
            assert_eq!(ErrorCategory::RenderValidation.as_str(), "render-validation");
            assert_eq!(
                serde_json::to_string(&ErrorCategory::SimulatorUnavailable).unwrap(),
                "\"simulator-unavailable\""
            );
        }
    }

    mod display {
        use super::*;

        #[test]
        fn depth_exceeded_names_offending_path() {
            let err = DutError::DepthExceeded {
                path: "top.u_core.u_alu".to_string(),
                max_depth: 1,
            };
            assert_eq!(
                err.diagnostic(),
                "error[depth-exceeded]: maximum hierarchy depth (1) exceeded at path: top.u_core.u_alu"
            );
        }

        #[test]
        fn simulator_unavailable_lists_attempts() {
            let err = DutError::SimulatorUnavailable {
                top: "cpu".to_string(),
                strategies: vec![
                    StrategyAttempt::new("snapshot-file", "not given"),
                    StrategyAttempt::new("project-search", "no cpu.hierarchy.json found"),
                ],
            };
            let text = err.to_string();
            assert!(text.contains("snapshot-file: not given"));
            assert!(text.contains("project-search: no cpu.hierarchy.json found"));
            assert!(err.details().is_some());
        }

        #[test]
        fn diagnostic_is_single_line() {
            let err = DutError::io("out/dut.pyi", "permission denied");
            assert!(!err.diagnostic().contains('\n'));
        }
    }
}
