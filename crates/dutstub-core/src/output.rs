//! JSON output envelopes for CLI responses.
//!
//! ## Design Principles
//!
//! 1. **Always JSON on stdout:** diagnostics go to stderr, never mixed in
//! 2. **Status first:** every response begins with `status`
//! 3. **Deterministic:** same input, same bytes (field order, sorted lists)
//! 4. **Versioned:** `schema_version` enables forward compatibility

use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use crate::error::{DutError, ErrorCategory};
use crate::types::{DiscoveryStats, NodeFailure};

/// Current schema version for all responses.
pub const SCHEMA_VERSION: &str = "1";

// ============================================================================
// Envelopes
// ============================================================================

/// Successful response wrapping an operation-specific body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OkResponse<T> {
    /// Always "ok".
    pub status: String,
    pub schema_version: String,
    #[serde(flatten)]
    pub body: T,
}

impl<T> OkResponse<T> {
    pub fn new(body: T) -> Self {
        OkResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            body,
        }
    }
}

/// Error details in a response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorInfo {
    pub category: ErrorCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorInfo {
    pub fn from_error(err: &DutError) -> Self {
        ErrorInfo {
            category: err.category(),
            message: err.to_string(),
            details: err.details(),
        }
    }
}

/// Error response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    /// Always "error".
    pub status: String,
    pub schema_version: String,
    pub error: ErrorInfo,
}

impl ErrorResponse {
    pub fn from_error(err: &DutError) -> Self {
        ErrorResponse {
            status: "error".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            error: ErrorInfo::from_error(err),
        }
    }
}

// ============================================================================
// Shared Bodies
// ============================================================================

/// Discovery statistics as reported to callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatsSummary {
    pub total_objects: usize,
    pub recorded_nodes: usize,
    pub max_depth_reached: usize,
    pub errors_encountered: usize,
    pub arrays_detected: usize,
    pub constants_skipped: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<NodeFailure>,
}

impl StatsSummary {
    pub fn new(stats: &DiscoveryStats, recorded_nodes: usize) -> Self {
        StatsSummary {
            total_objects: stats.total_objects,
            recorded_nodes,
            max_depth_reached: stats.max_depth_reached,
            errors_encountered: stats.errors_encountered,
            arrays_detected: stats.arrays_detected,
            constants_skipped: stats.constants_skipped,
            failures: stats.failures.clone(),
        }
    }
}

// ============================================================================
// Emission
// ============================================================================

/// Write a response as pretty JSON followed by a newline.
pub fn emit_response<T: Serialize>(response: &T, writer: &mut impl Write) -> io::Result<()> {
    let json = serde_json::to_string_pretty(response).map_err(io::Error::other)?;
    writeln!(writer, "{}", json)?;
    writer.flush()
}
