//! Core engine for dutstub.
//!
//! This crate is independent of any host language:
//! - Data model for discovered hierarchies
//! - Simulator handle capability trait and an in-memory snapshot handle
//! - Signal classifier and array pattern recognizer
//! - Hierarchy walker
//! - Documentation renderer (Markdown, reStructuredText, HTML)
//! - Interface validation, complexity metrics, export
//! - Configuration, error taxonomy, JSON response envelopes

pub mod analysis;
pub mod arrays;
pub mod classify;
pub mod config;
pub mod docs;
pub mod error;
pub mod export;
pub mod handle;
pub mod output;
pub mod snapshot;
pub mod types;
pub mod util;
pub mod walker;

// Re-exports for convenience
pub use analysis::{analyze_complexity, validate_interface, ComplexityReport, InterfaceValidation};
pub use arrays::{extract_array_info, ArrayCollector};
pub use classify::classify;
pub use config::Config;
pub use docs::render_docs;
pub use error::{DutError, ErrorCategory, StrategyAttempt};
pub use export::{export_hierarchy, ExportFormat};
pub use handle::{HandleError, SimHandle};
pub use snapshot::{SnapshotDocument, SnapshotHandle, SnapshotNode};
pub use types::{
    ArrayDescriptor, BusProtocol, DiscoveredNode, DiscoveryStats, Direction, HierarchyMapping,
    NodeFailure, OutputFormat, RenderOptions, SignalCategory, SignalMetadata,
};
pub use walker::{discover, discover_with, DiscoveryOptions};
