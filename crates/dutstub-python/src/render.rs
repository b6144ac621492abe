//! Render dispatcher over all output formats.
//!
//! Python formats pass through the syntax gate before they are returned;
//! documentation formats are produced by the core renderer.

use dutstub_core::docs::render_docs;
use dutstub_core::{DutError, HierarchyMapping, RenderOptions};
use tracing::{debug, warn};

use crate::parser::{parse_module, Module};
use crate::stubgen::generate_stub;

/// Render `mapping` in `options.output_format`.
///
/// A Python artifact that fails to parse is a [`DutError::RenderValidation`]
/// and is never returned.
pub fn render(mapping: &HierarchyMapping, options: &RenderOptions) -> Result<String, DutError> {
    if !options.output_format.is_source() {
        return render_docs(mapping, options);
    }
    let text = generate_stub(mapping, options)?;
    check_syntax(&text)?;
    debug!(
        format = options.output_format.as_str(),
        bytes = text.len(),
        "rendered artifact passed syntax gate"
    );
    Ok(text)
}

/// Parse `source` as Python, mapping failures to `RenderValidation`.
pub fn check_syntax(source: &str) -> Result<Module, DutError> {
    parse_module(source).map_err(|err| {
        warn!(line = err.line, col = err.col, "syntax gate rejected artifact: {}", err.message);
        DutError::from(err)
    })
}
