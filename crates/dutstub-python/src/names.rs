//! Name utilities for generated Python: class names, type annotations,
//! docstrings, and import blocks.

use std::collections::BTreeSet;

use crate::validation::is_python_keyword;

/// cocotb handle classes that may appear verbatim in annotations.
pub const KNOWN_HANDLE_TYPES: &[&str] = &[
    "ArrayObject",
    "EnumObject",
    "HierarchyArrayObject",
    "HierarchyObject",
    "IntegerObject",
    "LogicArrayObject",
    "LogicObject",
    "RealObject",
    "SimHandleBase",
    "StringObject",
];

/// Base class for scope classes and the fallback for unknown scope types.
pub const SCOPE_BASE: &str = "HierarchyObject";

/// Fallback annotation for unknown leaf types.
pub const LEAF_FALLBACK: &str = "SimHandleBase";

/// Module-level names generated code refers to besides the handle classes.
/// A generated class must never rebind one of them.
pub const RESERVED_NAMES: &[&str] = &[
    "DutType",
    "IndexError",
    "Iterator",
    "Literal",
    "NotImplementedError",
    "Sequence",
    "TYPE_CHECKING",
    "annotations",
    "cast",
    "overload",
];

/// Convert a hardware name to CapWords.
///
/// `_`, `-` and any other non-alphanumeric character separate words, as does
/// a lower-to-upper case transition. Each word keeps its first character
/// upper-cased and the rest lower-cased.
///
/// ```
/// use dutstub_python::names::to_capwords;
///
/// assert_eq!(to_capwords("cpu_core"), "CpuCore");
/// assert_eq!(to_capwords("someVariableName"), "SomeVariableName");
/// assert_eq!(to_capwords("XMLHttpRequest"), "XmlhttpRequest");
/// assert_eq!(to_capwords("a_b_c"), "ABC");
/// ```
pub fn to_capwords(name: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for ch in name.chars() {
        if !ch.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if ch.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        current.push(ch);
        prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
    }
    if !current.is_empty() {
        words.push(current);
    }

    let mut out = String::with_capacity(name.len());
    for word in words {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.extend(chars.flat_map(char::to_lowercase));
        }
    }
    out
}

/// Class name for one hierarchy segment: leading `u_` instance prefix
/// stripped, CapWords, then affixes.
///
/// Names that would not be valid identifiers get a `Scope` prefix.
pub fn class_name_for_segment(segment: &str, prefix: &str, suffix: &str) -> String {
    let stripped = segment.strip_prefix("u_").unwrap_or(segment);
    let stem = to_capwords(stripped);
    let stem = if stem.is_empty() {
        "Scope".to_string()
    } else if stem.starts_with(|c: char| c.is_ascii_digit()) {
        format!("Scope{}", stem)
    } else {
        stem
    };
    let name = format!("{}{}{}", prefix, stem, suffix);
    if is_python_keyword(&name) {
        format!("{}_", name)
    } else {
        name
    }
}

/// Class name for a whole dotted path, used when segment names collide.
pub fn class_name_for_path(path: &str, prefix: &str, suffix: &str) -> String {
    let joined: String = path
        .split('.')
        .map(|segment| to_capwords(segment.strip_prefix("u_").unwrap_or(segment)))
        .collect();
    class_name_for_segment(&joined, prefix, suffix)
}

/// Annotation for a node's runtime type.
pub fn annotation_for(runtime_type: &str, is_scope: bool) -> &str {
    if let Some(known) = KNOWN_HANDLE_TYPES.iter().find(|t| **t == runtime_type) {
        *known
    } else if is_scope {
        SCOPE_BASE
    } else {
        LEAF_FALLBACK
    }
}

/// Re-indent a docstring body.
///
/// The text is trimmed, common indentation of lines after the first is
/// removed, and every non-empty line is prefixed with `indent` spaces.
pub fn format_docstring(doc: &str, indent: usize) -> String {
    let doc = doc.trim();
    if doc.is_empty() {
        return String::new();
    }
    let lines: Vec<&str> = doc.lines().collect();
    let common = lines
        .iter()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);
    let pad = " ".repeat(indent);
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let body = if i == 0 {
                *line
            } else {
                line.get(common..).unwrap_or_else(|| line.trim_start())
            };
            if body.trim().is_empty() {
                String::new()
            } else {
                format!("{}{}", pad, body.trim_end())
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Escape text for inclusion in a triple-double-quoted docstring.
pub fn escape_docstring(text: &str) -> String {
    text.replace('\\', "\\\\").replace("\"\"\"", "\\\"\\\"\\\"")
}

/// Python string literal for an arbitrary key, double-quoted.
pub fn string_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

// ============================================================================
// Imports
// ============================================================================

/// Names to import, collected while rendering.
///
/// Type-only names are imported under an `if TYPE_CHECKING:` guard, which
/// adds `TYPE_CHECKING` itself to the runtime typing import.
#[derive(Debug, Clone, Default)]
pub struct ImportSet {
    handle: BTreeSet<String>,
    typing: BTreeSet<String>,
    type_only: BTreeSet<String>,
}

impl ImportSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_handle(&mut self, name: &str) {
        self.handle.insert(name.to_string());
    }

    pub fn add_typing(&mut self, name: &str) {
        self.typing.insert(name.to_string());
    }

    /// A typing name only needed by annotations.
    pub fn add_type_only(&mut self, name: &str) {
        self.type_only.insert(name.to_string());
    }

    pub fn has_typing(&self, name: &str) -> bool {
        self.typing.contains(name) || self.type_only.contains(name)
    }

    /// Render the import block: cocotb handles, then typing, then the
    /// `TYPE_CHECKING` guard.
    pub fn render(&self) -> String {
        let mut typing = self.typing.clone();
        if !self.type_only.is_empty() {
            typing.insert("TYPE_CHECKING".to_string());
        }
        let mut blocks = Vec::new();
        if !self.handle.is_empty() {
            blocks.push(import_statement("cocotb.handle", &self.handle));
        }
        if !typing.is_empty() {
            blocks.push(import_statement("typing", &typing));
        }
        if !self.type_only.is_empty() {
            let names: Vec<&str> = self.type_only.iter().map(String::as_str).collect();
            blocks.push(format!(
                "if TYPE_CHECKING:\n    from typing import {}\n",
                names.join(", ")
            ));
        }
        blocks.join("\n")
    }
}

fn import_statement(module: &str, names: &BTreeSet<String>) -> String {
    if names.len() == 1 {
        let name = names.iter().next().map(String::as_str).unwrap_or_default();
        return format!("from {} import {}\n", module, name);
    }
    let mut out = format!("from {} import (\n", module);
    for name in names {
        out.push_str("    ");
        out.push_str(name);
        out.push_str(",\n");
    }
    out.push_str(")\n");
    out
}
