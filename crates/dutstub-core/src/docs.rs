//! Documentation rendering (Markdown, reStructuredText, HTML).
//!
//! All three formats share one document model: a title, a fingerprint line,
//! then a sequence of sections holding tables. The summary (counts per
//! category and per bus protocol) always precedes the per-signal listing,
//! which is grouped by category in classifier precedence order. Rows are
//! lexicographic by path.

use std::collections::BTreeMap;

use crate::classify::describe;
use crate::error::DutError;
use crate::types::{
    BusProtocol, DiscoveredNode, HierarchyMapping, OutputFormat, RenderOptions, SignalCategory,
    SignalMetadata,
};
use crate::util::hierarchy_fingerprint;

const EMPTY_CELL: &str = "-";

// ============================================================================
// Document Model
// ============================================================================

#[derive(Debug)]
struct Table {
    headers: Vec<&'static str>,
    rows: Vec<Vec<String>>,
}

#[derive(Debug)]
struct Section {
    /// 2 for top-level sections, 3 for subsections.
    level: u8,
    title: String,
    table: Option<Table>,
}

#[derive(Debug)]
struct Document {
    title: String,
    fingerprint: String,
    sections: Vec<Section>,
}

fn metadata_of(node: &DiscoveredNode) -> SignalMetadata {
    node.metadata.unwrap_or(SignalMetadata {
        direction: Default::default(),
        category: SignalCategory::Data,
        bus_protocol: BusProtocol::None,
        is_signed: false,
    })
}

fn width_cell(width: Option<u32>) -> String {
    width
        .map(|w| w.to_string())
        .unwrap_or_else(|| EMPTY_CELL.to_string())
}

fn build_document(mapping: &HierarchyMapping, options: &RenderOptions) -> Document {
    let leaves: Vec<&DiscoveredNode> = mapping.leaves();
    let scopes: Vec<&DiscoveredNode> = mapping.scopes();

    let mut by_category: BTreeMap<SignalCategory, Vec<&DiscoveredNode>> = BTreeMap::new();
    let mut by_protocol: BTreeMap<BusProtocol, usize> = BTreeMap::new();
    for &leaf in &leaves {
        let meta = metadata_of(leaf);
        by_category.entry(meta.category).or_default().push(leaf);
        *by_protocol.entry(meta.bus_protocol).or_default() += 1;
    }

    let mut sections = vec![
        Section {
            level: 2,
            title: "Summary".to_string(),
            table: Some(Table {
                headers: vec!["Metric", "Value"],
                rows: vec![
                    vec!["Signals".to_string(), leaves.len().to_string()],
                    vec!["Scopes".to_string(), scopes.len().to_string()],
                    vec!["Arrays".to_string(), mapping.arrays.len().to_string()],
                    vec![
                        "Max depth".to_string(),
                        mapping.stats.max_depth_reached.to_string(),
                    ],
                    vec![
                        "Discovery errors".to_string(),
                        mapping.stats.errors_encountered.to_string(),
                    ],
                ],
            }),
        },
        Section {
            level: 3,
            title: "Signals by Category".to_string(),
            table: Some(Table {
                headers: vec!["Category", "Count"],
                rows: SignalCategory::ALL
                    .iter()
                    .filter_map(|c| {
                        by_category
                            .get(c)
                            .map(|nodes| vec![c.title().to_string(), nodes.len().to_string()])
                    })
                    .collect(),
            }),
        },
        Section {
            level: 3,
            title: "Signals by Bus Protocol".to_string(),
            table: Some(Table {
                headers: vec!["Protocol", "Count"],
                rows: BusProtocol::ALL
                    .iter()
                    .filter_map(|p| {
                        by_protocol
                            .get(p)
                            .map(|count| vec![p.as_str().to_string(), count.to_string()])
                    })
                    .collect(),
            }),
        },
        Section {
            level: 2,
            title: "Signals".to_string(),
            table: None,
        },
    ];
    for category in SignalCategory::ALL {
        let Some(nodes) = by_category.get(&category) else {
            continue;
        };
        let mut headers = vec!["Path", "Type", "Width", "Direction", "Protocol", "Signed"];
        if options.include_metadata {
            headers.push("Description");
        }
        let rows = nodes
            .iter()
            .map(|node| {
                let meta = metadata_of(node);
                let mut row = vec![
                    node.relative_path(),
                    node.runtime_type_name.clone(),
                    width_cell(node.width),
                    meta.direction.as_str().to_string(),
                    meta.bus_protocol.as_str().to_string(),
                    if meta.is_signed { "yes" } else { "no" }.to_string(),
                ];
                if options.include_metadata {
                    row.push(describe(meta.direction, node.width, &node.runtime_type_name));
                }
                row
            })
            .collect();
        sections.push(Section {
            level: 3,
            title: category.title().to_string(),
            table: Some(Table { headers, rows }),
        });
    }

    if options.include_arrays && !mapping.arrays.is_empty() {
        sections.push(Section {
            level: 2,
            title: "Arrays".to_string(),
            table: Some(Table {
                headers: vec!["Base", "Shape", "Element Type", "Elements", "Contiguous"],
                rows: mapping
                    .arrays
                    .values()
                    .map(|array| {
                        vec![
                            relative_to_root(&mapping.root, &array.base_name),
                            array.shape(),
                            array.element_type.clone(),
                            array.element_count.to_string(),
                            if array.is_contiguous { "yes" } else { "no" }.to_string(),
                        ]
                    })
                    .collect(),
            }),
        });
    }

    let non_root_scopes: Vec<&&DiscoveredNode> = scopes.iter().filter(|s| !s.is_root()).collect();
    if !non_root_scopes.is_empty() {
        sections.push(Section {
            level: 2,
            title: "Scopes".to_string(),
            table: Some(Table {
                headers: vec!["Path", "Type", "Children"],
                rows: non_root_scopes
                    .iter()
                    .map(|scope| {
                        vec![
                            scope.relative_path(),
                            scope.runtime_type_name.clone(),
                            mapping.children_of(&scope.path).len().to_string(),
                        ]
                    })
                    .collect(),
            }),
        });
    }

    Document {
        title: format!("{} Hierarchy", mapping.root),
        fingerprint: hierarchy_fingerprint(mapping),
        sections,
    }
}

fn relative_to_root(root: &str, path: &str) -> String {
    path.strip_prefix(root)
        .and_then(|rest| rest.strip_prefix('.'))
        .unwrap_or(path)
        .to_string()
}

// ============================================================================
// Emitters
// ============================================================================

/// Characters with inline meaning in Markdown table cells and headings.
const MARKDOWN_SPECIAL: &[char] = &['\\', '`', '*', '_', '[', ']', '<', '>', '|', '~', '#'];

/// Characters with inline meaning in reStructuredText.
const RST_SPECIAL: &[char] = &['\\', '`', '*', '_', '|'];

/// Replace control characters (newlines included) with spaces so a cell or
/// heading stays on one line.
fn single_line(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

fn escape_markdown(text: &str) -> String {
    let line = single_line(text);
    let mut out = String::with_capacity(line.len());
    for c in line.chars() {
        if MARKDOWN_SPECIAL.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escape inline markup; a leading `-` or `+` would open a nested list.
fn escape_rst(text: &str) -> String {
    let line = single_line(text);
    let mut out = String::with_capacity(line.len());
    for (i, c) in line.chars().enumerate() {
        if RST_SPECIAL.contains(&c) || (i == 0 && matches!(c, '-' | '+')) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn emit_markdown(doc: &Document) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {}\n\n", escape_markdown(&doc.title)));
    out.push_str(&format!("> hierarchy-fingerprint: `{}`\n", doc.fingerprint));
    for section in &doc.sections {
        out.push('\n');
        let hashes = "#".repeat(section.level as usize);
        out.push_str(&format!("{} {}\n", hashes, section.title));
        if let Some(table) = &section.table {
            out.push('\n');
            out.push_str(&format!("| {} |\n", table.headers.join(" | ")));
            let rule: Vec<&str> = table.headers.iter().map(|_| "---").collect();
            out.push_str(&format!("|{}|\n", rule.join("|")));
            for row in &table.rows {
                let cells: Vec<String> = row.iter().map(|c| escape_markdown(c)).collect();
                out.push_str(&format!("| {} |\n", cells.join(" | ")));
            }
        }
    }
    out
}

fn rst_heading(title: &str, underline: char) -> String {
    let rule = underline.to_string().repeat(title.chars().count());
    format!("{}\n{}\n", title, rule)
}

fn emit_rst(doc: &Document) -> String {
    let mut out = String::new();
    out.push_str(&rst_heading(&escape_rst(&doc.title), '='));
    out.push_str(&format!("\n*hierarchy-fingerprint:* ``{}``\n", doc.fingerprint));
    for section in &doc.sections {
        out.push('\n');
        let underline = if section.level <= 2 { '-' } else { '~' };
        out.push_str(&rst_heading(&escape_rst(&section.title), underline));
        if let Some(table) = &section.table {
            out.push_str("\n.. list-table::\n   :header-rows: 1\n\n");
            let mut emit_row = |cells: &[String]| {
                for (i, cell) in cells.iter().enumerate() {
                    let bullet = if i == 0 { "* -" } else { "  -" };
                    let text = if cell.is_empty() { EMPTY_CELL } else { cell };
                    out.push_str(&format!("   {} {}\n", bullet, escape_rst(text)));
                }
            };
            let headers: Vec<String> = table.headers.iter().map(|h| h.to_string()).collect();
            emit_row(&headers);
            for row in &table.rows {
                emit_row(row);
            }
        }
    }
    out
}

/// Escape text for HTML element content and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn emit_html(doc: &Document) -> String {
    let title = escape_html(&doc.title);
    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    out.push_str("<meta charset=\"utf-8\">\n");
    out.push_str(&format!("<title>{}</title>\n", title));
    out.push_str(&format!(
        "<meta name=\"hierarchy-fingerprint\" content=\"{}\">\n",
        doc.fingerprint
    ));
    out.push_str("</head>\n<body>\n");
    out.push_str(&format!("<h1>{}</h1>\n", title));
    for section in &doc.sections {
        let tag = format!("h{}", section.level);
        out.push_str(&format!(
            "<{tag}>{}</{tag}>\n",
            escape_html(&section.title),
            tag = tag
        ));
        if let Some(table) = &section.table {
            out.push_str("<table>\n<thead>\n<tr>");
            for header in &table.headers {
                out.push_str(&format!("<th>{}</th>", escape_html(header)));
            }
            out.push_str("</tr>\n</thead>\n<tbody>\n");
            for row in &table.rows {
                out.push_str("<tr>");
                for cell in row {
                    out.push_str(&format!("<td>{}</td>", escape_html(&single_line(cell))));
                }
                out.push_str("</tr>\n");
            }
            out.push_str("</tbody>\n</table>\n");
        }
    }
    out.push_str("</body>\n</html>\n");
    out
}

/// Render documentation for `mapping` in one of the documentation formats.
pub fn render_docs(mapping: &HierarchyMapping, options: &RenderOptions) -> Result<String, DutError> {
    let doc = build_document(mapping, options);
    match options.output_format {
        OutputFormat::Markdown => Ok(emit_markdown(&doc)),
        OutputFormat::Rst => Ok(emit_rst(&doc)),
        OutputFormat::Html => Ok(emit_html(&doc)),
        other => Err(DutError::invalid_args(format!(
            "'{}' is not a documentation format",
            other
        ))),
    }
}

// ============================================================================
// Tests
// ============================================================================
