//! Typed Python stub generation.
//!
//! Renders a [`HierarchyMapping`] as either a `.pyi` interface
//! (`stub-interface`) or an importable module (`module-source`). Every
//! iteration is ordered by path or name so the same mapping and options
//! always produce the same bytes.
//!
//! Layout:
//! - header banner with the hierarchy fingerprint and a usage docstring
//! - imports assembled from the names actually used
//! - one `Sequence` wrapper class per folded array (when enabled)
//! - nested mode: one class per scope; flat mode: one class for the root
//! - `DutType = <root class>`
//!
//! Segments that are not valid Python identifiers are never emitted as
//! attributes; each gets its own `@overload` of `__getitem__` keyed by a
//! `Literal` string, followed by a catch-all overload.

use std::collections::{BTreeMap, BTreeSet};

use dutstub_core::arrays::parse_indexed;
use dutstub_core::classify::describe;
use dutstub_core::types::{join_path, ArrayDescriptor, DiscoveredNode, HierarchyMapping};
use dutstub_core::util::hierarchy_fingerprint;
use dutstub_core::{DutError, OutputFormat, RenderOptions};
use tracing::debug;

use crate::names::{
    annotation_for, class_name_for_path, class_name_for_segment, escape_docstring,
    format_docstring, string_literal, ImportSet, KNOWN_HANDLE_TYPES, LEAF_FALLBACK,
    RESERVED_NAMES, SCOPE_BASE,
};
use crate::validation::is_valid_identifier;

const INDENT: &str = "    ";

/// Element annotation of a multi-dimensional wrapper: indexing the outer
/// axis yields a row, not a leaf.
const ROW_ANNOTATION: &str = "ArrayObject";

/// Render a typed stub or module for `mapping`.
///
/// `options.output_format` must be `stub-interface` or `module-source`.
pub fn generate_stub(mapping: &HierarchyMapping, options: &RenderOptions) -> Result<String, DutError> {
    if !options.output_format.is_source() {
        return Err(DutError::invalid_args(format!(
            "format '{}' is not a Python source format",
            options.output_format.as_str()
        )));
    }
    let root = mapping
        .root_node()
        .ok_or_else(|| DutError::invalid_args("cannot render an empty hierarchy"))?;
    let generator = StubGenerator::new(mapping, root, options);
    Ok(generator.render())
}

// ============================================================================
// Members
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemberKind {
    Signal,
    Scope,
    Array,
}

/// One declaration inside a generated class.
#[derive(Debug, Clone)]
struct Member {
    /// Attribute name, or `Literal` key when not an identifier.
    key: String,
    annotation: String,
    kind: MemberKind,
    comment: Option<String>,
}

#[derive(Debug, Default)]
struct ClassBody {
    attributes: Vec<Member>,
    keyed: Vec<Member>,
}

impl ClassBody {
    fn push(&mut self, member: Member, as_attribute: bool) {
        if as_attribute {
            self.attributes.push(member);
        } else {
            self.keyed.push(member);
        }
    }

    fn sort(&mut self) {
        self.attributes.sort_by(|a, b| a.key.cmp(&b.key));
        self.keyed.sort_by(|a, b| a.key.cmp(&b.key));
    }

    fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.keyed.is_empty()
    }
}

/// Array wrapper class plan.
#[derive(Debug)]
struct Wrapper<'m> {
    class_name: String,
    descriptor: &'m ArrayDescriptor,
    element_annotation: String,
    /// Observed outermost indices when the array is sparse.
    sparse_indices: Option<Vec<i64>>,
}

// ============================================================================
// Generator
// ============================================================================

struct StubGenerator<'m> {
    mapping: &'m HierarchyMapping,
    root: &'m DiscoveredNode,
    options: &'m RenderOptions,
    module_source: bool,
    imports: ImportSet,
    /// Scope path -> class name (nested mode only).
    scope_classes: BTreeMap<String, String>,
    /// Array base path -> wrapper.
    wrappers: BTreeMap<String, Wrapper<'m>>,
    /// Parent scope path -> array bases directly below it.
    wrappers_by_parent: BTreeMap<String, Vec<String>>,
    /// Every class this render defines.
    generated_classes: BTreeSet<String>,
    root_class: String,
}

impl<'m> StubGenerator<'m> {
    fn new(mapping: &'m HierarchyMapping, root: &'m DiscoveredNode, options: &'m RenderOptions) -> Self {
        let mut generator = StubGenerator {
            mapping,
            root,
            options,
            module_source: options.output_format == OutputFormat::ModuleSource,
            imports: ImportSet::new(),
            scope_classes: BTreeMap::new(),
            wrappers: BTreeMap::new(),
            wrappers_by_parent: BTreeMap::new(),
            generated_classes: BTreeSet::new(),
            root_class: String::new(),
        };
        generator.plan_names();
        generator
    }

    fn is_scope(&self, node: &DiscoveredNode) -> bool {
        node.is_root() || node.is_scope || self.mapping.has_descendants(&node.path)
    }

    /// Decide every class name up front so references resolve regardless of
    /// emission order.
    fn plan_names(&mut self) {
        let prefix = self.options.class_prefix.as_str();
        let suffix = self.options.class_suffix.as_str();
        let mut taken: BTreeSet<String> = KNOWN_HANDLE_TYPES
            .iter()
            .chain(RESERVED_NAMES)
            .map(|name| name.to_string())
            .collect();

        let root_candidate = class_name_for_segment(self.root.name(), prefix, suffix);
        let root_name = assign_names(
            &[(self.root.path.clone(), root_candidate.clone(), root_candidate)],
            &mut taken,
        )
        .into_values()
        .next()
        .unwrap_or_default();
        self.root_class = root_name.clone();

        if !self.options.flat_hierarchy {
            let candidates: Vec<(String, String, String)> = self
                .mapping
                .sorted()
                .into_iter()
                .filter(|node| !node.is_root() && self.is_scope(node))
                .map(|node| {
                    (
                        node.path.clone(),
                        class_name_for_segment(node.name(), prefix, suffix),
                        class_name_for_path(&node.path, prefix, suffix),
                    )
                })
                .collect();
            self.scope_classes = assign_names(&candidates, &mut taken);
            self.scope_classes.insert(self.root.path.clone(), root_name);
        }

        if self.options.include_arrays {
            let array_suffix = format!("Array{}", suffix);
            let candidates: Vec<(String, String, String)> = self
                .mapping
                .arrays
                .values()
                .map(|desc| {
                    (
                        desc.base_name.clone(),
                        class_name_for_segment(desc.short_name(), prefix, &array_suffix),
                        class_name_for_path(&desc.base_name, prefix, &array_suffix),
                    )
                })
                .collect();
            let names = assign_names(&candidates, &mut taken);
            self.plan_wrappers(names);
        }
        self.generated_classes = self
            .scope_classes
            .values()
            .chain(self.wrappers.values().map(|w| &w.class_name))
            .cloned()
            .collect();
        debug!(
            scopes = self.scope_classes.len(),
            wrappers = self.wrappers.len(),
            "planned stub classes"
        );
    }

    /// Plan every wrapper from one pass over the mapping: observed outer
    /// indices and whether any element is itself a scope.
    fn plan_wrappers(&mut self, names: BTreeMap<String, String>) {
        let mapping = self.mapping;
        let mut elements: BTreeMap<String, (BTreeSet<i64>, bool)> = BTreeMap::new();
        for node in mapping.iter() {
            let Some((base, indices)) = parse_indexed(&node.path) else {
                continue;
            };
            if !names.contains_key(&base) {
                continue;
            }
            let is_scope = self.is_scope(node);
            let entry = elements.entry(base).or_default();
            if let Some(first) = indices.first() {
                entry.0.insert(*first);
            }
            entry.1 |= is_scope;
        }

        for (base, class_name) in names {
            let Some(descriptor) = mapping.arrays.get(&base) else {
                continue;
            };
            let (outer, element_is_scope) = elements.remove(&base).unwrap_or_default();
            let element_annotation = if descriptor.is_multidimensional() {
                ROW_ANNOTATION.to_string()
            } else if descriptor.is_mixed() {
                LEAF_FALLBACK.to_string()
            } else {
                annotation_for(&descriptor.element_type, element_is_scope).to_string()
            };
            let sparse_indices = if descriptor.is_contiguous {
                None
            } else {
                Some(outer.into_iter().collect())
            };
            if let Some((parent, _)) = base.rsplit_once('.') {
                self.wrappers_by_parent
                    .entry(parent.to_string())
                    .or_default()
                    .push(base.clone());
            }
            self.wrappers.insert(
                base,
                Wrapper {
                    class_name,
                    descriptor,
                    element_annotation,
                    sparse_indices,
                },
            );
        }
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    fn render(mut self) -> String {
        self.imports.add_handle(SCOPE_BASE);

        let mut classes = Vec::new();
        for wrapper in self.wrappers.values() {
            classes.push(self.render_wrapper(wrapper));
        }
        if !self.wrappers.is_empty() {
            self.imports.add_typing("Sequence");
            self.add_annotation_typing("Iterator");
            for wrapper in self.wrappers.values() {
                self.imports.add_handle(&wrapper.element_annotation);
            }
        }

        if self.options.flat_hierarchy {
            let body = self.flat_body();
            classes.push(self.render_class(&self.root_class.clone(), self.root, body));
        } else {
            let scopes: Vec<&'m DiscoveredNode> = self
                .mapping
                .sorted()
                .into_iter()
                .filter(|node| self.scope_classes.contains_key(&node.path))
                .collect();
            for scope in scopes {
                let body = self.nested_body(scope);
                let class_name = self.scope_classes[&scope.path].clone();
                classes.push(self.render_class(&class_name, scope, body));
            }
        }

        let mut out = self.render_header();
        out.push('\n');
        if self.module_source {
            out.push_str("from __future__ import annotations\n\n");
        }
        out.push_str(&self.imports.render());
        for class in classes {
            out.push_str("\n\n");
            out.push_str(&class);
        }
        out.push_str("\n\n# Type alias for the DUT root\n");
        out.push_str(&format!("DutType = {}\n", self.root_class));
        if self.module_source {
            out.push_str("\n# Signal access is resolved by the simulator at run time;\n");
            out.push_str("# these classes describe its shape for type checkers.\n");
        }
        out
    }

    fn add_annotation_typing(&mut self, name: &str) {
        if self.module_source {
            self.imports.add_type_only(name);
        } else {
            self.imports.add_typing(name);
        }
    }

    fn render_header(&self) -> String {
        let kind = if self.module_source {
            "Python module"
        } else {
            "stub file"
        };
        let import_name = if is_valid_identifier(self.root.name()) {
            self.root.name()
        } else {
            "dut"
        };
        let mut out = String::new();
        out.push_str(&format!("# This is an auto-generated {} for cocotb testbenches\n", kind));
        out.push_str("# Generated by dutstub\n");
        out.push_str(&format!("# hierarchy-fingerprint: {}\n", hierarchy_fingerprint(self.mapping)));
        out.push_str(&format!(
            "\"\"\"Auto-generated type stubs for the {} DUT.\n",
            escape_docstring(self.root.name())
        ));
        out.push_str("\nThis file provides type hints for IDE autocompletion and static type checking.\n");
        out.push_str("\nUsage:\n");
        out.push_str("    from typing import cast\n");
        out.push_str(&format!("    from {} import DutType\n", import_name));
        out.push('\n');
        out.push_str("    @cocotb.test()\n");
        out.push_str("    async def test_example(dut):\n");
        out.push_str("        typed_dut = cast(DutType, dut)\n");
        out.push_str("\"\"\"\n");
        out
    }

    fn annotate_node(&self, node: &DiscoveredNode) -> (String, MemberKind) {
        let scope = self.is_scope(node);
        if !scope {
            let annotation = annotation_for(&node.runtime_type_name, false).to_string();
            return (annotation, MemberKind::Signal);
        }
        if let Some(wrapper) = self.wrappers.get(&node.path) {
            return (wrapper.class_name.clone(), MemberKind::Array);
        }
        if let Some(class_name) = self.scope_classes.get(&node.path) {
            return (class_name.clone(), MemberKind::Scope);
        }
        (annotation_for(&node.runtime_type_name, true).to_string(), MemberKind::Scope)
    }

    fn node_member(&self, node: &DiscoveredNode, key: String) -> Member {
        let (annotation, kind) = self.annotate_node(node);
        Member {
            key,
            annotation,
            kind,
            comment: self.node_comment(node),
        }
    }

    fn wrapper_member(&self, wrapper: &Wrapper<'_>, key: String) -> Member {
        Member {
            key,
            annotation: wrapper.class_name.clone(),
            kind: MemberKind::Array,
            comment: self
                .options
                .include_metadata
                .then(|| wrapper_comment(wrapper.descriptor)),
        }
    }

    fn node_comment(&self, node: &DiscoveredNode) -> Option<String> {
        if !self.options.include_metadata {
            return None;
        }
        if let Some(wrapper) = self.wrappers.get(&node.path) {
            return Some(wrapper_comment(wrapper.descriptor));
        }
        match node.metadata {
            Some(meta) => {
                let mut text = format!(
                    "{}: {}",
                    meta.category.as_str(),
                    describe(meta.direction, node.width, &node.runtime_type_name)
                );
                if meta.bus_protocol != dutstub_core::BusProtocol::None {
                    text.push_str(&format!(" [{}]", meta.bus_protocol.as_str()));
                }
                if meta.is_signed {
                    text.push_str(", signed");
                }
                Some(comment_safe(&text))
            }
            None if self.is_scope(node) => Some("sub-module".to_string()),
            None => None,
        }
    }

    /// Members of one scope class: its children plus array bases that have
    /// no node of their own.
    fn nested_body(&mut self, scope: &DiscoveredNode) -> ClassBody {
        let mut body = ClassBody::default();
        let mut names = BTreeSet::new();
        for child in self.mapping.children_of(&scope.path) {
            names.insert(child.name().to_string());
            let member = self.node_member(child, child.name().to_string());
            body.push(member, is_valid_identifier(child.name()));
        }
        let bases = self
            .wrappers_by_parent
            .get(&scope.path)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for base in bases {
            let Some(wrapper) = self.wrappers.get(base) else {
                continue;
            };
            let short = wrapper.descriptor.short_name();
            if self.mapping.contains(base) || names.contains(short) {
                continue;
            }
            let member = self.wrapper_member(wrapper, short.to_string());
            body.push(member, is_valid_identifier(short));
        }
        body.sort();
        self.register_body_imports(&body);
        body
    }

    /// Members of the single flat class: every non-root node keyed by its
    /// root-relative path.
    fn flat_body(&mut self) -> ClassBody {
        let mut body = ClassBody::default();
        for node in self.mapping.sorted() {
            if node.is_root() {
                continue;
            }
            let key = node.relative_path();
            let as_attribute = node.depth == 1 && is_valid_identifier(&key);
            let member = self.node_member(node, key);
            body.push(member, as_attribute);
        }
        for wrapper in self.wrappers.values() {
            let base = &wrapper.descriptor.base_name;
            if self.mapping.contains(base) {
                continue;
            }
            let segments: Vec<&str> = base.split('.').skip(1).collect();
            if segments.is_empty() {
                continue;
            }
            let key = join_path(&segments);
            let as_attribute = segments.len() == 1 && is_valid_identifier(&key);
            let member = self.wrapper_member(wrapper, key);
            body.push(member, as_attribute);
        }
        body.sort();
        self.register_body_imports(&body);
        body
    }

    fn register_body_imports(&mut self, body: &ClassBody) {
        let handles: Vec<String> = body
            .attributes
            .iter()
            .chain(body.keyed.iter())
            .filter(|m| !self.generated_classes.contains(&m.annotation))
            .map(|m| m.annotation.clone())
            .collect();
        for handle in handles {
            self.imports.add_handle(&handle);
        }
        if !body.keyed.is_empty() {
            self.imports.add_typing("overload");
            self.add_annotation_typing("Literal");
            self.imports.add_handle(LEAF_FALLBACK);
        }
    }

    fn class_docstring(&self, scope: &DiscoveredNode, body: &ClassBody) -> Option<String> {
        if !self.options.include_docstrings {
            return None;
        }
        let mut signals = 0;
        let mut submodules = 0;
        let mut arrays = 0;
        for member in body.attributes.iter().chain(body.keyed.iter()) {
            match member.kind {
                MemberKind::Signal => signals += 1,
                MemberKind::Scope => submodules += 1,
                MemberKind::Array => arrays += 1,
            }
        }

        let name = escape_docstring(scope.name());
        let mut text = if scope.is_root() {
            format!("Type stub for the {} DUT.\n", name)
        } else {
            format!("Type stub for the {} sub-module.\n", name)
        };
        text.push('\n');
        text.push_str(&format!("Path: {}\n", escape_docstring(&scope.path)));
        if self.options.flat_hierarchy {
            text.push_str(&format!(
                "Nodes: {}\n",
                self.mapping.len().saturating_sub(1)
            ));
        } else {
            text.push_str(&format!("Signals: {}\n", signals));
            text.push_str(&format!("Sub-modules: {}\n", submodules));
        }
        if arrays > 0 {
            text.push_str(&format!("Arrays: {}\n", arrays));
        }
        Some(format_docstring(&text, INDENT.len()))
    }

    fn render_class(&self, class_name: &str, scope: &DiscoveredNode, body: ClassBody) -> String {
        let mut out = format!("class {}({}):\n", class_name, SCOPE_BASE);
        let docstring = self.class_docstring(scope, &body);
        if let Some(doc) = &docstring {
            out.push_str(&format!("{}\"\"\"{}\n", INDENT, doc.trim_start()));
            out.push_str(&format!("{}\"\"\"\n", INDENT));
        }
        if body.is_empty() {
            if docstring.is_none() {
                out.push_str(&format!("{}...\n", INDENT));
            }
            return out;
        }
        if docstring.is_some() {
            out.push('\n');
        }

        for member in &body.attributes {
            out.push_str(&format!("{}{}: {}", INDENT, member.key, member.annotation));
            if let Some(comment) = &member.comment {
                out.push_str(&format!("  # {}", comment));
            }
            out.push('\n');
        }

        if !body.keyed.is_empty() {
            if !body.attributes.is_empty() {
                out.push('\n');
            }
            for member in &body.keyed {
                if let Some(comment) = &member.comment {
                    out.push_str(&format!("{}# {}: {}\n", INDENT, comment_safe(&member.key), comment));
                }
                out.push_str(&format!("{}@overload\n", INDENT));
                out.push_str(&format!(
                    "{}def __getitem__(self, key: Literal[{}]) -> {}: ...\n",
                    INDENT,
                    string_literal(&member.key),
                    member.annotation
                ));
            }
            out.push_str(&format!("{}@overload\n", INDENT));
            out.push_str(&format!(
                "{}def __getitem__(self, key: str) -> {}: ...\n",
                INDENT, LEAF_FALLBACK
            ));
            if self.module_source {
                out.push_str(&format!(
                    "{}def __getitem__(self, key: str) -> {}:\n",
                    INDENT, LEAF_FALLBACK
                ));
                out.push_str(&format!("{0}{0}return super().__getitem__(key)\n", INDENT));
            }
        }
        out
    }

    fn render_wrapper(&self, wrapper: &Wrapper<'_>) -> String {
        let desc = wrapper.descriptor;
        let element = &wrapper.element_annotation;
        let (min, max) = (desc.min_index(), desc.max_index());
        let mut out = format!("class {}(Sequence[{}]):\n", wrapper.class_name, element);

        let mut doc = format!(
            "Array access for {} with indices [{}:{}].\n\n",
            escape_docstring(&desc.base_name),
            min,
            max
        );
        doc.push_str(&format!("Shape: {}\n", desc.shape()));
        if desc.is_multidimensional() {
            doc.push_str("Each index selects a row over the inner axes.\n");
        }
        doc.push_str(&format!(
            "Elements: {} ({})\n",
            desc.element_count,
            if desc.is_contiguous { "contiguous" } else { "sparse" }
        ));
        out.push_str(&format!("{}\"\"\"{}\n", INDENT, format_docstring(&doc, 4).trim_start()));
        out.push_str(&format!("{}\"\"\"\n\n", INDENT));

        let body = INDENT.repeat(2);
        out.push_str(&format!("{}def __getitem__(self, index: int) -> {}:\n", INDENT, element));
        out.push_str(&format!("{}\"\"\"Get array element by index.\"\"\"\n", body));
        match &wrapper.sparse_indices {
            None => out.push_str(&format!("{}if not ({} <= index <= {}):\n", body, min, max)),
            Some(indices) => out.push_str(&format!(
                "{}if index not in {}:\n",
                body,
                python_tuple(indices)
            )),
        }
        out.push_str(&format!(
            "{}{}raise IndexError(f\"Array index {{index}} out of bounds [{}:{}]\")\n",
            body, INDENT, min, max
        ));
        out.push_str(&format!(
            "{}raise NotImplementedError(\"type stub: use the simulator handle\")\n\n",
            body
        ));

        out.push_str(&format!("{}def __len__(self) -> int:\n", INDENT));
        out.push_str(&format!("{}\"\"\"Get array length.\"\"\"\n", body));
        out.push_str(&format!("{}return {}\n\n", body, desc.len()));

        out.push_str(&format!("{}def __iter__(self) -> Iterator[{}]:\n", INDENT, element));
        out.push_str(&format!("{}\"\"\"Iterate over array elements.\"\"\"\n", body));
        match &wrapper.sparse_indices {
            None => out.push_str(&format!("{}for i in range({}, {} + 1):\n", body, min, max)),
            Some(indices) => out.push_str(&format!("{}for i in {}:\n", body, python_tuple(indices))),
        }
        out.push_str(&format!("{}{}yield self[i]\n\n", body, INDENT));

        out.push_str(&format!("{}def __contains__(self, item: object) -> bool:\n", INDENT));
        out.push_str(&format!("{}\"\"\"Check if item is one of the array elements.\"\"\"\n", body));
        out.push_str(&format!("{}try:\n", body));
        out.push_str(&format!("{}{}return any(element == item for element in self)\n", body, INDENT));
        out.push_str(&format!("{}except NotImplementedError:\n", body));
        out.push_str(&format!("{}{}return False\n\n", body, INDENT));

        for (prop, value, what) in [("min_index", min, "minimum"), ("max_index", max, "maximum")] {
            out.push_str(&format!("{}@property\n", INDENT));
            out.push_str(&format!("{}def {}(self) -> int:\n", INDENT, prop));
            out.push_str(&format!("{}\"\"\"Get {} valid index.\"\"\"\n", body, what));
            out.push_str(&format!("{}return {}\n", body, value));
            if prop == "min_index" {
                out.push('\n');
            }
        }
        out
    }
}

/// Give each key its short class name unless the short name is shared (with
/// another key or an already taken name), in which case every colliding key
/// uses its long name. Remaining clashes get a numeric suffix.
fn assign_names(
    candidates: &[(String, String, String)],
    taken: &mut BTreeSet<String>,
) -> BTreeMap<String, String> {
    let mut short_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for (_, short, _) in candidates {
        *short_counts.entry(short.as_str()).or_default() += 1;
    }
    let mut names = BTreeMap::new();
    for (key, short, long) in candidates {
        let clashes = short_counts.get(short.as_str()).copied().unwrap_or(0) > 1
            || taken.contains(short);
        let base = if clashes { long.clone() } else { short.clone() };
        let mut name = base.clone();
        let mut n = 2;
        while taken.contains(&name) {
            name = format!("{}_{}", base, n);
            n += 1;
        }
        taken.insert(name.clone());
        names.insert(key.clone(), name);
    }
    names
}

fn wrapper_comment(desc: &ArrayDescriptor) -> String {
    comment_safe(&format!(
        "array {}, {} of {}",
        desc.shape(),
        dutstub_core::util::plural(desc.element_count as u64, "element"),
        desc.element_type
    ))
}

fn comment_safe(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

fn python_tuple(values: &[i64]) -> String {
    let items: Vec<String> = values.iter().map(i64::to_string).collect();
    if items.len() == 1 {
        format!("({},)", items[0])
    } else {
        format!("({})", items.join(", "))
    }
}

// ============================================================================
// Tests
// ============================================================================
