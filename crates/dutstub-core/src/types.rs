//! Hierarchy data model shared by the walker, the analyzers and the renderers.
//!
//! A discovery run produces one [`HierarchyMapping`]: an ordered map from
//! dotted path to [`DiscoveredNode`] (traversal order), a side-table of
//! [`ArrayDescriptor`] keyed by base path, and [`DiscoveryStats`]. The mapping
//! is rebuilt from scratch on every discovery call; nothing in it carries
//! identity across calls.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Separator between path segments in dotted paths.
pub const PATH_SEPARATOR: char = '.';

/// Element type recorded when elements of one array disagree on runtime type.
pub const MIXED_ELEMENT_TYPE: &str = "Mixed";

// ============================================================================
// Signal Metadata
// ============================================================================

/// Port direction of a signal.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
    Inout,
    #[default]
    Unknown,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
            Direction::Inout => "inout",
            Direction::Unknown => "unknown",
        }
    }

    /// Parse a direction as reported by a simulator backend.
    ///
    /// Accepts the canonical names plus the short forms backends commonly use
    /// (`in`, `out`, `bidir`). Anything else yields `None`.
    pub fn parse(s: &str) -> Option<Direction> {
        match s.trim().to_ascii_lowercase().as_str() {
            "input" | "in" => Some(Direction::Input),
            "output" | "out" => Some(Direction::Output),
            "inout" | "bidir" | "bidirectional" => Some(Direction::Inout),
            "unknown" => Some(Direction::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Semantic category of a signal, in classifier precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalCategory {
    Clock,
    Reset,
    Enable,
    Valid,
    Ready,
    Address,
    Status,
    Control,
    Data,
}

impl SignalCategory {
    /// All categories in precedence order.
    pub const ALL: [SignalCategory; 9] = [
        SignalCategory::Clock,
        SignalCategory::Reset,
        SignalCategory::Enable,
        SignalCategory::Valid,
        SignalCategory::Ready,
        SignalCategory::Address,
        SignalCategory::Status,
        SignalCategory::Control,
        SignalCategory::Data,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalCategory::Clock => "clock",
            SignalCategory::Reset => "reset",
            SignalCategory::Enable => "enable",
            SignalCategory::Valid => "valid",
            SignalCategory::Ready => "ready",
            SignalCategory::Address => "address",
            SignalCategory::Status => "status",
            SignalCategory::Control => "control",
            SignalCategory::Data => "data",
        }
    }

    /// Heading used in documentation output.
    pub fn title(&self) -> &'static str {
        match self {
            SignalCategory::Clock => "Clock",
            SignalCategory::Reset => "Reset",
            SignalCategory::Enable => "Enable",
            SignalCategory::Valid => "Valid",
            SignalCategory::Ready => "Ready",
            SignalCategory::Address => "Address",
            SignalCategory::Status => "Status",
            SignalCategory::Control => "Control",
            SignalCategory::Data => "Data",
        }
    }
}

impl fmt::Display for SignalCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bus protocol inferred from signal naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BusProtocol {
    #[serde(rename = "AXI4")]
    Axi4,
    #[serde(rename = "AXI4-Lite")]
    Axi4Lite,
    #[serde(rename = "AXI4-Stream")]
    Axi4Stream,
    #[serde(rename = "AHB")]
    Ahb,
    #[serde(rename = "APB")]
    Apb,
    #[serde(rename = "Avalon")]
    Avalon,
    #[serde(rename = "Wishbone")]
    Wishbone,
    #[serde(rename = "none")]
    None,
}

impl BusProtocol {
    /// All protocols in report order (`none` last).
    pub const ALL: [BusProtocol; 8] = [
        BusProtocol::Axi4,
        BusProtocol::Axi4Lite,
        BusProtocol::Axi4Stream,
        BusProtocol::Ahb,
        BusProtocol::Apb,
        BusProtocol::Avalon,
        BusProtocol::Wishbone,
        BusProtocol::None,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BusProtocol::Axi4 => "AXI4",
            BusProtocol::Axi4Lite => "AXI4-Lite",
            BusProtocol::Axi4Stream => "AXI4-Stream",
            BusProtocol::Ahb => "AHB",
            BusProtocol::Apb => "APB",
            BusProtocol::Avalon => "Avalon",
            BusProtocol::Wishbone => "Wishbone",
            BusProtocol::None => "none",
        }
    }
}

impl fmt::Display for BusProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier output attached to every leaf node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalMetadata {
    pub direction: Direction,
    pub category: SignalCategory,
    pub bus_protocol: BusProtocol,
    #[serde(default)]
    pub is_signed: bool,
}

// ============================================================================
// Discovered Nodes
// ============================================================================

/// One entry per visited path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredNode {
    /// Dotted path (unique key within one discovery run).
    pub path: String,
    /// Path segments, root first.
    pub segments: Vec<String>,
    /// Runtime class name reported by the simulator backend (open-ended).
    pub runtime_type_name: String,
    /// True if this node can contain named children.
    pub is_scope: bool,
    /// Bit width for signals, element count for array containers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Depth below the root (root = 0).
    pub depth: usize,
    /// True if the node was recognized as a compile-time constant.
    #[serde(default)]
    pub is_constant: bool,
    /// Classifier output (leaves only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SignalMetadata>,
}

impl DiscoveredNode {
    /// Create a node from its path segments.
    pub fn new(segments: Vec<String>, runtime_type_name: impl Into<String>, is_scope: bool) -> Self {
        let path = join_path(&segments);
        let depth = segments.len().saturating_sub(1);
        DiscoveredNode {
            path,
            segments,
            runtime_type_name: runtime_type_name.into(),
            is_scope,
            width: None,
            depth,
            is_constant: false,
            metadata: None,
        }
    }

    /// Trailing segment (the node's own name).
    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    /// Dotted path of the parent, or `None` for the root.
    pub fn parent_path(&self) -> Option<String> {
        if self.segments.len() < 2 {
            return None;
        }
        Some(join_path(&self.segments[..self.segments.len() - 1]))
    }

    /// Path relative to the root (empty for the root itself).
    pub fn relative_path(&self) -> String {
        if self.segments.len() < 2 {
            return String::new();
        }
        join_path(&self.segments[1..])
    }

    /// True for the root node.
    pub fn is_root(&self) -> bool {
        self.segments.len() <= 1
    }
}

/// Join path segments with [`PATH_SEPARATOR`].
pub fn join_path<S: AsRef<str>>(segments: &[S]) -> String {
    let mut out = String::new();
    for (i, seg) in segments.iter().enumerate() {
        if i > 0 {
            out.push(PATH_SEPARATOR);
        }
        out.push_str(seg.as_ref());
    }
    out
}

/// Trailing segment of a dotted path.
pub fn leaf_name(path: &str) -> &str {
    path.rsplit(PATH_SEPARATOR).next().unwrap_or(path)
}

// ============================================================================
// Array Descriptors
// ============================================================================

/// Folded representation of a repeated-index sibling group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayDescriptor {
    /// Path with trailing index groups stripped.
    pub base_name: String,
    /// Per-axis `(min_index, max_index)`, outermost axis first.
    pub dimensions: Vec<(i64, i64)>,
    /// Shared runtime type of the elements, or [`MIXED_ELEMENT_TYPE`].
    pub element_type: String,
    /// True iff every axis covers `[min, max]` without gaps.
    pub is_contiguous: bool,
    /// Number of distinct observed index tuples.
    pub element_count: usize,
    /// Distinct observed indices per axis.
    pub axis_counts: Vec<usize>,
}

impl ArrayDescriptor {
    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.dimensions.len()
    }

    pub fn is_multidimensional(&self) -> bool {
        self.dimensions.len() > 1
    }

    /// Minimum index on the outermost axis.
    pub fn min_index(&self) -> i64 {
        self.dimensions.first().map(|d| d.0).unwrap_or(0)
    }

    /// Maximum index on the outermost axis.
    pub fn max_index(&self) -> i64 {
        self.dimensions.first().map(|d| d.1).unwrap_or(0)
    }

    /// Length of the outermost axis as exposed by the wrapper type: the full
    /// extent when contiguous, the observed count when sparse.
    pub fn len(&self) -> usize {
        let observed = self.axis_counts.first().copied().unwrap_or(0);
        if self.is_contiguous {
            usize::try_from(axis_extent(self.min_index(), self.max_index())).unwrap_or(observed)
        } else {
            observed
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element type differs between elements.
    pub fn is_mixed(&self) -> bool {
        self.element_type == MIXED_ELEMENT_TYPE
    }

    /// Trailing segment of the base path.
    pub fn short_name(&self) -> &str {
        leaf_name(&self.base_name)
    }

    /// Shape as `[min:max][min:max]`.
    pub fn shape(&self) -> String {
        self.dimensions
            .iter()
            .map(|(lo, hi)| format!("[{}:{}]", lo, hi))
            .collect()
    }
}

/// Number of indices in `[min, max]`; zero when `max < min`.
///
/// Computed in `i128` so bounds spanning the whole `i64` range do not overflow.
pub fn axis_extent(min: i64, max: i64) -> i128 {
    (i128::from(max) - i128::from(min) + 1).max(0)
}

// ============================================================================
// Discovery Statistics
// ============================================================================

/// A child that failed to materialize or enumerate; recorded, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFailure {
    pub path: String,
    pub reason: String,
}

/// Statistics for one discovery run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryStats {
    /// Every visited node, including suppressed constants.
    pub total_objects: usize,
    pub max_depth_reached: usize,
    pub errors_encountered: usize,
    pub arrays_detected: usize,
    pub constants_skipped: usize,
    pub duplicates_skipped: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<NodeFailure>,
}

// ============================================================================
// Hierarchy Mapping
// ============================================================================

/// Aggregate discovery result.
///
/// Nodes keep traversal order; [`HierarchyMapping::sorted`] provides the
/// lexicographic order renderers must use. Parent and ancestor lookups are
/// indexed on insert, so [`HierarchyMapping::children_of`] and
/// [`HierarchyMapping::has_descendants`] do not scan the mapping.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HierarchyMapping {
    /// Name of the root node.
    pub root: String,
    nodes: Vec<DiscoveredNode>,
    #[serde(skip)]
    index: HashMap<String, usize>,
    /// Parent path -> child positions in `nodes`.
    #[serde(skip)]
    children: HashMap<String, Vec<usize>>,
    /// Every proper ancestor path of a recorded node.
    #[serde(skip)]
    ancestors: HashSet<String>,
    /// Array side-table keyed by base path.
    pub arrays: BTreeMap<String, ArrayDescriptor>,
    pub stats: DiscoveryStats,
}

impl HierarchyMapping {
    pub fn new(root: impl Into<String>) -> Self {
        HierarchyMapping {
            root: root.into(),
            ..Default::default()
        }
    }

    /// Insert a node. Returns false (and keeps the first entry) if the path is
    /// already present.
    pub fn insert(&mut self, node: DiscoveredNode) -> bool {
        if self.index.contains_key(&node.path) {
            return false;
        }
        let position = self.nodes.len();
        self.index.insert(node.path.clone(), position);
        if let Some(parent) = node.parent_path() {
            self.children.entry(parent).or_default().push(position);
        }
        let mut prefix = String::new();
        let ancestor_count = node.segments.len().saturating_sub(1);
        for (i, segment) in node.segments.iter().take(ancestor_count).enumerate() {
            if i > 0 {
                prefix.push(PATH_SEPARATOR);
            }
            prefix.push_str(segment);
            self.ancestors.insert(prefix.clone());
        }
        self.nodes.push(node);
        true
    }

    pub fn get(&self, path: &str) -> Option<&DiscoveredNode> {
        self.index.get(path).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in traversal order.
    pub fn iter(&self) -> impl Iterator<Item = &DiscoveredNode> {
        self.nodes.iter()
    }

    /// Nodes sorted lexicographically by path.
    pub fn sorted(&self) -> Vec<&DiscoveredNode> {
        let mut nodes: Vec<&DiscoveredNode> = self.nodes.iter().collect();
        nodes.sort_by(|a, b| a.path.cmp(&b.path));
        nodes
    }

    /// The root node, if discovery recorded one.
    pub fn root_node(&self) -> Option<&DiscoveredNode> {
        self.nodes.iter().find(|n| n.is_root())
    }

    /// Leaf signals sorted by path.
    pub fn leaves(&self) -> Vec<&DiscoveredNode> {
        self.sorted().into_iter().filter(|n| !n.is_scope).collect()
    }

    /// Scope nodes sorted by path.
    pub fn scopes(&self) -> Vec<&DiscoveredNode> {
        self.sorted().into_iter().filter(|n| n.is_scope).collect()
    }

    /// Direct children of `path`, sorted by name.
    pub fn children_of(&self, path: &str) -> Vec<&DiscoveredNode> {
        let mut children: Vec<&DiscoveredNode> = self
            .children
            .get(path)
            .map(|positions| positions.iter().map(|&i| &self.nodes[i]).collect())
            .unwrap_or_default();
        children.sort_by(|a, b| a.name().cmp(b.name()));
        children
    }

    /// True if any recorded node sits below `path`.
    pub fn has_descendants(&self, path: &str) -> bool {
        self.ancestors.contains(path)
    }
}

impl PartialEq for HierarchyMapping {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
            && self.nodes == other.nodes
            && self.arrays == other.arrays
            && self.stats == other.stats
    }
}

// ============================================================================
// Render Options
// ============================================================================

/// Output format of the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// Typed stub interface (`.pyi`).
    #[default]
    StubInterface,
    /// Importable module source (`.py`).
    ModuleSource,
    Markdown,
    Rst,
    Html,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::StubInterface => "stub-interface",
            OutputFormat::ModuleSource => "module-source",
            OutputFormat::Markdown => "markdown",
            OutputFormat::Rst => "rst",
            OutputFormat::Html => "html",
        }
    }

    /// True for formats that must pass the syntax gate.
    pub fn is_source(&self) -> bool {
        matches!(self, OutputFormat::StubInterface | OutputFormat::ModuleSource)
    }

    /// Default file extension (without the dot).
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::StubInterface => "pyi",
            OutputFormat::ModuleSource => "py",
            OutputFormat::Markdown => "md",
            OutputFormat::Rst => "rst",
            OutputFormat::Html => "html",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Renderer configuration record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderOptions {
    /// One class for the whole DUT instead of one class per scope.
    pub flat_hierarchy: bool,
    /// Emit classifier/array annotations as comments.
    pub include_metadata: bool,
    /// Emit array wrapper types.
    pub include_arrays: bool,
    pub include_docstrings: bool,
    pub output_format: OutputFormat,
    pub class_prefix: String,
    pub class_suffix: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            flat_hierarchy: false,
            include_metadata: false,
            include_arrays: true,
            include_docstrings: true,
            output_format: OutputFormat::StubInterface,
            class_prefix: String::new(),
            class_suffix: String::new(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn node(path: &str, scope: bool) -> DiscoveredNode {
        let segments = path.split('.').map(str::to_string).collect();
        DiscoveredNode::new(segments, if scope { "HierarchyObject" } else { "LogicObject" }, scope)
    }

    mod nodes {
        use super::*;

        #[test]
        fn relative_and_parent_paths() {
            let n = node("top.u_core.data", false);
            assert_eq!(n.name(), "data");
            assert_eq!(n.parent_path().as_deref(), Some("top.u_core"));
            assert_eq!(n.relative_path(), "u_core.data");
            assert_eq!(n.depth, 2);
        }

        #[test]
        fn root_has_no_parent() {
            let n = node("top", true);
            assert!(n.is_root());
            assert_eq!(n.parent_path(), None);
            assert_eq!(n.relative_path(), "");
        }
    }

    mod mapping {
        use super::*;

        #[test]
        fn insert_rejects_duplicate_paths() {
            let mut m = HierarchyMapping::new("top");
            assert!(m.insert(node("top", true)));
            assert!(m.insert(node("top.clk", false)));
            assert!(!m.insert(node("top.clk", false)));
            assert_eq!(m.len(), 2);
        }

        #[test]
        fn sorted_is_lexicographic_while_iter_keeps_traversal_order() {
            let mut m = HierarchyMapping::new("top");
            m.insert(node("top", true));
            m.insert(node("top.zeta", false));
            m.insert(node("top.alpha", false));
            let traversal: Vec<_> = m.iter().map(|n| n.path.as_str()).collect();
            let sorted: Vec<_> = m.sorted().iter().map(|n| n.path.as_str()).collect();
            assert_eq!(traversal, vec!["top", "top.zeta", "top.alpha"]);
            assert_eq!(sorted, vec!["top", "top.alpha", "top.zeta"]);
        }

        #[test]
        fn children_of_returns_direct_children_only() {
            let mut m = HierarchyMapping::new("top");
            m.insert(node("top", true));
            m.insert(node("top.u_sub", true));
            m.insert(node("top.u_sub.d", false));
            m.insert(node("top.clk", false));
            let names: Vec<_> = m.children_of("top").iter().map(|n| n.name()).collect();
            assert_eq!(names, vec!["clk", "u_sub"]);
            assert!(m.has_descendants("top.u_sub"));
            assert!(!m.has_descendants("top.clk"));
        }

        #[test]
        fn descendants_without_intermediate_node() {
            let mut m = HierarchyMapping::new("top");
            m.insert(node("top", true));
            m.insert(node("top.mem.mem[0]", false));
            assert!(m.has_descendants("top.mem"));
            assert!(m.children_of("top").is_empty());
            let names: Vec<_> = m.children_of("top.mem").iter().map(|n| n.name()).collect();
            assert_eq!(names, vec!["mem[0]"]);
        }
    }

    mod arrays {
        use super::*;

        #[test]
        fn sparse_length_is_observed_count() {
            let desc = ArrayDescriptor {
                base_name: "top.mem".to_string(),
                dimensions: vec![(0, 5)],
                element_type: "LogicObject".to_string(),
                is_contiguous: false,
                element_count: 3,
                axis_counts: vec![3],
            };
            assert_eq!(desc.len(), 3);
            assert_eq!(desc.short_name(), "mem");
            assert_eq!(desc.shape(), "[0:5]");
        }

        #[test]
        fn contiguous_length_is_extent() {
            let desc = ArrayDescriptor {
                base_name: "top.regs".to_string(),
                dimensions: vec![(2, 5)],
                element_type: "LogicObject".to_string(),
                is_contiguous: true,
                element_count: 4,
                axis_counts: vec![4],
            };
            assert_eq!(desc.len(), 4);
        }

        #[test]
        fn extent_spans_full_i64_range() {
            assert_eq!(axis_extent(i64::MIN, i64::MAX), 1i128 << 64);
            assert_eq!(axis_extent(3, 2), 0);
            let desc = ArrayDescriptor {
                base_name: "top.mem".to_string(),
                dimensions: vec![(i64::MIN, i64::MAX)],
                element_type: "LogicObject".to_string(),
                is_contiguous: false,
                element_count: 2,
                axis_counts: vec![2],
            };
            assert_eq!(desc.len(), 2);
        }
    }

    mod enums {
        use super::*;

        #[test]
        fn bus_protocol_serializes_with_display_names() {
            assert_eq!(
                serde_json::to_string(&BusProtocol::Axi4Lite).unwrap(),
                "\"AXI4-Lite\""
            );
            assert_eq!(serde_json::to_string(&BusProtocol::None).unwrap(), "\"none\"");
        }

        #[test]
        fn direction_parse_accepts_short_forms() {
            assert_eq!(Direction::parse("IN"), Some(Direction::Input));
            assert_eq!(Direction::parse("bidir"), Some(Direction::Inout));
            assert_eq!(Direction::parse("sideways"), None);
        }

        #[test]
        fn output_format_round_trips_kebab_case() {
            let f: OutputFormat = serde_json::from_str("\"module-source\"").unwrap();
            assert_eq!(f, OutputFormat::ModuleSource);
            assert!(f.is_source());
            assert!(!OutputFormat::Html.is_source());
        }
    }
}
