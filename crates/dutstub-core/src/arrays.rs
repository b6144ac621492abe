//! Array pattern recognition over dotted paths.
//!
//! One or more trailing integer index groups (`mem[3]`, `grid[1][2]`, VHDL
//! `regs(4)`) are stripped from each path to obtain a base; every path
//! sharing a base is folded into one [`ArrayDescriptor`]. Non-numeric indices
//! (`mem[i]`) are never folded.
//!
//! Bounds are running reductions; contiguity is decided once all elements of
//! a base are known, per axis, as `max - min + 1 == distinct indices seen`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::types::{axis_extent, leaf_name, ArrayDescriptor, MIXED_ELEMENT_TYPE, PATH_SEPARATOR};

static TRAILING_INDICES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<base>.+?)(?P<groups>(?:\[\s*-?\d+\s*\]|\(\s*-?\d+\s*\))+)$")
        .expect("trailing index pattern is valid")
});

static INDEX_GROUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\[(]\s*(-?\d+)\s*[\])]").expect("index group pattern is valid")
});

/// Split a path into its base and trailing integer indices.
///
/// Returns `None` when the path carries no trailing index group, when any
/// trailing group is non-numeric, or when stripping would leave an empty name.
pub fn parse_indexed(path: &str) -> Option<(String, Vec<i64>)> {
    let caps = TRAILING_INDICES.captures(path)?;
    let base = caps.name("base")?.as_str();
    let groups = caps.name("groups")?.as_str();

    // `mem[i][0]`: a bracket group survives in the base, so some index is
    // not an integer.
    if base.ends_with(']') || base.ends_with(')') {
        return None;
    }
    if base.ends_with(PATH_SEPARATOR) || leaf_name(base).is_empty() {
        return None;
    }

    let mut indices = Vec::new();
    for cap in INDEX_GROUP.captures_iter(groups) {
        indices.push(cap.get(1)?.as_str().parse::<i64>().ok()?);
    }
    if indices.is_empty() {
        return None;
    }
    Some((normalize_base(base), indices))
}

/// True if the trailing segment of `path` is an indexed element.
pub fn is_array_element(path: &str) -> bool {
    parse_indexed(path).is_some()
}

/// Fold container-style element paths onto their container.
///
/// Runtimes that expose an array `mem` as a scope whose children are named
/// `mem[0]`, `mem[1]` produce paths `top.mem.mem[0]`; the array base is the
/// container `top.mem`, not `top.mem.mem`.
fn normalize_base(base: &str) -> String {
    let mut parts = base.rsplitn(2, PATH_SEPARATOR);
    let last = parts.next().unwrap_or(base);
    if let Some(parent) = parts.next() {
        if leaf_name(parent) == last {
            return parent.to_string();
        }
    }
    base.to_string()
}

#[derive(Debug, Default)]
struct ArrayGroup {
    indices: BTreeSet<Vec<i64>>,
    element_type: Option<String>,
    mixed: bool,
}

/// Incremental array recognizer.
///
/// The walker feeds every recorded path through [`ArrayCollector::observe`];
/// [`ArrayCollector::finish`] computes the descriptors.
#[derive(Debug, Default)]
pub struct ArrayCollector {
    groups: BTreeMap<String, ArrayGroup>,
}

impl ArrayCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one path. Returns true if the path is an array element.
    pub fn observe(&mut self, path: &str, type_name: &str) -> bool {
        let Some((base, indices)) = parse_indexed(path) else {
            return false;
        };
        let group = self.groups.entry(base).or_default();
        group.indices.insert(indices);
        match &group.element_type {
            None => group.element_type = Some(type_name.to_string()),
            Some(existing) if existing != type_name => group.mixed = true,
            Some(_) => {}
        }
        true
    }

    /// Number of distinct bases seen so far.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Build one descriptor per base.
    pub fn finish(self) -> BTreeMap<String, ArrayDescriptor> {
        self.groups
            .into_iter()
            .map(|(base, group)| {
                let descriptor = build_descriptor(&base, group);
                (base, descriptor)
            })
            .collect()
    }
}

fn build_descriptor(base: &str, group: ArrayGroup) -> ArrayDescriptor {
    let rank = group.indices.iter().map(Vec::len).max().unwrap_or(0);
    let mut dimensions = Vec::with_capacity(rank);
    let mut axis_counts = Vec::with_capacity(rank);
    let mut is_contiguous = true;

    for axis in 0..rank {
        let seen: BTreeSet<i64> = group
            .indices
            .iter()
            .filter_map(|idx| idx.get(axis).copied())
            .collect();
        let min = seen.first().copied().unwrap_or(0);
        let max = seen.last().copied().unwrap_or(0);
        if axis_extent(min, max) != seen.len() as i128 {
            is_contiguous = false;
        }
        dimensions.push((min, max));
        axis_counts.push(seen.len());
    }

    let element_type = if group.mixed {
        MIXED_ELEMENT_TYPE.to_string()
    } else {
        group.element_type.unwrap_or_else(|| MIXED_ELEMENT_TYPE.to_string())
    };

    ArrayDescriptor {
        base_name: base.to_string(),
        dimensions,
        element_type,
        is_contiguous,
        element_count: group.indices.len(),
        axis_counts,
    }
}

/// Fold every indexed path into an array descriptor keyed by base path.
pub fn extract_array_info<'a, I>(entries: I) -> BTreeMap<String, ArrayDescriptor>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut collector = ArrayCollector::new();
    for (path, type_name) in entries {
        collector.observe(path, type_name);
    }
    collector.finish()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn logic(paths: &[&'static str]) -> Vec<(&'static str, &'static str)> {
        paths.iter().map(|p| (*p, "LogicObject")).collect()
    }

    mod parsing {
        use super::*;

        #[test]
        fn single_and_multi_dimensional() {
            assert_eq!(parse_indexed("top.mem[3]"), Some(("top.mem".to_string(), vec![3])));
            assert_eq!(
                parse_indexed("top.grid[1][2]"),
                Some(("top.grid".to_string(), vec![1, 2]))
            );
        }

        #[test]
        fn vhdl_parentheses() {
            assert_eq!(parse_indexed("top.regs(4)"), Some(("top.regs".to_string(), vec![4])));
        }

        #[test]
        fn non_numeric_indices_are_not_folded() {
            assert_eq!(parse_indexed("top.mem[i]"), None);
            assert_eq!(parse_indexed("top.mem[i][0]"), None);
            assert_eq!(parse_indexed("top.plain"), None);
        }

        #[test]
        fn empty_base_is_rejected() {
            assert_eq!(parse_indexed("top.[3]"), None);
            assert_eq!(parse_indexed("[3]"), None);
        }

        #[test]
        fn container_style_paths_fold_onto_container() {
            assert_eq!(
                parse_indexed("top.mem.mem[0]"),
                Some(("top.mem".to_string(), vec![0]))
            );
        }
    }

    mod descriptors {
        use super::*;

        #[test]
        fn contiguous_one_dimensional() {
            let arrays = extract_array_info(logic(&[
                "top.mem[0]",
                "top.mem[1]",
                "top.mem[2]",
                "top.mem[3]",
            ]));
            let mem = &arrays["top.mem"];
            assert_eq!(mem.dimensions, vec![(0, 3)]);
            assert!(mem.is_contiguous);
            assert_eq!(mem.element_count, 4);
            assert_eq!(mem.len(), 4);
        }

        #[test]
        fn sparse_reports_observed_count() {
            let arrays = extract_array_info(logic(&["top.mem[0]", "top.mem[2]", "top.mem[5]"]));
            let mem = &arrays["top.mem"];
            assert_eq!(mem.dimensions, vec![(0, 5)]);
            assert!(!mem.is_contiguous);
            assert_eq!(mem.element_count, 3);
            assert_eq!(mem.len(), 3);
        }

        #[test]
        fn multi_dimensional_bounds_per_axis() {
            let arrays = extract_array_info(logic(&[
                "top.grid[0][0]",
                "top.grid[0][1]",
                "top.grid[1][0]",
                "top.grid[1][1]",
                "top.grid[2][1]",
            ]));
            let grid = &arrays["top.grid"];
            assert_eq!(grid.dimensions, vec![(0, 2), (0, 1)]);
            assert_eq!(grid.axis_counts, vec![3, 2]);
            assert!(grid.is_contiguous);
            assert_eq!(grid.element_count, 5);
        }

        #[test]
        fn gap_on_inner_axis_breaks_contiguity() {
            let arrays = extract_array_info(logic(&["top.grid[0][0]", "top.grid[0][3]"]));
            assert!(!arrays["top.grid"].is_contiguous);
        }

        #[test]
        fn heterogeneous_elements_degrade_to_mixed() {
            let arrays = extract_array_info(vec![
                ("top.mem[0]", "LogicObject"),
                ("top.mem[1]", "IntegerObject"),
            ]);
            assert_eq!(arrays["top.mem"].element_type, MIXED_ELEMENT_TYPE);
            assert!(arrays["top.mem"].is_mixed());
        }

        #[test]
        fn same_base_under_different_parents_stays_separate() {
            let arrays = extract_array_info(logic(&["top.a.mem[0]", "top.b.mem[0]"]));
            assert_eq!(arrays.len(), 2);
            assert!(arrays.contains_key("top.a.mem"));
            assert!(arrays.contains_key("top.b.mem"));
        }

        #[test]
        fn negative_indices_are_supported() {
            let arrays = extract_array_info(logic(&["top.taps(-1)", "top.taps(0)", "top.taps(1)"]));
            assert_eq!(arrays["top.taps"].dimensions, vec![(-1, 1)]);
            assert!(arrays["top.taps"].is_contiguous);
        }

        #[test]
        fn extreme_bounds_do_not_overflow() {
            let arrays = extract_array_info(logic(&[
                "top.mem[-9223372036854775808]",
                "top.mem[9223372036854775807]",
            ]));
            let mem = &arrays["top.mem"];
            assert_eq!(mem.dimensions, vec![(i64::MIN, i64::MAX)]);
            assert!(!mem.is_contiguous);
            assert_eq!(mem.len(), 2);
        }
    }
}
