//! Shared helpers: hierarchy fingerprints and small text utilities.

use sha2::{Digest, Sha256};

use crate::types::HierarchyMapping;

/// Compute a SHA-256 fingerprint of a hierarchy.
///
/// The digest covers every node (path, runtime type, scope flag, width) and
/// every array descriptor, all in lexicographic order, so two discoveries of
/// the same design fingerprint identically regardless of traversal order.
/// Rendered artifacts embed this instead of a timestamp.
pub fn hierarchy_fingerprint(mapping: &HierarchyMapping) -> String {
    let mut hasher = Sha256::new();
    hasher.update(mapping.root.as_bytes());
    hasher.update(b"\n");
    for node in mapping.sorted() {
        let width = node.width.map(|w| w.to_string()).unwrap_or_default();
        let line = format!(
            "{}\t{}\t{}\t{}\n",
            node.path,
            node.runtime_type_name,
            if node.is_scope { "scope" } else { "signal" },
            width
        );
        hasher.update(line.as_bytes());
    }
    for (base, array) in &mapping.arrays {
        let line = format!("{}\t{}\t{}\n", base, array.shape(), array.element_type);
        hasher.update(line.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Short form of a fingerprint for display.
pub fn short_fingerprint(fingerprint: &str) -> &str {
    fingerprint.get(..12).unwrap_or(fingerprint)
}

/// Pluralize a unit for counts (`1 bit`, `8 bits`).
pub fn plural(count: u64, unit: &str) -> String {
    if count == 1 {
        format!("{} {}", count, unit)
    } else {
        format!("{} {}s", count, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DiscoveredNode;

    fn mapping(order: &[&str]) -> HierarchyMapping {
        let mut m = HierarchyMapping::new("top");
        m.insert(DiscoveredNode::new(vec!["top".into()], "HierarchyObject", true));
        for name in order {
            m.insert(DiscoveredNode::new(
                vec!["top".into(), name.to_string()],
                "LogicObject",
                false,
            ));
        }
        m
    }

    #[test]
    fn fingerprint_ignores_traversal_order() {
        let a = hierarchy_fingerprint(&mapping(&["clk", "data"]));
        let b = hierarchy_fingerprint(&mapping(&["data", "clk"]));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn fingerprint_changes_with_content() {
        let a = hierarchy_fingerprint(&mapping(&["clk"]));
        let b = hierarchy_fingerprint(&mapping(&["clk", "rst_n"]));
        assert_ne!(a, b);
    }

    #[test]
    fn plural_units() {
        assert_eq!(plural(1, "bit"), "1 bit");
        assert_eq!(plural(8, "bit"), "8 bits");
        assert_eq!(short_fingerprint("abcdef0123456789"), "abcdef012345");
    }
}
