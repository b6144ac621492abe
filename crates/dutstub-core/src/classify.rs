//! Signal classification by name heuristics and optional live introspection.
//!
//! Every check is a case-insensitive substring match, evaluated in a fixed
//! order where the first match wins. Longer, more specific tokens are checked
//! before short fragments that several protocols share (APB `pwrite` versus a
//! generic `write`, AXI4-Stream `tvalid` versus AXI `valid`).
//!
//! ## Category precedence
//!
//! 1. clock: `clk`, `clock`, `ck`
//! 2. reset: `rst`, `reset`
//! 3. enable: `en`, `enable`, `ena`
//! 4. valid: `valid`, `vld`
//! 5. ready: `ready`, `rdy`
//! 6. address: `addr`, `address`
//! 7. status: `status`, `stat`, `flag`
//! 8. control: `ctrl`, `control`, `cmd`, `command`
//! 9. data (default)
//!
//! ## Bus protocol precedence
//!
//! AXI4-Stream tokens, then AXI4 id/len/burst tokens, then the common AXI
//! handshake/address/data tokens (disambiguated by `lite`/`stream` in the
//! path), then AHB, APB, Avalon (leaf or path), Wishbone; otherwise `none`.

use tracing::trace;

use crate::handle::SimHandle;
use crate::types::{BusProtocol, Direction, SignalCategory, SignalMetadata};
use crate::util::plural;

// ============================================================================
// Token Tables
// ============================================================================

const CATEGORY_RULES: &[(SignalCategory, &[&str])] = &[
    (SignalCategory::Clock, &["clk", "clock", "ck"]),
    (SignalCategory::Reset, &["rst", "reset"]),
    (SignalCategory::Enable, &["en", "enable", "ena"]),
    (SignalCategory::Valid, &["valid", "vld"]),
    (SignalCategory::Ready, &["ready", "rdy"]),
    (SignalCategory::Address, &["addr", "address"]),
    (SignalCategory::Status, &["status", "stat", "flag"]),
    (SignalCategory::Control, &["ctrl", "control", "cmd", "command"]),
];

const AXI_STREAM_TOKENS: &[&str] = &[
    "tvalid", "tready", "tdata", "tlast", "tkeep", "tstrb", "tuser", "tid", "tdest",
];

const AXI4_TOKENS: &[&str] = &[
    "awid", "awlen", "awsize", "awburst", "awlock", "awcache", "awqos", "wid", "wlast", "bid",
    "arid", "arlen", "arsize", "arburst", "arlock", "arcache", "arqos", "rid", "rlast",
];

const AXI_COMMON_TOKENS: &[&str] = &[
    "awvalid", "awready", "awaddr", "awprot", "wvalid", "wready", "wdata", "wstrb", "bvalid",
    "bready", "bresp", "arvalid", "arready", "araddr", "arprot", "rvalid", "rready", "rdata",
    "rresp",
];

const AHB_TOKENS: &[&str] = &[
    "haddr", "hwrite", "hsize", "hburst", "htrans", "hwdata", "hrdata", "hready", "hresp",
];

const APB_TOKENS: &[&str] = &[
    "paddr", "pwrite", "psel", "penable", "pwdata", "prdata", "pready", "pslverr",
];

const AVALON_TOKENS: &[&str] = &["avalon", "av_", "avs_", "avm_"];

const WISHBONE_TOKENS: &[&str] = &[
    "cyc", "stb", "we", "ack", "err", "rty", "sel", "adr", "dat_i", "dat_o",
];

const INOUT_TOKENS: &[&str] = &["_io", "inout", "bidir"];
const INPUT_TOKENS: &[&str] = &["_in", "input", "_i"];
const OUTPUT_TOKENS: &[&str] = &["_out", "output", "_o"];

fn contains_any(haystack: &str, tokens: &[&str]) -> bool {
    tokens.iter().any(|t| haystack.contains(t))
}

// ============================================================================
// Name Heuristics
// ============================================================================

/// Semantic category of a leaf name.
pub fn classify_category(leaf_name: &str) -> SignalCategory {
    let name = leaf_name.to_lowercase();
    CATEGORY_RULES
        .iter()
        .find(|(_, tokens)| contains_any(&name, tokens))
        .map(|(category, _)| *category)
        .unwrap_or(SignalCategory::Data)
}

/// Bus protocol of a leaf, using the path to disambiguate the AXI family.
pub fn detect_bus_protocol(leaf_name: &str, full_path: &str) -> BusProtocol {
    let name = leaf_name.to_lowercase();
    let path = full_path.to_lowercase();

    if contains_any(&name, AXI_STREAM_TOKENS) {
        return BusProtocol::Axi4Stream;
    }
    if contains_any(&name, AXI4_TOKENS) {
        return BusProtocol::Axi4;
    }
    if contains_any(&name, AXI_COMMON_TOKENS) {
        if path.contains("lite") {
            return BusProtocol::Axi4Lite;
        }
        if path.contains("stream") {
            return BusProtocol::Axi4Stream;
        }
        return BusProtocol::Axi4;
    }
    if contains_any(&name, AHB_TOKENS) {
        return BusProtocol::Ahb;
    }
    if contains_any(&name, APB_TOKENS) {
        return BusProtocol::Apb;
    }
    if contains_any(&name, AVALON_TOKENS) || contains_any(&path, AVALON_TOKENS) {
        return BusProtocol::Avalon;
    }
    if contains_any(&name, WISHBONE_TOKENS) {
        return BusProtocol::Wishbone;
    }
    BusProtocol::None
}

/// Port direction from naming conventions alone.
pub fn detect_direction(leaf_name: &str) -> Direction {
    let name = leaf_name.to_lowercase();
    if contains_any(&name, INOUT_TOKENS) {
        Direction::Inout
    } else if contains_any(&name, INPUT_TOKENS) {
        Direction::Input
    } else if contains_any(&name, OUTPUT_TOKENS) {
        Direction::Output
    } else {
        Direction::Unknown
    }
}

/// Signedness from a runtime type name.
pub fn detect_signedness(type_name: &str) -> bool {
    let t = type_name.to_lowercase();
    t.contains("signed") && !t.contains("unsigned")
}

/// Constant from naming: `ALL_CAPS_WITH_UNDERSCORES`, or a runtime type that
/// says so.
pub fn looks_constant(leaf_name: &str, type_name: &str) -> bool {
    if type_name.to_lowercase().contains("const") {
        return true;
    }
    leaf_name.contains('_')
        && leaf_name.chars().any(|c| c.is_ascii_alphabetic())
        && leaf_name == leaf_name.to_uppercase()
}

// ============================================================================
// Classification
// ============================================================================

/// Classify a leaf. Live introspection, when the handle offers it, wins over
/// name heuristics for direction and signedness.
pub fn classify(leaf_name: &str, full_path: &str, live: Option<&dyn SimHandle>) -> SignalMetadata {
    let direction = live
        .and_then(|h| h.introspect_direction().ok())
        .filter(|d| *d != Direction::Unknown)
        .unwrap_or_else(|| detect_direction(leaf_name));

    let is_signed = match live.map(|h| h.introspect_signedness()) {
        Some(Ok(signed)) => signed,
        Some(Err(_)) => live.map(|h| detect_signedness(h.type_name())).unwrap_or(false),
        None => false,
    };

    let metadata = SignalMetadata {
        direction,
        category: classify_category(leaf_name),
        bus_protocol: detect_bus_protocol(leaf_name, full_path),
        is_signed,
    };
    trace!(path = full_path, ?metadata, "classified");
    metadata
}

/// Constant check for a live handle: introspection first, then heuristics.
pub fn is_constant(handle: &dyn SimHandle, leaf_name: &str) -> bool {
    match handle.introspect_constant() {
        Ok(constant) => constant,
        Err(_) => looks_constant(leaf_name, handle.type_name()),
    }
}

/// Human-readable one-line description of a signal.
pub fn describe(direction: Direction, width: Option<u32>, type_name: &str) -> String {
    let mut parts = Vec::new();
    match direction {
        Direction::Unknown => parts.push("Signal".to_string()),
        Direction::Input => parts.push("Input signal".to_string()),
        Direction::Output => parts.push("Output signal".to_string()),
        Direction::Inout => parts.push("Inout signal".to_string()),
    }
    if let Some(w) = width {
        parts.push(format!("({})", plural(u64::from(w), "bit")));
    }
    if type_name != "SimHandleBase" {
        parts.push(format!("of type {}", type_name));
    }
    parts.join(" ")
}

// ============================================================================
// Tests
// ============================================================================
