//! Supported simulators, installation detection, and source-driven selection.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

/// HDL source language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HdlLanguage {
    Verilog,
    SystemVerilog,
    Vhdl,
}

/// Static description of a supported simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SimulatorInfo {
    pub name: &'static str,
    pub executable: &'static str,
    pub languages: &'static [HdlLanguage],
    pub interfaces: &'static [&'static str],
    pub features: &'static [&'static str],
}

impl SimulatorInfo {
    pub fn supports_all(&self, required: &BTreeSet<HdlLanguage>) -> bool {
        required.iter().all(|lang| self.languages.contains(lang))
    }

    /// Resolved executable path, if installed.
    pub fn locate(&self) -> Option<PathBuf> {
        which::which(self.executable).ok()
    }
}

use HdlLanguage::{SystemVerilog, Verilog, Vhdl};

pub const SIMULATORS: &[SimulatorInfo] = &[
    SimulatorInfo {
        name: "icarus",
        executable: "iverilog",
        languages: &[Verilog],
        interfaces: &["vpi"],
        features: &["basic"],
    },
    SimulatorInfo {
        name: "verilator",
        executable: "verilator",
        languages: &[Verilog, SystemVerilog],
        interfaces: &["vpi"],
        features: &["performance", "open_source"],
    },
    SimulatorInfo {
        name: "questa",
        executable: "vsim",
        languages: &[Verilog, SystemVerilog, Vhdl],
        interfaces: &["vpi", "vhpi", "fli"],
        features: &["commercial", "mixed_language", "advanced_debug"],
    },
    SimulatorInfo {
        name: "modelsim",
        executable: "vsim",
        languages: &[Verilog, SystemVerilog, Vhdl],
        interfaces: &["vpi", "vhpi", "fli"],
        features: &["commercial", "mixed_language"],
    },
    SimulatorInfo {
        name: "xcelium",
        executable: "xrun",
        languages: &[Verilog, SystemVerilog, Vhdl],
        interfaces: &["vpi", "vhpi"],
        features: &["commercial", "mixed_language", "advanced_debug"],
    },
    SimulatorInfo {
        name: "vcs",
        executable: "vcs",
        languages: &[Verilog, SystemVerilog],
        interfaces: &["vpi"],
        features: &["commercial", "performance"],
    },
    SimulatorInfo {
        name: "ghdl",
        executable: "ghdl",
        languages: &[Vhdl],
        interfaces: &["vhpi"],
        features: &["open_source", "vhdl_only"],
    },
    SimulatorInfo {
        name: "nvc",
        executable: "nvc",
        languages: &[Vhdl],
        interfaces: &["vhpi"],
        features: &["open_source", "vhdl_only", "modern"],
    },
];

/// Selection order when several simulators fit.
pub const PREFERENCE_ORDER: &[&str] = &[
    "questa",
    "xcelium",
    "modelsim",
    "vcs",
    "verilator",
    "icarus",
    "nvc",
    "ghdl",
];

const SYSTEMVERILOG_KEYWORDS: &[&str] = &[
    "interface",
    "modport",
    "class",
    "package",
    "import",
    "logic",
    "bit",
    "byte",
    "shortint",
    "int",
    "longint",
    "always_ff",
    "always_comb",
    "always_latch",
    "unique",
    "priority",
    "final",
];

pub fn lookup(name: &str) -> Option<&'static SimulatorInfo> {
    let name = name.to_ascii_lowercase();
    SIMULATORS.iter().find(|s| s.name == name)
}

/// Simulators whose executable is on `PATH`, in table order.
pub fn installed() -> Vec<&'static SimulatorInfo> {
    SIMULATORS.iter().filter(|s| s.locate().is_some()).collect()
}

// ============================================================================
// Source Sniffing
// ============================================================================

/// HDL sources grouped by language family.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSet {
    pub verilog: Vec<PathBuf>,
    pub vhdl: Vec<PathBuf>,
}

impl SourceSet {
    /// Group paths by extension; unknown extensions are ignored.
    pub fn from_paths<P: AsRef<Path>>(paths: &[P]) -> Self {
        let mut set = SourceSet::default();
        for path in paths {
            let path = path.as_ref();
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_ascii_lowercase);
            match ext.as_deref() {
                Some("v" | "vh" | "sv" | "svh") => set.verilog.push(path.to_path_buf()),
                Some("vhd" | "vhdl") => set.vhdl.push(path.to_path_buf()),
                _ => debug!(path = %path.display(), "ignoring source with unknown extension"),
            }
        }
        set
    }

    /// Languages a simulator must support to compile this set.
    pub fn required_languages(&self) -> BTreeSet<HdlLanguage> {
        let mut required = BTreeSet::new();
        if !self.verilog.is_empty() {
            if self.verilog.iter().any(|p| has_systemverilog_features(p)) {
                required.insert(SystemVerilog);
            } else {
                required.insert(Verilog);
            }
        }
        if !self.vhdl.is_empty() {
            required.insert(Vhdl);
        }
        required
    }
}

/// True if the file uses any SystemVerilog keyword as a whole word.
///
/// An unreadable file counts as SystemVerilog when its extension says so.
pub fn has_systemverilog_features(path: &Path) -> bool {
    match fs::read_to_string(path) {
        Ok(content) => source_mentions_systemverilog(&content),
        Err(_) => matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("sv" | "svh")
        ),
    }
}

fn source_mentions_systemverilog(content: &str) -> bool {
    let lowered = content.to_ascii_lowercase();
    lowered
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .any(|word| SYSTEMVERILOG_KEYWORDS.contains(&word))
}

/// Most preferred simulator among `candidates` that supports `required`.
pub fn best_for(
    candidates: &[&'static SimulatorInfo],
    required: &BTreeSet<HdlLanguage>,
) -> Option<&'static SimulatorInfo> {
    let suitable: Vec<&'static SimulatorInfo> = candidates
        .iter()
        .copied()
        .filter(|s| s.supports_all(required))
        .collect();
    PREFERENCE_ORDER
        .iter()
        .find_map(|name| suitable.iter().copied().find(|s| s.name == *name))
        .or_else(|| suitable.first().copied())
}
