//! Simulator collaborator strategies.
//!
//! A root handle for the requested top-level design unit comes from the
//! first strategy that succeeds:
//!
//! 1. `snapshot-file`: an explicit hierarchy snapshot
//! 2. `project-search`: `<project>/<top>.hierarchy.json`, then any
//!    `*.hierarchy.json` below the project whose root is `<top>`
//! 3. `dumper-command`: the configured dumper, whose stdout is a snapshot
//!
//! Every attempt is recorded. When none succeeds the caller gets
//! [`DutError::SimulatorUnavailable`] listing them all.

use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use dutstub_core::config::SimulatorConfig;
use dutstub_core::{DutError, SnapshotDocument, StrategyAttempt};
use serde::Serialize;
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;
use walkdir::{DirEntry, WalkDir};

use crate::simulators;

/// Suffix of hierarchy snapshot files found by project search.
pub const SNAPSHOT_SUFFIX: &str = ".hierarchy.json";

/// Directories never searched for snapshots.
const SKIPPED_DIRS: &[&str] = &[".git", "target", "build", "sim_build", "__pycache__"];

/// What to load and where to look.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendRequest {
    pub project: PathBuf,
    pub top: String,
    /// Simulator named on the command line or in configuration.
    pub simulator: Option<String>,
    pub snapshot: Option<PathBuf>,
}

/// A loaded hierarchy and where it came from.
#[derive(Debug, Clone)]
pub struct LoadedHierarchy {
    pub document: SnapshotDocument,
    pub origin: BackendOrigin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendOrigin {
    /// Strategy that produced the hierarchy.
    pub strategy: String,
    /// Snapshot path or dumper command line.
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulator: Option<String>,
}

/// Obtain the hierarchy of `request.top`.
pub fn load_hierarchy(
    request: &BackendRequest,
    config: &SimulatorConfig,
) -> Result<LoadedHierarchy, DutError> {
    let mut attempts = Vec::new();

    let strategies: [(&str, Strategy); 3] = [
        ("snapshot-file", try_snapshot_file),
        ("project-search", try_project_search),
        ("dumper-command", try_dumper_command),
    ];
    for (name, strategy) in strategies {
        match strategy(request, config) {
            Ok(loaded) => {
                info!(
                    strategy = name,
                    source = %loaded.origin.source,
                    top = %request.top,
                    "hierarchy loaded"
                );
                return Ok(loaded);
            }
            Err(outcome) => {
                debug!(strategy = name, %outcome, "backend strategy did not apply");
                attempts.push(StrategyAttempt::new(name, outcome));
            }
        }
    }

    Err(DutError::SimulatorUnavailable {
        top: request.top.clone(),
        strategies: attempts,
    })
}

/// A strategy yields a hierarchy or the reason it could not.
type Strategy = fn(&BackendRequest, &SimulatorConfig) -> Result<LoadedHierarchy, String>;

fn try_snapshot_file(
    request: &BackendRequest,
    _config: &SimulatorConfig,
) -> Result<LoadedHierarchy, String> {
    let path = request
        .snapshot
        .as_ref()
        .ok_or_else(|| "no snapshot file given".to_string())?;
    let document = SnapshotDocument::from_path(path).map_err(|e| e.to_string())?;
    check_root(&document, &request.top, path)?;
    Ok(LoadedHierarchy {
        origin: BackendOrigin {
            strategy: "snapshot-file".to_string(),
            source: path.display().to_string(),
            simulator: document.simulator.clone(),
        },
        document,
    })
}

fn try_project_search(
    request: &BackendRequest,
    _config: &SimulatorConfig,
) -> Result<LoadedHierarchy, String> {
    if !request.project.is_dir() {
        return Err(format!(
            "project directory {} does not exist",
            request.project.display()
        ));
    }

    let direct = request
        .project
        .join(format!("{}{}", request.top, SNAPSHOT_SUFFIX));
    let mut rejected = 0usize;
    if direct.is_file() {
        match load_matching(&direct, &request.top) {
            Ok(loaded) => return Ok(loaded),
            Err(reason) => {
                warn!(path = %direct.display(), %reason, "ignoring snapshot");
                rejected += 1;
            }
        }
    }

    for path in snapshot_files(&request.project) {
        if path == direct {
            continue;
        }
        match load_matching(&path, &request.top) {
            Ok(loaded) => return Ok(loaded),
            Err(reason) => {
                debug!(path = %path.display(), %reason, "snapshot does not match");
                rejected += 1;
            }
        }
    }

    if rejected == 0 {
        Err(format!(
            "no *{} files under {}",
            SNAPSHOT_SUFFIX,
            request.project.display()
        ))
    } else {
        Err(format!(
            "none of {} snapshot file(s) under {} has root '{}'",
            rejected,
            request.project.display(),
            request.top
        ))
    }
}

fn load_matching(path: &Path, top: &str) -> Result<LoadedHierarchy, String> {
    let document = SnapshotDocument::from_path(path).map_err(|e| e.to_string())?;
    check_root(&document, top, path)?;
    Ok(LoadedHierarchy {
        origin: BackendOrigin {
            strategy: "project-search".to_string(),
            source: path.display().to_string(),
            simulator: document.simulator.clone(),
        },
        document,
    })
}

fn check_root(document: &SnapshotDocument, top: &str, path: &Path) -> Result<(), String> {
    if document.root.name == top {
        Ok(())
    } else {
        Err(format!(
            "{} describes '{}', not '{}'",
            path.display(),
            document.root.name,
            top
        ))
    }
}

/// Snapshot files under `root`, in file-name order.
pub fn snapshot_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_skipped_dir(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.file_name()
                .to_str()
                .is_some_and(|name| name.ends_with(SNAPSHOT_SUFFIX))
        })
        .map(|e| e.into_path())
        .collect()
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIPPED_DIRS.contains(&name))
}

// ============================================================================
// Dumper Command
// ============================================================================

fn try_dumper_command(
    request: &BackendRequest,
    config: &SimulatorConfig,
) -> Result<LoadedHierarchy, String> {
    if config.dumper.is_empty() {
        return Err("no dumper command configured".to_string());
    }

    let simulator = request.simulator.clone().or_else(|| config.preferred.clone());
    if let Some(name) = &simulator {
        let info = simulators::lookup(name).ok_or_else(|| format!("unknown simulator '{}'", name))?;
        if info.locate().is_none() {
            return Err(format!(
                "simulator '{}' requested but '{}' is not on PATH",
                info.name, info.executable
            ));
        }
    }

    let argv = expand_dumper(&config.dumper, request, simulator.as_deref());
    let command_line = argv.join(" ");
    let timeout = Duration::from_secs(config.timeout_secs);
    let stdout = run_dumper(&argv, &request.project, timeout)?;

    let document = SnapshotDocument::from_json(&stdout)
        .map_err(|e| format!("`{}` printed no usable snapshot: {}", command_line, e))?;
    if document.root.name != request.top {
        return Err(format!(
            "`{}` dumped '{}', not '{}'",
            command_line, document.root.name, request.top
        ));
    }
    let simulator = simulator.or_else(|| document.simulator.clone());
    Ok(LoadedHierarchy {
        origin: BackendOrigin {
            strategy: "dumper-command".to_string(),
            source: command_line,
            simulator,
        },
        document,
    })
}

/// Substitute `{top}`, `{project}` and `{simulator}` in every argument.
pub fn expand_dumper(template: &[String], request: &BackendRequest, simulator: Option<&str>) -> Vec<String> {
    let project = request.project.display().to_string();
    template
        .iter()
        .map(|arg| {
            arg.replace("{top}", &request.top)
                .replace("{project}", &project)
                .replace("{simulator}", simulator.unwrap_or(""))
        })
        .collect()
}

/// Run the dumper and return its stdout.
///
/// Output goes to scratch files rather than pipes so a large dump cannot
/// block the child before the timeout fires.
fn run_dumper(argv: &[String], cwd: &Path, timeout: Duration) -> Result<String, String> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| "empty dumper command".to_string())?;
    let scratch = |what: &str| tempfile::tempfile().map_err(|e| format!("cannot create {} scratch file: {}", what, e));
    let mut out = scratch("stdout")?;
    let mut err = scratch("stderr")?;
    let out_handle = out.try_clone().map_err(|e| e.to_string())?;
    let err_handle = err.try_clone().map_err(|e| e.to_string())?;

    let start = Instant::now();
    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::from(out_handle))
        .stderr(Stdio::from(err_handle))
        .spawn()
        .map_err(|e| format!("cannot run `{}`: {}", program, e))?;

    let status = match child.wait_timeout(timeout).map_err(|e| e.to_string())? {
        Some(status) => status,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            warn!(command = %argv.join(" "), "dumper timed out after {:?}", timeout);
            return Err(format!("`{}` timed out after {:?}", argv.join(" "), timeout));
        }
    };
    debug!(
        duration_ms = start.elapsed().as_millis() as u64,
        code = ?status.code(),
        "dumper finished"
    );

    let read_back = |file: &mut fs::File| -> Result<String, String> {
        let mut text = String::new();
        file.seek(SeekFrom::Start(0)).map_err(|e| e.to_string())?;
        file.read_to_string(&mut text).map_err(|e| e.to_string())?;
        Ok(text)
    };

    if !status.success() {
        let stderr = read_back(&mut err).unwrap_or_default();
        let last = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
        return Err(format!(
            "`{}` exited with {}{}",
            argv.join(" "),
            status.code().map_or_else(|| "a signal".to_string(), |c| format!("status {}", c)),
            if last.is_empty() { String::new() } else { format!(": {}", last.trim()) }
        ));
    }
    read_back(&mut out)
}
