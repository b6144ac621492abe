//! Command implementations behind the `dutstub` binary.
//!
//! Every operation follows the same shape: resolve configuration, obtain the
//! hierarchy through the backend strategies, discover, then render, analyze,
//! or export. Operations return typed response bodies; the binary wraps them
//! in the JSON envelope.
//!
//! ## Error Handling
//!
//! All functions return `Result<T, DutError>`. Check-style operations
//! (`coverage`, `validate`) succeed with a `passed` flag rather than
//! failing, so callers still get the full report.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dutstub_core::output::StatsSummary;
use dutstub_core::util::hierarchy_fingerprint;
use dutstub_core::{
    analyze_complexity, discover, export_hierarchy, validate_interface, ComplexityReport, Config,
    DutError, ExportFormat, HierarchyMapping, InterfaceValidation, OutputFormat, RenderOptions,
};
use dutstub_python::{
    analyze_coverage, generate_testbench, is_valid_identifier, render, verify_artifact,
    CoverageReport, TestbenchOptions, VerificationMode, VerificationResult, VerificationStatus,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::backend::{load_hierarchy, BackendOrigin, BackendRequest};
use crate::simulators::{self, HdlLanguage, SimulatorInfo, SourceSet};

/// Timeout for external interpreter verification.
const VERIFY_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// Requests
// ============================================================================

/// Resolved project directory and configuration.
#[derive(Debug, Clone)]
pub struct Context {
    pub project: PathBuf,
    pub config: Config,
}

impl Context {
    /// Load configuration for `project`; an explicit file must exist.
    pub fn open(project: &Path, explicit_config: Option<&Path>) -> Result<Self, DutError> {
        let config = Config::resolve(explicit_config, project)?;
        Ok(Context {
            project: project.to_path_buf(),
            config,
        })
    }

    pub fn output_dir(&self) -> PathBuf {
        self.config.output_dir(&self.project)
    }
}

/// Arguments shared by every discovery command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryRequest {
    pub top: String,
    pub simulator: Option<String>,
    pub snapshot: Option<PathBuf>,
    /// Overrides `discovery.max_depth`.
    pub max_depth: Option<i64>,
    /// Overrides `discovery.include_constants` in either direction.
    pub include_constants: Option<bool>,
}

/// Command-line overrides of the `[render]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderOverrides {
    pub flat: bool,
    pub metadata: bool,
    pub no_arrays: bool,
    pub no_docstrings: bool,
    pub class_prefix: Option<String>,
    pub class_suffix: Option<String>,
}

impl RenderOverrides {
    fn apply(&self, config: &Config, format: OutputFormat) -> RenderOptions {
        let mut options = config.render.to_options();
        options.output_format = format;
        options.flat_hierarchy |= self.flat;
        options.include_metadata |= self.metadata;
        if self.no_arrays {
            options.include_arrays = false;
        }
        if self.no_docstrings {
            options.include_docstrings = false;
        }
        if let Some(prefix) = &self.class_prefix {
            options.class_prefix = prefix.clone();
        }
        if let Some(suffix) = &self.class_suffix {
            options.class_suffix = suffix.clone();
        }
        options
    }
}

// ============================================================================
// Responses
// ============================================================================

/// Response for commands that write one artifact.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactResponse {
    pub top: String,
    pub format: String,
    pub artifact: String,
    pub bytes: usize,
    pub fingerprint: String,
    pub backend: BackendOrigin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<StatsSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoverageResponse {
    pub top: String,
    pub stub: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_under: Option<f64>,
    #[serde(flatten)]
    pub report: CoverageReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidateResponse {
    pub top: String,
    #[serde(flatten)]
    pub validation: InterfaceValidation,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeResponse {
    pub top: String,
    pub fingerprint: String,
    pub complexity: ComplexityReport,
    pub stats: StatsSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulatorStatus {
    #[serde(flatten)]
    pub info: SimulatorInfo,
    pub installed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulatorsResponse {
    pub simulators: Vec<SimulatorStatus>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required_languages: Vec<HdlLanguage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended: Option<String>,
}

// ============================================================================
// Discovery
// ============================================================================

/// A discovered hierarchy and the strategy that produced it.
#[derive(Debug, Clone)]
pub struct Discovery {
    pub mapping: HierarchyMapping,
    pub origin: BackendOrigin,
}

impl Discovery {
    fn stats(&self) -> StatsSummary {
        StatsSummary::new(&self.mapping.stats, self.mapping.len())
    }
}

/// Load and discover the requested top-level design unit.
pub fn discover_top(ctx: &Context, request: &DiscoveryRequest) -> Result<Discovery, DutError> {
    if request.top.trim().is_empty() {
        return Err(DutError::invalid_args("top-level design unit name is empty"));
    }
    let max_depth = request.max_depth.unwrap_or(ctx.config.discovery.max_depth);
    if max_depth <= 0 {
        return Err(DutError::configuration(format!(
            "max_depth must be positive, got {}",
            max_depth
        )));
    }
    let include_constants = request
        .include_constants
        .unwrap_or(ctx.config.discovery.include_constants);

    let backend = BackendRequest {
        project: ctx.project.clone(),
        top: request.top.clone(),
        simulator: request
            .simulator
            .clone()
            .or_else(|| ctx.config.simulator.preferred.clone()),
        snapshot: request.snapshot.clone(),
    };
    let loaded = load_hierarchy(&backend, &ctx.config.simulator)?;
    let mut handle = loaded.document.handle();
    let mapping = discover(&mut handle, max_depth, include_constants)?;

    if mapping.stats.errors_encountered > 0 {
        warn!(
            errors = mapping.stats.errors_encountered,
            "discovery skipped subtrees that failed to materialize"
        );
    }
    info!(
        top = %request.top,
        nodes = mapping.len(),
        arrays = mapping.arrays.len(),
        "hierarchy discovered"
    );
    Ok(Discovery {
        mapping,
        origin: loaded.origin,
    })
}

// ============================================================================
// Artifact Commands
// ============================================================================

/// Discover and write a typed stub or module.
pub fn run_generate(
    ctx: &Context,
    request: &DiscoveryRequest,
    format: OutputFormat,
    overrides: &RenderOverrides,
    outfile: Option<&Path>,
    verify: Option<VerificationMode>,
    with_stats: bool,
) -> Result<ArtifactResponse, DutError> {
    if !format.is_source() {
        return Err(DutError::invalid_args(format!(
            "generate writes stub-interface or module-source, not {}",
            format
        )));
    }
    let discovery = discover_top(ctx, request)?;
    let options = overrides.apply(&ctx.config, format);
    let text = render(&discovery.mapping, &options)?;
    let path = artifact_path(ctx, outfile, &format!("{}.{}", request.top, format.extension()));
    let verification = write_artifact(&path, &text, verify)?;

    Ok(ArtifactResponse {
        top: request.top.clone(),
        format: format.as_str().to_string(),
        artifact: path.display().to_string(),
        bytes: text.len(),
        fingerprint: hierarchy_fingerprint(&discovery.mapping),
        stats: with_stats.then(|| discovery.stats()),
        backend: discovery.origin,
        verification,
    })
}

/// Discover and write Markdown, reStructuredText, or HTML documentation.
pub fn run_docs(
    ctx: &Context,
    request: &DiscoveryRequest,
    format: OutputFormat,
    overrides: &RenderOverrides,
    outfile: Option<&Path>,
) -> Result<ArtifactResponse, DutError> {
    if format.is_source() {
        return Err(DutError::invalid_args(format!(
            "docs writes markdown, rst or html, not {}",
            format
        )));
    }
    let discovery = discover_top(ctx, request)?;
    let options = overrides.apply(&ctx.config, format);
    let text = render(&discovery.mapping, &options)?;
    let path = artifact_path(ctx, outfile, &format!("{}.{}", request.top, format.extension()));
    write_artifact(&path, &text, None)?;

    Ok(ArtifactResponse {
        top: request.top.clone(),
        format: format.as_str().to_string(),
        artifact: path.display().to_string(),
        bytes: text.len(),
        fingerprint: hierarchy_fingerprint(&discovery.mapping),
        stats: None,
        backend: discovery.origin,
        verification: None,
    })
}

/// Discover and write a cocotb testbench skeleton.
pub fn run_testbench(
    ctx: &Context,
    request: &DiscoveryRequest,
    comprehensive: bool,
    stub_module: Option<&str>,
    outfile: Option<&Path>,
) -> Result<ArtifactResponse, DutError> {
    let discovery = discover_top(ctx, request)?;
    let stub_module = match stub_module {
        Some(module) => module.to_string(),
        None if is_valid_identifier(&request.top) => request.top.clone(),
        None => TestbenchOptions::default().stub_module,
    };
    let options = TestbenchOptions {
        comprehensive,
        stub_module,
    };
    let text = generate_testbench(&discovery.mapping, &options)?;
    let path = artifact_path(ctx, outfile, &format!("test_{}.py", request.top));
    write_artifact(&path, &text, None)?;

    Ok(ArtifactResponse {
        top: request.top.clone(),
        format: if comprehensive { "comprehensive" } else { "simple" }.to_string(),
        artifact: path.display().to_string(),
        bytes: text.len(),
        fingerprint: hierarchy_fingerprint(&discovery.mapping),
        stats: None,
        backend: discovery.origin,
        verification: None,
    })
}

/// Discover and export the hierarchy as JSON or YAML.
pub fn run_export(
    ctx: &Context,
    request: &DiscoveryRequest,
    format: ExportFormat,
    outfile: Option<&Path>,
) -> Result<ArtifactResponse, DutError> {
    let discovery = discover_top(ctx, request)?;
    let text = export_hierarchy(&discovery.mapping, format)?;
    // not `.hierarchy.json`, which project search would pick up as a snapshot
    let path = artifact_path(ctx, outfile, &format!("{}.export.{}", request.top, format.extension()));
    write_artifact(&path, &text, None)?;

    Ok(ArtifactResponse {
        top: request.top.clone(),
        format: format.to_string(),
        artifact: path.display().to_string(),
        bytes: text.len(),
        fingerprint: hierarchy_fingerprint(&discovery.mapping),
        stats: Some(discovery.stats()),
        backend: discovery.origin,
        verification: None,
    })
}

// ============================================================================
// Check Commands
// ============================================================================

/// Compare the discovered hierarchy against an existing stub.
///
/// Without a threshold the stub passes only when it matches exactly.
pub fn run_coverage(
    ctx: &Context,
    request: &DiscoveryRequest,
    stub: &Path,
    fail_under: Option<f64>,
) -> Result<CoverageResponse, DutError> {
    if let Some(threshold) = fail_under {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(DutError::invalid_args(format!(
                "--fail-under must be between 0 and 1, got {}",
                threshold
            )));
        }
    }
    let artifact = fs::read_to_string(stub).map_err(|e| DutError::io(stub.display(), e))?;
    let discovery = discover_top(ctx, request)?;
    let report = analyze_coverage(&discovery.mapping, &artifact);
    let passed = match fail_under {
        Some(threshold) => report.parse_error.is_none() && report.coverage_ratio >= threshold,
        None => report.is_complete(),
    };
    Ok(CoverageResponse {
        top: request.top.clone(),
        stub: stub.display().to_string(),
        passed,
        fail_under,
        report,
    })
}

/// Check that every expected signal name exists.
pub fn run_validate(
    ctx: &Context,
    request: &DiscoveryRequest,
    expected: &[String],
) -> Result<ValidateResponse, DutError> {
    if expected.is_empty() {
        return Err(DutError::invalid_args("--expect needs at least one signal name"));
    }
    let discovery = discover_top(ctx, request)?;
    Ok(ValidateResponse {
        top: request.top.clone(),
        validation: validate_interface(&discovery.mapping, expected),
    })
}

/// Complexity metrics for the discovered hierarchy.
pub fn run_analyze(ctx: &Context, request: &DiscoveryRequest) -> Result<AnalyzeResponse, DutError> {
    let discovery = discover_top(ctx, request)?;
    Ok(AnalyzeResponse {
        top: request.top.clone(),
        fingerprint: hierarchy_fingerprint(&discovery.mapping),
        complexity: analyze_complexity(&discovery.mapping),
        stats: discovery.stats(),
    })
}

/// Supported simulators, their installation state, and a recommendation
/// for `sources` when any are given.
pub fn run_simulators(sources: &[PathBuf]) -> Result<SimulatorsResponse, DutError> {
    for source in sources {
        if !source.is_file() {
            return Err(DutError::invalid_args(format!(
                "source file {} does not exist",
                source.display()
            )));
        }
    }
    let statuses: Vec<SimulatorStatus> = simulators::SIMULATORS
        .iter()
        .map(|info| {
            let path = info.locate();
            SimulatorStatus {
                info: *info,
                installed: path.is_some(),
                path: path.map(|p| p.display().to_string()),
            }
        })
        .collect();

    let (required_languages, recommended) = if sources.is_empty() {
        (Vec::new(), None)
    } else {
        let required = SourceSet::from_paths(sources).required_languages();
        let installed: Vec<&'static SimulatorInfo> = simulators::SIMULATORS
            .iter()
            .zip(&statuses)
            .filter(|(_, status)| status.installed)
            .map(|(info, _)| info)
            .collect();
        let best = simulators::best_for(&installed, &required).map(|s| s.name.to_string());
        (required.into_iter().collect(), best)
    };

    Ok(SimulatorsResponse {
        simulators: statuses,
        required_languages,
        recommended,
    })
}

// ============================================================================
// Artifact Writing
// ============================================================================

fn artifact_path(ctx: &Context, outfile: Option<&Path>, default_name: &str) -> PathBuf {
    match outfile {
        Some(path) => path.to_path_buf(),
        None => ctx.output_dir().join(default_name),
    }
}

/// Write `text` to `path` through a scratch file in the same directory.
///
/// With a verification mode the scratch file is verified before it replaces
/// `path`; a failed verification leaves `path` untouched.
fn write_artifact(
    path: &Path,
    text: &str,
    verify: Option<VerificationMode>,
) -> Result<Option<VerificationResult>, DutError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| DutError::io(dir.display(), e))?;

    let suffix = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default();
    let mut scratch = tempfile::Builder::new()
        .prefix(".dutstub-")
        .suffix(&suffix)
        .tempfile_in(&dir)
        .map_err(|e| DutError::io(dir.display(), e))?;
    scratch
        .write_all(text.as_bytes())
        .and_then(|_| scratch.flush())
        .map_err(|e| DutError::io(scratch.path().display(), e))?;

    let verification = match verify {
        Some(mode) => {
            let result = verify_artifact(scratch.path(), mode, VERIFY_TIMEOUT)?;
            if result.status == VerificationStatus::Failed {
                let (check, output) = result
                    .first_failure()
                    .map(|c| (c.name.clone(), c.output.clone().unwrap_or_default()))
                    .unwrap_or_default();
                return Err(dutstub_python::VerificationError::Failed { check, output }.into());
            }
            Some(result)
        }
        None => None,
    };

    scratch
        .persist(path)
        .map_err(|e| DutError::io(path.display(), e.error))?;
    info!(path = %path.display(), bytes = text.len(), "artifact written");
    Ok(verification)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dutstub_core::{SnapshotDocument, SnapshotNode};
    use tempfile::TempDir;

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        let doc = SnapshotDocument::new(SnapshotNode::scope(
            "counter",
            vec![
                SnapshotNode::signal("clk", "LogicObject", 1).with_direction("input"),
                SnapshotNode::signal("rst_n", "LogicObject", 1).with_direction("input"),
                SnapshotNode::signal("count", "LogicArrayObject", 8).with_direction("output"),
                SnapshotNode::scope(
                    "u_ctrl",
                    vec![SnapshotNode::signal("state", "LogicArrayObject", 2)],
                ),
            ],
        ));
        fs::write(dir.path().join("counter.hierarchy.json"), doc.to_json().unwrap()).unwrap();
        dir
    }

    fn request() -> DiscoveryRequest {
        DiscoveryRequest {
            top: "counter".to_string(),
            ..DiscoveryRequest::default()
        }
    }

    mod generate {
        use super::*;

        #[test]
        fn writes_stub_to_default_path() {
            let dir = project();
            let ctx = Context::open(dir.path(), None).unwrap();
            let response = run_generate(
                &ctx,
                &request(),
                OutputFormat::StubInterface,
                &RenderOverrides::default(),
                None,
                Some(VerificationMode::Gate),
                true,
            )
            .unwrap();
            let written = dir.path().join("counter.pyi");
            assert_eq!(response.artifact, written.display().to_string());
            assert_eq!(fs::read_to_string(&written).unwrap().len(), response.bytes);
            assert_eq!(response.backend.strategy, "project-search");
            assert_eq!(response.stats.unwrap().recorded_nodes, 6);
            assert_eq!(response.verification.unwrap().status, VerificationStatus::Passed);
        }

        #[test]
        fn rejects_documentation_format() {
            let dir = project();
            let ctx = Context::open(dir.path(), None).unwrap();
            let err = run_generate(
                &ctx,
                &request(),
                OutputFormat::Markdown,
                &RenderOverrides::default(),
                None,
                None,
                false,
            )
            .unwrap_err();
            assert_eq!(err.category(), dutstub_core::ErrorCategory::InvalidArguments);
        }

        #[test]
        fn config_depth_is_overridden_by_request() {
            let dir = project();
            fs::write(dir.path().join(".dutstub.toml"), "[discovery]\nmax_depth = 1\n").unwrap();
            let ctx = Context::open(dir.path(), None).unwrap();
            let err = discover_top(&ctx, &request()).unwrap_err();
            assert_eq!(err.category(), dutstub_core::ErrorCategory::DepthExceeded);

            let deeper = DiscoveryRequest {
                max_depth: Some(4),
                ..request()
            };
            assert!(discover_top(&ctx, &deeper).is_ok());
        }

        #[test]
        fn config_constants_are_overridden_by_request() {
            let dir = TempDir::new().unwrap();
            let doc = SnapshotDocument::new(SnapshotNode::scope(
                "counter",
                vec![
                    SnapshotNode::signal("clk", "LogicObject", 1),
                    SnapshotNode::signal("WIDTH", "IntegerObject", 32).with_constant(true),
                ],
            ));
            fs::write(dir.path().join("counter.hierarchy.json"), doc.to_json().unwrap()).unwrap();
            fs::write(
                dir.path().join(".dutstub.toml"),
                "[discovery]\ninclude_constants = true\n",
            )
            .unwrap();
            let ctx = Context::open(dir.path(), None).unwrap();

            let from_config = discover_top(&ctx, &request()).unwrap();
            assert!(from_config.mapping.contains("counter.WIDTH"));

            let dropped = DiscoveryRequest {
                include_constants: Some(false),
                ..request()
            };
            let discovery = discover_top(&ctx, &dropped).unwrap();
            assert!(!discovery.mapping.contains("counter.WIDTH"));
            assert_eq!(discovery.mapping.stats.constants_skipped, 1);
        }

        #[test]
        fn overrides_layer_on_config() {
            let mut config = Config::default();
            config.render.class_suffix = "Handle".to_string();
            let overrides = RenderOverrides {
                flat: true,
                no_docstrings: true,
                ..RenderOverrides::default()
            };
            let options = overrides.apply(&config, OutputFormat::ModuleSource);
            assert!(options.flat_hierarchy);
            assert!(!options.include_docstrings);
            assert!(options.include_arrays);
            assert_eq!(options.class_suffix, "Handle");
            assert_eq!(options.output_format, OutputFormat::ModuleSource);
        }
    }

    mod checks {
        use super::*;

        #[test]
        fn coverage_of_generated_stub_passes() {
            let dir = project();
            let ctx = Context::open(dir.path(), None).unwrap();
            let generated = run_generate(
                &ctx,
                &request(),
                OutputFormat::StubInterface,
                &RenderOverrides::default(),
                None,
                None,
                false,
            )
            .unwrap();
            let response =
                run_coverage(&ctx, &request(), Path::new(&generated.artifact), Some(1.0)).unwrap();
            assert!(response.passed);
            assert_eq!(response.report.coverage_ratio, 1.0);
        }

        #[test]
        fn coverage_threshold_is_range_checked() {
            let dir = project();
            let ctx = Context::open(dir.path(), None).unwrap();
            let err = run_coverage(&ctx, &request(), Path::new("x.pyi"), Some(1.5)).unwrap_err();
            assert_eq!(err.category(), dutstub_core::ErrorCategory::InvalidArguments);
        }

        #[test]
        fn validate_reports_missing_names() {
            let dir = project();
            let ctx = Context::open(dir.path(), None).unwrap();
            let expected = vec!["clk".to_string(), "u_ctrl.state".to_string(), "enable".to_string()];
            let response = run_validate(&ctx, &request(), &expected).unwrap();
            assert!(!response.validation.valid);
            assert_eq!(response.validation.missing, vec!["enable".to_string()]);
        }
    }

    mod writing {
        use super::*;

        #[test]
        fn creates_parent_directories() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("out/stubs/top.pyi");
            write_artifact(&path, "x: int\n", None).unwrap();
            assert_eq!(fs::read_to_string(&path).unwrap(), "x: int\n");
        }

        #[test]
        fn failed_verification_leaves_no_artifact() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("top.pyi");
            let err = write_artifact(&path, "class A:\nx: int\n", Some(VerificationMode::Gate)).unwrap_err();
            assert_eq!(err.category(), dutstub_core::ErrorCategory::RenderValidation);
            assert!(!path.exists());
            assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
        }
    }
}
