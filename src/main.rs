//! Binary entry point for the dutstub CLI.
//!
//! ## Usage
//!
//! ```bash
//! # Write counter.pyi from counter.hierarchy.json found in the project
//! dutstub generate --top counter
//!
//! # Importable module with flat access, checked by the Python interpreter
//! dutstub generate --top counter --format module --flat --verify interpreter
//!
//! # Is the checked-in stub still complete?
//! dutstub coverage --top counter --stub stubs/counter.pyi --fail-under 0.95
//! ```
//!
//! Successful commands print one JSON document on stdout. Failures print
//! `error[<category>]: <message>` on stderr and exit 1.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;

use dutstub::cli::{
    run_analyze, run_coverage, run_docs, run_export, run_generate, run_simulators,
    run_testbench, run_validate, Context, DiscoveryRequest, RenderOverrides,
};
use dutstub::output::{emit_response, ErrorResponse, OkResponse};
use dutstub::python::VerificationMode;
use dutstub_core::{DutError, ExportFormat, OutputFormat};

// ============================================================================
// CLI Structure
// ============================================================================

/// Typed Python stubs, documentation and cocotb testbenches for a simulated
/// design under test.
#[derive(Parser, Debug)]
#[command(name = "dutstub", version, about)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

/// Global arguments shared by all subcommands.
#[derive(Args, Debug)]
struct GlobalArgs {
    /// Log level for tracing output (`RUST_LOG` takes precedence).
    #[arg(long, global = true, value_enum, default_value = "warn")]
    log_level: LogLevel,

    /// Log line format on stderr.
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Also print failures as a JSON error envelope on stdout.
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file (default: <project>/.dutstub.toml, then the user config).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

/// Log level for tracing output.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Where the hierarchy comes from and how deep to walk it.
#[derive(Args, Debug, Clone)]
struct DiscoveryArgs {
    /// Project directory searched for snapshots and configuration.
    #[arg(long, default_value = ".")]
    project: PathBuf,

    /// Top-level design unit.
    #[arg(long)]
    top: String,

    /// Simulator backend for the dumper command (e.g. icarus, verilator).
    #[arg(long)]
    simulator: Option<String>,

    /// Hierarchy snapshot to use instead of searching the project.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Depth bound below the top level (overrides configuration).
    #[arg(long)]
    max_depth: Option<i64>,

    /// Keep compile-time constants (parameters, generics).
    #[arg(long, overrides_with = "no_include_constants")]
    include_constants: bool,

    /// Drop compile-time constants even when configuration keeps them.
    #[arg(long, overrides_with = "include_constants")]
    no_include_constants: bool,
}

impl DiscoveryArgs {
    fn to_request(&self) -> DiscoveryRequest {
        DiscoveryRequest {
            top: self.top.clone(),
            simulator: self.simulator.clone(),
            snapshot: self.snapshot.clone(),
            max_depth: self.max_depth,
            include_constants: match (self.include_constants, self.no_include_constants) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            },
        }
    }
}

/// Rendering switches layered over the `[render]` configuration.
#[derive(Args, Debug, Clone)]
struct RenderArgs {
    /// One class for the whole design instead of one per scope.
    #[arg(long)]
    flat: bool,

    /// Annotate signals with category, direction and width comments.
    #[arg(long)]
    metadata: bool,

    /// Skip array wrapper classes.
    #[arg(long)]
    no_arrays: bool,

    /// Skip docstrings.
    #[arg(long)]
    no_docstrings: bool,

    /// Prefix for generated class names.
    #[arg(long)]
    class_prefix: Option<String>,

    /// Suffix for generated class names.
    #[arg(long)]
    class_suffix: Option<String>,
}

impl RenderArgs {
    fn to_overrides(&self) -> RenderOverrides {
        RenderOverrides {
            flat: self.flat,
            metadata: self.metadata,
            no_arrays: self.no_arrays,
            no_docstrings: self.no_docstrings,
            class_prefix: self.class_prefix.clone(),
            class_suffix: self.class_suffix.clone(),
        }
    }
}

/// CLI subcommands.
#[allow(clippy::large_enum_variant)]
#[derive(Subcommand, Debug)]
enum Command {
    /// Discover the design and write a typed stub.
    Generate {
        #[command(flatten)]
        discovery: DiscoveryArgs,
        #[command(flatten)]
        render: RenderArgs,
        /// Stub flavor.
        #[arg(long, value_enum, default_value = "stub")]
        format: StubFormat,
        /// Output file (default: <output dir>/<top>.pyi or .py).
        #[arg(long)]
        outfile: Option<PathBuf>,
        /// Verify the artifact before it is written.
        #[arg(long, value_enum)]
        verify: Option<VerifyMode>,
        /// Include discovery statistics in the response.
        #[arg(long)]
        stats: bool,
    },
    /// Discover the design and write interface documentation.
    Docs {
        #[command(flatten)]
        discovery: DiscoveryArgs,
        #[command(flatten)]
        render: RenderArgs,
        #[arg(long, value_enum, default_value = "markdown")]
        format: DocFormat,
        /// Output file (default: <output dir>/<top>.<ext>).
        #[arg(long)]
        outfile: Option<PathBuf>,
    },
    /// Measure how much of the design an existing stub declares.
    Coverage {
        #[command(flatten)]
        discovery: DiscoveryArgs,
        /// Stub to check.
        #[arg(long)]
        stub: PathBuf,
        /// Minimum coverage ratio (0..=1); without it the stub must match exactly.
        #[arg(long)]
        fail_under: Option<f64>,
    },
    /// Discover the design and write a cocotb testbench skeleton.
    Testbench {
        #[command(flatten)]
        discovery: DiscoveryArgs,
        /// Class-based testbench with clock, reset and several tests.
        #[arg(long)]
        comprehensive: bool,
        /// Module that exports `DutType` (default: the top name).
        #[arg(long)]
        stub_module: Option<String>,
        /// Output file (default: <output dir>/test_<top>.py).
        #[arg(long)]
        outfile: Option<PathBuf>,
    },
    /// Check that expected signals exist.
    Validate {
        #[command(flatten)]
        discovery: DiscoveryArgs,
        /// Expected signal names, comma separated.
        #[arg(long, value_delimiter = ',', required = true)]
        expect: Vec<String>,
    },
    /// Report hierarchy complexity metrics.
    Analyze {
        #[command(flatten)]
        discovery: DiscoveryArgs,
    },
    /// Export the discovered hierarchy.
    Export {
        #[command(flatten)]
        discovery: DiscoveryArgs,
        #[arg(long, value_enum, default_value = "json")]
        format: ExportArg,
        /// Output file (default: <output dir>/<top>.export.<ext>).
        #[arg(long)]
        outfile: Option<PathBuf>,
    },
    /// List supported simulators and which are installed.
    Simulators {
        /// HDL sources used to recommend a simulator.
        #[arg(long, num_args = 1..)]
        sources: Vec<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum StubFormat {
    /// Typed stub interface (.pyi).
    Stub,
    /// Importable module source (.py).
    Module,
}

impl From<StubFormat> for OutputFormat {
    fn from(format: StubFormat) -> Self {
        match format {
            StubFormat::Stub => OutputFormat::StubInterface,
            StubFormat::Module => OutputFormat::ModuleSource,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum DocFormat {
    Markdown,
    Rst,
    Html,
}

impl From<DocFormat> for OutputFormat {
    fn from(format: DocFormat) -> Self {
        match format {
            DocFormat::Markdown => OutputFormat::Markdown,
            DocFormat::Rst => OutputFormat::Rst,
            DocFormat::Html => OutputFormat::Html,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ExportArg {
    Json,
    Yaml,
}

impl From<ExportArg> for ExportFormat {
    fn from(format: ExportArg) -> Self {
        match format {
            ExportArg::Json => ExportFormat::Json,
            ExportArg::Yaml => ExportFormat::Yaml,
        }
    }
}

/// Verification modes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum VerifyMode {
    /// Built-in syntax check only.
    Gate,
    /// Built-in check plus `python3 -m py_compile`.
    Interpreter,
}

impl From<VerifyMode> for VerificationMode {
    fn from(mode: VerifyMode) -> Self {
        match mode {
            VerifyMode::Gate => VerificationMode::Gate,
            VerifyMode::Interpreter => VerificationMode::Interpreter,
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.global.log_level, cli.global.log_format);

    let json_errors = cli.global.json;
    match execute(cli) {
        Ok(Outcome::Passed) => ExitCode::SUCCESS,
        Ok(Outcome::CheckFailed(reason)) => {
            eprintln!("dutstub: {}", reason);
            ExitCode::from(1)
        }
        Err(err) => {
            eprintln!("{}", err.diagnostic());
            if json_errors {
                let _ = emit_response(&ErrorResponse::from_error(&err), &mut io::stdout());
            }
            ExitCode::from(1)
        }
    }
}

/// Initialize tracing subscriber.
fn init_tracing(level: LogLevel, format: LogFormat) {
    use tracing_subscriber::fmt::format::FmtSpan;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_tracing_level().to_string()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Result of a command that ran to completion.
enum Outcome {
    Passed,
    /// Report was printed but the check it describes failed.
    CheckFailed(String),
}

/// Execute the CLI command.
fn execute(cli: Cli) -> Result<Outcome, DutError> {
    let config = cli.global.config.as_deref();
    match cli.command {
        Command::Generate {
            discovery,
            render,
            format,
            outfile,
            verify,
            stats,
        } => {
            let ctx = Context::open(&discovery.project, config)?;
            let response = run_generate(
                &ctx,
                &discovery.to_request(),
                format.into(),
                &render.to_overrides(),
                outfile.as_deref(),
                verify.map(Into::into),
                stats,
            )?;
            emit(response)
        }
        Command::Docs {
            discovery,
            render,
            format,
            outfile,
        } => {
            let ctx = Context::open(&discovery.project, config)?;
            let response = run_docs(
                &ctx,
                &discovery.to_request(),
                format.into(),
                &render.to_overrides(),
                outfile.as_deref(),
            )?;
            emit(response)
        }
        Command::Coverage {
            discovery,
            stub,
            fail_under,
        } => {
            let ctx = Context::open(&discovery.project, config)?;
            let response = run_coverage(&ctx, &discovery.to_request(), &stub, fail_under)?;
            let verdict = if response.passed {
                Outcome::Passed
            } else {
                Outcome::CheckFailed(format!(
                    "coverage {:.3} of {} covers {}/{} nodes{}",
                    response.report.coverage_ratio,
                    response.stub,
                    response.report.covered,
                    response.report.total,
                    response
                        .fail_under
                        .map(|t| format!(", below --fail-under {}", t))
                        .unwrap_or_default()
                ))
            };
            emit(response)?;
            Ok(verdict)
        }
        Command::Testbench {
            discovery,
            comprehensive,
            stub_module,
            outfile,
        } => {
            let ctx = Context::open(&discovery.project, config)?;
            let response = run_testbench(
                &ctx,
                &discovery.to_request(),
                comprehensive,
                stub_module.as_deref(),
                outfile.as_deref(),
            )?;
            emit(response)
        }
        Command::Validate { discovery, expect } => {
            let ctx = Context::open(&discovery.project, config)?;
            let response = run_validate(&ctx, &discovery.to_request(), &expect)?;
            let verdict = if response.validation.valid {
                Outcome::Passed
            } else {
                Outcome::CheckFailed(format!(
                    "missing expected signals: {}",
                    response.validation.missing.join(", ")
                ))
            };
            emit(response)?;
            Ok(verdict)
        }
        Command::Analyze { discovery } => {
            let ctx = Context::open(&discovery.project, config)?;
            emit(run_analyze(&ctx, &discovery.to_request())?)
        }
        Command::Export {
            discovery,
            format,
            outfile,
        } => {
            let ctx = Context::open(&discovery.project, config)?;
            let response = run_export(
                &ctx,
                &discovery.to_request(),
                format.into(),
                outfile.as_deref(),
            )?;
            emit(response)
        }
        Command::Simulators { sources } => emit(run_simulators(&sources)?),
    }
}

/// Print a successful response envelope.
fn emit<T: Serialize>(body: T) -> Result<Outcome, DutError> {
    emit_response(&OkResponse::new(body), &mut io::stdout())
        .map_err(|e| DutError::internal(format!("failed to write response: {}", e)))?;
    let _ = io::stdout().flush();
    Ok(Outcome::Passed)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod cli_parsing {
        use super::*;

        #[test]
        fn generate_defaults() {
            let cli = Cli::try_parse_from(["dutstub", "generate", "--top", "cpu"]).unwrap();
            match cli.command {
                Command::Generate {
                    discovery,
                    format,
                    verify,
                    stats,
                    ..
                } => {
                    assert_eq!(discovery.top, "cpu");
                    assert_eq!(discovery.project, PathBuf::from("."));
                    assert_eq!(format, StubFormat::Stub);
                    assert!(verify.is_none());
                    assert!(!stats);
                }
                _ => panic!("expected Generate"),
            }
        }

        #[test]
        fn global_flags_after_subcommand() {
            let cli = Cli::try_parse_from([
                "dutstub", "analyze", "--top", "cpu", "--json", "--log-format", "json",
            ])
            .unwrap();
            assert!(cli.global.json);
            assert_eq!(cli.global.log_format, LogFormat::Json);
        }

        #[test]
        fn validate_splits_expected_names() {
            let cli = Cli::try_parse_from([
                "dutstub", "validate", "--top", "cpu", "--expect", "clk,rst_n,u_alu.result",
            ])
            .unwrap();
            match cli.command {
                Command::Validate { expect, .. } => {
                    assert_eq!(expect, vec!["clk", "rst_n", "u_alu.result"]);
                }
                _ => panic!("expected Validate"),
            }
        }

        #[test]
        fn constants_flags_are_tri_state() {
            let parse = |extra: &[&str]| {
                let mut args = vec!["dutstub", "analyze", "--top", "cpu"];
                args.extend_from_slice(extra);
                match Cli::try_parse_from(args).unwrap().command {
                    Command::Analyze { discovery } => discovery.to_request().include_constants,
                    _ => panic!("expected Analyze"),
                }
            };
            assert_eq!(parse(&[]), None);
            assert_eq!(parse(&["--include-constants"]), Some(true));
            assert_eq!(parse(&["--no-include-constants"]), Some(false));
            assert_eq!(parse(&["--include-constants", "--no-include-constants"]), Some(false));
        }

        #[test]
        fn top_is_required() {
            assert!(Cli::try_parse_from(["dutstub", "generate"]).is_err());
        }

        #[test]
        fn verify_mode_values() {
            let cli = Cli::try_parse_from([
                "dutstub", "generate", "--top", "cpu", "--verify", "interpreter", "--format", "module",
            ])
            .unwrap();
            match cli.command {
                Command::Generate { verify, format, .. } => {
                    assert_eq!(verify, Some(VerifyMode::Interpreter));
                    assert_eq!(OutputFormat::from(format), OutputFormat::ModuleSource);
                }
                _ => panic!("expected Generate"),
            }
        }
    }
}
