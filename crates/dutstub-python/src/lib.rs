//! Python host-language support for dutstub.
//!
//! This crate turns a discovered hierarchy into Python artifacts. It includes:
//! - Typed stub generation (`.pyi` and importable module source)
//! - A tokenizer and parser that act as the syntax gate for rendered output
//! - Structural stub inspection and coverage analysis
//! - cocotb testbench skeletons
//! - Optional verification through an external interpreter

pub mod coverage;
pub mod names;
pub mod parser;
pub mod render;
pub mod stubgen;
pub mod stubs;
pub mod testbench;
pub mod tokens;
pub mod validation;
pub mod verification;

pub use coverage::{analyze_coverage, CoverageReport};
pub use parser::{parse_module, StubParseError};
pub use render::{check_syntax, render};
pub use stubgen::generate_stub;
pub use stubs::ParsedStub;
pub use testbench::{generate_testbench, TestbenchOptions};
pub use validation::{is_valid_identifier, validate_python_identifier};
pub use verification::{
    verify_artifact, VerificationCheck, VerificationError, VerificationMode, VerificationResult,
    VerificationStatus,
};
