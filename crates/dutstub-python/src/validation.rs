//! Python identifier validation.
//!
//! Decides which hierarchy segments may be emitted as direct attributes and
//! which must be reached through the keyed `__getitem__` surface.

use thiserror::Error;

/// Error for validation failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Invalid Python identifier name.
    #[error("invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Python keywords that cannot be used as identifiers.
pub const PYTHON_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class", "continue",
    "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if", "import",
    "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try", "while",
    "with", "yield",
];

/// Check if a name is a Python keyword.
pub fn is_python_keyword(name: &str) -> bool {
    PYTHON_KEYWORDS.contains(&name)
}

/// Validate that a string is a valid Python identifier.
///
/// Checks:
/// - Non-empty
/// - Starts with letter or underscore
/// - Contains only alphanumeric and underscore
/// - Not a Python keyword
///
/// # Examples
///
/// ```
/// use dutstub_python::validation::validate_python_identifier;
///
/// assert!(validate_python_identifier("clk").is_ok());
/// assert!(validate_python_identifier("_private").is_ok());
/// assert!(validate_python_identifier("mem[0]").is_err());
/// assert!(validate_python_identifier("2nd_stage").is_err());
/// assert!(validate_python_identifier("class").is_err());
/// ```
pub fn validate_python_identifier(name: &str) -> ValidationResult<()> {
    let Some(first) = name.chars().next() else {
        return Err(ValidationError::InvalidName {
            name: name.to_string(),
            reason: "name cannot be empty".to_string(),
        });
    };

    if !first.is_alphabetic() && first != '_' {
        return Err(ValidationError::InvalidName {
            name: name.to_string(),
            reason: "must start with letter or underscore".to_string(),
        });
    }

    for ch in name.chars().skip(1) {
        if !ch.is_alphanumeric() && ch != '_' {
            return Err(ValidationError::InvalidName {
                name: name.to_string(),
                reason: format!("invalid character: '{}'", ch),
            });
        }
    }

    if is_python_keyword(name) {
        return Err(ValidationError::InvalidName {
            name: name.to_string(),
            reason: "cannot use Python keyword as identifier".to_string(),
        });
    }

    Ok(())
}

/// True if `name` can be emitted as a bare attribute.
pub fn is_valid_identifier(name: &str) -> bool {
    validate_python_identifier(name).is_ok()
}

// ============================================================================
// Tests
// ============================================================================
