use std::fmt::{self, Display};

/// Errors produced by model parsing and validation routines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A stored label did not name any known variant.
    UnknownVariant {
        /// Name of the enum being parsed.
        kind: &'static str,
        /// The label that failed to parse.
        value: String,
    },
    /// A record violated one of its field invariants.
    InvariantViolation(String),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::UnknownVariant { kind, value } => {
                write!(f, "unknown {kind} value: {value:?}")
            }
            ModelError::InvariantViolation(msg) => {
                write!(f, "invariant violation: {msg}")
            }
        }
    }
}

impl std::error::Error for ModelError {}

pub type Result<T> = std::result::Result<T, ModelError>;
