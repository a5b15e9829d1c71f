use std::fmt;

use thiserror::Error;

/// Structured errors emitted while parsing, checking, or evaluating a
/// traversal.
///
/// Parse and type errors are raised before the graph is touched; callers
/// can tell them apart through [`QueryError::code`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The query text could not be tokenized or parsed.
    #[error("parse error at offset {offset}: {message}")]
    Syntax {
        /// Byte offset of the offending token.
        offset: usize,
        /// Human readable description.
        message: String,
    },
    /// The step name is not part of the traversal language.
    #[error("unknown step '{step}'")]
    UnknownStep {
        /// Step name as written.
        step: String,
    },
    /// A step received the wrong number of arguments.
    #[error("{step}() expects {expected} argument(s), got {found}")]
    Arity {
        /// Step name.
        step: &'static str,
        /// Accepted argument counts.
        expected: &'static str,
        /// Supplied argument count.
        found: usize,
    },
    /// A step argument has the wrong shape or value.
    #[error("{step}(): {message}")]
    BadArgument {
        /// Step name.
        step: &'static str,
        /// What was wrong with the argument.
        message: String,
    },
    /// Time context declared after the seed step.
    #[error("Context() must precede V()")]
    ContextAfterSeed,
    /// A traversal step appears before `V()` or `V()` is repeated.
    #[error("{step}() requires a preceding V()")]
    MissingSeed {
        /// Step name.
        step: &'static str,
    },
    /// `V()` appears more than once.
    #[error("V() may appear only once")]
    DuplicateSeed,
    /// A step was applied to a result kind it does not accept.
    #[error("{step}() cannot be applied to {found}; expected {expected}")]
    TypeMismatch {
        /// Step name, or `result` for client accessors.
        step: &'static str,
        /// Accepted kinds.
        expected: &'static str,
        /// Kind actually produced by the previous step.
        found: &'static str,
    },
}

impl QueryError {
    /// Builds a [`QueryError::Syntax`] at `offset`.
    pub fn syntax(offset: usize, message: impl Into<String>) -> Self {
        QueryError::Syntax {
            offset,
            message: message.into(),
        }
    }

    /// Builds a [`QueryError::BadArgument`] for `step`.
    pub fn bad_argument(step: &'static str, message: impl Into<String>) -> Self {
        QueryError::BadArgument {
            step,
            message: message.into(),
        }
    }

    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::Syntax { .. } => "ParseError",
            QueryError::UnknownStep { .. } => "UnknownStep",
            QueryError::Arity { .. } => "Arity",
            QueryError::BadArgument { .. } => "BadArgument",
            QueryError::ContextAfterSeed => "ContextPlacement",
            QueryError::MissingSeed { .. } => "MissingSeed",
            QueryError::DuplicateSeed => "DuplicateSeed",
            QueryError::TypeMismatch { .. } => "TypeError",
        }
    }

    /// Returns true for errors raised while reading the query text.
    pub fn is_parse_error(&self) -> bool {
        !self.is_type_error()
    }

    /// Returns true when a step met a result kind it does not accept.
    pub fn is_type_error(&self) -> bool {
        matches!(self, QueryError::TypeMismatch { .. })
    }
}

/// Convenience wrapper that formats query errors with their codes.
pub struct QueryErrorWithCode<'a>(pub &'a QueryError);

impl fmt::Display for QueryErrorWithCode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.0.code(), self.0)
    }
}
