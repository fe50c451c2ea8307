//! Error types for the compilation pipeline.
//!
//! Every stage surfaces failures as typed variants of [`CompileError`]; no
//! stage recovers internally. A failed compilation returns no partial result:
//! the whole `query()` call fails, and the orchestrator decides whether to
//! surface a message or retry.

/// Errors that can occur during compilation.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// The TPL source did not parse (reported by the front end).
    #[error("Syntax error: {0}")]
    Syntax(String),

    /// The AST violated a structural invariant of the axis tree.
    #[error("Structure error: {0}")]
    Structure(String),

    /// A dimension definition could not be parsed for SQL translation.
    #[error("Dimension error in '{name}': {message}")]
    Dimension { name: String, message: String },

    /// Raw SQL contains a token sequence that would terminate the string
    /// literal wrapping it in the generated model.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A query failed in the executor (passed through).
    #[error("Executor error: {0}")]
    Executor(String),

    /// An invariant violation discovered at runtime.
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type CompileResult<T> = Result<T, CompileError>;
