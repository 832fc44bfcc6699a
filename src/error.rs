use thiserror::Error;

use crate::domain::error::DomainError;

/// Configuration and precondition errors.
///
/// All of these are fatal: they are raised before any solver work and are
/// never retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file: {0}")]
    ReadFile(String),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("reference and heuristic encodings were built against different models")]
    SolverMismatch,

    #[error("the quantized level rewrite needs a non-empty level list")]
    MissingLevels,

    #[error("global and per-pair demand upper bounds are both set")]
    ConflictingBounds,

    #[error("predetermined path mode requires paths, and paths require predetermined mode")]
    PathModeMismatch,

    #[error("{restriction} requires the quantized level rewrite")]
    RestrictionRequiresLevels { restriction: &'static str },

    #[error("solution enumeration requires the quantized level rewrite")]
    EnumerationRequiresLevels,

    #[error("simplification cannot be combined with solution enumeration")]
    SimplifyWithEnumeration,

    #[error("big-M {big_m} is below the natural value range {required}")]
    BigMTooSmall { big_m: f64, required: f64 },

    #[error("constraint references variable '{name}' that is neither inner nor a declared parameter")]
    UndeclaredVariable { name: String },

    #[error("parameter '{name}' must be binary for the primal-dual rewrite")]
    NonBinaryParameter { name: String },

    #[error("variable '{name}' is declared both as inner variable and as parameter")]
    ParameterIsInner { name: String },

    #[error("invalid partition: {reason}")]
    InvalidPartition { reason: String },
}

/// Solver-side failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("model is infeasible")]
    Infeasible,

    #[error("model is unbounded")]
    Unbounded,

    #[error("solver backend error: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Solver(#[from] SolverError),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The pinning infeasibility signal, if this error carries one.
    #[must_use]
    pub fn as_pinning_infeasible(&self) -> Option<&DomainError> {
        match self {
            Error::Domain(err) if err.is_pinning_infeasible() => Some(err),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
