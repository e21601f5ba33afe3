/// Error taxonomy shared by the ingestion and evaluation paths.
///
/// Ingestion failures (`NetworkError`, `ExtractionError`) are recorded per
/// source and never reach evaluation callers; evaluation failures
/// (`ValidationError`, `ConsensusInconsistency`, `CalculationDefect`) are
/// surfaced through [`EngineError`].
use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Malformed input rejected before any computation begins.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Why a fetch failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkCause {
    Timeout,
    Dns,
    Refused,
    HttpStatus(u16),
    TooManyRedirects,
    Other(String),
}

impl fmt::Display for NetworkCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Dns => write!(f, "dns resolution failed"),
            Self::Refused => write!(f, "connection refused"),
            Self::HttpStatus(code) => write!(f, "http status {code}"),
            Self::TooManyRedirects => write!(f, "more than one redirect"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("fetch {url} failed: {cause}")]
pub struct NetworkError {
    pub url: String,
    pub cause: NetworkCause,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("document is empty")]
    Empty,

    #[error("document is not markup")]
    NotMarkup,

    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),
}

/// The placement algorithm produced something it never should. Fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("calculation defect: {0}")]
pub struct CalculationDefect(pub String);

/// A rule whose consensus/statistics block cannot be trusted.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("rule {rule_id}: inconsistent {field}: {reason}")]
pub struct ConsensusInconsistency {
    pub rule_id: String,
    pub field: String,
    pub reason: String,
}

/// Errors visible to callers of the evaluation API surface.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Consensus(#[from] ConsensusInconsistency),

    #[error(transparent)]
    Calculation(#[from] CalculationDefect),
}

impl EngineError {
    /// The offending field, when the error names one.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Validation(e) => Some(&e.field),
            Self::Consensus(e) => Some(&e.field),
            Self::Calculation(_) => None,
        }
    }
}
