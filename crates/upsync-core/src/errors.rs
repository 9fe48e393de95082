//! Per-candidate error taxonomy.
//!
//! Every error here is scoped to a single file: it is logged, folded into the
//! run statistics and never aborts the run. Startup problems (missing options,
//! missing scan root, unusable credentials) and enumeration failures are
//! reported through `eyre` instead and stop the run.

use std::path::Path;

/// What went wrong while processing one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The local file could not be opened or read while fingerprinting.
    Hash,
    /// The metadata probe failed for a reason other than a missing object.
    Probe,
    /// The upload itself failed.
    Transfer,
    /// The stored entity tag is too short to carry its surrounding quotes.
    MalformedFingerprint,
}

impl ErrorKind {
    pub fn label(self) -> &'static str {
        match self {
            ErrorKind::Hash => "hash",
            ErrorKind::Probe => "probe",
            ErrorKind::Transfer => "transfer",
            ErrorKind::MalformedFingerprint => "malformed fingerprint",
        }
    }
}

#[derive(Debug)]
pub struct CandidateError {
    pub kind: ErrorKind,
    /// The local path or remote key the error refers to.
    pub path: Option<String>,
    pub message: String,
}

impl CandidateError {
    fn new(kind: ErrorKind, message: impl Into<String>, path: Option<String>) -> Self {
        Self {
            kind,
            path,
            message: message.into(),
        }
    }

    pub fn hash(message: impl Into<String>, path: &Path) -> Self {
        Self::new(ErrorKind::Hash, message, Some(path.display().to_string()))
    }

    pub fn probe(message: impl Into<String>, key: &str) -> Self {
        Self::new(ErrorKind::Probe, message, Some(key.to_string()))
    }

    pub fn transfer(message: impl Into<String>, path: &Path) -> Self {
        Self::new(ErrorKind::Transfer, message, Some(path.display().to_string()))
    }

    pub fn malformed_fingerprint(raw: &str) -> Self {
        Self::new(
            ErrorKind::MalformedFingerprint,
            format!("entity tag {raw:?} is shorter than two characters"),
            None,
        )
    }
}

impl std::fmt::Display for CandidateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.path {
            Some(ref path) => write!(
                f,
                "{} error for {}: {}",
                self.kind.label(),
                path,
                self.message
            ),
            None => write!(f, "{} error: {}", self.kind.label(), self.message),
        }
    }
}

impl std::error::Error for CandidateError {}

pub type CandidateResult<T> = std::result::Result<T, CandidateError>;
