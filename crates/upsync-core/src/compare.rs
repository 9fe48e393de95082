use crate::errors::{CandidateError, CandidateResult};
use crate::remote::ProbeOutcome;
use std::future::Future;

/// Whether a candidate has to be transferred, and why.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Content matches the stored object.
    Unchanged,
    /// No usable remote fingerprint.
    New,
    /// Stored fingerprint differs from the local one.
    Changed,
}

impl Classification {
    pub fn needs_transfer(self) -> bool {
        !matches!(self, Classification::Unchanged)
    }
}

/// Strip exactly one leading and one trailing character (the quotes S3
/// wraps entity tags in).
pub fn strip_etag_quotes(raw: &str) -> CandidateResult<&str> {
    let mut chars = raw.chars();
    match (chars.next(), chars.next_back()) {
        (Some(_), Some(_)) => Ok(chars.as_str()),
        _ => Err(CandidateError::malformed_fingerprint(raw)),
    }
}

/// Compare a local fingerprint with an already unquoted remote one.
pub fn classify(local: &str, remote: Option<&str>) -> Classification {
    match remote {
        None => Classification::New,
        Some(remote) if remote == local => Classification::Unchanged,
        Some(_) => Classification::Changed,
    }
}

/// Decide what to do with a candidate given its probe outcome. `local` is
/// only awaited when a usable remote fingerprint exists; its failure is
/// returned unchanged. A malformed remote tag is treated as Changed.
pub async fn decide<F, Fut>(remote: &ProbeOutcome, local: F) -> CandidateResult<Classification>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = CandidateResult<String>>,
{
    let Some(raw) = remote.etag() else {
        return Ok(Classification::New);
    };

    let remote = match strip_etag_quotes(raw) {
        Ok(stripped) => stripped,
        Err(err) => {
            log::warn!("{err}; assuming changed");
            return Ok(Classification::Changed);
        }
    };

    let local = local().await?;
    let classification = classify(&local, Some(remote));
    if classification == Classification::Changed {
        log::debug!("fingerprints differ (remote {remote}, local {local})");
    }
    Ok(classification)
}
