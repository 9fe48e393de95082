//! Remote object store access: metadata probes and uploads.

pub mod memory;
pub mod s3;

pub use memory::MemoryStore;
pub use s3::{S3Settings, S3Store};

use async_trait::async_trait;
use eyre::Result;
use std::path::Path;

/// Result of a metadata-only probe for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The object exists; the entity tag is returned exactly as stored,
    /// surrounding quotes included.
    Found(String),
    /// No object is stored under the key.
    NotFound,
    /// The probe failed for another reason (access denied, network, ...).
    Failed(String),
}

impl ProbeOutcome {
    /// The stored entity tag, if the probe produced a usable one.
    pub fn etag(&self) -> Option<&str> {
        match self {
            ProbeOutcome::Found(etag) => Some(etag),
            ProbeOutcome::NotFound | ProbeOutcome::Failed(_) => None,
        }
    }
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch the stored entity tag for `key` without transferring the body.
    async fn probe(&self, key: &str) -> ProbeOutcome;

    /// Upload the file at `path` under `key`, returning the object location.
    async fn upload(&self, key: &str, path: &Path) -> Result<String>;
}
