use super::{ProbeOutcome, RemoteStore};
use crate::checksum;
use async_trait::async_trait;
use eyre::{bail, Context, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// In-process object store. Entity tags are computed with the same chunked
/// scheme S3 uses, so an object uploaded here fingerprints identically on
/// the next run.
pub struct MemoryStore {
    chunk_size: usize,
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    objects: HashMap<String, StoredObject>,
    probes: Vec<String>,
    uploads: Vec<String>,
    failing_probes: HashSet<String>,
    failing_uploads: HashSet<String>,
}

#[derive(Clone)]
struct StoredObject {
    body: Vec<u8>,
    etag: String,
}

impl MemoryStore {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Store `body` under `key` as if it had been uploaded earlier.
    pub fn insert(&self, key: &str, body: &[u8]) -> Result<()> {
        let etag = format!("\"{}\"", checksum::etag_for_bytes(body, self.chunk_size)?);
        self.insert_with_etag(key, body, &etag);
        Ok(())
    }

    /// Store an object with an explicit raw entity tag (quotes included).
    pub fn insert_with_etag(&self, key: &str, body: &[u8], etag: &str) {
        self.state.lock().objects.insert(
            key.to_string(),
            StoredObject {
                body: body.to_vec(),
                etag: etag.to_string(),
            },
        );
    }

    /// Make every probe of `key` fail with a non-NotFound error.
    pub fn fail_probes_for(&self, key: &str) {
        self.state.lock().failing_probes.insert(key.to_string());
    }

    /// Make every upload to `key` fail.
    pub fn fail_uploads_for(&self, key: &str) {
        self.state.lock().failing_uploads.insert(key.to_string());
    }

    pub fn body(&self, key: &str) -> Option<Vec<u8>> {
        self.state.lock().objects.get(key).map(|o| o.body.clone())
    }

    pub fn etag(&self, key: &str) -> Option<String> {
        self.state.lock().objects.get(key).map(|o| o.etag.clone())
    }

    /// Keys probed so far, in call order.
    pub fn probed_keys(&self) -> Vec<String> {
        self.state.lock().probes.clone()
    }

    /// Keys uploaded so far (including failed attempts), in call order.
    pub fn uploaded_keys(&self) -> Vec<String> {
        self.state.lock().uploads.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn probe(&self, key: &str) -> ProbeOutcome {
        let mut state = self.state.lock();
        state.probes.push(key.to_string());
        if state.failing_probes.contains(key) {
            return ProbeOutcome::Failed("access denied".to_string());
        }
        match state.objects.get(key) {
            Some(object) => ProbeOutcome::Found(object.etag.clone()),
            None => ProbeOutcome::NotFound,
        }
    }

    async fn upload(&self, key: &str, path: &Path) -> Result<String> {
        {
            let mut state = self.state.lock();
            state.uploads.push(key.to_string());
            if state.failing_uploads.contains(key) {
                bail!("upload of {key} rejected");
            }
        }

        let body = tokio::fs::read(path)
            .await
            .wrap_err_with(|| format!("failed to open file {}", path.display()))?;
        self.insert(key, &body)?;
        Ok(format!("memory://{key}"))
    }
}
