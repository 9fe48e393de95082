//! Entity-tag compatible content fingerprints.
//!
//! S3 reports the ETag of a single-part object as the hex MD5 of its body.
//! For multipart uploads it is the hex MD5 of the concatenated raw part
//! digests followed by `-<parts>`. Computing the same value locally lets the
//! uploader decide whether an object changed without downloading it.

use eyre::{bail, Context, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Part size used both for hashing and for multipart uploads (5 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 5 * 1024 * 1024;

/// Incremental entity-tag builder. Bytes are split into `chunk_size` parts
/// regardless of how callers slice their writes.
pub struct EtagHasher {
    chunk_size: usize,
    current: md5::Context,
    current_len: usize,
    parts: Vec<[u8; 16]>,
}

impl EtagHasher {
    pub fn new(chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            bail!("chunk size must be greater than zero");
        }
        Ok(Self {
            chunk_size,
            current: md5::Context::new(),
            current_len: 0,
            parts: Vec::new(),
        })
    }

    pub fn update(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let remaining = self.chunk_size - self.current_len;
            let take = remaining.min(data.len());
            self.current.consume(&data[..take]);
            self.current_len += take;
            data = &data[take..];

            if self.current_len == self.chunk_size {
                self.seal_part();
            }
        }
    }

    fn seal_part(&mut self) {
        let ctx = std::mem::replace(&mut self.current, md5::Context::new());
        self.parts.push(ctx.finalize().0);
        self.current_len = 0;
    }

    /// Number of parts the data written so far would occupy.
    pub fn part_count(&self) -> usize {
        let pending = usize::from(self.current_len > 0 || self.parts.is_empty());
        self.parts.len() + pending
    }

    pub fn finalize(mut self) -> String {
        // A trailing partial part, or the single empty part of a zero-length input.
        if self.current_len > 0 || self.parts.is_empty() {
            self.seal_part();
        }

        if self.parts.len() == 1 {
            return format!("{:x}", md5::Digest(self.parts[0]));
        }

        let mut combined = md5::Context::new();
        for part in &self.parts {
            combined.consume(part);
        }
        format!("{:x}-{}", combined.finalize(), self.parts.len())
    }
}

/// Compute the entity tag S3 would report for `path` uploaded in
/// `chunk_size` parts.
pub fn multipart_etag(path: &Path, chunk_size: usize) -> Result<String> {
    let mut hasher = EtagHasher::new(chunk_size)?;
    let mut f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut buf = vec![0u8; 256 * 1024];
    loop {
        let n = f
            .read(&mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize())
}

/// Entity tag for an in-memory buffer.
pub fn etag_for_bytes(data: &[u8], chunk_size: usize) -> Result<String> {
    let mut hasher = EtagHasher::new(chunk_size)?;
    hasher.update(data);
    Ok(hasher.finalize())
}
