use crate::checksum::DEFAULT_CHUNK_SIZE;
use crate::remote::S3Settings;
use crate::sync::{SyncOptions, DEFAULT_SHUTDOWN_GRACE};
use eyre::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Options as supplied by one layer (config file or command line). Every
/// field is optional; layers are merged before validation.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialConfig {
    /// Destination bucket
    pub bucket: Option<String>,
    /// Region of the bucket
    pub region: Option<String>,
    /// Local folder to back up
    #[serde(alias = "folder")]
    pub src: Option<PathBuf>,
    /// Remote key prefix
    pub dest: Option<String>,
    /// Skip hashing and upload every file
    pub force: Option<bool>,
    /// Enable debug logging
    pub debug: Option<bool>,
    /// S3-compatible endpoint override
    pub endpoint: Option<String>,
    /// Number of files processed concurrently
    pub workers: Option<usize>,
    /// Classify only, never upload
    pub dry_run: Option<bool>,
    /// Abort the remaining work after this many seconds
    pub timeout_secs: Option<u64>,
}

impl PartialConfig {
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .wrap_err_with(|| format!("failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).wrap_err("failed to parse config file")
    }

    /// Layer `other` on top of `self`; values set in `other` win.
    pub fn merge(self, other: PartialConfig) -> PartialConfig {
        PartialConfig {
            bucket: other.bucket.or(self.bucket),
            region: other.region.or(self.region),
            src: other.src.or(self.src),
            dest: other.dest.or(self.dest),
            force: other.force.or(self.force),
            debug: other.debug.or(self.debug),
            endpoint: other.endpoint.or(self.endpoint),
            workers: other.workers.or(self.workers),
            dry_run: other.dry_run.or(self.dry_run),
            timeout_secs: other.timeout_secs.or(self.timeout_secs),
        }
    }
}

/// Validated configuration for one run.
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    pub bucket: String,
    pub region: String,
    pub src: PathBuf,
    pub dest: String,
    pub force: bool,
    pub debug: bool,
    pub endpoint: Option<String>,
    pub workers: usize,
    pub dry_run: bool,
    pub timeout: Option<Duration>,
}

impl UploaderConfig {
    pub fn from_partial(partial: PartialConfig) -> Result<Self> {
        let mut missing = Vec::new();
        let bucket = non_empty(partial.bucket);
        let region = non_empty(partial.region);
        let src = partial.src.filter(|p| !p.as_os_str().is_empty());
        if bucket.is_none() {
            missing.push("bucket");
        }
        if region.is_none() {
            missing.push("region");
        }
        if src.is_none() {
            missing.push("src");
        }
        let (Some(bucket), Some(region), Some(src)) = (bucket, region, src) else {
            bail!(
                "bucket, region and src are all required parameters (missing: {})",
                missing.join(", ")
            );
        };

        if !src.exists() {
            bail!("the folder {:?} doesn't exist", src.display().to_string());
        }

        let workers = match partial.workers {
            Some(0) => bail!("workers must be at least 1"),
            Some(n) => n,
            None => num_cpus::get().max(1),
        };

        Ok(Self {
            bucket,
            region,
            src,
            dest: partial.dest.unwrap_or_default(),
            force: partial.force.unwrap_or(false),
            debug: partial.debug.unwrap_or(false),
            endpoint: non_empty(partial.endpoint),
            workers,
            dry_run: partial.dry_run.unwrap_or(false),
            timeout: partial.timeout_secs.map(Duration::from_secs),
        })
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            scan_root: self.src.clone(),
            dest_prefix: self.dest.clone(),
            force: self.force,
            dry_run: self.dry_run,
            workers: self.workers,
            chunk_size: DEFAULT_CHUNK_SIZE,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    pub fn s3_settings(&self) -> S3Settings {
        S3Settings {
            bucket: self.bucket.clone(),
            region: self.region.clone(),
            endpoint: self.endpoint.clone(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
