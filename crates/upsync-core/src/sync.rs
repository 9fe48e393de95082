//! Sync driver: walks the candidates, probes the store, fingerprints what
//! needs comparing and uploads what is new or changed.

use crate::checksum::{self, DEFAULT_CHUNK_SIZE};
use crate::compare::decide;
use crate::enumeration::{CandidateSource, LocalFile};
use crate::errors::{CandidateError, CandidateResult};
use crate::remote::{ProbeOutcome, RemoteStore};
use crate::stats::{CandidateOutcome, RunStatistics};
use eyre::{Context, Result};
use futures::StreamExt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Options for one sync run.
#[derive(Clone, Debug)]
pub struct SyncOptions {
    pub scan_root: PathBuf,
    pub dest_prefix: String,
    pub force: bool,
    pub dry_run: bool,
    pub workers: usize,
    pub chunk_size: usize,
    /// How long candidates already in flight may keep running after a
    /// shutdown request.
    pub shutdown_grace: Duration,
}

/// Default for [`SyncOptions::shutdown_grace`].
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(60);

impl SyncOptions {
    pub fn new(scan_root: impl Into<PathBuf>) -> Self {
        Self {
            scan_root: scan_root.into(),
            dest_prefix: String::new(),
            force: false,
            dry_run: false,
            workers: num_cpus::get().max(1),
            chunk_size: DEFAULT_CHUNK_SIZE,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

/// A local file together with the key it maps to in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub size: u64,
    pub key: String,
}

impl Candidate {
    pub fn new(file: LocalFile, options: &SyncOptions) -> Self {
        let key = remote_key(&file.path, &options.scan_root, &options.dest_prefix);
        Self {
            path: file.path,
            size: file.size,
            key,
        }
    }
}

/// Map a local path to its remote key: the first occurrence of `scan_root`
/// in the path is removed and `dest_prefix` is prepended. Later occurrences
/// of the root are left alone.
pub fn remote_key(path: &Path, scan_root: &Path, dest_prefix: &str) -> String {
    let path = path.to_string_lossy();
    let root = scan_root.to_string_lossy();
    let relative = path.replacen(root.as_ref(), "", 1);
    format!("{dest_prefix}{relative}")
}

pub struct SyncDriver<S> {
    options: SyncOptions,
    store: S,
}

impl<S: RemoteStore> SyncDriver<S> {
    pub fn new(options: SyncOptions, store: S) -> Self {
        Self { options, store }
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Process every candidate from `source` and return the run totals.
    ///
    /// Up to `workers` candidates are in flight at once; the statistics are
    /// folded here, on the coordinating task, as each one completes. When
    /// `shutdown` resolves no further candidates are started. The ones in
    /// flight get `shutdown_grace` to finish and are abandoned after that.
    /// The partial totals are returned with `interrupted` set. An
    /// enumeration failure aborts the run with an error.
    pub async fn run<F>(&self, source: CandidateSource, shutdown: F) -> Result<RunStatistics>
    where
        F: Future<Output = ()>,
    {
        let mut stats = RunStatistics::start();
        let files = source.into_files()?;
        let workers = self.options.workers.max(1);

        let (tx, rx) = mpsc::channel(workers * 2);
        let producer = tokio::task::spawn_blocking(move || {
            for item in files {
                if tx.blocking_send(item).is_err() {
                    break;
                }
            }
        });

        let stopping = AtomicBool::new(false);
        let stopping_ref = &stopping;
        let mut results = ReceiverStream::new(rx)
            .map(move |item: Result<LocalFile>| async move {
                if stopping_ref.load(Ordering::Relaxed) {
                    return Ok(None);
                }
                match item {
                    Ok(file) => {
                        let candidate = Candidate::new(file, &self.options);
                        Ok(Some(self.process(candidate).await))
                    }
                    Err(err) => Err(err),
                }
            })
            .buffer_unordered(workers);

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    stats.interrupted = true;
                    break;
                }
                next = results.next() => match next {
                    Some(Ok(Some(outcome))) => stats.record(outcome),
                    Some(Ok(None)) => {}
                    Some(Err(err)) => return Err(err),
                    None => break,
                },
            }
        }

        if stats.interrupted {
            log::warn!("run interrupted; finishing files already in progress");
            stopping.store(true, Ordering::Relaxed);
            // Queued files are still handed out, but skipped.
            results.get_mut().get_mut().close();

            let grace = self.options.shutdown_grace;
            let deadline = tokio::time::Instant::now() + grace;
            loop {
                match tokio::time::timeout_at(deadline, results.next()).await {
                    Ok(Some(Ok(Some(outcome)))) => stats.record(outcome),
                    Ok(Some(Ok(None))) => {}
                    Ok(Some(Err(err))) => log::warn!("{err:#}"),
                    Ok(None) => break,
                    Err(_) => {
                        log::warn!("files still in progress after {grace:?}; abandoning them");
                        break;
                    }
                }
            }
        }
        drop(results);

        if !stats.interrupted {
            producer.await.wrap_err("candidate enumeration task failed")?;
        }

        stats.finish();
        log::info!("finished");
        Ok(stats)
    }

    async fn process(&self, candidate: Candidate) -> CandidateOutcome {
        if self.options.force {
            return match self.transfer(&candidate).await {
                Ok(()) => CandidateOutcome::forced(),
                Err(err) => CandidateOutcome::forced().with_failure(err.kind),
            };
        }

        log::info!("{}", candidate.path.display());
        let probe = self.store.probe(&candidate.key).await;
        match &probe {
            ProbeOutcome::Found(_) => {}
            ProbeOutcome::NotFound => {
                log::debug!("{:?} doesn't exist in the store -> uploading", candidate.key)
            }
            ProbeOutcome::Failed(reason) => log::warn!(
                "{}; uploading as new",
                CandidateError::probe(reason.as_str(), &candidate.key)
            ),
        }

        let classification = match decide(&probe, || self.fingerprint(&candidate.path)).await {
            Ok(classification) => classification,
            Err(err) => {
                log::error!("{err}");
                return CandidateOutcome::failed(err.kind);
            }
        };

        let outcome = CandidateOutcome::classified(classification);
        if !classification.needs_transfer() {
            log::debug!("{} didn't change -> skipping", candidate.path.display());
            return outcome;
        }
        match self.transfer(&candidate).await {
            Ok(()) => outcome,
            Err(err) => outcome.with_failure(err.kind),
        }
    }

    async fn fingerprint(&self, path: &Path) -> CandidateResult<String> {
        let owned = path.to_path_buf();
        let chunk_size = self.options.chunk_size;
        let joined =
            tokio::task::spawn_blocking(move || checksum::multipart_etag(&owned, chunk_size)).await;
        match joined {
            Ok(Ok(etag)) => Ok(etag),
            Ok(Err(err)) => Err(CandidateError::hash(format!("{err:#}"), path)),
            Err(err) => Err(CandidateError::hash(format!("hashing task failed: {err}"), path)),
        }
    }

    async fn transfer(&self, candidate: &Candidate) -> CandidateResult<()> {
        if self.options.dry_run {
            log::info!(
                "would upload {} to {}",
                candidate.path.display(),
                candidate.key
            );
            return Ok(());
        }

        log::info!("uploading {}", candidate.path.display());
        match self.store.upload(&candidate.key, &candidate.path).await {
            Ok(location) => {
                log::debug!("file uploaded to {location}");
                Ok(())
            }
            Err(err) => {
                let err = CandidateError::transfer(format!("{err:#}"), &candidate.path);
                log::error!("{err}");
                Err(err)
            }
        }
    }
}
