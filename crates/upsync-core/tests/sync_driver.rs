use async_trait::async_trait;
use eyre::Result;
use std::fs;
use std::future::{pending, ready};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use upsync_core::checksum;
use upsync_core::remote::{MemoryStore, ProbeOutcome, RemoteStore};
use upsync_core::{CandidateSource, SyncDriver, SyncOptions};

const CHUNK: usize = 16;

fn options(root: &Path) -> SyncOptions {
    SyncOptions {
        chunk_size: CHUNK,
        workers: 4,
        ..SyncOptions::new(root)
    }
}

fn populate(root: &Path) -> Result<()> {
    fs::create_dir_all(root.join("photos/2024"))?;
    fs::write(root.join("small.txt"), b"hello")?;
    fs::write(root.join("photos/2024/big.bin"), vec![0x5Au8; CHUNK * 5 / 2])?;
    fs::write(root.join("photos/empty"), b"")?;
    Ok(())
}

#[tokio::test]
async fn second_run_over_unchanged_tree_uploads_nothing() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path();
    populate(root)?;

    let driver = SyncDriver::new(options(root), MemoryStore::new(CHUNK));

    let first = driver.run(CandidateSource::Walk(root.to_path_buf()), pending()).await?;
    assert_eq!(first.file_count, 3);
    assert_eq!(first.new, 3);
    assert_eq!(first.changed, 0);
    assert_eq!(driver.store().len(), 3);

    let second = driver.run(CandidateSource::Walk(root.to_path_buf()), pending()).await?;
    assert_eq!(second.file_count, 3);
    assert_eq!(second.new, 0);
    assert_eq!(second.changed, 0);
    assert_eq!(second.skipped(), 3);
    assert_eq!(driver.store().uploaded_keys().len(), 3);
    Ok(())
}

#[tokio::test]
async fn modified_file_is_reported_changed() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path();
    populate(root)?;

    let driver = SyncDriver::new(options(root), MemoryStore::new(CHUNK));
    driver.run(CandidateSource::Walk(root.to_path_buf()), pending()).await?;

    fs::write(root.join("small.txt"), b"hello, again")?;
    let stats = driver.run(CandidateSource::Walk(root.to_path_buf()), pending()).await?;

    assert_eq!(stats.new, 0);
    assert_eq!(stats.changed, 1);
    assert_eq!(stats.skipped(), 2);
    assert_eq!(
        driver.store().body("/small.txt").as_deref(),
        Some(&b"hello, again"[..])
    );
    Ok(())
}

#[tokio::test]
async fn uploaded_multipart_object_matches_local_fingerprint() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path();
    populate(root)?;

    let driver = SyncDriver::new(options(root), MemoryStore::new(CHUNK));
    driver.run(CandidateSource::Walk(root.to_path_buf()), pending()).await?;

    let local = checksum::multipart_etag(&root.join("photos/2024/big.bin"), CHUNK)?;
    assert!(local.ends_with("-3"));
    assert_eq!(
        driver.store().etag("/photos/2024/big.bin"),
        Some(format!("\"{local}\""))
    );
    Ok(())
}

#[tokio::test]
async fn force_uploads_everything_without_probing() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path();
    populate(root)?;

    let store = MemoryStore::new(CHUNK);
    store.insert("/small.txt", b"hello")?;

    let mut opts = options(root);
    opts.force = true;
    let driver = SyncDriver::new(opts, store);
    let stats = driver.run(CandidateSource::Walk(root.to_path_buf()), pending()).await?;

    assert_eq!(stats.file_count, 3);
    // Forced transfers are neither new nor changed.
    assert_eq!(stats.new + stats.changed, 0);
    assert!(driver.store().probed_keys().is_empty());
    let mut uploaded = driver.store().uploaded_keys();
    uploaded.sort();
    assert_eq!(
        uploaded,
        vec!["/photos/2024/big.bin", "/photos/empty", "/small.txt"]
    );
    Ok(())
}

#[tokio::test]
async fn failed_probe_still_uploads() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path();
    fs::write(root.join("a.txt"), b"a")?;

    let store = MemoryStore::new(CHUNK);
    store.insert("/a.txt", b"a")?;
    store.fail_probes_for("/a.txt");

    let driver = SyncDriver::new(options(root), store);
    let stats = driver.run(CandidateSource::Walk(root.to_path_buf()), pending()).await?;

    assert_eq!(stats.new, 1);
    assert_eq!(driver.store().uploaded_keys(), vec!["/a.txt"]);
    Ok(())
}

#[tokio::test]
async fn malformed_remote_tag_is_treated_as_changed() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path();
    fs::write(root.join("a.txt"), b"a")?;

    let store = MemoryStore::new(CHUNK);
    store.insert_with_etag("/a.txt", b"a", "\"");

    let driver = SyncDriver::new(options(root), store);
    let stats = driver.run(CandidateSource::Walk(root.to_path_buf()), pending()).await?;

    assert_eq!(stats.changed, 1);
    assert_eq!(stats.failed, 0);
    assert_eq!(driver.store().uploaded_keys(), vec!["/a.txt"]);
    Ok(())
}

#[tokio::test]
async fn transfer_failure_does_not_stop_the_run() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path();
    fs::write(root.join("ok.txt"), b"fine")?;
    fs::write(root.join("bad.txt"), b"rejected")?;

    let store = MemoryStore::new(CHUNK);
    store.fail_uploads_for("/bad.txt");

    let driver = SyncDriver::new(options(root), store);
    let stats = driver.run(CandidateSource::Walk(root.to_path_buf()), pending()).await?;

    assert_eq!(stats.file_count, 2);
    assert_eq!(stats.new, 2);
    assert_eq!(stats.failed, 1);
    assert!(driver.store().body("/ok.txt").is_some());
    assert!(driver.store().body("/bad.txt").is_none());
    Ok(())
}

#[tokio::test]
async fn explicit_list_with_destination_prefix() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path();
    populate(root)?;

    let mut opts = options(root);
    opts.dest_prefix = "/intern".into();
    let driver = SyncDriver::new(opts, MemoryStore::new(CHUNK));

    let list = vec![root.join("small.txt"), root.join("photos")];
    let stats = driver.run(CandidateSource::List(list), pending()).await?;

    assert_eq!(stats.file_count, 1);
    assert_eq!(driver.store().uploaded_keys(), vec!["/intern/small.txt"]);
    Ok(())
}

#[tokio::test]
async fn dry_run_classifies_without_uploading() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path();
    populate(root)?;

    let mut opts = options(root);
    opts.dry_run = true;
    let driver = SyncDriver::new(opts, MemoryStore::new(CHUNK));
    let stats = driver.run(CandidateSource::Walk(root.to_path_buf()), pending()).await?;

    assert_eq!(stats.new, 3);
    assert!(driver.store().is_empty());
    assert!(driver.store().uploaded_keys().is_empty());
    Ok(())
}

#[tokio::test]
async fn shutdown_before_start_returns_partial_totals() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path();
    populate(root)?;

    let driver = SyncDriver::new(options(root), MemoryStore::new(CHUNK));
    let stats = driver.run(CandidateSource::Walk(root.to_path_buf()), ready(())).await?;

    assert!(stats.interrupted);
    assert_eq!(stats.file_count, 0);
    assert!(stats.end.is_some());
    Ok(())
}

#[tokio::test]
async fn missing_scan_root_is_fatal() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let missing = tmp.path().join("gone");

    let driver = SyncDriver::new(options(&missing), MemoryStore::new(CHUNK));
    let result = driver.run(CandidateSource::Walk(missing), pending()).await;

    assert!(result.is_err());
    assert!(driver.store().probed_keys().is_empty());
    Ok(())
}

#[tokio::test]
async fn sequential_worker_matches_parallel_totals() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path();
    for i in 0..20 {
        fs::write(root.join(format!("f{i:02}.dat")), vec![i as u8; i * 3])?;
    }

    let mut opts = options(root);
    opts.workers = 1;
    let sequential = SyncDriver::new(opts, MemoryStore::new(CHUNK));
    let parallel = SyncDriver::new(options(root), MemoryStore::new(CHUNK));

    let a = sequential.run(CandidateSource::Walk(root.to_path_buf()), pending()).await?;
    let b = parallel.run(CandidateSource::Walk(root.to_path_buf()), pending()).await?;

    assert_eq!((a.file_count, a.new), (20, 20));
    assert_eq!((b.file_count, b.new), (20, 20));
    Ok(())
}

/// Deletes a local file as soon as its key is probed, so the file is gone
/// by the time it is fingerprinted.
struct VanishingStore {
    inner: MemoryStore,
    key: String,
    local: PathBuf,
}

#[async_trait]
impl RemoteStore for VanishingStore {
    async fn probe(&self, key: &str) -> ProbeOutcome {
        if key == self.key {
            let _ = fs::remove_file(&self.local);
        }
        self.inner.probe(key).await
    }

    async fn upload(&self, key: &str, path: &Path) -> Result<String> {
        self.inner.upload(key, path).await
    }
}

#[tokio::test]
async fn unreadable_file_counts_as_failed_and_skipped() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path();
    let store = MemoryStore::new(CHUNK);
    for name in ["a.txt", "b.txt", "c.txt", "d.txt", "e.txt"] {
        fs::write(root.join(name), name.as_bytes())?;
        store.insert(&format!("/{name}"), name.as_bytes())?;
    }

    let store = VanishingStore {
        inner: store,
        key: "/c.txt".into(),
        local: root.join("c.txt"),
    };
    let driver = SyncDriver::new(options(root), store);
    let stats = driver.run(CandidateSource::Walk(root.to_path_buf()), pending()).await?;

    assert_eq!(stats.file_count, 5);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.new + stats.changed, 0);
    assert_eq!(stats.skipped(), 5);
    assert!(driver.store().inner.uploaded_keys().is_empty());
    Ok(())
}

/// Signals when an upload starts, then holds it for `delay` (forever when
/// `None`) before storing the object.
struct SlowStore {
    inner: MemoryStore,
    upload_started: Arc<Notify>,
    delay: Option<Duration>,
}

impl SlowStore {
    fn new(delay: Option<Duration>) -> Self {
        Self {
            inner: MemoryStore::new(CHUNK),
            upload_started: Arc::new(Notify::new()),
            delay,
        }
    }
}

#[async_trait]
impl RemoteStore for SlowStore {
    async fn probe(&self, key: &str) -> ProbeOutcome {
        self.inner.probe(key).await
    }

    async fn upload(&self, key: &str, path: &Path) -> Result<String> {
        self.upload_started.notify_one();
        match self.delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => pending::<()>().await,
        }
        self.inner.upload(key, path).await
    }
}

fn populate_flat(root: &Path, count: usize) -> Result<()> {
    for i in 0..count {
        fs::write(root.join(format!("f{i}.dat")), vec![i as u8; 8])?;
    }
    Ok(())
}

#[tokio::test]
async fn upload_in_progress_completes_after_shutdown() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path();
    populate_flat(root, 5)?;

    let store = SlowStore::new(Some(Duration::from_millis(50)));
    let started = Arc::clone(&store.upload_started);
    let mut opts = options(root);
    opts.workers = 1;
    let driver = SyncDriver::new(opts, store);

    let shutdown = async move { started.notified().await };
    let stats = driver.run(CandidateSource::Walk(root.to_path_buf()), shutdown).await?;

    assert!(stats.interrupted);
    assert_eq!(stats.file_count, 1);
    assert_eq!(stats.new, 1);
    assert_eq!(stats.failed, 0);
    assert_eq!(driver.store().inner.len(), 1);
    assert_eq!(driver.store().inner.probed_keys().len(), 1);
    Ok(())
}

#[tokio::test]
async fn stuck_upload_is_abandoned_after_grace_period() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path();
    populate_flat(root, 3)?;

    let store = SlowStore::new(None);
    let started = Arc::clone(&store.upload_started);
    let mut opts = options(root);
    opts.workers = 1;
    opts.shutdown_grace = Duration::from_millis(50);
    let driver = SyncDriver::new(opts, store);

    let shutdown = async move { started.notified().await };
    let run = driver.run(CandidateSource::Walk(root.to_path_buf()), shutdown);
    let stats = tokio::time::timeout(Duration::from_secs(10), run).await??;

    assert!(stats.interrupted);
    assert_eq!(stats.file_count, 0);
    assert!(driver.store().inner.is_empty());
    Ok(())
}
