use super::{ProbeOutcome, RemoteStore};
use async_trait::async_trait;
use eyre::{bail, Context, Result};
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload, WriteMultipart};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Upper bound on multipart parts buffered or in flight per upload.
const MAX_PARTS_IN_FLIGHT: usize = 4;

#[derive(Debug, Clone)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    /// Optional S3-compatible endpoint (MinIO, Ceph, ...).
    pub endpoint: Option<String>,
    /// Part size for multipart uploads. Must match the fingerprint chunk size.
    pub chunk_size: usize,
}

/// S3 bucket client. Credentials come from the ambient provider chain
/// (environment, profile, web identity, instance metadata).
pub struct S3Store {
    client: AmazonS3,
    bucket: String,
    chunk_size: usize,
}

impl S3Store {
    pub fn new(settings: &S3Settings) -> Result<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(&settings.bucket)
            .with_region(&settings.region);
        if let Some(endpoint) = &settings.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }
        let client = builder.build().wrap_err_with(|| {
            format!("failed to create S3 client for bucket {}", settings.bucket)
        })?;

        Ok(Self {
            client,
            bucket: settings.bucket.clone(),
            chunk_size: settings.chunk_size,
        })
    }

    /// Resolve credentials once so a missing or broken credential chain is
    /// reported before any file is touched.
    pub async fn verify_credentials(&self) -> Result<()> {
        self.client
            .credentials()
            .get_credential()
            .await
            .wrap_err("can't find valid AWS credentials")?;
        Ok(())
    }

    async fn upload_single(&self, location: &ObjectPath, mut file: File, size: u64) -> Result<()> {
        let mut body = Vec::with_capacity(size as usize);
        file.read_to_end(&mut body).await?;
        self.client.put(location, PutPayload::from(body)).await?;
        Ok(())
    }

    async fn upload_multipart(&self, location: &ObjectPath, mut file: File) -> Result<()> {
        let upload = self.client.put_multipart(location).await?;
        let mut pending = PendingMultipart::new(
            WriteMultipart::new_with_chunk_size(upload, self.chunk_size),
            location.clone(),
        );

        match pending.write_from(&mut file).await {
            Ok(()) => pending.finish().await,
            Err(err) => {
                pending.abort().await;
                Err(err)
            }
        }
    }
}

/// A multipart upload that has not been completed yet. Dropping it before
/// `finish` or `abort` (a cancelled run) aborts the upload in the background
/// so no incomplete upload is left on the bucket.
struct PendingMultipart {
    writer: Option<WriteMultipart>,
    location: ObjectPath,
}

impl PendingMultipart {
    fn new(writer: WriteMultipart, location: ObjectPath) -> Self {
        Self {
            writer: Some(writer),
            location,
        }
    }

    async fn write_from(&mut self, file: &mut File) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            bail!("multipart upload of {} already closed", self.location);
        };
        write_parts(file, writer).await
    }

    async fn finish(mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finish().await?;
        }
        Ok(())
    }

    async fn abort(mut self) {
        if let Some(writer) = self.writer.take() {
            abort_upload(writer, &self.location).await;
        }
    }
}

impl Drop for PendingMultipart {
    fn drop(&mut self) {
        let Some(writer) = self.writer.take() else {
            return;
        };
        let location = self.location.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                log::warn!("multipart upload of {location} cancelled; aborting it");
                handle.spawn(async move { abort_upload(writer, &location).await });
            }
            Err(_) => log::warn!("multipart upload of {location} left incomplete"),
        }
    }
}

async fn abort_upload(writer: WriteMultipart, location: &ObjectPath) {
    if let Err(err) = writer.abort().await {
        log::warn!("failed to abort multipart upload of {location}: {err}");
    }
}

async fn write_parts(file: &mut File, writer: &mut WriteMultipart) -> Result<()> {
    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        writer.wait_for_capacity(MAX_PARTS_IN_FLIGHT).await?;
        writer.write(&buf[..n]);
    }
}

/// Map a remote key onto a store path. The key is used as is: one leading
/// `/` is dropped and no character is escaped, so `photo#1.jpg` stays
/// `photo#1.jpg`. Empty, `.` and `..` segments are rejected.
pub fn object_path(key: &str) -> Result<ObjectPath> {
    ObjectPath::parse(key).wrap_err_with(|| format!("invalid object key {key:?}"))
}

#[async_trait]
impl RemoteStore for S3Store {
    async fn probe(&self, key: &str) -> ProbeOutcome {
        log::debug!("checking if {key:?} exists in S3");
        let location = match object_path(key) {
            Ok(location) => location,
            Err(err) => return ProbeOutcome::Failed(format!("{err:#}")),
        };
        match self.client.head(&location).await {
            Ok(meta) => match meta.e_tag {
                Some(etag) => ProbeOutcome::Found(etag),
                None => ProbeOutcome::Failed("object has no entity tag".to_string()),
            },
            Err(object_store::Error::NotFound { .. }) => ProbeOutcome::NotFound,
            Err(err) => ProbeOutcome::Failed(err.to_string()),
        }
    }

    async fn upload(&self, key: &str, path: &Path) -> Result<String> {
        let location = object_path(key)?;
        let file = File::open(path)
            .await
            .wrap_err_with(|| format!("failed to open file {}", path.display()))?;
        let size = file
            .metadata()
            .await
            .wrap_err_with(|| format!("stat {}", path.display()))?
            .len();

        // A single PUT keeps the stored tag a plain MD5, matching the
        // single-chunk fingerprint.
        let result = if size <= self.chunk_size as u64 {
            self.upload_single(&location, file, size).await
        } else {
            self.upload_multipart(&location, file).await
        };
        result.wrap_err_with(|| format!("failed to upload {} to {}", path.display(), location))?;

        Ok(format!("s3://{}/{}", self.bucket, location))
    }
}
