//! Object Store Adapter (C1).
//!
//! Logical-path blob access in front of an S3-compatible bucket, with the
//! retry-on-transient policy from §7 and the kind taxonomy from §4.1.

use crate::error::{PipelineError, Result, StorageErrorKind};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::time::Duration;
use tracing::{info, warn};

/// Behaviour every caller needs from the object store, named exactly as
/// §4.1 lists them.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_file(&self, local_path: &std::path::Path, logical_path: &str) -> Result<()>;
    async fn put_bytes(&self, bytes: Vec<u8>, logical_path: &str, mime: &str) -> Result<()>;
    async fn get_file(&self, logical_path: &str, local_path: &std::path::Path) -> Result<()>;
    async fn get_bytes(&self, logical_path: &str) -> Result<Vec<u8>>;
    async fn delete(&self, logical_path: &str) -> Result<()>;
    async fn list(&self, prefix: &str, recursive: bool) -> Result<Vec<String>>;
    async fn exists(&self, logical_path: &str) -> Result<bool>;
    async fn presign(&self, logical_path: &str, ttl: Duration) -> Result<String>;
}

/// Logical path scheme from §4.1. Kept as free functions rather than methods
/// so callers can build paths without an `ObjectStore` instance in hand.
pub mod paths {
    pub fn raw(subject: &str, session: &str, recording: &str, ext: &str) -> String {
        format!("raw/{subject}/{session}/{recording}.{ext}")
    }
    pub fn cleaned(recording_id: &str) -> String {
        format!("processed/{recording_id}/cleaned_raw.fif")
    }
    pub fn features_table(recording_id: &str) -> String {
        format!("features/{recording_id}/features.parquet")
    }
    pub fn features_summary(recording_id: &str) -> String {
        format!("features/{recording_id}/summary.json")
    }
    pub fn coherence(recording_id: &str) -> String {
        format!("features/{recording_id}/coherence.json")
    }
    pub fn model_artifact(model_id: &str) -> String {
        format!("models/{model_id}/model.bin")
    }
    pub fn model_eval_plot(model_id: &str, name: &str) -> String {
        format!("models/{model_id}/eval_plots/{name}.png")
    }
    pub fn visualization(recording_id: &str, name: &str) -> String {
        format!("visualizations/{recording_id}/{name}.png")
    }
}

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub async fn new(bucket: impl Into<String>) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let client = Client::new(&config);
        let store = Self {
            client,
            bucket: bucket.into(),
        };
        store.ensure_bucket().await;
        store
    }

    async fn ensure_bucket(&self) {
        if self
            .client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .is_err()
        {
            info!(bucket = %self.bucket, "bucket missing, creating on first use");
            let _ = self
                .client
                .create_bucket()
                .bucket(&self.bucket)
                .send()
                .await;
        }
    }

    fn classify(err: &aws_sdk_s3::error::SdkError<impl std::error::Error>) -> StorageErrorKind {
        use aws_sdk_s3::error::SdkError;
        match err {
            SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => StorageErrorKind::Transient,
            SdkError::ServiceError(e) => {
                let status = e.raw().status().as_u16();
                match status {
                    404 => StorageErrorKind::NotFound,
                    401 | 403 => StorageErrorKind::Auth,
                    500..=599 => StorageErrorKind::Transient,
                    _ => StorageErrorKind::Fatal,
                }
            }
            _ => StorageErrorKind::Fatal,
        }
    }

    /// Bounded exponential backoff retry: Transient only, ≤3 attempts,
    /// 1s/2s/4s, per §4.1/§7.
    async fn with_retry<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let delays = [Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)];
        let mut last_err = None;
        for (attempt, delay) in std::iter::once(Duration::ZERO).chain(delays).enumerate() {
            if attempt > 0 {
                warn!(attempt, "retrying transient storage error");
                tokio::time::sleep(delay).await;
            }
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    let retryable = matches!(
                        &e,
                        PipelineError::Storage { kind, .. } if kind.is_retryable()
                    );
                    last_err = Some(e);
                    if !retryable {
                        break;
                    }
                }
            }
        }
        Err(last_err.expect("loop always records an error before exiting on failure"))
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_file(&self, local_path: &std::path::Path, logical_path: &str) -> Result<()> {
        let bytes = tokio::fs::read(local_path).await?;
        self.put_bytes(bytes, logical_path, "application/octet-stream")
            .await
    }

    async fn put_bytes(&self, bytes: Vec<u8>, logical_path: &str, mime: &str) -> Result<()> {
        self.with_retry(|| {
            let bytes = bytes.clone();
            async move {
                self.client
                    .put_object()
                    .bucket(&self.bucket)
                    .key(logical_path)
                    .content_type(mime)
                    .body(ByteStream::from(bytes))
                    .send()
                    .await
                    .map_err(|e| {
                        PipelineError::storage(Self::classify(&e), format!("put {logical_path}: {e}"))
                    })?;
                Ok(())
            }
        })
        .await
    }

    async fn get_file(&self, logical_path: &str, local_path: &std::path::Path) -> Result<()> {
        let bytes = self.get_bytes(logical_path).await?;
        tokio::fs::write(local_path, bytes).await?;
        Ok(())
    }

    async fn get_bytes(&self, logical_path: &str) -> Result<Vec<u8>> {
        self.with_retry(|| async move {
            let out = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(logical_path)
                .send()
                .await
                .map_err(|e| {
                    PipelineError::storage(Self::classify(&e), format!("get {logical_path}: {e}"))
                })?;
            let data = out.body.collect().await.map_err(|e| {
                PipelineError::storage(StorageErrorKind::Transient, format!("stream {logical_path}: {e}"))
            })?;
            Ok(data.into_bytes().to_vec())
        })
        .await
    }

    async fn delete(&self, logical_path: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(logical_path)
            .send()
            .await
            .map_err(|e| PipelineError::storage(Self::classify(&e), format!("delete {logical_path}: {e}")))?;
        Ok(())
    }

    async fn list(&self, prefix: &str, recursive: bool) -> Result<Vec<String>> {
        let mut req = self.client.list_objects_v2().bucket(&self.bucket).prefix(prefix);
        if !recursive {
            req = req.delimiter("/");
        }
        let out = req
            .send()
            .await
            .map_err(|e| PipelineError::storage(Self::classify(&e), format!("list {prefix}: {e}")))?;
        Ok(out
            .contents()
            .iter()
            .filter_map(|o| o.key().map(String::from))
            .collect())
    }

    async fn exists(&self, logical_path: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(logical_path)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => match Self::classify(&e) {
                StorageErrorKind::NotFound => Ok(false),
                kind => Err(PipelineError::storage(kind, format!("head {logical_path}: {e}"))),
            },
        }
    }

    async fn presign(&self, logical_path: &str, ttl: Duration) -> Result<String> {
        use aws_sdk_s3::presigning::PresigningConfig;
        let config = PresigningConfig::expires_in(ttl)
            .map_err(|e| PipelineError::storage(StorageErrorKind::Fatal, e.to_string()))?;
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(logical_path)
            .presigned(config)
            .await
            .map_err(|e| PipelineError::storage(Self::classify(&e), format!("presign {logical_path}: {e}")))?;
        Ok(presigned.uri().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::paths;

    #[test]
    fn logical_paths_match_the_documented_scheme() {
        assert_eq!(paths::raw("s1", "se1", "r1", "edf"), "raw/s1/se1/r1.edf");
        assert_eq!(paths::cleaned("r1"), "processed/r1/cleaned_raw.fif");
        assert_eq!(paths::features_table("r1"), "features/r1/features.parquet");
        assert_eq!(paths::features_summary("r1"), "features/r1/summary.json");
        assert_eq!(paths::model_artifact("m1"), "models/m1/model.bin");
        assert_eq!(
            paths::model_eval_plot("m1", "roc_curve"),
            "models/m1/eval_plots/roc_curve.png"
        );
        assert_eq!(
            paths::visualization("r1", "psd_before"),
            "visualizations/r1/psd_before.png"
        );
    }
}
