//! Object-storage download seam.
//!
//! The worker only ever reads: it fetches the uploaded scan bytes for a
//! storage-relative path. Download failures are fatal for the job attempt
//! and are never retried by this core (the external dequeue layer re-drives
//! the whole job instead).

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage returned HTTP {status} for {path}: {body}")]
    Http {
        status: u16,
        path: String,
        body: String,
    },

    #[error("Storage download timed out after {0:?}")]
    Timeout(Duration),

    #[error("Storage network error: {0}")]
    Network(String),
}

/// Read-only object store. The job processor sees only this trait.
pub trait ObjectStore: Send + Sync {
    fn download(
        &self,
        path: &str,
    ) -> impl std::future::Future<Output = Result<Vec<u8>, StorageError>> + Send;
}

/// HTTP object store speaking the storage service's object API.
pub struct HttpObjectStore {
    base_url: String,
    bucket: String,
    api_key: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpObjectStore {
    pub fn new(
        base_url: &str,
        bucket: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StorageError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            api_key: api_key.to_string(),
            timeout,
            client,
        })
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url,
            self.bucket,
            path.trim_start_matches('/')
        )
    }
}

impl ObjectStore for HttpObjectStore {
    async fn download(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let url = self.object_url(path);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    StorageError::Timeout(self.timeout)
                } else {
                    StorageError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Http {
                status: status.as_u16(),
                path: path.to_string(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| StorageError::Network(e.to_string()))?;

        tracing::debug!(path = %path, size = bytes.len(), "Downloaded scan from storage");
        Ok(bytes.to_vec())
    }
}
