//! Upload primitive: sends one captured artifact to the remote endpoint.
//!
//! The queue treats every error from here as transient, so the error type
//! only exists for logging.

use crate::config::Config;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use std::time::Duration;

#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, artifact: &str) -> Result<(), UploadError>;
}

/// Multipart POST of the artifact as a single `screenshot` JPEG part.
pub struct HttpUploader {
    client: reqwest::Client,
    endpoint: String,
    auth_token: Option<String>,
}

impl HttpUploader {
    pub fn new(
        endpoint: impl Into<String>,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            auth_token,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, UploadError> {
        Self::new(
            config.upload_endpoint.clone(),
            config.auth_token.clone(),
            config.upload_timeout(),
        )
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn upload(&self, artifact: &str) -> Result<(), UploadError> {
        let start = std::time::Instant::now();
        let bytes = load_artifact(artifact).await?;
        let size = bytes.len();

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(format!(
                "screenshot_{}.jpg",
                chrono::Utc::now().timestamp_millis()
            ))
            .mime_str("image/jpeg")?;
        let form = reqwest::multipart::Form::new().part("screenshot", part);

        let mut request = self.client.post(&self.endpoint).multipart(form);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Status(status.as_u16()));
        }

        log::info!(
            "[UPLOAD] Sent {} bytes to {} in {}ms",
            size,
            self.endpoint,
            start.elapsed().as_millis()
        );
        Ok(())
    }
}

/// Resolve an artifact reference to its bytes.
///
/// Accepts plain paths, `file://` URIs and base64 `data:` URIs.
pub async fn load_artifact(artifact: &str) -> Result<Vec<u8>, UploadError> {
    if let Some(rest) = artifact.strip_prefix("data:") {
        let (meta, payload) = rest
            .split_once(',')
            .ok_or_else(|| UploadError::InvalidDataUri("missing ','".to_string()))?;
        if !meta.ends_with(";base64") {
            return Err(UploadError::InvalidDataUri(format!(
                "unsupported encoding {:?}",
                meta
            )));
        }
        return STANDARD
            .decode(payload)
            .map_err(|e| UploadError::InvalidDataUri(e.to_string()));
    }

    let path = artifact.strip_prefix("file://").unwrap_or(artifact);
    Ok(tokio::fs::read(path).await?)
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Cannot read artifact: {0}")]
    ReadArtifact(#[from] std::io::Error),

    #[error("Invalid data URI: {0}")]
    InvalidDataUri(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Endpoint returned HTTP {0}")]
    Status(u16),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loads_base64_data_uri() {
        let bytes = load_artifact("data:image/jpeg;base64,/9j/4A==").await.unwrap();
        assert_eq!(bytes, vec![0xFF, 0xD8, 0xFF, 0xE0]);
    }

    #[tokio::test]
    async fn rejects_non_base64_data_uri() {
        let result = load_artifact("data:text/plain,hello").await;
        assert!(matches!(result, Err(UploadError::InvalidDataUri(_))));
    }

    #[tokio::test]
    async fn loads_file_paths_and_file_uris() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.jpg");
        std::fs::write(&path, b"jpeg").unwrap();

        let plain = load_artifact(path.to_str().unwrap()).await.unwrap();
        assert_eq!(plain, b"jpeg");

        let uri = format!("file://{}", path.display());
        assert_eq!(load_artifact(&uri).await.unwrap(), b"jpeg");
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let result = load_artifact("/definitely/not/here.jpg").await;
        assert!(matches!(result, Err(UploadError::ReadArtifact(_))));
    }

    #[test]
    fn builds_from_config() {
        let config = Config::default();
        assert!(HttpUploader::from_config(&config).is_ok());
    }
}
