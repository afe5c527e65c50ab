use async_trait::async_trait;

use super::{ArtifactResolver, ResolveError};

/// Downloads artifacts over HTTP(S), e.g. signed storage URLs.
pub struct HttpArtifactResolver {
    client: reqwest::Client,
}

impl HttpArtifactResolver {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Reuse an existing [`reqwest::Client`] for connection pooling.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Pass the response through on 2xx, otherwise capture status and body.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ResolveError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ResolveError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

impl Default for HttpArtifactResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactResolver for HttpArtifactResolver {
    async fn resolve(&self, artifact_ref: &str) -> Result<Vec<u8>, ResolveError> {
        let response = self.client.get(artifact_ref).send().await?;
        let bytes = Self::ensure_success(response).await?.bytes().await?;
        if bytes.is_empty() {
            return Err(ResolveError::Empty(artifact_ref.to_string()));
        }
        tracing::debug!(artifact_ref, size = bytes.len(), "Downloaded artifact");
        Ok(bytes.to_vec())
    }
}
