//! Turning a result's artifact reference into bytes.
//!
//! [`ArtifactResolver`] is the seam; [`HttpArtifactResolver`] and
//! [`FileArtifactResolver`] cover the common schemes and
//! [`ResolverRegistry`] picks one by the reference's scheme.

pub mod file;
pub mod http;
pub mod registry;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

pub use file::FileArtifactResolver;
pub use http::HttpArtifactResolver;
pub use registry::ResolverRegistry;

/// Errors from fetching a single artifact. Never fatal to a batch.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The artifact host returned a non-2xx status code.
    #[error("Artifact fetch returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Artifact {0} is empty")]
    Empty(String),

    /// A rooted file resolver was asked for a path outside its root.
    #[error("Artifact path {0} escapes the resolver root")]
    OutsideRoot(String),

    #[error("No resolver registered for scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("Resolve timed out after {0:?}")]
    TimedOut(Duration),
}

/// Fetches the bytes behind an artifact reference.
#[async_trait]
pub trait ArtifactResolver: Send + Sync {
    async fn resolve(&self, artifact_ref: &str) -> Result<Vec<u8>, ResolveError>;
}

/// Scheme of `artifact_ref`, lowercased. References without one are paths.
pub(crate) fn scheme_of(artifact_ref: &str) -> Option<String> {
    let (scheme, _) = artifact_ref.split_once("://")?;
    let valid = !scheme.is_empty()
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then(|| scheme.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_detection() {
        assert_eq!(scheme_of("https://bucket/x.png").as_deref(), Some("https"));
        assert_eq!(scheme_of("FILE:///tmp/x.png").as_deref(), Some("file"));
        assert_eq!(scheme_of("/tmp/x.png"), None);
        assert_eq!(scheme_of("outputs/x.png"), None);
        assert_eq!(scheme_of("://x"), None);
    }

    #[test]
    fn status_error_display() {
        let err = ResolveError::Status {
            status: 404,
            body: "no such object".into(),
        };
        assert_eq!(err.to_string(), "Artifact fetch returned HTTP 404: no such object");
    }
}
