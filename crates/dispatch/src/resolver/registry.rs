use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::{scheme_of, ArtifactResolver, FileArtifactResolver, HttpArtifactResolver, ResolveError};

/// Scheme used for references that carry none (plain paths).
const PATH_SCHEME: &str = "file";

/// Routes each reference to the resolver registered for its scheme.
///
/// Constructed explicitly and handed to the dispatcher; there is no
/// process-wide registry.
#[derive(Default, Clone)]
pub struct ResolverRegistry {
    resolvers: HashMap<String, Arc<dyn ArtifactResolver>>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `http`, `https` and `file` (plain paths included).
    pub fn with_defaults() -> Self {
        let http: Arc<dyn ArtifactResolver> = Arc::new(HttpArtifactResolver::new());
        Self::new()
            .with("http", Arc::clone(&http))
            .with("https", http)
            .with(PATH_SCHEME, Arc::new(FileArtifactResolver::new()))
    }

    pub fn with(mut self, scheme: &str, resolver: Arc<dyn ArtifactResolver>) -> Self {
        self.register(scheme, resolver);
        self
    }

    /// Register `resolver` for `scheme`, replacing any previous one.
    pub fn register(&mut self, scheme: &str, resolver: Arc<dyn ArtifactResolver>) {
        self.resolvers.insert(scheme.to_ascii_lowercase(), resolver);
    }

    pub fn schemes(&self) -> impl Iterator<Item = &str> {
        self.resolvers.keys().map(String::as_str)
    }
}

#[async_trait]
impl ArtifactResolver for ResolverRegistry {
    async fn resolve(&self, artifact_ref: &str) -> Result<Vec<u8>, ResolveError> {
        let scheme = scheme_of(artifact_ref).unwrap_or_else(|| PATH_SCHEME.to_string());
        let resolver = self
            .resolvers
            .get(&scheme)
            .ok_or(ResolveError::UnsupportedScheme(scheme))?;
        resolver.resolve(artifact_ref).await
    }
}
