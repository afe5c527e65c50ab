use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use super::{ArtifactResolver, ResolveError};

/// Reads artifacts from the local filesystem.
///
/// Accepts `file://` URLs and plain paths.
///
/// Without a root any readable path is served. With a root, relative
/// paths are joined to it and a reference that would leave it (a `..`
/// component, or an absolute path elsewhere) is refused with
/// [`ResolveError::OutsideRoot`]. The check is lexical; symlinks inside
/// the root are followed.
#[derive(Debug, Clone, Default)]
pub struct FileArtifactResolver {
    root: Option<PathBuf>,
}

impl FileArtifactResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn path_for(&self, artifact_ref: &str) -> Result<PathBuf, ResolveError> {
        let raw = artifact_ref
            .strip_prefix("file://")
            .or_else(|| artifact_ref.strip_prefix("FILE://"))
            .unwrap_or(artifact_ref);
        let path = Path::new(raw);
        let Some(root) = &self.root else {
            return Ok(path.to_path_buf());
        };

        if path.components().any(|c| c == Component::ParentDir) {
            return Err(ResolveError::OutsideRoot(artifact_ref.to_string()));
        }
        if path.is_relative() {
            Ok(root.join(path))
        } else if path.starts_with(root) {
            Ok(path.to_path_buf())
        } else {
            Err(ResolveError::OutsideRoot(artifact_ref.to_string()))
        }
    }
}

#[async_trait]
impl ArtifactResolver for FileArtifactResolver {
    async fn resolve(&self, artifact_ref: &str) -> Result<Vec<u8>, ResolveError> {
        let path = self.path_for(artifact_ref)?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|source| ResolveError::Io {
                path: path.clone(),
                source,
            })?;
        if bytes.is_empty() {
            return Err(ResolveError::Empty(artifact_ref.to_string()));
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn reads_file_urls_and_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.png"), b"png-bytes").unwrap();

        let absolute = format!("file://{}", dir.path().join("a.png").display());
        assert_eq!(FileArtifactResolver::new().resolve(&absolute).await.unwrap(), b"png-bytes");

        let rooted = FileArtifactResolver::with_root(dir.path());
        assert_eq!(rooted.resolve("a.png").await.unwrap(), b"png-bytes");
    }

    #[tokio::test]
    async fn missing_and_empty_files_fail() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("empty.png"), b"").unwrap();
        let resolver = FileArtifactResolver::with_root(dir.path());

        assert_matches!(resolver.resolve("nope.png").await, Err(ResolveError::Io { .. }));
        assert_matches!(resolver.resolve("empty.png").await, Err(ResolveError::Empty(_)));
    }

    #[tokio::test]
    async fn rooted_resolver_refuses_paths_outside_root() {
        let parent = tempfile::tempdir().unwrap();
        let root = parent.path().join("artifacts");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(parent.path().join("secret.txt"), b"secret").unwrap();
        std::fs::write(root.join("a.png"), b"png-bytes").unwrap();
        let resolver = FileArtifactResolver::with_root(&root);

        assert_matches!(
            resolver.resolve("../secret.txt").await,
            Err(ResolveError::OutsideRoot(r)) if r == "../secret.txt"
        );
        assert_matches!(
            resolver.resolve("sub/../../secret.txt").await,
            Err(ResolveError::OutsideRoot(_))
        );
        let escaping = format!("file://{}", parent.path().join("secret.txt").display());
        assert_matches!(resolver.resolve(&escaping).await, Err(ResolveError::OutsideRoot(_)));
        let dotted = format!("file://{}/../secret.txt", root.display());
        assert_matches!(resolver.resolve(&dotted).await, Err(ResolveError::OutsideRoot(_)));

        let inside = format!("file://{}", root.join("a.png").display());
        assert_eq!(resolver.resolve(&inside).await.unwrap(), b"png-bytes");
    }

    #[tokio::test]
    async fn unrooted_resolver_reads_any_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("a.png"), b"png-bytes").unwrap();

        let dotted = format!("{}/sub/../a.png", dir.path().display());
        assert_eq!(FileArtifactResolver::new().resolve(&dotted).await.unwrap(), b"png-bytes");
    }
}
