//! File-system artifact store.

use std::path::Path;

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::domain::errors::ArtifactError;
use crate::domain::ports::ArtifactStore;

/// Artifacts are plain files; handles are paths.
#[derive(Debug, Clone, Default)]
pub struct FsArtifactStore;

impl FsArtifactStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn read(&self, handle: &Path) -> Result<String, ArtifactError> {
        fs::read_to_string(handle).await.map_err(|source| ArtifactError::Read {
            path: handle.to_path_buf(),
            source,
        })
    }

    async fn write(&self, handle: &Path, content: &str) -> Result<(), ArtifactError> {
        let write_err = |source| ArtifactError::Write {
            path: handle.to_path_buf(),
            source,
        };
        let existed = fs::try_exists(handle).await.unwrap_or(false);
        fs::write(handle, content).await.map_err(write_err)?;

        if !existed {
            make_executable(handle).await.map_err(write_err)?;
        }

        debug!(path = %handle.display(), bytes = content.len(), created = !existed, "artifact written");
        Ok(())
    }
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
