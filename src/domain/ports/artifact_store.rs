//! Artifact store port.

use std::path::Path;

use async_trait::async_trait;

use crate::domain::errors::ArtifactError;

/// Read/write access to mock and test artifact content by handle.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn read(&self, handle: &Path) -> Result<String, ArtifactError>;

    /// Replace the content behind `handle`, creating it if needed.
    /// Newly created artifacts must be executable.
    async fn write(&self, handle: &Path, content: &str) -> Result<(), ArtifactError>;
}
