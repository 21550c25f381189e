//! Service specification model.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::errors::EngineError;

/// One declared network service to mock and test.
///
/// Immutable once a session starts: the session keeps its own copy and
/// artifact content changes go through the artifact store, not the spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Stable identifier, also used for history file names
    pub id: String,

    /// Declared port. A hint only; the allocator may substitute another.
    pub port: u16,

    /// Path to the mock artifact
    pub mock_artifact: PathBuf,

    /// Path to the test artifact
    pub test_artifact: PathBuf,

    /// Free-text functional description, forwarded to the oracle
    #[serde(default)]
    pub description: String,
}

impl ServiceSpec {
    /// Create a new service spec
    pub fn new(
        id: impl Into<String>,
        port: u16,
        mock_artifact: impl Into<PathBuf>,
        test_artifact: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: id.into(),
            port,
            mock_artifact: mock_artifact.into(),
            test_artifact: test_artifact.into(),
            description: String::new(),
        }
    }

    /// Attach a functional description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Check that the spec can be run and persisted.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.id.trim().is_empty() {
            return Err(EngineError::InvalidSpec("service id cannot be empty".to_string()));
        }
        if !self
            .id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
        {
            return Err(EngineError::InvalidSpec(format!(
                "service id '{}' may only contain ASCII letters, digits, '-', '_', '.', ':'",
                self.id
            )));
        }
        if self.mock_artifact.as_os_str().is_empty() {
            return Err(EngineError::InvalidSpec(format!(
                "service '{}' has no mock artifact",
                self.id
            )));
        }
        if self.test_artifact.as_os_str().is_empty() {
            return Err(EngineError::InvalidSpec(format!(
                "service '{}' has no test artifact",
                self.id
            )));
        }
        Ok(())
    }

    /// File-system safe form of the id.
    pub fn file_stem(&self) -> String {
        self.id.replace(':', "_")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_simple_spec() {
        let spec = ServiceSpec::new("auth-udp", 5300, "mocks/auth.py", "tests/auth.py");
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_id() {
        let spec = ServiceSpec::new("  ", 5300, "m", "t");
        assert!(matches!(spec.validate(), Err(EngineError::InvalidSpec(_))));
    }

    #[test]
    fn test_validate_rejects_path_separators_in_id() {
        let spec = ServiceSpec::new("../etc", 5300, "m", "t");
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_missing_artifacts() {
        let spec = ServiceSpec::new("svc", 5300, "", "t");
        assert!(spec.validate().is_err());
        let spec = ServiceSpec::new("svc", 5300, "m", "");
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_file_stem_replaces_colons() {
        let spec = ServiceSpec::new("auth::edge::burst", 1, "m", "t");
        assert_eq!(spec.file_stem(), "auth__edge__burst");
    }

    #[test]
    fn test_yaml_deserialization_defaults_description() {
        let yaml = "id: chat\nport: 9999\nmock_artifact: mocks/chat.sh\ntest_artifact: tests/chat.sh\n";
        let spec: ServiceSpec = serde_yaml::from_str(yaml).expect("spec should parse");
        assert_eq!(spec.port, 9999);
        assert!(spec.description.is_empty());
    }
}
