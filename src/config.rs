//! Workbench configuration loaded from YAML
//!
//! Every field is optional in the file:
//!
//! ```yaml
//! local_namespace: http://workstation.example.org/
//! connect_timeout_ms: 3000
//! ssh_port: 22
//! database: /var/lib/simprov/ledger.db
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::graph::DEFAULT_LOCAL_NAMESPACE;
use crate::remote::DEFAULT_SSH_PORT;

/// Connection test timeout used when none is configured
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 3000;

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkbenchConfig {
    /// Base IRI bound to the `local` prefix
    pub local_namespace: String,
    /// Budget for one connection test
    pub connect_timeout_ms: u64,
    /// Port tried when a host names none
    pub ssh_port: u16,
    /// Ledger database; defaults to the per-user data directory
    pub database: Option<PathBuf>,
}

impl Default for WorkbenchConfig {
    fn default() -> Self {
        Self {
            local_namespace: DEFAULT_LOCAL_NAMESPACE.to_string(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            ssh_port: DEFAULT_SSH_PORT,
            database: None,
        }
    }
}

impl WorkbenchConfig {
    /// Load and validate a YAML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Parse and validate YAML text; an empty document yields the defaults
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config = if text.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str::<Self>(text)?
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.local_namespace.contains(':') {
            return Err(ConfigError::Invalid(format!(
                "local_namespace {:?} is not an absolute IRI",
                self.local_namespace
            )));
        }
        if !self.local_namespace.ends_with(['/', '#']) {
            return Err(ConfigError::Invalid(format!(
                "local_namespace {:?} must end with '/' or '#'",
                self.local_namespace
            )));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid("connect_timeout_ms must be positive".to_string()));
        }
        if self.ssh_port == 0 {
            return Err(ConfigError::Invalid("ssh_port must be positive".to_string()));
        }
        Ok(())
    }

    /// Configured database path, or the per-user default
    pub fn database_path(&self) -> PathBuf {
        self.database.clone().unwrap_or_else(default_db_path)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Default database path (~/.local/share/simprov/simprov.db on Linux)
pub fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    data_dir.join("simprov").join("simprov.db")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = WorkbenchConfig::from_yaml_str("").unwrap();
        assert_eq!(config, WorkbenchConfig::default());
        assert_eq!(config.connect_timeout(), Duration::from_millis(3000));
        assert_eq!(config.ssh_port, 22);
        assert_eq!(config.local_namespace, "http://localhost/");
    }

    #[test]
    fn test_partial_document_keeps_other_defaults() {
        let config = WorkbenchConfig::from_yaml_str("ssh_port: 2222\n").unwrap();
        assert_eq!(config.ssh_port, 2222);
        assert_eq!(config.connect_timeout_ms, DEFAULT_CONNECT_TIMEOUT_MS);
        assert!(config.database.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "local_namespace: http://ws1.example.org/").unwrap();
        writeln!(file, "connect_timeout_ms: 500").unwrap();
        writeln!(file, "database: /tmp/ledger.db").unwrap();

        let config = WorkbenchConfig::load(file.path()).unwrap();
        assert_eq!(config.local_namespace, "http://ws1.example.org/");
        assert_eq!(config.connect_timeout(), Duration::from_millis(500));
        assert_eq!(config.database_path(), PathBuf::from("/tmp/ledger.db"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = WorkbenchConfig::load("/nonexistent/simprov.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_rejects_bad_values() {
        for yaml in [
            "connect_timeout_ms: 0",
            "ssh_port: 0",
            "local_namespace: localhost",
            "local_namespace: http://localhost",
        ] {
            let err = WorkbenchConfig::from_yaml_str(yaml).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "{yaml} should be invalid");
        }
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let err = WorkbenchConfig::from_yaml_str("timeout: 5").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn test_default_db_path_is_under_simprov_dir() {
        let path = default_db_path();
        assert!(path.ends_with("simprov/simprov.db"));
    }
}
