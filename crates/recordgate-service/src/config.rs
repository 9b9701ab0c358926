//! Service configuration

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Listen address
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Data reader settings
    #[serde(default)]
    pub reader: ReaderConfig,

    /// Storage backend settings, e.g. `fs.root`, passed through verbatim
    #[serde(default)]
    pub backend: HashMap<String, String>,

    /// Policy file, or directory of policy files
    #[serde(default = "default_policy_path")]
    pub policy_path: String,

    /// Telemetry configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Overrides taken from the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub listen: Option<String>,
    pub port: Option<u16>,
    pub policy: Option<String>,
    pub fs_root: Option<String>,
    pub max_concurrent_reads: Option<usize>,
}

impl ServiceConfig {
    /// Load configuration from file and CLI overrides
    pub fn load(config_path: impl AsRef<Path>, overrides: &ConfigOverrides) -> anyhow::Result<Self> {
        let config_path = config_path.as_ref();

        // Try to load from file, or use defaults
        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            serde_yaml::from_str(&content)?
        } else {
            Self::default()
        };

        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Apply CLI overrides
    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(listen) = &overrides.listen {
            self.listen = listen.clone();
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(policy) = &overrides.policy {
            self.policy_path = policy.clone();
        }
        if let Some(root) = &overrides.fs_root {
            self.backend.insert("fs.root".to_string(), root.clone());
        }
        if let Some(max) = overrides.max_concurrent_reads {
            self.reader.max_concurrent_reads = max;
        }
    }

    /// Reject settings the service cannot start with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.reader.max_concurrent_reads == 0 {
            anyhow::bail!("reader.max_concurrent_reads must be at least 1");
        }
        if self.reader.flavours.is_empty() {
            anyhow::bail!("reader.flavours must name at least one data type and format");
        }
        Ok(())
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
            reader: ReaderConfig::default(),
            backend: HashMap::new(),
            policy_path: default_policy_path(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// Data reader settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Reader instance identifier
    #[serde(default = "default_reader_id")]
    pub id: String,

    /// Reads served at once before new ones are refused
    #[serde(default = "default_max_concurrent_reads")]
    pub max_concurrent_reads: usize,

    /// Data flavours served as JSON lines
    #[serde(default = "default_flavours")]
    pub flavours: Vec<FlavourConfig>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            id: default_reader_id(),
            max_concurrent_reads: default_max_concurrent_reads(),
            flavours: default_flavours(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlavourConfig {
    pub data_type: String,
    pub format: String,
}

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Record read outcomes in the audit trail
    #[serde(default = "default_true")]
    pub audit: bool,

    /// Persist the audit trail to this JSON-lines file
    #[serde(default)]
    pub audit_path: Option<PathBuf>,

    /// Recent audit events kept in memory for `/audit`
    #[serde(default = "default_audit_retention")]
    pub audit_retention: usize,
}

fn default_audit_retention() -> usize {
    1000
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            audit: true,
            audit_path: None,
            audit_retention: default_audit_retention(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_policy_path() -> String {
    "./policies".to_string()
}

fn default_reader_id() -> String {
    "local-fs-reader".to_string()
}

fn default_max_concurrent_reads() -> usize {
    num_cpus::get() * 4
}

fn default_flavours() -> Vec<FlavourConfig> {
    vec![FlavourConfig {
        data_type: "record".to_string(),
        format: "jsonl".to_string(),
    }]
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_partial_yaml() {
        let config: ServiceConfig = serde_yaml::from_str(
            r#"
port: 9090
backend:
  fs.root: /srv/data
"#,
        )
        .unwrap();

        assert_eq!(config.port, 9090);
        assert_eq!(config.listen, "0.0.0.0");
        assert_eq!(config.backend.get("fs.root").map(String::as_str), Some("/srv/data"));
        assert_eq!(config.reader.flavours, default_flavours());
        assert!(config.reader.max_concurrent_reads >= 4);
        assert!(config.telemetry.audit);
    }

    #[test]
    fn test_overrides_win() {
        let mut config = ServiceConfig::default();
        config.apply(&ConfigOverrides {
            port: Some(1234),
            fs_root: Some("/tmp/data".to_string()),
            max_concurrent_reads: Some(2),
            ..Default::default()
        });

        assert_eq!(config.port, 1234);
        assert_eq!(config.backend["fs.root"], "/tmp/data");
        assert_eq!(config.reader.max_concurrent_reads, 2);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut config = ServiceConfig::default();
        config.reader.max_concurrent_reads = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = ServiceConfig::load("/nonexistent/recordgate.yaml", &ConfigOverrides::default()).unwrap();
        assert_eq!(config.port, 8080);
    }
}
