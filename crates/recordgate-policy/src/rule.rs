//! Policy and rule definitions

use serde::{Deserialize, Serialize};

use crate::{RecordAction, Trigger};

/// A complete policy containing multiple rules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// Policy name
    pub name: String,

    /// Description of what this policy enforces
    pub description: String,

    /// Version of the policy
    #[serde(default)]
    pub version: String,

    /// Resource identifier prefixes this policy covers; empty covers all.
    /// A prefix covers itself and anything beneath it, never a sibling
    /// that merely shares its leading characters.
    #[serde(default)]
    pub resources: Vec<String>,

    /// Rules in this policy
    pub rules: Vec<PolicyRule>,
}

impl Policy {
    /// Load a policy from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Load a policy from a file
    pub fn from_file(
        path: impl AsRef<std::path::Path>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_yaml(&content)?)
    }

    /// Whether this policy covers a resource identifier
    pub fn covers(&self, resource_id: &str) -> bool {
        self.resources.is_empty()
            || self
                .resources
                .iter()
                .any(|prefix| covers_identifier(prefix, resource_id))
    }
}

fn covers_identifier(prefix: &str, resource_id: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    match resource_id.strip_prefix(prefix) {
        Some(rest) => prefix.is_empty() || rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// A single rule within a policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Rule identifier
    pub name: String,

    /// Description of what this rule does
    #[serde(default)]
    pub description: String,

    /// Trigger conditions
    pub trigger: Trigger,

    /// Actions applied in order to each record
    pub actions: Vec<RecordAction>,

    /// Whether this rule is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}
