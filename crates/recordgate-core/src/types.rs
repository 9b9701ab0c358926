//! Core types for RecordGate

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// The user on whose behalf a resource is read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User identifier
    pub user_id: String,

    /// Roles held by the user
    #[serde(default)]
    pub roles: BTreeSet<String>,

    /// Authorisations held by the user
    #[serde(default)]
    pub auths: BTreeSet<String>,
}

impl User {
    /// Create a user with no roles or authorisations
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            roles: BTreeSet::new(),
            auths: BTreeSet::new(),
        }
    }

    /// Add a role
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    /// Add an authorisation
    pub fn with_auth(mut self, auth: impl Into<String>) -> Self {
        self.auths.insert(auth.into());
        self
    }

    /// Check whether the user holds a role
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// The declared context of a request, most importantly its purpose
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// Purpose the data is being accessed for
    #[serde(default)]
    pub purpose: String,

    /// Any further context entries
    #[serde(default)]
    pub contents: BTreeMap<String, String>,
}

impl Context {
    /// Create a context for a purpose
    pub fn new(purpose: impl Into<String>) -> Self {
        Self {
            purpose: purpose.into(),
            contents: BTreeMap::new(),
        }
    }

    /// Add a context entry
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.contents.insert(key.into(), value.into());
        self
    }

    /// Look up a context entry; `purpose` is addressable by name
    pub fn get(&self, key: &str) -> Option<&str> {
        if key == "purpose" {
            return Some(self.purpose.as_str());
        }
        self.contents.get(key).map(|v| v.as_str())
    }
}

/// Classification key used to select a serialiser
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DataFlavour {
    /// Resource data type, e.g. `employee`
    pub data_type: String,

    /// Record encoding, e.g. `jsonl`
    pub serialised_format: String,
}

impl DataFlavour {
    /// Create a new data flavour
    pub fn new(data_type: impl Into<String>, serialised_format: impl Into<String>) -> Self {
        Self {
            data_type: data_type.into(),
            serialised_format: serialised_format.into(),
        }
    }
}

impl fmt::Display for DataFlavour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.data_type, self.serialised_format)
    }
}

/// A single readable resource
///
/// The identifier is opaque: it may be a fully-qualified URI or a bare path,
/// depending on which upstream system produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafResource {
    /// Opaque resource identifier
    pub id: String,

    /// Resource data type
    pub data_type: String,

    /// Record encoding of the resource
    pub serialised_format: String,
}

impl LeafResource {
    /// Create a new leaf resource
    pub fn new(
        id: impl Into<String>,
        data_type: impl Into<String>,
        serialised_format: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            data_type: data_type.into(),
            serialised_format: serialised_format.into(),
        }
    }

    /// The flavour used to resolve this resource's serialiser
    pub fn flavour(&self) -> DataFlavour {
        DataFlavour::new(&self.data_type, &self.serialised_format)
    }
}
