//! Data model
//!
//! Request payloads accepted by the stores and the records they return.
//! Request types reject unknown JSON fields.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stored configuration value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigValue {
    pub key: String,
    pub value: String,
}

impl ConfigValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A single `key=value` label attached to a group member
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Label {
    pub key: String,
    pub value: String,
}

impl Label {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Body of a config create / create-version request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewConfig {
    pub key: String,
    pub value: String,
    pub version: String,
}

impl NewConfig {
    pub fn new(
        key: impl Into<String>,
        value: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            version: version.into(),
        }
    }

    /// The `{key, value}` part that is actually stored
    pub fn to_value(&self) -> ConfigValue {
        ConfigValue::new(self.key.clone(), self.value.clone())
    }
}

/// One label-qualified member of a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewGroupMember {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub labels: Vec<Label>,
}

impl NewGroupMember {
    pub fn new(key: impl Into<String>, value: impl Into<String>, labels: Vec<Label>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            labels,
        }
    }

    pub fn to_value(&self) -> ConfigValue {
        ConfigValue::new(self.key.clone(), self.value.clone())
    }
}

/// Body of a group create / create-version request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewGroup {
    pub version: String,
    pub configs: Vec<NewGroupMember>,
}

impl NewGroup {
    pub fn new(version: impl Into<String>, configs: Vec<NewGroupMember>) -> Self {
        Self {
            version: version.into(),
            configs,
        }
    }
}

/// A decoded group member, as listed by `GroupStore::members`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupEntry {
    pub entry_id: Uuid,
    pub labels: Vec<Label>,
    pub key: String,
    pub value: String,
}

/// Confirmation returned by delete operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deletion {
    pub deleted: Uuid,
    pub version: String,
}
