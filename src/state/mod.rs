//! Explicit application state: onboarding, read notifications and the
//! preferred table page size. Consumers receive the store by reference.
//!
//! Documented keys:
//!
//! | key                    | value             |
//! |------------------------|-------------------|
//! | `onboarding.completed` | bool              |
//! | `notifications.read`   | list of ids       |
//! | `views.page_size`      | positive integer  |

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

pub const SNAPSHOT_VERSION: u32 = 2;

pub const KEY_ONBOARDING: &str = "onboarding.completed";
pub const KEY_READ_NOTIFICATIONS: &str = "notifications.read";
pub const KEY_PAGE_SIZE: &str = "views.page_size";

#[derive(Debug, Error)]
pub enum StateError {
    #[error("unknown state key '{key}'")]
    UnknownKey { key: String },

    #[error("invalid value for '{key}': expected {expected}")]
    InvalidValue { key: String, expected: &'static str },

    #[error("snapshot version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("malformed snapshot: {source}")]
    Malformed {
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateValues {
    #[serde(rename = "onboarding.completed", default)]
    pub onboarding_completed: bool,
    #[serde(rename = "notifications.read", default)]
    pub read_notifications: BTreeSet<String>,
    #[serde(rename = "views.page_size", default)]
    pub page_size: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: u32,
    pub values: StateValues,
}

/// Pre-versioned layout: flat flags, read ids as a list.
#[derive(Deserialize)]
struct SnapshotV1 {
    #[serde(default)]
    onboarding_completed: bool,
    #[serde(default)]
    read_notifications: Vec<String>,
}

impl From<SnapshotV1> for StateValues {
    fn from(v1: SnapshotV1) -> Self {
        Self {
            onboarding_completed: v1.onboarding_completed,
            read_notifications: v1.read_notifications.into_iter().collect(),
            page_size: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AppStore {
    values: StateValues,
}

impl AppStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn onboarding_completed(&self) -> bool {
        self.values.onboarding_completed
    }

    pub fn complete_onboarding(&mut self) {
        self.values.onboarding_completed = true;
    }

    pub fn reset_onboarding(&mut self) {
        self.values.onboarding_completed = false;
    }

    pub fn mark_read(&mut self, id: &str) -> bool {
        self.values.read_notifications.insert(id.to_string())
    }

    pub fn is_read(&self, id: &str) -> bool {
        self.values.read_notifications.contains(id)
    }

    pub fn unread<'a>(&self, ids: &'a [String]) -> Vec<&'a str> {
        ids.iter()
            .map(String::as_str)
            .filter(|id| !self.is_read(id))
            .collect()
    }

    pub fn preferred_page_size(&self) -> Option<usize> {
        self.values.page_size
    }

    pub fn set_preferred_page_size(&mut self, page_size: usize) -> Result<(), StateError> {
        if page_size == 0 {
            return Err(StateError::InvalidValue {
                key: KEY_PAGE_SIZE.to_string(),
                expected: "a positive integer",
            });
        }
        self.values.page_size = Some(page_size);
        Ok(())
    }

    /// Generic accessor over the documented keys.
    pub fn get(&self, key: &str) -> Result<Value, StateError> {
        match key {
            KEY_ONBOARDING => Ok(json!(self.values.onboarding_completed)),
            KEY_READ_NOTIFICATIONS => Ok(json!(self.values.read_notifications)),
            KEY_PAGE_SIZE => Ok(json!(self.values.page_size)),
            _ => Err(StateError::UnknownKey {
                key: key.to_string(),
            }),
        }
    }

    pub fn set(&mut self, key: &str, value: Value) -> Result<(), StateError> {
        let invalid = |expected| StateError::InvalidValue {
            key: key.to_string(),
            expected,
        };
        match key {
            KEY_ONBOARDING => {
                self.values.onboarding_completed = value.as_bool().ok_or_else(|| invalid("a boolean"))?;
            }
            KEY_READ_NOTIFICATIONS => {
                let ids: BTreeSet<String> =
                    serde_json::from_value(value).map_err(|_| invalid("a list of ids"))?;
                self.values.read_notifications = ids;
            }
            KEY_PAGE_SIZE => {
                let size = value
                    .as_u64()
                    .and_then(|v| usize::try_from(v).ok())
                    .ok_or_else(|| invalid("a positive integer"))?;
                self.set_preferred_page_size(size)?;
            }
            _ => {
                return Err(StateError::UnknownKey {
                    key: key.to_string(),
                })
            }
        }
        Ok(())
    }

    pub fn export(&self) -> StoreSnapshot {
        StoreSnapshot {
            version: SNAPSHOT_VERSION,
            values: self.values.clone(),
        }
    }

    pub fn export_json(&self) -> Result<String, StateError> {
        serde_json::to_string_pretty(&self.export()).map_err(|e| StateError::Malformed { source: e })
    }

    /// Accepts the current layout and migrates older ones. A snapshot with no
    /// `version` field is treated as v1.
    pub fn import_json(raw: &str) -> Result<Self, StateError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| StateError::Malformed { source: e })?;
        let version = value
            .get("version")
            .and_then(Value::as_u64)
            .map_or(1, |v| u32::try_from(v).unwrap_or(u32::MAX));
        let values = match version {
            1 => {
                let v1: SnapshotV1 = serde_json::from_value(value)
                    .map_err(|e| StateError::Malformed { source: e })?;
                StateValues::from(v1)
            }
            SNAPSHOT_VERSION => {
                let snapshot: StoreSnapshot = serde_json::from_value(value)
                    .map_err(|e| StateError::Malformed { source: e })?;
                snapshot.values
            }
            found => {
                return Err(StateError::UnsupportedVersion {
                    found,
                    supported: SNAPSHOT_VERSION,
                })
            }
        };
        if values.page_size == Some(0) {
            return Err(StateError::InvalidValue {
                key: KEY_PAGE_SIZE.to_string(),
                expected: "a positive integer",
            });
        }
        Ok(Self { values })
    }
}
