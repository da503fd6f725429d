//! Service registration metadata and introspection snapshots.
//!
//! A service is registered once with a [`ServiceConfig`] and then exposes one
//! or more endpoints, each described by an [`EndpointConfig`]. The registry
//! reports itself through [`ServiceInfo`] and per-endpoint [`EndpointStats`].

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::subject::is_valid_token;

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9\-_]+$").expect("static service name pattern")
});

static SEMVER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)(?:-[0-9A-Za-z\-]+(?:\.[0-9A-Za-z\-]+)*)?(?:\+[0-9A-Za-z\-]+(?:\.[0-9A-Za-z\-]+)*)?$",
    )
    .expect("static semver pattern")
});

/// Errors from validating registration metadata.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid service name {0:?}: must match [A-Za-z0-9-_]+")]
    InvalidName(String),
    #[error("invalid service version {0:?}: must be semantic (MAJOR.MINOR.PATCH)")]
    InvalidVersion(String),
    #[error("invalid group name {0:?}")]
    InvalidGroup(String),
    #[error("invalid endpoint name {0:?}")]
    InvalidEndpoint(String),
}

/// Identity of a service as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub version: String,
    pub description: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ServiceConfig {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: description.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// # Errors
    ///
    /// Returns the first violated naming or versioning rule.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !NAME_RE.is_match(&self.name) {
            return Err(ConfigError::InvalidName(self.name.clone()));
        }
        if !SEMVER_RE.is_match(&self.version) {
            return Err(ConfigError::InvalidVersion(self.version.clone()));
        }
        Ok(())
    }
}

/// One addressable operation within a service group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub group: Option<String>,
    pub name: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl EndpointConfig {
    #[must_use]
    pub fn new(group: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            group: group.map(str::to_string),
            name: name.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Adds a descriptive metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// # Errors
    ///
    /// Returns an error if the group or endpoint name is not a valid subject token.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(group) = &self.group {
            if !group.split('.').all(is_valid_token) {
                return Err(ConfigError::InvalidGroup(group.clone()));
            }
        }
        if !NAME_RE.is_match(&self.name) {
            return Err(ConfigError::InvalidEndpoint(self.name.clone()));
        }
        Ok(())
    }
}

/// Introspection entry for one registered endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointInfo {
    pub name: String,
    pub subject: String,
    pub queue_group: String,
    pub metadata: BTreeMap<String, String>,
}

/// Introspection snapshot of a registered service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub metadata: BTreeMap<String, String>,
    pub endpoints: Vec<EndpointInfo>,
}

/// Point-in-time request counters for one endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointStats {
    pub name: String,
    pub subject: String,
    pub num_requests: u64,
    pub num_errors: u64,
    pub last_error: Option<String>,
    /// Total handler time in microseconds.
    pub processing_time_us: u64,
    /// Mean handler time in microseconds; 0 before the first request.
    pub average_processing_time_us: u64,
}
