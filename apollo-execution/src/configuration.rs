//! Configuration of the built-in behaviors of an [`Executor`](crate::Executor).
use displaydoc::Display;
use schemars::JsonSchema;
use schemars::schema::RootSchema;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Configuration error.
#[derive(Debug, Error, Display)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// could not deserialize configuration: {0}
    InvalidConfiguration(serde_yaml::Error),
}

/// The configuration of an executor.
///
/// Can be created through `serde::Deserialize` from various formats, or loaded from
/// YAML with [`Configuration::from_yaml`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    /// Limits applied to every operation before it executes.
    #[serde(default)]
    pub limits: Limits,

    /// Batching of data loader lookups.
    #[serde(default)]
    pub batching: Batching,
}

#[buildstructor::buildstructor]
impl Configuration {
    #[builder]
    pub fn new(limits: Option<Limits>, batching: Option<Batching>) -> Self {
        Self {
            limits: limits.unwrap_or_default(),
            batching: batching.unwrap_or_default(),
        }
    }

    /// Parses a YAML configuration. An empty document is the default configuration.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigurationError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(ConfigurationError::InvalidConfiguration)
    }

    /// The JSON schema of the configuration.
    pub fn json_schema() -> RootSchema {
        schemars::schema_for!(Configuration)
    }
}

/// Operation limits.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Limits {
    /// The maximum complexity of an operation, where every field costs one.
    /// Unlimited by default
    #[serde(default)]
    pub max_complexity: Option<u32>,

    /// Log operations above the limits instead of rejecting them.
    /// Defaults to false
    #[serde(default)]
    pub warn_only: bool,
}

/// Data loader batching.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Batching {
    /// Dispatch data loaders once per level of the result tree. When disabled, they
    /// are dispatched after every field fetch.
    /// enabled by default
    #[serde(default = "default_batching")]
    pub enabled: bool,
}

fn default_batching() -> bool {
    true
}

impl Default for Batching {
    fn default() -> Self {
        Self {
            enabled: default_batching(),
        }
    }
}
