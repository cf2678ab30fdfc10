//! Configuration loading via `ortho-config`, plus the per-environment
//! configuration that hosts replace through `set_config`.

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::cloud::{CloudSpec, Credential, PROVIDER_TYPE};
use crate::error::EnvironError;

/// Billing cycle requested when nothing else is configured.
pub const DEFAULT_BILLING_CYCLE: &str = "hourly";

/// Packet specific configuration derived from environment variables,
/// configuration files, and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "PACKET")]
pub struct PacketConfig {
    /// API token used for authentication. This value is required.
    pub api_token: String,
    /// Project UUID that scopes every device call. This value is required.
    pub project_id: String,
    /// API endpoint. Defaults to the public Packet API.
    #[ortho_config(default = "https://api.packet.net".to_owned())]
    pub endpoint: String,
    /// Facility used when a start request carries no placement.
    #[ortho_config(default = "sjc1".to_owned())]
    pub facility: String,
    /// Plan (hardware class) used when a start request carries no instance
    /// type constraint.
    #[ortho_config(default = "baremetal_0".to_owned())]
    pub default_plan: String,
    /// Billing cycle attached to created devices.
    #[ortho_config(default = "hourly".to_owned())]
    pub billing_cycle: String,
    /// Optional consumer token sent alongside the API token.
    pub consumer_token: Option<String>,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, key: &'static str) -> Self {
        Self {
            description,
            env_var,
            key,
        }
    }
}

fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to the [packet] configuration",
            metadata.description, metadata.env_var, metadata.key
        )));
    }
    Ok(())
}

impl PacketConfig {
    /// Loads configuration using the `ortho-config` derive. Values merge
    /// defaults, configuration files, environment variables, and CLI flags in
    /// that order of precedence.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge sources.
    pub fn load_from_sources() -> Result<Self, ConfigError> {
        Self::load().map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("packet-environ")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(
            &self.api_token,
            &FieldMetadata::new("Packet API token", "PACKET_API_TOKEN", "api_token"),
        )?;
        require_field(
            &self.project_id,
            &FieldMetadata::new("Packet project ID", "PACKET_PROJECT_ID", "project_id"),
        )?;
        require_field(
            &self.endpoint,
            &FieldMetadata::new("API endpoint", "PACKET_ENDPOINT", "endpoint"),
        )?;
        require_field(
            &self.facility,
            &FieldMetadata::new("facility", "PACKET_FACILITY", "facility"),
        )?;
        require_field(
            &self.default_plan,
            &FieldMetadata::new("default plan", "PACKET_DEFAULT_PLAN", "default_plan"),
        )?;
        require_field(
            &self.billing_cycle,
            &FieldMetadata::new("billing cycle", "PACKET_BILLING_CYCLE", "billing_cycle"),
        )?;
        Ok(())
    }

    /// Builds the cloud spec an environment is opened with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation fails.
    pub fn cloud_spec(&self, name: &str) -> Result<CloudSpec, ConfigError> {
        self.validate()?;
        Ok(CloudSpec {
            cloud_type: PROVIDER_TYPE.to_owned(),
            name: name.to_owned(),
            endpoint: self.endpoint.trim().to_owned(),
            region: self.facility.trim().to_owned(),
            credential: Some(Credential::api_token(
                self.api_token.trim(),
                self.project_id.trim(),
            )),
        })
    }

    /// Builds an environment configuration seeded with this config's plan and
    /// billing cycle.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation fails.
    pub fn environ_config(&self, name: &str, uuid: Uuid) -> Result<EnvironConfig, ConfigError> {
        self.validate()?;
        let config = EnvironConfig {
            name: name.to_owned(),
            uuid,
            default_plan: self.default_plan.trim().to_owned(),
            billing_cycle: self.billing_cycle.trim().to_owned(),
            authorized_keys: Vec::new(),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Per-environment settings owned by the controller.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EnvironConfig {
    /// Environment name, used in hostnames and logs.
    pub name: String,
    /// Environment identity stamped on every owned instance.
    pub uuid: Uuid,
    /// Plan used when a start request carries no instance type.
    pub default_plan: String,
    /// Billing cycle for created devices.
    pub billing_cycle: String,
    /// SSH public keys injected into bootstrap documents.
    pub authorized_keys: Vec<String>,
}

impl EnvironConfig {
    /// Creates a configuration with default plan and billing cycle.
    #[must_use]
    pub fn new(name: impl Into<String>, uuid: Uuid, default_plan: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uuid,
            default_plan: default_plan.into(),
            billing_cycle: DEFAULT_BILLING_CYCLE.to_owned(),
            authorized_keys: Vec::new(),
        }
    }

    /// Returns the ownership tag derived from the environment UUID.
    #[must_use]
    pub fn ownership_tag(&self) -> String {
        self.uuid.to_string()
    }

    /// Validates the configuration on its own.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] for blank fields and
    /// [`ConfigError::Invalid`] for a nil UUID.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingField(String::from("environment name")));
        }
        if self.uuid.is_nil() {
            return Err(ConfigError::Invalid(String::from(
                "environment uuid must not be nil",
            )));
        }
        if self.default_plan.trim().is_empty() {
            return Err(ConfigError::MissingField(String::from("default plan")));
        }
        if self.billing_cycle.trim().is_empty() {
            return Err(ConfigError::MissingField(String::from("billing cycle")));
        }
        Ok(())
    }

    /// Validates a transition from `old` to `self`.
    ///
    /// The UUID is the ownership tag of every existing instance, so it can
    /// never change.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `self` is invalid or the change is illegal.
    pub fn validate_change(&self, old: &Self) -> Result<(), ConfigError> {
        self.validate()?;
        if self.uuid != old.uuid {
            return Err(ConfigError::Invalid(format!(
                "cannot change environment uuid from {} to {}",
                old.uuid, self.uuid
            )));
        }
        Ok(())
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a value or change that is not allowed.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

impl From<ConfigError> for EnvironError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}
