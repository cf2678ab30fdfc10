//! Provider entry point that opens environments.

use tracing::info;
use uuid::Uuid;

use super::Environ;
use crate::client::PacketApi;
use crate::cloud::CloudSpec;
use crate::config::{ConfigError, EnvironConfig, PacketConfig};
use crate::error::EnvironError;

/// Everything needed to open an environment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OpenParams {
    /// Target account.
    pub cloud: CloudSpec,
    /// Initial environment configuration.
    pub config: EnvironConfig,
    /// Consumer token for this environment, taking precedence over the
    /// provider's.
    pub consumer_token: Option<String>,
}

impl OpenParams {
    /// Derives open parameters from loaded process configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `config` fails validation.
    pub fn from_config(config: &PacketConfig, name: &str, uuid: Uuid) -> Result<Self, ConfigError> {
        Ok(Self {
            cloud: config.cloud_spec(name)?,
            config: config.environ_config(name, uuid)?,
            consumer_token: config.consumer_token.clone(),
        })
    }
}

/// Opens Packet environments and validates their configuration.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PacketProvider {
    consumer_token: Option<String>,
}

impl PacketProvider {
    /// Creates a provider that sends no consumer token.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            consumer_token: None,
        }
    }

    /// Sets the consumer token attached to every API request.
    #[must_use]
    pub fn with_consumer_token(mut self, token: Option<String>) -> Self {
        self.consumer_token = token;
        self
    }

    /// Opens an environment backed by the HTTP API.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironError::InvalidCloudSpec`] when the cloud spec is
    /// unusable and [`EnvironError::Config`] when the configuration is invalid.
    pub fn open(&self, params: OpenParams) -> Result<Environ<PacketApi>, EnvironError> {
        info!(model = %params.config.name, "opening model");
        params.cloud.validate()?;
        let consumer_token = params
            .consumer_token
            .or_else(|| self.consumer_token.clone());
        let api = PacketApi::from_cloud_spec(&params.cloud)?.with_consumer_token(consumer_token);
        Environ::with_api(api, params.cloud, params.config)
    }

    /// Checks a configuration is usable with `cloud` before the environment
    /// exists.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironError::InvalidCloudSpec`] when the cloud spec is
    /// unusable and [`EnvironError::Config`] when the configuration is invalid.
    pub fn prepare_config(
        cloud: &CloudSpec,
        config: EnvironConfig,
    ) -> Result<EnvironConfig, EnvironError> {
        cloud.validate()?;
        config.validate()?;
        Ok(config)
    }

    /// Validates `new`, and the transition from `old` when given.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironError::Config`] when either configuration is invalid
    /// or the change is illegal.
    pub fn validate(
        new: EnvironConfig,
        old: Option<&EnvironConfig>,
    ) -> Result<EnvironConfig, EnvironError> {
        info!(model = %new.name, "validating model");
        new.validate()
            .map_err(|err| EnvironError::Config(format!("invalid config: {err}")))?;
        if let Some(previous) = old {
            previous
                .validate()
                .map_err(|err| EnvironError::Config(format!("invalid base config: {err}")))?;
            new.validate_change(previous)
                .map_err(|err| EnvironError::Config(format!("invalid config change: {err}")))?;
        }
        Ok(new)
    }

    /// Checks an endpoint is reachable.
    ///
    /// # Errors
    ///
    /// Always returns [`EnvironError::NotSupported`].
    pub fn ping(endpoint: &str) -> Result<(), EnvironError> {
        info!(endpoint, "ping requested");
        Err(EnvironError::not_supported("ping"))
    }
}
