//! Environment lifecycle controller.
//!
//! [`Environ`] composes the [`EnvironClient`] with the user-data renderer and
//! enforces the ownership contract: nothing outside this environment is ever
//! listed, started or stopped. Every call re-fetches the provider inventory.

mod collaborators;
mod provider;
mod start;

use std::collections::BTreeMap;

use tokio::sync::Mutex;
use tracing::{Level, debug, enabled, info, trace, warn};

use crate::client::{DeviceApi, EnvironClient};
use crate::cloud::{CloudSpec, PROVIDER_TYPE};
use crate::config::EnvironConfig;
use crate::error::EnvironError;
use crate::instance::{Instance, InstanceId};

pub use collaborators::{
    ArchToolsResolver, BootstrapFinalizer, Constraints, FirstImageSelector, ImageMetadata,
    ImageSelector, InstanceConfig, StandardFinalizer, StartInstanceParams, StartInstanceResult,
    Tools, ToolsResolver, machine_hostname,
};
pub use provider::{OpenParams, PacketProvider};

/// One environment's view of a Packet project.
pub struct Environ<A> {
    name: String,
    cloud: CloudSpec,
    client: EnvironClient<A>,
    config: Mutex<EnvironConfig>,
    image_selector: Box<dyn ImageSelector>,
    tools_resolver: Box<dyn ToolsResolver>,
    finalizer: Box<dyn BootstrapFinalizer>,
}

impl<A> std::fmt::Debug for Environ<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environ")
            .field("name", &self.name)
            .field("cloud", &self.cloud)
            .finish_non_exhaustive()
    }
}

impl<A: DeviceApi> Environ<A> {
    /// Builds an environment over an explicit API handle.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironError::InvalidCloudSpec`] when the cloud spec is
    /// unusable and [`EnvironError::Config`] when `config` is invalid.
    pub fn with_api(api: A, cloud: CloudSpec, config: EnvironConfig) -> Result<Self, EnvironError> {
        cloud.validate()?;
        config.validate()?;
        let credentials = cloud.api_credentials()?;
        let client = EnvironClient::new(api, credentials.project_id, config.uuid);
        Ok(Self {
            name: config.name.clone(),
            cloud,
            client,
            config: Mutex::new(config),
            image_selector: Box::new(FirstImageSelector),
            tools_resolver: Box::new(ArchToolsResolver),
            finalizer: Box::new(StandardFinalizer),
        })
    }

    /// Replaces the image selection policy.
    #[must_use]
    pub fn with_image_selector(mut self, selector: impl ImageSelector + 'static) -> Self {
        self.image_selector = Box::new(selector);
        self
    }

    /// Replaces the tools resolution policy.
    #[must_use]
    pub fn with_tools_resolver(mut self, resolver: impl ToolsResolver + 'static) -> Self {
        self.tools_resolver = Box::new(resolver);
        self
    }

    /// Replaces the bootstrap finalizer.
    #[must_use]
    pub fn with_finalizer(mut self, finalizer: impl BootstrapFinalizer + 'static) -> Self {
        self.finalizer = Box::new(finalizer);
        self
    }

    /// Environment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Provider type label.
    #[must_use]
    pub const fn provider_type(&self) -> &'static str {
        PROVIDER_TYPE
    }

    /// Cloud spec the environment was opened with.
    #[must_use]
    pub const fn cloud(&self) -> &CloudSpec {
        &self.cloud
    }

    /// Underlying client adapter.
    #[must_use]
    pub const fn client(&self) -> &EnvironClient<A> {
        &self.client
    }

    /// Returns a snapshot of the current configuration.
    pub async fn config(&self) -> EnvironConfig {
        self.config.lock().await.clone()
    }

    /// Replaces the configuration after validating the change.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironError::Config`] when `config` is invalid or changes
    /// the environment UUID. The current configuration is kept on error.
    pub async fn set_config(&self, config: EnvironConfig) -> Result<(), EnvironError> {
        let mut current = self.config.lock().await;
        config.validate_change(&current)?;
        debug!(environment = %self.name, "updating configuration");
        *current = config;
        Ok(())
    }

    /// Lists every instance owned by this environment.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironError::Connectivity`] when the inventory cannot be
    /// fetched.
    pub async fn all_instances(&self) -> Result<Vec<Instance>, EnvironError> {
        trace!(environment = %self.name, "listing all instances");
        let instances = self.client.owned_instances(&[]).await?;
        if enabled!(Level::TRACE) {
            for instance in &instances {
                trace!(id = %instance.id, status = %instance.status.status, "owned instance");
            }
        }
        Ok(instances)
    }

    /// Looks up `ids` among the owned instances, preserving request order.
    ///
    /// Foreign instances are treated exactly like absent ones.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironError::NoInstances`] when nothing matches (including
    /// an empty request), [`EnvironError::PartialInstances`] carrying the
    /// positional result when only some ids match, and
    /// [`EnvironError::Connectivity`] when the inventory cannot be fetched.
    pub async fn instances(&self, ids: &[InstanceId]) -> Result<Vec<Instance>, EnvironError> {
        trace!(environment = %self.name, ?ids, "looking up instances");
        if ids.is_empty() {
            return Err(EnvironError::NoInstances);
        }
        let by_id: BTreeMap<InstanceId, Instance> = self
            .client
            .owned_instances(ids)
            .await?
            .into_iter()
            .map(|instance| (instance.id.clone(), instance))
            .collect();

        let slots: Vec<Option<Instance>> = ids.iter().map(|id| by_id.get(id).cloned()).collect();
        let missing: Vec<InstanceId> = ids
            .iter()
            .zip(&slots)
            .filter(|(_, slot)| slot.is_none())
            .map(|(id, _)| id.clone())
            .collect();

        if missing.len() == ids.len() {
            return Err(EnvironError::NoInstances);
        }
        if !missing.is_empty() {
            return Err(EnvironError::PartialInstances {
                instances: slots,
                missing,
            });
        }
        Ok(slots.into_iter().flatten().collect())
    }

    /// Deletes each of `ids` in order, continuing past failures.
    ///
    /// An instance the provider no longer knows counts as stopped.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironError::StopInstances`] listing every id that could
    /// not be deleted, in attempt order.
    pub async fn stop_instances(&self, ids: &[InstanceId]) -> Result<(), EnvironError> {
        debug!(environment = %self.name, ?ids, "stopping instances");
        let mut failures = Vec::new();
        for id in ids {
            match self.client.delete_instance(id).await {
                Ok(()) => info!(instance = %id, "stopped instance"),
                Err(EnvironError::NotFound { .. }) => {
                    debug!(instance = %id, "instance already gone");
                }
                Err(err) => {
                    warn!(instance = %id, error = %err, "failed to stop instance");
                    failures.push((id.clone(), err));
                }
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(EnvironError::StopInstances { failures })
        }
    }

    /// Returns the ids of owned control-tier instances.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironError::Connectivity`] when the inventory cannot be
    /// fetched.
    pub async fn controller_instances(&self) -> Result<Vec<InstanceId>, EnvironError> {
        self.client.controller_instances().await
    }

    /// Adopts resources created by another controller. Instances are not
    /// tracked per controller, so there is nothing to do.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn adopt_resources(&self) -> Result<(), EnvironError> {
        trace!(environment = %self.name, "adopt resources: nothing to do");
        Ok(())
    }

    /// Creates environment-wide resources. Packet needs none.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn create(&self) -> Result<(), EnvironError> {
        trace!(environment = %self.name, "create: nothing to do");
        Ok(())
    }

    /// Performs periodic maintenance on a running instance. Packet needs none.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn maintain_instance(&self, _params: &StartInstanceParams) -> Result<(), EnvironError> {
        trace!(environment = %self.name, "maintain instance: nothing to do");
        Ok(())
    }

    /// Checks a prospective start request. All requests are accepted.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn precheck_instance(
        &self,
        series: &str,
        constraints: &Constraints,
        placement: Option<&str>,
    ) -> Result<(), EnvironError> {
        trace!(
            environment = %self.name,
            series,
            ?constraints,
            ?placement,
            "precheck instance"
        );
        Ok(())
    }

    /// Prepares the environment for bootstrapping its control tier.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn prepare_for_bootstrap(&self) -> Result<(), EnvironError> {
        info!(environment = %self.name, "preparing model");
        Ok(())
    }

    /// Lists instance types with cost metadata.
    ///
    /// # Errors
    ///
    /// Always returns [`EnvironError::NotSupported`].
    pub fn instance_types(&self, constraints: &Constraints) -> Result<Vec<String>, EnvironError> {
        debug!(environment = %self.name, ?constraints, "instance types requested");
        Err(EnvironError::not_supported("instance types"))
    }
}

#[cfg(test)]
mod tests;
