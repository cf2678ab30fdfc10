//! Instance start flow.

use tracing::{debug, info};

use super::collaborators::{StartInstanceParams, StartInstanceResult, machine_hostname};
use super::Environ;
use crate::client::{CreateInstanceParams, DeviceApi};
use crate::error::EnvironError;
use crate::userdata::render;

impl<A: DeviceApi> Environ<A> {
    /// Starts one machine.
    ///
    /// Local validation (configuration, tools, image, architecture, user-data
    /// rendering) completes before the provider is called.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironError::InvalidRequest`] when the configuration, tools
    /// or images are missing, [`EnvironError::ArchitectureMismatch`] when no
    /// tools suit the chosen image, [`EnvironError::UnsupportedOs`] or
    /// [`EnvironError::UserData`] when user-data cannot be rendered, and
    /// [`EnvironError::CreateFailed`] when the provider rejects the request.
    /// Finalizer errors are returned unchanged.
    pub async fn start_instance(
        &self,
        params: StartInstanceParams,
    ) -> Result<StartInstanceResult, EnvironError> {
        info!(environment = %self.name, "starting instance");
        let StartInstanceParams {
            instance_config,
            image_metadata,
            tools,
            constraints,
            placement,
        } = params;

        let mut instance_config = instance_config.ok_or_else(|| {
            EnvironError::InvalidRequest(String::from("instance configuration is missing"))
        })?;
        if tools.is_empty() {
            return Err(EnvironError::InvalidRequest(String::from("tools not found")));
        }

        let image = self.image_selector.select(&image_metadata, &constraints)?;
        let matching = self.tools_resolver.resolve(&tools, &image.arch)?;
        instance_config.set_tools(matching)?;

        let environ_config = self.config().await;
        self.finalizer.finish(&mut instance_config, &environ_config)?;

        let encoded = render(&instance_config.cloud_config, instance_config.os)?;
        let user_data = String::from_utf8(encoded).map_err(|err| EnvironError::UserData {
            message: err.to_string(),
        })?;
        debug!(bytes = user_data.len(), "packet user data");

        let request = CreateInstanceParams {
            hostname: machine_hostname(&environ_config.name, &instance_config.machine_id),
            plan: constraints
                .instance_type
                .filter(|plan| !plan.trim().is_empty())
                .unwrap_or(environ_config.default_plan),
            facility: placement
                .filter(|facility| !facility.trim().is_empty())
                .unwrap_or_else(|| self.cloud.region.clone()),
            operating_system: image.id.clone(),
            arch: image.arch.clone(),
            billing_cycle: environ_config.billing_cycle,
            user_data,
            controller: instance_config.controller,
        };
        let created = self.client.create_instance(request).await?;

        debug!(instance = %created.instance.id, hardware = %created.hardware, "instance started");
        Ok(StartInstanceResult {
            instance: created.instance,
            hardware: created.hardware,
        })
    }
}
