//! Remote client adapter.
//!
//! [`DeviceApi`] is the provider-native surface (one implementation talks
//! HTTP, tests use an in-memory double). [`EnvironClient`] translates it into
//! the environment's vocabulary and is the only place where the ownership
//! filter is applied.

mod http;
mod types;

use std::future::Future;
use std::pin::Pin;

use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::error::EnvironError;
use crate::instance::{Address, AddressScope, HardwareCharacteristics, Instance, InstanceId};
use crate::selector::{CONTROLLER_TAG, Selector, Selectors, ids_of};
use crate::status::translate;

pub use http::{ApiError, PacketApi};
pub use types::{
    CpuSpec, Device, DeviceCreateRequest, DriveSpec, IpAddressAssignment, MemorySpec, Plan,
    PlanSpecs,
};

/// Future returned by [`DeviceApi`] operations.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;

/// Device primitives offered by the provider.
pub trait DeviceApi: Send + Sync {
    /// Lists every device in `project_id`, following pagination. Fails as a
    /// whole if any page fails.
    fn list_devices<'a>(&'a self, project_id: &'a str) -> ApiFuture<'a, Vec<Device>>;

    /// Creates a device in `project_id`.
    fn create_device<'a>(
        &'a self,
        project_id: &'a str,
        request: &'a DeviceCreateRequest,
    ) -> ApiFuture<'a, Device>;

    /// Deletes a device. A missing device yields [`ApiError::NotFound`].
    fn delete_device<'a>(&'a self, device_id: &'a str) -> ApiFuture<'a, ()>;
}

/// Parameters for creating one instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CreateInstanceParams {
    /// Hostname for the device.
    pub hostname: String,
    /// Plan slug.
    pub plan: String,
    /// Facility code.
    pub facility: String,
    /// Operating system slug of the selected image.
    pub operating_system: String,
    /// Architecture of the selected image.
    pub arch: String,
    /// Billing cycle.
    pub billing_cycle: String,
    /// Encoded user-data.
    pub user_data: String,
    /// Whether the instance belongs to the control tier.
    pub controller: bool,
}

/// Result of a successful creation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CreatedInstance {
    /// The new instance.
    pub instance: Instance,
    /// Hardware derived from the provider's plan description.
    pub hardware: HardwareCharacteristics,
}

/// Environment-scoped view of a [`DeviceApi`].
#[derive(Clone, Debug)]
pub struct EnvironClient<A> {
    api: A,
    project_id: String,
    ownership_tag: String,
}

impl<A: DeviceApi> EnvironClient<A> {
    /// Scopes `api` to `project` and the environment identified by `uuid`.
    #[must_use]
    pub fn new(api: A, project: impl Into<String>, uuid: Uuid) -> Self {
        let project_id = project.into();
        debug!(project = %project_id, environment = %uuid, "creating Packet client");
        Self {
            api,
            project_id,
            ownership_tag: uuid.to_string(),
        }
    }

    /// Returns the wrapped API handle.
    #[must_use]
    pub const fn api(&self) -> &A {
        &self.api
    }

    /// Returns the tag that marks instances owned by this environment.
    #[must_use]
    pub fn ownership_tag(&self) -> &str {
        &self.ownership_tag
    }

    /// Fetches every instance in the project, owned or not.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironError::Connectivity`] when the listing fails. No
    /// partial inventory is ever returned.
    pub async fn list_instances(&self) -> Result<Vec<Instance>, EnvironError> {
        let devices = self
            .api
            .list_devices(&self.project_id)
            .await
            .map_err(|err| EnvironError::Connectivity {
                operation: String::from("list instances"),
                message: err.to_string(),
            })?;
        Ok(devices.into_iter().map(instance_from_device).collect())
    }

    /// Fetches the instances owned by this environment, optionally narrowed
    /// to `ids`. An empty `ids` slice means no id filter.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironError::Connectivity`] when the listing fails.
    pub async fn owned_instances(&self, ids: &[InstanceId]) -> Result<Vec<Instance>, EnvironError> {
        let instances = self.list_instances().await?;
        let selectors = Selectors::all_of()
            .and(Selector::ownership(self.ownership_tag.as_str()))
            .and_maybe(Selector::id_membership(ids));
        Ok(selectors.select(instances))
    }

    /// Returns the ids of owned control-tier instances.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironError::Connectivity`] when the listing fails.
    pub async fn controller_instances(&self) -> Result<Vec<InstanceId>, EnvironError> {
        let owned = self.owned_instances(&[]).await?;
        let controllers = Selectors::all_of().and(Selector::controller()).select(owned);
        Ok(ids_of(&controllers))
    }

    /// Creates a device stamped with the ownership tag.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironError::CreateFailed`] when the provider rejects the
    /// call or returns a device without an id.
    pub async fn create_instance(
        &self,
        params: CreateInstanceParams,
    ) -> Result<CreatedInstance, EnvironError> {
        let arch = params.arch.clone();
        let request = self.create_request(params);
        info!(
            hostname = %request.hostname,
            plan = %request.plan,
            facility = %request.facility,
            os = %request.operating_system,
            "creating device"
        );
        let device = self
            .api
            .create_device(&self.project_id, &request)
            .await
            .map_err(|err| EnvironError::CreateFailed {
                message: err.to_string(),
            })?;
        if device.id.trim().is_empty() {
            return Err(EnvironError::CreateFailed {
                message: String::from("provider returned no instance id"),
            });
        }

        let hardware = hardware_from_device(&device, &arch);
        Ok(CreatedInstance {
            instance: instance_from_device(device),
            hardware,
        })
    }

    /// Deletes one instance.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironError::InvalidArgument`] for a blank id or one that
    /// would not stay a single URL path segment (before any remote call), [`EnvironError::NotFound`] when the provider no longer
    /// knows the device, and [`EnvironError::DeleteFailed`] otherwise.
    pub async fn delete_instance(&self, id: &InstanceId) -> Result<(), EnvironError> {
        if id.trim().is_empty() {
            return Err(EnvironError::InvalidArgument(String::from(
                "invalid instance id",
            )));
        }
        if !is_path_segment(id.as_str()) {
            return Err(EnvironError::InvalidArgument(format!(
                "invalid instance id {id}: not a single path segment"
            )));
        }
        trace!(instance = %id, "deleting device");
        self.api
            .delete_device(id.as_str())
            .await
            .map_err(|err| match err {
                ApiError::NotFound(_) => EnvironError::NotFound { id: id.clone() },
                other => EnvironError::DeleteFailed {
                    id: id.clone(),
                    message: other.to_string(),
                },
            })
    }

    fn create_request(&self, params: CreateInstanceParams) -> DeviceCreateRequest {
        let mut tags = vec![self.ownership_tag.clone()];
        if params.controller {
            tags.push(CONTROLLER_TAG.to_owned());
        }
        DeviceCreateRequest {
            hostname: params.hostname,
            plan: params.plan,
            facility: params.facility,
            operating_system: params.operating_system,
            billing_cycle: params.billing_cycle,
            project_id: self.project_id.clone(),
            userdata: params.user_data,
            tags,
        }
    }
}

// Device ids are interpolated into `/devices/{id}`.
fn is_path_segment(id: &str) -> bool {
    id != "." && id != ".." && !id.contains(['/', '\\', '?', '#', '%'])
}

fn instance_from_device(device: Device) -> Instance {
    let addresses = device
        .network
        .into_iter()
        .map(|assignment| Address {
            value: assignment.address,
            scope: if assignment.public {
                AddressScope::Public
            } else {
                AddressScope::CloudLocal
            },
        })
        .collect();
    Instance {
        id: InstanceId::from(device.id),
        hostname: device.hostname,
        status: translate(&device.state),
        state: device.state,
        tags: device.tags,
        addresses,
    }
}

fn hardware_from_device(device: &Device, arch: &str) -> HardwareCharacteristics {
    let specs = device.plan.as_ref().and_then(|plan| plan.specs.as_ref());
    HardwareCharacteristics {
        arch: Some(arch.to_owned()).filter(|value| !value.is_empty()),
        root_disk_mib: specs
            .and_then(|specs| specs.drives.first())
            .and_then(|drive| size_to_mib(&drive.size)),
        cpu_cores: specs
            .map(|specs| specs.cpus.iter().map(|cpu| cpu.count).sum::<u64>())
            .filter(|count| *count > 0),
        mem_mib: specs
            .and_then(|specs| specs.memory.as_ref())
            .and_then(|memory| size_to_mib(&memory.total)),
    }
}

/// Parses sizes such as `80GB` or `2TB` into MiB. Fractional sizes are not
/// reported.
fn size_to_mib(raw: &str) -> Option<u64> {
    let value = raw.trim().to_ascii_uppercase();
    let split = value.find(|c: char| !c.is_ascii_digit())?;
    let (digits, unit) = value.split_at(split);
    let amount: u64 = digits.parse().ok()?;
    let factor = match unit.trim() {
        "MB" => 1,
        "GB" => 1024,
        "TB" => 1024 * 1024,
        _ => return None,
    };
    amount.checked_mul(factor)
}
