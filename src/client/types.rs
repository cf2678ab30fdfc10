//! Wire types for the Packet device API.
//!
//! Only the fields this crate reads are modelled; everything else in the
//! provider's payloads is ignored on deserialisation.

use serde::{Deserialize, Serialize};

/// Device (server) as returned by the API.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Device {
    /// Device UUID.
    #[serde(default)]
    pub id: String,
    /// Hostname chosen at creation.
    #[serde(default)]
    pub hostname: String,
    /// Lifecycle state (`queued`, `provisioning`, `active`, ...).
    #[serde(default)]
    pub state: String,
    /// Tags attached to the device.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Assigned addresses.
    #[serde(default, rename = "ip_addresses")]
    pub network: Vec<IpAddressAssignment>,
    /// Hardware plan.
    #[serde(default)]
    pub plan: Option<Plan>,
}

/// Address assignment attached to a device.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct IpAddressAssignment {
    /// Address literal.
    pub address: String,
    /// True for internet-routable addresses.
    #[serde(default)]
    pub public: bool,
    /// 4 or 6.
    #[serde(default)]
    pub address_family: u8,
}

/// Hardware plan description.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Plan {
    /// Plan slug, for example `baremetal_0`.
    #[serde(default)]
    pub slug: String,
    /// Hardware specs.
    #[serde(default)]
    pub specs: Option<PlanSpecs>,
}

/// Hardware specs of a plan.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct PlanSpecs {
    /// CPU groups.
    #[serde(default)]
    pub cpus: Vec<CpuSpec>,
    /// Memory description.
    #[serde(default)]
    pub memory: Option<MemorySpec>,
    /// Drive groups; the first group holds the root drive.
    #[serde(default)]
    pub drives: Vec<DriveSpec>,
}

/// CPU group.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct CpuSpec {
    /// Number of CPUs in the group.
    #[serde(default)]
    pub count: u64,
    /// CPU model.
    #[serde(default, rename = "type")]
    pub cpu_type: String,
}

/// Memory description.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct MemorySpec {
    /// Total memory, for example `8GB`.
    #[serde(default)]
    pub total: String,
}

/// Drive group.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct DriveSpec {
    /// Number of drives in the group.
    #[serde(default)]
    pub count: u64,
    /// Size of each drive, for example `80GB`.
    #[serde(default)]
    pub size: String,
    /// Drive type (`SSD`, `HDD`, `NVME`).
    #[serde(default, rename = "type")]
    pub drive_type: String,
}

/// Body of a device creation call.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct DeviceCreateRequest {
    /// Hostname for the new device.
    pub hostname: String,
    /// Plan slug.
    pub plan: String,
    /// Facility code.
    pub facility: String,
    /// Operating system slug.
    pub operating_system: String,
    /// Billing cycle (`hourly`, `monthly`, ...).
    pub billing_cycle: String,
    /// Owning project.
    pub project_id: String,
    /// Encoded user-data.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub userdata: String,
    /// Tags to attach.
    pub tags: Vec<String>,
}

/// One page of a device listing.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub(crate) struct DevicePage {
    #[serde(default)]
    pub(crate) devices: Vec<Device>,
    #[serde(default)]
    pub(crate) meta: Option<PageMeta>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub(crate) struct PageMeta {
    #[serde(default)]
    pub(crate) current_page: u32,
    #[serde(default)]
    pub(crate) last_page: u32,
}

impl DevicePage {
    pub(crate) fn has_next(&self) -> bool {
        self.meta
            .as_ref()
            .is_some_and(|meta| meta.current_page < meta.last_page)
    }
}

/// Error payload returned by the API.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub(crate) errors: Vec<String>,
    #[serde(default)]
    pub(crate) error: Option<String>,
}

impl ErrorBody {
    pub(crate) fn message(self) -> Option<String> {
        if !self.errors.is_empty() {
            return Some(self.errors.join("; "));
        }
        self.error
    }
}
