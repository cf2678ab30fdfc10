//! Read-only views of provider instances.
//!
//! Instances are snapshots of remote state. Nothing here is cached; callers
//! re-fetch through the client whenever they need fresh data.

use std::fmt;
use std::ops::Deref;

use crate::error::EnvironError;
use crate::status::InstanceStatus;

/// Provider-assigned instance identifier.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct InstanceId(String);

impl InstanceId {
    /// Wraps a provider identifier.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<String> for InstanceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for InstanceId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl AsRef<str> for InstanceId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Deref for InstanceId {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reachability scope of an address.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AddressScope {
    /// Routable from the internet.
    Public,
    /// Reachable only inside the provider network.
    CloudLocal,
}

/// Network address attached to an instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Address {
    /// Address literal as reported by the provider.
    pub value: String,
    /// Reachability scope.
    pub scope: AddressScope,
}

/// Firewall rule shape used by hosts that manage ingress per machine.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IngressRule {
    /// Transport protocol (`tcp`, `udp`, `icmp`).
    pub protocol: String,
    /// First port of the range.
    pub from_port: u16,
    /// Last port of the range.
    pub to_port: u16,
    /// Source CIDRs allowed through.
    pub source_cidrs: Vec<String>,
}

/// Hardware details reported for a newly started instance.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HardwareCharacteristics {
    /// CPU architecture of the selected image.
    pub arch: Option<String>,
    /// Root disk size in MiB.
    pub root_disk_mib: Option<u64>,
    /// Number of CPU cores.
    pub cpu_cores: Option<u64>,
    /// Memory in MiB.
    pub mem_mib: Option<u64>,
}

impl fmt::Display for HardwareCharacteristics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(arch) = &self.arch {
            parts.push(format!("arch={arch}"));
        }
        if let Some(cores) = self.cpu_cores {
            parts.push(format!("cores={cores}"));
        }
        if let Some(mem) = self.mem_mib {
            parts.push(format!("mem={mem}M"));
        }
        if let Some(disk) = self.root_disk_mib {
            parts.push(format!("root-disk={disk}M"));
        }
        f.write_str(&parts.join(" "))
    }
}

/// Snapshot of a provider instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Instance {
    /// Provider identifier.
    pub id: InstanceId,
    /// Hostname assigned at creation.
    pub hostname: String,
    /// Raw provider state.
    pub state: String,
    /// Translated status (the message carries [`Self::state`]).
    pub status: InstanceStatus,
    /// Tags attached to the instance.
    pub tags: Vec<String>,
    /// Addresses in the order the provider lists them.
    pub addresses: Vec<Address>,
}

impl Instance {
    /// Returns true when `tag` is attached to the instance.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|candidate| candidate == tag)
    }
}

/// Network capabilities a provider may or may not offer for its instances.
///
/// Unsupported capabilities return [`EnvironError::NotSupported`] rather than
/// pretending to succeed.
pub trait InstanceNetworking {
    /// Returns the addresses currently assigned to the instance.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironError::NotSupported`] when the provider cannot report
    /// addresses.
    fn addresses(&self) -> Result<Vec<Address>, EnvironError>;

    /// Lists ingress rules applied to the instance for `machine_id`.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironError::NotSupported`] when per-instance firewalls are
    /// unavailable.
    fn ingress_rules(&self, machine_id: &str) -> Result<Vec<IngressRule>, EnvironError>;

    /// Opens the given ports for `machine_id`.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironError::NotSupported`] when per-instance firewalls are
    /// unavailable.
    fn open_ports(&self, machine_id: &str, rules: &[IngressRule]) -> Result<(), EnvironError>;

    /// Closes the given ports for `machine_id`.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironError::NotSupported`] when per-instance firewalls are
    /// unavailable.
    fn close_ports(&self, machine_id: &str, rules: &[IngressRule]) -> Result<(), EnvironError>;
}

// Packet has no per-device firewall API.
impl InstanceNetworking for Instance {
    fn addresses(&self) -> Result<Vec<Address>, EnvironError> {
        Ok(self.addresses.clone())
    }

    fn ingress_rules(&self, _machine_id: &str) -> Result<Vec<IngressRule>, EnvironError> {
        Err(EnvironError::not_supported("ingress_rules"))
    }

    fn open_ports(&self, _machine_id: &str, _rules: &[IngressRule]) -> Result<(), EnvironError> {
        Err(EnvironError::not_supported("open_ports"))
    }

    fn close_ports(&self, _machine_id: &str, _rules: &[IngressRule]) -> Result<(), EnvironError> {
        Err(EnvironError::not_supported("close_ports"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::translate;

    fn instance() -> Instance {
        Instance {
            id: InstanceId::from("d1"),
            hostname: String::from("env-0"),
            state: String::from("active"),
            status: translate("active"),
            tags: vec![String::from("env-uuid"), String::from("controller")],
            addresses: vec![Address {
                value: String::from("147.75.0.1"),
                scope: AddressScope::Public,
            }],
        }
    }

    #[test]
    fn has_tag_matches_exact_tags_only() {
        let inst = instance();
        assert!(inst.has_tag("controller"));
        assert!(!inst.has_tag("control"));
    }

    #[test]
    fn addresses_are_reported() {
        let inst = instance();
        let addresses = inst.addresses().expect("addresses are supported");
        assert_eq!(addresses.len(), 1);
    }

    #[test]
    fn firewall_capabilities_are_not_supported() {
        let inst = instance();
        assert_eq!(
            inst.ingress_rules("0"),
            Err(EnvironError::NotSupported {
                operation: String::from("ingress_rules")
            })
        );
        assert!(matches!(
            inst.open_ports("0", &[]),
            Err(EnvironError::NotSupported { .. })
        ));
        assert!(matches!(
            inst.close_ports("0", &[]),
            Err(EnvironError::NotSupported { .. })
        ));
    }

    #[test]
    fn hardware_display_lists_known_fields() {
        let hw = HardwareCharacteristics {
            arch: Some(String::from("amd64")),
            root_disk_mib: Some(81_920),
            cpu_cores: Some(4),
            mem_mib: Some(8_192),
        };
        assert_eq!(hw.to_string(), "arch=amd64 cores=4 mem=8192M root-disk=81920M");
    }
}
