//! Translation of Packet device states into the environment's status
//! vocabulary.

use std::fmt;

/// Abstract lifecycle status reported to the orchestration host.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum AbstractStatus {
    /// The provider is still allocating hardware for the instance.
    Allocating,
    /// The instance is up.
    Running,
    /// The instance is restarting.
    Rebooting,
    /// The instance is powered off, unknown, or in a state with no mapping.
    Empty,
    /// The provider gave up provisioning the instance.
    ProvisioningError,
    /// The instance is known locally but the provider has reported nothing yet.
    Pending,
}

impl AbstractStatus {
    /// Returns the lowercase label used in logs and host status reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allocating => "allocating",
            Self::Running => "running",
            Self::Rebooting => "rebooting",
            Self::Empty => "empty",
            Self::ProvisioningError => "provisioning error",
            Self::Pending => "pending",
        }
    }
}

impl fmt::Display for AbstractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status paired with the provider's raw state string.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceStatus {
    /// Translated status.
    pub status: AbstractStatus,
    /// State string exactly as the provider reported it.
    pub message: String,
}

impl InstanceStatus {
    /// Status for an instance the provider has not reported on yet.
    #[must_use]
    pub const fn pending() -> Self {
        Self {
            status: AbstractStatus::Pending,
            message: String::new(),
        }
    }
}

/// Maps a provider state onto an [`InstanceStatus`].
///
/// Matching is case-sensitive. Unrecognised states map to
/// [`AbstractStatus::Empty`]; the raw state is always kept as the message.
#[must_use]
#[expect(
    clippy::match_same_arms,
    reason = "powered-down states are listed so the mapping table is complete"
)]
pub fn translate(state: &str) -> InstanceStatus {
    let status = match state {
        "queued" | "provisioning" | "powering_on" => AbstractStatus::Allocating,
        "active" => AbstractStatus::Running,
        "rebooting" => AbstractStatus::Rebooting,
        "powering_off" | "inactive" => AbstractStatus::Empty,
        "failed" => AbstractStatus::ProvisioningError,
        _ => AbstractStatus::Empty,
    };
    InstanceStatus {
        status,
        message: state.to_owned(),
    }
}
