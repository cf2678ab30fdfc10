//! Error taxonomy surfaced by the environment.

use thiserror::Error;

use crate::instance::{Instance, InstanceId};

/// Errors raised by environment operations.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum EnvironError {
    /// Raised when caller input is malformed (for example an empty id).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Raised when a start request lacks required parts.
    #[error("invalid start request: {0}")]
    InvalidRequest(String),
    /// Raised when the cloud spec or credential is unusable.
    #[error("invalid cloud spec: {0}")]
    InvalidCloudSpec(String),
    /// Raised when environment configuration is incomplete or changed illegally.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raised when the provider is unreachable or rejects the credential.
    #[error("{operation} failed: {message}")]
    Connectivity {
        /// Operation that was attempted.
        operation: String,
        /// Underlying transport or API message.
        message: String,
    },
    /// Raised when the provider reports an instance as gone.
    #[error("instance {id} not found")]
    NotFound {
        /// Requested instance.
        id: InstanceId,
    },
    /// Raised when none of the requested instances exist in this environment.
    #[error("no instances found")]
    NoInstances,
    /// Raised when only some requested instances exist. The positional
    /// result is carried so callers can reconcile per id.
    #[error("some instances were not found: {missing:?}")]
    PartialInstances {
        /// One slot per requested id; `None` where the id did not match.
        instances: Vec<Option<Instance>>,
        /// Requested ids that did not match.
        missing: Vec<InstanceId>,
    },
    /// Raised when the provider rejects an instance creation.
    #[error("failed to start instance: {message}")]
    CreateFailed {
        /// Provider message.
        message: String,
    },
    /// Raised when the provider rejects an instance deletion.
    #[error("failed to delete instance {id}: {message}")]
    DeleteFailed {
        /// Target instance.
        id: InstanceId,
        /// Provider message.
        message: String,
    },
    /// Raised when at least one instance could not be stopped.
    #[error("failed to stop {} instance(s)", failures.len())]
    StopInstances {
        /// Failures in the order the deletions were attempted.
        failures: Vec<(InstanceId, EnvironError)>,
    },
    /// Raised when no agent binary matches the selected image architecture.
    #[error("chosen architecture {arch} not present in {available:?}")]
    ArchitectureMismatch {
        /// Architecture of the selected image.
        arch: String,
        /// Architectures offered by the candidate tools.
        available: Vec<String>,
    },
    /// Raised when user-data cannot be encoded for the target OS.
    #[error("cannot encode userdata for OS: {family}")]
    UnsupportedOs {
        /// OS family that was requested.
        family: String,
    },
    /// Raised when the bootstrap document cannot be rendered.
    #[error("cannot make user data: {message}")]
    UserData {
        /// Rendering failure.
        message: String,
    },
    /// Raised for operations this environment intentionally does not offer.
    #[error("{operation} not supported")]
    NotSupported {
        /// Operation name.
        operation: String,
    },
}

impl EnvironError {
    pub(crate) fn not_supported(operation: &str) -> Self {
        Self::NotSupported {
            operation: operation.to_owned(),
        }
    }

    /// Returns the last failure of a [`EnvironError::StopInstances`] error.
    ///
    /// Other variants return themselves.
    #[must_use]
    pub fn last_failure(&self) -> &Self {
        match self {
            Self::StopInstances { failures } => failures.last().map_or(self, |(_, err)| err),
            other => other,
        }
    }
}
