//! Cloud spec and credential values handed over by the credential store.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::error::EnvironError;

/// Provider type reported by environments built from this crate.
pub const PROVIDER_TYPE: &str = "packet";

/// Credential attribute holding the Packet API token.
pub const CRED_API_TOKEN: &str = "packet-api-token";

/// Credential attribute holding the Packet project UUID.
pub const CRED_PROJECT_ID: &str = "packet-project-id";

/// Authentication schemes a credential may declare.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AuthType {
    /// Static API token.
    ApiToken,
    /// Username and password.
    UserPass,
    /// Access key and secret key pair.
    AccessKey,
}

impl AuthType {
    /// Returns the canonical auth-type label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ApiToken => "api-token",
            Self::UserPass => "userpass",
            Self::AccessKey => "access-key",
        }
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque set of named credential attributes.
#[derive(Clone, Eq, PartialEq)]
pub struct Credential {
    auth_type: AuthType,
    attributes: BTreeMap<String, String>,
}

impl Credential {
    /// Builds a credential from an auth type and its attributes.
    #[must_use]
    pub const fn new(auth_type: AuthType, attributes: BTreeMap<String, String>) -> Self {
        Self {
            auth_type,
            attributes,
        }
    }

    /// Builds an API-token credential for Packet.
    #[must_use]
    pub fn api_token(token: impl Into<String>, project_id: impl Into<String>) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert(CRED_API_TOKEN.to_owned(), token.into());
        attributes.insert(CRED_PROJECT_ID.to_owned(), project_id.into());
        Self::new(AuthType::ApiToken, attributes)
    }

    /// Returns the declared auth type.
    #[must_use]
    pub const fn auth_type(&self) -> AuthType {
        self.auth_type
    }

    /// Looks up a named attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    fn require(&self, name: &str) -> Result<&str, CloudSpecError> {
        self.attribute(name)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| CloudSpecError::MissingAttribute(name.to_owned()))
    }
}

// Attribute values are secrets; only their names are printed.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("auth_type", &self.auth_type)
            .field("attributes", &self.attributes.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Target account description for one environment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CloudSpec {
    /// Provider type; must be [`PROVIDER_TYPE`].
    pub cloud_type: String,
    /// Name of the cloud definition.
    pub name: String,
    /// API endpoint, for example `https://api.packet.net`.
    pub endpoint: String,
    /// Region (Packet facility) used when no placement is given.
    pub region: String,
    /// Credential used to authenticate.
    pub credential: Option<Credential>,
}

/// Authentication material extracted from a validated [`CloudSpec`].
#[derive(Clone, Eq, PartialEq)]
pub struct ApiCredentials {
    /// Packet API token.
    pub api_token: String,
    /// Packet project UUID scoping every call.
    pub project_id: String,
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_token", &"<redacted>")
            .field("project_id", &self.project_id)
            .finish()
    }
}

/// Errors raised while validating a [`CloudSpec`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CloudSpecError {
    /// Raised when a required spec field is blank.
    #[error("empty {0} in cloud spec")]
    EmptyField(&'static str),
    /// Raised when the spec belongs to another provider.
    #[error("cloud type {0:?} is not {PROVIDER_TYPE:?}")]
    WrongType(String),
    /// Raised when the spec carries no credential.
    #[error("missing credential")]
    MissingCredential,
    /// Raised when the credential uses an auth type this provider rejects.
    #[error("{0:?} auth-type not supported")]
    UnsupportedAuthType(String),
    /// Raised when a required credential attribute is blank or absent.
    #[error("credential attribute {0:?} is required")]
    MissingAttribute(String),
}

impl From<CloudSpecError> for EnvironError {
    fn from(value: CloudSpecError) -> Self {
        Self::InvalidCloudSpec(value.to_string())
    }
}

impl CloudSpec {
    /// Checks the spec is usable by this provider.
    ///
    /// # Errors
    ///
    /// Returns [`CloudSpecError`] when a field is blank, the credential is
    /// missing or uses another auth type, or required attributes are absent.
    pub fn validate(&self) -> Result<(), CloudSpecError> {
        if self.cloud_type.trim().is_empty() {
            return Err(CloudSpecError::EmptyField("cloud type"));
        }
        if self.cloud_type != PROVIDER_TYPE {
            return Err(CloudSpecError::WrongType(self.cloud_type.clone()));
        }
        if self.name.trim().is_empty() {
            return Err(CloudSpecError::EmptyField("cloud name"));
        }
        if self.endpoint.trim().is_empty() {
            return Err(CloudSpecError::EmptyField("endpoint"));
        }
        self.api_credentials().map(|_| ())
    }

    /// Extracts the token and project id from the credential.
    ///
    /// # Errors
    ///
    /// Returns [`CloudSpecError`] when the credential is missing, not an
    /// API-token credential, or lacks either attribute.
    pub fn api_credentials(&self) -> Result<ApiCredentials, CloudSpecError> {
        let credential = self
            .credential
            .as_ref()
            .ok_or(CloudSpecError::MissingCredential)?;
        if credential.auth_type() != AuthType::ApiToken {
            return Err(CloudSpecError::UnsupportedAuthType(
                credential.auth_type().to_string(),
            ));
        }
        Ok(ApiCredentials {
            api_token: credential.require(CRED_API_TOKEN)?.to_owned(),
            project_id: credential.require(CRED_PROJECT_ID)?.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn spec() -> CloudSpec {
        CloudSpec {
            cloud_type: String::from(PROVIDER_TYPE),
            name: String::from("packet"),
            endpoint: String::from("https://api.packet.net"),
            region: String::from("sjc1"),
            credential: Some(Credential::api_token("secret-token", "project-1")),
        }
    }

    #[rstest]
    fn valid_spec_passes(spec: CloudSpec) {
        assert_eq!(spec.validate(), Ok(()));
        let creds = spec.api_credentials().expect("credentials");
        assert_eq!(creds.project_id, "project-1");
    }

    #[rstest]
    fn rejects_missing_credential(spec: CloudSpec) {
        let cfg = CloudSpec {
            credential: None,
            ..spec
        };
        assert_eq!(cfg.validate(), Err(CloudSpecError::MissingCredential));
    }

    #[rstest]
    fn rejects_other_auth_types(spec: CloudSpec) {
        let cfg = CloudSpec {
            credential: Some(Credential::new(AuthType::UserPass, BTreeMap::new())),
            ..spec
        };
        assert_eq!(
            cfg.validate(),
            Err(CloudSpecError::UnsupportedAuthType(String::from("userpass")))
        );
    }

    #[rstest]
    #[case(CRED_API_TOKEN)]
    #[case(CRED_PROJECT_ID)]
    fn rejects_blank_attributes(spec: CloudSpec, #[case] attribute: &str) {
        let mut attributes = BTreeMap::new();
        attributes.insert(CRED_API_TOKEN.to_owned(), String::from("token"));
        attributes.insert(CRED_PROJECT_ID.to_owned(), String::from("project"));
        attributes.insert(attribute.to_owned(), String::from("  "));
        let cfg = CloudSpec {
            credential: Some(Credential::new(AuthType::ApiToken, attributes)),
            ..spec
        };
        assert_eq!(
            cfg.validate(),
            Err(CloudSpecError::MissingAttribute(attribute.to_owned()))
        );
    }

    #[rstest]
    fn rejects_foreign_cloud_type(spec: CloudSpec) {
        let cfg = CloudSpec {
            cloud_type: String::from("ec2"),
            ..spec
        };
        assert!(matches!(cfg.validate(), Err(CloudSpecError::WrongType(_))));
    }

    #[rstest]
    fn debug_output_hides_secrets(spec: CloudSpec) {
        let rendered = format!("{spec:?}");
        assert!(!rendered.contains("secret-token"), "leaked: {rendered}");
        assert!(rendered.contains(CRED_API_TOKEN));
        let creds = spec.api_credentials().expect("credentials");
        assert!(!format!("{creds:?}").contains("secret-token"));
    }
}
