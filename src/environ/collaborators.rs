//! Start-request values and the collaborator seams used by
//! [`super::Environ::start_instance`].

use std::collections::BTreeSet;

use shell_escape::unix::escape;
use tracing::debug;

use crate::config::EnvironConfig;
use crate::error::EnvironError;
use crate::instance::{HardwareCharacteristics, Instance};
use crate::userdata::{CloudConfigDocument, OsFamily, WriteFile};

const AGENT_DATA_DIR: &str = "/var/lib/packet-environ";
const WINDOWS_AGENT_DATA_DIR: &str = r"C:\packet-environ";

/// Image a machine can boot.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImageMetadata {
    /// Provider operating-system slug, for example `ubuntu_16_04`.
    pub id: String,
    /// Image architecture, for example `amd64`.
    pub arch: String,
}

/// Agent binary candidate.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Tools {
    /// Agent version.
    pub version: String,
    /// Architecture the binary was built for.
    pub arch: String,
    /// Download location.
    pub url: String,
}

/// Placement-independent constraints on a new machine.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Constraints {
    /// Plan slug; the environment default applies when absent.
    pub instance_type: Option<String>,
    /// Required image architecture.
    pub arch: Option<String>,
}

/// Machine-level bootstrap configuration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceConfig {
    /// Machine id assigned by the host.
    pub machine_id: String,
    /// OS family of the image; selects the user-data encoding.
    pub os: OsFamily,
    /// OS series, for example `xenial`.
    pub series: String,
    /// Whether the machine hosts the control tier.
    pub controller: bool,
    /// Bootstrap document, completed by the [`BootstrapFinalizer`].
    pub cloud_config: CloudConfigDocument,
    tools: Vec<Tools>,
}

impl InstanceConfig {
    /// Creates a configuration with an empty bootstrap document.
    #[must_use]
    pub fn new(machine_id: impl Into<String>, os: OsFamily, series: impl Into<String>) -> Self {
        Self {
            machine_id: machine_id.into(),
            os,
            series: series.into(),
            controller: false,
            cloud_config: CloudConfigDocument::default(),
            tools: Vec::new(),
        }
    }

    /// Marks the machine as part of the control tier.
    #[must_use]
    pub const fn with_controller(mut self, controller: bool) -> Self {
        self.controller = controller;
        self
    }

    /// Replaces the bootstrap document.
    #[must_use]
    pub fn with_cloud_config(mut self, cloud_config: CloudConfigDocument) -> Self {
        self.cloud_config = cloud_config;
        self
    }

    /// Returns the agent binaries selected for this machine.
    #[must_use]
    pub fn tools(&self) -> &[Tools] {
        &self.tools
    }

    /// Records the agent binaries the machine will install.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironError::InvalidRequest`] when `tools` is empty or
    /// mixes agent versions.
    pub fn set_tools(&mut self, tools: Vec<Tools>) -> Result<(), EnvironError> {
        let Some(first) = tools.first() else {
            return Err(EnvironError::InvalidRequest(String::from(
                "no tools to set",
            )));
        };
        if tools.iter().any(|candidate| candidate.version != first.version) {
            return Err(EnvironError::InvalidRequest(String::from(
                "tools must share a single version",
            )));
        }
        self.tools = tools;
        Ok(())
    }
}

/// Inputs to [`super::Environ::start_instance`]. Consumed by the call.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StartInstanceParams {
    /// Machine configuration; required.
    pub instance_config: Option<InstanceConfig>,
    /// Candidate images, in preference order.
    pub image_metadata: Vec<ImageMetadata>,
    /// Candidate agent binaries.
    pub tools: Vec<Tools>,
    /// Hardware constraints.
    pub constraints: Constraints,
    /// Facility override; the cloud region applies when absent.
    pub placement: Option<String>,
}

/// Outcome of a successful start.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StartInstanceResult {
    /// The new instance.
    pub instance: Instance,
    /// Hardware reported for the instance's plan.
    pub hardware: HardwareCharacteristics,
}

/// Picks the image a new machine boots.
pub trait ImageSelector: Send + Sync {
    /// Chooses one of `candidates`.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironError::InvalidRequest`] when nothing is suitable.
    fn select<'a>(
        &self,
        candidates: &'a [ImageMetadata],
        constraints: &Constraints,
    ) -> Result<&'a ImageMetadata, EnvironError>;
}

/// Narrows candidate agent binaries to those runnable on an architecture.
pub trait ToolsResolver: Send + Sync {
    /// Returns the candidates usable on `arch`.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironError::ArchitectureMismatch`] when none match.
    fn resolve(&self, candidates: &[Tools], arch: &str) -> Result<Vec<Tools>, EnvironError>;
}

/// Completes a machine's bootstrap document before it is rendered.
pub trait BootstrapFinalizer: Send + Sync {
    /// Fills in environment-wide settings on `config`.
    ///
    /// # Errors
    ///
    /// Implementations report their own failures; they are passed to the
    /// caller unchanged.
    fn finish(
        &self,
        config: &mut InstanceConfig,
        environ: &EnvironConfig,
    ) -> Result<(), EnvironError>;
}

/// Picks the first image, honouring an architecture constraint when given.
#[derive(Clone, Copy, Debug, Default)]
pub struct FirstImageSelector;

impl ImageSelector for FirstImageSelector {
    fn select<'a>(
        &self,
        candidates: &'a [ImageMetadata],
        constraints: &Constraints,
    ) -> Result<&'a ImageMetadata, EnvironError> {
        if candidates.is_empty() {
            return Err(EnvironError::InvalidRequest(String::from(
                "no image metadata supplied",
            )));
        }
        let wanted = constraints.arch.as_deref();
        candidates
            .iter()
            .find(|image| wanted.is_none_or(|arch| image.arch == arch))
            .ok_or_else(|| {
                EnvironError::InvalidRequest(format!(
                    "no image matches architecture {}",
                    wanted.unwrap_or_default()
                ))
            })
    }
}

/// Keeps the candidate tools built for the image architecture.
#[derive(Clone, Copy, Debug, Default)]
pub struct ArchToolsResolver;

impl ToolsResolver for ArchToolsResolver {
    fn resolve(&self, candidates: &[Tools], arch: &str) -> Result<Vec<Tools>, EnvironError> {
        let matching: Vec<Tools> = candidates
            .iter()
            .filter(|tools| tools.arch == arch)
            .cloned()
            .collect();
        if matching.is_empty() {
            let available: BTreeSet<String> =
                candidates.iter().map(|tools| tools.arch.clone()).collect();
            return Err(EnvironError::ArchitectureMismatch {
                arch: arch.to_owned(),
                available: available.into_iter().collect(),
            });
        }
        Ok(matching)
    }
}

/// Adds hostname, authorized keys and the agent install steps.
#[derive(Clone, Copy, Debug, Default)]
pub struct StandardFinalizer;

impl BootstrapFinalizer for StandardFinalizer {
    fn finish(
        &self,
        config: &mut InstanceConfig,
        environ: &EnvironConfig,
    ) -> Result<(), EnvironError> {
        let tools = config.tools().first().cloned().ok_or_else(|| {
            EnvironError::InvalidRequest(String::from("instance configuration has no tools"))
        })?;
        let hostname = machine_hostname(&environ.name, &config.machine_id);
        let os = config.os;
        let machine_id = config.machine_id.clone();
        let controller = config.controller;
        let document = &mut config.cloud_config;

        document.hostname = Some(hostname);
        for key in &environ.authorized_keys {
            if !document.ssh_authorized_keys.contains(key) {
                document.ssh_authorized_keys.push(key.clone());
            }
        }

        let data_dir = if os == OsFamily::Windows {
            WINDOWS_AGENT_DATA_DIR
        } else {
            AGENT_DATA_DIR
        };
        document.write_files.push(WriteFile {
            path: format!("{data_dir}/agent.conf"),
            content: format!(
                "environment: {}\nmachine: {machine_id}\ncontroller: {controller}\nversion: {}\n",
                environ.uuid, tools.version
            ),
            permissions: String::from("0600"),
        });

        if os == OsFamily::Windows {
            document.runcmd.extend(windows_install_commands(&tools));
        } else {
            if !document.packages.iter().any(|package| package == "curl") {
                document.packages.push(String::from("curl"));
            }
            document.runcmd.extend(unix_install_commands(&tools));
        }
        debug!(machine = %machine_id, version = %tools.version, "finalised bootstrap document");
        Ok(())
    }
}

/// Hostname given to a machine of environment `environ`.
#[must_use]
pub fn machine_hostname(environ: &str, machine_id: &str) -> String {
    format!("{environ}-machine-{}", machine_id.replace('/', "-"))
}

fn unix_install_commands(tools: &Tools) -> Vec<String> {
    let dir = format!("{AGENT_DATA_DIR}/tools/{}", tools.version);
    let archive = format!("{dir}/tools.tar.gz");
    let dir_arg = escape(dir.as_str().into()).into_owned();
    let archive_arg = escape(archive.as_str().into()).into_owned();
    let url_arg = escape(tools.url.as_str().into()).into_owned();
    vec![
        format!("mkdir -p {dir_arg}"),
        format!("curl -sSfL --retry 10 -o {archive_arg} {url_arg}"),
        format!("tar -xzf {archive_arg} -C {dir_arg}"),
    ]
}

fn windows_install_commands(tools: &Tools) -> Vec<String> {
    let dir = format!(r"{WINDOWS_AGENT_DATA_DIR}\tools\{}", tools.version);
    let url = tools.url.replace('\'', "''");
    vec![
        format!("New-Item -ItemType Directory -Force -Path '{dir}' | Out-Null"),
        format!("Invoke-WebRequest -UseBasicParsing -Uri '{url}' -OutFile '{dir}\\tools.tar.gz'"),
        format!("tar -xzf '{dir}\\tools.tar.gz' -C '{dir}'"),
    ]
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use uuid::Uuid;

    use super::*;

    fn tools(version: &str, arch: &str) -> Tools {
        Tools {
            version: version.to_owned(),
            arch: arch.to_owned(),
            url: format!("https://tools.example/agent-{version}-{arch}.tgz"),
        }
    }

    fn image(id: &str, arch: &str) -> ImageMetadata {
        ImageMetadata {
            id: id.to_owned(),
            arch: arch.to_owned(),
        }
    }

    #[test]
    fn first_image_wins_without_constraint() {
        let images = [image("ubuntu_16_04", "amd64"), image("ubuntu_16_04_arm", "arm64")];
        let chosen = FirstImageSelector
            .select(&images, &Constraints::default())
            .expect("image selected");
        assert_eq!(chosen.id, "ubuntu_16_04");
    }

    #[test]
    fn image_selection_honours_arch_constraint() {
        let images = [image("ubuntu_16_04", "amd64"), image("ubuntu_16_04_arm", "arm64")];
        let constraints = Constraints {
            arch: Some(String::from("arm64")),
            ..Constraints::default()
        };
        let chosen = FirstImageSelector
            .select(&images, &constraints)
            .expect("image selected");
        assert_eq!(chosen.arch, "arm64");
    }

    #[test]
    fn empty_image_list_is_invalid() {
        let err = FirstImageSelector
            .select(&[], &Constraints::default())
            .expect_err("nothing to select");
        assert!(matches!(err, EnvironError::InvalidRequest(_)));
    }

    #[test]
    fn resolver_reports_available_arches() {
        let candidates = [tools("2.1.0", "amd64"), tools("2.1.0", "ppc64el"), tools("2.1.0", "amd64")];
        let err = ArchToolsResolver
            .resolve(&candidates, "arm64")
            .expect_err("no arm64 tools");
        assert_eq!(err, EnvironError::ArchitectureMismatch {
            arch: String::from("arm64"),
            available: vec![String::from("amd64"), String::from("ppc64el")],
        });
    }

    #[test]
    fn set_tools_rejects_mixed_versions() {
        let mut config = InstanceConfig::new("0", OsFamily::Ubuntu, "xenial");
        let err = config
            .set_tools(vec![tools("2.1.0", "amd64"), tools("2.2.0", "amd64")])
            .expect_err("mixed versions");
        assert!(matches!(err, EnvironError::InvalidRequest(_)));
        assert!(config.tools().is_empty());
    }

    #[rstest]
    #[case("0", "env-machine-0")]
    #[case("0/lxd/1", "env-machine-0-lxd-1")]
    fn hostnames_are_flattened(#[case] machine: &str, #[case] expected: &str) {
        assert_eq!(machine_hostname("env", machine), expected);
    }

    #[test]
    fn finalizer_completes_linux_document() {
        let mut environ = EnvironConfig::new("env", Uuid::from_u128(7), "baremetal_0");
        environ.authorized_keys = vec![String::from("ssh-ed25519 AAAA user@host")];
        let mut config = InstanceConfig::new("3", OsFamily::Ubuntu, "xenial");
        config
            .set_tools(vec![tools("2.1.0", "amd64")])
            .expect("tools set");

        StandardFinalizer
            .finish(&mut config, &environ)
            .expect("finalised");
        let document = &config.cloud_config;
        assert_eq!(document.hostname.as_deref(), Some("env-machine-3"));
        assert_eq!(document.ssh_authorized_keys, environ.authorized_keys);
        assert_eq!(document.packages, vec![String::from("curl")]);
        assert!(
            document
                .runcmd
                .iter()
                .any(|cmd| cmd.contains("agent-2.1.0-amd64.tgz")),
            "runcmd: {:?}",
            document.runcmd
        );
        assert!(
            document
                .write_files
                .iter()
                .any(|file| file.path == "/var/lib/packet-environ/agent.conf")
        );
    }

    #[test]
    fn finalizer_uses_powershell_for_windows() {
        let environ = EnvironConfig::new("env", Uuid::from_u128(7), "baremetal_0");
        let mut config = InstanceConfig::new("1", OsFamily::Windows, "win2012r2");
        config
            .set_tools(vec![tools("2.1.0", "amd64")])
            .expect("tools set");
        StandardFinalizer
            .finish(&mut config, &environ)
            .expect("finalised");
        assert!(config.cloud_config.packages.is_empty());
        assert!(
            config
                .cloud_config
                .runcmd
                .iter()
                .any(|cmd| cmd.starts_with("Invoke-WebRequest"))
        );
    }

    #[test]
    fn finalizer_requires_tools() {
        let environ = EnvironConfig::new("env", Uuid::from_u128(7), "baremetal_0");
        let mut config = InstanceConfig::new("1", OsFamily::Ubuntu, "xenial");
        let err = StandardFinalizer
            .finish(&mut config, &environ)
            .expect_err("no tools");
        assert!(matches!(err, EnvironError::InvalidRequest(_)));
    }
}
