//! Cloud-config document handed to the renderer.
//!
//! The document is built by the bootstrap layer; this module only knows how
//! to serialise it as cloud-config YAML, or as an equivalent shell or
//! PowerShell script.

use std::borrow::Cow;

use serde::Serialize;
use shell_escape::unix::escape;

use super::UserDataError;

/// File written to the instance at first boot.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct WriteFile {
    /// Absolute target path.
    pub path: String,
    /// File contents.
    pub content: String,
    /// Octal mode, for example `0644`.
    pub permissions: String,
}

/// OS-agnostic cloud-init document.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct CloudConfigDocument {
    /// Hostname to apply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Keys appended to the default user's `authorized_keys`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ssh_authorized_keys: Vec<String>,
    /// Commands run early in boot.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bootcmd: Vec<String>,
    /// Files written before packages are installed.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub write_files: Vec<WriteFile>,
    /// Packages to install.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<String>,
    /// Commands run last.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub runcmd: Vec<String>,
}

impl CloudConfigDocument {
    /// Serialises the document as `#cloud-config` YAML.
    ///
    /// # Errors
    ///
    /// Returns [`UserDataError::Serialize`] when YAML serialisation fails.
    pub fn render_yaml(&self) -> Result<String, UserDataError> {
        let body = serde_yaml::to_string(self).map_err(|err| UserDataError::Serialize {
            message: err.to_string(),
        })?;
        Ok(format!("#cloud-config\n{body}"))
    }

    /// Renders the document as a bash script performing the same steps in
    /// cloud-init order (bootcmd, write_files, packages, runcmd).
    #[must_use]
    pub fn render_script(&self) -> String {
        let mut lines = vec![String::from("#!/bin/bash"), String::from("set -e")];

        if let Some(hostname) = &self.hostname {
            lines.push(format!("hostnamectl set-hostname {}", quote(hostname)));
        }
        lines.extend(self.bootcmd.iter().cloned());

        if !self.ssh_authorized_keys.is_empty() {
            lines.push(String::from("install -d -m 0700 /root/.ssh"));
            for key in &self.ssh_authorized_keys {
                lines.push(format!(
                    "printf '%s\\n' {} >> /root/.ssh/authorized_keys",
                    quote(key)
                ));
            }
            lines.push(String::from("chmod 0600 /root/.ssh/authorized_keys"));
        }

        for file in &self.write_files {
            let path = quote(&file.path);
            lines.push(format!(
                "install -D -m {} /dev/null {path}",
                quote(&file.permissions)
            ));
            lines.push(format!("printf '%s' {} > {path}", quote(&file.content)));
        }

        if !self.packages.is_empty() {
            let packages = self
                .packages
                .iter()
                .map(|package| quote(package))
                .collect::<Vec<_>>()
                .join(" ");
            lines.push(format!("yum -y install {packages}"));
        }

        lines.extend(self.runcmd.iter().cloned());

        let mut script = lines.join("\n");
        script.push('\n');
        script
    }

    /// Renders the steps a Windows host can perform without cloud-init:
    /// hostname, bootcmd, write_files and runcmd, in that order.
    ///
    /// Packages and SSH keys have no Windows counterpart and are skipped.
    #[must_use]
    pub fn render_powershell(&self) -> String {
        let mut lines = vec![String::from("$ErrorActionPreference = 'Stop'")];

        if let Some(hostname) = &self.hostname {
            lines.push(format!(
                "Rename-Computer -NewName {} -Force",
                ps_quote(hostname)
            ));
        }
        lines.extend(self.bootcmd.iter().cloned());

        for file in &self.write_files {
            let path = ps_quote(&file.path);
            lines.push(format!(
                "New-Item -ItemType Directory -Force -Path (Split-Path -Parent {path}) | Out-Null"
            ));
            lines.push(format!(
                "Set-Content -Path {path} -Value {} -Encoding UTF8 -NoNewline",
                ps_quote(&file.content)
            ));
        }

        lines.extend(self.runcmd.iter().cloned());

        let mut script = lines.join("\r\n");
        script.push_str("\r\n");
        script
    }
}

fn quote(value: &str) -> String {
    escape(Cow::Borrowed(value)).into_owned()
}

fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
