//! User-data encoding per target OS family.
//!
//! Packet hands the user-data string to the instance verbatim, so every
//! family ends up base64 encoded at the outermost layer:
//!
//! * Ubuntu: cloud-config YAML, gzip, base64.
//! * CentOS: shell script, base64.
//! * Windows: a PowerShell wrapper, base64. The wrapper carries the
//!   cloud-config YAML for reference and a setup script rendered from the
//!   same document, which it writes out and runs.

mod document;

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use base64::prelude::*;
use flate2::Compression;
use flate2::write::GzEncoder;
use thiserror::Error;

use crate::error::EnvironError;

pub use document::{CloudConfigDocument, WriteFile};

const WINDOWS_PAYLOAD_MARKER: &str = "__USERDATA__";
const WINDOWS_SETUP_MARKER: &str = "__SETUP__";

const WINDOWS_WRAPPER: &str = r#"#ps1_sysnative
$ErrorActionPreference = "Stop"

$payload = "__USERDATA__"
$setup = "__SETUP__"
$directory = Join-Path $env:SystemDrive "cloud-init"
New-Item -ItemType Directory -Force -Path $directory | Out-Null

function Expand-Payload([string]$encoded) {
    $compressed = [System.Convert]::FromBase64String($encoded)
    $stream = New-Object System.IO.MemoryStream(,$compressed)
    $gzip = New-Object System.IO.Compression.GZipStream($stream, [System.IO.Compression.CompressionMode]::Decompress)
    $reader = New-Object System.IO.StreamReader($gzip)
    $text = $reader.ReadToEnd()
    $reader.Close()
    return $text
}

Set-Content -Path (Join-Path $directory "cloud-config.yaml") -Value (Expand-Payload $payload) -Encoding UTF8

$script = Join-Path $directory "setup.ps1"
Set-Content -Path $script -Value (Expand-Payload $setup) -Encoding UTF8
& $script
"#;

/// Operating-system family of the image an instance boots.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum OsFamily {
    /// Ubuntu and derivatives.
    Ubuntu,
    /// CentOS.
    CentOS,
    /// Windows Server.
    Windows,
    /// openSUSE.
    OpenSuse,
    /// Any other Linux distribution.
    GenericLinux,
}

impl OsFamily {
    /// Returns the family label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ubuntu => "Ubuntu",
            Self::CentOS => "CentOS",
            Self::Windows => "Windows",
            Self::OpenSuse => "OpenSUSE",
            Self::GenericLinux => "GenericLinux",
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OsFamily {
    type Err = UserDataError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ubuntu" => Ok(Self::Ubuntu),
            "centos" => Ok(Self::CentOS),
            "windows" => Ok(Self::Windows),
            "opensuse" => Ok(Self::OpenSuse),
            "genericlinux" => Ok(Self::GenericLinux),
            _ => Err(UserDataError::UnsupportedOs {
                family: value.to_owned(),
            }),
        }
    }
}

/// Errors raised while encoding user-data.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum UserDataError {
    /// Raised for OS families without an encoding.
    #[error("cannot encode userdata for OS: {family}")]
    UnsupportedOs {
        /// Requested family.
        family: String,
    },
    /// Raised when the document cannot be serialised.
    #[error("failed to serialise cloud-config: {message}")]
    Serialize {
        /// Serialiser message.
        message: String,
    },
    /// Raised when compression fails.
    #[error("failed to compress user-data: {message}")]
    Compress {
        /// Compressor message.
        message: String,
    },
}

impl From<UserDataError> for EnvironError {
    fn from(value: UserDataError) -> Self {
        match value {
            UserDataError::UnsupportedOs { family } => Self::UnsupportedOs { family },
            other => Self::UserData {
                message: other.to_string(),
            },
        }
    }
}

/// Encodes `document` for an instance running `os`.
///
/// The output is deterministic for identical inputs.
///
/// # Errors
///
/// Returns [`UserDataError::UnsupportedOs`] for families without an encoding,
/// or a serialisation/compression error.
pub fn render(document: &CloudConfigDocument, os: OsFamily) -> Result<Vec<u8>, UserDataError> {
    match os {
        OsFamily::Ubuntu => {
            let yaml = document.render_yaml()?;
            Ok(to_base64(&gzip(yaml.as_bytes())?))
        }
        OsFamily::CentOS => Ok(to_base64(document.render_script().as_bytes())),
        OsFamily::Windows => {
            let yaml = document.render_yaml()?;
            let setup = document.render_powershell();
            let script = embed_in_windows_script(yaml.as_bytes(), setup.as_bytes())?;
            Ok(to_base64(script.as_bytes()))
        }
        OsFamily::OpenSuse | OsFamily::GenericLinux => Err(UserDataError::UnsupportedOs {
            family: os.to_string(),
        }),
    }
}

fn embed_in_windows_script(yaml: &[u8], setup: &[u8]) -> Result<String, UserDataError> {
    let payload = BASE64_STANDARD.encode(gzip(yaml)?);
    let setup_payload = BASE64_STANDARD.encode(gzip(setup)?);
    Ok(WINDOWS_WRAPPER
        .replace(WINDOWS_PAYLOAD_MARKER, &payload)
        .replace(WINDOWS_SETUP_MARKER, &setup_payload))
}

// GzEncoder writes a zero mtime, which keeps the output reproducible.
fn gzip(input: &[u8]) -> Result<Vec<u8>, UserDataError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(input)
        .map_err(|err| UserDataError::Compress {
            message: err.to_string(),
        })?;
    encoder.finish().map_err(|err| UserDataError::Compress {
        message: err.to_string(),
    })
}

fn to_base64(input: &[u8]) -> Vec<u8> {
    BASE64_STANDARD.encode(input).into_bytes()
}
