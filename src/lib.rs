//! Packet (Equinix Metal) compute environment.
//!
//! The crate exposes one environment's lifecycle (list, start, stop and
//! classify bare-metal instances, bootstrap a control tier) over the Packet
//! device API. Every instance the environment creates carries the environment
//! UUID as a tag; instances without it are foreign and never listed or
//! stopped.

pub mod client;
pub mod cloud;
pub mod config;
pub mod environ;
pub mod error;
pub mod instance;
pub mod selector;
pub mod status;
pub mod test_support;
pub mod userdata;

pub use client::{ApiError, DeviceApi, EnvironClient, PacketApi};
pub use cloud::{AuthType, CloudSpec, CloudSpecError, Credential};
pub use config::{ConfigError, EnvironConfig, PacketConfig};
pub use environ::{
    Environ, InstanceConfig, OpenParams, PacketProvider, StartInstanceParams, StartInstanceResult,
};
pub use error::EnvironError;
pub use instance::{HardwareCharacteristics, Instance, InstanceId, InstanceNetworking};
pub use selector::{Selector, Selectors};
pub use status::{AbstractStatus, InstanceStatus, translate};
pub use userdata::{CloudConfigDocument, OsFamily, render};
