//! Unit tests for the environment controller.

use base64::prelude::*;
use rstest::{fixture, rstest};
use uuid::Uuid;

use super::*;
use crate::client::ApiError;
use crate::cloud::{Credential, PROVIDER_TYPE};
use crate::selector::CONTROLLER_TAG;
use crate::test_support::{ApiCall, FakeDeviceApi, device, device_with_plan};
use crate::userdata::OsFamily;

const ENV_UUID: Uuid = Uuid::from_u128(0xe1);

fn owned() -> String {
    ENV_UUID.to_string()
}

fn cloud() -> CloudSpec {
    CloudSpec {
        cloud_type: PROVIDER_TYPE.to_owned(),
        name: String::from("packet"),
        endpoint: String::from("https://api.packet.net"),
        region: String::from("sjc1"),
        credential: Some(Credential::api_token("token", "project-1")),
    }
}

fn environ_config() -> EnvironConfig {
    EnvironConfig::new("env", ENV_UUID, "baremetal_0")
}

/// Inventory with one owned worker, one foreign device and one owned
/// controller.
#[fixture]
fn api() -> FakeDeviceApi {
    let tag = owned();
    FakeDeviceApi::with_devices(vec![
        device("d1", "active", &[tag.as_str()]),
        device("d2", "active", &["E2"]),
        device("d3", "active", &[tag.as_str(), CONTROLLER_TAG]),
    ])
}

fn environ(api: FakeDeviceApi) -> Environ<FakeDeviceApi> {
    Environ::with_api(api, cloud(), environ_config()).expect("environment builds")
}

fn ids(raw: &[&str]) -> Vec<InstanceId> {
    raw.iter().map(|id| InstanceId::from(*id)).collect()
}

fn tools(arch: &str) -> Tools {
    Tools {
        version: String::from("2.1.0"),
        arch: arch.to_owned(),
        url: format!("https://tools.example/agent-2.1.0-{arch}.tgz"),
    }
}

fn start_params(os: OsFamily) -> StartInstanceParams {
    StartInstanceParams {
        instance_config: Some(InstanceConfig::new("0", os, "xenial")),
        image_metadata: vec![ImageMetadata {
            id: String::from("ubuntu_16_04"),
            arch: String::from("amd64"),
        }],
        tools: vec![tools("amd64"), tools("arm64")],
        constraints: Constraints::default(),
        placement: None,
    }
}

fn last_create_request(api: &FakeDeviceApi) -> crate::client::DeviceCreateRequest {
    api.calls()
        .into_iter()
        .rev()
        .find_map(|call| match call {
            ApiCall::Create { request, .. } => Some(request),
            ApiCall::List { .. } | ApiCall::Delete { .. } => None,
        })
        .expect("a create call was made")
}

#[rstest]
#[tokio::test]
async fn all_instances_excludes_foreign_devices(api: FakeDeviceApi) {
    let instances = environ(api).all_instances().await.expect("listing");
    assert_eq!(selector_ids(&instances), ids(&["d1", "d3"]));
}

fn selector_ids(instances: &[Instance]) -> Vec<InstanceId> {
    crate::selector::ids_of(instances)
}

#[rstest]
#[tokio::test]
async fn controller_instances_lists_owned_controllers(api: FakeDeviceApi) {
    let controllers = environ(api).controller_instances().await.expect("listing");
    assert_eq!(controllers, ids(&["d3"]));
}

#[rstest]
#[tokio::test]
async fn foreign_id_alone_is_no_instances(api: FakeDeviceApi) {
    let err = environ(api)
        .instances(&ids(&["d2"]))
        .await
        .expect_err("d2 is foreign");
    assert_eq!(err, EnvironError::NoInstances);
}

#[rstest]
#[tokio::test]
async fn empty_lookup_is_no_instances_without_remote_call(api: FakeDeviceApi) {
    let err = environ(api.clone())
        .instances(&[])
        .await
        .expect_err("nothing requested");
    assert_eq!(err, EnvironError::NoInstances);
    assert!(api.calls().is_empty());
}

#[rstest]
#[tokio::test]
async fn full_lookup_preserves_request_order(api: FakeDeviceApi) {
    let found = environ(api)
        .instances(&ids(&["d3", "d1"]))
        .await
        .expect("both owned");
    assert_eq!(selector_ids(&found), ids(&["d3", "d1"]));
}

#[rstest]
#[tokio::test]
async fn partial_lookup_is_positional(api: FakeDeviceApi) {
    let err = environ(api)
        .instances(&ids(&["d1", "d2", "gone"]))
        .await
        .expect_err("only d1 matches");
    let EnvironError::PartialInstances { instances, missing } = err else {
        panic!("expected PartialInstances, got {err:?}");
    };
    assert_eq!(instances.len(), 3);
    assert_eq!(
        instances.first().and_then(|slot| slot.as_ref()).map(|inst| inst.id.as_str()),
        Some("d1")
    );
    assert!(instances.iter().skip(1).all(Option::is_none));
    assert_eq!(missing, ids(&["d2", "gone"]));
}

#[rstest]
#[tokio::test]
async fn listing_failure_surfaces_connectivity(api: FakeDeviceApi) {
    api.fail_next_list(ApiError::Transport(String::from("connection refused")));
    let err = environ(api)
        .all_instances()
        .await
        .expect_err("listing fails");
    assert!(matches!(err, EnvironError::Connectivity { .. }));
}

#[rstest]
#[tokio::test]
async fn stop_continues_past_failures(api: FakeDeviceApi) {
    api.fail_delete("bad-id", ApiError::Status {
        status: 500,
        message: String::from("internal error"),
    });
    let err = environ(api.clone())
        .stop_instances(&ids(&["d1", "bad-id"]))
        .await
        .expect_err("bad-id fails");

    assert_eq!(api.deleted_ids(), vec![String::from("d1"), String::from("bad-id")]);
    assert!(!api.devices().iter().any(|device| device.id == "d1"));
    let EnvironError::StopInstances { failures } = &err else {
        panic!("expected StopInstances, got {err:?}");
    };
    assert_eq!(failures.len(), 1);
    assert!(matches!(
        err.last_failure(),
        EnvironError::DeleteFailed { id, .. } if id.as_str() == "bad-id"
    ));
}

#[rstest]
#[tokio::test]
async fn stop_reports_every_failure_in_order(api: FakeDeviceApi) {
    api.fail_delete("d1", ApiError::Transport(String::from("reset")));
    let err = environ(api)
        .stop_instances(&ids(&["d1", "", "d3"]))
        .await
        .expect_err("two failures");
    let EnvironError::StopInstances { failures } = err else {
        panic!("expected StopInstances, got {err:?}");
    };
    let failed: Vec<&str> = failures.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(failed, vec!["d1", ""]);
    assert!(matches!(failures.get(1), Some((_, EnvironError::InvalidArgument(_)))));
}

#[rstest]
#[tokio::test]
async fn stop_skips_ids_that_are_not_a_device_path(api: FakeDeviceApi) {
    let err = environ(api.clone())
        .stop_instances(&ids(&["../projects/p1", "d1"]))
        .await
        .expect_err("traversal id fails");
    assert_eq!(api.deleted_ids(), vec![String::from("d1")]);
    assert!(matches!(
        err.last_failure(),
        EnvironError::InvalidArgument(message) if message.contains("../projects/p1")
    ));
}

#[rstest]
#[tokio::test]
async fn stop_treats_missing_instances_as_stopped(api: FakeDeviceApi) {
    environ(api.clone())
        .stop_instances(&ids(&["already-gone", "d1"]))
        .await
        .expect("missing instance counts as stopped");
    assert_eq!(api.deleted_ids().len(), 2);
}

#[rstest]
#[tokio::test]
async fn start_creates_tagged_instance(api: FakeDeviceApi) {
    let environ = environ(api.clone());
    let result = environ
        .start_instance(start_params(OsFamily::Ubuntu))
        .await
        .expect("instance starts");

    assert!(result.instance.has_tag(&owned()));
    assert_eq!(result.hardware.arch.as_deref(), Some("amd64"));

    let request = last_create_request(&api);
    assert_eq!(request.hostname, "env-machine-0");
    assert_eq!(request.plan, "baremetal_0");
    assert_eq!(request.facility, "sjc1");
    assert_eq!(request.operating_system, "ubuntu_16_04");
    assert_eq!(request.billing_cycle, "hourly");
    assert_eq!(request.project_id, "project-1");
    let decoded = BASE64_STANDARD
        .decode(request.userdata.as_bytes())
        .expect("user data is base64");
    assert_eq!(decoded.get(..2), Some(&[0x1f, 0x8b][..]), "ubuntu user data is gzipped");

    let listed = environ.all_instances().await.expect("listing");
    assert!(listed.iter().any(|inst| inst.id == result.instance.id));
}

#[rstest]
#[tokio::test]
async fn start_honours_constraints_and_placement(api: FakeDeviceApi) {
    let mut params = start_params(OsFamily::CentOS);
    params.constraints.instance_type = Some(String::from("baremetal_1"));
    params.placement = Some(String::from("ewr1"));
    params.instance_config = params
        .instance_config
        .map(|config| config.with_controller(true));

    let result = environ(api.clone())
        .start_instance(params)
        .await
        .expect("instance starts");
    assert!(result.instance.has_tag(CONTROLLER_TAG));

    let request = last_create_request(&api);
    assert_eq!(request.plan, "baremetal_1");
    assert_eq!(request.facility, "ewr1");
    let script = BASE64_STANDARD
        .decode(request.userdata.as_bytes())
        .expect("user data is base64");
    assert!(script.starts_with(b"#!/bin/bash"));
}

#[rstest]
#[tokio::test]
async fn start_reports_plan_hardware(api: FakeDeviceApi) {
    api.push_create_result(Ok(device_with_plan("d9", &[owned().as_str()])));
    let result = environ(api)
        .start_instance(start_params(OsFamily::Ubuntu))
        .await
        .expect("instance starts");
    assert_eq!(result.hardware.cpu_cores, Some(4));
    assert_eq!(result.hardware.mem_mib, Some(8_192));
}

#[rstest]
#[case::missing_config(StartInstanceParams { instance_config: None, ..start_params(OsFamily::Ubuntu) })]
#[case::missing_tools(StartInstanceParams { tools: Vec::new(), ..start_params(OsFamily::Ubuntu) })]
#[case::missing_images(StartInstanceParams { image_metadata: Vec::new(), ..start_params(OsFamily::Ubuntu) })]
#[tokio::test]
async fn start_rejects_incomplete_requests(api: FakeDeviceApi, #[case] params: StartInstanceParams) {
    let err = environ(api.clone())
        .start_instance(params)
        .await
        .expect_err("request is incomplete");
    assert!(matches!(err, EnvironError::InvalidRequest(_)), "got {err:?}");
    assert!(api.calls().is_empty(), "no remote call expected");
}

#[rstest]
#[tokio::test]
async fn start_rejects_unmatched_architecture(api: FakeDeviceApi) {
    let params = StartInstanceParams {
        tools: vec![tools("arm64"), tools("ppc64el")],
        ..start_params(OsFamily::Ubuntu)
    };
    let err = environ(api.clone())
        .start_instance(params)
        .await
        .expect_err("no amd64 tools");
    assert_eq!(err.to_string(), r#"chosen architecture amd64 not present in ["arm64", "ppc64el"]"#);
    assert!(api.calls().is_empty());
}

#[rstest]
#[tokio::test]
async fn start_rejects_unsupported_os(api: FakeDeviceApi) {
    let err = environ(api.clone())
        .start_instance(start_params(OsFamily::OpenSuse))
        .await
        .expect_err("OpenSUSE cannot be encoded");
    assert_eq!(err, EnvironError::UnsupportedOs {
        family: String::from("OpenSUSE")
    });
    assert!(api.calls().is_empty());
}

struct FailingFinalizer;

impl BootstrapFinalizer for FailingFinalizer {
    fn finish(
        &self,
        _config: &mut InstanceConfig,
        _environ: &EnvironConfig,
    ) -> Result<(), EnvironError> {
        Err(EnvironError::Config(String::from("agent stream unavailable")))
    }
}

#[rstest]
#[tokio::test]
async fn finalizer_errors_pass_through(api: FakeDeviceApi) {
    let err = environ(api)
        .with_finalizer(FailingFinalizer)
        .start_instance(start_params(OsFamily::Ubuntu))
        .await
        .expect_err("finalizer fails");
    assert_eq!(err, EnvironError::Config(String::from("agent stream unavailable")));
}

#[rstest]
#[tokio::test]
async fn start_failure_is_create_failed(api: FakeDeviceApi) {
    api.push_create_result(Err(ApiError::Status {
        status: 503,
        message: String::from("no capacity in sjc1"),
    }));
    let err = environ(api)
        .start_instance(start_params(OsFamily::Ubuntu))
        .await
        .expect_err("provider rejects");
    assert!(matches!(err, EnvironError::CreateFailed { .. }));
}

#[rstest]
#[tokio::test]
async fn set_config_replaces_settings(api: FakeDeviceApi) {
    let environ = environ(api);
    let mut updated = environ_config();
    updated.default_plan = String::from("baremetal_2");
    updated.authorized_keys = vec![String::from("ssh-ed25519 AAAA ops")];
    environ.set_config(updated.clone()).await.expect("valid change");
    assert_eq!(environ.config().await, updated);
}

#[rstest]
#[tokio::test]
async fn set_config_keeps_uuid_immutable(api: FakeDeviceApi) {
    let environ = environ(api);
    let changed = EnvironConfig::new("env", Uuid::from_u128(0xe2), "baremetal_0");
    let err = environ.set_config(changed).await.expect_err("uuid change");
    assert!(matches!(err, EnvironError::Config(_)));
    assert_eq!(environ.config().await.uuid, ENV_UUID);
}

#[rstest]
fn hooks_are_no_ops(api: FakeDeviceApi) {
    let environ = environ(api.clone());
    assert_eq!(environ.adopt_resources(), Ok(()));
    assert_eq!(environ.create(), Ok(()));
    assert_eq!(environ.maintain_instance(&StartInstanceParams::default()), Ok(()));
    assert_eq!(
        environ.precheck_instance("xenial", &Constraints::default(), None),
        Ok(())
    );
    assert_eq!(environ.prepare_for_bootstrap(), Ok(()));
    assert!(api.calls().is_empty());
}

#[rstest]
fn instance_types_are_not_supported(api: FakeDeviceApi) {
    let err = environ(api)
        .instance_types(&Constraints::default())
        .expect_err("not supported");
    assert_eq!(err.to_string(), "instance types not supported");
}

#[test]
fn with_api_rejects_invalid_config() {
    let config = EnvironConfig::new("env", Uuid::nil(), "baremetal_0");
    let err = Environ::with_api(FakeDeviceApi::default(), cloud(), config)
        .expect_err("nil uuid");
    assert!(matches!(err, EnvironError::Config(_)));
}
