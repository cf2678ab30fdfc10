//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::future::ready;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::client::{
    ApiError, ApiFuture, CpuSpec, Device, DeviceApi, DeviceCreateRequest, DriveSpec,
    IpAddressAssignment, MemorySpec, Plan, PlanSpecs,
};

/// Records a single call made through [`FakeDeviceApi`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ApiCall {
    /// A device listing.
    List {
        /// Project passed to the call.
        project_id: String,
    },
    /// A device creation.
    Create {
        /// Project passed to the call.
        project_id: String,
        /// Request body.
        request: DeviceCreateRequest,
    },
    /// A device deletion.
    Delete {
        /// Target device.
        device_id: String,
    },
}

#[derive(Debug, Default)]
struct FakeState {
    devices: Vec<Device>,
    list_failures: VecDeque<ApiError>,
    create_results: VecDeque<Result<Device, ApiError>>,
    delete_failures: BTreeMap<String, ApiError>,
    calls: Vec<ApiCall>,
    next_id: usize,
}

/// In-memory provider inventory with scripted failures.
///
/// Creations append a `queued` device to the inventory unless a scripted
/// result is queued; deletions remove the device or fail with
/// [`ApiError::NotFound`] when it is absent.
#[derive(Clone, Debug, Default)]
pub struct FakeDeviceApi {
    state: Arc<Mutex<FakeState>>,
}

impl FakeDeviceApi {
    /// Creates an API double seeded with `devices`.
    #[must_use]
    pub fn with_devices(devices: Vec<Device>) -> Self {
        let api = Self::default();
        api.lock().devices = devices;
        api
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes the next listing fail with `error`.
    pub fn fail_next_list(&self, error: ApiError) {
        self.lock().list_failures.push_back(error);
    }

    /// Queues the outcome of the next creation.
    pub fn push_create_result(&self, result: Result<Device, ApiError>) {
        self.lock().create_results.push_back(result);
    }

    /// Makes every deletion of `device_id` fail with `error`.
    pub fn fail_delete(&self, device_id: &str, error: ApiError) {
        self.lock()
            .delete_failures
            .insert(device_id.to_owned(), error);
    }

    /// Returns a snapshot of the current inventory.
    #[must_use]
    pub fn devices(&self) -> Vec<Device> {
        self.lock().devices.clone()
    }

    /// Returns a snapshot of all calls recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<ApiCall> {
        self.lock().calls.clone()
    }

    /// Returns the ids passed to delete calls, in order.
    #[must_use]
    pub fn deleted_ids(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::Delete { device_id } => Some(device_id),
                ApiCall::List { .. } | ApiCall::Create { .. } => None,
            })
            .collect()
    }

    fn handle_list(&self, project_id: &str) -> Result<Vec<Device>, ApiError> {
        let mut state = self.lock();
        state.calls.push(ApiCall::List {
            project_id: project_id.to_owned(),
        });
        match state.list_failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(state.devices.clone()),
        }
    }

    fn handle_create(
        &self,
        project_id: &str,
        request: &DeviceCreateRequest,
    ) -> Result<Device, ApiError> {
        let mut state = self.lock();
        state.calls.push(ApiCall::Create {
            project_id: project_id.to_owned(),
            request: request.clone(),
        });
        if let Some(result) = state.create_results.pop_front() {
            return result;
        }
        state.next_id = state.next_id.saturating_add(1);
        let created = Device {
            id: format!("dev-{}", state.next_id),
            hostname: request.hostname.clone(),
            state: String::from("queued"),
            tags: request.tags.clone(),
            network: Vec::new(),
            plan: Some(Plan {
                slug: request.plan.clone(),
                specs: None,
            }),
        };
        state.devices.push(created.clone());
        Ok(created)
    }

    fn handle_delete(&self, device_id: &str) -> Result<(), ApiError> {
        let mut state = self.lock();
        state.calls.push(ApiCall::Delete {
            device_id: device_id.to_owned(),
        });
        if let Some(error) = state.delete_failures.get(device_id) {
            return Err(error.clone());
        }
        let before = state.devices.len();
        state.devices.retain(|device| device.id != device_id);
        if state.devices.len() == before {
            return Err(ApiError::NotFound(device_id.to_owned()));
        }
        Ok(())
    }
}

impl DeviceApi for FakeDeviceApi {
    fn list_devices<'a>(&'a self, project_id: &'a str) -> ApiFuture<'a, Vec<Device>> {
        Box::pin(ready(self.handle_list(project_id)))
    }

    fn create_device<'a>(
        &'a self,
        project_id: &'a str,
        request: &'a DeviceCreateRequest,
    ) -> ApiFuture<'a, Device> {
        Box::pin(ready(self.handle_create(project_id, request)))
    }

    fn delete_device<'a>(&'a self, device_id: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(ready(self.handle_delete(device_id)))
    }
}

/// Builds a device with the given id, state and tags.
#[must_use]
pub fn device(id: &str, state: &str, tags: &[&str]) -> Device {
    Device {
        id: id.to_owned(),
        hostname: format!("host-{id}"),
        state: state.to_owned(),
        tags: tags.iter().map(|tag| (*tag).to_owned()).collect(),
        network: vec![IpAddressAssignment {
            address: String::from("147.75.0.10"),
            public: true,
            address_family: 4,
        }],
        plan: None,
    }
}

/// Builds an `active` device carrying a `baremetal_0` plan description.
#[must_use]
pub fn device_with_plan(id: &str, tags: &[&str]) -> Device {
    Device {
        plan: Some(Plan {
            slug: String::from("baremetal_0"),
            specs: Some(PlanSpecs {
                cpus: vec![CpuSpec {
                    count: 4,
                    cpu_type: String::from("Intel Atom C2550"),
                }],
                memory: Some(MemorySpec {
                    total: String::from("8GB"),
                }),
                drives: vec![DriveSpec {
                    count: 1,
                    size: String::from("80GB"),
                    drive_type: String::from("SSD"),
                }],
            }),
        }),
        ..device(id, "active", tags)
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: AsyncMutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
