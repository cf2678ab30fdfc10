//! Shared constants for integration tests.
//!
//! Integration tests are compiled as separate crates (one per top-level file in
//! `tests/`). Placing shared constants under `tests/common/` avoids creating an
//! additional integration test binary while still allowing reuse via:
//!
//! ```rust
//! #[path = "common/test_constants.rs"]
//! mod test_constants;
//! ```

/// Plan used when a start request carries no instance type.
pub const DEFAULT_PLAN: &str = "baremetal_0";

/// Project every test device lives in.
pub const PROJECT_ID: &str = "89b497ee-5afc-420a-8fb5-56984898f4df";

/// UUID of the environment under test.
pub const ENV_UUID: &str = "5f1c3c2a-9d4e-4b7a-8c11-0a6e2b9f7d31";
