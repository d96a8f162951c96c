//! Client side of the REST backend.
//!
//! Only roles and permissions are consumed here. Every lookup degrades to
//! the built-in tables when the backend is missing or failing; writes do not.

mod client;
mod services;

pub use client::{ApiClient, BackendConfig, BackendError, DEFAULT_TIMEOUT, error_detail};
pub use services::{PermissionService, RemotePermission, RemoteRole, RoleService};
