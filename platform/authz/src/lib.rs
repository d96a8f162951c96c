//! Role-based access control for the finance admin surfaces.
//!
//! The decision data is static: a default permission table, default roles,
//! and per-user-type component allow-lists. [`Authorizer`] derives the
//! predicates for one user; gates and protected routes consult them.

mod authorizer;
mod components;
mod gates;
mod model;
mod routes;

use thiserror::Error;

pub use authorizer::{AccessSnapshot, Authorization, Authorizer, CurrentUser};
pub use components::{ComponentId, allowed_components, can_access_component, memoized_decisions};
pub use gates::{AdminGate, ComponentGate, Gate, Match, PermissionGate, RoleGate, UserTypeGate};
pub use model::{
    ADMIN_ROLE, Action, Permission, PermissionKey, Resource, Role, RoleCatalog, SUPER_ADMIN_ROLE,
    UserType, default_permission, default_permissions, default_roles, is_admin_role,
    is_default_permission,
};
pub use routes::{Navigator, ProtectedRoute, RouteOutcome, RouteRequirement, UNAUTHORIZED_PATH};

#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("authentication required")]
    Unauthenticated,
    #[error("action {action} denied for resource {resource}")]
    Denied { action: String, resource: String },
}
