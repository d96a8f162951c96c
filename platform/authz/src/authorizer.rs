use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::{
    AuthzError,
    components::{ComponentId, can_access_component},
    model::{
        Action, Permission, PermissionKey, Resource, RoleCatalog, UserType, default_permissions,
        is_admin_role,
    },
};

/// The authenticated user as carried by the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub user_type: Option<UserType>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Predicates consulted by gates and protected routes.
pub trait Authorization {
    fn is_authenticated(&self) -> bool;
    fn is_admin(&self) -> bool;
    fn has_role(&self, roles: &[&str]) -> bool;
    fn has_all_roles(&self, roles: &[&str]) -> bool;
    fn has_user_type(&self, types: &[UserType]) -> bool;
    fn has_permission(&self, resource: Resource, action: Action) -> bool;
    fn can_access(&self, component: ComponentId) -> bool;
}

/// Access predicates derived once from the current user and a role catalog.
#[derive(Debug, Clone, Default)]
pub struct Authorizer {
    user: Option<CurrentUser>,
    admin: bool,
    granted: BTreeSet<PermissionKey>,
}

impl Authorizer {
    pub fn new(user: Option<CurrentUser>, catalog: &RoleCatalog) -> Self {
        let Some(user) = user else {
            return Self::anonymous();
        };
        let admin = user.user_type == Some(UserType::Admin)
            || user.roles.iter().any(|role| is_admin_role(role));
        let granted = user
            .roles
            .iter()
            .map(String::as_str)
            .chain(user.user_type.map(UserType::default_role))
            .filter_map(|role| catalog.get(role))
            .flat_map(|role| role.permission_keys())
            .collect();
        Self {
            user: Some(user),
            admin,
            granted,
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(&self) -> Option<&CurrentUser> {
        self.user.as_ref()
    }

    /// Effective permissions, sorted.
    pub fn permissions(&self) -> Vec<PermissionKey> {
        if self.admin {
            let mut keys: Vec<_> = default_permissions().iter().map(Permission::key).collect();
            keys.sort();
            keys
        } else {
            self.granted.iter().copied().collect()
        }
    }

    pub fn accessible_components(&self) -> Vec<ComponentId> {
        ComponentId::all()
            .iter()
            .copied()
            .filter(|component| self.can_access(*component))
            .collect()
    }

    /// Fails with [`AuthzError`] unless the permission is held.
    pub fn require(&self, resource: Resource, action: Action) -> Result<(), AuthzError> {
        if !self.is_authenticated() {
            return Err(AuthzError::Unauthenticated);
        }
        if self.has_permission(resource, action) {
            Ok(())
        } else {
            debug!(%resource, %action, "permission denied");
            Err(AuthzError::Denied {
                action: action.to_string(),
                resource: resource.to_string(),
            })
        }
    }

    pub fn snapshot(&self) -> AccessSnapshot {
        AccessSnapshot {
            authenticated: self.is_authenticated(),
            is_admin: self.admin,
            user_type: self.user.as_ref().and_then(|u| u.user_type),
            roles: self.user.as_ref().map(|u| u.roles.clone()).unwrap_or_default(),
            permissions: self.permissions().iter().map(ToString::to_string).collect(),
            components: self.accessible_components(),
        }
    }
}

impl Authorization for Authorizer {
    fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    fn is_admin(&self) -> bool {
        self.admin
    }

    fn has_role(&self, roles: &[&str]) -> bool {
        let Some(user) = &self.user else {
            return false;
        };
        roles
            .iter()
            .any(|wanted| user.roles.iter().any(|held| held.eq_ignore_ascii_case(wanted.trim())))
    }

    fn has_all_roles(&self, roles: &[&str]) -> bool {
        let Some(user) = &self.user else {
            return false;
        };
        roles
            .iter()
            .all(|wanted| user.roles.iter().any(|held| held.eq_ignore_ascii_case(wanted.trim())))
    }

    fn has_user_type(&self, types: &[UserType]) -> bool {
        self.user
            .as_ref()
            .and_then(|u| u.user_type)
            .is_some_and(|held| types.contains(&held))
    }

    fn has_permission(&self, resource: Resource, action: Action) -> bool {
        if self.user.is_none() {
            return false;
        }
        self.admin || self.granted.contains(&PermissionKey::new(resource, action))
    }

    fn can_access(&self, component: ComponentId) -> bool {
        let Some(user) = &self.user else {
            return false;
        };
        if self.admin {
            return true;
        }
        user.user_type
            .is_some_and(|t| can_access_component(t.as_str(), component))
            || user.roles.iter().any(|role| can_access_component(role, component))
    }
}

/// Serializable view of everything the current user may do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessSnapshot {
    pub authenticated: bool,
    pub is_admin: bool,
    pub user_type: Option<UserType>,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub components: Vec<ComponentId>,
}
