//! Declarative wrappers that yield their children only when a predicate holds.

use crate::{
    authorizer::Authorization,
    components::ComponentId,
    model::{Action, PermissionKey, Resource, UserType},
};

pub trait Gate {
    fn allows<A: Authorization + ?Sized>(&self, auth: &A) -> bool;

    /// Builds the children when allowed, otherwise hands back `fallback`.
    fn render<A, T, F>(&self, auth: &A, children: F, fallback: Option<T>) -> Option<T>
    where
        A: Authorization + ?Sized,
        F: FnOnce() -> T,
    {
        if self.allows(auth) {
            Some(children())
        } else {
            fallback
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentGate {
    pub component: ComponentId,
}

impl ComponentGate {
    pub fn new(component: ComponentId) -> Self {
        Self { component }
    }
}

impl Gate for ComponentGate {
    fn allows<A: Authorization + ?Sized>(&self, auth: &A) -> bool {
        auth.can_access(self.component)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Match {
    #[default]
    Any,
    All,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionGate {
    required: Vec<PermissionKey>,
    mode: Match,
}

impl PermissionGate {
    pub fn new(resource: Resource, action: Action) -> Self {
        Self {
            required: vec![PermissionKey::new(resource, action)],
            mode: Match::Any,
        }
    }

    pub fn any(keys: impl IntoIterator<Item = PermissionKey>) -> Self {
        Self {
            required: keys.into_iter().collect(),
            mode: Match::Any,
        }
    }

    pub fn all(keys: impl IntoIterator<Item = PermissionKey>) -> Self {
        Self {
            required: keys.into_iter().collect(),
            mode: Match::All,
        }
    }
}

impl Gate for PermissionGate {
    fn allows<A: Authorization + ?Sized>(&self, auth: &A) -> bool {
        let held = |key: &PermissionKey| auth.has_permission(key.resource, key.action);
        match self.mode {
            Match::Any => self.required.iter().any(held),
            Match::All => !self.required.is_empty() && self.required.iter().all(held),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGate {
    pub roles: Vec<String>,
    pub require_all: bool,
}

impl RoleGate {
    pub fn any_of<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
            require_all: false,
        }
    }

    pub fn all_of<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            require_all: true,
            ..Self::any_of(roles)
        }
    }
}

impl Gate for RoleGate {
    fn allows<A: Authorization + ?Sized>(&self, auth: &A) -> bool {
        let roles: Vec<&str> = self.roles.iter().map(String::as_str).collect();
        if self.require_all {
            auth.has_all_roles(&roles)
        } else {
            auth.has_role(&roles)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserTypeGate {
    pub types: Vec<UserType>,
}

impl UserTypeGate {
    pub fn new(types: impl IntoIterator<Item = UserType>) -> Self {
        Self {
            types: types.into_iter().collect(),
        }
    }
}

impl Gate for UserTypeGate {
    fn allows<A: Authorization + ?Sized>(&self, auth: &A) -> bool {
        auth.has_user_type(&self.types)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdminGate;

impl Gate for AdminGate {
    fn allows<A: Authorization + ?Sized>(&self, auth: &A) -> bool {
        auth.is_admin()
    }
}
