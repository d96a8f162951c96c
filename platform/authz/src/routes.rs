//! Route-level protection with a one-shot redirect on denial.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::debug;

use crate::{
    authorizer::Authorization,
    components::ComponentId,
    model::{Action, PermissionKey, Resource, UserType},
};

pub const UNAUTHORIZED_PATH: &str = "/unauthorized";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RouteRequirement {
    Authenticated,
    Admin,
    Permission(PermissionKey),
    AnyRole(Vec<String>),
    UserType(Vec<UserType>),
    Component(ComponentId),
    All(Vec<RouteRequirement>),
}

impl RouteRequirement {
    pub fn permission(resource: Resource, action: Action) -> Self {
        Self::Permission(PermissionKey::new(resource, action))
    }

    pub fn is_satisfied<A: Authorization + ?Sized>(&self, auth: &A) -> bool {
        if !auth.is_authenticated() {
            return false;
        }
        match self {
            Self::Authenticated => true,
            Self::Admin => auth.is_admin(),
            Self::Permission(key) => auth.has_permission(key.resource, key.action),
            Self::AnyRole(roles) => {
                let roles: Vec<&str> = roles.iter().map(String::as_str).collect();
                auth.has_role(&roles)
            }
            Self::UserType(types) => auth.has_user_type(types),
            Self::Component(component) => auth.can_access(*component),
            Self::All(requirements) => requirements.iter().all(|r| r.is_satisfied(auth)),
        }
    }

    /// Conjunction, flattening nested `All`s and dropping repeated terms and
    /// redundant `Authenticated` ones.
    pub fn and(self, other: RouteRequirement) -> RouteRequirement {
        let mut terms: Vec<RouteRequirement> = Vec::new();
        let flattened = [self, other].into_iter().flat_map(|requirement| match requirement {
            Self::All(inner) => inner,
            single => vec![single],
        });
        for term in flattened {
            if !terms.contains(&term) {
                terms.push(term);
            }
        }
        if terms.len() > 1 {
            terms.retain(|term| *term != Self::Authenticated);
        }
        match terms.len() {
            0 => Self::Authenticated,
            1 => terms.remove(0),
            _ => Self::All(terms),
        }
    }
}

/// Client-side navigation hook fired when a route check fails.
pub trait Navigator {
    fn navigate(&self, path: &str);
}

#[derive(Debug, PartialEq, Eq)]
pub enum RouteOutcome<'a, T> {
    Render,
    Fallback(&'a T),
    Redirect(&'static str),
}

/// A route guarded by a [`RouteRequirement`].
///
/// When the check fails and there is no fallback, the navigator is sent to
/// [`UNAUTHORIZED_PATH`]. That navigation happens at most once per instance;
/// later failing checks still report `Redirect` but do not navigate again.
#[derive(Debug)]
pub struct ProtectedRoute<T> {
    requirement: RouteRequirement,
    fallback: Option<T>,
    redirected: AtomicBool,
}

impl<T> ProtectedRoute<T> {
    pub fn new(requirement: RouteRequirement) -> Self {
        Self {
            requirement,
            fallback: None,
            redirected: AtomicBool::new(false),
        }
    }

    pub fn authenticated() -> Self {
        Self::new(RouteRequirement::Authenticated)
    }

    pub fn admin() -> Self {
        Self::new(RouteRequirement::Admin)
    }

    pub fn permission(resource: Resource, action: Action) -> Self {
        Self::new(RouteRequirement::permission(resource, action))
    }

    pub fn roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(RouteRequirement::AnyRole(
            roles.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn user_types(types: impl IntoIterator<Item = UserType>) -> Self {
        Self::new(RouteRequirement::UserType(types.into_iter().collect()))
    }

    pub fn component(component: ComponentId) -> Self {
        Self::new(RouteRequirement::Component(component))
    }

    pub fn with_fallback(mut self, fallback: T) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn requirement(&self) -> &RouteRequirement {
        &self.requirement
    }

    pub fn check<A, N>(&self, auth: &A, navigator: &N) -> RouteOutcome<'_, T>
    where
        A: Authorization + ?Sized,
        N: Navigator + ?Sized,
    {
        if self.requirement.is_satisfied(auth) {
            return RouteOutcome::Render;
        }
        if let Some(fallback) = &self.fallback {
            return RouteOutcome::Fallback(fallback);
        }
        if !self.redirected.swap(true, Ordering::SeqCst) {
            debug!(requirement = ?self.requirement, "route denied, redirecting");
            navigator.navigate(UNAUTHORIZED_PATH);
        }
        RouteOutcome::Redirect(UNAUTHORIZED_PATH)
    }
}
