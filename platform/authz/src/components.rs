//! Per-user-type allow-lists of UI surfaces.

use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::model::{UserType, is_admin_role};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComponentId {
    Dashboard,
    AdminList,
    UserList,
    RoleManagement,
    DepartmentList,
    ProjectList,
    RevenueList,
    RevenueForm,
    ExpenseList,
    ExpenseForm,
    ApprovalQueue,
    Reports,
    Notifications,
    Backups,
    AuditLogs,
    Settings,
    Profile,
}

impl ComponentId {
    const ALL: [ComponentId; 17] = [
        ComponentId::Dashboard,
        ComponentId::AdminList,
        ComponentId::UserList,
        ComponentId::RoleManagement,
        ComponentId::DepartmentList,
        ComponentId::ProjectList,
        ComponentId::RevenueList,
        ComponentId::RevenueForm,
        ComponentId::ExpenseList,
        ComponentId::ExpenseForm,
        ComponentId::ApprovalQueue,
        ComponentId::Reports,
        ComponentId::Notifications,
        ComponentId::Backups,
        ComponentId::AuditLogs,
        ComponentId::Settings,
        ComponentId::Profile,
    ];

    pub fn all() -> &'static [ComponentId] {
        &Self::ALL
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ComponentId::Dashboard => "DASHBOARD",
            ComponentId::AdminList => "ADMIN_LIST",
            ComponentId::UserList => "USER_LIST",
            ComponentId::RoleManagement => "ROLE_MANAGEMENT",
            ComponentId::DepartmentList => "DEPARTMENT_LIST",
            ComponentId::ProjectList => "PROJECT_LIST",
            ComponentId::RevenueList => "REVENUE_LIST",
            ComponentId::RevenueForm => "REVENUE_FORM",
            ComponentId::ExpenseList => "EXPENSE_LIST",
            ComponentId::ExpenseForm => "EXPENSE_FORM",
            ComponentId::ApprovalQueue => "APPROVAL_QUEUE",
            ComponentId::Reports => "REPORTS",
            ComponentId::Notifications => "NOTIFICATIONS",
            ComponentId::Backups => "BACKUPS",
            ComponentId::AuditLogs => "AUDIT_LOGS",
            ComponentId::Settings => "SETTINGS",
            ComponentId::Profile => "PROFILE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == normalized)
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

use ComponentId::*;

// Admins short-circuit before this table is consulted, so ADMIN has no entry.
static COMPONENT_ACCESS: Lazy<HashMap<UserType, HashSet<ComponentId>>> = Lazy::new(|| {
    let table: [(UserType, &[ComponentId]); 5] = [
        (
            UserType::FinanceAdmin,
            &[
                Dashboard,
                UserList,
                DepartmentList,
                ProjectList,
                RevenueList,
                RevenueForm,
                ExpenseList,
                ExpenseForm,
                ApprovalQueue,
                Reports,
                Notifications,
                AuditLogs,
                Settings,
                Profile,
            ],
        ),
        (
            UserType::Accountant,
            &[
                Dashboard,
                DepartmentList,
                ProjectList,
                RevenueList,
                RevenueForm,
                ExpenseList,
                ExpenseForm,
                Reports,
                Notifications,
                Profile,
            ],
        ),
        (
            UserType::Manager,
            &[
                Dashboard,
                DepartmentList,
                ProjectList,
                ExpenseList,
                ExpenseForm,
                ApprovalQueue,
                Reports,
                Notifications,
                Profile,
            ],
        ),
        (
            UserType::Auditor,
            &[
                Dashboard,
                RevenueList,
                ExpenseList,
                ApprovalQueue,
                Reports,
                AuditLogs,
                Notifications,
                Profile,
            ],
        ),
        (
            UserType::Employee,
            &[
                Dashboard,
                ProjectList,
                ExpenseList,
                ExpenseForm,
                Notifications,
                Profile,
            ],
        ),
    ];
    table
        .into_iter()
        .map(|(user_type, components)| (user_type, components.iter().copied().collect()))
        .collect()
});

static DECISIONS: Lazy<DashMap<(String, ComponentId), bool>> = Lazy::new(DashMap::new);

/// Decides whether `subject` (a user type or role name) may see `component`.
///
/// `ADMIN`, `admin` and `super_admin` see everything. Any other subject is
/// looked up in the static allow-list; unknown subjects are denied. The
/// decision is memoized for the life of the process.
pub fn can_access_component(subject: &str, component: ComponentId) -> bool {
    let key = (subject.trim().to_ascii_lowercase(), component);
    if let Some(hit) = DECISIONS.get(&key) {
        return *hit;
    }
    let decision = evaluate(&key.0, component);
    DECISIONS.insert(key, decision);
    decision
}

fn evaluate(subject: &str, component: ComponentId) -> bool {
    if is_admin_role(subject) {
        return true;
    }
    UserType::parse(subject)
        .and_then(|user_type| COMPONENT_ACCESS.get(&user_type))
        .is_some_and(|allowed| allowed.contains(&component))
}

/// Allow-list for `user_type`, in declaration order.
pub fn allowed_components(user_type: UserType) -> Vec<ComponentId> {
    ComponentId::all()
        .iter()
        .copied()
        .filter(|component| can_access_component(user_type.as_str(), *component))
        .collect()
}

pub fn memoized_decisions() -> usize {
    DECISIONS.len()
}
