//! Static role/permission model and the default tables.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const SUPER_ADMIN_ROLE: &str = "super_admin";
pub const ADMIN_ROLE: &str = "admin";

/// Returns true for role names that bypass every check.
pub fn is_admin_role(role: &str) -> bool {
    let role = role.trim();
    role.eq_ignore_ascii_case(ADMIN_ROLE) || role.eq_ignore_ascii_case(SUPER_ADMIN_ROLE)
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserType {
    #[serde(alias = "admin")]
    Admin,
    #[serde(alias = "finance_admin")]
    FinanceAdmin,
    #[serde(alias = "accountant")]
    Accountant,
    #[serde(alias = "manager")]
    Manager,
    #[serde(alias = "auditor")]
    Auditor,
    #[serde(alias = "employee")]
    Employee,
}

impl UserType {
    pub const ALL: [UserType; 6] = [
        UserType::Admin,
        UserType::FinanceAdmin,
        UserType::Accountant,
        UserType::Manager,
        UserType::Auditor,
        UserType::Employee,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            UserType::Admin => "ADMIN",
            UserType::FinanceAdmin => "FINANCE_ADMIN",
            UserType::Accountant => "ACCOUNTANT",
            UserType::Manager => "MANAGER",
            UserType::Auditor => "AUDITOR",
            UserType::Employee => "EMPLOYEE",
        }
    }

    /// Accepts both `FINANCE_ADMIN` and `finance-admin` spellings.
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_uppercase().replace('-', "_");
        UserType::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == normalized)
    }

    /// Name of the role every user of this type holds implicitly.
    pub fn default_role(self) -> &'static str {
        match self {
            UserType::Admin => ADMIN_ROLE,
            UserType::FinanceAdmin => "finance_admin",
            UserType::Accountant => "accountant",
            UserType::Manager => "manager",
            UserType::Auditor => "auditor",
            UserType::Employee => "employee",
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Dashboard,
    Users,
    Roles,
    Departments,
    Projects,
    Revenues,
    Expenses,
    Approvals,
    Reports,
    Notifications,
    Backups,
    AuditLogs,
    Settings,
}

impl Resource {
    pub const ALL: [Resource; 13] = [
        Resource::Dashboard,
        Resource::Users,
        Resource::Roles,
        Resource::Departments,
        Resource::Projects,
        Resource::Revenues,
        Resource::Expenses,
        Resource::Approvals,
        Resource::Reports,
        Resource::Notifications,
        Resource::Backups,
        Resource::AuditLogs,
        Resource::Settings,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Resource::Dashboard => "dashboard",
            Resource::Users => "users",
            Resource::Roles => "roles",
            Resource::Departments => "departments",
            Resource::Projects => "projects",
            Resource::Revenues => "revenues",
            Resource::Expenses => "expenses",
            Resource::Approvals => "approvals",
            Resource::Reports => "reports",
            Resource::Notifications => "notifications",
            Resource::Backups => "backups",
            Resource::AuditLogs => "audit_logs",
            Resource::Settings => "settings",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Resource::ALL
            .into_iter()
            .find(|candidate| candidate.as_str().eq_ignore_ascii_case(value))
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    Approve,
    Export,
    Manage,
}

impl Action {
    pub const ALL: [Action; 7] = [
        Action::Create,
        Action::Read,
        Action::Update,
        Action::Delete,
        Action::Approve,
        Action::Export,
        Action::Manage,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Approve => "approve",
            Action::Export => "export",
            Action::Manage => "manage",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Action::ALL
            .into_iter()
            .find(|candidate| candidate.as_str().eq_ignore_ascii_case(value))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `resource:action` pair.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct PermissionKey {
    pub resource: Resource,
    pub action: Action,
}

impl PermissionKey {
    pub const fn new(resource: Resource, action: Action) -> Self {
        Self { resource, action }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let (resource, action) = value.split_once(':')?;
        Some(Self {
            resource: Resource::parse(resource)?,
            action: Action::parse(action)?,
        })
    }
}

impl fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource, self.action)
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    pub id: String,
    pub name: String,
    pub description: String,
    pub resource: Resource,
    pub action: Action,
}

impl Permission {
    pub fn new(resource: Resource, action: Action, description: impl Into<String>) -> Self {
        let key = PermissionKey::new(resource, action);
        Self {
            id: key.to_string(),
            name: format!("{} {}", action, resource),
            description: description.into(),
            resource,
            action,
        }
    }

    pub fn key(&self) -> PermissionKey {
        PermissionKey::new(self.resource, self.action)
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub name: String,
    pub description: String,
    pub permissions: Vec<Permission>,
}

impl Role {
    pub fn grants(&self, key: PermissionKey) -> bool {
        self.permissions.iter().any(|p| p.key() == key)
    }

    pub fn permission_keys(&self) -> impl Iterator<Item = PermissionKey> + '_ {
        self.permissions.iter().map(Permission::key)
    }
}

use Action::{Approve, Create, Delete, Export, Manage, Read, Update};
use Resource::{
    Approvals, AuditLogs, Backups, Dashboard, Departments, Expenses, Notifications, Projects,
    Reports, Revenues, Roles, Settings, Users,
};

const PERMISSION_TABLE: &[(Resource, Action, &str)] = &[
    (Dashboard, Read, "View the financial dashboard"),
    (Users, Create, "Invite and create users"),
    (Users, Read, "View users"),
    (Users, Update, "Edit user profiles"),
    (Users, Delete, "Deactivate users"),
    (Users, Manage, "Assign user types and roles"),
    (Roles, Read, "View roles and their permissions"),
    (Roles, Update, "Edit role permissions"),
    (Roles, Manage, "Create and delete roles"),
    (Departments, Create, "Create departments"),
    (Departments, Read, "View departments"),
    (Departments, Update, "Edit departments"),
    (Departments, Delete, "Delete departments"),
    (Projects, Create, "Create projects"),
    (Projects, Read, "View projects"),
    (Projects, Update, "Edit projects"),
    (Projects, Delete, "Delete projects"),
    (Revenues, Create, "Record revenue"),
    (Revenues, Read, "View revenue"),
    (Revenues, Update, "Edit revenue entries"),
    (Revenues, Delete, "Delete revenue entries"),
    (Revenues, Approve, "Approve revenue entries"),
    (Revenues, Export, "Export revenue"),
    (Expenses, Create, "Submit expenses"),
    (Expenses, Read, "View expenses"),
    (Expenses, Update, "Edit expenses"),
    (Expenses, Delete, "Delete expenses"),
    (Expenses, Approve, "Approve expenses"),
    (Expenses, Export, "Export expenses"),
    (Approvals, Read, "View the approval queue"),
    (Approvals, Approve, "Decide pending approvals"),
    (Reports, Read, "View reports"),
    (Reports, Export, "Export reports"),
    (Notifications, Read, "Read notifications"),
    (Notifications, Update, "Mark notifications as read"),
    (Backups, Create, "Trigger backups"),
    (Backups, Read, "List backups"),
    (Backups, Manage, "Restore and delete backups"),
    (AuditLogs, Read, "View audit logs"),
    (AuditLogs, Export, "Export audit logs"),
    (Settings, Read, "View system settings"),
    (Settings, Update, "Change system settings"),
];

const FINANCE_ADMIN_GRANTS: &[(Resource, Action)] = &[
    (Dashboard, Read),
    (Users, Read),
    (Departments, Create),
    (Departments, Read),
    (Departments, Update),
    (Departments, Delete),
    (Projects, Create),
    (Projects, Read),
    (Projects, Update),
    (Projects, Delete),
    (Revenues, Create),
    (Revenues, Read),
    (Revenues, Update),
    (Revenues, Delete),
    (Revenues, Approve),
    (Revenues, Export),
    (Expenses, Create),
    (Expenses, Read),
    (Expenses, Update),
    (Expenses, Delete),
    (Expenses, Approve),
    (Expenses, Export),
    (Approvals, Read),
    (Approvals, Approve),
    (Reports, Read),
    (Reports, Export),
    (Notifications, Read),
    (Notifications, Update),
    (AuditLogs, Read),
    (Settings, Read),
];

const ACCOUNTANT_GRANTS: &[(Resource, Action)] = &[
    (Dashboard, Read),
    (Departments, Read),
    (Projects, Read),
    (Revenues, Create),
    (Revenues, Read),
    (Revenues, Update),
    (Revenues, Export),
    (Expenses, Create),
    (Expenses, Read),
    (Expenses, Update),
    (Expenses, Export),
    (Reports, Read),
    (Reports, Export),
    (Notifications, Read),
    (Notifications, Update),
];

const MANAGER_GRANTS: &[(Resource, Action)] = &[
    (Dashboard, Read),
    (Departments, Read),
    (Projects, Create),
    (Projects, Read),
    (Projects, Update),
    (Expenses, Create),
    (Expenses, Read),
    (Approvals, Read),
    (Approvals, Approve),
    (Reports, Read),
    (Notifications, Read),
    (Notifications, Update),
];

const AUDITOR_GRANTS: &[(Resource, Action)] = &[
    (Dashboard, Read),
    (Revenues, Read),
    (Expenses, Read),
    (Approvals, Read),
    (Reports, Read),
    (Reports, Export),
    (AuditLogs, Read),
    (AuditLogs, Export),
    (Notifications, Read),
];

const EMPLOYEE_GRANTS: &[(Resource, Action)] = &[
    (Dashboard, Read),
    (Projects, Read),
    (Expenses, Create),
    (Expenses, Read),
    (Notifications, Read),
    (Notifications, Update),
];

static DEFAULT_PERMISSIONS: Lazy<Vec<Permission>> = Lazy::new(|| {
    PERMISSION_TABLE
        .iter()
        .map(|(resource, action, description)| Permission::new(*resource, *action, *description))
        .collect()
});

static DEFAULT_PERMISSION_KEYS: Lazy<BTreeSet<PermissionKey>> =
    Lazy::new(|| DEFAULT_PERMISSIONS.iter().map(Permission::key).collect());

static DEFAULT_ROLES: Lazy<Vec<Role>> = Lazy::new(|| {
    let everything = || DEFAULT_PERMISSIONS.clone();
    vec![
        Role {
            id: SUPER_ADMIN_ROLE.into(),
            name: "Super Admin".into(),
            description: "Unrestricted access, including role management".into(),
            permissions: everything(),
        },
        Role {
            id: ADMIN_ROLE.into(),
            name: "Administrator".into(),
            description: "Full administrative access".into(),
            permissions: everything(),
        },
        curated_role(
            "finance_admin",
            "Finance Admin",
            "Owns revenue, expenses and approvals",
            FINANCE_ADMIN_GRANTS,
        ),
        curated_role(
            "accountant",
            "Accountant",
            "Books revenue and expenses",
            ACCOUNTANT_GRANTS,
        ),
        curated_role(
            "manager",
            "Manager",
            "Runs projects and approves team spend",
            MANAGER_GRANTS,
        ),
        curated_role(
            "auditor",
            "Auditor",
            "Read-only access to the books and audit trail",
            AUDITOR_GRANTS,
        ),
        curated_role(
            "employee",
            "Employee",
            "Submits expenses and follows projects",
            EMPLOYEE_GRANTS,
        ),
    ]
});

fn curated_role(id: &str, name: &str, description: &str, grants: &[(Resource, Action)]) -> Role {
    let permissions = grants
        .iter()
        .filter_map(|(resource, action)| {
            default_permission(PermissionKey::new(*resource, *action)).cloned()
        })
        .collect();
    Role {
        id: id.into(),
        name: name.into(),
        description: description.into(),
        permissions,
    }
}

pub fn default_permissions() -> &'static [Permission] {
    &DEFAULT_PERMISSIONS
}

pub fn default_roles() -> &'static [Role] {
    &DEFAULT_ROLES
}

pub fn default_permission(key: PermissionKey) -> Option<&'static Permission> {
    DEFAULT_PERMISSIONS.iter().find(|p| p.key() == key)
}

pub fn is_default_permission(key: PermissionKey) -> bool {
    DEFAULT_PERMISSION_KEYS.contains(&key)
}

/// Roles indexed by lower-cased id.
#[derive(Debug, Clone)]
pub struct RoleCatalog {
    roles: BTreeMap<String, Role>,
}

impl Default for RoleCatalog {
    fn default() -> Self {
        Self::defaults()
    }
}

impl RoleCatalog {
    pub fn defaults() -> Self {
        let roles = default_roles()
            .iter()
            .map(|role| (role.id.to_ascii_lowercase(), role.clone()))
            .collect();
        Self { roles }
    }

    pub fn get(&self, role: &str) -> Option<&Role> {
        self.roles.get(&role.trim().to_ascii_lowercase())
    }

    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.values()
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Overlays remotely fetched roles onto the catalog.
    ///
    /// A remote role replaces the permission list of the role with the same
    /// id. Permissions outside the default table are dropped, and the two
    /// built-in admin roles are never replaced. Returns the number of roles
    /// taken from `remote`.
    pub fn merge(&mut self, remote: impl IntoIterator<Item = Role>) -> usize {
        let mut merged = 0;
        for mut role in remote {
            if is_admin_role(&role.id) {
                warn!(role = %role.id, "ignoring remote override of built-in admin role");
                continue;
            }
            let before = role.permissions.len();
            role.permissions.retain(|p| is_default_permission(p.key()));
            let dropped = before - role.permissions.len();
            if dropped > 0 {
                warn!(role = %role.id, dropped, "dropped permissions outside the default table");
            }
            role.permissions = role
                .permissions
                .into_iter()
                .filter_map(|p| default_permission(p.key()).cloned())
                .collect();
            debug!(role = %role.id, permissions = role.permissions.len(), "merged remote role");
            self.roles.insert(role.id.to_ascii_lowercase(), role);
            merged += 1;
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_role_is_a_subset_of_the_default_table() {
        for role in default_roles() {
            for permission in &role.permissions {
                assert!(
                    is_default_permission(permission.key()),
                    "{} grants unknown {}",
                    role.id,
                    permission.id
                );
            }
        }
    }

    #[test]
    fn admin_roles_hold_every_default_permission() {
        let catalog = RoleCatalog::defaults();
        for role in [ADMIN_ROLE, SUPER_ADMIN_ROLE] {
            let role = catalog.get(role).unwrap();
            assert_eq!(role.permissions.len(), default_permissions().len());
        }
    }

    #[test]
    fn every_user_type_has_a_default_role() {
        let catalog = RoleCatalog::defaults();
        for user_type in UserType::ALL {
            assert!(catalog.get(user_type.default_role()).is_some(), "{user_type}");
        }
    }

    #[test]
    fn permission_ids_follow_resource_action() {
        let perm = default_permission(PermissionKey::new(Resource::AuditLogs, Action::Export)).unwrap();
        assert_eq!(perm.id, "audit_logs:export");
        assert_eq!(PermissionKey::parse("audit_logs:export"), Some(perm.key()));
        assert_eq!(PermissionKey::parse("audit_logs"), None);
        assert_eq!(PermissionKey::parse("ledger:read"), None);
    }

    #[test]
    fn user_type_parsing_accepts_role_spelling() {
        assert_eq!(UserType::parse("finance_admin"), Some(UserType::FinanceAdmin));
        assert_eq!(UserType::parse("Finance-Admin"), Some(UserType::FinanceAdmin));
        assert_eq!(UserType::parse(" EMPLOYEE "), Some(UserType::Employee));
        assert_eq!(UserType::parse("super_admin"), None);
        let parsed: UserType = serde_json::from_str("\"accountant\"").unwrap();
        assert_eq!(parsed, UserType::Accountant);
        assert_eq!(serde_json::to_string(&UserType::FinanceAdmin).unwrap(), "\"FINANCE_ADMIN\"");
    }

    #[test]
    fn merge_replaces_curated_roles_and_filters_unknown_permissions() {
        let mut catalog = RoleCatalog::defaults();
        let remote = Role {
            id: "Employee".into(),
            name: "Employee".into(),
            description: "remote".into(),
            permissions: vec![
                Permission::new(Resource::Reports, Action::Read, "remote copy"),
                Permission::new(Resource::Dashboard, Action::Delete, "not in defaults"),
            ],
        };
        assert_eq!(catalog.merge([remote]), 1);
        let employee = catalog.get("employee").unwrap();
        assert_eq!(employee.permissions.len(), 1);
        assert!(employee.grants(PermissionKey::new(Resource::Reports, Action::Read)));
        assert_eq!(employee.permissions[0].description, "View reports");
    }

    #[test]
    fn merge_never_touches_admin_roles() {
        let mut catalog = RoleCatalog::defaults();
        let hollow = Role {
            id: "super_admin".into(),
            name: "Super Admin".into(),
            description: String::new(),
            permissions: Vec::new(),
        };
        assert_eq!(catalog.merge([hollow]), 0);
        assert_eq!(
            catalog.get(SUPER_ADMIN_ROLE).unwrap().permissions.len(),
            default_permissions().len()
        );
    }
}
