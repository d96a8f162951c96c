use platform_authz::{Action, ComponentId, Resource, RouteRequirement};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
    pub path: &'static str,
    pub title: &'static str,
    pub component: ComponentId,
    pub requirement: RouteRequirement,
    pub in_menu: bool,
}

impl Page {
    fn new(
        path: &'static str,
        title: &'static str,
        component: ComponentId,
        requirement: RouteRequirement,
    ) -> Self {
        Self {
            path,
            title,
            component,
            requirement,
            in_menu: true,
        }
    }

    fn hidden(mut self) -> Self {
        self.in_menu = false;
        self
    }
}

fn can(resource: Resource, action: Action) -> RouteRequirement {
    RouteRequirement::permission(resource, action)
}

/// Sections whose requirement applies to every page below them.
pub(crate) fn sections() -> Vec<(&'static str, RouteRequirement)> {
    vec![("/admin", RouteRequirement::Admin)]
}

pub(crate) fn pages() -> Vec<Page> {
    use Action::*;
    use ComponentId as C;
    use Resource::*;

    vec![
        Page::new("/", "Dashboard", C::Dashboard, can(Dashboard, Read)),
        Page::new("/revenues", "Revenue", C::RevenueList, can(Revenues, Read)),
        Page::new("/revenues/new", "Record revenue", C::RevenueForm, can(Revenues, Create)).hidden(),
        Page::new("/revenues/:id", "Revenue entry", C::RevenueList, can(Revenues, Read)).hidden(),
        Page::new("/revenues/:id/edit", "Edit revenue", C::RevenueForm, can(Revenues, Update))
            .hidden(),
        Page::new("/expenses", "Expenses", C::ExpenseList, can(Expenses, Read)),
        Page::new("/expenses/new", "Submit expense", C::ExpenseForm, can(Expenses, Create)).hidden(),
        Page::new("/expenses/:id", "Expense", C::ExpenseList, can(Expenses, Read)).hidden(),
        Page::new("/expenses/:id/edit", "Edit expense", C::ExpenseForm, can(Expenses, Update))
            .hidden(),
        Page::new("/approvals", "Approvals", C::ApprovalQueue, can(Approvals, Read)),
        Page::new("/departments", "Departments", C::DepartmentList, can(Departments, Read)),
        Page::new("/projects", "Projects", C::ProjectList, can(Projects, Read)),
        Page::new("/reports", "Reports", C::Reports, can(Reports, Read)),
        Page::new("/notifications", "Notifications", C::Notifications, can(Notifications, Read)),
        Page::new("/users", "Users", C::UserList, can(Users, Read)),
        Page::new("/audit-logs", "Audit logs", C::AuditLogs, can(AuditLogs, Read)),
        Page::new("/settings", "Settings", C::Settings, can(Settings, Read)),
        Page::new("/profile", "Profile", C::Profile, RouteRequirement::Authenticated).hidden(),
        Page::new("/admin", "Administration", C::AdminList, RouteRequirement::Authenticated),
        Page::new("/admin/roles", "Roles", C::RoleManagement, can(Roles, Read)),
        Page::new("/admin/backups", "Backups", C::Backups, can(Backups, Read)),
    ]
}
