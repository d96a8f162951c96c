//! Role and permission lookups that prefer the backend and fall back to the
//! built-in tables.

use platform_authz::{
    Action, Permission, PermissionKey, Resource, Role, RoleCatalog, default_permission,
    default_permissions, is_admin_role,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::client::{ApiClient, BackendError};

/// Permission as the backend sends it; resource and action are free text.
#[derive(Debug, Clone, Deserialize)]
pub struct RemotePermission {
    #[serde(default)]
    pub id: Option<String>,
    pub resource: String,
    pub action: String,
}

impl RemotePermission {
    fn key(&self) -> Option<PermissionKey> {
        Some(PermissionKey::new(
            Resource::parse(&self.resource)?,
            Action::parse(&self.action)?,
        ))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteRole {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<RemotePermission>,
}

impl RemoteRole {
    fn into_role(self) -> Role {
        let permissions = known_permissions(&self.id, self.permissions);
        Role {
            name: self.name.unwrap_or_else(|| self.id.clone()),
            description: self.description.unwrap_or_default(),
            id: self.id,
            permissions,
        }
    }
}

/// Keeps only the remote permissions present in the default table.
fn known_permissions(scope: &str, remote: Vec<RemotePermission>) -> Vec<Permission> {
    let mut known = Vec::with_capacity(remote.len());
    for permission in remote {
        match permission.key().and_then(default_permission) {
            Some(found) if !known.contains(found) => known.push(found.clone()),
            Some(_) => {}
            None => warn!(
                scope,
                resource = %permission.resource,
                action = %permission.action,
                "ignoring permission outside the default table"
            ),
        }
    }
    known
}

#[derive(Serialize)]
struct AssignRoleRequest<'a> {
    role: &'a str,
}

#[derive(Clone, Debug, Default)]
pub struct RoleService {
    client: Option<ApiClient>,
}

impl RoleService {
    pub fn new(client: Option<ApiClient>) -> Self {
        Self { client }
    }

    fn client(&self) -> Result<&ApiClient, BackendError> {
        self.client.as_ref().ok_or(BackendError::NotConfigured)
    }

    pub async fn fetch_roles(&self) -> Result<Vec<Role>, BackendError> {
        let remote: Vec<RemoteRole> = self.client()?.get_json(&["roles"]).await?;
        Ok(remote.into_iter().map(RemoteRole::into_role).collect())
    }

    /// Default roles overlaid with whatever the backend reports.
    #[instrument(name = "roles.catalog", skip(self))]
    pub async fn catalog(&self) -> RoleCatalog {
        let mut catalog = RoleCatalog::defaults();
        match self.fetch_roles().await {
            Ok(remote) => {
                let merged = catalog.merge(remote);
                info!(merged, "loaded remote role assignments");
            }
            Err(BackendError::NotConfigured) => {}
            Err(err) => warn!(error = %err, "using default roles"),
        }
        catalog
    }

    pub async fn list_roles(&self) -> Vec<Role> {
        self.catalog().await.roles().cloned().collect()
    }

    /// Permissions of one role, resolved the way [`RoleCatalog::merge`] does:
    /// the backend's list replaces the default one, except for the built-in
    /// admin roles which always keep the full default table.
    #[instrument(name = "roles.permissions", skip(self))]
    pub async fn role_permissions(&self, role: &str) -> Vec<Permission> {
        let defaults = || {
            RoleCatalog::defaults()
                .get(role)
                .map(|r| r.permissions.clone())
                .unwrap_or_default()
        };
        if is_admin_role(role) {
            return defaults();
        }
        let fetched = match self.client() {
            Ok(client) => client
                .get_json::<Vec<RemotePermission>>(&["roles", role, "permissions"])
                .await
                .map(|remote| known_permissions(role, remote)),
            Err(err) => Err(err),
        };
        match fetched {
            Ok(permissions) => permissions,
            Err(err) => {
                if !matches!(err, BackendError::NotConfigured) {
                    warn!(error = %err, "using default permissions for role");
                }
                defaults()
            }
        }
    }

    /// Reassigns a user's role. The backend's answer is trusted as is.
    #[instrument(name = "roles.assign", skip(self))]
    pub async fn assign_role(&self, user_id: Uuid, role: &str) -> Result<(), BackendError> {
        let user_id_segment = user_id.to_string();
        let _: Value = self
            .client()?
            .post_json(&["users", user_id_segment.as_str(), "roles"], &AssignRoleRequest { role })
            .await?;
        info!(%user_id, role, "role assigned");
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct PermissionService {
    client: Option<ApiClient>,
}

impl PermissionService {
    pub fn new(client: Option<ApiClient>) -> Self {
        Self { client }
    }

    #[instrument(name = "permissions.list", skip(self))]
    pub async fn list_permissions(&self) -> Vec<Permission> {
        let Some(client) = &self.client else {
            return default_permissions().to_vec();
        };
        match client.get_json::<Vec<RemotePermission>>(&["permissions"]).await {
            Ok(remote) => known_permissions("permissions", remote),
            Err(err) => {
                warn!(error = %err, "using default permission table");
                default_permissions().to_vec()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use platform_authz::{ADMIN_ROLE, default_roles};
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, header, method, path},
    };

    use super::*;
    use crate::client::BackendConfig;

    fn client_for(server: &MockServer) -> ApiClient {
        ApiClient::new(&BackendConfig::new(server.uri())).unwrap()
    }

    #[tokio::test]
    async fn unconfigured_services_serve_defaults() {
        let roles = RoleService::default();
        assert_eq!(roles.list_roles().await.len(), default_roles().len());
        assert_eq!(
            roles.role_permissions("auditor").await,
            RoleCatalog::defaults().get("auditor").unwrap().permissions
        );
        assert!(roles.role_permissions("contractor").await.is_empty());
        assert!(matches!(
            roles.assign_role(Uuid::new_v4(), "auditor").await,
            Err(BackendError::NotConfigured)
        ));
        let permissions = PermissionService::default().list_permissions().await;
        assert_eq!(permissions, default_permissions());
    }

    #[tokio::test]
    async fn remote_roles_are_merged_over_defaults() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/roles"))
            .and(header("authorization", "Bearer session-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "id": "employee",
                    "name": "Staff",
                    "permissions": [
                        {"resource": "reports", "action": "read"},
                        {"resource": "ledger", "action": "read"},
                        {"resource": "dashboard", "action": "delete"}
                    ]
                },
                {"id": "admin", "permissions": []}
            ])))
            .mount(&server)
            .await;

        let service = RoleService::new(Some(client_for(&server).with_token("session-token")));
        let catalog = service.catalog().await;
        let employee = catalog.get("employee").unwrap();
        assert_eq!(employee.name, "Staff");
        assert_eq!(employee.permissions.len(), 1);
        assert_eq!(employee.permissions[0].id, "reports:read");
        assert_eq!(
            catalog.get(ADMIN_ROLE).unwrap().permissions.len(),
            default_permissions().len()
        );
    }

    #[tokio::test]
    async fn backend_failures_fall_back_to_defaults() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({"detail": "maintenance"})))
            .mount(&server)
            .await;

        let service = RoleService::new(Some(client_for(&server)));
        assert_eq!(service.list_roles().await.len(), default_roles().len());
        let manager = service.role_permissions("manager").await;
        assert!(manager.iter().any(|p| p.id == "approvals:approve"));

        let err = service.fetch_roles().await.unwrap_err();
        assert_eq!(err.user_message(), "maintenance");

        let permissions = PermissionService::new(Some(client_for(&server)))
            .list_permissions()
            .await;
        assert_eq!(permissions.len(), default_permissions().len());
    }

    #[tokio::test]
    async fn role_permissions_come_from_the_backend_when_available() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/roles/auditor/permissions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "1", "resource": "audit_logs", "action": "read"},
                {"id": "2", "resource": "audit_logs", "action": "read"}
            ])))
            .mount(&server)
            .await;

        let permissions = RoleService::new(Some(client_for(&server)))
            .role_permissions("auditor")
            .await;
        assert_eq!(permissions.len(), 1);
        assert_eq!(permissions[0].id, "audit_logs:read");
    }

    #[tokio::test]
    async fn role_names_stay_inside_their_path_segment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let service = RoleService::new(Some(client_for(&server).with_token("session-token")));
        for role in ["../users/42", "auditor?x=1", "a/b"] {
            assert!(service.role_permissions(role).await.is_empty());
        }
        assert!(service.role_permissions("..").await.is_empty());

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 3);
        for request in &requests {
            let segments: Vec<_> = request.url.path_segments().unwrap().collect();
            assert_eq!(segments.len(), 3, "{}", request.url);
            assert_eq!(segments[0], "roles");
            assert_eq!(segments[2], "permissions");
            assert_eq!(request.url.query(), None);
        }
    }

    #[tokio::test]
    async fn admin_role_permissions_ignore_the_backend() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&server)
            .await;

        let service = RoleService::new(Some(client_for(&server)));
        for role in [ADMIN_ROLE, "super_admin", "Admin"] {
            assert_eq!(service.role_permissions(role).await.len(), default_permissions().len());
        }
    }

    #[tokio::test]
    async fn assign_role_posts_and_surfaces_detail() {
        let server = MockServer::start().await;
        let user_id = Uuid::new_v4();
        Mock::given(method("POST"))
            .and(path(format!("/users/{user_id}/roles")))
            .and(body_json(json!({"role": "auditor"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/users/{user_id}/roles")))
            .and(body_json(json!({"role": "owner"})))
            .respond_with(
                ResponseTemplate::new(422).set_body_json(json!({"detail": [{"msg": "unknown role"}]})),
            )
            .mount(&server)
            .await;

        let service = RoleService::new(Some(client_for(&server)));
        service.assign_role(user_id, "auditor").await.unwrap();
        let err = service.assign_role(user_id, "owner").await.unwrap_err();
        assert!(matches!(err, BackendError::Http { .. }));
        assert_eq!(err.user_message(), "unknown role");
    }

    #[tokio::test]
    async fn remote_permission_table_is_filtered() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/permissions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"resource": "revenues", "action": "approve"},
                {"resource": "payroll", "action": "read"}
            ])))
            .mount(&server)
            .await;

        let permissions = PermissionService::new(Some(client_for(&server)))
            .list_permissions()
            .await;
        assert_eq!(permissions.len(), 1);
        assert_eq!(permissions[0].description, "Approve revenue entries");
    }
}
