use async_graphql::SimpleObject;
use platform_authz::{AccessSnapshot, Authorization, Authorizer};
use products_finance::NavItem;

#[derive(Clone, Debug, SimpleObject)]
pub struct MePayload {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub user_type: Option<String>,
    pub roles: Vec<String>,
    pub is_admin: bool,
}

impl MePayload {
    pub fn from_authorizer(auth: &Authorizer) -> Option<Self> {
        let user = auth.user()?;
        Some(Self {
            id: user.id.to_string(),
            email: user.email.clone(),
            name: user.name.clone(),
            user_type: user.user_type.map(|t| t.as_str().to_string()),
            roles: user.roles.clone(),
            is_admin: auth.is_admin(),
        })
    }
}

#[derive(Clone, Debug, SimpleObject)]
pub struct AccessPayload {
    pub authenticated: bool,
    pub is_admin: bool,
    pub permissions: Vec<String>,
    pub components: Vec<String>,
}

impl From<AccessSnapshot> for AccessPayload {
    fn from(snapshot: AccessSnapshot) -> Self {
        Self {
            authenticated: snapshot.authenticated,
            is_admin: snapshot.is_admin,
            permissions: snapshot.permissions,
            components: snapshot
                .components
                .into_iter()
                .map(|c| c.as_str().to_string())
                .collect(),
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
pub struct NavPayload {
    pub path: String,
    pub title: String,
    pub component: String,
}

impl From<NavItem> for NavPayload {
    fn from(item: NavItem) -> Self {
        Self {
            path: item.path.to_string(),
            title: item.title.to_string(),
            component: item.component.as_str().to_string(),
        }
    }
}
