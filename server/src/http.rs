use std::{
    collections::BTreeMap,
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use anyhow::Context;
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, State},
    http::{HeaderName, HeaderValue, Method, StatusCode, header, request::Parts},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use once_cell::sync::OnceCell;
use platform_api::{ApiError, ApiResult};
use platform_authn::{AuthConfig, authenticate, bearer_token};
use platform_authz::{
    AccessSnapshot, Action, Authorization, Authorizer, ComponentId, Navigator, Permission,
    ProtectedRoute, Resource, Role, RoleCatalog, RouteOutcome, UNAUTHORIZED_PATH,
};
use platform_backend::{ApiClient, PermissionService, RoleService};
use products_finance::{NavItem, Page, RouteTree};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{config::AppConfig, graphql::SchemaType};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub schema: SchemaType,
    pub routes: Arc<RouteTree>,
    pub catalog: Arc<RwLock<RoleCatalog>>,
    pub backend: Option<ApiClient>,
}

impl AppState {
    fn auth(&self) -> &AuthConfig {
        &self.config.auth
    }

    /// Backend client acting on behalf of the caller.
    fn backend_for(&self, session: &Session) -> Option<ApiClient> {
        let client = self.backend.as_ref()?;
        Some(match &session.token {
            Some(token) => client.with_token(token.clone()),
            None => client.clone(),
        })
    }

    pub async fn reload_catalog(&self) -> usize {
        let catalog = RoleService::new(self.backend.clone()).catalog().await;
        let count = catalog.len();
        *self.catalog.write().await = catalog;
        count
    }
}

#[derive(Clone, Debug)]
pub struct ServeConfig {
    addr: SocketAddr,
}

impl ServeConfig {
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self {
            addr: SocketAddr::from((host, port)),
        }
    }
}

pub async fn serve(config: ServeConfig, state: AppState) -> anyhow::Result<()> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;

    info!(%config.addr, "finadmin listening");
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;
    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();
    let allow_origin = if allowed.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(allowed)
    };
    CorsLayer::new()
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_methods([Method::POST, Method::GET])
        .allow_origin(allow_origin)
}

pub fn build_router(state: AppState) -> Router {
    let request_id = MakeRequestUuid;
    let header_name = HeaderName::from_static("x-request-id");
    Router::new()
        .route("/health", get(health_handler))
        .route(UNAUTHORIZED_PATH, get(unauthorized_handler))
        .route("/app", get(root_page_handler))
        .route("/app/{*path}", get(page_handler))
        .route("/api/me/access", get(access_handler))
        .route("/api/navigation", get(navigation_handler))
        .route("/api/access/{component}", get(component_access_handler))
        .route("/api/roles", get(roles_handler))
        .route("/api/roles/refresh", post(refresh_roles_handler))
        .route("/api/roles/{role}/permissions", get(role_permissions_handler))
        .route("/api/permissions", get(permissions_handler))
        .route("/api/users/{user_id}/roles", post(assign_role_handler))
        .route("/graphql", post(graphql_handler))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(header_name.clone(), request_id))
                .layer(PropagateRequestIdLayer::new(header_name))
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&state.config.cors_allowed_origins)),
        )
        .with_state(state)
}

/// Caller identity and derived access predicates.
pub struct Session {
    pub token: Option<String>,
    pub access: Authorizer,
}

impl FromRequestParts<AppState> for Session {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .map(|value| value.to_str())
            .transpose()
            .map_err(|_| ApiError::Unauthenticated)?;
        let user = authenticate(header, state.auth())?;
        let token = header
            .and_then(|value| bearer_token(value).ok())
            .map(str::to_owned);
        let access = Authorizer::new(user, &*state.catalog.read().await);
        Ok(Session { token, access })
    }
}

/// Captures the redirect a [`ProtectedRoute`] asks for.
#[derive(Default)]
struct RedirectNavigator {
    target: OnceCell<String>,
}

impl Navigator for RedirectNavigator {
    fn navigate(&self, path: &str) {
        let _ = self.target.set(path.to_string());
    }
}

#[derive(Serialize)]
struct PageView<'a> {
    page: &'a Page,
    params: BTreeMap<String, String>,
    navigation: Vec<NavItem>,
}

async fn root_page_handler(State(state): State<AppState>, session: Session) -> Response {
    render_page(&state, &session, "/")
}

async fn page_handler(
    State(state): State<AppState>,
    session: Session,
    Path(path): Path<String>,
) -> Response {
    render_page(&state, &session, &format!("/{path}"))
}

fn render_page(state: &AppState, session: &Session, path: &str) -> Response {
    let Some(route) = state.routes.resolve(path) else {
        return ApiError::NotFound.into_response();
    };
    let guard: ProtectedRoute<()> = ProtectedRoute::new(route.requirement.clone());
    let navigator = RedirectNavigator::default();
    match guard.check(&session.access, &navigator) {
        RouteOutcome::Render => Json(PageView {
            page: route.page,
            params: route.params,
            navigation: state.routes.navigation(&session.access),
        })
        .into_response(),
        RouteOutcome::Fallback(_) | RouteOutcome::Redirect(_) => {
            let target = navigator
                .target
                .get()
                .map(String::as_str)
                .unwrap_or(UNAUTHORIZED_PATH);
            debug!(path, target, "page denied");
            Redirect::to(target).into_response()
        }
    }
}

#[derive(Serialize)]
struct UnauthorizedBody {
    code: &'static str,
    detail: &'static str,
}

async fn unauthorized_handler() -> impl IntoResponse {
    (
        StatusCode::FORBIDDEN,
        Json(UnauthorizedBody {
            code: "FORBIDDEN",
            detail: "you do not have access to this page",
        }),
    )
}

async fn access_handler(session: Session) -> Json<AccessSnapshot> {
    Json(session.access.snapshot())
}

async fn navigation_handler(State(state): State<AppState>, session: Session) -> Json<Vec<NavItem>> {
    Json(state.routes.navigation(&session.access))
}

#[derive(Serialize)]
struct ComponentAccess {
    component: ComponentId,
    allowed: bool,
}

async fn component_access_handler(
    session: Session,
    Path(component): Path<String>,
) -> ApiResult<Json<ComponentAccess>> {
    let component = ComponentId::parse(&component)
        .ok_or_else(|| ApiError::InvalidInput(format!("unknown component {component}")))?;
    Ok(Json(ComponentAccess {
        component,
        allowed: session.access.can_access(component),
    }))
}

async fn roles_handler(State(state): State<AppState>, session: Session) -> ApiResult<Json<Vec<Role>>> {
    session.access.require(Resource::Roles, Action::Read)?;
    let catalog = state.catalog.read().await;
    Ok(Json(catalog.roles().cloned().collect()))
}

#[derive(Serialize)]
struct RefreshResult {
    roles: usize,
}

async fn refresh_roles_handler(
    State(state): State<AppState>,
    session: Session,
) -> ApiResult<Json<RefreshResult>> {
    session.access.require(Resource::Roles, Action::Manage)?;
    let roles = state.reload_catalog().await;
    info!(roles, "role catalog reloaded");
    Ok(Json(RefreshResult { roles }))
}

async fn role_permissions_handler(
    State(state): State<AppState>,
    session: Session,
    Path(role): Path<String>,
) -> ApiResult<Json<Vec<Permission>>> {
    session.access.require(Resource::Roles, Action::Read)?;
    let Some(role) = state.catalog.read().await.get(&role).map(|r| r.id.clone()) else {
        return Err(ApiError::NotFound);
    };
    let service = RoleService::new(state.backend_for(&session));
    Ok(Json(service.role_permissions(&role).await))
}

async fn permissions_handler(
    State(state): State<AppState>,
    session: Session,
) -> ApiResult<Json<Vec<Permission>>> {
    session.access.require(Resource::Roles, Action::Read)?;
    let service = PermissionService::new(state.backend_for(&session));
    Ok(Json(service.list_permissions().await))
}

#[derive(Deserialize)]
struct AssignRoleBody {
    role: String,
}

async fn assign_role_handler(
    State(state): State<AppState>,
    session: Session,
    Path(user_id): Path<Uuid>,
    Json(body): Json<AssignRoleBody>,
) -> ApiResult<StatusCode> {
    session.access.require(Resource::Users, Action::Manage)?;
    let role = body.role.trim();
    if state.catalog.read().await.get(role).is_none() {
        return Err(ApiError::InvalidInput(format!("unknown role {role}")));
    }
    RoleService::new(state.backend_for(&session))
        .assign_role(user_id, role)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn graphql_handler(
    State(state): State<AppState>,
    session: Session,
    request: GraphQLRequest,
) -> GraphQLResponse {
    let request = request.into_inner().data(session.access);
    state.schema.execute(request).await.into()
}

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    backend_configured: bool,
    version: &'static str,
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        ok: true,
        backend_configured: state.backend.is_some(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install CTRL+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    ctrl_c.await;

    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphql::build_schema;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use platform_authn::issue_token;
    use platform_authz::{CurrentUser, UserType};
    use platform_backend::BackendConfig;
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    fn config(backend: Option<BackendConfig>) -> AppConfig {
        AppConfig {
            auth: AuthConfig::new(b"0123456789abcdef0123456789abcdef".to_vec(), 30),
            backend,
            cors_allowed_origins: vec!["http://localhost:3000".into()],
        }
    }

    fn state_with(backend: Option<BackendConfig>) -> AppState {
        let routes = Arc::new(RouteTree::finance());
        let client = backend
            .as_ref()
            .map(|cfg| ApiClient::new(cfg).unwrap());
        AppState {
            config: Arc::new(config(backend)),
            schema: build_schema(routes.clone()),
            routes,
            catalog: Arc::new(RwLock::new(RoleCatalog::defaults())),
            backend: client,
        }
    }

    fn token(state: &AppState, user_type: UserType, roles: &[&str]) -> String {
        let user = CurrentUser {
            id: Uuid::new_v4(),
            email: "user@finadmin.test".into(),
            name: None,
            user_type: Some(user_type),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        };
        issue_token(&user, state.auth()).unwrap()
    }

    fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_backend_configuration() {
        let app = build_router(state_with(None));
        let response = app.oneshot(get("/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["ok"], json!(true));
        assert_eq!(body["backend_configured"], json!(false));
    }

    #[tokio::test]
    async fn allowed_pages_render_with_navigation() {
        let state = state_with(None);
        let token = token(&state, UserType::Accountant, &[]);
        let app = build_router(state);
        let response = app
            .oneshot(get("/app/revenues/17/edit", Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["page"]["path"], json!("/revenues/:id/edit"));
        assert_eq!(body["params"], json!({"id": "17"}));
        assert!(body["navigation"].as_array().unwrap().iter().any(|i| i["path"] == "/revenues"));
    }

    #[tokio::test]
    async fn denied_pages_redirect_to_unauthorized() {
        let state = state_with(None);
        let token = token(&state, UserType::Employee, &[]);
        let app = build_router(state);
        let response = app
            .clone()
            .oneshot(get("/app/admin/backups", Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], UNAUTHORIZED_PATH);

        let anonymous = app.clone().oneshot(get("/app", None)).await.unwrap();
        assert_eq!(anonymous.status(), StatusCode::SEE_OTHER);

        let landing = app.oneshot(get(UNAUTHORIZED_PATH, None)).await.unwrap();
        assert_eq!(landing.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn unknown_pages_are_not_found() {
        let state = state_with(None);
        let token = token(&state, UserType::Admin, &[]);
        let response = build_router(state)
            .oneshot(get("/app/payroll", Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_tokens_are_rejected() {
        let response = build_router(state_with(None))
            .oneshot(get("/api/me/access", Some("not-a-jwt")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["code"], json!("UNAUTHENTICATED"));
    }

    #[tokio::test]
    async fn access_snapshot_and_component_checks() {
        let state = state_with(None);
        let token = token(&state, UserType::Auditor, &[]);
        let app = build_router(state);

        let snapshot = json_body(
            app.clone()
                .oneshot(get("/api/me/access", Some(&token)))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(snapshot["user_type"], json!("AUDITOR"));
        assert!(snapshot["components"].as_array().unwrap().contains(&json!("AUDIT_LOGS")));

        let check = json_body(
            app.clone()
                .oneshot(get("/api/access/revenue-form", Some(&token)))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(check, json!({"component": "REVENUE_FORM", "allowed": false}));

        let bad = app.oneshot(get("/api/access/ledger", Some(&token))).await.unwrap();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn role_listing_requires_permission() {
        let state = state_with(None);
        let employee = token(&state, UserType::Employee, &[]);
        let admin = token(&state, UserType::Admin, &[]);
        let app = build_router(state);

        let denied = app.clone().oneshot(get("/api/roles", Some(&employee))).await.unwrap();
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);

        let anonymous = app.clone().oneshot(get("/api/roles", None)).await.unwrap();
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

        let listed = app.oneshot(get("/api/roles", Some(&admin))).await.unwrap();
        assert_eq!(listed.status(), StatusCode::OK);
        assert_eq!(json_body(listed).await.as_array().unwrap().len(), 7);
    }

    #[tokio::test]
    async fn refresh_merges_backend_roles() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/roles"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "employee", "permissions": [{"resource": "reports", "action": "read"}]}
            ])))
            .mount(&server)
            .await;
        let state = state_with(Some(BackendConfig::new(server.uri())));
        let admin = token(&state, UserType::Admin, &[]);
        let employee = token(&state, UserType::Employee, &[]);
        let app = build_router(state.clone());

        let refresh = Request::builder()
            .method("POST")
            .uri("/api/roles/refresh")
            .header(header::AUTHORIZATION, format!("Bearer {admin}"))
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(refresh).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({"roles": 7}));

        let snapshot = json_body(
            app.oneshot(get("/api/me/access", Some(&employee)))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(snapshot["permissions"], json!(["reports:read"]));
    }

    #[tokio::test]
    async fn assign_role_forwards_the_caller_token() {
        let server = MockServer::start().await;
        let user_id = Uuid::new_v4();
        Mock::given(method("POST"))
            .and(path(format!("/users/{user_id}/roles")))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        let state = state_with(Some(BackendConfig::new(server.uri())));
        let admin = token(&state, UserType::Admin, &[]);
        let app = build_router(state);

        let assign = |role: &str| {
            Request::builder()
                .method("POST")
                .uri(format!("/api/users/{user_id}/roles"))
                .header(header::AUTHORIZATION, format!("Bearer {admin}"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "role": role }).to_string()))
                .unwrap()
        };
        let ok = app.clone().oneshot(assign("auditor")).await.unwrap();
        assert_eq!(ok.status(), StatusCode::NO_CONTENT);
        let unknown = app.oneshot(assign("owner")).await.unwrap();
        assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(
            requests[0].headers.get("authorization").unwrap(),
            format!("Bearer {admin}").as_str()
        );
    }

    #[tokio::test]
    async fn role_permissions_only_serve_catalog_roles() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/roles/auditor/permissions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"resource": "audit_logs", "action": "read"}
            ])))
            .expect(1)
            .mount(&server)
            .await;
        let state = state_with(Some(BackendConfig::new(server.uri())));
        let admin = token(&state, UserType::Admin, &[]);
        let app = build_router(state);

        let known = app
            .clone()
            .oneshot(get("/api/roles/Auditor/permissions", Some(&admin)))
            .await
            .unwrap();
        assert_eq!(known.status(), StatusCode::OK);
        assert_eq!(json_body(known).await[0]["id"], json!("audit_logs:read"));

        for uri in [
            "/api/roles/..%2Fusers%2F42/permissions",
            "/api/roles/auditor%3Fx=1/permissions",
        ] {
            let response = app.clone().oneshot(get(uri, Some(&admin))).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        }
    }

    #[tokio::test]
    async fn graphql_sees_the_session() {
        let state = state_with(None);
        let token = token(&state, UserType::FinanceAdmin, &[]);
        let request = Request::builder()
            .method("POST")
            .uri("/graphql")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({"query": "{ me { userType } canAccess(component: \"SETTINGS\") }"}).to_string(),
            ))
            .unwrap();
        let response = build_router(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(
            body["data"],
            json!({"me": {"userType": "FINANCE_ADMIN"}, "canAccess": true})
        );
    }
}
