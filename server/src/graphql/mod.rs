mod me;

use std::sync::Arc;

use async_graphql::{
    Context, EmptyMutation, EmptySubscription, ErrorExtensions, Object, Schema, SimpleObject,
};
use platform_api::ApiError;
use platform_authz::{Authorization, Authorizer, ComponentId, PermissionKey};
use products_finance::RouteTree;
use serde::Serialize;
use tracing::instrument;

pub use me::{AccessPayload, MePayload, NavPayload};

pub type SchemaType = Schema<QueryRoot, EmptyMutation, EmptySubscription>;

pub fn build_schema(routes: Arc<RouteTree>) -> SchemaType {
    Schema::build(QueryRoot, EmptyMutation, EmptySubscription)
        .data(routes)
        .finish()
}

#[derive(Default)]
pub struct QueryRoot;

fn authorizer<'a>(ctx: &Context<'a>) -> async_graphql::Result<&'a Authorizer> {
    ctx.data::<Authorizer>()
        .map_err(|_| ApiError::internal(anyhow::anyhow!("missing request authorizer")).extend())
}

#[Object]
impl QueryRoot {
    #[instrument(name = "graphql.health", skip_all)]
    async fn health(&self) -> HealthPayload {
        HealthPayload { ok: true }
    }

    #[instrument(name = "graphql.version", skip_all)]
    async fn version(&self) -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }

    /// The signed-in user, or null for anonymous requests.
    #[instrument(name = "graphql.me", skip_all)]
    async fn me(&self, ctx: &Context<'_>) -> async_graphql::Result<Option<MePayload>> {
        Ok(MePayload::from_authorizer(authorizer(ctx)?))
    }

    #[instrument(name = "graphql.access", skip_all)]
    async fn access(&self, ctx: &Context<'_>) -> async_graphql::Result<AccessPayload> {
        Ok(AccessPayload::from(authorizer(ctx)?.snapshot()))
    }

    #[instrument(name = "graphql.can_access", skip(self, ctx))]
    async fn can_access(&self, ctx: &Context<'_>, component: String) -> async_graphql::Result<bool> {
        let component = ComponentId::parse(&component).ok_or_else(|| {
            ApiError::InvalidInput(format!("unknown component {component}")).extend()
        })?;
        Ok(authorizer(ctx)?.can_access(component))
    }

    #[instrument(name = "graphql.has_permission", skip(self, ctx))]
    async fn has_permission(
        &self,
        ctx: &Context<'_>,
        permission: String,
    ) -> async_graphql::Result<bool> {
        let key = PermissionKey::parse(&permission).ok_or_else(|| {
            ApiError::InvalidInput(format!("unknown permission {permission}")).extend()
        })?;
        Ok(authorizer(ctx)?.has_permission(key.resource, key.action))
    }

    #[instrument(name = "graphql.navigation", skip_all)]
    async fn navigation(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<NavPayload>> {
        let routes = ctx.data::<Arc<RouteTree>>()?;
        let items = routes.navigation(authorizer(ctx)?);
        Ok(items.into_iter().map(NavPayload::from).collect())
    }
}

#[derive(Clone, Debug, SimpleObject, Serialize)]
pub struct HealthPayload {
    pub ok: bool,
}
