use std::sync::Arc;

use async_graphql::{Error, ErrorExtensions};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use platform_authn::AuthnError;
use platform_authz::AuthzError;
use platform_backend::BackendError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Shared result type for handlers and resolvers.
pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error, Clone)]
pub enum ApiError {
    #[error("unauthenticated")]
    Unauthenticated,
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("resource not found")]
    NotFound,
    #[error("bad request: {0}")]
    InvalidInput(String),
    #[error("backend error: {0}")]
    Upstream(String),
    #[error("internal server error")]
    Internal(Arc<anyhow::Error>),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated => "UNAUTHENTICATED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound => "NOT_FOUND",
            ApiError::InvalidInput(_) => "INVALID_INPUT",
            ApiError::Upstream(_) => "UPSTREAM",
            ApiError::Internal(_) => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn internal(err: anyhow::Error) -> Self {
        Self::Internal(Arc::new(err))
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        Self::internal(value)
    }
}

impl From<AuthzError> for ApiError {
    fn from(value: AuthzError) -> Self {
        match value {
            AuthzError::Unauthenticated => ApiError::Unauthenticated,
            denied @ AuthzError::Denied { .. } => ApiError::Forbidden(denied.to_string()),
        }
    }
}

impl From<AuthnError> for ApiError {
    fn from(value: AuthnError) -> Self {
        match value {
            AuthnError::Signing(_) | AuthnError::SessionTtl(_) => ApiError::internal(value.into()),
            _ => ApiError::Unauthenticated,
        }
    }
}

impl From<BackendError> for ApiError {
    fn from(value: BackendError) -> Self {
        ApiError::Upstream(value.user_message())
    }
}

impl ErrorExtensions for ApiError {
    fn extend(&self) -> Error {
        let mut err = Error::new(self.to_string());
        err = err.extend_with(|_err, e| {
            e.set("code", self.code());
        });
        if let ApiError::InvalidInput(_) = self {
            err = err.extend_with(|_err, e| {
                e.set("type", "BAD_REQUEST");
            });
        }
        err
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(source) = &self {
            error!(error = ?source, "request failed");
        }
        let body = ErrorBody {
            code: self.code(),
            detail: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Convert any error into a GraphQL error payload while hiding internals.
pub fn internal_error(err: impl Into<anyhow::Error>) -> Error {
    ApiError::internal(err.into()).extend()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_graphql::Value;
    use http_body_util::BodyExt;
    use serde_json::json;

    #[test]
    fn internal_errors_are_masked() {
        let err = internal_error(anyhow::anyhow!("boom"));
        assert_eq!(err.message, "internal server error");
        let extra = err.extensions.as_ref().and_then(|map| map.get("code"));
        let code = extra.cloned();
        assert_eq!(code, Some(Value::from("INTERNAL")));
    }

    #[test]
    fn denials_map_to_forbidden() {
        let err: ApiError = AuthzError::Denied {
            action: "read".into(),
            resource: "backups".into(),
        }
        .into();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.code(), "FORBIDDEN");
        let err: ApiError = AuthnError::MissingToken.into();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn responses_carry_code_and_detail() {
        let response = ApiError::InvalidInput("unknown component".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            body,
            json!({"code": "INVALID_INPUT", "detail": "bad request: unknown component"})
        );
    }
}
