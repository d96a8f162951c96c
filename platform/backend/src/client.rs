use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend is not configured")]
    NotConfigured,
    #[error("invalid backend url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("invalid backend path segment {0:?}")]
    InvalidPath(String),
    #[error("backend returned {status}: {detail}")]
    Http { status: StatusCode, detail: String },
    #[error("backend request failed")]
    Transport(#[source] reqwest::Error),
    #[error("invalid backend response")]
    Decode(#[source] reqwest::Error),
}

impl BackendError {
    /// Message suitable for showing to the user who triggered the call.
    pub fn user_message(&self) -> String {
        match self {
            BackendError::Http { detail, .. } => detail.clone(),
            BackendError::NotConfigured | BackendError::InvalidUrl(_) => {
                "backend is not configured".into()
            }
            BackendError::InvalidPath(_) => "invalid backend request".into(),
            BackendError::Transport(_) => "backend unavailable".into(),
            BackendError::Decode(_) => "unexpected backend response".into(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl BackendConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Thin JSON client for the REST backend.
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let mut base_url = Url::parse(&config.base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(BackendError::InvalidUrl(
                url::ParseError::RelativeUrlWithCannotBeABaseBase,
            ));
        }
        base_url.set_query(None);
        base_url.set_fragment(None);
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(BackendError::Transport)?;
        Ok(Self {
            http,
            base_url,
            token: None,
        })
    }

    /// A copy of this client that authenticates as the given bearer token.
    pub fn with_token(&self, token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..self.clone()
        }
    }

    /// Appends `segments` to the base path, percent-encoding each one so a
    /// segment can never add path levels or a query.
    pub fn url(&self, segments: &[&str]) -> Result<Url, BackendError> {
        if let Some(bad) = segments
            .iter()
            .find(|segment| matches!(**segment, "" | "." | ".."))
        {
            return Err(BackendError::InvalidPath((*bad).to_string()));
        }
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| BackendError::InvalidPath(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    #[instrument(name = "backend.get", skip(self), err(Display))]
    pub async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, BackendError> {
        let request = self.authorize(self.http.get(self.url(segments)?));
        self.send(request).await
    }

    #[instrument(name = "backend.post", skip(self, body), err(Display))]
    pub async fn post_json<B, T>(&self, segments: &[&str], body: &B) -> Result<T, BackendError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.authorize(self.http.post(self.url(segments)?).json(body));
        self.send(request).await
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BackendError> {
        let response = request.send().await.map_err(BackendError::Transport)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = error_detail(status, &body);
            debug!(%status, %detail, "backend rejected request");
            return Err(BackendError::Http { status, detail });
        }
        if status == StatusCode::NO_CONTENT {
            return serde_json::from_value(Value::Null).map_err(|_| BackendError::Http {
                status,
                detail: "empty response".into(),
            });
        }
        response.json::<T>().await.map_err(BackendError::Decode)
    }
}

/// Picks the most specific message out of an error body: `detail` (a string
/// or a list of `{msg}` objects), then `message`, then `error`, then the
/// status reason.
pub fn error_detail(status: StatusCode, body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let from_body = parsed.as_ref().and_then(|value| {
        ["detail", "message", "error"]
            .into_iter()
            .find_map(|field| value.get(field).and_then(message_of))
    });
    from_body.unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    })
}

fn message_of(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        Value::Array(items) => items.iter().find_map(|item| {
            item.get("msg")
                .or_else(|| item.get("message"))
                .and_then(message_of)
                .or_else(|| message_of(item))
        }),
        Value::Object(_) => value.get("message").and_then(message_of),
        _ => None,
    }
}
