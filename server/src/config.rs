use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use platform_authn::{AuthConfig, DEFAULT_SESSION_TTL_MINUTES, MAX_SESSION_TTL_MINUTES};
use platform_backend::{BackendConfig, DEFAULT_TIMEOUT};

const MIN_SECRET_BYTES: usize = 32;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub auth: AuthConfig,
    pub backend: Option<BackendConfig>,
    pub cors_allowed_origins: Vec<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let secret = lookup("AUTH_SECRET_BASE64").context("AUTH_SECRET_BASE64 missing")?;
        let secret_bytes = STANDARD
            .decode(secret.trim())
            .context("invalid AUTH_SECRET_BASE64")?;
        if secret_bytes.len() < MIN_SECRET_BYTES {
            return Err(anyhow!(
                "AUTH_SECRET_BASE64 must decode to at least {MIN_SECRET_BYTES} bytes"
            ));
        }

        let session_ttl_minutes = match lookup("SESSION_TTL_MINUTES") {
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .with_context(|| format!("invalid SESSION_TTL_MINUTES {raw:?}"))?,
            None => DEFAULT_SESSION_TTL_MINUTES,
        };
        if !(1..=MAX_SESSION_TTL_MINUTES).contains(&session_ttl_minutes) {
            return Err(anyhow!(
                "SESSION_TTL_MINUTES must be between 1 and {MAX_SESSION_TTL_MINUTES}"
            ));
        }

        let cors_allowed_origins = lookup("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|| "http://localhost:3000".into())
            .split(',')
            .filter_map(|s| {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            })
            .collect::<Vec<_>>();

        Ok(Self {
            auth: AuthConfig::new(secret_bytes, session_ttl_minutes),
            backend: backend_from_lookup(&lookup)?,
            cors_allowed_origins,
        })
    }
}

pub fn backend_from_env() -> Result<Option<BackendConfig>> {
    backend_from_lookup(&|key: &str| std::env::var(key).ok())
}

fn backend_from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Option<BackendConfig>> {
    let Some(base_url) = lookup("BACKEND_URL").filter(|url| !url.trim().is_empty()) else {
        return Ok(None);
    };
    let timeout = match lookup("BACKEND_TIMEOUT_SECS") {
        Some(raw) => Duration::from_secs(
            raw.trim()
                .parse()
                .with_context(|| format!("invalid BACKEND_TIMEOUT_SECS {raw:?}"))?,
        ),
        None => DEFAULT_TIMEOUT,
    };
    Ok(Some(BackendConfig {
        base_url: base_url.trim().to_string(),
        timeout,
    }))
}
