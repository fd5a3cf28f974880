use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use realpress_core::{AppConfig, Environment};
use serde::Serialize;
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Newtype wrapping a request ID string, stored as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Access policy for the batch trigger.
#[derive(Clone)]
pub enum CronAuth {
    /// Development without a secret: the trigger is open.
    Open,
    /// Requests must carry `Authorization: Bearer <secret>`.
    Secret(Arc<str>),
    /// No secret outside development: the trigger is off.
    Disabled,
}

impl CronAuth {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        match (&config.cron_secret, config.env) {
            (Some(secret), _) => CronAuth::Secret(Arc::from(secret.as_str())),
            (None, Environment::Development) => {
                tracing::warn!(
                    "REALPRESS_CRON_SECRET not set; batch trigger is open in development"
                );
                CronAuth::Open
            }
            (None, _) => {
                tracing::warn!("REALPRESS_CRON_SECRET not set; batch trigger disabled");
                CronAuth::Disabled
            }
        }
    }

    fn allows(&self, token: Option<&str>) -> bool {
        match self {
            CronAuth::Open => true,
            CronAuth::Disabled => false,
            CronAuth::Secret(secret) => {
                token.is_some_and(|t| bool::from(t.as_bytes().ct_eq(secret.as_bytes())))
            }
        }
    }
}

impl std::fmt::Debug for CronAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CronAuth::Open => f.write_str("CronAuth::Open"),
            CronAuth::Secret(_) => f.write_str("CronAuth::Secret([redacted])"),
            CronAuth::Disabled => f.write_str("CronAuth::Disabled"),
        }
    }
}

#[derive(Debug, Serialize)]
struct MiddlewareErrorBody {
    error: MiddlewareError,
}

#[derive(Debug, Serialize)]
struct MiddlewareError {
    code: &'static str,
    message: &'static str,
}

/// Axum middleware that extracts or generates a request ID.
///
/// If the incoming request has an `x-request-id` header, that value is used.
/// Otherwise a new `UUIDv4` is generated. The ID is inserted into request
/// extensions as [`RequestId`] and echoed on the response.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;

    if let Ok(val) = HeaderValue::from_str(&id) {
        res.headers_mut().insert("x-request-id", val);
    }

    res
}

/// Middleware guarding the batch trigger with the cron secret.
pub async fn require_cron_secret(
    State(auth): State<CronAuth>,
    req: Request,
    next: Next,
) -> Response {
    let token = extract_bearer_token(req.headers().get(AUTHORIZATION));
    if auth.allows(token) {
        return next.run(req).await;
    }

    let message = if matches!(auth, CronAuth::Disabled) {
        "batch trigger is disabled"
    } else {
        "missing or invalid bearer token"
    };
    (
        StatusCode::UNAUTHORIZED,
        Json(MiddlewareErrorBody {
            error: MiddlewareError {
                code: "unauthorized",
                message,
            },
        }),
    )
        .into_response()
}

fn extract_bearer_token(value: Option<&HeaderValue>) -> Option<&str> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_bearer_token_accepts_valid_header() {
        let header = HeaderValue::from_static("Bearer test-token");
        assert_eq!(extract_bearer_token(Some(&header)), Some("test-token"));
    }

    #[test]
    fn extract_bearer_token_rejects_non_bearer_header() {
        let header = HeaderValue::from_static("Basic abc123");
        assert_eq!(extract_bearer_token(Some(&header)), None);
    }

    #[test]
    fn secret_must_match_exactly() {
        let auth = CronAuth::Secret(Arc::from("s3cret"));
        assert!(auth.allows(Some("s3cret")));
        assert!(!auth.allows(Some("s3cre")));
        assert!(!auth.allows(Some("s3cret-and-more")));
        assert!(!auth.allows(None));
    }

    #[test]
    fn disabled_trigger_rejects_everything() {
        assert!(!CronAuth::Disabled.allows(Some("anything")));
        assert!(CronAuth::Open.allows(None));
    }

    #[test]
    fn debug_never_prints_the_secret() {
        let auth = CronAuth::Secret(Arc::from("s3cret"));
        assert!(!format!("{auth:?}").contains("s3cret"));
    }
}
