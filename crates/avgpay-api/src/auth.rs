//! Bearer-secret authorization for enrichment and cron routes.

use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

/// Extractor that admits a request carrying one of the configured secrets.
///
/// With no secret configured, requests are admitted unless `APP_ENV` is
/// `production`.
///
/// ```ignore
/// async fn handler(_auth: RequireAuth, State(state): State<AppState>) -> ... {}
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RequireAuth;

#[axum::async_trait]
impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let secrets = state.config.secrets();
        if secrets.is_empty() {
            if state.config.is_production() {
                warn!(subsystem = "api", "No enrichment secret configured in production");
                return Err(ApiError::Unauthorized("Unauthorized".to_string()));
            }
            return Ok(RequireAuth);
        }

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim);

        match token {
            Some(token) if secrets.iter().any(|s| secrets_match(s, token)) => Ok(RequireAuth),
            _ => Err(ApiError::Unauthorized("Unauthorized".to_string())),
        }
    }
}

/// Comparison whose running time does not depend on where the inputs differ.
fn secrets_match(expected: &str, given: &str) -> bool {
    let (a, b) = (expected.as_bytes(), given.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secrets_match() {
        assert!(secrets_match("s3cret", "s3cret"));
        assert!(!secrets_match("s3cret", "s3creT"));
        assert!(!secrets_match("s3cret", "s3cret "));
        assert!(!secrets_match("s3cret", ""));
    }
}
