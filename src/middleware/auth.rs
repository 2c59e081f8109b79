use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};

use crate::{
    errors::{AppError, Result},
    handlers::AppState,
};

/// Resolves the request's credential to an identity and stashes it in the
/// request extensions for downstream middleware and handlers. Every failure
/// mode (missing header, malformed header, unknown credential) collapses
/// into the same 401.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let credential = bearer_credential(request.headers()).ok_or(AppError::Unauthenticated)?;

    let user = state.resolver.resolve(&credential).await?;
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// Extracts the opaque credential string: `Authorization: Bearer <cred>`
/// preferred, bare `x-api-key` accepted for account keys.
fn bearer_credential(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        let mut parts = value.splitn(2, ' ');
        let scheme = parts.next()?;
        let credential = parts.next()?.trim();
        if scheme.eq_ignore_ascii_case("bearer") && !credential.is_empty() {
            return Some(credential.to_string());
        }
        return None;
    }

    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(name: &'static str, value: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(name, HeaderValue::from_str(value).unwrap());
        map
    }

    #[test]
    fn test_bearer_header() {
        let map = headers("authorization", "Bearer abc123");
        assert_eq!(bearer_credential(&map).as_deref(), Some("abc123"));
    }

    #[test]
    fn test_bearer_scheme_is_case_insensitive() {
        let map = headers("authorization", "bearer abc123");
        assert_eq!(bearer_credential(&map).as_deref(), Some("abc123"));
    }

    #[test]
    fn test_non_bearer_scheme_rejected() {
        let map = headers("authorization", "Basic abc123");
        assert_eq!(bearer_credential(&map), None);
    }

    #[test]
    fn test_x_api_key_fallback() {
        let map = headers("x-api-key", "fk_test1234567890123456789012345678");
        assert_eq!(
            bearer_credential(&map).as_deref(),
            Some("fk_test1234567890123456789012345678")
        );
    }

    #[test]
    fn test_missing_headers() {
        assert_eq!(bearer_credential(&HeaderMap::new()), None);
    }
}
