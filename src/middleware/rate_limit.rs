use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::net::{IpAddr, SocketAddr};

use crate::{
    errors::{AppError, Result},
    handlers::AppState,
    models::User,
};

/// Admission control per identity, falling back to the origin address for
/// unauthenticated routes. Runs after `require_auth` on protected routes so
/// the identity extension is already present.
pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response> {
    let key = match request.extensions().get::<User>() {
        Some(user) => format!("user:{}", user.id),
        None => format!("ip:{}", origin_address(&request)),
    };

    if !state.rate_limiter.admit(&key) {
        return Err(AppError::RateLimited);
    }

    Ok(next.run(request).await)
}

/// Proxy headers take precedence; a direct connection falls back to the
/// peer address so every unproxied origin still gets its own bucket.
fn origin_address(request: &Request) -> String {
    if let Some(ip) = forwarded_ip(request.headers()) {
        return ip;
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    // In order of preference; X-Forwarded-For may carry a chain, the first
    // entry is the client.
    let ip_headers = ["CF-Connecting-IP", "X-Real-IP", "X-Forwarded-For"];

    for header_name in &ip_headers {
        if let Some(value) = headers.get(*header_name).and_then(|v| v.to_str().ok()) {
            let candidate = value.split(',').next().unwrap_or(value).trim();
            if candidate.parse::<IpAddr>().is_ok() {
                return Some(candidate.to_string());
            }
        }
    }

    None
}
