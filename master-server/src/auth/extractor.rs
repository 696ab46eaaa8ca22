//! Request extractors
//!
//! [`CurrentUser`] and [`RequestContext`] straight from handler arguments.
//! Both prefer what [`super::require_auth`] already put into the request
//! extensions.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::Extensions;
use axum::http::request::Parts;
use http::HeaderMap;

use super::middleware::bearer_token;
use crate::AppError;
use crate::auth::CurrentUser;
use crate::core::{RequestContext, ServerState};

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Client IP: the peer address, or the first `X-Forwarded-For` entry when
/// proxy headers are trusted
pub(crate) fn client_ip(
    headers: &HeaderMap,
    extensions: &Extensions,
    trust_proxy_headers: bool,
) -> Option<String> {
    if trust_proxy_headers
        && let Some(forwarded) = headers.get("x-forwarded-for")
        && let Ok(val) = forwarded.to_str()
        && let Some(first) = val.split(',').next()
    {
        let ip = first.trim();
        if !ip.is_empty() {
            return Some(ip.to_owned());
        }
    }
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
}

/// Build the context of one request: id, client metadata and deadline
pub(crate) fn request_context(
    state: &ServerState,
    headers: &HeaderMap,
    extensions: &Extensions,
) -> RequestContext {
    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let user_agent = headers
        .get(http::header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .map(str::to_owned);

    RequestContext::new()
        .with_request_id(request_id)
        .with_client(
            client_ip(headers, extensions, state.config.trust_proxy_headers),
            user_agent,
        )
        .with_timeout(state.config.request_timeout())
}

impl FromRequestParts<ServerState> for RequestContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(ctx) = parts.extensions.get::<RequestContext>() {
            return Ok(ctx.clone());
        }
        let ctx = request_context(state, &parts.headers, &parts.extensions);
        parts.extensions.insert(ctx.clone());
        Ok(ctx)
    }
}

impl FromRequestParts<ServerState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        // Check if already extracted (from middleware)
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(user.clone());
        }

        let token = bearer_token(&parts.headers)?.to_owned();
        let ctx = RequestContext::from_request_parts(parts, state).await?;
        let user = state.sessions.validate_session(&ctx, &token).await?;
        parts.extensions.insert(user.clone());
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_ip_prefers_forwarded_header_behind_proxy() {
        let mut headers = HeaderMap::new();
        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 9], 4000))));
        assert_eq!(
            client_ip(&headers, &extensions, true).as_deref(),
            Some("192.168.1.9")
        );

        headers.insert("x-forwarded-for", "10.0.0.7, 172.16.0.1".parse().unwrap());
        assert_eq!(
            client_ip(&headers, &extensions, true).as_deref(),
            Some("10.0.0.7")
        );

        assert!(client_ip(&HeaderMap::new(), &Extensions::new(), true).is_none());
    }

    #[test]
    fn test_forwarded_header_ignored_without_trusted_proxy() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "10.0.0.7".parse().unwrap());
        let mut extensions = Extensions::new();
        assert!(client_ip(&headers, &extensions, false).is_none());

        extensions.insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 9], 4000))));
        assert_eq!(
            client_ip(&headers, &extensions, false).as_deref(),
            Some("192.168.1.9")
        );
    }
}
