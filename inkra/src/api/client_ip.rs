use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::{Extensions, HeaderMap};
use inkra_core::access::resolve_client_ip;
use std::convert::Infallible;
use std::net::SocketAddr;

use super::AppState;

/// Address the request is attributed to, if one could be determined.
#[derive(Clone, Debug, Default)]
pub struct ClientIp(pub Option<String>);

impl ClientIp {
    pub fn resolve(headers: &HeaderMap, extensions: &Extensions, trust_proxy_headers: bool) -> Self {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
        let peer = extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Self(resolve_client_ip(
            header("x-forwarded-for"),
            header("x-real-ip"),
            peer,
            trust_proxy_headers,
        ))
    }
}

impl FromRequestParts<AppState> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self::resolve(
            &parts.headers,
            &parts.extensions,
            state.trust_proxy_headers,
        ))
    }
}
