//! Client identity resolution.
//!
//! The identity keys the rate limiter and is recorded in every log line.
//! Proxy headers are consulted in configured order; the first usable value
//! must be a public address. Otherwise the direct peer is used, and when
//! even that is unknown the `unknown` sentinel.

use crate::domain::config::SecurityConfig;
use crate::domain::types::ClientIdentity;
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderMap, Request},
    response::Response,
};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use tower::{Layer, Service};
use tracing::debug;

/// Client identity layer
///
/// Resolves the identity once per request and stores it as a request
/// extension for the handlers.
#[derive(Clone)]
pub struct ClientIdentityLayer {
    config: Arc<SecurityConfig>,
}

impl ClientIdentityLayer {
    pub fn new(config: SecurityConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl<S> Layer<S> for ClientIdentityLayer {
    type Service = ClientIdentityService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ClientIdentityService {
            inner,
            config: Arc::clone(&self.config),
        }
    }
}

/// Client identity service
#[derive(Clone)]
pub struct ClientIdentityService<S> {
    inner: S,
    config: Arc<SecurityConfig>,
}

impl<S> Service<Request<Body>> for ClientIdentityService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip());

        let client = resolve_client(req.headers(), peer, &self.config);
        req.extensions_mut().insert(client);

        let mut inner = self.inner.clone();
        Box::pin(async move { inner.call(req).await })
    }
}

/// Resolve the client identity for one request.
pub fn resolve_client(
    headers: &HeaderMap,
    peer: Option<IpAddr>,
    config: &SecurityConfig,
) -> ClientIdentity {
    if headers_trusted(peer, config) {
        for name in &config.client_ip_headers {
            let Some(value) = headers.get(name.as_str()).and_then(|v| v.to_str().ok()) else {
                continue;
            };

            // Proxies append; the originating client is first
            let candidate = value.split(',').next().unwrap_or("").trim();
            match candidate.parse::<IpAddr>() {
                Ok(ip) if is_public_ip(ip) => return ClientIdentity::from(ip),
                _ => debug!(header = %name, value = candidate, "Skipping unusable client address"),
            }
        }
    } else if config
        .client_ip_headers
        .iter()
        .any(|name| headers.contains_key(name.as_str()))
    {
        debug!(peer = ?peer, "Ignoring forwarded headers from untrusted peer");
    }

    peer.map(ClientIdentity::from)
        .unwrap_or_else(ClientIdentity::unknown)
}

/// Forwarded headers are honored from any peer when no proxies are
/// configured, otherwise only from the configured ones.
fn headers_trusted(peer: Option<IpAddr>, config: &SecurityConfig) -> bool {
    if config.trusted_proxies.is_empty() {
        return true;
    }
    peer.map(|ip| config.trusted_proxies.contains(&ip))
        .unwrap_or(false)
}

/// Not private and not reserved.
pub fn is_public_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_public_v4(v4),
            None => is_public_v6(v6),
        },
    }
}

fn is_public_v4(ip: Ipv4Addr) -> bool {
    let [first, ..] = ip.octets();
    !(ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_multicast()
        // 0.0.0.0/8 and 240.0.0.0/4
        || first == 0
        || first >= 240)
}

fn is_public_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    !(ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        // fc00::/7 unique local
        || (first & 0xfe00) == 0xfc00
        // fe80::/10 link local
        || (first & 0xffc0) == 0xfe80)
}
