//! Client key extraction strategies.

use std::net::SocketAddr;

use axum::{body::Body, extract::ConnectInfo, http::Request};
use serde::{Deserialize, Serialize};

/// Derives the bucket key for a request.
///
/// Implementations must never fail: a request that cannot be attributed is
/// mapped onto a shared fallback key.
pub trait KeyExtractor: Send + Sync + 'static {
    fn extract_key(&self, request: &Request<Body>) -> String;
}

/// Which request attribute identifies a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySource {
    /// TCP peer address.
    #[default]
    Peer,
    /// Left-most `X-Forwarded-For` entry, then the peer address.
    ForwardedFor,
}

/// Keys requests by the IP of the TCP peer.
#[derive(Debug, Clone)]
pub struct PeerIpKey {
    fallback: String,
}

impl PeerIpKey {
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            fallback: fallback.into(),
        }
    }
}

impl KeyExtractor for PeerIpKey {
    fn extract_key(&self, request: &Request<Body>) -> String {
        peer_ip(request).unwrap_or_else(|| self.fallback.clone())
    }
}

/// Keys requests by the first `X-Forwarded-For` hop.
///
/// Only meaningful behind a trusted proxy that overwrites the header.
#[derive(Debug, Clone)]
pub struct ForwardedForKey {
    fallback: String,
}

impl ForwardedForKey {
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            fallback: fallback.into(),
        }
    }
}

impl KeyExtractor for ForwardedForKey {
    fn extract_key(&self, request: &Request<Body>) -> String {
        request
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .or_else(|| peer_ip(request))
            .unwrap_or_else(|| self.fallback.clone())
    }
}

pub fn extractor_for(source: KeySource, fallback: &str) -> Box<dyn KeyExtractor> {
    match source {
        KeySource::Peer => Box::new(PeerIpKey::new(fallback)),
        KeySource::ForwardedFor => Box::new(ForwardedForKey::new(fallback)),
    }
}

fn peer_ip(request: &Request<Body>) -> Option<String> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_from(addr: Option<&str>, forwarded: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/");
        if let Some(fwd) = forwarded {
            builder = builder.header("x-forwarded-for", fwd);
        }
        let mut req = builder.body(Body::empty()).unwrap();
        if let Some(addr) = addr {
            let addr: SocketAddr = addr.parse().unwrap();
            req.extensions_mut().insert(ConnectInfo(addr));
        }
        req
    }

    #[test]
    fn test_peer_ip_ignores_port() {
        let key = PeerIpKey::new("unknown");
        assert_eq!(key.extract_key(&request_from(Some("1.2.3.4:5555"), None)), "1.2.3.4");
    }

    #[test]
    fn test_peer_ip_falls_back_to_sentinel() {
        let key = PeerIpKey::new("unknown");
        assert_eq!(key.extract_key(&request_from(None, None)), "unknown");
    }

    #[test]
    fn test_forwarded_for_takes_first_hop() {
        let key = ForwardedForKey::new("unknown");
        let req = request_from(Some("10.0.0.1:80"), Some(" 9.9.9.9 , 10.0.0.2"));
        assert_eq!(key.extract_key(&req), "9.9.9.9");
    }

    #[test]
    fn test_forwarded_for_falls_back_to_peer_then_sentinel() {
        let key = ForwardedForKey::new("anon");
        assert_eq!(key.extract_key(&request_from(Some("10.0.0.1:80"), Some(""))), "10.0.0.1");
        assert_eq!(key.extract_key(&request_from(None, None)), "anon");
    }
}
