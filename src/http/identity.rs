//! Client identification for rate limit keys.
//!
//! Forwarded-address headers are only trustworthy when every request passes
//! through a reverse proxy that overwrites them. Without such a proxy a
//! client can choose its own key, so `trust_proxy_headers` is off unless a
//! deployment turns it on.

use axum::http::HeaderMap;
use std::net::IpAddr;

use crate::ratelimit::UNKNOWN_CLIENT;

/// Identity of an authenticated caller.
///
/// Inserted as a request extension by the authentication layer; when present
/// it takes precedence over any address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

/// Address headers in the order they are consulted.
pub const FORWARDED_HEADERS: [&str; 3] = ["x-forwarded-for", "x-real-ip", "cf-connecting-ip"];

/// Derive the client key for a request.
///
/// Precedence: authenticated user, then (when trusted) the first hop of
/// `X-Forwarded-For`, `X-Real-IP`, `CF-Connecting-IP`, then the socket peer.
/// Falls back to `unknown`.
pub fn client_key(
    headers: &HeaderMap,
    user: Option<&AuthenticatedUser>,
    peer: Option<IpAddr>,
    trust_proxy_headers: bool,
) -> String {
    if let Some(AuthenticatedUser(id)) = user {
        let id = id.trim();
        if !id.is_empty() {
            return format!("user:{}", id);
        }
    }

    if trust_proxy_headers {
        if let Some(addr) = forwarded_address(headers) {
            return format!("ip:{}", addr);
        }
    }

    match peer {
        Some(ip) => format!("ip:{}", ip),
        None => UNKNOWN_CLIENT.to_string(),
    }
}

/// First non-empty address from the forwarded headers.
fn forwarded_address(headers: &HeaderMap) -> Option<String> {
    FORWARDED_HEADERS.iter().find_map(|name| {
        let value = headers.get(*name)?.to_str().ok()?;
        // X-Forwarded-For is a list; the client is the first hop
        let first = value.split(',').next()?.trim();
        if first.is_empty() {
            None
        } else {
            Some(first.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> Option<IpAddr> {
        Some("10.1.2.3".parse().unwrap())
    }

    #[test]
    fn test_user_takes_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.1"));
        let user = AuthenticatedUser("u_42".to_string());

        assert_eq!(client_key(&headers, Some(&user), peer(), true), "user:u_42");
    }

    #[test]
    fn test_blank_user_is_ignored() {
        let headers = HeaderMap::new();
        let user = AuthenticatedUser("  ".to_string());

        assert_eq!(client_key(&headers, Some(&user), peer(), true), "ip:10.1.2.3");
    }

    #[test]
    fn test_forwarded_for_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.1, 70.41.3.18, 150.172.238.178"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.9"));

        assert_eq!(client_key(&headers, None, peer(), true), "ip:203.0.113.1");
    }

    #[test]
    fn test_header_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-connecting-ip", HeaderValue::from_static("192.0.2.5"));
        assert_eq!(client_key(&headers, None, peer(), true), "ip:192.0.2.5");

        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.9"));
        assert_eq!(client_key(&headers, None, peer(), true), "ip:198.51.100.9");

        // An empty forwarded list does not shadow later headers
        headers.insert("x-forwarded-for", HeaderValue::from_static(""));
        assert_eq!(client_key(&headers, None, peer(), true), "ip:198.51.100.9");
    }

    #[test]
    fn test_untrusted_headers_use_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.1"));

        assert_eq!(client_key(&headers, None, peer(), false), "ip:10.1.2.3");
    }

    #[test]
    fn test_no_identity_is_unknown() {
        let headers = HeaderMap::new();
        assert_eq!(client_key(&headers, None, None, true), UNKNOWN_CLIENT);
    }
}
