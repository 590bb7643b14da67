//! Configuration for the HTTP/WS adapter (spec.md §4.8, §6).

use std::net::SocketAddr;

/// Configuration for [`crate::server::build_router`] and
/// [`crate::server::HttpServer`].
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Address the standalone server binds to.
    pub bind_addr: SocketAddr,

    /// Allowed CORS origins. Empty means permissive (`Any`), matching a
    /// local/dev posture; a non-empty list is passed to `tower_http`'s
    /// `AllowOrigin::list`.
    pub cors_origins: Vec<String>,

    /// Ceiling on a request body's size, enforced by `tower_http`'s
    /// `RequestBodyLimitLayer`. Matches the relay's own envelope ceiling
    /// by default (spec.md §6: "Maximum in-bound message size: 1 MiB"),
    /// but this layer applies to every route, not only `/ws`.
    pub max_body_bytes: usize,
}

impl HttpConfig {
    /// Creates a configuration bound to `bind_addr`, permissive CORS, and
    /// the default 1 MiB body ceiling.
    #[must_use]
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            cors_origins: Vec::new(),
            max_body_bytes: 1024 * 1024,
        }
    }

    /// Restricts CORS to the given origins.
    #[must_use]
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }

    /// Overrides the request body size ceiling.
    #[must_use]
    pub const fn with_max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([0, 0, 0, 0], 7700)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_permissive_cors() {
        let config = HttpConfig::default();
        assert!(config.cors_origins.is_empty());
        assert_eq!(config.max_body_bytes, 1024 * 1024);
    }

    #[test]
    fn builder_overrides() {
        let config = HttpConfig::new("127.0.0.1:9999".parse().unwrap())
            .with_cors_origins(vec!["https://example.com".to_string()])
            .with_max_body_bytes(2048);
        assert_eq!(config.cors_origins, vec!["https://example.com".to_string()]);
        assert_eq!(config.max_body_bytes, 2048);
    }
}
