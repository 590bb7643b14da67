//! Configuration for a primary's replication endpoints.

use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for [`crate::router`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to when run standalone via [`crate::serve`].
    pub bind_addr: SocketAddr,
    /// Request timeout applied by the caller's HTTP server.
    pub request_timeout: Duration,
    /// Ceiling on `limit` a follower may request per pull, regardless of
    /// what it asks for.
    pub max_pull_batch: usize,
    /// Shared secret for peer authentication. `None` disables auth
    /// entirely, which is only appropriate behind a trusted network.
    pub auth_secret: Option<Vec<u8>>,
}

impl ServerConfig {
    /// Creates a new server configuration bound to `bind_addr`.
    #[must_use]
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            request_timeout: Duration::from_secs(30),
            max_pull_batch: 1000,
            auth_secret: None,
        }
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the maximum pull batch size.
    #[must_use]
    pub fn with_max_pull_batch(mut self, size: usize) -> Self {
        self.max_pull_batch = size;
        self
    }

    /// Enables peer authentication with the given shared secret.
    #[must_use]
    pub fn with_auth(mut self, secret: Vec<u8>) -> Self {
        self.auth_secret = Some(secret);
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 7800)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_auth() {
        let config = ServerConfig::default();
        assert_eq!(config.max_pull_batch, 1000);
        assert!(config.auth_secret.is_none());
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new("0.0.0.0:9000".parse().unwrap())
            .with_max_pull_batch(50)
            .with_auth(vec![1, 2, 3, 4]);

        assert_eq!(config.max_pull_batch, 50);
        assert_eq!(config.auth_secret, Some(vec![1, 2, 3, 4]));
    }
}
