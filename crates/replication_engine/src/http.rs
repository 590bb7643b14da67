//! `reqwest`-backed [`Transport`] implementation, talking JSON to a
//! primary's `replication_server` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use replication_protocol::{PullRequest, PullResponse};

use crate::error::{ReplicationError, ReplicationResult};
use crate::transport::Transport;

/// Pulls WAL ranges from a primary node's `GET /wal` endpoint over HTTP.
pub struct HttpTransport {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTransport {
    /// Builds a transport targeting `base_url` (e.g. `http://primary:7800`).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ReplicationResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ReplicationError::transport(err.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    /// Returns the configured base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn pull(&self, request: PullRequest) -> ReplicationResult<PullResponse> {
        let url = format!("{}/wal", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("databaseId", request.database_id.to_string()),
                ("fromPosition", request.from_position.to_string()),
                ("limit", request.limit.to_string()),
            ])
            .send()
            .await
            .map_err(|err| ReplicationError::transport(err.to_string()))?;

        if response.status() == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            return Err(ReplicationError::transport("primary reported unavailable"));
        }
        if !response.status().is_success() {
            return Err(ReplicationError::Transport {
                message: format!("primary returned status {}", response.status()),
                retryable: response.status().is_server_error(),
            });
        }

        response
            .json::<PullResponse>()
            .await
            .map_err(|err| ReplicationError::transport(format!("malformed response body: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_carries_configured_base_url() {
        let transport = HttpTransport::new("http://localhost:7800", Duration::from_secs(5)).unwrap();
        assert_eq!(transport.base_url(), "http://localhost:7800");
    }
}
