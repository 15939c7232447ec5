//! reqwest-backed transport.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;

use crate::config::TransportConfig;
use crate::transport::{Exchange, Target, Transport, TransportError};

/// HTTP transport with a fixed per-call deadline.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    /// Build a transport from configuration.
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        // reqwest sets Accept-Encoding for exactly the codings it decodes
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .gzip(config.gzip)
            .deflate(config.gzip)
            .connect_timeout(config.connect_timeout())
            .timeout(config.timeout())
            .build()
            .map_err(|e| TransportError::InvalidTarget(format!("client setup failed: {}", e)))?;

        Ok(Self {
            client,
            timeout: config.timeout(),
        })
    }

    /// Wrap an existing client; `timeout` still bounds every exchange.
    pub fn with_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn map_error(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else if err.is_builder() {
            TransportError::InvalidTarget(err.to_string())
        } else if err.is_body() || err.is_decode() {
            TransportError::Body(err.to_string())
        } else {
            TransportError::Connect(err.to_string())
        }
    }

    async fn exchange(&self, target: &Target, start: Instant) -> Result<Exchange, TransportError> {
        let response = self
            .client
            .get(target.to_url())
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(self.timeout)
            } else {
                TransportError::Body(e.to_string())
            }
        })?;

        Ok(Exchange {
            status,
            body: body.to_vec(),
            retry_after,
            elapsed: start.elapsed(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, target: &Target) -> Result<Exchange, TransportError> {
        let start = Instant::now();
        tracing::trace!(url = %target, "Sending request");

        match tokio::time::timeout(self.timeout, self.exchange(target, start)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.timeout)),
        }
    }
}
