//! HTTP relay backend.
//!
//! Forwards every sent message to a remote process as a JSON [`RelayFrame`].
//! The remote side feeds the frame to
//! [`MessageQueue::accept_relayed`](crate::MessageQueue::accept_relayed), which
//! delivers it immediately. Nothing is stored locally, so receive always
//! returns an empty batch.

use crate::backend::{Backend, BackendKind};
use crate::config::InterfaceConfig;
use crate::error::BackendError;
use crate::message::{Envelope, QueueName, ReceiveOptions};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[cfg(test)]
#[path = "relay_tests.rs"]
mod tests;

/// Response body the remote endpoint sends to acknowledge a frame
pub const RELAY_ACK: &str = "ok";

/// Wire format of a relayed message. The envelope body is already encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayFrame {
    pub queue: QueueName,
    pub envelope: Envelope,
}

/// Credentials for the remote endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

/// Relay endpoint configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub url: String,
    pub basic_auth: Option<BasicAuth>,
    pub timeout: Duration,
}

impl RelayConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            basic_auth: None,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.basic_auth = Some(BasicAuth {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Backend that POSTs messages to a remote endpoint
#[derive(Debug, Clone)]
pub struct RelayBackend {
    http_client: reqwest::Client,
    config: RelayConfig,
}

impl RelayBackend {
    pub fn new(config: RelayConfig) -> Result<Self, BackendError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BackendError::Http {
                url: config.url.clone(),
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            http_client,
            config,
        })
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }
}

#[async_trait]
impl Backend for RelayBackend {
    async fn send(
        &self,
        queue: &QueueName,
        mut envelope: Envelope,
        _config: &InterfaceConfig,
    ) -> Result<(), BackendError> {
        envelope.queue = None;
        let frame = RelayFrame {
            queue: queue.clone(),
            envelope,
        };

        let mut request = self.http_client.post(&self.config.url).json(&frame);
        if let Some(auth) = &self.config.basic_auth {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }

        let response = request.send().await.map_err(|e| BackendError::Http {
            url: self.config.url.clone(),
            message: e.to_string(),
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| BackendError::Http {
            url: self.config.url.clone(),
            message: format!("Failed to read response body: {}", e),
        })?;

        if !status.is_success() || body.trim() != RELAY_ACK {
            return Err(BackendError::Rejected {
                response: format!("{}: {}", status, body),
            });
        }

        debug!(queue = %queue, url = %self.config.url, "Relayed message");
        Ok(())
    }

    async fn receive(
        &self,
        _queue: Option<&QueueName>,
        _config: &InterfaceConfig,
        _options: &ReceiveOptions,
    ) -> Result<Vec<Envelope>, BackendError> {
        Ok(Vec::new())
    }

    fn kind(&self) -> BackendKind {
        BackendKind::HttpRelay
    }
}
