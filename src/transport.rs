//! Pluggable request transport.

use crate::error::StepError;
use crate::model::EndpointConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

/// Raw reply from the endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// Posts a JSON body to a URL and hands back whatever came back.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        url: &str,
        body: &Value,
    ) -> Result<TransportResponse, StepError>;
}

/// `reqwest`-backed HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    headers: HashMap<String, String>,
}

impl HttpTransport {
    pub fn new(config: &EndpointConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self::with_client(client, config.headers.clone()))
    }

    /// Use a preconfigured client.
    pub fn with_client(client: Client, headers: HashMap<String, String>) -> Self {
        Self { client, headers }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self, body), level = "debug")]
    async fn send(
        &self,
        url: &str,
        body: &Value,
    ) -> Result<TransportResponse, StepError> {
        let mut request = self.client.post(url).json(body);
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StepError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        debug!("Received response with status: {}", status);

        let body = response
            .text()
            .await
            .map_err(|e| StepError::Transport(format!("failed to read body: {e}")))?;

        Ok(TransportResponse { status, body })
    }
}
