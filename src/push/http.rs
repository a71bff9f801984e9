// HTTP push gateway transport
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::db::models::DeviceToken;
use crate::identity::ProfileId;
use crate::push::tokens::DynDeviceTokenStore;
use crate::push::{DeliveryOutcome, DeviceFailure, PushError, PushMessage, PushTransport};

/// Error markers the gateway uses for tokens that will never deliver again.
const INVALID_TOKEN_MARKERS: &[&str] = &["UNREGISTERED", "NOT_FOUND"];

#[derive(Serialize)]
struct GatewayRequest<'a> {
    to: &'a str,
    platform: &'a str,
    title: &'a str,
    body: &'a str,
    channel_id: &'a str,
    data: &'a BTreeMap<String, String>,
}

/// Posts one request per registered device to the configured gateway.
pub struct HttpPushTransport {
    client: Client,
    gateway_url: String,
    auth_token: Option<String>,
    tokens: DynDeviceTokenStore,
}

impl HttpPushTransport {
    pub fn new(
        gateway_url: impl Into<String>,
        auth_token: Option<String>,
        timeout: Duration,
        tokens: DynDeviceTokenStore,
    ) -> Result<Self, PushError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PushError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            gateway_url: gateway_url.into(),
            auth_token,
            tokens,
        })
    }

    async fn send_to_device(
        &self,
        device: &DeviceToken,
        message: &PushMessage,
    ) -> Result<(), DeviceFailure> {
        let request = GatewayRequest {
            to: &device.token,
            platform: &device.platform,
            title: &message.title,
            body: &message.body,
            channel_id: &message.channel_id,
            data: &message.data,
        };

        let mut builder = self.client.post(&self.gateway_url).json(&request);
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(|e| DeviceFailure {
            token: device.token.clone(),
            error: format!("Request failed: {}", e),
            invalid_token: false,
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read response body>".to_string());
        Err(DeviceFailure {
            token: device.token.clone(),
            invalid_token: is_invalid_token(status, &body),
            error: format!("Gateway returned {}: {}", status, body),
        })
    }
}

fn is_invalid_token(status: StatusCode, body: &str) -> bool {
    status == StatusCode::NOT_FOUND || INVALID_TOKEN_MARKERS.iter().any(|m| body.contains(m))
}

#[async_trait]
impl PushTransport for HttpPushTransport {
    async fn send(
        &self,
        recipient: &ProfileId,
        message: &PushMessage,
    ) -> Result<DeliveryOutcome, PushError> {
        let devices = self.tokens.tokens_for(recipient).await?;
        if devices.is_empty() {
            tracing::debug!("No devices registered for {}", recipient);
            return Ok(DeliveryOutcome::default());
        }

        let results = join_all(devices.iter().map(|d| self.send_to_device(d, message))).await;

        let mut outcome = DeliveryOutcome {
            attempted: devices.len(),
            ..Default::default()
        };
        for result in results {
            match result {
                Ok(()) => outcome.delivered += 1,
                Err(failure) => {
                    tracing::warn!(
                        "Push to device {} of {} failed: {}",
                        failure.token,
                        recipient,
                        failure.error
                    );
                    outcome.failures.push(failure);
                }
            }
        }

        for failure in outcome.failures.iter().filter(|f| f.invalid_token) {
            match self.tokens.remove(&failure.token).await {
                Ok(true) => {
                    outcome.pruned += 1;
                    tracing::info!("Removed stale device token for {}", recipient);
                }
                Ok(false) => {}
                Err(e) => tracing::warn!("Failed to remove stale device token: {}", e),
            }
        }

        Ok(outcome)
    }
}
