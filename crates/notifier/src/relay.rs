//! HTTP relay transport.
//!
//! Web-push messages must be VAPID-signed and encrypted per subscription. That
//! work lives in a relay service; this transport hands it the subscription and
//! the plaintext payload, then maps the relay's answer (which mirrors the
//! upstream push service status) onto [`DeliveryError`].

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::subscription::PushSubscription;
use crate::transport::{DeliveryError, DeliveryTransport};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct RelayRequest<'a> {
    subscription: &'a PushSubscription,
    payload: serde_json::Value,
    ttl: u32,
}

/// Delivers through an HTTP push relay using `reqwest`.
#[derive(Debug, Clone)]
pub struct RelayTransport {
    client: reqwest::Client,
    relay_url: String,
    token: Option<String>,
    ttl_seconds: u32,
}

impl RelayTransport {
    pub fn new(
        relay_url: String,
        token: Option<String>,
        ttl_seconds: u32,
    ) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DeliveryError::Network(e.to_string()))?;

        Ok(Self {
            client,
            relay_url,
            token,
            ttl_seconds,
        })
    }
}

#[async_trait]
impl DeliveryTransport for RelayTransport {
    async fn deliver(
        &self,
        subscription: &PushSubscription,
        payload: &[u8],
    ) -> Result<(), DeliveryError> {
        let payload: serde_json::Value =
            serde_json::from_slice(payload).map_err(|e| DeliveryError::Encode(e.to_string()))?;

        let body = RelayRequest {
            subscription,
            payload,
            ttl: self.ttl_seconds,
        };

        let mut request = self.client.post(&self.relay_url).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DeliveryError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(
                endpoint = %subscription.endpoint,
                status = status.as_u16(),
                "Push accepted"
            );
            return Ok(());
        }

        let detail = response.text().await.unwrap_or_default();
        Err(DeliveryError::from_status(status.as_u16(), detail))
    }
}
