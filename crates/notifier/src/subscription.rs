//! Push-subscription descriptors.
//!
//! The device registry stores each browser/device subscription as serialized
//! JSON text. It is parsed once at the registry boundary into a
//! [`PushSubscription`]; parse failures surface as [`DescriptorError`], never
//! as a delivery failure from the transport.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons a stored descriptor cannot be used as a delivery target.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("descriptor is not valid JSON: {0}")]
    Malformed(String),

    #[error("descriptor has an empty endpoint")]
    EmptyEndpoint,
}

/// Encryption keys issued by the browser push service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// A typed web-push subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSubscription {
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<SubscriptionKeys>,
}

impl PushSubscription {
    /// Parse a stored descriptor string.
    pub fn parse(descriptor: &str) -> Result<Self, DescriptorError> {
        let subscription: PushSubscription = serde_json::from_str(descriptor)
            .map_err(|e| DescriptorError::Malformed(e.to_string()))?;

        if subscription.endpoint.trim().is_empty() {
            return Err(DescriptorError::EmptyEndpoint);
        }

        Ok(subscription)
    }
}
