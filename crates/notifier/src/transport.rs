//! Delivery transport capability.

use async_trait::async_trait;
use thiserror::Error;

use crate::subscription::PushSubscription;

/// Why a single delivery attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The push service no longer knows this subscription (404 / 410).
    #[error("subscription gone (HTTP {status})")]
    Gone { status: u16 },

    /// The push service refused the message for another reason.
    #[error("push rejected (HTTP {status}): {detail}")]
    Rejected { status: u16, detail: String },

    /// The request never produced a response.
    #[error("network error: {0}")]
    Network(String),

    /// The payload could not be encoded for sending.
    #[error("encode error: {0}")]
    Encode(String),
}

impl DeliveryError {
    /// Classify an HTTP status returned by the push service.
    pub fn from_status(status: u16, detail: impl Into<String>) -> Self {
        match status {
            404 | 410 => DeliveryError::Gone { status },
            _ => DeliveryError::Rejected {
                status,
                detail: detail.into(),
            },
        }
    }

    /// Whether the target is permanently invalid and should be pruned.
    pub fn is_gone(&self) -> bool {
        matches!(self, DeliveryError::Gone { .. })
    }

    /// HTTP status, when the push service answered.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            DeliveryError::Gone { status } | DeliveryError::Rejected { status, .. } => {
                Some(*status)
            }
            DeliveryError::Network(_) | DeliveryError::Encode(_) => None,
        }
    }
}

/// Delivers one payload to one device subscription.
#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    async fn deliver(
        &self,
        subscription: &PushSubscription,
        payload: &[u8],
    ) -> Result<(), DeliveryError>;
}
