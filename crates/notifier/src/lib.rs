//! Push delivery for LoanPush notifications.
//!
//! - [`subscription`]: typed device subscription descriptors
//! - [`transport`]: the `DeliveryTransport` capability and its failure taxonomy
//! - [`relay`]: HTTP relay implementation built on `reqwest`

pub mod relay;
pub mod subscription;
pub mod transport;

pub use relay::RelayTransport;
pub use subscription::{DescriptorError, PushSubscription};
pub use transport::{DeliveryError, DeliveryTransport};
