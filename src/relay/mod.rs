//! Relay protocol adapters.
//!
//! The relay is an external, at-most-once message fabric. This module models
//! its wire messages, connects to it, and applies access checks to traffic.
//! Retries and timeouts are the caller's job.

pub mod connector;
pub mod gate;
pub mod messages;
pub mod retry;

pub use connector::{
    MockBehavior, MockRelayConnector, RelayConnector, RelayError, RelayLink,
    WebSocketRelayConnector,
};
pub use gate::RelayGate;
pub use messages::{NodePayload, PeerInfo, RelayMessage};
pub use retry::{retry_with_backoff, RetryPolicy};
