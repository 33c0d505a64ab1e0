//! Per-connection and per-message access checks for relay traffic.
//!
//! Connection admission only rejects banned peers. Outbound payloads to other
//! peers (`broadcast`, `relayMessage`) are refused for banned peers, and chat
//! or action content is also refused during a timeout. Blockchain pings and
//! control traffic (registration, peer discovery) pass for timed-out peers so
//! they can still see the network and receive admin decisions.

use super::messages::RelayMessage;
use crate::gatekeeper::{AccessControlRegistry, AccessDecision};
use tracing::{debug, warn};

#[derive(Clone)]
pub struct RelayGate {
    registry: AccessControlRegistry,
}

impl RelayGate {
    pub fn new(registry: AccessControlRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &AccessControlRegistry {
        &self.registry
    }

    /// Check a peer at connection time.
    pub fn admit(&self, user_id: &str) -> AccessDecision {
        let decision = self.registry.can_connect(user_id);
        if !decision.allowed {
            warn!(user_id, "connection refused: banned");
        }
        decision
    }

    /// Check a message the peer wants the relay to deliver.
    pub fn check_outbound(&self, user_id: &str, message: &RelayMessage) -> AccessDecision {
        let decision = match message.outbound_payload() {
            None => return AccessDecision::allow(),
            Some(payload) if payload.is_user_content() => self.registry.can_message(user_id),
            Some(_) if self.registry.is_banned(user_id) => AccessDecision::deny("You are banned."),
            Some(_) => return AccessDecision::allow(),
        };
        if !decision.allowed {
            debug!(
                user_id,
                kind = message.kind(),
                remaining = decision.remaining,
                "outbound message blocked"
            );
        }
        decision
    }
}
