//! Registration workflow.
//!
//! 1. Build a block binding identity and consent
//! 2. Submit it to a relay for the admin approval queue
//! 3. Persist it locally whether or not the relay confirmed
//! 4. Apply admin decisions as they are relayed back
//!
//! An unreachable relay is not a failure: the block is kept as `pending` and
//! [`RegistrationWorkflow::resync`] delivers it later. An explicit relay
//! rejection or the submission timeout is.

use super::block::{BlockError, Consent, RegistrationBlock, StatusRecord};
use super::status::{can_perform, Action, RegistrationStatus};
use super::store::{RegistrationStore, RegistrationStoreError};
use crate::clock::{Clock, Millis};
use crate::identity::Identity;
use crate::relay::{retry_with_backoff, RelayConnector, RelayError, RelayMessage, RetryPolicy};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Submission timeout.
pub const SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitSettings {
    pub timeout: Duration,
    pub resync: RetryPolicy,
}

impl Default for SubmitSettings {
    fn default() -> Self {
        Self {
            timeout: SUBMIT_TIMEOUT,
            resync: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error(transparent)]
    Block(#[from] BlockError),

    #[error("No registration to update")]
    NoRegistration,

    #[error("Cannot move registration from {from} to {to}")]
    InvalidTransition {
        from: RegistrationStatus,
        to: RegistrationStatus,
    },

    #[error("Relay rejected registration: {0}")]
    Rejected(String),

    #[error("Registration submission timeout")]
    Timeout,

    #[error("Relay did not acknowledge registration")]
    NotDelivered,

    #[error(transparent)]
    Store(#[from] RegistrationStoreError),
}

impl RegistrationError {
    /// Worth another delivery attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RegistrationError::Timeout | RegistrationError::NotDelivered
        )
    }
}

/// Result of a submission that did not fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOutcome {
    pub block_id: String,
    pub status: RegistrationStatus,
    /// Whether the relay acknowledged receipt.
    pub delivered: bool,
    pub message: String,
}

/// Snapshot for status displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationSummary {
    pub registered: bool,
    pub status: Option<RegistrationStatus>,
    pub username: Option<String>,
    pub app_type: Option<String>,
    pub registered_at: Option<Millis>,
    pub submitted_at: Option<Millis>,
    pub approved_at: Option<Millis>,
}

type BlockCallback = Box<dyn Fn(&RegistrationBlock) + Send + Sync>;
type DeniedCallback = Box<dyn Fn(&RegistrationBlock, Option<&str>) + Send + Sync>;
type ChangeCallback =
    Box<dyn Fn(RegistrationStatus, RegistrationStatus, &RegistrationBlock) + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    on_approved: Option<BlockCallback>,
    on_denied: Option<DeniedCallback>,
    on_status_change: Option<ChangeCallback>,
}

enum Delivery {
    Acknowledged,
    /// Relay closed or could not be reached.
    Undelivered(String),
}

/// Owns this installation's registration record.
pub struct RegistrationWorkflow {
    store: Arc<dyn RegistrationStore>,
    connector: Arc<dyn RelayConnector>,
    clock: Arc<dyn Clock>,
    settings: SubmitSettings,
    registration: Option<RegistrationBlock>,
    callbacks: Callbacks,
}

impl RegistrationWorkflow {
    /// Load any saved registration. An unreadable record is logged and treated
    /// as absent.
    pub fn new(
        store: Arc<dyn RegistrationStore>,
        connector: Arc<dyn RelayConnector>,
        clock: Arc<dyn Clock>,
        settings: SubmitSettings,
    ) -> Self {
        let registration = store.load().unwrap_or_else(|e| {
            warn!(error = %e, "failed to load registration");
            None
        });

        Self {
            store,
            connector,
            clock,
            settings,
            registration,
            callbacks: Callbacks::default(),
        }
    }

    pub fn create_registration_block(
        &self,
        identity: &Identity,
        consent: &Consent,
    ) -> Result<RegistrationBlock, RegistrationError> {
        Ok(RegistrationBlock::create(
            identity,
            consent,
            self.clock.now_millis(),
        )?)
    }

    /// Send `block` to the relay and keep it as this installation's
    /// registration.
    pub async fn submit_registration(
        &mut self,
        mut block: RegistrationBlock,
        relay_address: &str,
    ) -> Result<SubmitOutcome, RegistrationError> {
        let delivery = self.deliver(&mut block, relay_address).await?;

        let outcome = match delivery {
            Delivery::Acknowledged => {
                block.relay_acknowledged = true;
                info!(block_id = %block.block_id, "registration submitted");
                SubmitOutcome {
                    block_id: block.block_id.clone(),
                    status: block.current_status(),
                    delivered: true,
                    message: "Registration submitted, pending admin approval".to_string(),
                }
            }
            Delivery::Undelivered(reason) => {
                warn!(block_id = %block.block_id, %reason, "relay unavailable, registration kept locally");
                SubmitOutcome {
                    block_id: block.block_id.clone(),
                    status: block.current_status(),
                    delivered: false,
                    message: "Registration saved locally, will sync when relay available"
                        .to_string(),
                }
            }
        };

        self.store.save(&block)?;
        self.registration = Some(block);
        Ok(outcome)
    }

    /// Deliver a locally saved but unacknowledged registration, retrying with
    /// backoff.
    pub async fn resync(&mut self, relay_address: &str) -> Result<SubmitOutcome, RegistrationError> {
        let pending = self
            .registration
            .clone()
            .ok_or(RegistrationError::NoRegistration)?;

        if pending.relay_acknowledged {
            return Ok(SubmitOutcome {
                block_id: pending.block_id,
                status: pending.status.current,
                delivered: true,
                message: "Registration already acknowledged".to_string(),
            });
        }

        let policy = self.settings.resync;
        let this = &*self;
        let delivered = retry_with_backoff(
            &policy,
            || {
                let mut attempt = pending.clone();
                async move {
                    let delivery = this.deliver(&mut attempt, relay_address).await?;
                    match delivery {
                        Delivery::Acknowledged => Ok(attempt),
                        Delivery::Undelivered(reason) => {
                            debug!(%reason, "resync attempt undelivered");
                            Err(RegistrationError::NotDelivered)
                        }
                    }
                }
            },
            RegistrationError::is_transient,
        )
        .await?;

        let block = self
            .registration
            .as_mut()
            .ok_or(RegistrationError::NoRegistration)?;
        block.relay_acknowledged = true;
        block.metadata.submitted_at = delivered.metadata.submitted_at;
        self.store.save(block)?;

        info!(block_id = %block.block_id, "registration resynced");
        Ok(SubmitOutcome {
            block_id: block.block_id.clone(),
            status: block.current_status(),
            delivered: true,
            message: "Registration submitted, pending admin approval".to_string(),
        })
    }

    async fn deliver(
        &self,
        block: &mut RegistrationBlock,
        relay_address: &str,
    ) -> Result<Delivery, RegistrationError> {
        let now = self.clock.now_millis();
        let exchange = exchange(self.connector.as_ref(), block, relay_address, now);

        match timeout(self.settings.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                warn!(relay = relay_address, "registration submission timed out");
                Err(RegistrationError::Timeout)
            }
        }
    }

    /// Apply an admin decision.
    pub fn update_status(
        &mut self,
        new_status: RegistrationStatus,
        updated_by: Option<&str>,
        reason: Option<&str>,
    ) -> Result<&RegistrationBlock, RegistrationError> {
        let now = self.clock.now_millis();
        let current = self
            .registration
            .as_ref()
            .ok_or(RegistrationError::NoRegistration)?;

        let old_status = current.status.current;
        if !old_status.can_transition_to(new_status) {
            return Err(RegistrationError::InvalidTransition {
                from: old_status,
                to: new_status,
            });
        }

        // Memory only follows a successful write
        let mut updated = current.clone();
        updated.status = StatusRecord {
            current: new_status,
            updated_at: Some(now),
            updated_by: updated_by.map(str::to_string),
            reason: reason.map(str::to_string),
            previous_status: Some(old_status),
        };
        self.store.save(&updated)?;
        let block = self.registration.insert(updated);

        info!(block_id = %block.block_id, from = %old_status, to = %new_status, "registration status changed");

        match new_status {
            RegistrationStatus::Approved => {
                if let Some(cb) = &self.callbacks.on_approved {
                    cb(block);
                }
            }
            RegistrationStatus::Denied => {
                if let Some(cb) = &self.callbacks.on_denied {
                    cb(block, reason);
                }
            }
            _ => {}
        }
        if let Some(cb) = &self.callbacks.on_status_change {
            cb(old_status, new_status, block);
        }

        Ok(block)
    }

    /// Apply a relayed `registration_status` for our block. Returns whether the
    /// message was applied.
    pub fn handle_relay_message(&mut self, message: &RelayMessage) -> Result<bool, RegistrationError> {
        let RelayMessage::RegistrationStatus {
            block_id,
            status,
            updated_by,
            reason,
        } = message
        else {
            return Ok(false);
        };

        match &self.registration {
            Some(block) if &block.block_id == block_id => {}
            _ => {
                debug!(%block_id, "status update for a block we do not own");
                return Ok(false);
            }
        }

        self.update_status(*status, updated_by.as_deref(), reason.as_deref())?;
        Ok(true)
    }

    pub fn on_approved(&mut self, callback: impl Fn(&RegistrationBlock) + Send + Sync + 'static) {
        self.callbacks.on_approved = Some(Box::new(callback));
    }

    pub fn on_denied(
        &mut self,
        callback: impl Fn(&RegistrationBlock, Option<&str>) + Send + Sync + 'static,
    ) {
        self.callbacks.on_denied = Some(Box::new(callback));
    }

    pub fn on_status_change(
        &mut self,
        callback: impl Fn(RegistrationStatus, RegistrationStatus, &RegistrationBlock)
            + Send
            + Sync
            + 'static,
    ) {
        self.callbacks.on_status_change = Some(Box::new(callback));
    }

    pub fn get_registration(&self) -> Option<&RegistrationBlock> {
        self.registration.as_ref()
    }

    pub fn get_status(&self) -> Option<RegistrationStatus> {
        self.registration.as_ref().map(|b| b.status.current)
    }

    pub fn is_registered(&self) -> bool {
        self.registration.is_some()
    }

    pub fn is_approved(&self) -> bool {
        self.get_status() == Some(RegistrationStatus::Approved)
    }

    pub fn is_pending(&self) -> bool {
        self.get_status() == Some(RegistrationStatus::Pending)
    }

    pub fn is_denied(&self) -> bool {
        self.get_status() == Some(RegistrationStatus::Denied)
    }

    pub fn can_perform_action(&self, action: Action) -> bool {
        can_perform(self.get_status(), action)
    }

    pub fn get_summary(&self) -> RegistrationSummary {
        match &self.registration {
            None => RegistrationSummary {
                registered: false,
                status: None,
                username: None,
                app_type: None,
                registered_at: None,
                submitted_at: None,
                approved_at: None,
            },
            Some(block) => RegistrationSummary {
                registered: true,
                status: Some(block.status.current),
                username: Some(block.identity.username.clone()),
                app_type: Some(block.identity.app_type.clone()),
                registered_at: Some(block.metadata.created_at),
                submitted_at: block.metadata.submitted_at,
                approved_at: (block.status.current == RegistrationStatus::Approved)
                    .then_some(block.status.updated_at)
                    .flatten(),
            },
        }
    }
}

/// One connect/send/await-ack round trip.
async fn exchange(
    connector: &dyn RelayConnector,
    block: &mut RegistrationBlock,
    relay_address: &str,
    now: Millis,
) -> Result<Delivery, RegistrationError> {
    let mut link = match connector.connect(relay_address).await {
        Ok(link) => link,
        Err(e) => return Ok(Delivery::Undelivered(e.to_string())),
    };

    block.metadata.submitted_at = Some(now);
    let submit = RelayMessage::RegistrationSubmit {
        payload: Box::new(block.clone()),
    };
    if let Err(e) = link.send(&submit).await {
        return Ok(Delivery::Undelivered(e.to_string()));
    }

    loop {
        match link.recv().await {
            Ok(Some(RelayMessage::RegistrationReceived { .. }))
            | Ok(Some(RelayMessage::RegistrationQueued { .. })) => {
                link.close().await;
                return Ok(Delivery::Acknowledged);
            }
            Ok(Some(RelayMessage::RegistrationError { error })) => {
                link.close().await;
                let reason = error.unwrap_or_else(|| "Registration failed".to_string());
                warn!(%reason, "relay rejected registration");
                return Err(RegistrationError::Rejected(reason));
            }
            Ok(Some(other)) => debug!(kind = other.kind(), "ignoring relay message during submit"),
            Ok(None) => return Ok(Delivery::Undelivered("relay closed the connection".to_string())),
            Err(RelayError::Codec(e)) => debug!(error = %e, "ignoring undecodable relay message"),
            Err(e) => return Ok(Delivery::Undelivered(e.to_string())),
        }
    }
}
