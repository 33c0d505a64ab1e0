//! Challenge-response authentication and session lifetime.
//!
//! Flow:
//! 1. Peer submits `userId` + public key, receives a random 32-byte nonce
//! 2. Peer signs the nonce with its private key
//! 3. Signature is checked against the key captured with the challenge
//! 4. Success yields a time-bounded session
//!
//! Sessions carry no role information. Authorization is resolved live by the
//! gatekeeper on every use.
//!
//! Expiry is enforced lazily (on verification) and eagerly (`sweep`).

use crate::clock::{Clock, Millis};
use crate::identity;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Challenge lifetime.
pub const CHALLENGE_TTL: Duration = Duration::from_secs(30);

/// Session lifetime.
pub const SESSION_TTL: Duration = Duration::from_secs(3600);

/// Interval between proactive expiry sweeps.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Timing knobs for the session manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthSettings {
    pub challenge_ttl: Duration,
    pub session_ttl: Duration,
    pub sweep_interval: Duration,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            challenge_ttl: CHALLENGE_TTL,
            session_ttl: SESSION_TTL,
            sweep_interval: SWEEP_INTERVAL,
        }
    }
}

/// Outstanding challenge awaiting a signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub challenge_id: String,
    pub user_id: String,
    /// 32 random bytes, hex-encoded. This string is what the peer signs.
    pub nonce: String,
    /// Key captured at issue time; verification never re-resolves it.
    pub public_key: String,
    pub expires_at: Millis,
    pub created_at: Millis,
}

/// Authenticated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub public_key: String,
    pub authenticated_at: Millis,
    pub expires_at: Millis,
}

/// Returned from [`AuthSessionManager::initiate_auth`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedChallenge {
    pub challenge_id: String,
    pub challenge: String,
    pub expires_at: Millis,
}

/// Returned from [`AuthSessionManager::verify_challenge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionGrant {
    pub session_id: String,
    pub user_id: String,
    pub expires_at: Millis,
}

/// Result of a session lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCheck {
    Valid {
        user_id: String,
        authenticated_at: Millis,
        expires_at: Millis,
    },
    NotFound,
    Expired,
}

impl SessionCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, SessionCheck::Valid { .. })
    }
}

/// Admin view of a live session (identifier truncated).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub session_id: String,
    pub user_id: String,
    pub authenticated_at: Millis,
    pub expires_in: Duration,
}

/// Counts removed by a sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub challenges: usize,
    pub sessions: usize,
}

/// Authentication errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Missing {0}")]
    MissingField(&'static str),

    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Invalid or expired challenge")]
    ChallengeNotFound,

    #[error("Challenge expired")]
    ChallengeExpired,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Public key does not match the key pinned for {0}")]
    KeyMismatch(String),

    #[error("No key pinned for {0}")]
    UnknownUser(String),

    #[error("{0}")]
    AccessDenied(String),
}

/// Issues challenges, verifies signatures, and tracks sessions.
///
/// Public keys are pinned by the first successful challenge: once a user has
/// proven a key, `initiate_auth` with a different key is refused. An
/// unanswered challenge pins nothing. Keys change only through
/// [`rotate_key`](Self::rotate_key), signed by the currently pinned key.
pub struct AuthSessionManager {
    settings: AuthSettings,
    clock: Arc<dyn Clock>,
    challenges: HashMap<String, Challenge>,
    sessions: HashMap<String, Session>,
    known_keys: HashMap<String, String>,
}

impl AuthSessionManager {
    pub fn new(settings: AuthSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings,
            clock,
            challenges: HashMap::new(),
            sessions: HashMap::new(),
            known_keys: HashMap::new(),
        }
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    /// Step 1: issue a challenge for `user_id` to sign.
    pub fn initiate_auth(
        &mut self,
        user_id: &str,
        public_key: &str,
    ) -> Result<IssuedChallenge, AuthError> {
        if user_id.is_empty() {
            return Err(AuthError::MissingField("userId"));
        }
        if public_key.is_empty() {
            return Err(AuthError::MissingField("publicKey"));
        }
        if !matches!(hex::decode(public_key), Ok(bytes) if bytes.len() == 32) {
            return Err(AuthError::InvalidPublicKey);
        }

        if matches!(self.known_keys.get(user_id), Some(pinned) if pinned != public_key) {
            warn!(user_id, "auth request with key that differs from pinned key");
            return Err(AuthError::KeyMismatch(user_id.to_string()));
        }

        let now = self.clock.now_millis();
        let challenge = Challenge {
            challenge_id: identity::challenge_id(),
            user_id: user_id.to_string(),
            nonce: identity::random_hex(32),
            public_key: public_key.to_string(),
            expires_at: now + self.settings.challenge_ttl.as_millis() as Millis,
            created_at: now,
        };

        let issued = IssuedChallenge {
            challenge_id: challenge.challenge_id.clone(),
            challenge: challenge.nonce.clone(),
            expires_at: challenge.expires_at,
        };

        debug!(user_id, challenge_id = %issued.challenge_id, "challenge issued");
        self.challenges
            .insert(challenge.challenge_id.clone(), challenge);

        Ok(issued)
    }

    /// Step 2: check the signed nonce. The challenge is consumed either way.
    pub fn verify_challenge(
        &mut self,
        challenge_id: &str,
        signature: &str,
    ) -> Result<SessionGrant, AuthError> {
        let pending = self
            .challenges
            .remove(challenge_id)
            .ok_or(AuthError::ChallengeNotFound)?;

        let now = self.clock.now_millis();
        if now > pending.expires_at {
            return Err(AuthError::ChallengeExpired);
        }

        if !identity::verify_signature(pending.nonce.as_bytes(), signature, &pending.public_key) {
            warn!(user_id = %pending.user_id, "challenge signature rejected");
            return Err(AuthError::InvalidSignature);
        }

        let pinned = self
            .known_keys
            .entry(pending.user_id.clone())
            .or_insert_with(|| pending.public_key.clone());
        if *pinned != pending.public_key {
            warn!(user_id = %pending.user_id, "challenge answered with key that lost the pin");
            return Err(AuthError::KeyMismatch(pending.user_id));
        }

        let session = Session {
            session_id: identity::session_id(),
            user_id: pending.user_id,
            public_key: pending.public_key,
            authenticated_at: now,
            expires_at: now + self.settings.session_ttl.as_millis() as Millis,
        };

        let grant = SessionGrant {
            session_id: session.session_id.clone(),
            user_id: session.user_id.clone(),
            expires_at: session.expires_at,
        };

        info!(user_id = %grant.user_id, "authenticated");
        self.sessions.insert(session.session_id.clone(), session);

        Ok(grant)
    }

    /// Look up a session, evicting it if expired.
    pub fn verify_session(&mut self, session_id: &str) -> SessionCheck {
        let Some(session) = self.sessions.get(session_id) else {
            return SessionCheck::NotFound;
        };

        if self.clock.now_millis() > session.expires_at {
            self.sessions.remove(session_id);
            return SessionCheck::Expired;
        }

        SessionCheck::Valid {
            user_id: session.user_id.clone(),
            authenticated_at: session.authenticated_at,
            expires_at: session.expires_at,
        }
    }

    /// Remove a session. Returns whether it existed.
    pub fn revoke_session(&mut self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    /// Replace the pinned key for `user_id`.
    ///
    /// `signature` must be made by the currently pinned key over
    /// [`rotation_message`]. Live sessions for the user are revoked.
    pub fn rotate_key(
        &mut self,
        user_id: &str,
        new_public_key: &str,
        signature: &str,
    ) -> Result<usize, AuthError> {
        if !matches!(hex::decode(new_public_key), Ok(bytes) if bytes.len() == 32) {
            return Err(AuthError::InvalidPublicKey);
        }

        let pinned = self
            .known_keys
            .get(user_id)
            .ok_or_else(|| AuthError::UnknownUser(user_id.to_string()))?;

        let message = rotation_message(user_id, new_public_key);
        if !identity::verify_signature(message.as_bytes(), signature, pinned) {
            return Err(AuthError::InvalidSignature);
        }

        self.known_keys
            .insert(user_id.to_string(), new_public_key.to_string());

        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.user_id != user_id);
        let revoked = before - self.sessions.len();

        info!(user_id, revoked, "public key rotated");
        Ok(revoked)
    }

    /// Pinned public key for a user.
    pub fn get_public_key(&self, user_id: &str) -> Option<&str> {
        self.known_keys.get(user_id).map(String::as_str)
    }

    /// Live sessions for admin display.
    pub fn active_sessions(&self) -> Vec<SessionSummary> {
        let now = self.clock.now_millis();
        let mut sessions: Vec<SessionSummary> = self
            .sessions
            .values()
            .filter(|s| s.expires_at >= now)
            .map(|s| SessionSummary {
                session_id: format!("{}...", &s.session_id[..s.session_id.len().min(12)]),
                user_id: s.user_id.clone(),
                authenticated_at: s.authenticated_at,
                expires_in: Duration::from_millis(s.expires_at - now),
            })
            .collect();
        sessions.sort_by_key(|s| s.authenticated_at);
        sessions
    }

    pub fn challenge_count(&self) -> usize {
        self.challenges.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Drop expired challenges and sessions.
    pub fn sweep(&mut self) -> SweepReport {
        let now = self.clock.now_millis();

        let challenges_before = self.challenges.len();
        self.challenges.retain(|_, c| now <= c.expires_at);

        let sessions_before = self.sessions.len();
        self.sessions.retain(|_, s| now <= s.expires_at);

        let report = SweepReport {
            challenges: challenges_before - self.challenges.len(),
            sessions: sessions_before - self.sessions.len(),
        };

        if report != SweepReport::default() {
            debug!(
                challenges = report.challenges,
                sessions = report.sessions,
                "expired auth state swept"
            );
        }

        report
    }
}

/// Message a peer signs to rotate its key.
pub fn rotation_message(user_id: &str, new_public_key: &str) -> String {
    format!("rotate:{}:{}", user_id, new_public_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::identity::SigningKey;

    fn manager() -> (AuthSessionManager, ManualClock) {
        let clock = ManualClock::new(1_000_000);
        let manager = AuthSessionManager::new(AuthSettings::default(), Arc::new(clock.clone()));
        (manager, clock)
    }

    fn authenticate(manager: &mut AuthSessionManager, user: &str, key: &SigningKey) -> SessionGrant {
        let issued = manager.initiate_auth(user, &key.public_key_hex()).unwrap();
        let signature = key.sign_challenge(&issued.challenge);
        manager
            .verify_challenge(&issued.challenge_id, &signature)
            .unwrap()
    }

    #[test]
    fn test_full_handshake_produces_valid_session() {
        let (mut manager, _clock) = manager();
        let key = SigningKey::generate().unwrap();

        let grant = authenticate(&mut manager, "rb_01", &key);
        assert!(grant.session_id.starts_with("sess_"));
        assert_eq!(grant.user_id, "rb_01");

        match manager.verify_session(&grant.session_id) {
            SessionCheck::Valid {
                user_id,
                expires_at,
                ..
            } => {
                assert_eq!(user_id, "rb_01");
                assert_eq!(expires_at, grant.expires_at);
            }
            other => panic!("expected valid session, got {:?}", other),
        }
    }

    #[test]
    fn test_challenge_has_32_byte_nonce_and_30s_ttl() {
        let (mut manager, clock) = manager();
        let key = SigningKey::generate().unwrap();

        let issued = manager.initiate_auth("rb_01", &key.public_key_hex()).unwrap();
        assert_eq!(issued.challenge.len(), 64);
        assert!(issued.challenge_id.starts_with("chal_"));
        assert_eq!(issued.expires_at, clock.now_millis() + 30_000);
    }

    #[test]
    fn test_challenge_is_single_use() {
        let (mut manager, _clock) = manager();
        let key = SigningKey::generate().unwrap();

        let issued = manager.initiate_auth("rb_01", &key.public_key_hex()).unwrap();
        let signature = key.sign_challenge(&issued.challenge);

        assert!(manager
            .verify_challenge(&issued.challenge_id, &signature)
            .is_ok());
        assert_eq!(
            manager.verify_challenge(&issued.challenge_id, &signature),
            Err(AuthError::ChallengeNotFound)
        );
    }

    #[test]
    fn test_bad_signature_consumes_challenge() {
        let (mut manager, _clock) = manager();
        let key = SigningKey::generate().unwrap();
        let impostor = SigningKey::generate().unwrap();

        let issued = manager.initiate_auth("rb_01", &key.public_key_hex()).unwrap();
        let forged = impostor.sign_challenge(&issued.challenge);

        assert_eq!(
            manager.verify_challenge(&issued.challenge_id, &forged),
            Err(AuthError::InvalidSignature)
        );

        // Even the right signature is now too late
        let genuine = key.sign_challenge(&issued.challenge);
        assert_eq!(
            manager.verify_challenge(&issued.challenge_id, &genuine),
            Err(AuthError::ChallengeNotFound)
        );
    }

    #[test]
    fn test_expired_challenge_fails() {
        let (mut manager, clock) = manager();
        let key = SigningKey::generate().unwrap();

        let issued = manager.initiate_auth("rb_01", &key.public_key_hex()).unwrap();
        clock.advance(Duration::from_secs(31));

        let signature = key.sign_challenge(&issued.challenge);
        assert_eq!(
            manager.verify_challenge(&issued.challenge_id, &signature),
            Err(AuthError::ChallengeExpired)
        );
        assert_eq!(manager.challenge_count(), 0);
    }

    #[test]
    fn test_challenge_valid_exactly_at_expiry() {
        let (mut manager, clock) = manager();
        let key = SigningKey::generate().unwrap();

        let issued = manager.initiate_auth("rb_01", &key.public_key_hex()).unwrap();
        clock.set(issued.expires_at);

        let signature = key.sign_challenge(&issued.challenge);
        assert!(manager
            .verify_challenge(&issued.challenge_id, &signature)
            .is_ok());
    }

    #[test]
    fn test_session_expires_and_is_evicted() {
        let (mut manager, clock) = manager();
        let key = SigningKey::generate().unwrap();
        let grant = authenticate(&mut manager, "rb_01", &key);

        clock.advance(Duration::from_secs(3599));
        assert!(manager.verify_session(&grant.session_id).is_valid());

        clock.advance(Duration::from_secs(2));
        assert_eq!(
            manager.verify_session(&grant.session_id),
            SessionCheck::Expired
        );
        assert_eq!(
            manager.verify_session(&grant.session_id),
            SessionCheck::NotFound
        );
        assert_eq!(manager.session_count(), 0);
    }

    #[test]
    fn test_revoke_is_idempotent() {
        let (mut manager, _clock) = manager();
        let key = SigningKey::generate().unwrap();
        let grant = authenticate(&mut manager, "rb_01", &key);

        assert!(manager.revoke_session(&grant.session_id));
        assert!(!manager.revoke_session(&grant.session_id));
        assert_eq!(
            manager.verify_session(&grant.session_id),
            SessionCheck::NotFound
        );
    }

    #[test]
    fn test_missing_and_malformed_inputs() {
        let (mut manager, _clock) = manager();
        assert_eq!(
            manager.initiate_auth("", "aa"),
            Err(AuthError::MissingField("userId"))
        );
        assert_eq!(
            manager.initiate_auth("rb_01", ""),
            Err(AuthError::MissingField("publicKey"))
        );
        assert_eq!(
            manager.initiate_auth("rb_01", "abcd"),
            Err(AuthError::InvalidPublicKey)
        );
    }

    #[test]
    fn test_key_is_pinned_after_first_verified_challenge() {
        let (mut manager, _clock) = manager();
        let key = SigningKey::generate().unwrap();
        let other = SigningKey::generate().unwrap();

        manager.initiate_auth("rb_01", &key.public_key_hex()).unwrap();
        assert_eq!(manager.get_public_key("rb_01"), None);

        authenticate(&mut manager, "rb_01", &key);
        assert_eq!(
            manager.initiate_auth("rb_01", &other.public_key_hex()),
            Err(AuthError::KeyMismatch("rb_01".to_string()))
        );
        assert_eq!(
            manager.get_public_key("rb_01"),
            Some(key.public_key_hex().as_str())
        );
    }

    #[test]
    fn test_unverified_request_does_not_pin_key() {
        let (mut manager, _clock) = manager();
        let victim = SigningKey::generate().unwrap();
        let squatter = SigningKey::generate().unwrap();

        manager
            .initiate_auth("rb_01", &squatter.public_key_hex())
            .unwrap();

        let grant = authenticate(&mut manager, "rb_01", &victim);
        assert_eq!(grant.user_id, "rb_01");
        assert_eq!(
            manager.get_public_key("rb_01"),
            Some(victim.public_key_hex().as_str())
        );
    }

    #[test]
    fn test_outstanding_challenge_loses_race_to_verified_key() {
        let (mut manager, _clock) = manager();
        let first = SigningKey::generate().unwrap();
        let second = SigningKey::generate().unwrap();

        let late = manager
            .initiate_auth("rb_01", &second.public_key_hex())
            .unwrap();
        authenticate(&mut manager, "rb_01", &first);

        let signature = second.sign_challenge(&late.challenge);
        assert_eq!(
            manager.verify_challenge(&late.challenge_id, &signature),
            Err(AuthError::KeyMismatch("rb_01".to_string()))
        );
        assert_eq!(
            manager.get_public_key("rb_01"),
            Some(first.public_key_hex().as_str())
        );
    }

    #[test]
    fn test_signed_rotation_replaces_key_and_revokes_sessions() {
        let (mut manager, _clock) = manager();
        let old = SigningKey::generate().unwrap();
        let new = SigningKey::generate().unwrap();
        let grant = authenticate(&mut manager, "rb_01", &old);

        let message = rotation_message("rb_01", &new.public_key_hex());
        let revoked = manager
            .rotate_key("rb_01", &new.public_key_hex(), &old.sign(message.as_bytes()))
            .unwrap();

        assert_eq!(revoked, 1);
        assert!(!manager.verify_session(&grant.session_id).is_valid());
        authenticate(&mut manager, "rb_01", &new);
    }

    #[test]
    fn test_rotation_signed_by_new_key_is_rejected() {
        let (mut manager, _clock) = manager();
        let old = SigningKey::generate().unwrap();
        let new = SigningKey::generate().unwrap();
        authenticate(&mut manager, "rb_01", &old);

        let message = rotation_message("rb_01", &new.public_key_hex());
        assert_eq!(
            manager.rotate_key("rb_01", &new.public_key_hex(), &new.sign(message.as_bytes())),
            Err(AuthError::InvalidSignature)
        );
        assert_eq!(
            manager.rotate_key("rb_02", &new.public_key_hex(), "00"),
            Err(AuthError::UnknownUser("rb_02".to_string()))
        );
    }

    #[test]
    fn test_sweep_removes_only_expired_state() {
        let (mut manager, clock) = manager();
        let key = SigningKey::generate().unwrap();

        let grant = authenticate(&mut manager, "rb_01", &key);
        manager.initiate_auth("rb_01", &key.public_key_hex()).unwrap();

        clock.advance(Duration::from_secs(60));
        let report = manager.sweep();
        assert_eq!(
            report,
            SweepReport {
                challenges: 1,
                sessions: 0
            }
        );

        clock.advance(Duration::from_secs(3600));
        let report = manager.sweep();
        assert_eq!(report.sessions, 1);
        assert!(!manager.verify_session(&grant.session_id).is_valid());
    }

    #[test]
    fn test_active_sessions_truncates_ids() {
        let (mut manager, _clock) = manager();
        let key = SigningKey::generate().unwrap();
        authenticate(&mut manager, "rb_01", &key);

        let sessions = manager.active_sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session_id.len(), 15);
        assert!(sessions[0].session_id.ends_with("..."));
        assert_eq!(sessions[0].expires_in, SESSION_TTL);
    }
}
