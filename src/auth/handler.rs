//! Auth wire protocol.
//!
//! Requests and responses are JSON objects discriminated by `type`. Every
//! request gets exactly one response; failures are `authError` frames, never
//! dropped connections.

use super::session::{AuthError, AuthSessionManager, SessionCheck};
use crate::clock::Millis;
use crate::gatekeeper::AccessControlRegistry;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const INVALID_FORMAT: &str = "Invalid message format";
pub const UNKNOWN_TYPE: &str = "Unknown auth message type";

/// Inbound auth message. Fields are optional so that a missing field yields a
/// descriptive error rather than a parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum AuthRequest {
    AuthRequest {
        #[serde(default)]
        user_id: Option<String>,
        #[serde(default)]
        public_key: Option<String>,
    },
    AuthResponse {
        #[serde(default)]
        challenge_id: Option<String>,
        #[serde(default)]
        signature: Option<String>,
    },
    SessionVerify {
        #[serde(default)]
        session_id: Option<String>,
    },
    SessionRevoke {
        #[serde(default)]
        session_id: Option<String>,
    },
    KeyRotate {
        #[serde(default)]
        user_id: Option<String>,
        #[serde(default)]
        new_public_key: Option<String>,
        #[serde(default)]
        signature: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

/// Outbound auth message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum AuthResponse {
    AuthChallenge {
        challenge_id: String,
        challenge: String,
        expires_at: Millis,
    },
    AuthSuccess {
        session_id: String,
        user_id: String,
        expires_at: Millis,
    },
    AuthError {
        error: String,
    },
    SessionStatus {
        valid: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        authenticated_at: Option<Millis>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expires_at: Option<Millis>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    SessionRevoked {
        revoked: bool,
    },
    KeyRotated {
        user_id: String,
        revoked_sessions: usize,
    },
}

impl AuthResponse {
    pub fn error(message: impl Into<String>) -> Self {
        AuthResponse::AuthError {
            error: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, AuthResponse::AuthError { .. })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<AuthError> for AuthResponse {
    fn from(e: AuthError) -> Self {
        AuthResponse::error(e.to_string())
    }
}

impl From<SessionCheck> for AuthResponse {
    fn from(check: SessionCheck) -> Self {
        let not_valid = |error: &str| AuthResponse::SessionStatus {
            valid: false,
            user_id: None,
            authenticated_at: None,
            expires_at: None,
            error: Some(error.to_string()),
        };

        match check {
            SessionCheck::Valid {
                user_id,
                authenticated_at,
                expires_at,
            } => AuthResponse::SessionStatus {
                valid: true,
                user_id: Some(user_id),
                authenticated_at: Some(authenticated_at),
                expires_at: Some(expires_at),
                error: None,
            },
            SessionCheck::NotFound => not_valid("Session not found"),
            SessionCheck::Expired => not_valid("Session expired"),
        }
    }
}

/// Dispatches auth messages to the session manager, consulting the access
/// registry before any challenge is issued.
pub struct AuthHandler {
    manager: AuthSessionManager,
    access: AccessControlRegistry,
}

impl AuthHandler {
    pub fn new(manager: AuthSessionManager, access: AccessControlRegistry) -> Self {
        Self { manager, access }
    }

    pub fn manager(&self) -> &AuthSessionManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut AuthSessionManager {
        &mut self.manager
    }

    /// Handle one raw frame.
    pub fn handle_text(&mut self, text: &str) -> AuthResponse {
        match serde_json::from_str::<AuthRequest>(text) {
            Ok(request) => self.handle(request),
            Err(e) => {
                warn!(error = %e, "undecodable auth frame");
                AuthResponse::error(INVALID_FORMAT)
            }
        }
    }

    pub fn handle(&mut self, request: AuthRequest) -> AuthResponse {
        match request {
            AuthRequest::AuthRequest {
                user_id: Some(user_id),
                public_key: Some(public_key),
            } if !user_id.is_empty() && !public_key.is_empty() => {
                let decision = self.access.can_connect(&user_id);
                if !decision.allowed {
                    info!(user_id, "auth refused for banned peer");
                    return AuthResponse::error(
                        decision.reason.unwrap_or_else(|| "Access denied".to_string()),
                    );
                }

                match self.manager.initiate_auth(&user_id, &public_key) {
                    Ok(issued) => AuthResponse::AuthChallenge {
                        challenge_id: issued.challenge_id,
                        challenge: issued.challenge,
                        expires_at: issued.expires_at,
                    },
                    Err(e) => e.into(),
                }
            }
            AuthRequest::AuthRequest { .. } => AuthResponse::error("Missing userId or publicKey"),

            AuthRequest::AuthResponse {
                challenge_id: Some(challenge_id),
                signature: Some(signature),
            } => match self.manager.verify_challenge(&challenge_id, &signature) {
                Ok(grant) => AuthResponse::AuthSuccess {
                    session_id: grant.session_id,
                    user_id: grant.user_id,
                    expires_at: grant.expires_at,
                },
                Err(e) => e.into(),
            },
            AuthRequest::AuthResponse { .. } => {
                AuthResponse::error("Missing challengeId or signature")
            }

            AuthRequest::SessionVerify {
                session_id: Some(session_id),
            } => self.manager.verify_session(&session_id).into(),

            AuthRequest::SessionRevoke {
                session_id: Some(session_id),
            } => AuthResponse::SessionRevoked {
                revoked: self.manager.revoke_session(&session_id),
            },
            AuthRequest::SessionVerify { session_id: None }
            | AuthRequest::SessionRevoke { session_id: None } => {
                AuthResponse::error("Missing sessionId")
            }

            AuthRequest::KeyRotate {
                user_id: Some(user_id),
                new_public_key: Some(new_public_key),
                signature: Some(signature),
            } => match self
                .manager
                .rotate_key(&user_id, &new_public_key, &signature)
            {
                Ok(revoked_sessions) => AuthResponse::KeyRotated {
                    user_id,
                    revoked_sessions,
                },
                Err(e) => e.into(),
            },
            AuthRequest::KeyRotate { .. } => {
                AuthResponse::error("Missing userId, newPublicKey or signature")
            }

            AuthRequest::Unknown => AuthResponse::error(UNKNOWN_TYPE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::session::{rotation_message, AuthSettings};
    use crate::clock::ManualClock;
    use crate::gatekeeper::{AccessStore, BanEntry, MemoryAccessStore};
    use crate::identity::SigningKey;
    use serde_json::json;
    use std::sync::Arc;

    fn handler() -> (AuthHandler, Arc<MemoryAccessStore>) {
        let clock: Arc<ManualClock> = Arc::new(ManualClock::new(5_000));
        let store = Arc::new(MemoryAccessStore::new());
        let registry = AccessControlRegistry::new(store.clone(), clock.clone());
        let manager = AuthSessionManager::new(AuthSettings::default(), clock);
        (AuthHandler::new(manager, registry), store)
    }

    fn send(handler: &mut AuthHandler, value: serde_json::Value) -> AuthResponse {
        handler.handle_text(&value.to_string())
    }

    #[test]
    fn test_full_exchange_over_json() {
        let (mut handler, _store) = handler();
        let key = SigningKey::generate().unwrap();

        let (challenge_id, challenge) = match send(
            &mut handler,
            json!({"type": "authRequest", "userId": "rb_01", "publicKey": key.public_key_hex()}),
        ) {
            AuthResponse::AuthChallenge {
                challenge_id,
                challenge,
                ..
            } => (challenge_id, challenge),
            other => panic!("expected challenge, got {:?}", other),
        };

        let session_id = match send(
            &mut handler,
            json!({
                "type": "authResponse",
                "challengeId": challenge_id,
                "signature": key.sign_challenge(&challenge),
            }),
        ) {
            AuthResponse::AuthSuccess { session_id, .. } => session_id,
            other => panic!("expected success, got {:?}", other),
        };

        let status = send(
            &mut handler,
            json!({"type": "sessionVerify", "sessionId": session_id}),
        );
        assert!(matches!(status, AuthResponse::SessionStatus { valid: true, .. }));

        assert_eq!(
            send(
                &mut handler,
                json!({"type": "sessionRevoke", "sessionId": session_id})
            ),
            AuthResponse::SessionRevoked { revoked: true }
        );
        assert_eq!(
            send(
                &mut handler,
                json!({"type": "sessionVerify", "sessionId": session_id})
            ),
            AuthResponse::SessionStatus {
                valid: false,
                user_id: None,
                authenticated_at: None,
                expires_at: None,
                error: Some("Session not found".to_string()),
            }
        );
    }

    #[test]
    fn test_error_strings() {
        let (mut handler, _store) = handler();

        assert_eq!(
            handler.handle_text("not json"),
            AuthResponse::error(INVALID_FORMAT)
        );
        assert_eq!(
            send(&mut handler, json!({"type": "launchMissiles"})),
            AuthResponse::error(UNKNOWN_TYPE)
        );
        assert_eq!(
            send(&mut handler, json!({"type": "authRequest", "userId": "rb_01"})),
            AuthResponse::error("Missing userId or publicKey")
        );
        assert_eq!(
            send(&mut handler, json!({"type": "authResponse", "signature": "aa"})),
            AuthResponse::error("Missing challengeId or signature")
        );
        assert_eq!(
            send(&mut handler, json!({"type": "sessionVerify"})),
            AuthResponse::error("Missing sessionId")
        );
        assert_eq!(
            send(
                &mut handler,
                json!({"type": "authResponse", "challengeId": "chal_00", "signature": "aa"})
            ),
            AuthResponse::error("Invalid or expired challenge")
        );
    }

    #[test]
    fn test_banned_peer_gets_no_challenge() {
        let (mut handler, store) = handler();
        store
            .put_ban(
                "rb_bad",
                BanEntry {
                    reason: Some("spam".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        let key = SigningKey::generate().unwrap();

        let response = send(
            &mut handler,
            json!({"type": "authRequest", "userId": "rb_bad", "publicKey": key.public_key_hex()}),
        );
        assert!(response.is_error());
        assert_eq!(handler.manager().challenge_count(), 0);
    }

    #[test]
    fn test_key_rotation_over_json() {
        let (mut handler, _store) = handler();
        let old = SigningKey::generate().unwrap();
        let new = SigningKey::generate().unwrap();

        send(
            &mut handler,
            json!({"type": "authRequest", "userId": "rb_01", "publicKey": old.public_key_hex()}),
        );

        let message = rotation_message("rb_01", &new.public_key_hex());
        let response = send(
            &mut handler,
            json!({
                "type": "keyRotate",
                "userId": "rb_01",
                "newPublicKey": new.public_key_hex(),
                "signature": old.sign(message.as_bytes()),
            }),
        );
        assert_eq!(
            response,
            AuthResponse::KeyRotated {
                user_id: "rb_01".to_string(),
                revoked_sessions: 0
            }
        );
        assert_eq!(
            handler.manager().get_public_key("rb_01"),
            Some(new.public_key_hex().as_str())
        );
    }

    #[test]
    fn test_response_wire_shape() {
        let json = AuthResponse::SessionRevoked { revoked: false }
            .to_json()
            .unwrap();
        assert_eq!(json, r#"{"type":"sessionRevoked","revoked":false}"#);

        let json = AuthResponse::AuthChallenge {
            challenge_id: "chal_1".to_string(),
            challenge: "ab".to_string(),
            expires_at: 9,
        }
        .to_json()
        .unwrap();
        assert_eq!(
            json,
            r#"{"type":"authChallenge","challengeId":"chal_1","challenge":"ab","expiresAt":9}"#
        );
    }
}
