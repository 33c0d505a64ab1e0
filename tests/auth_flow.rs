//! Auth server end-to-end: a real WebSocket client against an in-process
//! server bound to an ephemeral port.

use futures_util::{SinkExt, StreamExt};
use rangerblock::auth::{AuthHandler, AuthResponse, AuthServer, AuthSessionManager, AuthSettings};
use rangerblock::clock;
use rangerblock::gatekeeper::{AccessControlRegistry, MemoryAccessStore, SUPREME_USER_ID};
use rangerblock::identity::SigningKey;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Harness {
    addr: SocketAddr,
    registry: AccessControlRegistry,
    shutdown: Option<oneshot::Sender<()>>,
    server: tokio::task::JoinHandle<()>,
}

impl Harness {
    async fn start() -> Self {
        let clock = clock::system();
        let store = Arc::new(MemoryAccessStore::new());
        let registry = AccessControlRegistry::new(store.clone(), clock.clone());
        let handler = AuthHandler::new(
            AuthSessionManager::new(AuthSettings::default(), clock.clone()),
            AccessControlRegistry::new(store, clock),
        );

        let server = AuthServer::bind("127.0.0.1:0", handler).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            server
                .run_until(async {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            registry,
            shutdown: Some(tx),
            server,
        }
    }

    async fn connect(&self) -> Client {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{}", self.addr))
            .await
            .unwrap();
        ws
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.server.await.unwrap();
    }
}

async fn exchange(ws: &mut Client, frame: Value) -> AuthResponse {
    ws.send(Message::Text(frame.to_string())).await.unwrap();
    exchange_reply(ws).await
}

async fn exchange_reply(ws: &mut Client) -> AuthResponse {
    loop {
        match ws.next().await.unwrap().unwrap() {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}

async fn authenticate(ws: &mut Client, user_id: &str, key: &SigningKey) -> String {
    let challenge = exchange(
        ws,
        json!({ "type": "authRequest", "userId": user_id, "publicKey": key.public_key_hex() }),
    )
    .await;
    let AuthResponse::AuthChallenge {
        challenge_id,
        challenge,
        ..
    } = challenge
    else {
        panic!("expected challenge, got {:?}", challenge);
    };

    let success = exchange(
        ws,
        json!({
            "type": "authResponse",
            "challengeId": challenge_id,
            "signature": key.sign_challenge(&challenge),
        }),
    )
    .await;
    match success {
        AuthResponse::AuthSuccess {
            session_id,
            user_id: granted,
            ..
        } => {
            assert_eq!(granted, user_id);
            session_id
        }
        other => panic!("expected authSuccess, got {:?}", other),
    }
}

#[tokio::test]
async fn test_full_handshake_verify_and_revoke() {
    let harness = Harness::start().await;
    let mut ws = harness.connect().await;
    let key = SigningKey::generate().unwrap();

    let session_id = authenticate(&mut ws, "rb_scout", &key).await;
    assert!(session_id.starts_with("sess_"));

    let status = exchange(&mut ws, json!({ "type": "sessionVerify", "sessionId": session_id })).await;
    match status {
        AuthResponse::SessionStatus { valid, user_id, .. } => {
            assert!(valid);
            assert_eq!(user_id.as_deref(), Some("rb_scout"));
        }
        other => panic!("expected sessionStatus, got {:?}", other),
    }

    let revoked = exchange(&mut ws, json!({ "type": "sessionRevoke", "sessionId": session_id })).await;
    assert_eq!(revoked, AuthResponse::SessionRevoked { revoked: true });

    let status = exchange(&mut ws, json!({ "type": "sessionVerify", "sessionId": session_id })).await;
    match status {
        AuthResponse::SessionStatus { valid, error, .. } => {
            assert!(!valid);
            assert_eq!(error.as_deref(), Some("Session not found"));
        }
        other => panic!("expected sessionStatus, got {:?}", other),
    }

    harness.stop().await;
}

#[tokio::test]
async fn test_malformed_frames_get_error_replies() {
    let harness = Harness::start().await;
    let mut ws = harness.connect().await;

    ws.send(Message::Text("{not json".to_string())).await.unwrap();
    assert_eq!(
        exchange_reply(&mut ws).await,
        AuthResponse::error("Invalid message format")
    );

    let unknown = exchange(&mut ws, json!({ "type": "launchMissiles" })).await;
    assert_eq!(unknown, AuthResponse::error("Unknown auth message type"));

    let missing = exchange(&mut ws, json!({ "type": "authRequest", "userId": "rb_x" })).await;
    assert_eq!(missing, AuthResponse::error("Missing userId or publicKey"));

    // The connection survives all of the above.
    let key = SigningKey::generate().unwrap();
    authenticate(&mut ws, "rb_after_errors", &key).await;

    harness.stop().await;
}

#[tokio::test]
async fn test_wrong_key_signature_is_rejected() {
    let harness = Harness::start().await;
    let mut ws = harness.connect().await;
    let key = SigningKey::generate().unwrap();
    let impostor = SigningKey::generate().unwrap();

    let challenge = exchange(
        &mut ws,
        json!({ "type": "authRequest", "userId": "rb_victim", "publicKey": key.public_key_hex() }),
    )
    .await;
    let AuthResponse::AuthChallenge {
        challenge_id,
        challenge,
        ..
    } = challenge
    else {
        panic!("expected challenge");
    };

    let reply = exchange(
        &mut ws,
        json!({
            "type": "authResponse",
            "challengeId": challenge_id,
            "signature": impostor.sign_challenge(&challenge),
        }),
    )
    .await;
    assert_eq!(reply, AuthResponse::error("Invalid signature"));

    // The challenge was consumed by the failed attempt.
    let replay = exchange(
        &mut ws,
        json!({
            "type": "authResponse",
            "challengeId": challenge_id,
            "signature": key.sign_challenge(&challenge),
        }),
    )
    .await;
    assert_eq!(replay, AuthResponse::error("Invalid or expired challenge"));

    harness.stop().await;
}

#[tokio::test]
async fn test_pinned_key_blocks_impersonation_across_connections() {
    let harness = Harness::start().await;
    let key = SigningKey::generate().unwrap();

    let mut first = harness.connect().await;
    authenticate(&mut first, "rb_pinned", &key).await;

    let mut second = harness.connect().await;
    let impostor = SigningKey::generate().unwrap();
    let reply = exchange(
        &mut second,
        json!({ "type": "authRequest", "userId": "rb_pinned", "publicKey": impostor.public_key_hex() }),
    )
    .await;
    assert!(reply.is_error());

    harness.stop().await;
}

#[tokio::test]
async fn test_banned_user_gets_no_challenge() {
    let harness = Harness::start().await;
    harness
        .registry
        .ban(SUPREME_USER_ID, "rb_troll", Some("spam".to_string()))
        .unwrap();

    let mut ws = harness.connect().await;
    let key = SigningKey::generate().unwrap();
    let reply = exchange(
        &mut ws,
        json!({ "type": "authRequest", "userId": "rb_troll", "publicKey": key.public_key_hex() }),
    )
    .await;
    assert!(reply.is_error());
    assert!(!matches!(reply, AuthResponse::AuthChallenge { .. }));

    harness.stop().await;
}
