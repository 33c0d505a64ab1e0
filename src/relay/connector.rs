//! Trait abstraction for relay connections.
//!
//! [`WebSocketRelayConnector`] talks to a real relay; [`MockRelayConnector`]
//! scripts relay behaviour for tests.

use super::messages::RelayMessage;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

/// Relay transport errors.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Relay unreachable at {address}: {reason}")]
    Unreachable { address: String, reason: String },

    #[error("Relay connection failed: {0}")]
    Transport(String),

    #[error("Relay message encoding failed: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Opens connections to a relay.
#[async_trait]
pub trait RelayConnector: Send + Sync {
    async fn connect(&self, address: &str) -> Result<Box<dyn RelayLink>, RelayError>;
}

/// An open relay connection.
#[async_trait]
pub trait RelayLink: Send {
    async fn send(&mut self, message: &RelayMessage) -> Result<(), RelayError>;

    /// Next decodable message, or `None` once the relay has closed.
    async fn recv(&mut self) -> Result<Option<RelayMessage>, RelayError>;

    async fn close(&mut self);
}

/// `host:port` or a full `ws://` / `wss://` URL.
pub fn relay_url(address: &str) -> String {
    if address.starts_with("ws://") || address.starts_with("wss://") {
        address.to_string()
    } else {
        format!("ws://{}", address)
    }
}

/// WebSocket relay connector.
#[derive(Debug, Clone, Default)]
pub struct WebSocketRelayConnector;

impl WebSocketRelayConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RelayConnector for WebSocketRelayConnector {
    async fn connect(&self, address: &str) -> Result<Box<dyn RelayLink>, RelayError> {
        let url = relay_url(address);
        let (stream, _response) =
            connect_async(url.as_str())
                .await
                .map_err(|e| RelayError::Unreachable {
                    address: url.clone(),
                    reason: e.to_string(),
                })?;

        debug!(relay = %url, "relay connected");
        Ok(Box::new(WebSocketLink { stream }))
    }
}

struct WebSocketLink {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl RelayLink for WebSocketLink {
    async fn send(&mut self, message: &RelayMessage) -> Result<(), RelayError> {
        let text = message.to_json()?;
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))
    }

    async fn recv(&mut self) -> Result<Option<RelayMessage>, RelayError> {
        loop {
            let frame = match self.stream.next().await {
                None => return Ok(None),
                Some(Err(e)) => return Err(RelayError::Transport(e.to_string())),
                Some(Ok(frame)) => frame,
            };

            let text = match frame {
                Message::Text(text) => text,
                Message::Binary(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(_) => continue,
                },
                Message::Close(_) => return Ok(None),
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            };

            // The relay speaks more than we model; skip what we cannot decode
            match RelayMessage::from_json(&text) {
                Ok(message) => return Ok(Some(message)),
                Err(e) => debug!(error = %e, "ignoring undecodable relay frame"),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}

/// How the mock relay behaves once connected.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Refuse the connection.
    Unreachable,
    /// Answer each `send` with the next scripted reply, then close.
    Reply(VecDeque<RelayMessage>),
    /// Accept, then close without replying.
    CloseSilently,
    /// Accept and never reply.
    Hang,
}

/// Mock relay for testing.
#[derive(Clone)]
pub struct MockRelayConnector {
    state: Arc<Mutex<MockState>>,
}

struct MockState {
    behavior: MockBehavior,
    sent: Vec<RelayMessage>,
    connects: usize,
}

impl MockRelayConnector {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                behavior,
                sent: Vec::new(),
                connects: 0,
            })),
        }
    }

    pub fn unreachable() -> Self {
        Self::new(MockBehavior::Unreachable)
    }

    pub fn replying(replies: impl IntoIterator<Item = RelayMessage>) -> Self {
        Self::new(MockBehavior::Reply(replies.into_iter().collect()))
    }

    /// Change behaviour for subsequent connections.
    pub fn set_behavior(&self, behavior: MockBehavior) {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).behavior = behavior;
    }

    /// Every message sent through any link so far.
    pub fn sent(&self) -> Vec<RelayMessage> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).sent.clone()
    }

    pub fn connect_count(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).connects
    }
}

#[async_trait]
impl RelayConnector for MockRelayConnector {
    async fn connect(&self, address: &str) -> Result<Box<dyn RelayLink>, RelayError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.connects += 1;

        if matches!(state.behavior, MockBehavior::Unreachable) {
            return Err(RelayError::Unreachable {
                address: relay_url(address),
                reason: "connection refused".to_string(),
            });
        }

        Ok(Box::new(MockLink {
            state: self.state.clone(),
            awaiting_reply: false,
        }))
    }
}

struct MockLink {
    state: Arc<Mutex<MockState>>,
    awaiting_reply: bool,
}

#[async_trait]
impl RelayLink for MockLink {
    async fn send(&mut self, message: &RelayMessage) -> Result<(), RelayError> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).sent.push(message.clone());
        self.awaiting_reply = true;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<RelayMessage>, RelayError> {
        let next = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            match &mut state.behavior {
                MockBehavior::Hang => None,
                MockBehavior::Reply(replies) if self.awaiting_reply => {
                    Some(replies.pop_front())
                }
                _ => Some(None),
            }
        };

        match next {
            Some(reply) => Ok(reply),
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) {}
}
