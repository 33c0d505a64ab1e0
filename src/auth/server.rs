//! Standalone WebSocket auth server.
//!
//! One task per connection, one response per inbound frame. Shared state sits
//! behind a std mutex that is only taken on the blocking pool, so a handler
//! doing file I/O on the access store never stalls a runtime worker.

use super::handler::{AuthHandler, AuthResponse, INVALID_FORMAT};
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

pub const DEFAULT_PORT: u16 = 5557;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind auth server: {0}")]
    Bind(std::io::Error),

    #[error("Auth server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SharedHandler = Arc<Mutex<AuthHandler>>;

pub struct AuthServer {
    listener: TcpListener,
    handler: SharedHandler,
    sweep_interval: Duration,
}

impl AuthServer {
    pub async fn bind(addr: impl ToSocketAddrs, handler: AuthHandler) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).await.map_err(ServerError::Bind)?;
        let sweep_interval = handler.manager().settings().sweep_interval;

        Ok(Self {
            listener,
            handler: Arc::new(Mutex::new(handler)),
            sweep_interval,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn handler(&self) -> SharedHandler {
        Arc::clone(&self.handler)
    }

    /// Serve until Ctrl-C.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Serve until `shutdown` resolves.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<(), ServerError> {
        let addr = self.local_addr()?;
        info!(%addr, "auth server listening");

        let sweeper = tokio::spawn(sweep_loop(Arc::clone(&self.handler), self.sweep_interval));
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("auth server shutting down");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tokio::spawn(serve_connection(stream, peer, Arc::clone(&self.handler)));
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                },
            }
        }

        sweeper.abort();
        Ok(())
    }
}

async fn sweep_loop(handler: SharedHandler, period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let shared = Arc::clone(&handler);
        let swept = tokio::task::spawn_blocking(move || {
            shared
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .manager_mut()
                .sweep();
        })
        .await;
        if let Err(e) = swept {
            warn!(error = %e, "auth sweep task failed");
        }
    }
}

async fn serve_connection(stream: TcpStream, peer: SocketAddr, handler: SharedHandler) {
    let mut ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!(%peer, error = %e, "websocket handshake failed");
            return;
        }
    };
    debug!(%peer, "auth client connected");

    while let Some(frame) = ws.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(bytes)) => String::from_utf8(bytes).unwrap_or_default(),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(%peer, error = %e, "auth connection error");
                break;
            }
        };

        let shared = Arc::clone(&handler);
        let response = match tokio::task::spawn_blocking(move || {
            shared
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .handle_text(&text)
        })
        .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(%peer, error = %e, "auth handler task failed");
                break;
            }
        };

        match &response {
            AuthResponse::AuthSuccess { user_id, .. } => info!(%peer, user_id, "auth success"),
            AuthResponse::AuthError { error } if error != INVALID_FORMAT => {
                info!(%peer, error, "auth failed")
            }
            _ => {}
        }

        let encoded = match response.to_json() {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(error = %e, "failed to encode auth response");
                continue;
            }
        };
        if ws.send(Message::Text(encoded)).await.is_err() {
            break;
        }
    }

    debug!(%peer, "auth client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthSessionManager, AuthSettings};
    use crate::clock;
    use crate::gatekeeper::{AccessControlRegistry, MemoryAccessStore};
    use serde_json::json;
    use tokio::sync::oneshot;

    #[tokio::test]
    #[allow(clippy::await_holding_lock)]
    async fn test_held_handler_lock_does_not_stall_other_connections() {
        let clock = clock::system();
        let handler = AuthHandler::new(
            AuthSessionManager::new(AuthSettings::default(), clock.clone()),
            AccessControlRegistry::new(Arc::new(MemoryAccessStore::new()), clock),
        );
        let server = AuthServer::bind("127.0.0.1:0", handler).await.unwrap();
        let addr = server.local_addr().unwrap();
        let shared = server.handler();
        let (stop, stopped) = oneshot::channel::<()>();
        let running = tokio::spawn(async move {
            server
                .run_until(async {
                    let _ = stopped.await;
                })
                .await
                .unwrap();
        });

        let url = format!("ws://{}", addr);
        let (mut first, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();

        // This runtime has a single thread; a handler locked on it would deadlock.
        let guard = shared.lock().unwrap();
        first
            .send(Message::Text(
                json!({ "type": "sessionVerify", "sessionId": "sess_missing" }).to_string(),
            ))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let second = tokio::time::timeout(
            Duration::from_secs(2),
            tokio_tungstenite::connect_async(url.as_str()),
        )
        .await;
        assert!(matches!(second, Ok(Ok(_))));
        drop(guard);

        let reply = loop {
            match first.next().await.unwrap().unwrap() {
                Message::Text(text) => break serde_json::from_str::<AuthResponse>(&text).unwrap(),
                _ => continue,
            }
        };
        assert!(matches!(reply, AuthResponse::SessionStatus { valid: false, .. }));

        let _ = stop.send(());
        running.await.unwrap();
    }
}
