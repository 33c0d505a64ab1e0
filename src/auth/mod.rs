//! Challenge-response authentication.
//!
//! - Session: challenges, signatures, session lifetime, key pinning
//! - Handler: JSON wire protocol over the session manager
//! - Server: standalone WebSocket endpoint with a periodic sweep

pub mod handler;
pub mod server;
pub mod session;

pub use handler::{AuthHandler, AuthRequest, AuthResponse};
pub use server::{AuthServer, ServerError, SharedHandler, DEFAULT_PORT};
pub use session::{
    rotation_message, AuthError, AuthSessionManager, AuthSettings, IssuedChallenge, SessionCheck,
    SessionGrant, SessionSummary, SweepReport, CHALLENGE_TTL, SESSION_TTL, SWEEP_INTERVAL,
};
