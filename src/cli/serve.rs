use super::config::RangerConfig;
use rangerblock::auth::{AuthHandler, AuthServer, AuthSessionManager};
use rangerblock::clock;
use rangerblock::gatekeeper::{AccessControlRegistry, JsonFileStore};
use std::sync::Arc;

/// Run the standalone auth server
///
/// Binds `0.0.0.0:<port>` (flag, then `[auth] port`), serves the auth wire
/// protocol until Ctrl-C, and sweeps expired challenges and sessions on the
/// configured interval. Access checks read the admin data directory live.
pub async fn execute(config: &RangerConfig, port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let port = port.unwrap_or(config.auth.port);
    let clock = clock::system();

    let access_dir = config.access_dir();
    let registry = AccessControlRegistry::new(
        Arc::new(JsonFileStore::new(access_dir.clone())),
        clock.clone(),
    );
    let manager = AuthSessionManager::new(config.auth_settings(), clock);

    let server = AuthServer::bind(("0.0.0.0", port), AuthHandler::new(manager, registry)).await?;

    println!("🔐 RangerBlock Auth Server");
    println!("   Listening on port {}", server.local_addr()?.port());
    println!("   Access data: {}", access_dir.display());
    println!("   Press Ctrl-C to stop");
    println!();

    server.run().await?;

    println!("👋 Auth server stopped");
    Ok(())
}
