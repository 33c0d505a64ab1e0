use super::config::RangerConfig;
use super::keys::{load_key, user_id_for};
use rangerblock::clock::{self, Clock};
use rangerblock::identity::{sha256_hex, Identity, SigningKey};
use rangerblock::registration::{
    Consent, FileRegistrationStore, RegistrationWorkflow, SubmitOutcome,
};
use rangerblock::relay::WebSocketRelayConnector;
use std::path::PathBuf;
use std::sync::Arc;

/// Options for `rangerblock register`.
#[derive(Debug, Clone)]
pub struct RegisterOptions {
    pub display_name: String,
    pub app_type: String,
    pub relay: Option<String>,
    pub terms_version: String,
    pub key_path: Option<String>,
    pub force: bool,
    pub resync: bool,
}

/// Submit this node's registration to a relay
///
/// This command:
/// 1. Loads the node key (see `rangerblock keygen`)
/// 2. Builds a registration block binding identity and consent
/// 3. Submits it to the relay for admin approval
/// 4. Saves it locally even if the relay cannot be reached
///
/// With `--resync`, a saved but unacknowledged registration is delivered
/// again instead.
pub async fn execute(
    config: &RangerConfig,
    options: RegisterOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let relay = options
        .relay
        .clone()
        .or_else(|| config.registration.relay_address.clone())
        .ok_or("No relay address (use --relay or set [registration] relay_address)")?;

    let store = FileRegistrationStore::new(config.registration_dir());
    let mut workflow = RegistrationWorkflow::new(
        Arc::new(store.clone()),
        Arc::new(WebSocketRelayConnector::new()),
        clock::system(),
        config.submit_settings(),
    );

    let outcome = if options.resync {
        println!("🔄 Resyncing registration with {}...", relay);
        workflow.resync(&relay).await?
    } else {
        if workflow.is_registered() && !options.force {
            return Err(format!(
                "Already registered (status: {}). Use --resync to retry delivery or --force to replace it",
                workflow
                    .get_status()
                    .map(|s| s.to_string())
                    .unwrap_or_default()
            )
            .into());
        }

        let key_path = options
            .key_path
            .clone()
            .map(PathBuf::from)
            .unwrap_or_else(|| config.key_path());
        let key = load_key(&key_path)?;

        let identity = node_identity(&key, &options);
        let consent = signed_consent(&key, &options.terms_version, clock::SystemClock.now_millis());
        let block = workflow.create_registration_block(&identity, &consent)?;

        println!("📝 Submitting registration {} to {}...", block.block_id, relay);
        workflow.submit_registration(block, &relay).await?
    };

    print_outcome(&outcome);
    println!("   Saved: {}", store.path().display());
    Ok(())
}

pub fn node_identity(key: &SigningKey, options: &RegisterOptions) -> Identity {
    let public_key = key.public_key_hex();
    let user_id = user_id_for(&public_key);
    Identity {
        hardware_fingerprint_hash: sha256_hex(&format!("node:{}", user_id)),
        user_id,
        public_key,
        display_name: options.display_name.clone(),
        node_id: None,
        app_type: Some(options.app_type.clone()),
    }
}

/// Consent to `terms_version`, signed by the node key over the terms hash.
pub fn signed_consent(key: &SigningKey, terms_version: &str, accepted_at: u64) -> Consent {
    let terms_hash = sha256_hex(&format!("rangerblock-terms:{}", terms_version));
    Consent {
        signature: Some(key.sign(terms_hash.as_bytes())),
        terms_version: terms_version.to_string(),
        terms_hash,
        accepted_at: Some(accepted_at),
        age_confirmed: true,
    }
}

fn print_outcome(outcome: &SubmitOutcome) {
    let icon = if outcome.delivered { "✅" } else { "⚠️ " };
    println!("{} {}", icon, outcome.message);
    println!("   Block: {}", outcome.block_id);
    println!("   Status: {}", outcome.status);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rangerblock::identity::verify_signature;
    use rangerblock::registration::verify_block_hash;
    use rangerblock::registration::RegistrationBlock;

    fn options() -> RegisterOptions {
        RegisterOptions {
            display_name: "Scout".to_string(),
            app_type: "just-chat".to_string(),
            relay: None,
            terms_version: "1.0".to_string(),
            key_path: None,
            force: false,
            resync: false,
        }
    }

    #[test]
    fn test_identity_and_consent_build_a_valid_block() {
        let key = SigningKey::generate().unwrap();
        let identity = node_identity(&key, &options());
        let consent = signed_consent(&key, "1.0", 42);

        assert!(identity.user_id.starts_with("rb_"));
        assert!(verify_signature(
            consent.terms_hash.as_bytes(),
            consent.signature.as_deref().unwrap(),
            &identity.public_key
        ));

        let block = RegistrationBlock::create(&identity, &consent, 42).unwrap();
        assert!(verify_block_hash(&block));
        assert_eq!(block.identity.app_type, "just-chat");
    }

    #[tokio::test]
    async fn test_register_requires_a_relay() {
        let config = RangerConfig::default();
        let err = execute(&config, options()).await.unwrap_err();
        assert!(err.to_string().contains("No relay address"));
    }
}
