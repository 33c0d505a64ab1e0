//! Node key file handling
//!
//! The node's Ed25519 key is stored as a hex-encoded PKCS#8 document with
//! owner-only permissions. `keygen` creates it; `sign` and `register` read it.

use super::config::RangerConfig;
use rangerblock::identity::{sha256_hex, SigningKey};
use std::fs;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

/// Create the node key and print the public half
pub fn keygen(
    config: &RangerConfig,
    output: Option<String>,
    force: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = output.map(PathBuf::from).unwrap_or_else(|| config.key_path());
    if path.exists() && !force {
        return Err(format!(
            "Key already exists at: {} (use --force to replace it)",
            path.display()
        )
        .into());
    }

    let key = SigningKey::generate()?;
    save_key(&key, &path)?;

    println!("🔑 Node key written to {}", path.display());
    println!("   Public key: {}", key.public_key_hex());
    println!("   User id:    {}", user_id_for(&key.public_key_hex()));
    Ok(())
}

/// Sign a challenge with the node key and print the signature
pub fn sign(
    config: &RangerConfig,
    key_path: Option<String>,
    challenge: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let key = load_key(&key_path.map(PathBuf::from).unwrap_or_else(|| config.key_path()))?;
    println!("{}", key.sign_challenge(&challenge));
    Ok(())
}

/// Write `key` with 0600 permissions.
pub fn save_key(key: &SigningKey, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("Failed to create key directory: {}", e))?;
    }

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .map_err(|e| format!("Failed to create key file '{}': {}", path.display(), e))?;

    let encoded = Zeroizing::new(key.to_pkcs8_hex());
    writeln!(file, "{}", encoded.as_str())
        .map_err(|e| format!("Failed to write key to '{}': {}", path.display(), e))?;

    Ok(())
}

pub fn load_key(path: &Path) -> Result<SigningKey, Box<dyn std::error::Error>> {
    let contents = Zeroizing::new(fs::read_to_string(path).map_err(|e| {
        format!(
            "Failed to read key file '{}': {} (run `rangerblock keygen` first)",
            path.display(),
            e
        )
    })?);
    Ok(SigningKey::from_pkcs8_hex(&contents)?)
}

/// `rb_<16 hex>` derived from the public key.
pub fn user_id_for(public_key_hex: &str) -> String {
    format!("rb_{}", &sha256_hex(public_key_hex)[..16])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rangerblock::identity::{is_valid_user_id, verify_signature};
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load_key() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("keys").join("node.key");

        let key = SigningKey::generate().unwrap();
        save_key(&key, &path).unwrap();

        let permissions = fs::metadata(&path).unwrap().permissions();
        assert_eq!(permissions.mode() & 0o777, 0o600);

        let loaded = load_key(&path).unwrap();
        assert_eq!(loaded.public_key_hex(), key.public_key_hex());

        let signature = loaded.sign_challenge("abcd");
        assert!(verify_signature(b"abcd", &signature, &key.public_key_hex()));
    }

    #[test]
    fn test_keygen_refuses_to_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("node.key");
        let config = RangerConfig::default();
        let output = Some(path.to_string_lossy().to_string());

        keygen(&config, output.clone(), false).unwrap();
        let first = fs::read_to_string(&path).unwrap();

        assert!(keygen(&config, output.clone(), false).is_err());
        keygen(&config, output, true).unwrap();
        assert_ne!(fs::read_to_string(&path).unwrap(), first);
    }

    #[test]
    fn test_missing_key_mentions_keygen() {
        let temp_dir = TempDir::new().unwrap();
        let err = load_key(&temp_dir.path().join("absent.key")).unwrap_err();
        assert!(err.to_string().contains("rangerblock keygen"));
    }

    #[test]
    fn test_derived_user_id_is_well_formed() {
        let key = SigningKey::generate().unwrap();
        let id = user_id_for(&key.public_key_hex());
        assert!(is_valid_user_id(&id));
        assert_eq!(id.len(), 19);
    }
}
