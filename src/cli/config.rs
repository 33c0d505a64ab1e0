//! RangerBlock operator configuration
//!
//! TOML file at `<data_dir>/rangerblock/config.toml`, generated with commented
//! defaults on first use. Library components take plain settings structs; this
//! module is the only place that maps the file onto them.

use rangerblock::auth::{AuthSettings, DEFAULT_PORT};
use rangerblock::ledger::{LedgerSettings, DEFAULT_DIFFICULTY, DEFAULT_MINING_REWARD};
use rangerblock::registration::SubmitSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default log level
const DEFAULT_LOG_LEVEL: &str = "info";

/// Environment override for the access-control data directory.
pub const ADMIN_DATA_DIR_ENV: &str = "ADMIN_DATA_DIR";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RangerConfig {
    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub access: AccessConfig,

    #[serde(default)]
    pub registration: RegistrationConfig,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_challenge_ttl")]
    pub challenge_ttl_secs: u64,

    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AccessConfig {
    /// Directory holding users/bans/timeouts/audit JSON tables
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationConfig {
    /// Directory holding registration.json
    pub data_dir: Option<PathBuf>,

    /// Relay address (`host:port` or `ws://` URL)
    pub relay_address: Option<String>,

    #[serde(default = "default_submit_timeout")]
    pub submit_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Ledger JSON file
    pub store_path: Option<PathBuf>,

    #[serde(default = "default_difficulty")]
    pub difficulty: usize,

    #[serde(default = "default_mining_reward")]
    pub mining_reward: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_challenge_ttl() -> u64 {
    30
}

fn default_session_ttl() -> u64 {
    3600
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_submit_timeout() -> u64 {
    30
}

fn default_difficulty() -> usize {
    DEFAULT_DIFFICULTY
}

fn default_mining_reward() -> f64 {
    DEFAULT_MINING_REWARD
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            challenge_ttl_secs: default_challenge_ttl(),
            session_ttl_secs: default_session_ttl(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            relay_address: None,
            submit_timeout_secs: default_submit_timeout(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            difficulty: default_difficulty(),
            mining_reward: default_mining_reward(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: None,
        }
    }
}

impl RangerConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;

        let config: RangerConfig = toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path.display(), e))?;

        Ok(config)
    }

    /// Load `path`, or the default location, creating a commented default
    /// file if it does not exist yet.
    pub fn load_or_create(path: Option<&str>) -> Result<(Self, PathBuf), Box<dyn std::error::Error>> {
        let path = path.map(PathBuf::from).unwrap_or_else(default_config_path);
        if !path.exists() {
            Self::create_default(&path)?;
        }
        Ok((Self::load(&path)?, path))
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        fs::write(path, contents)
            .map_err(|e| format!("Failed to write config file '{}': {}", path.display(), e))?;

        Ok(())
    }

    /// Generate default configuration content as a string with comments
    pub fn generate_default_toml() -> String {
        format!(
            r#"# RangerBlock Node Configuration
#
# Paths left commented out resolve under the platform data directory
# ({data_dir}).

[auth]
# WebSocket port for the standalone auth server
port = {port}

# Lifetime of an unanswered challenge
challenge_ttl_secs = 30

# Lifetime of an authenticated session
session_ttl_secs = 3600

# How often expired challenges and sessions are swept
sweep_interval_secs = 60

[access]
# Directory holding users.json, bans.json, timeouts.json and audit.json
# The ADMIN_DATA_DIR environment variable takes precedence
# data_dir = "/var/lib/rangerblock/admin"

[registration]
# Directory holding registration.json
# data_dir = "/var/lib/rangerblock/registration"

# Relay used for registration submission
# relay_address = "localhost:5555"

# Hard limit on waiting for the relay to acknowledge a submission
submit_timeout_secs = 30

[ledger]
# Ledger JSON file
# store_path = "/var/lib/rangerblock/ledger.json"

# Leading zero hex digits required of block hashes (1-6)
difficulty = {difficulty}

# Coins awarded per mined block
mining_reward = 100.0

[logging]
# Log level: trace, debug, info, warn, error (RUST_LOG overrides)
level = "info"

# Log file path (optional, logs to stderr if not specified)
# file = "/var/log/rangerblock/rangerblock.log"
"#,
            data_dir = data_root().display(),
            port = DEFAULT_PORT,
            difficulty = DEFAULT_DIFFICULTY,
        )
    }

    /// Create and save a default configuration file
    pub fn create_default(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let contents = Self::generate_default_toml();

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        fs::write(config_path, contents).map_err(|e| {
            format!(
                "Failed to write config file '{}': {}",
                config_path.display(),
                e
            )
        })?;

        Ok(())
    }

    pub fn auth_settings(&self) -> AuthSettings {
        AuthSettings {
            challenge_ttl: Duration::from_secs(self.auth.challenge_ttl_secs),
            session_ttl: Duration::from_secs(self.auth.session_ttl_secs),
            sweep_interval: Duration::from_secs(self.auth.sweep_interval_secs.max(1)),
        }
    }

    pub fn ledger_settings(&self) -> LedgerSettings {
        LedgerSettings {
            difficulty: self.ledger.difficulty,
            mining_reward: self.ledger.mining_reward,
        }
    }

    pub fn submit_settings(&self) -> SubmitSettings {
        SubmitSettings {
            timeout: Duration::from_secs(self.registration.submit_timeout_secs),
            ..Default::default()
        }
    }

    /// Access tables directory: `ADMIN_DATA_DIR`, then config, then default.
    pub fn access_dir(&self) -> PathBuf {
        std::env::var_os(ADMIN_DATA_DIR_ENV)
            .map(PathBuf::from)
            .or_else(|| self.access.data_dir.clone())
            .unwrap_or_else(|| data_root().join("admin"))
    }

    pub fn registration_dir(&self) -> PathBuf {
        self.registration
            .data_dir
            .clone()
            .unwrap_or_else(|| data_root().join("registration"))
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.ledger
            .store_path
            .clone()
            .unwrap_or_else(|| data_root().join("ledger.json"))
    }

    /// Where `keygen` writes and `register`/`sign` read the node key.
    pub fn key_path(&self) -> PathBuf {
        data_root().join("node.key")
    }
}

/// `<data_dir>/rangerblock`
pub fn data_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rangerblock")
}

pub fn default_config_path() -> PathBuf {
    data_root().join("config.toml")
}
