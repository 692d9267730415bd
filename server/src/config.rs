use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// Only flags that were actually passed (or set through their env var) are
// serialized, so unset flags never mask the TOML file.
/// Chatosi chat server
#[derive(Parser, Serialize, Clone, Debug)]
#[command(name = "chatosi-server", version, about = "Chatosi chat server")]
pub struct Cli {
    /// Port to listen on [default: 5000]
    #[arg(long, env = "CHATOSI_PORT")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Bind address [default: 0.0.0.0]
    #[arg(long, env = "CHATOSI_BIND_ADDRESS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Path to TOML config file
    #[arg(long, default_value = "./chatosi.toml")]
    pub config: String,

    /// Enable structured JSON logging
    #[arg(long, env = "CHATOSI_JSON_LOGS")]
    #[serde(skip_serializing_if = "is_false")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    #[serde(skip_serializing_if = "is_false")]
    pub generate_config: bool,

    /// Data directory for persistent state (DB, JWT key, uploads) [default: ./data]
    #[arg(long, env = "CHATOSI_DATA_DIR")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,

    /// bcrypt work factor for password hashes [default: 10]
    #[arg(long, env = "CHATOSI_BCRYPT_COST")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bcrypt_cost: Option<u32>,

    /// Session token lifetime in seconds [default: 604800, 7 days]
    #[arg(long, env = "CHATOSI_TOKEN_TTL_SECS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_ttl_secs: Option<i64>,
}

fn is_false(flag: &bool) -> bool {
    !flag
}

/// Resolved server configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    pub config: String,
    pub json_logs: bool,
    pub generate_config: bool,
    pub data_dir: String,
    pub bcrypt_cost: u32,
    pub token_ttl_secs: i64,

    /// Upload limits (loaded from [uploads] section in TOML)
    #[serde(default)]
    pub uploads: Option<UploadsConfig>,
}

/// Limits for message images and profile pictures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadsConfig {
    /// Maximum decoded image size in megabytes (default: 10)
    #[serde(default = "default_max_image_size")]
    pub max_image_size_mb: u32,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            max_image_size_mb: default_max_image_size(),
        }
    }
}

impl UploadsConfig {
    pub fn max_image_bytes(&self) -> usize {
        self.max_image_size_mb as usize * 1024 * 1024
    }
}

fn default_max_image_size() -> u32 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5000,
            bind_address: "0.0.0.0".to_string(),
            config: "./chatosi.toml".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            bcrypt_cost: 10,
            token_ttl_secs: 7 * 24 * 60 * 60,
            uploads: None,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (CHATOSI_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment(Cli::parse()).extract()
    }

    fn figment(cli: Cli) -> Figment {
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("CHATOSI_"))
            .merge(Serialized::defaults(cli))
    }

    pub fn uploads(&self) -> UploadsConfig {
        self.uploads.clone().unwrap_or_default()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Chatosi Server Configuration
# Place this file at ./chatosi.toml or specify with --config <path>
# All settings can be overridden via environment variables (CHATOSI_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 5000)
# port = 5000

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging
# json_logs = false

# Data directory for the SQLite database, JWT signing key and uploads
# data_dir = "./data"

# bcrypt work factor for password hashes (default: 10)
# bcrypt_cost = 10

# Session token lifetime in seconds (default: 604800 = 7 days)
# token_ttl_secs = 604800

# ---- Uploads (message images, profile pictures) ----
# [uploads]

# Maximum decoded image size in megabytes (default: 10)
# max_image_size_mb = 10
"#
    .to_string()
}
