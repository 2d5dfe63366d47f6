use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Support chat server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "chatdesk-server", version, about = "Realtime support chat server")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "CHATDESK_PORT", default_value = "3100")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "CHATDESK_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./chatdesk.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "CHATDESK_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Data directory for persistent state (DB, signing key)
    #[arg(long, env = "CHATDESK_DATA_DIR", default_value = "./data")]
    pub data_dir: String,

    /// Chat routing settings (loaded from [chat] section in TOML)
    #[arg(skip)]
    #[serde(default, skip_serializing)]
    pub chat: ChatConfig,

    /// Message retention settings (loaded from [retention] section in TOML)
    #[arg(skip)]
    #[serde(default, skip_serializing)]
    pub retention: RetentionConfig,
}

/// Who receives `messages_read` announcements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReadReceiptScope {
    /// Every connected member of the opposite role.
    #[default]
    Group,
    /// Each sender of a message that flipped to read, told only about its own ids.
    Counterpart,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Email of the admin account that user messages are addressed to.
    /// When unset, the oldest admin identity on record is used.
    #[serde(default)]
    pub support_account: Option<String>,

    /// Maximum message length in characters (default: 1000)
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,

    /// Default page size for conversation history (default: 50)
    #[serde(default = "default_history_limit")]
    pub history_limit: u32,

    /// Upper bound for any requested page size (default: 200)
    #[serde(default = "default_max_history_limit")]
    pub max_history_limit: u32,

    #[serde(default)]
    pub read_receipt_scope: ReadReceiptScope,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            support_account: None,
            max_content_length: default_max_content_length(),
            history_limit: default_history_limit(),
            max_history_limit: default_max_history_limit(),
            read_receipt_scope: ReadReceiptScope::Group,
        }
    }
}

impl ChatConfig {
    /// Clamp a caller-supplied page size to the configured bounds.
    pub fn page_size(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.history_limit)
            .clamp(1, self.max_history_limit)
    }
}

fn default_max_content_length() -> usize {
    1000
}

fn default_history_limit() -> u32 {
    50
}

fn default_max_history_limit() -> u32 {
    200
}

/// Configuration for the background retention sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Messages older than this are soft-deleted (default: 12)
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u32,

    /// Coarse schedule: sweep at the top of every N-th hour (default: 1)
    #[serde(default = "default_sweep_every_hours")]
    pub sweep_every_hours: u32,

    /// Optional extra fixed-interval trigger in seconds, for operational testing
    #[serde(default)]
    pub fast_interval_secs: Option<u64>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age_hours: default_max_age_hours(),
            sweep_every_hours: default_sweep_every_hours(),
            fast_interval_secs: None,
        }
    }
}

fn default_max_age_hours() -> u32 {
    12
}

fn default_sweep_every_hours() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3100,
            bind_address: "0.0.0.0".to_string(),
            config: "./chatdesk.toml".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            chat: ChatConfig::default(),
            retention: RetentionConfig::default(),
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (CHATDESK_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("CHATDESK_").split("__"))
            .merge(Serialized::defaults(cli))
            .extract()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Chatdesk Server Configuration
# Place this file at ./chatdesk.toml or specify with --config <path>
# All settings can be overridden via environment variables (CHATDESK_PORT,
# CHATDESK_RETENTION__MAX_AGE_HOURS, etc.) or CLI flags (--port, etc.)

# Server port (default: 3100)
# port = 3100

# Bind address (default: 0.0.0.0 - all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for the SQLite database and credential signing key
# data_dir = "./data"

# ---- Chat Routing ----
# [chat]

# Email of the admin account that receives user messages.
# Defaults to the oldest admin identity on record.
# support_account = "support@example.com"

# Maximum message length in characters
# max_content_length = 1000

# Conversation page sizes
# history_limit = 50
# max_history_limit = 200

# Who hears about read receipts: "group" (every connected member of the
# other role) or "counterpart" (each sender, about its own read messages)
# read_receipt_scope = "group"

# ---- Retention ----
# [retention]

# Messages older than this many hours are soft-deleted
# max_age_hours = 12

# Sweep at the top of every N-th hour
# sweep_every_hours = 1

# Extra fixed-interval sweep trigger in seconds (operational testing only)
# fast_interval_secs = 60
"#
    .to_string()
}
