use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::ws::broadcast::DEFAULT_BROADCAST_CAPACITY;

/// Book library server
///
/// Every setting is optional here: only flags given on the command line
/// are serialized, so unset flags never mask TOML or env values.
#[derive(Parser, Serialize, Clone, Debug, Default)]
#[command(name = "booklib-server", version, about = "Personal book library server")]
pub struct CliArgs {
    /// Port to listen on [default: 8080]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Bind address [default: 0.0.0.0]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Path to TOML config file
    #[arg(long, default_value = "./booklib.toml")]
    #[serde(skip)]
    pub config: String,

    /// Enable structured JSON logging
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    #[serde(skip)]
    pub generate_config: bool,

    /// Data directory holding the SQLite database [default: ./data]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,

    /// Directory served under /static [default: ./static]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<String>,

    /// Session lifetime in hours [default: 168]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_ttl_hours: Option<i64>,

    /// Interval in seconds between expired-session cleanup runs [default: 3600]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_sweep_interval_secs: Option<u64>,

    /// Mark the session cookie Secure (serve over HTTPS)
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub secure_cookies: bool,
}

/// Resolved server configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    pub json_logs: bool,
    pub data_dir: String,
    pub static_dir: String,
    pub session_ttl_hours: i64,
    pub session_sweep_interval_secs: u64,
    pub secure_cookies: bool,

    /// External catalog configuration (loaded from [catalog] section in TOML)
    #[serde(default)]
    pub catalog: Option<CatalogConfig>,

    /// Live update configuration (loaded from [live] section in TOML)
    #[serde(default)]
    pub live: Option<LiveConfig>,
}

/// External book catalog used by the import endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Volumes search endpoint (Google Books API shape)
    #[serde(default = "default_catalog_url")]
    pub url: String,

    /// Lookup timeout in seconds (default: 10)
    #[serde(default = "default_catalog_timeout")]
    pub timeout_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: default_catalog_url(),
            timeout_secs: default_catalog_timeout(),
        }
    }
}

fn default_catalog_url() -> String {
    "https://www.googleapis.com/books/v1/volumes".to_string()
}

fn default_catalog_timeout() -> u64 {
    10
}

/// WebSocket live update settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveConfig {
    /// Pending events buffered before producers wait (default: 1024)
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,

    /// Seconds between keepalive pings, 0 disables (default: 30)
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,

    /// Seconds to wait for a pong before dropping the client (default: 10)
    #[serde(default = "default_pong_timeout")]
    pub pong_timeout_secs: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: default_broadcast_capacity(),
            ping_interval_secs: default_ping_interval(),
            pong_timeout_secs: default_pong_timeout(),
        }
    }
}

fn default_broadcast_capacity() -> usize {
    DEFAULT_BROADCAST_CAPACITY
}

fn default_ping_interval() -> u64 {
    30
}

fn default_pong_timeout() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_address: "0.0.0.0".to_string(),
            json_logs: false,
            data_dir: "./data".to_string(),
            static_dir: "./static".to_string(),
            session_ttl_hours: 168,
            session_sweep_interval_secs: 3600,
            secure_cookies: false,
            catalog: Some(CatalogConfig::default()),
            live: Some(LiveConfig::default()),
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (BOOKLIB_*) < CLI args
    pub fn load(cli: &CliArgs) -> Result<Self, figment::Error> {
        Self::figment(cli).extract()
    }

    /// The full provider chain for `cli`, with the TOML file taken from `--config`.
    pub fn figment(cli: &CliArgs) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&cli.config))
            .merge(Env::prefixed("BOOKLIB_").split("__"))
            .merge(Serialized::defaults(cli))
    }

    pub fn catalog(&self) -> CatalogConfig {
        self.catalog.clone().unwrap_or_default()
    }

    pub fn live(&self) -> LiveConfig {
        self.live.clone().unwrap_or_default()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Book Library Server Configuration
# Place this file at ./booklib.toml or specify with --config <path>
# All settings can be overridden via environment variables (BOOKLIB_PORT,
# BOOKLIB_LIVE__PING_INTERVAL_SECS, etc.) or CLI flags (--port, etc.)

# Server port (default: 8080)
# port = 8080

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging
# json_logs = false

# Data directory for the SQLite database
# data_dir = "./data"

# Directory served under /static (index.html, script.js, favicon.ico)
# static_dir = "./static"

# Session lifetime in hours (default: 168 = 7 days)
# session_ttl_hours = 168

# Interval in seconds between expired-session cleanup runs
# session_sweep_interval_secs = 3600

# Mark the session cookie Secure when served over HTTPS
# secure_cookies = false

# ---- External Catalog ----
# [catalog]
# url = "https://www.googleapis.com/books/v1/volumes"
# timeout_secs = 10

# ---- Live Updates (WebSocket) ----
# [live]

# Pending events buffered before producers wait for the delivery loop
# broadcast_capacity = 1024

# Seconds between keepalive pings; 0 disables keepalive
# ping_interval_secs = 30

# Seconds a client has to answer a ping before it is dropped
# pong_timeout_secs = 10
"#
    .to_string()
}
