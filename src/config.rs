use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// CORS allowed origins, comma separated
    pub cors_origins: Option<String>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Frontend base URL, used to build join links
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Public WebSocket base URL handed to clients
    pub public_ws_url: Option<String>,

    /// Redis URL. Without it rooms live in this process only.
    pub redis_url: Option<String>,

    /// Room id length in hex characters
    #[serde(default = "default_room_code_length")]
    pub room_code_length: usize,

    /// Seconds of inactivity before a room expires
    #[serde(default = "default_room_ttl_seconds")]
    pub room_ttl_seconds: u64,

    /// Per-channel buffer of the in-process bus
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        Self::from_vars(std::env::vars())
    }

    /// Build the configuration from explicit key/value pairs
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        match envy::from_iter::<_, Config>(vars) {
            Ok(config) => {
                info!("✅ Configuration loaded successfully");
                Ok(config)
            }
            Err(e) => {
                error!("❌ Failed to load configuration: {}", e);
                Err(ConfigError::EnvError(e))
            }
        }
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn room_ttl(&self) -> Duration {
        Duration::from_secs(self.room_ttl_seconds)
    }

    /// WebSocket base URL clients should connect to
    pub fn ws_base_url(&self) -> String {
        match &self.public_ws_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("ws://{}", self.server_address()),
        }
    }

    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Check if running in production mode
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "prod" || self.environment.to_lowercase() == "production"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            cors_origins: None,
            base_url: default_base_url(),
            public_ws_url: None,
            redis_url: None,
            room_code_length: default_room_code_length(),
            room_ttl_seconds: default_room_ttl_seconds(),
            bus_capacity: default_bus_capacity(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    EnvError(envy::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::EnvError(e) => write!(f, "Environment variable error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_room_code_length() -> usize {
    6
}

fn default_room_ttl_seconds() -> u64 {
    7200
}

fn default_bus_capacity() -> usize {
    256
}
