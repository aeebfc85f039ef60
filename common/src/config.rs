// common/src/config.rs
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use config::{Config as ConfigFile, File, Environment};

/// Default capabilities granted to a freshly verified wallet session
pub const DEFAULT_CAPABILITIES: [&str; 2] = ["config.read", "config.write"];

/// Central configuration for the auth server
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server_addr: String,
    pub auth: AuthConfig,
    pub cookie: CookieConfig,
    pub rate_limit: RateLimitConfig,
    pub housekeeping: HousekeepingConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret for session tokens. When absent a random secret is generated
    /// at startup and every issued session dies with the process.
    pub session_secret: Option<String>,
    pub session_ttl_seconds: u64,
    pub nonce_ttl_seconds: u64,
    /// Overrides the inbound request host for domain binding
    pub login_domain: Option<String>,
    pub debug: bool,
    /// Only honored when built with the `test-signatures` feature
    pub allow_test_signatures: bool,
    pub enforce_revocation: bool,
    pub default_capabilities: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieConfig {
    pub name: String,
    pub secure: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window_seconds: u64,
    pub paths: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HousekeepingConfig {
    pub interval_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:8081".to_string(),
            auth: AuthConfig::default(),
            cookie: CookieConfig::default(),
            rate_limit: RateLimitConfig::default(),
            housekeeping: HousekeepingConfig::default(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_secret: None,
            session_ttl_seconds: 86400,
            nonce_ttl_seconds: 300,
            login_domain: None,
            debug: false,
            allow_test_signatures: false,
            enforce_revocation: false,
            default_capabilities: DEFAULT_CAPABILITIES.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: "wallet_session".to_string(),
            secure: true,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window_seconds: 60,
            paths: vec!["/api/auth/nonce".to_string(), "/api/auth/verify".to_string()],
        }
    }
}

impl Default for HousekeepingConfig {
    fn default() -> Self {
        Self { interval_seconds: 60 }
    }
}

impl AuthConfig {
    /// Capabilities to mint, never empty
    pub fn capabilities(&self) -> Vec<String> {
        let mut caps: Vec<String> = Vec::new();
        for cap in &self.default_capabilities {
            let cap = cap.trim();
            if !cap.is_empty() && !caps.iter().any(|c| c == cap) {
                caps.push(cap.to_string());
            }
        }
        if caps.is_empty() {
            caps = DEFAULT_CAPABILITIES.iter().map(|c| c.to_string()).collect();
        }
        caps
    }
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        // Get the run mode, defaulting to "development"
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        // Locate the config directory
        let config_dir = env::var("CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                // Check if we're in the project root or a subcrate
                let mut path = PathBuf::from("./config");
                if !path.exists() {
                    path = PathBuf::from("../config");
                }
                path
            });

        tracing::info!("Loading configuration from {}", config_dir.display());
        tracing::info!("Using run mode: {}", run_mode);

        let config = ConfigFile::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{}.toml", run_mode))).required(false))
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            // Environment variables with prefix "APP", e.g. APP__AUTH__SESSION_SECRET
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("auth.default_capabilities")
                    .with_list_parse_key("rate_limit.paths")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Load from environment variables directly (backward compatibility)
    pub fn from_env() -> Self {
        match Self::load() {
            Ok(config) => {
                tracing::info!("Configuration loaded from files and environment");
                config
            },
            Err(e) => {
                tracing::warn!("Failed to load configuration from files: {}", e);
                tracing::info!("Falling back to environment variables only");

                let defaults = Self::default();

                let server_addr = env::var("SERVER_ADDR")
                    .unwrap_or(defaults.server_addr);

                let session_secret = env::var("SESSION_SECRET")
                    .ok()
                    .filter(|s| !s.is_empty());

                let session_ttl_seconds = env::var("SESSION_TTL_SECONDS")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(defaults.auth.session_ttl_seconds);

                let login_domain = env::var("LOGIN_DOMAIN")
                    .ok()
                    .filter(|s| !s.is_empty());

                let debug = env::var("AUTH_DEBUG")
                    .map(|v| v.to_lowercase() == "true")
                    .unwrap_or(false);

                let allow_test_signatures = env::var("ALLOW_TEST_SIGNATURES")
                    .map(|v| v.to_lowercase() == "true")
                    .unwrap_or(false);

                let enforce_revocation = env::var("ENFORCE_REVOCATION")
                    .map(|v| v.to_lowercase() == "true")
                    .unwrap_or(false);

                let secure = env::var("COOKIE_SECURE")
                    .map(|v| v.to_lowercase() != "false")
                    .unwrap_or(true);

                Self {
                    server_addr,
                    auth: AuthConfig {
                        session_secret,
                        session_ttl_seconds,
                        login_domain,
                        debug,
                        allow_test_signatures,
                        enforce_revocation,
                        ..defaults.auth
                    },
                    cookie: CookieConfig {
                        secure,
                        ..defaults.cookie
                    },
                    ..defaults
                }
            }
        }
    }
}
