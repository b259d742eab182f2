use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Main configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub billing: BillingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// HS256 signing secret for access tokens. Must be set in production;
    /// the default exists so tests and local dev work out of the box.
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    #[serde(default = "default_token_expiry_minutes")]
    pub token_expiry_minutes: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            token_expiry_minutes: default_token_expiry_minutes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SecurityConfig {
    /// Passphrase from which the key-at-rest encryption key is derived.
    #[serde(default = "default_encryption_secret")]
    pub encryption_secret: String,
    /// PBKDF2 salt for the derivation. Changing it orphans stored keys.
    #[serde(default = "default_encryption_salt")]
    pub encryption_salt: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            encryption_secret: default_encryption_secret(),
            encryption_salt: default_encryption_salt(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u64,
    /// Counter entry lifetime. Longer than the window so entries from a
    /// window that straddles a clock skew still expire cleanly.
    #[serde(default = "default_counter_ttl_secs")]
    pub counter_ttl_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
            counter_ttl_secs: default_counter_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct BillingConfig {
    /// Shared secret expected in the X-Webhook-Secret header. When unset,
    /// the webhook endpoint rejects all calls.
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

const fn default_port() -> u16 {
    8500
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_db_path() -> PathBuf {
    PathBuf::from("genz.db")
}
fn default_jwt_secret() -> String {
    "change-me-in-production".to_string()
}
const fn default_token_expiry_minutes() -> i64 {
    60 * 24
}
fn default_encryption_secret() -> String {
    "change-me-in-production".to_string()
}
fn default_encryption_salt() -> String {
    "genz-key-salt".to_string()
}
const fn default_requests_per_minute() -> u64 {
    30
}
const fn default_counter_ttl_secs() -> u64 {
    90
}
fn default_log_level() -> String {
    "info".to_string()
}

// ---------------------------------------------------------------------------
// Config loading and env overrides
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a TOML file, then apply environment variable
    /// overrides. Any setting prefixed with `GENZ_` takes precedence over
    /// the file value.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            config
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    fn apply_env_overrides(&mut self) {
        macro_rules! env_str {
            ($env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = val;
                }
            };
        }
        macro_rules! env_bool {
            ($env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
                }
            };
        }
        macro_rules! env_parse {
            ($env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    if let Ok(parsed) = val.parse() {
                        $field = parsed;
                    }
                }
            };
        }

        // -- Server --
        env_str!("GENZ_SERVER_HOST", self.server.host);
        env_parse!("GENZ_SERVER_PORT", self.server.port);
        if let Ok(val) = std::env::var("GENZ_SERVER_CORS_ORIGINS") {
            self.server.cors_origins = val
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // -- Database --
        if let Ok(val) = std::env::var("GENZ_DATABASE_PATH") {
            self.database.path = PathBuf::from(val);
        }

        // -- Auth --
        env_str!("GENZ_AUTH_JWT_SECRET", self.auth.jwt_secret);
        env_parse!("GENZ_AUTH_TOKEN_EXPIRY_MINUTES", self.auth.token_expiry_minutes);

        // -- Security --
        env_str!("GENZ_ENCRYPTION_SECRET", self.security.encryption_secret);
        env_str!("GENZ_ENCRYPTION_SALT", self.security.encryption_salt);

        // -- Rate limiting --
        env_parse!(
            "GENZ_RATE_LIMIT_PER_MINUTE",
            self.rate_limit.requests_per_minute
        );
        env_parse!("GENZ_RATE_LIMIT_TTL_SECS", self.rate_limit.counter_ttl_secs);

        // -- Billing --
        if let Ok(val) = std::env::var("GENZ_BILLING_WEBHOOK_SECRET") {
            self.billing.webhook_secret = if val.is_empty() { None } else { Some(val) };
        }

        // -- Logging --
        env_str!("GENZ_LOG_LEVEL", self.logging.level);
        env_bool!("GENZ_LOG_JSON", self.logging.json);
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            security: SecurityConfig::default(),
            rate_limit: RateLimitConfig::default(),
            billing: BillingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8500);
        assert_eq!(config.rate_limit.requests_per_minute, 30);
        assert_eq!(config.rate_limit.counter_ttl_secs, 90);
        assert!(config.billing.webhook_secret.is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_listen_addr() {
        let config = Config::default();
        assert_eq!(config.listen_addr(), "127.0.0.1:8500");
    }

    #[test]
    fn test_config_load_missing_file() {
        let path = Path::new("/tmp/nonexistent_genz_config_test.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.server.port, 8500);
    }

    #[test]
    fn test_config_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.toml");
        std::fs::write(
            &path,
            r#"
[server]
host = "0.0.0.0"
port = 9000

[rate_limit]
requests_per_minute = 10

[billing]
webhook_secret = "whsec"

[logging]
level = "debug"
json = true
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.rate_limit.requests_per_minute, 10);
        assert_eq!(config.billing.webhook_secret.as_deref(), Some("whsec"));
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn test_env_override_applies() {
        // SAFETY: Tests are run sequentially for env-mutating tests.
        unsafe {
            std::env::set_var("GENZ_SERVER_PORT", "9999");
            std::env::set_var("GENZ_RATE_LIMIT_PER_MINUTE", "5");
            std::env::set_var("GENZ_LOG_LEVEL", "debug");
        }

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.server.port, 9999);
        assert_eq!(config.rate_limit.requests_per_minute, 5);
        assert_eq!(config.logging.level, "debug");

        unsafe {
            std::env::remove_var("GENZ_SERVER_PORT");
            std::env::remove_var("GENZ_RATE_LIMIT_PER_MINUTE");
            std::env::remove_var("GENZ_LOG_LEVEL");
        }
    }
}
