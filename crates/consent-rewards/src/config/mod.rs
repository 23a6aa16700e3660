use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::workflows::consent::emitter::{DEFAULT_ACTIVITY_CAP, DEFAULT_NOTIFICATION_CAP};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub engine: EngineConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let engine = EngineConfig {
            data_dir: optional_var("APP_DATA_DIR").map(PathBuf::from),
            validator_url: optional_var("APP_VALIDATOR_URL"),
            verification_delay: Duration::from_millis(numeric_var(
                "APP_VERIFICATION_DELAY_MS",
                EngineConfig::DEFAULT_VERIFICATION_DELAY_MS,
            )?),
            notification_cap: numeric_var("APP_NOTIFICATION_CAP", DEFAULT_NOTIFICATION_CAP)?,
            activity_cap: numeric_var("APP_ACTIVITY_CAP", DEFAULT_ACTIVITY_CAP)?,
            offer_interval: optional_var("APP_OFFER_INTERVAL_SECS")
                .map(|raw| parse_number::<u64>("APP_OFFER_INTERVAL_SECS", &raw))
                .transpose()?
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            account_deletion_url: optional_var("APP_ACCOUNT_DELETION_URL"),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                ansi: environment == AppEnvironment::Development,
                include_targets: false,
            },
            engine,
        })
    }
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn numeric_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match optional_var(name) {
        Some(raw) => parse_number(name, &raw),
        None => Ok(default),
    }
}

fn parse_number<T: std::str::FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.parse::<T>().map_err(|_| ConfigError::InvalidNumber {
        variable: name,
        value: raw.to_string(),
    })
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub ansi: bool,
    pub include_targets: bool,
}

/// Collaborator wiring and sizing for the consent engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Directory backing the file store; `None` keeps state in memory.
    pub data_dir: Option<PathBuf>,
    /// Remote dataset validator; `None` selects the simulated validator.
    pub validator_url: Option<String>,
    pub verification_delay: Duration,
    pub notification_cap: usize,
    pub activity_cap: usize,
    /// Enables the periodic partner-offer source.
    pub offer_interval: Option<Duration>,
    pub account_deletion_url: Option<String>,
}

impl EngineConfig {
    pub const DEFAULT_VERIFICATION_DELAY_MS: u64 = 3_000;
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            validator_url: None,
            verification_delay: Duration::from_millis(Self::DEFAULT_VERIFICATION_DELAY_MS),
            notification_cap: DEFAULT_NOTIFICATION_CAP,
            activity_cap: DEFAULT_ACTIVITY_CAP,
            offer_interval: None,
            account_deletion_url: None,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { variable: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { variable, value } => {
                write!(f, "{variable} must be a non-negative integer (got '{value}')")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidNumber { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for name in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "APP_DATA_DIR",
            "APP_VALIDATOR_URL",
            "APP_VERIFICATION_DELAY_MS",
            "APP_NOTIFICATION_CAP",
            "APP_ACTIVITY_CAP",
            "APP_OFFER_INTERVAL_SECS",
            "APP_ACCOUNT_DELETION_URL",
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn reads_engine_overrides() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_DATA_DIR", "/var/lib/consent");
        env::set_var("APP_VALIDATOR_URL", "https://validator.internal/check");
        env::set_var("APP_VERIFICATION_DELAY_MS", "250");
        env::set_var("APP_NOTIFICATION_CAP", "5");
        env::set_var("APP_OFFER_INTERVAL_SECS", "90");

        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.engine.data_dir, Some(PathBuf::from("/var/lib/consent")));
        assert_eq!(
            config.engine.validator_url.as_deref(),
            Some("https://validator.internal/check")
        );
        assert_eq!(config.engine.verification_delay, Duration::from_millis(250));
        assert_eq!(config.engine.notification_cap, 5);
        assert_eq!(config.engine.activity_cap, DEFAULT_ACTIVITY_CAP);
        assert_eq!(config.engine.offer_interval, Some(Duration::from_secs(90)));
        reset_env();
    }

    #[test]
    fn rejects_non_numeric_caps() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_ACTIVITY_CAP", "plenty");

        match AppConfig::load() {
            Err(ConfigError::InvalidNumber { variable, value }) => {
                assert_eq!(variable, "APP_ACTIVITY_CAP");
                assert_eq!(value, "plenty");
            }
            other => panic!("expected invalid number, got {other:?}"),
        }
        reset_env();
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }
}
