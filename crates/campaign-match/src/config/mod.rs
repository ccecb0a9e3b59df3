use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use crate::matching::{EngineConfig, ValidationError};

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
    /// Directory holding `supporters.csv`, `candidates.csv` and `activity.csv`.
    pub seed_dir: Option<PathBuf>,
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
        let seed_dir = env::var("MATCH_SEED_DIR")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            engine: load_engine_config()?,
            seed_dir,
        })
    }
}

/// Applies `MATCH_*` overrides on top of the engine defaults and validates the result.
fn load_engine_config() -> Result<EngineConfig, ConfigError> {
    let mut engine = EngineConfig::default();

    let weights = &mut engine.affinity.weights;
    override_from_env("MATCH_WEIGHT_IDEOLOGY", &mut weights.ideology)?;
    override_from_env("MATCH_WEIGHT_GEOGRAPHY", &mut weights.geography)?;
    override_from_env("MATCH_WEIGHT_HISTORY", &mut weights.history)?;
    override_from_env("MATCH_WEIGHT_CAPACITY", &mut weights.capacity_fit)?;
    override_from_env("MATCH_AFFINITY_TTL_HOURS", &mut engine.affinity.ttl_hours)?;
    override_from_env("MATCH_PAGE_SIZE", &mut engine.allocation.page_size)?;
    override_from_env("MATCH_MIN_SCORE", &mut engine.allocation.default_min_score)?;
    override_from_env(
        "MATCH_VOLUNTEER_HOUR_CENTS",
        &mut engine.grading.volunteer_hour_value_cents,
    )?;

    engine.validate().map_err(ConfigError::Engine)?;
    Ok(engine)
}

fn override_from_env<T: FromStr>(name: &'static str, target: &mut T) -> Result<(), ConfigError> {
    let Ok(raw) = env::var(name) else {
        return Ok(());
    };
    *target = raw.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        name,
        value: raw.clone(),
    })?;
    Ok(())
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

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { name: &'static str, value: String },
    Engine(ValidationError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { name, value } => {
                write!(f, "{} has an invalid value '{}'", name, value)
            }
            ConfigError::Engine(err) => write!(f, "engine settings rejected: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidNumber { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::Engine(err) => Some(err),
        }
    }
}
