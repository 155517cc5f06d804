use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

const DEV_JWT_SECRET: &str = "dev-only-insecure-secret";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub admin_user: String,
    pub admin_password: String,
    /// Upper bound for a single store call before it fails as unavailable.
    pub store_timeout: Duration,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub rate_limit_enabled: bool,
    pub seed_sample_data: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://workshops.db".to_string(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 5001)),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            admin_user: "admin".to_string(),
            admin_password: "admin123".to_string(),
            store_timeout: Duration::from_millis(5000),
            access_token_ttl: Duration::from_secs(8 * 60 * 60),
            refresh_token_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            rate_limit_enabled: true,
            seed_sample_data: false,
        }
    }
}

impl Config {
    /// Reads `.env` (if any) and the process environment, falling back to
    /// development defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let jwt_secret = env::var("JWT_SECRET").unwrap_or_else(|_| {
            warn!("JWT_SECRET is not set, using an insecure development secret");
            defaults.jwt_secret.clone()
        });

        Ok(Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            bind_addr: parse_var("BIND_ADDR", defaults.bind_addr)?,
            jwt_secret,
            admin_user: env::var("ADMIN_USER").unwrap_or(defaults.admin_user),
            admin_password: env::var("ADMIN_PASSWORD").unwrap_or(defaults.admin_password),
            store_timeout: Duration::from_millis(parse_var("STORE_TIMEOUT_MS", 5000)?),
            access_token_ttl: parse_ttl("ACCESS_TOKEN_TTL_SECS", defaults.access_token_ttl)?,
            refresh_token_ttl: parse_ttl("REFRESH_TOKEN_TTL_SECS", defaults.refresh_token_ttl)?,
            rate_limit_enabled: parse_var("RATE_LIMIT_ENABLED", defaults.rate_limit_enabled)?,
            seed_sample_data: parse_var("SEED_SAMPLE_DATA", defaults.seed_sample_data)?,
        })
    }
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => match value.trim().parse() {
            Ok(parsed) => Ok(parsed),
            Err(_) => Err(ConfigError::Invalid { key, value }),
        },
        Err(_) => Ok(default),
    }
}

/// Token lifetimes end up added to a signed Unix timestamp.
fn parse_ttl(key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    checked_ttl(key, parse_var(key, default.as_secs())?)
}

fn checked_ttl(key: &'static str, secs: u64) -> Result<Duration, ConfigError> {
    match i64::try_from(secs) {
        Ok(_) => Ok(Duration::from_secs(secs)),
        Err(_) => Err(ConfigError::Invalid {
            key,
            value: secs.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.bind_addr.port(), 5001);
        assert_eq!(config.store_timeout, Duration::from_secs(5));
        assert_eq!(config.access_token_ttl.as_secs(), 28_800);
        assert_eq!(config.refresh_token_ttl.as_secs(), 604_800);
        assert!(config.rate_limit_enabled);
        assert!(!config.seed_sample_data);
    }

    #[test]
    fn unset_variable_falls_back_to_default() {
        let value: u64 = parse_var("WORKSHOP_REGISTRY_TEST_UNSET_VAR", 17).unwrap();
        assert_eq!(value, 17);
    }

    #[test]
    fn oversized_token_ttl_is_rejected() {
        assert_eq!(
            checked_ttl("ACCESS_TOKEN_TTL_SECS", 3600).unwrap(),
            Duration::from_secs(3600)
        );
        match checked_ttl("ACCESS_TOKEN_TTL_SECS", u64::MAX) {
            Err(ConfigError::Invalid { key, value }) => {
                assert_eq!(key, "ACCESS_TOKEN_TTL_SECS");
                assert_eq!(value, u64::MAX.to_string());
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
