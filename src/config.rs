use std::str::FromStr;

use anyhow::{bail, Context};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub ssl_mode: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: u8,
}

impl RedisConfig {
    pub fn url(&self) -> String {
        match self.password.as_deref() {
            Some(pw) if !pw.is_empty() => format!(
                "redis://:{}@{}:{}/{}",
                urlencoding::encode(pw),
                self.host,
                self.port,
                self.db
            ),
            _ => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub requests: u32,
    pub window_secs: u64,
    /// Take the client address from `X-Forwarded-For` / `X-Real-IP`.
    pub trust_proxy: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub bcrypt_cost: u32,
    pub rate_limit: RateLimitConfig,
    pub invalidation_worker: bool,
}

pub const DEFAULT_BCRYPT_COST: u32 = 10;
const MIN_BCRYPT_COST: u32 = 4;
const MAX_BCRYPT_COST: u32 = 31;

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let log_format = match env_or("LOG_FORMAT", "text").to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };

        let database = DatabaseConfig {
            host: env_or("DB_HOST", "localhost"),
            port: parse_env("DB_PORT", 5432)?,
            user: env_or("DB_USER", "taskhub"),
            password: env_or("DB_PASSWORD", "taskhub"),
            name: env_or("DB_NAME", "taskhub"),
            ssl_mode: env_or("DB_SSL_MODE", "disable"),
        };

        let redis = RedisConfig {
            host: env_or("REDIS_HOST", "localhost"),
            port: parse_env("REDIS_PORT", 6379)?,
            password: std::env::var("REDIS_PASSWORD").ok().filter(|v| !v.is_empty()),
            db: parse_env("REDIS_DB", 0)?,
        };

        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").unwrap_or_default(),
            ttl_minutes: parse_env("JWT_TTL_MINUTES", 60 * 24)?,
        };

        let rate_limit = RateLimitConfig {
            requests: parse_env("RATE_LIMIT_REQUESTS", 100)?,
            window_secs: parse_env("RATE_LIMIT_WINDOW", 60)?,
            trust_proxy: parse_env("RATE_LIMIT_TRUST_PROXY", false)?,
        };

        let config = Self {
            env: env_or("APP_ENV", "development"),
            host: env_or("APP_HOST", "0.0.0.0"),
            port: parse_env("APP_PORT", 3000)?,
            log_level: env_or("LOG_LEVEL", "info"),
            log_format,
            database,
            redis,
            jwt,
            bcrypt_cost: parse_env("BCRYPT_COST", DEFAULT_BCRYPT_COST)?,
            rate_limit,
            invalidation_worker: parse_env("CACHE_INVALIDATION_WORKER", false)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.jwt.secret.trim().is_empty() {
            bail!("JWT_SECRET must be set");
        }
        if self.jwt.ttl_minutes <= 0 {
            bail!("JWT_TTL_MINUTES must be positive");
        }
        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&self.bcrypt_cost) {
            bail!(
                "BCRYPT_COST must be between {} and {}, got {}",
                MIN_BCRYPT_COST,
                MAX_BCRYPT_COST,
                self.bcrypt_cost
            );
        }
        if self.rate_limit.requests == 0 {
            bail!("RATE_LIMIT_REQUESTS must be positive");
        }
        if self.rate_limit.window_secs == 0 {
            bail!("RATE_LIMIT_WINDOW must be positive");
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.env == "production"
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse::<T>()
            .with_context(|| format!("invalid value for {key}: {v:?}")),
        _ => Ok(default),
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> AppConfig {
    AppConfig {
        env: "test".into(),
        host: "127.0.0.1".into(),
        port: 0,
        log_level: "debug".into(),
        log_format: LogFormat::Text,
        database: DatabaseConfig {
            host: "localhost".into(),
            port: 5432,
            user: "taskhub".into(),
            password: "taskhub".into(),
            name: "taskhub".into(),
            ssl_mode: "disable".into(),
        },
        redis: RedisConfig {
            host: "localhost".into(),
            port: 6379,
            password: None,
            db: 0,
        },
        jwt: JwtConfig {
            secret: "test-secret".into(),
            ttl_minutes: 5,
        },
        bcrypt_cost: MIN_BCRYPT_COST,
        rate_limit: RateLimitConfig {
            requests: 100,
            window_secs: 60,
            trust_proxy: false,
        },
        invalidation_worker: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_bcrypt_cost() {
        let mut cfg = test_config();
        cfg.bcrypt_cost = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("BCRYPT_COST"));
    }

    #[test]
    fn rejects_empty_jwt_secret() {
        let mut cfg = test_config();
        cfg.jwt.secret = "  ".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_rate_limit_window() {
        let mut cfg = test_config();
        cfg.rate_limit.window_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn redis_url_encodes_password() {
        let mut cfg = test_config().redis;
        assert_eq!(cfg.url(), "redis://localhost:6379/0");
        cfg.password = Some("p@ss/word".into());
        assert_eq!(cfg.url(), "redis://:p%40ss%2Fword@localhost:6379/0");
    }
}
