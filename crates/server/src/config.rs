//! Server configuration loaded from environment variables.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use gatehouse_api::crypto::HasherKind;
use gatehouse_api::registration::{DEFAULT_INVITE_CODE, RegistrationConfig};
use gatehouse_api::session::{DEFAULT_SESSION_TTL_SECS, MAX_SESSION_TTL_SECS, SessionConfig};

const DEFAULT_DATABASE_PATH: &str = "data/gatehouse.db";
const DEFAULT_POOL_SIZE: usize = 5;

/// Where the user store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseTarget {
    File(PathBuf),
    Memory,
}

impl DatabaseTarget {
    /// Accepts `sqlite://<path>`, `sqlite:<path>`, a plain path, or `:memory:`.
    pub fn parse(url: &str) -> Result<Self> {
        let url = url.trim();
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);
        match path {
            "" => bail!("DATABASE_URL has an empty path"),
            ":memory:" => Ok(Self::Memory),
            p => Ok(Self::File(PathBuf::from(p))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database: DatabaseTarget,
    pub db_pool_size: usize,
    /// `None` selects the in-process session store.
    pub redis_url: Option<String>,
    pub session: SessionConfig,
    pub registration: RegistrationConfig,
    pub hasher: HasherKind,
    pub bind_addr: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database: DatabaseTarget::File(PathBuf::from(DEFAULT_DATABASE_PATH)),
            db_pool_size: DEFAULT_POOL_SIZE,
            redis_url: None,
            session: SessionConfig::default(),
            registration: RegistrationConfig::default(),
            hasher: HasherKind::default(),
            bind_addr: "0.0.0.0".into(),
            port: 3000,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let database = match get("DATABASE_URL") {
            Some(url) => DatabaseTarget::parse(&url)?,
            None => defaults.database,
        };

        let db_pool_size = match get("DB_POOL_SIZE") {
            Some(v) => parse_num::<usize>("DB_POOL_SIZE", &v)?,
            None => defaults.db_pool_size,
        };
        if db_pool_size == 0 {
            bail!("DB_POOL_SIZE must be at least 1");
        }

        let ttl_secs = match get("SESSION_TTL_SECS") {
            Some(v) => parse_num::<u64>("SESSION_TTL_SECS", &v)?,
            None => DEFAULT_SESSION_TTL_SECS,
        };
        if ttl_secs == 0 {
            bail!("SESSION_TTL_SECS must be positive");
        }
        if ttl_secs > MAX_SESSION_TTL_SECS {
            bail!("SESSION_TTL_SECS must be at most {MAX_SESSION_TTL_SECS}, got {ttl_secs}");
        }

        let cookie_secure = match get("COOKIE_SECURE") {
            Some(v) => parse_bool("COOKIE_SECURE", &v)?,
            None => false,
        };

        let hasher = match get("PASSWORD_HASHER") {
            Some(v) => v
                .parse::<HasherKind>()
                .map_err(|e| anyhow::anyhow!("PASSWORD_HASHER: {e}"))?,
            None => defaults.hasher,
        };

        let port = match get("PORT") {
            Some(v) => parse_num::<u16>("PORT", &v)?,
            None => defaults.port,
        };

        Ok(Self {
            database,
            db_pool_size,
            redis_url: get("REDIS_URL"),
            session: SessionConfig {
                ttl_secs,
                cookie_secure,
            },
            registration: RegistrationConfig {
                default_invite_code: get("DEFAULT_INVITE_CODE")
                    .map(|c| c.trim().to_string())
                    .unwrap_or_else(|| DEFAULT_INVITE_CODE.into()),
            },
            hasher,
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            port,
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

fn parse_num<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse::<T>()
        .with_context(|| format!("{key} must be a non-negative integer, got {value:?}"))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("{key} must be a boolean, got {value:?}"),
    }
}
