//! Session store backends selected at start-up.

use anyhow::Context;
use redis::aio::ConnectionManager;

use gatehouse_api::memory::MemorySessionStore;
use gatehouse_api::store::{SessionStore, StoreError};

/// Redis-backed session store over one multiplexed, auto-reconnecting
/// connection.
#[derive(Clone)]
pub struct RedisSessionStore {
    conn: ConnectionManager,
}

impl RedisSessionStore {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url).context("parsing REDIS_URL")?;
        let conn = ConnectionManager::new(client)
            .await
            .context("connecting to redis")?;
        Ok(Self { conn })
    }
}

fn redis_err(e: redis::RedisError) -> StoreError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
    {
        StoreError::Connection(e.to_string())
    } else {
        StoreError::Query(e.to_string())
    }
}

impl SessionStore for RedisSessionStore {
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await
            .map_err(redis_err)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(redis_err)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let updated: i64 = redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await
            .map_err(redis_err)?;
        Ok(updated == 1)
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(redis_err)?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(redis_err)?;
        Ok(())
    }
}

/// Runtime choice between Redis and the in-process store.
#[derive(Clone)]
pub enum SessionBackend {
    Redis(RedisSessionStore),
    Memory(MemorySessionStore),
}

impl SessionBackend {
    /// Connect to Redis when a URL is configured, otherwise fall back to
    /// process memory (sessions then die with the process).
    pub async fn from_url(url: Option<&str>) -> anyhow::Result<Self> {
        match url {
            Some(url) => {
                let store = RedisSessionStore::connect(url).await?;
                tracing::info!("session store: redis");
                Ok(Self::Redis(store))
            }
            None => {
                tracing::warn!(
                    "REDIS_URL not set; sessions are kept in process memory and lost on restart"
                );
                Ok(Self::Memory(MemorySessionStore::new()))
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Redis(_) => "redis",
            Self::Memory(_) => "memory",
        }
    }

    /// The in-process store, if that is the active backend.
    pub fn as_memory(&self) -> Option<&MemorySessionStore> {
        match self {
            Self::Memory(store) => Some(store),
            Self::Redis(_) => None,
        }
    }
}

impl SessionStore for SessionBackend {
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        match self {
            Self::Redis(s) => s.set_ex(key, value, ttl_secs).await,
            Self::Memory(s) => s.set_ex(key, value, ttl_secs).await,
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self {
            Self::Redis(s) => s.get(key).await,
            Self::Memory(s) => s.get(key).await,
        }
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, StoreError> {
        match self {
            Self::Redis(s) => s.expire(key, ttl_secs).await,
            Self::Memory(s) => s.expire(key, ttl_secs).await,
        }
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        match self {
            Self::Redis(s) => s.del(key).await,
            Self::Memory(s) => s.del(key).await,
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        match self {
            Self::Redis(s) => s.ping().await,
            Self::Memory(s) => s.ping().await,
        }
    }
}
