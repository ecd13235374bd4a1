mod compression;
mod keys;

pub use redis::*;

use self::compression::Compressed;
use self::keys::CacheKey;
use anyhow::Result;
use async_trait::async_trait;
use destroyer::{
    cache::{CachePolicy, CacheStore, CachedChannelList, CachedGuildList},
    config::DestroyerConfig,
    models::id::{
        marker::{GuildMarker, UserMarker},
        Id,
    },
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

type RedisPool = redis::aio::ConnectionManager;

pub async fn init(config: &DestroyerConfig) -> RedisClient {
    debug!("Creating Redis client");
    let client = redis::Client::open(config.redis.as_ref()).expect("Failed to create Redis client");
    let pool = RedisPool::new(client)
        .await
        .expect("Failed to initialize multiplexed Redis connection");
    let retention = CachePolicy::from_config(&config.cache).retention_window();
    RedisClient::new(pool, retention.num_seconds() as usize)
}

/// A [`CacheStore`] backed by Redis. Entries are written as compressed JSON
/// with a TTL of the retention window, so Redis expires them on its own.
#[derive(Clone)]
pub struct RedisClient {
    connection: RedisPool,
    retention_secs: usize,
}

impl RedisClient {
    pub fn new(connection: RedisPool, retention_secs: usize) -> Self {
        Self {
            connection,
            retention_secs,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, key: CacheKey) -> Result<Option<T>> {
        let mut conn = self.connection.clone();
        let value: Option<Compressed> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        match value {
            Some(Compressed(payload)) => Ok(Some(serde_json::from_slice(&payload)?)),
            None => Ok(None),
        }
    }

    async fn set_json<T: Serialize>(&self, key: CacheKey, value: &T) -> Result<()> {
        let payload = Compressed(serde_json::to_vec(value)?);
        let mut conn = self.connection.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(payload)
            .arg("EX")
            .arg(self.retention_secs)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CacheStore for RedisClient {
    async fn fetch_guilds(&self, user_id: Id<UserMarker>) -> Result<Option<CachedGuildList>> {
        self.get_json(CacheKey::from(user_id)).await
    }

    async fn save_guilds(&self, entry: &CachedGuildList) -> Result<()> {
        debug!("Caching {} guilds for user {}", entry.guilds.len(), entry.user_id);
        self.set_json(CacheKey::from(entry.user_id), entry).await
    }

    async fn fetch_channels(&self, guild_id: Id<GuildMarker>) -> Result<Option<CachedChannelList>> {
        self.get_json(CacheKey::from(guild_id)).await
    }

    async fn save_channels(&self, entry: &CachedChannelList) -> Result<()> {
        debug!("Caching {} channels for guild {}", entry.channels.len(), entry.guild_id);
        self.set_json(CacheKey::from(entry.guild_id), entry).await
    }
}
