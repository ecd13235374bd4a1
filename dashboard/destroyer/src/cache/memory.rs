use super::{CacheStore, CachedChannelList, CachedGuildList};
use crate::models::id::{
    marker::{GuildMarker, UserMarker},
    Id,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

#[derive(Debug)]
struct InMemoryCacheStoreRef {
    retention: Duration,
    guilds: DashMap<Id<UserMarker>, CachedGuildList>,
    channels: DashMap<Id<GuildMarker>, CachedChannelList>,
    writes: AtomicUsize,
}

/// A process local [`CacheStore`]. Entries older than the retention window are
/// dropped the next time they are read.
#[derive(Clone, Debug)]
pub struct InMemoryCacheStore(Arc<InMemoryCacheStoreRef>);

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::with_retention(Duration::minutes(10))
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self(Arc::new(InMemoryCacheStoreRef {
            retention,
            guilds: DashMap::new(),
            channels: DashMap::new(),
            writes: AtomicUsize::new(0),
        }))
    }

    /// The number of guild lists currently held, expired or not.
    pub fn guild_entries(&self) -> usize {
        self.0.guilds.len()
    }

    /// The number of channel lists currently held, expired or not.
    pub fn channel_entries(&self) -> usize {
        self.0.channels.len()
    }

    /// The total number of saves performed against this store.
    pub fn writes(&self) -> usize {
        self.0.writes.load(Ordering::Relaxed)
    }

    fn expired(&self, cached_at: DateTime<Utc>) -> bool {
        Utc::now().signed_duration_since(cached_at) >= self.0.retention
    }
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn fetch_guilds(&self, user_id: Id<UserMarker>) -> Result<Option<CachedGuildList>> {
        self.0
            .guilds
            .remove_if(&user_id, |_, entry| self.expired(entry.cached_at));
        Ok(self.0.guilds.get(&user_id).map(|entry| entry.clone()))
    }

    async fn save_guilds(&self, entry: &CachedGuildList) -> Result<()> {
        self.0.writes.fetch_add(1, Ordering::Relaxed);
        self.0.guilds.insert(entry.user_id, entry.clone());
        Ok(())
    }

    async fn fetch_channels(&self, guild_id: Id<GuildMarker>) -> Result<Option<CachedChannelList>> {
        self.0
            .channels
            .remove_if(&guild_id, |_, entry| self.expired(entry.cached_at));
        Ok(self.0.channels.get(&guild_id).map(|entry| entry.clone()))
    }

    async fn save_channels(&self, entry: &CachedChannelList) -> Result<()> {
        self.0.writes.fetch_add(1, Ordering::Relaxed);
        self.0.channels.insert(entry.guild_id, entry.clone());
        Ok(())
    }
}
