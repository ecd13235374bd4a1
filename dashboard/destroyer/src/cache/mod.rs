//! Cache-aside layer in front of the Discord guild and channel endpoints.
//!
//! Entries are trusted for the freshness window. Stores physically drop them
//! after the longer retention window, which leaves room to serve a stale copy
//! when Discord rate limits the refresh.

mod discord;
mod memory;

pub use self::discord::{
    ChannelListing, ChannelWarning, DiscordCache, GuildFetchError, GuildListing,
};
pub use self::memory::InMemoryCacheStore;

use crate::config::CacheConfig;
use crate::models::{
    id::{
        marker::{GuildMarker, UserMarker},
        Id,
    },
    ChannelSummary, GuildSummary,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The guilds a user belongs to, keyed by the user.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedGuildList {
    pub user_id: Id<UserMarker>,
    pub guilds: Vec<GuildSummary>,
    pub cached_at: DateTime<Utc>,
}

/// The text channels of a guild, keyed by the guild.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedChannelList {
    pub guild_id: Id<GuildMarker>,
    pub channels: Vec<ChannelSummary>,
    pub cached_at: DateTime<Utc>,
}

/// Keyed persistence for cache entries. Saving replaces any existing entry for
/// the same key, and implementations expire entries after their retention
/// window on their own.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn fetch_guilds(&self, user_id: Id<UserMarker>) -> Result<Option<CachedGuildList>>;
    async fn save_guilds(&self, entry: &CachedGuildList) -> Result<()>;
    async fn fetch_channels(&self, guild_id: Id<GuildMarker>) -> Result<Option<CachedChannelList>>;
    async fn save_channels(&self, entry: &CachedChannelList) -> Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Freshness {
    Absent,
    Fresh,
    Stale,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CachePolicy {
    freshness: Duration,
    retention: Duration,
}

impl CachePolicy {
    pub fn new(freshness: Duration, retention: Duration) -> Self {
        assert!(
            retention > freshness,
            "Cache retention must outlive the freshness window"
        );
        Self {
            freshness,
            retention,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            Duration::seconds(config.freshness_secs as i64),
            Duration::seconds(config.retention_secs as i64),
        )
    }

    pub fn freshness_window(&self) -> Duration {
        self.freshness
    }

    pub fn retention_window(&self) -> Duration {
        self.retention
    }

    pub fn classify(&self, cached_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Freshness {
        match cached_at {
            None => Freshness::Absent,
            Some(cached_at) if now.signed_duration_since(cached_at) < self.freshness => {
                Freshness::Fresh
            }
            Some(_) => Freshness::Stale,
        }
    }

    pub fn is_fresh(&self, cached_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.classify(Some(cached_at), now) == Freshness::Fresh
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::new(Duration::minutes(5), Duration::minutes(10))
    }
}

fn record_lookup(cache: &'static str, outcome: &'static str) {
    metrics::increment_counter!("destroyer_cache_lookups", "cache" => cache, "outcome" => outcome);
}
