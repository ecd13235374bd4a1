use super::{record_lookup, CachePolicy, CacheStore, CachedChannelList, CachedGuildList};
use crate::discord::{GuildApi, Upstream};
use crate::models::{
    channel::text_channels,
    id::{
        marker::{GuildMarker, UserMarker},
        Id,
    },
    ChannelSummary, GuildSummary,
};
use chrono::Utc;
use reqwest::StatusCode;
use std::{fmt, sync::Arc};
use thiserror::Error;
use tracing::{debug, error, warn};

#[derive(Clone, Debug, PartialEq)]
pub struct GuildListing {
    pub guilds: Vec<GuildSummary>,
    pub from_cache: bool,
}

#[derive(Debug, Error)]
pub enum GuildFetchError {
    /// Discord answered with a non-success status.
    #[error("Discord responded with {}", .status)]
    Upstream {
        status: StatusCode,
        retry_after: Option<f64>,
    },
    /// The request never produced an answer: network, decoding or store failure.
    #[error("{}", .0)]
    Internal(String),
}

impl From<anyhow::Error> for GuildFetchError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(format!("{:#}", err))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelWarning {
    BotTokenMissing,
    StaleFromRateLimit,
    RateLimited,
    FetchFailed,
    Error,
}

impl fmt::Display for ChannelWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BotTokenMissing => "Bot token not configured. Channel selection is unavailable.",
            Self::StaleFromRateLimit => "Using cached data due to rate limiting.",
            Self::RateLimited => {
                "Rate limited by Discord. Please wait a moment and refresh the page."
            }
            Self::FetchFailed => {
                "Unable to fetch channels. Please ensure the bot is in the guild and has proper \
                 permissions."
            }
            Self::Error => "An error occurred while fetching channels.",
        })
    }
}

/// The channels of a guild. Degraded lookups carry a warning instead of failing.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelListing {
    pub channels: Vec<ChannelSummary>,
    pub from_cache: bool,
    pub warning: Option<ChannelWarning>,
    /// Seconds Discord asked us to wait before retrying, if it rate limited us.
    pub retry_after: Option<f64>,
}

impl ChannelListing {
    fn cached(channels: Vec<ChannelSummary>) -> Self {
        Self {
            channels,
            from_cache: true,
            warning: None,
            retry_after: None,
        }
    }

    fn fetched(channels: Vec<ChannelSummary>) -> Self {
        Self {
            channels,
            from_cache: false,
            warning: None,
            retry_after: None,
        }
    }

    /// The `destroyer_cache_lookups` outcome this listing is counted under.
    fn lookup_outcome(&self) -> &'static str {
        match (self.from_cache, self.warning) {
            (true, Some(ChannelWarning::StaleFromRateLimit)) => "stale",
            (true, _) => "hit",
            (false, _) => "miss",
        }
    }

    fn degraded(warning: ChannelWarning) -> Self {
        Self {
            channels: Vec::new(),
            from_cache: false,
            warning: Some(warning),
            retry_after: None,
        }
    }
}

/// Cache-aside access to a user's guilds and a guild's channels.
///
/// Concurrent misses on the same key are not coalesced: each one calls Discord
/// and writes its own snapshot, and the last write wins.
#[derive(Clone)]
pub struct DiscordCache {
    store: Arc<dyn CacheStore>,
    api: Arc<dyn GuildApi>,
    policy: CachePolicy,
}

impl DiscordCache {
    pub fn new(store: Arc<dyn CacheStore>, api: Arc<dyn GuildApi>, policy: CachePolicy) -> Self {
        Self { store, api, policy }
    }

    /// Gets the guilds the user is in, refreshing from Discord once the cached
    /// list is older than the freshness window.
    pub async fn user_guilds(
        &self,
        access_token: &str,
        user_id: Id<UserMarker>,
    ) -> Result<GuildListing, GuildFetchError> {
        let result = self.fetch_user_guilds(access_token, user_id).await;
        if let Err(GuildFetchError::Internal(ref message)) = result {
            error!("Failed to load guilds for user {}: {}", user_id, message);
        }
        result
    }

    async fn fetch_user_guilds(
        &self,
        access_token: &str,
        user_id: Id<UserMarker>,
    ) -> Result<GuildListing, GuildFetchError> {
        let now = Utc::now();
        if let Some(entry) = self.store.fetch_guilds(user_id).await? {
            if self.policy.is_fresh(entry.cached_at, now) {
                debug!("Serving guilds from cache for user {}", user_id);
                record_lookup("guilds", "hit");
                return Ok(GuildListing {
                    guilds: entry.guilds,
                    from_cache: true,
                });
            }
        }

        record_lookup("guilds", "miss");
        let guilds = match self.api.current_user_guilds(access_token).await? {
            Upstream::Fetched(guilds) => guilds,
            Upstream::Rejected(rejection) => {
                return Err(GuildFetchError::Upstream {
                    status: rejection.status,
                    retry_after: rejection.rate_limit.retry_after,
                })
            }
        };

        let entry = CachedGuildList {
            user_id,
            guilds,
            cached_at: Utc::now(),
        };
        self.store.save_guilds(&entry).await?;
        debug!("Cached {} guilds for user {}", entry.guilds.len(), user_id);

        Ok(GuildListing {
            guilds: entry.guilds,
            from_cache: false,
        })
    }

    /// Gets the text channels of a guild. Never fails: problems are reported
    /// through [`ChannelListing::warning`].
    pub async fn guild_channels(
        &self,
        guild_id: Id<GuildMarker>,
        bot_token: Option<&str>,
    ) -> ChannelListing {
        let listing = match self.fetch_guild_channels(guild_id, bot_token).await {
            Ok(listing) => listing,
            Err(err) => {
                error!("Failed to load channels for guild {}: {:#}", guild_id, err);
                ChannelListing::degraded(ChannelWarning::Error)
            }
        };
        record_lookup("channels", listing.lookup_outcome());
        listing
    }

    async fn fetch_guild_channels(
        &self,
        guild_id: Id<GuildMarker>,
        bot_token: Option<&str>,
    ) -> anyhow::Result<ChannelListing> {
        let now = Utc::now();
        let cached = match self.store.fetch_channels(guild_id).await? {
            Some(entry) if self.policy.is_fresh(entry.cached_at, now) => {
                debug!("Serving channels from cache for guild {}", guild_id);
                return Ok(ChannelListing::cached(entry.channels));
            }
            other => other,
        };

        let bot_token = match bot_token.filter(|token| !token.is_empty()) {
            Some(token) => token,
            None => {
                warn!("Bot token not configured, channel selection is unavailable");
                return Ok(ChannelListing::degraded(ChannelWarning::BotTokenMissing));
            }
        };

        let raw = match self.api.guild_channels(guild_id, bot_token).await? {
            Upstream::Fetched(raw) => raw,
            Upstream::Rejected(rejection) if rejection.is_rate_limited() => {
                return Ok(match cached {
                    Some(entry) => {
                        warn!("Rate limited, serving stale channels for guild {}", guild_id);
                        ChannelListing {
                            channels: entry.channels,
                            from_cache: true,
                            warning: Some(ChannelWarning::StaleFromRateLimit),
                            retry_after: rejection.rate_limit.retry_after,
                        }
                    }
                    None => ChannelListing {
                        retry_after: rejection.rate_limit.retry_after,
                        ..ChannelListing::degraded(ChannelWarning::RateLimited)
                    },
                });
            }
            Upstream::Rejected(_) => {
                return Ok(ChannelListing::degraded(ChannelWarning::FetchFailed));
            }
        };

        let entry = CachedChannelList {
            guild_id,
            channels: text_channels(raw),
            cached_at: Utc::now(),
        };
        self.store.save_channels(&entry).await?;
        debug!(
            "Cached {} text channels for guild {}",
            entry.channels.len(),
            guild_id
        );

        Ok(ChannelListing::fetched(entry.channels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCacheStore;
    use crate::discord::{RateLimit, Rejection};
    use crate::models::RawChannel;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration};
    use serde_json::json;
    use static_assertions::assert_impl_all;
    use std::sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    };

    assert_impl_all!(DiscordCache: Clone, Send, Sync);

    const USER: u64 = 80351110224678912;
    const GUILD: u64 = 41771983423143937;

    #[derive(Default)]
    struct FakeGuildApi {
        guild_calls: AtomicUsize,
        channel_calls: AtomicUsize,
        failure: Mutex<Option<StatusCode>>,
        broken: AtomicBool,
    }

    impl FakeGuildApi {
        fn fail_with(&self, status: StatusCode) {
            *self.failure.lock().unwrap() = Some(status);
        }

        fn guild_calls(&self) -> usize {
            self.guild_calls.load(Ordering::SeqCst)
        }

        fn channel_calls(&self) -> usize {
            self.channel_calls.load(Ordering::SeqCst)
        }

        fn respond<T>(&self, payload: serde_json::Value) -> Result<Upstream<T>>
        where
            T: serde::de::DeserializeOwned,
        {
            if self.broken.load(Ordering::SeqCst) {
                return Err(anyhow!("connection reset by peer"));
            }
            if let Some(status) = *self.failure.lock().unwrap() {
                return Ok(Upstream::Rejected(Rejection {
                    status,
                    rate_limit: RateLimit {
                        retry_after: Some(2.5),
                        ..RateLimit::default()
                    },
                    body: String::new(),
                }));
            }
            Ok(Upstream::Fetched(serde_json::from_value(payload)?))
        }
    }

    #[async_trait]
    impl GuildApi for FakeGuildApi {
        async fn current_user_guilds(&self, _: &str) -> Result<Upstream<Vec<GuildSummary>>> {
            self.guild_calls.fetch_add(1, Ordering::SeqCst);
            self.respond(json!([
                { "id": GUILD.to_string(), "name": "Admin", "icon": null, "owner": true, "permissions": "8" },
                { "id": "2", "name": "Member", "icon": "abc", "owner": false, "permissions": "0" },
            ]))
        }

        async fn guild_channels(
            &self,
            _: Id<GuildMarker>,
            _: &str,
        ) -> Result<Upstream<Vec<RawChannel>>> {
            self.channel_calls.fetch_add(1, Ordering::SeqCst);
            self.respond(json!([
                { "id": "1", "type": 2, "name": "voice", "position": 5 },
                { "id": "2", "type": 0, "name": "rules", "position": 3 },
                { "id": "3", "type": 0, "name": "general", "position": 1 },
            ]))
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        async fn fetch_guilds(&self, _: Id<UserMarker>) -> Result<Option<CachedGuildList>> {
            Err(anyhow!("store unavailable"))
        }

        async fn save_guilds(&self, _: &CachedGuildList) -> Result<()> {
            Err(anyhow!("store unavailable"))
        }

        async fn fetch_channels(&self, _: Id<GuildMarker>) -> Result<Option<CachedChannelList>> {
            Err(anyhow!("store unavailable"))
        }

        async fn save_channels(&self, _: &CachedChannelList) -> Result<()> {
            Err(anyhow!("store unavailable"))
        }
    }

    fn setup() -> (DiscordCache, InMemoryCacheStore, Arc<FakeGuildApi>) {
        let store = InMemoryCacheStore::new();
        let api = Arc::new(FakeGuildApi::default());
        let cache = DiscordCache::new(
            Arc::new(store.clone()),
            api.clone(),
            CachePolicy::default(),
        );
        (cache, store, api)
    }

    fn cached_guilds(cached_at: DateTime<Utc>) -> CachedGuildList {
        CachedGuildList {
            user_id: Id::new(USER),
            guilds: vec![serde_json::from_value(json!({
                "id": "99", "name": "Cached", "icon": null, "owner": false, "permissions": "32"
            }))
            .unwrap()],
            cached_at,
        }
    }

    fn cached_channels(cached_at: DateTime<Utc>) -> CachedChannelList {
        CachedChannelList {
            guild_id: Id::new(GUILD),
            channels: vec![ChannelSummary {
                id: Id::new(77),
                name: "old-general".to_owned(),
                position: 0,
            }],
            cached_at,
        }
    }

    #[tokio::test]
    async fn test_guilds_miss_fetches_and_caches() {
        let (cache, store, api) = setup();
        let listing = cache.user_guilds("token", Id::new(USER)).await.unwrap();
        assert!(!listing.from_cache);
        assert_eq!(listing.guilds.len(), 2);
        assert_eq!(api.guild_calls(), 1);
        assert_eq!(store.writes(), 1);

        let cached = store.fetch_guilds(Id::new(USER)).await.unwrap().unwrap();
        assert_eq!(cached.guilds, listing.guilds);
    }

    #[tokio::test]
    async fn test_guilds_fresh_entry_skips_upstream() {
        let (cache, store, api) = setup();
        let entry = cached_guilds(Utc::now() - Duration::minutes(4));
        store.save_guilds(&entry).await.unwrap();

        let listing = cache.user_guilds("token", Id::new(USER)).await.unwrap();
        assert!(listing.from_cache);
        assert_eq!(listing.guilds, entry.guilds);
        assert_eq!(api.guild_calls(), 0);
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn test_guilds_expiry_boundary_refetches_once() {
        let (cache, store, api) = setup();
        store
            .save_guilds(&cached_guilds(Utc::now() - Duration::minutes(5)))
            .await
            .unwrap();

        let listing = cache.user_guilds("token", Id::new(USER)).await.unwrap();
        assert!(!listing.from_cache);
        assert_eq!(api.guild_calls(), 1);
    }

    #[tokio::test]
    async fn test_guilds_upsert_keeps_single_entry() {
        let (cache, store, api) = setup();
        cache.user_guilds("token", Id::new(USER)).await.unwrap();

        // Age the first snapshot past the freshness window.
        let mut aged = store.fetch_guilds(Id::new(USER)).await.unwrap().unwrap();
        aged.cached_at = Utc::now() - Duration::minutes(6);
        store.save_guilds(&aged).await.unwrap();

        let before = Utc::now();
        cache.user_guilds("token", Id::new(USER)).await.unwrap();
        let after = Utc::now();

        assert_eq!(api.guild_calls(), 2);
        assert_eq!(store.guild_entries(), 1);
        let entry = store.fetch_guilds(Id::new(USER)).await.unwrap().unwrap();
        assert!(entry.cached_at >= before && entry.cached_at <= after);
    }

    #[tokio::test]
    async fn test_guilds_upstream_failure_carries_status() {
        let (cache, store, api) = setup();
        api.fail_with(StatusCode::UNAUTHORIZED);

        match cache.user_guilds("token", Id::new(USER)).await {
            Err(GuildFetchError::Upstream { status, .. }) => {
                assert_eq!(status, StatusCode::UNAUTHORIZED)
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_guilds_rate_limit_carries_retry_after() {
        let (cache, _, api) = setup();
        api.fail_with(StatusCode::TOO_MANY_REQUESTS);

        match cache.user_guilds("token", Id::new(USER)).await {
            Err(GuildFetchError::Upstream {
                status,
                retry_after,
            }) => {
                assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
                assert_eq!(retry_after, Some(2.5));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_guilds_network_error_is_internal() {
        let (cache, _, api) = setup();
        api.broken.store(true, Ordering::SeqCst);

        match cache.user_guilds("token", Id::new(USER)).await {
            Err(GuildFetchError::Internal(message)) => {
                assert!(message.contains("connection reset"))
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_guilds_store_error_is_internal() {
        let api = Arc::new(FakeGuildApi::default());
        let cache = DiscordCache::new(Arc::new(BrokenStore), api.clone(), CachePolicy::default());
        let result = cache.user_guilds("token", Id::new(USER)).await;
        assert!(matches!(result, Err(GuildFetchError::Internal(_))));
        assert_eq!(api.guild_calls(), 0);
    }

    #[tokio::test]
    async fn test_channels_filtered_sorted_and_cached() {
        let (cache, store, api) = setup();
        let listing = cache.guild_channels(Id::new(GUILD), Some("bot")).await;

        let ids: Vec<u64> = listing.channels.iter().map(|c| c.id.get()).collect();
        let positions: Vec<i64> = listing.channels.iter().map(|c| c.position).collect();
        assert_eq!(ids, vec![3, 2]);
        assert_eq!(positions, vec![1, 3]);
        assert_eq!(listing.warning, None);
        assert!(!listing.from_cache);
        assert_eq!(api.channel_calls(), 1);

        let cached = store.fetch_channels(Id::new(GUILD)).await.unwrap().unwrap();
        assert_eq!(cached.channels, listing.channels);
    }

    #[tokio::test]
    async fn test_channels_fresh_entry_skips_upstream() {
        let (cache, store, api) = setup();
        let entry = cached_channels(Utc::now() - Duration::seconds(30));
        store.save_channels(&entry).await.unwrap();

        let listing = cache.guild_channels(Id::new(GUILD), Some("bot")).await;
        assert_eq!(listing, ChannelListing::cached(entry.channels));
        assert_eq!(api.channel_calls(), 0);
    }

    #[tokio::test]
    async fn test_channels_expiry_boundary_refetches_once() {
        let (cache, store, api) = setup();
        store
            .save_channels(&cached_channels(Utc::now() - Duration::minutes(5)))
            .await
            .unwrap();

        let listing = cache.guild_channels(Id::new(GUILD), Some("bot")).await;
        assert!(!listing.from_cache);
        assert_eq!(listing.channels.len(), 2);
        assert_eq!(api.channel_calls(), 1);
    }

    #[tokio::test]
    async fn test_channels_missing_bot_token() {
        let (cache, store, api) = setup();
        for token in [None, Some("")] {
            let listing = cache.guild_channels(Id::new(GUILD), token).await;
            assert!(listing.channels.is_empty());
            assert_eq!(listing.warning, Some(ChannelWarning::BotTokenMissing));
        }
        assert_eq!(api.channel_calls(), 0);
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_channels_rate_limited_serves_stale() {
        let (cache, store, api) = setup();
        let stale = cached_channels(Utc::now() - Duration::minutes(8));
        store.save_channels(&stale).await.unwrap();
        api.fail_with(StatusCode::TOO_MANY_REQUESTS);

        let listing = cache.guild_channels(Id::new(GUILD), Some("bot")).await;
        assert_eq!(listing.channels, stale.channels);
        assert_eq!(listing.warning, Some(ChannelWarning::StaleFromRateLimit));
        assert_eq!(api.channel_calls(), 1);

        // Serving the stale copy must not refresh it.
        let entry = store.fetch_channels(Id::new(GUILD)).await.unwrap().unwrap();
        assert_eq!(entry.cached_at, stale.cached_at);
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn test_channels_rate_limited_without_cache() {
        let (cache, store, api) = setup();
        api.fail_with(StatusCode::TOO_MANY_REQUESTS);

        let listing = cache.guild_channels(Id::new(GUILD), Some("bot")).await;
        assert!(listing.channels.is_empty());
        assert_eq!(listing.warning, Some(ChannelWarning::RateLimited));
        assert_eq!(listing.retry_after, Some(2.5));
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_channels_other_failures_do_not_serve_stale() {
        let (cache, store, api) = setup();
        store
            .save_channels(&cached_channels(Utc::now() - Duration::minutes(8)))
            .await
            .unwrap();
        api.fail_with(StatusCode::FORBIDDEN);

        let listing = cache.guild_channels(Id::new(GUILD), Some("bot")).await;
        assert!(listing.channels.is_empty());
        assert_eq!(listing.warning, Some(ChannelWarning::FetchFailed));
    }

    #[tokio::test]
    async fn test_channels_errors_become_warnings() {
        let (cache, _, api) = setup();
        api.broken.store(true, Ordering::SeqCst);
        let listing = cache.guild_channels(Id::new(GUILD), Some("bot")).await;
        assert_eq!(listing, ChannelListing::degraded(ChannelWarning::Error));

        let cache = DiscordCache::new(Arc::new(BrokenStore), api, CachePolicy::default());
        let listing = cache.guild_channels(Id::new(GUILD), Some("bot")).await;
        assert_eq!(listing.warning, Some(ChannelWarning::Error));
    }

    #[tokio::test]
    async fn test_channel_lookup_outcomes() {
        let (cache, store, api) = setup();
        let listing = cache.guild_channels(Id::new(GUILD), None).await;
        assert_eq!(listing.lookup_outcome(), "miss");

        api.fail_with(StatusCode::FORBIDDEN);
        let listing = cache.guild_channels(Id::new(GUILD), Some("bot")).await;
        assert_eq!(listing.lookup_outcome(), "miss");

        api.fail_with(StatusCode::TOO_MANY_REQUESTS);
        let listing = cache.guild_channels(Id::new(GUILD), Some("bot")).await;
        assert_eq!(listing.lookup_outcome(), "miss");

        store
            .save_channels(&cached_channels(Utc::now() - Duration::minutes(8)))
            .await
            .unwrap();
        let listing = cache.guild_channels(Id::new(GUILD), Some("bot")).await;
        assert_eq!(listing.lookup_outcome(), "stale");

        store.save_channels(&cached_channels(Utc::now())).await.unwrap();
        let listing = cache.guild_channels(Id::new(GUILD), Some("bot")).await;
        assert_eq!(listing.lookup_outcome(), "hit");

        api.broken.store(true, Ordering::SeqCst);
        let listing = cache.guild_channels(Id::new(2), Some("bot")).await;
        assert_eq!(listing.warning, Some(ChannelWarning::Error));
        assert_eq!(listing.lookup_outcome(), "miss");
    }
}
