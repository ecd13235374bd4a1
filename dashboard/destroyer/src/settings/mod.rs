//! Per-guild settings with lazy schema migration.
//!
//! Documents are upgraded to the current schema when they are read, and the
//! upgraded form is written back once so later reads skip the migration.

mod document;
mod memory;

pub use self::document::*;
pub use self::memory::InMemorySettingsStore;

use crate::models::id::{marker::GuildMarker, Id};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn fetch(&self, guild_id: Id<GuildMarker>) -> Result<Option<SettingsDocument>>;

    /// Creates or replaces the document stored for `settings.guild_id`.
    async fn save(&self, settings: &GuildSettings) -> Result<()>;

    /// Reads, patches and writes back one guild's document. Concurrent calls
    /// for the same guild are serialized, so no patch is lost.
    async fn modify(
        &self,
        guild_id: Id<GuildMarker>,
        patch: SettingsUpdate,
    ) -> Result<GuildSettings>;
}

/// Loads a guild's settings, migrating and persisting legacy documents.
/// Guilds without a stored document get defaults, which are not persisted.
pub async fn load(store: &dyn SettingsStore, guild_id: Id<GuildMarker>) -> Result<GuildSettings> {
    let document = match store.fetch(guild_id).await? {
        Some(document) => document,
        None => return Ok(GuildSettings::new(guild_id)),
    };

    let from_version = document.version();
    let (settings, migrated) = document.upgrade();
    if migrated {
        store.save(&settings).await?;
        tracing::info!(
            "Migrated settings for guild {} from schema {} to {}",
            guild_id,
            from_version,
            CURRENT_SCHEMA
        );
    }
    Ok(settings)
}

/// Applies a partial update and persists the result with a single write.
pub async fn update(
    store: &dyn SettingsStore,
    guild_id: Id<GuildMarker>,
    patch: SettingsUpdate,
) -> Result<GuildSettings> {
    let settings = store.modify(guild_id, patch).await?;
    tracing::debug!("Updated settings for guild {}", guild_id);
    Ok(settings)
}

/// The settings that result from applying `patch` to a stored document,
/// upgrading it first if needed. Stores call this inside their
/// [`SettingsStore::modify`] critical section.
pub fn patched(
    guild_id: Id<GuildMarker>,
    document: Option<SettingsDocument>,
    patch: SettingsUpdate,
) -> GuildSettings {
    let mut settings = match document {
        Some(document) => document.upgrade().0,
        None => GuildSettings::new(guild_id),
    };
    patch.apply(&mut settings);

    let now = Utc::now();
    settings.created_at.get_or_insert(now);
    settings.updated_at = Some(now);
    settings
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const GUILD: u64 = 41771983423143937;

    fn legacy() -> serde_json::Value {
        json!({
            "guildId": GUILD.to_string(),
            "welcomeEnabled": true,
            "logChannelId": "41771983423143938",
        })
    }

    #[tokio::test]
    async fn test_load_defaults_are_not_saved() {
        let store = InMemorySettingsStore::new();
        let settings = load(&store, Id::new(GUILD)).await.unwrap();
        assert_eq!(settings, GuildSettings::new(Id::new(GUILD)));
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_load_migrates_once() {
        let store = InMemorySettingsStore::new();
        store.insert_raw(Id::new(GUILD), legacy());

        let first = load(&store, Id::new(GUILD)).await.unwrap();
        assert!(first.welcome.enabled);
        assert_eq!(first.logs.channel_id, Some(Id::new(41771983423143938)));
        assert_eq!(store.writes(), 1);

        let second = load(&store, Id::new(GUILD)).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn test_load_rejects_unknown_schema() {
        let store = InMemorySettingsStore::new();
        store.insert_raw(Id::new(GUILD), json!({ "guildId": "1", "schemaVersion": 9 }));
        assert!(load(&store, Id::new(GUILD)).await.is_err());
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_update_creates_and_stamps() {
        let store = InMemorySettingsStore::new();
        let patch = SettingsUpdate {
            anti_spam: Some(true),
            ..Default::default()
        };
        let created = update(&store, Id::new(GUILD), patch).await.unwrap();
        assert!(created.anti_spam);
        assert!(created.created_at.is_some());
        assert_eq!(created.created_at, created.updated_at);
        assert_eq!(store.writes(), 1);

        let patch = SettingsUpdate {
            prefix: Some(">".to_owned()),
            ..Default::default()
        };
        let updated = update(&store, Id::new(GUILD), patch).await.unwrap();
        assert!(updated.anti_spam);
        assert_eq!(updated.prefix, ">");
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at >= created.updated_at);
        assert_eq!(load(&store, Id::new(GUILD)).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn test_update_migrates_legacy_in_one_write() {
        let store = InMemorySettingsStore::new();
        store.insert_raw(Id::new(GUILD), legacy());
        let patch = SettingsUpdate {
            link_filter: Some(true),
            ..Default::default()
        };
        let settings = update(&store, Id::new(GUILD), patch).await.unwrap();
        assert!(settings.link_filter);
        assert!(settings.welcome.enabled);
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_keep_every_field() {
        let store = InMemorySettingsStore::new();
        let patches = vec![
            SettingsUpdate { prefix: Some("%".to_owned()), ..Default::default() },
            SettingsUpdate { filter_profanity: Some(true), ..Default::default() },
            SettingsUpdate { anti_spam: Some(true), ..Default::default() },
            SettingsUpdate { link_filter: Some(true), ..Default::default() },
            SettingsUpdate { log_members: Some(true), ..Default::default() },
            SettingsUpdate { log_moderation: Some(true), ..Default::default() },
        ];
        let tasks: Vec<_> = patches
            .into_iter()
            .map(|patch| {
                let store = store.clone();
                tokio::spawn(async move { update(&store, Id::new(GUILD), patch).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let settings = load(&store, Id::new(GUILD)).await.unwrap();
        assert_eq!(settings.prefix, "%");
        assert!(settings.filter_profanity);
        assert!(settings.anti_spam);
        assert!(settings.link_filter);
        assert!(settings.log_members);
        assert!(settings.log_moderation);
        assert_eq!(store.writes(), 6);
    }
}
