use super::{patched, GuildSettings, SettingsDocument, SettingsStore, SettingsUpdate};
use crate::models::id::{marker::GuildMarker, Id};
use anyhow::Result;
use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use serde_json::Value;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

#[derive(Debug, Default)]
struct InMemorySettingsStoreRef {
    documents: DashMap<Id<GuildMarker>, Value>,
    writes: AtomicUsize,
}

/// A process local [`SettingsStore`] holding documents in their stored form.
#[derive(Clone, Debug, Default)]
pub struct InMemorySettingsStore(Arc<InMemorySettingsStoreRef>);

impl InMemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a raw document as is, bypassing encoding. Does not count as a write.
    pub fn insert_raw(&self, guild_id: Id<GuildMarker>, document: Value) {
        self.0.documents.insert(guild_id, document);
    }

    pub fn writes(&self) -> usize {
        self.0.writes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SettingsStore for InMemorySettingsStore {
    async fn fetch(&self, guild_id: Id<GuildMarker>) -> Result<Option<SettingsDocument>> {
        let document = self.0.documents.get(&guild_id).map(|doc| doc.clone());
        Ok(document.map(SettingsDocument::decode).transpose()?)
    }

    async fn save(&self, settings: &GuildSettings) -> Result<()> {
        let document = SettingsDocument::encode(settings)?;
        self.0.documents.insert(settings.guild_id, document);
        self.0.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn modify(
        &self,
        guild_id: Id<GuildMarker>,
        patch: SettingsUpdate,
    ) -> Result<GuildSettings> {
        // The entry holds its shard's write lock until it is dropped.
        let settings = match self.0.documents.entry(guild_id) {
            Entry::Occupied(mut entry) => {
                let document = SettingsDocument::decode(entry.get().clone())?;
                let settings = patched(guild_id, Some(document), patch);
                entry.insert(SettingsDocument::encode(&settings)?);
                settings
            }
            Entry::Vacant(entry) => {
                let settings = patched(guild_id, None, patch);
                entry.insert(SettingsDocument::encode(&settings)?);
                settings
            }
        };
        self.0.writes.fetch_add(1, Ordering::Relaxed);
        Ok(settings)
    }
}
