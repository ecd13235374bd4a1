mod models;

pub use self::models::*;
pub use sqlx::types as sql_types;
pub use sqlx::*;

use anyhow::Result;
use async_trait::async_trait;
use destroyer::{
    config::DestroyerConfig,
    models::id::{marker::GuildMarker, Id},
    settings::{patched, GuildSettings, SettingsDocument, SettingsStore, SettingsUpdate},
};
use tracing::debug;

pub type SqlPool = sqlx::Pool<SqlDatabase>;

const SCHEMA: &str = include_str!("../migrations/0001_guild_settings.sql");

pub async fn init(config: &DestroyerConfig) -> sqlx::PgPool {
    debug!("Creating Postgres client");
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(3)
        .connect(&config.database)
        .await
        .expect("Failed to initialize SQL connection pool");
    sqlx::query(SCHEMA)
        .execute(&pool)
        .await
        .expect("Failed to create the guild settings table");
    pool
}

/// Guild settings persisted as JSONB documents in Postgres.
#[derive(Clone, Debug)]
pub struct SqlSettingsStore(SqlPool);

impl SqlSettingsStore {
    pub fn new(pool: SqlPool) -> Self {
        Self(pool)
    }
}

#[async_trait]
impl SettingsStore for SqlSettingsStore {
    async fn fetch(&self, guild_id: Id<GuildMarker>) -> Result<Option<SettingsDocument>> {
        let row = GuildSettingsRow::fetch(guild_id).fetch_optional(&self.0).await?;
        row.map(GuildSettingsRow::into_document).transpose()
    }

    async fn save(&self, settings: &GuildSettings) -> Result<()> {
        GuildSettingsRow::new(settings)?.upsert().execute(&self.0).await?;
        Ok(())
    }

    async fn modify(
        &self,
        guild_id: Id<GuildMarker>,
        patch: SettingsUpdate,
    ) -> Result<GuildSettings> {
        let mut tx = self.0.begin().await?;
        // Also serializes the first write for a guild, when there is no row to lock yet.
        GuildSettingsRow::lock(guild_id).execute(&mut tx).await?;
        let document = GuildSettingsRow::fetch(guild_id)
            .fetch_optional(&mut tx)
            .await?
            .map(GuildSettingsRow::into_document)
            .transpose()?;
        let settings = patched(guild_id, document, patch);
        GuildSettingsRow::new(&settings)?.upsert().execute(&mut tx).await?;
        tx.commit().await?;
        Ok(settings)
    }
}
