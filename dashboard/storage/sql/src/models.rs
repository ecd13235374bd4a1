use destroyer::models::id::{marker::GuildMarker, Id};
use destroyer::settings::{GuildSettings, SettingsDocument};
use sqlx::types::{
    chrono::{DateTime, Utc},
    Json,
};

pub type SqlDatabase = sqlx::Postgres;
pub type SqlQuery<'a> = sqlx::query::Query<
    'a,
    SqlDatabase,
    <SqlDatabase as sqlx::database::HasArguments<'a>>::Arguments,
>;
pub type SqlQueryAs<'a, O> = sqlx::query::QueryAs<
    'a,
    SqlDatabase,
    O,
    <SqlDatabase as sqlx::database::HasArguments<'a>>::Arguments,
>;

/// A stored settings document, as written by whichever schema version saved it.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GuildSettingsRow {
    pub guild_id: i64,
    pub document: Json<serde_json::Value>,
    pub updated_at: DateTime<Utc>,
}

impl GuildSettingsRow {
    pub fn new(settings: &GuildSettings) -> destroyer::error::Result<Self> {
        Ok(Self {
            guild_id: settings.guild_id.get() as i64,
            document: Json(SettingsDocument::encode(settings)?),
            updated_at: settings.updated_at.unwrap_or_else(Utc::now),
        })
    }

    pub fn fetch<'a>(guild_id: Id<GuildMarker>) -> SqlQueryAs<'a, Self> {
        sqlx::query_as(
            "SELECT guild_id, document, updated_at \
             FROM guild_settings WHERE guild_id = $1",
        )
        .bind(guild_id.get() as i64)
    }

    /// Takes a transaction scoped advisory lock on the guild's settings.
    pub fn lock<'a>(guild_id: Id<GuildMarker>) -> SqlQuery<'a> {
        sqlx::query("SELECT pg_advisory_xact_lock($1)").bind(guild_id.get() as i64)
    }

    pub fn upsert(self) -> SqlQuery<'static> {
        sqlx::query(
            "INSERT INTO guild_settings (guild_id, document, updated_at) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (guild_id) \
             DO UPDATE SET document = excluded.document, updated_at = excluded.updated_at",
        )
        .bind(self.guild_id)
        .bind(self.document)
        .bind(self.updated_at)
    }

    pub fn into_document(self) -> destroyer::error::Result<SettingsDocument> {
        Ok(SettingsDocument::decode(self.document.0)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_is_tagged_with_schema() {
        let settings = GuildSettings::new(Id::new(41771983423143937));
        let row = GuildSettingsRow::new(&settings).unwrap();
        assert_eq!(row.guild_id, 41771983423143937);
        assert_eq!(row.document.0["schemaVersion"], 2);
        assert_eq!(
            row.into_document().unwrap(),
            SettingsDocument::V2(settings)
        );
    }
}
