use super::id::{marker::GuildMarker, Id};
use super::Permissions;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A guild as returned by `GET /users/@me/guilds`.
///
/// Fields the dashboard does not read are kept in `extra` so the cached copy
/// round-trips the upstream payload unchanged.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct GuildSummary {
    pub id: Id<GuildMarker>,
    pub name: String,
    pub icon: Option<String>,
    #[serde(default)]
    pub owner: bool,
    /// The permission bitfield, encoded as a decimal string by Discord.
    pub permissions: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GuildSummary {
    /// The user's guild level permissions. Unparseable bitfields grant nothing.
    pub fn permissions(&self) -> Permissions {
        self.permissions
            .parse::<u64>()
            .map(Permissions::from_bits_truncate)
            .unwrap_or_else(|_| Permissions::empty())
    }

    pub fn can_manage(&self) -> bool {
        can_manage(self.permissions())
    }
}

/// Whether a set of permissions allows editing the bot's configuration for a guild.
pub fn can_manage(permissions: Permissions) -> bool {
    permissions.contains(Permissions::MANAGE_GUILD)
        || permissions.contains(Permissions::ADMINISTRATOR)
}
