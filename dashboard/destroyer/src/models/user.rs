use super::id::{marker::UserMarker, Id};
use serde::{Deserialize, Serialize};

/// The logged in user as returned by `GET /users/@me`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct DiscordUser {
    pub id: Id<UserMarker>,
    pub username: String,
    #[serde(default)]
    pub discriminator: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}
