pub mod channel;
pub mod guild;
pub mod user;

pub use twilight_model::guild::Permissions;
pub use twilight_model::id;

pub use self::{
    channel::{text_channels, ChannelSummary, RawChannel, TEXT_CHANNEL},
    guild::{can_manage, GuildSummary},
    user::DiscordUser,
};

use self::id::Id;
use crate::error::Error;

/// Parses a decimal snowflake from a path segment or document field.
pub fn parse_id<T>(raw: &str) -> Result<Id<T>, Error> {
    raw.parse::<u64>()
        .ok()
        .and_then(Id::new_checked)
        .ok_or_else(|| Error::InvalidSnowflake(raw.to_owned()))
}
