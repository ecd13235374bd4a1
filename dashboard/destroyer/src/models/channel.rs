use super::id::{marker::ChannelMarker, Id};
use serde::{Deserialize, Serialize};

/// The channel type discriminator Discord uses for guild text channels.
pub const TEXT_CHANNEL: u8 = 0;

/// The subset of a `GET /guilds/{id}/channels` entry the dashboard reads.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct RawChannel {
    pub id: Id<ChannelMarker>,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub position: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChannelSummary {
    pub id: Id<ChannelMarker>,
    pub name: String,
    pub position: i64,
}

impl RawChannel {
    pub fn is_text(&self) -> bool {
        self.kind == TEXT_CHANNEL
    }
}

impl From<RawChannel> for ChannelSummary {
    fn from(channel: RawChannel) -> Self {
        Self {
            id: channel.id,
            name: channel.name.unwrap_or_default(),
            position: channel.position,
        }
    }
}

/// Keeps only text channels, ordered by their position in the channel list.
pub fn text_channels(channels: impl IntoIterator<Item = RawChannel>) -> Vec<ChannelSummary> {
    let mut text: Vec<ChannelSummary> = channels
        .into_iter()
        .filter(RawChannel::is_text)
        .map(ChannelSummary::from)
        .collect();
    text.sort_by_key(|channel| channel.position);
    text
}
