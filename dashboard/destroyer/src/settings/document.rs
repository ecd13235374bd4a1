use crate::error::Error;
use crate::models::{
    id::{
        marker::{ChannelMarker, GuildMarker},
        Id,
    },
    parse_id,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// The field stored documents use to tag their schema version.
pub const SCHEMA_FIELD: &str = "schemaVersion";
pub const CURRENT_SCHEMA: u64 = 2;

const DEFAULT_PREFIX: &str = "!";
const DEFAULT_WELCOME_MESSAGE: &str = "Welcome to the server!";

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_owned()
}

fn default_welcome_message() -> String {
    DEFAULT_WELCOME_MESSAGE.to_owned()
}

fn yes() -> bool {
    true
}

/// Distinguishes an explicit `null` from a missing field.
fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomeSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub channel_id: Option<Id<ChannelMarker>>,
    #[serde(default = "default_welcome_message")]
    pub message: String,
}

impl Default for WelcomeSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            channel_id: None,
            message: default_welcome_message(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub channel_id: Option<Id<ChannelMarker>>,
    #[serde(default = "yes")]
    pub message_create: bool,
    #[serde(default = "yes")]
    pub message_delete: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            channel_id: None,
            message_create: true,
            message_delete: true,
        }
    }
}

/// Per-guild bot configuration, schema version 2.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuildSettings {
    pub guild_id: Id<GuildMarker>,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub filter_profanity: bool,
    #[serde(default)]
    pub anti_spam: bool,
    #[serde(default)]
    pub link_filter: bool,
    #[serde(default)]
    pub log_members: bool,
    #[serde(default)]
    pub log_moderation: bool,
    #[serde(default)]
    pub welcome: WelcomeSettings,
    #[serde(default)]
    pub logs: LogSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl GuildSettings {
    /// The settings a guild has before anyone saves any.
    pub fn new(guild_id: Id<GuildMarker>) -> Self {
        Self {
            guild_id,
            prefix: default_prefix(),
            filter_profanity: false,
            anti_spam: false,
            link_filter: false,
            log_members: false,
            log_moderation: false,
            welcome: WelcomeSettings::default(),
            logs: LogSettings::default(),
            created_at: None,
            updated_at: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyLogSettings {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub channel_id: Option<Id<ChannelMarker>>,
    #[serde(default = "yes")]
    pub message_create: bool,
    #[serde(default = "yes")]
    pub message_delete: bool,
}

/// Schema version 1: welcome and logging options were flat fields, and the
/// nested `welcome`/`logs` objects may be missing or incomplete.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacySettings {
    pub guild_id: Id<GuildMarker>,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub filter_profanity: bool,
    #[serde(default)]
    pub anti_spam: bool,
    #[serde(default)]
    pub link_filter: bool,
    #[serde(default)]
    pub log_members: bool,
    #[serde(default)]
    pub log_moderation: bool,
    #[serde(default)]
    pub welcome: Option<WelcomeSettings>,
    #[serde(default)]
    pub logs: Option<LegacyLogSettings>,
    #[serde(default)]
    pub welcome_enabled: Option<bool>,
    #[serde(default)]
    pub welcome_message: Option<String>,
    #[serde(default)]
    pub log_channel_id: Option<String>,
    #[serde(default)]
    pub log_deletes: Option<bool>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl LegacySettings {
    /// Lifts the flat legacy fields into the nested version 2 structures.
    pub fn upgrade(self) -> GuildSettings {
        let welcome_enabled = self.welcome_enabled;
        let welcome_message = self.welcome_message;
        let welcome = self.welcome.unwrap_or_else(|| WelcomeSettings {
            enabled: welcome_enabled.unwrap_or(false),
            channel_id: None,
            message: welcome_message
                .filter(|message| !message.is_empty())
                .unwrap_or_else(default_welcome_message),
        });

        let logs = match self.logs {
            Some(logs) => LogSettings {
                enabled: logs.enabled.unwrap_or(false),
                channel_id: logs.channel_id,
                message_create: logs.message_create,
                message_delete: logs.message_delete,
            },
            None => {
                let log_deletes = self.log_deletes.unwrap_or(false);
                LogSettings {
                    enabled: false,
                    channel_id: self
                        .log_channel_id
                        .as_deref()
                        .and_then(|id| parse_id(id).ok()),
                    message_create: log_deletes,
                    message_delete: log_deletes,
                }
            }
        };

        GuildSettings {
            guild_id: self.guild_id,
            prefix: self.prefix,
            filter_profanity: self.filter_profanity,
            anti_spam: self.anti_spam,
            link_filter: self.link_filter,
            log_members: self.log_members,
            log_moderation: self.log_moderation,
            welcome,
            logs,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// A stored settings document, tagged with the schema it was written in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SettingsDocument {
    V1(LegacySettings),
    V2(GuildSettings),
}

impl SettingsDocument {
    /// Decodes a stored document. Documents without a schema tag predate
    /// versioning and are treated as version 1.
    pub fn decode(value: Value) -> Result<Self, Error> {
        let version = match value.get(SCHEMA_FIELD) {
            None | Some(Value::Null) => 1,
            Some(tag) => tag.as_u64().unwrap_or(0),
        };
        match version {
            1 => Ok(Self::V1(serde_json::from_value(value)?)),
            2 => Ok(Self::V2(serde_json::from_value(value)?)),
            unsupported => Err(Error::UnsupportedSchema(unsupported)),
        }
    }

    /// Encodes settings for storage, tagged with the current schema version.
    pub fn encode(settings: &GuildSettings) -> Result<Value, Error> {
        let mut value = serde_json::to_value(settings)?;
        if let Value::Object(ref mut fields) = value {
            fields.insert(SCHEMA_FIELD.to_owned(), Value::from(CURRENT_SCHEMA));
        }
        Ok(value)
    }

    pub fn version(&self) -> u64 {
        match self {
            Self::V1(_) => 1,
            Self::V2(_) => 2,
        }
    }

    /// Brings the document up to the current schema. The flag reports whether
    /// an upgrade ran and the result needs to be written back.
    pub fn upgrade(self) -> (GuildSettings, bool) {
        match self {
            Self::V1(legacy) => (legacy.upgrade(), true),
            Self::V2(settings) => (settings, false),
        }
    }
}

/// A partial update to a guild's settings. Missing fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub prefix: Option<String>,
    pub filter_profanity: Option<bool>,
    pub anti_spam: Option<bool>,
    pub link_filter: Option<bool>,
    pub log_members: Option<bool>,
    pub log_moderation: Option<bool>,
    pub welcome: Option<WelcomeUpdate>,
    pub logs: Option<LogUpdate>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomeUpdate {
    pub enabled: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub channel_id: Option<Option<Id<ChannelMarker>>>,
    pub message: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogUpdate {
    pub enabled: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub channel_id: Option<Option<Id<ChannelMarker>>>,
    pub message_create: Option<bool>,
    pub message_delete: Option<bool>,
}

fn assign<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

impl SettingsUpdate {
    pub fn apply(self, settings: &mut GuildSettings) {
        assign(&mut settings.prefix, self.prefix);
        assign(&mut settings.filter_profanity, self.filter_profanity);
        assign(&mut settings.anti_spam, self.anti_spam);
        assign(&mut settings.link_filter, self.link_filter);
        assign(&mut settings.log_members, self.log_members);
        assign(&mut settings.log_moderation, self.log_moderation);
        if let Some(welcome) = self.welcome {
            assign(&mut settings.welcome.enabled, welcome.enabled);
            assign(&mut settings.welcome.channel_id, welcome.channel_id);
            assign(&mut settings.welcome.message, welcome.message);
        }
        if let Some(logs) = self.logs {
            assign(&mut settings.logs.enabled, logs.enabled);
            assign(&mut settings.logs.channel_id, logs.channel_id);
            assign(&mut settings.logs.message_create, logs.message_create);
            assign(&mut settings.logs.message_delete, logs.message_delete);
        }
    }
}
