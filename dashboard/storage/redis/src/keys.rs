use byteorder::{BigEndian, ByteOrder};
use destroyer::models::id::{
    marker::{GuildMarker, UserMarker},
    Id,
};
use redis::{RedisWrite, ToRedisArgs};

/// The single byte key prefix for all keys stored in Redis.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CachePrefix {
    /// The guild list of a user, keyed by user ID.
    UserGuilds = 1_u8,
    /// The text channel list of a guild, keyed by guild ID.
    GuildChannels = 2_u8,
}

impl CachePrefix {
    pub fn make_key(self, id: u64) -> CacheKey {
        CacheKey(self, id)
    }
}

/// A prefix byte followed by a big-endian 64-bit ID. Implements ToRedisArgs, so
/// it can be passed directly to Redis commands.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CacheKey(pub CachePrefix, pub u64);

impl CacheKey {
    pub fn encode(&self) -> [u8; 9] {
        let mut key_enc = [self.0 as u8; 9];
        BigEndian::write_u64(&mut key_enc[1..9], self.1);
        key_enc
    }
}

impl From<Id<UserMarker>> for CacheKey {
    fn from(value: Id<UserMarker>) -> Self {
        CachePrefix::UserGuilds.make_key(value.get())
    }
}

impl From<Id<GuildMarker>> for CacheKey {
    fn from(value: Id<GuildMarker>) -> Self {
        CachePrefix::GuildChannels.make_key(value.get())
    }
}

impl ToRedisArgs for CacheKey {
    fn write_redis_args<W: ?Sized>(&self, out: &mut W)
    where
        W: RedisWrite,
    {
        out.write_arg(&self.encode()[..]);
    }
}
