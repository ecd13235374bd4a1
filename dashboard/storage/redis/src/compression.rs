use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use redis::{self, FromRedisValue, RedisWrite, ToRedisArgs};
use std::io::{self, prelude::*};

/// The single byte compression mode header for values stored in Redis.
#[repr(u8)]
#[derive(FromPrimitive)]
enum CompressionMode {
    /// Uncompressed. The value is entirely uncompressed and can be used as is.
    Uncompressed = 0,
    /// Compressed with zlib. Default compression level: 6.
    Zlib = 1,
}

/// Prepends the header and compresses the payload, unless compressing would
/// not make it smaller.
fn compress(payload: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(vec![CompressionMode::Zlib as u8], Compression::new(6));
    match encoder.write_all(payload).and_then(|_| encoder.finish()) {
        Ok(output) if output.len() < payload.len() + 1 => output,
        _ => {
            let mut output = Vec::with_capacity(payload.len() + 1);
            output.push(CompressionMode::Uncompressed as u8);
            output.extend_from_slice(payload);
            output
        }
    }
}

fn decompress(data: &[u8]) -> io::Result<Vec<u8>> {
    let (header, buf) = match data.split_first() {
        Some(split) => split,
        None => return Ok(Vec::new()),
    };
    match CompressionMode::from_u8(*header) {
        Some(CompressionMode::Uncompressed) => Ok(buf.to_vec()),
        Some(CompressionMode::Zlib) => {
            let mut output = Vec::new();
            ZlibDecoder::new(buf).read_to_end(&mut output)?;
            Ok(output)
        }
        // Values written without a header are returned as is.
        None => Ok(data.to_vec()),
    }
}

/// A byte payload stored behind a one byte compression header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Compressed(pub Vec<u8>);

impl ToRedisArgs for Compressed {
    fn write_redis_args<W: ?Sized>(&self, out: &mut W)
    where
        W: RedisWrite,
    {
        out.write_arg(&compress(&self.0)[..]);
    }
}

impl FromRedisValue for Compressed {
    fn from_redis_value(value: &redis::Value) -> redis::RedisResult<Self> {
        use redis::{ErrorKind, RedisError, Value};
        if let Value::Data(data) = value {
            Ok(Self(decompress(data)?))
        } else {
            Err(RedisError::from((
                ErrorKind::ResponseError,
                "Type cannot be compressed",
                format!("Invalid input: {:?}", value),
            )))
        }
    }
}
