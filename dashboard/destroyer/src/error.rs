pub use anyhow::Result;
use thiserror::Error as ErrorTrait;

/// The sum type of the typed errors raised inside the dashboard library.
#[derive(ErrorTrait, Debug)]
pub enum Error {
    #[error("JSON error: {:?}", .0)]
    Json(#[from] serde_json::Error),
    #[error("Invalid snowflake: {}", .0)]
    InvalidSnowflake(String),
    #[error("Unsupported settings schema version: {}", .0)]
    UnsupportedSchema(u64),
}
