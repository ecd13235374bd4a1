pub mod cache;
pub mod config;
pub mod discord;
pub mod error;
pub mod init;
pub mod models;
pub mod settings;
