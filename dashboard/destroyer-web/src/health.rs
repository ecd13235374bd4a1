use crate::{prelude::*, AppState};
use actix_web::web;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EnvironmentStatus {
    has_discord_client_id: bool,
    has_discord_client_secret: bool,
    has_discord_redirect_uri: bool,
    has_database: bool,
    has_redis: bool,
    has_bot_token: bool,
    environment: String,
}

#[derive(Serialize)]
pub(crate) struct Health {
    status: &'static str,
    message: &'static str,
    timestamp: String,
    environment: EnvironmentStatus,
}

pub(crate) async fn health(state: web::Data<AppState>) -> JsonResult<Health> {
    let config = &state.config;
    Ok(web::Json(Health {
        status: "ok",
        message: "Dashboard API is running",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        environment: EnvironmentStatus {
            has_discord_client_id: !config.discord.client_id.is_empty(),
            has_discord_client_secret: !config.discord.client_secret.is_empty(),
            has_discord_redirect_uri: !config.discord.redirect_uri.is_empty(),
            has_database: !config.database.is_empty(),
            has_redis: !config.redis.is_empty(),
            has_bot_token: config.discord.bot_token().is_some(),
            environment: config.environment.clone(),
        },
    }))
}
