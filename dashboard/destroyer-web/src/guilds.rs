use crate::session::Session;
use crate::{prelude::*, AppState};
use actix_web::{http::StatusCode, web, HttpResponse};
use destroyer::cache::GuildFetchError;
use destroyer::models::{
    id::{marker::GuildMarker, Id},
    parse_id, ChannelSummary, GuildSummary,
};
use destroyer::settings::{self, GuildSettings, SettingsUpdate};
use serde::Serialize;

const FETCH_FAILED: &str = "Failed to fetch guilds";

#[derive(Serialize)]
struct GuildEntry<'a> {
    id: Id<GuildMarker>,
    name: &'a str,
    icon: Option<&'a str>,
    owner: bool,
    permissions: &'a str,
}

impl<'a> From<&'a GuildSummary> for GuildEntry<'a> {
    fn from(guild: &'a GuildSummary) -> Self {
        Self {
            id: guild.id,
            name: &guild.name,
            icon: guild.icon.as_deref(),
            owner: guild.owner,
            permissions: &guild.permissions,
        }
    }
}

#[derive(Serialize)]
struct GuildList<'a> {
    guilds: Vec<GuildEntry<'a>>,
}

#[derive(Serialize)]
struct GuildInfo<'a> {
    id: Id<GuildMarker>,
    name: &'a str,
    icon: Option<&'a str>,
    owner: bool,
}

#[derive(Serialize)]
struct GuildView<'a> {
    guild: GuildInfo<'a>,
    settings: GuildSettings,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChannelList {
    channels: Vec<ChannelSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<String>,
    from_cache: bool,
}

#[derive(Serialize)]
struct SettingsSaved {
    success: bool,
    settings: GuildSettings,
}

fn fetch_error(err: GuildFetchError) -> WebError {
    match err {
        GuildFetchError::Upstream {
            status,
            retry_after,
        } => {
            let status = StatusCode::from_u16(status.as_u16())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let retry_after = retry_after.filter(|_| status == StatusCode::TOO_MANY_REQUESTS);
            WebError::new(status, FETCH_FAILED).with_retry_after(retry_after)
        }
        GuildFetchError::Internal(_) => {
            WebError::new(StatusCode::INTERNAL_SERVER_ERROR, FETCH_FAILED)
        }
    }
}

async fn user_guilds(state: &AppState, session: &Session) -> WebResult<Vec<GuildSummary>> {
    state
        .cache
        .user_guilds(&session.token, session.user_id)
        .await
        .map(|listing| listing.guilds)
        .map_err(fetch_error)
}

/// Finds the guild in the caller's guild list. Unknown and malformed IDs are
/// both reported as missing.
async fn find_guild(
    state: &AppState,
    session: &Session,
    guild_id: &str,
) -> WebResult<(Id<GuildMarker>, GuildSummary)> {
    let guilds = user_guilds(state, session).await?;
    parse_id(guild_id)
        .ok()
        .and_then(|guild_id| {
            guilds
                .into_iter()
                .find(|guild| guild.id == guild_id)
                .map(|guild| (guild_id, guild))
        })
        .http_error(StatusCode::NOT_FOUND, "Guild not found or no access")
}

async fn find_managed_guild(
    state: &AppState,
    session: &Session,
    guild_id: &str,
) -> WebResult<(Id<GuildMarker>, GuildSummary)> {
    let (guild_id, guild) = find_guild(state, session, guild_id).await?;
    if !guild.can_manage() {
        return Err(WebError::new(StatusCode::FORBIDDEN, "Insufficient permissions"));
    }
    Ok((guild_id, guild))
}

async fn list_guilds(state: web::Data<AppState>, session: Session) -> WebResult<HttpResponse> {
    let guilds = user_guilds(&state, &session).await?;
    let guilds = guilds
        .iter()
        .filter(|guild| guild.can_manage())
        .map(GuildEntry::from)
        .collect();
    Ok(HttpResponse::Ok().json(GuildList { guilds }))
}

async fn view_guild(
    state: web::Data<AppState>,
    session: Session,
    path: web::Path<String>,
) -> WebResult<HttpResponse> {
    let (guild_id, guild) = find_managed_guild(&state, &session, &path).await?;
    let settings = settings::load(state.settings.as_ref(), guild_id)
        .await
        .http_internal_error("Internal server error")?;
    Ok(HttpResponse::Ok().json(GuildView {
        guild: GuildInfo {
            id: guild.id,
            name: &guild.name,
            icon: guild.icon.as_deref(),
            owner: guild.owner,
        },
        settings,
    }))
}

async fn guild_channels(
    state: web::Data<AppState>,
    session: Session,
    path: web::Path<String>,
) -> WebResult<web::Json<ChannelList>> {
    let (guild_id, _) = find_guild(&state, &session, &path).await?;
    let listing = state
        .cache
        .guild_channels(guild_id, state.config.discord.bot_token())
        .await;
    Ok(web::Json(ChannelList {
        channels: listing.channels,
        warning: listing.warning.map(|warning| warning.to_string()),
        from_cache: listing.from_cache,
    }))
}

async fn save_settings(
    state: web::Data<AppState>,
    session: Session,
    path: web::Path<String>,
    patch: web::Json<SettingsUpdate>,
) -> JsonResult<SettingsSaved> {
    let (guild_id, _) = find_managed_guild(&state, &session, &path).await?;
    let settings = settings::update(state.settings.as_ref(), guild_id, patch.into_inner())
        .await
        .http_internal_error("Internal server error")?;
    tracing::info!("User {} updated settings for guild {}", session.user_id, guild_id);
    Ok(web::Json(SettingsSaved {
        success: true,
        settings,
    }))
}

pub fn scoped_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("")
            .route(web::get().to(list_guilds))
            .default_service(web::to(method_not_allowed)),
    );
    cfg.service(
        web::resource("/{guild_id}")
            .route(web::get().to(view_guild))
            .default_service(web::to(method_not_allowed)),
    );
    cfg.service(
        web::resource("/{guild_id}/channels")
            .route(web::get().to(guild_channels))
            .default_service(web::to(method_not_allowed)),
    );
    cfg.service(
        web::resource("/{guild_id}/settings")
            .route(web::post().to(save_settings))
            .default_service(web::to(method_not_allowed)),
    );
}
