mod auth;
mod guilds;
mod health;
mod prelude;
mod session;

use crate::prelude::*;
use actix_web::{error::JsonPayloadError, http::StatusCode, web, App, HttpRequest, HttpServer};
use destroyer::{
    cache::{CachePolicy, DiscordCache},
    config::{self, DestroyerConfig},
    discord::DiscordClient,
    init,
    settings::SettingsStore,
};
use std::sync::Arc;
use tracing_actix_web::TracingLogger;

pub(crate) struct AppState {
    config: DestroyerConfig,
    discord: DiscordClient,
    cache: DiscordCache,
    settings: Arc<dyn SettingsStore>,
}

fn json_error(err: JsonPayloadError, request: &HttpRequest) -> actix_web::Error {
    tracing::warn!("Rejected request body for {}: {}", request.path(), err);
    WebError::new(StatusCode::BAD_REQUEST, "Invalid request body").into()
}

pub fn api(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error));
    cfg.service(web::scope("/auth").configure(auth::scoped_config));
    cfg.service(web::scope("/guilds").configure(guilds::scoped_config));
    cfg.service(
        web::resource("/health")
            .route(web::get().to(health::health))
            .default_service(web::to(method_not_allowed)),
    );
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let config = config::load_config();
    init::init(&config);

    let discord = init::http_client(&config);
    let redis = destroyer_redis::init(&config).await;
    let sql = destroyer_sql::init(&config).await;
    let cache = DiscordCache::new(
        Arc::new(redis),
        Arc::new(discord.clone()),
        CachePolicy::from_config(&config.cache),
    );
    let port = config.web.port;

    let state = web::Data::new(AppState {
        config,
        discord,
        cache,
        settings: Arc::new(destroyer_sql::SqlSettingsStore::new(sql)),
    });

    HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .app_data(state.clone())
            .service(web::scope("/api").configure(api))
    })
    .bind(("127.0.0.1", port))?
    .run()
    .await
}
