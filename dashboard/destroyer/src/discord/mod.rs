mod rate_limit;

pub use self::rate_limit::RateLimit;

use crate::config::DiscordConfig;
use crate::models::{
    id::{marker::GuildMarker, Id},
    DiscordUser, GuildSummary, RawChannel,
};
use anyhow::Result;
use async_trait::async_trait;
use reqwest::header;
pub use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

const API_BASE: &str = "https://discord.com/api";
const OAUTH_SCOPES: &str = "identify email guilds";

/// The outcome of a Discord REST call that reached Discord.
#[derive(Debug)]
pub enum Upstream<T> {
    Fetched(T),
    Rejected(Rejection),
}

/// A non-success response from Discord.
#[derive(Clone, Debug)]
pub struct Rejection {
    pub status: StatusCode,
    pub rate_limit: RateLimit,
    pub body: String,
}

impl Rejection {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            rate_limit: RateLimit::default(),
            body: String::new(),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == StatusCode::TOO_MANY_REQUESTS
    }
}

/// The two Discord endpoints the guild and channel caches sit in front of.
#[async_trait]
pub trait GuildApi: Send + Sync {
    /// `GET /users/@me/guilds`, authorized with the user's OAuth access token.
    async fn current_user_guilds(&self, access_token: &str) -> Result<Upstream<Vec<GuildSummary>>>;

    /// `GET /guilds/{guild_id}/channels`, authorized with the bot token.
    async fn guild_channels(
        &self,
        guild_id: Id<GuildMarker>,
        bot_token: &str,
    ) -> Result<Upstream<Vec<RawChannel>>>;
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    grant_type: &'a str,
    code: &'a str,
    redirect_uri: &'a str,
    scope: &'a str,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[derive(Clone)]
pub struct DiscordClient {
    http: reqwest::Client,
    base_url: String,
    config: DiscordConfig,
}

impl DiscordClient {
    pub fn new(config: DiscordConfig) -> Self {
        Self::with_base_url(config, API_BASE)
    }

    pub fn with_base_url(config: DiscordConfig, base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            config,
        }
    }

    pub fn config(&self) -> &DiscordConfig {
        &self.config
    }

    /// Exchanges an OAuth2 authorization code for an access token.
    pub async fn exchange_code(&self, code: &str) -> Result<Upstream<TokenResponse>> {
        let body = serde_urlencoded::to_string(TokenRequest {
            client_id: self.config.client_id.as_str(),
            client_secret: self.config.client_secret.as_str(),
            grant_type: "authorization_code",
            code,
            redirect_uri: self.config.redirect_uri.as_str(),
            scope: OAUTH_SCOPES,
        })?;

        let endpoint = "/oauth2/token";
        tracing::debug!("Discord API call: POST {}", endpoint);
        let response = self
            .http
            .post(format!("{}{}", self.base_url, endpoint))
            .header(header::ACCEPT, "application/json")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;
        Self::read_response(endpoint, response).await
    }

    /// Looks up the user an OAuth access token belongs to.
    pub async fn current_user(&self, access_token: &str) -> Result<Upstream<DiscordUser>> {
        self.get("/users/@me", format!("Bearer {}", access_token))
            .await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        authorization: String,
    ) -> Result<Upstream<T>> {
        tracing::debug!("Discord API call: GET {}", endpoint);
        let response = self
            .http
            .get(format!("{}{}", self.base_url, endpoint))
            .header(header::AUTHORIZATION, authorization)
            .send()
            .await?;
        Self::read_response(endpoint, response).await
    }

    async fn read_response<T: DeserializeOwned>(
        endpoint: &str,
        response: reqwest::Response,
    ) -> Result<Upstream<T>> {
        let status = response.status();
        let rate_limit = RateLimit::from_headers(response.headers());
        rate_limit.log(endpoint, status);

        if status.is_success() {
            return Ok(Upstream::Fetched(response.json::<T>().await?));
        }

        let body = response.text().await.unwrap_or_default();
        tracing::error!(
            "Discord API request to {} failed with {}: {}",
            endpoint,
            status,
            body
        );
        Ok(Upstream::Rejected(Rejection {
            status,
            rate_limit,
            body,
        }))
    }
}

#[async_trait]
impl GuildApi for DiscordClient {
    async fn current_user_guilds(&self, access_token: &str) -> Result<Upstream<Vec<GuildSummary>>> {
        self.get("/users/@me/guilds", format!("Bearer {}", access_token))
            .await
    }

    async fn guild_channels(
        &self,
        guild_id: Id<GuildMarker>,
        bot_token: &str,
    ) -> Result<Upstream<Vec<RawChannel>>> {
        self.get(
            &format!("/guilds/{}/channels", guild_id),
            format!("Bot {}", bot_token),
        )
        .await
    }
}
