use crate::{prelude::*, AppState};
use actix_web::{
    cookie::{Cookie, SameSite},
    dev::Payload,
    http::StatusCode,
    web, FromRequest, HttpRequest,
};
use destroyer::config::WebConfig;
use destroyer::models::{
    id::{marker::UserMarker, Id},
    parse_id, DiscordUser,
};
use futures::future::{ready, Ready};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::Duration;

pub const SESSION_COOKIE: &str = "discord_session";
pub const USER_COOKIE: &str = "discord_user";
pub const TOKEN_COOKIE: &str = "discord_token";

const SESSION_DAYS: i64 = 7;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    name: String,
    iat: i64,
    exp: i64,
}

/// Signs a session token identifying the user.
pub fn issue_token(secret: &str, user: &DiscordUser) -> jsonwebtoken::errors::Result<String> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: user.id.to_string(),
        name: user.username.clone(),
        iat: now,
        exp: now + Duration::days(SESSION_DAYS).whole_seconds(),
    };
    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

fn verify_token(secret: &str, token: &str) -> Option<Id<UserMarker>> {
    let data = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()?;
    parse_id(&data.claims.sub).ok()
}

fn auth_cookie(
    config: &WebConfig,
    name: &'static str,
    value: String,
    http_only: bool,
    max_age: Duration,
) -> Cookie<'static> {
    Cookie::build(name, value)
        .path("/")
        .max_age(max_age)
        .same_site(SameSite::Lax)
        .http_only(http_only)
        .secure(config.secure_cookies)
        .finish()
}

/// The three cookies that make up a logged in session.
pub fn session_cookies(
    config: &WebConfig,
    session_token: String,
    user_info: String,
    access_token: String,
) -> [Cookie<'static>; 3] {
    let max_age = Duration::days(SESSION_DAYS);
    [
        auth_cookie(config, SESSION_COOKIE, session_token, true, max_age),
        auth_cookie(config, USER_COOKIE, user_info, false, max_age),
        auth_cookie(config, TOKEN_COOKIE, access_token, true, max_age),
    ]
}

/// Expired, empty versions of the session cookies.
pub fn cleared_cookies(config: &WebConfig) -> [Cookie<'static>; 3] {
    [
        auth_cookie(config, SESSION_COOKIE, String::new(), true, Duration::ZERO),
        auth_cookie(config, USER_COOKIE, String::new(), false, Duration::ZERO),
        auth_cookie(config, TOKEN_COOKIE, String::new(), true, Duration::ZERO),
    ]
}

/// The authenticated caller: who they are and the OAuth token to act for them.
#[derive(Clone, Debug)]
pub struct Session {
    pub user_id: Id<UserMarker>,
    pub token: String,
}

impl Session {
    fn extract(request: &HttpRequest) -> WebResult<Self> {
        let state = request
            .app_data::<web::Data<AppState>>()
            .http_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")?;
        let token = request
            .cookie(TOKEN_COOKIE)
            .map(|cookie| cookie.value().to_owned())
            .filter(|token| !token.is_empty());
        let user_id = request
            .cookie(SESSION_COOKIE)
            .and_then(|cookie| verify_token(&state.config.web.session_secret, cookie.value()));
        match (token, user_id) {
            (Some(token), Some(user_id)) => Ok(Self { user_id, token }),
            _ => Err(WebError::unauthorized()),
        }
    }
}

impl FromRequest for Session {
    type Error = WebError;
    type Future = Ready<WebResult<Self>>;

    fn from_request(request: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(Self::extract(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> DiscordUser {
        DiscordUser {
            id: Id::new(80351110224678912),
            username: "Nelly".to_owned(),
            discriminator: None,
            avatar: None,
            email: None,
        }
    }

    #[test]
    fn test_token_round_trip() {
        let token = issue_token("hunter2", &user()).unwrap();
        assert_eq!(verify_token("hunter2", &token), Some(user().id));
    }

    #[test]
    fn test_token_wrong_secret() {
        let token = issue_token("hunter2", &user()).unwrap();
        assert_eq!(verify_token("hunter3", &token), None);
        assert_eq!(verify_token("hunter2", "not-a-jwt"), None);
    }

    #[test]
    fn test_cookie_attributes() {
        let config: WebConfig =
            serde_json::from_str(r#"{ "port": 3000, "session_secret": "s" }"#).unwrap();
        let [session, user, token] = session_cookies(&config, "a".into(), "b".into(), "c".into());
        assert_eq!(session.http_only(), Some(true));
        assert_eq!(user.http_only(), Some(false));
        assert_eq!(token.http_only(), Some(true));
        for cookie in [&session, &user, &token] {
            assert_eq!(cookie.path(), Some("/"));
            assert_eq!(cookie.same_site(), Some(SameSite::Lax));
            assert_eq!(cookie.max_age(), Some(Duration::days(7)));
        }

        for cookie in cleared_cookies(&config) {
            assert_eq!(cookie.value(), "");
            assert_eq!(cookie.max_age(), Some(Duration::ZERO));
        }
    }
}
