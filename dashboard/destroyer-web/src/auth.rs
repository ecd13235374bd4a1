use crate::session::{cleared_cookies, issue_token, session_cookies};
use crate::{prelude::*, AppState};
use actix_web::{
    http::{header, StatusCode},
    web, HttpRequest, HttpResponse, HttpResponseBuilder,
};
use actix_web::cookie::Cookie;
use destroyer::discord::Upstream;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
}

/// The `scheme://host[:port]` prefix of an absolute http(s) URL.
fn origin_of(url: &str) -> Option<&str> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))?;
    let host_len = rest.find('/').unwrap_or(rest.len());
    if host_len == 0 {
        return None;
    }
    Some(&url[..url.len() - rest.len() + host_len])
}

fn header_str<'a>(request: &'a HttpRequest, name: header::HeaderName) -> Option<&'a str> {
    request
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
}

/// Where to send the user after login. The frontend passes its own origin as
/// the OAuth `state`.
fn login_target<'a>(
    state: Option<&'a str>,
    referer: Option<&'a str>,
    default: &'a str,
) -> &'a str {
    match state.filter(|state| !state.is_empty()) {
        Some(state) if state.starts_with("http://") || state.starts_with("https://") => state,
        Some(_) => default,
        None => referer.and_then(origin_of).unwrap_or(default),
    }
}

fn logout_target<'a>(
    origin: Option<&'a str>,
    referer: Option<&'a str>,
    default: &'a str,
) -> &'a str {
    origin
        .or_else(|| referer.and_then(origin_of))
        .unwrap_or(default)
}

fn redirect(location: String, cookies: impl IntoIterator<Item = Cookie<'static>>) -> HttpResponse {
    let mut response: HttpResponseBuilder = HttpResponse::Found();
    response.insert_header((header::LOCATION, location));
    for cookie in cookies {
        response.cookie(cookie);
    }
    response.finish()
}

async fn discord_callback(
    state: web::Data<AppState>,
    request: HttpRequest,
    query: web::Query<CallbackQuery>,
) -> WebResult<HttpResponse> {
    let code = query
        .code
        .as_deref()
        .filter(|code| !code.is_empty())
        .http_error(StatusCode::BAD_REQUEST, "No code provided")?;
    let config = &state.config;

    let token = match state
        .discord
        .exchange_code(code)
        .await
        .http_internal_error("Internal server error")?
    {
        Upstream::Fetched(token) => token,
        Upstream::Rejected(rejection) => {
            tracing::error!(
                "Token exchange failed with {} (sent redirect_uri {}): {}",
                rejection.status,
                config.discord.redirect_uri,
                rejection.body
            );
            let details = serde_json::from_str::<Value>(&rejection.body)
                .unwrap_or(Value::String(rejection.body));
            return Ok(HttpResponse::BadRequest().json(json!({
                "error": "Failed to exchange code for token",
                "details": details,
                "sentRedirectUri": config.discord.redirect_uri,
            })));
        }
    };

    let user = match state
        .discord
        .current_user(&token.access_token)
        .await
        .http_internal_error("Internal server error")?
    {
        Upstream::Fetched(user) => user,
        Upstream::Rejected(rejection) => {
            tracing::error!("Failed to fetch user data: {}", rejection.body);
            return Err(WebError::new(
                StatusCode::BAD_REQUEST,
                "Failed to fetch user data",
            ));
        }
    };
    tracing::info!("User {} ({}) logged in", user.username, user.id);

    let session_token = issue_token(&config.web.session_secret, &user)
        .http_internal_error("Internal server error")?;
    let user_info = serde_json::to_vec(&user).http_internal_error("Internal server error")?;
    let user_info = base64::encode_config(user_info, base64::URL_SAFE_NO_PAD);

    let target = login_target(
        query.state.as_deref(),
        header_str(&request, header::REFERER),
        &config.web.default_redirect,
    );
    Ok(redirect(
        format!("{}/dashboard", target),
        session_cookies(&config.web, session_token, user_info, token.access_token),
    ))
}

async fn logout(state: web::Data<AppState>, request: HttpRequest) -> HttpResponse {
    let target = logout_target(
        header_str(&request, header::ORIGIN),
        header_str(&request, header::REFERER),
        &state.config.web.default_redirect,
    );
    redirect(format!("{}/", target), cleared_cookies(&state.config.web))
}

pub fn scoped_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/discord")
            .route(web::get().to(discord_callback))
            .default_service(web::to(method_not_allowed)),
    );
    cfg.service(
        web::resource("/logout")
            .route(web::get().to(logout))
            .route(web::post().to(logout))
            .default_service(web::to(method_not_allowed)),
    );
}
