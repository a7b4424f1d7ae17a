//! Request credentials: the Graph bearer token and the Atlassian OAuth cookies.
//!
//! The Microsoft Graph token arrives already minted in the `Authorization`
//! header. The Atlassian token lives in HttpOnly cookies set by the OAuth
//! callback and is refreshed before the loop when it has expired.

use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::AtlassianApp;
use crate::error::ServerError;

pub const ACCESS_COOKIE: &str = "atlassian_access_token";
pub const REFRESH_COOKIE: &str = "atlassian_refresh_token";
pub const EXPIRES_COOKIE: &str = "atlassian_token_expires";
pub const STATE_COOKIE: &str = "atlassian_oauth_state";

const DAY: i64 = 24 * 60 * 60;
pub const ACCESS_MAX_AGE: i64 = 7 * DAY;
pub const REFRESH_MAX_AGE: i64 = 30 * DAY;
pub const STATE_MAX_AGE: i64 = 10 * 60;

/// Errors talking to the Atlassian token endpoint.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("token endpoint returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("token response missing access_token")]
    MissingToken,
}

/// Tokens returned by the Atlassian token endpoint.
#[derive(Debug, Deserialize)]
pub struct TokenSet {
    pub access_token: SecretString,
    #[serde(default)]
    pub refresh_token: Option<SecretString>,
    /// Lifetime of the access token in seconds.
    #[serde(default)]
    pub expires_in: Option<i64>,
}

#[derive(Serialize)]
#[serde(tag = "grant_type", rename_all = "snake_case")]
enum TokenGrant<'a> {
    AuthorizationCode {
        client_id: &'a str,
        client_secret: &'a str,
        code: &'a str,
        redirect_uri: &'a str,
    },
    RefreshToken {
        client_id: &'a str,
        client_secret: &'a str,
        refresh_token: &'a str,
    },
}

/// Exchanges an authorization code for tokens.
///
/// # Errors
///
/// Returns an error if the request fails or the endpoint rejects the code.
pub async fn exchange_code(
    http: &reqwest::Client,
    app: &AtlassianApp,
    code: &str,
) -> Result<TokenSet, AuthError> {
    let grant = TokenGrant::AuthorizationCode {
        client_id: &app.client_id,
        client_secret: app.client_secret.expose_secret(),
        code,
        redirect_uri: &app.redirect_uri,
    };
    request_tokens(http, app, &grant).await
}

/// Obtains a fresh access token with a refresh token.
///
/// # Errors
///
/// Returns an error if the request fails or the endpoint rejects the token.
pub async fn refresh_tokens(
    http: &reqwest::Client,
    app: &AtlassianApp,
    refresh_token: &str,
) -> Result<TokenSet, AuthError> {
    let grant = TokenGrant::RefreshToken {
        client_id: &app.client_id,
        client_secret: app.client_secret.expose_secret(),
        refresh_token,
    };
    request_tokens(http, app, &grant).await
}

async fn request_tokens(
    http: &reqwest::Client,
    app: &AtlassianApp,
    grant: &TokenGrant<'_>,
) -> Result<TokenSet, AuthError> {
    let response = http.post(&app.token_url).json(grant).send().await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AuthError::Rejected {
            status: status.as_u16(),
            body: body.chars().take(200).collect(),
        });
    }

    let tokens: TokenSet = response.json().await?;
    if tokens.access_token.expose_secret().is_empty() {
        return Err(AuthError::MissingToken);
    }
    Ok(tokens)
}

/// Reads a cookie from the request headers.
#[must_use]
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Builds a `Set-Cookie` value. The cookie is HttpOnly, SameSite=Lax and
/// scoped to the whole site.
///
/// # Errors
///
/// Returns an error if the value contains characters a header cannot carry.
pub fn set_cookie(
    name: &str,
    value: &str,
    max_age: i64,
    secure: bool,
) -> Result<HeaderValue, ServerError> {
    let mut cookie = format!("{name}={value}; Path=/; Max-Age={max_age}; HttpOnly; SameSite=Lax");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
        .map_err(|e| ServerError::Internal(format!("invalid cookie value for {name}: {e}")))
}

/// Builds a `Set-Cookie` value that deletes `name`.
#[must_use]
pub fn clear_cookie(name: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("{name}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax"))
        .unwrap_or_else(|_| HeaderValue::from_static("invalid=; Max-Age=0"))
}

/// The cookies that persist a token set.
///
/// # Errors
///
/// Returns an error if a token cannot be carried in a header.
pub fn token_cookies(
    tokens: &TokenSet,
    now: i64,
    secure: bool,
) -> Result<Vec<HeaderValue>, ServerError> {
    let mut cookies = vec![set_cookie(
        ACCESS_COOKIE,
        tokens.access_token.expose_secret(),
        ACCESS_MAX_AGE,
        secure,
    )?];

    if let Some(refresh) = &tokens.refresh_token {
        cookies.push(set_cookie(
            REFRESH_COOKIE,
            refresh.expose_secret(),
            REFRESH_MAX_AGE,
            secure,
        )?);
    }

    if let Some(expires_in) = tokens.expires_in {
        cookies.push(set_cookie(
            EXPIRES_COOKIE,
            &(now + expires_in).to_string(),
            ACCESS_MAX_AGE,
            secure,
        )?);
    }

    Ok(cookies)
}

/// The Microsoft Graph token from `Authorization: Bearer <token>`.
///
/// The scheme name is matched case-insensitively.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<SecretString> {
    let (scheme, token) = headers.get(AUTHORIZATION)?.to_str().ok()?.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| SecretString::from(token))
}

/// The Atlassian credential for one request.
#[derive(Debug, Default)]
pub struct AtlassianSession {
    /// Token to use, if Confluence is connected.
    pub token: Option<SecretString>,
    /// Cookies to set on the response after a refresh.
    pub set_cookies: Vec<HeaderValue>,
}

impl AtlassianSession {
    #[must_use]
    pub const fn connected(&self) -> bool {
        self.token.is_some()
    }
}

/// Resolves the Atlassian credential from the request cookies.
///
/// An access token whose expiry cookie lies in the past is refreshed when a
/// refresh token and the OAuth client are available. A failed refresh
/// leaves Confluence disconnected for this request.
pub async fn atlassian_session(
    http: &reqwest::Client,
    app: Option<&AtlassianApp>,
    headers: &HeaderMap,
    now: i64,
    secure: bool,
) -> AtlassianSession {
    let Some(access) = read_cookie(headers, ACCESS_COOKIE) else {
        return AtlassianSession::default();
    };

    let expired = read_cookie(headers, EXPIRES_COOKIE)
        .and_then(|v| v.parse::<i64>().ok())
        .is_some_and(|expires_at| expires_at <= now);

    let refresh = read_cookie(headers, REFRESH_COOKIE);
    let (true, Some(refresh), Some(app)) = (expired, refresh, app) else {
        return AtlassianSession {
            token: Some(SecretString::from(access)),
            set_cookies: Vec::new(),
        };
    };

    debug!("Atlassian access token expired, refreshing");
    let refreshed = match refresh_tokens(http, app, &refresh).await {
        Ok(tokens) => tokens,
        Err(e) => {
            warn!(error = %e, "Atlassian token refresh failed, Confluence disabled for this request");
            return AtlassianSession::default();
        }
    };

    match token_cookies(&refreshed, now, secure) {
        Ok(set_cookies) => {
            info!("Atlassian access token refreshed");
            AtlassianSession {
                token: Some(refreshed.access_token),
                set_cookies,
            }
        }
        Err(e) => {
            warn!(error = %e, "Refreshed Atlassian token could not be stored");
            AtlassianSession::default()
        }
    }
}
