//! Atlassian OAuth 2.0 (3LO) login, status and logout.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::http::header::SET_COOKIE;
use axum::response::{AppendHeaders, IntoResponse, Redirect, Response};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::{
    ACCESS_COOKIE, EXPIRES_COOKIE, REFRESH_COOKIE, STATE_COOKIE, STATE_MAX_AGE, clear_cookie,
    exchange_code, read_cookie, set_cookie, token_cookies,
};
use crate::error::ServerError;
use crate::state::AppState;

const AUDIENCE: &str = "api.atlassian.com";

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub connected: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogoutResponse {
    pub success: bool,
}

fn login_redirect(state: &AppState, query: &str) -> String {
    format!(
        "{}/login?{query}",
        state.config.public_url.trim_end_matches('/')
    )
}

fn login_error(state: &AppState, reason: &str) -> Response {
    (
        AppendHeaders([(SET_COOKIE, clear_cookie(STATE_COOKIE))]),
        Redirect::to(&login_redirect(state, &format!("error={reason}"))),
    )
        .into_response()
}

/// GET /api/auth/atlassian
///
/// Redirects to the Atlassian consent screen with a fresh `state` value,
/// remembered in a short-lived cookie.
#[instrument(skip_all)]
pub async fn authorize(State(state): State<AppState>) -> Result<Response, ServerError> {
    let Some(app) = state.atlassian.as_deref() else {
        warn!("Atlassian login requested but no OAuth client is configured");
        return Ok(login_error(&state, "atlassian_not_configured"));
    };

    let csrf = Uuid::new_v4().simple().to_string();
    let scope = app.scopes.join(" ");
    let url = url::Url::parse_with_params(
        &app.authorize_url,
        [
            ("audience", AUDIENCE),
            ("client_id", app.client_id.as_str()),
            ("scope", scope.as_str()),
            ("redirect_uri", app.redirect_uri.as_str()),
            ("state", csrf.as_str()),
            ("response_type", "code"),
            ("prompt", "consent"),
        ],
    )
    .map_err(|e| ServerError::Config(format!("Invalid Atlassian authorize_url: {e}")))?;

    let cookie = set_cookie(
        STATE_COOKIE,
        &csrf,
        STATE_MAX_AGE,
        state.config.secure_cookies(),
    )?;

    Ok((
        AppendHeaders([(SET_COOKIE, cookie)]),
        Redirect::to(url.as_str()),
    )
        .into_response())
}

/// GET /api/auth/atlassian/callback
///
/// Validates `state`, exchanges the code and stores the tokens in cookies.
/// Every failure redirects to the login page with an `error` reason.
#[instrument(skip_all)]
pub async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Response {
    let Some(app) = state.atlassian.as_deref() else {
        return login_error(&state, "atlassian_not_configured");
    };

    if let Some(error) = &params.error {
        warn!(
            error = %error,
            description = params.error_description.as_deref().unwrap_or(""),
            "Atlassian authorization denied"
        );
        return login_error(&state, "atlassian_failed");
    }

    let Some(code) = params.code.as_deref().filter(|c| !c.is_empty()) else {
        return login_error(&state, "atlassian_failed");
    };

    let expected = read_cookie(&headers, STATE_COOKIE);
    if expected.is_none() || expected != params.state {
        warn!("Atlassian callback state does not match");
        return login_error(&state, "invalid_state");
    }

    let tokens = match exchange_code(&state.http, app, code).await {
        Ok(tokens) => tokens,
        Err(e) => {
            warn!(error = %e, "Atlassian token exchange failed");
            return login_error(&state, "token_exchange_failed");
        }
    };

    let now = chrono::Utc::now().timestamp();
    let mut cookies = match token_cookies(&tokens, now, state.config.secure_cookies()) {
        Ok(cookies) => cookies,
        Err(e) => {
            warn!(error = %e, "Atlassian tokens could not be stored");
            return login_error(&state, "oauth_error");
        }
    };
    cookies.push(clear_cookie(STATE_COOKIE));

    info!(
        has_refresh_token = tokens.refresh_token.is_some(),
        "Atlassian account connected"
    );

    let headers: Vec<_> = cookies.into_iter().map(|c| (SET_COOKIE, c)).collect();
    (
        AppendHeaders(headers),
        Redirect::to(&login_redirect(&state, "atlassian=success")),
    )
        .into_response()
}

/// GET /api/auth/atlassian/status
pub async fn status(headers: HeaderMap) -> Json<StatusResponse> {
    Json(StatusResponse {
        connected: read_cookie(&headers, ACCESS_COOKIE).is_some(),
    })
}

/// POST /api/auth/logout
///
/// Forgets the Atlassian connection. The Microsoft session is managed by
/// the front end.
pub async fn logout() -> impl IntoResponse {
    (
        AppendHeaders([
            (SET_COOKIE, clear_cookie(ACCESS_COOKIE)),
            (SET_COOKIE, clear_cookie(REFRESH_COOKIE)),
            (SET_COOKIE, clear_cookie(EXPIRES_COOKIE)),
        ]),
        Json(LogoutResponse { success: true }),
    )
}
