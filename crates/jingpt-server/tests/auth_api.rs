//! Route tests for the Atlassian OAuth endpoints.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, ResponseTemplate};

use common::{PUBLIC_URL, TestApp, body_json, get, location, set_cookies};

#[tokio::test]
async fn test_authorize_redirects_to_consent_screen() {
    let app = TestApp::start().await;
    let response = app.send(get("/api/auth/atlassian", None)).await;

    assert!(response.status().is_redirection());
    let target = url::Url::parse(&location(&response)).unwrap();
    assert_eq!(target.path(), "/authorize");

    let params: std::collections::HashMap<_, _> = target.query_pairs().into_owned().collect();
    assert_eq!(params["audience"], "api.atlassian.com");
    assert_eq!(params["client_id"], "client-id");
    assert_eq!(params["response_type"], "code");
    assert_eq!(params["prompt"], "consent");
    assert_eq!(
        params["redirect_uri"],
        format!("{PUBLIC_URL}/api/auth/atlassian/callback")
    );
    assert!(params["scope"].contains("search:confluence"));

    let state = &params["state"];
    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 1);
    assert!(cookies[0].starts_with(&format!("atlassian_oauth_state={state};")));
}

#[tokio::test]
async fn test_authorize_without_client_reports_error() {
    let app = TestApp::start_with(false).await;
    let response = app.send(get("/api/auth/atlassian", None)).await;

    assert!(response.status().is_redirection());
    assert_eq!(
        location(&response),
        format!("{PUBLIC_URL}/login?error=atlassian_not_configured")
    );
}

#[tokio::test]
async fn test_callback_sets_token_cookies() {
    let app = TestApp::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_partial_json(json!({
            "grant_type": "authorization_code",
            "client_id": "client-id",
            "client_secret": "client-secret",
            "code": "auth-code"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access",
            "refresh_token": "refresh",
            "expires_in": 3600,
            "scope": "search:confluence offline_access"
        })))
        .expect(1)
        .mount(&app.upstream)
        .await;

    let response = app
        .send(get(
            "/api/auth/atlassian/callback?code=auth-code&state=abc",
            Some("atlassian_oauth_state=abc"),
        ))
        .await;

    assert!(response.status().is_redirection());
    assert_eq!(location(&response), format!("{PUBLIC_URL}/login?atlassian=success"));

    let cookies = set_cookies(&response);
    let access = cookies
        .iter()
        .find(|c| c.starts_with("atlassian_access_token="))
        .unwrap();
    assert!(access.contains("Max-Age=604800"));
    assert!(access.contains("HttpOnly"));
    assert!(access.contains("SameSite=Lax"));
    assert!(!access.contains("Secure"));

    let refresh = cookies
        .iter()
        .find(|c| c.starts_with("atlassian_refresh_token="))
        .unwrap();
    assert!(refresh.contains("Max-Age=2592000"));

    assert!(cookies.iter().any(|c| c.starts_with("atlassian_token_expires=")));
    assert!(cookies.iter().any(|c| c.starts_with("atlassian_oauth_state=;")));
}

#[tokio::test]
async fn test_callback_rejects_mismatched_state() {
    let app = TestApp::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.upstream)
        .await;

    let response = app
        .send(get(
            "/api/auth/atlassian/callback?code=auth-code&state=forged",
            Some("atlassian_oauth_state=abc"),
        ))
        .await;

    assert_eq!(location(&response), format!("{PUBLIC_URL}/login?error=invalid_state"));

    let missing_cookie = app
        .send(get("/api/auth/atlassian/callback?code=auth-code&state=abc", None))
        .await;
    assert_eq!(
        location(&missing_cookie),
        format!("{PUBLIC_URL}/login?error=invalid_state")
    );
}

#[tokio::test]
async fn test_callback_with_denied_consent() {
    let app = TestApp::start().await;
    let response = app
        .send(get(
            "/api/auth/atlassian/callback?error=access_denied&error_description=User%20declined",
            Some("atlassian_oauth_state=abc"),
        ))
        .await;

    assert_eq!(location(&response), format!("{PUBLIC_URL}/login?error=atlassian_failed"));
}

#[tokio::test]
async fn test_callback_with_failed_exchange() {
    let app = TestApp::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({"error": "invalid_grant"})))
        .mount(&app.upstream)
        .await;

    let response = app
        .send(get(
            "/api/auth/atlassian/callback?code=expired&state=abc",
            Some("atlassian_oauth_state=abc"),
        ))
        .await;

    assert_eq!(
        location(&response),
        format!("{PUBLIC_URL}/login?error=token_exchange_failed")
    );
    assert!(
        !set_cookies(&response)
            .iter()
            .any(|c| c.starts_with("atlassian_access_token="))
    );
}

#[tokio::test]
async fn test_status_reflects_cookie() {
    let app = TestApp::start().await;

    let disconnected = app.send(get("/api/auth/atlassian/status", None)).await;
    assert_eq!(body_json(disconnected).await, json!({"connected": false}));

    let connected = app
        .send(get(
            "/api/auth/atlassian/status",
            Some("atlassian_access_token=abc"),
        ))
        .await;
    assert_eq!(body_json(connected).await, json!({"connected": true}));
}

#[tokio::test]
async fn test_logout_clears_cookies() {
    let app = TestApp::start().await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/logout")
        .body(Body::empty())
        .unwrap();

    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookies = set_cookies(&response);
    for name in [
        "atlassian_access_token",
        "atlassian_refresh_token",
        "atlassian_token_expires",
    ] {
        assert!(
            cookies
                .iter()
                .any(|c| c.starts_with(&format!("{name}=;")) && c.contains("Max-Age=0")),
            "{name} not cleared"
        );
    }
    assert_eq!(body_json(response).await, json!({"success": true}));
}
