//! Common test utilities for route tests.
//!
//! One `MockServer` stands in for Anthropic, Microsoft Graph, the Confluence
//! REST API and the Atlassian token endpoint; they live on disjoint paths.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, Response};
use secrecy::SecretString;
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use jingpt_client::AnthropicClient;
use jingpt_common::{Config, RetryConfig};
use jingpt_server::{AppState, AtlassianApp, Server, ServerConfig};

pub const GRAPH_TOKEN: &str = "graph-token";
pub const PUBLIC_URL: &str = "http://localhost:8080";

/// A router wired to a mock upstream.
pub struct TestApp {
    pub router: Router,
    pub upstream: MockServer,
}

impl TestApp {
    /// Starts an app with Atlassian login enabled.
    pub async fn start() -> Self {
        Self::start_with(true).await
    }

    pub async fn start_with(atlassian: bool) -> Self {
        let upstream = MockServer::start().await;
        let uri = upstream.uri();

        let mut config = ServerConfig::default();
        config.public_url = PUBLIC_URL.to_string();
        config.model.base_url = Some(uri.clone());
        config.orchestration.max_rounds = 3;
        config.sharepoint.graph_base_url = uri.clone();
        config.confluence.api_base_url = uri.clone();
        config.atlassian.authorize_url = format!("{uri}/authorize");
        config.atlassian.token_url = format!("{uri}/oauth/token");

        let llm_config = Config::new("anthropic", "claude-sonnet-4-5")
            .with_api_key("test-key")
            .with_base_url(&uri)
            .with_max_tokens(1024)
            .with_retry_config(RetryConfig {
                max_retries: 0,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(1),
                backoff_multiplier: 1.0,
                jitter: false,
            });
        let llm = Arc::new(AnthropicClient::new(llm_config).unwrap());

        let app = AtlassianApp {
            client_id: "client-id".to_string(),
            client_secret: SecretString::from("client-secret"),
            authorize_url: config.atlassian.authorize_url.clone(),
            token_url: config.atlassian.token_url.clone(),
            scopes: config.atlassian.scopes.clone(),
            redirect_uri: format!("{PUBLIC_URL}/api/auth/atlassian/callback"),
        };

        let mut state = AppState::new(config, llm, reqwest::Client::new());
        if atlassian {
            state = state.with_atlassian(app);
        }

        Self {
            router: Server::new(state).router(),
            upstream,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Bodies of every request the mock received on `route`.
    pub async fn requests_to(&self, route: &str) -> Vec<Value> {
        self.upstream
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path() == route)
            .map(|r| serde_json::from_slice(&r.body).unwrap_or(Value::Null))
            .collect()
    }
}

/// POST /api/chat with a JSON body.
pub fn chat_request(body: &Value, token: Option<&str>, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

/// Splits an SSE body into its JSON frames, ignoring keep-alive comments.
pub fn sse_frames(body: &str) -> Vec<Value> {
    body.split("\n\n")
        .filter_map(|event| {
            event
                .lines()
                .find_map(|line| line.strip_prefix("data:"))
                .map(|data| serde_json::from_str(data.trim()).unwrap())
        })
        .collect()
}

pub fn set_cookies<B>(response: &Response<B>) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

pub fn location<B>(response: &Response<B>) -> String {
    response
        .headers()
        .get("location")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}

/// An Anthropic Messages API response with plain text.
pub fn anthropic_text(text: &str) -> Value {
    json!({
        "id": "msg_text",
        "type": "message",
        "role": "assistant",
        "content": [{"type": "text", "text": text}],
        "model": "claude-sonnet-4-5",
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 10, "output_tokens": 20}
    })
}

/// An Anthropic Messages API response requesting one tool.
pub fn anthropic_tool_use(id: &str, name: &str, input: Value) -> Value {
    json!({
        "id": "msg_tool",
        "type": "message",
        "role": "assistant",
        "content": [{"type": "tool_use", "id": id, "name": name, "input": input}],
        "model": "claude-sonnet-4-5",
        "stop_reason": "tool_use",
        "usage": {"input_tokens": 10, "output_tokens": 20}
    })
}

/// Queues model responses: each is served once, in order.
pub async fn script_model(upstream: &MockServer, responses: Vec<Value>) {
    for response in responses {
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(response))
            .up_to_n_times(1)
            .mount(upstream)
            .await;
    }
}

/// A Graph search response with one workbook hit.
pub fn graph_hits() -> Value {
    json!({
        "value": [{
            "hitsContainers": [{
                "hits": [{
                    "resource": {
                        "id": "item-1",
                        "name": "Acme Cap Table.xlsx",
                        "webUrl": "https://tenant.sharepoint.com/sites/Portfolio/Acme Cap Table.xlsx",
                        "lastModifiedDateTime": "2024-05-01T09:00:00Z",
                        "parentReference": { "driveId": "drive-1" }
                    }
                }]
            }]
        }]
    })
}

/// Names of the tools offered in an Anthropic request body.
pub fn tool_names(request: &Value) -> Vec<String> {
    request["tools"]
        .as_array()
        .map(|tools| {
            tools
                .iter()
                .filter_map(|t| t["name"].as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}
