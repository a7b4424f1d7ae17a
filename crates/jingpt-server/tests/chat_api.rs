//! Route tests for POST /api/chat.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

mod common;

use axum::http::StatusCode;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

use common::{
    GRAPH_TOKEN, TestApp, anthropic_text, anthropic_tool_use, body_json, body_text, chat_request,
    get, graph_hits, script_model, set_cookies, sse_frames, tool_names,
};
use jingpt::answer::{ERROR_ANSWER, FALLBACK_ANSWER};

fn question(stream: bool) -> serde_json::Value {
    json!({
        "messages": [{"role": "user", "content": "What is Acme's cap table?"}],
        "stream": stream
    })
}

async fn mount_graph_search(app: &TestApp) {
    Mock::given(method("POST"))
        .and(path("/search/query"))
        .and(header("authorization", format!("Bearer {GRAPH_TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(graph_hits()))
        .mount(&app.upstream)
        .await;
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::start().await;
    let response = app.send(get("/health", None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"status": "ok"}));
}

#[tokio::test]
async fn test_missing_graph_token_is_rejected_before_the_loop() {
    let app = TestApp::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(anthropic_text("unused")))
        .expect(0)
        .mount(&app.upstream)
        .await;

    let response = app.send(chat_request(&question(false), None, None)).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["code"], "unauthorized");
    assert!(body["error"].as_str().unwrap().contains("log in"));
}

#[tokio::test]
async fn test_orphan_tool_result_is_bad_request() {
    let app = TestApp::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(anthropic_text("unused")))
        .expect(0)
        .mount(&app.upstream)
        .await;

    let body = json!({
        "messages": [
            {"role": "user", "content": "Find the Acme SHA"},
            {"role": "assistant", "content": "Searching."},
            {"role": "user", "content": [
                {"type": "tool_result", "tool_use_id": "toolu_missing", "content": "{}"},
                {"type": "text", "text": "and?"}
            ]}
        ],
        "stream": false
    });
    let response = app.send(chat_request(&body, Some(GRAPH_TOKEN), None)).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "bad_request");
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let app = TestApp::start().await;
    let response = app
        .send(chat_request(&json!({"question": "hi"}), Some(GRAPH_TOKEN), None))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_plain_answer_as_json() {
    let app = TestApp::start().await;
    script_model(&app.upstream, vec![anthropic_text("Hello! Ask me about a company.")]).await;

    let response = app.send(chat_request(&question(false), Some(GRAPH_TOKEN), None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["content"][0]["type"], "text");
    assert_eq!(body["content"][0]["text"], "Hello! Ask me about a company.");
    assert_eq!(body["rounds"], 0);
    assert_eq!(body["stop_reason"], "completed");
    assert_eq!(body["citations"], json!([]));
}

#[tokio::test]
async fn test_search_then_answer_as_json() {
    let app = TestApp::start().await;
    mount_graph_search(&app).await;
    script_model(
        &app.upstream,
        vec![
            anthropic_tool_use("toolu_1", "search_sharepoint", json!({"query": "Acme cap table"})),
            anthropic_text("I found the Acme cap table workbook."),
        ],
    )
    .await;

    let response = app.send(chat_request(&question(false), Some(GRAPH_TOKEN), None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["content"][0]["text"], "I found the Acme cap table workbook.");
    assert_eq!(body["rounds"], 1);

    let model_requests = app.requests_to("/messages").await;
    assert_eq!(model_requests.len(), 2);

    // The second turn carries the search result under the original call id.
    let followup = model_requests[1]["messages"].to_string();
    assert!(followup.contains("\"tool_use_id\":\"toolu_1\""));
    assert!(followup.contains("Acme Cap Table.xlsx"));
}

#[tokio::test]
async fn test_round_cap_ends_with_fallback() {
    let app = TestApp::start().await;
    mount_graph_search(&app).await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(anthropic_tool_use(
            "toolu_loop",
            "search_sharepoint",
            json!({"query": "Acme"}),
        )))
        .mount(&app.upstream)
        .await;

    let response = app.send(chat_request(&question(false), Some(GRAPH_TOKEN), None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["stop_reason"], "round_limit");
    assert_eq!(body["rounds"], 3);
    assert_eq!(body["content"][0]["text"], FALLBACK_ANSWER);

    // Three dispatching turns plus the turn that hit the cap.
    assert_eq!(app.requests_to("/messages").await.len(), 4);
}

#[tokio::test]
async fn test_model_failure_as_json_is_generic_500() {
    let app = TestApp::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "type": "error",
            "error": {"type": "authentication_error", "message": "invalid x-api-key"}
        })))
        .mount(&app.upstream)
        .await;

    let response = app.send(chat_request(&question(false), Some(GRAPH_TOKEN), None)).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_text(response).await;
    assert!(!body.contains("x-api-key"));
}

#[tokio::test]
async fn test_stream_emits_status_progress_and_one_final_frame() {
    let app = TestApp::start().await;
    mount_graph_search(&app).await;
    script_model(
        &app.upstream,
        vec![
            anthropic_tool_use("toolu_1", "search_sharepoint", json!({"query": "Acme cap table"})),
            anthropic_text("Acme's cap table is in the Portfolio site."),
        ],
    )
    .await;

    let response = app.send(chat_request(&question(true), Some(GRAPH_TOKEN), None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );

    let frames = sse_frames(&body_text(response).await);
    let types: Vec<&str> = frames.iter().map(|f| f["type"].as_str().unwrap()).collect();
    assert_eq!(types, vec!["status", "status", "progress", "status", "final"]);

    assert_eq!(frames[1]["message"], "Searching SharePoint for \"Acme cap table\"");
    assert_eq!(
        frames[2],
        json!({"type": "progress", "round": 1, "max_rounds": 3, "tool": "search_sharepoint", "success": true})
    );

    let last = frames.last().unwrap();
    assert_eq!(last["content"][0]["text"], "Acme's cap table is in the Portfolio site.");
    assert_eq!(last["rounds"], 1);
    assert_eq!(last["stop_reason"], "completed");
    assert!(last.get("error").is_none());
}

#[tokio::test]
async fn test_stream_failure_still_ends_with_final_frame() {
    let app = TestApp::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&app.upstream)
        .await;

    let response = app.send(chat_request(&question(true), Some(GRAPH_TOKEN), None)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let frames = sse_frames(&body_text(response).await);
    assert_eq!(frames.iter().filter(|f| f["type"] == "final").count(), 1);

    let last = frames.last().unwrap();
    assert_eq!(last["type"], "final");
    assert_eq!(last["content"][0]["text"], ERROR_ANSWER);
    assert_eq!(last["stop_reason"], "error");
    assert!(last["error"].is_string());
}

#[tokio::test]
async fn test_stream_is_the_default() {
    let app = TestApp::start().await;
    script_model(&app.upstream, vec![anthropic_text("Hi.")]).await;

    let body = json!({"messages": [{"role": "user", "content": "hi"}]});
    let response = app.send(chat_request(&body, Some(GRAPH_TOKEN), None)).await;

    let frames = sse_frames(&body_text(response).await);
    assert_eq!(frames.last().unwrap()["type"], "final");
}

#[tokio::test]
async fn test_confluence_tools_follow_the_atlassian_cookie() {
    let app = TestApp::start().await;
    script_model(&app.upstream, vec![anthropic_text("one"), anthropic_text("two")]).await;

    app.send(chat_request(&question(false), Some(GRAPH_TOKEN), None)).await;
    app.send(chat_request(
        &question(false),
        Some(GRAPH_TOKEN),
        Some("atlassian_access_token=atl-token"),
    ))
    .await;

    let requests = app.requests_to("/messages").await;
    let without = tool_names(&requests[0]);
    let with = tool_names(&requests[1]);

    assert!(without.contains(&"search_sharepoint".to_string()));
    assert!(!without.contains(&"search_confluence".to_string()));
    assert!(with.contains(&"search_confluence".to_string()));
    assert!(with.contains(&"read_confluence_page".to_string()));
}

#[tokio::test]
async fn test_expired_atlassian_token_is_refreshed_before_the_loop() {
    let app = TestApp::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh-access",
            "refresh_token": "fresh-refresh",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&app.upstream)
        .await;
    script_model(&app.upstream, vec![anthropic_text("ok")]).await;

    let response = app
        .send(chat_request(
            &question(false),
            Some(GRAPH_TOKEN),
            Some("atlassian_access_token=old; atlassian_refresh_token=refresh; atlassian_token_expires=1"),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let cookies = set_cookies(&response);
    assert!(cookies.iter().any(|c| c.starts_with("atlassian_access_token=fresh-access;")));
    assert!(cookies.iter().any(|c| c.starts_with("atlassian_refresh_token=fresh-refresh;")));

    let requests = app.requests_to("/messages").await;
    assert!(tool_names(&requests[0]).contains(&"search_confluence".to_string()));
}
