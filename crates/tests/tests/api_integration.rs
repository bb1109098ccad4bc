use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use occacia_agents::{AiFlow, FlowError};
use occacia_api::{build_app_with_flow, ApiConfig, DEFAULT_API_KEY};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tower::ServiceExt;

/// Flow double that answers from a queue and reports "not configured" once it runs dry.
#[derive(Clone, Default)]
struct ScriptedFlow {
    replies: Arc<Mutex<VecDeque<String>>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedFlow {
    fn replying(texts: &[&str]) -> Self {
        let flow = Self::default();
        flow.replies
            .lock()
            .extend(texts.iter().map(|text| text.to_string()));
        flow
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

impl AiFlow for ScriptedFlow {
    async fn run(&self, input: &str) -> Result<Value, FlowError> {
        self.prompts.lock().push(input.to_string());
        match self.replies.lock().pop_front() {
            Some(text) => Ok(json!({
                "outputs": [{ "outputs": [{ "results": { "message": { "text": text } } }] }]
            })),
            None => Err(FlowError::NotConfigured),
        }
    }
}

async fn app_with(flow: ScriptedFlow) -> Router {
    build_app_with_flow(ApiConfig::default(), flow)
        .await
        .expect("app should build")
}

fn plan_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/planning/generate")
        .header("content-type", "application/json")
        .header("x-api-key", DEFAULT_API_KEY)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn authed_get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-api-key", DEFAULT_API_KEY)
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn venue_names(payload: &Value) -> Vec<String> {
    payload["matched_venues"]
        .as_array()
        .unwrap()
        .iter()
        .map(|venue| venue["name"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn health_is_public() {
    let app = app_with(ScriptedFlow::default()).await;

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let payload = json_body(response).await;
    assert_eq!(payload["status"], "ok");
    assert_eq!(payload["store"], "memory");
    assert_eq!(payload["ai_flow_configured"], false);
}

#[tokio::test]
async fn planning_requires_api_key() {
    let app = app_with(ScriptedFlow::default()).await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/planning/generate")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "user_query": "dinner in Kandy" }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "unauthorized");
}

#[tokio::test]
async fn moderate_budget_in_kandy_returns_the_hermits_dinner() {
    let flow = ScriptedFlow::replying(&[
        r#"{"intent":"planning","reasoning":"quiet dinner","location":"Kandy","budget":"Moderate","venue_tags":["quiet"]}"#,
    ]);
    let app = app_with(flow).await;

    let response = app
        .oneshot(plan_request(json!({ "user_query": "Somewhere quiet in Kandy for two" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let payload = json_body(response).await;
    assert_eq!(payload["intent"], "planning");
    assert_eq!(payload["location"], "Kandy");
    assert_eq!(payload["venue_tags"], json!(["quiet"]));
    assert_eq!(venue_names(&payload), vec!["The Hermit's Dinner".to_string()]);
    assert_eq!(payload["matched_venues"][0]["price_per_head"], 3500.0);
}

#[tokio::test]
async fn cheap_budget_in_kandy_returns_no_venues() {
    let flow = ScriptedFlow::replying(&[
        r#"{"intent":"planning","location":"Kandy","budget":"Cheap","venue_tags":["quiet"]}"#,
    ]);
    let app = app_with(flow).await;

    let response = app
        .oneshot(plan_request(json!({ "user_query": "Cheap quiet place in Kandy" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let payload = json_body(response).await;
    assert_eq!(payload["intent"], "planning");
    assert!(venue_names(&payload).is_empty());
}

#[tokio::test]
async fn chat_intent_returns_reply_without_venues() {
    let flow = ScriptedFlow::replying(&[
        r#"{"intent":"chat","reasoning":"greeting","chat_response":"Hi! What are we celebrating?"}"#,
    ]);
    let app = app_with(flow).await;

    let response = app
        .oneshot(plan_request(json!({ "user_query": "hello there" })))
        .await
        .unwrap();

    let payload = json_body(response).await;
    assert_eq!(payload["intent"], "chat");
    assert_eq!(payload["chat_response"], "Hi! What are we celebrating?");
    assert!(venue_names(&payload).is_empty());
}

#[tokio::test]
async fn fenced_any_location_is_dropped_before_matching() {
    let flow = ScriptedFlow::replying(&["```json\n{\"intent\":\"planning\",\"location\":\"Any\"}\n```"]);
    let app = app_with(flow).await;

    let response = app
        .oneshot(plan_request(json!({ "user_query": "anything fun" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let payload = json_body(response).await;
    assert_eq!(payload["intent"], "planning");
    assert!(payload["location"].is_null());
    // No predicates: the first five catalog entries come back.
    assert_eq!(venue_names(&payload).len(), 5);
}

#[tokio::test]
async fn unreachable_flow_answers_with_fallback() {
    let app = app_with(ScriptedFlow::default()).await;

    let response = app
        .oneshot(plan_request(json!({ "user_query": "dinner in Galle" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let payload = json_body(response).await;
    assert_eq!(payload["intent"], "chat");
    assert_eq!(payload["reasoning"], "AI error occurred. Using fallback.");
    assert!(venue_names(&payload).is_empty());
}

#[tokio::test]
async fn blank_query_is_rejected() {
    let flow = ScriptedFlow::default();
    let app = app_with(flow.clone()).await;

    let response = app
        .oneshot(plan_request(json!({ "user_query": "   " })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_request");
    assert!(flow.prompts().is_empty());
}

#[tokio::test]
async fn malformed_bodies_get_json_errors() {
    let app = app_with(ScriptedFlow::default()).await;

    let missing_field = app
        .clone()
        .oneshot(plan_request(json!({ "session_id": "s-1" })))
        .await
        .unwrap();
    assert_eq!(missing_field.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let payload = json_body(missing_field).await;
    assert_eq!(payload["error"], "invalid_request");
    assert!(payload["message"].as_str().unwrap().contains("user_query"));

    let broken = Request::builder()
        .method("POST")
        .uri("/api/planning/generate")
        .header("content-type", "application/json")
        .header("x-api-key", DEFAULT_API_KEY)
        .body(Body::from("{\"user_query\": "))
        .unwrap();
    let response = app.oneshot(broken).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_request");
}

#[tokio::test]
async fn follow_up_turn_sends_history_and_is_listed() {
    let flow = ScriptedFlow::replying(&[
        r#"{"intent":"chat","chat_response":"How many guests?"}"#,
        r#"{"intent":"planning","location":"Galle","budget":"Luxury","venue_tags":["romantic"]}"#,
    ]);
    let app = app_with(flow.clone()).await;

    let first = app
        .clone()
        .oneshot(plan_request(json!({
            "user_query": "I want to propose",
            "session_id": "session-42"
        })))
        .await
        .unwrap();
    assert_eq!(json_body(first).await["session_id"], "session-42");

    let second = app
        .clone()
        .oneshot(plan_request(json!({
            "user_query": "Just the two of us, in Galle",
            "session_id": "session-42"
        })))
        .await
        .unwrap();
    let payload = json_body(second).await;
    assert_eq!(
        venue_names(&payload),
        vec!["Sunset Proposal Package".to_string()]
    );

    let prompts = flow.prompts();
    assert_eq!(prompts[0], "I want to propose");
    assert!(prompts[1].starts_with("Previous conversation:\nUser: I want to propose\nAssistant: How many guests?"));
    assert!(prompts[1].ends_with("Current request: Just the two of us, in Galle"));

    let history = app
        .oneshot(authed_get("/api/chat/history?session_id=session-42"))
        .await
        .unwrap();
    assert_eq!(history.status(), StatusCode::OK);
    let turns = json_body(history).await;
    let messages = turns
        .as_array()
        .unwrap()
        .iter()
        .map(|turn| turn["user_message"].as_str().unwrap().to_string())
        .collect::<Vec<_>>();
    assert_eq!(
        messages,
        vec![
            "I want to propose".to_string(),
            "Just the two of us, in Galle".to_string()
        ]
    );
}

#[tokio::test]
async fn packages_endpoint_lists_seeded_catalog() {
    let app = app_with(ScriptedFlow::default()).await;

    let response = app
        .clone()
        .oneshot(authed_get("/api/catalog/packages"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await.as_array().unwrap().len(), 6);

    let limited = app
        .oneshot(authed_get("/api/catalog/packages?limit=2"))
        .await
        .unwrap();
    let packages = json_body(limited).await;
    assert_eq!(packages.as_array().unwrap().len(), 2);
    assert_eq!(packages[0]["name"], "The Hermit's Dinner");
}

#[tokio::test]
async fn rate_limit_rejects_burst() {
    let config = ApiConfig {
        rate_limit_window: Duration::from_secs(60),
        rate_limit_max: 2,
        ..ApiConfig::default()
    };
    let app = build_app_with_flow(config, ScriptedFlow::default())
        .await
        .expect("app should build");

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(authed_get("/api/catalog/packages"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .oneshot(authed_get("/api/catalog/packages"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));
}
