//! HTTP API driven over a real socket.

use concierge::config::Config;
use concierge::gateway::GatewayClient;
use concierge::orchestrator::AppointmentOrchestrator;
use concierge::router::QueryRouter;
use concierge::server::{app, AppState};
use concierge::session::SessionStore;
use serde_json::{json, Value};

async fn spawn_app() -> String {
    let config = Config::default();
    let state = AppState::new(
        QueryRouter::pattern_only().unwrap(),
        AppointmentOrchestrator::new(GatewayClient::offline(), &config).unwrap(),
        SessionStore::from_config(&config.sessions),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app(state)).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_route_endpoint() {
    let base = spawn_app().await;
    let client = reqwest::Client::new();

    let body: Value = client
        .post(format!("{}/route", base))
        .json(&json!({"query": "do you resize rings?"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["source"], "pattern");
    assert_eq!(body["category"], "services");
    assert!(body["url"].as_str().unwrap().starts_with("https://"));

    let none: Value = client
        .post(format!("{}/route", base))
        .json(&json!({"query": "what's the weather like"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(none["source"], "none");
    assert!(none["url"].is_null());

    let bad = client
        .post(format!("{}/route", base))
        .json(&json!({"query": "rings", "category": "jewelry"}))
        .send()
        .await
        .unwrap();
    assert_eq!(bad.status(), 400);
    let err: Value = bad.json().await.unwrap();
    assert_eq!(err["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_session_lifecycle_and_offline_schedule() {
    let base = spawn_app().await;
    let client = reqwest::Client::new();

    let created = client.post(format!("{}/sessions", base)).send().await.unwrap();
    assert_eq!(created.status(), 201);
    let id = created.json::<Value>().await.unwrap()["session_id"]
        .as_str()
        .unwrap()
        .to_string();

    let turn: Value = client
        .post(format!("{}/sessions/{}/turns", base, id))
        .json(&json!({
            "text": "Looking for wedding bands, email me at sam@example.com",
            "reply": "We have a great selection of bands."
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(turn["turns"], 2);
    assert_eq!(turn["match"]["source"], "pattern");
    let url = turn["match"]["url"].as_str().unwrap();
    assert!(turn["reply"].as_str().unwrap().ends_with(url));

    let outcome = client
        .post(format!("{}/sessions/{}/schedule", base, id))
        .send()
        .await
        .unwrap();
    assert_eq!(outcome.status(), 200);
    let outcome: Value = outcome.json().await.unwrap();
    assert_eq!(outcome["outcome"], "degraded");
    assert_eq!(outcome["status"], "gateway_unavailable");

    let deleted = client
        .delete(format!("{}/sessions/{}", base, id))
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), 204);

    let missing = client
        .post(format!("{}/sessions/{}/turns", base, id))
        .json(&json!({"text": "hello?"}))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn test_schedule_without_contact_asks_for_one() {
    let base = spawn_app().await;
    let client = reqwest::Client::new();
    let id = client
        .post(format!("{}/sessions", base))
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap()["session_id"]
        .as_str()
        .unwrap()
        .to_string();

    client
        .post(format!("{}/sessions/{}/turns", base, id))
        .json(&json!({"text": "Can I book an appraisal?"}))
        .send()
        .await
        .unwrap();

    let outcome: Value = client
        .post(format!("{}/sessions/{}/schedule", base, id))
        .json(&json!({"start": "2025-03-04T14:00:00-06:00"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(outcome["status"], "invalid_contact");
}

#[tokio::test]
async fn test_tools_endpoints() {
    let base = spawn_app().await;
    let client = reqwest::Client::new();

    let list: Value = client
        .get(format!("{}/tools/list", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["configured"], false);
    assert_eq!(list["tools"].as_array().unwrap().len(), 9);

    let unknown = client
        .post(format!("{}/tools/drop_tables", base))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), 404);

    let offline = client
        .post(format!("{}/tools/search_contacts", base))
        .json(&json!({"query": "jane"}))
        .send()
        .await
        .unwrap();
    assert_eq!(offline.status(), 503);
    let err: Value = offline.json().await.unwrap();
    assert_eq!(err["error"]["code"], "gateway_unavailable");
}
