// tests/api_tests.rs

use std::sync::Arc;

use practica_valencia::{
    build_router,
    content::Unconfigured,
    state::AppState,
    store::{JsonFileStore, MemoryStore, SharedStore},
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;
use tower::ServiceExt;

/// Spawn the app on a random port. Returns the base URL.
async fn spawn_app(store: SharedStore) -> String {
    let state = Arc::new(AppState::with_parts(Arc::new(Unconfigured), store));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://127.0.0.1:{}", port)
}

fn exercise(n: usize) -> Value {
    json!({
        "sentence": format!("Frase {n} amb un [BLANK]."),
        "options": [format!("a{n}"), format!("b{n}"), format!("c{n}"), format!("d{n}")],
        "correctAnswer": format!("a{n}"),
        "explanation": "Perquè sí, clar",
    })
}

async fn post_answer(client: &reqwest::Client, address: &str, level: &str, n: usize, answer: &str) -> Value {
    let response = client
        .post(format!("{}/api/v1/history", address))
        .json(&json!({ "level": level, "exercise": exercise(n), "selectedAnswer": answer }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 201);
    response.json().await.unwrap()
}

#[tokio::test]
async fn health_reports_missing_content_source() {
    let state = Arc::new(AppState::with_parts(Arc::new(Unconfigured), Arc::new(MemoryStore::new())));
    let response = build_router(state)
        .oneshot(
            axum::http::Request::builder()
                .uri("/api/v1/health")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body, json!({ "ok": true, "contentConfigured": false }));
}

#[tokio::test]
async fn exercise_without_key_is_a_config_error() {
    let address = spawn_app(Arc::new(MemoryStore::new())).await;
    let response = reqwest::get(format!(
        "{}/api/v1/exercise?level=B2&skill=Comprensi%C3%B3",
        address
    ))
    .await
    .unwrap();
    assert_eq!(response.status().as_u16(), 503);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["retryable"], false);
    assert!(body["error"].as_str().unwrap().contains("clau API"));
}

#[tokio::test]
async fn exam_settings_are_validated_and_saved() {
    let address = spawn_app(Arc::new(MemoryStore::new())).await;
    let client = reqwest::Client::new();

    let current: Value = client
        .get(format!("{}/api/v1/settings/exam", address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(current, json!({ "numQuestions": 5, "timePerQuestion": 60 }));

    let response = client
        .put(format!("{}/api/v1/settings/exam", address))
        .json(&json!({ "numQuestions": 21, "timePerQuestion": 60 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    let response = client
        .put(format!("{}/api/v1/settings/exam", address))
        .json(&json!({ "numQuestions": 12, "timePerQuestion": 90 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let prefs: Value = client
        .get(format!("{}/api/v1/preferences", address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(prefs["examSettings"], json!({ "numQuestions": 12, "timePerQuestion": 90 }));
}

#[tokio::test]
async fn history_filters_stats_and_milestone() {
    let address = spawn_app(Arc::new(MemoryStore::new())).await;
    let client = reqwest::Client::new();

    let first = post_answer(&client, &address, "B1", 0, "a0").await;
    assert!(first["milestone"].is_null());
    post_answer(&client, &address, "B1", 1, "c1").await;
    let third = post_answer(&client, &address, "C1", 2, "a2").await;
    assert_eq!(third["milestone"]["count"], 3);

    let all: Value = client
        .get(format!("{}/api/v1/history", address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all["total"], 3);
    assert_eq!(all["stats"]["accuracyPercent"], 67);
    // Most recent first.
    assert_eq!(all["items"][0]["level"], "C1");

    let b1_wrong: Value = client
        .get(format!("{}/api/v1/history?level=B1&result=incorrect", address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(b1_wrong["items"].as_array().unwrap().len(), 1);
    assert_eq!(b1_wrong["items"][0]["selectedAnswer"], "c1");
    assert_eq!(b1_wrong["stats"]["accuracyPercent"], 0);
}

#[tokio::test]
async fn rejects_answer_that_is_not_an_option() {
    let address = spawn_app(Arc::new(MemoryStore::new())).await;
    let response = reqwest::Client::new()
        .post(format!("{}/api/v1/history", address))
        .json(&json!({ "level": "B2", "exercise": exercise(0), "selectedAnswer": "zzz" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn export_is_csv_or_no_content() {
    let address = spawn_app(Arc::new(MemoryStore::new())).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/api/v1/history/export", address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);

    post_answer(&client, &address, "B2", 0, "b0").await;
    let response = client
        .get(format!("{}/api/v1/history/export", address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert!(response.headers()["content-type"].to_str().unwrap().starts_with("text/csv"));
    let csv = response.text().await.unwrap();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some("Date,Level,Question,YourAnswer,CorrectAnswer,Result,Explanation")
    );
    let row = lines.next().unwrap();
    assert!(row.contains(",B2,Frase 0 amb un ______.,b0,a0,Incorrect,\"Perquè sí, clar\""));

    // Filter that matches nothing exports nothing.
    let response = client
        .get(format!("{}/api/v1/history/export?level=C2", address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);
}

#[tokio::test]
async fn clearing_history_keeps_milestones() {
    let address = spawn_app(Arc::new(MemoryStore::new())).await;
    let client = reqwest::Client::new();
    for n in 0..3 {
        post_answer(&client, &address, "B1", n, &format!("a{n}")).await;
    }
    let response = client
        .delete(format!("{}/api/v1/history", address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);

    let mut third = Value::Null;
    for n in 0..3 {
        third = post_answer(&client, &address, "B1", n, &format!("a{n}")).await;
    }
    assert!(third["milestone"].is_null());
}

#[tokio::test]
async fn recommendation_thresholds() {
    let address = spawn_app(Arc::new(MemoryStore::new())).await;
    for (score, level) in [(2, "B1"), (5, "B2"), (6, "C1"), (10, "C2")] {
        let body: Value = reqwest::get(format!("{}/api/v1/placement/recommendation?score={}", address, score))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["level"], level);
    }
    let response = reqwest::get(format!("{}/api/v1/placement/recommendation?score=11", address))
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn state_survives_restart_with_file_store() {
    let dir = tempfile::TempDir::new().unwrap();
    let open = || -> SharedStore { Arc::new(JsonFileStore::with_base_dir(dir.path().to_path_buf()).unwrap()) };

    let address = spawn_app(open()).await;
    let client = reqwest::Client::new();
    post_answer(&client, &address, "C1", 4, "a4").await;
    client
        .put(format!("{}/api/v1/preferences", address))
        .json(&json!({ "theme": "dark", "onboardingComplete": true }))
        .send()
        .await
        .unwrap();

    let again = spawn_app(open()).await;
    let history: Value = client
        .get(format!("{}/api/v1/history", again))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history["total"], 1);
    let prefs: Value = client
        .get(format!("{}/api/v1/preferences", again))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(prefs["theme"], "dark");
    assert_eq!(prefs["onboardingComplete"], true);
}

async fn assert_json_bad_request(response: reqwest::Response) -> Value {
    assert_eq!(response.status().as_u16(), 400);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("application/json"));
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["retryable"], false);
    assert!(body["error"].is_string());
    body
}

#[tokio::test]
async fn malformed_input_gets_json_errors() {
    let address = spawn_app(Arc::new(MemoryStore::new())).await;
    let client = reqwest::Client::new();

    // Does not fit the field type at all.
    let response = client
        .put(format!("{}/api/v1/settings/exam", address))
        .json(&json!({ "numQuestions": 300, "timePerQuestion": 60 }))
        .send()
        .await
        .unwrap();
    assert_json_bad_request(response).await;

    let response = client
        .get(format!("{}/api/v1/exercise?level=A1&skill=Comprensi%C3%B3", address))
        .send()
        .await
        .unwrap();
    let body = assert_json_bad_request(response).await;
    assert!(body["error"].as_str().unwrap().contains("A1"));

    let response = client
        .get(format!("{}/api/v1/placement/recommendation?score=-1", address))
        .send()
        .await
        .unwrap();
    assert_json_bad_request(response).await;

    let response = client
        .post(format!("{}/api/v1/history", address))
        .header("content-type", "application/json")
        .body("{ not json")
        .send()
        .await
        .unwrap();
    assert_json_bad_request(response).await;
}

async fn next_json<S>(ws: &mut S) -> Value
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = ws.next().await.expect("socket closed").expect("socket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

#[tokio::test]
async fn websocket_session_round_trip() {
    let address = spawn_app(Arc::new(MemoryStore::new())).await;
    let url = format!("{}/ws", address.replacen("http://", "ws://", 1));
    let (mut ws, _) = tokio_tungstenite::connect_async(url)
        .await
        .expect("Failed to connect");

    ws.send(Message::Text(r#"{"type":"ping"}"#.into())).await.unwrap();
    assert_eq!(next_json(&mut ws).await, json!({ "type": "pong" }));

    ws.send(Message::Text("{ not json".into())).await.unwrap();
    let reply = next_json(&mut ws).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["retryable"], false);
    assert!(reply["message"].as_str().unwrap().starts_with("Invalid JSON"));

    ws.send(Message::Text(r#"{"type":"exam_open","level":"C1"}"#.into()))
        .await
        .unwrap();
    let reply = next_json(&mut ws).await;
    assert_eq!(reply["type"], "exam");
    assert_eq!(reply["exam"]["level"], "C1");
    assert_eq!(reply["exam"]["state"]["phase"], "start");

    ws.close(None).await.unwrap();
}
