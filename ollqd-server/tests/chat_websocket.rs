use anyhow::Result;
use serde_json::{Value, json};

#[path = "support/mod.rs"]
mod support;

use support::build_http_test_app;

#[tokio::test]
async fn chat_messages_are_answered_in_order() -> Result<()> {
    let app = build_http_test_app("http://127.0.0.1:9")?;

    let mut websocket = app
        .server
        .get_websocket("/api/rag/ws")
        .await
        .into_websocket()
        .await;

    websocket
        .send_json(&json!({ "message": "first", "collection": "repo" }))
        .await;
    websocket.send_text("definitely not json").await;
    websocket.send_json(&json!({ "message": "second" })).await;

    let expected = [
        json!({ "type": "chunk", "content": "echo: first" }),
        json!({ "type": "done", "pii_masked": false, "pii_entities_count": 0 }),
    ];
    for frame in &expected {
        assert_eq!(&websocket.receive_json::<Value>().await, frame);
    }

    let error: Value = websocket.receive_json().await;
    assert_eq!(error["type"], "error");

    assert_eq!(
        websocket.receive_json::<Value>().await,
        json!({ "type": "chunk", "content": "echo: second" })
    );
    assert_eq!(websocket.receive_json::<Value>().await["type"], "done");

    let health: Value = app.server.get("/api/system/health").await.json();
    assert_eq!(health["chat_connections"], 1);
    Ok(())
}
