use anyhow::Result;
use axum::http::StatusCode;
use serde_json::{Value, json};

#[path = "support/mod.rs"]
mod support;

use support::{build_test_app, spawn_fake_ollama, unreachable_url};

fn data_lines(body: &str) -> Vec<&str> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .collect()
}

#[tokio::test]
async fn pull_relays_each_line_then_done() -> Result<()> {
    let url = spawn_fake_ollama(
        "{\"status\":\"pulling manifest\"}\n\n{\"status\":\"downloading\",\"completed\":10}\n{\"status\":\"success\"}",
    )
    .await?;
    let app = build_test_app(&url)?;

    let response = app
        .server
        .post("/api/ollama/models/pull")
        .json(&json!({ "name": "llama3.2" }))
        .await;
    response.assert_status_ok();

    let body = response.text();
    assert_eq!(
        data_lines(&body),
        vec![
            "{\"status\":\"pulling manifest\"}",
            "{\"status\":\"downloading\",\"completed\":10}",
            "{\"status\":\"success\"}",
            "[DONE]",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn unreachable_upstream_is_bad_gateway() -> Result<()> {
    let app = build_test_app(&unreachable_url().await?)?;

    let response = app
        .server
        .post("/api/ollama/models/pull")
        .json(&json!({ "name": "llama3.2" }))
        .await;
    response.assert_status(StatusCode::BAD_GATEWAY);
    let body: Value = response.json();
    assert_eq!(body["error"]["status"], 502);
    Ok(())
}

#[tokio::test]
async fn pull_requires_an_object_body() -> Result<()> {
    let app = build_test_app(&unreachable_url().await?)?;

    app.server
        .post("/api/ollama/models/pull")
        .json(&json!(["llama3.2"]))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    Ok(())
}
