use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    response::{
        Sse,
        sse::{Event, KeepAlive},
    },
};
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::{convert::Infallible, time::Duration};

use ollqd_core::RelayFrame;

use crate::infra::{
    app_state::AppState,
    errors::{AppError, AppResult},
};

/// Proxy an Ollama model pull as an event stream: one `data:` event per
/// upstream progress line, always terminated by `data: [DONE]`.
pub async fn pull_model_handler(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let Json(body) = payload.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
    if !body.is_object() {
        return Err(AppError::bad_request("request body must be a JSON object"));
    }

    let relay = state.ollama.pull(&body).await?;
    let events = relay.map(|frame| Ok(relay_event(&frame)));

    Ok(Sse::new(events).keep_alive(default_keep_alive()))
}

fn relay_event(frame: &RelayFrame) -> Event {
    // Carriage returns cannot be carried inside an event field.
    Event::default().data(frame.data().replace('\r', ""))
}

fn default_keep_alive() -> KeepAlive {
    KeepAlive::new()
        .interval(Duration::from_secs(15))
        .text("keep-alive")
}
