//! `POST /chat/genui` — the generative-UI chat endpoint.
//!
//! Streams typed JSON lines (`{"type": "content" | "tool" | "done" |
//! "error", …}`) over SSE and always ends the byte stream with a literal
//! `[DONE]` line, on success and failure alike.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::Json;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::Stream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use super::AppState;
use super::wire::GenUiRequest;
use crate::chat::TurnRequest;

/// Handle one genui chat turn.
pub async fn handle_genui(
    State(state): State<AppState>,
    Json(request): Json<GenUiRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let thread_id = request
        .thread_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let events = state.chat.handle_turn(TurnRequest {
        thread_id,
        user_message: request.message,
        context: request.context,
        user_id: request.user_id,
    });

    let stream = async_stream::stream! {
        let mut events = events;
        while let Some(event) = events.next().await {
            if let Ok(json) = serde_json::to_string(&event) {
                yield Ok(Event::default().data(json));
            }
        }
        yield Ok(Event::default().data("[DONE]"));
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
