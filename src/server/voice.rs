//! `POST /voice/chat/completions` — the voice assistant endpoint.
//!
//! OpenAI-compatible: accepts `{messages, user?}` plus a `session` query
//! parameter, streams `chat.completion.chunk` objects, and terminates
//! with `[DONE]`. A turn with no extractable utterance still produces a
//! well-formed (empty-content) stream.

use std::convert::Infallible;

use axum::extract::{Query, State};
use axum::response::Json;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::Stream;
use tokio_stream::StreamExt;

use super::AppState;
use super::wire::{ChatCompletionChunk, VoiceChatRequest, VoiceQuery, completion_id, unix_timestamp};
use crate::voice::ANONYMOUS_USER;

/// Model name reported in voice chunks.
const VOICE_MODEL_ID: &str = "wayfare-voice";

/// Handle one voice turn.
pub async fn handle_voice_chat(
    State(state): State<AppState>,
    Query(query): Query<VoiceQuery>,
    Json(request): Json<VoiceChatRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let user_id = request
        .user
        .or(query.session)
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| ANONYMOUS_USER.to_owned());

    let chunks = state.voice.handle_turn(user_id, request.messages);

    let id = completion_id();
    let created = unix_timestamp();

    let stream = async_stream::stream! {
        let first = ChatCompletionChunk::role_chunk(&id, created, VOICE_MODEL_ID);
        if let Ok(json) = serde_json::to_string(&first) {
            yield Ok(Event::default().data(json));
        }

        let mut chunks = chunks;
        while let Some(content) = chunks.next().await {
            let chunk = ChatCompletionChunk::content_chunk(&id, created, VOICE_MODEL_ID, content);
            if let Ok(json) = serde_json::to_string(&chunk) {
                yield Ok(Event::default().data(json));
            }
        }

        let last = ChatCompletionChunk::final_chunk(&id, created, VOICE_MODEL_ID);
        if let Ok(json) = serde_json::to_string(&last) {
            yield Ok(Event::default().data(json));
        }
        yield Ok(Event::default().data("[DONE]"));
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
