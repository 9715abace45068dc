//! Streamable-HTTP server role of the Transport Adapter (§4.A, §6): serves
//! downstream JSON-RPC clients over `POST /mcp`, `GET /mcp` (SSE), and
//! `POST /mcp?sessionId=`.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::{
        sse::{Event as SseEvent, Sse},
        IntoResponse, Response,
    },
    Json,
};
use dashmap::DashMap;
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt as _;

use crate::state::AppState;

const MAX_SESSIONS: usize = 100;

#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, mpsc::Sender<Value>>,
}

impl SessionRegistry {
    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

pub async fn get_mcp(State(state): State<AppState>) -> Response {
    if state.sessions.len() >= MAX_SESSIONS {
        return session_cap_exceeded();
    }

    let session_id = uuid::Uuid::new_v4().to_string();
    let (tx, rx) = mpsc::channel::<Value>(32);
    state.sessions.sessions.insert(session_id.clone(), tx);

    let endpoint_event = SseEvent::default()
        .event("endpoint")
        .data(format!("/mcp?sessionId={session_id}"));

    let rx_stream = ReceiverStream::new(rx).map(move |value| {
        Ok::<_, std::convert::Infallible>(
            SseEvent::default()
                .event("message")
                .data(value.to_string()),
        )
    });

    let stream: std::pin::Pin<Box<dyn Stream<Item = Result<SseEvent, std::convert::Infallible>> + Send>> =
        Box::pin(futures::stream::once(async move { Ok(endpoint_event) }).chain(rx_stream));

    Sse::new(stream).into_response()
}

pub async fn post_mcp(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
    Json(body): Json<Value>,
) -> Response {
    match query.session_id {
        None => {
            let response = state.handler.handle_message(&body).await;
            match response {
                Some(resp) => Json(resp).into_response(),
                None => axum::http::StatusCode::NO_CONTENT.into_response(),
            }
        }
        Some(session_id) => {
            let Some(sender) = state
                .sessions
                .sessions
                .get(&session_id)
                .map(|s| s.clone())
            else {
                return axum::http::StatusCode::NOT_FOUND.into_response();
            };
            if let Some(resp) = state.handler.handle_message(&body).await {
                let payload = serde_json::to_value(&resp).unwrap_or(json!(null));
                let _ = sender.send(payload).await;
            }
            axum::http::StatusCode::ACCEPTED.into_response()
        }
    }
}

fn session_cap_exceeded() -> Response {
    (
        axum::http::StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({
            "jsonrpc": "2.0",
            "error": { "code": -32000, "message": "session cap exceeded" },
        })),
    )
        .into_response()
}
