//! Axum Handlers for the REST API
//!
//! `POST /api/chat` builds the system prompt for the request's mode and
//! context and relays the completion, streamed as plain text by default or
//! as one JSON body when the caller sends `Accept: application/json`.
//! `POST /api/log` upserts a participant log entry.

use axum::{
    body::Body,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use bytes::Bytes;
use futures_util::{Stream, StreamExt, stream};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use tutor_core::llm_client::{LLMStream, LLMStreamEvent};
use tutor_core::policy::SessionMode;

use crate::{
    log_store::LogStoreError,
    models::{ChatReply, ChatRequestPayload, ErrorResponse, LogRequestPayload, LogResponse},
    state::AppState,
};

const PREVIEW_CHARS: usize = 50;

pub enum ApiError {
    BadRequest(String),
    /// The completion service failed.
    Upstream(anyhow::Error),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::Upstream(err) => {
                error!("Completion service error: {:?}", err);
                let message = "Failed to process chat request".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<LogStoreError> for ApiError {
    fn from(err: LogStoreError) -> Self {
        match err {
            LogStoreError::InvalidParticipantId(_) => ApiError::BadRequest(err.to_string()),
            other => ApiError::InternalServerError(other.into()),
        }
    }
}

/// The one summary line logged per chat request.
struct ChatLogLine {
    context_type: &'static str,
    model: String,
    messages_count: usize,
}

impl ChatLogLine {
    fn emit(&self, response: &str) {
        let preview: String = response.chars().take(PREVIEW_CHARS).collect();
        info!(
            context_type = self.context_type,
            model = %self.model,
            messages_count = self.messages_count,
            response_preview = %preview,
            "Chat exchange"
        );
    }
}

fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json"))
}

/// Relays upstream chunks as body bytes, logging the summary line once the
/// stream ends.
fn relay(
    upstream: LLMStream,
    log_line: ChatLogLine,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send {
    stream::unfold(
        Some((upstream, log_line, String::new())),
        |state| async move {
            let (mut upstream, log_line, mut preview) = state?;
            match upstream.next().await {
                Some(Ok(LLMStreamEvent::TextChunk(text))) => {
                    if preview.chars().count() < PREVIEW_CHARS {
                        preview.push_str(&text);
                    }
                    Some((Ok(Bytes::from(text)), Some((upstream, log_line, preview))))
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Completion stream failed mid-reply");
                    log_line.emit(&preview);
                    Some((Err(std::io::Error::other(e)), None))
                }
                None => {
                    log_line.emit(&preview);
                    None
                }
            }
        },
    )
}

/// Ask the tutor. The reply is streamed as `text/plain` unless the caller
/// accepts `application/json`.
#[utoipa::path(
    post,
    path = "/api/chat",
    request_body = ChatRequestPayload,
    responses(
        (status = 200, description = "Tutor reply: a plain-text stream, or JSON when `Accept: application/json`", body = ChatReply),
        (status = 400, description = "Missing or malformed messages", body = ErrorResponse),
        (status = 500, description = "Completion service failure", body = ErrorResponse)
    )
)]
#[instrument(skip_all)]
pub async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<ChatRequestPayload>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload?;
    let messages = payload
        .messages
        .ok_or_else(|| ApiError::BadRequest("Messages array is required".to_string()))?;
    let mode = payload.mode.unwrap_or(SessionMode::B);
    let context = payload.context;

    let system_prompt = state.prompt_policy.build(mode, context.as_ref());
    let log_line = ChatLogLine {
        context_type: context.as_ref().map_or("general", |c| c.type_name()),
        model: state.llm_client.model().to_string(),
        messages_count: messages.len(),
    };

    if wants_json(&headers) {
        let content = state
            .llm_client
            .complete(&system_prompt, &messages)
            .await
            .map_err(ApiError::Upstream)?;
        log_line.emit(&content);
        return Ok(Json(ChatReply::assistant(content)).into_response());
    }

    let mut upstream = state
        .llm_client
        .stream(&system_prompt, &messages)
        .await
        .map_err(ApiError::Upstream)?;
    // Upstream HTTP errors surface as the first stream item; they must turn
    // into a 500 before the 200 status is committed.
    let upstream: LLMStream = match upstream.next().await {
        Some(Err(e)) => return Err(ApiError::Upstream(e.into())),
        Some(Ok(first)) => Box::pin(stream::once(async move { Ok(first) }).chain(upstream)),
        None => upstream,
    };
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(relay(upstream, log_line)),
    )
        .into_response())
}

/// Record a participant log entry.
#[utoipa::path(
    post,
    path = "/api/log",
    request_body = LogRequestPayload,
    responses(
        (status = 200, description = "Entry merged into the participant's document", body = LogResponse),
        (status = 400, description = "Missing or unsafe participant ID", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip_all)]
pub async fn log_entry(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LogRequestPayload>, JsonRejection>,
) -> Result<Json<LogResponse>, ApiError> {
    let Json(payload) = payload?;
    let entry = payload
        .into_entry()
        .ok_or_else(|| ApiError::BadRequest("Participant ID is required".to_string()))?;
    state.log_store.upsert(&entry).await?;
    info!(participant = %entry.participant_id, kind = ?entry.kind, "Log entry stored");
    Ok(Json(LogResponse { success: true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Provider};
    use crate::log_store::LogStore;
    use async_openai::error::OpenAIError;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use tutor_core::chat::ChatMessage;
    use tutor_core::llm_client::LLMClient;
    use tutor_core::prompt::PromptPolicy;

    /// Echoes canned text and remembers the last system prompt.
    struct FakeLlm {
        reply: Vec<&'static str>,
        fail: bool,
        /// The stream opens but its first item is an error.
        fail_in_stream: bool,
        last_prompt: Mutex<Option<String>>,
    }

    #[async_trait]
    impl LLMClient for FakeLlm {
        fn model(&self) -> &str {
            "fake-model"
        }

        async fn complete(&self, system_prompt: &str, _history: &[ChatMessage]) -> anyhow::Result<String> {
            *self.last_prompt.lock().unwrap() = Some(system_prompt.to_string());
            if self.fail {
                anyhow::bail!("upstream down");
            }
            Ok(self.reply.concat())
        }

        async fn stream(&self, system_prompt: &str, _history: &[ChatMessage]) -> anyhow::Result<LLMStream> {
            *self.last_prompt.lock().unwrap() = Some(system_prompt.to_string());
            if self.fail {
                anyhow::bail!("upstream down");
            }
            let mut chunks: Vec<_> = self
                .reply
                .iter()
                .map(|c| Ok(LLMStreamEvent::TextChunk(c.to_string())))
                .collect();
            if self.fail_in_stream {
                chunks.insert(0, Err(OpenAIError::InvalidArgument("401 Unauthorized".into())));
            }
            Ok(Box::pin(futures_util::stream::iter(chunks)))
        }
    }

    fn app_state(llm: Arc<FakeLlm>, logs: &std::path::Path) -> Arc<AppState> {
        let config = Config {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            provider: Provider::OpenAI,
            api_key: "test".into(),
            chat_model: "fake-model".into(),
            log_level: tracing::Level::INFO,
            prompts_path: "./prompts".into(),
            logs_path: logs.to_path_buf(),
            language: "English".into(),
        };
        Arc::new(AppState {
            llm_client: llm,
            prompt_policy: Arc::new(PromptPolicy::builtin("English")),
            log_store: Arc::new(LogStore::new(logs)),
            config: Arc::new(config),
        })
    }

    fn fake(reply: Vec<&'static str>, fail: bool) -> Arc<FakeLlm> {
        Arc::new(FakeLlm {
            reply,
            fail,
            fail_in_stream: false,
            last_prompt: Mutex::new(None),
        })
    }

    fn payload(value: Value) -> Result<Json<ChatRequestPayload>, JsonRejection> {
        Ok(Json(serde_json::from_value(value).unwrap()))
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_chat_streams_plain_text_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let llm = fake(vec!["Why did ", "you pick ", "Apple?"], false);
        let state = app_state(llm.clone(), dir.path());

        let response = chat(
            State(state),
            HeaderMap::new(),
            payload(json!({
                "messages": [],
                "context": {"type": "failure_reflection_1", "question_text": "Q?", "user_answer": "Apple"},
                "mode": "B"
            })),
        )
        .await
        .unwrap_or_else(|_| panic!("chat failed"));

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/plain"));
        assert_eq!(body_text(response).await, "Why did you pick Apple?");

        let prompt = llm.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("Socratic question"));
    }

    #[tokio::test]
    async fn test_chat_single_shot_json() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(fake(vec!["Great job!"], false), dir.path());
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, "application/json".parse().unwrap());

        let response = chat(State(state), headers, payload(json!({"messages": [], "mode": "A"})))
            .await
            .unwrap_or_else(|_| panic!("chat failed"));
        let reply: ChatReply = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(reply, ChatReply::assistant("Great job!".into()));
    }

    #[tokio::test]
    async fn test_chat_requires_messages() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(fake(vec![], false), dir.path());
        let result = chat(State(state), HeaderMap::new(), payload(json!({"mode": "B"}))).await;
        let response = match result {
            Err(e) => e.into_response(),
            Ok(_) => panic!("expected a rejection"),
        };
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_chat_upstream_failure_is_500() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(fake(vec![], true), dir.path());
        let result = chat(State(state), HeaderMap::new(), payload(json!({"messages": []}))).await;
        let response = match result {
            Err(e) => e.into_response(),
            Ok(_) => panic!("expected an upstream failure"),
        };
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_chat_error_before_first_chunk_is_500() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(FakeLlm {
            reply: vec!["never sent"],
            fail: false,
            fail_in_stream: true,
            last_prompt: Mutex::new(None),
        });
        let state = app_state(llm, dir.path());
        let result = chat(State(state), HeaderMap::new(), payload(json!({"messages": []}))).await;
        let response = match result {
            Err(e) => e.into_response(),
            Ok(_) => panic!("expected an upstream failure"),
        };
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_chat_stream_keeps_first_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(fake(vec!["Only chunk"], false), dir.path());
        let response = chat(State(state), HeaderMap::new(), payload(json!({"messages": []})))
            .await
            .unwrap_or_else(|_| panic!("chat failed"));
        assert_eq!(body_text(response).await, "Only chunk");
    }

    #[tokio::test]
    async fn test_log_entry_upserts() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(fake(vec![], false), dir.path());
        let body: LogRequestPayload = serde_json::from_value(json!({
            "participantId": "p-9",
            "type": "learn",
            "data": {"correct": 4}
        }))
        .unwrap();

        let Json(response) = log_entry(State(state.clone()), Ok(Json(body)))
            .await
            .unwrap_or_else(|_| panic!("log failed"));
        assert!(response.success);

        let doc = state.log_store.read("p-9").await.unwrap().unwrap();
        assert_eq!(doc["learnSession"]["correct"], 4);
    }

    #[tokio::test]
    async fn test_log_entry_requires_participant() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(fake(vec![], false), dir.path());
        for body in [json!({"type": "learn", "data": {}}), json!({"participantId": "../x", "data": {}})] {
            let body: LogRequestPayload = serde_json::from_value(body).unwrap();
            let response = match log_entry(State(state.clone()), Ok(Json(body))).await {
                Err(e) => e.into_response(),
                Ok(_) => panic!("expected a rejection"),
            };
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
    }
}
