use std::convert::Infallible;
use std::sync::Arc;

use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::sse::{Event, KeepAlive};
use axum::response::{Response, Sse};
use axum::{
    extract::{Extension, Path, Request, State},
    Json,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agents::master_agent::TurnRequest;
use crate::agents::registry::{Agent, NewAgent, CORE_AGENT_ID};
use crate::agents::session::{TurnContext, TurnPhase};
use crate::error::*;
use crate::models::*;
use crate::types::AspectRatio;
use crate::AppState;

pub const SESSION_HEADER: &str = "x-session-id";

// ============================================================================
// Middleware
// ============================================================================

/// Conversation scope for a request, taken from `X-Session-ID`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionId(pub String);

/// Attaches a [`SessionId`] to every request, minting one when the header is
/// missing, and echoes it back on the response.
pub async fn session_middleware(mut request: Request, next: Next) -> Response {
    let session_id = request
        .headers()
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::now_v7().to_string());

    request.extensions_mut().insert(SessionId(session_id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&session_id) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}

// ============================================================================
// SSE STREAM HANDLER
// ============================================================================

/// Handler for streaming a chat turn via SSE
///
/// POST /api/agent/chat
/// Body: TurnRequest JSON
///
/// Returns: Server-Sent Events stream with StreamEvent data, or 409 when the
/// session already has a turn in flight
pub async fn chat_stream_handler(
    State(state): State<Arc<AppState>>,
    Extension(SessionId(session_id)): Extension<SessionId>,
    Json(request): Json<TurnRequest>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let agent = state.master_agent.clone();
    let mut rx = agent
        .handle_turn_stream(state.clone(), session_id, request)
        .await?;

    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json_data) => {
                    let sse_event = Event::default()
                        .event("message")
                        .data(json_data);

                    yield Ok(sse_event);

                    if event.is_terminal() {
                        break;
                    }
                }
                Err(e) => {
                    log::error!("❌ Failed to serialize stream event: {}", e);
                    let error_event = Event::default()
                        .event("error")
                        .data(format!("Serialization error: {}", e));
                    yield Ok(error_event);
                    break;
                }
            }
        }

        // Send final event to indicate stream end
        let done_event = Event::default()
            .event("done")
            .data("Stream closed");
        yield Ok(done_event);
    };

    // Return SSE with keep-alive
    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(15))
            .text("keep-alive"),
    ))
}

// ============================================================================
// VIDEO HANDLER
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoTurnRequest {
    #[serde(default)]
    pub agent_id: Option<String>,
    pub message: String,
    #[serde(default)]
    pub media: Option<MediaAttachment>,
    #[serde(default)]
    pub aspect_ratio: Option<AspectRatio>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoTurnResponse {
    pub result: TurnResult,
    pub message: Message,
}

/// POST /api/agent/video
///
/// Blocks until the video job finishes. The job runs in its own task, so a
/// client that disconnects mid-poll still leaves the session idle. On
/// failure the degraded history message is returned in the error's
/// `details`.
pub async fn video_handler(
    State(state): State<Arc<AppState>>,
    Extension(SessionId(session_id)): Extension<SessionId>,
    Json(request): Json<VideoTurnRequest>,
) -> Result<Json<VideoTurnResponse>> {
    if let Some(media) = &request.media {
        state.media_validator.validate(media)?;
    }
    let agent_id = request.agent_id.as_deref().unwrap_or(CORE_AGENT_ID);
    let agent = state
        .registry
        .get_or_core(agent_id)
        .await
        .ok_or_else(|| AppError::not_found(format!("Agent {}", agent_id)))?;

    state
        .sessions
        .begin_turn(&session_id, TurnPhase::AwaitingMedia)
        .await?;
    state
        .sessions
        .append(
            &session_id,
            Message::user(&agent.id, &request.message, request.media.as_ref()),
        )
        .await;

    let job = {
        let state = state.clone();
        let session_id = session_id.clone();
        let agent_id = agent.id.clone();
        tokio::spawn(async move {
            let ctx = TurnContext::new(state.sessions.clone(), session_id.clone());
            let outcome = state
                .video_agent
                .submit_video(&ctx, &request.message, request.media.as_ref(), request.aspect_ratio)
                .await
                .map_err(AppError::from);
            if let Err(e) = &outcome {
                log_error(e);
            }
            let message = state
                .sessions
                .finish_turn(&session_id, &agent_id, outcome.as_ref())
                .await;
            (outcome, message)
        })
    };

    let (outcome, message) = match job.await {
        Ok(done) => done,
        Err(e) => {
            let err = AppError::internal(format!("Video task aborted: {}", e));
            log_error(&err);
            let message = state
                .sessions
                .finish_turn(&session_id, &agent.id, Err(&err))
                .await;
            return Err(err.with_details(serde_json::json!({ "message": message })));
        }
    };

    match outcome {
        Ok(result) => Ok(Json(VideoTurnResponse { result, message })),
        Err(e) => Err(e.with_details(serde_json::json!({ "message": message }))),
    }
}

// ============================================================================
// AGENTS & HISTORY
// ============================================================================

pub async fn list_agents_handler(State(state): State<Arc<AppState>>) -> Json<Vec<Agent>> {
    Json(state.registry.all().await)
}

pub async fn create_agent_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NewAgent>,
) -> Result<(StatusCode, Json<Agent>)> {
    let agent = state.registry.create(request).await?;
    Ok((StatusCode::CREATED, Json(agent)))
}

/// GET /api/sessions/history/{agent_id}
pub async fn history_handler(
    State(state): State<Arc<AppState>>,
    Extension(SessionId(session_id)): Extension<SessionId>,
    Path(agent_id): Path<String>,
) -> Json<Vec<Message>> {
    Json(state.sessions.history(&session_id, &agent_id).await)
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthStatus> {
    Json(HealthStatus::healthy(
        state.registry.len().await,
        state.sessions.count().await,
    ))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::master_agent::TurnFlags;
    use crate::agents::StreamEvent;
    use crate::backend::mock::ScriptedBackend;
    use crate::backend::{BackendError, FetchedAsset, GenerateResponse, JobStatus};
    use crate::init::{build_state, create_app_router};
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use crate::storage::AiConfig;
    use crate::types::MediaKind;
    use bytes::Bytes;
    use std::time::Duration;

    fn state_with(backend: ScriptedBackend) -> Arc<AppState> {
        let config = AiConfig {
            video_poll_interval: Duration::from_millis(1),
            video_max_wait: Duration::from_millis(50),
            ..Default::default()
        };
        build_state(Arc::new(backend), config).unwrap()
    }

    fn turn(agent_id: &str, message: &str) -> TurnRequest {
        TurnRequest {
            agent_id: agent_id.to_string(),
            message: message.to_string(),
            media: None,
            options: TurnFlags::default(),
        }
    }

    async fn drain(mut rx: tokio::sync::mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_turn_stream_completes_and_records_history() {
        let state = state_with(
            ScriptedBackend::new().reply(GenerateResponse::from_text("Hello from the core interface.")),
        );
        let rx = state
            .master_agent
            .clone()
            .handle_turn_stream(state.clone(), "s1".to_string(), turn(CORE_AGENT_ID, "hi"))
            .await
            .unwrap();
        let events = drain(rx).await;

        assert!(matches!(events.first(), Some(StreamEvent::Started { .. })));
        let chunks: String = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::TextChunk { chunk, .. } => Some(chunk.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(chunks, "Hello from the core interface.");
        assert!(matches!(events.last(), Some(StreamEvent::Completed { .. })));

        let history = state.sessions.history("s1", CORE_AGENT_ID).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, MessageRole::User);
        assert_eq!(history[1].content, "Hello from the core interface.");
        assert_eq!(state.sessions.phase("s1").await, TurnPhase::Idle);
    }

    #[tokio::test]
    async fn test_failed_turn_streams_degraded_message() {
        let state = state_with(ScriptedBackend::new().fail(BackendError::api(500, "model overloaded")));
        let rx = state
            .master_agent
            .clone()
            .handle_turn_stream(state.clone(), "s1".to_string(), turn("sarthi", "analyse"))
            .await
            .unwrap();
        let events = drain(rx).await;

        match events.last() {
            Some(StreamEvent::Error {
                error,
                message,
                recoverable,
                ..
            }) => {
                assert_eq!(error, "model overloaded");
                assert!(message.content.contains("Neural Desync Detected"));
                assert!(*recoverable);
            }
            other => panic!("unexpected terminal event: {:?}", other),
        }
        // session stays usable
        assert_eq!(state.sessions.phase("s1").await, TurnPhase::Idle);
        assert_eq!(state.sessions.history("s1", "sarthi").await.len(), 2);
    }

    #[tokio::test]
    async fn test_busy_session_rejects_turn() {
        let state = state_with(ScriptedBackend::new());
        state
            .sessions
            .begin_turn("s1", TurnPhase::AwaitingPrimary)
            .await
            .unwrap();

        let err = state
            .master_agent
            .clone()
            .handle_turn_stream(state.clone(), "s1".to_string(), turn(CORE_AGENT_ID, "hi"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::TurnInFlight);
        assert!(state.sessions.history("s1", CORE_AGENT_ID).await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_media_rejected_before_turn() {
        let state = state_with(ScriptedBackend::new());
        let mut request = turn(CORE_AGENT_ID, "edit this");
        request.media = Some(MediaAttachment {
            data: "bm90IGFuIGltYWdl".to_string(),
            mime_type: "image/png".to_string(),
            kind: MediaKind::Image,
        });

        let err = state
            .master_agent
            .clone()
            .handle_turn_stream(state.clone(), "s1".to_string(), request)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert_eq!(state.sessions.phase("s1").await, TurnPhase::Idle);
    }

    #[tokio::test]
    async fn test_video_handler_success() {
        let state = state_with(
            ScriptedBackend::new()
                .poll(JobStatus {
                    done: true,
                    asset_uri: Some("https://files/v.mp4".to_string()),
                })
                .asset(FetchedAsset {
                    mime_type: Some("video/mp4".to_string()),
                    bytes: Bytes::from_static(b"vid"),
                }),
        );
        let request = VideoTurnRequest {
            agent_id: Some("makewatch".to_string()),
            message: "a drone shot over mountains".to_string(),
            media: None,
            aspect_ratio: None,
        };

        let Json(response) = video_handler(
            State(state.clone()),
            Extension(SessionId("s1".to_string())),
            Json(request),
        )
        .await
        .unwrap();

        assert_eq!(response.result.media_kind, Some(MediaKind::Video));
        assert_eq!(response.message.media_type, Some(MediaKind::Video));
        assert_eq!(state.sessions.history("s1", "makewatch").await.len(), 2);
        assert_eq!(state.sessions.phase("s1").await, TurnPhase::Idle);
    }

    #[tokio::test]
    async fn test_video_handler_timeout_is_degraded() {
        let state = state_with(ScriptedBackend::new());
        let request = VideoTurnRequest {
            agent_id: None,
            message: "never finishes".to_string(),
            media: None,
            aspect_ratio: Some(AspectRatio::Portrait9x16),
        };

        let err = video_handler(
            State(state.clone()),
            Extension(SessionId("s1".to_string())),
            Json(request),
        )
        .await
        .unwrap_err();

        assert_eq!(err.code, ErrorCode::Timeout);
        assert!(err.details.is_some());
        let history = state.sessions.history("s1", CORE_AGENT_ID).await;
        assert!(history[1].content.contains("Neural Desync Detected"));
    }

    #[tokio::test]
    async fn test_dropped_video_request_frees_session() {
        let state = state_with(
            ScriptedBackend::new().reply(GenerateResponse::from_text("Back online.")),
        );
        let request = VideoTurnRequest {
            agent_id: None,
            message: "a slow render".to_string(),
            media: None,
            aspect_ratio: None,
        };

        // client gives up long before the job's 50ms ceiling
        let dropped = tokio::time::timeout(
            Duration::from_millis(5),
            video_handler(
                State(state.clone()),
                Extension(SessionId("s1".to_string())),
                Json(request),
            ),
        )
        .await;
        assert!(dropped.is_err());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(state.sessions.phase("s1").await, TurnPhase::Idle);
        let history = state.sessions.history("s1", CORE_AGENT_ID).await;
        assert!(history[1].content.contains("Neural Desync Detected"));

        let rx = state
            .master_agent
            .clone()
            .handle_turn_stream(state.clone(), "s1".to_string(), turn(CORE_AGENT_ID, "hi"))
            .await
            .unwrap();
        assert!(matches!(drain(rx).await.last(), Some(StreamEvent::Completed { .. })));
    }

    async fn serve(state: Arc<AppState>) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, create_app_router(state)).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn audio_turn(bytes: usize) -> serde_json::Value {
        serde_json::json!({
            "agentId": CORE_AGENT_ID,
            "message": "transcribe this",
            "media": {
                "data": STANDARD.encode(vec![0u8; bytes]),
                "mimeType": "audio/wav",
                "type": "audio",
            },
        })
    }

    #[tokio::test]
    async fn test_chat_accepts_media_above_default_body_cap() {
        let state = state_with(ScriptedBackend::new().reply(GenerateResponse::from_text("Heard it.")));
        let base = serve(state.clone()).await;

        let response = reqwest::Client::new()
            .post(format!("{}/api/agent/chat", base))
            .header(SESSION_HEADER, "big-upload")
            .json(&audio_turn(3 * 1024 * 1024))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(
            response.headers().get(SESSION_HEADER).and_then(|v| v.to_str().ok()),
            Some("big-upload")
        );
        let body = response.text().await.unwrap();
        assert!(body.contains("Heard it."));
    }

    #[tokio::test]
    async fn test_media_over_configured_limit_gets_json_error() {
        let config = AiConfig {
            max_media_mb: 1,
            ..Default::default()
        };
        let state = build_state(Arc::new(ScriptedBackend::new()), config).unwrap();
        let base = serve(state).await;

        let response = reqwest::Client::new()
            .post(format!("{}/api/agent/chat", base))
            .json(&audio_turn(1536 * 1024))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::PAYLOAD_TOO_LARGE);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["error"]["message"], "Media too large (max 1MB)");
    }

    #[tokio::test]
    async fn test_agents_and_health() {
        let state = state_with(ScriptedBackend::new());
        let (status, Json(agent)) = create_agent_handler(
            State(state.clone()),
            Json(NewAgent {
                name: "Ledger AI".to_string(),
                description: "Bookkeeping.".to_string(),
                category: crate::types::AgentCategory::Operations,
                system_prompt: "You are Ledger AI.".to_string(),
                voice: crate::types::Voice::Kore,
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let Json(agents) = list_agents_handler(State(state.clone())).await;
        assert_eq!(agents.len(), 9);
        assert_eq!(agents.last().map(|a| a.id.as_str()), Some(agent.id.as_str()));

        let Json(health) = health_check(State(state)).await;
        assert_eq!(health.status, "healthy");
        assert_eq!(health.agents, 9);
    }
}
