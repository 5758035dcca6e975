use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use strum_macros::Display;
use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;
use uuid::Uuid;

use crate::agents::StreamEvent;
use crate::error::{AppError, Result};
use crate::models::{Message, TurnResult};

// ============================================================================
// TURN PHASE
// ============================================================================

/// Where a session's in-flight turn currently is. Only an `Idle` session
/// accepts a new turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, Default)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    #[default]
    Idle,
    AwaitingPrimary,
    AwaitingDelegate,
    AwaitingSpeech,
    AwaitingMedia,
}

// ============================================================================
// SESSION MANAGER
// ============================================================================

#[derive(Debug)]
struct Session {
    phase: TurnPhase,
    history: HashMap<String, Vec<Message>>,
    last_active: Instant,
}

impl Session {
    fn new() -> Self {
        Self {
            phase: TurnPhase::Idle,
            history: HashMap::new(),
            last_active: Instant::now(),
        }
    }
}

/// Per-session turn state and per-agent message history.
#[derive(Clone, Default)]
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves an idle session into `phase`, creating the session on first use.
    pub async fn begin_turn(&self, session_id: &str, phase: TurnPhase) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(session_id.to_string()).or_insert_with(Session::new);
        if session.phase != TurnPhase::Idle {
            return Err(AppError::turn_in_flight(session_id));
        }
        session.phase = phase;
        session.last_active = Instant::now();
        log::debug!("🔒 Session {} entered {}", session_id, phase);
        Ok(())
    }

    pub async fn set_phase(&self, session_id: &str, phase: TurnPhase) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(session_id) {
            session.phase = phase;
        }
    }

    pub async fn phase(&self, session_id: &str) -> TurnPhase {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|s| s.phase)
            .unwrap_or_default()
    }

    pub async fn append(&self, session_id: &str, message: Message) {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(Session::new);
        session.last_active = Instant::now();
        session
            .history
            .entry(message.agent_id.clone())
            .or_default()
            .push(message);
    }

    /// Records the turn's outcome in history and returns the session to idle.
    /// Failures are stored as a degraded message so the conversation stays
    /// readable.
    pub async fn finish_turn(
        &self,
        session_id: &str,
        agent_id: &str,
        outcome: std::result::Result<&TurnResult, &AppError>,
    ) -> Message {
        let message = match outcome {
            Ok(result) => Message::model(agent_id, result),
            Err(err) => Message::degraded(agent_id, &err.message),
        };

        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(Session::new);
        session
            .history
            .entry(agent_id.to_string())
            .or_default()
            .push(message.clone());
        session.phase = TurnPhase::Idle;
        session.last_active = Instant::now();
        message
    }

    pub async fn history(&self, session_id: &str, agent_id: &str) -> Vec<Message> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .and_then(|s| s.history.get(agent_id))
            .cloned()
            .unwrap_or_default()
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drops idle sessions untouched for at least `ttl`, history included.
    /// Sessions with a turn in flight are kept.
    pub async fn evict_idle(&self, ttl: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.phase != TurnPhase::Idle || s.last_active.elapsed() < ttl);
        before - sessions.len()
    }

    /// Runs [`evict_idle`](Self::evict_idle) in the background, checking at
    /// most once a minute.
    pub fn spawn_sweeper(&self, ttl: Duration) -> tokio::task::JoinHandle<()> {
        let sessions = self.clone();
        let period = ttl.min(Duration::from_secs(60)).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let evicted = sessions.evict_idle(ttl).await;
                if evicted > 0 {
                    log::info!("🧹 Evicted {} idle sessions", evicted);
                }
            }
        })
    }
}

// ============================================================================
// TURN CONTEXT
// ============================================================================

/// Handle passed down a turn so each step can report its phase.
pub struct TurnContext {
    pub request_id: String,
    pub session_id: String,
    sessions: SessionManager,
    events: Option<mpsc::Sender<StreamEvent>>,
}

impl TurnContext {
    pub fn new(sessions: SessionManager, session_id: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::now_v7().to_string(),
            session_id: session_id.into(),
            sessions,
            events: None,
        }
    }

    pub fn with_events(mut self, tx: mpsc::Sender<StreamEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub async fn enter(&self, phase: TurnPhase) {
        self.sessions.set_phase(&self.session_id, phase).await;
        self.emit(StreamEvent::Phase {
            request_id: self.request_id.clone(),
            phase,
        })
        .await;
    }

    pub async fn emit(&self, event: StreamEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_second_turn_rejected_until_idle() {
        let sessions = SessionManager::new();
        sessions.begin_turn("s1", TurnPhase::AwaitingPrimary).await.unwrap();

        let err = sessions
            .begin_turn("s1", TurnPhase::AwaitingPrimary)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::TurnInFlight);

        // other sessions are unaffected
        assert_ok!(sessions.begin_turn("s2", TurnPhase::AwaitingMedia).await);

        sessions
            .finish_turn("s1", "sarthi", Ok(&TurnResult::default()))
            .await;
        assert_eq!(sessions.phase("s1").await, TurnPhase::Idle);
        assert_ok!(sessions.begin_turn("s1", TurnPhase::AwaitingPrimary).await);
    }

    #[tokio::test]
    async fn test_history_is_per_agent_and_ordered() {
        let sessions = SessionManager::new();
        sessions.append("s1", Message::user("sarthi", "one", None)).await;
        sessions.append("s1", Message::user("inkmind", "poem", None)).await;
        let result = TurnResult {
            text: "two".to_string(),
            ..Default::default()
        };
        sessions.finish_turn("s1", "sarthi", Ok(&result)).await;

        let history = sessions.history("s1", "sarthi").await;
        let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two"]);
        assert_eq!(sessions.history("s1", "inkmind").await.len(), 1);
        assert!(sessions.history("s2", "sarthi").await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_turn_leaves_degraded_message() {
        let sessions = SessionManager::new();
        sessions.begin_turn("s1", TurnPhase::AwaitingPrimary).await.unwrap();
        let err = AppError::internal("quota exceeded");
        let msg = sessions.finish_turn("s1", "neosphere-core", Err(&err)).await;

        assert!(msg.content.contains("Neural Desync Detected"));
        assert!(msg.content.contains("quota exceeded"));
        assert_eq!(sessions.phase("s1").await, TurnPhase::Idle);
    }

    #[tokio::test]
    async fn test_idle_sessions_evicted_busy_kept() {
        let sessions = SessionManager::new();
        sessions.append("idle", Message::user("sarthi", "hello", None)).await;
        sessions.begin_turn("busy", TurnPhase::AwaitingMedia).await.unwrap();

        assert_eq!(sessions.evict_idle(Duration::from_secs(3600)).await, 0);
        assert_eq!(sessions.evict_idle(Duration::ZERO).await, 1);
        assert_eq!(sessions.count().await, 1);
        assert!(sessions.history("idle", "sarthi").await.is_empty());
        assert_eq!(sessions.phase("busy").await, TurnPhase::AwaitingMedia);
    }

    #[tokio::test]
    async fn test_context_reports_phase() {
        let sessions = SessionManager::new();
        sessions.begin_turn("s1", TurnPhase::AwaitingPrimary).await.unwrap();
        let (tx, mut rx) = mpsc::channel(4);
        let ctx = TurnContext::new(sessions.clone(), "s1").with_events(tx);

        ctx.enter(TurnPhase::AwaitingSpeech).await;
        assert_eq!(sessions.phase("s1").await, TurnPhase::AwaitingSpeech);
        match rx.recv().await {
            Some(StreamEvent::Phase { phase, .. }) => assert_eq!(phase, TurnPhase::AwaitingSpeech),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
