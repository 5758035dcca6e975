use std::error::Error;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::{middleware, Router};
use tower_http::cors::{Any, CorsLayer};

use crate::agents::master_agent::MasterAgent;
use crate::agents::registry::AgentRegistry;
use crate::agents::session::SessionManager;
use crate::agents::video_agent::VideoAgent;
use crate::backend::{GeminiClient, GenerativeBackend};
use crate::error::ErrorContext;
use crate::handlers::{
    chat_stream_handler, create_agent_handler, health_check, history_handler,
    list_agents_handler, session_middleware, video_handler,
};
use crate::storage::{
    create_protocol_handler, delete_protocol_handler, delete_vault_handler,
    list_protocols_handler, list_vault_handler, save_vault_handler, toggle_protocol_handler,
    MediaValidator, MessageVault, ProtocolStore,
};
use crate::{AiConfig, AppState};

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
        })
    }
}

pub async fn app_init() -> Result<(Config, Arc<AppState>), Box<dyn Error>> {
    let config = Config::from_env()?;
    log::info!("✅ Configuration loaded");
    let ai_config = AiConfig::from_env()?;
    log::info!("✅ Ai Configuration loaded");

    log::info!("🔌 Initializing Gemini client ({})...", ai_config.base_url);
    let backend: Arc<dyn GenerativeBackend> = Arc::new(GeminiClient::new(&ai_config).context("Gemini client")?);
    log::info!("✅ Gemini client initialized");

    let state = build_state(backend, ai_config)?;
    log::info!("🤖 {} agents registered", state.registry.len().await);
    state.sessions.spawn_sweeper(state.ai_config.session_idle_ttl);
    log::info!(
        "🧹 Idle sessions evicted after {:?}",
        state.ai_config.session_idle_ttl
    );
    Ok((config, state))
}

/// Wires every service around `backend`.
pub fn build_state(
    backend: Arc<dyn GenerativeBackend>,
    ai_config: AiConfig,
) -> Result<Arc<AppState>, Box<dyn Error>> {
    let master_agent = Arc::new(MasterAgent::new(backend.clone(), ai_config.clone())?);
    let video_agent = Arc::new(VideoAgent::new(backend, &ai_config));

    Ok(Arc::new(AppState {
        master_agent,
        video_agent,
        registry: Arc::new(AgentRegistry::new()),
        sessions: SessionManager::new(),
        protocols: Arc::new(ProtocolStore::new()),
        vault: Arc::new(MessageVault::new()),
        media_validator: Arc::new(MediaValidator::new(ai_config.max_media_mb)),
        ai_config,
    }))
}

// ============================================================================
// Router
// ============================================================================

pub fn create_app_router(state: Arc<AppState>) -> Router {
    let body_limit = state.ai_config.request_body_limit();
    Router::new()
        .route(
            "/api/agent/chat",
            axum::routing::post(chat_stream_handler),
        )
        .route(
            "/api/agent/video",
            axum::routing::post(video_handler),
        )
        .route(
            "/api/agents",
            axum::routing::get(list_agents_handler).post(create_agent_handler),
        )
        .route(
            "/api/sessions/history/{agent_id}",
            axum::routing::get(history_handler),
        )
        .route(
            "/api/protocols",
            axum::routing::get(list_protocols_handler).post(create_protocol_handler),
        )
        .route(
            "/api/protocols/{id}/toggle",
            axum::routing::post(toggle_protocol_handler),
        )
        .route(
            "/api/protocols/{id}",
            axum::routing::delete(delete_protocol_handler),
        )
        .route(
            "/api/vault",
            axum::routing::get(list_vault_handler).post(save_vault_handler),
        )
        .route(
            "/api/vault/{id}",
            axum::routing::delete(delete_vault_handler),
        )
        .route("/health", axum::routing::get(health_check))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(session_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .with_state(state)
}
