use crate::error::*;
use crate::models::*;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::agents::master_agent::MasterAgent;
use crate::agents::registry::AgentRegistry;
use crate::agents::session::SessionManager;
use crate::agents::video_agent::VideoAgent;

// ============================================================================
// AppState && AiConfig
// ============================================================================

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub api_key: String,
    pub base_url: String,
    pub chat_model: String,
    pub location_model: String,
    pub image_model: String,
    pub image_edit_model: String,
    pub speech_model: String,
    pub video_model: String,
    pub thinking_budget: u32,
    pub video_poll_interval: Duration,
    pub video_max_wait: Duration,
    pub max_media_mb: u64,
    pub session_idle_ttl: Duration,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            chat_model: "gemini-3-pro-preview".to_string(),
            location_model: "gemini-2.5-flash".to_string(),
            image_model: "gemini-3-pro-image-preview".to_string(),
            image_edit_model: "gemini-2.5-flash-image".to_string(),
            speech_model: "gemini-2.5-flash-preview-tts".to_string(),
            video_model: "veo-3.1-fast-generate-preview".to_string(),
            thinking_budget: 32768,
            video_poll_interval: Duration::from_secs(10),
            video_max_wait: Duration::from_secs(600),
            max_media_mb: 20,
            session_idle_ttl: Duration::from_secs(3600),
        }
    }
}

impl AiConfig {
    pub fn from_env() -> std::result::Result<Self, Box<dyn std::error::Error>> {
        let defaults = Self::default();
        let api_key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("API_KEY"))
            .map_err(|_| AppError::config("GEMINI_API_KEY (or API_KEY) must be set"))?;
        Ok(Self {
            api_key,
            base_url: std::env::var("GEMINI_BASE_URL").unwrap_or(defaults.base_url),
            chat_model: std::env::var("CHAT_MODEL").unwrap_or(defaults.chat_model),
            location_model: std::env::var("LOCATION_MODEL").unwrap_or(defaults.location_model),
            image_model: std::env::var("IMAGE_MODEL").unwrap_or(defaults.image_model),
            image_edit_model: std::env::var("IMAGE_EDIT_MODEL").unwrap_or(defaults.image_edit_model),
            speech_model: std::env::var("SPEECH_MODEL").unwrap_or(defaults.speech_model),
            video_model: std::env::var("VIDEO_MODEL").unwrap_or(defaults.video_model),
            thinking_budget: std::env::var("THINKING_BUDGET")
                .unwrap_or_else(|_| "32768".to_string())
                .parse()?,
            video_poll_interval: Duration::from_secs(
                std::env::var("VIDEO_POLL_INTERVAL_SECS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()?,
            ),
            video_max_wait: Duration::from_secs(
                std::env::var("VIDEO_MAX_WAIT_SECS")
                    .unwrap_or_else(|_| "600".to_string())
                    .parse()?,
            ),
            max_media_mb: std::env::var("MAX_MEDIA_MB")
                .unwrap_or_else(|_| "20".to_string())
                .parse()?,
            session_idle_ttl: Duration::from_secs(
                std::env::var("SESSION_IDLE_TTL_SECS")
                    .unwrap_or_else(|_| "3600".to_string())
                    .parse()?,
            ),
        })
    }

    /// Request body cap: the media limit after base64 expansion, plus room
    /// for the JSON envelope.
    pub fn request_body_limit(&self) -> usize {
        const ENVELOPE: u64 = 1024 * 1024;
        let encoded = (self.max_media_mb * 1024 * 1024).div_ceil(3) * 4;
        (encoded + ENVELOPE) as usize
    }
}

#[derive(Clone)]
pub struct AppState {
    pub master_agent: Arc<MasterAgent>,
    pub video_agent: Arc<VideoAgent>,
    pub registry: Arc<AgentRegistry>,
    pub sessions: SessionManager,
    pub protocols: Arc<ProtocolStore>,
    pub vault: Arc<MessageVault>,
    pub media_validator: Arc<MediaValidator>,
    pub ai_config: AiConfig,
}

// ============================================================================
// Protocol Store
// ============================================================================

/// Training protocols. At most one is active at any time.
#[derive(Default)]
pub struct ProtocolStore {
    protocols: RwLock<Vec<TrainingProtocol>>,
}

impl ProtocolStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn list(&self) -> Vec<TrainingProtocol> {
        self.protocols.read().await.clone()
    }

    pub async fn active(&self) -> Option<TrainingProtocol> {
        self.protocols
            .read()
            .await
            .iter()
            .find(|p| p.is_active)
            .cloned()
    }

    /// Adds a protocol and makes it the active one.
    pub async fn create(&self, request: NewProtocol) -> Result<TrainingProtocol> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(AppError::validation("Protocol name is required"));
        }
        let protocol = TrainingProtocol {
            id: Uuid::now_v7().to_string(),
            name: name.to_string(),
            rules: request.rules,
            samples: request.samples,
            is_active: true,
        };

        let mut protocols = self.protocols.write().await;
        protocols.iter_mut().for_each(|p| p.is_active = false);
        protocols.push(protocol.clone());
        log::info!("📜 Protocol created and activated: {}", protocol.name);
        Ok(protocol)
    }

    pub async fn activate(&self, id: &str) -> Result<TrainingProtocol> {
        let mut protocols = self.protocols.write().await;
        if !protocols.iter().any(|p| p.id == id) {
            return Err(AppError::not_found(format!("Protocol {}", id)));
        }
        let mut activated = None;
        for p in protocols.iter_mut() {
            p.is_active = p.id == id;
            if p.is_active {
                activated = Some(p.clone());
            }
        }
        activated.ok_or_else(|| AppError::not_found(format!("Protocol {}", id)))
    }

    /// Deactivates the protocol if it is active, otherwise activates it.
    pub async fn toggle(&self, id: &str) -> Result<TrainingProtocol> {
        {
            let mut protocols = self.protocols.write().await;
            let protocol = protocols
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| AppError::not_found(format!("Protocol {}", id)))?;
            if protocol.is_active {
                protocol.is_active = false;
                return Ok(protocol.clone());
            }
        }
        self.activate(id).await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let mut protocols = self.protocols.write().await;
        let before = protocols.len();
        protocols.retain(|p| p.id != id);
        if protocols.len() == before {
            return Err(AppError::not_found(format!("Protocol {}", id)));
        }
        Ok(())
    }
}

// ============================================================================
// Message Vault
// ============================================================================

/// Archive of messages the user chose to keep.
#[derive(Default)]
pub struct MessageVault {
    messages: RwLock<Vec<Message>>,
}

impl MessageVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when a message with the same id is already archived.
    pub async fn save(&self, message: Message) -> bool {
        let mut messages = self.messages.write().await;
        if messages.iter().any(|m| m.id == message.id) {
            return false;
        }
        messages.push(message);
        true
    }

    pub async fn list(&self) -> Vec<Message> {
        self.messages.read().await.clone()
    }

    pub async fn remove(&self, id: &str) -> Result<()> {
        let mut messages = self.messages.write().await;
        let before = messages.len();
        messages.retain(|m| m.id != id);
        if messages.len() == before {
            return Err(AppError::not_found(format!("Message {}", id)));
        }
        Ok(())
    }
}

// ============================================================================
// Media Validator
// ============================================================================

pub struct MediaValidator {
    max_size_mb: u64,
}

impl MediaValidator {
    pub fn new(max_size_mb: u64) -> Self {
        Self { max_size_mb }
    }

    /// Checks an attachment before it is forwarded to the backend: the
    /// payload must be base64, within the size limit, and its declared kind
    /// must agree with its MIME type. Images must also decode.
    pub fn validate(&self, media: &MediaAttachment) -> Result<()> {
        let data = STANDARD
            .decode(media.data.as_bytes())
            .map_err(|e| AppError::bad_request(format!("Media is not valid base64: {}", e)))?;

        if data.len() as u64 > self.max_size_mb * 1024 * 1024 {
            return Err(AppError::new(
                ErrorCode::PayloadTooLarge,
                format!("Media too large (max {}MB)", self.max_size_mb),
            ));
        }

        let mime = media.mime();
        if mime.kind() != Some(media.kind) {
            return Err(AppError::new(
                ErrorCode::UnsupportedMediaType,
                format!("MIME type {} does not match media type {}", mime, media.kind),
            ));
        }

        if media.is_image() {
            image::load_from_memory(&data)
                .map_err(|e| AppError::validation(format!("Invalid image: {}", e)))?;
        }

        Ok(())
    }
}

// ============================================================================
// HTTP Handlers
// ============================================================================

pub async fn list_protocols_handler(
    State(state): State<Arc<AppState>>,
) -> Json<Vec<TrainingProtocol>> {
    Json(state.protocols.list().await)
}

pub async fn create_protocol_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NewProtocol>,
) -> Result<(StatusCode, Json<TrainingProtocol>)> {
    let protocol = state.protocols.create(request).await?;
    Ok((StatusCode::CREATED, Json(protocol)))
}

pub async fn toggle_protocol_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TrainingProtocol>> {
    Ok(Json(state.protocols.toggle(&id).await?))
}

pub async fn delete_protocol_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.protocols.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_vault_handler(State(state): State<Arc<AppState>>) -> Json<Vec<Message>> {
    Json(state.vault.list().await)
}

pub async fn save_vault_handler(
    State(state): State<Arc<AppState>>,
    Json(message): Json<Message>,
) -> StatusCode {
    if state.vault.save(message).await {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    }
}

pub async fn delete_vault_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.vault.remove(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Tests
// ============================================================================
