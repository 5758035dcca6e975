use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::InlineData;
use crate::types::{MediaKind, MimeType};

// ============================================================================
// Media
// ============================================================================

/// Media attached to a user turn: base64 payload plus its MIME type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaAttachment {
    pub data: String,
    pub mime_type: String,
    #[serde(rename = "type")]
    pub kind: MediaKind,
}

impl MediaAttachment {
    pub fn is_image(&self) -> bool {
        self.kind == MediaKind::Image
    }

    pub fn mime(&self) -> MimeType {
        MimeType::new(self.mime_type.clone())
    }

    pub fn to_inline(&self) -> InlineData {
        InlineData {
            mime_type: self.mime_type.clone(),
            data: self.data.clone(),
        }
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

// ============================================================================
// Grounding
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroundingSource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub uri: String,
}

// ============================================================================
// Turn Result
// ============================================================================

/// Uniform result of one turn, whatever path produced it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TurnResult {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_kind: Option<MediaKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_data: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grounding_sources: Vec<GroundingSource>,
    /// Set when another persona answered the turn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegated_to: Option<String>,
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Model,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: i64,
    pub agent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_data: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grounding_sources: Vec<GroundingSource>,
}

impl Message {
    fn base(role: MessageRole, agent_id: &str, content: String) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            role,
            content,
            timestamp: chrono::Utc::now().timestamp_millis(),
            agent_id: agent_id.to_string(),
            media_url: None,
            media_type: None,
            audio_data: None,
            grounding_sources: Vec::new(),
        }
    }

    pub fn user(agent_id: &str, text: &str, media: Option<&MediaAttachment>) -> Self {
        let mut msg = Self::base(MessageRole::User, agent_id, text.to_string());
        if let Some(media) = media {
            msg.media_url = Some(media.data_url());
            msg.media_type = Some(media.kind);
        }
        msg
    }

    pub fn model(agent_id: &str, result: &TurnResult) -> Self {
        let mut msg = Self::base(MessageRole::Model, agent_id, result.text.clone());
        msg.media_url = result.media_url.clone();
        msg.media_type = result.media_url.as_ref().and(result.media_kind);
        msg.audio_data = result.audio_data.clone();
        msg.grounding_sources = result.grounding_sources.clone();
        msg
    }

    /// Visible stand-in for a turn that failed.
    pub fn degraded(agent_id: &str, error: &str) -> Self {
        let trace = if error.is_empty() {
            "Unknown synaptic failure."
        } else {
            error
        };
        Self::base(
            MessageRole::Model,
            agent_id,
            format!(
                "**Neural Desync Detected.** \nError Trace: {}\nAttempting interface recalibration...",
                trace
            ),
        )
    }
}

// ============================================================================
// Training Protocols
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TrainingProtocol {
    pub id: String,
    pub name: String,
    pub rules: String,
    pub samples: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProtocol {
    pub name: String,
    #[serde(default)]
    pub rules: String,
    #[serde(default)]
    pub samples: String,
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub agents: usize,
    pub active_sessions: usize,
}

impl HealthStatus {
    pub fn healthy(agents: usize, active_sessions: usize) -> Self {
        Self {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            agents,
            active_sessions,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
