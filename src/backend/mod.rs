//! Generative backend seam.
//!
//! The orchestrator only talks to [`GenerativeBackend`]. [`gemini::GeminiClient`]
//! is the production implementation; tests use [`mock::ScriptedBackend`].

pub mod gemini;
#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{AspectRatio, ImageSize, LatLng, Voice};

pub use gemini::GeminiClient;

/// Substring the backend uses for missing models / entities.
pub const NOT_FOUND_MARKER: &str = "Requested entity was not found";

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("could not decode backend payload: {0}")]
    Decode(String),

    #[error("backend returned no {0}")]
    MissingPayload(&'static str),

    #[error("gave up waiting after {0:?}")]
    Timeout(std::time::Duration),
}

impl BackendError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Api { message, .. } => message.contains(NOT_FOUND_MARKER),
            _ => false,
        }
    }
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

// ============================================================================
// Request Shapes
// ============================================================================

/// Base64 payload tagged with its MIME type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    Inline(InlineData),
}

/// Schema of the delegation function offered to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    /// Only these values are acceptable for `agentId`.
    pub agent_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Capability {
    Function(FunctionDeclaration),
    SearchGrounding,
    LocationGrounding,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ImageOptions {
    pub aspect_ratio: AspectRatio,
    pub size: Option<ImageSize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub model: String,
    pub parts: Vec<Part>,
    pub capabilities: Vec<Capability>,
    pub location: Option<LatLng>,
    pub thinking_budget: Option<u32>,
    pub image: Option<ImageOptions>,
}

impl GenerateRequest {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            parts: Vec::new(),
            capabilities: Vec::new(),
            location: None,
            thinking_budget: None,
            image: None,
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.parts.push(Part::Text(text.into()));
        self
    }

    pub fn inline(mut self, data: InlineData) -> Self {
        self.parts.push(Part::Inline(data));
        self
    }

    /// Concatenation of all text parts, in order.
    pub fn prompt_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                Part::Inline(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.capabilities
            .iter()
            .any(|c| matches!(c, Capability::Function(f) if f.name == name))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoRequest {
    pub model: String,
    pub prompt: String,
    pub seed_image: Option<InlineData>,
    pub aspect_ratio: AspectRatio,
}

// ============================================================================
// Response Shapes
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub args: serde_json::Value,
}

/// One citation as delivered by the backend, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GroundingChunk {
    Web { title: Option<String>, uri: Option<String> },
    Maps { title: Option<String>, uri: Option<String> },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateResponse {
    pub text: Option<String>,
    pub media: Vec<InlineData>,
    pub function_calls: Vec<FunctionCall>,
    pub grounding: Vec<GroundingChunk>,
}

impl GenerateResponse {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoJob {
    pub name: String,
    /// State reported by the submit call itself.
    pub status: JobStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    pub done: bool,
    pub asset_uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchedAsset {
    pub mime_type: Option<String>,
    pub bytes: bytes::Bytes,
}

// ============================================================================
// Backend Trait
// ============================================================================

#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> BackendResult<GenerateResponse>;

    /// Base64 audio for `text`, or `None` when the model produced nothing.
    async fn generate_speech(&self, text: &str, voice: Voice) -> BackendResult<Option<String>>;

    async fn generate_video(&self, request: VideoRequest) -> BackendResult<VideoJob>;

    async fn poll_job(&self, job: &VideoJob) -> BackendResult<JobStatus>;

    async fn fetch_asset(&self, uri: &str) -> BackendResult<FetchedAsset>;
}
