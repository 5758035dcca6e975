use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{
    BackendError, BackendResult, Capability, FetchedAsset, FunctionCall, FunctionDeclaration,
    GenerateRequest, GenerateResponse, GenerativeBackend, GroundingChunk, InlineData, JobStatus,
    Part, VideoJob, VideoRequest,
};
use crate::storage::AiConfig;
use crate::types::Voice;

const API_KEY_HEADER: &str = "x-goog-api-key";

// ============================================================================
// Gemini REST Client
// ============================================================================

#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    speech_model: String,
}

impl GeminiClient {
    pub fn new(config: &AiConfig) -> BackendResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("neosphere-agent/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            speech_model: config.speech_model.clone(),
        })
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/v1beta/models/{}:{}", self.base_url, model, method)
    }

    async fn post_json<B: Serialize, R: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> BackendResult<R> {
        let response = self
            .http
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .await?;
        decode(response).await
    }

    async fn get_json<R: DeserializeOwned>(&self, url: &str) -> BackendResult<R> {
        let response = self
            .http
            .get(url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;
        decode(response).await
    }
}

async fn decode<R: DeserializeOwned>(response: reqwest::Response) -> BackendResult<R> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(api_error(status.as_u16(), &body));
    }
    serde_json::from_str(&body).map_err(|e| BackendError::Decode(e.to_string()))
}

fn api_error(status: u16, body: &str) -> BackendError {
    let message = serde_json::from_str::<WireErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| format!("HTTP {}: {}", status, body.trim()));
    BackendError::api(status, message)
}

#[async_trait]
impl GenerativeBackend for GeminiClient {
    async fn generate(&self, request: GenerateRequest) -> BackendResult<GenerateResponse> {
        log::debug!(
            "generateContent model={} parts={} capabilities={}",
            request.model,
            request.parts.len(),
            request.capabilities.len()
        );
        let url = self.model_url(&request.model, "generateContent");
        let body = WireRequest::from_request(&request);
        let response: WireResponse = self.post_json(&url, &body).await?;
        Ok(response.into_generate_response())
    }

    async fn generate_speech(&self, text: &str, voice: Voice) -> BackendResult<Option<String>> {
        let url = self.model_url(&self.speech_model, "generateContent");
        let body = WireRequest {
            contents: vec![WireContent::user(vec![WirePart::text(text)])],
            tools: Vec::new(),
            tool_config: None,
            generation_config: Some(WireGenerationConfig {
                response_modalities: Some(vec!["AUDIO"]),
                speech_config: Some(json!({
                    "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": voice.to_string() } }
                })),
                ..Default::default()
            }),
        };
        let response: WireResponse = self.post_json(&url, &body).await?;
        Ok(response
            .into_generate_response()
            .media
            .into_iter()
            .next()
            .map(|m| m.data))
    }

    async fn generate_video(&self, request: VideoRequest) -> BackendResult<VideoJob> {
        let url = self.model_url(&request.model, "predictLongRunning");
        let mut instance = json!({ "prompt": request.prompt });
        if let Some(seed) = &request.seed_image {
            instance["image"] = json!({
                "bytesBase64Encoded": seed.data,
                "mimeType": seed.mime_type,
            });
        }
        let body = json!({
            "instances": [instance],
            "parameters": {
                "aspectRatio": request.aspect_ratio.to_string(),
                "resolution": "720p",
            }
        });
        let operation: WireOperation = self.post_json(&url, &body).await?;
        let name = operation.name.clone();
        Ok(VideoJob {
            name,
            status: operation_status(operation)?,
        })
    }

    async fn poll_job(&self, job: &VideoJob) -> BackendResult<JobStatus> {
        let url = format!("{}/v1beta/{}", self.base_url, job.name);
        let operation: WireOperation = self.get_json(&url).await?;
        operation_status(operation)
    }

    async fn fetch_asset(&self, uri: &str) -> BackendResult<FetchedAsset> {
        let response = self
            .http
            .get(uri)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), &body));
        }
        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let bytes = response.bytes().await?;
        Ok(FetchedAsset { mime_type, bytes })
    }
}

// ============================================================================
// Wire Types: generateContent
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest {
    contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_config: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<WireGenerationConfig>,
}

#[derive(Debug, Serialize)]
struct WireContent {
    role: &'static str,
    parts: Vec<WirePart>,
}

impl WireContent {
    fn user(parts: Vec<WirePart>) -> Self {
        Self { role: "user", parts }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

impl WirePart {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_config: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<&'static str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speech_config: Option<serde_json::Value>,
}

impl WireRequest {
    fn from_request(request: &GenerateRequest) -> Self {
        let parts = request
            .parts
            .iter()
            .map(|p| match p {
                Part::Text(t) => WirePart::text(t.clone()),
                Part::Inline(d) => WirePart {
                    text: None,
                    inline_data: Some(d.clone()),
                },
            })
            .collect();

        let tools = request.capabilities.iter().map(capability_json).collect();

        let tool_config = request.location.map(|loc| {
            json!({
                "retrievalConfig": {
                    "latLng": { "latitude": loc.latitude, "longitude": loc.longitude }
                }
            })
        });

        let mut generation = WireGenerationConfig::default();
        if let Some(budget) = request.thinking_budget {
            generation.thinking_config = Some(json!({ "thinkingBudget": budget }));
        }
        if let Some(image) = request.image {
            let mut cfg = json!({ "aspectRatio": image.aspect_ratio.to_string() });
            if let Some(size) = image.size {
                cfg["imageSize"] = json!(size.to_string());
            }
            generation.image_config = Some(cfg);
        }
        let has_generation = generation.thinking_config.is_some() || generation.image_config.is_some();

        Self {
            contents: vec![WireContent::user(parts)],
            tools,
            tool_config,
            generation_config: has_generation.then_some(generation),
        }
    }
}

fn capability_json(capability: &Capability) -> serde_json::Value {
    match capability {
        Capability::Function(decl) => json!({ "functionDeclarations": [function_json(decl)] }),
        Capability::SearchGrounding => json!({ "googleSearch": {} }),
        Capability::LocationGrounding => json!({ "googleMaps": {} }),
    }
}

fn function_json(decl: &FunctionDeclaration) -> serde_json::Value {
    json!({
        "name": decl.name,
        "description": decl.description,
        "parameters": {
            "type": "OBJECT",
            "properties": {
                "agentId": {
                    "type": "STRING",
                    "description": "The unique identifier of the agent to delegate the task to.",
                    "enum": decl.agent_ids,
                },
                "taskDescription": {
                    "type": "STRING",
                    "description": "A clear and concise description of the task for the sub-agent to perform, based on the user's original request.",
                }
            },
            "required": ["agentId", "taskDescription"]
        }
    })
}

/// Done flag and first generated sample of a long-running operation.
fn operation_status(operation: WireOperation) -> BackendResult<JobStatus> {
    if let Some(err) = operation.error {
        return Err(BackendError::api(err.code.unwrap_or(500), err.message));
    }
    let asset_uri = operation
        .response
        .and_then(|r| r.generate_video_response)
        .and_then(|r| r.generated_samples.into_iter().next())
        .and_then(|s| s.video)
        .and_then(|v| v.uri);
    Ok(JobStatus {
        done: operation.done,
        asset_uri,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCandidate {
    content: Option<WireCandidateContent>,
    grounding_metadata: Option<WireGroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct WireCandidateContent {
    #[serde(default)]
    parts: Vec<WireResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponsePart {
    text: Option<String>,
    inline_data: Option<InlineData>,
    function_call: Option<WireFunctionCall>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireGroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<WireGroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct WireGroundingChunk {
    web: Option<WireSource>,
    maps: Option<WireSource>,
}

#[derive(Debug, Deserialize)]
struct WireSource {
    title: Option<String>,
    uri: Option<String>,
}

impl WireResponse {
    /// Only the first candidate is considered.
    fn into_generate_response(self) -> GenerateResponse {
        let Some(candidate) = self.candidates.into_iter().next() else {
            return GenerateResponse::default();
        };

        let mut texts = Vec::new();
        let mut media = Vec::new();
        let mut function_calls = Vec::new();
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(text) = part.text.filter(|_| !part.thought) {
                texts.push(text);
            }
            if let Some(data) = part.inline_data {
                media.push(data);
            }
            if let Some(call) = part.function_call {
                function_calls.push(FunctionCall {
                    name: call.name,
                    args: call.args,
                });
            }
        }

        let grounding = candidate
            .grounding_metadata
            .map(|m| m.grounding_chunks)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|chunk| match (chunk.web, chunk.maps) {
                (Some(w), _) => Some(GroundingChunk::Web {
                    title: w.title,
                    uri: w.uri,
                }),
                (None, Some(m)) => Some(GroundingChunk::Maps {
                    title: m.title,
                    uri: m.uri,
                }),
                (None, None) => None,
            })
            .collect();

        GenerateResponse {
            text: (!texts.is_empty()).then(|| texts.concat()),
            media,
            function_calls,
            grounding,
        }
    }
}

// ============================================================================
// Wire Types: long-running operations and errors
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireOperation {
    name: String,
    #[serde(default)]
    done: bool,
    response: Option<WireOperationResponse>,
    error: Option<WireError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireOperationResponse {
    generate_video_response: Option<WireVideoResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireVideoResponse {
    #[serde(default)]
    generated_samples: Vec<WireVideoSample>,
}

#[derive(Debug, Deserialize)]
struct WireVideoSample {
    video: Option<WireVideo>,
}

#[derive(Debug, Deserialize)]
struct WireVideo {
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireErrorEnvelope {
    error: WireError,
}

#[derive(Debug, Deserialize)]
struct WireError {
    code: Option<u16>,
    message: String,
}

// ============================================================================
// Tests
// ============================================================================
