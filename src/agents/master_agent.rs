use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::agents::assembler;
use crate::agents::prompt::{self, DELEGATE_FUNCTION};
use crate::agents::registry::Agent;
use crate::agents::session::{TurnContext, TurnPhase};
use crate::agents::task_detector::{GenerationMode, TaskDetector};
use crate::agents::StreamEvent;
use crate::backend::{
    BackendResult, Capability, FunctionDeclaration, GenerateRequest, GenerateResponse,
    GenerativeBackend, ImageOptions,
};
use crate::error::{log_error, AppError, Result};
use crate::models::{MediaAttachment, Message, TrainingProtocol, TurnResult};
use crate::storage::{AiConfig, AppState};
use crate::types::{AspectRatio, ImageSize, LatLng, MediaKind, Voice};

const DELEGATE_DESCRIPTION: &str =
    "Delegates a specific task to a specialized sub-agent within the Neosphere ecosystem.";
const IMAGE_FALLBACK_TEXT: &str = "Neural visualization synthesized.";
const EDIT_FALLBACK_TEXT: &str = "Image re-synthesized as requested.";
const DELEGATED_FALLBACK_TEXT: &str = "Delegated task complete.";
const STANDARD_FALLBACK_TEXT: &str = "Interface stable. Neural uplink verified.";
const CHUNK_SIZE: usize = 20;

// ============================================================================
// REQUEST STRUCTURES
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroundingMode {
    #[default]
    None,
    Search,
    Location,
}

/// Per-turn switches as sent by the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TurnFlags {
    pub deep_thinking: bool,
    pub grounding: GroundingMode,
    pub location: Option<LatLng>,
    pub collaborator_ids: Vec<String>,
    pub voice_enabled: bool,
    pub image_ratio: Option<AspectRatio>,
    pub image_size: Option<ImageSize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    pub agent_id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaAttachment>,
    #[serde(default)]
    pub options: TurnFlags,
}

/// Engine options with every id already resolved.
#[derive(Debug, Clone, Default)]
pub struct TurnOptions {
    pub deep_thinking: bool,
    pub grounding: GroundingMode,
    pub location: Option<LatLng>,
    pub protocol: Option<TrainingProtocol>,
    pub collaborators: Vec<Agent>,
    pub voice_enabled: bool,
    pub image: ImageOptions,
}

impl TurnOptions {
    /// Unknown collaborator ids are dropped.
    pub fn resolve(
        flags: &TurnFlags,
        roster: &[Agent],
        protocol: Option<TrainingProtocol>,
    ) -> Self {
        let collaborators = flags
            .collaborator_ids
            .iter()
            .filter_map(|id| roster.iter().find(|a| &a.id == id).cloned())
            .collect();
        Self {
            deep_thinking: flags.deep_thinking,
            grounding: flags.grounding,
            location: flags.location.filter(LatLng::is_valid),
            protocol,
            collaborators,
            voice_enabled: flags.voice_enabled,
            image: ImageOptions {
                aspect_ratio: flags.image_ratio.unwrap_or_default(),
                size: Some(flags.image_size.unwrap_or_default()),
            },
        }
    }
}

// ============================================================================
// ORCHESTRATION ACTION
// ============================================================================

/// What the primary call asked the engine to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestrationAction {
    Respond(GenerateResponse),
    Delegate {
        target: String,
        task: String,
        response: GenerateResponse,
    },
}

impl OrchestrationAction {
    /// Only the first function call is considered, and only if it is the
    /// delegation function with a string `agentId`.
    pub fn from_response(response: GenerateResponse) -> Self {
        let directive = response
            .function_calls
            .first()
            .filter(|call| call.name == DELEGATE_FUNCTION)
            .and_then(|call| {
                let target = call.args.get("agentId")?.as_str()?.to_string();
                let task = call
                    .args
                    .get("taskDescription")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                Some((target, task))
            });

        match directive {
            Some((target, task)) => Self::Delegate {
                target,
                task,
                response,
            },
            None => Self::Respond(response),
        }
    }
}

// ============================================================================
// MASTER AGENT
// ============================================================================

pub struct MasterAgent {
    backend: Arc<dyn GenerativeBackend>,
    detector: TaskDetector,
    config: AiConfig,
}

impl MasterAgent {
    pub fn new(backend: Arc<dyn GenerativeBackend>, config: AiConfig) -> Result<Self> {
        let detector = TaskDetector::new()
            .map_err(|e| AppError::internal(format!("Classifier build failed: {}", e)))?;
        Ok(Self {
            backend,
            detector,
            config,
        })
    }

    /// Validates and registers a turn, then runs it in the background and
    /// streams its progress. Fails up front if the session is busy.
    pub async fn handle_turn_stream(
        self: Arc<Self>,
        state: Arc<AppState>,
        session_id: String,
        request: TurnRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>> {
        if let Some(media) = &request.media {
            state.media_validator.validate(media)?;
        }
        let agent = state
            .registry
            .get_or_core(&request.agent_id)
            .await
            .ok_or_else(|| AppError::not_found(format!("Agent {}", request.agent_id)))?;
        let roster = state.registry.all().await;
        let options = TurnOptions::resolve(&request.options, &roster, state.protocols.active().await);

        state
            .sessions
            .begin_turn(&session_id, TurnPhase::AwaitingPrimary)
            .await?;
        state
            .sessions
            .append(
                &session_id,
                Message::user(&agent.id, &request.message, request.media.as_ref()),
            )
            .await;

        let (tx, rx) = mpsc::channel(100);

        tokio::spawn(async move {
            let ctx = TurnContext::new(state.sessions.clone(), session_id.clone()).with_events(tx);
            let request_id = ctx.request_id.clone();

            // Send start event
            ctx.emit(StreamEvent::Started {
                request_id: request_id.clone(),
                session_id: session_id.clone(),
                agent_id: agent.id.clone(),
                timestamp: chrono::Utc::now().timestamp(),
            })
            .await;

            let outcome = self
                .submit(
                    &ctx,
                    &agent,
                    &request.message,
                    request.media.as_ref(),
                    &options,
                    &roster,
                )
                .await
                .map_err(AppError::from);

            // Send final event
            match outcome {
                Ok(result) => {
                    let message = state
                        .sessions
                        .finish_turn(&session_id, &agent.id, Ok(&result))
                        .await;
                    for chunk in result.text.chars().collect::<Vec<_>>().chunks(CHUNK_SIZE) {
                        ctx.emit(StreamEvent::TextChunk {
                            request_id: request_id.clone(),
                            chunk: chunk.iter().collect(),
                        })
                        .await;
                    }
                    ctx.emit(StreamEvent::Completed {
                        request_id: request_id.clone(),
                        result,
                        message,
                        timestamp: chrono::Utc::now().timestamp(),
                    })
                    .await;
                }
                Err(e) => {
                    log_error(&e);
                    let message = state
                        .sessions
                        .finish_turn(&session_id, &agent.id, Err(&e))
                        .await;
                    ctx.emit(StreamEvent::Error {
                        request_id: request_id.clone(),
                        error: e.message.clone(),
                        message,
                        recoverable: true,
                    })
                    .await;
                }
            }
        });

        Ok(rx)
    }

    /// Runs one turn for `agent`. `roster` is the full registry, the acting
    /// agent included.
    pub async fn submit(
        &self,
        ctx: &TurnContext,
        agent: &Agent,
        text: &str,
        media: Option<&MediaAttachment>,
        options: &TurnOptions,
        roster: &[Agent],
    ) -> BackendResult<TurnResult> {
        ctx.enter(TurnPhase::AwaitingPrimary).await;
        let mode = self.detector.detect_task(text, media);
        log::info!("🧭 Turn for {} classified as {:?}", agent.id, mode);

        match (mode, media) {
            (GenerationMode::ImageGeneration, _) => match self.generate_image(text, options).await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_not_found() => return Err(e),
                Err(e) => log::warn!("⚠️  Image generation failed, continuing as conversation: {}", e),
            },
            (GenerationMode::ImageEdit, Some(media)) => match self.edit_image(text, media).await {
                Ok(result) => return Ok(result),
                Err(e) => log::warn!("⚠️  Image edit failed, continuing as conversation: {}", e),
            },
            _ => {}
        }

        self.converse(ctx, agent, text, media, options, roster).await
    }

    async fn generate_image(&self, text: &str, options: &TurnOptions) -> BackendResult<TurnResult> {
        let mut request = GenerateRequest::new(&self.config.image_model).text(text);
        request.image = Some(options.image);
        let response = self.backend.generate(request).await?;
        Ok(Self::image_result(&response, IMAGE_FALLBACK_TEXT))
    }

    async fn edit_image(&self, text: &str, media: &MediaAttachment) -> BackendResult<TurnResult> {
        let request = GenerateRequest::new(&self.config.image_edit_model)
            .inline(media.to_inline())
            .text(text);
        let response = self.backend.generate(request).await?;
        Ok(Self::image_result(&response, EDIT_FALLBACK_TEXT))
    }

    fn image_result(response: &GenerateResponse, fallback: &str) -> TurnResult {
        let media_url = assembler::media_url(response);
        TurnResult {
            text: assembler::text_or(response, fallback),
            media_kind: media_url.as_ref().map(|_| MediaKind::Image),
            media_url,
            ..Default::default()
        }
    }

    async fn converse(
        &self,
        ctx: &TurnContext,
        agent: &Agent,
        text: &str,
        media: Option<&MediaAttachment>,
        options: &TurnOptions,
        roster: &[Agent],
    ) -> BackendResult<TurnResult> {
        let delegates: Vec<Agent> = roster.iter().filter(|a| a.id != agent.id).cloned().collect();
        let instruction = prompt::compose(&prompt::fragments(
            agent,
            options.protocol.as_ref(),
            &options.collaborators,
            &delegates,
        ));

        let mut request = GenerateRequest::new(&self.config.chat_model);
        if let Some(media) = media {
            request = request.inline(media.to_inline());
        }
        request = request.text(prompt::with_question(&instruction, text));

        if !delegates.is_empty() {
            request.capabilities.push(Capability::Function(FunctionDeclaration {
                name: DELEGATE_FUNCTION.to_string(),
                description: DELEGATE_DESCRIPTION.to_string(),
                agent_ids: delegates.iter().map(|a| a.id.clone()).collect(),
            }));
        }
        match options.grounding {
            GroundingMode::None => {}
            GroundingMode::Search => request.capabilities.push(Capability::SearchGrounding),
            GroundingMode::Location => {
                request.model = self.config.location_model.clone();
                request.capabilities.push(Capability::LocationGrounding);
                request.location = options.location;
            }
        }
        if options.deep_thinking {
            request.thinking_budget = Some(self.config.thinking_budget);
        }

        let response = self.backend.generate(request).await?;
        let response = match OrchestrationAction::from_response(response) {
            OrchestrationAction::Delegate {
                target,
                task,
                response,
            } => match roster.iter().find(|a| a.id == target) {
                Some(target) => return self.delegate(ctx, agent, target, &task, options).await,
                None => {
                    log::warn!("⚠️  Delegation to unknown agent {} ignored", target);
                    response
                }
            },
            OrchestrationAction::Respond(response) => response,
        };

        let text = assembler::text_or(&response, STANDARD_FALLBACK_TEXT);
        let audio_data = self.speak(ctx, &text, agent.voice, options).await;
        Ok(TurnResult {
            text,
            audio_data,
            grounding_sources: assembler::grounding_sources(&response.grounding),
            ..Default::default()
        })
    }

    async fn delegate(
        &self,
        ctx: &TurnContext,
        origin: &Agent,
        target: &Agent,
        task: &str,
        options: &TurnOptions,
    ) -> BackendResult<TurnResult> {
        ctx.enter(TurnPhase::AwaitingDelegate).await;
        log::info!("🔀 {} delegated to {}", origin.id, target.id);

        let request = GenerateRequest::new(&self.config.chat_model)
            .text(prompt::delegated_task(target, origin, task));
        let response = self.backend.generate(request).await?;
        let delegated = assembler::text_or(&response, DELEGATED_FALLBACK_TEXT);
        let audio_data = self.speak(ctx, &delegated, target.voice, options).await;

        Ok(TurnResult {
            text: format!("[Uplink rerouted to **{}**]...\n\n{}", target.name, delegated),
            audio_data,
            delegated_to: Some(target.id.clone()),
            ..Default::default()
        })
    }

    /// Speech never fails a turn.
    async fn speak(
        &self,
        ctx: &TurnContext,
        text: &str,
        voice: Voice,
        options: &TurnOptions,
    ) -> Option<String> {
        if !options.voice_enabled {
            return None;
        }
        ctx.enter(TurnPhase::AwaitingSpeech).await;
        match self.backend.generate_speech(text, voice).await {
            Ok(audio) => audio,
            Err(e) => {
                log::warn!("⚠️  Speech synthesis failed: {}", e);
                None
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
