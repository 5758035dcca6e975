use std::sync::Arc;
use std::time::Duration;

use crate::agents::assembler;
use crate::agents::session::{TurnContext, TurnPhase};
use crate::backend::{BackendError, BackendResult, GenerativeBackend, VideoRequest};
use crate::models::{MediaAttachment, TurnResult};
use crate::storage::AiConfig;
use crate::types::{AspectRatio, MediaKind};

pub const VIDEO_COMPLETE_TEXT: &str =
    "Neural video synthesis complete. Asset rendered from temporal matrix.";

/// Long-running video synthesis: submit, poll until done, download.
pub struct VideoAgent {
    backend: Arc<dyn GenerativeBackend>,
    model: String,
    poll_interval: Duration,
    max_wait: Duration,
}

impl VideoAgent {
    pub fn new(backend: Arc<dyn GenerativeBackend>, config: &AiConfig) -> Self {
        Self {
            backend,
            model: config.video_model.clone(),
            poll_interval: config.video_poll_interval,
            max_wait: config.video_max_wait,
        }
    }

    pub fn with_timing(mut self, poll_interval: Duration, max_wait: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.max_wait = max_wait;
        self
    }

    pub async fn submit_video(
        &self,
        ctx: &TurnContext,
        prompt: &str,
        seed: Option<&MediaAttachment>,
        aspect_ratio: Option<AspectRatio>,
    ) -> BackendResult<TurnResult> {
        ctx.enter(TurnPhase::AwaitingMedia).await;

        let request = VideoRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            seed_image: seed.filter(|m| m.is_image()).map(MediaAttachment::to_inline),
            aspect_ratio: aspect_ratio
                .map(AspectRatio::for_video)
                .unwrap_or(AspectRatio::Landscape16x9),
        };
        log::info!(
            "🎬 Video job requested (model={}, ratio={})",
            request.model,
            request.aspect_ratio
        );
        let job = self.backend.generate_video(request).await?;

        let started = tokio::time::Instant::now();
        let mut status = job.status.clone();
        while !status.done {
            if started.elapsed() >= self.max_wait {
                log::warn!("⏱️  Video job {} still running after {:?}", job.name, self.max_wait);
                return Err(BackendError::Timeout(self.max_wait));
            }
            tokio::time::sleep(self.poll_interval).await;
            status = self.backend.poll_job(&job).await?;
            log::debug!("Video job {} done={} ({:?} elapsed)", job.name, status.done, started.elapsed());
        }

        let uri = status
            .asset_uri
            .ok_or(BackendError::MissingPayload("video asset uri"))?;
        let asset = self.backend.fetch_asset(&uri).await?;
        log::info!("✅ Video job {} complete ({} bytes)", job.name, asset.bytes.len());

        Ok(TurnResult {
            text: VIDEO_COMPLETE_TEXT.to_string(),
            media_url: Some(assembler::asset_data_url(&asset, &uri)),
            media_kind: Some(MediaKind::Video),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::session::SessionManager;
    use crate::backend::mock::ScriptedBackend;
    use crate::backend::{FetchedAsset, JobStatus};
    use bytes::Bytes;

    fn pending() -> JobStatus {
        JobStatus {
            done: false,
            asset_uri: None,
        }
    }

    fn agent(backend: Arc<ScriptedBackend>, max_wait: Duration) -> VideoAgent {
        VideoAgent::new(backend, &AiConfig::default()).with_timing(Duration::from_millis(1), max_wait)
    }

    #[tokio::test]
    async fn test_polls_until_done() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .poll(pending())
                .poll(pending())
                .poll(JobStatus {
                    done: true,
                    asset_uri: Some("https://files/clip.mp4?alt=media".to_string()),
                })
                .asset(FetchedAsset {
                    mime_type: Some("video/mp4".to_string()),
                    bytes: Bytes::from_static(b"mp4"),
                }),
        );
        let ctx = TurnContext::new(SessionManager::new(), "s1");
        let result = agent(backend.clone(), Duration::from_secs(5))
            .submit_video(&ctx, "a neon city", None, None)
            .await
            .unwrap();

        assert_eq!(*backend.poll_count.lock().unwrap(), 3);
        assert_eq!(result.text, VIDEO_COMPLETE_TEXT);
        assert_eq!(result.media_kind, Some(MediaKind::Video));
        assert_eq!(result.media_url.as_deref(), Some("data:video/mp4;base64,bXA0"));
        let requests = backend.video_requests.lock().unwrap();
        assert_eq!(requests[0].aspect_ratio, AspectRatio::Landscape16x9);
        assert!(requests[0].seed_image.is_none());
    }

    #[tokio::test]
    async fn test_finished_on_submit_skips_polling() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .submitted(JobStatus {
                    done: true,
                    asset_uri: Some("https://files/instant.mp4".to_string()),
                })
                .asset(FetchedAsset {
                    mime_type: None,
                    bytes: Bytes::from_static(b"mp4"),
                }),
        );
        let ctx = TurnContext::new(SessionManager::new(), "s1");
        // a poll interval this long would stall the test if the loop slept first
        let result = VideoAgent::new(backend.clone(), &AiConfig::default())
            .with_timing(Duration::from_secs(3600), Duration::from_secs(7200))
            .submit_video(&ctx, "instant", None, None)
            .await
            .unwrap();

        assert_eq!(*backend.poll_count.lock().unwrap(), 0);
        assert_eq!(result.media_url.as_deref(), Some("data:video/mp4;base64,bXA0"));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_wait() {
        let backend = Arc::new(ScriptedBackend::new());
        let ctx = TurnContext::new(SessionManager::new(), "s1");
        let err = agent(backend, Duration::from_millis(5))
            .submit_video(&ctx, "slow", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_seed_image_and_portrait_ratio() {
        let backend = Arc::new(ScriptedBackend::new().poll(JobStatus {
            done: true,
            asset_uri: None,
        }));
        let seed = MediaAttachment {
            data: "AAAA".to_string(),
            mime_type: "image/png".to_string(),
            kind: MediaKind::Image,
        };
        let ctx = TurnContext::new(SessionManager::new(), "s1");
        let err = agent(backend.clone(), Duration::from_secs(5))
            .submit_video(&ctx, "animate", Some(&seed), Some(AspectRatio::Portrait3x4))
            .await
            .unwrap_err();

        assert!(matches!(err, BackendError::MissingPayload(_)));
        let requests = backend.video_requests.lock().unwrap();
        assert_eq!(requests[0].aspect_ratio, AspectRatio::Portrait9x16);
        assert_eq!(requests[0].seed_image, Some(seed.to_inline()));
    }
}
