//! Scripted backend for unit tests: replies are queued up front and every
//! request is recorded for later inspection.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{
    BackendError, BackendResult, FetchedAsset, GenerateRequest, GenerateResponse,
    GenerativeBackend, JobStatus, VideoJob, VideoRequest,
};
use crate::types::Voice;

#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<BackendResult<GenerateResponse>>>,
    speech: Mutex<VecDeque<BackendResult<Option<String>>>>,
    polls: Mutex<VecDeque<BackendResult<JobStatus>>>,
    asset: Mutex<Option<FetchedAsset>>,
    submitted: Mutex<Option<JobStatus>>,
    pub requests: Mutex<Vec<GenerateRequest>>,
    pub speech_requests: Mutex<Vec<(String, Voice)>>,
    pub video_requests: Mutex<Vec<VideoRequest>>,
    pub poll_count: Mutex<usize>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, response: GenerateResponse) -> Self {
        self.replies.lock().unwrap().push_back(Ok(response));
        self
    }

    pub fn fail(self, err: BackendError) -> Self {
        self.replies.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn speech(self, result: BackendResult<Option<String>>) -> Self {
        self.speech.lock().unwrap().push_back(result);
        self
    }

    pub fn poll(self, status: JobStatus) -> Self {
        self.polls.lock().unwrap().push_back(Ok(status));
        self
    }

    /// Status returned by the submit call; pending when unset.
    pub fn submitted(self, status: JobStatus) -> Self {
        *self.submitted.lock().unwrap() = Some(status);
        self
    }

    pub fn asset(self, asset: FetchedAsset) -> Self {
        *self.asset.lock().unwrap() = Some(asset);
        self
    }

    pub fn request(&self, index: usize) -> GenerateRequest {
        self.requests.lock().unwrap()[index].clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl GenerativeBackend for ScriptedBackend {
    async fn generate(&self, request: GenerateRequest) -> BackendResult<GenerateResponse> {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(BackendError::MissingPayload("scripted reply")))
    }

    async fn generate_speech(&self, text: &str, voice: Voice) -> BackendResult<Option<String>> {
        self.speech_requests
            .lock()
            .unwrap()
            .push((text.to_string(), voice));
        self.speech
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(Some("UENNLWF1ZGlv".to_string())))
    }

    async fn generate_video(&self, request: VideoRequest) -> BackendResult<VideoJob> {
        self.video_requests.lock().unwrap().push(request);
        let status = self.submitted.lock().unwrap().clone().unwrap_or(JobStatus {
            done: false,
            asset_uri: None,
        });
        Ok(VideoJob {
            name: "models/veo/operations/test".to_string(),
            status,
        })
    }

    async fn poll_job(&self, _job: &VideoJob) -> BackendResult<JobStatus> {
        *self.poll_count.lock().unwrap() += 1;
        self.polls.lock().unwrap().pop_front().unwrap_or(Ok(JobStatus {
            done: false,
            asset_uri: None,
        }))
    }

    async fn fetch_asset(&self, _uri: &str) -> BackendResult<FetchedAsset> {
        self.asset
            .lock()
            .unwrap()
            .clone()
            .ok_or(BackendError::MissingPayload("asset"))
    }
}
