//! Gemini API adapter for all three stages.
//!
//! Uses the REST endpoints of the generative language API:
//! - `models/{planner}:generateContent` with a JSON response schema
//! - `models/{image}:predict` for the still image
//! - `models/{video}:predictLongRunning` plus operation refreshes for video
//!
//! The API key is read from the injected credential provider on every call
//! and sent in the `x-goog-api-key` header.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{
    AdapterError, ImageAdapter, JobHandle, JobStatus, PlanAdapter, PlaybackFetcher,
    VideoJobBackend,
};
use crate::config::{ImageSettings, ModelSettings, ResolvedConfig};
use crate::credentials::CredentialProvider;
use crate::domain::{ImageAsset, Plan, PlayableVideo, VideoLocator};

const API_KEY_HEADER: &str = "x-goog-api-key";

const PLANNER_INSTRUCTION: &str = "\
You direct a small creative studio. Break the user's brief into precise \
instructions for two departments: one produces a single still image, the \
other animates that image into a short clip.

Respond with a JSON object containing:
- visualPrompt: a detailed, photorealistic prompt for the image model \
covering lighting, composition, texture and style.
- motionPrompt: an instruction for the video model describing camera \
movement, subject movement and physics.
- reasoning: a short explanation of the creative direction.";

/// HTTP client for the Gemini family of models
#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    models: ModelSettings,
    image: ImageSettings,
    video_aspect_ratio: String,
    videos_dir: PathBuf,
    credentials: Arc<dyn CredentialProvider>,
}

impl GeminiClient {
    /// Create a client from resolved configuration
    pub fn new(config: &ResolvedConfig, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            models: config.models.clone(),
            image: config.image.clone(),
            video_aspect_ratio: config.video.aspect_ratio.clone(),
            videos_dir: config.videos_dir(),
            credentials,
        }
    }

    fn api_key(&self) -> Result<String, AdapterError> {
        self.credentials
            .api_key()
            .ok_or(AdapterError::MissingCredential)
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, model, method)
    }

    async fn post_json<T: DeserializeOwned>(&self, url: &str, body: &Value) -> Result<T, AdapterError> {
        let key = self.api_key()?;
        debug!(%url, "POST");

        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, key)
            .json(body)
            .send()
            .await?;

        Ok(check_status(response).await?.json().await?)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, AdapterError> {
        let key = self.api_key()?;
        debug!(%url, "GET");

        let response = self
            .client
            .get(url)
            .header(API_KEY_HEADER, key)
            .send()
            .await?;

        Ok(check_status(response).await?.json().await?)
    }
}

/// Map non-success statuses to adapter errors
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, AdapterError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&text)
        .ok()
        .and_then(|e| e.error.message)
        .unwrap_or(text);

    if status.as_u16() == 401 || status.as_u16() == 403 {
        Err(AdapterError::Unauthorized {
            status: status.as_u16(),
            message,
        })
    } else {
        Err(AdapterError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

// ============================================================================
// Planning
// ============================================================================

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    text: Option<String>,
}

/// Plan fields as returned by the model, any of which may be missing
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPlan {
    visual_prompt: Option<String>,
    motion_prompt: Option<String>,
    reasoning: Option<String>,
}

fn plan_request(brief: &str) -> Value {
    json!({
        "systemInstruction": { "parts": [{ "text": PLANNER_INSTRUCTION }] },
        "contents": [{ "role": "user", "parts": [{ "text": brief }] }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": {
                "type": "OBJECT",
                "properties": {
                    "visualPrompt": { "type": "STRING" },
                    "motionPrompt": { "type": "STRING" },
                    "reasoning": { "type": "STRING" }
                },
                "required": ["visualPrompt", "motionPrompt", "reasoning"]
            }
        }
    })
}

fn response_text(response: GenerateContentResponse) -> Option<String> {
    let text: String = response
        .candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .filter_map(|p| p.text)
        .collect();

    (!text.trim().is_empty()).then_some(text)
}

/// Parse the structured planner output
fn parse_plan(text: &str) -> Result<Plan, AdapterError> {
    let raw: RawPlan = serde_json::from_str(text.trim())
        .map_err(|e| AdapterError::MalformedResponse(format!("plan is not valid JSON: {}", e)))?;

    let visual = raw
        .visual_prompt
        .ok_or(AdapterError::IncompletePlan("visualPrompt"))?;
    let motion = raw
        .motion_prompt
        .ok_or(AdapterError::IncompletePlan("motionPrompt"))?;
    let reasoning = raw.reasoning.ok_or(AdapterError::IncompletePlan("reasoning"))?;

    Plan::try_new(visual, motion, reasoning).map_err(AdapterError::IncompletePlan)
}

#[async_trait]
impl PlanAdapter for GeminiClient {
    fn name(&self) -> &str {
        &self.models.planner
    }

    async fn generate_plan(&self, brief: &str) -> Result<Plan, AdapterError> {
        let url = self.model_url(&self.models.planner, "generateContent");
        let response: GenerateContentResponse = self.post_json(&url, &plan_request(brief)).await?;

        let text = response_text(response)
            .ok_or_else(|| AdapterError::MalformedResponse("planner returned no text".into()))?;
        parse_plan(&text)
    }
}

// ============================================================================
// Image
// ============================================================================

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<ImagePrediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImagePrediction {
    bytes_base64_encoded: Option<String>,
    mime_type: Option<String>,
}

fn image_request(prompt: &str, settings: &ImageSettings) -> Value {
    json!({
        "instances": [{ "prompt": prompt }],
        "parameters": {
            "sampleCount": 1,
            "aspectRatio": settings.aspect_ratio,
            "outputOptions": { "mimeType": settings.mime_type }
        }
    })
}

fn parse_image(response: PredictResponse, default_mime: &str) -> Result<ImageAsset, AdapterError> {
    let prediction = response
        .predictions
        .into_iter()
        .find(|p| p.bytes_base64_encoded.as_deref().is_some_and(|b| !b.is_empty()))
        .ok_or(AdapterError::NoImage)?;

    let mime = prediction
        .mime_type
        .unwrap_or_else(|| default_mime.to_string());
    let encoded = prediction.bytes_base64_encoded.unwrap_or_default();

    let image = ImageAsset::from_base64(&encoded, mime)?;
    if image.is_empty() {
        return Err(AdapterError::NoImage);
    }
    Ok(image)
}

#[async_trait]
impl ImageAdapter for GeminiClient {
    fn name(&self) -> &str {
        &self.models.image
    }

    async fn generate_image(&self, prompt: &str) -> Result<ImageAsset, AdapterError> {
        let url = self.model_url(&self.models.image, "predict");
        let response: PredictResponse = self
            .post_json(&url, &image_request(prompt, &self.image))
            .await?;

        parse_image(response, &self.image.mime_type)
    }
}

// ============================================================================
// Video job
// ============================================================================

#[derive(Debug, Deserialize)]
struct Operation {
    #[serde(default)]
    name: String,
    #[serde(default)]
    done: bool,
    error: Option<ErrorBody>,
    response: Option<OperationResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResponse {
    generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateVideoResponse {
    #[serde(default)]
    generated_samples: Vec<GeneratedSample>,
}

#[derive(Debug, Deserialize)]
struct GeneratedSample {
    video: Option<VideoRef>,
}

#[derive(Debug, Deserialize)]
struct VideoRef {
    uri: Option<String>,
}

fn video_request(image: &ImageAsset, prompt: &str, aspect_ratio: &str) -> Value {
    json!({
        "instances": [{
            "prompt": prompt,
            "image": {
                "bytesBase64Encoded": image.to_base64(),
                "mimeType": image.mime_type
            }
        }],
        "parameters": {
            "aspectRatio": aspect_ratio,
            "sampleCount": 1
        }
    })
}

/// Interpret an operation returned by a refresh
fn operation_status(operation: Operation) -> Result<JobStatus, AdapterError> {
    if let Some(error) = operation.error {
        return Err(AdapterError::JobFailed {
            code: error.code.unwrap_or_default(),
            message: error.message.unwrap_or_default(),
        });
    }

    if !operation.done {
        return Ok(JobStatus::Pending);
    }

    let locators = operation
        .response
        .and_then(|r| r.generate_video_response)
        .map(|r| r.generated_samples)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|s| s.video.and_then(|v| v.uri))
        .filter(|uri| !uri.is_empty())
        .map(VideoLocator::new)
        .collect();

    Ok(JobStatus::Done { locators })
}

#[async_trait]
impl VideoJobBackend for GeminiClient {
    fn name(&self) -> &str {
        &self.models.video
    }

    async fn submit(&self, image: &ImageAsset, prompt: &str) -> Result<JobHandle, AdapterError> {
        let url = self.model_url(&self.models.video, "predictLongRunning");
        let body = video_request(image, prompt, &self.video_aspect_ratio);
        let operation: Operation = self.post_json(&url, &body).await?;

        if let Some(error) = operation.error {
            return Err(AdapterError::JobFailed {
                code: error.code.unwrap_or_default(),
                message: error.message.unwrap_or_default(),
            });
        }
        if operation.name.is_empty() {
            return Err(AdapterError::MalformedResponse(
                "video job submitted without a name".into(),
            ));
        }

        debug!(job = %operation.name, "video job submitted");
        Ok(JobHandle::new(operation.name))
    }

    async fn refresh(&self, job: &JobHandle) -> Result<JobStatus, AdapterError> {
        let url = format!("{}/{}", self.base_url, job.name.trim_start_matches('/'));
        let operation: Operation = self.get_json(&url).await?;
        operation_status(operation)
    }
}

// ============================================================================
// Playback
// ============================================================================

#[async_trait]
impl PlaybackFetcher for GeminiClient {
    async fn fetch(&self, locator: &VideoLocator) -> Result<PlayableVideo, AdapterError> {
        let key = self.api_key()?;

        let response = self
            .client
            .get(locator.as_str())
            .header(API_KEY_HEADER, key)
            .send()
            .await?;
        let bytes = check_status(response).await?.bytes().await?;

        if bytes.is_empty() {
            return Err(AdapterError::MalformedResponse("video download was empty".into()));
        }

        let path = save_video(&self.videos_dir, &bytes)?;

        debug!(path = %path.display(), size = bytes.len(), "video saved");
        Ok(PlayableVideo::new(path, bytes.len() as u64))
    }
}

/// Write a downloaded clip into `dir`, keeping the file only once fully written
fn save_video(dir: &Path, bytes: &[u8]) -> Result<PathBuf, AdapterError> {
    std::fs::create_dir_all(dir)?;
    let mut file = tempfile::Builder::new()
        .prefix("take-")
        .suffix(".mp4")
        .tempfile_in(dir)?;

    file.write_all(bytes)?;
    file.flush()?;

    let (_, path) = file.keep().map_err(|e| e.error)?;
    Ok(path)
}
