//! # Image Job Client Module
//!
//! Client for the remote text-to-image job API. A generation is a three step
//! exchange: resolve the default model, submit a job, then poll the job status
//! until it reports `DONE` or the attempt budget runs out. Completed images
//! arrive base64-encoded and are decoded to JPEG files in the user's folder.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::{ImageApiConfig, PollConfig};
use crate::errors::GenerationError;

/// Status reported by the job API once a job has completed
pub const STATUS_DONE: &str = "DONE";

/// Produces base64-encoded images for a text prompt
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Run one complete generation job for `prompt`
    async fn generate(&self, prompt: &str) -> Result<Vec<String>, GenerationError>;
}

/// One status response of a generation job
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct JobStatus {
    pub status: String,
    #[serde(default)]
    pub images: Option<Vec<String>>,
}

impl JobStatus {
    pub fn is_done(&self) -> bool {
        self.status == STATUS_DONE
    }
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    uuid: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationParams<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    num_images: u32,
    width: u32,
    height: u32,
    generate_params: GenerateQuery<'a>,
}

#[derive(Debug, Serialize)]
struct GenerateQuery<'a> {
    query: &'a str,
}

/// HTTP client for the text-to-image job API
#[derive(Debug, Clone)]
pub struct ImageJobClient {
    http: reqwest::Client,
    config: ImageApiConfig,
}

impl ImageJobClient {
    /// Build a client whose requests each give up after `config.request_timeout`
    pub fn new(config: ImageApiConfig) -> Result<Self, GenerationError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { http, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/key/api/v1/{}",
            self.config.base_url.trim_end_matches('/'),
            path
        )
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("X-Key", format!("Key {}", self.config.api_key))
            .header("X-Secret", format!("Secret {}", self.config.secret_key))
    }

    /// Resolve the identifier of the default generation model
    ///
    /// The API lists the available models; the first entry is the default.
    pub async fn resolve_model(&self) -> Result<String, GenerationError> {
        let models: Vec<ModelEntry> = self
            .authorized(self.http.get(self.endpoint("models")))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let first = models
            .into_iter()
            .next()
            .ok_or_else(|| GenerationError::Transport("model list is empty".to_string()))?;

        let model_id = match first.id {
            serde_json::Value::String(id) => id,
            serde_json::Value::Number(id) => id.to_string(),
            other => {
                return Err(GenerationError::Transport(format!(
                    "unexpected model id: {other}"
                )))
            }
        };

        debug!(model_id = %model_id, "Resolved default generation model");
        Ok(model_id)
    }

    /// Submit a generation job and return its identifier
    pub async fn submit(
        &self,
        prompt: &str,
        model_id: &str,
        count: u32,
        width: u32,
        height: u32,
    ) -> Result<String, GenerationError> {
        let params = GenerationParams {
            kind: "GENERATE",
            num_images: count,
            width,
            height,
            generate_params: GenerateQuery { query: prompt },
        };
        let params_json = serde_json::to_string(&params)
            .map_err(|e| GenerationError::Transport(format!("cannot encode params: {e}")))?;

        let form = Form::new()
            .text("model_id", model_id.to_string())
            .part(
                "params",
                Part::text(params_json).mime_str("application/json")?,
            );

        let response: SubmitResponse = self
            .authorized(self.http.post(self.endpoint("text2image/run")))
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        info!(job_id = %response.uuid, "Generation job submitted");
        Ok(response.uuid)
    }

    /// Fetch the current status of a job
    pub async fn status(&self, job_id: &str) -> Result<JobStatus, GenerationError> {
        let status = self
            .authorized(
                self.http
                    .get(self.endpoint(&format!("text2image/status/{job_id}"))),
            )
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(status)
    }

    /// Poll a job until it is done or the configured budget is exhausted
    ///
    /// Returns `Ok(None)` when the job never reached `DONE`; callers decide
    /// how to report that.
    pub async fn poll(&self, job_id: &str) -> Result<Option<Vec<String>>, GenerationError> {
        poll_until_done(|| self.status(job_id), &self.config.poll).await
    }
}

#[async_trait]
impl ImageGenerator for ImageJobClient {
    async fn generate(&self, prompt: &str) -> Result<Vec<String>, GenerationError> {
        let model_id = self.resolve_model().await?;
        let job_id = self
            .submit(
                prompt,
                &model_id,
                self.config.images_per_request,
                self.config.width,
                self.config.height,
            )
            .await?;

        match self.poll(&job_id).await? {
            Some(images) => Ok(images),
            None => Err(GenerationError::Timeout(format!(
                "job {job_id} not done after {} attempts",
                self.config.poll.max_attempts
            ))),
        }
    }
}

/// Query a status source until it reports `DONE`
///
/// Makes at most `poll.max_attempts` calls with a fixed `poll.delay` between
/// them. The loop owns no shared state, so dropping the returned future is
/// enough to cancel it.
pub async fn poll_until_done<F, Fut>(
    mut fetch_status: F,
    poll: &PollConfig,
) -> Result<Option<Vec<String>>, GenerationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<JobStatus, GenerationError>>,
{
    let mut attempts = poll.max_attempts;
    while attempts > 0 {
        let status = fetch_status().await?;
        if status.is_done() {
            return Ok(Some(status.images.unwrap_or_default()));
        }

        attempts -= 1;
        debug!(status = %status.status, remaining = attempts, "Job not finished yet");
        if attempts > 0 {
            tokio::time::sleep(poll.delay).await;
        }
    }

    warn!(max_attempts = poll.max_attempts, "Poll budget exhausted");
    Ok(None)
}

/// Decode a base64 image payload and write it as a JPEG file
///
/// Missing parent directories are created. Bad base64 and undecodable image
/// data are reported as [`GenerationError::Decode`]; filesystem failures as
/// [`GenerationError::Storage`].
pub fn decode_and_store(payload: &str, destination: &Path) -> Result<(), GenerationError> {
    let bytes = BASE64
        .decode(payload.trim())
        .map_err(|e| GenerationError::Decode(format!("invalid base64: {e}")))?;

    let image = image::load_from_memory(&bytes)
        .map_err(|e| GenerationError::Decode(format!("unsupported image data: {e}")))?;

    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            GenerationError::Storage(format!("cannot create {}: {e}", parent.display()))
        })?;
    }

    // JPEG has no alpha channel
    image::DynamicImage::ImageRgb8(image.to_rgb8())
        .save_with_format(destination, image::ImageFormat::Jpeg)
        .map_err(|e| {
            GenerationError::Storage(format!("cannot write {}: {e}", destination.display()))
        })?;

    debug!(path = %destination.display(), "Stored generated image");
    Ok(())
}
