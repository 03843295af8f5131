//! HTTP client for the AI service.
//!
//! Endpoints:
//! - `POST /transcribe` (multipart: `audio_file`, `language`)
//! - `POST /generate-questions` (JSON)
//! - `GET /health`

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

use super::{GenerationRequest, QuestionGenerator, Transcriber, TranscriptionOutput};
use crate::domain::{Difficulty, QuestionDraft, TranscriptFragment, VideoRef};

/// Timeout for the health check
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// AI service client
pub struct AiServiceClient {
    base_url: String,
    client: reqwest::Client,
}

/// Response from /transcribe
#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    text: String,
    #[serde(default)]
    segments: Vec<TranscriptFragment>,
}

/// Body for /generate-questions
#[derive(Debug, Serialize)]
struct GenerateQuestionsBody<'a> {
    text: &'a str,
    segment_index: u32,
    start_time: f64,
    end_time: f64,
    language: &'a str,
    difficulty: Difficulty,
    question_count: u32,
}

/// Response from /generate-questions
#[derive(Debug, Deserialize)]
struct GenerateQuestionsResponse {
    #[serde(default)]
    questions: Vec<QuestionDraft>,
}

impl AiServiceClient {
    /// Create a new client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Build endpoint URL
    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Check that the service is reachable and healthy
    pub async fn health_check(&self) -> Result<()> {
        let response = self
            .client
            .get(self.endpoint("health"))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .context("Failed to reach AI service")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("AI service health check failed ({})", status);
        }

        Ok(())
    }

    async fn error_for_status(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        anyhow::bail!("{} failed ({}): {}", what, status, text.trim())
    }
}

#[async_trait]
impl Transcriber for AiServiceClient {
    fn name(&self) -> &str {
        "ai-service"
    }

    async fn transcribe(&self, video: &VideoRef, language: &str) -> Result<TranscriptionOutput> {
        let file_bytes = tokio::fs::read(&video.path)
            .await
            .with_context(|| format!("Failed to read video file: {}", video.path.display()))?;

        let file_part = Part::bytes(file_bytes)
            .file_name(video.original_name.clone())
            .mime_str(&video.mime_type)?;

        let form = Form::new()
            .part("audio_file", file_part)
            .text("language", language.to_string());

        let response = self
            .client
            .post(self.endpoint("transcribe"))
            .multipart(form)
            .send()
            .await
            .context("Failed to send transcription request")?;

        let result: TranscribeResponse = Self::error_for_status(response, "Transcription")
            .await?
            .json()
            .await
            .context("Failed to parse transcription response")?;

        Ok(TranscriptionOutput {
            text: result.text,
            fragments: result.segments,
        })
    }
}

#[async_trait]
impl QuestionGenerator for AiServiceClient {
    fn name(&self) -> &str {
        "ai-service"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<QuestionDraft>> {
        let body = GenerateQuestionsBody {
            text: &request.text,
            segment_index: request.segment_index,
            start_time: request.start_time,
            end_time: request.end_time,
            language: &request.language,
            difficulty: Difficulty::Medium,
            question_count: request.question_count,
        };

        let response = self
            .client
            .post(self.endpoint("generate-questions"))
            .json(&body)
            .send()
            .await
            .with_context(|| {
                format!(
                    "Failed to send question generation request for segment {}",
                    request.segment_index
                )
            })?;

        let result: GenerateQuestionsResponse =
            Self::error_for_status(response, "Question generation")
                .await?
                .json()
                .await
                .context("Failed to parse question generation response")?;

        Ok(result.questions)
    }
}
