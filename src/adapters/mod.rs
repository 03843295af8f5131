//! Adapter interfaces for external systems.
//!
//! Adapters provide a unified interface for the remote services the
//! pipeline depends on: speech-to-text transcription and per-segment
//! question generation.

pub mod ai_service;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::{QuestionDraft, TranscriptFragment, VideoRef};

// Re-export the AI service client
pub use ai_service::AiServiceClient;

/// Output from a transcription call
#[derive(Debug, Clone, Default)]
pub struct TranscriptionOutput {
    /// Full transcript text
    pub text: String,

    /// Time-stamped fragments in temporal order
    pub fragments: Vec<TranscriptFragment>,
}

/// Input for one question generation call
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub text: String,
    pub segment_index: u32,
    pub start_time: f64,
    pub end_time: f64,
    pub language: String,
    pub question_count: u32,
}

/// Speech-to-text backend
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Human-readable adapter name
    fn name(&self) -> &str;

    /// Transcribe a stored video
    async fn transcribe(&self, video: &VideoRef, language: &str) -> Result<TranscriptionOutput>;
}

/// Question generation backend
#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    /// Human-readable adapter name
    fn name(&self) -> &str;

    /// Generate question drafts for a single segment
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<QuestionDraft>>;
}
