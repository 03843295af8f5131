//! Per-segment question generation.
//!
//! One generation call per segment, all in flight together but capped by a
//! process-wide semaphore shared across jobs. Each call runs on its own task,
//! so a failing or panicking segment never affects the others; the report
//! says which ones failed.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::error::task_failure;
use crate::adapters::{GenerationRequest, QuestionGenerator};
use crate::domain::{Job, Question, Segment};

/// Result of generating questions for one segment
#[derive(Debug)]
pub enum SegmentOutcome {
    Generated {
        index: u32,
        questions: Vec<Question>,
        /// Drafts rejected by validation
        dropped: usize,
    },
    Failed {
        index: u32,
        error: String,
    },
}

impl SegmentOutcome {
    pub fn index(&self) -> u32 {
        match self {
            Self::Generated { index, .. } | Self::Failed { index, .. } => *index,
        }
    }
}

/// Outcomes for every segment of a job, in segment order
#[derive(Debug, Default)]
pub struct FanoutReport {
    pub outcomes: Vec<SegmentOutcome>,
}

impl FanoutReport {
    pub fn failed_indices(&self) -> Vec<u32> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                SegmentOutcome::Failed { index, .. } => Some(*index),
                SegmentOutcome::Generated { .. } => None,
            })
            .collect()
    }

    /// True when there was at least one segment and none succeeded
    pub fn all_failed(&self) -> bool {
        !self.outcomes.is_empty()
            && self
                .outcomes
                .iter()
                .all(|o| matches!(o, SegmentOutcome::Failed { .. }))
    }

    pub fn first_error(&self) -> Option<&str> {
        self.outcomes.iter().find_map(|o| match o {
            SegmentOutcome::Failed { error, .. } => Some(error.as_str()),
            SegmentOutcome::Generated { .. } => None,
        })
    }

    /// All generated questions, in segment order
    pub fn into_questions(self) -> Vec<Question> {
        self.outcomes
            .into_iter()
            .flat_map(|o| match o {
                SegmentOutcome::Generated { questions, .. } => questions,
                SegmentOutcome::Failed { .. } => Vec::new(),
            })
            .collect()
    }
}

/// Fans question generation out across a job's segments
pub struct QuestionFanout {
    generator: Arc<dyn QuestionGenerator>,
    limiter: Arc<Semaphore>,
    question_count: u32,
    timeout: Duration,
}

impl QuestionFanout {
    pub fn new(
        generator: Arc<dyn QuestionGenerator>,
        max_concurrent: usize,
        question_count: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            generator,
            limiter: Arc::new(Semaphore::new(max_concurrent.max(1))),
            question_count,
            timeout,
        }
    }

    /// Generate questions for every segment of `job`
    pub async fn generate(&self, job: &Job) -> FanoutReport {
        let futures = job
            .segments
            .iter()
            .map(|segment| self.generate_segment(job, segment));

        FanoutReport {
            outcomes: join_all(futures).await,
        }
    }

    async fn generate_segment(&self, job: &Job, segment: &Segment) -> SegmentOutcome {
        let index = segment.index;
        let failed = |error: String| {
            warn!(job_id = %job.id, segment = index, error = %error, "Segment generation failed");
            SegmentOutcome::Failed { index, error }
        };

        let Ok(_permit) = self.limiter.acquire().await else {
            return failed("generation limiter closed".to_string());
        };

        let request = GenerationRequest {
            text: segment.text.clone(),
            segment_index: index,
            start_time: segment.start_time,
            end_time: segment.end_time,
            language: job.language.clone(),
            question_count: self.question_count,
        };

        let generator = Arc::clone(&self.generator);
        let mut call = tokio::spawn(async move { generator.generate(&request).await });

        let drafts = match tokio::time::timeout(self.timeout, &mut call).await {
            Ok(Ok(Ok(drafts))) => drafts,
            Ok(Ok(Err(e))) => return failed(format!("{:#}", e)),
            Ok(Err(e)) => return failed(format!("{} {}", self.generator.name(), task_failure(e))),
            Err(_) => {
                call.abort();
                return failed(format!(
                    "{} timed out after {:?}",
                    self.generator.name(),
                    self.timeout
                ));
            }
        };

        let mut questions = Vec::with_capacity(drafts.len());
        let mut dropped = 0;
        for draft in drafts {
            match draft.validate() {
                Ok(()) => questions.push(Question::from_draft(job, segment, draft)),
                Err(reason) => {
                    dropped += 1;
                    warn!(job_id = %job.id, segment = index, %reason, "Dropping invalid question");
                }
            }
        }

        debug!(
            job_id = %job.id,
            segment = index,
            generated = questions.len(),
            dropped,
            "Segment generation finished"
        );

        SegmentOutcome::Generated {
            index,
            questions,
            dropped,
        }
    }
}
