//! Pipeline orchestrator.
//!
//! Drives one job through transcription, segmentation and question
//! generation. Every state change is a single job store write followed by a
//! best-effort notification to the job's owner. Nothing escapes [`run`]:
//! every stage failure becomes a FAILED transition. Collaborator calls run
//! on their own tasks, and [`spawn`] guards the whole run, so a panic also
//! ends in FAILED instead of leaving the job mid-pipeline.
//!
//! [`run`]: Orchestrator::run
//! [`spawn`]: Orchestrator::spawn

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{QuestionGenerator, Transcriber};
use crate::config::{AiServiceSettings, PipelineSettings};
use crate::domain::{Job, JobStatus, JobUpdate, ProgressUpdate};

use super::error::{task_failure, PipelineError};
use super::fanout::{QuestionFanout, SegmentOutcome};
use super::job_store::{JobStore, StoreError};
use super::notifier::ProgressNotifier;
use super::question_store::QuestionStore;
use super::retry::RetryPolicy;
use super::segmenter;

/// Progress reported on entering each stage
const PROGRESS_TRANSCRIBING: u8 = 10;
const PROGRESS_GENERATING: u8 = 60;
const PROGRESS_COMPLETED: u8 = 100;

/// Orchestrator tunables
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub transcription_timeout: Duration,
    pub generation_timeout: Duration,
    pub segment_window_seconds: f64,
    pub questions_per_segment: u32,
    pub max_concurrent_generations: usize,
    pub failure_write_retry: RetryPolicy,
}

impl OrchestratorConfig {
    pub fn from_settings(ai: &AiServiceSettings, pipeline: &PipelineSettings) -> Self {
        Self {
            transcription_timeout: ai.transcription_timeout,
            generation_timeout: ai.generation_timeout,
            segment_window_seconds: pipeline.segment_window_seconds,
            questions_per_segment: pipeline.questions_per_segment,
            max_concurrent_generations: pipeline.max_concurrent_generations,
            failure_write_retry: pipeline.failure_write_retry.clone(),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from_settings(&AiServiceSettings::default(), &PipelineSettings::default())
    }
}

/// Drives jobs through the processing pipeline
pub struct Orchestrator {
    jobs: Arc<dyn JobStore>,
    questions: Arc<dyn QuestionStore>,
    notifier: Arc<dyn ProgressNotifier>,
    transcriber: Arc<dyn Transcriber>,
    fanout: QuestionFanout,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        questions: Arc<dyn QuestionStore>,
        notifier: Arc<dyn ProgressNotifier>,
        transcriber: Arc<dyn Transcriber>,
        generator: Arc<dyn QuestionGenerator>,
        config: OrchestratorConfig,
    ) -> Self {
        let fanout = QuestionFanout::new(
            generator,
            config.max_concurrent_generations,
            config.questions_per_segment,
            config.generation_timeout,
        );
        Self {
            jobs,
            questions,
            notifier,
            transcriber,
            fanout,
            config,
        }
    }

    /// Run the pipeline for `job_id` on a detached task.
    ///
    /// If the run itself dies the job is marked failed from the outside.
    pub fn spawn(self: &Arc<Self>, job_id: Uuid) -> JoinHandle<Option<Job>> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            let worker = Arc::clone(&orchestrator);
            match tokio::spawn(async move { worker.run(job_id).await }).await {
                Ok(job) => job,
                Err(e) => {
                    let cause = PipelineError::Aborted(task_failure(e));
                    error!(job_id = %job_id, error = %cause, "Pipeline task died");
                    orchestrator.fail(job_id, &cause).await
                }
            }
        })
    }

    /// Run the pipeline for `job_id` to a terminal state.
    ///
    /// Returns the final job, or `None` when the job does not exist, is not
    /// waiting to be processed, or its final state could not be persisted.
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub async fn run(&self, job_id: Uuid) -> Option<Job> {
        let job = match self.jobs.get(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!("{}, nothing to process", PipelineError::JobNotFound(job_id));
                return None;
            }
            Err(e) => {
                error!(error = %e, "Failed to load job");
                return None;
            }
        };

        if job.status != JobStatus::Uploaded {
            warn!(status = %job.status, "Job is not awaiting processing, skipping");
            return None;
        }

        let started = Instant::now();
        info!(owner_id = %job.owner_id, video = %job.video.original_name, "Starting job");

        match self.execute(job).await {
            Ok(job) => {
                info!(
                    duration_ms = started.elapsed().as_millis() as u64,
                    failed_segments = job.failed_segments.len(),
                    "Job completed"
                );
                Some(job)
            }
            Err(PipelineError::JobNotFound(_)) => {
                warn!("Job was deleted while processing, stopping");
                None
            }
            Err(e) => {
                error!(error = %e, "Job failed");
                self.fail(job_id, &e).await
            }
        }
    }

    /// The success path; any error is turned into FAILED by the caller
    async fn execute(&self, job: Job) -> Result<Job, PipelineError> {
        let job = self
            .transition(
                job.id,
                JobUpdate::advance(JobStatus::Transcribing, PROGRESS_TRANSCRIBING),
            )
            .await?;

        let timeout = self.config.transcription_timeout;
        let transcriber = Arc::clone(&self.transcriber);
        let (video, language) = (job.video.clone(), job.language.clone());
        let mut call = tokio::spawn(async move { transcriber.transcribe(&video, &language).await });

        let output = match tokio::time::timeout(timeout, &mut call).await {
            Ok(Ok(Ok(output))) => output,
            Ok(Ok(Err(e))) => return Err(PipelineError::TranscriptionFailure(format!("{:#}", e))),
            Ok(Err(e)) => return Err(PipelineError::TranscriptionFailure(task_failure(e))),
            Err(_) => {
                call.abort();
                return Err(PipelineError::timeout("Transcription", timeout));
            }
        };

        let segments = segmenter::segment(&output.fragments, self.config.segment_window_seconds)?;
        info!(
            fragments = output.fragments.len(),
            segments = segments.len(),
            "Transcription finished"
        );

        let job = self
            .transition(
                job.id,
                JobUpdate::advance(JobStatus::GeneratingQuestions, PROGRESS_GENERATING)
                    .with_transcript(output.text, segments),
            )
            .await?;

        let report = self.fanout.generate(&job).await;
        if report.all_failed() {
            return Err(PipelineError::AllSegmentsFailed {
                count: report.outcomes.len(),
                first_error: report.first_error().unwrap_or_default().to_string(),
            });
        }

        let failed_segments = report.failed_indices();
        for outcome in &report.outcomes {
            if let SegmentOutcome::Failed { index, error } = outcome {
                warn!(
                    "{}",
                    PipelineError::SegmentGenerationFailure {
                        index: *index,
                        message: error.clone(),
                    }
                );
            }
        }

        if self.jobs.get(job.id).await?.is_none() {
            return Err(PipelineError::JobNotFound(job.id));
        }
        let questions = report.into_questions();
        let stored = self.questions.insert_batch(&questions).await?;
        info!(questions = stored, "Questions stored");

        let completed = self
            .transition(
                job.id,
                JobUpdate::advance(JobStatus::Completed, PROGRESS_COMPLETED)
                    .with_failed_segments(failed_segments),
            )
            .await;
        if let Err(PipelineError::JobNotFound(id)) = &completed {
            // Deleted between the insert and now; its questions must go too
            self.discard_questions(*id).await;
        }
        completed
    }

    async fn discard_questions(&self, job_id: Uuid) {
        match self.questions.delete_by_job(job_id).await {
            Ok(removed) => info!(removed, "Discarded questions of deleted job"),
            Err(e) => error!(error = %e, "Failed to discard questions of deleted job"),
        }
    }

    /// Persist an update, then tell the owner
    async fn transition(&self, job_id: Uuid, update: JobUpdate) -> Result<Job, PipelineError> {
        let job = self.jobs.update(job_id, &update).await.map_err(|e| match e {
            StoreError::NotFound(id) => PipelineError::JobNotFound(id),
            other => other.into(),
        })?;
        info!(status = %job.status, progress = job.progress, "Job transitioned");
        self.notifier
            .notify(&job.owner_id, ProgressUpdate::from_job(&job));
        Ok(job)
    }

    /// Record the failure, retrying transient store errors
    async fn fail(&self, job_id: Uuid, cause: &PipelineError) -> Option<Job> {
        let update = JobUpdate::fail(cause.to_string());
        let result = self
            .config
            .failure_write_retry
            .run(
                "mark job failed",
                || self.jobs.update(job_id, &update),
                StoreError::is_transient,
            )
            .await;

        match result {
            Ok(job) => {
                self.notifier
                    .notify(&job.owner_id, ProgressUpdate::from_job(&job));
                Some(job)
            }
            Err(e) => {
                error!(error = %e, "Failed to record job failure");
                None
            }
        }
    }
}
