//! Upload-facing job service.
//!
//! `upload` persists the job and hands it to the orchestrator without waiting
//! for processing. Everything else reads through the stores, scoped to the
//! requesting owner.

use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::{Job, ProgressUpdate, Question, VideoRef};

use super::job_store::{JobStore, StoreError};
use super::orchestrator::Orchestrator;
use super::question_store::QuestionStore;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Missing, or owned by someone else
    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A freshly uploaded job and the task processing it
pub struct UploadReceipt {
    pub job: Job,
    pub handle: JoinHandle<Option<Job>>,
}

pub struct VideoService {
    jobs: Arc<dyn JobStore>,
    questions: Arc<dyn QuestionStore>,
    orchestrator: Arc<Orchestrator>,
    default_language: String,
}

impl VideoService {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        questions: Arc<dyn QuestionStore>,
        orchestrator: Arc<Orchestrator>,
        default_language: impl Into<String>,
    ) -> Self {
        Self {
            jobs,
            questions,
            orchestrator,
            default_language: default_language.into(),
        }
    }

    /// Persist a new job and start processing it in the background
    #[instrument(skip(self, video), fields(video = %video.original_name))]
    pub async fn upload(
        &self,
        owner_id: &str,
        video: VideoRef,
        language: Option<&str>,
    ) -> Result<UploadReceipt, ServiceError> {
        let language = language
            .filter(|l| !l.trim().is_empty())
            .unwrap_or(&self.default_language);
        let job = Job::new(owner_id, video, language);
        self.jobs.create(&job).await?;

        info!(job_id = %job.id, size_bytes = job.video.size_bytes, "Video uploaded");

        let handle = self.orchestrator.spawn(job.id);
        Ok(UploadReceipt { job, handle })
    }

    /// Load a job, optionally requiring it to belong to `owner_id`
    pub async fn job(&self, job_id: Uuid, owner_id: Option<&str>) -> Result<Job, ServiceError> {
        match self.jobs.get(job_id).await? {
            Some(job) if owner_id.map_or(true, |o| o == job.owner_id) => Ok(job),
            _ => Err(ServiceError::JobNotFound(job_id)),
        }
    }

    /// Current status, progress and error of a job
    pub async fn status(
        &self,
        job_id: Uuid,
        owner_id: Option<&str>,
    ) -> Result<ProgressUpdate, ServiceError> {
        Ok(ProgressUpdate::from_job(&self.job(job_id, owner_id).await?))
    }

    /// An owner's jobs, newest first
    pub async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<Job>, ServiceError> {
        Ok(self.jobs.list_for_owner(owner_id).await?)
    }

    /// Questions generated for a job, ordered by segment
    pub async fn questions(
        &self,
        job_id: Uuid,
        owner_id: Option<&str>,
    ) -> Result<Vec<Question>, ServiceError> {
        let job = self.job(job_id, owner_id).await?;
        Ok(self.questions.find_by_job(job.id).await?)
    }

    /// Remove a job and its questions.
    ///
    /// The job goes first: once it is gone a pipeline still running for it
    /// can no longer complete, and clears any questions it stored itself.
    #[instrument(skip(self))]
    pub async fn delete(&self, job_id: Uuid, owner_id: &str) -> Result<(), ServiceError> {
        let job = self.job(job_id, Some(owner_id)).await?;

        if !self.jobs.delete(job.id).await? {
            return Err(ServiceError::JobNotFound(job_id));
        }
        let removed = self.questions.delete_by_job(job.id).await?;

        info!(questions = removed, "Job deleted");
        Ok(())
    }
}
