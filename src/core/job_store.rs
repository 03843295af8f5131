//! Job persistence.
//!
//! The job store is the single mutation point for job state. Every update is
//! validated against the state machine and applied atomically; readers
//! always go through the store rather than any in-memory copy held by the
//! orchestrator.
//!
//! Two implementations:
//! - [`MemoryJobStore`]: a lock-guarded map, for tests and embedding
//! - [`FileJobStore`]: append-only JSONL log, state derived by replay and
//!   kept in an in-memory view that only reads newly appended records

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::warn;
use uuid::Uuid;

use super::jsonl::{LockedLog, LogView};
use crate::domain::{Job, JobStatus, JobUpdate, TransitionError};

/// Errors from the job and question stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Job not found: {0}")]
    NotFound(Uuid),

    #[error("Job already exists: {0}")]
    AlreadyExists(Uuid),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store task failed: {0}")]
    Task(String),
}

impl StoreError {
    /// Whether retrying the same write could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Task(_))
    }
}

/// Persistent job storage
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job; it must be `Uploaded` at progress 0
    async fn create(&self, job: &Job) -> Result<(), StoreError>;

    /// Get a job by ID
    async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError>;

    /// Validate and apply an update atomically, returning the new state
    async fn update(&self, id: Uuid, update: &JobUpdate) -> Result<Job, StoreError>;

    /// Jobs owned by `owner_id`, newest first
    async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<Job>, StoreError>;

    /// Remove a job; returns false if it did not exist
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;
}

fn check_initial(job: &Job) -> Result<(), StoreError> {
    if job.status != JobStatus::Uploaded || job.progress != 0 || job.error.is_some() {
        return Err(TransitionError::Invariant(format!(
            "new jobs must start {} at progress 0, got {} at {}",
            JobStatus::Uploaded,
            job.status,
            job.progress
        ))
        .into());
    }
    Ok(())
}

fn newest_first(mut jobs: Vec<Job>) -> Vec<Job> {
    jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    jobs
}

// ============================================================================
// In-memory store
// ============================================================================

/// Job store backed by a lock-guarded map
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<Uuid, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: &Job) -> Result<(), StoreError> {
        check_initial(job)?;
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::AlreadyExists(job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn update(&self, id: Uuid, update: &JobUpdate) -> Result<Job, StoreError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        job.apply_update(update)?;
        Ok(job.clone())
    }

    async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<Job>, StoreError> {
        let jobs = self.jobs.read().await;
        Ok(newest_first(
            jobs.values()
                .filter(|j| j.owner_id == owner_id)
                .cloned()
                .collect(),
        ))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.jobs.write().await.remove(&id).is_some())
    }
}

// ============================================================================
// JSONL store
// ============================================================================

/// An entry in the job log (append-only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// When this record was written
    pub timestamp: DateTime<Utc>,

    pub job_id: Uuid,

    pub event_type: JobRecordType,

    /// Full job (for `created`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job: Option<Job>,

    /// Applied update (for `updated`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<JobUpdate>,
}

/// Types of job log records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobRecordType {
    Created,
    Updated,
    Deleted,
}

impl JobRecord {
    fn new(job_id: Uuid, event_type: JobRecordType) -> Self {
        Self {
            timestamp: Utc::now(),
            job_id,
            event_type,
            job: None,
            update: None,
        }
    }
}

type JobView = LogView<HashMap<Uuid, Job>>;

/// Job store persisted as an append-only JSONL log
pub struct FileJobStore {
    /// Path to the jobs JSONL file
    path: PathBuf,

    /// Serializes writers within this process
    write_guard: Mutex<()>,

    /// Jobs folded from the log so far
    view: Arc<std::sync::Mutex<JobView>>,
}

impl FileJobStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_guard: Mutex::new(()),
            view: Arc::new(std::sync::Mutex::new(JobView::default())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply a single record to the state
    fn apply_record(jobs: &mut HashMap<Uuid, Job>, record: JobRecord) {
        match record.event_type {
            JobRecordType::Created => {
                if let Some(job) = record.job {
                    jobs.insert(record.job_id, job);
                }
            }
            JobRecordType::Updated => {
                if let (Some(job), Some(update)) = (jobs.get_mut(&record.job_id), record.update) {
                    if let Err(e) = job.apply_update_at(&update, record.timestamp) {
                        warn!(job_id = %record.job_id, error = %e, "Ignoring invalid logged update");
                    }
                }
            }
            JobRecordType::Deleted => {
                jobs.remove(&record.job_id);
            }
        }
    }

    /// Run a blocking closure against the locked log and the job view
    async fn with_log<T, F>(&self, exclusive: bool, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut LockedLog, &mut JobView) -> Result<T, StoreError> + Send + 'static,
    {
        let path = self.path.clone();
        let view = Arc::clone(&self.view);
        tokio::task::spawn_blocking(move || {
            let mut log = if exclusive {
                LockedLog::exclusive(&path)?
            } else {
                LockedLog::shared(&path)?
            };
            let mut view = JobView::lock(&view);
            f(&mut log, &mut view)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    /// Append a record and fold it into the view
    fn commit(log: &mut LockedLog, view: &mut JobView, record: &JobRecord) -> Result<(), StoreError> {
        log.append(record)?;
        view.refresh(log, Self::apply_record)?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn create(&self, job: &Job) -> Result<(), StoreError> {
        check_initial(job)?;
        let _guard = self.write_guard.lock().await;

        let job = job.clone();
        self.with_log(true, move |log, view| {
            if view.refresh(log, Self::apply_record)?.contains_key(&job.id) {
                return Err(StoreError::AlreadyExists(job.id));
            }
            let mut record = JobRecord::new(job.id, JobRecordType::Created);
            record.job = Some(job);
            Self::commit(log, view, &record)
        })
        .await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        self.with_log(false, move |log, view| {
            Ok(view.refresh(log, Self::apply_record)?.get(&id).cloned())
        })
        .await
    }

    async fn update(&self, id: Uuid, update: &JobUpdate) -> Result<Job, StoreError> {
        let _guard = self.write_guard.lock().await;

        let update = update.clone();
        self.with_log(true, move |log, view| {
            let mut job = view
                .refresh(log, Self::apply_record)?
                .get(&id)
                .cloned()
                .ok_or(StoreError::NotFound(id))?;

            let mut record = JobRecord::new(id, JobRecordType::Updated);
            job.apply_update_at(&update, record.timestamp)?;
            record.update = Some(update);
            Self::commit(log, view, &record)?;

            Ok(job)
        })
        .await
    }

    async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<Job>, StoreError> {
        let owner_id = owner_id.to_string();
        self.with_log(false, move |log, view| {
            let jobs = view.refresh(log, Self::apply_record)?;
            Ok(newest_first(
                jobs.values()
                    .filter(|j| j.owner_id == owner_id)
                    .cloned()
                    .collect(),
            ))
        })
        .await
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let _guard = self.write_guard.lock().await;

        self.with_log(true, move |log, view| {
            if !view.refresh(log, Self::apply_record)?.contains_key(&id) {
                return Ok(false);
            }
            Self::commit(log, view, &JobRecord::new(id, JobRecordType::Deleted))?;
            Ok(true)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Segment, VideoRef};
    use tempfile::TempDir;

    fn test_job(owner: &str) -> Job {
        let video = VideoRef {
            path: PathBuf::from("/tmp/lecture.mp4"),
            original_name: "lecture.mp4".to_string(),
            size_bytes: 2048,
            mime_type: "video/mp4".to_string(),
        };
        Job::new(owner, video, "en")
    }

    fn create_test_store() -> (FileJobStore, TempDir) {
        let temp = TempDir::new().unwrap();
        let store = FileJobStore::new(temp.path().join("jobs.jsonl"));
        (store, temp)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (store, _temp) = create_test_store();
        let job = test_job("alice");

        store.create(&job).await.unwrap();

        let loaded = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(loaded, job);
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let (store, _temp) = create_test_store();
        let job = test_job("alice");

        store.create(&job).await.unwrap();
        assert!(matches!(
            store.create(&job).await,
            Err(StoreError::AlreadyExists(id)) if id == job.id
        ));
    }

    #[tokio::test]
    async fn test_create_requires_initial_state() {
        let store = MemoryJobStore::new();
        let mut job = test_job("alice");
        job.progress = 50;
        assert!(matches!(
            store.create(&job).await,
            Err(StoreError::Transition(_))
        ));
    }

    #[tokio::test]
    async fn test_updates_survive_replay() {
        let (store, temp) = create_test_store();
        let job = test_job("alice");
        store.create(&job).await.unwrap();

        store
            .update(job.id, &JobUpdate::advance(JobStatus::Transcribing, 10))
            .await
            .unwrap();
        let segments = vec![Segment {
            index: 0,
            start_time: 0.0,
            end_time: 12.0,
            text: "hello there".to_string(),
        }];
        store
            .update(
                job.id,
                &JobUpdate::advance(JobStatus::GeneratingQuestions, 60)
                    .with_transcript("hello there".to_string(), segments.clone()),
            )
            .await
            .unwrap();

        // A second handle on the same file sees the same state
        let reopened = FileJobStore::new(temp.path().join("jobs.jsonl"));
        let loaded = reopened.get(job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::GeneratingQuestions);
        assert_eq!(loaded.progress, 60);
        assert_eq!(loaded.segments, segments);
    }

    #[tokio::test]
    async fn test_updated_at_is_the_write_time() {
        let (store, temp) = create_test_store();
        let job = test_job("alice");
        store.create(&job).await.unwrap();

        let written = store
            .update(job.id, &JobUpdate::advance(JobStatus::Transcribing, 10))
            .await
            .unwrap();

        let first = store.get(job.id).await.unwrap().unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let second = store.get(job.id).await.unwrap().unwrap();
        let reopened = FileJobStore::new(temp.path().join("jobs.jsonl"))
            .get(job.id)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(first.updated_at, written.updated_at);
        assert_eq!(second.updated_at, written.updated_at);
        assert_eq!(reopened, written);
    }

    #[tokio::test]
    async fn test_view_follows_other_writers() {
        let (store, temp) = create_test_store();
        let job = test_job("alice");
        store.create(&job).await.unwrap();
        assert_eq!(store.list_for_owner("alice").await.unwrap().len(), 1);

        let other = FileJobStore::new(temp.path().join("jobs.jsonl"));
        other
            .update(job.id, &JobUpdate::advance(JobStatus::Transcribing, 10))
            .await
            .unwrap();
        other.create(&test_job("alice")).await.unwrap();

        assert_eq!(
            store.get(job.id).await.unwrap().unwrap().status,
            JobStatus::Transcribing
        );
        assert_eq!(store.list_for_owner("alice").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rejected_update_is_not_logged() {
        let (store, _temp) = create_test_store();
        let job = test_job("alice");
        store.create(&job).await.unwrap();
        store.update(job.id, &JobUpdate::fail("boom")).await.unwrap();

        let result = store
            .update(job.id, &JobUpdate::advance(JobStatus::Transcribing, 10))
            .await;
        assert!(matches!(
            result,
            Err(StoreError::Transition(TransitionError::InvalidTransition { .. }))
        ));

        let content = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_update_missing_job() {
        let store = MemoryJobStore::new();
        let id = Uuid::new_v4();
        assert!(matches!(
            store
                .update(id, &JobUpdate::advance(JobStatus::Transcribing, 10))
                .await,
            Err(StoreError::NotFound(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let (store, _temp) = create_test_store();
        let first = test_job("alice");
        let second = test_job("alice");
        let other = test_job("bob");
        for job in [&first, &second, &other] {
            store.create(job).await.unwrap();
        }

        let alice = store.list_for_owner("alice").await.unwrap();
        assert_eq!(alice.len(), 2);
        assert!(alice[0].created_at >= alice[1].created_at);

        assert!(store.delete(first.id).await.unwrap());
        assert!(!store.delete(first.id).await.unwrap());
        assert!(store.get(first.id).await.unwrap().is_none());
        assert_eq!(store.list_for_owner("alice").await.unwrap().len(), 1);
    }

    #[test]
    fn test_transient_errors() {
        let io = StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert!(io.is_transient());
        assert!(!StoreError::NotFound(Uuid::new_v4()).is_transient());
    }
}
