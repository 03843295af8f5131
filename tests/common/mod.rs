//! Fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use vidquiz::adapters::{GenerationRequest, QuestionGenerator, Transcriber, TranscriptionOutput};
use vidquiz::core::{
    JobStore, MemoryJobStore, MemoryQuestionStore, Orchestrator, OrchestratorConfig,
    ProgressNotifier, QuestionStore, RetryPolicy, StoreError,
};
use vidquiz::domain::{
    Difficulty, Job, JobStatus, JobUpdate, ProgressUpdate, Question, QuestionDraft, QuestionType,
    TranscriptFragment, VideoRef,
};

pub fn video() -> VideoRef {
    VideoRef {
        path: PathBuf::from("/tmp/lecture.mp4"),
        original_name: "lecture.mp4".to_string(),
        size_bytes: 4096,
        mime_type: "video/mp4".to_string(),
    }
}

pub fn fragment(start: f64, end: f64, text: &str) -> TranscriptFragment {
    TranscriptFragment::new(start, end, text)
}

/// Fragments spanning `n` five-minute windows
pub fn fragments_for_windows(n: u32) -> Vec<TranscriptFragment> {
    (0..n)
        .map(|i| fragment(i as f64 * 300.0 + 5.0, i as f64 * 300.0 + 20.0, "some lecture text"))
        .collect()
}

pub enum TranscriberBehavior {
    Fragments(Vec<TranscriptFragment>),
    Fail(String),
    Hang,
    Panic,
}

pub struct FakeTranscriber {
    pub behavior: TranscriberBehavior,
}

impl FakeTranscriber {
    pub fn returning(fragments: Vec<TranscriptFragment>) -> Self {
        Self {
            behavior: TranscriberBehavior::Fragments(fragments),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            behavior: TranscriberBehavior::Fail(message.to_string()),
        }
    }

    pub fn hanging() -> Self {
        Self {
            behavior: TranscriberBehavior::Hang,
        }
    }

    pub fn panicking() -> Self {
        Self {
            behavior: TranscriberBehavior::Panic,
        }
    }
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    fn name(&self) -> &str {
        "fake-transcriber"
    }

    async fn transcribe(&self, _video: &VideoRef, _language: &str) -> anyhow::Result<TranscriptionOutput> {
        match &self.behavior {
            TranscriberBehavior::Fragments(fragments) => Ok(TranscriptionOutput {
                text: fragments
                    .iter()
                    .map(|f| f.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" "),
                fragments: fragments.clone(),
            }),
            TranscriberBehavior::Fail(message) => anyhow::bail!("{}", message),
            TranscriberBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(TranscriptionOutput::default())
            }
            TranscriberBehavior::Panic => panic!("decoder crashed"),
        }
    }
}

/// Two valid drafts per segment, failing the listed indices
#[derive(Default)]
pub struct FakeGenerator {
    pub fail_indices: HashSet<u32>,
    pub fail_all: bool,
    pub panic_indices: HashSet<u32>,
    pub delay: Option<Duration>,
    pub calls: AtomicU32,
}

impl FakeGenerator {
    pub fn failing(indices: &[u32]) -> Self {
        Self {
            fail_indices: indices.iter().copied().collect(),
            ..Default::default()
        }
    }

    pub fn failing_all() -> Self {
        Self {
            fail_all: true,
            ..Default::default()
        }
    }

    pub fn panicking(indices: &[u32]) -> Self {
        Self {
            panic_indices: indices.iter().copied().collect(),
            ..Default::default()
        }
    }

    /// Answers every call after `delay`
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }
}

#[async_trait]
impl QuestionGenerator for FakeGenerator {
    fn name(&self) -> &str {
        "fake-generator"
    }

    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<Vec<QuestionDraft>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.panic_indices.contains(&request.segment_index) {
            panic!("model runtime crashed on segment {}", request.segment_index);
        }
        if self.fail_all || self.fail_indices.contains(&request.segment_index) {
            anyhow::bail!("generator unavailable for segment {}", request.segment_index);
        }

        Ok((0..2)
            .map(|n| QuestionDraft {
                question: format!("Q{} for segment {}", n, request.segment_index),
                options: vec!["A".to_string(), "B".to_string(), "C".to_string()],
                correct_answer: "B".to_string(),
                explanation: Some("Because".to_string()),
                difficulty: Difficulty::Medium,
                question_type: QuestionType::MultipleChoice,
            })
            .collect())
    }
}

/// Records every notification in order
#[derive(Default)]
pub struct RecordingNotifier {
    pub updates: Mutex<Vec<(String, ProgressUpdate)>>,
}

impl RecordingNotifier {
    pub fn snapshot(&self) -> Vec<(String, ProgressUpdate)> {
        self.updates.lock().unwrap().clone()
    }
}

impl ProgressNotifier for RecordingNotifier {
    fn notify(&self, owner_id: &str, update: ProgressUpdate) {
        self.updates
            .lock()
            .unwrap()
            .push((owner_id.to_string(), update));
    }
}

/// Memory store that records every persisted state and can fail the first
/// few FAILED writes with an I/O error
#[derive(Default)]
pub struct RecordingJobStore {
    pub inner: MemoryJobStore,
    pub history: Mutex<Vec<Job>>,
    pub failing_fail_writes: AtomicU32,
    pub panic_on_complete: bool,
}

impl RecordingJobStore {
    pub fn with_failing_fail_writes(n: u32) -> Self {
        Self {
            failing_fail_writes: AtomicU32::new(n),
            ..Default::default()
        }
    }

    /// Store that panics when asked to persist COMPLETED
    pub fn panicking_on_complete() -> Self {
        Self {
            panic_on_complete: true,
            ..Default::default()
        }
    }

    pub fn history(&self) -> Vec<Job> {
        self.history.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobStore for RecordingJobStore {
    async fn create(&self, job: &Job) -> Result<(), StoreError> {
        self.inner.create(job).await?;
        self.history.lock().unwrap().push(job.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        self.inner.get(id).await
    }

    async fn update(&self, id: Uuid, update: &JobUpdate) -> Result<Job, StoreError> {
        if self.panic_on_complete && update.status == JobStatus::Completed {
            panic!("store driver bug");
        }
        if update.status == JobStatus::Failed
            && self
                .failing_fail_writes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk unavailable",
            )));
        }

        let job = self.inner.update(id, update).await?;
        self.history.lock().unwrap().push(job.clone());
        Ok(job)
    }

    async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<Job>, StoreError> {
        self.inner.list_for_owner(owner_id).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        self.inner.delete(id).await
    }
}

/// Question store whose inserts always fail
pub struct BrokenQuestionStore;

#[async_trait]
impl QuestionStore for BrokenQuestionStore {
    async fn insert_batch(&self, _questions: &[Question]) -> Result<usize, StoreError> {
        Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "question log is read-only",
        )))
    }

    async fn find_by_job(&self, _job_id: Uuid) -> Result<Vec<Question>, StoreError> {
        Ok(Vec::new())
    }

    async fn delete_by_job(&self, _job_id: Uuid) -> Result<usize, StoreError> {
        Ok(0)
    }
}

pub fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        transcription_timeout: Duration::from_millis(200),
        generation_timeout: Duration::from_secs(5),
        failure_write_retry: RetryPolicy {
            max_attempts: 3,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            backoff_multiplier: 2.0,
        },
        ..OrchestratorConfig::default()
    }
}

/// Orchestrator wired to in-memory fakes
pub struct Harness {
    pub jobs: Arc<RecordingJobStore>,
    pub questions: Arc<MemoryQuestionStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub generator: Arc<FakeGenerator>,
    pub orchestrator: Arc<Orchestrator>,
}

impl Harness {
    pub fn new(transcriber: FakeTranscriber, generator: FakeGenerator) -> Self {
        Self::with_store(transcriber, generator, RecordingJobStore::default())
    }

    pub fn with_store(
        transcriber: FakeTranscriber,
        generator: FakeGenerator,
        store: RecordingJobStore,
    ) -> Self {
        let jobs = Arc::new(store);
        let questions = Arc::new(MemoryQuestionStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let generator = Arc::new(generator);

        let orchestrator = Arc::new(Orchestrator::new(
            jobs.clone(),
            questions.clone(),
            notifier.clone(),
            Arc::new(transcriber),
            generator.clone(),
            fast_config(),
        ));

        Self {
            jobs,
            questions,
            notifier,
            generator,
            orchestrator,
        }
    }

    /// Persist a fresh job for `owner`
    pub async fn upload(&self, owner: &str) -> Job {
        let job = Job::new(owner, video(), "en");
        self.jobs.create(&job).await.unwrap();
        job
    }
}
