//! Job state and its transition rules.
//!
//! A Job tracks one uploaded video through the processing pipeline. Every
//! mutation after creation goes through [`Job::apply_update`], which enforces
//! the state machine and the record invariants.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A video processing job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier for this job
    pub id: Uuid,

    /// User that uploaded the video
    pub owner_id: String,

    /// Reference to the stored video file
    pub video: VideoRef,

    /// Current pipeline status
    pub status: JobStatus,

    /// Progress percentage (0-100)
    pub progress: u8,

    /// Failure reason, present only when status is `Failed`
    pub error: Option<String>,

    /// Language hint passed to the transcription and generation services
    pub language: String,

    /// Full transcript text (after transcription)
    pub transcript_text: Option<String>,

    /// Transcript segments (after segmentation)
    #[serde(default)]
    pub segments: Vec<Segment>,

    /// Segments whose question generation failed
    #[serde(default)]
    pub failed_segments: Vec<u32>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new job in the `Uploaded` state
    pub fn new(owner_id: impl Into<String>, video: VideoRef, language: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            video,
            status: JobStatus::Uploaded,
            progress: 0,
            error: None,
            language: language.into(),
            transcript_text: None,
            segments: Vec::new(),
            failed_segments: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the job reached a terminal state
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// Validate and apply an update.
    ///
    /// The update is rejected as a whole if the transition is not allowed or
    /// if the resulting record would break an invariant; on error the job is
    /// left untouched.
    pub fn apply_update(&mut self, update: &JobUpdate) -> Result<(), TransitionError> {
        self.apply_update_at(update, Utc::now())
    }

    /// [`Job::apply_update`] with an explicit modification time, so replaying
    /// a stored update reproduces the job exactly as it was written
    pub fn apply_update_at(
        &mut self,
        update: &JobUpdate,
        at: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        let from = self.status;
        let to = update.status;

        if !from.can_transition_to(to) {
            return Err(TransitionError::InvalidTransition { from, to });
        }

        match (&update.error, to) {
            (Some(msg), JobStatus::Failed) if !msg.trim().is_empty() => {}
            (_, JobStatus::Failed) => {
                return Err(TransitionError::Invariant(
                    "failed status requires a non-empty error message".to_string(),
                ));
            }
            (Some(_), _) => {
                return Err(TransitionError::Invariant(format!(
                    "error message is only allowed with failed status, got {}",
                    to
                )));
            }
            (None, _) => {}
        }

        let progress = update.progress.unwrap_or(self.progress);
        if progress > 100 {
            return Err(TransitionError::Invariant(format!(
                "progress {} is out of range",
                progress
            )));
        }
        if to == JobStatus::Completed && progress != 100 {
            return Err(TransitionError::Invariant(
                "completed status requires progress 100".to_string(),
            ));
        }

        if update.transcript.is_some() && to != JobStatus::GeneratingQuestions {
            return Err(TransitionError::Invariant(format!(
                "transcript can only be attached when entering {}, got {}",
                JobStatus::GeneratingQuestions,
                to
            )));
        }

        self.status = to;
        self.progress = progress;
        self.error = update.error.clone();
        if let Some(transcript) = &update.transcript {
            self.transcript_text = Some(transcript.text.clone());
            self.segments = transcript.segments.clone();
        }
        if let Some(failed) = &update.failed_segments {
            self.failed_segments = failed.clone();
        }
        self.updated_at = at;

        Ok(())
    }
}

/// Pipeline status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Persisted by the upload handler, not yet picked up
    Uploaded,

    /// Waiting on the transcription service
    Transcribing,

    /// Fanning out question generation across segments
    GeneratingQuestions,

    /// Finished successfully
    Completed,

    /// Finished with an error
    Failed,
}

impl JobStatus {
    /// `Completed` and `Failed` accept no further transitions
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// The next state on the success path
    pub fn successor(self) -> Option<Self> {
        match self {
            Self::Uploaded => Some(Self::Transcribing),
            Self::Transcribing => Some(Self::GeneratingQuestions),
            Self::GeneratingQuestions => Some(Self::Completed),
            Self::Completed | Self::Failed => None,
        }
    }

    /// Linear forward edges plus `Failed` from any non-terminal state
    pub fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == Self::Failed || self.successor() == Some(next)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Transcribing => "transcribing",
            Self::GeneratingQuestions => "generating_questions",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::Uploaded
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A fixed-duration window of transcript text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Position in emission order (0-based)
    pub index: u32,

    /// Window start in seconds, aligned to the window size
    pub start_time: f64,

    /// End of the last fragment in the window, in seconds
    pub end_time: f64,

    pub text: String,
}

/// A raw time-stamped transcript fragment as returned by the transcription
/// service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptFragment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl TranscriptFragment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }
}

/// Reference to an uploaded video on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRef {
    pub path: PathBuf,
    pub original_name: String,
    pub size_bytes: u64,
    pub mime_type: String,
}

impl VideoRef {
    /// Build a reference from a file on disk
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a file", path.display()),
            ));
        }

        Ok(Self {
            path: path.to_path_buf(),
            original_name: path
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string(),
            size_bytes: metadata.len(),
            mime_type: mime_for_path(path).to_string(),
        })
    }
}

/// Guess a MIME type from the file extension
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mov") => "video/quicktime",
        Some("mkv") => "video/x-matroska",
        Some("avi") => "video/x-msvideo",
        Some("m4a") => "audio/mp4",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        _ => "application/octet-stream",
    }
}

/// Transcript payload attached when entering `GeneratingQuestions`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptUpdate {
    pub text: String,
    pub segments: Vec<Segment>,
}

/// A field-scoped, atomic update to a job.
///
/// The state group (status, progress, error) is always written together; the
/// transcript group and failed segment list ride along when present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobUpdate {
    pub status: JobStatus,

    /// New progress, or `None` to keep the current value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<TranscriptUpdate>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_segments: Option<Vec<u32>>,
}

impl JobUpdate {
    /// Move forward to `status` with the given progress
    pub fn advance(status: JobStatus, progress: u8) -> Self {
        Self {
            status,
            progress: Some(progress),
            error: None,
            transcript: None,
            failed_segments: None,
        }
    }

    /// Fail the job, keeping its current progress
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            progress: None,
            error: Some(error.into()),
            transcript: None,
            failed_segments: None,
        }
    }

    pub fn with_transcript(mut self, text: String, segments: Vec<Segment>) -> Self {
        self.transcript = Some(TranscriptUpdate { text, segments });
        self
    }

    pub fn with_failed_segments(mut self, failed: Vec<u32>) -> Self {
        self.failed_segments = Some(failed);
        self
    }
}

/// Rejected job mutation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Invalid job transition: {from} → {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Job invariant violated: {0}")]
    Invariant(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_job() -> Job {
        let video = VideoRef {
            path: PathBuf::from("/tmp/lecture.mp4"),
            original_name: "lecture.mp4".to_string(),
            size_bytes: 1024,
            mime_type: "video/mp4".to_string(),
        };
        Job::new("user-1", video, "en")
    }

    #[test]
    fn test_new_job_is_uploaded() {
        let job = test_job();
        assert_eq!(job.status, JobStatus::Uploaded);
        assert_eq!(job.progress, 0);
        assert!(job.error.is_none());
        assert!(job.segments.is_empty());
        assert!(!job.is_finished());
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut job = test_job();
        job.apply_update(&JobUpdate::advance(JobStatus::Transcribing, 10))
            .unwrap();

        let segments = vec![Segment {
            index: 0,
            start_time: 0.0,
            end_time: 9.0,
            text: "a b".to_string(),
        }];
        job.apply_update(
            &JobUpdate::advance(JobStatus::GeneratingQuestions, 60)
                .with_transcript("a b".to_string(), segments.clone()),
        )
        .unwrap();
        assert_eq!(job.segments, segments);
        assert_eq!(job.transcript_text.as_deref(), Some("a b"));

        job.apply_update(&JobUpdate::advance(JobStatus::Completed, 100))
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.is_finished());
    }

    #[test]
    fn test_terminal_states_reject_transitions() {
        let mut job = test_job();
        job.apply_update(&JobUpdate::fail("boom")).unwrap();

        for next in [
            JobStatus::Uploaded,
            JobStatus::Transcribing,
            JobStatus::GeneratingQuestions,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert!(!JobStatus::Failed.can_transition_to(next));
            assert!(!JobStatus::Completed.can_transition_to(next));
        }

        let err = job
            .apply_update(&JobUpdate::advance(JobStatus::Transcribing, 10))
            .unwrap_err();
        assert_eq!(
            err,
            TransitionError::InvalidTransition {
                from: JobStatus::Failed,
                to: JobStatus::Transcribing,
            }
        );
        assert_eq!(job.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_no_skipping_or_backward_edges() {
        let mut job = test_job();
        assert!(job
            .apply_update(&JobUpdate::advance(JobStatus::Completed, 100))
            .is_err());

        job.apply_update(&JobUpdate::advance(JobStatus::Transcribing, 10))
            .unwrap();
        assert!(job
            .apply_update(&JobUpdate::advance(JobStatus::Uploaded, 0))
            .is_err());
        assert!(job
            .apply_update(&JobUpdate::advance(JobStatus::Transcribing, 20))
            .is_err());
    }

    #[test]
    fn test_failed_requires_error() {
        let mut job = test_job();
        let mut update = JobUpdate::fail("");
        assert!(job.apply_update(&update).is_err());

        update.error = None;
        assert!(job.apply_update(&update).is_err());
        assert_eq!(job.status, JobStatus::Uploaded);
    }

    #[test]
    fn test_error_only_with_failed() {
        let mut job = test_job();
        let mut update = JobUpdate::advance(JobStatus::Transcribing, 10);
        update.error = Some("not allowed".to_string());
        assert!(matches!(
            job.apply_update(&update),
            Err(TransitionError::Invariant(_))
        ));
    }

    #[test]
    fn test_completed_requires_full_progress() {
        let mut job = test_job();
        job.apply_update(&JobUpdate::advance(JobStatus::Transcribing, 10))
            .unwrap();
        job.apply_update(&JobUpdate::advance(JobStatus::GeneratingQuestions, 60))
            .unwrap();
        assert!(job
            .apply_update(&JobUpdate::advance(JobStatus::Completed, 90))
            .is_err());
        assert_eq!(job.status, JobStatus::GeneratingQuestions);
    }

    #[test]
    fn test_transcript_only_when_generating() {
        let mut job = test_job();
        let update = JobUpdate::advance(JobStatus::Transcribing, 10)
            .with_transcript("early".to_string(), Vec::new());
        assert!(job.apply_update(&update).is_err());
        assert!(job.transcript_text.is_none());
    }

    #[test]
    fn test_fail_keeps_progress() {
        let mut job = test_job();
        job.apply_update(&JobUpdate::advance(JobStatus::Transcribing, 10))
            .unwrap();
        job.apply_update(&JobUpdate::fail("transcription timed out"))
            .unwrap();
        assert_eq!(job.progress, 10);
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[test]
    fn test_update_time_is_taken_from_caller() {
        let mut job = test_job();
        let at = job.created_at + chrono::Duration::seconds(42);
        job.apply_update_at(&JobUpdate::advance(JobStatus::Transcribing, 10), at)
            .unwrap();
        assert_eq!(job.updated_at, at);

        let rejected = job.apply_update_at(&JobUpdate::advance(JobStatus::Uploaded, 0), Utc::now());
        assert!(rejected.is_err());
        assert_eq!(job.updated_at, at);
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&JobStatus::GeneratingQuestions).unwrap();
        assert_eq!(json, "\"generating_questions\"");
        assert_eq!(JobStatus::GeneratingQuestions.to_string(), "generating_questions");
    }

    #[test]
    fn test_mime_for_path() {
        assert_eq!(mime_for_path(Path::new("a.MP4")), "video/mp4");
        assert_eq!(mime_for_path(Path::new("a.mov")), "video/quicktime");
        assert_eq!(mime_for_path(Path::new("noext")), "application/octet-stream");
    }
}
