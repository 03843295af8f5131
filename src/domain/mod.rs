//! Domain types for the vidquiz pipeline.
//!
//! This module contains the core data structures:
//! - Job: Processing state of one uploaded video
//! - Question: Quiz questions generated per segment
//! - ProgressUpdate: Notifications pushed to job owners

pub mod job;
pub mod progress;
pub mod question;

// Re-export commonly used types
pub use job::{
    mime_for_path, Job, JobStatus, JobUpdate, Segment, TranscriptFragment, TranscriptUpdate,
    TransitionError, VideoRef,
};
pub use progress::ProgressUpdate;
pub use question::{Difficulty, Question, QuestionDraft, QuestionType};
