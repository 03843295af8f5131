//! Core processing logic.
//!
//! This module contains:
//! - Segmenter: Transcript fragments to fixed windows
//! - QuestionFanout: Concurrent per-segment generation
//! - JobStore / QuestionStore: Persistence (memory and JSONL)
//! - ListenerRegistry: Progress notifications
//! - Orchestrator: Drives a job through its state machine
//! - VideoService: Upload-facing facade

pub mod error;
pub mod fanout;
pub mod job_store;
mod jsonl;
pub mod notifier;
pub mod orchestrator;
pub mod question_store;
pub mod retry;
pub mod segmenter;
pub mod service;

// Re-export commonly used types
pub use error::PipelineError;
pub use fanout::{FanoutReport, QuestionFanout, SegmentOutcome};
pub use job_store::{FileJobStore, JobStore, MemoryJobStore, StoreError};
pub use notifier::{ListenerRegistry, ProgressNotifier};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use question_store::{FileQuestionStore, MemoryQuestionStore, QuestionStore};
pub use retry::RetryPolicy;
pub use segmenter::{segment, SegmentError};
pub use service::{ServiceError, UploadReceipt, VideoService};
