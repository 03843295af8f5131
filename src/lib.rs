//! vidquiz - Lecture video to quiz question pipeline
//!
//! Takes an uploaded video through transcription, segmentation into
//! fixed-duration windows and per-segment question generation, reporting
//! progress to the uploader along the way.
//!
//! # Architecture
//!
//! - Every job is driven by one detached task
//! - Job state lives in a job store; every transition is one atomic write
//! - The file-backed stores are append-only JSONL logs, state derived by replay
//! - Stage failures never escape the pipeline, they mark the job failed
//!
//! # Modules
//!
//! - `adapters`: External AI service (transcription, question generation)
//! - `core`: Segmenter, fan-out, stores, notifier, orchestrator, service
//! - `domain`: Data structures (Job, Segment, Question, ProgressUpdate)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Process a video and follow progress
//! vidquiz process lecture.mp4 --owner alice
//!
//! # Check job status
//! vidquiz status <job-id>
//!
//! # Print the generated questions
//! vidquiz questions <job-id>
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use crate::core::{Orchestrator, VideoService};
pub use domain::{Job, JobStatus, ProgressUpdate, Question, Segment};
