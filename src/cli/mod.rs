//! Command-line interface for vidquiz.
//!
//! Provides commands for processing a video into quiz questions, checking
//! job status, listing jobs, reading and deleting generated questions, and
//! inspecting the AI service and configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::adapters::AiServiceClient;
use crate::config::{self, ResolvedConfig};
use crate::core::{
    FileJobStore, FileQuestionStore, ListenerRegistry, Orchestrator, OrchestratorConfig,
    VideoService,
};
use crate::domain::{Job, JobStatus, VideoRef};

/// vidquiz - Turn lecture videos into quiz questions
#[derive(Parser, Debug)]
#[command(name = "vidquiz")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upload a video and follow its processing until it finishes
    Process {
        /// Path to the video file
        video: PathBuf,

        /// Owner of the job
        #[arg(short, long, default_value_t = default_owner())]
        owner: String,

        /// Transcription language (defaults to the configured language)
        #[arg(short, long)]
        language: Option<String>,
    },

    /// Check the status of a job
    Status {
        /// Job ID (UUID)
        job_id: String,

        /// Only show the job if it belongs to this owner
        #[arg(short, long)]
        owner: Option<String>,
    },

    /// List an owner's jobs, newest first
    Jobs {
        #[arg(short, long, default_value_t = default_owner())]
        owner: String,
    },

    /// Show the questions generated for a job
    Questions {
        /// Job ID (UUID)
        job_id: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete a job and its questions
    Delete {
        /// Job ID (UUID)
        job_id: String,

        #[arg(short, long, default_value_t = default_owner())]
        owner: String,
    },

    /// Check that the AI service is reachable
    Health,

    /// Show resolved configuration (debug)
    Config,
}

fn default_owner() -> String {
    std::env::var("USER").unwrap_or_else(|_| "local".to_string())
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Process {
                video,
                owner,
                language,
            } => process_video(&video, &owner, language.as_deref()).await,
            Commands::Status { job_id, owner } => show_status(&job_id, owner.as_deref()).await,
            Commands::Jobs { owner } => list_jobs(&owner).await,
            Commands::Questions { job_id, json } => show_questions(&job_id, json).await,
            Commands::Delete { job_id, owner } => delete_job(&job_id, &owner).await,
            Commands::Health => check_health().await,
            Commands::Config => show_config(),
        }
    }
}

/// File-backed service plus the registry its orchestrator notifies
struct Runtime {
    service: VideoService,
    listeners: Arc<ListenerRegistry>,
}

fn build_runtime(cfg: &ResolvedConfig) -> Runtime {
    let jobs = Arc::new(FileJobStore::new(cfg.jobs_path()));
    let questions = Arc::new(FileQuestionStore::new(cfg.questions_path()));
    let listeners = Arc::new(ListenerRegistry::new());
    let client = Arc::new(AiServiceClient::new(cfg.ai_service.url.clone()));

    let orchestrator = Arc::new(Orchestrator::new(
        jobs.clone(),
        questions.clone(),
        listeners.clone(),
        client.clone(),
        client,
        OrchestratorConfig::from_settings(&cfg.ai_service, &cfg.pipeline),
    ));

    Runtime {
        service: VideoService::new(
            jobs,
            questions,
            orchestrator,
            cfg.pipeline.default_language.clone(),
        ),
        listeners,
    }
}

fn parse_job_id(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).with_context(|| format!("Invalid job ID: {}", s))
}

/// Upload a video and stream its progress
async fn process_video(path: &Path, owner: &str, language: Option<&str>) -> Result<()> {
    let cfg = config::config()?;
    let runtime = build_runtime(cfg);

    let video = VideoRef::from_path(path)
        .with_context(|| format!("Failed to read video: {}", path.display()))?;

    // Listen before uploading so no update is missed
    let mut updates = runtime.listeners.register(owner);
    let receipt = runtime.service.upload(owner, video, language).await?;
    let job_id = receipt.job.id;

    eprintln!("Uploaded {} as job {}", receipt.job.video.original_name, job_id);

    let printer = tokio::spawn(async move {
        while let Some(update) = updates.recv().await {
            if update.job_id == job_id {
                eprintln!("  [{:>3}%] {}", update.progress, update.status);
            }
        }
    });

    let finished = receipt.handle.await;

    // Dropping the sender lets the printer drain buffered updates and exit
    runtime.listeners.unregister(owner);
    let _ = printer.await;

    let job = finished
        .context("Processing task panicked")?
        .with_context(|| format!("Job {} did not reach a final state", job_id))?;

    match job.status {
        JobStatus::Completed => {
            let questions = runtime.service.questions(job_id, Some(owner)).await?;
            eprintln!("\n[Job {} completed: {} questions]", job_id, questions.len());
            if !job.failed_segments.is_empty() {
                eprintln!(
                    "[No questions for segments: {:?}]",
                    job.failed_segments
                );
            }
        }
        _ => {
            eprintln!(
                "\n[Job {} failed: {}]",
                job_id,
                job.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    Ok(())
}

/// Show status details for a job
async fn show_status(job_id: &str, owner: Option<&str>) -> Result<()> {
    let job_id = parse_job_id(job_id)?;
    let runtime = build_runtime(config::config()?);
    let job = runtime.service.job(job_id, owner).await?;

    print_job(&job);
    Ok(())
}

fn print_job(job: &Job) {
    println!("Job ID: {}", job.id);
    println!("Owner: {}", job.owner_id);
    println!("Video: {} ({} bytes)", job.video.original_name, job.video.size_bytes);
    println!("Status: {}", job.status);
    println!("Progress: {}%", job.progress);
    if let Some(error) = &job.error {
        println!("Error: {}", error);
    }
    println!("Language: {}", job.language);
    println!("Created: {}", job.created_at);
    println!("Updated: {}", job.updated_at);
    if !job.segments.is_empty() {
        println!("\nSegments:");
        for segment in &job.segments {
            let marker = if job.failed_segments.contains(&segment.index) {
                " (generation failed)"
            } else {
                ""
            };
            println!(
                "  #{} {:>7.1}s - {:>7.1}s{}",
                segment.index, segment.start_time, segment.end_time, marker
            );
        }
    }
}

/// List jobs for an owner
async fn list_jobs(owner: &str) -> Result<()> {
    let runtime = build_runtime(config::config()?);
    let jobs = runtime.service.list_for_owner(owner).await?;

    if jobs.is_empty() {
        println!("No jobs found for {}", owner);
        return Ok(());
    }

    println!("{:<38} {:<22} {:<6} {:<30}", "JOB ID", "STATUS", "PROG", "VIDEO");
    println!("{}", "-".repeat(96));

    for job in jobs {
        println!(
            "{:<38} {:<22} {:<6} {:<30}",
            job.id,
            job.status,
            format!("{}%", job.progress),
            job.video.original_name
        );
    }

    Ok(())
}

/// Print the questions for a job
async fn show_questions(job_id: &str, json: bool) -> Result<()> {
    let job_id = parse_job_id(job_id)?;
    let runtime = build_runtime(config::config()?);
    let questions = runtime.service.questions(job_id, None).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&questions)?);
        return Ok(());
    }

    if questions.is_empty() {
        println!("No questions for job {}", job_id);
        return Ok(());
    }

    for (n, q) in questions.iter().enumerate() {
        println!(
            "{}. [segment {} @ {:.0}s, {}] {}",
            n + 1,
            q.segment_index,
            q.start_time,
            q.difficulty,
            q.text
        );
        for option in &q.options {
            let mark = if *option == q.correct_answer { "*" } else { " " };
            println!("   {} {}", mark, option);
        }
        if q.options.is_empty() {
            println!("   Answer: {}", q.correct_answer);
        }
        if let Some(explanation) = &q.explanation {
            println!("   ({})", explanation);
        }
        println!();
    }

    Ok(())
}

/// Delete a job and its questions
async fn delete_job(job_id: &str, owner: &str) -> Result<()> {
    let job_id = parse_job_id(job_id)?;
    let runtime = build_runtime(config::config()?);
    runtime.service.delete(job_id, owner).await?;

    eprintln!("Deleted job {}", job_id);
    Ok(())
}

/// Call the AI service health endpoint
async fn check_health() -> Result<()> {
    let cfg = config::config()?;
    let client = AiServiceClient::new(cfg.ai_service.url.clone());

    match client.health_check().await {
        Ok(()) => {
            println!("AI service at {} is healthy", cfg.ai_service.url);
            Ok(())
        }
        Err(e) => Err(e.context(format!("AI service at {} is unavailable", cfg.ai_service.url))),
    }
}

/// Show resolved configuration
fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("vidquiz configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:      {}", cfg.home.display());
    println!("  Jobs:      {}", cfg.jobs_path().display());
    println!("  Questions: {}", cfg.questions_path().display());
    println!();
    println!("AI service:");
    println!("  URL:                   {}", cfg.ai_service.url);
    println!("  Transcription timeout: {}s", cfg.ai_service.transcription_timeout.as_secs());
    println!("  Generation timeout:    {}s", cfg.ai_service.generation_timeout.as_secs());
    println!();
    println!("Pipeline:");
    println!("  Default language:      {}", cfg.pipeline.default_language);
    println!("  Segment window:        {}s", cfg.pipeline.segment_window_seconds);
    println!("  Questions per segment: {}", cfg.pipeline.questions_per_segment);
    println!("  Max concurrent calls:  {}", cfg.pipeline.max_concurrent_generations);
    println!(
        "  Failure write retry:   {} attempts, {}ms initial",
        cfg.pipeline.failure_write_retry.max_attempts,
        cfg.pipeline.failure_write_retry.initial_delay_ms
    );

    Ok(())
}
