//! Runtime settings: where job logs live, how to reach the AI service and
//! how hard the pipeline pushes it.
//!
//! Lookup order, first hit wins: `VIDQUIZ_*` environment variables, then the
//! nearest `.vidquiz/config.yaml` above the working directory, then built-in
//! defaults (`~/.vidquiz`, `http://localhost:8000`).

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::RetryPolicy;

/// Loaded on first use. The error is kept as text so it can be reported on every call
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

const CONFIG_DIR: &str = ".vidquiz";
const CONFIG_NAME: &str = "config.yaml";

/// `.vidquiz/config.yaml` as written on disk. Only `version` is required
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub ai_service: Option<AiServiceConfig>,
    #[serde(default)]
    pub pipeline: Option<PipelineConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Directory for the JSONL logs, relative paths start at `.vidquiz/`
    pub home: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AiServiceConfig {
    pub url: Option<String>,
    pub transcription_timeout_seconds: Option<u64>,
    pub generation_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub default_language: Option<String>,
    pub segment_window_seconds: Option<f64>,
    pub questions_per_segment: Option<u32>,
    pub max_concurrent_generations: Option<usize>,
    pub failure_write_retry: Option<RetryPolicy>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to vidquiz home (job and question logs)
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub ai_service: AiServiceSettings,
    pub pipeline: PipelineSettings,
}

impl ResolvedConfig {
    /// Job log path ($VIDQUIZ_HOME/jobs.jsonl)
    pub fn jobs_path(&self) -> PathBuf {
        self.home.join("jobs.jsonl")
    }

    /// Question log path ($VIDQUIZ_HOME/questions.jsonl)
    pub fn questions_path(&self) -> PathBuf {
        self.home.join("questions.jsonl")
    }
}

#[derive(Debug, Clone)]
pub struct AiServiceSettings {
    pub url: String,
    pub transcription_timeout: Duration,
    pub generation_timeout: Duration,
}

impl Default for AiServiceSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000".to_string(),
            transcription_timeout: Duration::from_secs(300),
            generation_timeout: Duration::from_secs(120),
        }
    }
}

/// Tunables for the processing pipeline
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub default_language: String,
    /// Segment window size in seconds
    pub segment_window_seconds: f64,
    /// Questions requested from the generator per segment
    pub questions_per_segment: u32,
    /// Cap on in-flight generation calls across all jobs
    pub max_concurrent_generations: usize,
    /// Retry policy for persisting the failed state
    pub failure_write_retry: RetryPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            default_language: "en".to_string(),
            segment_window_seconds: 300.0,
            questions_per_segment: 3,
            max_concurrent_generations: 4,
            failure_write_retry: RetryPolicy::default(),
        }
    }
}

/// Nearest `.vidquiz/config.yaml` walking up from `start`
fn discover_config_file(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(CONFIG_DIR).join(CONFIG_NAME))
        .find(|candidate| candidate.is_file())
}

fn read_config_file(path: &Path) -> Result<ConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read {}", path.display()))?;
    serde_yaml::from_str(&raw).with_context(|| format!("Invalid YAML in {}", path.display()))
}

/// `paths.home` is taken relative to the directory holding the config file
fn home_from_file(config_path: &Path, home: &str) -> PathBuf {
    let home = Path::new(home);
    if home.is_absolute() {
        return home.to_path_buf();
    }
    let joined = config_path.parent().unwrap_or(Path::new(".")).join(home);
    joined.canonicalize().unwrap_or(joined)
}

/// Merge file settings over defaults
fn merge_settings(file: Option<&ConfigFile>) -> (AiServiceSettings, PipelineSettings) {
    let mut ai = AiServiceSettings::default();
    let mut pipeline = PipelineSettings::default();

    if let Some(section) = file.and_then(|f| f.ai_service.as_ref()) {
        if let Some(url) = &section.url {
            ai.url = url.clone();
        }
        if let Some(secs) = section.transcription_timeout_seconds {
            ai.transcription_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = section.generation_timeout_seconds {
            ai.generation_timeout = Duration::from_secs(secs);
        }
    }

    if let Some(section) = file.and_then(|f| f.pipeline.as_ref()) {
        if let Some(lang) = &section.default_language {
            pipeline.default_language = lang.clone();
        }
        if let Some(window) = section.segment_window_seconds {
            pipeline.segment_window_seconds = window;
        }
        if let Some(count) = section.questions_per_segment {
            pipeline.questions_per_segment = count;
        }
        if let Some(max) = section.max_concurrent_generations {
            pipeline.max_concurrent_generations = max.max(1);
        }
        if let Some(policy) = &section.failure_write_retry {
            pipeline.failure_write_retry = policy.clone();
        }
    }

    (ai, pipeline)
}

fn load_config() -> Result<ResolvedConfig> {
    let cwd = std::env::current_dir().context("Cannot determine working directory")?;
    let config_file = discover_config_file(&cwd);
    let parsed = config_file.as_deref().map(read_config_file).transpose()?;

    let home = match std::env::var_os("VIDQUIZ_HOME") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let from_file = config_file.as_deref().zip(
                parsed.as_ref().and_then(|c| c.paths.home.as_deref()),
            );
            match from_file {
                Some((path, home)) => home_from_file(path, home),
                None => dirs::home_dir()
                    .context("Cannot determine home directory")?
                    .join(CONFIG_DIR),
            }
        }
    };

    let (mut ai_service, mut pipeline) = merge_settings(parsed.as_ref());
    if let Ok(url) = std::env::var("VIDQUIZ_AI_SERVICE_URL") {
        ai_service.url = url;
    }
    if let Ok(lang) = std::env::var("VIDQUIZ_LANGUAGE") {
        pipeline.default_language = lang;
    }

    Ok(ResolvedConfig {
        home,
        config_file,
        ai_service,
        pipeline,
    })
}

/// Process-wide configuration, resolved on first call
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}
