//! Quiz questions produced from transcript segments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::job::{Job, Segment};

/// Kind of question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    MultipleChoice,
    TrueFalse,
    FillInBlank,
}

impl Default for QuestionType {
    fn default() -> Self {
        Self::MultipleChoice
    }
}

/// Difficulty tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Default for Difficulty {
    fn default() -> Self {
        Self::Medium
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "easy"),
            Difficulty::Medium => write!(f, "medium"),
            Difficulty::Hard => write!(f, "hard"),
        }
    }
}

/// A question as returned by the generation service, before it is bound to a
/// job and segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionDraft {
    pub question: String,

    #[serde(default)]
    pub options: Vec<String>,

    pub correct_answer: String,

    #[serde(default)]
    pub explanation: Option<String>,

    #[serde(default)]
    pub difficulty: Difficulty,

    #[serde(default, rename = "type")]
    pub question_type: QuestionType,
}

impl QuestionDraft {
    /// Check that the draft is usable as a quiz question
    pub fn validate(&self) -> Result<(), String> {
        if self.question.trim().is_empty() {
            return Err("question text is empty".to_string());
        }
        if self.correct_answer.trim().is_empty() {
            return Err("correct answer is empty".to_string());
        }

        if self.question_type == QuestionType::MultipleChoice {
            if self.options.len() < 2 {
                return Err(format!(
                    "multiple choice question needs at least 2 options, got {}",
                    self.options.len()
                ));
            }
            if !self.options.iter().any(|o| o == &self.correct_answer) {
                return Err("correct answer is not one of the options".to_string());
            }
        }

        Ok(())
    }
}

/// A persisted quiz question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub job_id: Uuid,

    /// Segment this question was generated from
    pub segment_index: u32,
    pub start_time: f64,
    pub end_time: f64,

    pub question_type: QuestionType,
    pub text: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub explanation: Option<String>,
    pub difficulty: Difficulty,

    /// Owner of the job that produced the question
    pub created_by: String,

    /// Segment text the question was generated from
    pub source_text: String,

    pub created_at: DateTime<Utc>,
}

impl Question {
    /// Bind a draft to the job and segment it was generated for
    pub fn from_draft(job: &Job, segment: &Segment, draft: QuestionDraft) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id: job.id,
            segment_index: segment.index,
            start_time: segment.start_time,
            end_time: segment.end_time,
            question_type: draft.question_type,
            text: draft.question,
            options: draft.options,
            correct_answer: draft.correct_answer,
            explanation: draft.explanation.filter(|e| !e.trim().is_empty()),
            difficulty: draft.difficulty,
            created_by: job.owner_id.clone(),
            source_text: segment.text.clone(),
            created_at: Utc::now(),
        }
    }
}
