//! Question persistence.
//!
//! Questions for a job are written in one batch once fan-out finishes, and
//! removed together when the job is deleted.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::job_store::StoreError;
use super::jsonl::{LockedLog, LogView};
use crate::domain::Question;

/// Persistent question storage
#[async_trait]
pub trait QuestionStore: Send + Sync {
    /// Insert all questions in one write; returns how many were stored
    async fn insert_batch(&self, questions: &[Question]) -> Result<usize, StoreError>;

    /// Questions for a job, ordered by segment index
    async fn find_by_job(&self, job_id: Uuid) -> Result<Vec<Question>, StoreError>;

    /// Remove all questions for a job; returns how many were removed
    async fn delete_by_job(&self, job_id: Uuid) -> Result<usize, StoreError>;
}

fn by_segment(mut questions: Vec<Question>) -> Vec<Question> {
    // Stable sort keeps generation order within a segment
    questions.sort_by_key(|q| q.segment_index);
    questions
}

/// Question store backed by a lock-guarded map
#[derive(Default)]
pub struct MemoryQuestionStore {
    questions: RwLock<HashMap<Uuid, Vec<Question>>>,
}

impl MemoryQuestionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuestionStore for MemoryQuestionStore {
    async fn insert_batch(&self, questions: &[Question]) -> Result<usize, StoreError> {
        let mut stored = self.questions.write().await;
        for question in questions {
            stored
                .entry(question.job_id)
                .or_default()
                .push(question.clone());
        }
        Ok(questions.len())
    }

    async fn find_by_job(&self, job_id: Uuid) -> Result<Vec<Question>, StoreError> {
        let stored = self.questions.read().await;
        Ok(by_segment(stored.get(&job_id).cloned().unwrap_or_default()))
    }

    async fn delete_by_job(&self, job_id: Uuid) -> Result<usize, StoreError> {
        let mut stored = self.questions.write().await;
        Ok(stored.remove(&job_id).map(|q| q.len()).unwrap_or(0))
    }
}

/// An entry in the question log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum QuestionRecord {
    Inserted {
        timestamp: DateTime<Utc>,
        questions: Vec<Question>,
    },
    DeletedForJob {
        timestamp: DateTime<Utc>,
        job_id: Uuid,
    },
}

type QuestionView = LogView<HashMap<Uuid, Vec<Question>>>;

/// Question store persisted as an append-only JSONL log.
///
/// A whole batch is a single line, so a torn write loses the batch rather
/// than leaving part of it visible.
pub struct FileQuestionStore {
    path: PathBuf,
    write_guard: Mutex<()>,
    view: Arc<std::sync::Mutex<QuestionView>>,
}

impl FileQuestionStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_guard: Mutex::new(()),
            view: Arc::new(std::sync::Mutex::new(QuestionView::default())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn apply_record(state: &mut HashMap<Uuid, Vec<Question>>, record: QuestionRecord) {
        match record {
            QuestionRecord::Inserted { questions, .. } => {
                for q in questions {
                    state.entry(q.job_id).or_default().push(q);
                }
            }
            QuestionRecord::DeletedForJob { job_id, .. } => {
                state.remove(&job_id);
            }
        }
    }

    async fn with_log<T, F>(&self, exclusive: bool, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut LockedLog, &mut QuestionView) -> Result<T, StoreError> + Send + 'static,
    {
        let path = self.path.clone();
        let view = Arc::clone(&self.view);
        tokio::task::spawn_blocking(move || {
            let mut log = if exclusive {
                LockedLog::exclusive(&path)?
            } else {
                LockedLog::shared(&path)?
            };
            let mut view = QuestionView::lock(&view);
            f(&mut log, &mut view)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    fn commit(
        log: &mut LockedLog,
        view: &mut QuestionView,
        record: &QuestionRecord,
    ) -> Result<(), StoreError> {
        log.append(record)?;
        view.refresh(log, Self::apply_record)?;
        Ok(())
    }
}

#[async_trait]
impl QuestionStore for FileQuestionStore {
    async fn insert_batch(&self, questions: &[Question]) -> Result<usize, StoreError> {
        if questions.is_empty() {
            return Ok(0);
        }
        let _guard = self.write_guard.lock().await;

        let record = QuestionRecord::Inserted {
            timestamp: Utc::now(),
            questions: questions.to_vec(),
        };
        let count = questions.len();
        self.with_log(true, move |log, view| {
            view.refresh(log, Self::apply_record)?;
            Self::commit(log, view, &record)?;
            Ok(count)
        })
        .await
    }

    async fn find_by_job(&self, job_id: Uuid) -> Result<Vec<Question>, StoreError> {
        self.with_log(false, move |log, view| {
            let state = view.refresh(log, Self::apply_record)?;
            Ok(by_segment(state.get(&job_id).cloned().unwrap_or_default()))
        })
        .await
    }

    async fn delete_by_job(&self, job_id: Uuid) -> Result<usize, StoreError> {
        let _guard = self.write_guard.lock().await;

        self.with_log(true, move |log, view| {
            let count = view
                .refresh(log, Self::apply_record)?
                .get(&job_id)
                .map(|q| q.len())
                .unwrap_or(0);
            if count > 0 {
                let record = QuestionRecord::DeletedForJob {
                    timestamp: Utc::now(),
                    job_id,
                };
                Self::commit(log, view, &record)?;
            }
            Ok(count)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Difficulty, QuestionType};
    use tempfile::TempDir;

    fn question(job_id: Uuid, segment_index: u32, text: &str) -> Question {
        Question {
            id: Uuid::new_v4(),
            job_id,
            segment_index,
            start_time: segment_index as f64 * 300.0,
            end_time: segment_index as f64 * 300.0 + 10.0,
            question_type: QuestionType::TrueFalse,
            text: text.to_string(),
            options: vec!["True".to_string(), "False".to_string()],
            correct_answer: "True".to_string(),
            explanation: None,
            difficulty: Difficulty::Medium,
            created_by: "alice".to_string(),
            source_text: "segment text".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_memory_store_orders_by_segment() {
        let store = MemoryQuestionStore::new();
        let job = Uuid::new_v4();
        let batch = vec![
            question(job, 2, "c"),
            question(job, 0, "a"),
            question(job, 1, "b"),
            question(job, 0, "a2"),
        ];

        assert_eq!(store.insert_batch(&batch).await.unwrap(), 4);

        let found = store.find_by_job(job).await.unwrap();
        let texts: Vec<&str> = found.iter().map(|q| q.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "a2", "b", "c"]);
        assert!(store.find_by_job(Uuid::new_v4()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_store_round_trip_and_delete() {
        let temp = TempDir::new().unwrap();
        let store = FileQuestionStore::new(temp.path().join("questions.jsonl"));
        let job = Uuid::new_v4();
        let other = Uuid::new_v4();

        store
            .insert_batch(&[question(job, 1, "b"), question(job, 0, "a")])
            .await
            .unwrap();
        store.insert_batch(&[question(other, 0, "x")]).await.unwrap();

        let reopened = FileQuestionStore::new(temp.path().join("questions.jsonl"));
        let found = reopened.find_by_job(job).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].segment_index, 0);

        assert_eq!(reopened.delete_by_job(job).await.unwrap(), 2);
        assert_eq!(reopened.delete_by_job(job).await.unwrap(), 0);
        assert!(store.find_by_job(job).await.unwrap().is_empty());
        assert_eq!(store.find_by_job(other).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_batch_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let store = FileQuestionStore::new(temp.path().join("questions.jsonl"));

        assert_eq!(store.insert_batch(&[]).await.unwrap(), 0);
        assert!(!store.path().exists());
    }
}
