//! services/api/src/study/progress.rs
//!
//! Records answers and serves progress statistics, scoped to the calling user.

use std::sync::Arc;

use study_core::{
    domain::{AttemptRecord, NewAttempt},
    ports::{DatabaseService, PortError},
    progress::{self, DocumentProgress, OverallProgress, QuestionHistory},
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::StudyError;

/// An answer as submitted by a client.
#[derive(Debug, Clone)]
pub struct RecordAttempt {
    pub document_id: Uuid,
    pub question_id: Uuid,
    pub selected_choice_id: String,
    pub is_correct: bool,
}

pub struct ProgressAggregator {
    db: Arc<dyn DatabaseService>,
}

impl ProgressAggregator {
    pub fn new(db: Arc<dyn DatabaseService>) -> Self {
        Self { db }
    }

    /// Appends one attempt. The document must belong to the user and the question
    /// must belong to the document.
    pub async fn record_attempt(
        &self,
        user_id: Uuid,
        attempt: RecordAttempt,
    ) -> Result<AttemptRecord, StudyError> {
        let document = self.db.get_document_for_user(user_id, attempt.document_id).await?;
        let question = self.db.get_question_by_id(attempt.question_id).await?;
        if question.document_id != document.id {
            return Err(StudyError::NotFound(format!(
                "question {} in document {}",
                question.id, document.id
            )));
        }

        let record = self
            .db
            .record_attempt(NewAttempt {
                user_id,
                document_id: document.id,
                question_id: question.id,
                selected_choice_id: attempt.selected_choice_id,
                is_correct: attempt.is_correct,
            })
            .await?;
        info!(
            "Recorded attempt {} for question {} (correct: {})",
            record.id, record.question_id, record.is_correct
        );
        Ok(record)
    }

    pub async fn document_stats(
        &self,
        user_id: Uuid,
        document_id: Uuid,
    ) -> Result<DocumentProgress, StudyError> {
        let document = self.db.get_document_for_user(user_id, document_id).await?;
        let total = self.db.count_questions(document.id).await?;
        let attempts = self.db.list_attempts_for_document(user_id, document.id).await?;
        Ok(progress::summarize_document(&document, total, &attempts))
    }

    /// Statistics across every document the user has attempted at least once.
    pub async fn overall_stats(&self, user_id: Uuid) -> Result<OverallProgress, StudyError> {
        let attempts = self.db.list_attempts_for_user(user_id).await?;

        let mut documents = Vec::new();
        for (document_id, attempts) in progress::group_by_document(attempts) {
            let document = match self.db.get_document_for_user(user_id, document_id).await {
                Ok(document) => document,
                Err(PortError::NotFound(_)) => {
                    warn!("Skipping attempts for missing document {}", document_id);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let total = self.db.count_questions(document.id).await?;
            documents.push(progress::summarize_document(&document, total, &attempts));
        }

        Ok(progress::rollup(documents))
    }

    pub async fn question_history(
        &self,
        user_id: Uuid,
        question_id: Uuid,
    ) -> Result<QuestionHistory, StudyError> {
        let question = self.db.get_question_by_id(question_id).await?;
        // Ownership goes through the question's document.
        self.db.get_document_for_user(user_id, question.document_id).await?;
        let attempts = self.db.list_attempts_for_question(user_id, question.id).await?;
        Ok(progress::question_history(&question, attempts))
    }

    /// Removes the user's attempts on one document and returns how many were deleted.
    pub async fn clear_document(&self, user_id: Uuid, document_id: Uuid) -> Result<u64, StudyError> {
        let document = self.db.get_document_for_user(user_id, document_id).await?;
        let removed = self.db.clear_attempts(user_id, document.id).await?;
        info!("Cleared {} attempts on document {}", removed, document.id);
        Ok(removed)
    }
}
