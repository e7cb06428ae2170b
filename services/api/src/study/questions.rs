//! services/api/src/study/questions.rs
//!
//! Read access to generated questions and answer checking.

use std::sync::Arc;

use study_core::{
    domain::{Choice, Question},
    ports::DatabaseService,
};
use tracing::info;
use uuid::Uuid;

use crate::error::StudyError;

/// The verdict for one submitted answer. Nothing is recorded; recording is the
/// progress service's job.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerCheck {
    pub question_id: Uuid,
    pub is_correct: bool,
    pub correct_choice_id: String,
    pub explanation: Option<String>,
    pub choices: Vec<Choice>,
}

pub struct QuestionCatalog {
    db: Arc<dyn DatabaseService>,
}

impl QuestionCatalog {
    pub fn new(db: Arc<dyn DatabaseService>) -> Self {
        Self { db }
    }

    /// All of a document's questions, by page number then creation order.
    pub async fn list_questions(
        &self,
        user_id: Uuid,
        document_id: Uuid,
    ) -> Result<Vec<Question>, StudyError> {
        let document = self.db.get_document_for_user(user_id, document_id).await?;
        Ok(self.db.list_questions(document.id).await?)
    }

    /// The question at zero-based `index` in listing order.
    pub async fn question_at(
        &self,
        user_id: Uuid,
        document_id: Uuid,
        index: usize,
    ) -> Result<Question, StudyError> {
        let mut questions = self.list_questions(user_id, document_id).await?;
        if index >= questions.len() {
            let message = match questions.len() {
                0 => format!("question index {} is out of range, document has no questions", index),
                n => format!(
                    "question index {} is out of range, available range: 0 to {}",
                    index,
                    n - 1
                ),
            };
            return Err(StudyError::Validation(message));
        }
        Ok(questions.swap_remove(index))
    }

    pub async fn check_answer(
        &self,
        user_id: Uuid,
        question_id: Uuid,
        selected_choice_id: &str,
    ) -> Result<AnswerCheck, StudyError> {
        let question = self.db.get_question_by_id(question_id).await?;
        self.db.get_document_for_user(user_id, question.document_id).await?;

        let is_correct = question.correct_choice_id == selected_choice_id.trim();
        info!("Checked answer for question {}: correct = {}", question.id, is_correct);

        Ok(AnswerCheck {
            question_id: question.id,
            is_correct,
            correct_choice_id: question.correct_choice_id,
            explanation: question.explanation,
            choices: question.choices,
        })
    }
}
