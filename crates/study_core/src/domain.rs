//! crates/study_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format,
//! apart from the `serde` derives needed to carry choices as structured JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// The lowest and highest number of items a caller may request per page.
pub const MIN_ITEMS_PER_PAGE: u8 = 1;
pub const MAX_ITEMS_PER_PAGE: u8 = 10;

/// Represents a document uploaded by a user.
///
/// The raw bytes are not carried here; they are fetched separately through
/// `DatabaseService::get_document_content` when pages need to be extracted.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: Uuid,
    pub user_id: Uuid,
    pub filename: String,
    pub content_type: String,
    pub page_count: u32,
    pub created_at: DateTime<Utc>,
}

/// A document that is about to be stored, including its raw content.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub user_id: Uuid,
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
    pub page_count: u32,
}

/// A document together with the number of artifacts generated for it.
#[derive(Debug, Clone)]
pub struct DocumentOverview {
    pub document: Document,
    pub questions_count: u64,
    pub flashcards_count: u64,
}

/// A single page of extracted text. Page numbers are 1-based and follow extraction order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub number: u32,
    pub text: String,
}

/// A labeled answer option of a multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub text: String,
}

/// Reads an identifier written either as a string or as a bare number (`1` becomes `"1"`).
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(n) => n.to_string(),
    })
}

/// A persisted multiple-choice question.
#[derive(Debug, Clone)]
pub struct Question {
    pub id: Uuid,
    pub document_id: Uuid,
    pub page_number: u32,
    pub question_text: String,
    pub choices: Vec<Choice>,
    pub correct_choice_id: String,
    pub explanation: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A question that has passed validation but has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewQuestion {
    pub page_number: u32,
    pub question_text: String,
    pub choices: Vec<Choice>,
    pub correct_choice_id: String,
    pub explanation: Option<String>,
}

/// A persisted flashcard.
#[derive(Debug, Clone)]
pub struct Flashcard {
    pub id: Uuid,
    pub document_id: Uuid,
    pub front: String,
    pub back: String,
    pub explanation: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewFlashcard {
    pub front: String,
    pub back: String,
    pub explanation: Option<String>,
}

/// One answer submitted by a user. Attempts are append-only; `id` grows monotonically,
/// so the highest id for a question is that question's latest attempt.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub id: i64,
    pub user_id: Uuid,
    pub document_id: Uuid,
    pub question_id: Uuid,
    pub selected_choice_id: String,
    pub is_correct: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub user_id: Uuid,
    pub document_id: Uuid,
    pub question_id: Uuid,
    pub selected_choice_id: String,
    pub is_correct: bool,
}

/// The raw shape of a question returned by the generation service, before validation.
///
/// Missing fields deserialize to empty values so that `into_question` is the single
/// place that decides whether a candidate is usable.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QuestionCandidate {
    #[serde(default, alias = "question")]
    pub question_text: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default, alias = "correct_answer", deserialize_with = "string_or_number")]
    pub correct_choice_id: String,
    #[serde(default)]
    pub explanation: Option<String>,
}

impl QuestionCandidate {
    /// Turns the candidate into a storable question for `page_number`.
    ///
    /// Returns `None` when the candidate is unusable: empty text, fewer than two
    /// choices, duplicate choice ids, or a correct choice that is not one of its own.
    pub fn into_question(self, page_number: u32) -> Option<NewQuestion> {
        let question_text = self.question_text.trim().to_string();
        if question_text.is_empty() || self.choices.len() < 2 {
            return None;
        }

        let mut seen = std::collections::HashSet::new();
        if !self.choices.iter().all(|c| seen.insert(c.id.as_str())) {
            return None;
        }

        let correct = self.correct_choice_id.trim();
        if !self.choices.iter().any(|c| c.id == correct) {
            return None;
        }

        Some(NewQuestion {
            page_number,
            question_text,
            correct_choice_id: correct.to_string(),
            choices: self.choices,
            explanation: self.explanation.filter(|e| !e.trim().is_empty()),
        })
    }
}

/// The raw shape of a flashcard returned by the generation service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FlashcardCandidate {
    #[serde(default)]
    pub front: String,
    #[serde(default)]
    pub back: String,
    #[serde(default)]
    pub explanation: Option<String>,
}

impl FlashcardCandidate {
    pub fn into_flashcard(self) -> Option<NewFlashcard> {
        let front = self.front.trim().to_string();
        let back = self.back.trim().to_string();
        if front.is_empty() || back.is_empty() {
            return None;
        }
        Some(NewFlashcard {
            front,
            back,
            explanation: self.explanation.filter(|e| !e.trim().is_empty()),
        })
    }
}
