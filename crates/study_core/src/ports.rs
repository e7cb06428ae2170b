//! crates/study_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    AttemptRecord, Document, DocumentOverview, Flashcard, FlashcardCandidate, NewAttempt,
    NewDocument, NewFlashcard, NewQuestion, Question, QuestionCandidate,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),
    #[error("Text extraction failed: {0}")]
    ExtractionFailed(String),
    #[error("Generation service returned malformed output: {0}")]
    MalformedOutput(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Persistence for documents, generated artifacts and the attempt log.
///
/// Every call acquires its own connection; multi-row writes run in a single
/// transaction so they are either fully stored or not at all.
#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Document Management ---
    async fn create_document(&self, document: NewDocument) -> PortResult<Document>;

    async fn get_document_by_id(&self, document_id: Uuid) -> PortResult<Document>;

    /// Fetches a document only if it belongs to `user_id`, otherwise `NotFound`.
    async fn get_document_for_user(&self, user_id: Uuid, document_id: Uuid)
        -> PortResult<Document>;

    async fn get_document_content(&self, document_id: Uuid) -> PortResult<Vec<u8>>;

    async fn list_documents_for_user(&self, user_id: Uuid) -> PortResult<Vec<DocumentOverview>>;

    // --- Questions ---
    /// Stores all questions for one page as one atomic unit.
    async fn save_questions(
        &self,
        document_id: Uuid,
        questions: Vec<NewQuestion>,
    ) -> PortResult<Vec<Question>>;

    async fn get_question_by_id(&self, question_id: Uuid) -> PortResult<Question>;

    /// Lists a document's questions ordered by page number, then creation order.
    async fn list_questions(&self, document_id: Uuid) -> PortResult<Vec<Question>>;

    async fn count_questions(&self, document_id: Uuid) -> PortResult<u64>;

    // --- Flashcards ---
    /// Stores a complete flashcard set in a single commit.
    async fn save_flashcards(
        &self,
        document_id: Uuid,
        flashcards: Vec<NewFlashcard>,
    ) -> PortResult<Vec<Flashcard>>;

    async fn list_flashcards(&self, document_id: Uuid) -> PortResult<Vec<Flashcard>>;

    // --- Attempt Log ---
    async fn record_attempt(&self, attempt: NewAttempt) -> PortResult<AttemptRecord>;

    async fn list_attempts_for_document(
        &self,
        user_id: Uuid,
        document_id: Uuid,
    ) -> PortResult<Vec<AttemptRecord>>;

    async fn list_attempts_for_user(&self, user_id: Uuid) -> PortResult<Vec<AttemptRecord>>;

    async fn list_attempts_for_question(
        &self,
        user_id: Uuid,
        question_id: Uuid,
    ) -> PortResult<Vec<AttemptRecord>>;

    /// Deletes every attempt of `user_id` on `document_id`, returning how many were removed.
    async fn clear_attempts(&self, user_id: Uuid, document_id: Uuid) -> PortResult<u64>;
}

#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Generates up to `count` multiple-choice question candidates from one page of text.
    async fn generate_questions(
        &self,
        page_text: &str,
        count: u8,
    ) -> PortResult<Vec<QuestionCandidate>>;

    /// Generates up to `count` flashcard candidates from one page of text.
    async fn generate_flashcards(
        &self,
        page_text: &str,
        count: u8,
    ) -> PortResult<Vec<FlashcardCandidate>>;
}

#[async_trait]
pub trait PageExtractor: Send + Sync {
    /// Splits stored document bytes into one text entry per page, in page order.
    /// Blank pages are kept as empty strings.
    async fn extract(&self, content: &[u8], content_type: &str) -> PortResult<Vec<String>>;

    /// Whether `content_type` has an extractor at all.
    fn supports(&self, content_type: &str) -> bool;
}
