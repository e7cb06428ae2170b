//! services/api/src/study/mod.rs
//!
//! The study services: staged question generation with background completion,
//! the flashcard cache, progress aggregation, and the document/question catalog.

pub mod background;
pub mod documents;
pub mod flashcards;
pub mod generation;
pub mod locks;
pub mod progress;
pub mod questions;

pub use background::{BackgroundRunner, CompletionJob, JobContext, JobStatus, QueueFull};
pub use documents::DocumentLibrary;
pub use flashcards::{FlashcardCache, FlashcardSource};
pub use generation::{BackgroundState, StagedGeneration, StagedQuestionGenerator};
pub use locks::DocumentLocks;
pub use progress::{ProgressAggregator, RecordAttempt};
pub use questions::{AnswerCheck, QuestionCatalog};

use crate::error::StudyError;
use study_core::domain::{MAX_ITEMS_PER_PAGE, MIN_ITEMS_PER_PAGE};

/// Checks a caller-supplied per-page item count.
pub fn validate_items_per_page(requested: i64) -> Result<u8, StudyError> {
    if requested < i64::from(MIN_ITEMS_PER_PAGE) || requested > i64::from(MAX_ITEMS_PER_PAGE) {
        return Err(StudyError::Validation(format!(
            "items_per_page must be between {} and {}, got {}",
            MIN_ITEMS_PER_PAGE, MAX_ITEMS_PER_PAGE, requested
        )));
    }
    Ok(requested as u8)
}
