//! services/api/src/study/flashcards.rs
//!
//! Flashcards are generated once per document and then served from storage.

use std::sync::Arc;

use study_core::{
    domain::{Flashcard, NewFlashcard},
    pages::{number_pages, truncate_chars},
    ports::{DatabaseService, GenerationService, PageExtractor},
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::StudyError;
use crate::study::generation::generation_error;
use crate::study::locks::DocumentLocks;
use crate::study::validate_items_per_page;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashcardSource {
    Cached,
    Generated,
}

impl FlashcardSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlashcardSource::Cached => "cached",
            FlashcardSource::Generated => "generated",
        }
    }
}

pub struct FlashcardCache {
    db: Arc<dyn DatabaseService>,
    generator: Arc<dyn GenerationService>,
    extractor: Arc<dyn PageExtractor>,
    locks: DocumentLocks,
    char_budget: usize,
}

impl FlashcardCache {
    pub fn new(
        db: Arc<dyn DatabaseService>,
        generator: Arc<dyn GenerationService>,
        extractor: Arc<dyn PageExtractor>,
        char_budget: usize,
    ) -> Self {
        Self {
            db,
            generator,
            extractor,
            locks: DocumentLocks::new(),
            char_budget,
        }
    }

    /// Returns the document's flashcard set, generating and storing it on first use.
    ///
    /// A stored set is returned as-is whatever `items_per_page` is now requested.
    pub async fn get_or_generate(
        &self,
        user_id: Uuid,
        document_id: Uuid,
        items_per_page: i64,
    ) -> Result<(Vec<Flashcard>, FlashcardSource), StudyError> {
        let items_per_page = validate_items_per_page(items_per_page)?;
        let document = self.db.get_document_for_user(user_id, document_id).await?;

        let existing = self.db.list_flashcards(document.id).await?;
        if !existing.is_empty() {
            return Ok((existing, FlashcardSource::Cached));
        }

        // Re-checked under the lock: a concurrent first call may have just stored a set.
        let _guard = self.locks.acquire(document.id).await;
        let existing = self.db.list_flashcards(document.id).await?;
        if !existing.is_empty() {
            return Ok((existing, FlashcardSource::Cached));
        }

        let content = self.db.get_document_content(document.id).await?;
        let pages = number_pages(self.extractor.extract(&content, &document.content_type).await?);
        let pages: Vec<_> = pages.into_iter().filter(|p| !p.is_blank()).collect();
        if pages.is_empty() {
            return Err(StudyError::NoExtractableText);
        }

        let mut cards: Vec<NewFlashcard> = Vec::new();
        for page in &pages {
            let text = truncate_chars(&page.text, self.char_budget);
            match self.generator.generate_flashcards(text, items_per_page).await {
                Ok(candidates) => {
                    cards.extend(candidates.into_iter().filter_map(|c| c.into_flashcard()));
                }
                Err(e) => {
                    warn!(
                        "Flashcard generation failed for page {} of document {}: {}",
                        page.number,
                        document.id,
                        generation_error(e)
                    );
                }
            }
        }

        if cards.is_empty() {
            return Err(StudyError::GenerationEmpty);
        }

        let stored = self.db.save_flashcards(document.id, cards).await?;
        info!(
            "Generated {} flashcards from {} pages of document {}",
            stored.len(),
            pages.len(),
            document.id
        );
        Ok((stored, FlashcardSource::Generated))
    }
}
