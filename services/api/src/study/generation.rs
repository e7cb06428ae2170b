//! services/api/src/study/generation.rs
//!
//! Staged question generation: page 1 is generated while the caller waits, the
//! remaining pages are handed to the background runner as a `CompletionJob`.

use std::sync::Arc;

use study_core::{
    domain::{NewQuestion, Page, Question},
    pages::{number_pages, truncate_chars},
    ports::{DatabaseService, GenerationService, PageExtractor, PortError},
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::StudyError;
use crate::study::background::{BackgroundRunner, CompletionJob};
use crate::study::validate_items_per_page;

/// What happened to the pages after the first one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackgroundState {
    /// The document has a single page; nothing left to do.
    NotNeeded,
    Queued(Uuid),
    /// The background queue was full; only page 1 was generated.
    Rejected(Uuid),
}

/// The synchronous result of a generation request.
#[derive(Debug, Clone)]
pub struct StagedGeneration {
    pub page_count: u32,
    pub questions: Vec<Question>,
    pub background: BackgroundState,
}

pub struct StagedQuestionGenerator {
    db: Arc<dyn DatabaseService>,
    generator: Arc<dyn GenerationService>,
    extractor: Arc<dyn PageExtractor>,
    runner: Arc<BackgroundRunner>,
    char_budget: usize,
}

impl StagedQuestionGenerator {
    pub fn new(
        db: Arc<dyn DatabaseService>,
        generator: Arc<dyn GenerationService>,
        extractor: Arc<dyn PageExtractor>,
        runner: Arc<BackgroundRunner>,
        char_budget: usize,
    ) -> Self {
        Self {
            db,
            generator,
            extractor,
            runner,
            char_budget,
        }
    }

    /// Loads a user's document, extracts its pages once and runs the staged generation.
    pub async fn generate_for_document(
        &self,
        user_id: Uuid,
        document_id: Uuid,
        items_per_page: i64,
    ) -> Result<StagedGeneration, StudyError> {
        let items_per_page = validate_items_per_page(items_per_page)?;
        let document = self.db.get_document_for_user(user_id, document_id).await?;
        let content = self.db.get_document_content(document.id).await?;
        let page_texts = self.extractor.extract(&content, &document.content_type).await?;

        self.generate(document.id, page_texts, items_per_page).await
    }

    /// Generates and stores page 1's questions, then schedules pages 2..N.
    ///
    /// A blank first page yields no questions but still schedules the rest. Any failure
    /// before the page-1 commit is returned to the caller and nothing is scheduled.
    pub async fn generate(
        &self,
        document_id: Uuid,
        page_texts: Vec<String>,
        items_per_page: u8,
    ) -> Result<StagedGeneration, StudyError> {
        let items_per_page = validate_items_per_page(i64::from(items_per_page))?;
        let mut pages = number_pages(page_texts).into_iter();
        let page_count = pages.len() as u32;

        let mut questions = Vec::new();
        if let Some(first) = pages.next() {
            if first.is_blank() {
                info!("Page 1 of document {} is blank; skipping immediate generation", document_id);
            } else {
                info!("Generating questions for page 1 of document {}", document_id);
                let generated = generate_page_questions(
                    self.generator.as_ref(),
                    &first,
                    items_per_page,
                    self.char_budget,
                )
                .await?;
                if !generated.is_empty() {
                    questions = self.db.save_questions(document_id, generated).await?;
                }
                info!(
                    "Stored {} questions for page 1 of document {}",
                    questions.len(),
                    document_id
                );
            }
        }

        let remaining: Vec<Page> = pages.collect();
        let background = if remaining.is_empty() {
            BackgroundState::NotNeeded
        } else {
            info!(
                "Scheduling background generation for {} remaining pages of document {}",
                remaining.len(),
                document_id
            );
            let job = CompletionJob::new(document_id, remaining, items_per_page);
            let job_id = job.id;
            match self.runner.submit(job) {
                Ok(()) => BackgroundState::Queued(job_id),
                Err(_) => BackgroundState::Rejected(job_id),
            }
        };

        Ok(StagedGeneration {
            page_count,
            questions,
            background,
        })
    }
}

/// Every failure of the generation service is a generation error, whatever its port variant.
pub(crate) fn generation_error(err: PortError) -> StudyError {
    match err {
        PortError::MalformedOutput(what) => StudyError::MalformedOutput(what),
        other => StudyError::Generation(other.to_string()),
    }
}

/// Calls the generation service for one page and keeps the candidates that form
/// valid questions, tagged with the page's own number.
///
/// A response where every candidate is invalid counts as malformed output.
pub(crate) async fn generate_page_questions(
    generator: &dyn GenerationService,
    page: &Page,
    items_per_page: u8,
    char_budget: usize,
) -> Result<Vec<NewQuestion>, StudyError> {
    let text = truncate_chars(&page.text, char_budget);
    let candidates = generator
        .generate_questions(text, items_per_page)
        .await
        .map_err(generation_error)?;

    let offered = candidates.len();
    let questions: Vec<NewQuestion> = candidates
        .into_iter()
        .filter_map(|candidate| candidate.into_question(page.number))
        .collect();

    if questions.len() < offered {
        warn!(
            "Dropped {} invalid question candidates on page {}",
            offered - questions.len(),
            page.number
        );
    }
    if offered > 0 && questions.is_empty() {
        return Err(StudyError::MalformedOutput(format!(
            "none of the {} candidates for page {} were valid questions",
            offered, page.number
        )));
    }
    Ok(questions)
}
