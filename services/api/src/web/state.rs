//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use crate::study::{
    BackgroundRunner, DocumentLibrary, FlashcardCache, JobContext, ProgressAggregator,
    QuestionCatalog, StagedQuestionGenerator,
};
use study_core::ports::{DatabaseService, GenerationService, PageExtractor};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub documents: Arc<DocumentLibrary>,
    pub generator: Arc<StagedQuestionGenerator>,
    pub flashcards: Arc<FlashcardCache>,
    pub questions: Arc<QuestionCatalog>,
    pub progress: Arc<ProgressAggregator>,
    pub runner: Arc<BackgroundRunner>,
}

impl AppState {
    /// Wires the study services over the given ports and starts the background runner.
    /// Cancelling `shutdown` stops the runner's workers.
    pub fn build(
        config: Arc<Config>,
        db: Arc<dyn DatabaseService>,
        generation: Arc<dyn GenerationService>,
        extractor: Arc<dyn PageExtractor>,
        shutdown: CancellationToken,
    ) -> Self {
        let char_budget = config.generation_char_budget;
        let runner = BackgroundRunner::start(
            JobContext {
                db: db.clone(),
                generator: generation.clone(),
                char_budget,
            },
            config.background_workers,
            config.background_queue_capacity,
            shutdown,
        );

        Self {
            documents: Arc::new(DocumentLibrary::new(db.clone(), extractor.clone())),
            generator: Arc::new(StagedQuestionGenerator::new(
                db.clone(),
                generation.clone(),
                extractor.clone(),
                runner.clone(),
                char_budget,
            )),
            flashcards: Arc::new(FlashcardCache::new(
                db.clone(),
                generation,
                extractor,
                char_budget,
            )),
            questions: Arc::new(QuestionCatalog::new(db.clone())),
            progress: Arc::new(ProgressAggregator::new(db)),
            runner,
            config,
        }
    }
}
