pub mod domain;
pub mod pages;
pub mod ports;
pub mod progress;

pub use domain::{
    AttemptRecord, Choice, Document, DocumentOverview, Flashcard, FlashcardCandidate, NewAttempt,
    NewDocument, NewFlashcard, NewQuestion, Page, Question, QuestionCandidate,
};
pub use ports::{DatabaseService, GenerationService, PageExtractor, PortError, PortResult};
pub use progress::{DocumentProgress, OverallProgress, QuestionHistory};
