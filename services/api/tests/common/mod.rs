//! In-memory port fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use api_lib::config::Config;
use api_lib::web::AppState;
use async_trait::async_trait;
use chrono::Utc;
use study_core::domain::{
    AttemptRecord, Choice, Document, DocumentOverview, Flashcard, FlashcardCandidate, NewAttempt,
    NewDocument, NewFlashcard, NewQuestion, Question, QuestionCandidate,
};
use study_core::ports::{
    DatabaseService, GenerationService, PageExtractor, PortError, PortResult,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

//=========================================================================================
// Database
//=========================================================================================

#[derive(Default)]
struct Tables {
    documents: Vec<(Document, Vec<u8>)>,
    questions: Vec<Question>,
    flashcards: Vec<Flashcard>,
    attempts: Vec<AttemptRecord>,
    next_attempt_id: i64,
}

#[derive(Default)]
pub struct InMemoryDb {
    tables: Mutex<Tables>,
    failing_pages: Mutex<HashSet<u32>>,
    flashcard_saves: Mutex<usize>,
}

impl InMemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later `save_questions` call for `page` fail.
    pub fn fail_saves_for_page(&self, page: u32) {
        self.failing_pages.lock().unwrap().insert(page);
    }

    pub fn flashcard_saves(&self) -> usize {
        *self.flashcard_saves.lock().unwrap()
    }

    pub fn stored_pages(&self, document_id: Uuid) -> Vec<u32> {
        self.tables
            .lock()
            .unwrap()
            .questions
            .iter()
            .filter(|q| q.document_id == document_id)
            .map(|q| q.page_number)
            .collect()
    }

    /// Stores a document directly, bypassing upload validation.
    pub fn insert_document(&self, user_id: Uuid, filename: &str, content: &str, page_count: u32) -> Document {
        let document = Document {
            id: Uuid::new_v4(),
            user_id,
            filename: filename.to_string(),
            content_type: "text/plain".to_string(),
            page_count,
            created_at: Utc::now(),
        };
        self.tables
            .lock()
            .unwrap()
            .documents
            .push((document.clone(), content.as_bytes().to_vec()));
        document
    }

    /// Stores one question per entry of `pages`, returning them in order.
    pub fn insert_questions(&self, document_id: Uuid, pages: &[u32]) -> Vec<Question> {
        let mut tables = self.tables.lock().unwrap();
        pages
            .iter()
            .map(|page| {
                let question = Question {
                    id: Uuid::new_v4(),
                    document_id,
                    page_number: *page,
                    question_text: format!("Question on page {}", page),
                    choices: choices(),
                    correct_choice_id: "A".to_string(),
                    explanation: None,
                    created_at: Utc::now(),
                };
                tables.questions.push(question.clone());
                question
            })
            .collect()
    }
}

#[async_trait]
impl DatabaseService for InMemoryDb {
    async fn create_document(&self, document: NewDocument) -> PortResult<Document> {
        let stored = Document {
            id: Uuid::new_v4(),
            user_id: document.user_id,
            filename: document.filename,
            content_type: document.content_type,
            page_count: document.page_count,
            created_at: Utc::now(),
        };
        self.tables
            .lock()
            .unwrap()
            .documents
            .push((stored.clone(), document.content));
        Ok(stored)
    }

    async fn get_document_by_id(&self, document_id: Uuid) -> PortResult<Document> {
        self.tables
            .lock()
            .unwrap()
            .documents
            .iter()
            .find(|(d, _)| d.id == document_id)
            .map(|(d, _)| d.clone())
            .ok_or_else(|| PortError::NotFound(format!("document {}", document_id)))
    }

    async fn get_document_for_user(&self, user_id: Uuid, document_id: Uuid) -> PortResult<Document> {
        let document = self.get_document_by_id(document_id).await?;
        if document.user_id != user_id {
            return Err(PortError::NotFound(format!("document {}", document_id)));
        }
        Ok(document)
    }

    async fn get_document_content(&self, document_id: Uuid) -> PortResult<Vec<u8>> {
        self.tables
            .lock()
            .unwrap()
            .documents
            .iter()
            .find(|(d, _)| d.id == document_id)
            .map(|(_, content)| content.clone())
            .ok_or_else(|| PortError::NotFound(format!("document {}", document_id)))
    }

    async fn list_documents_for_user(&self, user_id: Uuid) -> PortResult<Vec<DocumentOverview>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .documents
            .iter()
            .rev()
            .filter(|(d, _)| d.user_id == user_id)
            .map(|(d, _)| DocumentOverview {
                document: d.clone(),
                questions_count: tables.questions.iter().filter(|q| q.document_id == d.id).count() as u64,
                flashcards_count: tables.flashcards.iter().filter(|f| f.document_id == d.id).count() as u64,
            })
            .collect())
    }

    async fn save_questions(&self, document_id: Uuid, questions: Vec<NewQuestion>) -> PortResult<Vec<Question>> {
        {
            let failing = self.failing_pages.lock().unwrap();
            if questions.iter().any(|q| failing.contains(&q.page_number)) {
                return Err(PortError::Unexpected("connection reset".to_string()));
            }
        }
        let mut tables = self.tables.lock().unwrap();
        let stored: Vec<Question> = questions
            .into_iter()
            .map(|q| Question {
                id: Uuid::new_v4(),
                document_id,
                page_number: q.page_number,
                question_text: q.question_text,
                choices: q.choices,
                correct_choice_id: q.correct_choice_id,
                explanation: q.explanation,
                created_at: Utc::now(),
            })
            .collect();
        tables.questions.extend(stored.iter().cloned());
        Ok(stored)
    }

    async fn get_question_by_id(&self, question_id: Uuid) -> PortResult<Question> {
        self.tables
            .lock()
            .unwrap()
            .questions
            .iter()
            .find(|q| q.id == question_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("question {}", question_id)))
    }

    async fn list_questions(&self, document_id: Uuid) -> PortResult<Vec<Question>> {
        let mut questions: Vec<Question> = self
            .tables
            .lock()
            .unwrap()
            .questions
            .iter()
            .filter(|q| q.document_id == document_id)
            .cloned()
            .collect();
        // Stable sort keeps insertion order within a page.
        questions.sort_by_key(|q| q.page_number);
        Ok(questions)
    }

    async fn count_questions(&self, document_id: Uuid) -> PortResult<u64> {
        Ok(self.list_questions(document_id).await?.len() as u64)
    }

    async fn save_flashcards(&self, document_id: Uuid, flashcards: Vec<NewFlashcard>) -> PortResult<Vec<Flashcard>> {
        *self.flashcard_saves.lock().unwrap() += 1;
        let stored: Vec<Flashcard> = flashcards
            .into_iter()
            .map(|f| Flashcard {
                id: Uuid::new_v4(),
                document_id,
                front: f.front,
                back: f.back,
                explanation: f.explanation,
                created_at: Utc::now(),
            })
            .collect();
        self.tables.lock().unwrap().flashcards.extend(stored.iter().cloned());
        Ok(stored)
    }

    async fn list_flashcards(&self, document_id: Uuid) -> PortResult<Vec<Flashcard>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .flashcards
            .iter()
            .filter(|f| f.document_id == document_id)
            .cloned()
            .collect())
    }

    async fn record_attempt(&self, attempt: NewAttempt) -> PortResult<AttemptRecord> {
        let mut tables = self.tables.lock().unwrap();
        tables.next_attempt_id += 1;
        let record = AttemptRecord {
            id: tables.next_attempt_id,
            user_id: attempt.user_id,
            document_id: attempt.document_id,
            question_id: attempt.question_id,
            selected_choice_id: attempt.selected_choice_id,
            is_correct: attempt.is_correct,
            created_at: Utc::now(),
        };
        tables.attempts.push(record.clone());
        Ok(record)
    }

    async fn list_attempts_for_document(&self, user_id: Uuid, document_id: Uuid) -> PortResult<Vec<AttemptRecord>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .attempts
            .iter()
            .filter(|a| a.user_id == user_id && a.document_id == document_id)
            .cloned()
            .collect())
    }

    async fn list_attempts_for_user(&self, user_id: Uuid) -> PortResult<Vec<AttemptRecord>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .attempts
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_attempts_for_question(&self, user_id: Uuid, question_id: Uuid) -> PortResult<Vec<AttemptRecord>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .attempts
            .iter()
            .filter(|a| a.user_id == user_id && a.question_id == question_id)
            .cloned()
            .collect())
    }

    async fn clear_attempts(&self, user_id: Uuid, document_id: Uuid) -> PortResult<u64> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.attempts.len();
        tables
            .attempts
            .retain(|a| !(a.user_id == user_id && a.document_id == document_id));
        Ok((before - tables.attempts.len()) as u64)
    }
}

//=========================================================================================
// Generation
//=========================================================================================

pub fn choices() -> Vec<Choice> {
    ["A", "B", "C", "D"]
        .iter()
        .map(|id| Choice {
            id: id.to_string(),
            text: format!("Option {}", id),
        })
        .collect()
}

/// A generator whose behaviour is driven by markers in the page text:
/// `[fail]` errors, `[malformed]` returns malformed output, `[invalid]` returns only
/// unusable candidates, `[empty]` returns nothing, `[slow]` sleeps first and
/// `[panic]` panics. Any other text yields `count` valid items.
#[derive(Default)]
pub struct ScriptedGenerator {
    calls: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The page texts the generator was called with, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    async fn script(&self, page_text: &str) -> PortResult<()> {
        self.calls.lock().unwrap().push(page_text.to_string());
        if page_text.contains("[slow]") {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        if page_text.contains("[panic]") {
            panic!("generator crashed on purpose");
        }
        if page_text.contains("[fail]") {
            return Err(PortError::Unexpected("upstream timeout".to_string()));
        }
        if page_text.contains("[malformed]") {
            return Err(PortError::MalformedOutput("expected a JSON object".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl GenerationService for ScriptedGenerator {
    async fn generate_questions(&self, page_text: &str, count: u8) -> PortResult<Vec<QuestionCandidate>> {
        self.script(page_text).await?;
        if page_text.contains("[empty]") {
            return Ok(Vec::new());
        }
        let correct = if page_text.contains("[invalid]") { "Z" } else { "A" };
        Ok((1..=count)
            .map(|i| QuestionCandidate {
                question_text: format!("{} #{}", page_text.trim(), i),
                choices: choices(),
                correct_choice_id: correct.to_string(),
                explanation: Some("Because.".to_string()),
            })
            .collect())
    }

    async fn generate_flashcards(&self, page_text: &str, count: u8) -> PortResult<Vec<FlashcardCandidate>> {
        self.script(page_text).await?;
        if page_text.contains("[empty]") {
            return Ok(Vec::new());
        }
        Ok((1..=count)
            .map(|i| FlashcardCandidate {
                front: format!("{} front #{}", page_text.trim(), i),
                back: format!("back #{}", i),
                explanation: None,
            })
            .collect())
    }
}

//=========================================================================================
// Extraction
//=========================================================================================

/// Returns the same pages for any supported content.
pub struct StaticExtractor {
    pages: Vec<String>,
}

impl StaticExtractor {
    pub fn new(pages: &[&str]) -> Self {
        Self {
            pages: pages.iter().map(|p| p.to_string()).collect(),
        }
    }
}

#[async_trait]
impl PageExtractor for StaticExtractor {
    async fn extract(&self, _content: &[u8], content_type: &str) -> PortResult<Vec<String>> {
        if !self.supports(content_type) {
            return Err(PortError::UnsupportedFormat(content_type.to_string()));
        }
        Ok(self.pages.clone())
    }

    fn supports(&self, content_type: &str) -> bool {
        content_type == "text/plain" || content_type == "application/pdf"
    }
}

//=========================================================================================
// Wiring
//=========================================================================================

pub fn test_config(workers: usize, queue_capacity: usize) -> Config {
    Config::from_lookup(|key| match key {
        "DATABASE_URL" => Some("postgres://localhost/study_test".to_string()),
        "BACKGROUND_WORKERS" => Some(workers.to_string()),
        "BACKGROUND_QUEUE_CAPACITY" => Some(queue_capacity.to_string()),
        "GENERATION_CHAR_BUDGET" => Some("4000".to_string()),
        _ => None,
    })
    .expect("test config is valid")
}

pub struct Harness {
    pub db: Arc<InMemoryDb>,
    pub generator: Arc<ScriptedGenerator>,
    pub state: Arc<AppState>,
    pub shutdown: CancellationToken,
    pub user_id: Uuid,
}

impl Harness {
    /// A harness whose extractor returns `pages` for every document.
    pub fn new(pages: &[&str]) -> Self {
        Self::with_pool(pages, 2, 16)
    }

    pub fn with_pool(pages: &[&str], workers: usize, queue_capacity: usize) -> Self {
        let db = Arc::new(InMemoryDb::new());
        let generator = Arc::new(ScriptedGenerator::new());
        let shutdown = CancellationToken::new();
        let state = Arc::new(AppState::build(
            Arc::new(test_config(workers, queue_capacity)),
            db.clone(),
            generator.clone(),
            Arc::new(StaticExtractor::new(pages)),
            shutdown.clone(),
        ));
        Self {
            db,
            generator,
            state,
            shutdown,
            user_id: Uuid::new_v4(),
        }
    }

    /// Stores a document for the harness user.
    pub fn document(&self, page_count: u32) -> Document {
        self.db.insert_document(self.user_id, "chapter.txt", "irrelevant", page_count)
    }
}
