//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! Every method works on the pool directly, so each caller (a request handler or a
//! background job) gets its own connection. Multi-row writes open a transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, FromRow, PgPool};
use study_core::domain::{
    AttemptRecord, Choice, Document, DocumentOverview, Flashcard, NewAttempt, NewDocument,
    NewFlashcard, NewQuestion, Question,
};
use study_core::ports::{DatabaseService, PortError, PortResult};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn not_found_or_unexpected(e: sqlx::Error, what: String) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what),
        _ => PortError::Unexpected(e.to_string()),
    }
}

fn to_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const DOCUMENT_COLUMNS: &str = "id, user_id, filename, content_type, page_count, created_at";
const QUESTION_COLUMNS: &str =
    "id, document_id, page_number, question_text, choices, correct_choice_id, explanation, created_at";
const FLASHCARD_COLUMNS: &str = "id, document_id, front, back, explanation, created_at";
const ATTEMPT_COLUMNS: &str =
    "id, user_id, document_id, question_id, selected_choice_id, is_correct, created_at";

// `seq` is the insertion order. `created_at` ties for every row of one transaction.
const QUESTION_ORDER: &str = "ORDER BY page_number ASC, seq ASC";
const FLASHCARD_ORDER: &str = "ORDER BY seq ASC";

#[derive(FromRow)]
struct DocumentRecord {
    id: Uuid,
    user_id: Uuid,
    filename: String,
    content_type: String,
    page_count: i32,
    created_at: DateTime<Utc>,
}
impl DocumentRecord {
    fn to_domain(self) -> Document {
        Document {
            id: self.id,
            user_id: self.user_id,
            filename: self.filename,
            content_type: self.content_type,
            page_count: self.page_count.max(0) as u32,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct DocumentOverviewRecord {
    #[sqlx(flatten)]
    document: DocumentRecord,
    questions_count: i64,
    flashcards_count: i64,
}
impl DocumentOverviewRecord {
    fn to_domain(self) -> DocumentOverview {
        DocumentOverview {
            document: self.document.to_domain(),
            questions_count: to_count(self.questions_count),
            flashcards_count: to_count(self.flashcards_count),
        }
    }
}

#[derive(FromRow)]
struct QuestionRecord {
    id: Uuid,
    document_id: Uuid,
    page_number: i32,
    question_text: String,
    choices: Json<Vec<Choice>>,
    correct_choice_id: String,
    explanation: Option<String>,
    created_at: DateTime<Utc>,
}
impl QuestionRecord {
    fn to_domain(self) -> Question {
        Question {
            id: self.id,
            document_id: self.document_id,
            page_number: self.page_number.max(0) as u32,
            question_text: self.question_text,
            choices: self.choices.0,
            correct_choice_id: self.correct_choice_id,
            explanation: self.explanation,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct FlashcardRecord {
    id: Uuid,
    document_id: Uuid,
    front: String,
    back: String,
    explanation: Option<String>,
    created_at: DateTime<Utc>,
}
impl FlashcardRecord {
    fn to_domain(self) -> Flashcard {
        Flashcard {
            id: self.id,
            document_id: self.document_id,
            front: self.front,
            back: self.back,
            explanation: self.explanation,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct AttemptRecordRow {
    id: i64,
    user_id: Uuid,
    document_id: Uuid,
    question_id: Uuid,
    selected_choice_id: String,
    is_correct: bool,
    created_at: DateTime<Utc>,
}
impl AttemptRecordRow {
    fn to_domain(self) -> AttemptRecord {
        AttemptRecord {
            id: self.id,
            user_id: self.user_id,
            document_id: self.document_id,
            question_id: self.question_id,
            selected_choice_id: self.selected_choice_id,
            is_correct: self.is_correct,
            created_at: self.created_at,
        }
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_document(&self, document: NewDocument) -> PortResult<Document> {
        let record = sqlx::query_as::<_, DocumentRecord>(&format!(
            "INSERT INTO documents (id, user_id, filename, content_type, content, page_count) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {DOCUMENT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(document.user_id)
        .bind(&document.filename)
        .bind(&document.content_type)
        .bind(&document.content)
        .bind(document.page_count as i32)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn get_document_by_id(&self, document_id: Uuid) -> PortResult<Document> {
        let record = sqlx::query_as::<_, DocumentRecord>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1"
        ))
        .bind(document_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or_unexpected(e, format!("Document {} not found", document_id)))?;
        Ok(record.to_domain())
    }

    async fn get_document_for_user(
        &self,
        user_id: Uuid,
        document_id: Uuid,
    ) -> PortResult<Document> {
        let record = sqlx::query_as::<_, DocumentRecord>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1 AND user_id = $2"
        ))
        .bind(document_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            not_found_or_unexpected(
                e,
                format!("Document not found or access denied: {}", document_id),
            )
        })?;
        Ok(record.to_domain())
    }

    async fn get_document_content(&self, document_id: Uuid) -> PortResult<Vec<u8>> {
        sqlx::query_scalar::<_, Vec<u8>>("SELECT content FROM documents WHERE id = $1")
            .bind(document_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found_or_unexpected(e, format!("Document {} not found", document_id)))
    }

    async fn list_documents_for_user(&self, user_id: Uuid) -> PortResult<Vec<DocumentOverview>> {
        let records = sqlx::query_as::<_, DocumentOverviewRecord>(
            "SELECT d.id, d.user_id, d.filename, d.content_type, d.page_count, d.created_at, \
                (SELECT COUNT(*) FROM questions q WHERE q.document_id = d.id) AS questions_count, \
                (SELECT COUNT(*) FROM flashcards f WHERE f.document_id = d.id) AS flashcards_count \
             FROM documents d WHERE d.user_id = $1 ORDER BY d.created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn save_questions(
        &self,
        document_id: Uuid,
        questions: Vec<NewQuestion>,
    ) -> PortResult<Vec<Question>> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        let mut saved = Vec::with_capacity(questions.len());

        for question in questions {
            let record = sqlx::query_as::<_, QuestionRecord>(&format!(
                "INSERT INTO questions \
                    (id, document_id, page_number, question_text, choices, correct_choice_id, explanation) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {QUESTION_COLUMNS}"
            ))
            .bind(Uuid::new_v4())
            .bind(document_id)
            .bind(question.page_number as i32)
            .bind(&question.question_text)
            .bind(Json(&question.choices))
            .bind(&question.correct_choice_id)
            .bind(&question.explanation)
            .fetch_one(&mut *tx)
            .await
            .map_err(unexpected)?;
            saved.push(record.to_domain());
        }

        // Dropping `tx` on an early return rolls the whole page back.
        tx.commit().await.map_err(unexpected)?;
        Ok(saved)
    }

    async fn get_question_by_id(&self, question_id: Uuid) -> PortResult<Question> {
        let record = sqlx::query_as::<_, QuestionRecord>(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE id = $1"
        ))
        .bind(question_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or_unexpected(e, format!("Question {} not found", question_id)))?;
        Ok(record.to_domain())
    }

    async fn list_questions(&self, document_id: Uuid) -> PortResult<Vec<Question>> {
        let records = sqlx::query_as::<_, QuestionRecord>(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE document_id = $1 {QUESTION_ORDER}"
        ))
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn count_questions(&self, document_id: Uuid) -> PortResult<u64> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM questions WHERE document_id = $1")
                .bind(document_id)
                .fetch_one(&self.pool)
                .await
                .map_err(unexpected)?;
        Ok(to_count(count))
    }

    async fn save_flashcards(
        &self,
        document_id: Uuid,
        flashcards: Vec<NewFlashcard>,
    ) -> PortResult<Vec<Flashcard>> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        let mut saved = Vec::with_capacity(flashcards.len());

        for card in flashcards {
            let record = sqlx::query_as::<_, FlashcardRecord>(&format!(
                "INSERT INTO flashcards (id, document_id, front, back, explanation) \
                 VALUES ($1, $2, $3, $4, $5) RETURNING {FLASHCARD_COLUMNS}"
            ))
            .bind(Uuid::new_v4())
            .bind(document_id)
            .bind(&card.front)
            .bind(&card.back)
            .bind(&card.explanation)
            .fetch_one(&mut *tx)
            .await
            .map_err(unexpected)?;
            saved.push(record.to_domain());
        }

        tx.commit().await.map_err(unexpected)?;
        Ok(saved)
    }

    async fn list_flashcards(&self, document_id: Uuid) -> PortResult<Vec<Flashcard>> {
        let records = sqlx::query_as::<_, FlashcardRecord>(&format!(
            "SELECT {FLASHCARD_COLUMNS} FROM flashcards WHERE document_id = $1 {FLASHCARD_ORDER}"
        ))
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn record_attempt(&self, attempt: NewAttempt) -> PortResult<AttemptRecord> {
        let record = sqlx::query_as::<_, AttemptRecordRow>(&format!(
            "INSERT INTO attempts (user_id, document_id, question_id, selected_choice_id, is_correct) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {ATTEMPT_COLUMNS}"
        ))
        .bind(attempt.user_id)
        .bind(attempt.document_id)
        .bind(attempt.question_id)
        .bind(&attempt.selected_choice_id)
        .bind(attempt.is_correct)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn list_attempts_for_document(
        &self,
        user_id: Uuid,
        document_id: Uuid,
    ) -> PortResult<Vec<AttemptRecord>> {
        let records = sqlx::query_as::<_, AttemptRecordRow>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE user_id = $1 AND document_id = $2 \
             ORDER BY id ASC"
        ))
        .bind(user_id)
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn list_attempts_for_user(&self, user_id: Uuid) -> PortResult<Vec<AttemptRecord>> {
        let records = sqlx::query_as::<_, AttemptRecordRow>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE user_id = $1 ORDER BY id ASC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn list_attempts_for_question(
        &self,
        user_id: Uuid,
        question_id: Uuid,
    ) -> PortResult<Vec<AttemptRecord>> {
        let records = sqlx::query_as::<_, AttemptRecordRow>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE user_id = $1 AND question_id = $2 \
             ORDER BY id DESC"
        ))
        .bind(user_id)
        .bind(question_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn clear_attempts(&self, user_id: Uuid, document_id: Uuid) -> PortResult<u64> {
        let result = sqlx::query("DELETE FROM attempts WHERE user_id = $1 AND document_id = $2")
            .bind(user_id)
            .bind(document_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(result.rows_affected())
    }
}
