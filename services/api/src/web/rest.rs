//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::adapters::extract::{CONTENT_TYPE_PDF, CONTENT_TYPE_TEXT};
use crate::error::{ApiError, StudyError};
use crate::study::{AnswerCheck, BackgroundState, JobStatus, RecordAttempt};
use crate::web::state::AppState;
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use study_core::{
    domain::{AttemptRecord, Choice, Document, DocumentOverview, Flashcard, Question},
    progress::{DocumentProgress, OverallProgress, QuestionHistory},
};
use tracing::info;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

pub const STATUS_COMPLETE: &str = "complete";
pub const STATUS_PARTIAL_BACKGROUND: &str = "partial — remaining pages processing in background";
pub const STATUS_PARTIAL_QUEUE_FULL: &str = "partial — background queue full";

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        upload_document_handler,
        list_documents_handler,
        generate_questions_handler,
        list_questions_handler,
        question_at_index_handler,
        generate_flashcards_handler,
        check_answer_handler,
        job_status_handler,
        record_attempt_handler,
        document_progress_handler,
        overall_progress_handler,
        question_history_handler,
        clear_progress_handler,
    ),
    components(
        schemas(
            DocumentResponse,
            DocumentSummaryResponse,
            GenerateRequest,
            ChoiceResponse,
            QuestionResponse,
            GenerateQuestionsResponse,
            FlashcardResponse,
            FlashcardsResponse,
            AnswerRequest,
            AnswerResponse,
            JobStatusResponse,
            RecordAttemptRequest,
            AttemptResponse,
            DocumentProgressResponse,
            OverallProgressResponse,
            QuestionHistoryResponse,
        )
    ),
    tags(
        (name = "Study Buddy API", description = "Quiz generation from uploaded documents and study progress tracking.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Request and Response Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct DocumentResponse {
    id: Uuid,
    filename: String,
    content_type: String,
    page_count: u32,
    created_at: DateTime<Utc>,
}

impl From<Document> for DocumentResponse {
    fn from(d: Document) -> Self {
        Self {
            id: d.id,
            filename: d.filename,
            content_type: d.content_type,
            page_count: d.page_count,
            created_at: d.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct DocumentSummaryResponse {
    #[serde(flatten)]
    document: DocumentResponse,
    questions_count: u64,
    flashcards_count: u64,
}

impl From<DocumentOverview> for DocumentSummaryResponse {
    fn from(o: DocumentOverview) -> Self {
        Self {
            document: o.document.into(),
            questions_count: o.questions_count,
            flashcards_count: o.flashcards_count,
        }
    }
}

/// How many items to generate per page, between 1 and 10.
#[derive(Deserialize, ToSchema)]
pub struct GenerateRequest {
    items_per_page: i64,
}

#[derive(Serialize, ToSchema)]
pub struct ChoiceResponse {
    id: String,
    text: String,
}

impl From<Choice> for ChoiceResponse {
    fn from(c: Choice) -> Self {
        Self { id: c.id, text: c.text }
    }
}

#[derive(Serialize, ToSchema)]
pub struct QuestionResponse {
    id: Uuid,
    document_id: Uuid,
    page_number: u32,
    question_text: String,
    choices: Vec<ChoiceResponse>,
    correct_choice_id: String,
    explanation: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<Question> for QuestionResponse {
    fn from(q: Question) -> Self {
        Self {
            id: q.id,
            document_id: q.document_id,
            page_number: q.page_number,
            question_text: q.question_text,
            choices: q.choices.into_iter().map(Into::into).collect(),
            correct_choice_id: q.correct_choice_id,
            explanation: q.explanation,
            created_at: q.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct GenerateQuestionsResponse {
    document_id: Uuid,
    page_count: u32,
    items: Vec<QuestionResponse>,
    status: String,
    /// Set whenever pages 2..N were handed to the background runner.
    job_id: Option<Uuid>,
}

#[derive(Serialize, ToSchema)]
pub struct FlashcardResponse {
    id: Uuid,
    front: String,
    back: String,
    explanation: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<Flashcard> for FlashcardResponse {
    fn from(f: Flashcard) -> Self {
        Self {
            id: f.id,
            front: f.front,
            back: f.back,
            explanation: f.explanation,
            created_at: f.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct FlashcardsResponse {
    document_id: Uuid,
    items: Vec<FlashcardResponse>,
    /// `cached` or `generated`.
    source: String,
}

#[derive(Deserialize, ToSchema)]
pub struct AnswerRequest {
    selected_choice_id: String,
}

#[derive(Serialize, ToSchema)]
pub struct AnswerResponse {
    question_id: Uuid,
    is_correct: bool,
    correct_choice_id: String,
    explanation: Option<String>,
    choices: Vec<ChoiceResponse>,
}

impl From<AnswerCheck> for AnswerResponse {
    fn from(a: AnswerCheck) -> Self {
        Self {
            question_id: a.question_id,
            is_correct: a.is_correct,
            correct_choice_id: a.correct_choice_id,
            explanation: a.explanation,
            choices: a.choices.into_iter().map(Into::into).collect(),
        }
    }
}

/// A background job's state: `queued`, `running`, `completed`, `failed`, `cancelled` or `rejected`.
#[derive(Serialize, ToSchema)]
pub struct JobStatusResponse {
    job_id: Uuid,
    state: String,
    page: Option<u32>,
    pages_processed: Option<u32>,
    questions_created: Option<u64>,
    skipped_pages: Vec<u32>,
    reason: Option<String>,
}

impl JobStatusResponse {
    fn new(job_id: Uuid, status: JobStatus) -> Self {
        let mut response = Self {
            job_id,
            state: String::new(),
            page: None,
            pages_processed: None,
            questions_created: None,
            skipped_pages: Vec::new(),
            reason: None,
        };
        let state = match status {
            JobStatus::Queued => "queued",
            JobStatus::Running { page } => {
                response.page = Some(page);
                "running"
            }
            JobStatus::Completed {
                pages_processed,
                questions_created,
                skipped_pages,
            } => {
                response.pages_processed = Some(pages_processed);
                response.questions_created = Some(questions_created);
                response.skipped_pages = skipped_pages;
                "completed"
            }
            JobStatus::Failed { page, reason } => {
                response.page = page;
                response.reason = Some(reason);
                "failed"
            }
            JobStatus::Cancelled { page } => {
                response.page = Some(page);
                "cancelled"
            }
            JobStatus::Rejected => "rejected",
        };
        response.state = state.to_string();
        response
    }
}

#[derive(Deserialize, ToSchema)]
pub struct RecordAttemptRequest {
    document_id: Uuid,
    question_id: Uuid,
    selected_choice_id: String,
    is_correct: bool,
}

#[derive(Serialize, ToSchema)]
pub struct AttemptResponse {
    id: i64,
    document_id: Uuid,
    question_id: Uuid,
    selected_choice_id: String,
    is_correct: bool,
    created_at: DateTime<Utc>,
}

impl From<AttemptRecord> for AttemptResponse {
    fn from(a: AttemptRecord) -> Self {
        Self {
            id: a.id,
            document_id: a.document_id,
            question_id: a.question_id,
            selected_choice_id: a.selected_choice_id,
            is_correct: a.is_correct,
            created_at: a.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct DocumentProgressResponse {
    document_id: Uuid,
    document_filename: String,
    total_questions: u64,
    questions_attempted: u64,
    questions_correct: u64,
    questions_incorrect: u64,
    accuracy_percentage: f64,
    last_attempt: Option<DateTime<Utc>>,
}

impl From<DocumentProgress> for DocumentProgressResponse {
    fn from(p: DocumentProgress) -> Self {
        Self {
            document_id: p.document_id,
            document_filename: p.document_filename,
            total_questions: p.total_questions,
            questions_attempted: p.questions_attempted,
            questions_correct: p.questions_correct,
            questions_incorrect: p.questions_incorrect,
            accuracy_percentage: p.accuracy_percentage,
            last_attempt: p.last_attempt,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct OverallProgressResponse {
    total_documents_studied: u64,
    total_questions_attempted: u64,
    total_correct: u64,
    total_incorrect: u64,
    overall_accuracy: f64,
    documents_progress: Vec<DocumentProgressResponse>,
}

impl From<OverallProgress> for OverallProgressResponse {
    fn from(o: OverallProgress) -> Self {
        Self {
            total_documents_studied: o.total_documents_studied,
            total_questions_attempted: o.total_questions_attempted,
            total_correct: o.total_correct,
            total_incorrect: o.total_incorrect,
            overall_accuracy: o.overall_accuracy,
            documents_progress: o.documents.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct QuestionHistoryResponse {
    question_id: Uuid,
    question_text: String,
    total_attempts: u64,
    correct_attempts: u64,
    incorrect_attempts: u64,
    accuracy_percentage: f64,
    /// Newest attempt first.
    history: Vec<AttemptResponse>,
}

impl From<QuestionHistory> for QuestionHistoryResponse {
    fn from(h: QuestionHistory) -> Self {
        Self {
            question_id: h.question_id,
            question_text: h.question_text,
            total_attempts: h.total_attempts,
            correct_attempts: h.correct_attempts,
            incorrect_attempts: h.incorrect_attempts,
            accuracy_percentage: h.accuracy_percentage,
            history: h.history.into_iter().map(Into::into).collect(),
        }
    }
}

//=========================================================================================
// Document Handlers
//=========================================================================================

/// Upload a document.
///
/// Accepts a multipart/form-data request; the first part carrying a filename is stored.
/// Supported formats are PDF and plain text.
#[utoipa::path(
    post,
    path = "/documents",
    request_body(content_type = "multipart/form-data", description = "The document to upload."),
    responses(
        (status = 201, description = "Document stored", body = DocumentResponse),
        (status = 400, description = "Missing or empty file"),
        (status = 401, description = "Missing or invalid x-user-id header"),
        (status = 415, description = "Unsupported document format"),
        (status = 422, description = "The document could not be read")
    ),
    params(
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn upload_document_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read multipart data: {}", e)))?
    {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| content_type_for(&filename).to_string());
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read file bytes: {}", e)))?;
        upload = Some((filename, content_type, data.to_vec()));
        break;
    }

    let (filename, content_type, content) = upload
        .ok_or_else(|| ApiError::BadRequest("Multipart form must include a file".to_string()))?;

    let document = app_state
        .documents
        .upload(user_id, &filename, &content_type, content)
        .await?;
    Ok((StatusCode::CREATED, Json(DocumentResponse::from(document))))
}

/// Falls back to the file extension when a part carries no content type.
fn content_type_for(filename: &str) -> &'static str {
    let lower = filename.to_ascii_lowercase();
    if lower.ends_with(".pdf") {
        CONTENT_TYPE_PDF
    } else if lower.ends_with(".txt") {
        CONTENT_TYPE_TEXT
    } else {
        "application/octet-stream"
    }
}

/// List the caller's documents, newest first.
#[utoipa::path(
    get,
    path = "/documents",
    responses(
        (status = 200, description = "The caller's documents", body = [DocumentSummaryResponse]),
        (status = 401, description = "Missing or invalid x-user-id header")
    ),
    params(
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn list_documents_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<Vec<DocumentSummaryResponse>>, ApiError> {
    let documents = app_state.documents.list(user_id).await?;
    Ok(Json(documents.into_iter().map(Into::into).collect()))
}

//=========================================================================================
// Generation Handlers
//=========================================================================================

/// Generate questions for a document.
///
/// Only page 1's questions are returned. The remaining pages are generated in the
/// background; their questions show up in the question listing as they are stored.
#[utoipa::path(
    post,
    path = "/documents/{id}/questions",
    request_body = GenerateRequest,
    responses(
        (status = 200, description = "Page 1 questions", body = GenerateQuestionsResponse),
        (status = 400, description = "items_per_page out of range"),
        (status = 404, description = "Document not found"),
        (status = 502, description = "The generation service failed")
    ),
    params(
        ("id" = Uuid, Path, description = "The document ID."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn generate_questions_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(document_id): Path<Uuid>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<GenerateQuestionsResponse>, ApiError> {
    let staged = app_state
        .generator
        .generate_for_document(user_id, document_id, request.items_per_page)
        .await?;

    let (status, job_id) = match staged.background {
        BackgroundState::NotNeeded => (STATUS_COMPLETE, None),
        BackgroundState::Queued(job_id) => (STATUS_PARTIAL_BACKGROUND, Some(job_id)),
        BackgroundState::Rejected(job_id) => (STATUS_PARTIAL_QUEUE_FULL, Some(job_id)),
    };

    Ok(Json(GenerateQuestionsResponse {
        document_id,
        page_count: staged.page_count,
        items: staged.questions.into_iter().map(Into::into).collect(),
        status: status.to_string(),
        job_id,
    }))
}

/// List every stored question of a document, by page.
#[utoipa::path(
    get,
    path = "/documents/{id}/questions",
    responses(
        (status = 200, description = "The document's questions", body = [QuestionResponse]),
        (status = 404, description = "Document not found")
    ),
    params(
        ("id" = Uuid, Path, description = "The document ID."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn list_questions_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(document_id): Path<Uuid>,
) -> Result<Json<Vec<QuestionResponse>>, ApiError> {
    let questions = app_state.questions.list_questions(user_id, document_id).await?;
    Ok(Json(questions.into_iter().map(Into::into).collect()))
}

/// Fetch one question by its zero-based position in the document's listing order.
#[utoipa::path(
    get,
    path = "/documents/{id}/questions/{index}",
    responses(
        (status = 200, description = "The question at that position", body = QuestionResponse),
        (status = 400, description = "Index out of range"),
        (status = 404, description = "Document not found")
    ),
    params(
        ("id" = Uuid, Path, description = "The document ID."),
        ("index" = u32, Path, description = "Zero-based question index."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn question_at_index_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path((document_id, index)): Path<(Uuid, u32)>,
) -> Result<Json<QuestionResponse>, ApiError> {
    let question = app_state
        .questions
        .question_at(user_id, document_id, index as usize)
        .await?;
    Ok(Json(question.into()))
}

/// Get or generate a document's flashcards.
///
/// The first call generates and stores the set; later calls return it unchanged.
#[utoipa::path(
    post,
    path = "/documents/{id}/flashcards",
    request_body = GenerateRequest,
    responses(
        (status = 200, description = "The document's flashcards", body = FlashcardsResponse),
        (status = 400, description = "items_per_page out of range"),
        (status = 404, description = "Document not found"),
        (status = 422, description = "No extractable text"),
        (status = 502, description = "The generation service produced nothing")
    ),
    params(
        ("id" = Uuid, Path, description = "The document ID."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn generate_flashcards_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(document_id): Path<Uuid>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<FlashcardsResponse>, ApiError> {
    let (flashcards, source) = app_state
        .flashcards
        .get_or_generate(user_id, document_id, request.items_per_page)
        .await?;

    Ok(Json(FlashcardsResponse {
        document_id,
        items: flashcards.into_iter().map(Into::into).collect(),
        source: source.as_str().to_string(),
    }))
}

/// Check an answer without recording it.
#[utoipa::path(
    post,
    path = "/questions/{id}/answer",
    request_body = AnswerRequest,
    responses(
        (status = 200, description = "The verdict", body = AnswerResponse),
        (status = 404, description = "Question not found")
    ),
    params(
        ("id" = Uuid, Path, description = "The question ID."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn check_answer_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(question_id): Path<Uuid>,
    Json(request): Json<AnswerRequest>,
) -> Result<Json<AnswerResponse>, ApiError> {
    let check = app_state
        .questions
        .check_answer(user_id, question_id, &request.selected_choice_id)
        .await?;
    Ok(Json(check.into()))
}

/// Report the status of a background generation job.
#[utoipa::path(
    get,
    path = "/jobs/{id}",
    responses(
        (status = 200, description = "The job's status", body = JobStatusResponse),
        (status = 404, description = "Unknown or expired job")
    ),
    params(
        ("id" = Uuid, Path, description = "The job ID."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn job_status_handler(
    State(app_state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let status = app_state
        .runner
        .status(job_id)
        .ok_or_else(|| StudyError::NotFound(format!("job {}", job_id)))?;
    Ok(Json(JobStatusResponse::new(job_id, status)))
}

//=========================================================================================
// Progress Handlers
//=========================================================================================

/// Record an answer to a question.
#[utoipa::path(
    post,
    path = "/progress/record",
    request_body = RecordAttemptRequest,
    responses(
        (status = 201, description = "Attempt recorded", body = AttemptResponse),
        (status = 404, description = "Document or question not found")
    ),
    params(
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn record_attempt_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(request): Json<RecordAttemptRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let record = app_state
        .progress
        .record_attempt(
            user_id,
            RecordAttempt {
                document_id: request.document_id,
                question_id: request.question_id,
                selected_choice_id: request.selected_choice_id,
                is_correct: request.is_correct,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(AttemptResponse::from(record))))
}

/// Progress on one document, counting each question's latest attempt.
#[utoipa::path(
    get,
    path = "/progress/document/{id}",
    responses(
        (status = 200, description = "Document progress", body = DocumentProgressResponse),
        (status = 404, description = "Document not found")
    ),
    params(
        ("id" = Uuid, Path, description = "The document ID."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn document_progress_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(document_id): Path<Uuid>,
) -> Result<Json<DocumentProgressResponse>, ApiError> {
    let progress = app_state.progress.document_stats(user_id, document_id).await?;
    Ok(Json(progress.into()))
}

/// Progress across every document the caller has attempted.
#[utoipa::path(
    get,
    path = "/progress/stats",
    responses(
        (status = 200, description = "Overall progress", body = OverallProgressResponse)
    ),
    params(
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn overall_progress_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<OverallProgressResponse>, ApiError> {
    let progress = app_state.progress.overall_stats(user_id).await?;
    Ok(Json(progress.into()))
}

/// Every attempt on one question, newest first.
#[utoipa::path(
    get,
    path = "/progress/question/{id}",
    responses(
        (status = 200, description = "Attempt history", body = QuestionHistoryResponse),
        (status = 404, description = "Question not found")
    ),
    params(
        ("id" = Uuid, Path, description = "The question ID."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn question_history_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(question_id): Path<Uuid>,
) -> Result<Json<QuestionHistoryResponse>, ApiError> {
    let history = app_state.progress.question_history(user_id, question_id).await?;
    Ok(Json(history.into()))
}

/// Delete the caller's attempts on one document.
#[utoipa::path(
    delete,
    path = "/progress/document/{id}",
    responses(
        (status = 204, description = "Progress cleared"),
        (status = 404, description = "Document not found")
    ),
    params(
        ("id" = Uuid, Path, description = "The document ID."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn clear_progress_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(document_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let removed = app_state.progress.clear_document(user_id, document_id).await?;
    info!("User {} cleared {} attempts on document {}", user_id, removed, document_id);
    Ok(StatusCode::NO_CONTENT)
}
