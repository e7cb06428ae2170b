//! services/api/src/study/documents.rs
//!
//! Uploading and listing a user's documents.

use std::sync::Arc;

use study_core::{
    domain::{Document, DocumentOverview, NewDocument},
    ports::{DatabaseService, PageExtractor},
};
use tracing::info;
use uuid::Uuid;

use crate::error::StudyError;

pub struct DocumentLibrary {
    db: Arc<dyn DatabaseService>,
    extractor: Arc<dyn PageExtractor>,
}

impl DocumentLibrary {
    pub fn new(db: Arc<dyn DatabaseService>, extractor: Arc<dyn PageExtractor>) -> Self {
        Self { db, extractor }
    }

    /// Stores an uploaded file after extracting it once to learn its page count.
    pub async fn upload(
        &self,
        user_id: Uuid,
        filename: &str,
        content_type: &str,
        content: Vec<u8>,
    ) -> Result<Document, StudyError> {
        let filename = sanitize_filename(filename)
            .ok_or_else(|| StudyError::Validation("a filename is required".to_string()))?;
        if content.is_empty() {
            return Err(StudyError::Validation("the uploaded file is empty".to_string()));
        }
        if !self.extractor.supports(content_type) {
            return Err(StudyError::UnsupportedFormat(content_type.to_string()));
        }

        let pages = self.extractor.extract(&content, content_type).await?;
        let document = self
            .db
            .create_document(NewDocument {
                user_id,
                filename,
                content_type: content_type.to_string(),
                content,
                page_count: pages.len() as u32,
            })
            .await?;

        info!(
            "Stored document {} ('{}', {} pages) for user {}",
            document.id, document.filename, document.page_count, user_id
        );
        Ok(document)
    }

    /// The user's documents, newest first, with their generated item counts.
    pub async fn list(&self, user_id: Uuid) -> Result<Vec<DocumentOverview>, StudyError> {
        Ok(self.db.list_documents_for_user(user_id).await?)
    }
}

/// Keeps only the final path component of a client-supplied name.
fn sanitize_filename(raw: &str) -> Option<String> {
    let name = raw.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or_default().trim();
    if name.is_empty() || name == "." || name == ".." {
        None
    } else {
        Some(name.to_string())
    }
}
