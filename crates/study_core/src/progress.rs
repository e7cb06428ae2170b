//! crates/study_core/src/progress.rs
//!
//! Progress aggregation over the append-only attempt log.
//!
//! A user may answer the same question many times. "Attempted" counts distinct
//! questions, while correct/incorrect are taken only from each question's latest
//! attempt (the one with the highest id). These functions are pure; the caller
//! is responsible for loading the attempts of a single user.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{AttemptRecord, Document, Question};

/// Per-document statistics for one user.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentProgress {
    pub document_id: Uuid,
    pub document_filename: String,
    pub total_questions: u64,
    pub questions_attempted: u64,
    pub questions_correct: u64,
    pub questions_incorrect: u64,
    pub accuracy_percentage: f64,
    pub last_attempt: Option<DateTime<Utc>>,
}

/// Rollup across every document the user has attempted at least once.
#[derive(Debug, Clone, PartialEq)]
pub struct OverallProgress {
    pub total_documents_studied: u64,
    pub total_questions_attempted: u64,
    pub total_correct: u64,
    pub total_incorrect: u64,
    pub overall_accuracy: f64,
    pub documents: Vec<DocumentProgress>,
}

/// Every attempt a user made on one question, most recent first.
#[derive(Debug, Clone)]
pub struct QuestionHistory {
    pub question_id: Uuid,
    pub question_text: String,
    pub total_attempts: u64,
    pub correct_attempts: u64,
    pub incorrect_attempts: u64,
    pub accuracy_percentage: f64,
    pub history: Vec<AttemptRecord>,
}

/// `correct / attempted * 100`, rounded to two decimals; `0.0` when nothing was attempted.
pub fn accuracy(correct: u64, attempted: u64) -> f64 {
    if attempted == 0 {
        return 0.0;
    }
    let raw = correct as f64 / attempted as f64 * 100.0;
    (raw * 100.0).round() / 100.0
}

/// Keeps only the latest attempt (highest id) for each question.
pub fn latest_attempts(attempts: &[AttemptRecord]) -> HashMap<Uuid, &AttemptRecord> {
    let mut latest: HashMap<Uuid, &AttemptRecord> = HashMap::new();
    for attempt in attempts {
        latest
            .entry(attempt.question_id)
            .and_modify(|current| {
                if attempt.id > current.id {
                    *current = attempt;
                }
            })
            .or_insert(attempt);
    }
    latest
}

/// Builds the snapshot for one document from that user's attempts on it.
pub fn summarize_document(
    document: &Document,
    total_questions: u64,
    attempts: &[AttemptRecord],
) -> DocumentProgress {
    let latest = latest_attempts(attempts);
    let attempted = latest.len() as u64;
    let correct = latest.values().filter(|a| a.is_correct).count() as u64;

    DocumentProgress {
        document_id: document.id,
        document_filename: document.filename.clone(),
        total_questions,
        questions_attempted: attempted,
        questions_correct: correct,
        questions_incorrect: attempted - correct,
        accuracy_percentage: accuracy(correct, attempted),
        // The single most recent event, not the most recent of the latest-per-question set.
        last_attempt: attempts.iter().map(|a| a.created_at).max(),
    }
}

/// Groups a user's whole attempt log by document, in document id order.
pub fn group_by_document(attempts: Vec<AttemptRecord>) -> BTreeMap<Uuid, Vec<AttemptRecord>> {
    let mut grouped: BTreeMap<Uuid, Vec<AttemptRecord>> = BTreeMap::new();
    for attempt in attempts {
        grouped.entry(attempt.document_id).or_default().push(attempt);
    }
    grouped
}

/// Sums per-document snapshots. Documents without attempts are left out, and the
/// overall accuracy is recomputed from the sums rather than averaged.
pub fn rollup(documents: Vec<DocumentProgress>) -> OverallProgress {
    let documents: Vec<DocumentProgress> = documents
        .into_iter()
        .filter(|d| d.questions_attempted > 0)
        .collect();

    let total_questions_attempted = documents.iter().map(|d| d.questions_attempted).sum();
    let total_correct = documents.iter().map(|d| d.questions_correct).sum();
    let total_incorrect = documents.iter().map(|d| d.questions_incorrect).sum();

    OverallProgress {
        total_documents_studied: documents.len() as u64,
        total_questions_attempted,
        total_correct,
        total_incorrect,
        overall_accuracy: accuracy(total_correct, total_questions_attempted),
        documents,
    }
}

/// Orders a question's attempts newest first and counts them. Unlike the document
/// snapshot, every attempt counts here, not only the latest one.
pub fn question_history(question: &Question, mut attempts: Vec<AttemptRecord>) -> QuestionHistory {
    attempts.sort_by(|a, b| b.id.cmp(&a.id));
    let total = attempts.len() as u64;
    let correct = attempts.iter().filter(|a| a.is_correct).count() as u64;

    QuestionHistory {
        question_id: question.id,
        question_text: question.question_text.clone(),
        total_attempts: total,
        correct_attempts: correct,
        incorrect_attempts: total - correct,
        accuracy_percentage: accuracy(correct, total),
        history: attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn document() -> Document {
        Document {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            filename: "notes.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            page_count: 3,
            created_at: base_time(),
        }
    }

    fn attempt(id: i64, question_id: Uuid, is_correct: bool, minutes: i64) -> AttemptRecord {
        AttemptRecord {
            id,
            user_id: Uuid::nil(),
            document_id: Uuid::nil(),
            question_id,
            selected_choice_id: "A".to_string(),
            is_correct,
            created_at: base_time() + Duration::minutes(minutes),
        }
    }

    fn snapshot(attempted: u64, correct: u64) -> DocumentProgress {
        DocumentProgress {
            document_id: Uuid::new_v4(),
            document_filename: "doc.txt".to_string(),
            total_questions: 10,
            questions_attempted: attempted,
            questions_correct: correct,
            questions_incorrect: attempted - correct,
            accuracy_percentage: accuracy(correct, attempted),
            last_attempt: None,
        }
    }

    #[test]
    fn latest_attempt_per_question_decides_correctness() {
        let q1 = Uuid::new_v4();
        let q2 = Uuid::new_v4();
        let attempts = vec![
            attempt(10, q1, false, 0),
            attempt(15, q1, true, 5),
            attempt(12, q2, false, 2),
        ];

        let stats = summarize_document(&document(), 4, &attempts);

        assert_eq!(stats.total_questions, 4);
        assert_eq!(stats.questions_attempted, 2);
        assert_eq!(stats.questions_correct, 1);
        assert_eq!(stats.questions_incorrect, 1);
        assert_eq!(stats.accuracy_percentage, 50.0);
    }

    #[test]
    fn latest_is_chosen_by_id_not_by_input_order() {
        let q1 = Uuid::new_v4();
        let attempts = vec![attempt(15, q1, true, 5), attempt(10, q1, false, 0)];
        let stats = summarize_document(&document(), 1, &attempts);
        assert_eq!(stats.questions_correct, 1);
    }

    #[test]
    fn last_attempt_is_most_recent_event_overall() {
        let q1 = Uuid::new_v4();
        let q2 = Uuid::new_v4();
        let attempts = vec![
            attempt(1, q1, true, 0),
            attempt(2, q2, false, 30),
            attempt(3, q1, true, 10),
        ];
        let stats = summarize_document(&document(), 2, &attempts);
        assert_eq!(stats.last_attempt, Some(base_time() + Duration::minutes(30)));
    }

    #[test]
    fn no_attempts_gives_zero_accuracy() {
        let stats = summarize_document(&document(), 7, &[]);
        assert_eq!(stats.questions_attempted, 0);
        assert_eq!(stats.accuracy_percentage, 0.0);
        assert_eq!(stats.last_attempt, None);
        assert_eq!(accuracy(0, 0), 0.0);
    }

    #[test]
    fn accuracy_is_rounded_to_two_decimals() {
        assert_eq!(accuracy(1, 3), 33.33);
        assert_eq!(accuracy(2, 3), 66.67);
    }

    #[test]
    fn rollup_recomputes_accuracy_from_sums() {
        let overall = rollup(vec![snapshot(4, 3), snapshot(6, 3)]);
        assert_eq!(overall.total_documents_studied, 2);
        assert_eq!(overall.total_questions_attempted, 10);
        assert_eq!(overall.total_correct, 6);
        assert_eq!(overall.total_incorrect, 4);
        assert_eq!(overall.overall_accuracy, 60.0);
        // Averaging the per-document figures would give 62.5.
        assert_ne!(overall.overall_accuracy, (75.0 + 50.0) / 2.0);
    }

    #[test]
    fn rollup_skips_documents_without_attempts() {
        let overall = rollup(vec![snapshot(0, 0), snapshot(2, 1)]);
        assert_eq!(overall.total_documents_studied, 1);
        assert_eq!(overall.documents.len(), 1);
        assert_eq!(overall.overall_accuracy, 50.0);
    }

    #[test]
    fn empty_rollup_is_all_zero() {
        let overall = rollup(Vec::new());
        assert_eq!(overall.total_documents_studied, 0);
        assert_eq!(overall.overall_accuracy, 0.0);
    }

    #[test]
    fn grouping_splits_by_document() {
        let d1 = Uuid::new_v4();
        let d2 = Uuid::new_v4();
        let q = Uuid::new_v4();
        let mut a = attempt(1, q, true, 0);
        a.document_id = d1;
        let mut b = attempt(2, q, false, 1);
        b.document_id = d2;
        let mut c = attempt(3, q, true, 2);
        c.document_id = d1;

        let grouped = group_by_document(vec![a, b, c]);
        assert_eq!(grouped[&d1].len(), 2);
        assert_eq!(grouped[&d2].len(), 1);
    }

    #[test]
    fn history_is_newest_first_and_counts_every_attempt() {
        let q = Uuid::new_v4();
        let question = Question {
            id: q,
            document_id: Uuid::new_v4(),
            page_number: 1,
            question_text: "Why?".to_string(),
            choices: Vec::new(),
            correct_choice_id: "A".to_string(),
            explanation: None,
            created_at: base_time(),
        };
        let history = question_history(
            &question,
            vec![attempt(4, q, false, 0), attempt(9, q, true, 3), attempt(6, q, true, 1)],
        );

        let ids: Vec<i64> = history.history.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![9, 6, 4]);
        assert_eq!(history.total_attempts, 3);
        assert_eq!(history.correct_attempts, 2);
        assert_eq!(history.incorrect_attempts, 1);
        assert_eq!(history.accuracy_percentage, 66.67);
    }
}
