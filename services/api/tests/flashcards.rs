mod common;

use api_lib::error::StudyError;
use api_lib::study::FlashcardSource;
use common::Harness;
use uuid::Uuid;

#[tokio::test]
async fn second_call_returns_the_stored_set() {
    let h = Harness::new(&["Alpha", "Beta"]);
    let doc = h.document(2);

    let (first, source) = h
        .state
        .flashcards
        .get_or_generate(h.user_id, doc.id, 2)
        .await
        .unwrap();
    assert_eq!(source, FlashcardSource::Generated);
    assert_eq!(first.len(), 4);

    // A different count does not regenerate or top up the set.
    let (second, source) = h
        .state
        .flashcards
        .get_or_generate(h.user_id, doc.id, 5)
        .await
        .unwrap();
    assert_eq!(source, FlashcardSource::Cached);
    let first_ids: Vec<Uuid> = first.iter().map(|f| f.id).collect();
    let second_ids: Vec<Uuid> = second.iter().map(|f| f.id).collect();
    assert_eq!(first_ids, second_ids);
    assert_eq!(h.db.flashcard_saves(), 1);
    assert_eq!(h.generator.calls().len(), 2);
}

#[tokio::test]
async fn concurrent_first_calls_store_one_set() {
    let h = Harness::new(&["[slow] Alpha", "[slow] Beta"]);
    let doc = h.document(2);

    let cache = h.state.flashcards.clone();
    let (a, b) = tokio::join!(
        cache.get_or_generate(h.user_id, doc.id, 1),
        cache.get_or_generate(h.user_id, doc.id, 1),
    );
    let (a, source_a) = a.unwrap();
    let (b, source_b) = b.unwrap();

    assert_eq!(h.db.flashcard_saves(), 1);
    assert_eq!(
        a.iter().map(|f| f.id).collect::<Vec<_>>(),
        b.iter().map(|f| f.id).collect::<Vec<_>>()
    );
    let mut sources = vec![source_a, source_b];
    sources.sort_by_key(|s| s.as_str());
    assert_eq!(sources, vec![FlashcardSource::Cached, FlashcardSource::Generated]);
}

#[tokio::test]
async fn blank_documents_have_no_extractable_text() {
    let h = Harness::new(&["", "  \n\t"]);
    let doc = h.document(2);

    let err = h
        .state
        .flashcards
        .get_or_generate(h.user_id, doc.id, 3)
        .await
        .unwrap_err();
    assert!(matches!(err, StudyError::NoExtractableText));
    assert!(h.generator.calls().is_empty());
}

#[tokio::test]
async fn no_candidates_at_all_is_generation_empty() {
    let h = Harness::new(&["[empty] one", "[fail] two"]);
    let doc = h.document(2);

    let err = h
        .state
        .flashcards
        .get_or_generate(h.user_id, doc.id, 3)
        .await
        .unwrap_err();
    assert!(matches!(err, StudyError::GenerationEmpty));
    assert_eq!(h.db.flashcard_saves(), 0);
}

#[tokio::test]
async fn a_failing_page_is_skipped_when_others_produce_cards() {
    let h = Harness::new(&["[fail] one", "", "three"]);
    let doc = h.document(3);

    let (cards, source) = h
        .state
        .flashcards
        .get_or_generate(h.user_id, doc.id, 2)
        .await
        .unwrap();
    assert_eq!(source, FlashcardSource::Generated);
    assert_eq!(cards.len(), 2);
    assert!(cards.iter().all(|c| c.front.starts_with("three")));
}

#[tokio::test]
async fn count_is_validated_and_ownership_enforced() {
    let h = Harness::new(&["Alpha"]);
    let doc = h.document(1);

    let err = h
        .state
        .flashcards
        .get_or_generate(h.user_id, doc.id, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, StudyError::Validation(_)));

    let err = h
        .state
        .flashcards
        .get_or_generate(Uuid::new_v4(), doc.id, 2)
        .await
        .unwrap_err();
    assert!(matches!(err, StudyError::NotFound(_)));
}
