//! services/api/src/adapters/rate_limit.rs
//!
//! A `GenerationService` decorator that spaces out calls to the wrapped service.
//!
//! Every caller, foreground request or background job, goes through the same
//! instance, so the minimum interval holds for the whole process.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use study_core::{
    domain::{FlashcardCandidate, QuestionCandidate},
    ports::{GenerationService, PortResult},
};
use tokio::sync::Mutex;
use tokio::time::Instant;

pub struct RateLimitedGeneration {
    inner: Arc<dyn GenerationService>,
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimitedGeneration {
    pub fn new(inner: Arc<dyn GenerationService>, min_interval: Duration) -> Self {
        Self {
            inner,
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// Waits until `min_interval` has passed since the previous call started.
    async fn wait_turn(&self) {
        if self.min_interval.is_zero() {
            return;
        }
        // Holding the lock while sleeping queues concurrent callers in order.
        let mut last_call = self.last_call.lock().await;
        if let Some(previous) = *last_call {
            tokio::time::sleep_until(previous + self.min_interval).await;
        }
        *last_call = Some(Instant::now());
    }
}

#[async_trait]
impl GenerationService for RateLimitedGeneration {
    async fn generate_questions(
        &self,
        page_text: &str,
        count: u8,
    ) -> PortResult<Vec<QuestionCandidate>> {
        self.wait_turn().await;
        self.inner.generate_questions(page_text, count).await
    }

    async fn generate_flashcards(
        &self,
        page_text: &str,
        count: u8,
    ) -> PortResult<Vec<FlashcardCandidate>> {
        self.wait_turn().await;
        self.inner.generate_flashcards(page_text, count).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingGenerator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GenerationService for CountingGenerator {
        async fn generate_questions(&self, _: &str, _: u8) -> PortResult<Vec<QuestionCandidate>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        async fn generate_flashcards(&self, _: &str, _: u8) -> PortResult<Vec<FlashcardCandidate>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_calls_are_spaced_by_the_interval() {
        let inner = Arc::new(CountingGenerator {
            calls: AtomicUsize::new(0),
        });
        let limited = RateLimitedGeneration::new(inner.clone(), Duration::from_millis(500));

        let started = Instant::now();
        limited.generate_questions("a", 1).await.unwrap();
        limited.generate_flashcards("b", 1).await.unwrap();
        limited.generate_questions("c", 1).await.unwrap();

        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_does_not_wait() {
        let inner = Arc::new(CountingGenerator {
            calls: AtomicUsize::new(0),
        });
        let limited = RateLimitedGeneration::new(inner, Duration::ZERO);

        let started = Instant::now();
        limited.generate_questions("a", 1).await.unwrap();
        limited.generate_questions("b", 1).await.unwrap();
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
