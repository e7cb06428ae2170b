//! services/api/src/study/background.rs
//!
//! The background runner that completes question generation for pages 2..N.
//!
//! Jobs are plain values (document id, the remaining pages, the per-page count)
//! pushed onto a bounded queue and drained by a fixed number of worker tasks.
//! A job re-fetches the document through its own connection, commits each page on
//! its own, and reports progress through a status registry that callers can poll
//! or await. Jobs for the same document run one at a time: while one is queued or
//! running, later jobs for that document wait in a per-document backlog outside the
//! shared queue, so they never occupy a worker.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use study_core::{
    domain::Page,
    ports::{DatabaseService, GenerationService},
};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::study::generation::generate_page_questions;

/// Finished jobs beyond this many are forgotten, oldest first.
const MAX_TRACKED_JOBS: usize = 1024;

//=========================================================================================
// Jobs and Their Status
//=========================================================================================

/// The work left over after page 1: an immutable snapshot, never a live handle.
#[derive(Debug, Clone)]
pub struct CompletionJob {
    pub id: Uuid,
    pub document_id: Uuid,
    pub pages: Vec<Page>,
    pub items_per_page: u8,
}

impl CompletionJob {
    pub fn new(document_id: Uuid, pages: Vec<Page>, items_per_page: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id,
            pages,
            items_per_page,
        }
    }

    fn first_page(&self) -> u32 {
        self.pages.first().map(|p| p.number).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Running {
        page: u32,
    },
    Completed {
        pages_processed: u32,
        questions_created: u64,
        skipped_pages: Vec<u32>,
    },
    /// The job stopped early. `page` is `None` when the document lookup failed.
    Failed {
        page: Option<u32>,
        reason: String,
    },
    /// Shutdown reached the job before `page` was processed.
    Cancelled {
        page: u32,
    },
    /// The queue was full when the job was submitted.
    Rejected,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, JobStatus::Queued | JobStatus::Running { .. })
    }
}

#[derive(Debug, thiserror::Error)]
#[error("background queue is full or shut down")]
pub struct QueueFull;

struct JobRegistry {
    inner: StdMutex<RegistryInner>,
    capacity: usize,
}

#[derive(Default)]
struct RegistryInner {
    channels: HashMap<Uuid, watch::Sender<JobStatus>>,
    order: VecDeque<Uuid>,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::with_capacity(MAX_TRACKED_JOBS)
    }
}

impl JobRegistry {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: StdMutex::new(RegistryInner::default()),
            capacity,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, job_id: Uuid, status: JobStatus) {
        let mut inner = self.lock();
        let (sender, _) = watch::channel(status);
        inner.channels.insert(job_id, sender);
        inner.order.push_back(job_id);

        // Unfinished jobs are never evicted, wherever they sit in the order.
        while inner.order.len() > self.capacity {
            let RegistryInner { channels, order } = &mut *inner;
            let Some(position) = order.iter().position(|id| {
                channels
                    .get(id)
                    .map_or(true, |s| s.borrow().is_finished())
            }) else {
                break;
            };
            if let Some(evicted) = order.remove(position) {
                channels.remove(&evicted);
            }
        }
    }

    fn set(&self, job_id: Uuid, status: JobStatus) {
        if let Some(sender) = self.lock().channels.get(&job_id) {
            sender.send_replace(status);
        }
    }

    fn get(&self, job_id: Uuid) -> Option<JobStatus> {
        self.lock().channels.get(&job_id).map(|s| s.borrow().clone())
    }

    fn subscribe(&self, job_id: Uuid) -> Option<watch::Receiver<JobStatus>> {
        self.lock().channels.get(&job_id).map(|s| s.subscribe())
    }
}

//=========================================================================================
// The Runner
//=========================================================================================

/// What a job needs to run; every field is a shared, independently usable handle.
#[derive(Clone)]
pub struct JobContext {
    pub db: Arc<dyn DatabaseService>,
    pub generator: Arc<dyn GenerationService>,
    pub char_budget: usize,
}

/// Documents with a job in the shared queue or on a worker, and the jobs waiting
/// behind them.
#[derive(Default)]
struct DocumentBacklog {
    active: HashSet<Uuid>,
    waiting: HashMap<Uuid, VecDeque<CompletionJob>>,
    waiting_len: usize,
}

impl DocumentBacklog {
    /// Hands out the next waiting job for `document_id`, or frees the document.
    fn next_for(&mut self, document_id: Uuid) -> Option<CompletionJob> {
        let next = self
            .waiting
            .get_mut(&document_id)
            .and_then(VecDeque::pop_front);
        match next {
            Some(job) => {
                self.waiting_len -= 1;
                if self.waiting.get(&document_id).is_some_and(VecDeque::is_empty) {
                    self.waiting.remove(&document_id);
                }
                Some(job)
            }
            None => {
                self.active.remove(&document_id);
                None
            }
        }
    }

    fn drain(&mut self) -> Vec<CompletionJob> {
        self.active.clear();
        self.waiting_len = 0;
        self.waiting.drain().flat_map(|(_, jobs)| jobs).collect()
    }
}

type SharedBacklog = Arc<StdMutex<DocumentBacklog>>;

fn lock_backlog(backlog: &StdMutex<DocumentBacklog>) -> std::sync::MutexGuard<'_, DocumentBacklog> {
    backlog.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct BackgroundRunner {
    sender: mpsc::Sender<CompletionJob>,
    receiver: Arc<Mutex<mpsc::Receiver<CompletionJob>>>,
    registry: Arc<JobRegistry>,
    backlog: SharedBacklog,
    backlog_capacity: usize,
    shutdown: CancellationToken,
    workers: StdMutex<Vec<JoinHandle<()>>>,
}

impl BackgroundRunner {
    /// Spawns `workers` worker tasks sharing a queue of `queue_capacity` jobs.
    /// Up to `queue_capacity` further jobs may wait behind a busy document.
    /// Cancelling `shutdown` stops them between pages.
    pub fn start(
        ctx: JobContext,
        workers: usize,
        queue_capacity: usize,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let queue_capacity = queue_capacity.max(1);
        let (sender, receiver) = mpsc::channel(queue_capacity);
        let receiver = Arc::new(Mutex::new(receiver));
        let registry = Arc::new(JobRegistry::default());
        let backlog = SharedBacklog::default();

        let handles = (0..workers.max(1))
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    ctx.clone(),
                    receiver.clone(),
                    registry.clone(),
                    backlog.clone(),
                    shutdown.clone(),
                ))
            })
            .collect();

        Arc::new(Self {
            sender,
            receiver,
            registry,
            backlog,
            backlog_capacity: queue_capacity,
            shutdown,
            workers: StdMutex::new(handles),
        })
    }

    /// Queues a job without waiting. A full queue marks the job `Rejected`.
    ///
    /// A job whose document already has one queued or running is parked until that
    /// one finishes; the worker that finishes it picks the parked job up next.
    pub fn submit(&self, job: CompletionJob) -> Result<(), QueueFull> {
        let job_id = job.id;
        let document_id = job.document_id;
        self.registry.insert(job_id, JobStatus::Queued);

        let accepted = !self.shutdown.is_cancelled() && {
            let mut backlog = lock_backlog(&self.backlog);
            if backlog.active.contains(&document_id) {
                if backlog.waiting_len < self.backlog_capacity {
                    backlog.waiting.entry(document_id).or_default().push_back(job);
                    backlog.waiting_len += 1;
                    info!(
                        "Background job {} waits behind another job for document {}",
                        job_id, document_id
                    );
                    true
                } else {
                    false
                }
            } else if self.sender.try_send(job).is_ok() {
                backlog.active.insert(document_id);
                true
            } else {
                false
            }
        };

        if !accepted {
            warn!(
                "Background queue rejected job {} for document {}",
                job_id, document_id
            );
            self.registry.set(job_id, JobStatus::Rejected);
            return Err(QueueFull);
        }

        info!("Queued background job {} for document {}", job_id, document_id);
        Ok(())
    }

    pub fn status(&self, job_id: Uuid) -> Option<JobStatus> {
        self.registry.get(job_id)
    }

    /// Resolves once the job has reached a final status.
    pub async fn wait_until_finished(&self, job_id: Uuid) -> Option<JobStatus> {
        let mut receiver = self.registry.subscribe(job_id)?;
        let status = receiver.wait_for(|s| s.is_finished()).await.ok()?.clone();
        Some(status)
    }

    /// Stops the workers and marks jobs that never started as cancelled.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handles = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        futures::future::join_all(handles).await;

        let mut never_started = Vec::new();
        {
            let mut receiver = self.receiver.lock().await;
            while let Ok(job) = receiver.try_recv() {
                never_started.push(job);
            }
        }
        never_started.extend(lock_backlog(&self.backlog).drain());

        for job in never_started {
            self.registry.set(
                job.id,
                JobStatus::Cancelled {
                    page: job.first_page(),
                },
            );
        }
        info!("Background runner stopped");
    }
}

//=========================================================================================
// Workers
//=========================================================================================

async fn worker_loop(
    worker_id: usize,
    ctx: JobContext,
    receiver: Arc<Mutex<mpsc::Receiver<CompletionJob>>>,
    registry: Arc<JobRegistry>,
    backlog: SharedBacklog,
    shutdown: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            job = async { receiver.lock().await.recv().await } => job,
        };
        let Some(mut job) = next else {
            break;
        };

        // The worker owns the document until its backlog is empty.
        loop {
            let document_id = job.document_id;
            run_isolated(&ctx, job, &registry, &shutdown).await;

            if shutdown.is_cancelled() {
                break;
            }
            let waiting = lock_backlog(&backlog).next_for(document_id);
            match waiting {
                Some(waiting) => job = waiting,
                None => break,
            }
        }
    }
    info!("Background worker {} exiting", worker_id);
}

/// Runs one job in its own task so a panic cannot take the worker down with it.
async fn run_isolated(
    ctx: &JobContext,
    job: CompletionJob,
    registry: &Arc<JobRegistry>,
    shutdown: &CancellationToken,
) {
    let job_id = job.id;
    let handle = tokio::spawn(run_job(ctx.clone(), job, registry.clone(), shutdown.clone()));
    if let Err(e) = handle.await {
        error!("Background job {} aborted: {}", job_id, e);
        registry.set(
            job_id,
            JobStatus::Failed {
                page: None,
                reason: format!("job aborted: {}", e),
            },
        );
    }
}

struct CompletionSummary {
    pages_processed: u32,
    questions_created: u64,
    skipped_pages: Vec<u32>,
}

enum Halt {
    Cancelled { page: u32 },
    Failed { page: Option<u32>, reason: String },
}

async fn run_job(
    ctx: JobContext,
    job: CompletionJob,
    registry: Arc<JobRegistry>,
    shutdown: CancellationToken,
) {
    info!(
        "Background job {} started for document {} ({} pages)",
        job.id,
        job.document_id,
        job.pages.len()
    );

    let status = match complete_pages(&ctx, &job, &registry, &shutdown).await {
        Ok(summary) => {
            info!(
                "Background job {} completed all pages for document {}: {} questions",
                job.id, job.document_id, summary.questions_created
            );
            JobStatus::Completed {
                pages_processed: summary.pages_processed,
                questions_created: summary.questions_created,
                skipped_pages: summary.skipped_pages,
            }
        }
        Err(Halt::Cancelled { page }) => {
            warn!("Background job {} cancelled before page {}", job.id, page);
            JobStatus::Cancelled { page }
        }
        Err(Halt::Failed { page, reason }) => {
            error!(
                "Background job {} for document {} failed: {}",
                job.id, job.document_id, reason
            );
            JobStatus::Failed { page, reason }
        }
    };
    registry.set(job.id, status);
}

async fn complete_pages(
    ctx: &JobContext,
    job: &CompletionJob,
    registry: &JobRegistry,
    shutdown: &CancellationToken,
) -> Result<CompletionSummary, Halt> {
    let document = ctx
        .db
        .get_document_by_id(job.document_id)
        .await
        .map_err(|e| Halt::Failed {
            page: None,
            reason: format!("document lookup failed: {}", e),
        })?;

    let mut summary = CompletionSummary {
        pages_processed: 0,
        questions_created: 0,
        skipped_pages: Vec::new(),
    };

    for page in &job.pages {
        if shutdown.is_cancelled() {
            return Err(Halt::Cancelled { page: page.number });
        }
        if page.is_blank() {
            continue;
        }
        registry.set(job.id, JobStatus::Running { page: page.number });

        let questions = match generate_page_questions(
            ctx.generator.as_ref(),
            page,
            job.items_per_page,
            ctx.char_budget,
        )
        .await
        {
            Ok(questions) => questions,
            Err(e) => {
                warn!(
                    "Skipping page {} of document {}: {}",
                    page.number, document.id, e
                );
                summary.skipped_pages.push(page.number);
                continue;
            }
        };

        let stored = if questions.is_empty() {
            0
        } else {
            ctx.db
                .save_questions(document.id, questions)
                .await
                .map_err(|e| Halt::Failed {
                    page: Some(page.number),
                    reason: format!("storing page {} failed: {}", page.number, e),
                })?
                .len()
        };

        summary.pages_processed += 1;
        summary.questions_created += stored as u64;
        info!(
            "Stored {} questions for page {} of document {}",
            stored, page.number, document.id
        );
    }

    Ok(summary)
}
