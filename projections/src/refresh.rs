//! Bounded background refresh queue.
//!
//! Bulk reads from the primary store re-project what they loaded so that the
//! index heals itself after a flush. Those refreshes must never hold up the
//! read, so they are queued here and run by a dispatcher task with a fixed
//! concurrency limit.
//!
//! ```text
//! submit() ──try_send──▶ [ bounded mpsc ] ──▶ dispatcher ──acquire permit──▶ spawn(job)
//!     │ full
//!     └──▶ dropped (logged, counted)
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Notify, Semaphore, mpsc};
use tokio::task::JoinHandle;

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Refresh queue sizing.
#[derive(Debug, Clone, Copy)]
pub struct RefreshConfig {
    /// Jobs waiting for a permit before new ones are dropped
    pub capacity: usize,
    /// Jobs running at the same time
    pub max_concurrency: usize,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            max_concurrency: 8,
        }
    }
}

/// Handle for submitting fire-and-forget refresh jobs.
///
/// Cloning is cheap; all clones feed the same dispatcher. The dispatcher
/// stops once every handle has been dropped and queued jobs have run.
#[derive(Clone)]
pub struct RefreshQueue {
    sender: mpsc::Sender<Job>,
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl RefreshQueue {
    /// Start the dispatcher on the current tokio runtime.
    #[must_use]
    pub fn spawn(config: RefreshConfig) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(config.capacity.max(1));
        let pending = Arc::new(AtomicUsize::new(0));
        let idle = Arc::new(Notify::new());

        let handle = tokio::spawn(dispatch(
            receiver,
            config.max_concurrency.max(1),
            Arc::clone(&pending),
            Arc::clone(&idle),
        ));

        (
            Self {
                sender,
                pending,
                idle,
            },
            handle,
        )
    }

    /// Queue a job without waiting. Returns `false` if it was dropped.
    pub fn submit<F>(&self, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.pending.fetch_add(1, Ordering::SeqCst);
        match self.sender.try_send(Box::pin(job)) {
            Ok(()) => true,
            Err(e) => {
                let reason = match e {
                    mpsc::error::TrySendError::Full(_) => "full",
                    mpsc::error::TrySendError::Closed(_) => "closed",
                };
                tracing::debug!(reason, "Refresh job dropped");
                metrics::counter!("theater_refresh_dropped_total").increment(1);
                finish(&self.pending, &self.idle);
                false
            }
        }
    }

    /// Jobs queued or running.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Wait until every submitted job has finished.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

async fn dispatch(
    mut receiver: mpsc::Receiver<Job>,
    max_concurrency: usize,
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
) {
    let permits = Arc::new(Semaphore::new(max_concurrency));

    while let Some(job) = receiver.recv().await {
        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            break;
        };
        let pending = Arc::clone(&pending);
        let idle = Arc::clone(&idle);
        tokio::spawn(async move {
            job.await;
            drop(permit);
            finish(&pending, &idle);
        });
    }

    tracing::debug!("Refresh dispatcher stopped");
}

fn finish(pending: &AtomicUsize, idle: &Notify) {
    if pending.fetch_sub(1, Ordering::SeqCst) == 1 {
        idle.notify_waiters();
    }
}
