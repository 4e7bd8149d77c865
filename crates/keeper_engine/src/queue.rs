use std::time::Instant as StdInstant;

use keeper_core::{
    BoardCounts, BoardError, Completion, Enqueued, FormatSet, JobBoard, JobId, JobReport, LinkId,
    PreservationJob, RetryPolicy,
};
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Async front of [`JobBoard`]: workers park in [`JobQueue::dequeue`] until a
/// job is ready, a scheduled retry falls due, or shutdown is requested.
pub struct JobQueue {
    board: Mutex<JobBoard>,
    notify: Notify,
    shutdown: CancellationToken,
}

impl JobQueue {
    pub fn new(policy: RetryPolicy, shutdown: CancellationToken) -> Self {
        Self {
            board: Mutex::new(JobBoard::new(policy)),
            notify: Notify::new(),
            shutdown,
        }
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub async fn enqueue(&self, link_id: LinkId, formats: FormatSet) -> Enqueued {
        let enqueued = self.board.lock().await.enqueue(link_id, formats);
        engine_logging::engine_debug!("Link {} intake: {:?}", link_id, enqueued);
        self.notify.notify_waiters();
        enqueued
    }

    /// Enqueue unless the link already has a pending, scheduled or running job.
    pub async fn enqueue_if_idle(&self, link_id: LinkId, formats: FormatSet) -> Enqueued {
        let enqueued = self.board.lock().await.enqueue_if_idle(link_id, formats);
        if enqueued != Enqueued::Skipped {
            self.notify.notify_waiters();
        }
        enqueued
    }

    /// Wait for the next job. Returns `None` once shutdown is requested.
    pub async fn dequeue(&self) -> Option<PreservationJob> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_due = {
                let mut board = self.board.lock().await;
                if let Some(job) = board.dequeue(now()) {
                    return Some(job);
                }
                board.next_due()
            };

            tokio::select! {
                _ = self.shutdown.cancelled() => return None,
                _ = &mut notified => {}
                _ = sleep_until_due(next_due) => {}
            }
        }
    }

    pub async fn mark_result(
        &self,
        job_id: JobId,
        report: &JobReport,
    ) -> Result<Completion, BoardError> {
        let completion = self.board.lock().await.mark_result(job_id, report, now());
        self.notify.notify_waiters();
        completion
    }

    pub async fn cancel_link(&self, link_id: LinkId) -> Option<JobId> {
        self.board.lock().await.cancel_link(link_id)
    }

    /// Whether a job for `link_id` is running or waiting.
    pub async fn is_tracked(&self, link_id: LinkId) -> bool {
        self.board.lock().await.is_tracked(link_id)
    }

    pub async fn job(&self, job_id: JobId) -> Option<PreservationJob> {
        self.board.lock().await.job(job_id).cloned()
    }

    pub async fn counts(&self) -> BoardCounts {
        self.board.lock().await.counts()
    }
}

/// Board timestamps come from the tokio clock so paused-time tests line up.
fn now() -> StdInstant {
    Instant::now().into_std()
}

async fn sleep_until_due(due: Option<StdInstant>) {
    match due {
        Some(due) => tokio::time::sleep_until(Instant::from_std(due)).await,
        None => std::future::pending().await,
    }
}
