use std::sync::Arc;

use chrono::Utc;
use keeper_core::{Completion, LinkId, PreservationJob};
use tokio::task::JoinHandle;

use crate::link_store::LinkStore;
use crate::preserver::Preserver;
use crate::queue::JobQueue;
use crate::EngineEvent;

/// A fixed pool of worker tasks draining one [`JobQueue`].
///
/// Shutdown goes through the queue's cancellation token: workers stop taking
/// new jobs and finish the one in hand.
pub struct WorkerGroup {
    queue: Arc<JobQueue>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    pub fn spawn(
        workers: usize,
        queue: Arc<JobQueue>,
        preserver: Arc<Preserver>,
        links: Arc<dyn LinkStore>,
    ) -> Self {
        let joins = (0..workers.max(1))
            .map(|worker_id| {
                let queue = Arc::clone(&queue);
                let preserver = Arc::clone(&preserver);
                let links = Arc::clone(&links);
                tokio::spawn(async move {
                    worker_loop(worker_id, &queue, &preserver, links.as_ref()).await;
                })
            })
            .collect();
        Self { queue, joins }
    }

    pub fn request_shutdown(&self) {
        self.queue.shutdown_token().cancel();
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        self.join().await;
    }

    /// Wait for every worker to exit.
    pub async fn join(self) {
        for join in self.joins {
            if let Err(err) = join.await {
                engine_logging::engine_error!("Worker task failed: {}", err);
            }
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: &JobQueue,
    preserver: &Preserver,
    links: &dyn LinkStore,
) {
    engine_logging::engine_debug!("Worker {} started", worker_id);
    while let Some(job) = queue.dequeue().await {
        run_job(worker_id, job, queue, preserver, links).await;
    }
    engine_logging::engine_debug!("Worker {} stopped", worker_id);
}

async fn run_job(
    worker_id: usize,
    job: PreservationJob,
    queue: &JobQueue,
    preserver: &Preserver,
    links: &dyn LinkStore,
) {
    engine_logging::engine_info!(
        "Worker {} preserving link {} (job {}, attempt {}): {:?}",
        worker_id,
        job.link_id,
        job.id,
        job.attempts,
        job.formats
    );
    preserver.sink().emit(EngineEvent::JobStarted {
        job_id: job.id,
        link_id: job.link_id,
        formats: job.formats.clone(),
        attempt: job.attempts,
    });

    let generation = match links.get(job.link_id).await {
        Ok(Some(link)) => Some(link.archive_generation),
        Ok(None) => None,
        Err(err) => {
            engine_logging::engine_warn!("Failed to read link {}: {}", job.link_id, err);
            None
        }
    };
    let report = preserver.preserve(job.link_id, &job.formats).await;

    let completion = match queue.mark_result(job.id, &report).await {
        Ok(completion) => completion,
        Err(err) => {
            engine_logging::engine_error!("Could not record result of job {}: {}", job.id, err);
            return;
        }
    };

    match &completion {
        Completion::Finished { result } => {
            engine_logging::engine_info!("Link {} preserved: {}", job.link_id, result);
            mark_preserved(job.link_id, generation, queue, links).await;
        }
        Completion::RetryScheduled {
            result,
            retry_job,
            formats,
            delay,
        } => {
            engine_logging::engine_info!(
                "Link {} {}; retrying {:?} as job {} in {:?}",
                job.link_id,
                result,
                formats,
                retry_job,
                delay
            );
        }
    }

    preserver.sink().emit(EngineEvent::JobFinished {
        job_id: job.id,
        link_id: job.link_id,
        completion,
    });
}

/// Record the link as preserved, unless a newer request for it is queued or
/// arrived since the job started.
async fn mark_preserved(
    link_id: LinkId,
    generation: Option<i64>,
    queue: &JobQueue,
    links: &dyn LinkStore,
) {
    let Some(generation) = generation else {
        return;
    };
    if queue.is_tracked(link_id).await {
        engine_logging::engine_debug!("Link {} has another job pending", link_id);
        return;
    }
    match links.mark_preserved(link_id, generation, Utc::now()).await {
        Ok(true) => {}
        Ok(false) => {
            engine_logging::engine_debug!("Link {} was re-requested, left unpreserved", link_id)
        }
        Err(err) => {
            engine_logging::engine_error!("Failed to mark link {} as preserved: {}", link_id, err)
        }
    }
}
