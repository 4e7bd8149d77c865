//! Job intake state machine.
//!
//! Pure bookkeeping with no clock or IO of its own: callers pass `now` in.
//! The board guarantees at most one running job per link; later requests for a
//! busy link are merged into the single waiting job of that link.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::format::FormatSet;
use crate::job::{JobId, JobStatus, PreservationJob};
use crate::link::LinkId;
use crate::report::{JobReport, JobResult};

/// Job-level retry policy with exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per job including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// `base_delay * multiplier^(attempts - 1)`; falls back to `base_delay` when
    /// the multiplier produces a negative or non-finite delay.
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(self.base_delay)
    }
}

/// What `enqueue` did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// New job ready to be dequeued.
    Queued(JobId),
    /// Merged into the link's waiting job.
    Coalesced(JobId),
    /// Link has a running job; new job parked until it completes.
    Deferred(JobId),
    /// Nothing to do (empty format set, or link already tracked).
    Skipped,
}

impl Enqueued {
    pub fn job_id(self) -> Option<JobId> {
        match self {
            Enqueued::Queued(id) | Enqueued::Coalesced(id) | Enqueued::Deferred(id) => Some(id),
            Enqueued::Skipped => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Finished {
        result: JobResult,
    },
    RetryScheduled {
        result: JobResult,
        retry_job: JobId,
        formats: FormatSet,
        delay: Duration,
    },
}

impl Completion {
    pub fn result(&self) -> JobResult {
        match self {
            Completion::Finished { result } | Completion::RetryScheduled { result, .. } => *result,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    #[error("job {0} is not running")]
    NotRunning(JobId),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BoardCounts {
    pub ready: usize,
    pub scheduled: usize,
    pub parked: usize,
    pub running: usize,
    pub succeeded: usize,
    pub partial: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Ready,
    Scheduled(Instant),
    Parked,
    Running,
}

#[derive(Debug, Clone)]
struct Entry {
    job: PreservationJob,
    placement: Placement,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct LinkSlot {
    running: Option<JobId>,
    waiting: Option<JobId>,
}

impl LinkSlot {
    fn is_empty(&self) -> bool {
        self.running.is_none() && self.waiting.is_none()
    }
}

#[derive(Debug)]
pub struct JobBoard {
    policy: RetryPolicy,
    next_job_id: JobId,
    entries: HashMap<JobId, Entry>,
    ready: VecDeque<JobId>,
    scheduled: BTreeSet<(Instant, JobId)>,
    links: HashMap<LinkId, LinkSlot>,
    succeeded: usize,
    partial: usize,
    failed: usize,
}

impl Default for JobBoard {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl JobBoard {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            next_job_id: 1,
            entries: HashMap::new(),
            ready: VecDeque::new(),
            scheduled: BTreeSet::new(),
            links: HashMap::new(),
            succeeded: 0,
            partial: 0,
            failed: 0,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Request preservation of `formats` for `link_id`.
    pub fn enqueue(&mut self, link_id: LinkId, formats: FormatSet) -> Enqueued {
        if formats.is_empty() {
            return Enqueued::Skipped;
        }
        let slot = self.links.get(&link_id).copied().unwrap_or_default();
        if let Some(waiting) = slot.waiting {
            self.merge_into(waiting, formats, 0, slot.running.is_some());
            return Enqueued::Coalesced(waiting);
        }

        let id = self.allocate_id();
        if slot.running.is_some() {
            self.insert_waiting(link_id, id, formats, 0, Placement::Parked);
            Enqueued::Deferred(id)
        } else {
            self.insert_waiting(link_id, id, formats, 0, Placement::Ready);
            Enqueued::Queued(id)
        }
    }

    /// Like [`JobBoard::enqueue`] but leaves links the board already tracks alone,
    /// so periodic backfill never short-circuits a scheduled retry.
    pub fn enqueue_if_idle(&mut self, link_id: LinkId, formats: FormatSet) -> Enqueued {
        if self.is_tracked(link_id) {
            return Enqueued::Skipped;
        }
        self.enqueue(link_id, formats)
    }

    /// Take the next ready job, promoting retries that are due at `now`.
    pub fn dequeue(&mut self, now: Instant) -> Option<PreservationJob> {
        self.promote_due(now);
        while let Some(id) = self.ready.pop_front() {
            let Some(entry) = self.entries.get_mut(&id) else {
                continue;
            };
            if entry.placement != Placement::Ready {
                continue;
            }
            entry.placement = Placement::Running;
            entry.job.status = JobStatus::Running;
            entry.job.attempts += 1;
            let job = entry.job.clone();

            let slot = self.links.entry(job.link_id).or_default();
            if slot.waiting == Some(id) {
                slot.waiting = None;
            }
            slot.running = Some(id);
            return Some(job);
        }
        None
    }

    /// Record the outcome of a running job and decide on a job-level retry.
    ///
    /// Only failed formats whose failure is retryable are carried into the retry.
    pub fn mark_result(
        &mut self,
        job_id: JobId,
        report: &JobReport,
        now: Instant,
    ) -> Result<Completion, BoardError> {
        match self.entries.get(&job_id) {
            Some(entry) if entry.placement == Placement::Running => {}
            _ => return Err(BoardError::NotRunning(job_id)),
        }
        let Some(entry) = self.entries.remove(&job_id) else {
            return Err(BoardError::NotRunning(job_id));
        };
        let job = entry.job;
        let result = report.result();
        match result {
            JobResult::Success => self.succeeded += 1,
            JobResult::Partial => self.partial += 1,
            JobResult::Failed => self.failed += 1,
        }

        let slot = self.links.entry(job.link_id).or_default();
        if slot.running == Some(job_id) {
            slot.running = None;
        }
        let waiting = slot.waiting;

        let retry: FormatSet = report
            .retryable()
            .intersection(&job.formats)
            .copied()
            .collect();
        let can_retry = !retry.is_empty() && job.attempts < self.policy.max_attempts;

        if let Some(waiting) = waiting {
            // A request arrived while running; it goes next and carries the retry.
            let carried = if can_retry { retry.clone() } else { FormatSet::new() };
            let attempts = if can_retry { job.attempts } else { 0 };
            self.merge_into(waiting, carried, attempts, false);
            return Ok(if can_retry {
                Completion::RetryScheduled {
                    result,
                    retry_job: waiting,
                    formats: retry,
                    delay: Duration::ZERO,
                }
            } else {
                Completion::Finished { result }
            });
        }

        if can_retry {
            let delay = self.policy.next_delay(job.attempts);
            let id = self.allocate_id();
            self.insert_waiting(
                job.link_id,
                id,
                retry.clone(),
                job.attempts,
                Placement::Scheduled(now + delay),
            );
            Ok(Completion::RetryScheduled {
                result,
                retry_job: id,
                formats: retry,
                delay,
            })
        } else {
            self.release_slot_if_empty(job.link_id);
            Ok(Completion::Finished { result })
        }
    }

    /// Drop the waiting (not running) job of a link, e.g. after the link was deleted.
    pub fn cancel_link(&mut self, link_id: LinkId) -> Option<JobId> {
        let slot = self.links.get_mut(&link_id)?;
        let waiting = slot.waiting.take()?;
        if let Some(entry) = self.entries.remove(&waiting) {
            self.unplace(waiting, entry.placement);
        }
        self.release_slot_if_empty(link_id);
        Some(waiting)
    }

    pub fn job(&self, job_id: JobId) -> Option<&PreservationJob> {
        self.entries.get(&job_id).map(|entry| &entry.job)
    }

    pub fn is_tracked(&self, link_id: LinkId) -> bool {
        self.links.contains_key(&link_id)
    }

    pub fn has_ready(&self) -> bool {
        !self.ready.is_empty()
    }

    /// Earliest instant a scheduled retry becomes due.
    pub fn next_due(&self) -> Option<Instant> {
        self.scheduled.first().map(|(at, _)| *at)
    }

    pub fn counts(&self) -> BoardCounts {
        let mut counts = BoardCounts {
            succeeded: self.succeeded,
            partial: self.partial,
            failed: self.failed,
            ..BoardCounts::default()
        };
        for entry in self.entries.values() {
            match entry.placement {
                Placement::Ready => counts.ready += 1,
                Placement::Scheduled(_) => counts.scheduled += 1,
                Placement::Parked => counts.parked += 1,
                Placement::Running => counts.running += 1,
            }
        }
        counts
    }

    fn allocate_id(&mut self) -> JobId {
        let id = self.next_job_id;
        self.next_job_id += 1;
        id
    }

    fn insert_waiting(
        &mut self,
        link_id: LinkId,
        id: JobId,
        formats: FormatSet,
        attempts: u32,
        placement: Placement,
    ) {
        let job = PreservationJob {
            id,
            link_id,
            formats,
            attempts,
            status: JobStatus::Pending,
        };
        self.entries.insert(id, Entry { job, placement });
        self.place(id, placement);
        self.links.entry(link_id).or_default().waiting = Some(id);
    }

    /// Merge formats into a waiting job. The job becomes ready unless the link
    /// is still running, in which case it stays parked.
    fn merge_into(&mut self, id: JobId, formats: FormatSet, attempts: u32, link_running: bool) {
        let Some(entry) = self.entries.get_mut(&id) else {
            return;
        };
        entry.job.formats.extend(formats);
        entry.job.attempts = entry.job.attempts.max(attempts);
        let old = entry.placement;
        let new = if link_running {
            Placement::Parked
        } else {
            Placement::Ready
        };
        if old != new {
            entry.placement = new;
            self.unplace(id, old);
            self.place(id, new);
        }
    }

    fn place(&mut self, id: JobId, placement: Placement) {
        match placement {
            Placement::Ready => self.ready.push_back(id),
            Placement::Scheduled(at) => {
                self.scheduled.insert((at, id));
            }
            Placement::Parked | Placement::Running => {}
        }
    }

    fn unplace(&mut self, id: JobId, placement: Placement) {
        match placement {
            Placement::Ready => self.ready.retain(|queued| *queued != id),
            Placement::Scheduled(at) => {
                self.scheduled.remove(&(at, id));
            }
            Placement::Parked | Placement::Running => {}
        }
    }

    fn promote_due(&mut self, now: Instant) {
        while let Some(&(at, id)) = self.scheduled.first() {
            if at > now {
                break;
            }
            self.scheduled.remove(&(at, id));
            if let Some(entry) = self.entries.get_mut(&id) {
                if entry.placement == Placement::Scheduled(at) {
                    entry.placement = Placement::Ready;
                    self.ready.push_back(id);
                }
            }
        }
    }

    fn release_slot_if_empty(&mut self, link_id: LinkId) {
        if self
            .links
            .get(&link_id)
            .map(LinkSlot::is_empty)
            .unwrap_or(false)
        {
            self.links.remove(&link_id);
        }
    }
}
