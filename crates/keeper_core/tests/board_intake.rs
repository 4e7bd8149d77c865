use std::sync::Once;
use std::time::{Duration, Instant};

use keeper_core::{
    ArchiveFormat, BoardError, Completion, Enqueued, FailureKind, FetchError, FormatSet, JobBoard,
    JobReport, JobResult, JobStatus, RetryPolicy,
};
use pretty_assertions::assert_eq;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

fn formats(list: &[ArchiveFormat]) -> FormatSet {
    list.iter().copied().collect()
}

fn board() -> JobBoard {
    JobBoard::new(RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_secs(10),
        multiplier: 2.0,
    })
}

fn report(link_id: i64, outcomes: &[(ArchiveFormat, Option<FailureKind>)]) -> JobReport {
    let mut report = JobReport::new(link_id);
    for (format, failure) in outcomes {
        let outcome = match failure {
            None => Ok(format!("archives/1/{link_id}.{format}")),
            Some(kind) => Err(FetchError::new(kind.clone(), "test")),
        };
        report.record(*format, outcome);
    }
    report
}

#[test]
fn enqueue_then_dequeue_runs_job_once() {
    init_logging();
    let mut board = board();
    let now = Instant::now();

    let enqueued = board.enqueue(7, formats(&[ArchiveFormat::Pdf]));
    assert_eq!(enqueued, Enqueued::Queued(1));

    let job = board.dequeue(now).expect("job ready");
    assert_eq!(job.link_id, 7);
    assert_eq!(job.attempts, 1);
    assert_eq!(job.status, JobStatus::Running);
    assert!(board.dequeue(now).is_none());
}

#[test]
fn empty_format_set_is_skipped() {
    let mut board = board();
    assert_eq!(board.enqueue(1, FormatSet::new()), Enqueued::Skipped);
    assert!(!board.is_tracked(1));
}

#[test]
fn second_enqueue_for_pending_link_coalesces_formats() {
    let mut board = board();
    let first = board.enqueue(3, formats(&[ArchiveFormat::Monolith]));
    let second = board.enqueue(3, formats(&[ArchiveFormat::Screenshot]));

    assert_eq!(first, Enqueued::Queued(1));
    assert_eq!(second, Enqueued::Coalesced(1));

    let job = board.dequeue(Instant::now()).unwrap();
    assert_eq!(
        job.formats,
        formats(&[ArchiveFormat::Monolith, ArchiveFormat::Screenshot])
    );
    assert!(board.dequeue(Instant::now()).is_none());
}

#[test]
fn enqueue_while_running_is_parked_until_completion() {
    let mut board = board();
    let now = Instant::now();
    board.enqueue(5, formats(&[ArchiveFormat::Pdf]));
    let running = board.dequeue(now).unwrap();

    let deferred = board.enqueue(5, formats(&[ArchiveFormat::Readability]));
    assert_eq!(deferred, Enqueued::Deferred(2));
    assert!(board.dequeue(now).is_none(), "same link must not run twice");
    assert_eq!(board.counts().parked, 1);

    let done = board
        .mark_result(running.id, &report(5, &[(ArchiveFormat::Pdf, None)]), now)
        .unwrap();
    assert_eq!(done, Completion::Finished { result: JobResult::Success });

    let next = board.dequeue(now).expect("parked job released");
    assert_eq!(next.id, 2);
    assert_eq!(next.formats, formats(&[ArchiveFormat::Readability]));
}

#[test]
fn different_links_run_concurrently() {
    let mut board = board();
    let now = Instant::now();
    board.enqueue(1, formats(&[ArchiveFormat::Pdf]));
    board.enqueue(2, formats(&[ArchiveFormat::Pdf]));

    assert!(board.dequeue(now).is_some());
    assert!(board.dequeue(now).is_some());
    assert_eq!(board.counts().running, 2);
}

#[test]
fn retry_covers_only_retryable_failed_formats() {
    let mut board = board();
    let now = Instant::now();
    board.enqueue(
        9,
        formats(&[
            ArchiveFormat::Pdf,
            ArchiveFormat::Monolith,
            ArchiveFormat::Readability,
        ]),
    );
    let job = board.dequeue(now).unwrap();

    let outcome = report(
        9,
        &[
            (ArchiveFormat::Pdf, None),
            (ArchiveFormat::Monolith, Some(FailureKind::Network)),
            (ArchiveFormat::Readability, Some(FailureKind::ExtractionEmpty)),
        ],
    );
    let completion = board.mark_result(job.id, &outcome, now).unwrap();
    assert_eq!(
        completion,
        Completion::RetryScheduled {
            result: JobResult::Partial,
            retry_job: 2,
            formats: formats(&[ArchiveFormat::Monolith]),
            delay: Duration::from_secs(10),
        }
    );

    assert!(board.dequeue(now).is_none(), "retry waits for its backoff");
    assert_eq!(board.next_due(), Some(now + Duration::from_secs(10)));

    let retry = board.dequeue(now + Duration::from_secs(10)).expect("retry due");
    assert_eq!(retry.formats, formats(&[ArchiveFormat::Monolith]));
    assert_eq!(retry.attempts, 2);
}

#[test]
fn retries_stop_at_max_attempts() {
    let mut board = board();
    let mut now = Instant::now();
    board.enqueue(4, formats(&[ArchiveFormat::Screenshot]));
    let failing = report(4, &[(ArchiveFormat::Screenshot, Some(FailureKind::Timeout))]);

    let mut completions = Vec::new();
    while let Some(job) = board.dequeue(now) {
        completions.push(board.mark_result(job.id, &failing, now).unwrap());
        now += Duration::from_secs(3600);
    }

    assert_eq!(completions.len(), 3);
    assert_eq!(
        completions.last(),
        Some(&Completion::Finished { result: JobResult::Failed })
    );
    assert!(!board.is_tracked(4));
    assert_eq!(board.counts().failed, 3);
}

#[test]
fn record_missing_is_never_retried() {
    let mut board = board();
    let now = Instant::now();
    board.enqueue(8, formats(&[ArchiveFormat::Pdf]));
    let job = board.dequeue(now).unwrap();

    let completion = board
        .mark_result(
            job.id,
            &report(8, &[(ArchiveFormat::Pdf, Some(FailureKind::RecordMissing))]),
            now,
        )
        .unwrap();
    assert_eq!(completion, Completion::Finished { result: JobResult::Failed });
}

#[test]
fn explicit_request_promotes_scheduled_retry() {
    let mut board = board();
    let now = Instant::now();
    board.enqueue(6, formats(&[ArchiveFormat::Monolith]));
    let job = board.dequeue(now).unwrap();
    board
        .mark_result(
            job.id,
            &report(6, &[(ArchiveFormat::Monolith, Some(FailureKind::Network))]),
            now,
        )
        .unwrap();

    let enqueued = board.enqueue(6, formats(&[ArchiveFormat::Pdf]));
    assert_eq!(enqueued, Enqueued::Coalesced(2));
    let promoted = board.dequeue(now).expect("promoted without waiting");
    assert_eq!(
        promoted.formats,
        formats(&[ArchiveFormat::Pdf, ArchiveFormat::Monolith])
    );
}

#[test]
fn backfill_enqueue_leaves_tracked_links_alone() {
    let mut board = board();
    board.enqueue(2, formats(&[ArchiveFormat::Pdf]));

    assert_eq!(
        board.enqueue_if_idle(2, formats(&[ArchiveFormat::Monolith])),
        Enqueued::Skipped
    );
    assert_eq!(
        board.enqueue_if_idle(3, formats(&[ArchiveFormat::Monolith])),
        Enqueued::Queued(2)
    );
}

#[test]
fn cancel_link_drops_waiting_job() {
    let mut board = board();
    board.enqueue(11, formats(&[ArchiveFormat::Pdf]));

    assert_eq!(board.cancel_link(11), Some(1));
    assert!(board.dequeue(Instant::now()).is_none());
    assert!(!board.is_tracked(11));
}

#[test]
fn mark_result_rejects_unknown_job() {
    let mut board = board();
    let err = board
        .mark_result(42, &JobReport::new(1), Instant::now())
        .unwrap_err();
    assert_eq!(err, BoardError::NotRunning(42));
}
