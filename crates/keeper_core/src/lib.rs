//! Link keeper core: domain types and the pure job intake state machine.
mod board;
mod failure;
mod format;
mod job;
mod link;
mod report;

pub use board::{BoardCounts, BoardError, Completion, Enqueued, JobBoard, RetryPolicy};
pub use failure::{FailureKind, FetchError};
pub use format::{all_formats, ArchiveFormat, FormatSet, ParseFormatError, ScreenshotFormat};
pub use job::{JobId, JobStatus, PreservationJob};
pub use link::{artifact_link_id, artifact_path, CollectionId, Link, LinkId, NewLink, ARCHIVE_ROOT};
pub use report::{FormatOutcome, JobReport, JobResult};
