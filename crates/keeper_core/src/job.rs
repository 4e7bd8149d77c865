use crate::format::FormatSet;
use crate::link::LinkId;
use crate::report::JobResult;

pub type JobId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Pending,
    Running,
    PartialSuccess,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::PartialSuccess | JobStatus::Succeeded | JobStatus::Failed
        )
    }
}

impl From<JobResult> for JobStatus {
    fn from(result: JobResult) -> Self {
        match result {
            JobResult::Success => JobStatus::Succeeded,
            JobResult::Partial => JobStatus::PartialSuccess,
            JobResult::Failed => JobStatus::Failed,
        }
    }
}

/// One request to (re)archive a link in one or more formats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreservationJob {
    pub id: JobId,
    pub link_id: LinkId,
    pub formats: FormatSet,
    /// Attempts already started, including the current one while running.
    pub attempts: u32,
    pub status: JobStatus,
}
