use std::collections::BTreeMap;
use std::fmt;

use crate::failure::{FailureKind, FetchError};
use crate::format::{ArchiveFormat, FormatSet};
use crate::link::LinkId;

/// Stored path on success, typed failure otherwise.
pub type FormatOutcome = Result<String, FetchError>;

/// Aggregate outcome of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobResult {
    /// Every requested format succeeded.
    Success,
    /// At least one format succeeded, at least one failed.
    Partial,
    /// No format succeeded.
    Failed,
}

impl fmt::Display for JobResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobResult::Success => write!(f, "success"),
            JobResult::Partial => write!(f, "partial"),
            JobResult::Failed => write!(f, "failed"),
        }
    }
}

/// Per-format outcomes of one preservation run for one link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub link_id: LinkId,
    pub outcomes: BTreeMap<ArchiveFormat, FormatOutcome>,
}

impl JobReport {
    pub fn new(link_id: LinkId) -> Self {
        Self {
            link_id,
            outcomes: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, format: ArchiveFormat, outcome: FormatOutcome) {
        self.outcomes.insert(format, outcome);
    }

    /// Report where every format in `formats` failed with the same kind.
    pub fn all_failed(link_id: LinkId, formats: &FormatSet, kind: FailureKind, message: &str) -> Self {
        let mut report = Self::new(link_id);
        for format in formats {
            report.record(*format, Err(FetchError::new(kind.clone(), message)));
        }
        report
    }

    pub fn outcome(&self, format: ArchiveFormat) -> Option<&FormatOutcome> {
        self.outcomes.get(&format)
    }

    pub fn result(&self) -> JobResult {
        let succeeded = self.outcomes.values().filter(|o| o.is_ok()).count();
        if succeeded == self.outcomes.len() {
            JobResult::Success
        } else if succeeded > 0 {
            JobResult::Partial
        } else {
            JobResult::Failed
        }
    }

    pub fn succeeded(&self) -> FormatSet {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.is_ok())
            .map(|(format, _)| *format)
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = (ArchiveFormat, &FetchError)> {
        self.outcomes
            .iter()
            .filter_map(|(format, outcome)| outcome.as_ref().err().map(|err| (*format, err)))
    }

    /// Failed formats worth another attempt.
    pub fn retryable(&self) -> FormatSet {
        self.failures()
            .filter(|(_, err)| err.kind.is_retryable())
            .map(|(format, _)| format)
            .collect()
    }
}
