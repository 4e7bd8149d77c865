use std::sync::mpsc;

use keeper_core::{
    ArchiveFormat, Completion, FormatOutcome, FormatSet, JobId, LinkId, ScreenshotFormat,
};

/// Progress notifications emitted while jobs run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    JobStarted {
        job_id: JobId,
        link_id: LinkId,
        formats: FormatSet,
        attempt: u32,
    },
    FormatFinished {
        link_id: LinkId,
        format: ArchiveFormat,
        outcome: FormatOutcome,
    },
    JobFinished {
        job_id: JobId,
        link_id: LinkId,
        completion: Completion,
    },
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: EngineEvent) {}
}

pub struct ChannelProgressSink {
    tx: mpsc::Sender<EngineEvent>,
}

impl ChannelProgressSink {
    pub fn new(tx: mpsc::Sender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}

/// A fully buffered HTTP response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutput {
    pub bytes: Vec<u8>,
    pub metadata: FetchMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchMetadata {
    pub original_url: String,
    pub final_url: String,
    pub content_type: Option<String>,
    pub byte_len: u64,
}

/// One artifact produced by a fetcher, fully in memory and not yet stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub format: ArchiveFormat,
    pub extension: &'static str,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

impl Capture {
    pub fn new(format: ArchiveFormat, screenshot: ScreenshotFormat, bytes: Vec<u8>) -> Self {
        Self {
            format,
            extension: format.extension(screenshot),
            content_type: format.content_type(screenshot),
            bytes,
        }
    }
}
