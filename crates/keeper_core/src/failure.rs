use std::fmt;

/// Why one format of one link could not be preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    Network,
    HttpStatus(u16),
    RedirectLimitExceeded,
    Timeout,
    SizeExceeded { max_bytes: u64, actual: Option<u64> },
    UnsupportedContent { content_type: String },
    ExtractionEmpty,
    Render,
    Storage,
    RecordMissing,
}

impl FailureKind {
    /// Whether a later attempt of the same job could plausibly succeed.
    ///
    /// Deterministic failures (the content itself is the problem, or the link
    /// is gone) are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            FailureKind::Network
            | FailureKind::Timeout
            | FailureKind::Render
            | FailureKind::Storage => true,
            FailureKind::HttpStatus(code) => *code == 429 || *code >= 500,
            FailureKind::InvalidUrl
            | FailureKind::RedirectLimitExceeded
            | FailureKind::SizeExceeded { .. }
            | FailureKind::UnsupportedContent { .. }
            | FailureKind::ExtractionEmpty
            | FailureKind::RecordMissing => false,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::Network => write!(f, "network error"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::RedirectLimitExceeded => write!(f, "redirect limit exceeded"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::SizeExceeded { max_bytes, actual } => match actual {
                Some(actual) => write!(f, "size exceeded (max {max_bytes}, got {actual})"),
                None => write!(f, "size exceeded (max {max_bytes})"),
            },
            FailureKind::UnsupportedContent { content_type } => {
                write!(f, "unsupported content {content_type}")
            }
            FailureKind::ExtractionEmpty => write!(f, "no readable content"),
            FailureKind::Render => write!(f, "render failed"),
            FailureKind::Storage => write!(f, "storage error"),
            FailureKind::RecordMissing => write!(f, "link record missing"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}: {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for FetchError {}
