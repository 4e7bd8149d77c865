use std::time::Duration;

use futures_util::StreamExt;
use keeper_core::{FailureKind, FetchError};
use reqwest::header::CONTENT_TYPE;

use crate::config::HttpSettings;
use crate::{FetchMetadata, FetchOutput};

pub const HTML_CONTENT_TYPES: &[&str] = &["text/html", "application/xhtml+xml"];

/// Acceptance rules for one response body.
#[derive(Debug, Clone)]
pub struct BodyLimits<'a> {
    pub max_bytes: u64,
    /// Accepted media types; empty accepts anything.
    pub content_types: &'a [&'a str],
    /// Accept responses without a `Content-Type` header.
    pub allow_missing_type: bool,
    /// Whole-request deadline; `None` leaves it to the caller's own timeout.
    pub timeout: Option<Duration>,
}

/// Shared HTTP client. Bodies are always buffered completely, with a running
/// size check so an oversized response is abandoned as soon as it crosses the cap.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(settings: &HttpSettings) -> Result<Self, FetchError> {
        let redirect_limit = settings.redirect_limit;
        let policy = reqwest::redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= redirect_limit {
                attempt.error("redirect limit exceeded")
            } else {
                attempt.follow()
            }
        });

        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .user_agent(settings.user_agent.clone())
            .redirect(policy)
            .build()
            .map_err(|err| FetchError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self { client })
    }

    pub async fn get(&self, url: &str, limits: &BodyLimits<'_>) -> Result<FetchOutput, FetchError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;

        let mut request = self.client.get(parsed);
        if let Some(timeout) = limits.timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await.map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        if let Some(content_len) = response.content_length() {
            if content_len > limits.max_bytes {
                return Err(too_large(limits.max_bytes, content_len));
            }
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        match content_type.as_deref() {
            Some(ct) if !is_content_type_allowed(ct, limits.content_types) => {
                return Err(FetchError::new(
                    FailureKind::UnsupportedContent {
                        content_type: ct.to_string(),
                    },
                    "unexpected content type",
                ));
            }
            None if !limits.allow_missing_type => {
                return Err(FetchError::new(
                    FailureKind::UnsupportedContent {
                        content_type: "unknown".to_string(),
                    },
                    "response has no content type",
                ));
            }
            _ => {}
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = bytes.len() as u64 + chunk.len() as u64;
            if next_len > limits.max_bytes {
                return Err(too_large(limits.max_bytes, next_len));
            }
            bytes.extend_from_slice(&chunk);
        }

        let metadata = FetchMetadata {
            original_url: url.to_string(),
            final_url,
            content_type,
            byte_len: bytes.len() as u64,
        };
        Ok(FetchOutput { bytes, metadata })
    }
}

/// Media type without parameters, lowercased.
pub fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
        .to_ascii_lowercase()
}

fn is_content_type_allowed(content_type: &str, allowed: &[&str]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    let ct = essence(content_type);
    allowed.iter().any(|candidate| candidate.eq_ignore_ascii_case(&ct))
}

fn too_large(max_bytes: u64, actual: u64) -> FetchError {
    FetchError::new(
        FailureKind::SizeExceeded {
            max_bytes,
            actual: Some(actual),
        },
        "response too large",
    )
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_redirect() {
        return FetchError::new(FailureKind::RedirectLimitExceeded, err.to_string());
    }
    FetchError::new(FailureKind::Network, err.to_string())
}
