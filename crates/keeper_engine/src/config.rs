use std::path::PathBuf;
use std::time::Duration;

use keeper_core::{ArchiveFormat, RetryPolicy, ScreenshotFormat};

const MIB: u64 = 1024 * 1024;

/// HTTP client behaviour shared by every fetcher.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub connect_timeout: Duration,
    pub redirect_limit: usize,
    pub user_agent: String,
    /// Deadline for each subresource inlined into a monolith snapshot.
    pub resource_timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            redirect_limit: 5,
            user_agent: concat!("link-keeper/", env!("CARGO_PKG_VERSION")).to_string(),
            resource_timeout: Duration::from_secs(15),
        }
    }
}

/// Per-format fetcher timeouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatTimeouts {
    pub pdf: Duration,
    pub monolith: Duration,
    pub screenshot: Duration,
    pub readability: Duration,
}

impl FormatTimeouts {
    pub fn uniform(timeout: Duration) -> Self {
        Self {
            pdf: timeout,
            monolith: timeout,
            screenshot: timeout,
            readability: timeout,
        }
    }

    pub fn get(&self, format: ArchiveFormat) -> Duration {
        match format {
            ArchiveFormat::Pdf => self.pdf,
            ArchiveFormat::Monolith => self.monolith,
            ArchiveFormat::Screenshot => self.screenshot,
            ArchiveFormat::Readability => self.readability,
        }
    }
}

impl Default for FormatTimeouts {
    fn default() -> Self {
        Self {
            pdf: Duration::from_secs(60),
            monolith: Duration::from_secs(90),
            screenshot: Duration::from_secs(60),
            readability: Duration::from_secs(30),
        }
    }
}

/// Headless browser used for screenshots.
#[derive(Debug, Clone)]
pub struct RendererSettings {
    pub chromium_path: PathBuf,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            chromium_path: PathBuf::from("chromium"),
            viewport_width: 1280,
            viewport_height: 800,
        }
    }
}

/// Everything the preservation pipeline needs, passed in explicitly at construction.
#[derive(Debug, Clone)]
pub struct PreservationConfig {
    pub max_pdf_buffer_bytes: u64,
    /// Cap on a fetched HTML page (monolith and readability).
    pub max_page_bytes: u64,
    /// Cap on each subresource inlined into a monolith snapshot.
    pub max_resource_bytes: u64,
    pub per_format_timeout: FormatTimeouts,
    pub job_timeout: Duration,
    pub screenshot_format: ScreenshotFormat,
    pub http: HttpSettings,
    pub renderer: RendererSettings,
    pub retry: RetryPolicy,
}

impl Default for PreservationConfig {
    fn default() -> Self {
        Self {
            max_pdf_buffer_bytes: 100 * MIB,
            max_page_bytes: 20 * MIB,
            max_resource_bytes: 10 * MIB,
            per_format_timeout: FormatTimeouts::default(),
            job_timeout: Duration::from_secs(300),
            screenshot_format: ScreenshotFormat::Png,
            http: HttpSettings::default(),
            renderer: RendererSettings::default(),
            retry: RetryPolicy::default(),
        }
    }
}
