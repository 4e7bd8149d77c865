//! One fetcher per archive format. Fetchers produce a buffered [`Capture`]
//! and never touch the link record or the artifact store.
mod monolith;
mod pdf;
mod readability;
mod screenshot;

use std::sync::Arc;

use keeper_core::{ArchiveFormat, FetchError, Link};
use url::Url;

use crate::config::PreservationConfig;
use crate::http::HttpFetcher;
use crate::readability::ReadabilityExtractor;
use crate::render::{ChromiumRenderer, PageRenderer};
use crate::Capture;

/// Shared collaborators handed to every fetcher.
pub struct FetchContext {
    config: PreservationConfig,
    http: HttpFetcher,
    renderer: Arc<dyn PageRenderer>,
    extractor: ReadabilityExtractor,
}

impl FetchContext {
    pub fn new(
        config: PreservationConfig,
        renderer: Arc<dyn PageRenderer>,
    ) -> Result<Self, FetchError> {
        let http = HttpFetcher::new(&config.http)?;
        Ok(Self {
            config,
            http,
            renderer,
            extractor: ReadabilityExtractor::default(),
        })
    }

    /// Context using a local headless Chromium for screenshots.
    pub fn with_chromium(config: PreservationConfig) -> Result<Self, FetchError> {
        let renderer = Arc::new(ChromiumRenderer::new(config.renderer.clone()));
        Self::new(config, renderer)
    }

    pub fn config(&self) -> &PreservationConfig {
        &self.config
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatFetcher {
    Pdf,
    Monolith,
    Screenshot,
    Readability,
}

impl FormatFetcher {
    pub fn for_format(format: ArchiveFormat) -> Self {
        match format {
            ArchiveFormat::Pdf => Self::Pdf,
            ArchiveFormat::Monolith => Self::Monolith,
            ArchiveFormat::Screenshot => Self::Screenshot,
            ArchiveFormat::Readability => Self::Readability,
        }
    }

    pub fn format(self) -> ArchiveFormat {
        match self {
            Self::Pdf => ArchiveFormat::Pdf,
            Self::Monolith => ArchiveFormat::Monolith,
            Self::Screenshot => ArchiveFormat::Screenshot,
            Self::Readability => ArchiveFormat::Readability,
        }
    }

    /// PDF links get the PDF fetcher only; every other http(s) link gets the
    /// three page fetchers.
    pub fn accepts(self, link: &Link) -> bool {
        let Ok(url) = Url::parse(&link.url) else {
            return false;
        };
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        let is_pdf = url.path().to_ascii_lowercase().ends_with(".pdf");
        match self {
            Self::Pdf => is_pdf,
            Self::Monolith | Self::Screenshot | Self::Readability => !is_pdf,
        }
    }

    pub async fn capture(self, link: &Link, ctx: &FetchContext) -> Result<Capture, FetchError> {
        match self {
            Self::Pdf => pdf::capture(link, ctx).await,
            Self::Monolith => monolith::capture(link, ctx).await,
            Self::Screenshot => screenshot::capture(link, ctx).await,
            Self::Readability => readability::capture(link, ctx).await,
        }
    }
}
