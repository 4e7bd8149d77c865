use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One archival representation of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    Pdf,
    Monolith,
    Screenshot,
    Readability,
}

impl ArchiveFormat {
    pub const ALL: [ArchiveFormat; 4] = [
        ArchiveFormat::Pdf,
        ArchiveFormat::Monolith,
        ArchiveFormat::Screenshot,
        ArchiveFormat::Readability,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ArchiveFormat::Pdf => "pdf",
            ArchiveFormat::Monolith => "monolith",
            ArchiveFormat::Screenshot => "screenshot",
            ArchiveFormat::Readability => "readability",
        }
    }

    /// File extension of the stored artifact.
    pub fn extension(self, screenshot: ScreenshotFormat) -> &'static str {
        match self {
            ArchiveFormat::Pdf => "pdf",
            ArchiveFormat::Monolith => "html",
            ArchiveFormat::Screenshot => screenshot.extension(),
            ArchiveFormat::Readability => "json",
        }
    }

    /// MIME type served for the stored artifact.
    pub fn content_type(self, screenshot: ScreenshotFormat) -> &'static str {
        match self {
            ArchiveFormat::Pdf => "application/pdf",
            ArchiveFormat::Monolith => "text/html; charset=utf-8",
            ArchiveFormat::Screenshot => screenshot.content_type(),
            ArchiveFormat::Readability => "application/json",
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown archive format `{0}` (expected pdf, monolith, screenshot or readability)")]
pub struct ParseFormatError(pub String);

impl FromStr for ArchiveFormat {
    type Err = ParseFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        match lowered.as_str() {
            "pdf" => Ok(ArchiveFormat::Pdf),
            "monolith" | "html" => Ok(ArchiveFormat::Monolith),
            "screenshot" | "image" => Ok(ArchiveFormat::Screenshot),
            "readability" | "readable" => Ok(ArchiveFormat::Readability),
            _ => Err(ParseFormatError(s.to_string())),
        }
    }
}

/// Raster format produced by the screenshot fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenshotFormat {
    #[default]
    Png,
    Jpeg,
}

impl ScreenshotFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ScreenshotFormat::Png => "png",
            ScreenshotFormat::Jpeg => "jpeg",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ScreenshotFormat::Png => "image/png",
            ScreenshotFormat::Jpeg => "image/jpeg",
        }
    }
}

impl FromStr for ScreenshotFormat {
    type Err = ParseFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(ScreenshotFormat::Png),
            "jpeg" | "jpg" => Ok(ScreenshotFormat::Jpeg),
            _ => Err(ParseFormatError(s.to_string())),
        }
    }
}

/// Ordered set of requested formats; ordering keeps logs and reports stable.
pub type FormatSet = BTreeSet<ArchiveFormat>;

pub fn all_formats() -> FormatSet {
    ArchiveFormat::ALL.into_iter().collect()
}
