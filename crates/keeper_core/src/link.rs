use chrono::{DateTime, Utc};

use crate::format::{ArchiveFormat, FormatSet, ScreenshotFormat};

pub type LinkId = i64;
pub type CollectionId = i64;

/// Root namespace of every artifact path.
pub const ARCHIVE_ROOT: &str = "archives";

/// A bookmark and the references to its stored artifacts.
///
/// An artifact reference is only ever set after the artifact was fully written,
/// so a `Some` path always points at readable bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub id: LinkId,
    pub collection_id: CollectionId,
    pub url: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub pdf: Option<String>,
    pub monolith: Option<String>,
    pub screenshot: Option<String>,
    pub readable: Option<String>,
    /// Set once the worker reached a terminal result for the link.
    pub preserved_at: Option<DateTime<Utc>>,
    /// Bumped on every re-archive request. A job only marks the link
    /// preserved if no request arrived after it started.
    pub archive_generation: i64,
}

impl Link {
    pub fn artifact(&self, format: ArchiveFormat) -> Option<&str> {
        match format {
            ArchiveFormat::Pdf => self.pdf.as_deref(),
            ArchiveFormat::Monolith => self.monolith.as_deref(),
            ArchiveFormat::Screenshot => self.screenshot.as_deref(),
            ArchiveFormat::Readability => self.readable.as_deref(),
        }
    }

    pub fn set_artifact(&mut self, format: ArchiveFormat, path: Option<String>) {
        let slot = match format {
            ArchiveFormat::Pdf => &mut self.pdf,
            ArchiveFormat::Monolith => &mut self.monolith,
            ArchiveFormat::Screenshot => &mut self.screenshot,
            ArchiveFormat::Readability => &mut self.readable,
        };
        *slot = path;
    }

    /// All artifact paths currently referenced by this link.
    pub fn artifact_paths(&self) -> Vec<&str> {
        ArchiveFormat::ALL
            .iter()
            .filter_map(|format| self.artifact(*format))
            .collect()
    }

    /// Formats out of `candidates` that have no stored artifact yet.
    pub fn missing_formats(&self, candidates: &FormatSet) -> FormatSet {
        candidates
            .iter()
            .copied()
            .filter(|format| self.artifact(*format).is_none())
            .collect()
    }

    /// Deterministic storage path of `format` for this link.
    pub fn artifact_path(&self, format: ArchiveFormat, screenshot: ScreenshotFormat) -> String {
        artifact_path(self.collection_id, self.id, format.extension(screenshot))
    }

    /// Every path this link could own, whatever the screenshot configuration was
    /// when it was archived.
    pub fn possible_artifact_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = ArchiveFormat::ALL
            .iter()
            .map(|format| self.artifact_path(*format, ScreenshotFormat::Png))
            .collect();
        paths.push(self.artifact_path(ArchiveFormat::Screenshot, ScreenshotFormat::Jpeg));
        paths
    }
}

/// A link as submitted, before it has an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLink {
    pub collection_id: CollectionId,
    pub url: String,
    pub name: String,
    pub description: String,
}

impl NewLink {
    pub fn new(collection_id: CollectionId, url: impl Into<String>) -> Self {
        Self {
            collection_id,
            url: url.into(),
            name: String::new(),
            description: String::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// `archives/{collection_id}/{link_id}.{ext}`
pub fn artifact_path(collection_id: CollectionId, link_id: LinkId, extension: &str) -> String {
    format!("{ARCHIVE_ROOT}/{collection_id}/{link_id}.{extension}")
}

/// Link id of a path laid out by [`artifact_path`].
pub fn artifact_link_id(path: &str) -> Option<LinkId> {
    let mut parts = path.split('/');
    let (Some(root), Some(_collection), Some(file), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };
    if root != ARCHIVE_ROOT {
        return None;
    }
    let (stem, _) = file.split_once('.')?;
    stem.parse().ok()
}
