use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::Utc;
use keeper_core::{
    artifact_link_id, ArchiveFormat, Enqueued, Link, LinkId, NewLink, ScreenshotFormat,
};
use thiserror::Error;

use crate::link_store::{LinkStore, LinkStoreError};
use crate::preserver::Preserver;
use crate::queue::JobQueue;
use crate::store::{ArtifactStore, StoreError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("link {0} not found")]
    LinkNotFound(LinkId),
    #[error("link {link_id} has no {format} archive")]
    NotArchived {
        link_id: LinkId,
        format: ArchiveFormat,
    },
    #[error(transparent)]
    Links(#[from] LinkStoreError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("storage task failed: {0}")]
    Blocking(String),
}

/// Stored artifact bytes with the content type to serve them as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactContent {
    pub path: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Entry points used by the web layer and the command line.
pub struct ArchiveService {
    links: Arc<dyn LinkStore>,
    store: Arc<dyn ArtifactStore>,
    queue: Arc<JobQueue>,
    screenshot_format: ScreenshotFormat,
}

impl ArchiveService {
    pub fn new(
        links: Arc<dyn LinkStore>,
        store: Arc<dyn ArtifactStore>,
        queue: Arc<JobQueue>,
        screenshot_format: ScreenshotFormat,
    ) -> Self {
        Self {
            links,
            store,
            queue,
            screenshot_format,
        }
    }

    /// Store a new link and queue every format its URL supports.
    pub async fn submit(&self, link: NewLink) -> Result<(Link, Enqueued), ServiceError> {
        let link = self.links.insert(link).await?;
        let formats = Preserver::supported_formats(&link);
        if formats.is_empty() {
            engine_logging::engine_warn!(
                "Link {} ({}) cannot be archived in any format",
                link.id,
                link.url
            );
        }
        let enqueued = self.queue.enqueue(link.id, formats).await;
        engine_logging::engine_info!("Submitted link {} ({})", link.id, link.url);
        Ok((link, enqueued))
    }

    /// Clear the `format` reference of a link and archive it again.
    ///
    /// The old file is left where it is: the next capture overwrites it in
    /// place, and [`Self::sweep_orphans`] reclaims it if that never happens.
    /// A job already running for the link may still commit to that path.
    pub async fn rearchive(
        &self,
        link_id: LinkId,
        format: ArchiveFormat,
    ) -> Result<Enqueued, ServiceError> {
        if !self.links.set_artifact(link_id, format, None).await? {
            return Err(ServiceError::LinkNotFound(link_id));
        }
        self.links.reset_preserved(link_id).await?;

        let enqueued = self
            .queue
            .enqueue(link_id, BTreeSet::from([format]))
            .await;
        engine_logging::engine_info!("Re-archiving {} for link {}", format, link_id);
        Ok(enqueued)
    }

    /// Delete a link, every artifact it may own, and its queued work.
    pub async fn delete_link(&self, link_id: LinkId) -> Result<Link, ServiceError> {
        let link = self
            .links
            .delete(link_id)
            .await?
            .ok_or(ServiceError::LinkNotFound(link_id))?;

        let mut paths: BTreeSet<String> = link
            .artifact_paths()
            .into_iter()
            .map(str::to_string)
            .collect();
        paths.extend(link.possible_artifact_paths());
        self.delete_paths(paths.into_iter().collect()).await?;

        if let Some(job_id) = self.queue.cancel_link(link_id).await {
            engine_logging::engine_debug!("Cancelled job {} of deleted link {}", job_id, link_id);
        }
        engine_logging::engine_info!("Deleted link {} and its archives", link_id);
        Ok(link)
    }

    /// Bytes and content type of one stored format of a link.
    pub async fn read_artifact(
        &self,
        link_id: LinkId,
        format: ArchiveFormat,
    ) -> Result<ArtifactContent, ServiceError> {
        let link = self
            .links
            .get(link_id)
            .await?
            .ok_or(ServiceError::LinkNotFound(link_id))?;
        let path = link
            .artifact(format)
            .ok_or(ServiceError::NotArchived { link_id, format })?
            .to_string();

        let store = Arc::clone(&self.store);
        let target = path.clone();
        let bytes = tokio::task::spawn_blocking(move || store.read(&target))
            .await
            .map_err(|err| ServiceError::Blocking(err.to_string()))??;

        Ok(ArtifactContent {
            content_type: content_type_for(format, &path, self.screenshot_format),
            path,
            bytes,
        })
    }

    /// Queue links that were never preserved for the formats they still lack.
    /// Links already tracked by the queue are left alone. Returns how many
    /// links were queued.
    pub async fn backfill(&self, limit: u32) -> Result<usize, ServiceError> {
        let mut queued = 0;
        for link in self.links.unpreserved(limit).await? {
            let missing = link.missing_formats(&Preserver::supported_formats(&link));
            if missing.is_empty() {
                self.links
                    .mark_preserved(link.id, link.archive_generation, Utc::now())
                    .await?;
                continue;
            }
            match self.queue.enqueue_if_idle(link.id, missing).await {
                Enqueued::Skipped => {}
                enqueued => {
                    engine_logging::engine_debug!("Backfill link {}: {:?}", link.id, enqueued);
                    queued += 1;
                }
            }
        }
        Ok(queued)
    }

    /// Delete stored artifacts no link references. Files of links still
    /// waiting to be preserved are kept, since a job may be about to
    /// reference them. Returns the deleted paths.
    pub async fn sweep_orphans(&self) -> Result<Vec<String>, ServiceError> {
        let store = Arc::clone(&self.store);
        let stored = tokio::task::spawn_blocking(move || store.list())
            .await
            .map_err(|err| ServiceError::Blocking(err.to_string()))??;

        // Read after listing: a commit that lands in between is either
        // unpreserved or referenced by now.
        let pending: HashSet<LinkId> = self.links.unpreserved_ids().await?.into_iter().collect();
        let referenced: HashSet<String> = self.links.referenced_paths().await?.into_iter().collect();

        let orphans: Vec<String> = stored
            .into_iter()
            .filter(|path| !referenced.contains(path))
            .filter(|path| !artifact_link_id(path).is_some_and(|id| pending.contains(&id)))
            .collect();
        self.delete_paths(orphans.clone()).await?;
        if !orphans.is_empty() {
            engine_logging::engine_info!("Removed {} orphaned artifacts", orphans.len());
        }
        Ok(orphans)
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    async fn delete_paths(&self, paths: Vec<String>) -> Result<(), ServiceError> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || {
            paths.iter().try_for_each(|path| store.delete(path))
        })
        .await
        .map_err(|err| ServiceError::Blocking(err.to_string()))??;
        Ok(())
    }
}

/// Screenshots keep the content type they were stored with, even if the
/// configured image format changed since.
fn content_type_for(
    format: ArchiveFormat,
    path: &str,
    configured: ScreenshotFormat,
) -> &'static str {
    if format != ArchiveFormat::Screenshot {
        return format.content_type(configured);
    }
    let stored = path
        .rsplit_once('.')
        .and_then(|(_, ext)| ext.parse::<ScreenshotFormat>().ok())
        .unwrap_or(configured);
    stored.content_type()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screenshot_content_type_follows_the_stored_extension() {
        assert_eq!(
            content_type_for(ArchiveFormat::Screenshot, "archives/1/2.jpeg", ScreenshotFormat::Png),
            "image/jpeg"
        );
        assert_eq!(
            content_type_for(ArchiveFormat::Pdf, "archives/1/2.pdf", ScreenshotFormat::Png),
            "application/pdf"
        );
    }
}
