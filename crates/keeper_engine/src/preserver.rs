use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{FuturesUnordered, StreamExt};
use keeper_core::{
    artifact_path, ArchiveFormat, FailureKind, FetchError, FormatOutcome, FormatSet, JobReport,
    Link, LinkId,
};
use tokio::time::Instant;

use crate::fetchers::{FetchContext, FormatFetcher};
use crate::http::essence;
use crate::link_store::LinkStore;
use crate::store::ArtifactStore;
use crate::{Capture, EngineEvent, NullSink, ProgressSink};

const PDF_CONTENT_TYPE: &str = "application/pdf";

/// About thirty years.
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

/// Runs the fetchers for one job and commits what they capture.
///
/// Each format is committed as soon as its fetcher finishes: artifact first,
/// then the single matching column of the link. A format that fails leaves
/// its column untouched.
pub struct Preserver {
    ctx: Arc<FetchContext>,
    links: Arc<dyn LinkStore>,
    store: Arc<dyn ArtifactStore>,
    sink: Arc<dyn ProgressSink>,
}

impl Preserver {
    pub fn new(
        ctx: Arc<FetchContext>,
        links: Arc<dyn LinkStore>,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            ctx,
            links,
            store,
            sink: Arc::new(NullSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn sink(&self) -> &Arc<dyn ProgressSink> {
        &self.sink
    }

    /// Formats the link's URL can be archived as.
    pub fn supported_formats(link: &Link) -> FormatSet {
        ArchiveFormat::ALL
            .into_iter()
            .filter(|format| FormatFetcher::for_format(*format).accepts(link))
            .collect()
    }

    pub async fn preserve(&self, link_id: LinkId, formats: &FormatSet) -> JobReport {
        let link = match self.links.get(link_id).await {
            Ok(Some(link)) => link,
            Ok(None) => {
                engine_logging::engine_warn!("Link {} no longer exists, nothing to preserve", link_id);
                let report =
                    JobReport::all_failed(link_id, formats, FailureKind::RecordMissing, "link not found");
                self.emit_outcomes(&report);
                return report;
            }
            Err(err) => {
                engine_logging::engine_error!("Failed to load link {}: {}", link_id, err);
                let report =
                    JobReport::all_failed(link_id, formats, FailureKind::Storage, &err.to_string());
                self.emit_outcomes(&report);
                return report;
            }
        };

        let mut report = JobReport::new(link_id);
        let deadline = job_deadline(self.ctx.config().job_timeout);
        let mut running = FuturesUnordered::new();
        for format in formats.iter().copied() {
            let fetcher = FormatFetcher::for_format(format);
            if !fetcher.accepts(&link) {
                let err = FetchError::new(
                    FailureKind::UnsupportedContent {
                        content_type: "unknown".to_string(),
                    },
                    format!("{format} is not available for {}", link.url),
                );
                self.finish(&mut report, format, Err(err));
                continue;
            }
            let link = &link;
            running.push(async move {
                let outcome = self.capture_and_commit(fetcher, link, deadline).await;
                (format, outcome)
            });
        }

        while let Some((format, outcome)) = running.next().await {
            self.finish(&mut report, format, outcome);
        }

        if !formats.contains(&ArchiveFormat::Pdf) && served_as_pdf(&report) {
            engine_logging::engine_info!("Link {} serves a PDF, archiving it as one", link_id);
            let outcome = self
                .capture_and_commit(FormatFetcher::Pdf, &link, deadline)
                .await;
            self.finish(&mut report, ArchiveFormat::Pdf, outcome);
        }
        report
    }

    /// One format end to end. The job deadline only cancels the capture; a
    /// capture that made it in time is always committed.
    async fn capture_and_commit(
        &self,
        fetcher: FormatFetcher,
        link: &Link,
        deadline: Instant,
    ) -> FormatOutcome {
        let format = fetcher.format();
        let timeout = self.ctx.config().per_format_timeout.get(format);
        let capture = tokio::time::timeout(timeout, fetcher.capture(link, self.ctx.as_ref()));
        let capture = match tokio::time::timeout_at(deadline, capture).await {
            Ok(Ok(result)) => result?,
            Ok(Err(_)) => {
                return Err(FetchError::new(
                    FailureKind::Timeout,
                    format!("{format} timed out after {}s", timeout.as_secs()),
                ))
            }
            Err(_) => {
                return Err(FetchError::new(
                    FailureKind::Timeout,
                    "job deadline reached before the format finished",
                ))
            }
        };
        self.commit(link, capture).await
    }

    async fn commit(&self, link: &Link, capture: Capture) -> FormatOutcome {
        let format = capture.format;
        let path = artifact_path(link.collection_id, link.id, capture.extension);

        match self.links.get(link.id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                return Err(FetchError::new(
                    FailureKind::RecordMissing,
                    "link deleted before the artifact was stored",
                ))
            }
            Err(err) => return Err(FetchError::new(FailureKind::Storage, err.to_string())),
        }

        self.write_artifact(path.clone(), capture.bytes).await?;

        match self.links.set_artifact(link.id, format, Some(&path)).await {
            Ok(true) => {
                engine_logging::engine_info!("Stored {} for link {} at {}", format, link.id, path);
                Ok(path)
            }
            Ok(false) => {
                self.remove_artifact(path.clone()).await;
                Err(FetchError::new(
                    FailureKind::RecordMissing,
                    "link deleted while the artifact was being stored",
                ))
            }
            Err(err) => Err(FetchError::new(FailureKind::Storage, err.to_string())),
        }
    }

    async fn write_artifact(&self, path: String, bytes: Vec<u8>) -> Result<(), FetchError> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.write(&path, &bytes))
            .await
            .map_err(|err| FetchError::new(FailureKind::Storage, err.to_string()))?
            .map_err(|err| FetchError::new(FailureKind::Storage, err.to_string()))
    }

    async fn remove_artifact(&self, path: String) {
        let store = self.store.clone();
        let target = path.clone();
        match tokio::task::spawn_blocking(move || store.delete(&target)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => engine_logging::engine_warn!("Failed to remove {}: {}", path, err),
            Err(err) => engine_logging::engine_warn!("Failed to remove {}: {}", path, err),
        }
    }

    fn finish(&self, report: &mut JobReport, format: ArchiveFormat, outcome: FormatOutcome) {
        if let Err(err) = &outcome {
            engine_logging::engine_warn!("{} failed for link {}: {}", format, report.link_id, err);
        }
        self.sink.emit(EngineEvent::FormatFinished {
            link_id: report.link_id,
            format,
            outcome: outcome.clone(),
        });
        report.record(format, outcome);
    }

    fn emit_outcomes(&self, report: &JobReport) {
        for (format, outcome) in &report.outcomes {
            self.sink.emit(EngineEvent::FormatFinished {
                link_id: report.link_id,
                format: *format,
                outcome: outcome.clone(),
            });
        }
    }
}

/// Saturates instead of overflowing for very large configured timeouts.
fn job_deadline(job_timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(job_timeout)
        .unwrap_or_else(|| now + FAR_FUTURE)
}

/// A page fetcher was answered with a PDF, which the URL did not reveal.
fn served_as_pdf(report: &JobReport) -> bool {
    report.failures().any(|(_, err)| match &err.kind {
        FailureKind::UnsupportedContent { content_type } => {
            essence(content_type) == PDF_CONTENT_TYPE
        }
        _ => false,
    })
}
