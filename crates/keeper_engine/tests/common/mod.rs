#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use keeper_core::{FailureKind, FetchError, Link, NewLink, ScreenshotFormat};
use keeper_engine::{
    ArtifactStore, EngineEvent, FetchContext, FormatTimeouts, FsArtifactStore, LinkStore,
    PageRenderer, PreservationConfig, Preserver, ProgressSink, SqliteLinkStore,
};
use tempfile::TempDir;

pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nfake-image";

#[derive(Default)]
pub struct TestSink {
    events: Mutex<Vec<EngineEvent>>,
}

impl TestSink {
    pub fn take(&self) -> Vec<EngineEvent> {
        self.events.lock().unwrap().drain(..).collect()
    }
}

impl ProgressSink for TestSink {
    fn emit(&self, event: EngineEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Renderer double: fixed bytes, a failure, or a hang.
pub enum FakeRenderer {
    Image(Vec<u8>),
    Fails,
    Hangs,
}

#[async_trait::async_trait]
impl PageRenderer for FakeRenderer {
    async fn screenshot(
        &self,
        _url: &str,
        _format: ScreenshotFormat,
        _timeout: Duration,
    ) -> Result<Vec<u8>, FetchError> {
        match self {
            FakeRenderer::Image(bytes) => Ok(bytes.clone()),
            FakeRenderer::Fails => Err(FetchError::new(FailureKind::Render, "navigation failed")),
            FakeRenderer::Hangs => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
        }
    }
}

pub fn test_config() -> PreservationConfig {
    let mut config = PreservationConfig::default();
    config.per_format_timeout = FormatTimeouts::uniform(Duration::from_secs(10));
    config.job_timeout = Duration::from_secs(20);
    config.http.resource_timeout = Duration::from_secs(5);
    config
}

/// Link store, artifact store and preserver wired together over a temp dir.
pub struct Harness {
    pub dir: TempDir,
    pub links: Arc<SqliteLinkStore>,
    pub store: Arc<FsArtifactStore>,
    pub sink: Arc<TestSink>,
    pub preserver: Arc<Preserver>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with(test_config(), FakeRenderer::Image(PNG_BYTES.to_vec())).await
    }

    pub async fn with(config: PreservationConfig, renderer: FakeRenderer) -> Self {
        engine_logging::initialize_for_tests();
        let dir = TempDir::new().unwrap();
        let links = Arc::new(SqliteLinkStore::in_memory().await.unwrap());
        let store = Arc::new(FsArtifactStore::new(dir.path()));
        let sink = Arc::new(TestSink::default());
        let ctx = Arc::new(FetchContext::new(config, Arc::new(renderer)).unwrap());
        let preserver = Arc::new(
            Preserver::new(ctx, links.clone(), store.clone()).with_sink(sink.clone()),
        );
        Self {
            dir,
            links,
            store,
            sink,
            preserver,
        }
    }

    pub async fn add_link(&self, url: &str) -> Link {
        self.links.insert(NewLink::new(7, url)).await.unwrap()
    }

    pub async fn reload(&self, link: &Link) -> Option<Link> {
        self.links.get(link.id).await.unwrap()
    }

    pub fn file(&self, logical: &str) -> PathBuf {
        self.dir.path().join(logical)
    }

    pub fn stored(&self) -> Vec<String> {
        self.store.list().unwrap()
    }
}
