//! Process wiring for the `link-keeper` binary.

mod cli;
mod config;

use std::sync::Arc;

use keeper_core::FetchError;
use keeper_engine::{
    ArchiveService, FetchContext, FsArtifactStore, JobQueue, LinkStoreError, Preserver,
    ServiceError, SqliteLinkStore,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use cli::{Cli, Command};
use config::ConfigError;
pub use config::WorkerConfig;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Links(#[from] LinkStoreError),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("failed to build the fetch context: {0}")]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Every long-lived component, wired against one database and archive root.
pub(crate) struct Components {
    pub links: Arc<SqliteLinkStore>,
    pub queue: Arc<JobQueue>,
    pub preserver: Arc<Preserver>,
    pub service: ArchiveService,
    pub shutdown: CancellationToken,
}

impl Components {
    pub(crate) async fn open(config: &WorkerConfig) -> Result<Self, WorkerError> {
        let preservation = config.preservation_config();
        let links = Arc::new(SqliteLinkStore::connect(&config.database_url).await?);
        let store = Arc::new(FsArtifactStore::new(config.archive_root.clone()));
        let shutdown = CancellationToken::new();
        let queue = Arc::new(JobQueue::new(preservation.retry.clone(), shutdown.clone()));
        let screenshot_format = preservation.screenshot_format;
        let ctx = Arc::new(FetchContext::with_chromium(preservation)?);
        let preserver = Arc::new(Preserver::new(ctx, links.clone(), store.clone()));
        let service = ArchiveService::new(links.clone(), store, queue.clone(), screenshot_format);

        Ok(Self {
            links,
            queue,
            preserver,
            service,
            shutdown,
        })
    }
}

/// Run one parsed command line to completion.
pub async fn execute(command: Command, config: WorkerConfig) -> Result<(), WorkerError> {
    let components = Components::open(&config).await?;
    cli::dispatch(command, &config, components).await
}
