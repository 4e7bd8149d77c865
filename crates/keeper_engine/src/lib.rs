//! Link keeper engine: fetchers, storage and the preservation worker.
mod config;
mod decode;
mod fetchers;
mod http;
mod inline;
mod link_store;
mod preserver;
mod queue;
mod readability;
mod render;
mod service;
mod store;
mod text;
mod types;
mod worker;

pub use config::{FormatTimeouts, HttpSettings, PreservationConfig, RendererSettings};
pub use decode::{decode_html, DecodedHtml};
pub use fetchers::{FetchContext, FormatFetcher};
pub use http::{BodyLimits, HttpFetcher};
pub use link_store::{LinkStore, LinkStoreError, SqliteLinkStore};
pub use preserver::Preserver;
pub use queue::JobQueue;
pub use readability::{ExtractedContent, Extractor, ReadabilityExtractor, ReadableDocument};
pub use render::{ChromiumRenderer, PageRenderer};
pub use service::{ArchiveService, ArtifactContent, ServiceError};
pub use store::{ArtifactStore, FsArtifactStore, StoreError};
pub use text::TextRenderer;
pub use types::{
    Capture, ChannelProgressSink, EngineEvent, FetchMetadata, FetchOutput, NullSink, ProgressSink,
};
pub use worker::WorkerGroup;
