use keeper_core::{ArchiveFormat, FailureKind, FetchError, Link};

use super::FetchContext;
use crate::decode::decode_html;
use crate::http::{BodyLimits, HTML_CONTENT_TYPES};
use crate::readability::{Extractor, ReadableDocument};
use crate::Capture;

pub(super) async fn capture(link: &Link, ctx: &FetchContext) -> Result<Capture, FetchError> {
    let config = ctx.config();
    let limits = BodyLimits {
        max_bytes: config.max_page_bytes,
        content_types: HTML_CONTENT_TYPES,
        allow_missing_type: true,
        timeout: None,
    };
    let output = ctx.http.get(&link.url, &limits).await?;
    let decoded = decode_html(&output.bytes, output.metadata.content_type.as_deref())?;

    let content = ctx.extractor.extract(&decoded.html).ok_or_else(|| {
        FetchError::new(FailureKind::ExtractionEmpty, "no readable text on the page")
    })?;
    let document = ReadableDocument::new(link.url.clone(), content);
    let bytes = serde_json::to_vec_pretty(&document)
        .map_err(|err| FetchError::new(FailureKind::Storage, err.to_string()))?;

    Ok(Capture::new(
        ArchiveFormat::Readability,
        config.screenshot_format,
        bytes,
    ))
}
