use keeper_core::{ArchiveFormat, FetchError, Link};

use super::FetchContext;
use crate::decode::decode_html;
use crate::http::{BodyLimits, HTML_CONTENT_TYPES};
use crate::inline::Inliner;
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

    let inliner = Inliner::new(
        &ctx.http,
        config.max_resource_bytes,
        config.http.resource_timeout,
    );
    let snapshot = inliner
        .inline(&decoded.html, &output.metadata.final_url)
        .await;
    engine_logging::engine_debug!(
        "Built snapshot for link {} ({} decoded as {}, {} bytes)",
        link.id,
        output.metadata.final_url,
        decoded.encoding_label,
        snapshot.len()
    );

    Ok(Capture::new(
        ArchiveFormat::Monolith,
        config.screenshot_format,
        snapshot.into_bytes(),
    ))
}
