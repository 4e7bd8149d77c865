use keeper_core::{ArchiveFormat, FetchError, Link};

use super::FetchContext;
use crate::http::BodyLimits;
use crate::Capture;

/// Servers commonly label PDFs as generic binary, or not at all.
const PDF_CONTENT_TYPES: &[&str] = &["application/pdf", "application/octet-stream"];

/// Downloads the PDF into memory. Anything over the buffer cap is abandoned
/// before it is fully read and nothing is produced.
pub(super) async fn capture(link: &Link, ctx: &FetchContext) -> Result<Capture, FetchError> {
    let config = ctx.config();
    let limits = BodyLimits {
        max_bytes: config.max_pdf_buffer_bytes,
        content_types: PDF_CONTENT_TYPES,
        allow_missing_type: true,
        timeout: None,
    };
    let output = ctx.http.get(&link.url, &limits).await?;
    engine_logging::engine_debug!(
        "Fetched PDF for link {} ({} bytes from {})",
        link.id,
        output.metadata.byte_len,
        output.metadata.final_url
    );
    Ok(Capture::new(
        ArchiveFormat::Pdf,
        config.screenshot_format,
        output.bytes,
    ))
}
