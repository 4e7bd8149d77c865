use keeper_core::{ArchiveFormat, FetchError, Link};

use super::FetchContext;
use crate::Capture;

pub(super) async fn capture(link: &Link, ctx: &FetchContext) -> Result<Capture, FetchError> {
    let config = ctx.config();
    let bytes = ctx
        .renderer
        .screenshot(
            &link.url,
            config.screenshot_format,
            config.per_format_timeout.screenshot,
        )
        .await?;
    Ok(Capture::new(
        ArchiveFormat::Screenshot,
        config.screenshot_format,
        bytes,
    ))
}
