use std::process::Stdio;
use std::time::Duration;

use keeper_core::{FailureKind, FetchError, ScreenshotFormat};
use tokio::process::Command;

use crate::config::RendererSettings;

/// Turns a page URL into an image. Implemented by a headless browser in
/// production and by fakes in tests.
#[async_trait::async_trait]
pub trait PageRenderer: Send + Sync {
    async fn screenshot(
        &self,
        url: &str,
        format: ScreenshotFormat,
        timeout: Duration,
    ) -> Result<Vec<u8>, FetchError>;
}

/// Drives a local Chromium in headless mode through its `--screenshot` switch.
#[derive(Debug, Clone)]
pub struct ChromiumRenderer {
    settings: RendererSettings,
}

impl ChromiumRenderer {
    pub fn new(settings: RendererSettings) -> Self {
        Self { settings }
    }
}

#[async_trait::async_trait]
impl PageRenderer for ChromiumRenderer {
    async fn screenshot(
        &self,
        url: &str,
        format: ScreenshotFormat,
        timeout: Duration,
    ) -> Result<Vec<u8>, FetchError> {
        let output_file = tempfile::Builder::new()
            .prefix("link-keeper-shot-")
            .suffix(&format!(".{}", format.extension()))
            .tempfile()
            .map_err(|err| FetchError::new(FailureKind::Render, err.to_string()))?;
        let output_path = output_file.path().to_path_buf();

        let mut cmd = Command::new(&self.settings.chromium_path);
        cmd.arg("--headless")
            .arg("--disable-gpu")
            .arg("--hide-scrollbars")
            .arg(format!("--screenshot={}", output_path.display()))
            .arg(format!(
                "--window-size={},{}",
                self.settings.viewport_width, self.settings.viewport_height
            ))
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        engine_logging::engine_debug!("Rendering {} with {:?}", url, self.settings.chromium_path);

        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| {
                FetchError::new(
                    FailureKind::Timeout,
                    format!("renderer timed out after {}s", timeout.as_secs()),
                )
            })?
            .map_err(|err| {
                FetchError::new(
                    FailureKind::Render,
                    format!("failed to launch renderer: {err}"),
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FetchError::new(
                FailureKind::Render,
                format!("renderer failed ({}): {}", output.status, stderr.trim()),
            ));
        }

        let bytes = tokio::fs::read(&output_path)
            .await
            .map_err(|err| FetchError::new(FailureKind::Render, err.to_string()))?;
        if bytes.is_empty() {
            return Err(FetchError::new(
                FailureKind::Render,
                "renderer produced an empty image",
            ));
        }
        Ok(bytes)
    }
}
