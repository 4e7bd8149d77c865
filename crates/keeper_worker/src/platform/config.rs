//! Worker configuration: optional RON file, then environment overrides.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use keeper_core::{RetryPolicy, ScreenshotFormat};
use keeper_engine::{FormatTimeouts, HttpSettings, PreservationConfig, RendererSettings};
use serde::Deserialize;
use thiserror::Error;

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: ron::error::SpannedError,
    },
    #[error("invalid value {value:?} for {name}")]
    InvalidEnv { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub database_url: String,
    pub archive_root: PathBuf,
    pub workers: usize,
    pub backfill_interval_secs: u64,
    pub backfill_batch: u32,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub preservation: PreservationSection,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://link-keeper.db".to_string(),
            archive_root: PathBuf::from("data"),
            workers: 4,
            backfill_interval_secs: 30,
            backfill_batch: 100,
            log_level: "info".to_string(),
            log_file: None,
            preservation: PreservationSection::default(),
        }
    }
}

/// Pipeline limits as written in the file: sizes in MiB, durations in seconds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PreservationSection {
    pub pdf_max_buffer_mib: u64,
    pub max_page_mib: u64,
    pub max_resource_mib: u64,
    pub format_timeout_secs: FormatTimeoutSection,
    pub job_timeout_secs: u64,
    pub screenshot_format: ScreenshotFormat,
    pub connect_timeout_secs: u64,
    pub resource_timeout_secs: u64,
    pub redirect_limit: usize,
    pub user_agent: Option<String>,
    pub chromium_path: PathBuf,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub retry_max_attempts: u32,
    pub retry_base_delay_secs: u64,
    pub retry_multiplier: f64,
}

impl Default for PreservationSection {
    fn default() -> Self {
        Self {
            pdf_max_buffer_mib: 100,
            max_page_mib: 20,
            max_resource_mib: 10,
            format_timeout_secs: FormatTimeoutSection::default(),
            job_timeout_secs: 300,
            screenshot_format: ScreenshotFormat::Png,
            connect_timeout_secs: 10,
            resource_timeout_secs: 15,
            redirect_limit: 5,
            user_agent: None,
            chromium_path: PathBuf::from("chromium"),
            viewport_width: 1280,
            viewport_height: 800,
            retry_max_attempts: 3,
            retry_base_delay_secs: 30,
            retry_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FormatTimeoutSection {
    pub pdf: u64,
    pub monolith: u64,
    pub screenshot: u64,
    pub readability: u64,
}

impl FormatTimeoutSection {
    fn uniform(secs: u64) -> Self {
        Self {
            pdf: secs,
            monolith: secs,
            screenshot: secs,
            readability: secs,
        }
    }
}

impl Default for FormatTimeoutSection {
    fn default() -> Self {
        Self {
            pdf: 60,
            monolith: 90,
            screenshot: 60,
            readability: 30,
        }
    }
}

impl WorkerConfig {
    /// Read `path` if given, otherwise start from defaults; then apply the
    /// process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        ron::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overrides from environment variables, looked up through `lookup`.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let section = &mut self.preservation;
        if let Some(mib) = parse_env(&lookup, "PDF_MAX_BUFFER")? {
            section.pdf_max_buffer_mib = mib;
        }
        if let Some(format) = parse_env(&lookup, "SCREENSHOT_FORMAT")? {
            section.screenshot_format = format;
        }
        if let Some(secs) = parse_env(&lookup, "ARCHIVE_TIMEOUT_SECS")? {
            section.format_timeout_secs = FormatTimeoutSection::uniform(secs);
        }
        if let Some(secs) = parse_env(&lookup, "JOB_TIMEOUT_SECS")? {
            section.job_timeout_secs = secs;
        }
        if let Some(path) = lookup("CHROMIUM_PATH") {
            section.chromium_path = PathBuf::from(path);
        }
        if let Some(url) = lookup("DATABASE_URL") {
            self.database_url = url;
        }
        if let Some(root) = lookup("ARCHIVE_ROOT") {
            self.archive_root = PathBuf::from(root);
        }
        if let Some(workers) = parse_env(&lookup, "ARCHIVE_WORKERS")? {
            self.workers = workers;
        }
        Ok(())
    }

    pub fn preservation_config(&self) -> PreservationConfig {
        let section = &self.preservation;
        let timeouts = &section.format_timeout_secs;
        let defaults = HttpSettings::default();
        PreservationConfig {
            max_pdf_buffer_bytes: section.pdf_max_buffer_mib.saturating_mul(MIB),
            max_page_bytes: section.max_page_mib.saturating_mul(MIB),
            max_resource_bytes: section.max_resource_mib.saturating_mul(MIB),
            per_format_timeout: FormatTimeouts {
                pdf: Duration::from_secs(timeouts.pdf),
                monolith: Duration::from_secs(timeouts.monolith),
                screenshot: Duration::from_secs(timeouts.screenshot),
                readability: Duration::from_secs(timeouts.readability),
            },
            job_timeout: Duration::from_secs(section.job_timeout_secs),
            screenshot_format: section.screenshot_format,
            http: HttpSettings {
                connect_timeout: Duration::from_secs(section.connect_timeout_secs),
                redirect_limit: section.redirect_limit,
                user_agent: section.user_agent.clone().unwrap_or(defaults.user_agent),
                resource_timeout: Duration::from_secs(section.resource_timeout_secs),
            },
            renderer: RendererSettings {
                chromium_path: section.chromium_path.clone(),
                viewport_width: section.viewport_width,
                viewport_height: section.viewport_height,
            },
            retry: RetryPolicy {
                max_attempts: section.retry_max_attempts.max(1),
                base_delay: Duration::from_secs(section.retry_base_delay_secs),
                multiplier: section.retry_multiplier,
            },
        }
    }
}

fn parse_env<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_match_the_pipeline_defaults() {
        let config = WorkerConfig::default().preservation_config();
        let expected = PreservationConfig::default();
        assert_eq!(config.max_pdf_buffer_bytes, expected.max_pdf_buffer_bytes);
        assert_eq!(config.per_format_timeout, expected.per_format_timeout);
        assert_eq!(config.job_timeout, expected.job_timeout);
        assert_eq!(config.retry, expected.retry);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let content = r#"(
            workers: 2,
            preservation: (
                pdf_max_buffer_mib: 5,
                screenshot_format: jpeg,
                format_timeout_secs: (screenshot: 10),
            ),
        )"#;
        let config = WorkerConfig::parse(content, Path::new("keeper.ron")).unwrap();

        assert_eq!(config.workers, 2);
        assert_eq!(config.database_url, "sqlite://link-keeper.db");
        assert_eq!(config.preservation.pdf_max_buffer_mib, 5);
        assert_eq!(config.preservation.screenshot_format, ScreenshotFormat::Jpeg);
        assert_eq!(config.preservation.format_timeout_secs.screenshot, 10);
        assert_eq!(config.preservation.format_timeout_secs.monolith, 90);
        assert_eq!(config.preservation_config().max_pdf_buffer_bytes, 5 * MIB);
    }

    #[test]
    fn environment_overrides_the_file() {
        let mut config = WorkerConfig::default();
        config
            .apply_env(env(&[
                ("PDF_MAX_BUFFER", "150"),
                ("SCREENSHOT_FORMAT", "jpeg"),
                ("ARCHIVE_TIMEOUT_SECS", "45"),
                ("JOB_TIMEOUT_SECS", "120"),
                ("DATABASE_URL", "sqlite:///var/lib/keeper.db"),
                ("ARCHIVE_ROOT", "/srv/archives"),
                ("ARCHIVE_WORKERS", "8"),
            ]))
            .unwrap();

        let pipeline = config.preservation_config();
        assert_eq!(pipeline.max_pdf_buffer_bytes, 150 * MIB);
        assert_eq!(pipeline.screenshot_format, ScreenshotFormat::Jpeg);
        assert_eq!(
            pipeline.per_format_timeout,
            FormatTimeouts::uniform(Duration::from_secs(45))
        );
        assert_eq!(pipeline.job_timeout, Duration::from_secs(120));
        assert_eq!(config.database_url, "sqlite:///var/lib/keeper.db");
        assert_eq!(config.archive_root, PathBuf::from("/srv/archives"));
        assert_eq!(config.workers, 8);
    }

    #[test]
    fn malformed_environment_value_is_rejected() {
        let mut config = WorkerConfig::default();
        let err = config
            .apply_env(env(&[("PDF_MAX_BUFFER", "lots")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv {
                name: "PDF_MAX_BUFFER",
                ..
            }
        ));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let err = WorkerConfig::from_file(&temp.path().join("absent.ron")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
