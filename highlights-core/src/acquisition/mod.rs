pub mod error;
pub mod policy;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::fs;
use tokio::time::sleep;
use tracing::{debug, info, warn};

pub use error::{AcquisitionError, AcquisitionResult};
pub use policy::RetryPolicy;

use crate::config::DownloadSection;
use crate::tools::{run_checked, CommandRunner, ToolCommand};

const DEFAULT_RETRY_SLEEP_CAP: Duration = Duration::from_secs(120);

/// Removes every file in `dir` named `stem` or `stem.<anything>`: merged output,
/// `.part`/`.ytdl` leftovers and per-format fragments.
pub async fn remove_partial_downloads(dir: &Path, stem: &str) -> io::Result<usize> {
    let prefix = format!("{stem}.");
    let mut removed = 0;
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err),
    };
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name == stem || name.starts_with(&prefix) {
            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err),
            }
        }
    }
    Ok(removed)
}

async fn is_nonempty_file(path: &Path) -> bool {
    matches!(fs::metadata(path).await, Ok(meta) if meta.is_file() && meta.len() > 0)
}

pub struct Downloader {
    runner: Arc<dyn CommandRunner>,
    config: DownloadSection,
    videos_dir: PathBuf,
    cookies_file: Option<PathBuf>,
    archive_file: Option<PathBuf>,
    policy: RetryPolicy,
    retry_sleep_cap: Duration,
    reuse_existing: bool,
}

impl Downloader {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        config: &DownloadSection,
        videos_dir: impl Into<PathBuf>,
    ) -> AcquisitionResult<Self> {
        let policy = RetryPolicy::try_from(config)?;
        Ok(Self {
            runner,
            config: config.clone(),
            videos_dir: videos_dir.into(),
            cookies_file: config.cookies_file.as_ref().map(PathBuf::from),
            archive_file: config.archive_file.as_ref().map(PathBuf::from),
            policy,
            retry_sleep_cap: DEFAULT_RETRY_SLEEP_CAP,
            reuse_existing: false,
        })
    }

    pub fn with_retry_sleep_cap(mut self, cap: Duration) -> Self {
        self.retry_sleep_cap = cap;
        self
    }

    /// A non-empty `<stem>.mp4` left by an earlier failed run is used as is.
    pub fn with_reuse_existing(mut self, value: bool) -> Self {
        self.reuse_existing = value;
        self
    }

    /// Resolved paths for the optional cookies and archive files.
    pub fn with_support_files(
        mut self,
        cookies_file: Option<PathBuf>,
        archive_file: Option<PathBuf>,
    ) -> Self {
        self.cookies_file = cookies_file;
        self.archive_file = archive_file;
        self
    }

    pub fn videos_dir(&self) -> &Path {
        &self.videos_dir
    }

    pub fn format_selector(&self) -> String {
        match &self.config.format {
            Some(format) if !format.trim().is_empty() => format.clone(),
            _ => {
                let height = self.config.max_height;
                format!("bv*[height<={height}][ext=mp4]+ba[ext=m4a]/best[ext=mp4]/best")
            }
        }
    }

    pub fn output_path(&self, stem: &str) -> PathBuf {
        self.videos_dir.join(format!("{stem}.mp4"))
    }

    pub fn command(&self, url: &str, stem: &str) -> ToolCommand {
        let template = self.videos_dir.join(format!("{stem}.%(ext)s"));
        let mut command = ToolCommand::new(&self.config.binary)
            .arg("-f")
            .arg(self.format_selector())
            .args(["--merge-output-format", "mp4"])
            .arg("-o")
            .arg(template.to_string_lossy())
            .arg("--retries")
            .arg(self.config.retries.to_string())
            .arg("--fragment-retries")
            .arg(self.config.fragment_retries.to_string())
            .args(["--no-playlist", "--no-progress"]);
        if let Some(cookies) = &self.cookies_file {
            command = command.arg("--cookies").arg(cookies.to_string_lossy());
        }
        if let Some(archive) = &self.archive_file {
            command = command
                .arg("--download-archive")
                .arg(archive.to_string_lossy());
        }
        if self.config.no_check_certificates {
            command = command.arg("--no-check-certificates");
        }
        command
            .arg(url)
            .with_timeout(Duration::from_secs(self.config.timeout_seconds.max(1)))
    }

    /// Downloads `url` into `<videos_dir>/<stem>.mp4`. On failure nothing for
    /// `stem` is left in the videos directory.
    pub async fn download(&self, url: &str, stem: &str) -> AcquisitionResult<PathBuf> {
        fs::create_dir_all(&self.videos_dir)
            .await
            .map_err(|source| AcquisitionError::Io {
                path: self.videos_dir.clone(),
                source,
            })?;
        if self.reuse_existing {
            let existing = self.output_path(stem);
            if is_nonempty_file(&existing).await {
                info!(stem, path = %existing.display(), "reusing retained download");
                return Ok(existing);
            }
        }
        let attempts = self.policy.attempts.max(1);
        for attempt in 0..attempts {
            match self.attempt(url, stem).await {
                Ok(path) => {
                    info!(stem, path = %path.display(), attempt = attempt + 1, "download complete");
                    return Ok(path);
                }
                Err(err) => {
                    self.cleanup(stem).await;
                    if err.is_fatal() || attempt + 1 == attempts {
                        return Err(err);
                    }
                    let capped = self.policy.compute_delay(attempt).min(self.retry_sleep_cap);
                    warn!(attempt = attempt + 1, wait = ?capped, stage = "download", error = %err, "retrying operation");
                    if !capped.is_zero() {
                        sleep(capped).await;
                    }
                }
            }
        }
        Err(AcquisitionError::MissingOutput {
            path: self.output_path(stem),
        })
    }

    async fn attempt(&self, url: &str, stem: &str) -> AcquisitionResult<PathBuf> {
        let command = self.command(url, stem);
        debug!(url, stem, "starting download");
        run_checked(self.runner.as_ref(), &command).await?;
        let expected = self.output_path(stem);
        if is_nonempty_file(&expected).await {
            Ok(expected)
        } else {
            Err(AcquisitionError::MissingOutput { path: expected })
        }
    }

    pub async fn cleanup(&self, stem: &str) {
        match remove_partial_downloads(&self.videos_dir, stem).await {
            Ok(0) => {}
            Ok(count) => debug!(stem, removed = count, "removed partial download files"),
            Err(err) => warn!(stem, path = %self.videos_dir.display(), error = %err, "failed to clean partial downloads"),
        }
    }
}
