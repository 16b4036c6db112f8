use std::collections::HashSet;
use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tokio::fs;
use tracing::{info, warn};

const FINAL_SUFFIX: &str = "_final.mp4";
const INTERMEDIATE_SUFFIX: &str = "_branded.mp4";

/// Removes leftovers of interrupted runs before a new selection. Only files
/// named after an event (`<league>-<id>...`) are touched. Final artifacts the
/// ledger points at are kept, and so are retained raw downloads when
/// `keep_raw` is set.
#[derive(Debug, Clone)]
pub struct ArtifactJanitor {
    videos_dir: PathBuf,
    keep_raw: bool,
}

impl ArtifactJanitor {
    pub fn new(videos_dir: impl Into<PathBuf>) -> Self {
        Self {
            videos_dir: videos_dir.into(),
            keep_raw: false,
        }
    }

    pub fn keep_raw(mut self, value: bool) -> Self {
        self.keep_raw = value;
        self
    }

    pub fn videos_dir(&self) -> &Path {
        &self.videos_dir
    }

    pub fn is_event_artifact(file_name: &str) -> bool {
        static PREFIX: OnceLock<Regex> = OnceLock::new();
        PREFIX
            .get_or_init(|| Regex::new(r"^[0-9]+-[^.]").expect("valid regex"))
            .is_match(file_name)
    }

    /// `<stem>.mp4` as written by the downloader; format fragments such as
    /// `<stem>.f137.mp4` do not count.
    pub fn is_raw_download(file_name: &str) -> bool {
        static FRAGMENT: OnceLock<Regex> = OnceLock::new();
        let fragment = FRAGMENT.get_or_init(|| Regex::new(r"\.f[0-9]+\.mp4$").expect("valid regex"));
        file_name.ends_with(".mp4")
            && !file_name.ends_with(FINAL_SUFFIX)
            && !file_name.ends_with(INTERMEDIATE_SUFFIX)
            && !fragment.is_match(file_name)
    }

    /// `recorded_outputs` are the final artifact paths stored in the ledger;
    /// they are matched by file name.
    pub async fn sweep(&self, recorded_outputs: &HashSet<PathBuf>) -> io::Result<Vec<PathBuf>> {
        let keep: HashSet<&OsStr> = recorded_outputs
            .iter()
            .filter_map(|path| path.file_name())
            .collect();
        let mut entries = match fs::read_dir(&self.videos_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        let mut removed = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();
            if !Self::is_event_artifact(&name) || keep.contains(file_name.as_os_str()) {
                continue;
            }
            if self.keep_raw && Self::is_raw_download(&name) {
                continue;
            }
            let path = entry.path();
            match fs::remove_file(&path).await {
                Ok(()) => removed.push(path),
                Err(err) => warn!(path = %path.display(), error = %err, "failed to remove orphaned artifact"),
            }
        }
        if !removed.is_empty() {
            info!(removed = removed.len(), dir = %self.videos_dir.display(), "swept orphaned artifacts");
        }
        Ok(removed)
    }
}
