use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

/// Every file one event may own in the videos directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSet {
    pub stem: String,
    pub raw: PathBuf,
    pub intermediate: PathBuf,
    pub final_path: PathBuf,
    pub concat_list: PathBuf,
}

impl ArtifactSet {
    pub fn for_stem(videos_dir: &Path, stem: &str) -> Self {
        Self {
            stem: stem.to_string(),
            raw: videos_dir.join(format!("{stem}.mp4")),
            intermediate: videos_dir.join(format!("{stem}_branded.mp4")),
            final_path: videos_dir.join(format!("{stem}_final.mp4")),
            concat_list: videos_dir.join(format!("{stem}_concat.txt")),
        }
    }

    pub fn transient(&self) -> [&Path; 2] {
        [&self.intermediate, &self.concat_list]
    }

    /// Deletes everything but the final artifact.
    pub async fn remove_working_files(&self) {
        for path in [self.raw.as_path(), &self.intermediate, &self.concat_list] {
            remove_if_present(path).await;
        }
    }

    /// Failure path: no final, no intermediates, raw only when `keep_raw`.
    pub async fn purge(&self, keep_raw: bool) {
        for path in self.transient() {
            remove_if_present(path).await;
        }
        remove_if_present(&self.final_path).await;
        if !keep_raw {
            remove_if_present(&self.raw).await;
        }
    }

    pub async fn existing(&self) -> Vec<PathBuf> {
        let mut present = Vec::new();
        for path in [
            &self.raw,
            &self.intermediate,
            &self.final_path,
            &self.concat_list,
        ] {
            if fs::metadata(path).await.is_ok() {
                present.push(path.clone());
            }
        }
        present
    }
}

pub async fn remove_if_present(path: &Path) -> bool {
    match fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "removed artifact");
            true
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => false,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to remove artifact");
            false
        }
    }
}

/// ffconcat list naming `segments` in order.
pub fn render_concat_list(segments: &[&Path]) -> String {
    let mut list = String::from("ffconcat version 1.0\n");
    for segment in segments {
        let escaped = segment.to_string_lossy().replace('\'', "'\\''");
        list.push_str(&format!("file '{escaped}'\n"));
    }
    list
}
