use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::error::{LocatorError, LocatorResult};
use crate::config::SearchSection;
use crate::tools::{run_checked, CommandRunner, ToolCommand};

const WATCH_URL: &str = "https://www.youtube.com/watch?v=";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub video_id: String,
    pub title: String,
    pub url: String,
}

#[async_trait]
pub trait VideoSearch: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> LocatorResult<Vec<SearchHit>>;
}

#[derive(Debug, Deserialize)]
struct Playlist {
    #[serde(default)]
    entries: Vec<Option<PlaylistEntry>>,
}

#[derive(Debug, Deserialize)]
struct PlaylistEntry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

pub fn watch_url(video_id: &str) -> String {
    format!("{WATCH_URL}{video_id}")
}

/// Parses `yt-dlp --dump-single-json` output of a `ytsearchN:` query.
pub fn parse_search_results(query: &str, stdout: &str) -> LocatorResult<Vec<SearchHit>> {
    let playlist: Playlist =
        serde_json::from_str(stdout.trim()).map_err(|source| LocatorError::Parse {
            query: query.to_string(),
            source,
        })?;
    Ok(playlist
        .entries
        .into_iter()
        .flatten()
        .filter_map(|entry| {
            let url = match (&entry.id, &entry.url) {
                (Some(id), _) if !id.is_empty() => watch_url(id),
                (_, Some(url)) if !url.is_empty() => url.clone(),
                _ => return None,
            };
            Some(SearchHit {
                video_id: entry.id.unwrap_or_default(),
                title: entry.title.unwrap_or_default(),
                url,
            })
        })
        .collect())
}

pub struct YtDlpSearch {
    runner: Arc<dyn CommandRunner>,
    binary: String,
    timeout: Duration,
}

impl YtDlpSearch {
    pub fn new(runner: Arc<dyn CommandRunner>, config: &SearchSection) -> Self {
        Self {
            runner,
            binary: config.binary.clone(),
            timeout: Duration::from_secs(config.timeout_seconds.max(1)),
        }
    }

    pub fn command(&self, query: &str, limit: usize) -> ToolCommand {
        ToolCommand::new(&self.binary)
            .args([
                "--flat-playlist",
                "--dump-single-json",
                "--no-warnings",
                "--ignore-config",
            ])
            .arg(format!("ytsearch{}:{}", limit.max(1), query))
            .with_timeout(self.timeout)
    }
}

#[async_trait]
impl VideoSearch for YtDlpSearch {
    async fn search(&self, query: &str, limit: usize) -> LocatorResult<Vec<SearchHit>> {
        let command = self.command(query, limit);
        let output = run_checked(self.runner.as_ref(), &command).await?;
        let mut hits = parse_search_results(query, &output.stdout)?;
        hits.truncate(limit);
        trace!(query, hits = hits.len(), "video search complete");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::ScriptedRunner;
    use crate::tools::{CommandOutput, ToolError};

    fn section() -> SearchSection {
        SearchSection {
            binary: "yt-dlp".into(),
            max_results: 5,
            keywords: vec!["highlight".into()],
            timeout_seconds: 30,
            delay_range_ms: [0, 0],
        }
    }

    const PAYLOAD: &str = r#"{
        "_type": "playlist",
        "entries": [
            {"id": "abc123", "title": "Chelsea vs Arsenal Highlights", "url": "https://www.youtube.com/watch?v=abc123"},
            {"title": "no id", "url": "https://www.youtube.com/shorts/zzz"},
            {"title": "nothing usable"}
        ]
    }"#;

    #[test]
    fn parses_flat_playlist_entries() {
        let hits = parse_search_results("q", PAYLOAD).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].url, "https://www.youtube.com/watch?v=abc123");
        assert_eq!(hits[1].url, "https://www.youtube.com/shorts/zzz");
        assert!(hits[1].video_id.is_empty());
    }

    #[test]
    fn null_entries_are_skipped() {
        let payload = r#"{"entries": [null, {"id": "def456", "title": "Lakers vs Celtics highlights"}, null]}"#;
        let hits = parse_search_results("q", payload).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, "https://www.youtube.com/watch?v=def456");
    }

    #[tokio::test]
    async fn runs_ytsearch_with_limit() {
        let runner = Arc::new(ScriptedRunner::new(|_| Ok(CommandOutput::success(PAYLOAD))));
        let search = YtDlpSearch::new(runner.clone(), &section());
        let hits = search.search("Chelsea vs Arsenal highlights", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        let calls = runner.calls();
        assert_eq!(
            calls[0].args.last().map(String::as_str),
            Some("ytsearch1:Chelsea vs Arsenal highlights")
        );
        assert!(calls[0].has_flag("--flat-playlist"));
    }

    #[tokio::test]
    async fn non_zero_exit_surfaces_tool_error() {
        let runner = Arc::new(ScriptedRunner::new(|_| {
            Ok(CommandOutput::failure(1, "ERROR: unable to download"))
        }));
        let search = YtDlpSearch::new(runner, &section());
        let err = search.search("q", 5).await.unwrap_err();
        assert!(matches!(err, LocatorError::Tool(ToolError::Failed { .. })));
        assert!(!err.is_fatal());
    }
}
