pub mod error;
pub mod query;
pub mod search;

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use error::{LocatorError, LocatorResult};
pub use query::{build_query_variants, title_matches};
pub use search::{parse_search_results, watch_url, SearchHit, VideoSearch, YtDlpSearch};

use crate::config::SearchSection;
use crate::events::Event;

/// A resolved highlight video and the query that found it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightMatch {
    pub video_id: String,
    pub url: String,
    pub title: String,
    pub query: String,
}

pub struct HighlightLocator {
    search: Arc<dyn VideoSearch>,
    max_results: usize,
    keywords: Vec<String>,
    delay_range_ms: (u64, u64),
}

impl HighlightLocator {
    pub fn new(search: Arc<dyn VideoSearch>, config: &SearchSection) -> Self {
        let [low, high] = config.delay_range_ms;
        Self {
            search,
            max_results: config.max_results.max(1),
            keywords: config.keywords.clone(),
            delay_range_ms: (low.min(high), low.max(high)),
        }
    }

    pub async fn locate(&self, event: &Event) -> LocatorResult<Option<HighlightMatch>> {
        let queries = build_query_variants(event);
        let found = self.locate_queries(&queries).await?;
        match &found {
            Some(hit) => info!(event_id = %event.event_id, query = %hit.query, url = %hit.url, "highlight located"),
            None => info!(event_id = %event.event_id, variants = queries.len(), "no highlight found"),
        }
        Ok(found)
    }

    /// Tries each query in order and returns the first hit whose title carries a
    /// highlight keyword. Per-query failures move on to the next query; only a
    /// missing search binary is returned as an error.
    pub async fn locate_queries(&self, queries: &[String]) -> LocatorResult<Option<HighlightMatch>> {
        for (index, query) in queries.iter().enumerate() {
            if index > 0 {
                self.pause().await;
            }
            let hits = match self.search.search(query, self.max_results).await {
                Ok(hits) => hits,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!(query = %query, error = %err, "search variant failed");
                    continue;
                }
            };
            if let Some(hit) = hits
                .into_iter()
                .take(self.max_results)
                .find(|hit| title_matches(&hit.title, &self.keywords))
            {
                return Ok(Some(HighlightMatch {
                    video_id: hit.video_id,
                    url: hit.url,
                    title: hit.title,
                    query: query.clone(),
                }));
            }
            debug!(query = %query, "no qualifying title for variant");
        }
        Ok(None)
    }

    async fn pause(&self) {
        let (low, high) = self.delay_range_ms;
        if high == 0 {
            return;
        }
        let millis = rand::thread_rng().gen_range(low..=high);
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }
}
