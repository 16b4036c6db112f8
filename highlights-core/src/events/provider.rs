use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use super::error::{EventError, EventResult};
use super::models::SourcedRecord;
use crate::config::{LeagueEntry, ProviderSection};

#[async_trait]
pub trait EventSource: Send + Sync {
    /// Raw records for every configured league. A failing league is skipped.
    async fn fetch_events(&self) -> EventResult<Vec<SourcedRecord>>;
}

#[derive(Debug, Deserialize)]
struct EventsEnvelope {
    #[serde(default)]
    events: Option<Vec<Value>>,
}

/// Decodes a provider payload; `"events": null` means no events.
pub fn parse_events_payload(league_id: &str, body: &str) -> EventResult<Vec<Value>> {
    let envelope: EventsEnvelope =
        serde_json::from_str(body).map_err(|source| EventError::Decode {
            league_id: league_id.to_string(),
            source,
        })?;
    Ok(envelope.events.unwrap_or_default())
}

#[derive(Debug, Clone)]
pub struct SportsDbClient {
    http: Client,
    base_url: String,
    api_key: String,
    endpoint: String,
    leagues: Vec<LeagueEntry>,
}

impl SportsDbClient {
    pub fn new(provider: &ProviderSection) -> EventResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(provider.timeout_seconds.max(1)))
            .user_agent(concat!("highlights-core/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(EventError::Client)?;
        Ok(Self {
            http,
            base_url: provider.base_url.trim_end_matches('/').to_string(),
            api_key: provider.api_key.clone(),
            endpoint: provider.endpoint.clone(),
            leagues: provider.leagues.clone(),
        })
    }

    pub fn leagues(&self) -> &[LeagueEntry] {
        &self.leagues
    }

    pub fn league_url(&self, league_id: &str) -> EventResult<Url> {
        let raw = format!("{}/{}/{}", self.base_url, self.api_key, self.endpoint);
        let mut url = Url::parse(&raw).map_err(|source| EventError::Url {
            url: raw.clone(),
            source,
        })?;
        url.query_pairs_mut().append_pair("id", league_id);
        Ok(url)
    }

    pub async fn fetch_league(&self, league: &LeagueEntry) -> EventResult<Vec<Value>> {
        let url = self.league_url(&league.league_id)?;
        debug!(league_id = %league.league_id, url = %url, "fetching league events");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|source| EventError::Http {
                league_id: league.league_id.clone(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(EventError::Status {
                league_id: league.league_id.clone(),
                status: status.as_u16(),
            });
        }
        let body = response.text().await.map_err(|source| EventError::Http {
            league_id: league.league_id.clone(),
            source,
        })?;
        parse_events_payload(&league.league_id, &body)
    }
}

#[async_trait]
impl EventSource for SportsDbClient {
    async fn fetch_events(&self) -> EventResult<Vec<SourcedRecord>> {
        let mut records = Vec::new();
        for league in &self.leagues {
            match self.fetch_league(league).await {
                Ok(events) => {
                    debug!(league_id = %league.league_id, count = events.len(), "league events fetched");
                    records.extend(
                        events
                            .into_iter()
                            .map(|record| SourcedRecord::new(league.clone(), record)),
                    );
                }
                Err(err) => {
                    warn!(league_id = %league.league_id, error = %err, "league fetch failed, skipping");
                }
            }
        }
        info!(
            leagues = self.leagues.len(),
            records = records.len(),
            "provider events fetched"
        );
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> ProviderSection {
        ProviderSection {
            base_url: "https://www.thesportsdb.com/api/v1/json/".into(),
            api_key: "123".into(),
            endpoint: "eventspastleague.php".into(),
            timeout_seconds: 5,
            leagues: vec![LeagueEntry {
                sport: "Soccer".into(),
                league_id: "4328".into(),
                priority: 1,
                name: None,
            }],
        }
    }

    #[test]
    fn builds_league_url() {
        let client = SportsDbClient::new(&provider()).unwrap();
        assert_eq!(
            client.league_url("4328").unwrap().as_str(),
            "https://www.thesportsdb.com/api/v1/json/123/eventspastleague.php?id=4328"
        );
    }

    #[test]
    fn null_events_payload_is_empty() {
        assert!(parse_events_payload("4328", r#"{"events": null}"#)
            .unwrap()
            .is_empty());
        assert!(parse_events_payload("4328", "{}").unwrap().is_empty());
    }

    #[test]
    fn events_payload_keeps_raw_records() {
        let events = parse_events_payload(
            "4328",
            r#"{"events": [{"idEvent": "1"}, {"idEvent": 2, "strHomeTeam": null}]}"#,
        )
        .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1]["idEvent"], 2);
    }

    #[test]
    fn malformed_payload_is_a_decode_error() {
        let err = parse_events_payload("4328", "<html>").unwrap_err();
        assert!(matches!(err, EventError::Decode { ref league_id, .. } if league_id == "4328"));
    }
}
