use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::{parse_score, Event};
use crate::locator::HighlightMatch;

/// One produced highlight. Written once, never mutated by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub event_id: String,
    pub sport: String,
    pub league_id: String,
    pub event_date: Option<NaiveDate>,
    pub home_team: String,
    pub away_team: String,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
    pub final_score: Option<String>,
    pub output_path: String,
    pub video_url: Option<String>,
    pub search_query: Option<String>,
    pub sha256: Option<String>,
    pub processed_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn from_event(
        event: &Event,
        output_path: &Path,
        matched: Option<&HighlightMatch>,
        sha256: Option<String>,
        processed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: event.event_id.clone(),
            sport: event.sport.clone(),
            league_id: event.league_id.clone(),
            event_date: Some(event.fixture_date()),
            home_team: event.home_team.clone(),
            away_team: event.away_team.clone(),
            home_score: event.home_score,
            away_score: event.away_score,
            final_score: event.final_score(),
            output_path: output_path.to_string_lossy().into_owned(),
            video_url: matched.map(|m| m.url.clone()),
            search_query: matched.map(|m| m.query.clone()),
            sha256,
            processed_at,
        }
    }

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            event_id: row.get("event_id")?,
            sport: row.get("sport")?,
            league_id: row.get("league_id")?,
            event_date: row.get("event_date")?,
            home_team: row.get("home_team")?,
            away_team: row.get("away_team")?,
            home_score: row.get("home_score")?,
            away_score: row.get("away_score")?,
            final_score: row.get("final_score")?,
            output_path: row.get("output_path")?,
            video_url: row.get("video_url")?,
            search_query: row.get("search_query")?,
            sha256: row.get("sha256")?,
            processed_at: row.get("processed_at")?,
        })
    }
}

/// A record of the flat-file detail log.
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyDetail {
    pub event_id: String,
    #[serde(default)]
    pub sport: Option<String>,
    #[serde(default)]
    pub league_id: Option<Value>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub home_team: Option<String>,
    #[serde(default)]
    pub away_team: Option<String>,
    #[serde(default)]
    pub home_score: Option<Value>,
    #[serde(default)]
    pub away_score: Option<Value>,
    #[serde(default)]
    pub final_score: Option<String>,
    #[serde(default)]
    pub processed_date: Option<String>,
    #[serde(default)]
    pub output_file: Option<String>,
}

impl LegacyDetail {
    pub fn into_entry(self, imported_at: DateTime<Utc>) -> LedgerEntry {
        let league_id = match self.league_id {
            Some(Value::String(id)) => id,
            Some(Value::Number(id)) => id.to_string(),
            _ => self
                .event_id
                .split_once('-')
                .map(|(league, _)| league.to_string())
                .unwrap_or_default(),
        };
        let home_score = parse_score(self.home_score.as_ref());
        let away_score = parse_score(self.away_score.as_ref());
        let final_score = self.final_score.or_else(|| match (home_score, away_score) {
            (Some(home), Some(away)) => Some(format!("{home}-{away}")),
            _ => None,
        });
        LedgerEntry {
            event_date: self.date.as_deref().and_then(parse_legacy_date),
            processed_at: self
                .processed_date
                .as_deref()
                .and_then(parse_legacy_timestamp)
                .unwrap_or(imported_at),
            event_id: self.event_id,
            sport: self.sport.unwrap_or_default(),
            league_id,
            home_team: self.home_team.unwrap_or_default(),
            away_team: self.away_team.unwrap_or_default(),
            home_score,
            away_score,
            final_score,
            output_path: self.output_file.unwrap_or_default(),
            video_url: None,
            search_query: None,
            sha256: None,
        }
    }
}

fn parse_legacy_date(value: &str) -> Option<NaiveDate> {
    let day = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn parse_legacy_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_detail_converts_loose_fields() {
        let detail: LegacyDetail = serde_json::from_str(
            r#"{
                "event_id": "4328-2052711",
                "sport": "Soccer",
                "league_id": 4328,
                "date": "2025-06-09",
                "home_team": "Arsenal",
                "away_team": "Chelsea",
                "home_score": "2",
                "away_score": 1,
                "processed_date": "2025-06-10T08:15:30.123456",
                "output_file": "/videos/x_final.mp4"
            }"#,
        )
        .unwrap();
        let imported_at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let entry = detail.into_entry(imported_at);
        assert_eq!(entry.league_id, "4328");
        assert_eq!(entry.final_score.as_deref(), Some("2-1"));
        assert_eq!(entry.event_date, NaiveDate::from_ymd_opt(2025, 6, 9));
        assert_eq!(
            entry.processed_at.date_naive(),
            NaiveDate::from_ymd_opt(2025, 6, 10).unwrap()
        );
    }

    #[test]
    fn missing_league_is_taken_from_event_id() {
        let detail: LegacyDetail =
            serde_json::from_str(r#"{"event_id": "4387-9", "processed_date": "junk"}"#).unwrap();
        let imported_at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let entry = detail.into_entry(imported_at);
        assert_eq!(entry.league_id, "4387");
        assert_eq!(entry.processed_at, imported_at);
        assert_eq!(entry.final_score, None);
    }
}
