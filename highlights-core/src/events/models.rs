use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{EventError, EventResult};
use crate::config::LeagueEntry;

/// A raw provider record tagged with the league it was fetched for.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcedRecord {
    pub league: LeagueEntry,
    pub record: Value,
}

impl SourcedRecord {
    pub fn new(league: LeagueEntry, record: Value) -> Self {
        Self { league, record }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// `{league_id}-{provider id}`; unique across leagues.
    pub event_id: String,
    pub provider_event_id: String,
    pub sport: String,
    pub league_id: String,
    #[serde(default)]
    pub league_name: Option<String>,
    pub priority: u32,
    pub title: String,
    pub scheduled_time: DateTime<Utc>,
    pub home_team: String,
    pub away_team: String,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
    pub hours_since_end: f64,
}

impl Event {
    pub fn from_record(record: &SourcedRecord, now: DateTime<Utc>) -> EventResult<Self> {
        let object = record.record.as_object().ok_or(EventError::NotAnObject)?;
        let provider_event_id =
            scalar_text(object, "idEvent").ok_or(EventError::MissingField { field: "idEvent" })?;
        let home_team = scalar_text(object, "strHomeTeam").ok_or(EventError::MissingField {
            field: "strHomeTeam",
        })?;
        let away_team = scalar_text(object, "strAwayTeam").ok_or(EventError::MissingField {
            field: "strAwayTeam",
        })?;
        let scheduled_time = parse_event_timestamp(object).ok_or(EventError::MissingTimestamp)?;
        let title = scalar_text(object, "strEvent")
            .unwrap_or_else(|| format!("{away_team} vs {home_team}"));
        let hours_since_end = (now - scheduled_time).num_seconds() as f64 / 3600.0;

        Ok(Self {
            event_id: format!("{}-{}", record.league.league_id, provider_event_id),
            provider_event_id,
            sport: scalar_text(object, "strSport").unwrap_or_else(|| record.league.sport.clone()),
            league_id: record.league.league_id.clone(),
            league_name: record
                .league
                .name
                .clone()
                .or_else(|| scalar_text(object, "strLeague")),
            priority: record.league.priority,
            title,
            scheduled_time,
            home_team,
            away_team,
            home_score: parse_score(object.get("intHomeScore")),
            away_score: parse_score(object.get("intAwayScore")),
            hours_since_end,
        })
    }

    pub fn fixture_date(&self) -> NaiveDate {
        self.scheduled_time.date_naive()
    }

    /// `home-away`, only when both scores are known.
    pub fn final_score(&self) -> Option<String> {
        match (self.home_score, self.away_score) {
            (Some(home), Some(away)) => Some(format!("{home}-{away}")),
            _ => None,
        }
    }

    /// Filesystem-safe prefix shared by every artifact of this event.
    pub fn artifact_stem(&self) -> String {
        sanitize_file_stem(&format!(
            "{}_{}_vs_{}",
            self.event_id, self.away_team, self.home_team
        ))
    }
}

pub fn sanitize_file_stem(raw: &str) -> String {
    static INVALID: OnceLock<Regex> = OnceLock::new();
    let pattern = INVALID.get_or_init(|| Regex::new(r"[^\w\-.]+").expect("valid regex"));
    let cleaned = pattern.replace_all(raw.trim(), "_");
    let cleaned = cleaned.trim_matches(|c: char| c == '_' || c == '.');
    if cleaned.is_empty() {
        "event".to_string()
    } else {
        cleaned.to_string()
    }
}

fn scalar_text(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::String(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Accepts numbers, numeric strings or null.
pub fn parse_score(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|v| v as i64)),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Timestamp precedence: `strTimestamp`, `dateEvent` + `strTime`, `dateEvent`, `date`.
pub fn parse_event_timestamp(object: &Map<String, Value>) -> Option<DateTime<Utc>> {
    if let Some(ts) = scalar_text(object, "strTimestamp").and_then(|v| parse_datetime(&v)) {
        return Some(ts);
    }
    if let Some(date) = scalar_text(object, "dateEvent").and_then(|v| parse_date(&v)) {
        let time = scalar_text(object, "strTime")
            .and_then(|v| parse_time(&v))
            .unwrap_or(NaiveTime::MIN);
        return Some(Utc.from_utc_datetime(&date.and_time(time)));
    }
    scalar_text(object, "date").and_then(|v| parse_datetime(&v))
}

fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    parse_date(value).map(|date| Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)))
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

fn parse_time(value: &str) -> Option<NaiveTime> {
    // strTime occasionally carries an offset suffix such as "19:45:00+00:00".
    let clock = value.get(..8).unwrap_or(value);
    NaiveTime::parse_from_str(clock, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .ok()
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde_json::json;

    use super::*;

    fn league() -> LeagueEntry {
        LeagueEntry {
            sport: "Soccer".into(),
            league_id: "4328".into(),
            priority: 1,
            name: Some("English Premier League".into()),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn builds_event_from_provider_record() {
        let record = SourcedRecord::new(
            league(),
            json!({
                "idEvent": "2052711",
                "strEvent": "Arsenal vs Chelsea",
                "strHomeTeam": "Arsenal",
                "strAwayTeam": "Chelsea",
                "intHomeScore": "2",
                "intAwayScore": 1,
                "strTimestamp": "2025-06-09T10:00:00",
            }),
        );
        let event = Event::from_record(&record, now()).unwrap();
        assert_eq!(event.event_id, "4328-2052711");
        assert_eq!(event.home_score, Some(2));
        assert_eq!(event.away_score, Some(1));
        assert_eq!(event.final_score().as_deref(), Some("2-1"));
        assert!((event.hours_since_end - 26.0).abs() < f64::EPSILON);
        assert_eq!(event.sport, "Soccer");
    }

    #[test]
    fn timestamp_precedence_and_fallbacks() {
        let with_offset = json!({"strTimestamp": "2025-06-09T10:00:00+02:00"});
        assert_eq!(
            parse_event_timestamp(with_offset.as_object().unwrap()),
            Some(Utc.with_ymd_and_hms(2025, 6, 9, 8, 0, 0).unwrap())
        );

        let date_and_time = json!({"strTimestamp": "", "dateEvent": "2025-06-09", "strTime": "19:45:00+00:00"});
        assert_eq!(
            parse_event_timestamp(date_and_time.as_object().unwrap()),
            Some(Utc.with_ymd_and_hms(2025, 6, 9, 19, 45, 0).unwrap())
        );

        let date_only = json!({"dateEvent": "2025-06-09", "strTime": "TBD"});
        assert_eq!(
            parse_event_timestamp(date_only.as_object().unwrap()),
            Some(Utc.with_ymd_and_hms(2025, 6, 9, 0, 0, 0).unwrap())
        );

        let iso = json!({"date": "2025-06-09T18:30:00Z"});
        assert_eq!(
            parse_event_timestamp(iso.as_object().unwrap()),
            Some(Utc.with_ymd_and_hms(2025, 6, 9, 18, 30, 0).unwrap())
        );

        let garbage = json!({"dateEvent": "yesterday"});
        assert_eq!(parse_event_timestamp(garbage.as_object().unwrap()), None);
    }

    #[test]
    fn missing_teams_or_timestamp_are_errors() {
        let record = SourcedRecord::new(league(), json!({"idEvent": 7, "strHomeTeam": "A"}));
        assert!(matches!(
            Event::from_record(&record, now()),
            Err(EventError::MissingField { field: "strAwayTeam" })
        ));

        let record = SourcedRecord::new(
            league(),
            json!({"idEvent": 7, "strHomeTeam": "A", "strAwayTeam": "B"}),
        );
        assert!(matches!(
            Event::from_record(&record, now()),
            Err(EventError::MissingTimestamp)
        ));

        let record = SourcedRecord::new(league(), json!(["not", "an", "object"]));
        assert!(matches!(
            Event::from_record(&record, now()),
            Err(EventError::NotAnObject)
        ));
    }

    #[test]
    fn title_falls_back_to_away_vs_home() {
        let record = SourcedRecord::new(
            league(),
            json!({
                "idEvent": 9,
                "strHomeTeam": "Lakers",
                "strAwayTeam": "Celtics",
                "intHomeScore": null,
                "date": (now() - Duration::hours(3)).to_rfc3339(),
            }),
        );
        let event = Event::from_record(&record, now()).unwrap();
        assert_eq!(event.title, "Celtics vs Lakers");
        assert_eq!(event.event_id, "4328-9");
        assert_eq!(event.final_score(), None);
    }

    #[test]
    fn sanitizes_artifact_stems() {
        assert_eq!(
            sanitize_file_stem("4328-1_Brighton & Hove/Albion vs Man City"),
            "4328-1_Brighton_Hove_Albion_vs_Man_City"
        );
        assert_eq!(sanitize_file_stem("  ..  "), "event");
    }
}
