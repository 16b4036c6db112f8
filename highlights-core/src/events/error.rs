use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("invalid provider url {url}: {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("request for league {league_id} failed: {source}")]
    Http {
        league_id: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("league {league_id} returned status {status}")]
    Status { league_id: String, status: u16 },
    #[error("league {league_id} returned malformed payload: {source}")]
    Decode {
        league_id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("event record is not an object")]
    NotAnObject,
    #[error("event record missing field {field}")]
    MissingField { field: &'static str },
    #[error("event record has no parseable timestamp")]
    MissingTimestamp,
}

pub type EventResult<T> = std::result::Result<T, EventError>;
