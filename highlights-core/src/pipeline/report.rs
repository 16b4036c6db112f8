use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::branding::Dimensions;
use crate::config::WindowKind;
use crate::events::SelectionStats;
use crate::ledger::LedgerEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Locate,
    Download,
    Brand,
    Record,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Locate => "locate",
            PipelineStage::Download => "download",
            PipelineStage::Brand => "brand",
            PipelineStage::Record => "record",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Produced,
    NoMatch,
    Failed,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateAttempt {
    pub event_id: String,
    pub title: String,
    pub stage: PipelineStage,
    pub status: AttemptStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProducedHighlight {
    pub entry: LedgerEntry,
    pub dimensions: Dimensions,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub window: WindowKind,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub fetched: usize,
    pub selection: SelectionStats,
    pub candidates: Vec<String>,
    pub attempts: Vec<CandidateAttempt>,
    pub produced: Option<ProducedHighlight>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
    pub swept: usize,
}

impl RunReport {
    pub fn new(run_id: Uuid, window: WindowKind, dry_run: bool, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            window,
            dry_run,
            started_at,
            finished_at: started_at,
            fetched: 0,
            selection: SelectionStats::default(),
            candidates: Vec::new(),
            attempts: Vec::new(),
            produced: None,
            aborted: None,
            swept: 0,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.produced.is_some()
    }
}
