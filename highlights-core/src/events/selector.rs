use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, trace, warn};

use super::models::{Event, SourcedRecord};
use crate::config::{SelectionSection, WindowKind};

/// Hour bounds applied to `hours_since_end`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SelectionWindow {
    pub kind: WindowKind,
    pub lower_hours: f64,
    pub lower_inclusive: bool,
    pub upper_hours: f64,
}

impl SelectionWindow {
    pub fn new(kind: WindowKind, primary_hours: f64, window_hours: f64) -> Self {
        match kind {
            WindowKind::Primary => Self {
                kind,
                lower_hours: 0.0,
                lower_inclusive: true,
                upper_hours: primary_hours,
            },
            WindowKind::Extended => Self {
                kind,
                lower_hours: primary_hours,
                lower_inclusive: false,
                upper_hours: window_hours,
            },
            WindowKind::Full => Self {
                kind,
                lower_hours: 0.0,
                lower_inclusive: true,
                upper_hours: window_hours,
            },
        }
    }

    pub fn from_config(kind: WindowKind, selection: &SelectionSection) -> Self {
        Self::new(kind, selection.primary_window_hours, selection.window_hours)
    }

    pub fn contains(&self, hours: f64) -> bool {
        let above = if self.lower_inclusive {
            hours >= self.lower_hours
        } else {
            hours > self.lower_hours
        };
        above && hours <= self.upper_hours
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SelectionStats {
    pub records: usize,
    pub malformed: usize,
    pub out_of_window: usize,
    pub duplicates: usize,
    pub already_processed: usize,
    pub selected: usize,
}

#[derive(Debug, Clone)]
pub struct EventSelector {
    window: SelectionWindow,
    batch_size: usize,
}

impl EventSelector {
    pub fn new(window: SelectionWindow, batch_size: usize) -> Self {
        Self {
            window,
            batch_size: batch_size.max(1),
        }
    }

    pub fn window(&self) -> SelectionWindow {
        self.window
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn select(
        &self,
        records: &[SourcedRecord],
        now: DateTime<Utc>,
        processed: &HashSet<String>,
    ) -> Vec<Event> {
        self.select_with_stats(records, now, processed).0
    }

    /// Parse, window, dedup (first occurrence wins), drop processed ids, stable
    /// sort by `(hours_since_end, priority)` and truncate to the batch size.
    pub fn select_with_stats(
        &self,
        records: &[SourcedRecord],
        now: DateTime<Utc>,
        processed: &HashSet<String>,
    ) -> (Vec<Event>, SelectionStats) {
        let mut stats = SelectionStats {
            records: records.len(),
            ..SelectionStats::default()
        };
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        for record in records {
            let event = match Event::from_record(record, now) {
                Ok(event) => event,
                Err(err) => {
                    stats.malformed += 1;
                    warn!(
                        league_id = %record.league.league_id,
                        error = %err,
                        "skipping malformed event record"
                    );
                    continue;
                }
            };
            if event.scheduled_time >= now || !self.window.contains(event.hours_since_end) {
                stats.out_of_window += 1;
                trace!(
                    event_id = %event.event_id,
                    hours = event.hours_since_end,
                    window = %self.window.kind,
                    "event outside selection window"
                );
                continue;
            }
            if !seen.insert(event.event_id.clone()) {
                stats.duplicates += 1;
                continue;
            }
            if processed.contains(&event.event_id) {
                stats.already_processed += 1;
                debug!(event_id = %event.event_id, "event already processed");
                continue;
            }
            candidates.push(event);
        }

        candidates.sort_by(|a, b| {
            a.hours_since_end
                .total_cmp(&b.hours_since_end)
                .then_with(|| a.priority.cmp(&b.priority))
        });
        candidates.truncate(self.batch_size);
        stats.selected = candidates.len();
        debug!(
            records = stats.records,
            malformed = stats.malformed,
            out_of_window = stats.out_of_window,
            duplicates = stats.duplicates,
            already_processed = stats.already_processed,
            selected = stats.selected,
            "event selection complete"
        );
        (candidates, stats)
    }
}
