use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::Serialize;
use tracing::{info, warn};

use super::models::{LedgerEntry, LegacyDetail};
use super::{LedgerError, LedgerResult};
use crate::sqlite::{configure_connection, integrity_check};

const LEDGER_SCHEMA: &str = include_str!("../../../sql/ledger.sql");

const ENTRY_COLUMNS: &str = "event_id, sport, league_id, event_date, home_team, away_team, \
     home_score, away_score, final_score, output_path, video_url, search_query, sha256, processed_at";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub already_present: usize,
    /// Identifiers listed without a detail record.
    pub missing_details: Vec<String>,
    /// Detail records whose identifier was never logged.
    pub missing_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SqliteLedgerBuilder {
    path: Option<PathBuf>,
    read_only: bool,
    create_if_missing: bool,
}

impl Default for SqliteLedgerBuilder {
    fn default() -> Self {
        Self {
            path: None,
            read_only: false,
            create_if_missing: true,
        }
    }
}

impl SqliteLedgerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    pub fn build(self) -> LedgerResult<SqliteLedger> {
        let path = self.path.ok_or(LedgerError::MissingStore)?;
        let mut flags = if self.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
        };
        let create = !self.read_only && self.create_if_missing;
        if create {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }
        Ok(SqliteLedger {
            path,
            flags,
            create,
        })
    }
}

/// Processed-event ledger: one row per produced highlight, written in a single
/// transaction so an identifier never exists without its details.
#[derive(Debug, Clone)]
pub struct SqliteLedger {
    path: PathBuf,
    flags: OpenFlags,
    create: bool,
}

impl SqliteLedger {
    pub fn builder() -> SqliteLedgerBuilder {
        SqliteLedgerBuilder::new()
    }

    pub fn new(path: impl AsRef<Path>) -> LedgerResult<Self> {
        SqliteLedgerBuilder::new().path(path).build()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn open(&self) -> LedgerResult<Connection> {
        if self.create {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|source| LedgerError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        let conn = Connection::open_with_flags(&self.path, self.flags).map_err(|source| {
            LedgerError::OpenDatabase {
                path: self.path.clone(),
                source,
            }
        })?;
        if !self.flags.contains(OpenFlags::SQLITE_OPEN_READ_ONLY) {
            configure_connection(&conn).map_err(|source| LedgerError::OpenDatabase {
                path: self.path.clone(),
                source,
            })?;
        }
        Ok(conn)
    }

    /// Opens an existing ledger that has the schema, or `None` when there is
    /// nothing recorded yet.
    fn open_existing(&self) -> LedgerResult<Option<Connection>> {
        if !self.exists() {
            return Ok(None);
        }
        let conn = self.open()?;
        let has_table: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'processed_events'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(has_table.map(|_| conn))
    }

    pub fn initialize(&self) -> LedgerResult<()> {
        let conn = self.open()?;
        conn.execute_batch(LEDGER_SCHEMA)?;
        Ok(())
    }

    /// A missing ledger means nothing has been processed yet.
    pub fn has_processed(&self, event_id: &str) -> LedgerResult<bool> {
        let Some(conn) = self.open_existing()? else {
            return Ok(false);
        };
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM processed_events WHERE event_id = ?1",
                params![event_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn processed_ids(&self) -> LedgerResult<HashSet<String>> {
        let Some(conn) = self.open_existing()? else {
            return Ok(HashSet::new());
        };
        let mut stmt = conn.prepare("SELECT event_id FROM processed_events")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut ids = HashSet::new();
        for row in rows {
            ids.insert(row?);
        }
        Ok(ids)
    }

    /// Final artifact paths of every recorded event.
    pub fn recorded_outputs(&self) -> LedgerResult<HashSet<PathBuf>> {
        let Some(conn) = self.open_existing()? else {
            return Ok(HashSet::new());
        };
        let mut stmt = conn.prepare("SELECT output_path FROM processed_events")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut outputs = HashSet::new();
        for row in rows {
            outputs.insert(PathBuf::from(row?));
        }
        Ok(outputs)
    }

    pub fn record(&self, entry: &LedgerEntry) -> LedgerResult<()> {
        let mut conn = self.open()?;
        conn.execute_batch(LEDGER_SCHEMA)?;
        let tx = conn.transaction()?;
        let exists: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM processed_events WHERE event_id = ?1",
                params![entry.event_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(LedgerError::AlreadyRecorded {
                event_id: entry.event_id.clone(),
            });
        }
        insert_entry(&tx, entry)?;
        tx.commit()?;
        info!(event_id = %entry.event_id, path = %entry.output_path, "event recorded in ledger");
        Ok(())
    }

    pub fn fetch(&self, event_id: &str) -> LedgerResult<Option<LedgerEntry>> {
        let Some(conn) = self.open_existing()? else {
            return Ok(None);
        };
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM processed_events WHERE event_id = ?1");
        let entry = conn
            .query_row(&sql, params![event_id], LedgerEntry::from_row)
            .optional()?;
        Ok(entry)
    }

    /// Most recent first.
    pub fn list(&self, limit: usize) -> LedgerResult<Vec<LedgerEntry>> {
        let Some(conn) = self.open_existing()? else {
            return Ok(Vec::new());
        };
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM processed_events \
             ORDER BY processed_at DESC, event_id ASC LIMIT ?1"
        );
        let mut stmt = conn.prepare(&sql)?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![limit], LedgerEntry::from_row)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    pub fn count(&self) -> LedgerResult<u64> {
        let Some(conn) = self.open_existing()? else {
            return Ok(0);
        };
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM processed_events", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    pub fn integrity_check(&self) -> LedgerResult<String> {
        let conn = self.open()?;
        Ok(integrity_check(&conn)?)
    }

    /// Migrates the flat-file ledger: one identifier per line in `ids_file`
    /// and a JSON detail log (array or one object per line) in `details_file`.
    /// Only identifiers present in both files are imported.
    pub fn import_legacy(&self, ids_file: &Path, details_file: &Path) -> LedgerResult<ImportReport> {
        let ids_raw = std::fs::read_to_string(ids_file).map_err(|source| LedgerError::Io {
            path: ids_file.to_path_buf(),
            source,
        })?;
        let details_raw =
            std::fs::read_to_string(details_file).map_err(|source| LedgerError::Io {
                path: details_file.to_path_buf(),
                source,
            })?;
        let details = parse_legacy_details(details_file, &details_raw)?;

        let mut ids: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for line in ids_raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if seen.insert(line.to_string()) {
                ids.push(line.to_string());
            }
        }

        let mut by_id: HashMap<String, LegacyDetail> = HashMap::new();
        let mut report = ImportReport::default();
        for detail in details {
            if !seen.contains(&detail.event_id) {
                report.missing_ids.push(detail.event_id.clone());
                continue;
            }
            by_id.entry(detail.event_id.clone()).or_insert(detail);
        }

        let imported_at = Utc::now();
        let mut conn = self.open()?;
        conn.execute_batch(LEDGER_SCHEMA)?;
        let tx = conn.transaction()?;
        for id in ids {
            let Some(detail) = by_id.remove(&id) else {
                report.missing_details.push(id);
                continue;
            };
            let entry = detail.into_entry(imported_at);
            let exists: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM processed_events WHERE event_id = ?1",
                    params![entry.event_id],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_some() {
                report.already_present += 1;
                continue;
            }
            insert_entry(&tx, &entry)?;
            report.imported += 1;
        }
        tx.commit()?;

        if !report.missing_details.is_empty() || !report.missing_ids.is_empty() {
            warn!(
                missing_details = report.missing_details.len(),
                missing_ids = report.missing_ids.len(),
                "legacy ledger entries skipped"
            );
        }
        info!(imported = report.imported, already_present = report.already_present, "legacy ledger imported");
        Ok(report)
    }
}

fn insert_entry(conn: &Connection, entry: &LedgerEntry) -> LedgerResult<()> {
    conn.execute(
        &format!(
            "INSERT INTO processed_events ({ENTRY_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
        ),
        params![
            entry.event_id,
            entry.sport,
            entry.league_id,
            entry.event_date,
            entry.home_team,
            entry.away_team,
            entry.home_score,
            entry.away_score,
            entry.final_score,
            entry.output_path,
            entry.video_url,
            entry.search_query,
            entry.sha256,
            entry.processed_at,
        ],
    )?;
    Ok(())
}

fn parse_legacy_details(path: &Path, raw: &str) -> LedgerResult<Vec<LegacyDetail>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).map_err(|source| LedgerError::Serde {
            path: path.to_path_buf(),
            source,
        });
    }
    trimmed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            serde_json::from_str(line).map_err(|source| LedgerError::Serde {
                path: path.to_path_buf(),
                source,
            })
        })
        .collect()
}
