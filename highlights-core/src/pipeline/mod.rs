pub mod janitor;
pub mod outcome;
pub mod report;

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};
use uuid::Uuid;

pub use janitor::ArtifactJanitor;
pub use outcome::{LoopDecision, StageOutcome};
pub use report::{AttemptStatus, CandidateAttempt, PipelineStage, ProducedHighlight, RunReport};

use crate::acquisition::{AcquisitionError, Downloader};
use crate::branding::{
    remove_if_present, ArtifactSet, BrandedArtifact, BrandingAssets, BrandingCompositor,
    BrandingError,
};
use crate::config::{PipelineConfig, WindowKind};
use crate::events::{
    sanitize_file_stem, Event, EventError, EventSelector, EventSource, SelectionWindow,
    SportsDbClient,
};
use crate::ledger::{LedgerEntry, LedgerError, SqliteLedger};
use crate::locator::{HighlightLocator, HighlightMatch, VideoSearch, YtDlpSearch};
use crate::tools::{CommandRunner, SystemCommandRunner};

const FAILURE_LOG: &str = "pipeline_failures.log";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("event source error: {0}")]
    Events(#[from] EventError),
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("acquisition error: {0}")]
    Acquisition(#[from] AcquisitionError),
    #[error("branding error: {0}")]
    Branding(#[from] BrandingError),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub window: WindowKind,
    pub batch_size: usize,
    pub dry_run: bool,
}

impl RunOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            window: config.selection.window,
            batch_size: config.selection.batch_size,
            dry_run: false,
        }
    }
}

struct EventOutcome {
    attempt: CandidateAttempt,
    produced: Option<ProducedHighlight>,
    decision: LoopDecision,
}

pub struct HighlightPipeline {
    config: PipelineConfig,
    source: Arc<dyn EventSource>,
    locator: HighlightLocator,
    downloader: Downloader,
    compositor: BrandingCompositor,
    ledger: SqliteLedger,
    janitor: ArtifactJanitor,
    videos_dir: PathBuf,
    failure_log: PathBuf,
}

impl HighlightPipeline {
    pub fn new(
        config: PipelineConfig,
        source: Arc<dyn EventSource>,
        search: Arc<dyn VideoSearch>,
        runner: Arc<dyn CommandRunner>,
        ledger: SqliteLedger,
    ) -> PipelineResult<Self> {
        config.validate().map_err(PipelineError::InvalidConfig)?;
        let videos_dir = config.videos_dir();
        let logs_dir = config.logs_dir();
        for dir in [&videos_dir, &config.data_dir(), &logs_dir] {
            std::fs::create_dir_all(dir).map_err(|source| PipelineError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        ledger.initialize()?;
        let assets = BrandingAssets::from_config(&config);
        assets.check()?;
        let keep_raw = config.branding.keep_raw_on_failure;

        let downloader = Downloader::new(Arc::clone(&runner), &config.download, &videos_dir)?
            .with_support_files(
                config
                    .download
                    .cookies_file
                    .as_ref()
                    .map(|path| config.resolve_path(path)),
                config
                    .download
                    .archive_file
                    .as_ref()
                    .map(|path| config.resolve_path(path)),
            )
            .with_reuse_existing(keep_raw);
        let compositor = BrandingCompositor::new(Arc::clone(&runner), &config.branding, assets);
        let locator = HighlightLocator::new(search, &config.search);

        Ok(Self {
            janitor: ArtifactJanitor::new(&videos_dir).keep_raw(keep_raw),
            failure_log: logs_dir.join(FAILURE_LOG),
            config,
            source,
            locator,
            downloader,
            compositor,
            ledger,
            videos_dir,
        })
    }

    /// Production wiring: TheSportsDB, yt-dlp, ffmpeg and the configured ledger.
    pub fn from_config(config: PipelineConfig) -> PipelineResult<Self> {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner);
        let source = Arc::new(SportsDbClient::new(&config.provider)?);
        let search = Arc::new(YtDlpSearch::new(Arc::clone(&runner), &config.search));
        let ledger = SqliteLedger::new(config.ledger_path())?;
        Self::new(config, source, search, runner, ledger)
    }

    pub fn with_retry_sleep_cap(mut self, cap: Duration) -> Self {
        self.downloader = self.downloader.with_retry_sleep_cap(cap);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn ledger(&self) -> &SqliteLedger {
        &self.ledger
    }

    pub fn failure_log(&self) -> &Path {
        &self.failure_log
    }

    pub fn selector(&self, window: WindowKind, batch_size: usize) -> EventSelector {
        EventSelector::new(
            SelectionWindow::from_config(window, &self.config.selection),
            batch_size,
        )
    }

    pub async fn run(&self, now: DateTime<Utc>) -> PipelineResult<RunReport> {
        self.run_with(now, RunOptions::from_config(&self.config))
            .await
    }

    /// One run: sweep orphans, fetch, select, then work through the candidates
    /// until one produces a recorded highlight or a stage aborts.
    pub async fn run_with(&self, now: DateTime<Utc>, options: RunOptions) -> PipelineResult<RunReport> {
        if options.batch_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "batch_size must be greater than zero".into(),
            ));
        }
        let mut report = RunReport::new(Uuid::new_v4(), options.window, options.dry_run, Utc::now());
        info!(run_id = %report.run_id, window = %options.window, batch_size = options.batch_size, dry_run = options.dry_run, "pipeline run started");

        let processed = self.ledger.processed_ids()?;
        if !options.dry_run {
            let recorded = self.ledger.recorded_outputs()?;
            match self.janitor.sweep(&recorded).await {
                Ok(removed) => report.swept = removed.len(),
                Err(err) => warn!(dir = %self.videos_dir.display(), error = %err, "artifact sweep failed"),
            }
        }

        let records = self.source.fetch_events().await?;
        report.fetched = records.len();
        let selector = self.selector(options.window, options.batch_size);
        let (candidates, stats) = selector.select_with_stats(&records, now, &processed);
        report.selection = stats;
        report.candidates = candidates.iter().map(|e| e.event_id.clone()).collect();

        if !options.dry_run {
            for event in &candidates {
                let outcome = self.process_event(event).await;
                report.attempts.push(outcome.attempt.clone());
                match outcome.decision {
                    LoopDecision::Continue => {
                        report.produced = outcome.produced;
                        break;
                    }
                    LoopDecision::NextCandidate => continue,
                    LoopDecision::Abort => {
                        report.aborted = outcome.attempt.reason.clone();
                        break;
                    }
                }
            }
        }

        report.finished_at = Utc::now();
        match (&report.produced, &report.aborted) {
            (Some(produced), _) => info!(run_id = %report.run_id, event_id = %produced.entry.event_id, path = %produced.entry.output_path, "pipeline run produced highlight"),
            (None, Some(reason)) => warn!(run_id = %report.run_id, reason = %reason, "pipeline run aborted"),
            (None, None) => info!(run_id = %report.run_id, candidates = report.candidates.len(), "no candidate could be processed"),
        }
        Ok(report)
    }

    async fn process_event(&self, event: &Event) -> EventOutcome {
        info!(event_id = %event.event_id, title = %event.title, hours = event.hours_since_end, "processing candidate");

        let matched = match StageOutcome::from_locator(self.locator.locate(event).await) {
            StageOutcome::Success(found) => found,
            other => return self.abandon(event, PipelineStage::Locate, None, &other),
        };

        let stem = event.artifact_stem();
        let artifacts = ArtifactSet::for_stem(&self.videos_dir, &stem);
        let download = self.downloader.download(&matched.url, &stem).await;
        match StageOutcome::from_acquisition(download) {
            StageOutcome::Success(_) => {}
            other => return self.abandon(event, PipelineStage::Download, Some(&matched), &other),
        }

        let branded = match StageOutcome::from_branding(self.compositor.brand(&artifacts).await) {
            StageOutcome::Success(branded) => branded,
            other => return self.abandon(event, PipelineStage::Brand, Some(&matched), &other),
        };

        let sha256 = match file_sha256(&branded.path).await {
            Ok(digest) => Some(digest),
            Err(err) => {
                warn!(path = %branded.path.display(), error = %err, "failed to checksum final artifact");
                None
            }
        };
        let entry = LedgerEntry::from_event(event, &branded.path, Some(&matched), sha256, Utc::now());
        let recorded = StageOutcome::from_ledger(self.ledger.record(&entry));
        if let StageOutcome::Fatal(_) = recorded {
            remove_if_present(&branded.path).await;
        }
        if !matches!(recorded, StageOutcome::Success(())) {
            return self.abandon(event, PipelineStage::Record, Some(&matched), &recorded);
        }

        EventOutcome {
            attempt: CandidateAttempt {
                event_id: event.event_id.clone(),
                title: event.title.clone(),
                stage: PipelineStage::Record,
                status: AttemptStatus::Produced,
                reason: None,
                video_url: Some(matched.url.clone()),
            },
            produced: Some(ProducedHighlight {
                entry,
                dimensions: branded.dimensions,
            }),
            decision: LoopDecision::Continue,
        }
    }

    fn abandon<T>(
        &self,
        event: &Event,
        stage: PipelineStage,
        matched: Option<&HighlightMatch>,
        outcome: &StageOutcome<T>,
    ) -> EventOutcome {
        let decision = LoopDecision::from(outcome);
        let reason = outcome.reason().unwrap_or_default().to_string();
        let status = match outcome {
            StageOutcome::NoMatch(_) => AttemptStatus::NoMatch,
            StageOutcome::Fatal(_) => AttemptStatus::Aborted,
            _ => AttemptStatus::Failed,
        };
        warn!(event_id = %event.event_id, stage = %stage, outcome = outcome.label(), error = %reason, "candidate abandoned");
        self.log_failure(stage, &event.event_id, &reason);
        EventOutcome {
            attempt: CandidateAttempt {
                event_id: event.event_id.clone(),
                title: event.title.clone(),
                stage,
                status,
                reason: Some(reason),
                video_url: matched.map(|m| m.url.clone()),
            },
            produced: None,
            decision,
        }
    }

    /// Download and brand a single URL without touching the ledger.
    pub async fn process_url(&self, url: &str) -> PipelineResult<BrandedArtifact> {
        let digest = hex::encode(Sha256::digest(url.as_bytes()));
        let stem = sanitize_file_stem(&format!("manual_{}", &digest[..12]));
        let artifacts = ArtifactSet::for_stem(&self.videos_dir, &stem);
        info!(url, stem = %stem, "processing single url");
        self.downloader.download(url, &stem).await?;
        let branded = self.compositor.brand(&artifacts).await?;
        Ok(branded)
    }

    fn log_failure(&self, stage: PipelineStage, event_id: &str, error: &str) {
        if let Ok(mut file) = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.failure_log)
        {
            let _ = writeln!(
                file,
                "{} [{}] {} {}",
                Utc::now().to_rfc3339(),
                stage,
                event_id,
                error
            );
        }
    }
}

async fn file_sha256(path: &Path) -> std::io::Result<String> {
    let mut file = fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}
