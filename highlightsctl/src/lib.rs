use std::collections::BTreeSet;
use std::env;
use std::fmt;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use highlights_core::{
    load_pipeline_config, BrandedArtifact, BrandingAssets, ConfigError, HighlightPipeline,
    ImportReport, LedgerEntry, LedgerError, PipelineConfig, PipelineError, RunOptions, RunReport,
    SqliteLedger, WindowKind,
};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::EnvFilter;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("required resource missing: {0}")]
    MissingResource(String),
    #[error("run aborted: {0}")]
    RunAborted(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Sports highlight pipeline control interface", long_about = None)]
pub struct Cli {
    /// Path to highlights.toml
    #[arg(long, default_value = "configs/highlights.toml")]
    pub config: PathBuf,
    /// Alternate ledger database (replaces ledger.path)
    #[arg(long)]
    pub ledger_db: Option<PathBuf>,
    /// Alternate videos directory (replaces paths.videos_dir)
    #[arg(long)]
    pub videos_dir: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    /// Debug-level logging unless RUST_LOG is set
    #[arg(long, short, default_value_t = false)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Selects recent events and produces at most one branded highlight
    Run(RunArgs),
    /// Downloads and brands a single video URL without touching the ledger
    ProcessUrl(ProcessUrlArgs),
    /// Processed-event ledger operations
    #[command(subcommand)]
    Ledger(LedgerCommands),
    /// Runs integrity checks
    #[command(subcommand)]
    Health(HealthCommands),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Selection window: primary, extended or full
    #[arg(long)]
    pub window: Option<WindowKind>,
    /// Number of candidates to consider (at least 1)
    #[arg(long)]
    pub batch_size: Option<NonZeroUsize>,
    /// Select and report without downloading
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct ProcessUrlArgs {
    pub url: String,
}

#[derive(Subcommand, Debug)]
pub enum LedgerCommands {
    /// Lists recorded highlights, most recent first
    List(LedgerListArgs),
    /// Shows one recorded event
    Show(LedgerShowArgs),
    /// Imports the flat-file ledger
    Import(LedgerImportArgs),
}

#[derive(Args, Debug)]
pub struct LedgerListArgs {
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

#[derive(Args, Debug)]
pub struct LedgerShowArgs {
    pub event_id: String,
}

#[derive(Args, Debug)]
pub struct LedgerImportArgs {
    /// One processed event id per line
    #[arg(long)]
    pub ids: PathBuf,
    /// JSON detail log (array or one object per line)
    #[arg(long)]
    pub details: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum HealthCommands {
    /// Checks config, assets, tool binaries, ledger and videos directory
    Check,
}

/// Installs the fmt subscriber on stderr. `RUST_LOG` wins over `--verbose`.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run(cli: Cli) -> Result<()> {
    init_tracing(cli.verbose);
    let context = AppContext::new(&cli)?;

    match &cli.command {
        Commands::Run(args) => {
            let report = context.run_pipeline(args)?;
            render(&report, cli.format)?;
            if let Some(reason) = report.aborted {
                return Err(AppError::RunAborted(reason));
            }
        }
        Commands::ProcessUrl(args) => {
            let artifact = context.process_url(&args.url)?;
            render(&artifact, cli.format)?;
        }
        Commands::Ledger(LedgerCommands::List(args)) => {
            let entries = context.ledger_list(args)?;
            render(&entries, cli.format)?;
        }
        Commands::Ledger(LedgerCommands::Show(args)) => {
            let entry = context.ledger_show(&args.event_id)?;
            render(&entry, cli.format)?;
        }
        Commands::Ledger(LedgerCommands::Import(args)) => {
            let report = context.ledger_import(args)?;
            render(&report, cli.format)?;
        }
        Commands::Health(HealthCommands::Check) => {
            let report = context.health_check();
            render(&report, cli.format)?;
            if report
                .iter()
                .any(|entry| matches!(entry.status, CheckStatus::Error))
            {
                return Err(AppError::MissingResource(
                    "one or more health checks failed".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug)]
struct AppContext {
    config: PipelineConfig,
    config_path: PathBuf,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        debug!(config = %cli.config.display(), "loading configuration");
        let mut config = load_pipeline_config(&cli.config)?;
        if let Some(videos_dir) = &cli.videos_dir {
            config.paths.videos_dir = videos_dir.to_string_lossy().to_string();
        }
        if let Some(ledger_db) = &cli.ledger_db {
            config.ledger.path = ledger_db.to_string_lossy().to_string();
        }
        Ok(Self {
            config,
            config_path: cli.config.clone(),
        })
    }

    fn runtime(&self) -> Result<tokio::runtime::Runtime> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        Ok(runtime)
    }

    fn ledger(&self) -> Result<SqliteLedger> {
        Ok(SqliteLedger::new(self.config.ledger_path())?)
    }

    fn run_options(&self, args: &RunArgs) -> RunOptions {
        let defaults = RunOptions::from_config(&self.config);
        RunOptions {
            window: args.window.unwrap_or(defaults.window),
            batch_size: args
                .batch_size
                .map(NonZeroUsize::get)
                .unwrap_or(defaults.batch_size),
            dry_run: args.dry_run,
        }
    }

    fn run_pipeline(&self, args: &RunArgs) -> Result<RunReport> {
        let options = self.run_options(args);
        let pipeline = HighlightPipeline::from_config(self.config.clone())?;
        let report = self
            .runtime()?
            .block_on(pipeline.run_with(Utc::now(), options))?;
        Ok(report)
    }

    fn process_url(&self, url: &str) -> Result<BrandedArtifact> {
        let pipeline = HighlightPipeline::from_config(self.config.clone())?;
        let artifact = self.runtime()?.block_on(pipeline.process_url(url))?;
        Ok(artifact)
    }

    fn ledger_list(&self, args: &LedgerListArgs) -> Result<Vec<LedgerEntry>> {
        Ok(self.ledger()?.list(args.limit)?)
    }

    fn ledger_show(&self, event_id: &str) -> Result<LedgerEntry> {
        self.ledger()?
            .fetch(event_id)?
            .ok_or_else(|| AppError::MissingResource(format!("event {event_id} not in ledger")))
    }

    fn ledger_import(&self, args: &LedgerImportArgs) -> Result<ImportReport> {
        let ledger = self.ledger()?;
        ledger.initialize()?;
        Ok(ledger.import_legacy(&args.ids, &args.details)?)
    }

    fn health_check(&self) -> Vec<HealthEntry> {
        let mut results = vec![self.check_path("highlights.toml", &self.config_path)];
        results.push(match self.config.validate() {
            Ok(()) => HealthEntry::ok(
                "config",
                format!("{} leagues", self.config.provider.leagues.len()),
            ),
            Err(reason) => HealthEntry::error("config", reason),
        });

        let assets = BrandingAssets::from_config(&self.config);
        for path in assets.required() {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            results.push(self.check_path(&format!("asset {name}"), path));
        }

        let binaries: BTreeSet<&str> = [
            self.config.search.binary.as_str(),
            self.config.download.binary.as_str(),
            self.config.branding.ffmpeg.as_str(),
            self.config.branding.ffprobe.as_str(),
        ]
        .into_iter()
        .collect();
        for binary in binaries {
            results.push(match find_executable(binary) {
                Some(path) => HealthEntry::ok(binary, path.display().to_string()),
                None => HealthEntry::error(binary, "not found on PATH"),
            });
        }

        results.push(self.check_ledger());
        results.push(self.check_directory("videos", &self.config.videos_dir()));
        results
    }

    fn check_path(&self, name: &str, path: &Path) -> HealthEntry {
        if path.exists() {
            HealthEntry::ok(name, format!("{}", path.display()))
        } else {
            HealthEntry::error(name, format!("{path} missing", path = path.display()))
        }
    }

    fn check_directory(&self, name: &str, path: &Path) -> HealthEntry {
        match fs::metadata(path) {
            Ok(meta) if meta.is_dir() => HealthEntry::ok(name, format!("{}", path.display())),
            Ok(_) => HealthEntry::warn(
                name,
                format!("{path} is not a directory", path = path.display()),
            ),
            Err(_) => HealthEntry::warn(name, format!("{path} not found", path = path.display())),
        }
    }

    fn check_ledger(&self) -> HealthEntry {
        let path = self.config.ledger_path();
        if !path.exists() {
            return HealthEntry::warn("ledger", format!("{} not created yet", path.display()));
        }
        let ledger = match self.ledger() {
            Ok(ledger) => ledger,
            Err(err) => return HealthEntry::error("ledger", format!("failed to open: {err}")),
        };
        match (ledger.integrity_check(), ledger.count()) {
            (Ok(result), Ok(count)) if result.eq_ignore_ascii_case("ok") => {
                HealthEntry::ok("ledger", format!("integrity ok, {count} events"))
            }
            (Ok(result), _) => HealthEntry::warn("ledger", format!("integrity_check: {result}")),
            (Err(err), _) => HealthEntry::error("ledger", format!("failed to open: {err}")),
        }
    }
}

/// Resolves `program` the way a shell would: explicit paths are checked as
/// given, bare names against every `PATH` entry.
fn find_executable(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|path| path.is_file())
}

impl DisplayFallback for RunReport {
    fn display(&self) -> String {
        let mut lines = vec![format!(
            "Run {} (window: {}{})",
            self.run_id,
            self.window,
            if self.dry_run { ", dry run" } else { "" }
        )];
        lines.push(format!(
            "  fetched {} records, {} selected ({} malformed, {} out of window, {} already processed)",
            self.fetched,
            self.selection.selected,
            self.selection.malformed,
            self.selection.out_of_window,
            self.selection.already_processed
        ));
        if self.swept > 0 {
            lines.push(format!("  swept {} orphaned artifacts", self.swept));
        }
        if self.dry_run {
            for id in &self.candidates {
                lines.push(format!("  - candidate {id}"));
            }
        }
        for attempt in &self.attempts {
            let reason = attempt.reason.as_deref().unwrap_or("");
            lines.push(format!(
                "  - {} [{}] {:?} {}",
                attempt.event_id, attempt.stage, attempt.status, reason
            ));
        }
        match (&self.produced, &self.aborted) {
            (Some(produced), _) => lines.push(format!(
                "Produced {} ({}) -> {}",
                produced.entry.event_id, produced.dimensions, produced.entry.output_path
            )),
            (None, Some(reason)) => lines.push(format!("Aborted: {reason}")),
            (None, None) if !self.dry_run => lines.push("No highlight produced".to_string()),
            (None, None) => {}
        }
        lines.join("\n")
    }
}

impl DisplayFallback for BrandedArtifact {
    fn display(&self) -> String {
        format!("{} ({})", self.path.display(), self.dimensions)
    }
}

impl DisplayFallback for LedgerEntry {
    fn display(&self) -> String {
        let mut lines = vec![
            format!("{}: {} vs {}", self.event_id, self.away_team, self.home_team),
            format!("  sport: {} (league {})", self.sport, self.league_id),
        ];
        if let Some(date) = self.event_date {
            lines.push(format!("  date: {date}"));
        }
        if let Some(score) = &self.final_score {
            lines.push(format!("  score: {score}"));
        }
        lines.push(format!("  output: {}", self.output_path));
        if let Some(url) = &self.video_url {
            lines.push(format!("  source: {url}"));
        }
        if let Some(sha) = &self.sha256 {
            lines.push(format!("  sha256: {sha}"));
        }
        lines.push(format!("  processed: {}", self.processed_at.to_rfc3339()));
        lines.join("\n")
    }
}

impl DisplayFallback for Vec<LedgerEntry> {
    fn display(&self) -> String {
        if self.is_empty() {
            return "No processed events".to_string();
        }
        self.iter()
            .map(|entry| {
                format!(
                    "{} {} {} vs {} {}",
                    entry.processed_at.format("%Y-%m-%d %H:%M"),
                    entry.event_id,
                    entry.away_team,
                    entry.home_team,
                    entry.final_score.as_deref().unwrap_or("-")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl DisplayFallback for ImportReport {
    fn display(&self) -> String {
        let mut lines = vec![format!(
            "Imported {} events ({} already present)",
            self.imported, self.already_present
        )];
        if !self.missing_details.is_empty() {
            lines.push(format!(
                "Skipped without details: {}",
                self.missing_details.join(", ")
            ));
        }
        if !self.missing_ids.is_empty() {
            lines.push(format!(
                "Skipped details without id: {}",
                self.missing_ids.join(", ")
            ));
        }
        lines.join("\n")
    }
}

impl DisplayFallback for Vec<HealthEntry> {
    fn display(&self) -> String {
        self.iter()
            .map(|entry| entry.display())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct HealthEntry {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub enum CheckStatus {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "error")]
    Error,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CheckStatus::Ok => "OK",
            CheckStatus::Warn => "WARN",
            CheckStatus::Error => "ERROR",
        };
        write!(f, "{}", label)
    }
}

impl HealthEntry {
    fn ok(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Ok,
            detail: detail.into(),
        }
    }

    fn warn(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Warn,
            detail: detail.into(),
        }
    }

    fn error(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Error,
            detail: detail.into(),
        }
    }
}

impl DisplayFallback for HealthEntry {
    fn display(&self) -> String {
        format!(
            "[{status}] {name}: {detail}",
            status = self.status,
            name = self.name,
            detail = self.detail
        )
    }
}
