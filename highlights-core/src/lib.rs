pub mod acquisition;
pub mod branding;
pub mod config;
pub mod error;
pub mod events;
pub mod ledger;
pub mod locator;
pub mod pipeline;
pub mod sqlite;
pub mod tools;

pub use acquisition::{AcquisitionError, AcquisitionResult, Downloader, RetryPolicy};
pub use branding::{
    ArtifactSet, BrandedArtifact, BrandingAssets, BrandingCompositor, BrandingError,
    BrandingResult, BrandingStage, Dimensions, FfmpegInvocation, Filter, FilterChain, FilterGraph,
    MediaProbe, StreamLabel,
};
pub use config::{
    load_pipeline_config, BrandingMode, LeagueEntry, PipelineConfig, WindowKind,
};
pub use error::{ConfigError, Result};
pub use events::{
    Event, EventError, EventResult, EventSelector, EventSource, SelectionStats, SelectionWindow,
    SourcedRecord, SportsDbClient,
};
pub use ledger::{
    ImportReport, LedgerEntry, LedgerError, LedgerResult, SqliteLedger, SqliteLedgerBuilder,
};
pub use locator::{
    HighlightLocator, HighlightMatch, LocatorError, LocatorResult, SearchHit, VideoSearch,
    YtDlpSearch,
};
pub use pipeline::{
    ArtifactJanitor, AttemptStatus, CandidateAttempt, HighlightPipeline, LoopDecision,
    PipelineError, PipelineResult, PipelineStage, ProducedHighlight, RunOptions, RunReport,
    StageOutcome,
};
pub use tools::{CommandOutput, CommandRunner, SystemCommandRunner, ToolCommand, ToolError};
