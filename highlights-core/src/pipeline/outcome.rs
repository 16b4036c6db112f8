use std::path::PathBuf;

use serde::Serialize;

use crate::acquisition::AcquisitionError;
use crate::branding::{BrandedArtifact, BrandingError};
use crate::ledger::LedgerError;
use crate::locator::{HighlightMatch, LocatorError};

/// Result of one pipeline stage for one candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome<T> {
    Success(T),
    NoMatch(String),
    Retryable(String),
    Fatal(String),
}

impl<T> StageOutcome<T> {
    pub fn reason(&self) -> Option<&str> {
        match self {
            StageOutcome::Success(_) => None,
            StageOutcome::NoMatch(reason)
            | StageOutcome::Retryable(reason)
            | StageOutcome::Fatal(reason) => Some(reason),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StageOutcome::Success(_) => "success",
            StageOutcome::NoMatch(_) => "no_match",
            StageOutcome::Retryable(_) => "retryable",
            StageOutcome::Fatal(_) => "fatal",
        }
    }
}

impl StageOutcome<HighlightMatch> {
    pub fn from_locator(result: Result<Option<HighlightMatch>, LocatorError>) -> Self {
        match result {
            Ok(Some(found)) => StageOutcome::Success(found),
            Ok(None) => StageOutcome::NoMatch("no query variant produced a highlight".into()),
            Err(err) if err.is_fatal() => StageOutcome::Fatal(err.to_string()),
            Err(err) => StageOutcome::Retryable(err.to_string()),
        }
    }
}

impl StageOutcome<PathBuf> {
    pub fn from_acquisition(result: Result<PathBuf, AcquisitionError>) -> Self {
        match result {
            Ok(path) => StageOutcome::Success(path),
            Err(err) if err.is_fatal() => StageOutcome::Fatal(err.to_string()),
            Err(err) => StageOutcome::Retryable(err.to_string()),
        }
    }
}

impl StageOutcome<BrandedArtifact> {
    pub fn from_branding(result: Result<BrandedArtifact, BrandingError>) -> Self {
        match result {
            Ok(artifact) => StageOutcome::Success(artifact),
            Err(err) if err.is_fatal() => StageOutcome::Fatal(err.to_string()),
            Err(err) => StageOutcome::Retryable(err.to_string()),
        }
    }
}

impl StageOutcome<()> {
    /// A concurrent record of the same event is not this run's failure; every
    /// other ledger error stops the run.
    pub fn from_ledger(result: Result<(), LedgerError>) -> Self {
        match result {
            Ok(()) => StageOutcome::Success(()),
            Err(err @ LedgerError::AlreadyRecorded { .. }) => StageOutcome::NoMatch(err.to_string()),
            Err(err) => StageOutcome::Fatal(err.to_string()),
        }
    }
}

/// What the candidate loop does after a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopDecision {
    Continue,
    NextCandidate,
    Abort,
}

impl<T> From<&StageOutcome<T>> for LoopDecision {
    fn from(outcome: &StageOutcome<T>) -> Self {
        match outcome {
            StageOutcome::Success(_) => LoopDecision::Continue,
            StageOutcome::NoMatch(_) | StageOutcome::Retryable(_) => LoopDecision::NextCandidate,
            StageOutcome::Fatal(_) => LoopDecision::Abort,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branding::BrandingStage;
    use crate::tools::ToolError;

    fn not_found() -> ToolError {
        ToolError::NotFound {
            program: "ffmpeg".into(),
        }
    }

    fn failed() -> ToolError {
        ToolError::Failed {
            program: "ffmpeg".into(),
            code: Some(1),
            stderr: "Invalid argument".into(),
        }
    }

    #[test]
    fn locator_results_map_to_decisions() {
        let none = StageOutcome::from_locator(Ok(None));
        assert_eq!(LoopDecision::from(&none), LoopDecision::NextCandidate);
        assert_eq!(none.label(), "no_match");

        let missing = StageOutcome::from_locator(Err(LocatorError::Tool(not_found())));
        assert_eq!(LoopDecision::from(&missing), LoopDecision::Abort);
    }

    #[test]
    fn branding_tool_failure_advances_but_missing_asset_aborts() {
        let tool = StageOutcome::from_branding(Err(BrandingError::Tool {
            stage: BrandingStage::Concatenated,
            source: failed(),
        }));
        assert_eq!(LoopDecision::from(&tool), LoopDecision::NextCandidate);
        assert!(tool.reason().unwrap().contains("concatenated"));

        let asset = StageOutcome::from_branding(Err(BrandingError::MissingAsset {
            path: "/assets/logo.png".into(),
        }));
        assert_eq!(LoopDecision::from(&asset), LoopDecision::Abort);
    }

    #[test]
    fn acquisition_and_ledger_classification() {
        let retry = StageOutcome::from_acquisition(Err(AcquisitionError::Tool(failed())));
        assert!(matches!(retry, StageOutcome::Retryable(_)));
        let fatal = StageOutcome::from_acquisition(Err(AcquisitionError::Tool(not_found())));
        assert!(matches!(fatal, StageOutcome::Fatal(_)));

        let dup = StageOutcome::from_ledger(Err(LedgerError::AlreadyRecorded {
            event_id: "4328-1".into(),
        }));
        assert_eq!(LoopDecision::from(&dup), LoopDecision::NextCandidate);
        let broken = StageOutcome::from_ledger(Err(LedgerError::MissingStore));
        assert_eq!(LoopDecision::from(&broken), LoopDecision::Abort);
        assert_eq!(
            LoopDecision::from(&StageOutcome::from_ledger(Ok(()))),
            LoopDecision::Continue
        );
    }
}
