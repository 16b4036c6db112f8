use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{BrandingError, BrandingResult};
use crate::tools::{run_checked, CommandRunner, ToolCommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
}

pub fn parse_dimensions(path: &Path, stdout: &str) -> BrandingResult<Dimensions> {
    let parsed: FfprobeOutput =
        serde_json::from_str(stdout.trim()).map_err(|err| BrandingError::Probe {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
    parsed
        .streams
        .iter()
        .find_map(|stream| match (stream.width, stream.height) {
            (Some(width), Some(height)) if width > 0 && height > 0 => {
                Some(Dimensions { width, height })
            }
            _ => None,
        })
        .ok_or_else(|| BrandingError::Probe {
            path: path.to_path_buf(),
            reason: "no video stream with dimensions".into(),
        })
}

/// Reads the first video stream's pixel size through ffprobe.
#[derive(Clone)]
pub struct MediaProbe {
    runner: Arc<dyn CommandRunner>,
    binary: String,
    timeout: Duration,
}

impl MediaProbe {
    pub fn new(runner: Arc<dyn CommandRunner>, binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            runner,
            binary: binary.into(),
            timeout,
        }
    }

    pub fn command(&self, path: &Path) -> ToolCommand {
        ToolCommand::new(&self.binary)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height",
                "-of",
                "json",
            ])
            .arg(path.to_string_lossy())
            .with_timeout(self.timeout)
    }

    pub async fn dimensions(&self, path: &Path) -> BrandingResult<Dimensions> {
        let output = run_checked(self.runner.as_ref(), &self.command(path))
            .await
            .map_err(|source| BrandingError::ProbeTool {
                path: path.to_path_buf(),
                source,
            })?;
        parse_dimensions(path, &output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::ScriptedRunner;
    use crate::tools::ToolError;

    #[test]
    fn parses_ffprobe_stream_json() {
        let json = r#"{"programs": [], "streams": [{"width": 1920, "height": 1080}]}"#;
        assert_eq!(
            parse_dimensions(Path::new("a.mp4"), json).unwrap(),
            Dimensions {
                width: 1920,
                height: 1080
            }
        );
    }

    #[test]
    fn empty_stream_list_is_a_probe_error() {
        let err = parse_dimensions(Path::new("a.mp4"), r#"{"streams": []}"#).unwrap_err();
        assert!(matches!(err, BrandingError::Probe { .. }));
        let err = parse_dimensions(Path::new("a.mp4"), "not json").unwrap_err();
        assert!(matches!(err, BrandingError::Probe { .. }));
    }

    #[tokio::test]
    async fn missing_ffprobe_is_fatal() {
        let runner = Arc::new(ScriptedRunner::new(|command| {
            Err(ToolError::NotFound {
                program: command.program.clone(),
            })
        }));
        let probe = MediaProbe::new(runner, "ffprobe", Duration::from_secs(5));
        let err = probe.dimensions(Path::new("x.mp4")).await.unwrap_err();
        assert!(matches!(err, BrandingError::ProbeTool { .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn ffprobe_exit_failure_is_not_fatal() {
        let runner = Arc::new(ScriptedRunner::new(|_| {
            Ok(crate::tools::CommandOutput::failure(1, "moov atom not found"))
        }));
        let probe = MediaProbe::new(runner, "ffprobe", Duration::from_secs(5));
        let err = probe.dimensions(Path::new("x.mp4")).await.unwrap_err();
        assert!(!err.is_fatal());
    }
}
