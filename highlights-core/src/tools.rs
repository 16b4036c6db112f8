use std::fmt;
use std::io;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

const STDERR_TAIL: usize = 600;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("binary not found: {program}")]
    NotFound { program: String },
    #[error("failed to spawn {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} timed out after {timeout:?}")]
    TimedOut { program: String, timeout: Duration },
    #[error("{program} exited with {code:?}: {stderr}")]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
}

pub type ToolResult<T> = std::result::Result<T, ToolError>;

/// One external tool invocation: program, argument vector and optional deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Option<Duration>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn args<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(values.into_iter().map(Into::into));
        self
    }

    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.args.iter().any(|arg| arg == flag)
    }

    /// Value following `flag`, if present.
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|arg| arg == flag)
            .and_then(|idx| self.args.get(idx + 1))
            .map(String::as_str)
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    fn stderr_tail(&self) -> String {
        let trimmed = self.stderr.trim();
        let count = trimmed.chars().count();
        if count <= STDERR_TAIL {
            trimmed.to_string()
        } else {
            trimmed.chars().skip(count - STDERR_TAIL).collect()
        }
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &ToolCommand) -> ToolResult<CommandOutput>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, command: &ToolCommand) -> ToolResult<CommandOutput> {
        debug!(program = %command.program, command = %command, "spawning external tool");
        let mut process = Command::new(&command.program);
        process
            .args(&command.args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        let output = match command.timeout {
            Some(limit) => match timeout(limit, process.output()).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(ToolError::TimedOut {
                        program: command.program.clone(),
                        timeout: limit,
                    })
                }
            },
            None => process.output().await,
        };
        let output = output.map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                ToolError::NotFound {
                    program: command.program.clone(),
                }
            } else {
                ToolError::Io {
                    program: command.program.clone(),
                    source,
                }
            }
        })?;
        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Runs `command` and turns a non-zero exit into [`ToolError::Failed`].
pub async fn run_checked(
    runner: &dyn CommandRunner,
    command: &ToolCommand,
) -> ToolResult<CommandOutput> {
    let output = runner.run(command).await?;
    if output.is_success() {
        Ok(output)
    } else {
        Err(ToolError::Failed {
            program: command.program.clone(),
            code: output.code,
            stderr: output.stderr_tail(),
        })
    }
}
