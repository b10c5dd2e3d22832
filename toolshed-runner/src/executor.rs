use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use toolshed_config::{TimeoutsConfig, ToolshedConfig};

use crate::interrupt::InterruptSignal;
use crate::invocation::InvocationBuilder;
use crate::lifecycle::{ExecOutcome, ExecutionResult, RunOptions, run};
use crate::shell_mode::ShellModeSelector;

/// Where a backend runs its commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Local,
    Container,
    RemoteShell,
    CloudSandbox,
}

/// Per-call parameters for [`CommandExecutor::execute`].
#[derive(Debug, Clone, Default)]
pub struct ExecRequest {
    pub cwd: Option<PathBuf>,
    pub timeout: Option<Duration>,
    pub stdin: Option<String>,
}

impl ExecRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn stdin(mut self, data: impl Into<String>) -> Self {
        self.stdin = Some(data.into());
        self
    }
}

fn is_completed(status: &ExecOutcome) -> bool {
    *status == ExecOutcome::Completed
}

/// What a backend returns for one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecOutput {
    pub output: String,
    pub returncode: i32,
    /// Backends that cannot tell leave this as `Completed`.
    #[serde(skip_serializing_if = "is_completed")]
    pub status: ExecOutcome,
}

impl ExecOutput {
    pub fn new(output: impl Into<String>, returncode: i32) -> Self {
        Self {
            output: output.into(),
            returncode,
            status: ExecOutcome::Completed,
        }
    }

    pub fn with_status(mut self, status: ExecOutcome) -> Self {
        self.status = status;
        self
    }

    pub fn success(&self) -> bool {
        self.status == ExecOutcome::Completed && self.returncode == 0
    }
}

impl From<ExecutionResult> for ExecOutput {
    fn from(result: ExecutionResult) -> Self {
        Self {
            output: result.stdout,
            returncode: result.exit_code,
            status: result.outcome,
        }
    }
}

/// Capability every execution backend provides.
///
/// `execute` never fails: backend problems surface as a non-zero
/// `returncode` with diagnostic text in `output`.
pub trait CommandExecutor: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn execute(&self, command: &str, request: &ExecRequest) -> ExecOutput;

    /// Working directory used when a request carries none.
    fn default_cwd(&self) -> Option<&Path> {
        None
    }
}

/// Shared state threaded through everything that launches processes.
#[derive(Debug, Clone)]
pub struct ExecContext {
    pub interrupt: InterruptSignal,
    pub selector: Arc<ShellModeSelector>,
    pub timeouts: TimeoutsConfig,
}

impl ExecContext {
    pub fn new(
        interrupt: InterruptSignal,
        selector: Arc<ShellModeSelector>,
        timeouts: TimeoutsConfig,
    ) -> Self {
        Self {
            interrupt,
            selector,
            timeouts,
        }
    }

    /// Context for the current host with a [`crate::SystemProbe`].
    pub fn from_config(config: &ToolshedConfig, interrupt: InterruptSignal) -> Self {
        let selector = ShellModeSelector::system(&config.shell, config.timeouts.wsl_probe());
        Self::new(interrupt, Arc::new(selector), config.timeouts.clone())
    }
}

/// Runs commands on this machine through the shell mode selected per call.
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    context: ExecContext,
    builder: InvocationBuilder,
    cwd: PathBuf,
}

impl LocalExecutor {
    pub fn new(context: ExecContext, cwd: impl Into<PathBuf>) -> Self {
        let builder = InvocationBuilder::new(Arc::clone(&context.selector));
        Self {
            context,
            builder,
            cwd: cwd.into(),
        }
    }

    pub fn context(&self) -> &ExecContext {
        &self.context
    }

    /// Run `command` and return the full [`ExecutionResult`].
    pub fn run(&self, command: &str, request: &ExecRequest) -> ExecutionResult {
        let cwd = request.cwd.as_deref().unwrap_or(&self.cwd);
        let cwd = cwd.to_string_lossy();
        let invocation = self.builder.build(command, Some(&cwd));
        let options = RunOptions::from_config(&self.context.timeouts)
            .with_timeout(Some(
                request
                    .timeout
                    .unwrap_or_else(|| self.context.timeouts.command()),
            ))
            .with_stdin(request.stdin.clone());
        run(&invocation, &options, &self.context.interrupt)
    }
}

impl CommandExecutor for LocalExecutor {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn execute(&self, command: &str, request: &ExecRequest) -> ExecOutput {
        self.run(command, request).into()
    }

    fn default_cwd(&self) -> Option<&Path> {
        Some(&self.cwd)
    }
}
