//! Command handlers. Each one returns the JSON record printed on stdout.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing::debug;

use toolshed_config::{ConfigManager, ToolshedConfig};
use toolshed_core::{FileOperations, SearchRequest, SearchTarget, Strategy, to_payload};
use toolshed_runner::{
    CommandExecutor, ExecContext, ExecOutcome, ExecOutput, ExecRequest, HostPlatform,
    InterruptSignal, LocalExecutor, ShellModeSelector,
};

pub mod args;

pub use args::{Cli, Commands};

/// Everything a command needs, resolved once from the global flags.
struct Session {
    invoked_from: PathBuf,
    config: ToolshedConfig,
    executor: Arc<LocalExecutor>,
    ops: FileOperations,
}

impl Session {
    fn open(cli: &Cli, interrupt: &InterruptSignal) -> Result<Self> {
        let invoked_from =
            std::env::current_dir().context("Failed to determine current directory")?;
        let workspace = match &cli.workspace {
            Some(path) => toolshed_commons::absolutize(path, &invoked_from),
            None => invoked_from.clone(),
        };
        let manager = match &cli.config {
            Some(path) => ConfigManager::load_from_file(path, &workspace),
            None => ConfigManager::load(&workspace),
        }
        .with_context(|| {
            format!(
                "Failed to load configuration for workspace {}",
                workspace.display()
            )
        })?;
        debug!(
            target: "toolshed.cli",
            workspace = %manager.workspace_root().display(),
            layers = manager.layers().len(),
            "configuration loaded"
        );

        let cwd = manager.default_cwd();
        let config = manager.into_config();
        let context = ExecContext::from_config(&config, interrupt.clone());
        let executor = Arc::new(LocalExecutor::new(context, cwd));

        let mut ops =
            FileOperations::new(executor.clone(), &config).with_interrupt(interrupt.clone());
        if let Some(strategy) = cli.strategy {
            ops = ops.with_strategy(strategy.into());
        }
        Ok(Self {
            invoked_from,
            config,
            executor,
            ops,
        })
    }

    /// Resolve a path given on the command line against the invoking directory.
    fn resolve(&self, path: &Path) -> PathBuf {
        toolshed_commons::absolutize(path, &self.invoked_from)
    }
}

/// Run the selected command to completion.
pub fn dispatch(cli: Cli, interrupt: InterruptSignal) -> Result<Value> {
    let session = Session::open(&cli, &interrupt)?;
    let ops = &session.ops;

    let record = match cli.command {
        Commands::Exec {
            command,
            cwd,
            timeout,
            stdin,
        } => {
            let mut request = ExecRequest::new();
            if let Some(cwd) = cwd {
                request = request.cwd(session.resolve(&cwd));
            }
            if let Some(seconds) = timeout {
                request = request.timeout(Duration::from_secs(seconds));
            }
            if stdin {
                request = request.stdin(read_stdin()?);
            }
            exec_record(&session.executor.execute(&command, &request))?
        }
        Commands::Read {
            path,
            offset,
            limit,
        } => to_payload(&ops.read_file(&path, offset, limit)),
        Commands::Write { path, content } => {
            let content = match content {
                Some(content) => content,
                None => read_stdin()?,
            };
            to_payload(&ops.write_file(&path, &content))
        }
        Commands::Search {
            pattern,
            path,
            files,
            glob,
            mode,
            limit,
            offset,
            context,
        } => {
            let mut request = SearchRequest::new(pattern)
                .path(path)
                .output_mode(mode.into())
                .offset(offset)
                .context(context);
            if files {
                request = request.target(SearchTarget::Files);
            }
            if let Some(glob) = glob {
                request = request.file_glob(glob);
            }
            if let Some(limit) = limit {
                request = request.limit(limit);
            }
            to_payload(&ops.search(&request))
        }
        Commands::Replace {
            path,
            old,
            new,
            all,
        } => to_payload(&ops.patch_replace(&path, &old, &new, all)),
        Commands::Patch { file } => {
            let document = match file {
                Some(file) => read_document(&session.resolve(&file))?,
                None => read_stdin()?,
            };
            to_payload(&ops.patch_structured(&document))
        }
        Commands::ShellMode => shell_mode_record(&session.config, ops.strategy()),
    };
    Ok(record)
}

fn exec_record(output: &ExecOutput) -> Result<Value> {
    let mut record = serde_json::to_value(output).context("Failed to serialize command output")?;
    let error = match output.status {
        ExecOutcome::Completed => None,
        ExecOutcome::TimedOut => Some("Command timed out"),
        ExecOutcome::Interrupted => Some("Command interrupted"),
        ExecOutcome::LaunchFailed => Some("Command could not be launched"),
    };
    if let (Some(error), Value::Object(map)) = (error, &mut record) {
        map.insert("error".to_string(), Value::String(error.to_string()));
    }
    Ok(record)
}

fn shell_mode_record(config: &ToolshedConfig, strategy: Strategy) -> Value {
    let selector = ShellModeSelector::system(&config.shell, config.timeouts.wsl_probe());
    let platform = match selector.platform() {
        HostPlatform::Posix => "posix",
        HostPlatform::Windows => "windows",
    };
    let strategy = match strategy {
        Strategy::Shell => "shell",
        Strategy::Native => "native",
    };
    json!({
        "platform": platform,
        "requested": selector.requested_override().as_str(),
        "mode": selector.select_mode().as_str(),
        "strategy": strategy,
    })
}

fn read_stdin() -> Result<String> {
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read from stdin")?;
    Ok(buffer)
}

fn read_document(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read patch document {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_record_flags_abnormal_endings() {
        let timed_out = ExecOutput::new("partial", 124).with_status(ExecOutcome::TimedOut);
        let record = exec_record(&timed_out).unwrap();
        assert_eq!(record["error"], "Command timed out");
        assert_eq!(record["returncode"], 124);

        let failed = exec_record(&ExecOutput::new("boom", 2)).unwrap();
        assert!(failed.get("error").is_none());
        assert_eq!(failed["output"], "boom");
    }
}
