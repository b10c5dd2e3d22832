//! Launch an [`Invocation`], wait for it, and tear it down on timeout or
//! interruption.

use std::io::{self, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

use toolshed_config::TimeoutsConfig;

use crate::interrupt::InterruptSignal;
use crate::invocation::Invocation;
#[cfg(unix)]
use crate::process_group::{KillSignal, signal_process_group};
#[cfg(windows)]
use crate::process_group::taskkill_tree;
use crate::shell_mode::ShellMode;

/// Conventional status of a process killed by SIGINT.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;
/// Status reported by coreutils `timeout` on expiry.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

const EXITED_STREAM_POLL: Duration = Duration::from_millis(10);
const GRACE_POLL: Duration = Duration::from_millis(20);
const DRAIN_QUIET: Duration = Duration::from_millis(50);
const DRAIN_MAX: Duration = Duration::from_millis(500);
const READ_CHUNK: usize = 8 * 1024;

/// How an execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecOutcome {
    Completed,
    TimedOut,
    Interrupted,
    LaunchFailed,
}

/// Result of one command execution. Stdout and stderr are merged in arrival
/// order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub exit_code: i32,
    pub outcome: ExecOutcome,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.outcome == ExecOutcome::Completed && self.exit_code == 0
    }
}

/// Knobs for a single [`run`].
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub timeout: Option<Duration>,
    /// Written to the child's stdin, which is then closed.
    pub stdin: Option<String>,
    pub grace_period: Duration,
    pub poll_interval: Duration,
    pub taskkill_timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            stdin: None,
            grace_period: Duration::from_secs(1),
            poll_interval: Duration::from_millis(200),
            taskkill_timeout: Duration::from_secs(5),
        }
    }
}

impl RunOptions {
    pub fn from_config(timeouts: &TimeoutsConfig) -> Self {
        Self {
            timeout: Some(timeouts.command()),
            stdin: None,
            grace_period: timeouts.grace_period(),
            poll_interval: timeouts.poll_interval(),
            taskkill_timeout: timeouts.taskkill(),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_stdin(mut self, stdin: Option<String>) -> Self {
        self.stdin = stdin;
        self
    }
}

/// A running child plus what is needed to tear its tree down.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    mode: ShellMode,
    own_group: bool,
}

impl ProcessHandle {
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn mode(&self) -> ShellMode {
        self.mode
    }

    pub fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }
}

/// Launch `invocation` with piped stdout/stderr and, when `pipe_stdin` is
/// set, a piped stdin.
pub fn spawn(invocation: &Invocation, pipe_stdin: bool) -> io::Result<ProcessHandle> {
    let mut command = Command::new(invocation.program());
    apply_arguments(&mut command, invocation);

    if let Some(cwd) = &invocation.options.cwd {
        command.current_dir(cwd);
    }
    command
        .stdin(if pipe_stdin {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    if invocation.options.new_process_group {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        if invocation.options.creation_flags != 0 {
            command.creation_flags(invocation.options.creation_flags);
        }
    }

    let child = command.spawn()?;
    Ok(ProcessHandle {
        child,
        mode: invocation.mode,
        own_group: cfg!(unix) && invocation.options.new_process_group,
    })
}

#[cfg(windows)]
fn apply_arguments(command: &mut Command, invocation: &Invocation) {
    use std::os::windows::process::CommandExt;

    let arguments = invocation.arguments();
    match (invocation.mode, arguments.split_last()) {
        // `cmd /s /c` needs the payload verbatim; MSVC-style escaping would
        // corrupt embedded quotes.
        (ShellMode::WindowsCmd, Some((payload, flags))) => {
            command.args(flags);
            command.raw_arg(crate::quoting::cmd_payload(payload));
        }
        _ => {
            command.args(arguments);
        }
    }
}

#[cfg(not(windows))]
fn apply_arguments(command: &mut Command, invocation: &Invocation) {
    command.args(invocation.arguments());
}

/// Signal the whole tree behind `handle`. Errors are logged and fall back to
/// killing the primary process.
pub fn terminate(
    handle: &mut ProcessHandle,
    #[cfg_attr(not(any(unix, windows)), allow(unused_variables))] force: bool,
    #[cfg_attr(not(windows), allow(unused_variables))] taskkill_timeout: Duration,
) {
    let pid = handle.pid();

    #[cfg(unix)]
    {
        let signal = KillSignal::for_force(force);
        if handle.own_group {
            match signal_process_group(pid, signal) {
                Ok(()) => return,
                Err(error) => warn!(
                    target: "toolshed.runner.lifecycle",
                    pid,
                    ?signal,
                    %error,
                    "failed to signal process group"
                ),
            }
        }
    }

    #[cfg(windows)]
    {
        match taskkill_tree(pid, force, taskkill_timeout) {
            Ok(()) => return,
            Err(error) => debug!(
                target: "toolshed.runner.lifecycle",
                pid,
                force,
                %error,
                "taskkill did not terminate the tree"
            ),
        }
        if !force {
            // The forced pass follows after the grace period.
            return;
        }
    }

    if let Err(error) = handle.child.kill() {
        if error.kind() != io::ErrorKind::InvalidInput {
            warn!(
                target: "toolshed.runner.lifecycle",
                pid,
                %error,
                "failed to kill process"
            );
        }
    }
}

/// Graceful signal, bounded wait, then forced kill of whatever is left.
fn stop_tree(handle: &mut ProcessHandle, options: &RunOptions) -> Option<ExitStatus> {
    terminate(handle, false, options.taskkill_timeout);

    let deadline = Instant::now() + options.grace_period;
    let mut status = None;
    while Instant::now() < deadline {
        match handle.try_wait() {
            Ok(Some(exited)) => {
                status = Some(exited);
                break;
            }
            Ok(None) => thread::sleep(GRACE_POLL),
            Err(_) => break,
        }
    }

    // The leader may be gone while descendants that ignored the graceful
    // signal still hold the group open.
    if status.is_none() || handle.own_group {
        terminate(handle, true, options.taskkill_timeout);
    }
    match status {
        Some(status) => Some(status),
        None => handle.child.wait().ok(),
    }
}

fn spawn_reader<R>(mut source: R, sink: Sender<Vec<u8>>)
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buffer = [0u8; READ_CHUNK];
        loop {
            match source.read(&mut buffer) {
                Ok(0) => break,
                Ok(read) => {
                    let chunk = buffer.get(..read).map(<[u8]>::to_vec).unwrap_or_default();
                    if sink.send(chunk).is_err() {
                        break;
                    }
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    });
}

fn drain_after_exit(receiver: &Receiver<Vec<u8>>, output: &mut Vec<u8>) {
    let deadline = Instant::now() + DRAIN_MAX;
    while Instant::now() < deadline {
        match receiver.recv_timeout(DRAIN_QUIET) {
            Ok(chunk) => output.extend_from_slice(&chunk),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

fn launch_failure(invocation: &Invocation, error: &io::Error) -> ExecutionResult {
    let exit_code = match error.kind() {
        io::ErrorKind::NotFound => 127,
        io::ErrorKind::PermissionDenied => 126,
        _ => 1,
    };
    warn!(
        target: "toolshed.runner.lifecycle",
        program = invocation.program(),
        %error,
        "failed to launch command"
    );
    ExecutionResult {
        stdout: format!("Failed to launch {}: {error}", invocation.program()),
        exit_code,
        outcome: ExecOutcome::LaunchFailed,
    }
}

/// Run `invocation` to completion, timeout, or interruption.
///
/// Never fails: launch errors come back as a [`ExecOutcome::LaunchFailed`]
/// result with a synthetic exit status.
pub fn run(
    invocation: &Invocation,
    options: &RunOptions,
    interrupt: &InterruptSignal,
) -> ExecutionResult {
    let mut handle = match spawn(invocation, options.stdin.is_some()) {
        Ok(handle) => handle,
        Err(error) => return launch_failure(invocation, &error),
    };

    let (sender, receiver) = mpsc::channel();
    if let Some(stdout) = handle.child.stdout.take() {
        spawn_reader(stdout, sender.clone());
    }
    if let Some(stderr) = handle.child.stderr.take() {
        spawn_reader(stderr, sender.clone());
    }
    drop(sender);

    if let (Some(mut stdin), Some(data)) = (handle.child.stdin.take(), options.stdin.clone()) {
        thread::spawn(move || {
            stdin.write_all(data.as_bytes()).ok();
        });
    }

    let started = Instant::now();
    let deadline = options.timeout.map(|timeout| started + timeout);
    let mut output = Vec::new();
    let mut streams_open = true;

    let (status, outcome) = loop {
        match handle.try_wait() {
            Ok(Some(status)) => break (Some(status), ExecOutcome::Completed),
            Ok(None) => {}
            Err(error) => {
                warn!(target: "toolshed.runner.lifecycle", %error, "failed to poll child");
                break (stop_tree(&mut handle, options), ExecOutcome::Completed);
            }
        }

        if interrupt.is_set() {
            debug!(
                target: "toolshed.runner.lifecycle",
                pid = handle.pid(),
                "interrupt requested; stopping process tree"
            );
            let status = stop_tree(&mut handle, options);
            interrupt.acknowledge();
            break (status, ExecOutcome::Interrupted);
        }

        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            debug!(
                target: "toolshed.runner.lifecycle",
                pid = handle.pid(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "command timed out; stopping process tree"
            );
            break (stop_tree(&mut handle, options), ExecOutcome::TimedOut);
        }

        if streams_open {
            match receiver.recv_timeout(options.poll_interval) {
                Ok(chunk) => output.extend_from_slice(&chunk),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => streams_open = false,
            }
        } else {
            thread::sleep(EXITED_STREAM_POLL.min(options.poll_interval));
        }
    };

    drain_after_exit(&receiver, &mut output);
    let mut stdout = String::from_utf8_lossy(&output).into_owned();

    let exit_code = match outcome {
        ExecOutcome::Interrupted => {
            if !stdout.is_empty() && !stdout.ends_with('\n') {
                stdout.push('\n');
            }
            stdout.push_str("[Command interrupted]");
            INTERRUPTED_EXIT_CODE
        }
        ExecOutcome::TimedOut => {
            if !stdout.is_empty() && !stdout.ends_with('\n') {
                stdout.push('\n');
            }
            let seconds = options.timeout.map(|t| t.as_secs()).unwrap_or_default();
            stdout.push_str(&format!("[Command timed out after {seconds}s]"));
            TIMEOUT_EXIT_CODE
        }
        ExecOutcome::Completed | ExecOutcome::LaunchFailed => {
            status.map(exit_code_of).unwrap_or(-1)
        }
    };

    ExecutionResult {
        stdout,
        exit_code,
        outcome,
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::invocation::{InvocationArgs, LaunchOptions};
    use pretty_assertions::assert_eq;

    fn posix(command: &str) -> Invocation {
        Invocation {
            args: InvocationArgs::ShellCommand(command.to_string()),
            options: LaunchOptions {
                shell: true,
                cwd: None,
                new_process_group: true,
                creation_flags: 0,
            },
            mode: ShellMode::NativePosix,
        }
    }

    fn fast_options() -> RunOptions {
        RunOptions {
            timeout: Some(Duration::from_secs(10)),
            poll_interval: Duration::from_millis(50),
            ..RunOptions::default()
        }
    }

    #[test]
    fn captures_stdout_and_stderr() {
        let result = run(
            &posix("echo out; echo err 1>&2; exit 3"),
            &fast_options(),
            &InterruptSignal::new(),
        );
        assert_eq!(result.outcome, ExecOutcome::Completed);
        assert_eq!(result.exit_code, 3);
        assert!(result.stdout.contains("out"));
        assert!(result.stdout.contains("err"));
    }

    #[test]
    fn stdin_is_streamed_to_the_child() {
        let options = fast_options().with_stdin(Some("line one\nline two\n".to_string()));
        let result = run(&posix("cat"), &options, &InterruptSignal::new());
        assert_eq!(result.stdout, "line one\nline two\n");
        assert!(result.success());
    }

    #[test]
    fn honours_working_directory() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut invocation = posix("pwd");
        invocation.options.cwd = Some(temp.path().to_path_buf());
        let result = run(&invocation, &fast_options(), &InterruptSignal::new());
        let reported = std::fs::canonicalize(result.stdout.trim())?;
        assert_eq!(reported, std::fs::canonicalize(temp.path())?);
        Ok(())
    }

    #[test]
    fn missing_program_reports_launch_failure() {
        let invocation = Invocation {
            args: InvocationArgs::Argv(vec!["/no/such/program-xyz".to_string()]),
            options: LaunchOptions::default(),
            mode: ShellMode::NativePosix,
        };
        let result = run(&invocation, &fast_options(), &InterruptSignal::new());
        assert_eq!(result.outcome, ExecOutcome::LaunchFailed);
        assert_eq!(result.exit_code, 127);
        assert!(result.stdout.contains("program-xyz"));
    }

    #[test]
    fn timeout_kills_the_tree() {
        let options = RunOptions {
            timeout: Some(Duration::from_millis(300)),
            ..fast_options()
        };
        let started = Instant::now();
        let result = run(&posix("sleep 30"), &options, &InterruptSignal::new());
        assert_eq!(result.outcome, ExecOutcome::TimedOut);
        assert_eq!(result.exit_code, TIMEOUT_EXIT_CODE);
        assert!(result.stdout.contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn interrupt_escalates_past_ignored_term() {
        let interrupt = InterruptSignal::new();
        let trigger = interrupt.clone();
        let waker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            trigger.trigger();
        });

        let options = RunOptions {
            timeout: Some(Duration::from_secs(30)),
            ..fast_options()
        };
        let started = Instant::now();
        let result = run(
            &posix("trap '' TERM; echo started; sleep 60"),
            &options,
            &interrupt,
        );
        waker.join().unwrap();

        assert_eq!(result.outcome, ExecOutcome::Interrupted);
        assert_eq!(result.exit_code, INTERRUPTED_EXIT_CODE);
        assert!(result.stdout.contains("started"));
        assert!(result.stdout.contains("interrupted"));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!interrupt.is_set(), "the waiter acknowledges the request");
    }

    #[test]
    fn forced_terminate_kills_the_group() -> anyhow::Result<()> {
        let mut handle = spawn(&posix("sleep 30 & sleep 30"), false)?;
        terminate(&mut handle, true, Duration::from_secs(1));
        let status = handle.child.wait()?;
        assert!(!status.success());
        Ok(())
    }

    #[test]
    fn signal_exit_maps_to_128_plus_signal() {
        let result = run(&posix("kill -9 $$"), &fast_options(), &InterruptSignal::new());
        assert_eq!(result.exit_code, 137);
    }
}
