//! Cross-platform command execution for agent tooling.
//!
//! The pieces compose leaf-first: an [`InterruptSignal`] shared by every
//! waiter, a [`ShellModeSelector`] deciding how a command is launched on this
//! host, an [`InvocationBuilder`] producing the argument vector and launch
//! options, and [`run`] driving the child to completion, timeout, or
//! interruption. Backends expose all of this through [`CommandExecutor`].

pub mod executor;
pub mod interrupt;
pub mod invocation;
pub mod lifecycle;
pub mod process_group;
pub mod quoting;
pub mod shell_mode;

pub use executor::{
    BackendKind, CommandExecutor, ExecContext, ExecOutput, ExecRequest, LocalExecutor,
};
pub use interrupt::InterruptSignal;
pub use invocation::{
    CREATE_NEW_PROCESS_GROUP, Invocation, InvocationArgs, InvocationBuilder, LaunchOptions,
    build_for_mode,
};
pub use lifecycle::{
    ExecOutcome, ExecutionResult, INTERRUPTED_EXIT_CODE, ProcessHandle, RunOptions,
    TIMEOUT_EXIT_CODE, run, spawn, terminate,
};
pub use process_group::KillSignal;
pub use shell_mode::{
    HostPlatform, ShellMode, ShellModeSelector, ShellProbe, SystemProbe, resolve_mode,
};
