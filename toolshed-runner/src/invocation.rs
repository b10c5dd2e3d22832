use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use toolshed_commons::{
    expand_home, safe_working_dir, to_windows_path, to_wsl_path, windows_path_safe_for_quotes,
};

use crate::quoting::{posix_quote, powershell_literal};
use crate::shell_mode::{ShellMode, ShellModeSelector, ShellProbe};

/// `CREATE_NEW_PROCESS_GROUP` from the Win32 process creation flags.
pub const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

const POSIX_SHELL: &str = "/bin/sh";
const LOG_PREVIEW_CHARS: usize = 300;

/// What gets handed to the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationArgs {
    /// A command string interpreted by the native POSIX shell.
    ShellCommand(String),
    /// A discrete argument vector; `argv[0]` is the program.
    Argv(Vec<String>),
}

/// Launch-time options that accompany [`InvocationArgs`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchOptions {
    /// The arguments are a shell command string. Never true for an argv.
    pub shell: bool,
    pub cwd: Option<PathBuf>,
    /// Place the child in its own process group (POSIX) so the whole tree can
    /// be signalled together.
    pub new_process_group: bool,
    /// Win32 creation flags; zero elsewhere.
    pub creation_flags: u32,
}

/// A ready-to-launch command for one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub args: InvocationArgs,
    pub options: LaunchOptions,
    pub mode: ShellMode,
}

impl Invocation {
    /// Program that will be executed.
    pub fn program(&self) -> &str {
        match &self.args {
            InvocationArgs::ShellCommand(_) => POSIX_SHELL,
            InvocationArgs::Argv(argv) => argv.first().map(String::as_str).unwrap_or_default(),
        }
    }

    /// Arguments after the program, as passed to the OS.
    pub fn arguments(&self) -> Vec<&str> {
        match &self.args {
            InvocationArgs::ShellCommand(command) => vec!["-c", command.as_str()],
            InvocationArgs::Argv(argv) => argv.iter().skip(1).map(String::as_str).collect(),
        }
    }
}

/// Builds invocations for the mode chosen by a [`ShellModeSelector`].
#[derive(Debug, Clone)]
pub struct InvocationBuilder {
    selector: Arc<ShellModeSelector>,
}

impl InvocationBuilder {
    pub fn new(selector: Arc<ShellModeSelector>) -> Self {
        Self { selector }
    }

    pub fn selector(&self) -> &ShellModeSelector {
        &self.selector
    }

    pub fn build(&self, command: &str, work_dir: Option<&str>) -> Invocation {
        let mode = self.selector.select_mode();
        build_for_mode(mode, command, work_dir, self.selector.probe())
    }
}

/// Build the invocation for an already-selected mode.
pub fn build_for_mode(
    mode: ShellMode,
    command: &str,
    work_dir: Option<&str>,
    probe: &dyn ShellProbe,
) -> Invocation {
    let work_dir = work_dir.map(str::trim).filter(|dir| !dir.is_empty());
    let invocation = match mode {
        ShellMode::NativePosix => Invocation {
            args: InvocationArgs::ShellCommand(command.to_string()),
            options: LaunchOptions {
                shell: true,
                cwd: work_dir.map(expand_home),
                new_process_group: true,
                creation_flags: 0,
            },
            mode,
        },
        ShellMode::LinuxSubsystem => {
            let program = probe
                .linux_subsystem()
                .unwrap_or_else(|| PathBuf::from("wsl.exe"));
            let script = match work_dir {
                Some(dir) => format!("cd {} && {command}", posix_quote(&to_wsl_path(dir))),
                None => command.to_string(),
            };
            Invocation {
                args: InvocationArgs::Argv(vec![
                    program.to_string_lossy().into_owned(),
                    "-e".to_string(),
                    "bash".to_string(),
                    "-lc".to_string(),
                    script,
                ]),
                options: windows_options(work_dir),
                mode,
            }
        }
        ShellMode::PowerShell => {
            let program = probe
                .powershell()
                .unwrap_or_else(|| PathBuf::from("powershell.exe"));
            let script = match work_dir.and_then(powershell_location) {
                Some(location) => format!(
                    "Set-Location -LiteralPath {}; {command}",
                    powershell_literal(&location)
                ),
                None => command.to_string(),
            };
            let mut argv = vec![program.to_string_lossy().into_owned()];
            argv.extend(
                [
                    "-NoLogo",
                    "-NoProfile",
                    "-NonInteractive",
                    "-ExecutionPolicy",
                    "Bypass",
                    "-Command",
                ]
                .map(String::from),
            );
            argv.push(script);
            Invocation {
                args: InvocationArgs::Argv(argv),
                options: windows_options(work_dir),
                mode,
            }
        }
        ShellMode::WindowsCmd => {
            let program = probe.command_interpreter();
            Invocation {
                args: InvocationArgs::Argv(vec![
                    program.to_string_lossy().into_owned(),
                    "/d".to_string(),
                    "/s".to_string(),
                    "/c".to_string(),
                    command.to_string(),
                ]),
                options: windows_options(work_dir),
                mode,
            }
        }
    };

    debug!(
        target: "toolshed.runner.invocation",
        mode = %invocation.mode,
        cwd = ?invocation.options.cwd,
        command = %preview(command),
        "built invocation"
    );
    invocation
}

/// Host-native directory for `Set-Location`, only if it exists.
fn powershell_location(work_dir: &str) -> Option<String> {
    let native = to_windows_path(&expand_home(work_dir).to_string_lossy());
    let safe = windows_path_safe_for_quotes(&native);
    Path::new(&safe).is_dir().then_some(safe)
}

fn windows_options(work_dir: Option<&str>) -> LaunchOptions {
    let requested = work_dir.map(to_windows_path);
    let cwd = safe_working_dir(requested.as_deref());
    let cwd = PathBuf::from(windows_path_safe_for_quotes(&cwd.to_string_lossy()));
    LaunchOptions {
        shell: false,
        cwd: Some(cwd),
        new_process_group: true,
        creation_flags: CREATE_NEW_PROCESS_GROUP,
    }
}

fn preview(command: &str) -> String {
    let mut chars = command.char_indices();
    match chars.nth(LOG_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", command.get(..cut).unwrap_or(command)),
        None => command.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell_mode::tests::FakeProbe;
    use pretty_assertions::assert_eq;

    fn argv(invocation: &Invocation) -> &[String] {
        match &invocation.args {
            InvocationArgs::Argv(argv) => argv,
            InvocationArgs::ShellCommand(_) => panic!("expected an argument vector"),
        }
    }

    #[test]
    fn posix_keeps_cwd_out_of_the_command() {
        let probe = FakeProbe::new(false, false);
        let invocation = build_for_mode(ShellMode::NativePosix, "ls -la", Some("/srv/repo"), &probe);

        assert_eq!(
            invocation.args,
            InvocationArgs::ShellCommand("ls -la".to_string())
        );
        assert!(invocation.options.shell);
        assert!(invocation.options.new_process_group);
        assert_eq!(invocation.options.cwd, Some(PathBuf::from("/srv/repo")));
        assert_eq!(invocation.program(), "/bin/sh");
        assert_eq!(invocation.arguments(), vec!["-c", "ls -la"]);
    }

    #[test]
    fn linux_subsystem_embeds_translated_cd() {
        let probe = FakeProbe::new(true, false);
        let invocation = build_for_mode(
            ShellMode::LinuxSubsystem,
            "echo hello",
            Some(r"C:\tmp"),
            &probe,
        );

        let argv = argv(&invocation);
        assert_eq!(argv.get(..4).unwrap(), ["wsl.exe", "-e", "bash", "-lc"]);
        assert_eq!(argv.get(4).unwrap(), "cd /mnt/c/tmp && echo hello");
        assert!(!invocation.options.shell);
        assert_eq!(invocation.options.creation_flags, CREATE_NEW_PROCESS_GROUP);
        assert!(invocation.options.cwd.is_some());
    }

    #[test]
    fn linux_subsystem_quotes_paths_with_spaces() {
        let probe = FakeProbe::new(true, false);
        let invocation = build_for_mode(
            ShellMode::LinuxSubsystem,
            "pwd",
            Some(r"C:\My Projects\app"),
            &probe,
        );
        assert_eq!(
            argv(&invocation).last().unwrap(),
            "cd '/mnt/c/My Projects/app' && pwd"
        );
    }

    #[test]
    fn powershell_sets_location_for_existing_dir() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().to_string_lossy().to_string();
        let probe = FakeProbe::new(false, true);
        let invocation = build_for_mode(ShellMode::PowerShell, "Get-ChildItem", Some(&dir), &probe);

        let argv = argv(&invocation);
        assert_eq!(
            argv.get(..7).unwrap(),
            [
                "pwsh.exe",
                "-NoLogo",
                "-NoProfile",
                "-NonInteractive",
                "-ExecutionPolicy",
                "Bypass",
                "-Command"
            ]
        );
        assert_eq!(
            argv.last().unwrap(),
            &format!("Set-Location -LiteralPath '{dir}'; Get-ChildItem")
        );
        assert!(!invocation.options.shell);
    }

    #[test]
    fn powershell_skips_location_for_missing_dir() {
        let probe = FakeProbe::new(false, true);
        let invocation = build_for_mode(
            ShellMode::PowerShell,
            "Get-Date",
            Some("/definitely/not/here"),
            &probe,
        );
        assert_eq!(argv(&invocation).last().unwrap(), "Get-Date");
    }

    #[test]
    fn cmd_passes_cwd_as_launch_option() {
        let temp = tempfile::tempdir().unwrap();
        let dir = format!("{}/", temp.path().display());
        let probe = FakeProbe::new(false, false);
        let invocation = build_for_mode(ShellMode::WindowsCmd, "echo hello", Some(&dir), &probe);

        assert_eq!(
            argv(&invocation),
            [
                r"C:\Windows\System32\cmd.exe",
                "/d",
                "/s",
                "/c",
                "echo hello"
            ]
        );
        assert!(!invocation.options.shell);
        assert_eq!(invocation.options.cwd.as_deref(), Some(temp.path()));
        assert!(argv(&invocation).iter().all(|arg| !arg.contains("cd /d")));
    }

    #[test]
    fn shell_flag_never_pairs_with_argv() {
        let probe = FakeProbe::new(true, true);
        for mode in [
            ShellMode::NativePosix,
            ShellMode::LinuxSubsystem,
            ShellMode::PowerShell,
            ShellMode::WindowsCmd,
        ] {
            let invocation = build_for_mode(mode, "echo hi", None, &probe);
            let is_argv = matches!(invocation.args, InvocationArgs::Argv(_));
            assert!(!(invocation.options.shell && is_argv), "{mode}");
        }
    }

    #[test]
    fn preview_truncates_long_commands() {
        let long = "x".repeat(400);
        let shown = preview(&long);
        assert_eq!(shown.len(), 303);
        assert!(shown.ends_with("..."));
        assert_eq!(preview("short"), "short");
    }
}
