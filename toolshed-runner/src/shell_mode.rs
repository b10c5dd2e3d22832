use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use toolshed_config::{ShellConfig, ShellOverride};

use crate::interrupt::InterruptSignal;
use crate::invocation::{Invocation, InvocationArgs, LaunchOptions};
use crate::lifecycle::{ExecOutcome, RunOptions, run};

const WSL_CANDIDATES: [&str; 2] = ["wsl.exe", "wsl"];
const POWERSHELL_CANDIDATES: [&str; 4] = ["pwsh.exe", "pwsh", "powershell.exe", "powershell"];

/// Style of command-line invocation used for one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShellMode {
    NativePosix,
    LinuxSubsystem,
    PowerShell,
    WindowsCmd,
}

impl ShellMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NativePosix => "native-posix",
            Self::LinuxSubsystem => "linux-subsystem",
            Self::PowerShell => "powershell",
            Self::WindowsCmd => "windows-cmd",
        }
    }

    pub const fn is_windows(self) -> bool {
        !matches!(self, Self::NativePosix)
    }
}

impl fmt::Display for ShellMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host family the selector decides for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPlatform {
    Posix,
    Windows,
}

impl HostPlatform {
    pub const fn current() -> Self {
        if cfg!(windows) { Self::Windows } else { Self::Posix }
    }
}

/// Discovers the shells available on a Windows host.
pub trait ShellProbe: Send + Sync {
    /// Subsystem entry point, only if it exists and runs a no-op successfully.
    fn linux_subsystem(&self) -> Option<PathBuf>;

    fn powershell(&self) -> Option<PathBuf>;

    /// The command interpreter; always resolvable.
    fn command_interpreter(&self) -> PathBuf;
}

static WSL_EXECUTABLE: OnceCell<Option<PathBuf>> = OnceCell::new();
static WSL_USABLE: OnceCell<Option<PathBuf>> = OnceCell::new();
static POWERSHELL_EXECUTABLE: OnceCell<Option<PathBuf>> = OnceCell::new();
static COMMAND_INTERPRETER: OnceCell<PathBuf> = OnceCell::new();

/// Probe backed by `PATH` lookups. Results are cached for the lifetime of
/// the process.
#[derive(Debug, Clone)]
pub struct SystemProbe {
    probe_timeout: Duration,
}

impl SystemProbe {
    pub fn new(probe_timeout: Duration) -> Self {
        Self { probe_timeout }
    }

    fn first_on_path(candidates: &[&str]) -> Option<PathBuf> {
        candidates
            .iter()
            .find_map(|candidate| which::which(candidate).ok())
    }

    fn wsl_executable() -> Option<PathBuf> {
        WSL_EXECUTABLE
            .get_or_init(|| Self::first_on_path(&WSL_CANDIDATES))
            .clone()
    }

    fn wsl_responds(&self, executable: &Path) -> bool {
        let invocation = Invocation {
            args: InvocationArgs::Argv(vec![
                executable.to_string_lossy().into_owned(),
                "-e".to_string(),
                "sh".to_string(),
                "-lc".to_string(),
                "exit 0".to_string(),
            ]),
            options: LaunchOptions::default(),
            mode: ShellMode::LinuxSubsystem,
        };
        let options = RunOptions {
            timeout: Some(self.probe_timeout),
            ..RunOptions::default()
        };
        let result = run(&invocation, &options, &InterruptSignal::new());
        let alive = result.outcome == ExecOutcome::Completed && result.exit_code == 0;
        debug!(
            target: "toolshed.runner.shell_mode",
            executable = %executable.display(),
            alive,
            "probed linux subsystem"
        );
        alive
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(4))
    }
}

impl ShellProbe for SystemProbe {
    fn linux_subsystem(&self) -> Option<PathBuf> {
        WSL_USABLE
            .get_or_init(|| {
                Self::wsl_executable().filter(|executable| self.wsl_responds(executable))
            })
            .clone()
    }

    fn powershell(&self) -> Option<PathBuf> {
        POWERSHELL_EXECUTABLE
            .get_or_init(|| Self::first_on_path(&POWERSHELL_CANDIDATES))
            .clone()
    }

    fn command_interpreter(&self) -> PathBuf {
        COMMAND_INTERPRETER
            .get_or_init(|| {
                std::env::var_os("COMSPEC")
                    .filter(|value| !value.is_empty())
                    .map(PathBuf::from)
                    .or_else(|| which::which("cmd.exe").ok())
                    .unwrap_or_else(|| PathBuf::from("cmd.exe"))
            })
            .clone()
    }
}

/// Apply the override fallback chain for one decision.
pub fn resolve_mode(
    platform: HostPlatform,
    requested: ShellOverride,
    probe: &dyn ShellProbe,
) -> ShellMode {
    if platform == HostPlatform::Posix {
        return ShellMode::NativePosix;
    }

    let powershell_or_cmd = || {
        if probe.powershell().is_some() {
            ShellMode::PowerShell
        } else {
            ShellMode::WindowsCmd
        }
    };

    match requested {
        ShellOverride::Cmd => ShellMode::WindowsCmd,
        ShellOverride::PowerShell => powershell_or_cmd(),
        ShellOverride::Wsl | ShellOverride::Auto => {
            if probe.linux_subsystem().is_some() {
                ShellMode::LinuxSubsystem
            } else {
                powershell_or_cmd()
            }
        }
    }
}

/// Decides which [`ShellMode`] applies to the next command.
///
/// The override variable is read on every call; only executable discovery
/// is cached (inside the probe).
pub struct ShellModeSelector {
    platform: HostPlatform,
    probe: Arc<dyn ShellProbe>,
    override_env: String,
    configured: ShellOverride,
    last_logged: Mutex<Option<ShellMode>>,
}

impl ShellModeSelector {
    pub fn new(config: &ShellConfig, probe: Arc<dyn ShellProbe>) -> Self {
        Self {
            platform: HostPlatform::current(),
            probe,
            override_env: config.override_env.clone(),
            configured: config.windows_shell,
            last_logged: Mutex::new(None),
        }
    }

    /// Selector for the current host backed by [`SystemProbe`].
    pub fn system(config: &ShellConfig, probe_timeout: Duration) -> Self {
        Self::new(config, Arc::new(SystemProbe::new(probe_timeout)))
    }

    pub fn with_platform(mut self, platform: HostPlatform) -> Self {
        self.platform = platform;
        self
    }

    pub fn platform(&self) -> HostPlatform {
        self.platform
    }

    pub fn probe(&self) -> &dyn ShellProbe {
        self.probe.as_ref()
    }

    /// Override currently in effect: the environment variable when set,
    /// otherwise the configured value.
    pub fn requested_override(&self) -> ShellOverride {
        match std::env::var(&self.override_env) {
            Ok(raw) if !raw.trim().is_empty() => ShellOverride::parse_lenient(&raw),
            _ => self.configured,
        }
    }

    pub fn select_mode(&self) -> ShellMode {
        let requested = self.requested_override();
        let mode = resolve_mode(self.platform, requested, self.probe.as_ref());
        self.note_mode(mode, requested);
        mode
    }

    /// Log `mode` if it differs from the last logged decision. Returns
    /// whether a line was emitted.
    fn note_mode(&self, mode: ShellMode, requested: ShellOverride) -> bool {
        let mut last = self.last_logged.lock();
        if *last == Some(mode) {
            return false;
        }
        *last = Some(mode);
        match self.platform {
            HostPlatform::Windows => info!(
                target: "toolshed.runner.shell_mode",
                mode = %mode,
                requested = %requested,
                "local shell mode selected"
            ),
            HostPlatform::Posix => info!(
                target: "toolshed.runner.shell_mode",
                mode = %mode,
                "local shell mode selected"
            ),
        }
        true
    }
}

impl fmt::Debug for ShellModeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShellModeSelector")
            .field("platform", &self.platform)
            .field("override_env", &self.override_env)
            .field("configured", &self.configured)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serial_test::serial;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) struct FakeProbe {
        pub wsl: bool,
        pub powershell: bool,
        pub wsl_calls: AtomicUsize,
    }

    impl FakeProbe {
        pub(crate) fn new(wsl: bool, powershell: bool) -> Self {
            Self {
                wsl,
                powershell,
                wsl_calls: AtomicUsize::new(0),
            }
        }
    }

    impl ShellProbe for FakeProbe {
        fn linux_subsystem(&self) -> Option<PathBuf> {
            self.wsl_calls.fetch_add(1, Ordering::SeqCst);
            self.wsl.then(|| PathBuf::from("wsl.exe"))
        }

        fn powershell(&self) -> Option<PathBuf> {
            self.powershell.then(|| PathBuf::from("pwsh.exe"))
        }

        fn command_interpreter(&self) -> PathBuf {
            PathBuf::from(r"C:\Windows\System32\cmd.exe")
        }
    }

    const TEST_ENV: &str = "TOOLSHED_TEST_WINDOWS_SHELL";

    fn windows_selector(wsl: bool, powershell: bool) -> ShellModeSelector {
        let config = ShellConfig {
            override_env: TEST_ENV.to_string(),
            ..ShellConfig::default()
        };
        ShellModeSelector::new(&config, Arc::new(FakeProbe::new(wsl, powershell)))
            .with_platform(HostPlatform::Windows)
    }

    fn set_override(value: Option<&str>) {
        // SAFETY: callers are #[serial].
        unsafe {
            match value {
                Some(value) => std::env::set_var(TEST_ENV, value),
                None => std::env::remove_var(TEST_ENV),
            }
        }
    }

    #[test]
    fn posix_hosts_ignore_overrides() {
        for requested in [
            ShellOverride::Auto,
            ShellOverride::Wsl,
            ShellOverride::PowerShell,
            ShellOverride::Cmd,
        ] {
            let probe = FakeProbe::new(true, true);
            assert_eq!(
                resolve_mode(HostPlatform::Posix, requested, &probe),
                ShellMode::NativePosix
            );
        }
    }

    #[test]
    fn fallback_chains_follow_availability() {
        let cases = [
            (ShellOverride::Auto, true, true, ShellMode::LinuxSubsystem),
            (ShellOverride::Auto, false, true, ShellMode::PowerShell),
            (ShellOverride::Auto, false, false, ShellMode::WindowsCmd),
            (ShellOverride::Wsl, true, false, ShellMode::LinuxSubsystem),
            (ShellOverride::Wsl, false, true, ShellMode::PowerShell),
            (ShellOverride::Wsl, false, false, ShellMode::WindowsCmd),
            (ShellOverride::PowerShell, true, true, ShellMode::PowerShell),
            (ShellOverride::PowerShell, true, false, ShellMode::WindowsCmd),
            (ShellOverride::Cmd, true, true, ShellMode::WindowsCmd),
        ];
        for (requested, wsl, powershell, expected) in cases {
            let probe = FakeProbe::new(wsl, powershell);
            assert_eq!(
                resolve_mode(HostPlatform::Windows, requested, &probe),
                expected,
                "{requested} with wsl={wsl} powershell={powershell}"
            );
        }
    }

    #[test]
    fn explicit_cmd_never_probes_subsystem() {
        let probe = FakeProbe::new(true, true);
        resolve_mode(HostPlatform::Windows, ShellOverride::Cmd, &probe);
        assert_eq!(probe.wsl_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    #[serial]
    fn override_changes_apply_on_next_call() {
        let selector = windows_selector(true, true);

        set_override(Some("cmd"));
        assert_eq!(selector.select_mode(), ShellMode::WindowsCmd);

        set_override(Some("pwsh"));
        assert_eq!(selector.select_mode(), ShellMode::PowerShell);

        set_override(Some("wsl"));
        assert_eq!(selector.select_mode(), ShellMode::LinuxSubsystem);

        set_override(None);
        assert_eq!(selector.select_mode(), ShellMode::LinuxSubsystem);
    }

    #[test]
    #[serial]
    fn configured_value_applies_when_env_is_unset() {
        set_override(None);
        let config = ShellConfig {
            windows_shell: ShellOverride::Cmd,
            override_env: TEST_ENV.to_string(),
        };
        let selector = ShellModeSelector::new(&config, Arc::new(FakeProbe::new(true, true)))
            .with_platform(HostPlatform::Windows);
        assert_eq!(selector.select_mode(), ShellMode::WindowsCmd);
    }

    #[test]
    fn mode_is_logged_once_per_change() {
        let selector = windows_selector(false, false);
        assert!(selector.note_mode(ShellMode::WindowsCmd, ShellOverride::Auto));
        assert!(!selector.note_mode(ShellMode::WindowsCmd, ShellOverride::Auto));
        assert!(selector.note_mode(ShellMode::PowerShell, ShellOverride::PowerShell));
        assert!(selector.note_mode(ShellMode::WindowsCmd, ShellOverride::Cmd));
    }

    #[test]
    fn modes_render_with_documented_names() {
        assert_eq!(ShellMode::NativePosix.to_string(), "native-posix");
        assert_eq!(ShellMode::LinuxSubsystem.as_str(), "linux-subsystem");
        assert_eq!(
            serde_json::to_string(&ShellMode::WindowsCmd).unwrap(),
            "\"windows-cmd\""
        );
    }
}
