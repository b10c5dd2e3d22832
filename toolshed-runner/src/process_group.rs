//! OS-specific pieces for tearing down a whole process tree.
//!
//! On Unix every child is launched as the leader of its own process group, so
//! signalling the group reaches grandchildren too. Windows has no process
//! groups in that sense; `taskkill /T` walks the descendant tree by PID
//! instead.

use std::io;
#[cfg(windows)]
use std::time::Duration;

/// Signal to deliver to a process group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KillSignal {
    /// SIGTERM - lets the tree shut down on its own terms
    #[default]
    Term,
    /// SIGKILL - immediate termination
    Kill,
}

impl KillSignal {
    pub const fn for_force(force: bool) -> Self {
        if force { Self::Kill } else { Self::Term }
    }
}

#[cfg(unix)]
impl KillSignal {
    fn as_nix_signal(self) -> nix::sys::signal::Signal {
        match self {
            KillSignal::Term => nix::sys::signal::Signal::SIGTERM,
            KillSignal::Kill => nix::sys::signal::Signal::SIGKILL,
        }
    }
}

/// Send `signal` to the process group led by `process_group_id`.
///
/// A group that no longer exists is not an error.
#[cfg(unix)]
pub fn signal_process_group(process_group_id: u32, signal: KillSignal) -> io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    let pgid = i32::try_from(process_group_id)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "process group id overflow"))?;
    match killpg(Pid::from_raw(pgid), signal.as_nix_signal()) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(io::Error::from(errno)),
    }
}

/// No process groups here; callers fall back to killing the primary process.
#[cfg(not(unix))]
pub fn signal_process_group(_process_group_id: u32, _signal: KillSignal) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "process groups are not available on this platform",
    ))
}

/// Terminate `pid` and all of its descendants with `taskkill /T`, adding
/// `/F` when `force` is set.
#[cfg(windows)]
pub fn taskkill_tree(pid: u32, force: bool, timeout: Duration) -> io::Result<()> {
    use std::process::{Command, Stdio};
    use std::time::Instant;

    let mut command = Command::new("taskkill");
    command.args(["/PID", &pid.to_string(), "/T"]);
    if force {
        command.arg("/F");
    }
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return if status.success() {
                Ok(())
            } else {
                Err(io::Error::other(format!("taskkill exited with {status}")))
            };
        }
        if Instant::now() >= deadline {
            child.kill().ok();
            child.wait().ok();
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "taskkill did not finish in time",
            ));
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn force_maps_to_kill() {
        assert_eq!(KillSignal::for_force(true), KillSignal::Kill);
        assert_eq!(KillSignal::for_force(false), KillSignal::Term);
        assert_eq!(KillSignal::default(), KillSignal::Term);
    }

    #[cfg(unix)]
    #[test]
    fn signalling_a_missing_group_is_ok() {
        // PIDs near the top of the range are not handed out in practice.
        let result = signal_process_group(4_000_000, KillSignal::Term);
        assert!(result.is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn kill_reaches_a_real_group() -> anyhow::Result<()> {
        use std::os::unix::process::CommandExt;
        use std::process::Command;

        let mut child = Command::new("sleep").arg("30").process_group(0).spawn()?;
        signal_process_group(child.id(), KillSignal::Kill)?;
        let status = child.wait()?;
        assert!(!status.success());
        Ok(())
    }
}
