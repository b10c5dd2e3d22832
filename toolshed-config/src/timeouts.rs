use std::time::Duration;

use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};

/// `[timeouts]` section. Every external command runs under one of these.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct TimeoutsConfig {
    /// Default budget (in seconds) for a raw command execution.
    #[serde(default = "TimeoutsConfig::default_command_seconds")]
    pub command_seconds: u64,
    /// Budget for `find`/`rg`/`grep` invocations issued by search.
    #[serde(default = "TimeoutsConfig::default_search_seconds")]
    pub search_seconds: u64,
    /// Budget for a single syntax check after a patch.
    #[serde(default = "TimeoutsConfig::default_lint_seconds")]
    pub lint_seconds: u64,
    /// Budget for the Linux-subsystem liveness probe.
    #[serde(default = "TimeoutsConfig::default_wsl_probe_seconds")]
    pub wsl_probe_seconds: u64,
    /// Time between the graceful signal and the forced kill.
    #[serde(default = "TimeoutsConfig::default_grace_period_ms")]
    pub grace_period_ms: u64,
    /// How often the wait loop checks for exit, timeout and interruption.
    #[serde(default = "TimeoutsConfig::default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Budget for `taskkill` when tearing down a Windows process tree.
    #[serde(default = "TimeoutsConfig::default_taskkill_seconds")]
    pub taskkill_seconds: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            command_seconds: Self::default_command_seconds(),
            search_seconds: Self::default_search_seconds(),
            lint_seconds: Self::default_lint_seconds(),
            wsl_probe_seconds: Self::default_wsl_probe_seconds(),
            grace_period_ms: Self::default_grace_period_ms(),
            poll_interval_ms: Self::default_poll_interval_ms(),
            taskkill_seconds: Self::default_taskkill_seconds(),
        }
    }
}

impl TimeoutsConfig {
    const fn default_command_seconds() -> u64 {
        180
    }

    const fn default_search_seconds() -> u64 {
        60
    }

    const fn default_lint_seconds() -> u64 {
        30
    }

    const fn default_wsl_probe_seconds() -> u64 {
        4
    }

    const fn default_grace_period_ms() -> u64 {
        1_000
    }

    const fn default_poll_interval_ms() -> u64 {
        200
    }

    const fn default_taskkill_seconds() -> u64 {
        5
    }

    pub fn command(&self) -> Duration {
        Duration::from_secs(self.command_seconds)
    }

    pub fn search(&self) -> Duration {
        Duration::from_secs(self.search_seconds)
    }

    pub fn lint(&self) -> Duration {
        Duration::from_secs(self.lint_seconds)
    }

    pub fn wsl_probe(&self) -> Duration {
        Duration::from_secs(self.wsl_probe_seconds)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn taskkill(&self) -> Duration {
        Duration::from_secs(self.taskkill_seconds)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.command_seconds > 0,
            "timeouts.command_seconds must be at least 1"
        );
        ensure!(
            self.search_seconds > 0,
            "timeouts.search_seconds must be at least 1"
        );
        ensure!(
            self.lint_seconds > 0,
            "timeouts.lint_seconds must be at least 1"
        );
        ensure!(
            self.wsl_probe_seconds > 0,
            "timeouts.wsl_probe_seconds must be at least 1"
        );
        ensure!(
            self.grace_period_ms > 0,
            "timeouts.grace_period_ms must be at least 1"
        );
        ensure!(
            self.poll_interval_ms > 0 && self.poll_interval_ms < 1_000,
            "timeouts.poll_interval_ms must be between 1 and 999"
        );
        ensure!(
            self.taskkill_seconds > 0,
            "timeouts.taskkill_seconds must be at least 1"
        );
        Ok(())
    }
}
