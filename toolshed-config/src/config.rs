use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::file_ops::{ReadConfig, SearchConfig, WorkspaceConfig};
use crate::shell::ShellConfig;
use crate::timeouts::TimeoutsConfig;

/// Root of `toolshed.toml`.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ToolshedConfig {
    #[serde(default)]
    pub shell: ShellConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub read: ReadConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

impl ToolshedConfig {
    pub fn validate(&self) -> Result<()> {
        self.timeouts
            .validate()
            .context("Invalid [timeouts] section")?;
        self.read.validate().context("Invalid [read] section")?;
        self.search.validate().context("Invalid [search] section")?;
        Ok(())
    }
}
