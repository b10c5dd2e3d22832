use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::config::ToolshedConfig;
use crate::loader::merge::merge_toml_values;

pub const CONFIG_FILE_NAME: &str = "toolshed.toml";
pub const CONFIG_DIR_NAME: &str = ".toolshed";

const CONFIG_PATH_ENV: &str = "TOOLSHED_CONFIG_PATH";
const COMMAND_TIMEOUT_ENV: &str = "TOOLSHED_COMMAND_TIMEOUT";
const CWD_ENV: &str = "TOOLSHED_CWD";

/// One source that contributed to the effective configuration, lowest
/// precedence first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLayer {
    User(PathBuf),
    WorkspaceDir(PathBuf),
    Workspace(PathBuf),
    Explicit(PathBuf),
    Environment(&'static str),
}

/// Loads and validates the effective configuration for a workspace.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: ToolshedConfig,
    workspace_root: PathBuf,
    layers: Vec<ConfigLayer>,
}

impl ConfigManager {
    /// Load configuration for `workspace`, honouring `TOOLSHED_CONFIG_PATH`.
    pub fn load(workspace: impl AsRef<Path>) -> Result<Self> {
        if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
            let trimmed = config_path.trim();
            if !trimmed.is_empty() {
                return Self::load_from_file(trimmed, workspace).with_context(|| {
                    format!("Failed to load configuration from {CONFIG_PATH_ENV}={trimmed}")
                });
            }
        }
        Self::load_from_workspace(workspace)
    }

    /// Load configuration from the default locations for `workspace`.
    pub fn load_from_workspace(workspace: impl AsRef<Path>) -> Result<Self> {
        let home = dirs::home_dir();
        Self::load_with_home(workspace, home.as_deref())
    }

    /// Load configuration with an explicit user-level directory in place of
    /// the real home directory. `None` skips the user layer entirely.
    pub fn load_with_home(workspace: impl AsRef<Path>, home: Option<&Path>) -> Result<Self> {
        let workspace_root = workspace.as_ref().to_path_buf();
        let mut candidates = Vec::new();

        if let Some(home) = home {
            candidates.push(ConfigLayer::User(
                home.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME),
            ));
        }
        candidates.push(ConfigLayer::WorkspaceDir(
            workspace_root.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME),
        ));
        candidates.push(ConfigLayer::Workspace(workspace_root.join(CONFIG_FILE_NAME)));

        let candidates = candidates
            .into_iter()
            .filter(|layer| layer_path(layer).is_some_and(Path::is_file))
            .collect();
        Self::from_layers(workspace_root, candidates)
    }

    /// Load configuration from one explicit file on top of the defaults.
    pub fn load_from_file(path: impl AsRef<Path>, workspace: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        anyhow::ensure!(
            path.is_file(),
            "Configuration file {} does not exist",
            path.display()
        );
        Self::from_layers(
            workspace.as_ref().to_path_buf(),
            vec![ConfigLayer::Explicit(path)],
        )
    }

    fn from_layers(workspace_root: PathBuf, file_layers: Vec<ConfigLayer>) -> Result<Self> {
        let mut effective = toml::Value::Table(toml::map::Map::new());
        for layer in &file_layers {
            if let Some(path) = layer_path(layer) {
                let value = load_toml_from_file(path)?;
                merge_toml_values(&mut effective, &value);
                debug!(target: "toolshed.config", path = %path.display(), "applied config layer");
            }
        }

        let config: ToolshedConfig = effective
            .try_into()
            .context("Failed to deserialize effective configuration")?;

        let mut manager = Self {
            config,
            workspace_root,
            layers: file_layers,
        };
        manager.apply_env_overrides();
        manager
            .config
            .validate()
            .context("Configuration failed validation")?;
        Ok(manager)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(raw) = std::env::var(COMMAND_TIMEOUT_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(seconds) if seconds > 0 => {
                    self.config.timeouts.command_seconds = seconds;
                    self.layers.push(ConfigLayer::Environment(COMMAND_TIMEOUT_ENV));
                }
                _ => warn!(
                    target: "toolshed.config",
                    value = %raw,
                    "ignoring {COMMAND_TIMEOUT_ENV}; expected a positive integer"
                ),
            }
        }

        if let Ok(raw) = std::env::var(CWD_ENV) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                self.config.workspace.default_cwd =
                    Some(toolshed_commons::expand_home(trimmed));
                self.layers.push(ConfigLayer::Environment(CWD_ENV));
            }
        }
    }

    pub fn config(&self) -> &ToolshedConfig {
        &self.config
    }

    pub fn into_config(self) -> ToolshedConfig {
        self.config
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Layers applied, lowest precedence first.
    pub fn layers(&self) -> &[ConfigLayer] {
        &self.layers
    }

    /// Working directory for commands when the caller gives none.
    pub fn default_cwd(&self) -> PathBuf {
        self.config
            .workspace
            .default_cwd
            .clone()
            .unwrap_or_else(|| self.workspace_root.clone())
    }
}

fn layer_path(layer: &ConfigLayer) -> Option<&Path> {
    match layer {
        ConfigLayer::User(path)
        | ConfigLayer::WorkspaceDir(path)
        | ConfigLayer::Workspace(path)
        | ConfigLayer::Explicit(path) => Some(path),
        ConfigLayer::Environment(_) => None,
    }
}

fn load_toml_from_file(path: &Path) -> Result<toml::Value> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}
