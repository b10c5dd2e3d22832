//! Configuration for the toolshed command-execution and file-operation crates.
//!
//! [`ConfigManager`] resolves the layered `toolshed.toml` files for a
//! workspace, applies environment overrides, and validates the result.

pub mod config;
pub mod file_ops;
pub mod loader;
pub mod shell;
pub mod timeouts;

pub use config::ToolshedConfig;
pub use file_ops::{ReadConfig, SearchConfig, WorkspaceConfig};
pub use loader::{ConfigLayer, ConfigManager};
pub use shell::{DEFAULT_OVERRIDE_ENV, ShellConfig, ShellOverride, UnknownShellOverride};
pub use timeouts::TimeoutsConfig;

/// Load a `.env` file from the current directory or its parents.
///
/// A missing file is not an error; a malformed one is logged and skipped.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => {
            tracing::debug!(path = %path.display(), "loaded environment from .env");
        }
        Err(dotenvy::Error::Io(error)) if error.kind() == std::io::ErrorKind::NotFound => {}
        Err(error) => {
            tracing::warn!(%error, "failed to load .env file");
        }
    }
}
