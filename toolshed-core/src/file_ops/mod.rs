//! Backend-agnostic file operations.
//!
//! [`FileOperations`] reads, writes, searches, patches and lints files through
//! any [`CommandExecutor`]. Shell-backed backends get POSIX commands piped
//! through `execute`; a local Windows machine gets direct filesystem calls.
//! Both paths produce the same result shapes and the same errors.

mod lint;
mod read;
mod result;
mod search;
mod suggest;
mod write;

pub use result::{
    LintResult, PatchResult, ReadResult, SearchMatch, SearchResult, ToolPayload, WriteResult,
    to_payload,
};
pub use search::{OutputMode, SearchRequest, SearchTarget};

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, trace};

use toolshed_commons::expand_home;
use toolshed_config::ToolshedConfig;
use toolshed_runner::quoting::posix_quote;
use toolshed_runner::{
    BackendKind, CommandExecutor, ExecOutcome, ExecOutput, ExecRequest, HostPlatform,
    InterruptSignal,
};

use crate::editing::fuzzy;
use crate::editing::patch::{self, PatchTarget};
use crate::error::FileOpsError;

/// How operations reach the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// POSIX shell commands through the backend.
    Shell,
    /// Direct filesystem calls on this machine.
    Native,
}

impl Strategy {
    /// Local Windows hosts lack dependable POSIX tooling.
    pub fn for_backend(kind: BackendKind, platform: HostPlatform) -> Self {
        match (kind, platform) {
            (BackendKind::Local, HostPlatform::Windows) => Self::Native,
            _ => Self::Shell,
        }
    }
}

const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "bmp", "ico", "tiff", "tif", "svg",
];

const BINARY_EXTENSIONS: &[&str] = &[
    // audio and video
    "mp3", "mp4", "wav", "avi", "mov", "mkv", "flac", "ogg", "webm",
    // archives
    "zip", "tar", "gz", "bz2", "xz", "7z", "rar",
    // documents
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx",
    // compiled
    "exe", "dll", "so", "dylib", "o", "a", "pyc", "pyo", "class", "wasm", "bin",
    // fonts
    "ttf", "otf", "woff", "woff2", "eot",
    "db", "sqlite", "sqlite3",
];

fn extension_of(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

pub fn is_image_path(path: &str) -> bool {
    extension_of(path).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

pub fn has_binary_extension(path: &str) -> bool {
    extension_of(path).is_some_and(|ext| {
        BINARY_EXTENSIONS.contains(&ext.as_str()) || IMAGE_EXTENSIONS.contains(&ext.as_str())
    })
}

/// More than 30% control bytes (other than tab, CR, LF) in the sample.
pub fn looks_binary(sample: &[u8]) -> bool {
    if sample.is_empty() {
        return false;
    }
    let control = sample
        .iter()
        .filter(|&&byte| byte < 0x20 && !matches!(byte, b'\n' | b'\r' | b'\t'))
        .count();
    control * 10 > sample.len() * 3
}

/// File operations bound to one backend.
pub struct FileOperations {
    backend: Arc<dyn CommandExecutor>,
    cwd: Option<PathBuf>,
    strategy: Strategy,
    interrupt: InterruptSignal,
    config: ToolshedConfig,
    commands: RwLock<HashMap<String, bool>>,
}

impl FileOperations {
    pub fn new(backend: Arc<dyn CommandExecutor>, config: &ToolshedConfig) -> Self {
        let strategy = Strategy::for_backend(backend.kind(), HostPlatform::current());
        let cwd = backend
            .default_cwd()
            .map(Path::to_path_buf)
            .or_else(|| config.workspace.default_cwd.clone());
        debug!(
            target: "toolshed.file_ops",
            backend = ?backend.kind(),
            ?strategy,
            cwd = ?cwd,
            "file operations ready"
        );
        Self {
            backend,
            cwd,
            strategy,
            interrupt: InterruptSignal::new(),
            config: config.clone(),
            commands: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Share the flag that aborts shell-backed operations.
    pub fn with_interrupt(mut self, interrupt: InterruptSignal) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Replace `old` with `new` in one file, then lint it.
    pub fn patch_replace(
        &self,
        path: &str,
        old: &str,
        new: &str,
        replace_all: bool,
    ) -> Result<PatchResult, FileOpsError> {
        let original = self.read_raw(path)?;
        let replacement = fuzzy::replace(&original, old, new, replace_all)
            .map_err(|error| FileOpsError::from_match(path, error))?;
        self.write_file(path, &replacement.content)?;
        debug!(
            target: "toolshed.file_ops",
            path,
            matches = replacement.match_count,
            strategy = ?replacement.strategy,
            "replaced text"
        );

        let mut lint = BTreeMap::new();
        lint.insert(path.to_string(), self.lint(path));
        Ok(PatchResult {
            success: true,
            diff: patch::unified_diff(path, path, &original, &replacement.content),
            files_modified: vec![path.to_string()],
            lint,
            ..PatchResult::default()
        })
    }

    /// Parse and apply a structured patch document, then lint written files.
    pub fn patch_structured(&self, document: &str) -> Result<PatchResult, FileOpsError> {
        let operations = patch::parse(document)?;
        let applied = patch::apply(self, &operations)?;

        let lint = applied
            .files_modified
            .iter()
            .chain(&applied.files_created)
            .map(|path| (path.clone(), self.lint(path)))
            .collect();
        Ok(PatchResult {
            success: true,
            diff: applied.diff,
            files_modified: applied.files_modified,
            files_created: applied.files_created,
            files_deleted: applied.files_deleted,
            lint,
        })
    }

    /// Dispatch one shell command, mapping abnormal outcomes to errors.
    fn run_shell(
        &self,
        operation: &'static str,
        command: &str,
        stdin: Option<&str>,
        timeout: Duration,
    ) -> Result<ExecOutput, FileOpsError> {
        if self.interrupt.is_set() {
            return Err(FileOpsError::Interrupted { operation });
        }

        let mut request = ExecRequest::new().timeout(timeout);
        if let Some(cwd) = &self.cwd {
            request = request.cwd(cwd.clone());
        }
        if let Some(data) = stdin {
            request = request.stdin(data);
        }
        trace!(target: "toolshed.file_ops", operation, command, "dispatching");

        let output = self.backend.execute(command, &request);
        match output.status {
            ExecOutcome::Completed => Ok(output),
            ExecOutcome::TimedOut => Err(FileOpsError::ProcessTimeout {
                operation,
                seconds: timeout.as_secs(),
            }),
            ExecOutcome::Interrupted => Err(FileOpsError::Interrupted { operation }),
            ExecOutcome::LaunchFailed => Err(FileOpsError::LaunchFailure {
                operation,
                message: output.output.trim().to_string(),
            }),
        }
    }

    fn command_timeout(&self) -> Duration {
        self.config.timeouts.command()
    }

    /// Whether `name` can be run on the backend. Cached per facade.
    fn has_command(&self, name: &str) -> bool {
        if let Some(known) = self.commands.read().get(name) {
            return *known;
        }
        let available = match self.strategy {
            Strategy::Native => which::which(name).is_ok(),
            Strategy::Shell => self
                .run_shell(
                    "command probe",
                    &format!("command -v {} >/dev/null 2>&1 && echo yes", posix_quote(name)),
                    None,
                    self.config.timeouts.lint(),
                )
                .is_ok_and(|output| output.output.trim() == "yes"),
        };
        trace!(target: "toolshed.file_ops", command = name, available, "probed command");
        self.commands.write().insert(name.to_string(), available);
        available
    }

    /// Base directory for native path resolution.
    fn native_base(&self) -> PathBuf {
        self.cwd
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Resolve a path for native access: `cwd`, `cwd/workspace`, then each
    /// fallback root. The first existing candidate wins.
    fn resolve_native(&self, path: &str) -> PathBuf {
        let expanded = expand_home(path);
        if expanded.is_absolute() {
            return expanded;
        }
        let base = self.native_base();
        let primary = base.join(&expanded);
        if primary.exists() {
            return primary;
        }
        std::iter::once(base.join("workspace"))
            .chain(self.config.workspace.fallback_roots.iter().cloned())
            .map(|root| root.join(&expanded))
            .find(|candidate| candidate.exists())
            .unwrap_or(primary)
    }
}

/// Quote a path for a POSIX shell, keeping `~` expandable and preventing a
/// leading `-` from reading as an option.
pub(crate) fn shell_path(path: &str) -> String {
    if path == "~" {
        return "\"$HOME\"".to_string();
    }
    if let Some(rest) = path.strip_prefix("~/") {
        return format!("\"$HOME\"/{}", posix_quote(rest));
    }
    if path.starts_with('-') {
        return posix_quote(&format!("./{path}")).into_owned();
    }
    posix_quote(path).into_owned()
}

impl PatchTarget for FileOperations {
    fn read_text(&self, path: &str) -> Result<String, FileOpsError> {
        self.read_raw(path)
    }

    fn write_text(&self, path: &str, content: &str) -> Result<(), FileOpsError> {
        self.write_file(path, content).map(|_| ())
    }

    fn exists(&self, path: &str) -> Result<bool, FileOpsError> {
        self.path_exists(path)
    }

    fn remove(&self, path: &str) -> Result<(), FileOpsError> {
        self.delete(path)
    }

    fn rename(&self, from: &str, to: &str) -> Result<(), FileOpsError> {
        self.rename_file(from, to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn native_only_for_local_windows() {
        assert_eq!(
            Strategy::for_backend(BackendKind::Local, HostPlatform::Windows),
            Strategy::Native
        );
        assert_eq!(
            Strategy::for_backend(BackendKind::Local, HostPlatform::Posix),
            Strategy::Shell
        );
        assert_eq!(
            Strategy::for_backend(BackendKind::Container, HostPlatform::Windows),
            Strategy::Shell
        );
    }

    #[test]
    fn binary_detection() {
        assert!(has_binary_extension("archive.tar.GZ"));
        assert!(has_binary_extension("logo.png"));
        assert!(!has_binary_extension("main.rs"));
        assert!(is_image_path("photo.JPEG"));
        assert!(!is_image_path("notes.txt"));

        assert!(!looks_binary(b"plain text\nwith\ttabs\r\n"));
        assert!(looks_binary(&[0u8, 1, 2, 3, b'a']));
        assert!(!looks_binary(b""));
    }

    #[test]
    fn shell_paths_are_quoted() {
        assert_eq!(shell_path("src/main.rs"), "src/main.rs");
        assert_eq!(shell_path("my file.txt"), "'my file.txt'");
        assert_eq!(shell_path("~/notes.md"), "\"$HOME\"/notes.md");
        assert_eq!(shell_path("-rf"), "./-rf");
    }
}
