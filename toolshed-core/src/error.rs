use std::io;

use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::editing::fuzzy::MatchError;
use crate::editing::patch::PatchParseError;

/// Everything a file operation can report back to its caller.
///
/// Each variant carries enough context (path, count, tool) for the caller to
/// correct its request without guessing.
#[derive(Debug, Error)]
pub enum FileOpsError {
    #[error("File not found: {path}")]
    NotFound {
        path: String,
        similar_files: Vec<String>,
        hint: Option<String>,
    },

    #[error("Path is a directory, not a file: {path}")]
    IsDirectory { path: String, entries: Vec<String> },

    #[error("Cannot read binary file as text: {path}")]
    BinaryUnsupported { path: String, file_size: Option<u64> },

    #[error(
        "Found {count} matches for old_string in {path}; include more surrounding context to make it unique or set replace_all"
    )]
    AmbiguousMatch { path: String, count: usize },

    #[error(
        "Could not find old_string in {path} (whitespace- and indentation-insensitive matching was also tried); read the file and copy the exact text"
    )]
    NoMatch { path: String },

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{message}")]
    ToolUnavailable { tool: String, message: String },

    #[error(transparent)]
    PatchParse(#[from] PatchParseError),

    #[error("failed to {action} '{path}': {source}")]
    PatchOperation {
        action: &'static str,
        path: String,
        #[source]
        source: Box<FileOpsError>,
    },

    #[error("{operation} timed out after {seconds}s")]
    ProcessTimeout { operation: &'static str, seconds: u64 },

    #[error("{operation} was interrupted")]
    Interrupted { operation: &'static str },

    #[error("could not launch command for {operation}: {message}")]
    LaunchFailure {
        operation: &'static str,
        message: String,
    },

    #[error("{operation} failed with exit code {code}: {output}")]
    CommandFailed {
        operation: &'static str,
        code: i32,
        output: String,
    },

    #[error("I/O error while {action} '{path}': {source}")]
    Io {
        action: &'static str,
        path: String,
        #[source]
        source: io::Error,
    },
}

impl FileOpsError {
    pub fn io(action: &'static str, path: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound {
            path: path.into(),
            similar_files: Vec::new(),
            hint: None,
        }
    }

    /// Lift a fuzzy-matcher failure into a path-aware error.
    pub fn from_match(path: &str, error: MatchError) -> Self {
        match error {
            MatchError::EmptyPattern | MatchError::Identical => {
                Self::InvalidArgument(error.to_string())
            }
            MatchError::NoMatch => Self::NoMatch {
                path: path.to_string(),
            },
            MatchError::Ambiguous { count } => Self::AmbiguousMatch {
                path: path.to_string(),
                count,
            },
        }
    }

    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::IsDirectory { .. } => "is_directory",
            Self::BinaryUnsupported { .. } => "binary_unsupported",
            Self::AmbiguousMatch { .. } => "ambiguous_match",
            Self::NoMatch { .. } => "no_match",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::ToolUnavailable { .. } => "tool_unavailable",
            Self::PatchParse(_) => "patch_parse_error",
            Self::PatchOperation { source, .. } => source.kind(),
            Self::ProcessTimeout { .. } => "process_timeout",
            Self::Interrupted { .. } => "interrupted",
            Self::LaunchFailure { .. } => "launch_failure",
            Self::CommandFailed { .. } => "command_failed",
            Self::Io { .. } => "io_error",
        }
    }

    /// Record shape handed to the calling tool layer.
    pub fn to_payload(&self) -> Value {
        let mut payload = Map::new();
        payload.insert("error".into(), Value::String(self.to_string()));
        payload.insert("error_kind".into(), Value::String(self.kind().into()));

        match self {
            Self::NotFound {
                similar_files,
                hint,
                ..
            } => {
                if !similar_files.is_empty() {
                    payload.insert("similar_files".into(), json!(similar_files));
                }
                if let Some(hint) = hint {
                    payload.insert("hint".into(), json!(hint));
                }
            }
            Self::IsDirectory { entries, .. } if !entries.is_empty() => {
                payload.insert("entries".into(), json!(entries));
            }
            Self::BinaryUnsupported { file_size, .. } => {
                payload.insert("is_binary".into(), Value::Bool(true));
                if let Some(size) = file_size {
                    payload.insert("file_size".into(), json!(size));
                }
            }
            Self::AmbiguousMatch { count, .. } => {
                payload.insert("match_count".into(), json!(count));
            }
            Self::ToolUnavailable { tool, .. } => {
                payload.insert("tool".into(), json!(tool));
            }
            Self::PatchOperation { path, .. } => {
                payload.insert("path".into(), json!(path));
            }
            _ => {}
        }
        Value::Object(payload)
    }
}
