//! File reading, writing, searching and patching on top of any command
//! backend.
//!
//! [`FileOperations`] is the entry point. It drives a
//! [`toolshed_runner::CommandExecutor`] with POSIX shell commands, or uses
//! direct filesystem calls on a local Windows host, and reports every outcome
//! as a typed result or a [`FileOpsError`] that renders to a JSON record via
//! [`to_payload`].

pub mod editing;
pub mod error;
pub mod file_ops;

pub use editing::{
    MatchError, MatchStrategy, OperationKind, Patch, PatchOperation, PatchParseError,
    Replacement,
};
pub use error::FileOpsError;
pub use file_ops::{
    FileOperations, LintResult, OutputMode, PatchResult, ReadResult, SearchMatch, SearchRequest,
    SearchResult, SearchTarget, Strategy, ToolPayload, WriteResult, to_payload,
};
