//! Structured multi-file patches.
//!
//! A patch document is a sequence of `*** Add File:`, `*** Update File:`,
//! `*** Delete File:` and `*** Move File:` sections. Update sections hold
//! `@@` hunks made of context (` `), removal (`-`) and addition (`+`) lines.

mod apply;
mod error;
mod parser;

pub use apply::{AppliedPatch, PatchTarget, apply};
pub(crate) use apply::unified_diff;
pub use error::PatchParseError;
pub use parser::parse;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Add,
    Update,
    Delete,
    Move,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Move => "move",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinePrefix {
    Context,
    Remove,
    Add,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HunkLine {
    pub prefix: LinePrefix,
    pub content: String,
}

impl HunkLine {
    pub fn new(prefix: LinePrefix, content: impl Into<String>) -> Self {
        Self {
            prefix,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hunk {
    /// Text after `@@`, used to disambiguate where the hunk applies.
    pub context_hint: String,
    pub lines: Vec<HunkLine>,
}

impl Hunk {
    /// Context and removal lines, as they should appear in the file now.
    pub fn old_block(&self) -> String {
        self.block(LinePrefix::Remove)
    }

    /// Context and addition lines, as they should appear afterwards.
    pub fn new_block(&self) -> String {
        self.block(LinePrefix::Add)
    }

    pub fn has_old_lines(&self) -> bool {
        self.lines
            .iter()
            .any(|line| line.prefix != LinePrefix::Add)
    }

    fn block(&self, keep: LinePrefix) -> String {
        self.lines
            .iter()
            .filter(|line| line.prefix == LinePrefix::Context || line.prefix == keep)
            .map(|line| line.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOperation {
    pub kind: OperationKind,
    pub file_path: String,
    /// Destination for moves, and for updates carrying `*** Move to:`.
    pub new_path: Option<String>,
    pub hunks: Vec<Hunk>,
}

impl PatchOperation {
    pub fn new(kind: OperationKind, file_path: impl Into<String>) -> Self {
        Self {
            kind,
            file_path: file_path.into(),
            new_path: None,
            hunks: Vec::new(),
        }
    }

    /// Body of an added file: every `+` line joined, newline-terminated.
    pub fn added_content(&self) -> String {
        let lines: Vec<&str> = self
            .hunks
            .iter()
            .flat_map(|hunk| hunk.lines.iter())
            .filter(|line| line.prefix == LinePrefix::Add)
            .map(|line| line.content.as_str())
            .collect();
        if lines.is_empty() {
            String::new()
        } else {
            let mut content = lines.join("\n");
            content.push('\n');
            content
        }
    }
}

/// A parsed patch document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Patch {
    operations: Vec<PatchOperation>,
}

impl Patch {
    pub fn parse(input: &str) -> Result<Self, PatchParseError> {
        Ok(Self {
            operations: parser::parse(input)?,
        })
    }

    pub fn operations(&self) -> &[PatchOperation] {
        &self.operations
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn into_operations(self) -> Vec<PatchOperation> {
        self.operations
    }
}
