use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Value, json};

use crate::error::FileOpsError;

fn is_false(value: &bool) -> bool {
    !*value
}

/// Converts an operation outcome into the record handed to the tool layer.
///
/// Errors become `{error, error_kind, ...}`; successes serialize as-is.
pub trait ToolPayload: Serialize {
    fn error_payload(error: &FileOpsError) -> Value {
        error.to_payload()
    }

    fn to_payload(&self) -> Value {
        serde_json::to_value(self)
            .unwrap_or_else(|error| json!({ "error": error.to_string(), "error_kind": "serialize" }))
    }
}

/// Render any facade result as a JSON record.
pub fn to_payload<T: ToolPayload>(result: &Result<T, FileOpsError>) -> Value {
    match result {
        Ok(value) => value.to_payload(),
        Err(error) => T::error_payload(error),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReadResult {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub content: String,
    pub total_lines: usize,
    pub file_size: u64,
    #[serde(skip_serializing_if = "is_false")]
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub is_image: bool,
}

impl ToolPayload for ReadResult {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriteResult {
    pub bytes_written: u64,
    #[serde(skip_serializing_if = "is_false")]
    pub dirs_created: bool,
}

impl ToolPayload for WriteResult {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchMatch {
    pub path: String,
    pub line_number: usize,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<SearchMatch>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub counts: BTreeMap<String, usize>,
    pub total_count: usize,
    #[serde(skip_serializing_if = "is_false")]
    pub truncated: bool,
}

impl ToolPayload for SearchResult {}

/// Outcome of a syntax check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LintResult {
    Ok { output: String },
    Error { output: String },
    Skipped { message: String },
}

impl LintResult {
    pub fn skipped(message: impl Into<String>) -> Self {
        Self::Skipped {
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

impl ToolPayload for LintResult {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatchResult {
    pub success: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub diff: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files_modified: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files_created: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files_deleted: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub lint: BTreeMap<String, LintResult>,
}

impl ToolPayload for PatchResult {
    fn error_payload(error: &FileOpsError) -> Value {
        let mut payload = error.to_payload();
        if let Some(object) = payload.as_object_mut() {
            object.insert("success".into(), Value::Bool(false));
        }
        payload
    }
}
