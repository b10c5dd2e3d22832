use thiserror::Error;

/// Malformed patch text. Line numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchParseError {
    #[error("invalid patch header on line {line}: {message}")]
    InvalidHeader { line: usize, message: String },

    #[error("invalid patch hunk on line {line}: {message}")]
    InvalidHunk { line: usize, message: String },

    #[error("unexpected content on line {line}: '{text}'")]
    UnexpectedLine { line: usize, text: String },
}

impl PatchParseError {
    pub fn line(&self) -> usize {
        match self {
            Self::InvalidHeader { line, .. }
            | Self::InvalidHunk { line, .. }
            | Self::UnexpectedLine { line, .. } => *line,
        }
    }
}
