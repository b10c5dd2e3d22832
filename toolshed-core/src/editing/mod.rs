//! Text editing primitives shared by the file-operation layer.

pub mod fuzzy;
pub mod patch;

pub use fuzzy::{MatchError, MatchStrategy, Replacement, count_matches, replace};
pub use patch::{
    AppliedPatch, Hunk, HunkLine, LinePrefix, OperationKind, Patch, PatchOperation,
    PatchParseError, PatchTarget,
};
