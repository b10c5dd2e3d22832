use similar::TextDiff;
use tracing::{debug, warn};

use super::{Hunk, OperationKind, PatchOperation};
use crate::editing::fuzzy::{self, MatchError};
use crate::error::FileOpsError;

/// Storage a patch is applied against.
pub trait PatchTarget {
    fn read_text(&self, path: &str) -> Result<String, FileOpsError>;

    fn write_text(&self, path: &str, content: &str) -> Result<(), FileOpsError>;

    fn exists(&self, path: &str) -> Result<bool, FileOpsError>;

    fn remove(&self, path: &str) -> Result<(), FileOpsError>;

    fn rename(&self, from: &str, to: &str) -> Result<(), FileOpsError>;
}

/// What an applied patch changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedPatch {
    pub diff: String,
    pub files_modified: Vec<String>,
    pub files_created: Vec<String>,
    pub files_deleted: Vec<String>,
}

/// How to undo one applied step.
enum Undo {
    Remove(String),
    Restore { path: String, content: String },
    Rename { from: String, to: String },
}

/// Apply `operations` in order. The first failure rolls every earlier step
/// back and is returned wrapped with the failing path.
pub fn apply(
    target: &dyn PatchTarget,
    operations: &[PatchOperation],
) -> Result<AppliedPatch, FileOpsError> {
    let mut applied = AppliedPatch::default();
    let mut journal = Vec::new();

    for operation in operations {
        debug!(
            target: "toolshed.patch",
            kind = operation.kind.as_str(),
            path = %operation.file_path,
            "applying patch operation"
        );
        if let Err(source) = apply_operation(target, operation, &mut applied, &mut journal) {
            rollback(target, journal);
            return Err(FileOpsError::PatchOperation {
                action: operation.kind.as_str(),
                path: operation.file_path.clone(),
                source: Box::new(source),
            });
        }
    }
    Ok(applied)
}

fn apply_operation(
    target: &dyn PatchTarget,
    operation: &PatchOperation,
    applied: &mut AppliedPatch,
    journal: &mut Vec<Undo>,
) -> Result<(), FileOpsError> {
    let path = operation.file_path.as_str();
    match operation.kind {
        OperationKind::Add => {
            let content = operation.added_content();
            if target.exists(path)? {
                let previous = target.read_text(path)?;
                target.write_text(path, &content)?;
                journal.push(Undo::Restore {
                    path: path.to_string(),
                    content: previous.clone(),
                });
                push_diff(&mut applied.diff, path, path, &previous, &content);
                applied.files_modified.push(path.to_string());
            } else {
                target.write_text(path, &content)?;
                journal.push(Undo::Remove(path.to_string()));
                push_diff(&mut applied.diff, "/dev/null", path, "", &content);
                applied.files_created.push(path.to_string());
            }
        }
        OperationKind::Delete => {
            if !target.exists(path)? {
                return Err(FileOpsError::not_found(path));
            }
            let previous = target.read_text(path)?;
            target.remove(path)?;
            journal.push(Undo::Restore {
                path: path.to_string(),
                content: previous.clone(),
            });
            push_diff(&mut applied.diff, path, "/dev/null", &previous, "");
            applied.files_deleted.push(path.to_string());
        }
        OperationKind::Move => {
            let destination = destination(operation)?;
            if !target.exists(path)? {
                return Err(FileOpsError::not_found(path));
            }
            refuse_existing(target, destination)?;
            target.rename(path, destination)?;
            journal.push(Undo::Rename {
                from: destination.to_string(),
                to: path.to_string(),
            });
            applied
                .diff
                .push_str(&format!("rename from {path}\nrename to {destination}\n"));
            applied.files_created.push(destination.to_string());
            applied.files_deleted.push(path.to_string());
        }
        OperationKind::Update => {
            let original = target.read_text(path)?;
            let mut updated = original.clone();
            for hunk in &operation.hunks {
                updated = apply_hunk(&updated, hunk)
                    .map_err(|error| FileOpsError::from_match(path, error))?;
            }

            match operation.new_path.as_deref() {
                Some(destination) if destination != path => {
                    refuse_existing(target, destination)?;
                    target.write_text(destination, &updated)?;
                    journal.push(Undo::Remove(destination.to_string()));
                    target.remove(path)?;
                    journal.push(Undo::Restore {
                        path: path.to_string(),
                        content: original.clone(),
                    });
                    push_diff(&mut applied.diff, path, destination, &original, &updated);
                    applied.files_created.push(destination.to_string());
                    applied.files_deleted.push(path.to_string());
                }
                _ => {
                    if updated != original {
                        target.write_text(path, &updated)?;
                        journal.push(Undo::Restore {
                            path: path.to_string(),
                            content: original.clone(),
                        });
                        push_diff(&mut applied.diff, path, path, &original, &updated);
                    }
                    applied.files_modified.push(path.to_string());
                }
            }
        }
    }
    Ok(())
}

fn destination(operation: &PatchOperation) -> Result<&str, FileOpsError> {
    operation.new_path.as_deref().ok_or_else(|| {
        FileOpsError::InvalidArgument(format!(
            "move of '{}' has no destination",
            operation.file_path
        ))
    })
}

fn refuse_existing(target: &dyn PatchTarget, destination: &str) -> Result<(), FileOpsError> {
    if target.exists(destination)? {
        return Err(FileOpsError::InvalidArgument(format!(
            "destination '{destination}' already exists"
        )));
    }
    Ok(())
}

fn rollback(target: &dyn PatchTarget, journal: Vec<Undo>) {
    for undo in journal.into_iter().rev() {
        let outcome = match &undo {
            Undo::Remove(path) => target.remove(path),
            Undo::Restore { path, content } => target.write_text(path, content),
            Undo::Rename { from, to } => target.rename(from, to),
        };
        if let Err(error) = outcome {
            warn!(target: "toolshed.patch", %error, "failed to roll back patch step");
        }
    }
}

fn apply_hunk(content: &str, hunk: &Hunk) -> Result<String, MatchError> {
    let old = hunk.old_block();
    let new = hunk.new_block();

    if !hunk.has_old_lines() {
        return Ok(insert_block(content, &new, &hunk.context_hint));
    }
    // Context-only hunks change nothing but must still anchor somewhere.
    if old == new {
        return if fuzzy::contains(content, &old) {
            Ok(content.to_string())
        } else {
            Err(MatchError::NoMatch)
        };
    }

    // A hunk that only removes lines should take their newline with them.
    if new.is_empty() {
        match replace_near(content, &format!("{old}\n"), "", &hunk.context_hint) {
            Err(MatchError::NoMatch) => {}
            result => return result,
        }
    }
    replace_near(content, &old, &new, &hunk.context_hint)
}

/// Replace the single occurrence of `old`. Several occurrences are narrowed
/// to the text starting at the line that holds `hint`.
fn replace_near(content: &str, old: &str, new: &str, hint: &str) -> Result<String, MatchError> {
    match fuzzy::replace(content, old, new, false) {
        Ok(replacement) => Ok(replacement.content),
        Err(MatchError::Ambiguous { count }) => {
            let Some(anchor) = hint_line_start(content, hint) else {
                return Err(MatchError::Ambiguous { count });
            };
            let (head, tail) = content.split_at(anchor);
            let replacement = fuzzy::replace(tail, old, new, false)?;
            Ok(format!("{head}{}", replacement.content))
        }
        Err(error) => Err(error),
    }
}

/// Byte offset of the first line containing `hint`.
fn hint_line_start(content: &str, hint: &str) -> Option<usize> {
    let hint = hint.trim();
    if hint.is_empty() {
        return None;
    }
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        if line.contains(hint) {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

/// Insert `block` after the line holding `hint`, or append it.
fn insert_block(content: &str, block: &str, hint: &str) -> String {
    if let Some(start) = hint_line_start(content, hint) {
        let rest = content.get(start..).unwrap_or_default();
        let line_end = rest.find('\n').map_or(content.len(), |index| start + index + 1);
        let (head, tail) = content.split_at(line_end);
        let mut output = String::with_capacity(content.len() + block.len() + 2);
        output.push_str(head);
        if !head.ends_with('\n') {
            output.push('\n');
        }
        output.push_str(block);
        output.push('\n');
        output.push_str(tail);
        return output;
    }

    let mut output = content.to_string();
    if !output.is_empty() && !output.ends_with('\n') {
        output.push('\n');
    }
    output.push_str(block);
    output.push('\n');
    output
}

fn push_diff(diff: &mut String, old_path: &str, new_path: &str, before: &str, after: &str) {
    diff.push_str(&unified_diff(old_path, new_path, before, after));
}

/// Unified diff with `a/`/`b/` labels and three lines of context.
pub(crate) fn unified_diff(old_path: &str, new_path: &str, before: &str, after: &str) -> String {
    let label = |prefix: &str, path: &str| {
        if path == "/dev/null" {
            path.to_string()
        } else {
            format!("{prefix}/{path}")
        }
    };
    TextDiff::from_lines(before, after)
        .unified_diff()
        .context_radius(3)
        .header(&label("a", old_path), &label("b", new_path))
        .to_string()
}
