use super::error::PatchParseError;
use super::{Hunk, HunkLine, LinePrefix, OperationKind, PatchOperation};

const ADD_FILE: &str = "Add File:";
const UPDATE_FILE: &str = "Update File:";
const DELETE_FILE: &str = "Delete File:";
const MOVE_FILE: &str = "Move File:";
const MOVE_TO: &str = "Move to:";

/// Parse a patch document into operations, in document order.
///
/// The `*** Begin Patch` / `*** End Patch` envelope is optional and an empty
/// document yields no operations.
pub fn parse(input: &str) -> Result<Vec<PatchOperation>, PatchParseError> {
    let mut parser = Parser::default();
    for (index, line) in input.lines().enumerate() {
        parser.feed(index + 1, line.strip_suffix('\r').unwrap_or(line))?;
    }
    parser.finish()
}

#[derive(Default)]
struct Parser {
    operations: Vec<PatchOperation>,
    current: Option<Pending>,
}

struct Pending {
    operation: PatchOperation,
    header_line: usize,
    hunk: Option<Hunk>,
}

impl Pending {
    fn new(operation: PatchOperation, header_line: usize) -> Self {
        Self {
            operation,
            header_line,
            hunk: None,
        }
    }

    fn push(&mut self, prefix: LinePrefix, content: &str) {
        self.hunk
            .get_or_insert_with(Hunk::default)
            .lines
            .push(HunkLine::new(prefix, content));
    }

    fn close_hunk(&mut self) {
        let Some(mut hunk) = self.hunk.take() else {
            return;
        };
        // Blank separator lines before the next section are not context.
        while hunk
            .lines
            .last()
            .is_some_and(|line| line.prefix == LinePrefix::Context && line.content.is_empty())
        {
            hunk.lines.pop();
        }
        if !hunk.lines.is_empty() {
            self.operation.hunks.push(hunk);
        }
    }
}

impl Parser {
    fn feed(&mut self, line_no: usize, line: &str) -> Result<(), PatchParseError> {
        if let Some(marker) = line.strip_prefix("*** ") {
            return self.marker(line_no, marker.trim_end());
        }
        if line.starts_with("***") {
            return Err(PatchParseError::InvalidHeader {
                line: line_no,
                message: format!("unrecognized marker '{}'", line.trim_end()),
            });
        }

        let Some(pending) = self.current.as_mut() else {
            if line.trim().is_empty() {
                return Ok(());
            }
            return Err(PatchParseError::UnexpectedLine {
                line: line_no,
                text: line.to_string(),
            });
        };

        match pending.operation.kind {
            OperationKind::Add => {
                if line.is_empty() {
                    return Ok(());
                }
                let Some(content) = line.strip_prefix('+') else {
                    return Err(PatchParseError::InvalidHunk {
                        line: line_no,
                        message: "Add File sections may only contain '+' lines".into(),
                    });
                };
                pending.push(LinePrefix::Add, content);
            }
            OperationKind::Delete | OperationKind::Move => {
                if line.trim().is_empty() {
                    return Ok(());
                }
                return Err(PatchParseError::InvalidHunk {
                    line: line_no,
                    message: format!(
                        "{} File sections take no content",
                        if pending.operation.kind == OperationKind::Delete {
                            "Delete"
                        } else {
                            "Move"
                        }
                    ),
                });
            }
            OperationKind::Update => {
                if let Some(header) = line.strip_prefix("@@") {
                    pending.close_hunk();
                    pending.hunk = Some(Hunk {
                        context_hint: parse_hint(header),
                        lines: Vec::new(),
                    });
                } else if line.is_empty() {
                    pending.push(LinePrefix::Context, "");
                } else if let Some(content) = line.strip_prefix(' ') {
                    pending.push(LinePrefix::Context, content);
                } else if let Some(content) = line.strip_prefix('-') {
                    pending.push(LinePrefix::Remove, content);
                } else if let Some(content) = line.strip_prefix('+') {
                    pending.push(LinePrefix::Add, content);
                } else {
                    return Err(PatchParseError::InvalidHunk {
                        line: line_no,
                        message: format!(
                            "expected a line starting with ' ', '-', '+' or '@@', found '{line}'"
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    fn marker(&mut self, line_no: usize, marker: &str) -> Result<(), PatchParseError> {
        match marker {
            "Begin Patch" | "End Patch" => return self.flush(),
            "End of File" => return Ok(()),
            _ => {}
        }

        if let Some(rest) = marker.strip_prefix(MOVE_TO) {
            let destination = required_path(line_no, rest)?;
            return match self.current.as_mut() {
                Some(pending) if pending.operation.kind == OperationKind::Update => {
                    pending.operation.new_path = Some(destination);
                    Ok(())
                }
                _ => Err(PatchParseError::InvalidHeader {
                    line: line_no,
                    message: "'*** Move to:' is only valid inside an Update File section".into(),
                }),
            };
        }

        let operation = if let Some(rest) = marker.strip_prefix(ADD_FILE) {
            PatchOperation::new(OperationKind::Add, required_path(line_no, rest)?)
        } else if let Some(rest) = marker.strip_prefix(UPDATE_FILE) {
            PatchOperation::new(OperationKind::Update, required_path(line_no, rest)?)
        } else if let Some(rest) = marker.strip_prefix(DELETE_FILE) {
            PatchOperation::new(OperationKind::Delete, required_path(line_no, rest)?)
        } else if let Some(rest) = marker.strip_prefix(MOVE_FILE) {
            let (from, to) = rest.split_once("->").ok_or_else(|| {
                PatchParseError::InvalidHeader {
                    line: line_no,
                    message: "Move File requires '<old> -> <new>'".into(),
                }
            })?;
            let mut operation =
                PatchOperation::new(OperationKind::Move, required_path(line_no, from)?);
            operation.new_path = Some(required_path(line_no, to)?);
            operation
        } else {
            return Err(PatchParseError::InvalidHeader {
                line: line_no,
                message: format!("unrecognized marker '*** {marker}'"),
            });
        };

        self.flush()?;
        self.current = Some(Pending::new(operation, line_no));
        Ok(())
    }

    fn flush(&mut self) -> Result<(), PatchParseError> {
        let Some(mut pending) = self.current.take() else {
            return Ok(());
        };
        pending.close_hunk();
        let operation = pending.operation;
        if operation.kind == OperationKind::Update
            && operation.hunks.is_empty()
            && operation.new_path.is_none()
        {
            return Err(PatchParseError::InvalidHunk {
                line: pending.header_line,
                message: format!("Update File section for '{}' has no hunks", operation.file_path),
            });
        }
        self.operations.push(operation);
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<PatchOperation>, PatchParseError> {
        self.flush()?;
        Ok(self.operations)
    }
}

fn required_path(line_no: usize, raw: &str) -> Result<String, PatchParseError> {
    let path = raw.trim();
    if path.is_empty() {
        return Err(PatchParseError::InvalidHeader {
            line: line_no,
            message: "missing file path".into(),
        });
    }
    Ok(path.to_string())
}

/// `@@`, `@@ hint` and `@@ hint @@` all carry an optional hint.
fn parse_hint(header: &str) -> String {
    let hint = header.trim();
    hint.strip_suffix("@@").unwrap_or(hint).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_document_has_no_operations() {
        assert_eq!(parse("").unwrap(), Vec::new());
        assert_eq!(parse("*** Begin Patch\n*** End Patch\n").unwrap(), Vec::new());
    }

    #[test]
    fn operations_keep_document_order() {
        let doc = "*** Begin Patch\n\
                   *** Add File: new.txt\n\
                   +hello\n\
                   *** Delete File: gone.txt\n\
                   *** Update File: src/lib.rs\n\
                   @@ fn main\n\
                   -old\n\
                   +new\n\
                   *** End Patch\n";
        let ops = parse(doc).unwrap();
        let kinds: Vec<_> = ops.iter().map(|op| op.kind).collect();
        assert_eq!(
            kinds,
            vec![OperationKind::Add, OperationKind::Delete, OperationKind::Update]
        );
        assert_eq!(ops[0].file_path, "new.txt");
        assert_eq!(ops[0].added_content(), "hello\n");
        assert!(ops[1].hunks.is_empty());
        assert_eq!(ops[2].hunks[0].context_hint, "fn main");
        assert_eq!(ops[2].hunks[0].old_block(), "old");
        assert_eq!(ops[2].hunks[0].new_block(), "new");
    }

    #[test]
    fn begin_marker_is_optional() {
        let ops = parse("*** Update File: a.py\n@@\n-x = 1\n+x = 2\n").unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].kind, OperationKind::Update);
    }

    #[test]
    fn move_file_splits_paths() {
        let ops = parse("*** Move File: a -> b\n").unwrap();
        assert_eq!(ops[0].kind, OperationKind::Move);
        assert_eq!(ops[0].file_path, "a");
        assert_eq!(ops[0].new_path.as_deref(), Some("b"));
        assert!(ops[0].hunks.is_empty());
    }

    #[test]
    fn move_file_requires_both_sides() {
        let error = parse("*** Move File: a\n").unwrap_err();
        assert_eq!(error.line(), 1);
        assert!(matches!(
            parse("*** Move File: a -> \n"),
            Err(PatchParseError::InvalidHeader { line: 1, .. })
        ));
    }

    #[test]
    fn update_with_move_to_and_end_of_file() {
        let doc = "*** Update File: old.rs\n\
                   *** Move to: new.rs\n\
                   @@ struct A @@\n \
                   a\n\
                   -b\n\
                   +c\n\
                   *** End of File\n";
        let ops = parse(doc).unwrap();
        assert_eq!(ops[0].new_path.as_deref(), Some("new.rs"));
        assert_eq!(ops[0].hunks[0].context_hint, "struct A");
        assert_eq!(ops[0].hunks[0].old_block(), "a\nb");
    }

    #[test]
    fn blank_lines_inside_hunks_are_context() {
        let ops = parse("*** Update File: f\n@@\n a\n\n-b\n+c\n\n*** Delete File: g\n").unwrap();
        let hunk = &ops[0].hunks[0];
        assert_eq!(hunk.old_block(), "a\n\nb");
        assert_eq!(hunk.new_block(), "a\n\nc");
    }

    #[test]
    fn crlf_input_is_accepted() {
        let ops = parse("*** Add File: x.txt\r\n+one\r\n+two\r\n").unwrap();
        assert_eq!(ops[0].added_content(), "one\ntwo\n");
    }

    #[test]
    fn multiple_hunks_per_update() {
        let doc = "*** Update File: f\n@@ first\n-a\n+b\n@@ second\n-c\n+d\n";
        let ops = parse(doc).unwrap();
        assert_eq!(ops[0].hunks.len(), 2);
        assert_eq!(ops[0].hunks[1].context_hint, "second");
    }

    #[test]
    fn add_rejects_non_addition_lines() {
        let error = parse("*** Add File: x\n+ok\n-nope\n").unwrap_err();
        assert!(matches!(error, PatchParseError::InvalidHunk { line: 3, .. }));
    }

    #[test]
    fn unknown_markers_and_stray_text_fail() {
        assert!(matches!(
            parse("*** Rename File: a\n"),
            Err(PatchParseError::InvalidHeader { line: 1, .. })
        ));
        assert!(matches!(
            parse("hello\n"),
            Err(PatchParseError::UnexpectedLine { line: 1, .. })
        ));
        assert!(matches!(
            parse("*** Update File: f\n@@\nbogus\n"),
            Err(PatchParseError::InvalidHunk { line: 3, .. })
        ));
    }

    #[test]
    fn update_without_hunks_is_rejected() {
        let error = parse("*** Update File: f\n*** End Patch\n").unwrap_err();
        assert_eq!(error.line(), 1);
    }
}
