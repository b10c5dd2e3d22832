//! Whitespace- and indentation-tolerant text replacement.
//!
//! Three passes run in a fixed order and the first one that finds anything
//! wins: exact substring, interior-whitespace-collapsed, and
//! leading-indentation-insensitive. Passes are never mixed within one call,
//! and every pass is case-sensitive.

use serde::Serialize;
use thiserror::Error;

/// Which pass located the replaced text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    Exact,
    WhitespaceCollapsed,
    IndentInsensitive,
}

/// Successful replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub content: String,
    pub match_count: usize,
    pub strategy: MatchStrategy,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    #[error("old_string must not be empty")]
    EmptyPattern,

    #[error("old_string and new_string are identical; nothing to replace")]
    Identical,

    #[error("could not find old_string in the content (also tried whitespace- and indentation-insensitive matching)")]
    NoMatch,

    #[error(
        "Found {count} matches for old_string; include more surrounding context to make it unique or set replace_all"
    )]
    Ambiguous { count: usize },
}

/// Byte range in the original content. Indent-insensitive matches also carry
/// the indentation to transplant onto the replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Span {
    start: usize,
    end: usize,
    reindent: Option<Reindent>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Reindent {
    found: String,
    requested: String,
}

/// Replace `old` with `new` in `content`.
///
/// Without `replace_all`, more than one occurrence is an
/// [`MatchError::Ambiguous`] error and nothing is changed.
pub fn replace(
    content: &str,
    old: &str,
    new: &str,
    replace_all: bool,
) -> Result<Replacement, MatchError> {
    if old.is_empty() {
        return Err(MatchError::EmptyPattern);
    }
    if old == new {
        return Err(MatchError::Identical);
    }

    let (strategy, spans) = find_matches(content, old).ok_or(MatchError::NoMatch)?;
    if spans.len() > 1 && !replace_all {
        return Err(MatchError::Ambiguous { count: spans.len() });
    }

    let mut output = String::with_capacity(content.len() + new.len());
    let mut cursor = 0;
    for span in &spans {
        output.push_str(content.get(cursor..span.start).unwrap_or_default());
        match &span.reindent {
            Some(reindent) => output.push_str(&reindent_block(new, reindent)),
            None => output.push_str(new),
        }
        cursor = span.end;
    }
    output.push_str(content.get(cursor..).unwrap_or_default());

    Ok(Replacement {
        content: output,
        match_count: spans.len(),
        strategy,
    })
}

/// Count occurrences the way [`replace`] would see them.
pub fn count_matches(content: &str, old: &str) -> (usize, Option<MatchStrategy>) {
    if old.is_empty() {
        return (0, None);
    }
    match find_matches(content, old) {
        Some((strategy, spans)) => (spans.len(), Some(strategy)),
        None => (0, None),
    }
}

/// Whether `needle` occurs in `content` under any matching strategy.
pub(crate) fn contains(content: &str, needle: &str) -> bool {
    !needle.is_empty() && find_matches(content, needle).is_some()
}

fn find_matches(content: &str, old: &str) -> Option<(MatchStrategy, Vec<Span>)> {
    let exact = exact_spans(content, old);
    if !exact.is_empty() {
        return Some((MatchStrategy::Exact, exact));
    }
    if old.trim().is_empty() {
        return None;
    }
    let collapsed = collapsed_spans(content, old);
    if !collapsed.is_empty() {
        return Some((MatchStrategy::WhitespaceCollapsed, collapsed));
    }
    let indented = indent_spans(content, old);
    if !indented.is_empty() {
        return Some((MatchStrategy::IndentInsensitive, indented));
    }
    None
}

fn exact_spans(content: &str, old: &str) -> Vec<Span> {
    content
        .match_indices(old)
        .map(|(start, matched)| Span {
            start,
            end: start + matched.len(),
            reindent: None,
        })
        .collect()
}

/// Text with interior runs of spaces/tabs collapsed to one space, plus the
/// original byte range behind every output byte. Leading indentation is kept
/// verbatim.
struct Collapsed {
    text: String,
    origin: Vec<(usize, usize)>,
}

fn collapse_interior_whitespace(input: &str) -> Collapsed {
    let mut text = String::with_capacity(input.len());
    let mut origin: Vec<(usize, usize)> = Vec::with_capacity(input.len());
    let mut at_line_start = true;
    let mut in_run = false;

    for (index, ch) in input.char_indices() {
        let end = index + ch.len_utf8();
        let blank = ch == ' ' || ch == '\t';

        if blank && !at_line_start {
            if in_run {
                if let Some(last) = origin.last_mut() {
                    last.1 = end;
                }
            } else {
                text.push(' ');
                origin.push((index, end));
                in_run = true;
            }
            continue;
        }

        in_run = false;
        if ch == '\n' {
            at_line_start = true;
        } else if !blank {
            at_line_start = false;
        }
        text.push(ch);
        origin.extend(std::iter::repeat_n((index, end), ch.len_utf8()));
    }

    Collapsed { text, origin }
}

fn collapsed_spans(content: &str, old: &str) -> Vec<Span> {
    let haystack = collapse_interior_whitespace(content);
    let needle = collapse_interior_whitespace(old).text;
    if needle.is_empty() {
        return Vec::new();
    }

    haystack
        .text
        .match_indices(needle.as_str())
        .filter_map(|(start, matched)| {
            let first = haystack.origin.get(start)?;
            let last = haystack.origin.get(start + matched.len() - 1)?;
            Some(Span {
                start: first.0,
                end: last.1,
                reindent: None,
            })
        })
        .collect()
}

fn leading_whitespace(line: &str) -> &str {
    let trimmed = line.trim_start_matches([' ', '\t']);
    line.get(..line.len() - trimmed.len()).unwrap_or_default()
}

fn indent_spans(content: &str, old: &str) -> Vec<Span> {
    let old_ends_with_newline = old.ends_with('\n');
    let old_lines: Vec<&str> = old
        .strip_suffix('\n')
        .unwrap_or(old)
        .split('\n')
        .collect();
    let window = old_lines.len();

    let mut offsets = Vec::new();
    let mut lines = Vec::new();
    let mut position = 0;
    for line in content.split('\n') {
        offsets.push(position);
        lines.push(line);
        position += line.len() + 1;
    }
    if window == 0 || lines.len() < window {
        return Vec::new();
    }

    let requested = leading_whitespace(old_lines.first().copied().unwrap_or_default());
    let mut spans = Vec::new();
    let mut index = 0;
    while index + window <= lines.len() {
        let candidate = lines.get(index..index + window).unwrap_or_default();
        let matches = candidate
            .iter()
            .zip(&old_lines)
            .all(|(have, want)| have.trim_start() == want.trim_start());
        if !matches {
            index += 1;
            continue;
        }

        let last = index + window - 1;
        let start = offsets.get(index).copied().unwrap_or_default();
        let mut end = offsets.get(last).copied().unwrap_or_default()
            + lines.get(last).map_or(0, |line| line.len());
        if old_ends_with_newline && end < content.len() {
            end += 1;
        }
        let found = leading_whitespace(lines.get(index).copied().unwrap_or_default());
        spans.push(Span {
            start,
            end,
            reindent: Some(Reindent {
                found: found.to_string(),
                requested: requested.to_string(),
            }),
        });
        index += window;
    }
    spans
}

/// Shift `block` from the caller's base indentation to the file's.
fn reindent_block(block: &str, reindent: &Reindent) -> String {
    block
        .split('\n')
        .map(|line| {
            if line.trim().is_empty() {
                return line.to_string();
            }
            let body = line
                .strip_prefix(reindent.requested.as_str())
                .unwrap_or_else(|| line.trim_start_matches([' ', '\t']));
            format!("{}{body}", reindent.found)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn exact_single_match() {
        let result = replace("hello world", "world", "earth", false).unwrap();
        assert_eq!(result.content, "hello earth");
        assert_eq!(result.match_count, 1);
        assert_eq!(result.strategy, MatchStrategy::Exact);
    }

    #[test]
    fn multiline_exact_match() {
        let result = replace("line1\nline2\nline3", "line1\nline2", "replaced", false).unwrap();
        assert_eq!(result.content, "replaced\nline3");
        assert_eq!(result.match_count, 1);
    }

    #[test]
    fn empty_old_is_rejected() {
        assert_eq!(replace("abc", "", "x", false), Err(MatchError::EmptyPattern));
    }

    #[test]
    fn identical_strings_are_rejected() {
        let error = replace("abc", "abc", "abc", false).unwrap_err();
        assert!(error.to_string().contains("identical"));
    }

    #[test]
    fn ambiguous_without_replace_all() {
        let error = replace("aaa bbb aaa", "aaa", "ccc", false).unwrap_err();
        assert_eq!(error, MatchError::Ambiguous { count: 2 });
        assert!(error.to_string().contains("Found 2 matches"));
    }

    #[test]
    fn replace_all_rewrites_every_occurrence() {
        let result = replace("aaa bbb aaa", "aaa", "ccc", true).unwrap();
        assert_eq!(result.content, "ccc bbb ccc");
        assert_eq!(result.match_count, 2);
        assert!(!result.content.contains("aaa"));
    }

    #[test]
    fn no_match_reports_error() {
        assert_eq!(
            replace("hello", "goodbye", "x", false),
            Err(MatchError::NoMatch)
        );
    }

    #[test]
    fn interior_whitespace_runs_are_tolerated() {
        let content = "def  foo(  x,  y  ):\n    return x";
        let result = replace(content, "def foo( x, y ):", "def foo(x, y):", false).unwrap();
        assert_eq!(result.match_count, 1);
        assert_eq!(result.strategy, MatchStrategy::WhitespaceCollapsed);
        assert_eq!(result.content, "def foo(x, y):\n    return x");
    }

    #[test]
    fn collapsed_text_maps_back_to_source_bytes() {
        let collapsed = collapse_interior_whitespace("  a \t b\n");
        assert_eq!(collapsed.text, "  a b\n");
        assert_eq!(
            collapsed.origin,
            vec![(0, 1), (1, 2), (2, 3), (3, 6), (6, 7), (7, 8)]
        );
    }

    #[test]
    fn whitespace_pass_preserves_untouched_formatting() {
        let content = "a  =  1\nb  =  2\n";
        let result = replace(content, "b = 2", "b = 3", false).unwrap();
        assert_eq!(result.content, "a  =  1\nb = 3\n");
    }

    #[test]
    fn indentation_differences_are_tolerated() {
        let content = "class A:\n    def foo():\n        pass\n";
        let result = replace(content, "def foo():\n    pass", "def bar():\n    return 1", false)
            .unwrap();
        assert_eq!(result.match_count, 1);
        assert_eq!(result.strategy, MatchStrategy::IndentInsensitive);
        assert_eq!(
            result.content,
            "class A:\n    def bar():\n        return 1\n"
        );
    }

    #[test]
    fn indent_pass_with_trailing_newline_in_old() {
        let content = "    x = 1\n    y = 2\nz = 3";
        let result = replace(content, "x = 1\ny = 2\n", "w = 0\n", false).unwrap();
        assert_eq!(result.content, "    w = 0\nz = 3");
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert_eq!(
            replace("Hello World", "hello world", "x", false),
            Err(MatchError::NoMatch)
        );
    }

    #[test]
    fn earlier_pass_wins_over_later_ones() {
        // The exact pass finds one hit; the whitespace pass would find two.
        let content = "a b\na  b\n";
        let result = replace(content, "a b", "c", true).unwrap();
        assert_eq!(result.strategy, MatchStrategy::Exact);
        assert_eq!(result.content, "c\na  b\n");
    }

    #[test]
    fn count_matches_reports_strategy() {
        assert_eq!(
            count_matches("x  y x y", "x y"),
            (1, Some(MatchStrategy::Exact))
        );
        assert_eq!(count_matches("abc", "zzz"), (0, None));
    }

    #[test]
    fn multibyte_text_survives_collapsing() {
        let content = "naïve  café  ☕ done";
        let result = replace(content, "café ☕", "tea", false).unwrap();
        assert_eq!(result.content, "naïve  tea done");
    }
}
