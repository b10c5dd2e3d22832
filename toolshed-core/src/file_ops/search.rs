use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use toolshed_runner::quoting::posix_quote;

use super::read::text_lines;
use super::{
    FileOperations, SearchMatch, SearchResult, Strategy, has_binary_extension, looks_binary,
    shell_path,
};
use crate::error::FileOpsError;

const MISSING_ROOT_EXIT_CODE: i32 = 3;
const GLOB_CHARS: &[char] = &['*', '?', '[', ']'];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchTarget {
    /// Match the pattern against file contents.
    #[default]
    Content,
    /// Match a name glob against file names.
    Files,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    #[default]
    Content,
    FilesOnly,
    Count,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub pattern: String,
    pub path: String,
    pub target: SearchTarget,
    pub file_glob: Option<String>,
    /// Falls back to the configured default when absent or zero.
    pub limit: Option<usize>,
    pub offset: usize,
    pub output_mode: OutputMode,
    /// Lines of context around each content match.
    pub context: usize,
}

impl SearchRequest {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            path: ".".into(),
            target: SearchTarget::default(),
            file_glob: None,
            limit: None,
            offset: 0,
            output_mode: OutputMode::default(),
            context: 0,
        }
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn target(mut self, target: SearchTarget) -> Self {
        self.target = target;
        self
    }

    pub fn file_glob(mut self, glob: impl Into<String>) -> Self {
        self.file_glob = Some(glob.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn output_mode(mut self, mode: OutputMode) -> Self {
        self.output_mode = mode;
        self
    }

    pub fn context(mut self, lines: usize) -> Self {
        self.context = lines;
        self
    }
}

/// A content pattern that is really a filename glob, like `*.html`.
pub fn looks_like_file_glob(pattern: &str) -> bool {
    pattern.contains(GLOB_CHARS)
        && pattern.contains('.')
        && !pattern.contains('/')
        && !pattern.contains('\\')
}

/// Name glob for file-target search. Plain tokens match as substrings.
fn name_glob(pattern: &str) -> String {
    let last = pattern.rsplit('/').next().unwrap_or(pattern);
    if last.contains(GLOB_CHARS) {
        last.to_string()
    } else {
        format!("*{last}*")
    }
}

fn clip_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => text.get(..cut).unwrap_or(text).to_string(),
        None => text.to_string(),
    }
}

/// Slice after counting so truncation is reported accurately.
fn paginate<T>(items: Vec<T>, offset: usize, limit: usize) -> (Vec<T>, usize, bool) {
    let total = items.len();
    let truncated = offset.saturating_add(limit) < total;
    let page = items.into_iter().skip(offset).take(limit).collect();
    (page, total, truncated)
}

/// `path\0<line>:<text>` for matches, `path\0<line>-<text>` for context.
fn parse_content_line(line: &str, max_chars: usize) -> Option<SearchMatch> {
    let (path, rest) = line.split_once('\0')?;
    let digits = rest.find(|ch: char| !ch.is_ascii_digit())?;
    let line_number = rest.get(..digits)?.parse().ok()?;
    let separator = rest.get(digits..=digits)?;
    if separator != ":" && separator != "-" {
        return None;
    }
    Some(SearchMatch {
        path: path.to_string(),
        line_number,
        content: clip_chars(rest.get(digits + 1..)?, max_chars),
    })
}

/// `path\0<count>` lines; zero counts are dropped.
fn parse_count_line(line: &str) -> Option<(String, usize)> {
    let (path, count) = line.split_once('\0')?;
    let count: usize = count.trim().parse().ok()?;
    (count > 0).then(|| (path.to_string(), count))
}

/// Version-control metadata below the search root. Other dot-entries are
/// searched like any file, matching `find` and `grep --exclude-dir=.git`.
pub(super) fn is_vcs_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_type().is_dir() && entry.file_name() == ".git"
}

/// Path as the caller would see it: the requested root joined with the
/// entry's position below it.
fn display_path(requested: &str, root: &Path, entry: &Path) -> String {
    match entry.strip_prefix(root) {
        Ok(relative) if relative.as_os_str().is_empty() => requested.to_string(),
        Ok(relative) => Path::new(requested)
            .join(relative)
            .to_string_lossy()
            .into_owned(),
        Err(_) => entry.to_string_lossy().into_owned(),
    }
}

impl FileOperations {
    /// Search file names or file contents.
    pub fn search(&self, request: &SearchRequest) -> Result<SearchResult, FileOpsError> {
        if request.pattern.trim().is_empty() {
            return Err(FileOpsError::InvalidArgument(
                "search pattern must not be empty".into(),
            ));
        }

        let mut request = request.clone();
        if request.target == SearchTarget::Content
            && request.file_glob.is_none()
            && looks_like_file_glob(&request.pattern)
        {
            debug!(
                target: "toolshed.file_ops",
                pattern = %request.pattern,
                "content pattern looks like a filename glob; searching file names"
            );
            request.target = SearchTarget::Files;
        }
        let limit = request
            .limit
            .filter(|limit| *limit > 0)
            .unwrap_or(self.config.search.default_limit);

        debug!(
            target: "toolshed.file_ops",
            pattern = %request.pattern,
            path = %request.path,
            search_target = ?request.target,
            mode = ?request.output_mode,
            "search"
        );
        match request.target {
            SearchTarget::Files => match self.strategy {
                Strategy::Shell => self.search_files_shell(&request, limit),
                Strategy::Native => self.search_files_native(&request, limit),
            },
            SearchTarget::Content => {
                let regex = Regex::new(&request.pattern).map_err(|error| {
                    FileOpsError::InvalidArgument(format!(
                        "invalid regex '{}': {error}",
                        request.pattern
                    ))
                })?;
                match self.strategy {
                    Strategy::Shell => self.search_content_shell(&request, limit),
                    Strategy::Native => self.search_content_native(&request, &regex, limit),
                }
            }
        }
    }

    fn search_shell(&self, request: &SearchRequest, pipeline: &str) -> Result<String, FileOpsError> {
        let root = shell_path(&request.path);
        let output = self.run_shell(
            "search",
            &format!("[ -e {root} ] || exit {MISSING_ROOT_EXIT_CODE}; {pipeline}"),
            None,
            self.config.timeouts.search(),
        )?;
        if output.returncode == MISSING_ROOT_EXIT_CODE {
            return Err(FileOpsError::not_found(request.path.clone()));
        }
        Ok(output.output)
    }

    fn search_files_shell(
        &self,
        request: &SearchRequest,
        limit: usize,
    ) -> Result<SearchResult, FileOpsError> {
        if !self.has_command("find") {
            return Err(FileOpsError::ToolUnavailable {
                tool: "find".into(),
                message: "File search requires the 'find' command on this backend".into(),
            });
        }

        let root = shell_path(&request.path);
        let glob = posix_quote(&name_glob(&request.pattern)).into_owned();
        let base = format!("find {root} -type f -name {glob} -not -path '*/.git/*'");
        let sorted = self.find_supports_printf();
        let pipeline = if sorted {
            format!("{base} -printf '%T@ %p\\n' 2>/dev/null | sort -rn")
        } else {
            format!("{base} 2>/dev/null")
        };

        let output = self.search_shell(request, &pipeline)?;
        let files: Vec<String> = output
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| {
                if sorted {
                    line.split_once(' ')
                        .map_or(line, |(_, path)| path)
                        .to_string()
                } else {
                    line.to_string()
                }
            })
            .collect();

        let (files, total_count, truncated) = paginate(files, request.offset, limit);
        Ok(SearchResult {
            files,
            total_count,
            truncated,
            ..SearchResult::default()
        })
    }

    /// GNU find sorts by mtime via `-printf`; BSD find lacks it.
    fn find_supports_printf(&self) -> bool {
        const KEY: &str = "find -printf";
        if let Some(known) = self.commands.read().get(KEY) {
            return *known;
        }
        let supported = self
            .run_shell(
                "command probe",
                "find . -maxdepth 0 -printf '' >/dev/null 2>&1 && echo yes",
                None,
                self.config.timeouts.lint(),
            )
            .is_ok_and(|output| output.output.trim() == "yes");
        self.commands.write().insert(KEY.to_string(), supported);
        supported
    }

    fn search_content_shell(
        &self,
        request: &SearchRequest,
        limit: usize,
    ) -> Result<SearchResult, FileOpsError> {
        let pattern = posix_quote(&request.pattern).into_owned();
        let root = shell_path(&request.path);
        let glob = request.file_glob.as_deref();

        let command = if self.has_command("rg") {
            let mut parts = vec!["rg --color never --hidden --no-ignore-vcs --glob '!.git'".to_string()];
            match request.output_mode {
                OutputMode::Content => {
                    parts.push("--line-number --no-heading --with-filename --null".into());
                    if request.context > 0 {
                        parts.push(format!("-C {}", request.context));
                    }
                }
                OutputMode::FilesOnly => parts.push("-l".into()),
                OutputMode::Count => parts.push("-c --with-filename --null".into()),
            }
            if let Some(glob) = glob {
                parts.push(format!("--glob {}", posix_quote(glob)));
            }
            parts.push(format!("-e {pattern} -- {root} 2>/dev/null"));
            parts.join(" ")
        } else if self.has_command("grep") {
            let mut parts = vec!["grep -rE --exclude-dir=.git".to_string()];
            match request.output_mode {
                OutputMode::Content => {
                    parts.push("-nH --null".into());
                    if request.context > 0 {
                        parts.push(format!("-C {}", request.context));
                    }
                }
                OutputMode::FilesOnly => parts.push("-l".into()),
                OutputMode::Count => parts.push("-cH --null".into()),
            }
            if let Some(glob) = glob {
                parts.push(posix_quote(&format!("--include={glob}")).into_owned());
            }
            parts.push(format!("-e {pattern} -- {root} 2>/dev/null"));
            parts.join(" ")
        } else {
            return Err(FileOpsError::ToolUnavailable {
                tool: "rg".into(),
                message: "Content search requires ripgrep (rg) or grep; neither is available on this backend"
                    .into(),
            });
        };

        let output = self.search_shell(request, &command)?;
        let max_chars = self.config.search.max_match_chars;
        Ok(match request.output_mode {
            OutputMode::Content => {
                let matches = output
                    .lines()
                    .filter(|line| *line != "--")
                    .filter_map(|line| parse_content_line(line, max_chars))
                    .collect();
                content_page(matches, request.offset, limit)
            }
            OutputMode::FilesOnly => {
                let files = output
                    .lines()
                    .filter(|line| !line.is_empty())
                    .map(str::to_string)
                    .collect();
                files_page(files, request.offset, limit)
            }
            OutputMode::Count => {
                let counts = output.lines().filter_map(parse_count_line).collect();
                count_page(counts, request.offset, limit)
            }
        })
    }

    fn walk(&self, request: &SearchRequest) -> Result<(PathBuf, Vec<DirEntry>), FileOpsError> {
        let root = self.resolve_native(&request.path);
        if !root.exists() {
            return Err(FileOpsError::not_found(request.path.clone()));
        }
        let entries = WalkDir::new(&root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_vcs_dir(entry))
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .collect();
        Ok((root, entries))
    }

    fn search_files_native(
        &self,
        request: &SearchRequest,
        limit: usize,
    ) -> Result<SearchResult, FileOpsError> {
        let glob = Pattern::new(&name_glob(&request.pattern)).map_err(|error| {
            FileOpsError::InvalidArgument(format!("invalid glob '{}': {error}", request.pattern))
        })?;
        let (root, entries) = self.walk(request)?;

        let mut found: Vec<(SystemTime, String)> = entries
            .iter()
            .filter(|entry| glob.matches(&entry.file_name().to_string_lossy()))
            .map(|entry| {
                let modified = entry
                    .metadata()
                    .ok()
                    .and_then(|metadata| metadata.modified().ok())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                (modified, display_path(&request.path, &root, entry.path()))
            })
            .collect();
        found.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        let files = found.into_iter().map(|(_, path)| path).collect();
        let (files, total_count, truncated) = paginate(files, request.offset, limit);
        Ok(SearchResult {
            files,
            total_count,
            truncated,
            ..SearchResult::default()
        })
    }

    fn search_content_native(
        &self,
        request: &SearchRequest,
        regex: &Regex,
        limit: usize,
    ) -> Result<SearchResult, FileOpsError> {
        let file_glob = request
            .file_glob
            .as_deref()
            .map(Pattern::new)
            .transpose()
            .map_err(|error| FileOpsError::InvalidArgument(format!("invalid file glob: {error}")))?;
        let (root, entries) = self.walk(request)?;
        let max_chars = self.config.search.max_match_chars;

        let mut matches = Vec::new();
        let mut files = Vec::new();
        let mut counts = BTreeMap::new();
        for entry in entries {
            let name = entry.file_name().to_string_lossy();
            if file_glob.as_ref().is_some_and(|glob| !glob.matches(&name))
                || has_binary_extension(&name)
            {
                continue;
            }
            let Ok(bytes) = fs::read(entry.path()) else {
                continue;
            };
            let sample = bytes
                .get(..self.config.read.binary_sample_bytes)
                .unwrap_or(&bytes);
            if looks_binary(sample) {
                continue;
            }

            let text = String::from_utf8_lossy(&bytes);
            let lines: Vec<&str> = text_lines(&text).collect();
            let hits: Vec<usize> = lines
                .iter()
                .enumerate()
                .filter(|(_, line)| regex.is_match(line))
                .map(|(index, _)| index)
                .collect();
            if hits.is_empty() {
                continue;
            }

            let display = display_path(&request.path, &root, entry.path());
            match request.output_mode {
                OutputMode::FilesOnly => files.push(display),
                OutputMode::Count => {
                    counts.insert(display, hits.len());
                }
                OutputMode::Content => {
                    let mut shown = BTreeSet::new();
                    for hit in hits {
                        let first = hit.saturating_sub(request.context);
                        let last = (hit + request.context).min(lines.len() - 1);
                        shown.extend(first..=last);
                    }
                    matches.extend(shown.into_iter().filter_map(|index| {
                        lines.get(index).map(|line| SearchMatch {
                            path: display.clone(),
                            line_number: index + 1,
                            content: clip_chars(line, max_chars),
                        })
                    }));
                }
            }
        }

        Ok(match request.output_mode {
            OutputMode::Content => content_page(matches, request.offset, limit),
            OutputMode::FilesOnly => files_page(files, request.offset, limit),
            OutputMode::Count => count_page(counts, request.offset, limit),
        })
    }
}

fn content_page(matches: Vec<SearchMatch>, offset: usize, limit: usize) -> SearchResult {
    let (matches, total_count, truncated) = paginate(matches, offset, limit);
    SearchResult {
        matches,
        total_count,
        truncated,
        ..SearchResult::default()
    }
}

fn files_page(files: Vec<String>, offset: usize, limit: usize) -> SearchResult {
    let (files, total_count, truncated) = paginate(files, offset, limit);
    SearchResult {
        files,
        total_count,
        truncated,
        ..SearchResult::default()
    }
}

/// Per-file counts sorted by path; `total_count` sums every file.
fn count_page(counts: BTreeMap<String, usize>, offset: usize, limit: usize) -> SearchResult {
    let total_count = counts.values().sum();
    let entries: Vec<(String, usize)> = counts.into_iter().collect();
    let (entries, _, truncated) = paginate(entries, offset, limit);
    SearchResult {
        counts: entries.into_iter().collect(),
        total_count,
        truncated,
        ..SearchResult::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn detects_filename_globs() {
        assert!(looks_like_file_glob("*.html"));
        assert!(looks_like_file_glob("test_?.py"));
        assert!(!looks_like_file_glob("fn main"));
        assert!(!looks_like_file_glob("src/*.rs"));
        assert!(!looks_like_file_glob("a+b"));
    }

    #[test]
    fn plain_tokens_become_substring_globs() {
        assert_eq!(name_glob("worldview"), "*worldview*");
        assert_eq!(name_glob("*.rs"), "*.rs");
        assert_eq!(name_glob("docs/guide"), "*guide*");
    }

    #[test]
    fn content_lines_parse_with_awkward_paths() {
        let parsed = parse_content_line("dir/a-b:c.txt\012:let x = 1;", 500).unwrap();
        assert_eq!(parsed.path, "dir/a-b:c.txt");
        assert_eq!(parsed.line_number, 12);
        assert_eq!(parsed.content, "let x = 1;");

        let context = parse_content_line("f.rs\03-    }", 500).unwrap();
        assert_eq!(context.line_number, 3);
        assert_eq!(context.content, "    }");

        assert_eq!(parse_content_line("no separator", 500), None);
    }

    #[test]
    fn match_text_is_capped() {
        let parsed = parse_content_line("f\01:abcdef", 3).unwrap();
        assert_eq!(parsed.content, "abc");
    }

    #[test]
    fn counts_drop_zero_files() {
        assert_eq!(parse_count_line("a.rs\04"), Some(("a.rs".into(), 4)));
        assert_eq!(parse_count_line("b.rs\00"), None);
    }

    #[test]
    fn pagination_reports_truncation() {
        let (page, total, truncated) = paginate((0..10).collect(), 2, 3);
        assert_eq!(page, vec![2, 3, 4]);
        assert_eq!(total, 10);
        assert!(truncated);

        let (page, _, truncated) = paginate(vec![1, 2], 0, 50);
        assert_eq!(page, vec![1, 2]);
        assert!(!truncated);
    }

    #[test]
    fn count_total_covers_all_files() {
        let counts = BTreeMap::from([("b".to_string(), 2), ("a".to_string(), 3), ("c".to_string(), 1)]);
        let result = count_page(counts, 0, 2);
        assert_eq!(result.total_count, 6);
        assert_eq!(result.counts.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(result.truncated);
    }
}
