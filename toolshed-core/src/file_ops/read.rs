use std::fs;
use std::io::ErrorKind;

use tracing::debug;

use toolshed_config::ReadConfig;

use super::{
    FileOperations, ReadResult, Strategy, has_binary_extension, is_image_path, looks_binary,
    shell_path,
};
use crate::error::FileOpsError;

/// Directory entries listed when a read targets a directory.
const DIRECTORY_PREVIEW: usize = 20;
const TRUNCATION_MARKER: &str = "... [truncated]";
const MISSING_EXIT_CODE: i32 = 3;

/// Requested page of lines, 1-based and inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Window {
    pub start: usize,
    pub limit: usize,
}

impl Window {
    pub fn new(offset: Option<usize>, limit: Option<usize>, config: &ReadConfig) -> Self {
        let limit = match limit {
            Some(0) | None => config.default_limit,
            Some(limit) => limit,
        };
        Self {
            start: offset.unwrap_or(1).max(1),
            limit: limit.min(config.max_lines),
        }
    }

    pub fn end(self) -> usize {
        self.start.saturating_add(self.limit).saturating_sub(1)
    }
}

/// Lines of `text` without their terminators; a trailing newline does not
/// start another line.
pub(crate) fn text_lines(text: &str) -> impl Iterator<Item = &str> {
    let body = text.strip_suffix('\n').unwrap_or(text);
    body.split('\n').filter(move |_| !text.is_empty())
}

fn clip(line: &str, max_chars: usize) -> String {
    match line.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", line.get(..cut).unwrap_or(line)),
        None => line.to_string(),
    }
}

/// Number the page and work out pagination hints.
fn render_page<'a>(
    lines: impl Iterator<Item = &'a str>,
    window: Window,
    total_lines: usize,
    file_size: u64,
    config: &ReadConfig,
) -> ReadResult {
    let mut content = String::new();
    let mut shown = 0;
    for (index, line) in lines.take(window.limit).enumerate() {
        if index > 0 {
            content.push('\n');
        }
        content.push_str(&format!(
            "{:>6}|{}",
            window.start.saturating_add(index),
            clip(line, config.max_line_length)
        ));
        shown += 1;
    }

    let truncated = total_lines > window.end();
    let hint = if truncated {
        Some(format!(
            "Use offset={} to continue reading (showing {}-{} of {} lines)",
            window.end().saturating_add(1),
            window.start,
            window.end(),
            total_lines
        ))
    } else if shown == 0 && total_lines > 0 && window.start > total_lines {
        Some(format!(
            "Offset {} is past the end of the file ({} lines)",
            window.start, total_lines
        ))
    } else {
        None
    };

    ReadResult {
        content,
        total_lines,
        file_size,
        truncated,
        hint,
        is_image: false,
    }
}

fn image_result(file_size: u64) -> ReadResult {
    ReadResult {
        file_size,
        is_image: true,
        hint: Some(
            "Image file detected. Use an image-capable tool with this path to inspect its contents."
                .into(),
        ),
        ..ReadResult::default()
    }
}

impl FileOperations {
    /// Read a page of a text file with numbered lines.
    ///
    /// `offset` is 1-based and defaults to 1; `limit` defaults to the
    /// configured page size and is clamped to the configured maximum.
    pub fn read_file(
        &self,
        path: &str,
        offset: Option<usize>,
        limit: Option<usize>,
    ) -> Result<ReadResult, FileOpsError> {
        let window = Window::new(offset, limit, &self.config.read);
        debug!(target: "toolshed.file_ops", path, ?window, strategy = ?self.strategy, "read");
        match self.strategy {
            Strategy::Shell => self.read_shell(path, window),
            Strategy::Native => self.read_native(path, window),
        }
    }

    /// Full file text without numbering or pagination.
    pub fn read_raw(&self, path: &str) -> Result<String, FileOpsError> {
        match self.strategy {
            Strategy::Shell => {
                let quoted = shell_path(path);
                let output = self.run_shell(
                    "read",
                    &format!("[ -f {quoted} ] || exit {MISSING_EXIT_CODE}; cat {quoted}"),
                    None,
                    self.command_timeout(),
                )?;
                match output.returncode {
                    0 => Ok(output.output),
                    MISSING_EXIT_CODE => Err(self.not_found(path)),
                    code => Err(FileOpsError::CommandFailed {
                        operation: "read",
                        code,
                        output: output.output,
                    }),
                }
            }
            Strategy::Native => {
                let resolved = self.resolve_native(path);
                match fs::read(&resolved) {
                    Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
                    Err(error) if error.kind() == ErrorKind::NotFound => Err(self.not_found(path)),
                    Err(error) => Err(FileOpsError::io("reading", path, error)),
                }
            }
        }
    }

    pub fn path_exists(&self, path: &str) -> Result<bool, FileOpsError> {
        match self.strategy {
            Strategy::Shell => {
                let quoted = shell_path(path);
                let output = self.run_shell(
                    "stat",
                    &format!("if [ -e {quoted} ]; then echo yes; else echo no; fi"),
                    None,
                    self.command_timeout(),
                )?;
                Ok(output.output.trim() == "yes")
            }
            Strategy::Native => Ok(self.resolve_native(path).exists()),
        }
    }

    fn read_shell(&self, path: &str, window: Window) -> Result<ReadResult, FileOpsError> {
        let quoted = shell_path(path);
        let timeout = self.command_timeout();
        let probe = self.run_shell(
            "read",
            &format!(
                "if [ -d {quoted} ]; then echo d; ls -1A {quoted} 2>/dev/null | head -n {DIRECTORY_PREVIEW}; \
                 elif [ -e {quoted} ]; then echo f; wc -c < {quoted}; \
                 else echo m; fi"
            ),
            None,
            timeout,
        )?;

        let mut lines = probe.output.lines();
        match lines.next().map(str::trim) {
            Some("d") => {
                return Err(FileOpsError::IsDirectory {
                    path: path.to_string(),
                    entries: lines.map(str::to_string).collect(),
                });
            }
            Some("f") => {}
            _ => return Err(self.not_found(path)),
        }
        let file_size = lines
            .next()
            .and_then(|size| size.trim().parse().ok())
            .unwrap_or(0);

        if is_image_path(path) {
            return Ok(image_result(file_size));
        }
        if has_binary_extension(path) {
            return Err(FileOpsError::BinaryUnsupported {
                path: path.to_string(),
                file_size: Some(file_size),
            });
        }

        let sample = self.run_shell(
            "read",
            &format!(
                "head -c {} {quoted} 2>/dev/null",
                self.config.read.binary_sample_bytes
            ),
            None,
            timeout,
        )?;
        if looks_binary(sample.output.as_bytes()) {
            return Err(FileOpsError::BinaryUnsupported {
                path: path.to_string(),
                file_size: Some(file_size),
            });
        }

        let page = self.run_shell(
            "read",
            &format!(
                "awk 'END {{ print NR }}' {quoted} && sed -n '{},{}p' {quoted}",
                window.start,
                window.end()
            ),
            None,
            timeout,
        )?;
        if page.returncode != 0 {
            return Err(FileOpsError::CommandFailed {
                operation: "read",
                code: page.returncode,
                output: page.output,
            });
        }

        let (count, body) = page
            .output
            .split_once('\n')
            .unwrap_or((page.output.as_str(), ""));
        let total_lines = count.trim().parse().unwrap_or(0);
        Ok(render_page(
            text_lines(body),
            window,
            total_lines,
            file_size,
            &self.config.read,
        ))
    }

    fn read_native(&self, path: &str, window: Window) -> Result<ReadResult, FileOpsError> {
        let resolved = self.resolve_native(path);
        let metadata = match fs::metadata(&resolved) {
            Ok(metadata) => metadata,
            Err(error) if error.kind() == ErrorKind::NotFound => return Err(self.not_found(path)),
            Err(error) => return Err(FileOpsError::io("inspecting", path, error)),
        };

        if metadata.is_dir() {
            let mut entries: Vec<String> = fs::read_dir(&resolved)
                .map_err(|error| FileOpsError::io("listing", path, error))?
                .filter_map(Result::ok)
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect();
            entries.sort();
            entries.truncate(DIRECTORY_PREVIEW);
            return Err(FileOpsError::IsDirectory {
                path: path.to_string(),
                entries,
            });
        }

        let file_size = metadata.len();
        if is_image_path(path) {
            return Ok(image_result(file_size));
        }
        if has_binary_extension(path) {
            return Err(FileOpsError::BinaryUnsupported {
                path: path.to_string(),
                file_size: Some(file_size),
            });
        }

        let bytes = fs::read(&resolved).map_err(|error| FileOpsError::io("reading", path, error))?;
        let sample = bytes
            .get(..self.config.read.binary_sample_bytes)
            .unwrap_or(&bytes);
        if looks_binary(sample) {
            return Err(FileOpsError::BinaryUnsupported {
                path: path.to_string(),
                file_size: Some(file_size),
            });
        }

        let text = String::from_utf8_lossy(&bytes);
        let total_lines = text_lines(&text).count();
        Ok(render_page(
            text_lines(&text).skip(window.start.saturating_sub(1)),
            window,
            total_lines,
            file_size,
            &self.config.read,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config() -> ReadConfig {
        ReadConfig::default()
    }

    #[test]
    fn window_defaults_and_clamps() {
        let config = config();
        assert_eq!(
            Window::new(None, None, &config),
            Window { start: 1, limit: 500 }
        );
        assert_eq!(
            Window::new(Some(0), Some(10_000), &config),
            Window { start: 1, limit: 2000 }
        );
        assert_eq!(Window::new(Some(5), Some(10), &config).end(), 14);
        assert_eq!(Window::new(Some(usize::MAX), Some(10), &config).end(), usize::MAX);
    }

    #[test]
    fn text_lines_ignores_final_newline() {
        assert_eq!(text_lines("a\nb\n").collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(text_lines("a\n\n").collect::<Vec<_>>(), vec!["a", ""]);
        assert_eq!(text_lines("").count(), 0);
        assert_eq!(text_lines("solo").collect::<Vec<_>>(), vec!["solo"]);
    }

    #[test]
    fn page_is_numbered_and_hinted() {
        let lines = ["line 1", "line 2", "line 3"];
        let window = Window { start: 1, limit: 2 };
        let result = render_page(lines.into_iter(), window, 3, 21, &config());
        assert_eq!(result.content, "     1|line 1\n     2|line 2");
        assert!(result.truncated);
        assert_eq!(
            result.hint.as_deref(),
            Some("Use offset=3 to continue reading (showing 1-2 of 3 lines)")
        );
    }

    #[test]
    fn long_lines_are_clipped() {
        let mut config = config();
        config.max_line_length = 4;
        let result = render_page(
            ["abcdefgh"].into_iter(),
            Window { start: 7, limit: 5 },
            7,
            8,
            &config,
        );
        assert_eq!(result.content, "     7|abcd... [truncated]");
        assert!(!result.truncated);
        assert_eq!(result.hint, None);
    }

    #[test]
    fn offset_past_end_explains_itself() {
        let result = render_page(
            std::iter::empty(),
            Window { start: 50, limit: 10 },
            3,
            12,
            &config(),
        );
        assert_eq!(result.content, "");
        assert!(result.hint.unwrap().contains("past the end"));
    }
}
