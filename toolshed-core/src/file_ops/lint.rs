use tracing::debug;

use toolshed_runner::quoting::{posix_quote, windows_arg};

use super::{FileOperations, LintResult, Strategy, extension_of};
use crate::error::FileOpsError;

/// Syntax-only checks keyed by extension. `{file}` is replaced by the
/// quoted path.
const LINTERS: &[(&str, &str)] = &[
    ("py", "python -m py_compile {file}"),
    ("js", "node --check {file}"),
    ("ts", "npx tsc --noEmit {file}"),
    ("go", "go vet {file}"),
    ("rs", "rustfmt --check {file}"),
];

fn linter_for(extension: &str) -> Option<&'static str> {
    LINTERS
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, command)| *command)
}

impl FileOperations {
    /// Run the syntax check for `path`'s extension.
    ///
    /// A missing linter or tool is reported as skipped, never as an error.
    pub fn lint(&self, path: &str) -> LintResult {
        let Some(extension) = extension_of(path) else {
            return LintResult::skipped("No linter for files without an extension");
        };
        let Some(template) = linter_for(&extension) else {
            return LintResult::skipped(format!("No linter for .{extension} files"));
        };
        let tool = template.split_whitespace().next().unwrap_or(template);
        if !self.has_command(tool) {
            return LintResult::skipped(format!("{tool} not available"));
        }

        let quoted = match self.strategy {
            Strategy::Native if cfg!(windows) => windows_arg(path).into_owned(),
            _ => posix_quote(path).into_owned(),
        };
        let command = format!("{} 2>&1", template.replace("{file}", &quoted));
        let result = match self.run_shell("lint", &command, None, self.config.timeouts.lint()) {
            Ok(output) if output.returncode == 0 => LintResult::Ok {
                output: output.output.trim().to_string(),
            },
            Ok(output) => LintResult::Error {
                output: output.output.trim().to_string(),
            },
            Err(FileOpsError::LaunchFailure { message, .. }) => {
                LintResult::skipped(format!("{tool} could not be launched: {message}"))
            }
            Err(error) => LintResult::Error {
                output: error.to_string(),
            },
        };
        debug!(target: "toolshed.file_ops", path, tool, ?result, "lint");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linters_cover_known_extensions() {
        assert_eq!(linter_for("py"), Some("python -m py_compile {file}"));
        assert_eq!(linter_for("rs"), Some("rustfmt --check {file}"));
        assert_eq!(linter_for("md"), None);
    }
}
