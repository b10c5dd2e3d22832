use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use tracing::debug;

use super::{FileOperations, Strategy, WriteResult, shell_path};
use crate::error::FileOpsError;

const DIRS_CREATED_MARKER: &str = "__toolshed_dirs_created__";

fn parent_of(path: &str) -> Option<&str> {
    Path::new(path)
        .parent()
        .and_then(Path::to_str)
        .filter(|parent| !parent.is_empty())
}

impl FileOperations {
    /// Write `content` to `path`, creating missing parent directories.
    ///
    /// On the shell strategy the content travels over stdin, never through
    /// the command line.
    pub fn write_file(&self, path: &str, content: &str) -> Result<WriteResult, FileOpsError> {
        let result = match self.strategy {
            Strategy::Shell => self.write_shell(path, content),
            Strategy::Native => self.write_native(path, content),
        }?;
        debug!(
            target: "toolshed.file_ops",
            path,
            bytes = result.bytes_written,
            dirs_created = result.dirs_created,
            "wrote file"
        );
        Ok(result)
    }

    /// Remove a file. Missing files are not an error.
    pub fn delete(&self, path: &str) -> Result<(), FileOpsError> {
        match self.strategy {
            Strategy::Shell => {
                let output = self.run_shell(
                    "delete",
                    &format!("rm -f {}", shell_path(path)),
                    None,
                    self.command_timeout(),
                )?;
                expect_success("delete", output.returncode, output.output)
            }
            Strategy::Native => match fs::remove_file(self.resolve_native(path)) {
                Ok(()) => Ok(()),
                Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
                Err(error) => Err(FileOpsError::io("deleting", path, error)),
            },
        }
    }

    /// Move `from` to `to`, creating the destination's parent directories.
    pub fn rename_file(&self, from: &str, to: &str) -> Result<(), FileOpsError> {
        match self.strategy {
            Strategy::Shell => {
                let mut script = String::new();
                if let Some(parent) = parent_of(to) {
                    script.push_str(&format!("mkdir -p {} && ", shell_path(parent)));
                }
                script.push_str(&format!("mv -f {} {}", shell_path(from), shell_path(to)));
                let output = self.run_shell("rename", &script, None, self.command_timeout())?;
                expect_success("rename", output.returncode, output.output)
            }
            Strategy::Native => {
                let source = self.resolve_native(from);
                let destination = self.resolve_native(to);
                if let Some(parent) = destination.parent() {
                    fs::create_dir_all(parent)
                        .map_err(|error| FileOpsError::io("creating directories for", to, error))?;
                }
                fs::rename(&source, &destination).map_err(|error| match error.kind() {
                    ErrorKind::NotFound => FileOpsError::not_found(from),
                    _ => FileOpsError::io("renaming", from, error),
                })
            }
        }
    }

    fn write_shell(&self, path: &str, content: &str) -> Result<WriteResult, FileOpsError> {
        let quoted = shell_path(path);
        let mut script = String::new();
        if let Some(parent) = parent_of(path) {
            let parent = shell_path(parent);
            script.push_str(&format!(
                "if [ ! -d {parent} ]; then mkdir -p {parent} && echo {DIRS_CREATED_MARKER}; fi && "
            ));
        }
        script.push_str(&format!("cat > {quoted} && wc -c < {quoted}"));

        let output = self.run_shell("write", &script, Some(content), self.command_timeout())?;
        if output.returncode != 0 {
            return Err(FileOpsError::CommandFailed {
                operation: "write",
                code: output.returncode,
                output: output.output,
            });
        }

        let dirs_created = output.output.contains(DIRS_CREATED_MARKER);
        let bytes_written = output
            .output
            .lines()
            .rev()
            .find_map(|line| line.trim().parse().ok())
            .unwrap_or(content.len() as u64);
        Ok(WriteResult {
            bytes_written,
            dirs_created,
        })
    }

    fn write_native(&self, path: &str, content: &str) -> Result<WriteResult, FileOpsError> {
        let target = self.resolve_native(path);
        let mut dirs_created = false;
        if let Some(parent) = target.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            if !parent.is_dir() {
                fs::create_dir_all(parent)
                    .map_err(|error| FileOpsError::io("creating directories for", path, error))?;
                dirs_created = true;
            }
        }
        fs::write(&target, content).map_err(|error| FileOpsError::io("writing", path, error))?;
        let bytes_written = fs::metadata(&target)
            .map(|metadata| metadata.len())
            .unwrap_or(content.len() as u64);
        Ok(WriteResult {
            bytes_written,
            dirs_created,
        })
    }
}

fn expect_success(operation: &'static str, code: i32, output: String) -> Result<(), FileOpsError> {
    if code == 0 {
        Ok(())
    } else {
        Err(FileOpsError::CommandFailed {
            operation,
            code,
            output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_of_skips_bare_names() {
        assert_eq!(parent_of("notes.txt"), None);
        assert_eq!(parent_of("a/b/notes.txt"), Some("a/b"));
        assert_eq!(parent_of("/abs.txt"), Some("/"));
    }
}
