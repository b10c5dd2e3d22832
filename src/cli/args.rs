use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use toolshed_core::{OutputMode, Strategy};

#[derive(Debug, Parser)]
#[command(name = "toolshed")]
#[command(about = "Run commands and edit files the way a coding agent does")]
#[command(version)]
pub struct Cli {
    /// Workspace root used for config discovery and as the default working directory
    #[arg(long, global = true, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// Load configuration from this file instead of the default locations
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Force how file operations reach the filesystem
    #[arg(long, global = true, value_enum)]
    pub strategy: Option<StrategyArg>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a shell command through the platform shell
    ///
    /// Examples:
    ///   toolshed exec "ls -la"
    ///   echo data | toolshed exec --stdin "wc -c"
    Exec {
        /// Command line to run
        command: String,

        /// Working directory (defaults to the workspace)
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Forward this process's stdin to the command
        #[arg(long)]
        stdin: bool,
    },

    /// Read a file with line numbers
    Read {
        path: String,

        /// First line to show (1-based)
        #[arg(long)]
        offset: Option<usize>,

        /// Maximum number of lines
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Write a file, creating parent directories
    ///
    /// Content comes from --content or, when absent, from stdin.
    Write {
        path: String,

        #[arg(long)]
        content: Option<String>,
    },

    /// Search file contents or file names
    Search {
        /// Regex for content search, or a name glob with --files
        pattern: String,

        /// Directory to search
        #[arg(long, default_value = ".")]
        path: String,

        /// Match file names instead of contents
        #[arg(long)]
        files: bool,

        /// Only search files whose names match this glob
        #[arg(long)]
        glob: Option<String>,

        #[arg(long, value_enum, default_value_t = ModeArg::Content)]
        mode: ModeArg,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Lines of context around each content match
        #[arg(short = 'C', long, default_value_t = 0)]
        context: usize,
    },

    /// Replace text in one file, tolerating whitespace differences
    Replace {
        path: String,

        #[arg(long)]
        old: String,

        #[arg(long)]
        new: String,

        /// Replace every occurrence instead of requiring a unique match
        #[arg(long)]
        all: bool,
    },

    /// Apply a structured patch document
    ///
    /// Reads the document from FILE, or from stdin when FILE is absent.
    Patch {
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Show which shell commands would run through on this host
    ShellMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    Shell,
    Native,
}

impl From<StrategyArg> for Strategy {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::Shell => Self::Shell,
            StrategyArg::Native => Self::Native,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Content,
    FilesOnly,
    Count,
}

impl From<ModeArg> for OutputMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Content => Self::Content,
            ModeArg::FilesOnly => Self::FilesOnly,
            ModeArg::Count => Self::Count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from([
            "toolshed",
            "search",
            "todo",
            "--mode",
            "files-only",
            "--workspace",
            "/tmp/ws",
        ])
        .unwrap();
        assert_eq!(cli.workspace, Some(PathBuf::from("/tmp/ws")));
        match cli.command {
            Commands::Search { mode, files, .. } => {
                assert_eq!(mode, ModeArg::FilesOnly);
                assert!(!files);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
