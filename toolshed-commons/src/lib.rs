//! Path helpers shared by the toolshed crates.
//!
//! Everything here is pure string/path manipulation apart from
//! [`paths::safe_working_dir`], which checks the filesystem for the first
//! directory in its fallback chain that exists.

pub mod paths;

pub use paths::{
    absolutize, expand_home, normalize_path, safe_working_dir, safe_working_dir_with,
    to_windows_path, to_wsl_path, windows_path_safe_for_quotes,
};
