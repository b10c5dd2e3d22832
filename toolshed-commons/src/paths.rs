use std::path::{Path, PathBuf};

use path_clean::PathClean;
use tracing::debug;

/// Well-known Windows roots tried after the requested directory and the home
/// directory have been rejected.
const WINDOWS_FALLBACK_DIRS: [&str; 3] = ["C:\\", "C:\\Users", "."];

/// Normalize a path by resolving `.` and `..` components lexically.
pub fn normalize_path(path: &Path) -> PathBuf {
    path.clean()
}

/// Expand a leading `~` into the current user's home directory.
///
/// Paths of the form `~user/...` are returned unchanged; only the caller's
/// own home is known without a shell round-trip.
pub fn expand_home(path: &str) -> PathBuf {
    let Some(rest) = path.strip_prefix('~') else {
        return PathBuf::from(path);
    };
    if !(rest.is_empty() || rest.starts_with('/') || rest.starts_with('\\')) {
        return PathBuf::from(path);
    }
    match dirs::home_dir() {
        Some(home) => {
            let tail = rest.trim_start_matches(['/', '\\']);
            if tail.is_empty() {
                home
            } else {
                home.join(tail)
            }
        }
        None => PathBuf::from(path),
    }
}

/// Make a path absolute against `base` and clean it lexically.
pub fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize_path(path)
    } else {
        normalize_path(&base.join(path))
    }
}

/// Split `C:\rest` / `C:/rest` / `C:` into the drive letter and the remainder
/// with leading separators removed.
fn split_drive(path: &str) -> Option<(char, &str)> {
    let mut chars = path.chars();
    let drive = chars.next().filter(char::is_ascii_alphabetic)?;
    if chars.next() != Some(':') {
        return None;
    }
    let rest = path.get(2..)?;
    Some((drive, rest.trim_start_matches(['\\', '/'])))
}

/// Convert a Windows drive path (`C:\work\repo`) to the Linux-subsystem mount
/// form (`/mnt/c/work/repo`). Paths already under `/mnt/` and paths without a
/// drive letter only get their separators flipped.
pub fn to_wsl_path(path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }
    let forward = path.replace('\\', "/");
    if forward.starts_with("/mnt/") {
        return forward;
    }
    match split_drive(path) {
        Some((drive, rest)) => {
            let drive = drive.to_ascii_lowercase();
            let rest = rest.replace('\\', "/");
            if rest.is_empty() {
                format!("/mnt/{drive}")
            } else {
                format!("/mnt/{drive}/{rest}")
            }
        }
        None => forward,
    }
}

/// Convert a Linux-subsystem mount path (`/mnt/c/work`) back to a Windows drive
/// path (`C:\work`). Anything else is returned unchanged.
pub fn to_windows_path(path: &str) -> String {
    let forward = path.replace('\\', "/");
    let Some(after_mnt) = forward.strip_prefix("/mnt/") else {
        return path.to_string();
    };
    let mut parts = after_mnt.splitn(2, '/');
    let drive = match parts.next() {
        Some(segment) if segment.len() == 1 => match segment.chars().next() {
            Some(letter) if letter.is_ascii_alphabetic() => letter.to_ascii_uppercase(),
            _ => return path.to_string(),
        },
        _ => return path.to_string(),
    };
    let rest = parts.next().unwrap_or_default().replace('/', "\\");
    format!("{drive}:\\{rest}")
}

/// Return a path that can be embedded between quotes for `cmd.exe` or as a
/// PowerShell `-LiteralPath` argument.
///
/// A trailing backslash would escape the closing quote, so trailing separators
/// are stripped. Drive roots keep exactly one backslash (`C:\`).
pub fn windows_path_safe_for_quotes(path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }
    if let Some((drive, rest)) = split_drive(path) {
        if rest.is_empty() {
            return format!("{drive}:\\");
        }
    }
    let trimmed = path.trim_end_matches(['\\', '/']);
    if trimmed.is_empty() {
        path.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Resolve a working directory that exists before a Windows process is
/// launched.
///
/// Order: requested dir (home-expanded, absolute) → home → `C:\` →
/// `C:\Users` → `.` → process current dir.
pub fn safe_working_dir(requested: Option<&str>) -> PathBuf {
    safe_working_dir_with(requested, dirs::home_dir(), |candidate| candidate.is_dir())
}

/// Same as [`safe_working_dir`] with the home directory and the directory
/// predicate supplied by the caller.
pub fn safe_working_dir_with<F>(requested: Option<&str>, home: Option<PathBuf>, is_dir: F) -> PathBuf
where
    F: Fn(&Path) -> bool,
{
    let current = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    if let Some(requested) = requested.filter(|value| !value.trim().is_empty()) {
        let resolved = absolutize(&expand_home(requested.trim()), &current);
        if is_dir(&resolved) {
            return resolved;
        }
        debug!(
            target: "toolshed.paths",
            requested = %resolved.display(),
            "requested working directory is missing; falling back"
        );
    }

    if let Some(home) = home.filter(|home| is_dir(home)) {
        return home;
    }

    for fallback in WINDOWS_FALLBACK_DIRS {
        let candidate = Path::new(fallback);
        if is_dir(candidate) {
            return absolutize(candidate, &current);
        }
    }

    current
}
