use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::search::is_vcs_dir;
use super::{FileOperations, Strategy, shell_path};
use crate::error::FileOpsError;

const MAX_SIBLINGS: usize = 5;
const MAX_SCANNED: usize = 8;
const SCAN_DEPTH: usize = 4;

/// Share of the requested name's characters a sibling must contain.
fn overlap_score(requested: &str, candidate: &str) -> Option<usize> {
    let wanted: HashSet<char> = requested.to_lowercase().chars().collect();
    let have: HashSet<char> = candidate.to_lowercase().chars().collect();
    let common = wanted.intersection(&have).count();
    let needed = requested.chars().count();
    (needed > 0 && common * 2 >= needed).then_some(common)
}

fn rank_siblings(requested: &str, dir: &str, names: impl Iterator<Item = String>) -> Vec<String> {
    let mut scored: Vec<(usize, String)> = names
        .filter(|name| name != requested)
        .filter_map(|name| overlap_score(requested, &name).map(|score| (score, name)))
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    scored
        .into_iter()
        .take(MAX_SIBLINGS)
        .map(|(_, name)| {
            if dir.is_empty() {
                name
            } else {
                format!("{}/{name}", dir.trim_end_matches('/'))
            }
        })
        .collect()
}

fn split_path(path: &str) -> (&str, &str) {
    let as_path = Path::new(path);
    let name = as_path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(path);
    let dir = as_path
        .parent()
        .and_then(Path::to_str)
        .unwrap_or_default();
    (dir, name)
}

fn stem_of(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(name)
        .to_lowercase()
}

impl FileOperations {
    /// `NotFound` for `path`, with similarly named files when any exist.
    pub(crate) fn not_found(&self, path: &str) -> FileOpsError {
        let (dir, name) = split_path(path);
        let mut similar_files = self.similar_siblings(dir, name);
        if similar_files.is_empty() {
            similar_files = self.scan_roots(&stem_of(name));
        }

        let hint = (!similar_files.is_empty()).then(|| {
            let listing = similar_files
                .iter()
                .map(|file| format!("  - {file}"))
                .collect::<Vec<_>>()
                .join("\n");
            format!("Closest existing files:\n{listing}")
        });
        FileOpsError::NotFound {
            path: path.to_string(),
            similar_files,
            hint,
        }
    }

    fn similar_siblings(&self, dir: &str, name: &str) -> Vec<String> {
        let names: Vec<String> = match self.strategy {
            Strategy::Shell => {
                let listing_dir = if dir.is_empty() { "." } else { dir };
                self.run_shell(
                    "suggest",
                    &format!("ls -1A {} 2>/dev/null | head -n 200", shell_path(listing_dir)),
                    None,
                    self.command_timeout(),
                )
                .map(|output| output.output.lines().map(str::to_string).collect())
                .unwrap_or_default()
            }
            Strategy::Native => {
                let base = if dir.is_empty() {
                    self.native_base()
                } else {
                    self.resolve_native(dir)
                };
                fs::read_dir(base)
                    .map(|entries| {
                        entries
                            .filter_map(Result::ok)
                            .map(|entry| entry.file_name().to_string_lossy().into_owned())
                            .collect()
                    })
                    .unwrap_or_default()
            }
        };
        rank_siblings(name, dir, names.into_iter())
    }

    fn scan_roots(&self, stem: &str) -> Vec<String> {
        if stem.is_empty() {
            return Vec::new();
        }
        let base = self.native_base();
        let mut roots: Vec<PathBuf> = Vec::new();
        if self.strategy == Strategy::Shell {
            roots.push(PathBuf::from("."));
            roots.push(PathBuf::from("workspace"));
        } else {
            roots.push(base.clone());
            roots.push(base.join("workspace"));
        }
        roots.extend(self.config.workspace.fallback_roots.iter().cloned());

        match self.strategy {
            Strategy::Shell => {
                let quoted_roots = roots
                    .iter()
                    .map(|root| shell_path(&root.to_string_lossy()))
                    .collect::<Vec<_>>()
                    .join(" ");
                let pattern = shell_path(&format!("*{stem}*"));
                self.run_shell(
                    "suggest",
                    &format!(
                        "find {quoted_roots} -maxdepth {SCAN_DEPTH} -type f -iname {pattern} -not -path '*/.git/*' 2>/dev/null | head -n {MAX_SCANNED}"
                    ),
                    None,
                    self.config.timeouts.search(),
                )
                .map(|output| output.output.lines().map(str::to_string).collect())
                .unwrap_or_default()
            }
            Strategy::Native => {
                let mut found = Vec::new();
                for root in roots.iter().filter(|root| root.is_dir()) {
                    let walker = WalkDir::new(root)
                        .max_depth(SCAN_DEPTH)
                        .sort_by_file_name()
                        .into_iter()
                        .filter_entry(|entry| !is_vcs_dir(entry));
                    for entry in walker.filter_map(Result::ok) {
                        if !entry.file_type().is_file() {
                            continue;
                        }
                        let candidate = entry.file_name().to_string_lossy();
                        if stem_of(&candidate).contains(stem) {
                            let display = entry.path().to_string_lossy().into_owned();
                            if !found.contains(&display) {
                                found.push(display);
                            }
                        }
                        if found.len() >= MAX_SCANNED {
                            return found;
                        }
                    }
                }
                found
            }
        }
    }
}
