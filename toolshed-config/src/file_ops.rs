use std::path::PathBuf;

use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};

/// `[read]` section: pagination and binary sniffing limits.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ReadConfig {
    /// Hard cap on lines returned by one read.
    #[serde(default = "ReadConfig::default_max_lines")]
    pub max_lines: usize,
    /// Lines longer than this many characters are cut with a marker.
    #[serde(default = "ReadConfig::default_max_line_length")]
    pub max_line_length: usize,
    /// Lines returned when the caller gives no limit.
    #[serde(default = "ReadConfig::default_limit")]
    pub default_limit: usize,
    /// Bytes sampled from the head of a file to decide whether it is binary.
    #[serde(default = "ReadConfig::default_binary_sample_bytes")]
    pub binary_sample_bytes: usize,
}

impl Default for ReadConfig {
    fn default() -> Self {
        Self {
            max_lines: Self::default_max_lines(),
            max_line_length: Self::default_max_line_length(),
            default_limit: Self::default_limit(),
            binary_sample_bytes: Self::default_binary_sample_bytes(),
        }
    }
}

impl ReadConfig {
    const fn default_max_lines() -> usize {
        2_000
    }

    const fn default_max_line_length() -> usize {
        2_000
    }

    const fn default_limit() -> usize {
        500
    }

    const fn default_binary_sample_bytes() -> usize {
        1_000
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.max_lines > 0, "read.max_lines must be at least 1");
        ensure!(
            self.max_line_length > 0,
            "read.max_line_length must be at least 1"
        );
        ensure!(
            self.default_limit > 0 && self.default_limit <= self.max_lines,
            "read.default_limit must be between 1 and read.max_lines"
        );
        ensure!(
            self.binary_sample_bytes > 0,
            "read.binary_sample_bytes must be at least 1"
        );
        Ok(())
    }
}

/// `[search]` section.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SearchConfig {
    #[serde(default = "SearchConfig::default_limit")]
    pub default_limit: usize,
    /// Characters of matched line text kept per result.
    #[serde(default = "SearchConfig::default_max_match_chars")]
    pub max_match_chars: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: Self::default_limit(),
            max_match_chars: Self::default_max_match_chars(),
        }
    }
}

impl SearchConfig {
    const fn default_limit() -> usize {
        50
    }

    const fn default_max_match_chars() -> usize {
        500
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.default_limit > 0,
            "search.default_limit must be at least 1"
        );
        ensure!(
            self.max_match_chars > 0,
            "search.max_match_chars must be at least 1"
        );
        Ok(())
    }
}

/// `[workspace]` section.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct WorkspaceConfig {
    /// Working directory used when neither the caller nor the backend supplies one.
    #[serde(default)]
    pub default_cwd: Option<PathBuf>,
    /// Extra roots searched for similarly named files and for relative paths
    /// on the native strategy.
    #[serde(default = "WorkspaceConfig::default_fallback_roots")]
    pub fallback_roots: Vec<PathBuf>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            default_cwd: None,
            fallback_roots: Self::default_fallback_roots(),
        }
    }
}

impl WorkspaceConfig {
    fn default_fallback_roots() -> Vec<PathBuf> {
        match dirs::home_dir() {
            Some(home) => {
                let base = home.join(".toolshed");
                vec![base.join("workspace"), base]
            }
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_defaults_match_documented_limits() {
        let config = ReadConfig::default();
        assert_eq!(config.max_lines, 2_000);
        assert_eq!(config.max_line_length, 2_000);
        assert_eq!(config.default_limit, 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn default_limit_cannot_exceed_cap() {
        let config = ReadConfig {
            default_limit: 5_000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn fallback_roots_live_under_home() {
        let roots = WorkspaceConfig::default().fallback_roots;
        if let Some(home) = dirs::home_dir() {
            assert_eq!(roots.len(), 2);
            assert!(roots.iter().all(|root| root.starts_with(&home)));
        }
    }
}
