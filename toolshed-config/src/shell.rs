use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::warn;

/// Environment variable consulted on every shell-mode decision.
pub const DEFAULT_OVERRIDE_ENV: &str = "TOOLSHED_WINDOWS_SHELL";

/// Requested Windows shell flavour. Ignored on non-Windows hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShellOverride {
    #[default]
    Auto,
    Wsl,
    PowerShell,
    Cmd,
}

impl ShellOverride {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Wsl => "wsl",
            Self::PowerShell => "powershell",
            Self::Cmd => "cmd",
        }
    }

    /// Parse a user-supplied value, treating anything unrecognised as `auto`.
    pub fn parse_lenient(value: &str) -> Self {
        value.parse().unwrap_or_else(|_| {
            warn!(
                target: "toolshed.config",
                value,
                "unrecognised windows shell override; using auto"
            );
            Self::Auto
        })
    }
}

impl FromStr for ShellOverride {
    type Err = UnknownShellOverride;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(Self::Auto),
            "wsl" => Ok(Self::Wsl),
            "powershell" | "pwsh" => Ok(Self::PowerShell),
            "cmd" | "cmd.exe" => Ok(Self::Cmd),
            _ => Err(UnknownShellOverride(value.to_string())),
        }
    }
}

impl fmt::Display for ShellOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownShellOverride(pub String);

impl fmt::Display for UnknownShellOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown windows shell '{}' (expected auto, wsl, powershell, pwsh, cmd or cmd.exe)",
            self.0
        )
    }
}

impl std::error::Error for UnknownShellOverride {}

impl Serialize for ShellOverride {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ShellOverride {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse_lenient(&raw))
    }
}

/// `[shell]` section.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ShellConfig {
    /// Fallback override used when the environment variable is unset.
    #[serde(default)]
    pub windows_shell: ShellOverride,
    /// Name of the environment variable that overrides `windows_shell`.
    #[serde(default = "ShellConfig::default_override_env")]
    pub override_env: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            windows_shell: ShellOverride::default(),
            override_env: Self::default_override_env(),
        }
    }
}

impl ShellConfig {
    fn default_override_env() -> String {
        DEFAULT_OVERRIDE_ENV.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_documented_value() {
        assert_eq!("auto".parse::<ShellOverride>(), Ok(ShellOverride::Auto));
        assert_eq!("WSL".parse::<ShellOverride>(), Ok(ShellOverride::Wsl));
        assert_eq!(
            " powershell ".parse::<ShellOverride>(),
            Ok(ShellOverride::PowerShell)
        );
        assert_eq!("pwsh".parse::<ShellOverride>(), Ok(ShellOverride::PowerShell));
        assert_eq!("cmd".parse::<ShellOverride>(), Ok(ShellOverride::Cmd));
        assert_eq!("cmd.exe".parse::<ShellOverride>(), Ok(ShellOverride::Cmd));
        assert!("bash".parse::<ShellOverride>().is_err());
    }

    #[test]
    fn lenient_parse_defaults_to_auto() {
        assert_eq!(ShellOverride::parse_lenient("fish"), ShellOverride::Auto);
        assert_eq!(ShellOverride::parse_lenient("Cmd.EXE"), ShellOverride::Cmd);
    }

    #[test]
    fn deserializes_from_toml() {
        let config: ShellConfig = toml::from_str("windows_shell = \"pwsh\"").unwrap();
        assert_eq!(config.windows_shell, ShellOverride::PowerShell);
        assert_eq!(config.override_env, DEFAULT_OVERRIDE_ENV);
    }
}
