use anyhow::Result;
use assert_fs::TempDir;
use assert_fs::prelude::*;
use pretty_assertions::assert_eq;
use serial_test::serial;
use toolshed_config::{ConfigLayer, ConfigManager, ShellOverride};

fn clear_env() {
    // SAFETY: every test touching these variables is #[serial].
    unsafe {
        std::env::remove_var("TOOLSHED_COMMAND_TIMEOUT");
        std::env::remove_var("TOOLSHED_CWD");
        std::env::remove_var("TOOLSHED_CONFIG_PATH");
    }
}

#[test]
#[serial]
fn defaults_apply_without_any_file() -> Result<()> {
    clear_env();
    let workspace = TempDir::new()?;

    let manager = ConfigManager::load_with_home(workspace.path(), None)?;
    let config = manager.config();

    assert_eq!(config.shell.windows_shell, ShellOverride::Auto);
    assert_eq!(config.timeouts.command_seconds, 180);
    assert_eq!(config.read.default_limit, 500);
    assert_eq!(config.search.default_limit, 50);
    assert!(manager.layers().is_empty());
    assert_eq!(manager.default_cwd(), workspace.path());
    Ok(())
}

#[test]
#[serial]
fn workspace_file_overrides_dot_directory_file() -> Result<()> {
    clear_env();
    let workspace = TempDir::new()?;
    workspace
        .child(".toolshed/toolshed.toml")
        .write_str("[timeouts]\ncommand_seconds = 30\nlint_seconds = 7\n")?;
    workspace
        .child("toolshed.toml")
        .write_str("[timeouts]\ncommand_seconds = 45\n\n[shell]\nwindows_shell = \"cmd.exe\"\n")?;

    let manager = ConfigManager::load_with_home(workspace.path(), None)?;
    let config = manager.config();

    assert_eq!(config.timeouts.command_seconds, 45);
    assert_eq!(config.timeouts.lint_seconds, 7);
    assert_eq!(config.shell.windows_shell, ShellOverride::Cmd);
    assert_eq!(manager.layers().len(), 2);
    Ok(())
}

#[test]
#[serial]
fn user_layer_has_lowest_precedence() -> Result<()> {
    clear_env();
    let home = TempDir::new()?;
    let workspace = TempDir::new()?;
    home.child(".toolshed/toolshed.toml")
        .write_str("[search]\ndefault_limit = 10\n\n[read]\ndefault_limit = 100\n")?;
    workspace
        .child("toolshed.toml")
        .write_str("[search]\ndefault_limit = 20\n")?;

    let manager = ConfigManager::load_with_home(workspace.path(), Some(home.path()))?;

    assert_eq!(manager.config().search.default_limit, 20);
    assert_eq!(manager.config().read.default_limit, 100);
    assert!(matches!(manager.layers().first(), Some(ConfigLayer::User(_))));
    Ok(())
}

#[test]
#[serial]
fn environment_overrides_win_over_files() -> Result<()> {
    clear_env();
    let workspace = TempDir::new()?;
    workspace
        .child("toolshed.toml")
        .write_str("[timeouts]\ncommand_seconds = 45\n")?;
    // SAFETY: serialized with the other env-mutating tests.
    unsafe {
        std::env::set_var("TOOLSHED_COMMAND_TIMEOUT", "12");
        std::env::set_var("TOOLSHED_CWD", "/srv/agent");
    }

    let manager = ConfigManager::load_with_home(workspace.path(), None);
    clear_env();
    let manager = manager?;

    assert_eq!(manager.config().timeouts.command_seconds, 12);
    assert_eq!(manager.default_cwd(), std::path::PathBuf::from("/srv/agent"));
    assert!(
        manager
            .layers()
            .contains(&ConfigLayer::Environment("TOOLSHED_COMMAND_TIMEOUT"))
    );
    Ok(())
}

#[test]
#[serial]
fn invalid_timeout_env_is_ignored() -> Result<()> {
    clear_env();
    let workspace = TempDir::new()?;
    // SAFETY: serialized with the other env-mutating tests.
    unsafe {
        std::env::set_var("TOOLSHED_COMMAND_TIMEOUT", "soon");
    }

    let manager = ConfigManager::load_with_home(workspace.path(), None);
    clear_env();

    assert_eq!(manager?.config().timeouts.command_seconds, 180);
    Ok(())
}

#[test]
#[serial]
fn invalid_values_fail_validation() -> Result<()> {
    clear_env();
    let workspace = TempDir::new()?;
    workspace
        .child("toolshed.toml")
        .write_str("[timeouts]\npoll_interval_ms = 5000\n")?;

    let error = ConfigManager::load_with_home(workspace.path(), None).unwrap_err();
    assert!(format!("{error:#}").contains("poll_interval_ms"));
    Ok(())
}

#[test]
#[serial]
fn explicit_file_must_exist() -> Result<()> {
    clear_env();
    let workspace = TempDir::new()?;
    let missing = workspace.path().join("nope.toml");

    let error = ConfigManager::load_from_file(&missing, workspace.path()).unwrap_err();
    assert!(error.to_string().contains("does not exist"));
    Ok(())
}

#[test]
#[serial]
fn unknown_shell_value_falls_back_to_auto() -> Result<()> {
    clear_env();
    let workspace = TempDir::new()?;
    workspace
        .child("toolshed.toml")
        .write_str("[shell]\nwindows_shell = \"fish\"\n")?;

    let manager = ConfigManager::load_with_home(workspace.path(), None)?;
    assert_eq!(manager.config().shell.windows_shell, ShellOverride::Auto);
    Ok(())
}
