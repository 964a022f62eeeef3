//! Well-known filesystem locations for policy targets.
//!
//! Every location honors a `GP_*` environment override so tests and packaging
//! can redirect writes away from the live system.

use std::path::PathBuf;

/// GSettings schema directory holding compiled schemas and override files.
///
/// Uses `GP_SCHEMA_DIR` if set, otherwise `/usr/share/glib-2.0/schemas`.
pub fn schema_dir() -> PathBuf {
    env_dir("GP_SCHEMA_DIR").unwrap_or_else(|| PathBuf::from("/usr/share/glib-2.0/schemas"))
}

/// System-wide ini configuration directory.
///
/// Uses `GP_XDG_SYSTEM_DIR` if set, otherwise `/etc/xdg`.
pub fn xdg_system_dir() -> PathBuf {
    env_dir("GP_XDG_SYSTEM_DIR").unwrap_or_else(|| PathBuf::from("/etc/xdg"))
}

/// Home directory for the named account.
///
/// Uses `GP_HOME_DIR` if set (tests), the session home when the name matches
/// the current user, `/home/<name>` otherwise.
pub fn home_dir(username: &str) -> PathBuf {
    if let Some(dir) = env_dir("GP_HOME_DIR") {
        return dir;
    }
    if std::env::var("USER").is_ok_and(|u| u == username)
        && let Some(home) = dirs::home_dir()
    {
        return home;
    }
    PathBuf::from("/home").join(username)
}

/// Per-user ini configuration directory (`~/.config`).
pub fn user_config_dir(username: &str) -> PathBuf {
    home_dir(username).join(".config")
}

/// Base directory for cached remote files.
///
/// Uses `GP_DATA_DIR` if set, otherwise `$XDG_DATA_HOME/gpapply` or
/// `~/.local/share/gpapply`.
pub(crate) fn data_dir() -> PathBuf {
    if let Some(dir) = env_dir("GP_DATA_DIR") {
        return dir;
    }

    std::env::var("XDG_DATA_HOME")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join(".local")
                .join("share")
        })
        .join("gpapply")
}

/// File cache directory.
pub fn cache_dir() -> PathBuf {
    data_dir().join("cache")
}

/// Base directory for configuration files.
///
/// Uses `GP_CONFIG_DIR` if set, otherwise `$XDG_CONFIG_HOME/gpapply` or
/// `~/.config/gpapply`.
pub(crate) fn config_dir() -> PathBuf {
    if let Some(dir) = env_dir("GP_CONFIG_DIR") {
        return dir;
    }

    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join(".config")
        })
        .join("gpapply")
}

fn env_dir(var: &str) -> Option<PathBuf> {
    std::env::var(var)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
}
