//! Group Policy Template resolution.
//!
//! A [`Gpt`] locates the machine and user parts of one policy tree on disk,
//! determines whether user-scope settings may be honored at all (the
//! `UserPolicyMode` gate), and merges decoded entries into a [`PolicyStore`].

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::decode::{PolicyDecoder, ShortcutDecoder};
use crate::store::PolicyStore;

const USER_POLICY_MODE_KEY: &str = r"Software\Policies\Microsoft\Windows\System\UserPolicyMode";
const REGISTRY_POLICY_FILE: &str = "registry.json";
const SHORTCUTS_FILE: &str = "shortcuts.json";

#[derive(Error, Debug)]
pub enum GptError {
    #[error("policy tree not found at {0}")]
    TreeNotFound(PathBuf),

    #[error("failed to scan policy tree {path}: {source}")]
    Scan {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// One policy tree, scanned and ready to merge.
#[derive(Debug)]
pub struct Gpt {
    guid: String,
    name: String,
    machine_path: Option<PathBuf>,
    user_path: Option<PathBuf>,
    machine_regpol: Option<PathBuf>,
    user_regpol: Option<PathBuf>,
    machine_shortcuts: Option<PathBuf>,
    user_shortcuts: Option<PathBuf>,
    user_policy_mode: u32,
}

impl Gpt {
    /// Scan a policy tree root. A missing root is fatal to the caller;
    /// missing machine/user parts are not.
    pub fn open(root: &Path, decoder: &dyn PolicyDecoder) -> Result<Self, GptError> {
        if !root.is_dir() {
            return Err(GptError::TreeNotFound(root.to_path_buf()));
        }

        let guid = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let guid = if guid == "default" {
            "Local Policy".to_string()
        } else {
            guid
        };

        let machine_path = find_dir(root, "machine")?;
        let user_path = find_dir(root, "user")?;

        tracing::debug!(guid = %guid, "looking for machine part of GPT");
        let machine_regpol = machine_path
            .as_deref()
            .and_then(|dir| find_file(dir, REGISTRY_POLICY_FILE));
        let machine_shortcuts = machine_path
            .as_deref()
            .and_then(|dir| find_file(&shortcuts_dir(dir), SHORTCUTS_FILE));

        tracing::debug!(guid = %guid, "looking for user part of GPT");
        let user_regpol = user_path
            .as_deref()
            .and_then(|dir| find_file(dir, REGISTRY_POLICY_FILE));
        let user_shortcuts = user_path
            .as_deref()
            .and_then(|dir| find_file(&shortcuts_dir(dir), SHORTCUTS_FILE));

        let user_policy_mode = read_policy_mode(machine_regpol.as_deref(), decoder);

        Ok(Self {
            guid,
            name: String::new(),
            machine_path,
            user_path,
            machine_regpol,
            user_regpol,
            machine_shortcuts,
            user_shortcuts,
            user_policy_mode,
        })
    }

    /// Set human-readable GPT name.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn guid(&self) -> &str {
        &self.guid
    }

    /// `UserPolicyMode` gate value. `0` when absent or undecodable.
    pub fn user_policy_mode(&self) -> u32 {
        self.user_policy_mode
    }

    /// Merge machine and user (if `sid` provided) settings into the store.
    ///
    /// A scope whose policy file is missing or fails to decode contributes
    /// no entries; that is not an error.
    pub fn merge(
        &self,
        store: &mut PolicyStore,
        decoder: &dyn PolicyDecoder,
        shortcut_decoder: &dyn ShortcutDecoder,
        sid: Option<&str>,
    ) {
        if let Some(regpol) = &self.machine_regpol {
            tracing::debug!(path = %regpol.display(), "merging machine settings");
            match decoder.decode(regpol) {
                Ok(entries) => {
                    for entry in entries {
                        store.add_machine_entry(entry);
                    }
                }
                Err(e) => tracing::debug!(error = %e, "machine policy file skipped"),
            }
        }

        let Some(sid) = sid else {
            return;
        };

        // UserPolicyMode 2 and above is a deliberate administrative override
        // that suppresses the whole user scope.
        if self.user_policy_mode < 2 {
            if let Some(regpol) = &self.user_regpol {
                tracing::debug!(path = %regpol.display(), sid, "merging user settings");
                match decoder.decode(regpol) {
                    Ok(entries) => {
                        for entry in entries {
                            store.add_user_entry(sid, entry);
                        }
                    }
                    Err(e) => tracing::debug!(error = %e, "user policy file skipped"),
                }
            }
        } else {
            tracing::debug!(
                mode = self.user_policy_mode,
                sid,
                "user policy merging suppressed by UserPolicyMode"
            );
        }

        // Shortcuts merge independently of the policy mode.
        if let Some(shortcuts) = &self.machine_shortcuts {
            tracing::debug!(sid, "merging shortcuts");
            match shortcut_decoder.decode(shortcuts) {
                Ok(links) => {
                    for link in links {
                        store.add_shortcut(sid, link);
                    }
                }
                Err(e) => tracing::debug!(error = %e, "shortcuts file skipped"),
            }
        }
    }
}

impl fmt::Display for Gpt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "GUID: {}", self.guid)?;
        writeln!(f, "Name: {}", self.name)?;
        writeln!(f, "Machine part: {:?}", self.machine_path)?;
        writeln!(f, "Machine policy: {:?}", self.machine_regpol)?;
        writeln!(f, "Machine shortcuts: {:?}", self.machine_shortcuts)?;
        writeln!(f, "User part: {:?}", self.user_path)?;
        writeln!(f, "User policy: {:?}", self.user_regpol)?;
        writeln!(f, "User shortcuts: {:?}", self.user_shortcuts)?;
        write!(f, "UserPolicyMode: {}", self.user_policy_mode)
    }
}

fn shortcuts_dir(part: &Path) -> PathBuf {
    part.join("Preferences").join("Shortcuts")
}

/// Case-insensitive subdirectory search.
fn find_dir(root: &Path, name: &str) -> Result<Option<PathBuf>, GptError> {
    let entries = fs::read_dir(root).map_err(|source| GptError::Scan {
        path: root.to_path_buf(),
        source,
    })?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() && entry.file_name().to_string_lossy().eq_ignore_ascii_case(name) {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

/// Case-insensitive file search in a directory; first match wins. Absence
/// (including an unreadable directory) is not an error.
fn find_file(search_path: &Path, name: &str) -> Option<PathBuf> {
    let entries = match fs::read_dir(search_path) {
        Ok(entries) => entries,
        Err(e) => {
            if search_path.exists() {
                tracing::error!(path = %search_path.display(), error = %e, "directory scan failed");
            }
            return None;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file() && entry.file_name().to_string_lossy().eq_ignore_ascii_case(name) {
            return Some(path);
        }
    }
    None
}

fn read_policy_mode(machine_regpol: Option<&Path>, decoder: &dyn PolicyDecoder) -> u32 {
    let Some(regpol) = machine_regpol else {
        return 0;
    };
    let entries = match decoder.decode(regpol) {
        Ok(entries) => entries,
        Err(_) => return 0,
    };
    entries
        .iter()
        .find(|entry| entry.full_key() == USER_POLICY_MODE_KEY)
        .and_then(|entry| entry.value.as_str())
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{JsonPolicyDecoder, JsonShortcutDecoder};
    use std::fs;

    fn write_machine_policy(root: &Path, json: &str) {
        let machine = root.join("Machine");
        fs::create_dir_all(&machine).expect("mkdir");
        fs::write(machine.join("Registry.json"), json).expect("write");
    }

    fn write_user_policy(root: &Path, json: &str) {
        let user = root.join("USER");
        fs::create_dir_all(&user).expect("mkdir");
        fs::write(user.join("registry.json"), json).expect("write");
    }

    const USER_ENTRY: &str = r#"[{"key_path": "U", "value_name": "x", "value": "1"}]"#;

    #[test]
    fn missing_root_is_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = Gpt::open(&dir.path().join("nope"), &JsonPolicyDecoder).unwrap_err();
        assert!(matches!(err, GptError::TreeNotFound(_)));
    }

    #[test]
    fn discovery_is_case_insensitive() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_machine_policy(dir.path(), "[]");
        write_user_policy(dir.path(), "[]");

        let gpt = Gpt::open(dir.path(), &JsonPolicyDecoder).expect("open");
        assert!(gpt.machine_regpol.is_some());
        assert!(gpt.user_regpol.is_some());
        assert!(gpt.machine_shortcuts.is_none());
    }

    #[test]
    fn policy_mode_defaults_to_zero() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_machine_policy(dir.path(), "[]");

        let gpt = Gpt::open(dir.path(), &JsonPolicyDecoder).expect("open");
        assert_eq!(gpt.user_policy_mode(), 0);
    }

    #[test]
    fn policy_mode_two_suppresses_user_merge() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_machine_policy(
            dir.path(),
            r#"[{"key_path": "Software\\Policies\\Microsoft\\Windows\\System",
                 "value_name": "UserPolicyMode", "value": "2"}]"#,
        );
        write_user_policy(dir.path(), USER_ENTRY);

        let gpt = Gpt::open(dir.path(), &JsonPolicyDecoder).expect("open");
        assert_eq!(gpt.user_policy_mode(), 2);

        let mut store = PolicyStore::new();
        gpt.merge(
            &mut store,
            &JsonPolicyDecoder,
            &JsonShortcutDecoder,
            Some("S-1-5-21-1"),
        );
        assert_eq!(store.user_len("S-1-5-21-1"), 0);
        assert_eq!(store.machine_len(), 1);
    }

    #[test]
    fn absent_mode_merges_user_scope() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_machine_policy(dir.path(), "[]");
        write_user_policy(dir.path(), USER_ENTRY);

        let gpt = Gpt::open(dir.path(), &JsonPolicyDecoder).expect("open");
        let mut store = PolicyStore::new();
        gpt.merge(
            &mut store,
            &JsonPolicyDecoder,
            &JsonShortcutDecoder,
            Some("S-1-5-21-1"),
        );
        assert_eq!(store.user_len("S-1-5-21-1"), 1);
    }

    #[test]
    fn no_sid_merges_machine_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_machine_policy(
            dir.path(),
            r#"[{"key_path": "M", "value_name": "a", "value": "1"}]"#,
        );
        write_user_policy(dir.path(), USER_ENTRY);

        let gpt = Gpt::open(dir.path(), &JsonPolicyDecoder).expect("open");
        let mut store = PolicyStore::new();
        gpt.merge(&mut store, &JsonPolicyDecoder, &JsonShortcutDecoder, None);
        assert_eq!(store.machine_len(), 1);
        assert_eq!(store.user_len("S-1-5-21-1"), 0);
    }

    #[test]
    fn corrupt_machine_policy_contributes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_machine_policy(dir.path(), "garbage");

        let gpt = Gpt::open(dir.path(), &JsonPolicyDecoder).expect("open");
        let mut store = PolicyStore::new();
        gpt.merge(&mut store, &JsonPolicyDecoder, &JsonShortcutDecoder, None);
        assert_eq!(store.machine_len(), 0);
    }
}
