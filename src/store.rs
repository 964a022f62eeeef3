//! In-memory policy storage for one resolution run.
//!
//! A [`PolicyStore`] holds decoded policy entries for the machine scope and
//! for any number of user scopes (keyed by security identifier). It is
//! rebuilt from scratch on every pass; nothing here persists between runs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Hierarchical key separator used by decoded policy paths.
pub const KEY_SEPARATOR: char = '\\';

/// Decoded registry value. Multi-string values survive decoding as lists.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PolicyValue {
    String(String),
    Strings(Vec<String>),
}

impl PolicyValue {
    /// Scalar view; `None` for multi-string values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PolicyValue::String(s) => Some(s),
            PolicyValue::Strings(_) => None,
        }
    }
}

impl From<&str> for PolicyValue {
    fn from(s: &str) -> Self {
        PolicyValue::String(s.to_string())
    }
}

/// One administrative setting instance, immutable once decoded.
///
/// Uniqueness within a scope is by `(key_path, value_name)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyEntry {
    /// Container key path, `\`-separated.
    pub key_path: String,
    pub value_name: String,
    pub value: PolicyValue,
}

impl PolicyEntry {
    pub fn new(
        key_path: impl Into<String>,
        value_name: impl Into<String>,
        value: impl Into<PolicyValue>,
    ) -> Self {
        Self {
            key_path: key_path.into(),
            value_name: value_name.into(),
            value: value.into(),
        }
    }

    /// Full hierarchical key including the value name.
    pub fn full_key(&self) -> String {
        format!("{}{}{}", self.key_path, KEY_SEPARATOR, self.value_name)
    }

    /// Last segment of the container key path.
    pub fn container_leaf(&self) -> &str {
        last_segment(&self.key_path)
    }
}

/// Per-setting lock flag derived from the locks branch of the policy tree.
///
/// Keyed by bare value name. Absence of a lock entry for a name means the
/// lock state is unspecified, never "locked".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockEntry {
    pub value_name: String,
    pub locked: bool,
}

/// Decoded shortcut preference. Processing beyond merging is out of scope;
/// the store only carries these through to downstream consumers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortcut {
    pub name: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// Which part of the policy tree an entry came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    Machine,
    User,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Machine => "machine",
            Scope::User => "user",
        }
    }
}

/// Ordered, queryable collection of decoded policy entries for one run.
#[derive(Debug, Default)]
pub struct PolicyStore {
    machine: Vec<PolicyEntry>,
    users: BTreeMap<String, Vec<PolicyEntry>>,
    shortcuts: BTreeMap<String, Vec<Shortcut>>,
}

impl PolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_machine_entry(&mut self, entry: PolicyEntry) {
        self.machine.push(entry);
    }

    pub fn add_user_entry(&mut self, sid: &str, entry: PolicyEntry) {
        self.users.entry(sid.to_string()).or_default().push(entry);
    }

    pub fn add_shortcut(&mut self, sid: &str, shortcut: Shortcut) {
        self.shortcuts
            .entry(sid.to_string())
            .or_default()
            .push(shortcut);
    }

    /// Machine entries whose full key starts with `prefix`, in merge order.
    pub fn machine_entries(&self, prefix: &str) -> Vec<&PolicyEntry> {
        filter_by_prefix(&self.machine, prefix)
    }

    /// User entries whose full key starts with `prefix`, in merge order.
    pub fn user_entries(&self, sid: &str, prefix: &str) -> Vec<&PolicyEntry> {
        self.users
            .get(sid)
            .map(|entries| filter_by_prefix(entries, prefix))
            .unwrap_or_default()
    }

    /// Exact full-key lookup in a user scope. Later merges shadow earlier
    /// ones, so the last match wins.
    pub fn user_entry(&self, sid: &str, full_key: &str) -> Option<&PolicyEntry> {
        self.users
            .get(sid)?
            .iter()
            .rev()
            .find(|entry| entry.full_key() == full_key)
    }

    pub fn user_shortcuts(&self, sid: &str) -> &[Shortcut] {
        self.shortcuts.get(sid).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn machine_len(&self) -> usize {
        self.machine.len()
    }

    pub fn user_len(&self, sid: &str) -> usize {
        self.users.get(sid).map(Vec::len).unwrap_or(0)
    }
}

fn filter_by_prefix<'a>(entries: &'a [PolicyEntry], prefix: &str) -> Vec<&'a PolicyEntry> {
    entries
        .iter()
        .filter(|entry| entry.full_key().starts_with(prefix))
        .collect()
}

/// Last `\`-separated segment of a key path.
pub fn last_segment(path: &str) -> &str {
    path.rsplit(KEY_SEPARATOR).next().unwrap_or(path)
}
