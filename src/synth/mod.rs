//! Setting synthesis: policy entries in, resolved settings out.
//!
//! Both target synthesizers share the same core algorithm — tri-state lock
//! lookup, namespace/key derivation, and ordered list accumulation — and
//! differ only in output shape. The shared pieces live here.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::store::{LockEntry, PolicyEntry, last_segment};

pub mod gsettings;
pub mod ini;

pub use gsettings::GsettingsSynthesizer;
pub use ini::{IniOutput, IniSynthesizer, WidgetAction};

/// Resolved value: scalar, or an ordered reconstructed list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SettingValue {
    Scalar(String),
    List(Vec<String>),
}

impl SettingValue {
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            SettingValue::Scalar(s) => Some(s),
            SettingValue::List(_) => None,
        }
    }
}

/// One setting ready for application to a target store.
///
/// `section` is filled only by the ini-file target. `locked`, when present,
/// always originates from a lock entry matching the last path segment of the
/// contributing policy entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResolvedSetting {
    pub namespace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub key: String,
    pub value: SettingValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked: Option<bool>,
}

type SettingKey = (String, Option<String>, String);

/// Ordered accumulator keyed by `(namespace, section, key)`.
///
/// Writes for an already-seen key replace the held setting in place, so the
/// output never contains two settings for one key and keeps first-seen
/// ordering. List contributions append in encounter order.
#[derive(Debug, Default)]
pub(crate) struct Accumulator {
    order: Vec<SettingKey>,
    settings: HashMap<SettingKey, ResolvedSetting>,
}

impl Accumulator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; last write wins, first-seen position kept.
    pub(crate) fn insert(&mut self, setting: ResolvedSetting) {
        let key = (
            setting.namespace.clone(),
            setting.section.clone(),
            setting.key.clone(),
        );
        if self.settings.insert(key.clone(), setting).is_none() {
            self.order.push(key);
        }
    }

    /// Append one element to a list-valued setting, creating it on first
    /// contribution.
    pub(crate) fn append_list_item(
        &mut self,
        namespace: &str,
        section: Option<&str>,
        key: &str,
        item: String,
        locked: Option<bool>,
    ) {
        let map_key = (
            namespace.to_string(),
            section.map(str::to_string),
            key.to_string(),
        );
        match self.settings.get_mut(&map_key) {
            Some(existing) => {
                match &mut existing.value {
                    SettingValue::List(items) => items.push(item),
                    // A scalar write for the same key is superseded by the
                    // list reconstruction.
                    SettingValue::Scalar(_) => {
                        existing.value = SettingValue::List(vec![item]);
                    }
                }
                existing.locked = locked;
            }
            None => {
                self.order.push(map_key);
                self.settings.insert(
                    (
                        namespace.to_string(),
                        section.map(str::to_string),
                        key.to_string(),
                    ),
                    ResolvedSetting {
                        namespace: namespace.to_string(),
                        section: section.map(str::to_string),
                        key: key.to_string(),
                        value: SettingValue::List(vec![item]),
                        locked,
                    },
                );
            }
        }
    }

    pub(crate) fn finish(mut self) -> Vec<ResolvedSetting> {
        self.order
            .iter()
            .filter_map(|key| self.settings.remove(key))
            .collect()
    }
}

/// Build the tri-state lock map from a locks-branch entry set: bare value
/// name to lock flag. Unparsable lock data is skipped with a warning.
pub(crate) fn lock_map(locks: &[&PolicyEntry]) -> BTreeMap<String, bool> {
    locks
        .iter()
        .filter_map(|entry| parse_lock(entry))
        .map(|lock| (lock.value_name, lock.locked))
        .collect()
}

fn parse_lock(entry: &PolicyEntry) -> Option<LockEntry> {
    let name = last_segment(&entry.full_key()).to_string();
    let Some(raw) = entry.value.as_str() else {
        tracing::warn!(name, "lock entry has non-scalar data, skipped");
        return None;
    };
    match raw.trim().parse::<i64>() {
        Ok(flag) => Some(LockEntry {
            value_name: name,
            locked: flag != 0,
        }),
        Err(_) => {
            tracing::warn!(name, data = raw, "lock entry has non-numeric data, skipped");
            None
        }
    }
}

/// Split a bare value name into `(namespace, key)` on the last `.`.
pub(crate) fn split_value_name(value_name: &str) -> (&str, &str) {
    match value_name.rsplit_once('.') {
        Some((namespace, key)) => (namespace, key),
        None => ("", value_name),
    }
}
