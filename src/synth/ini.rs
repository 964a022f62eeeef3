//! Synthesizer for the ini-file (KDE) target.
//!
//! Policy keys shape as `...\<file>\<section>` with the value name as the
//! ini key. Entries under the `plasma` file whose section names a widget
//! utility additionally yield a widget action for the apply engine.

use crate::store::{KEY_SEPARATOR, PolicyEntry, PolicyStore, PolicyValue};
use crate::synth::{Accumulator, ResolvedSetting, SettingValue, lock_map};

pub const KDE_BRANCH: &str = r"Software\BaseALT\Policies\KDE\";
pub const KDE_LOCKS_BRANCH: &str = r"Software\BaseALT\Policies\KDELocks\";

/// Graphics settings applied through dedicated tools rather than ini writes.
const WIDGET_UTILITIES: &[(&str, &str)] = &[
    ("colorscheme", "plasma-apply-colorscheme"),
    ("cursortheme", "plasma-apply-cursortheme"),
    ("desktoptheme", "plasma-apply-desktoptheme"),
    ("wallpaperimage", "plasma-apply-wallpaperimage"),
];

fn widget_tool(section: &str) -> Option<&'static str> {
    WIDGET_UTILITIES
        .iter()
        .find(|(name, _)| *name == section)
        .map(|(_, tool)| *tool)
}

/// External tool invocation requested by a `plasma` policy entry.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct WidgetAction {
    pub tool: &'static str,
    pub value: String,
}

#[derive(Debug, Default, serde::Serialize)]
pub struct IniOutput {
    pub settings: Vec<ResolvedSetting>,
    pub widget_actions: Vec<WidgetAction>,
}

#[derive(Debug, Default)]
pub struct IniSynthesizer;

impl IniSynthesizer {
    pub fn new() -> Self {
        Self
    }

    pub fn synthesize_machine(&self, store: &PolicyStore) -> IniOutput {
        let entries = store.machine_entries(KDE_BRANCH);
        let locks = lock_map(&store.machine_entries(KDE_LOCKS_BRANCH));
        synthesize(&entries, &locks)
    }

    pub fn synthesize_user(&self, store: &PolicyStore, sid: &str) -> IniOutput {
        let entries = store.user_entries(sid, KDE_BRANCH);
        let locks = lock_map(&store.user_entries(sid, KDE_LOCKS_BRANCH));
        synthesize(&entries, &locks)
    }
}

fn synthesize(
    entries: &[&PolicyEntry],
    locks: &std::collections::BTreeMap<String, bool>,
) -> IniOutput {
    let mut acc = Accumulator::new();
    let mut widget_actions = Vec::new();

    for entry in entries {
        let segments: Vec<&str> = branch_segments(&entry.key_path);

        // One element of a reconstructed list: file/section/key all come
        // from the container path.
        if entry.value.as_str() == Some(entry.value_name.as_str()) {
            let [file, section, key] = match segments.as_slice() {
                [.., file, section, key] => [*file, *section, *key],
                _ => {
                    tracing::warn!(key = %entry.full_key(), "malformed list policy key, skipped");
                    continue;
                }
            };
            let locked = locks.get(key).copied();
            if let Some(item) = entry.value.as_str() {
                acc.append_list_item(file, Some(section), key, item.to_string(), locked);
            }
            continue;
        }

        let [file, section] = match segments.as_slice() {
            [.., file, section] => [*file, *section],
            _ => {
                tracing::warn!(key = %entry.full_key(), "malformed policy key, skipped");
                continue;
            }
        };

        let value = match &entry.value {
            PolicyValue::String(s) => SettingValue::Scalar(s.clone()),
            PolicyValue::Strings(items) => SettingValue::List(items.clone()),
        };
        if file == "plasma"
            && let Some(tool) = widget_tool(section)
            && let Some(data) = value.as_scalar()
        {
            widget_actions.push(WidgetAction {
                tool,
                value: data.to_string(),
            });
        }
        acc.insert(ResolvedSetting {
            namespace: file.to_string(),
            section: Some(section.to_string()),
            key: entry.value_name.clone(),
            value,
            locked: locks.get(&entry.value_name).copied(),
        });
    }

    IniOutput {
        settings: acc.finish(),
        widget_actions,
    }
}

/// Key path segments below the policy branch root.
fn branch_segments(key_path: &str) -> Vec<&str> {
    key_path
        .strip_prefix(KDE_BRANCH)
        .map(|rel| rel.split(KEY_SEPARATOR).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kde_entry(sub_path: &str, value_name: &str, value: &str) -> PolicyEntry {
        PolicyEntry::new(
            format!(r"Software\BaseALT\Policies\KDE\{sub_path}"),
            value_name,
            value,
        )
    }

    fn machine_store(entries: Vec<PolicyEntry>) -> PolicyStore {
        let mut store = PolicyStore::new();
        for entry in entries {
            store.add_machine_entry(entry);
        }
        store
    }

    #[test]
    fn entry_maps_to_file_section_key() {
        let store = machine_store(vec![kde_entry(
            r"kscreenlockerrc\Daemon",
            "Timeout",
            "10",
        )]);
        let out = IniSynthesizer::new().synthesize_machine(&store);
        assert_eq!(out.settings.len(), 1);
        let setting = &out.settings[0];
        assert_eq!(setting.namespace, "kscreenlockerrc");
        assert_eq!(setting.section.as_deref(), Some("Daemon"));
        assert_eq!(setting.key, "Timeout");
        assert_eq!(setting.value, SettingValue::Scalar("10".into()));
        assert!(out.widget_actions.is_empty());
    }

    #[test]
    fn malformed_key_is_skipped_without_aborting() {
        let store = machine_store(vec![
            PolicyEntry::new(r"Software\BaseALT\Policies\KDE", "orphan", "1"),
            kde_entry(r"kscreenlockerrc\Daemon", "Timeout", "10"),
        ]);
        let out = IniSynthesizer::new().synthesize_machine(&store);
        assert_eq!(out.settings.len(), 1);
        assert_eq!(out.settings[0].key, "Timeout");
    }

    #[test]
    fn plasma_widget_sections_yield_actions() {
        let store = machine_store(vec![
            kde_entry(r"plasma\colorscheme", "name", "BreezeDark"),
            kde_entry(r"plasma\Theme", "name", "default"),
        ]);
        let out = IniSynthesizer::new().synthesize_machine(&store);
        assert_eq!(out.widget_actions.len(), 1);
        assert_eq!(out.widget_actions[0].tool, "plasma-apply-colorscheme");
        assert_eq!(out.widget_actions[0].value, "BreezeDark");
        // Widget entries still land in the settings output.
        assert_eq!(out.settings.len(), 2);
    }

    #[test]
    fn lock_flag_comes_from_locks_branch() {
        let mut store = machine_store(vec![kde_entry(
            r"kscreenlockerrc\Daemon",
            "Timeout",
            "10",
        )]);
        store.add_machine_entry(PolicyEntry::new(
            r"Software\BaseALT\Policies\KDELocks",
            "Timeout",
            "1",
        ));
        let out = IniSynthesizer::new().synthesize_machine(&store);
        assert_eq!(out.settings[0].locked, Some(true));
    }

    #[test]
    fn list_elements_accumulate_under_container_key() {
        let container = r"kcminputrc\Mouse\extraButtons";
        let store = machine_store(vec![
            kde_entry(container, "1", "1"),
            kde_entry(container, "2", "2"),
        ]);
        let out = IniSynthesizer::new().synthesize_machine(&store);
        assert_eq!(out.settings.len(), 1);
        let setting = &out.settings[0];
        assert_eq!(setting.namespace, "kcminputrc");
        assert_eq!(setting.section.as_deref(), Some("Mouse"));
        assert_eq!(setting.key, "extraButtons");
        assert_eq!(
            setting.value,
            SettingValue::List(vec!["1".into(), "2".into()])
        );
    }
}
