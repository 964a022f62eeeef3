//! Synthesizer for the settings-service (GSettings) target.

use crate::cache::FileCache;
use crate::mapping::{MappingTable, Transform};
use crate::store::{PolicyEntry, PolicyStore, PolicyValue};
use crate::synth::{Accumulator, ResolvedSetting, SettingValue, lock_map, split_value_name};

pub const GSETTINGS_BRANCH: &str = r"Software\BaseALT\Policies\GSettings\";
pub const GSETTINGS_LOCKS_BRANCH: &str = r"Software\BaseALT\Policies\GSettingsLocks\";

/// The one reference-valued key: its value names a file, not a plain value,
/// and resolves through the file cache.
pub const WALLPAPER_ENTRY: &str =
    r"Software\BaseALT\Policies\GSettings\org.mate.background.picture-filename";

pub struct GsettingsSynthesizer<'a> {
    mapping: &'a MappingTable,
    cache: &'a dyn FileCache,
    windows_mapping: bool,
}

impl<'a> GsettingsSynthesizer<'a> {
    pub fn new(mapping: &'a MappingTable, cache: &'a dyn FileCache, windows_mapping: bool) -> Self {
        Self {
            mapping,
            cache,
            windows_mapping,
        }
    }

    pub fn synthesize_machine(&self, store: &PolicyStore) -> Vec<ResolvedSetting> {
        let entries = store.machine_entries(GSETTINGS_BRANCH);
        let locks = lock_map(&store.machine_entries(GSETTINGS_LOCKS_BRANCH));
        let mut acc = Accumulator::new();
        self.process_raw_entries(&mut acc, &entries, &locks);
        acc.finish()
    }

    /// User-scope synthesis: the mapping pass runs first so explicit
    /// per-setting entries override generic Windows-key mappings.
    pub fn synthesize_user(&self, store: &PolicyStore, sid: &str) -> Vec<ResolvedSetting> {
        let mut acc = Accumulator::new();

        if self.windows_mapping {
            tracing::debug!("mapping Windows policies to GSettings policies");
            self.mapping_pass(&mut acc, store, sid);
        } else {
            tracing::debug!("GSettings windows policy mapping not enabled");
        }

        let entries = store.user_entries(sid, GSETTINGS_BRANCH);
        let locks = lock_map(&store.user_entries(sid, GSETTINGS_LOCKS_BRANCH));
        self.process_raw_entries(&mut acc, &entries, &locks);
        acc.finish()
    }

    fn mapping_pass(&self, acc: &mut Accumulator, store: &PolicyStore, sid: &str) {
        for rule in self.mapping.rules() {
            let Some(entry) = store.user_entry(sid, rule.legacy_key) else {
                continue;
            };
            let Some(raw) = entry.value.as_str() else {
                tracing::warn!(key = rule.legacy_key, "mapped entry has non-scalar data, skipped");
                continue;
            };
            tracing::debug!(
                from = rule.legacy_key,
                to = format_args!("{}.{}", rule.namespace, rule.key),
                "found Windows mapping"
            );
            let value = match rule.transform {
                Some(transform) => transform.apply(raw, self.cache),
                None => raw.to_string(),
            };
            acc.insert(ResolvedSetting {
                namespace: rule.namespace.to_string(),
                section: None,
                key: rule.key.to_string(),
                value: SettingValue::Scalar(value),
                locked: None,
            });
        }
    }

    fn process_raw_entries(
        &self,
        acc: &mut Accumulator,
        entries: &[&PolicyEntry],
        locks: &std::collections::BTreeMap<String, bool>,
    ) {
        for entry in entries {
            // One element of a reconstructed list: the value repeats its own
            // value name, and namespace/key come from the container key.
            if entry.value.as_str() == Some(entry.value_name.as_str()) {
                let container = entry.container_leaf().to_string();
                let (namespace, key) = split_value_name(&container);
                let locked = locks.get(&container).copied();
                let Some(item) = entry.value.as_str() else {
                    continue;
                };
                acc.append_list_item(namespace, None, key, item.to_string(), locked);
                continue;
            }

            let (namespace, key) = split_value_name(&entry.value_name);
            let locked = locks.get(&entry.value_name).copied();
            let value = match &entry.value {
                PolicyValue::String(s) => {
                    let resolved = if entry.full_key().eq_ignore_ascii_case(WALLPAPER_ENTRY) {
                        self.cache_reference(s)
                    } else {
                        s.clone()
                    };
                    SettingValue::Scalar(resolved)
                }
                PolicyValue::Strings(items) => SettingValue::List(items.clone()),
            };
            acc.insert(ResolvedSetting {
                namespace: namespace.to_string(),
                section: None,
                key: key.to_string(),
                value,
                locked,
            });
        }
    }

    fn cache_reference(&self, value: &str) -> String {
        if let Err(e) = self.cache.store(value) {
            tracing::debug!(error = %e, "unable to cache referenced file");
        }
        Transform::CachedFile.apply(value, self.cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FsFileCache;
    use crate::store::PolicyEntry;
    use crate::test_harness::NullCache;

    fn machine_store(entries: Vec<PolicyEntry>) -> PolicyStore {
        let mut store = PolicyStore::new();
        for entry in entries {
            store.add_machine_entry(entry);
        }
        store
    }

    fn synth_machine(store: &PolicyStore) -> Vec<ResolvedSetting> {
        let mapping = MappingTable::default_gsettings();
        GsettingsSynthesizer::new(&mapping, &NullCache, false).synthesize_machine(store)
    }

    fn gsettings_entry(value_name: &str, value: &str) -> PolicyEntry {
        PolicyEntry::new(r"Software\BaseALT\Policies\GSettings", value_name, value)
    }

    #[test]
    fn scalar_entry_splits_namespace_and_key() {
        let store = machine_store(vec![gsettings_entry("org.mate.session.idle-delay", "300")]);
        let out = synth_machine(&store);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].namespace, "org.mate.session");
        assert_eq!(out[0].key, "idle-delay");
        assert_eq!(out[0].value, SettingValue::Scalar("300".into()));
        assert_eq!(out[0].locked, None);
    }

    #[test]
    fn list_entries_reconstruct_one_ordered_list() {
        let container = r"Software\BaseALT\Policies\GSettings\org.mate.lockdown.disabled-applets";
        let store = machine_store(vec![
            PolicyEntry::new(container, "1", "1"),
            PolicyEntry::new(container, "2", "2"),
        ]);
        let out = synth_machine(&store);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].namespace, "org.mate.lockdown");
        assert_eq!(out[0].key, "disabled-applets");
        assert_eq!(
            out[0].value,
            SettingValue::List(vec!["1".into(), "2".into()])
        );
    }

    #[test]
    fn lock_gating_is_tri_state() {
        let mut store = machine_store(vec![
            gsettings_entry("org.mate.session.idle-delay", "300"),
            gsettings_entry("org.mate.background.show-desktop-icons", "true"),
        ]);
        store.add_machine_entry(PolicyEntry::new(
            r"Software\BaseALT\Policies\GSettingsLocks",
            "org.mate.session.idle-delay",
            "1",
        ));

        let out = synth_machine(&store);
        assert_eq!(out[0].locked, Some(true));
        assert_eq!(out[1].locked, None);
    }

    #[test]
    fn list_lock_derives_from_container_leaf() {
        let container = r"Software\BaseALT\Policies\GSettings\org.mate.lockdown.disabled-applets";
        let mut store = machine_store(vec![PolicyEntry::new(container, "1", "1")]);
        store.add_machine_entry(PolicyEntry::new(
            r"Software\BaseALT\Policies\GSettingsLocks",
            "org.mate.lockdown.disabled-applets",
            "1",
        ));

        let out = synth_machine(&store);
        assert_eq!(out[0].locked, Some(true));
    }

    #[test]
    fn raw_entry_overrides_windows_mapping() {
        let sid = "S-1-5-21-1";
        let mut store = PolicyStore::new();
        store.add_user_entry(
            sid,
            PolicyEntry::new(
                r"Software\Policies\Microsoft\Windows\Control Panel\Desktop",
                "ScreenSaveTimeOut",
                "600",
            ),
        );
        store.add_user_entry(
            sid,
            gsettings_entry("org.mate.session.idle-delay", "300"),
        );

        let mapping = MappingTable::default_gsettings();
        let out =
            GsettingsSynthesizer::new(&mapping, &NullCache, true).synthesize_user(&store, sid);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].value, SettingValue::Scalar("300".into()));
    }

    #[test]
    fn mapping_pass_alone_emits_mapped_setting() {
        let sid = "S-1-5-21-1";
        let mut store = PolicyStore::new();
        store.add_user_entry(
            sid,
            PolicyEntry::new(
                r"Software\Policies\Microsoft\Windows\Control Panel\Desktop",
                "ScreenSaveTimeOut",
                "600",
            ),
        );

        let mapping = MappingTable::default_gsettings();
        let out =
            GsettingsSynthesizer::new(&mapping, &NullCache, true).synthesize_user(&store, sid);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].namespace, "org.mate.session");
        assert_eq!(out[0].key, "idle-delay");
        assert_eq!(out[0].value, SettingValue::Scalar("600".into()));
    }

    #[test]
    fn mapping_disabled_skips_mapped_entries() {
        let sid = "S-1-5-21-1";
        let mut store = PolicyStore::new();
        store.add_user_entry(
            sid,
            PolicyEntry::new(
                r"Software\Policies\Microsoft\Windows\Control Panel\Desktop",
                "ScreenSaveTimeOut",
                "600",
            ),
        );

        let mapping = MappingTable::default_gsettings();
        let out =
            GsettingsSynthesizer::new(&mapping, &NullCache, false).synthesize_user(&store, sid);
        assert!(out.is_empty());
    }

    #[test]
    fn wallpaper_value_resolves_through_cache() {
        let dir = tempfile::tempdir().expect("tempdir");
        let src = dir.path().join("wall.png");
        std::fs::write(&src, b"png").expect("write");
        let cache = FsFileCache::new(dir.path().join("cache"));

        let store = machine_store(vec![gsettings_entry(
            "org.mate.background.picture-filename",
            &src.display().to_string(),
        )]);
        let mapping = MappingTable::default_gsettings();
        let out = GsettingsSynthesizer::new(&mapping, &cache, false).synthesize_machine(&store);

        let resolved = out[0].value.as_scalar().expect("scalar");
        assert_ne!(resolved, src.display().to_string());
        assert!(resolved.starts_with(dir.path().join("cache").to_str().unwrap()));
    }

    #[test]
    fn wallpaper_cache_miss_passes_value_through() {
        let value = "http://example.com/wall.png";
        let store = machine_store(vec![gsettings_entry(
            "org.mate.background.picture-filename",
            value,
        )]);
        let out = synth_machine(&store);
        assert_eq!(out[0].value, SettingValue::Scalar(value.into()));
    }
}
