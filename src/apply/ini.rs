//! Apply engine for the ini-file target.
//!
//! Machine scope writes whole files under the system configuration
//! directory. User scope goes through the per-key writer tool, with a
//! one-shot lock-conflict recovery when a previous run left a conflicting
//! locked-marker line behind. No single key's failure aborts the rest of
//! the pass.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use crate::apply::{ApplyError, SettingsBackend};
use crate::synth::{IniOutput, ResolvedSetting, SettingValue, WidgetAction};

/// Marker suffix denoting an administratively fixed key on reads.
pub const LOCK_MARKER: &str = "[$i]";

/// Marker encoding accepted by the writer tool; normalized after writing.
const WRITER_LOCK_SUFFIX: &str = "/$i/";

pub struct IniApplier<'a> {
    backend: &'a dyn SettingsBackend,
}

impl<'a> IniApplier<'a> {
    pub fn new(backend: &'a dyn SettingsBackend) -> Self {
        Self { backend }
    }

    /// Machine scope: one file per namespace, overwritten whole.
    pub fn apply_machine(&self, output: &IniOutput, xdg_dir: &Path) -> Result<(), ApplyError> {
        fs::create_dir_all(xdg_dir).map_err(|source| ApplyError::Write {
            path: xdg_dir.to_path_buf(),
            source,
        })?;

        for (file, settings) in group_by_file(&output.settings) {
            let path = xdg_dir.join(file);
            let contents = render_machine_file(&settings);
            match fs::write(&path, contents) {
                Ok(()) => tracing::debug!(file, "system ini file written"),
                Err(e) => tracing::error!(file, error = %e, "system ini file write failed"),
            }
        }

        self.run_widget_actions(&output.widget_actions);
        Ok(())
    }

    /// User scope: per-key writes with lock-conflict recovery, then one
    /// marker-normalization pass per touched file.
    pub fn apply_user(&self, output: &IniOutput, config_dir: &Path) -> Result<(), ApplyError> {
        let grouped = group_by_file(&output.settings);

        for (file, settings) in &grouped {
            for setting in settings {
                let Some(section) = setting.section.as_deref() else {
                    tracing::warn!(file, key = %setting.key, "setting without section, skipped");
                    continue;
                };
                let key_arg = if setting.locked == Some(true) {
                    format!("{}{}", setting.key, WRITER_LOCK_SUFFIX)
                } else {
                    setting.key.clone()
                };
                let value = render_value(&setting.value);

                if let Err(e) = self.backend.write_key(file, section, &key_arg, &value) {
                    tracing::warn!(
                        file,
                        key = %setting.key,
                        error = %e,
                        "key write rejected, clearing stale locked marker"
                    );
                    let path = config_dir.join(file);
                    if let Err(e) = clear_lock_lines(&path, &setting.key) {
                        tracing::warn!(file, error = %e, "locked marker cleanup failed");
                    }
                    if let Err(e) = self.backend.write_key(file, section, &key_arg, &value) {
                        tracing::error!(file, key = %setting.key, error = %e, "key write abandoned");
                    }
                }
            }

            let path = config_dir.join(file);
            if let Err(e) = normalize_markers(&path) {
                tracing::warn!(file, error = %e, "marker normalization failed");
            } else {
                tracing::debug!(file, "user ini file updated");
            }
        }

        self.run_widget_actions(&output.widget_actions);
        Ok(())
    }

    fn run_widget_actions(&self, actions: &[WidgetAction]) {
        for action in actions {
            match self.backend.run_widget_tool(action.tool, &action.value) {
                Ok(()) => tracing::debug!(tool = action.tool, "widget utility applied"),
                Err(e) => tracing::error!(tool = action.tool, error = %e, "widget utility failed"),
            }
        }
    }
}

fn group_by_file<'a>(
    settings: &'a [ResolvedSetting],
) -> Vec<(&'a str, Vec<&'a ResolvedSetting>)> {
    let mut order: Vec<&str> = Vec::new();
    let mut by_file: HashMap<&str, Vec<&ResolvedSetting>> = HashMap::new();
    for setting in settings {
        if !by_file.contains_key(setting.namespace.as_str()) {
            order.push(&setting.namespace);
        }
        by_file
            .entry(setting.namespace.as_str())
            .or_default()
            .push(setting);
    }
    order
        .into_iter()
        .map(|file| {
            let settings = by_file.remove(file).unwrap_or_default();
            (file, settings)
        })
        .collect()
}

fn render_machine_file(settings: &[&ResolvedSetting]) -> String {
    let mut section_order: Vec<&str> = Vec::new();
    let mut sections: HashMap<&str, Vec<&ResolvedSetting>> = HashMap::new();
    for setting in settings {
        let section = setting.section.as_deref().unwrap_or_default();
        if !sections.contains_key(section) {
            section_order.push(section);
        }
        sections.entry(section).or_default().push(setting);
    }

    let mut out = String::new();
    for section in section_order {
        out.push_str(&format!("[{section}]\n"));
        for setting in &sections[section] {
            let marker = if setting.locked == Some(true) {
                LOCK_MARKER
            } else {
                ""
            };
            out.push_str(&format!(
                "{}{}={}\n",
                setting.key,
                marker,
                render_value(&setting.value)
            ));
        }
        out.push('\n');
    }
    out
}

/// Ini files carry lists as comma-joined strings.
fn render_value(value: &SettingValue) -> String {
    match value {
        SettingValue::Scalar(s) => s.clone(),
        SettingValue::List(items) => items.join(","),
    }
}

/// Remove stale locked-marker lines for a key from a user config file, so a
/// retried write can succeed.
fn clear_lock_lines(path: &Path, key: &str) -> io::Result<()> {
    if !path.exists() {
        return Ok(());
    }
    let marker = format!("{key}{LOCK_MARKER}=");
    let contents = fs::read_to_string(path)?;
    let mut kept = Vec::new();
    for line in contents.lines() {
        if line.contains(&marker) {
            tracing::info!(line, "removed stale locked setting");
        } else {
            kept.push(line);
        }
    }
    let mut out = kept.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    fs::write(path, out)
}

/// Normalize the writer tool's own marker encodings into the convention used
/// for reads. One textual substitution pass over the whole file.
fn normalize_markers(path: &Path) -> io::Result<()> {
    if !path.exists() {
        return Ok(());
    }
    let contents = fs::read_to_string(path)?;
    let normalized = contents
        .replace(WRITER_LOCK_SUFFIX, LOCK_MARKER)
        .replace(")(", "][");
    if normalized != contents {
        fs::write(path, normalized)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_harness::RecordingBackend;

    fn ini_setting(
        file: &str,
        section: &str,
        key: &str,
        value: &str,
        locked: Option<bool>,
    ) -> ResolvedSetting {
        ResolvedSetting {
            namespace: file.to_string(),
            section: Some(section.to_string()),
            key: key.to_string(),
            value: SettingValue::Scalar(value.to_string()),
            locked,
        }
    }

    fn output(settings: Vec<ResolvedSetting>) -> IniOutput {
        IniOutput {
            settings,
            widget_actions: Vec::new(),
        }
    }

    #[test]
    fn machine_files_group_sections_and_mark_locks() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = RecordingBackend::new();
        let out = output(vec![
            ini_setting("kscreenlockerrc", "Daemon", "Timeout", "10", Some(true)),
            ini_setting("kscreenlockerrc", "Daemon", "Autolock", "true", None),
            ini_setting("kcminputrc", "Mouse", "cursorTheme", "breeze", Some(false)),
        ]);

        IniApplier::new(&backend)
            .apply_machine(&out, dir.path())
            .expect("apply");

        let locker =
            fs::read_to_string(dir.path().join("kscreenlockerrc")).expect("read kscreenlockerrc");
        assert!(locker.contains("[Daemon]\nTimeout[$i]=10\nAutolock=true\n"));
        let input = fs::read_to_string(dir.path().join("kcminputrc")).expect("read kcminputrc");
        assert!(input.contains("[Mouse]\ncursorTheme=breeze\n"));
    }

    #[test]
    fn machine_apply_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = RecordingBackend::new();
        let out = output(vec![ini_setting(
            "kscreenlockerrc",
            "Daemon",
            "Timeout",
            "10",
            Some(true),
        )]);

        let applier = IniApplier::new(&backend);
        applier.apply_machine(&out, dir.path()).expect("first");
        let first = fs::read(dir.path().join("kscreenlockerrc")).expect("read");
        applier.apply_machine(&out, dir.path()).expect("second");
        let second = fs::read(dir.path().join("kscreenlockerrc")).expect("read");
        assert_eq!(first, second);
    }

    #[test]
    fn user_writes_go_through_writer_and_get_normalized() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = RecordingBackend::new().with_write_root(dir.path());
        let out = output(vec![ini_setting(
            "kscreenlockerrc",
            "Daemon",
            "Timeout",
            "10",
            Some(true),
        )]);

        IniApplier::new(&backend)
            .apply_user(&out, dir.path())
            .expect("apply");

        let contents =
            fs::read_to_string(dir.path().join("kscreenlockerrc")).expect("read config");
        assert!(contents.contains("Timeout[$i]=10"));
        assert!(!contents.contains("/$i/"));
    }

    #[test]
    fn stale_lock_line_recovers_to_exactly_one_line() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("kscreenlockerrc"),
            "[Daemon]\nTimeout[$i]=99\n",
        )
        .expect("seed stale config");
        let backend = RecordingBackend::new().with_write_root(dir.path());
        let out = output(vec![ini_setting(
            "kscreenlockerrc",
            "Daemon",
            "Timeout",
            "10",
            Some(true),
        )]);

        IniApplier::new(&backend)
            .apply_user(&out, dir.path())
            .expect("apply");

        let contents =
            fs::read_to_string(dir.path().join("kscreenlockerrc")).expect("read config");
        let hits: Vec<&str> = contents
            .lines()
            .filter(|line| line.starts_with("Timeout"))
            .collect();
        assert_eq!(hits, vec!["Timeout[$i]=10"]);
    }

    #[test]
    fn second_write_failure_abandons_only_that_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = RecordingBackend::new()
            .with_write_root(dir.path())
            .rejecting_key("Timeout");
        let out = output(vec![
            ini_setting("kscreenlockerrc", "Daemon", "Timeout", "10", None),
            ini_setting("kscreenlockerrc", "Daemon", "Autolock", "true", None),
        ]);

        IniApplier::new(&backend)
            .apply_user(&out, dir.path())
            .expect("apply");

        let contents =
            fs::read_to_string(dir.path().join("kscreenlockerrc")).expect("read config");
        assert!(!contents.contains("Timeout"));
        assert!(contents.contains("Autolock=true"));
        // One initial attempt plus exactly one retry.
        let attempts = backend
            .calls()
            .iter()
            .filter(|call| call.contains("Timeout"))
            .count();
        assert_eq!(attempts, 2);
    }

    #[test]
    fn widget_actions_run_through_backend() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = RecordingBackend::new();
        let out = IniOutput {
            settings: Vec::new(),
            widget_actions: vec![WidgetAction {
                tool: "plasma-apply-colorscheme",
                value: "BreezeDark".into(),
            }],
        };

        IniApplier::new(&backend)
            .apply_machine(&out, dir.path())
            .expect("apply");
        assert!(
            backend
                .calls()
                .iter()
                .any(|call| call == "widget-tool plasma-apply-colorscheme BreezeDark")
        );
    }
}
