//! Apply engine for the settings-service target.
//!
//! Machine scope only. Settings land in a highest-priority schema override
//! file which is removed and rewritten every pass, then the backend is asked
//! to recompile schemas and reload. Both backend steps are best-effort: the
//! override file on disk is already correct, so a failed reload only delays
//! the change until the next reload or reboot.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::apply::{ApplyError, SettingsBackend};
use crate::synth::{ResolvedSetting, SettingValue};

/// Highest-priority override file consumed ahead of all other sources.
pub const OVERRIDE_PRIORITY_FILE: &str = "zzz_policy.gschema.override";

/// Override file name used by a previous format version; removed on sight.
pub const OVERRIDE_LEGACY_FILE: &str = "0_policy.gschema.override";

pub struct GsettingsApplier<'a> {
    backend: &'a dyn SettingsBackend,
}

impl<'a> GsettingsApplier<'a> {
    pub fn new(backend: &'a dyn SettingsBackend) -> Self {
        Self { backend }
    }

    pub fn apply(&self, resolved: &[ResolvedSetting], schema_dir: &Path) -> Result<(), ApplyError> {
        let legacy = schema_dir.join(OVERRIDE_LEGACY_FILE);
        if legacy.exists() {
            tracing::debug!(path = %legacy.display(), "removing legacy override file");
            fs::remove_file(&legacy).map_err(|source| ApplyError::Remove {
                path: legacy.clone(),
                source,
            })?;
        }

        // A stale override from a previous run must never linger into this
        // run's result.
        let target = schema_dir.join(OVERRIDE_PRIORITY_FILE);
        if target.exists() {
            tracing::debug!("removing policy override file from previous run");
            fs::remove_file(&target).map_err(|source| ApplyError::Remove {
                path: target.clone(),
                source,
            })?;
        }

        let contents = render_override(resolved);
        fs::write(&target, contents).map_err(|source| ApplyError::Write {
            path: target.clone(),
            source,
        })?;
        tracing::debug!(path = %target.display(), settings = resolved.len(), "override file written");

        if let Err(e) = self.backend.compile_schemas(schema_dir) {
            tracing::warn!(error = %e, "schema recompilation failed");
        }
        if let Err(e) = self.backend.reload() {
            tracing::warn!(error = %e, "settings backend reload failed");
        }
        Ok(())
    }
}

/// Serialize settings in keyfile override syntax: one `[namespace]` section
/// per schema in first-seen order, plus a trailing `[locks]` section listing
/// administratively locked paths.
fn render_override(resolved: &[ResolvedSetting]) -> String {
    let mut order: Vec<&str> = Vec::new();
    let mut sections: HashMap<&str, Vec<&ResolvedSetting>> = HashMap::new();
    let mut locks: Vec<String> = Vec::new();

    for setting in resolved {
        if !sections.contains_key(setting.namespace.as_str()) {
            order.push(&setting.namespace);
        }
        sections
            .entry(setting.namespace.as_str())
            .or_default()
            .push(setting);
        if setting.locked == Some(true) {
            locks.push(lock_path(&setting.namespace, &setting.key));
        }
    }

    let mut out = String::new();
    for namespace in order {
        out.push_str(&format!("[{namespace}]\n"));
        for setting in &sections[namespace] {
            out.push_str(&format!("{}={}\n", setting.key, render_value(&setting.value)));
        }
        out.push('\n');
    }
    if !locks.is_empty() {
        out.push_str("[locks]\n");
        for path in locks {
            out.push_str(&format!("{path}=true\n"));
        }
    }
    out
}

/// Slash-style path for a lock marking: `org.mate.session` + `idle-delay`
/// becomes `/org/mate/session/idle-delay`.
fn lock_path(namespace: &str, key: &str) -> String {
    format!("/{}/{}", namespace.replace('.', "/"), key)
}

/// GVariant-style value rendering: bare integers and booleans, quoted
/// strings, bracketed string lists.
fn render_value(value: &SettingValue) -> String {
    match value {
        SettingValue::Scalar(s) => render_scalar(s),
        SettingValue::List(items) => {
            let rendered: Vec<String> = items.iter().map(|item| quote(item)).collect();
            format!("[{}]", rendered.join(", "))
        }
    }
}

fn render_scalar(raw: &str) -> String {
    if raw.parse::<i64>().is_ok() || raw == "true" || raw == "false" {
        raw.to_string()
    } else {
        quote(raw)
    }
}

fn quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\\', r"\\").replace('\'', r"\'"))
}
