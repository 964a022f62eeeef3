//! One resolution-and-apply pass, machine or user scope.
//!
//! Strictly sequential: resolve the policy trees into a fresh store,
//! synthesize per target, apply. No failure of one setting aborts the rest
//! of the pass; only a missing tree root is fatal.

use std::path::PathBuf;

use crate::Result;
use crate::apply::{GsettingsApplier, IniApplier, SettingsBackend};
use crate::cache::FileCache;
use crate::config::Config;
use crate::decode::{PolicyDecoder, ShortcutDecoder};
use crate::gpt::Gpt;
use crate::mapping::MappingTable;
use crate::paths;
use crate::store::PolicyStore;
use crate::synth::{
    GsettingsSynthesizer, IniOutput, IniSynthesizer, ResolvedSetting, SettingValue,
};

/// Filesystem targets for one pass; overridable for tests and packaging.
#[derive(Clone, Debug)]
pub struct Targets {
    pub schema_dir: PathBuf,
    pub xdg_system_dir: PathBuf,
    /// When set, replaces the `~/.config` of the target user.
    pub user_config_dir: Option<PathBuf>,
}

impl Default for Targets {
    fn default() -> Self {
        Self {
            schema_dir: paths::schema_dir(),
            xdg_system_dir: paths::xdg_system_dir(),
            user_config_dir: None,
        }
    }
}

/// Synthesized output of one machine or user pass.
#[derive(Debug, Default, serde::Serialize)]
pub struct PassOutput {
    pub gsettings: Vec<ResolvedSetting>,
    pub ini: IniOutput,
}

pub struct Engine<'a> {
    config: &'a Config,
    decoder: &'a dyn PolicyDecoder,
    shortcut_decoder: &'a dyn ShortcutDecoder,
    cache: &'a dyn FileCache,
    backend: &'a dyn SettingsBackend,
    mapping: MappingTable,
    targets: Targets,
}

impl<'a> Engine<'a> {
    pub fn new(
        config: &'a Config,
        decoder: &'a dyn PolicyDecoder,
        shortcut_decoder: &'a dyn ShortcutDecoder,
        cache: &'a dyn FileCache,
        backend: &'a dyn SettingsBackend,
    ) -> Self {
        Self {
            config,
            decoder,
            shortcut_decoder,
            cache,
            backend,
            mapping: MappingTable::default_gsettings(),
            targets: Targets::default(),
        }
    }

    pub fn with_targets(mut self, targets: Targets) -> Self {
        self.targets = targets;
        self
    }

    /// Resolve an ordered list of policy tree roots into a fresh store.
    /// A missing root is fatal; everything below that degrades gracefully.
    pub fn resolve(&self, roots: &[PathBuf], sid: Option<&str>) -> Result<PolicyStore> {
        let mut store = PolicyStore::new();
        for root in roots {
            let gpt = Gpt::open(root, self.decoder)?;
            tracing::info!(guid = gpt.guid(), "merging policy tree");
            gpt.merge(&mut store, self.decoder, self.shortcut_decoder, sid);
        }
        Ok(store)
    }

    pub fn synthesize_machine(&self, store: &PolicyStore) -> PassOutput {
        let gsettings =
            GsettingsSynthesizer::new(&self.mapping, self.cache, self.config.windows_mapping);
        PassOutput {
            gsettings: gsettings.synthesize_machine(store),
            ini: IniSynthesizer::new().synthesize_machine(store),
        }
    }

    pub fn synthesize_user(&self, store: &PolicyStore, sid: &str) -> PassOutput {
        let gsettings =
            GsettingsSynthesizer::new(&self.mapping, self.cache, self.config.windows_mapping);
        PassOutput {
            gsettings: gsettings.synthesize_user(store, sid),
            ini: IniSynthesizer::new().synthesize_user(store, sid),
        }
    }

    /// Full machine pass: resolve, synthesize, apply both targets.
    pub fn run_machine(&self, roots: &[PathBuf]) -> Result<()> {
        let store = self.resolve(roots, None)?;
        let output = self.synthesize_machine(&store);

        if self.config.apply_gsettings {
            tracing::debug!("running settings-service applier for machine");
            let applier = GsettingsApplier::new(self.backend);
            if let Err(e) = applier.apply(&output.gsettings, &self.targets.schema_dir) {
                tracing::error!(error = %e, "settings-service apply failed");
            }
        } else {
            tracing::debug!("settings-service applier for machine disabled");
        }

        if self.config.apply_ini {
            tracing::debug!("running ini applier for machine");
            let applier = IniApplier::new(self.backend);
            if let Err(e) = applier.apply_machine(&output.ini, &self.targets.xdg_system_dir) {
                tracing::error!(error = %e, "ini apply failed");
            }
        } else {
            tracing::debug!("ini applier for machine disabled");
        }
        Ok(())
    }

    /// Full user pass for one account, honoring the policy-mode gate during
    /// resolution.
    pub fn run_user(&self, roots: &[PathBuf], sid: &str, username: &str) -> Result<()> {
        let store = self.resolve(roots, Some(sid))?;
        let output = self.synthesize_user(&store, sid);

        if self.config.apply_gsettings {
            tracing::debug!(username, "running settings-service applier for user");
            self.apply_user_gsettings(&output.gsettings);
        } else {
            tracing::debug!(username, "settings-service applier for user disabled");
        }

        if self.config.apply_ini {
            tracing::debug!(username, "running ini applier for user");
            let config_dir = self.user_config_dir(username);
            let applier = IniApplier::new(self.backend);
            if let Err(e) = applier.apply_user(&output.ini, &config_dir) {
                tracing::error!(error = %e, "ini apply failed");
            }
        } else {
            tracing::debug!(username, "ini applier for user disabled");
        }
        Ok(())
    }

    fn apply_user_gsettings(&self, resolved: &[ResolvedSetting]) {
        for setting in resolved {
            let value = command_value(&setting.value);
            tracing::debug!(
                namespace = %setting.namespace,
                key = %setting.key,
                value = %value,
                "applying user setting"
            );
            if let Err(e) = self
                .backend
                .set_user_setting(&setting.namespace, &setting.key, &value)
            {
                tracing::warn!(
                    namespace = %setting.namespace,
                    key = %setting.key,
                    error = %e,
                    "user setting not applied"
                );
            }
        }
    }

    fn user_config_dir(&self, username: &str) -> PathBuf {
        match &self.targets.user_config_dir {
            Some(dir) => dir.clone(),
            None => paths::user_config_dir(username),
        }
    }
}

/// Command-line form of a resolved value for the settings-service tool.
fn command_value(value: &SettingValue) -> String {
    match value {
        SettingValue::Scalar(s) => s.clone(),
        SettingValue::List(items) => {
            let quoted: Vec<String> = items
                .iter()
                .map(|item| format!("'{}'", item.replace('\'', r"\'")))
                .collect();
            format!("[{}]", quoted.join(", "))
        }
    }
}
