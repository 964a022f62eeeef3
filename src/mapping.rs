//! Translation rules from legacy Windows policy keys to native settings.
//!
//! The table is immutable, explicitly constructed, and passed into the
//! synthesizer at construction time; rule lookup is by exact, case-sensitive
//! legacy key with at most one rule per key.

use crate::cache::FileCache;

/// Value transform attached to a mapping rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transform {
    /// Resolve the value through the file cache; a miss passes the original
    /// value through unchanged.
    CachedFile,
}

impl Transform {
    pub fn apply(self, value: &str, cache: &dyn FileCache) -> String {
        match self {
            Transform::CachedFile => match cache.get(value) {
                Some(path) => {
                    tracing::debug!(src = value, dst = %path.display(), "using cached file");
                    path.display().to_string()
                }
                None => {
                    tracing::debug!(src = value, "no cached copy, passing value through");
                    value.to_string()
                }
            },
        }
    }
}

/// One legacy-key-to-native-key translation rule.
#[derive(Clone, Debug)]
pub struct MappingRule {
    pub legacy_key: &'static str,
    pub namespace: &'static str,
    pub key: &'static str,
    pub transform: Option<Transform>,
}

/// Ordered, immutable rule table.
#[derive(Clone, Debug, Default)]
pub struct MappingTable {
    rules: Vec<MappingRule>,
}

impl MappingTable {
    pub fn new(rules: Vec<MappingRule>) -> Self {
        Self { rules }
    }

    /// Built-in Windows desktop policy mappings for the GSettings target.
    pub fn default_gsettings() -> Self {
        Self::new(vec![
            // Disable or enable screen saver
            MappingRule {
                legacy_key:
                    r"Software\Policies\Microsoft\Windows\Control Panel\Desktop\ScreenSaveActive",
                namespace: "org.mate.screensaver",
                key: "idle-activation-enabled",
                transform: None,
            },
            // Timeout in seconds for screen saver activation; zero disables it
            MappingRule {
                legacy_key:
                    r"Software\Policies\Microsoft\Windows\Control Panel\Desktop\ScreenSaveTimeOut",
                namespace: "org.mate.session",
                key: "idle-delay",
                transform: None,
            },
            // Enable or disable password protection for the screen saver
            MappingRule {
                legacy_key:
                    r"Software\Policies\Microsoft\Windows\Control Panel\Desktop\ScreenSaverIsSecure",
                namespace: "org.mate.screensaver",
                key: "lock-enabled",
                transform: None,
            },
            // Image used as the desktop wallpaper
            MappingRule {
                legacy_key:
                    r"Software\Microsoft\Windows\CurrentVersion\Policies\System\Wallpaper",
                namespace: "org.mate.background",
                key: "picture-filename",
                transform: Some(Transform::CachedFile),
            },
        ])
    }

    pub fn rules(&self) -> &[MappingRule] {
        &self.rules
    }

    pub fn lookup(&self, legacy_key: &str) -> Option<&MappingRule> {
        self.rules.iter().find(|rule| rule.legacy_key == legacy_key)
    }
}
