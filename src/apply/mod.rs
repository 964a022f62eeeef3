//! Apply engines: commit resolved settings to their target stores.

use std::path::PathBuf;

use thiserror::Error;

pub mod backend;
pub mod gsettings;
pub mod ini;

pub use backend::{SettingsBackend, SystemBackend};
pub use gsettings::GsettingsApplier;
pub use ini::IniApplier;

#[derive(Error, Debug)]
pub enum ApplyError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        source: std::io::Error,
    },
}
