#![forbid(unsafe_code)]

pub mod apply;
pub mod cache;
pub mod cli;
pub mod config;
pub mod decode;
pub mod engine;
pub mod error;
pub mod gpt;
pub mod mapping;
mod paths;
pub mod store;
pub mod synth;
pub mod telemetry;
pub mod test_harness;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

// Re-export the working set at crate root for convenience
pub use crate::mapping::{MappingRule, MappingTable, Transform};
pub use crate::store::{LockEntry, PolicyEntry, PolicyStore, PolicyValue, Scope, Shortcut};
pub use crate::synth::{ResolvedSetting, SettingValue};
