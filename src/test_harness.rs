//! Shared fakes for unit and integration tests.

use std::cell::RefCell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::apply::SettingsBackend;
use crate::cache::{CacheError, FileCache};

/// Cache that never holds anything.
#[derive(Debug, Default)]
pub struct NullCache;

impl FileCache for NullCache {
    fn get(&self, _reference: &str) -> Option<PathBuf> {
        None
    }

    fn store(&self, _reference: &str) -> Result<Option<PathBuf>, CacheError> {
        Ok(None)
    }
}

/// Backend fake recording every call, optionally simulating the per-key
/// writer tool against a real directory.
///
/// The simulation mirrors the writer's conflict behavior: a write is
/// rejected while the target file holds a `key[$i]=` line for the same key,
/// and the key name is written exactly as given (marker encoding included),
/// leaving normalization to the apply engine.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    calls: RefCell<Vec<String>>,
    fail_tools: bool,
    write_root: Option<PathBuf>,
    rejected_keys: Vec<String>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make compile/reload/widget invocations fail.
    pub fn failing_tools(mut self) -> Self {
        self.fail_tools = true;
        self
    }

    /// Simulate per-key writes against config files under `root`.
    pub fn with_write_root(mut self, root: &Path) -> Self {
        self.write_root = Some(root.to_path_buf());
        self
    }

    /// Unconditionally reject writes for one key.
    pub fn rejecting_key(mut self, key: &str) -> Self {
        self.rejected_keys.push(key.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }

    fn tool_result(&self) -> io::Result<()> {
        if self.fail_tools {
            Err(io::Error::other("tool unavailable"))
        } else {
            Ok(())
        }
    }
}

impl SettingsBackend for RecordingBackend {
    fn compile_schemas(&self, schema_dir: &Path) -> io::Result<()> {
        self.record(format!("compile-schemas {}", schema_dir.display()));
        self.tool_result()
    }

    fn reload(&self) -> io::Result<()> {
        self.record("reload".to_string());
        self.tool_result()
    }

    fn write_key(&self, file: &str, group: &str, key: &str, value: &str) -> io::Result<()> {
        self.record(format!("write-key {file} {group} {key} {value}"));

        let base_key = key.strip_suffix("/$i/").unwrap_or(key);
        if self.rejected_keys.iter().any(|k| k == base_key) {
            return Err(io::Error::other("write rejected"));
        }

        let Some(root) = &self.write_root else {
            return Ok(());
        };
        let path = root.join(file);
        let contents = fs::read_to_string(&path).unwrap_or_default();

        let conflict_marker = format!("{base_key}[$i]=");
        if contents.lines().any(|line| line.contains(&conflict_marker)) {
            return Err(io::Error::other("locked entry already present"));
        }

        let written = format!("{key}={value}");
        let mut lines: Vec<String> = contents.lines().map(str::to_string).collect();
        let prefix = format!("{key}=");
        match lines.iter_mut().find(|line| line.starts_with(&prefix)) {
            Some(line) => *line = written,
            None => lines.push(written),
        }
        fs::write(&path, format!("{}\n", lines.join("\n")))
    }

    fn set_user_setting(&self, namespace: &str, key: &str, value: &str) -> io::Result<()> {
        self.record(format!("set-user {namespace} {key} {value}"));
        self.tool_result()
    }

    fn run_widget_tool(&self, tool: &str, value: &str) -> io::Result<()> {
        self.record(format!("widget-tool {tool} {value}"));
        self.tool_result()
    }
}
