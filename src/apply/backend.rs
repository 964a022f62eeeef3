//! Capability seam for external settings tooling.
//!
//! All process execution goes through [`SettingsBackend`], so resolution and
//! synthesis stay testable without spawning anything.

use std::io;
use std::path::Path;
use std::process::Command;

/// Tools directory holding the plasma-apply-* utilities.
const WIDGET_TOOL_PATH: &str = "/usr/lib/kf5/bin";

pub trait SettingsBackend {
    /// Recompile the settings-service schemas in a directory.
    fn compile_schemas(&self, schema_dir: &Path) -> io::Result<()>;

    /// Tell the settings-service backend to reload its databases.
    fn reload(&self) -> io::Result<()>;

    /// Write one key through the per-key configuration writer tool.
    fn write_key(&self, file: &str, group: &str, key: &str, value: &str) -> io::Result<()>;

    /// Set one settings-service key in the calling user's session.
    fn set_user_setting(&self, namespace: &str, key: &str, value: &str) -> io::Result<()>;

    /// Run a widget utility (theme, cursor, wallpaper) with one argument.
    fn run_widget_tool(&self, tool: &str, value: &str) -> io::Result<()>;
}

/// Real backend spawning the system tools.
#[derive(Debug, Default)]
pub struct SystemBackend;

impl SettingsBackend for SystemBackend {
    fn compile_schemas(&self, schema_dir: &Path) -> io::Result<()> {
        run(Command::new("/usr/bin/glib-compile-schemas").arg(schema_dir))
    }

    fn reload(&self) -> io::Result<()> {
        run(Command::new("/usr/bin/dconf").arg("update"))
    }

    fn write_key(&self, file: &str, group: &str, key: &str, value: &str) -> io::Result<()> {
        run(Command::new("kwriteconfig5").args([
            "--file", file, "--group", group, "--key", key, "--type", "string", value,
        ]))
    }

    fn set_user_setting(&self, namespace: &str, key: &str, value: &str) -> io::Result<()> {
        run(Command::new("gsettings").args(["set", namespace, key, value]))
    }

    fn run_widget_tool(&self, tool: &str, value: &str) -> io::Result<()> {
        run(Command::new(tool)
            .arg(value)
            .env("PATH", widget_tool_path()))
    }
}

fn widget_tool_path() -> String {
    match std::env::var("PATH") {
        Ok(path) => format!("{WIDGET_TOOL_PATH}:{path}"),
        Err(_) => WIDGET_TOOL_PATH.to_string(),
    }
}

fn run(command: &mut Command) -> io::Result<()> {
    let output = command.output()?;
    if output.status.success() {
        Ok(())
    } else {
        Err(io::Error::other(format!(
            "{:?} exited with {}: {}",
            command.get_program(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}
