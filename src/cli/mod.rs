//! CLI surface for gpapply.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use serde::Serialize;

use crate::apply::SystemBackend;
use crate::cache::FsFileCache;
use crate::config::Config;
use crate::decode::{JsonPolicyDecoder, JsonShortcutDecoder};
use crate::engine::{Engine, PassOutput};
use crate::store::{Scope, Shortcut};
use crate::synth::SettingValue;
use crate::Result;

#[derive(Parser, Debug)]
#[command(
    name = "gpapply",
    version,
    about = "Group Policy applier for Linux desktops",
    arg_required_else_help = true
)]
pub struct Cli {
    /// Machine-readable JSON output.
    #[arg(long, global = true, default_value_t = false)]
    pub json: bool,

    /// Errors only.
    #[arg(short = 'q', long, global = true, default_value_t = false)]
    pub quiet: bool,

    /// Debug output (repeat for more).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve policy trees and apply the result.
    Apply(ApplyArgs),

    /// Resolve policy trees and print the result without applying.
    Show(ShowArgs),
}

#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Policy tree root; repeat for ordered merging.
    #[arg(long = "gpt", value_name = "DIR", required = true)]
    pub gpt: Vec<PathBuf>,

    /// Account name for the user pass.
    #[arg(long, requires = "sid")]
    pub user: Option<String>,

    /// Security identifier for the user pass.
    #[arg(long, requires = "user")]
    pub sid: Option<String>,

    /// Synthesize but do not touch any target store.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Policy tree root; repeat for ordered merging.
    #[arg(long = "gpt", value_name = "DIR", required = true)]
    pub gpt: Vec<PathBuf>,

    /// Account name for the user pass.
    #[arg(long, requires = "sid")]
    pub user: Option<String>,

    /// Security identifier for the user pass.
    #[arg(long, requires = "user")]
    pub sid: Option<String>,
}

pub fn parse_from<I, T>(args: I) -> Cli
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Cli::parse_from(args)
}

pub fn run(cli: Cli, config: &Config) -> Result<()> {
    let decoder = JsonPolicyDecoder;
    let shortcut_decoder = JsonShortcutDecoder;
    let cache = FsFileCache::open_default();
    let backend = SystemBackend;
    let engine = Engine::new(config, &decoder, &shortcut_decoder, &cache, &backend);

    match cli.command {
        Commands::Apply(args) => {
            if args.dry_run {
                return preview(&engine, &args.gpt, args.sid.as_deref(), cli.json);
            }
            engine.run_machine(&args.gpt)?;
            if let (Some(user), Some(sid)) = (&args.user, &args.sid) {
                engine.run_user(&args.gpt, sid, user)?;
            }
            Ok(())
        }
        Commands::Show(args) => preview(&engine, &args.gpt, args.sid.as_deref(), cli.json),
    }
}

#[derive(Serialize)]
struct Preview<'a> {
    machine: &'a PassOutput,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<&'a PassOutput>,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    shortcuts: &'a [Shortcut],
}

fn preview(engine: &Engine<'_>, roots: &[PathBuf], sid: Option<&str>, json: bool) -> Result<()> {
    let store = engine.resolve(roots, sid)?;
    let machine = engine.synthesize_machine(&store);
    let user = sid.map(|sid| engine.synthesize_user(&store, sid));
    let shortcuts = sid.map(|sid| store.user_shortcuts(sid)).unwrap_or(&[]);

    if json {
        let view = Preview {
            machine: &machine,
            user: user.as_ref(),
            shortcuts,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&view).expect("preview serializes")
        );
        return Ok(());
    }

    print_pass(Scope::Machine, &machine);
    if let Some(user) = &user {
        print_pass(Scope::User, user);
    }
    for shortcut in shortcuts {
        println!(
            "shortcut {} -> {} {}",
            shortcut.name,
            shortcut.target,
            shortcut.arguments.as_deref().unwrap_or_default()
        );
    }
    Ok(())
}

fn print_pass(scope: Scope, output: &PassOutput) {
    let scope = scope.as_str();
    for setting in &output.gsettings {
        println!(
            "{scope} gsettings {}.{} = {}{}",
            setting.namespace,
            setting.key,
            display_value(&setting.value),
            lock_suffix(setting.locked)
        );
    }
    for setting in &output.ini.settings {
        println!(
            "{scope} ini {}/{}/{} = {}{}",
            setting.namespace,
            setting.section.as_deref().unwrap_or_default(),
            setting.key,
            display_value(&setting.value),
            lock_suffix(setting.locked)
        );
    }
    for action in &output.ini.widget_actions {
        println!("{scope} widget {} {}", action.tool, action.value);
    }
}

fn display_value(value: &SettingValue) -> String {
    match value {
        SettingValue::Scalar(s) => s.clone(),
        SettingValue::List(items) => format!("[{}]", items.join(", ")),
    }
}

fn lock_suffix(locked: Option<bool>) -> &'static str {
    match locked {
        Some(true) => " (locked)",
        _ => "",
    }
}
