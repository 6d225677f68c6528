//! hexscript
//!
//! Runs hex editor scripts from the command line against a data file.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use hexscript::{AppConfig, ConsoleHost, ScriptCatalog, ScriptWatcher, outcome, parse_selection};
use hexscript_runtime::{Command, CommandKind, ReloadPolicy, ScriptLoader};

/// Hex editor script loader
#[derive(Parser, Debug)]
#[command(name = "hexscript", version)]
#[command(about = "Load and run hex editor scripts", long_about = None)]
struct Args {
    /// Configuration file (defaults to ./hexscript.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Scripts root, overrides the configuration
    #[arg(short, long)]
    scripts: Option<PathBuf>,

    /// File backing script memory
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Current selection reported to scripts, as START:END
    #[arg(long, value_parser = parse_selection)]
    selection: Option<(u64, u64)>,

    /// Answer "yes" to every yes/no question
    #[arg(long)]
    answer_yes: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Run a raw `KIND||METHOD||PATH` command
    Run { wire: String },
    /// Run a method in a transient context
    Exec { path: PathBuf, method: String },
    /// Check whether the entry point has a method (0 = present, 1 = absent)
    Check { path: PathBuf, method: String },
    /// Load a script persistently and report what it registered
    Load {
        path: PathBuf,
        method: Option<String>,
        /// Call every registered view and menu item once
        #[arg(long)]
        invoke_views: bool,
        /// Dump the content of every registered provider
        #[arg(long)]
        read_providers: bool,
    },
    /// Run `Main` of a discovered foreground script
    Script { name: String },
    /// Discover scripts and list them
    List,
    /// Discover scripts and rescan on every change
    Watch,
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hexscript=info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(scripts) = args.scripts {
        config.scripts_dir = scripts;
    }

    let host = match &args.data {
        Some(path) => ConsoleHost::from_file(path)
            .with_context(|| format!("Failed to read data file {}", path.display()))?,
        None => ConsoleHost::default(),
    };
    let host = Arc::new(host.with_answer(args.answer_yes));
    host.set_selection(args.selection);
    let mut loader = ScriptLoader::new(config.loader.clone(), host.clone());

    // Scripts may patch memory; persist it for commands that run code.
    let write_back = !matches!(args.command, Cmd::Check { .. } | Cmd::List);

    let code = match args.command {
        Cmd::Run { wire } => loader.execute(&wire),
        Cmd::Exec { path, method } => loader.run(&Command::new(CommandKind::Exec, method, path)),
        Cmd::Check { path, method } => loader.run(&Command::new(CommandKind::Check, method, path)),
        Cmd::Load {
            path,
            method,
            invoke_views,
            read_providers,
        } => {
            let code = loader.run(&Command::new(
                CommandKind::Load,
                method.unwrap_or_default(),
                path,
            ));
            if invoke_views {
                for (handle, result) in host.invoke_callbacks(&loader) {
                    match result {
                        Ok(()) => info!("Callback {} ran", handle),
                        Err(e) => error!("Callback {} failed: {}", handle, e),
                    }
                }
            }
            if read_providers {
                for (name, result) in host.read_providers(&loader) {
                    match result {
                        Ok(bytes) => println!("{}: {}", name, hex_string(&bytes)),
                        Err(e) => error!("Provider '{}' failed: {}", name, e),
                    }
                }
            }
            let registrations = serde_json::to_string_pretty(&host.registrations())?;
            println!("{registrations}");
            code
        }
        Cmd::Script { name } => {
            let mut catalog = ScriptCatalog::new();
            catalog.load_all(&mut loader, &config.scripts_dir)?;
            match catalog.get(&name) {
                None => anyhow::bail!("No script named '{}' in {}", name, config.scripts_dir.display()),
                Some(script) if script.background => {
                    info!("'{}' is a background script, it ran when it was loaded", name);
                    0
                }
                Some(_) => catalog.run(&mut loader, &name).unwrap_or(0),
            }
        }
        Cmd::List => {
            let mut catalog = ScriptCatalog::new();
            catalog.load_all(&mut loader, &config.scripts_dir)?;
            for script in catalog.scripts() {
                let kind = if script.background { "background" } else { "foreground" };
                println!("{:<24} {:<10} {}", script.name, kind, script.path.display());
            }
            0
        }
        Cmd::Watch => {
            watch(&mut loader, &config)?;
            0
        }
    };

    if let Some(path) = args.data.as_deref().filter(|_| write_back) {
        std::fs::write(path, host.memory())
            .with_context(|| format!("Failed to write data file {}", path.display()))?;
    }

    println!("result: {}", outcome::describe(code));
    Ok(ExitCode::from(outcome::exit_status(code)))
}

fn hex_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn watch(loader: &mut ScriptLoader, config: &AppConfig) -> Result<()> {
    let watcher = ScriptWatcher::new(&config.scripts_dir, &config.loader.module_extension)
        .with_context(|| format!("Failed to watch {}", config.scripts_dir.display()))?;
    let root: &Path = watcher.root();

    let mut catalog = ScriptCatalog::new();
    let added = catalog.load_all(loader, root)?;
    info!("Discovered {} scripts in {}", added, root.display());

    let debounce = Duration::from_millis(config.watch.debounce_ms);

    while let Some(changes) = watcher.next_batch(debounce) {
        for change in &changes {
            info!("Scripts changed: {}", change.script_dir.display());
            if config.loader.reload_policy == ReloadPolicy::Reinitialize {
                catalog.reload(loader, &change.script_dir);
            }
        }

        match catalog.load_all(loader, root) {
            Ok(added) => info!("Rescanned scripts, {} new", added),
            Err(e) => error!("Failed to rescan {}: {}", root.display(), e),
        }
    }

    warn!("File watcher stopped");
    Ok(())
}
