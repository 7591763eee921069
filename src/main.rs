use std::{
    io::{self, Write},
    path::PathBuf,
    process::ExitCode,
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use clap::{error::ErrorKind, CommandFactory, Parser, Subcommand};
use tracing::{error, info};

use kbdcmd::{
    actions::{ActionRunner, ActionTable},
    config::Config,
    input::{buffer::InputBuffer, dispatcher::Dispatcher, synth},
    keymap, marks::MarkStore,
    permissions,
    snippets::{SnippetEngine, SnippetTable},
    telemetry,
    workspace::{self, Workspace},
};

#[derive(Parser)]
#[command(name = "kbdcmd", about = "Keyboard automation: keybindings, snippets, window marks")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Focus the application at the given bundle path, launching if needed
    Open {
        /// Application bundle path, e.g. /Applications/Safari.app
        path: PathBuf,
    },
    /// Cycle the frontmost application's windows
    Cycle,
    /// Open-or-focus an application, then cycle its windows
    OpenCycle {
        /// Application bundle path
        path: PathBuf,
    },
    /// Switch to a numbered virtual desktop (1-9)
    SwitchDesktop {
        /// Desktop number
        number: u8,
    },
    /// Run the key-event listener daemon
    Daemon,
    /// Mark the foreground window with a one-character label
    MarkWindow,
    /// Focus the window previously marked with a label
    FocusMark {
        /// Single-character label
        label: String,
    },
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                    let _ = err.print();
                    ExitCode::SUCCESS
                }
                _ => {
                    // Unrecognized input: show what is available and fail.
                    let _ = err.print();
                    eprintln!();
                    let _ = Cli::command().print_help();
                    ExitCode::FAILURE
                }
            };
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;

    let file_logging = matches!(cli.command, Command::Daemon) && config.telemetry.enabled;
    telemetry::init(file_logging, &config.telemetry.log_path)?;

    // Every command drives window or input APIs; a missing grant is fatal
    // before anything else happens.
    permissions::check_all_permissions()?;

    match cli.command {
        Command::Open { path } => {
            let runner = command_runner()?;
            match runner.open_or_focus(&path) {
                Ok(status) => info!(?status, path = %path.display(), "open"),
                Err(e) => error!(error = %e, path = %path.display(), "open failed"),
            }
            Ok(())
        }
        Command::Cycle => {
            let runner = command_runner()?;
            if let Err(e) = runner.cycle_windows() {
                error!(error = %e, "cycle failed");
            }
            Ok(())
        }
        Command::OpenCycle { path } => {
            let runner = command_runner()?;
            runner.open_cycle(&path);
            Ok(())
        }
        Command::SwitchDesktop { number } => {
            let runner = command_runner()?;
            runner.switch_desktop(number);
            Ok(())
        }
        Command::Daemon => run_daemon(&config),
        Command::MarkWindow => mark_window(&config),
        Command::FocusMark { label } => focus_mark(&config, &label),
    }
}

/// Collaborators for one-shot commands.
fn command_runner() -> Result<ActionRunner> {
    let ws = workspace::system_workspace()?;
    let sink = synth::system_sink()?;
    Ok(ActionRunner::new(ws, sink))
}

fn run_daemon(config: &Config) -> Result<()> {
    let ws = workspace::system_workspace()?;
    let sink = synth::system_sink()?;
    let layout = keymap::system_layout()?;

    let bindings = ActionTable::from_entries(
        config.bindings.iter().map(|(k, v)| (k.as_str(), v.as_str())),
    )
    .context("invalid [bindings] in config")?;
    let table = SnippetTable::from_entries(
        config.snippets.iter().map(|(k, v)| (k.as_str(), v.as_str())),
    );
    let buffer = InputBuffer::new(Duration::from_millis(config.daemon.staleness_ms));

    let runner = ActionRunner::new(ws, Arc::clone(&sink));
    let engine = SnippetEngine::new(table, buffer, layout, sink);
    let dispatcher = Dispatcher::new(bindings, runner, engine);

    println!("kbdcmd daemon started");
    info!(
        bindings = config.bindings.len(),
        snippets = config.snippets.len(),
        staleness_ms = config.daemon.staleness_ms,
        "daemon starting"
    );

    run_tap(dispatcher)
}

#[cfg(target_os = "macos")]
fn run_tap(dispatcher: Dispatcher) -> Result<()> {
    kbdcmd::input::tap::run(dispatcher)?;
    Ok(())
}

#[cfg(not(target_os = "macos"))]
fn run_tap(_dispatcher: Dispatcher) -> Result<()> {
    anyhow::bail!("the daemon requires macOS")
}

fn mark_window(config: &Config) -> Result<()> {
    let ws = workspace::system_workspace()?;
    let window = ws
        .foreground_window()
        .context("no foreground window to mark")?;

    println!(
        "Marking window: \"{}\" (Application: {})",
        window.title, window.app_name
    );
    print!("Enter a single character label: ");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let input = line.trim();
    let mut chars = input.chars();
    let label = match (chars.next(), chars.next()) {
        (Some(label), None) => label,
        _ => {
            error!(input, "label must be exactly one character");
            return Ok(());
        }
    };

    let marks_path = Config::expand_path(&config.marks.file_path)?;
    let mut store = MarkStore::load(marks_path);
    store.set(window.id, label)?;
    if let Err(e) = ws.activate_window(window.id) {
        error!(error = %e, "could not re-focus marked window");
    }
    println!("Marked as {label}");
    Ok(())
}

fn focus_mark(config: &Config, label: &str) -> Result<()> {
    let mut chars = label.chars();
    let label = match (chars.next(), chars.next()) {
        (Some(label), None) => label,
        _ => {
            error!(label, "label must be exactly one character");
            return Ok(());
        }
    };

    let marks_path = Config::expand_path(&config.marks.file_path)?;
    let store = MarkStore::load(marks_path);
    match store.window_for(label) {
        Some(id) => {
            let ws = workspace::system_workspace()?;
            if let Err(e) = ws.activate_window(id) {
                error!(error = %e, window = id, "could not focus marked window");
            }
        }
        None => info!(%label, "no window marked with that label"),
    }
    Ok(())
}
