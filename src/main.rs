//! WineCharm - Wine prefix lifecycle manager
//!
//! Command-line front end.
//!
//! # Overview
//!
//! The main thread plays the part of the UI thread: it issues one command,
//! then drives the [`EventLoopBridge`] until no UI task, worker or timer is
//! left, and exits. Blocking filesystem work runs on tokio's blocking pool.
//!
//! # Execution Flow
//!
//! 1. Parse arguments, load `settings.yaml` (`WINECHARM_*` env overrides apply)
//! 2. Initialize logging → `<data-root>/logs/winecharm.<date>`
//! 3. Create the tokio runtime and the event loop bridge
//! 4. Create the [`Controller`] and dispatch the command
//! 5. Run the loop until idle, log metrics, shut the runtime down
//!
//! Exit status is non-zero when an error dialog was shown.

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand, ValueEnum};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use winecharm::metrics::Metrics;
use winecharm::ui::{ConsoleUi, Controller, EventLoopBridge};
use winecharm::{APP_NAME, Arch, ConfigManager, PrefixLayout, VERSION};

#[derive(Parser, Debug)]
#[command(name = "winecharm", version, about = "Manage Wine prefixes and launchers")]
struct Cli {
    /// Data directory holding templates, prefixes and logs
    #[arg(long, global = true, value_name = "PATH")]
    data_root: Option<Utf8PathBuf>,

    /// WineZGUI prefixes directory to import from
    #[arg(long, global = true, value_name = "PATH")]
    winezgui_prefixes: Option<Utf8PathBuf>,

    /// Directory holding settings.yaml
    #[arg(long, global = true, value_name = "PATH")]
    config_dir: Option<Utf8PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Skip the host program check at startup
    #[arg(long, global = true)]
    no_probe: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the required external programs are installed
    Probe,

    /// Switch between one prefix per game and a single shared prefix
    Mode {
        #[arg(value_enum)]
        mode: ModeArg,
    },

    /// Switch the active prefix architecture
    Arch {
        #[arg(value_enum)]
        arch: ArchArg,
    },

    /// Convert WineZGUI launchers into .charm files
    Import {
        /// Don't report when nothing was found
        #[arg(long)]
        quiet: bool,
    },

    /// Show the current prefix configuration
    Status,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Single,
    Multi,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ArchArg {
    Win32,
    Win64,
}

impl From<ArchArg> for Arch {
    fn from(arch: ArchArg) -> Self {
        match arch {
            ArchArg::Win32 => Arch::Win32,
            ArchArg::Win64 => Arch::Win64,
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = match &cli.config_dir {
        Some(dir) => ConfigManager::new(dir)?,
        None => ConfigManager::from_xdg()?,
    };
    let loaded = config.load_settings();

    let data_root = cli
        .data_root
        .clone()
        .or_else(|| loaded.as_ref().ok().and_then(|s| s.data_root.clone()))
        .unwrap_or_else(|| winecharm::Settings::default().resolved_data_root());
    let debug = cli.debug || loaded.as_ref().map(|s| s.debug).unwrap_or(false);

    let _log_guard = winecharm::logging::setup_logging_with_console(
        &PrefixLayout::new(&data_root).logs_dir(),
        APP_NAME,
        debug,
        debug,
    )?;
    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("winecharm-worker")
        .build()
        .context("Failed to create tokio runtime")?;

    let metrics = Arc::new(Metrics::new());
    let mut bridge = EventLoopBridge::with_metrics(runtime.handle().clone(), Arc::clone(&metrics));
    let ui = ConsoleUi::new();

    let mut settings = Controller::settings_or_default(loaded, &bridge.clone_handle());
    if let Some(root) = cli.data_root {
        settings.data_root = Some(root);
    }
    if let Some(prefixes) = cli.winezgui_prefixes {
        settings.winezgui_prefixes = Some(prefixes);
    }

    let controller = Controller::new(settings, config, bridge.clone_handle());
    controller.watch_state(runtime.handle());

    if !cli.no_probe && !matches!(cli.command, Command::Probe) {
        controller.start();
    }

    match cli.command {
        Command::Probe => controller.probe_host(),
        Command::Mode { mode } => controller.set_mode(matches!(mode, ModeArg::Single)),
        Command::Arch { arch } => controller.set_arch(arch.into()),
        Command::Import { quiet } => {
            let importer = controller.importer().clone();
            runtime.spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    importer.request_stop();
                }
            });
            controller.import(quiet);
        }
        Command::Status => controller.show_status(),
    }

    let executed = bridge.run_until_idle(&ui);
    tracing::debug!("Event loop idle after {} UI tasks", executed);

    metrics.log_summary();
    runtime.shutdown_timeout(Duration::from_secs(5));
    tracing::info!("Shutdown complete");

    Ok(if ui.errors_shown() > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
