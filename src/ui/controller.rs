// Controller - wires user commands to the core services
//
// This module contains the Controller which coordinates between:
// - The UI thread (whatever drives the EventLoopBridge)
// - StateManager (application state)
// - PrefixStore, Importer and the host probe (business logic)
//
// It handles:
// - Loading settings, reporting unreadable ones and falling back to defaults
// - Dispatching mode, architecture and import commands
// - Subscribing to state changes for logging
// - Building the status summary

use super::{Dialog, EventLoopBridgeHandle, Scheduler, UiSurface};
use crate::config::ConfigManager;
use crate::metrics::Metrics;
use crate::models::{Arch, PrefixLayout, Settings};
use crate::services::host_probe::{self, missing_requirements, report_missing};
use crate::services::{Importer, PrefixStore};
use crate::state::{StateChange, StateManager};
use camino::Utf8PathBuf;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

/// Delay before the startup probe runs, so the first frame isn't held up.
pub const STARTUP_PROBE_DELAY: Duration = Duration::from_millis(500);

/// Controller that wires front-end commands to state and services
///
/// All command methods must be called on the UI thread.
///
/// # Example
/// ```ignore
/// let runtime = tokio::runtime::Runtime::new()?;
/// let mut bridge = EventLoopBridge::new(runtime.handle().clone());
/// let settings = Controller::settings_or_default(config.load_settings(), &bridge.clone_handle());
///
/// let controller = Controller::new(settings, config, bridge.clone_handle());
/// controller.set_mode(true);
/// bridge.run_until_idle(&ui);
/// ```
pub struct Controller {
    state: StateManager,
    scheduler: EventLoopBridgeHandle,
    store: PrefixStore,
    importer: Importer,
    metrics: Arc<Metrics>,
}

impl Controller {
    pub fn new(settings: Settings, config: ConfigManager, scheduler: EventLoopBridgeHandle) -> Self {
        let state = StateManager::new();
        state.load_settings(settings.clone());

        let metrics = Arc::clone(scheduler.metrics());
        let shared_scheduler: Arc<dyn Scheduler> = Arc::new(scheduler.clone());

        let store = PrefixStore::new(
            PrefixLayout::new(settings.resolved_data_root()),
            state.clone(),
            config,
            Arc::clone(&shared_scheduler),
        )
        .with_metrics(Arc::clone(&metrics));

        let importer = Importer::new(
            settings.resolved_winezgui_prefixes(),
            state.clone(),
            shared_scheduler,
        )
        .with_metrics(Arc::clone(&metrics));

        tracing::info!(
            "Controller initialized: data_root={}, winezgui_prefixes={}",
            settings.resolved_data_root(),
            settings.resolved_winezgui_prefixes()
        );

        Self {
            state,
            scheduler,
            store,
            importer,
            metrics,
        }
    }

    /// Unwrap a settings load, reporting a failure through an info dialog.
    ///
    /// An unreadable settings file is a precondition failure: nothing is
    /// rolled back, the session just runs on defaults.
    pub fn settings_or_default(loaded: anyhow::Result<Settings>, scheduler: &dyn Scheduler) -> Settings {
        match loaded {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Using default settings: {:#}", e);
                let dialog = Dialog::Info {
                    title: "Settings Unreadable".to_string(),
                    body: format!("{:#}\n\nDefault settings will be used.", e),
                };
                scheduler.post(Box::new(move |ui: &dyn UiSurface| dialog.show(ui)));
                Settings::default()
            }
        }
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub fn store(&self) -> &PrefixStore {
        &self.store
    }

    pub fn importer(&self) -> &Importer {
        &self.importer
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Startup work: schedule the delayed host probe.
    pub fn start(&self) {
        host_probe::schedule_startup_probe(self.scheduler.clone(), STARTUP_PROBE_DELAY);
    }

    /// Probe the host now and always answer, even when nothing is missing.
    pub fn probe_host(&self) {
        let scheduler = self.scheduler.clone();
        self.scheduler.spawn_worker(Box::new(move || {
            let report = missing_requirements();
            if report.is_empty() {
                scheduler.post(Box::new(|ui: &dyn UiSurface| {
                    ui.show_info("Host Ready", "All required programs are installed.");
                }));
            } else {
                report_missing(&report, &scheduler);
            }
        }));
    }

    pub fn set_mode(&self, single_prefix: bool) {
        tracing::info!("Prefix mode requested: single_prefix={}", single_prefix);
        self.store.set_mode(single_prefix);
    }

    pub fn set_arch(&self, arch: Arch) {
        tracing::info!("Architecture requested: {}", arch);
        self.store.set_arch(arch);
    }

    /// Start an import unless one is already running.
    pub fn import(&self, suppress_empty_dialog: bool) -> bool {
        let started = self.importer.import_external_scripts(suppress_empty_dialog);
        if !started {
            self.scheduler.post(Box::new(|ui: &dyn UiSurface| {
                ui.show_info("Import In Progress", "An import is already running.");
            }));
        }
        started
    }

    /// Show the status summary in an info dialog.
    pub fn show_status(&self) {
        let report = self.status();
        self.scheduler.post(Box::new(move |ui: &dyn UiSurface| {
            ui.show_info("WineCharm Status", &report.to_string());
        }));
    }

    pub fn status(&self) -> StatusReport {
        let snapshot = self.state.snapshot();
        let arch = snapshot.arch();

        StatusReport {
            single_prefix: snapshot.single_prefix(),
            arch,
            data_root: self.store.layout().data_root().to_path_buf(),
            template_path: self.store.template_path(arch),
            template_ready: self.store.template_path(arch).is_dir(),
            shared_prefix: snapshot.runtime.shared_prefix.clone(),
            shared_ready: self.store.is_provisioned(arch),
            winezgui_prefixes: self.importer.source_root().to_path_buf(),
            is_importing: snapshot.is_importing,
        }
    }

    /// Log every state change until the runtime shuts down.
    pub fn watch_state(&self, runtime: &tokio::runtime::Handle) {
        let mut rx = self.state.subscribe();
        runtime.spawn(async move {
            tracing::debug!("State subscription task started");
            loop {
                match rx.recv().await {
                    Ok(change) => log_change(&change),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("State subscription lagged, {} events skipped", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::debug!("State subscription task terminated");
        });
    }
}

fn log_change(change: &StateChange) {
    match change {
        StateChange::ModeChanged { single_prefix } => {
            tracing::info!("Mode changed: single_prefix={}", single_prefix);
        }
        StateChange::ArchChanged { arch } => tracing::info!("Architecture changed: {}", arch),
        StateChange::RuntimePathsRefreshed { shared_prefix } => {
            tracing::debug!("Runtime paths refreshed (shared prefix: {})", shared_prefix);
        }
        StateChange::ImportStarted => tracing::debug!("Import started"),
        StateChange::ImportFinished { created } => {
            tracing::info!("Import finished: {} launchers created", created);
        }
        StateChange::TemplateReady { arch } => tracing::info!("Template ready: {}", arch),
    }
}

/// Snapshot of prefix configuration and on-disk readiness
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub single_prefix: bool,
    pub arch: Arch,
    pub data_root: Utf8PathBuf,
    pub template_path: Utf8PathBuf,
    pub template_ready: bool,
    pub shared_prefix: Option<Utf8PathBuf>,
    pub shared_ready: bool,
    pub winezgui_prefixes: Utf8PathBuf,
    pub is_importing: bool,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ready = |yes: bool| if yes { "ready" } else { "missing" };

        writeln!(
            f,
            "Mode:         {}",
            if self.single_prefix { "single prefix" } else { "prefix per game" }
        )?;
        writeln!(f, "Architecture: {}", self.arch)?;
        writeln!(f, "Data root:    {}", self.data_root)?;
        writeln!(f, "Template:     {} ({})", self.template_path, ready(self.template_ready))?;
        if let Some(shared) = &self.shared_prefix {
            writeln!(f, "Shared:       {} ({})", shared, ready(self.shared_ready))?;
        }
        write!(f, "WineZGUI:     {}", self.winezgui_prefixes)
    }
}
