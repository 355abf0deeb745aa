//! Background import of launchers created by WineZGUI.
//!
//! One pass walks the foreign prefixes root in sorted order, hands every
//! prefix directory that holds a `*.sh` launcher to a [`ScriptConverter`], and
//! counts the distinct metadata files that came back. Per-prefix failures are
//! logged and skipped. The spinner is hidden and the launcher list reloaded on
//! every exit path, including panics on the worker.

use super::winezgui::{WineZguiConverter, shell_scripts};
use crate::metrics::Metrics;
use crate::state::StateManager;
use crate::ui::{Dialog, Scheduler, UiSurface};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexSet;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use thiserror::Error;
use walkdir::WalkDir;

pub const SPINNER_TITLE: &str = "Importing WineZGUI Scripts";

/// Errors raised while importing foreign launchers
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("WineZGUI prefixes directory not found: {0}")]
    RootNotFound(Utf8PathBuf),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: Utf8PathBuf, message: String },

    #[error("Failed to serialize launcher {path}: {source}")]
    Serialize {
        path: Utf8PathBuf,
        #[source]
        source: serde_yaml_ng::Error,
    },
}

/// Per-prefix conversion.
///
/// Must be repeatable: running it twice over the same directory yields the
/// same target paths, and only files it actually created are returned.
pub trait ScriptConverter: Send + Sync {
    fn convert_prefix(&self, prefix_dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, ImportError>;
}

/// Outcome of one import pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Distinct metadata files created, in creation order
    pub created: IndexSet<Utf8PathBuf>,
    pub prefixes_scanned: usize,
    pub prefixes_failed: usize,
    pub cancelled: bool,
}

impl ImportSummary {
    pub fn created_count(&self) -> usize {
        self.created.len()
    }
}

/// Cloneable handle that starts import passes.
#[derive(Clone)]
pub struct Importer {
    source_root: Utf8PathBuf,
    state: StateManager,
    scheduler: Arc<dyn Scheduler>,
    converter: Arc<dyn ScriptConverter>,
    stop_processing: Arc<AtomicBool>,
    metrics: Arc<Metrics>,
}

impl Importer {
    pub fn new(source_root: Utf8PathBuf, state: StateManager, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            source_root,
            state,
            scheduler,
            converter: Arc::new(WineZguiConverter::new()),
            stop_processing: Arc::new(AtomicBool::new(false)),
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn with_converter(mut self, converter: Arc<dyn ScriptConverter>) -> Self {
        self.converter = converter;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn source_root(&self) -> &Utf8Path {
        &self.source_root
    }

    /// Shared cancellation flag, polled between prefixes.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_processing)
    }

    /// Ask the running pass to stop after the current prefix.
    pub fn request_stop(&self) {
        tracing::info!("Import stop requested");
        self.stop_processing.store(true, Ordering::SeqCst);
    }

    /// Start a background import pass. Call on the UI thread.
    ///
    /// # Returns
    /// `false` if a pass is already running; nothing is started in that case.
    pub fn import_external_scripts(&self, suppress_empty_dialog: bool) -> bool {
        if !self.state.begin_import() {
            tracing::warn!("Import already in progress, ignoring request");
            return false;
        }
        self.stop_processing.store(false, Ordering::SeqCst);

        tracing::info!("Starting WineZGUI import from {}", self.source_root);
        self.scheduler.post(Box::new(|ui: &dyn UiSurface| {
            ui.print_method_name("import_external_scripts");
            ui.show_spinner(SPINNER_TITLE);
        }));

        let importer = self.clone();
        self.scheduler.spawn_worker(Box::new(move || {
            importer.run_pass(suppress_empty_dialog);
        }));
        true
    }

    fn run_pass(&self, suppress_empty_dialog: bool) {
        let started = Instant::now();
        let mut finalizer = Finalizer {
            scheduler: Arc::clone(&self.scheduler),
            state: self.state.clone(),
            created: 0,
            dialog: None,
        };

        match self.scan_and_convert() {
            Ok(summary) => {
                let created = summary.created_count();
                finalizer.created = created;
                finalizer.dialog = report_dialog(created, suppress_empty_dialog);

                self.metrics.record_import(created, started.elapsed());
                tracing::info!(
                    "Import finished: {} created, {} prefixes scanned, {} failed{} ({:.2}s)",
                    created,
                    summary.prefixes_scanned,
                    summary.prefixes_failed,
                    if summary.cancelled { ", cancelled" } else { "" },
                    started.elapsed().as_secs_f64()
                );
            }
            Err(ImportError::RootNotFound(root)) => {
                tracing::warn!("WineZGUI prefixes directory not found: {}", root);
                finalizer.dialog = Some(Dialog::Info {
                    title: "Directory Not Found".to_string(),
                    body: format!("The WineZGUI prefixes directory does not exist:\n{}", root),
                });
            }
            Err(e) => {
                tracing::error!("Import failed: {}", e);
                finalizer.dialog = Some(Dialog::Error {
                    title: "Import Failed".to_string(),
                    body: e.to_string(),
                });
            }
        }
    }

    /// Blocking. Run discovery and conversion without touching the UI.
    pub fn scan_and_convert(&self) -> Result<ImportSummary, ImportError> {
        let prefixes = discover_prefixes(&self.source_root)?;
        tracing::info!("Found {} WineZGUI prefixes to process", prefixes.len());

        let mut summary = ImportSummary::default();
        for prefix_dir in prefixes {
            if self.stop_processing.load(Ordering::SeqCst) {
                tracing::info!("Import cancelled before {}", prefix_dir);
                summary.cancelled = true;
                break;
            }

            summary.prefixes_scanned += 1;
            let converted = panic::catch_unwind(AssertUnwindSafe(|| {
                self.converter.convert_prefix(&prefix_dir)
            }));

            match converted {
                Ok(Ok(paths)) => {
                    for path in paths {
                        if !summary.created.insert(path.clone()) {
                            tracing::debug!("{} already counted in this pass", path);
                        }
                    }
                }
                Ok(Err(e)) => {
                    tracing::warn!("Failed to convert {}: {}", prefix_dir, e);
                    summary.prefixes_failed += 1;
                    self.metrics.record_prefix_failed();
                }
                Err(_) => {
                    tracing::error!("Converter panicked on {}", prefix_dir);
                    summary.prefixes_failed += 1;
                    self.metrics.record_prefix_failed();
                }
            }
        }

        Ok(summary)
    }
}

/// Immediate subdirectories of `root` holding at least one top-level `*.sh`,
/// sorted by name.
pub fn discover_prefixes(root: &Utf8Path) -> Result<Vec<Utf8PathBuf>, ImportError> {
    if !root.is_dir() {
        return Err(ImportError::RootNotFound(root.to_path_buf()));
    }

    let mut prefixes = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry under {}: {}", root, e);
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }

        let Ok(dir) = Utf8PathBuf::try_from(entry.into_path()) else {
            tracing::warn!("Skipping non-UTF-8 directory under {}", root);
            continue;
        };
        match shell_scripts(&dir) {
            Ok(scripts) if !scripts.is_empty() => prefixes.push(dir),
            Ok(_) => tracing::debug!("No launcher scripts in {}", dir),
            Err(e) => tracing::warn!("Skipping {}: {}", dir, e),
        }
    }

    Ok(prefixes)
}

fn report_dialog(created: usize, suppress_empty_dialog: bool) -> Option<Dialog> {
    if created > 0 {
        Some(Dialog::Info {
            title: "Import Complete".to_string(),
            body: format!(
                "Created {} launcher {}.",
                created,
                if created == 1 { "file" } else { "files" }
            ),
        })
    } else if !suppress_empty_dialog {
        Some(Dialog::Info {
            title: "No Scripts Found".to_string(),
            body: "No WineZGUI scripts were found to import.".to_string(),
        })
    } else {
        None
    }
}

/// Posts the end-of-pass UI work when dropped, so it happens on every exit
/// path of the worker.
struct Finalizer {
    scheduler: Arc<dyn Scheduler>,
    state: StateManager,
    created: usize,
    dialog: Option<Dialog>,
}

impl Drop for Finalizer {
    fn drop(&mut self) {
        let mut dialog = self.dialog.take();
        if std::thread::panicking() {
            tracing::error!("Import worker panicked");
            dialog = Some(Dialog::Error {
                title: "Import Failed".to_string(),
                body: "The import stopped unexpectedly. See the log for details.".to_string(),
            });
        }

        let state = self.state.clone();
        let created = self.created;
        self.scheduler.post(Box::new(move |ui: &dyn UiSurface| {
            ui.hide_spinner();
            if let Some(dialog) = dialog {
                dialog.show(ui);
            }
            ui.reload_launcher_list();
            state.finish_import(created);
        }));
    }
}
