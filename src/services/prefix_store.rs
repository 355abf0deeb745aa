//! Prefix store: template and shared prefixes, mode and architecture switching.
//!
//! Owns the two directory families under the data root:
//!
//! - `templates/<arch>`: pristine prefixes, initialized once per architecture
//! - `prefixes/single-<arch>`: the shared prefix used in single-prefix mode,
//!   cloned from the matching template
//!
//! Both are only ever published by renaming a fully built staging sibling, so
//! the canonical paths never expose a half-written tree.
//!
//! Transitions (`set_mode`, `set_arch`) are driven from the UI thread. Blocking
//! filesystem work is handed to the scheduler's workers and the result is
//! posted back before settings are persisted. Any failure restores the
//! previous mode and architecture, re-persists, and shows one error dialog.

use super::prefix_tree::{
    PrefixInitializer, RecursiveCopier, SkeletonInitializer, TreeCopier, publish_atomically,
};
use crate::config::ConfigManager;
use crate::metrics::Metrics;
use crate::models::{Arch, PrefixLayout};
use crate::state::StateManager;
use crate::ui::{Scheduler, UiSurface};
use camino::Utf8PathBuf;
use std::collections::HashMap;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// Errors raised by the prefix store.
///
/// `Clone` so one failed template initialization can be delivered to every
/// continuation waiting on it.
#[derive(Error, Debug, Clone)]
pub enum PrefixError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    #[error("Template prefix for {0} does not exist")]
    TemplateMissing(Arch),

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Failed to save settings: {0}")]
    Settings(String),
}

impl PrefixError {
    pub fn io(path: impl Into<Utf8PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }
}

/// Continuation for [`PrefixStore::ensure_template`], run on the UI thread.
pub type TemplateReady = Box<dyn FnOnce(&dyn UiSurface, Result<(), PrefixError>) + Send>;

const MODE_FAILURE_TITLE: &str = "Prefix Mode Change Failed";
const ARCH_FAILURE_TITLE: &str = "Architecture Change Failed";

/// The part of the settings a transition may roll back.
#[derive(Debug, Clone, Copy)]
struct TransitionSnapshot {
    single_prefix: bool,
    arch: Arch,
}

/// Cloneable handle to the prefix store.
#[derive(Clone)]
pub struct PrefixStore {
    layout: PrefixLayout,
    state: StateManager,
    config: ConfigManager,
    scheduler: Arc<dyn Scheduler>,
    initializer: Arc<dyn PrefixInitializer>,
    copier: Arc<dyn TreeCopier>,
    metrics: Arc<Metrics>,

    /// Continuations waiting on an in-flight template initialization, per arch
    pending_templates: Arc<Mutex<HashMap<Arch, Vec<TemplateReady>>>>,
}

impl PrefixStore {
    pub fn new(
        layout: PrefixLayout,
        state: StateManager,
        config: ConfigManager,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            layout,
            state,
            config,
            scheduler,
            initializer: Arc::new(SkeletonInitializer::new()),
            copier: Arc::new(RecursiveCopier),
            metrics: Arc::new(Metrics::new()),
            pending_templates: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_initializer(mut self, initializer: Arc<dyn PrefixInitializer>) -> Self {
        self.initializer = initializer;
        self
    }

    pub fn with_copier(mut self, copier: Arc<dyn TreeCopier>) -> Self {
        self.copier = copier;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn layout(&self) -> &PrefixLayout {
        &self.layout
    }

    /// The active architecture.
    pub fn current_arch(&self) -> Arch {
        self.state.read(|s| s.arch())
    }

    pub fn template_path(&self, arch: Arch) -> Utf8PathBuf {
        self.layout.template_path(arch)
    }

    pub fn shared_path(&self, arch: Arch) -> Utf8PathBuf {
        self.layout.shared_path(arch)
    }

    /// Make sure the template for `arch` exists, then run `on_ready` on the UI
    /// thread.
    ///
    /// Calls made while an initialization for the same arch is in flight are
    /// queued behind it; only one worker ever initializes a given template.
    pub fn ensure_template(&self, arch: Arch, on_ready: TemplateReady) {
        let mut pending = self
            .pending_templates
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(waiters) = pending.get_mut(&arch) {
            tracing::debug!("Template {} already initializing, queueing continuation", arch);
            waiters.push(on_ready);
            return;
        }

        if self.template_path(arch).is_dir() {
            drop(pending);
            self.scheduler.post(Box::new(move |ui: &dyn UiSurface| {
                on_ready(ui, Ok(()));
            }));
            return;
        }

        pending.insert(arch, vec![on_ready]);
        drop(pending);

        tracing::info!("Initializing {} template at {}", arch, self.template_path(arch));
        let worker = self.clone();
        self.scheduler.spawn_worker(Box::new(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| worker.initialize_template(arch)))
                .unwrap_or_else(|_| {
                    Err(PrefixError::InvariantViolation(format!(
                        "template initialization for {} panicked",
                        arch
                    )))
                });

            let ui_side = worker.clone();
            worker.scheduler.post(Box::new(move |ui: &dyn UiSurface| {
                ui_side.complete_template(arch, result, ui);
            }));
        }));
    }

    /// Blocking. Builds the template for `arch` if it's missing.
    fn initialize_template(&self, arch: Arch) -> Result<(), PrefixError> {
        let template = self.template_path(arch);
        if template.is_dir() {
            return Ok(());
        }

        publish_atomically(&template, |staging| self.initializer.initialize(arch, staging))
            .map_err(|e| PrefixError::io(template.clone(), e))?;

        self.metrics.record_template_initialized();
        tracing::info!("Template {} ready at {}", arch, template);
        Ok(())
    }

    fn complete_template(&self, arch: Arch, result: Result<(), PrefixError>, ui: &dyn UiSurface) {
        let waiters = self
            .pending_templates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&arch)
            .unwrap_or_default();

        match &result {
            Ok(()) => self.state.notify_template_ready(arch),
            Err(e) => tracing::error!("Template {} initialization failed: {}", arch, e),
        }

        for on_ready in waiters {
            on_ready(ui, result.clone());
        }
    }

    /// Blocking. Clones the shared prefix for `arch` from its template unless
    /// it already exists.
    ///
    /// Must run on a worker.
    pub fn ensure_shared(&self, arch: Arch) -> Result<(), PrefixError> {
        let template = self.template_path(arch);
        let shared = self.shared_path(arch);

        if !template.is_dir() {
            if shared.exists() {
                return Err(PrefixError::InvariantViolation(format!(
                    "shared prefix {} exists without template {}",
                    shared, template
                )));
            }
            return Err(PrefixError::TemplateMissing(arch));
        }

        if shared.is_dir() {
            tracing::debug!("Shared prefix {} already present", shared);
            return Ok(());
        }

        tracing::info!("Cloning {} into {}", template, shared);
        publish_atomically(&shared, |staging| {
            self.copier.copy_tree(&template, staging).map(|_| ())
        })
        .map_err(|e| PrefixError::io(shared.clone(), e))?;

        self.metrics.record_prefix_cloned();
        tracing::info!("Shared prefix ready at {}", shared);
        Ok(())
    }

    /// Switch between per-game prefixes (`false`) and one shared prefix (`true`).
    ///
    /// Must be called on the UI thread. Setting the current mode again still
    /// re-persists settings.
    pub fn set_mode(&self, single_prefix: bool) {
        let previous = self.snapshot();
        tracing::info!(
            "Switching prefix mode: single_prefix {} -> {}",
            previous.single_prefix,
            single_prefix
        );

        self.state.set_single_prefix(single_prefix);
        self.apply_transition(previous, MODE_FAILURE_TITLE);
    }

    /// Switch the active architecture.
    ///
    /// Must be called on the UI thread. In single-prefix mode the template and
    /// shared prefix of the new architecture are ensured first.
    pub fn set_arch(&self, arch: Arch) {
        let previous = self.snapshot();
        tracing::info!("Switching architecture: {} -> {}", previous.arch, arch);

        self.state.set_arch(arch);
        self.apply_transition(previous, ARCH_FAILURE_TITLE);
    }

    fn snapshot(&self) -> TransitionSnapshot {
        self.state.read(|s| TransitionSnapshot {
            single_prefix: s.single_prefix(),
            arch: s.arch(),
        })
    }

    fn apply_transition(&self, previous: TransitionSnapshot, failure_title: &'static str) {
        let (single_prefix, arch) = self.state.read(|s| (s.single_prefix(), s.arch()));

        if !single_prefix {
            self.finish_transition(previous, failure_title, Ok(()));
            return;
        }

        let store = self.clone();
        self.ensure_template(
            arch,
            Box::new(move |_ui: &dyn UiSurface, ready: Result<(), PrefixError>| {
                if let Err(e) = ready {
                    store.finish_transition(previous, failure_title, Err(e));
                    return;
                }

                let worker = store.clone();
                store.scheduler.spawn_worker(Box::new(move || {
                    let cloned = panic::catch_unwind(AssertUnwindSafe(|| worker.ensure_shared(arch)))
                        .unwrap_or_else(|_| {
                            Err(PrefixError::InvariantViolation(format!(
                                "cloning the {} shared prefix panicked",
                                arch
                            )))
                        });

                    let ui_side = worker.clone();
                    worker.scheduler.post(Box::new(move |_ui: &dyn UiSurface| {
                        ui_side.finish_transition(previous, failure_title, cloned);
                    }));
                }));
            }),
        );
    }

    /// UI thread. Persist and refresh on success, roll back on failure.
    fn finish_transition(
        &self,
        previous: TransitionSnapshot,
        failure_title: &'static str,
        result: Result<(), PrefixError>,
    ) {
        match result.and_then(|()| self.commit()) {
            Ok(()) => {
                let (single_prefix, arch) = self.state.read(|s| (s.single_prefix(), s.arch()));
                tracing::info!(
                    "Prefix settings applied: single_prefix={}, arch={}",
                    single_prefix,
                    arch
                );
            }
            Err(e) => self.rollback(previous, failure_title, e),
        }
    }

    fn commit(&self) -> Result<(), PrefixError> {
        self.persist_transition()
            .map_err(|e| PrefixError::Settings(format!("{:#}", e)))?;
        self.state.refresh_runtime_paths(&self.layout);
        Ok(())
    }

    /// Write the in-memory mode and architecture to the settings file,
    /// leaving every other key as the file has it.
    fn persist_transition(&self) -> anyhow::Result<()> {
        let (single_prefix, arch) = self.state.read(|s| (s.single_prefix(), s.arch()));
        self.config.update_settings(|file| {
            file.single_prefix = single_prefix;
            file.arch = arch;
        })?;
        Ok(())
    }

    fn rollback(&self, previous: TransitionSnapshot, failure_title: &'static str, error: PrefixError) {
        tracing::error!(
            "{}: {} (restoring single_prefix={}, arch={})",
            failure_title,
            error,
            previous.single_prefix,
            previous.arch
        );

        self.state.update(|s| {
            s.settings.single_prefix = previous.single_prefix;
            s.settings.arch = previous.arch;
        });

        if let Err(e) = self.persist_transition() {
            tracing::error!("Failed to re-persist settings after rollback: {:#}", e);
        }
        self.state.refresh_runtime_paths(&self.layout);

        let body = error.to_string();
        self.scheduler.post(Box::new(move |ui: &dyn UiSurface| {
            ui.print_method_name("prefix_store_rollback");
            ui.show_error(failure_title, &body);
        }));
    }

    /// `true` if both the template and shared prefix for `arch` are on disk.
    pub fn is_provisioned(&self, arch: Arch) -> bool {
        self.template_path(arch).is_dir() && self.shared_path(arch).is_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::prefix_tree::MockPrefixInitializer;
    use crate::ui::EventLoopBridge;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct NullUi;

    impl UiSurface for NullUi {
        fn show_spinner(&self, _title: &str) {}
        fn hide_spinner(&self) {}
        fn show_info(&self, _title: &str, _body: &str) {}
        fn show_error(&self, _title: &str, _body: &str) {}
        fn reload_launcher_list(&self) {}
    }

    struct Fixture {
        _temp: TempDir,
        _runtime: tokio::runtime::Runtime,
        bridge: EventLoopBridge,
        store: PrefixStore,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let bridge = EventLoopBridge::new(runtime.handle().clone());
        let config = ConfigManager::new(root.join("config")).unwrap();
        let store = PrefixStore::new(
            PrefixLayout::new(root.join("data")),
            StateManager::new(),
            config,
            Arc::new(bridge.clone_handle()),
        );

        Fixture {
            _temp: temp,
            _runtime: runtime,
            bridge,
            store,
        }
    }

    #[test]
    fn test_concurrent_ensure_template_coalesces() {
        let mut fx = fixture();

        let mut mock = MockPrefixInitializer::new();
        mock.expect_initialize()
            .times(1)
            .returning(|_, target| fs::write(target.join("system.reg"), "WINE REGISTRY Version 2\n"));
        let store = fx.store.clone().with_initializer(Arc::new(mock));

        let ready = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let ready = Arc::clone(&ready);
            store.ensure_template(
                Arch::Win64,
                Box::new(move |_ui: &dyn UiSurface, result: Result<(), PrefixError>| {
                    assert!(result.is_ok());
                    ready.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }

        fx.bridge.run_until_idle(&NullUi);

        assert_eq!(ready.load(Ordering::SeqCst), 3);
        assert!(store.template_path(Arch::Win64).join("system.reg").is_file());
    }

    #[test]
    fn test_failed_initialization_reaches_every_waiter() {
        let mut fx = fixture();

        let mut mock = MockPrefixInitializer::new();
        mock.expect_initialize()
            .times(1)
            .returning(|_, _| Err(io::Error::other("disk full")));
        let store = fx.store.clone().with_initializer(Arc::new(mock));

        let failures = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let failures = Arc::clone(&failures);
            store.ensure_template(
                Arch::Win32,
                Box::new(move |_ui: &dyn UiSurface, result: Result<(), PrefixError>| {
                    assert!(result.unwrap_err().to_string().contains("disk full"));
                    failures.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }

        fx.bridge.run_until_idle(&NullUi);

        assert_eq!(failures.load(Ordering::SeqCst), 2);
        assert!(!store.template_path(Arch::Win32).exists());
    }

    #[test]
    fn test_existing_template_skips_initializer() {
        let mut fx = fixture();
        fs::create_dir_all(fx.store.template_path(Arch::Win64)).unwrap();

        let mut mock = MockPrefixInitializer::new();
        mock.expect_initialize().times(0);
        let store = fx.store.clone().with_initializer(Arc::new(mock));

        let ready = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ready);
        store.ensure_template(
            Arch::Win64,
            Box::new(move |_ui: &dyn UiSurface, result: Result<(), PrefixError>| {
                assert!(result.is_ok());
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        fx.bridge.run_until_idle(&NullUi);
        assert_eq!(ready.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ensure_shared_requires_template() {
        let fx = fixture();

        let err = fx.store.ensure_shared(Arch::Win64).unwrap_err();
        assert!(matches!(err, PrefixError::TemplateMissing(Arch::Win64)));
    }

    #[test]
    fn test_shared_without_template_is_invariant_violation() {
        let fx = fixture();
        fs::create_dir_all(fx.store.shared_path(Arch::Win32)).unwrap();

        let err = fx.store.ensure_shared(Arch::Win32).unwrap_err();
        assert!(matches!(err, PrefixError::InvariantViolation(_)));
    }

    #[test]
    fn test_ensure_shared_clones_once() {
        let fx = fixture();
        let template = fx.store.template_path(Arch::Win64);
        fs::create_dir_all(template.join("drive_c")).unwrap();
        fs::write(template.join("system.reg"), "x").unwrap();

        fx.store.ensure_shared(Arch::Win64).unwrap();
        let shared = fx.store.shared_path(Arch::Win64);
        assert!(shared.join("system.reg").is_file());

        // A second call leaves the existing clone alone
        fs::write(shared.join("marker"), "keep").unwrap();
        fx.store.ensure_shared(Arch::Win64).unwrap();
        assert!(shared.join("marker").is_file());
    }
}
