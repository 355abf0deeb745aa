//! Shared fixtures for integration tests
//!
//! - [`RecordingUi`]: a `UiSurface` that logs every call with the calling thread
//! - [`Harness`]: scratch data root, config dir, state and a live event loop

#![allow(dead_code)]

use camino::{Utf8Path, Utf8PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use tempfile::TempDir;
use winecharm::services::{Importer, PrefixStore};
use winecharm::ui::{EventLoopBridge, Scheduler, UiSurface};
use winecharm::{ConfigManager, PrefixLayout, Settings, StateManager};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    SpinnerShown(String),
    SpinnerHidden,
    Info { title: String, body: String },
    Error { title: String, body: String },
    Reload,
}

/// Records UI calls in order, each tagged with the thread it came from
#[derive(Default)]
pub struct RecordingUi {
    calls: Mutex<Vec<(UiEvent, ThreadId)>>,
}

impl RecordingUi {
    fn record(&self, event: UiEvent) {
        self.calls
            .lock()
            .unwrap()
            .push((event, thread::current().id()));
    }

    pub fn events(&self) -> Vec<UiEvent> {
        self.calls.lock().unwrap().iter().map(|(e, _)| e.clone()).collect()
    }

    pub fn threads(&self) -> Vec<ThreadId> {
        self.calls.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }

    pub fn count(&self, matches: impl Fn(&UiEvent) -> bool) -> usize {
        self.events().iter().filter(|e| matches(e)).count()
    }

    pub fn info_titles(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                UiEvent::Info { title, .. } => Some(title),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<(String, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                UiEvent::Error { title, body } => Some((title, body)),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Every recorded call happened on `ui_thread`
    pub fn all_on(&self, ui_thread: ThreadId) -> bool {
        self.threads().iter().all(|t| *t == ui_thread)
    }
}

impl UiSurface for RecordingUi {
    fn show_spinner(&self, title: &str) {
        self.record(UiEvent::SpinnerShown(title.to_string()));
    }

    fn hide_spinner(&self) {
        self.record(UiEvent::SpinnerHidden);
    }

    fn show_info(&self, title: &str, body: &str) {
        self.record(UiEvent::Info {
            title: title.to_string(),
            body: body.to_string(),
        });
    }

    fn show_error(&self, title: &str, body: &str) {
        self.record(UiEvent::Error {
            title: title.to_string(),
            body: body.to_string(),
        });
    }

    fn reload_launcher_list(&self) {
        self.record(UiEvent::Reload);
    }
}

/// Scratch environment with a running event loop.
///
/// The test thread is the UI thread: [`pump`](Self::pump) drives the loop on it.
pub struct Harness {
    pub temp: TempDir,
    pub root: Utf8PathBuf,
    pub runtime: tokio::runtime::Runtime,
    pub bridge: EventLoopBridge,
    pub config: ConfigManager,
    pub state: StateManager,
    pub layout: PrefixLayout,
    pub ui: RecordingUi,
}

impl Harness {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let root = utf8(temp.path());
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let bridge = EventLoopBridge::new(runtime.handle().clone());
        let config = ConfigManager::new(root.join("config")).unwrap();

        let data_root = root.join("data");
        let state = StateManager::new();
        state.load_settings(Settings {
            data_root: Some(data_root.clone()),
            ..Settings::default()
        });

        Self {
            temp,
            root,
            runtime,
            bridge,
            config,
            state,
            layout: PrefixLayout::new(data_root),
            ui: RecordingUi::default(),
        }
    }

    pub fn scheduler(&self) -> Arc<dyn Scheduler> {
        Arc::new(self.bridge.clone_handle())
    }

    pub fn store(&self) -> PrefixStore {
        PrefixStore::new(
            self.layout.clone(),
            self.state.clone(),
            self.config.clone(),
            self.scheduler(),
        )
    }

    pub fn importer(&self, source_root: &Utf8Path) -> Importer {
        Importer::new(source_root.to_path_buf(), self.state.clone(), self.scheduler())
    }

    /// Run the event loop on this thread until nothing is left in flight
    pub fn pump(&mut self) -> usize {
        self.bridge.run_until_idle(&self.ui)
    }

    pub fn saved_settings(&self) -> Settings {
        self.config.load_settings().unwrap()
    }
}

pub fn utf8(path: &std::path::Path) -> Utf8PathBuf {
    Utf8PathBuf::try_from(path.to_path_buf()).unwrap()
}
