// UI module - capability interfaces and event loop bridge
//
// The core never talks to a toolkit directly. It sees:
// - UiSurface: spinner, dialogs and launcher-list reload, called only on the UI thread
// - Scheduler: FIFO dispatch onto the UI thread, timed dispatch, background workers
//
// This module contains:
// - EventLoopBridge: channel-backed Scheduler driven by the UI thread
// - Controller: wires user commands to the prefix store, importer and host probe
// - ConsoleUi: terminal UiSurface used by the command-line front end

pub mod bridge;
pub mod console;
pub mod controller;

pub use bridge::{EventLoopBridge, EventLoopBridgeHandle};
pub use console::ConsoleUi;
pub use controller::Controller;

use std::time::Duration;

/// A unit of work executed on the UI thread.
pub type UiTask = Box<dyn FnOnce(&dyn UiSurface) + Send>;

/// A timed task; returning `true` re-arms it with the same delay.
pub type RepeatingUiTask = Box<dyn FnMut(&dyn UiSurface) -> bool + Send>;

/// Background job run off the UI thread.
pub type WorkerJob = Box<dyn FnOnce() + Send>;

/// Progress surface the core drives. Every method is called on the UI thread.
pub trait UiSurface {
    fn show_spinner(&self, title: &str);
    fn hide_spinner(&self);
    fn show_info(&self, title: &str, body: &str);
    fn show_error(&self, title: &str, body: &str);
    fn reload_launcher_list(&self);

    /// Tracing hook; may be a no-op.
    fn print_method_name(&self, _name: &str) {}
}

/// A titled message box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dialog {
    Info { title: String, body: String },
    Error { title: String, body: String },
}

impl Dialog {
    /// Render on `ui`. UI thread only.
    pub fn show(&self, ui: &dyn UiSurface) {
        match self {
            Dialog::Info { title, body } => ui.show_info(title, body),
            Dialog::Error { title, body } => ui.show_error(title, body),
        }
    }
}

/// Main-loop scheduling capability.
pub trait Scheduler: Send + Sync {
    /// Enqueue `task` onto the UI thread. Tasks run in dispatch order.
    fn post(&self, task: UiTask);

    /// Run `task` on the UI thread after `delay`, repeating while it returns `true`.
    fn post_delayed(&self, delay: Duration, task: RepeatingUiTask);

    /// Run blocking work on a background worker.
    fn spawn_worker(&self, job: WorkerJob);
}
