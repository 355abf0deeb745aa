//! Services module - prefix lifecycle and import logic.
//!
//! Nothing here talks to a UI toolkit. UI effects go through the
//! [`UiSurface`](crate::ui::UiSurface) and [`Scheduler`](crate::ui::Scheduler)
//! capabilities, and blocking filesystem work always runs on a scheduler worker.
//!
//! # Components
//!
//! - [`host_probe`]: checks `PATH` for the external programs WineCharm needs and
//!   reports what's missing
//! - [`PrefixStore`]: template and shared prefixes, single/multi prefix mode and
//!   architecture switching with rollback
//! - [`prefix_tree`]: template skeleton initialization, recursive tree copy and
//!   stage-then-rename publishing
//! - [`Importer`]: background conversion of WineZGUI launchers into `.charm`
//!   files, with dedup, cancellation and guaranteed UI finalization
//! - [`winezgui`]: WineZGUI script parsing and the default per-prefix converter
//!
//! # Usage Example
//!
//! ```ignore
//! use winecharm::services::{Importer, PrefixStore};
//!
//! let store = PrefixStore::new(layout, state.clone(), config, scheduler.clone());
//! store.set_mode(true); // clone the shared prefix, persist on success
//!
//! let importer = Importer::new(settings.resolved_winezgui_prefixes(), state, scheduler);
//! importer.import_external_scripts(false);
//! ```

pub mod host_probe;
pub mod importer;
pub mod prefix_store;
pub mod prefix_tree;
pub mod winezgui;

pub use host_probe::{
    RequirementReport, missing_requirements, missing_requirements_in, report_missing,
    schedule_startup_probe,
};
pub use importer::{ImportError, ImportSummary, Importer, ScriptConverter, discover_prefixes};
pub use prefix_store::{PrefixError, PrefixStore, TemplateReady};
pub use prefix_tree::{
    PrefixInitializer, RecursiveCopier, SkeletonInitializer, TreeCopier, publish_atomically,
};
pub use winezgui::{ScriptParser, WineZguiConverter, WineZguiScript};
