//! Data models for WineCharm.
//!
//! - [`Settings`] / [`Arch`]: persisted user settings (`settings.yaml`)
//! - [`PrefixLayout`] / [`RuntimePaths`]: canonical template and shared-prefix paths
//! - [`AppState`]: in-memory state held by [`StateManager`](crate::state::StateManager)
//! - [`CharmFile`]: launcher metadata written by the importer

pub mod app_state;
pub mod charm;
pub mod layout;
pub mod settings;

pub use app_state::AppState;
pub use charm::{CHARM_EXTENSION, CharmFile, CharmSource, launcher_slug};
pub use layout::{PrefixLayout, RuntimePaths};
pub use settings::{Arch, Settings};
