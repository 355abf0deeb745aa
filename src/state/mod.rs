// State management module
//
// This module provides the StateManager which wraps AppState with thread-safe access
// using Arc<RwLock<T>> and emits change events for UI updates.

use crate::models::{AppState, Arch, PrefixLayout, RuntimePaths, Settings};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Change events emitted when state is modified
///
/// These events are emitted to notify interested parties (primarily the UI)
/// about state changes without requiring them to poll the state.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// Single-prefix mode was switched on or off
    ModeChanged { single_prefix: bool },

    /// Active architecture changed
    ArchChanged { arch: Arch },

    /// Derived runtime paths were recomputed
    RuntimePathsRefreshed { shared_prefix: bool },

    /// An import pass has started
    ImportStarted,

    /// An import pass has finished
    ImportFinished { created: usize },

    /// A template prefix became available
    TemplateReady { arch: Arch },
}

/// Thread-safe state manager with event emission
///
/// This is the central state component that:
/// - Provides thread-safe access to [`AppState`] via `Arc<RwLock<T>>`
/// - Detects state changes and emits [`StateChange`] events
/// - Supports subscribing to state changes via tokio broadcast channels
///
/// Mutations are expected on the UI thread only; workers use
/// [`read()`](Self::read) or [`snapshot()`](Self::snapshot).
pub struct StateManager {
    /// The application state protected by RwLock for thread-safe access
    state: Arc<RwLock<AppState>>,

    /// Broadcast channel for emitting state change events
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with default state
    ///
    /// # Returns
    /// A new StateManager with a broadcast channel buffer of 100 events
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(AppState::default())),
            state_tx,
        }
    }

    /// Get a read-only snapshot of the current state
    pub fn snapshot(&self) -> AppState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let single = state_manager.read(|state| state.single_prefix());
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&AppState) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// This is the primary way to modify state. It:
    /// 1. Captures the old state
    /// 2. Applies the update function
    /// 3. Detects what changed
    /// 4. Emits appropriate events
    ///
    /// # Returns
    /// A vector of StateChange events that were emitted
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut AppState),
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = Self::detect_changes(&old_state, &state);
        drop(state);

        for change in &changes {
            // Ignore send errors - it's OK if no one is listening
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    /// Subscribe to state change events
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    /// Detect what changed between two states and generate events
    fn detect_changes(old: &AppState, new: &AppState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.settings.single_prefix != new.settings.single_prefix {
            changes.push(StateChange::ModeChanged {
                single_prefix: new.settings.single_prefix,
            });
        }

        if old.settings.arch != new.settings.arch {
            changes.push(StateChange::ArchChanged {
                arch: new.settings.arch,
            });
        }

        if old.runtime != new.runtime {
            changes.push(StateChange::RuntimePathsRefreshed {
                shared_prefix: new.runtime.shared_prefix.is_some(),
            });
        }

        if old.is_importing != new.is_importing {
            if new.is_importing {
                changes.push(StateChange::ImportStarted);
            } else {
                changes.push(StateChange::ImportFinished {
                    created: new.last_import_created.unwrap_or(0),
                });
            }
        }

        changes
    }

    // Convenience methods for common state updates

    /// Replace the in-memory settings and recompute runtime paths
    pub fn load_settings(&self, settings: Settings) -> Vec<StateChange> {
        let layout = PrefixLayout::new(settings.resolved_data_root());
        self.update(|state| {
            state.runtime = RuntimePaths::derive(&layout, settings.arch, settings.single_prefix);
            state.settings = settings;

            tracing::info!(
                "Loaded settings into state: single_prefix={}, arch={}",
                state.settings.single_prefix,
                state.settings.arch
            );
        })
    }

    pub fn set_single_prefix(&self, single_prefix: bool) -> Vec<StateChange> {
        self.update(|state| state.settings.single_prefix = single_prefix)
    }

    pub fn set_arch(&self, arch: Arch) -> Vec<StateChange> {
        self.update(|state| state.settings.arch = arch)
    }

    /// Recompute paths that depend on mode and architecture
    pub fn refresh_runtime_paths(&self, layout: &PrefixLayout) -> Vec<StateChange> {
        self.update(|state| {
            state.runtime =
                RuntimePaths::derive(layout, state.settings.arch, state.settings.single_prefix);
        })
    }

    /// Mark an import as running
    ///
    /// # Returns
    /// `false` if an import is already in flight; the caller must not start
    /// another one.
    pub fn begin_import(&self) -> bool {
        let mut started = false;
        self.update(|state| {
            if !state.is_importing {
                state.is_importing = true;
                state.last_import_created = None;
                started = true;
            }
        });
        started
    }

    /// Mark the running import as finished
    pub fn finish_import(&self, created: usize) -> Vec<StateChange> {
        self.update(|state| {
            state.last_import_created = Some(created);
            state.is_importing = false;
        })
    }

    /// Announce that a template finished initializing
    pub fn notify_template_ready(&self, arch: Arch) {
        let _ = self.state_tx.send(StateChange::TemplateReady { arch });
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

// Make StateManager cloneable for sharing across threads
impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_manager() {
        let manager = StateManager::new();
        let state = manager.snapshot();

        assert!(!state.single_prefix());
        assert!(!state.is_importing);
    }

    #[test]
    fn test_mode_change_detection() {
        let manager = StateManager::new();

        let changes = manager.set_single_prefix(true);
        assert_eq!(changes, vec![StateChange::ModeChanged { single_prefix: true }]);

        // Setting the same value again is silent
        assert!(manager.set_single_prefix(true).is_empty());
    }

    #[test]
    fn test_refresh_runtime_paths() {
        let manager = StateManager::new();
        let layout = PrefixLayout::new("/data");

        manager.set_single_prefix(true);
        let changes = manager.refresh_runtime_paths(&layout);

        assert_eq!(
            changes,
            vec![StateChange::RuntimePathsRefreshed { shared_prefix: true }]
        );
        assert_eq!(
            manager.read(|s| s.runtime.shared_prefix.clone()),
            Some(layout.shared_path(Arch::Win64))
        );
    }

    #[test]
    fn test_begin_import_is_exclusive() {
        let manager = StateManager::new();

        assert!(manager.begin_import());
        assert!(!manager.begin_import());

        let changes = manager.finish_import(3);
        assert_eq!(changes, vec![StateChange::ImportFinished { created: 3 }]);
        assert!(manager.begin_import());
    }

    #[test]
    fn test_load_settings_derives_paths() {
        let manager = StateManager::new();
        let settings = Settings {
            single_prefix: true,
            arch: Arch::Win32,
            data_root: Some("/srv/charm".into()),
            ..Settings::default()
        };

        let changes = manager.load_settings(settings);

        assert!(changes.contains(&StateChange::ModeChanged { single_prefix: true }));
        assert!(changes.contains(&StateChange::ArchChanged { arch: Arch::Win32 }));
        assert_eq!(
            manager.read(|s| s.runtime.shared_prefix.clone()),
            Some("/srv/charm/prefixes/single-win32".into())
        );
    }
}
