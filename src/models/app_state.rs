use super::layout::RuntimePaths;
use super::settings::{Arch, Settings};

/// Single source of truth for the in-memory application state.
///
/// Mutated only from the UI thread through
/// [`StateManager::update`](crate::state::StateManager::update); workers read
/// snapshots.
#[derive(Clone, Debug, Default)]
pub struct AppState {
    /// Live copy of the persisted settings.
    pub settings: Settings,

    /// Paths derived from `settings.single_prefix` and `settings.arch`.
    pub runtime: RuntimePaths,

    // Import runtime state
    pub is_importing: bool,
    pub last_import_created: Option<usize>,
}

impl AppState {
    pub fn single_prefix(&self) -> bool {
        self.settings.single_prefix
    }

    pub fn arch(&self) -> Arch {
        self.settings.arch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state() {
        let state = AppState::default();
        assert!(!state.single_prefix());
        assert_eq!(state.arch(), Arch::Win64);
        assert!(!state.is_importing);
        assert!(state.runtime.shared_prefix.is_none());
    }
}
