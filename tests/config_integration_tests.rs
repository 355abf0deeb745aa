//! Integration tests for ConfigManager and settings file handling
//!
//! These tests verify:
//! - Settings loading and saving
//! - Defaults when the file is missing
//! - Hand-edited and partial files
//! - Malformed files surfacing as errors
//! - Integration with StateManager

use camino::Utf8PathBuf;
use std::fs;
use tempfile::TempDir;
use winecharm::{Arch, ConfigManager, Settings, StateManager};

fn create_test_config_dir() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (temp_dir, config_path)
}

#[test]
fn test_create_config_manager() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    assert_eq!(manager.config_dir(), &config_path);
    assert_eq!(manager.settings_path(), config_path.join("settings.yaml"));
}

#[test]
fn test_creates_missing_config_dir() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let nested = config_path.join("a/b/winecharm");

    ConfigManager::new(&nested).unwrap();

    assert!(nested.is_dir());
}

#[test]
fn test_load_default_settings() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    let settings = manager.load_settings().unwrap();

    assert_eq!(settings, Settings::default());
    assert!(!manager.settings_path().exists());
}

#[test]
fn test_save_and_load_settings() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    let settings = Settings {
        single_prefix: true,
        arch: Arch::Win32,
        data_root: Some(config_path.join("data")),
        winezgui_prefixes: Some(config_path.join("wz")),
        debug: true,
    };
    manager.save_settings(&settings).unwrap();

    let loaded = manager.load_settings().unwrap();
    assert_eq!(loaded, settings);

    let yaml = fs::read_to_string(manager.settings_path()).unwrap();
    assert!(yaml.contains("arch: win32"));
}

#[test]
fn test_hand_written_partial_file() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();
    fs::write(
        manager.settings_path(),
        "# edited by hand\nsingle_prefix: true\nunknown_key: 42\n",
    )
    .unwrap();

    let settings = manager.load_settings().unwrap();

    assert!(settings.single_prefix);
    assert_eq!(settings.arch, Arch::Win64);
    assert!(settings.data_root.is_none());
}

#[test]
fn test_bad_arch_is_error() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();
    fs::write(manager.settings_path(), "arch: arm64\n").unwrap();

    assert!(manager.load_settings().is_err());
}

#[test]
fn test_save_overwrites_previous() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    manager
        .save_settings(&Settings {
            single_prefix: true,
            ..Settings::default()
        })
        .unwrap();
    manager.save_settings(&Settings::default()).unwrap();

    assert!(!manager.load_settings().unwrap().single_prefix);
}

#[test]
fn test_update_settings_keeps_other_keys() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();
    manager
        .save_settings(&Settings {
            winezgui_prefixes: Some(config_path.join("zgui")),
            debug: true,
            ..Settings::default()
        })
        .unwrap();

    let saved = manager
        .update_settings(|file| {
            file.single_prefix = true;
            file.arch = Arch::Win32;
        })
        .unwrap();

    let loaded = manager.load_file_settings().unwrap();
    assert_eq!(loaded, saved);
    assert!(loaded.single_prefix);
    assert_eq!(loaded.arch, Arch::Win32);
    assert_eq!(loaded.winezgui_prefixes, Some(config_path.join("zgui")));
    assert!(loaded.debug);
}

#[test]
fn test_update_settings_replaces_unreadable_file() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();
    fs::write(manager.settings_path(), "arch: arm64\n").unwrap();

    manager.update_settings(|file| file.single_prefix = true).unwrap();

    let loaded = manager.load_settings().unwrap();
    assert!(loaded.single_prefix);
    assert_eq!(loaded.arch, Arch::Win64);
}

#[test]
fn test_settings_feed_state_manager() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();
    manager
        .save_settings(&Settings {
            single_prefix: true,
            arch: Arch::Win32,
            data_root: Some(config_path.join("data")),
            ..Settings::default()
        })
        .unwrap();

    let state = StateManager::new();
    state.load_settings(manager.load_settings().unwrap());

    let snapshot = state.snapshot();
    assert!(snapshot.single_prefix());
    assert_eq!(
        snapshot.runtime.active_template,
        config_path.join("data/templates/win32")
    );
    assert_eq!(
        snapshot.runtime.shared_prefix,
        Some(config_path.join("data/prefixes/single-win32"))
    );
}
