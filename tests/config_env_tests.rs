//! Environment overrides for settings
//!
//! Kept in its own test binary: it mutates the process environment, which
//! would leak into other settings tests running in parallel.

use camino::Utf8PathBuf;
use tempfile::TempDir;
use winecharm::{Arch, ConfigManager, Settings};

#[test]
fn test_env_overrides_file_values() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    let manager = ConfigManager::new(&config_path).unwrap();
    manager
        .save_settings(&Settings {
            single_prefix: false,
            arch: Arch::Win64,
            ..Settings::default()
        })
        .unwrap();

    // SAFETY: the only test in this binary, so no other thread reads the environment
    unsafe {
        std::env::set_var("WINECHARM_SINGLE_PREFIX", "true");
    }
    let settings = manager.load_settings().unwrap();

    // A transition save keeps the override out of the file
    manager.update_settings(|file| file.arch = Arch::Win32).unwrap();
    let on_disk = manager.load_file_settings().unwrap();
    unsafe {
        std::env::remove_var("WINECHARM_SINGLE_PREFIX");
    }

    assert!(settings.single_prefix);
    assert_eq!(settings.arch, Arch::Win64);
    assert!(!on_disk.single_prefix);
    assert_eq!(on_disk.arch, Arch::Win32);
}
