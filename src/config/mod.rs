use crate::models::Settings;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// Prefix of environment variables that override file settings
/// (e.g. `WINECHARM_SINGLE_PREFIX=true`).
pub const ENV_PREFIX: &str = "WINECHARM";

/// Configuration manager for loading and saving `settings.yaml`.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    settings_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager rooted at `config_dir`.
    ///
    /// The directory is created if it doesn't exist.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            settings_path: config_dir.join("settings.yaml"),
            config_dir,
        })
    }

    /// ConfigManager for `<XDG config>/winecharm`.
    pub fn from_xdg() -> Result<Self> {
        let base = dirs::config_dir().context("Could not determine config directory")?;
        let base = Utf8PathBuf::try_from(base).context("Config directory is not valid UTF-8")?;
        Self::new(base.join("winecharm"))
    }

    /// Load settings, layering `WINECHARM_*` environment overrides on top of
    /// the YAML file.
    ///
    /// # Returns
    /// The loaded settings, or defaults if the file doesn't exist. A file
    /// that exists but cannot be parsed is an error.
    pub fn load_settings(&self) -> Result<Settings> {
        let settings = self.read_settings(true)?;
        tracing::debug!(
            "Loaded settings: single_prefix={}, arch={}",
            settings.single_prefix,
            settings.arch
        );
        Ok(settings)
    }

    /// Load what `settings.yaml` itself holds, ignoring the environment.
    pub fn load_file_settings(&self) -> Result<Settings> {
        self.read_settings(false)
    }

    /// Apply `edit` to the file's own settings and save the result.
    ///
    /// Environment and command-line overrides stay out of the file. An
    /// unreadable file is replaced, starting from defaults.
    pub fn update_settings<F>(&self, edit: F) -> Result<Settings>
    where
        F: FnOnce(&mut Settings),
    {
        let mut settings = self.load_file_settings().unwrap_or_else(|e| {
            tracing::warn!("Replacing unreadable settings file: {:#}", e);
            Settings::default()
        });
        edit(&mut settings);
        self.save_settings(&settings)?;
        Ok(settings)
    }

    fn read_settings(&self, with_env: bool) -> Result<Settings> {
        if !self.settings_path.exists() {
            tracing::debug!(
                "Settings file not found at {}, using defaults",
                self.settings_path
            );
        }

        let mut builder = config::Config::builder().add_source(
            config::File::from(self.settings_path.as_std_path())
                .format(config::FileFormat::Yaml)
                .required(false),
        );
        if with_env {
            builder = builder
                .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true));
        }

        let layered = builder
            .build()
            .with_context(|| format!("Failed to read settings: {}", self.settings_path))?;

        layered
            .try_deserialize()
            .with_context(|| format!("Failed to parse settings: {}", self.settings_path))
    }

    /// Persist settings.
    ///
    /// Written to a sibling temp file first and renamed over the target, so a
    /// crash never leaves a truncated `settings.yaml`.
    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(settings).context("Failed to serialize settings to YAML")?;

        let tmp_path = self.config_dir.join(".settings.yaml.tmp");
        fs::write(&tmp_path, yaml_string)
            .with_context(|| format!("Failed to write settings: {}", tmp_path))?;
        fs::rename(&tmp_path, &self.settings_path)
            .with_context(|| format!("Failed to replace settings: {}", self.settings_path))?;

        tracing::info!(
            "Saved settings to {} (single_prefix={}, arch={})",
            self.settings_path,
            settings.single_prefix,
            settings.arch
        );
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }
}
