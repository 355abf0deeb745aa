use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Wine architecture of a prefix.
///
/// Selects which template / shared prefix pair is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    Win32,
    #[default]
    Win64,
}

impl Arch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::Win32 => "win32",
            Arch::Win64 => "win64",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Arch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "win32" => Ok(Arch::Win32),
            "win64" => Ok(Arch::Win64),
            other => Err(format!("unknown architecture '{}' (expected win32 or win64)", other)),
        }
    }
}

/// Persisted user settings (`settings.yaml`).
///
/// Missing keys fall back to [`Settings::default`], so an empty or partial
/// file is always loadable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// All launchers share one prefix per architecture when set.
    pub single_prefix: bool,

    pub arch: Arch,

    /// Root for templates, prefixes and logs. `None` means the XDG data dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_root: Option<Utf8PathBuf>,

    /// WineZGUI `Prefixes/` directory scanned by the importer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winezgui_prefixes: Option<Utf8PathBuf>,

    pub debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            single_prefix: false,
            arch: Arch::Win64,
            data_root: None,
            winezgui_prefixes: None,
            debug: false,
        }
    }
}

impl Settings {
    /// Effective data root: the configured one, or `<XDG data>/winecharm`.
    pub fn resolved_data_root(&self) -> Utf8PathBuf {
        self.data_root
            .clone()
            .unwrap_or_else(|| xdg_data_dir().join("winecharm"))
    }

    /// Effective WineZGUI prefixes root, or `<XDG data>/winezgui/Prefixes`.
    pub fn resolved_winezgui_prefixes(&self) -> Utf8PathBuf {
        self.winezgui_prefixes
            .clone()
            .unwrap_or_else(|| xdg_data_dir().join("winezgui").join("Prefixes"))
    }
}

fn xdg_data_dir() -> Utf8PathBuf {
    dirs::data_dir()
        .and_then(|p| Utf8PathBuf::try_from(p).ok())
        .unwrap_or_else(|| Utf8Path::new(".local/share").to_path_buf())
}
