use camino::Utf8PathBuf;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// File extension of launcher metadata files.
pub const CHARM_EXTENSION: &str = "charm";

/// Launcher metadata (`<name>.charm`), one per runnable entry.
///
/// Stored as YAML next to the prefix it launches into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharmFile {
    pub exe_file: Utf8PathBuf,
    pub wineprefix: Utf8PathBuf,
    pub progname: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub args: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<Utf8PathBuf>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env_vars: IndexMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<Utf8PathBuf>,

    /// Name of the script this entry was imported from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_name: Option<String>,

    #[serde(default)]
    pub source: CharmSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CharmSource {
    #[default]
    Native,
    Winezgui,
}

impl CharmFile {
    /// File name this launcher is stored under: `<slug(progname)>.charm`.
    ///
    /// Pure function of the display name so re-imports land on the same path.
    pub fn file_name(&self) -> String {
        format!("{}.{}", launcher_slug(&self.progname), CHARM_EXTENSION)
    }
}

/// Longest slug kept, in bytes. Leaves room for the extension and staging
/// suffixes under the usual 255-byte file name limit.
pub const MAX_SLUG_LEN: usize = 120;

/// Turn a display name into a single safe path component.
///
/// Keeps ASCII alphanumerics, `-`, `_` and `.`, collapses everything else to
/// one `_`, trims leading dots and separators, and caps the result at
/// [`MAX_SLUG_LEN`] bytes. Never returns an empty string.
pub fn launcher_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_sep = false;

    for ch in name.trim().chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '.' {
            slug.push(ch);
            last_was_sep = false;
        } else if !last_was_sep {
            slug.push('_');
            last_was_sep = true;
        }
    }

    let is_edge = |c: char| c == '_' || c == '.';
    let mut slug = slug.trim_matches(is_edge);
    if slug.len() > MAX_SLUG_LEN {
        // ASCII only, so every byte index is a char boundary
        slug = slug[..MAX_SLUG_LEN].trim_end_matches(is_edge);
    }

    let slug = slug.to_string();
    if slug.is_empty() {
        "launcher".to_string()
    } else {
        slug
    }
}
