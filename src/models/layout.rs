use super::settings::Arch;
use camino::{Utf8Path, Utf8PathBuf};

/// On-disk layout under the data root.
///
/// ```text
/// <data-root>/templates/win32/
/// <data-root>/templates/win64/
/// <data-root>/prefixes/single-win32/
/// <data-root>/prefixes/single-win64/
/// ```
///
/// Every accessor is a pure function of its inputs; nothing here touches the
/// filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixLayout {
    data_root: Utf8PathBuf,
}

impl PrefixLayout {
    pub fn new<P: AsRef<Utf8Path>>(data_root: P) -> Self {
        Self {
            data_root: data_root.as_ref().to_path_buf(),
        }
    }

    pub fn data_root(&self) -> &Utf8Path {
        &self.data_root
    }

    pub fn templates_dir(&self) -> Utf8PathBuf {
        self.data_root.join("templates")
    }

    pub fn prefixes_dir(&self) -> Utf8PathBuf {
        self.data_root.join("prefixes")
    }

    pub fn logs_dir(&self) -> Utf8PathBuf {
        self.data_root.join("logs")
    }

    pub fn template_path(&self, arch: Arch) -> Utf8PathBuf {
        self.templates_dir().join(arch.as_str())
    }

    pub fn shared_path(&self, arch: Arch) -> Utf8PathBuf {
        self.prefixes_dir().join(format!("single-{}", arch))
    }
}

/// Paths derived from the current mode and architecture.
///
/// Recomputed after every mode or architecture transition.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RuntimePaths {
    pub templates_dir: Utf8PathBuf,
    pub prefixes_dir: Utf8PathBuf,
    pub active_template: Utf8PathBuf,

    /// Prefix every new launcher reuses; `None` in per-game mode.
    pub shared_prefix: Option<Utf8PathBuf>,
}

impl RuntimePaths {
    pub fn derive(layout: &PrefixLayout, arch: Arch, single_prefix: bool) -> Self {
        Self {
            templates_dir: layout.templates_dir(),
            prefixes_dir: layout.prefixes_dir(),
            active_template: layout.template_path(arch),
            shared_prefix: single_prefix.then(|| layout.shared_path(arch)),
        }
    }
}
