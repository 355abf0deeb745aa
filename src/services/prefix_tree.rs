//! Filesystem primitives for prefix trees.
//!
//! - [`PrefixInitializer`]: lays down a fresh template prefix
//! - [`TreeCopier`]: clones one prefix tree into another
//! - [`publish_atomically`]: builds a directory under a hidden sibling name and
//!   renames it into place, so the canonical path only ever shows a complete tree

use crate::models::Arch;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs::{self, FileTimes};
use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use walkdir::WalkDir;

/// Creates the contents of a new template prefix.
///
/// `target` already exists and is empty when this is called.
#[cfg_attr(test, mockall::automock)]
pub trait PrefixInitializer: Send + Sync {
    fn initialize(&self, arch: Arch, target: &Utf8Path) -> io::Result<()>;
}

/// Copies a prefix tree from `src` into the existing, empty directory `dst`.
pub trait TreeCopier: Send + Sync {
    /// # Returns
    /// Number of regular files copied
    fn copy_tree(&self, src: &Utf8Path, dst: &Utf8Path) -> io::Result<u64>;
}

/// Writes the canonical Wine prefix skeleton without running Wine.
///
/// ```text
/// drive_c/windows/system32/
/// drive_c/windows/syswow64/        (win64)
/// drive_c/Program Files/
/// drive_c/Program Files (x86)/     (win64)
/// drive_c/users/<user>/
/// dosdevices/c: -> ../drive_c
/// dosdevices/z: -> /
/// system.reg  user.reg  userdef.reg
/// ```
#[derive(Debug, Clone, Default)]
pub struct SkeletonInitializer {
    user_name: Option<String>,
}

impl SkeletonInitializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a fixed user profile name instead of `$USER`.
    pub fn with_user_name(user_name: impl Into<String>) -> Self {
        Self {
            user_name: Some(user_name.into()),
        }
    }

    fn user_name(&self) -> String {
        self.user_name
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "user".to_string())
    }
}

impl PrefixInitializer for SkeletonInitializer {
    fn initialize(&self, arch: Arch, target: &Utf8Path) -> io::Result<()> {
        let drive_c = target.join("drive_c");
        let mut dirs = vec![
            drive_c.join("windows").join("system32"),
            drive_c.join("Program Files"),
            drive_c.join("ProgramData"),
            drive_c.join("users").join(self.user_name()),
            target.join("dosdevices"),
        ];
        if arch == Arch::Win64 {
            dirs.push(drive_c.join("windows").join("syswow64"));
            dirs.push(drive_c.join("Program Files (x86)"));
        }
        for dir in &dirs {
            fs::create_dir_all(dir)?;
        }

        symlink(Path::new("../drive_c"), target.join("dosdevices").join("c:").as_std_path())?;
        symlink(Path::new("/"), target.join("dosdevices").join("z:").as_std_path())?;

        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        for name in ["system.reg", "user.reg", "userdef.reg"] {
            let contents = format!(
                "WINE REGISTRY Version 2\n;; All keys relative to \\\\{}\n\n#arch={}\n",
                registry_root(name),
                arch
            );
            fs::write(target.join(name), contents)?;
        }
        fs::write(target.join(".update-timestamp"), format!("{}\n", stamp))?;

        tracing::debug!("Wrote {} prefix skeleton at {}", arch, target);
        Ok(())
    }
}

fn registry_root(file_name: &str) -> &'static str {
    match file_name {
        "system.reg" => "Machine",
        "user.reg" => "User\\\\S-1-5-21-0-0-0-1000",
        _ => "User\\\\.Default",
    }
}

/// Recursive copier that keeps symlinks as symlinks and carries permissions
/// and modification times over where the filesystem allows.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecursiveCopier;

impl TreeCopier for RecursiveCopier {
    fn copy_tree(&self, src: &Utf8Path, dst: &Utf8Path) -> io::Result<u64> {
        let mut files = 0;
        // Directory metadata is applied last so read-only dirs don't block
        // writes into them.
        let mut dirs: Vec<(std::path::PathBuf, fs::Metadata)> = Vec::new();

        for entry in WalkDir::new(src).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(io::Error::from)?;
            let rel = entry
                .path()
                .strip_prefix(src.as_std_path())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
            let target = dst.as_std_path().join(rel);
            let file_type = entry.file_type();

            if file_type.is_symlink() {
                let link = fs::read_link(entry.path())?;
                symlink(&link, &target)?;
            } else if file_type.is_dir() {
                fs::create_dir_all(&target)?;
                dirs.push((target, entry.metadata().map_err(io::Error::from)?));
            } else if file_type.is_file() {
                fs::copy(entry.path(), &target)?;
                let metadata = entry.metadata().map_err(io::Error::from)?;
                copy_times(&metadata, &target);
                files += 1;
            } else {
                // FIFOs, sockets and device nodes; reading a FIFO would block
                tracing::warn!("Skipping special file {}", entry.path().display());
            }
        }

        for (dir, metadata) in dirs.iter().rev() {
            fs::set_permissions(dir, metadata.permissions())?;
            copy_times(metadata, dir);
        }

        tracing::debug!("Copied {} files from {} to {}", files, src, dst);
        Ok(files)
    }
}

fn copy_times(metadata: &fs::Metadata, target: &Path) {
    let mut times = FileTimes::new();
    if let Ok(modified) = metadata.modified() {
        times = times.set_modified(modified);
    }
    if let Ok(accessed) = metadata.accessed() {
        times = times.set_accessed(accessed);
    }

    let result = fs::File::open(target).and_then(|file| file.set_times(times));
    if let Err(e) = result {
        tracing::trace!("Could not preserve timestamps on {}: {}", target.display(), e);
    }
}

#[cfg(unix)]
fn symlink(original: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(not(unix))]
fn symlink(_original: &Path, link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("symlinks are not supported here: {}", link.display()),
    ))
}

/// Hidden sibling used while `target` is being built.
pub fn staging_path(target: &Utf8Path) -> Utf8PathBuf {
    let name = target.file_name().unwrap_or("prefix");
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or_default();
    target.with_file_name(format!(".{}.tmp-{}-{}", name, std::process::id(), nanos))
}

/// Build `target` in a staging sibling, then rename it into place.
///
/// On failure the staging directory is removed (best effort) and `target` is
/// left untouched.
pub fn publish_atomically<F>(target: &Utf8Path, build: F) -> io::Result<()>
where
    F: FnOnce(&Utf8Path) -> io::Result<()>,
{
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }

    let staging = staging_path(target);
    fs::create_dir(&staging)?;

    let result = build(&staging).and_then(|()| fs::rename(&staging, target));
    if let Err(e) = result {
        if let Err(cleanup) = fs::remove_dir_all(&staging) {
            tracing::warn!("Failed to remove staging directory {}: {}", staging, cleanup);
        }
        return Err(e);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn utf8_root(temp: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap()
    }

    #[test]
    fn test_skeleton_layout_win64() {
        let temp = TempDir::new().unwrap();
        let target = utf8_root(&temp).join("win64");
        fs::create_dir(&target).unwrap();

        SkeletonInitializer::with_user_name("tester")
            .initialize(Arch::Win64, &target)
            .unwrap();

        assert!(target.join("drive_c/windows/syswow64").is_dir());
        assert!(target.join("drive_c/Program Files (x86)").is_dir());
        assert!(target.join("drive_c/users/tester").is_dir());
        assert_eq!(
            fs::read_link(target.join("dosdevices/c:")).unwrap(),
            Path::new("../drive_c")
        );
        let system_reg = fs::read_to_string(target.join("system.reg")).unwrap();
        assert!(system_reg.starts_with("WINE REGISTRY Version 2"));
        assert!(system_reg.contains("#arch=win64"));
    }

    #[test]
    fn test_skeleton_layout_win32_has_no_wow64() {
        let temp = TempDir::new().unwrap();
        let target = utf8_root(&temp).join("win32");
        fs::create_dir(&target).unwrap();

        SkeletonInitializer::new()
            .initialize(Arch::Win32, &target)
            .unwrap();

        assert!(target.join("drive_c/windows/system32").is_dir());
        assert!(!target.join("drive_c/windows/syswow64").exists());
        assert!(
            fs::read_to_string(target.join("user.reg"))
                .unwrap()
                .contains("#arch=win32")
        );
    }

    #[test]
    fn test_copy_preserves_symlinks_and_contents() {
        let temp = TempDir::new().unwrap();
        let root = utf8_root(&temp);
        let src = root.join("src");
        let dst = root.join("dst");
        fs::create_dir(&src).unwrap();
        SkeletonInitializer::with_user_name("tester")
            .initialize(Arch::Win64, &src)
            .unwrap();
        fs::write(src.join("drive_c/windows/system32/kernel32.dll"), b"MZ").unwrap();
        fs::create_dir(&dst).unwrap();

        let copied = RecursiveCopier.copy_tree(&src, &dst).unwrap();

        assert_eq!(copied, 5); // three .reg files, timestamp, dll
        assert!(
            fs::symlink_metadata(dst.join("dosdevices/c:"))
                .unwrap()
                .file_type()
                .is_symlink()
        );
        assert_eq!(
            fs::read(dst.join("drive_c/windows/system32/kernel32.dll")).unwrap(),
            b"MZ"
        );
        assert_eq!(
            fs::metadata(src.join("system.reg")).unwrap().modified().unwrap(),
            fs::metadata(dst.join("system.reg")).unwrap().modified().unwrap()
        );
    }

    #[test]
    fn test_copy_skips_special_files() {
        let temp = TempDir::new().unwrap();
        let root = utf8_root(&temp);
        let src = root.join("src");
        let dst = root.join("dst");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&dst).unwrap();
        fs::write(src.join("user.reg"), b"WINE REGISTRY Version 2").unwrap();
        let _listener = std::os::unix::net::UnixListener::bind(src.join("control.sock")).unwrap();

        let copied = RecursiveCopier.copy_tree(&src, &dst).unwrap();

        assert_eq!(copied, 1);
        assert!(dst.join("user.reg").is_file());
        assert!(fs::symlink_metadata(dst.join("control.sock")).is_err());
    }

    #[test]
    fn test_publish_failure_leaves_no_target() {
        let temp = TempDir::new().unwrap();
        let target = utf8_root(&temp).join("prefixes").join("single-win64");

        let result = publish_atomically(&target, |staging| {
            fs::write(staging.join("half.txt"), b"partial")?;
            Err(io::Error::other("injected"))
        });

        assert!(result.is_err());
        assert!(!target.exists());
        let leftovers: Vec<_> = fs::read_dir(target.parent().unwrap()).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_publish_success_renames_into_place() {
        let temp = TempDir::new().unwrap();
        let target = utf8_root(&temp).join("templates").join("win32");

        publish_atomically(&target, |staging| fs::write(staging.join("system.reg"), b"x"))
            .unwrap();

        assert!(target.join("system.reg").is_file());
    }
}
