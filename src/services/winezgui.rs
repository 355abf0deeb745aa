//! WineZGUI launcher scripts.
//!
//! WineZGUI keeps one directory per game under its `Prefixes` root, each with
//! a generated `*.sh` launcher of shell assignments:
//!
//! ```text
//! export WINEPREFIX="$HOME/.local/share/winezgui/Prefixes/Game-abc123"
//! export EXE_FILE="${WINEPREFIX}/drive_c/Game/game.exe"
//! export GAME_NAME="Some Game"
//! export INFOFILE="$WINEPREFIX/Game.info"
//! export DXVK_HUD=fps
//! wine "$EXE_FILE" "$@"
//! ```
//!
//! Only the assignments are read; the script is never executed.

use super::importer::{ImportError, ScriptConverter};
use super::prefix_tree::staging_path;
use crate::models::{CharmFile, CharmSource};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::fs;
use std::io;

/// Fields recovered from one launcher script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WineZguiScript {
    pub script_path: Utf8PathBuf,
    pub name: Option<String>,
    pub exe: Option<Utf8PathBuf>,
    pub prefix: Option<Utf8PathBuf>,
    pub args: String,
    pub workdir: Option<Utf8PathBuf>,
    pub icon: Option<Utf8PathBuf>,
    pub info_file: Option<Utf8PathBuf>,
    pub env_vars: IndexMap<String, String>,
}

impl WineZguiScript {
    /// Build launcher metadata, or `None` if the script names no executable.
    ///
    /// `prefix_dir` is used when the script doesn't set `WINEPREFIX`.
    pub fn to_charm(&self, prefix_dir: &Utf8Path) -> Option<CharmFile> {
        let exe_file = self.exe.clone()?;

        let progname = self
            .name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .or_else(|| exe_file.file_stem().map(str::to_string))
            .or_else(|| self.script_path.file_stem().map(str::to_string))
            .unwrap_or_else(|| "launcher".to_string());

        let workdir = self
            .workdir
            .clone()
            .or_else(|| exe_file.parent().map(Utf8Path::to_path_buf));

        Some(CharmFile {
            wineprefix: self
                .prefix
                .clone()
                .unwrap_or_else(|| prefix_dir.to_path_buf()),
            progname: progname.trim().to_string(),
            args: self.args.clone(),
            workdir,
            env_vars: self.env_vars.clone(),
            icon: self.icon.clone(),
            script_name: self.script_path.file_name().map(str::to_string),
            source: CharmSource::Winezgui,
            exe_file,
        })
    }
}

/// Reads the assignment subset of WineZGUI scripts and their `.info` files.
#[derive(Debug, Clone)]
pub struct ScriptParser {
    /// `[export] NAME=value`
    assignment: Regex,

    /// `$NAME` or `${NAME}`
    variable: Regex,

    /// `Key: value` lines in `.info` files
    info_line: Regex,

    home: Option<String>,
}

impl ScriptParser {
    pub fn new() -> Self {
        let home = dirs::home_dir().and_then(|p| p.to_str().map(str::to_string));
        Self::build(home)
    }

    /// Parser that expands `$HOME` and `~` to `home`.
    pub fn with_home(home: impl Into<String>) -> Self {
        Self::build(Some(home.into()))
    }

    fn build(home: Option<String>) -> Self {
        Self {
            assignment: Regex::new(r"^\s*(?:export\s+)?([A-Za-z_][A-Za-z0-9_]*)=(.*)$")
                .expect("Invalid assignment regex"),
            variable: Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
                .expect("Invalid variable regex"),
            info_line: Regex::new(r"^\s*([A-Za-z][A-Za-z ]*?)\s*:\s*(.*?)\s*$")
                .expect("Invalid info line regex"),
            home,
        }
    }

    /// Parse a script file, then fill gaps from its `INFOFILE` if one exists.
    pub fn parse_file(&self, path: &Utf8Path) -> Result<WineZguiScript, ImportError> {
        let contents = fs::read_to_string(path).map_err(|source| {
            if source.kind() == io::ErrorKind::InvalidData {
                ImportError::Parse {
                    path: path.to_path_buf(),
                    message: "script is not valid UTF-8".to_string(),
                }
            } else {
                ImportError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        let mut script = self.parse_str(path, &contents);
        if let Some(info_file) = script.info_file.clone() {
            self.apply_info_file(&mut script, &info_file);
        }
        Ok(script)
    }

    /// Parse script text. Unknown assignments are kept for variable expansion
    /// but otherwise ignored.
    pub fn parse_str(&self, script_path: &Utf8Path, contents: &str) -> WineZguiScript {
        let mut script = WineZguiScript {
            script_path: script_path.to_path_buf(),
            ..WineZguiScript::default()
        };
        let mut vars: HashMap<String, String> = HashMap::new();

        for line in contents.lines() {
            let trimmed = line.trim_start();
            if trimmed.starts_with('#') {
                continue;
            }
            let Some(caps) = self.assignment.captures(line) else {
                continue;
            };

            let key = &caps[1];
            let value = self.parse_value(&caps[2], &vars);
            vars.insert(key.to_string(), value.clone());

            if is_env_override(key) {
                script.env_vars.insert(key.to_string(), value.clone());
            }
            if value.is_empty() {
                continue;
            }

            match key {
                "WINEPREFIX" => script.prefix = Some(value.into()),
                "EXE_FILE" | "EXE_PATH" => script.exe = Some(value.into()),
                "GAME_NAME" | "PROG_NAME" | "NAME" => script.name = Some(value),
                "ARGS" | "EXE_ARGS" => script.args = value,
                "WORKDIR" => script.workdir = Some(value.into()),
                "ICON" => script.icon = Some(value.into()),
                "INFOFILE" => script.info_file = Some(self.resolve(script_path, &value)),
                _ => {}
            }
        }

        script
    }

    fn apply_info_file(&self, script: &mut WineZguiScript, info_file: &Utf8Path) {
        let contents = match fs::read_to_string(info_file) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::debug!("Skipping info file {}: {}", info_file, e);
                return;
            }
        };

        let no_vars = HashMap::new();
        for line in contents.lines() {
            let Some(caps) = self.info_line.captures(line) else {
                continue;
            };
            // Info values run to end of line, spaces included
            let value = self.expand(caps[2].trim_matches('"'), &no_vars);
            if value.is_empty() {
                continue;
            }

            match caps[1].to_ascii_lowercase().as_str() {
                "name" if script.name.is_none() => script.name = Some(value),
                "exe" if script.exe.is_none() => script.exe = Some(value.into()),
                "args" if script.args.is_empty() => script.args = value,
                "prefix" if script.prefix.is_none() => script.prefix = Some(value.into()),
                "icon" if script.icon.is_none() => script.icon = Some(value.into()),
                "workdir" if script.workdir.is_none() => script.workdir = Some(value.into()),
                _ => {}
            }
        }
    }

    /// Strip quoting and expand variables the way the shell would for the
    /// simple forms WineZGUI writes.
    fn parse_value(&self, raw: &str, vars: &HashMap<String, String>) -> String {
        let raw = raw.trim();

        if let Some(rest) = raw.strip_prefix('\'') {
            // Single quotes are literal
            return rest.split('\'').next().unwrap_or_default().to_string();
        }

        let unquoted = if let Some(rest) = raw.strip_prefix('"') {
            let mut out = String::with_capacity(rest.len());
            let mut chars = rest.chars();
            while let Some(c) = chars.next() {
                match c {
                    '"' => break,
                    '\\' => {
                        if let Some(next) = chars.next() {
                            out.push(next);
                        }
                    }
                    _ => out.push(c),
                }
            }
            out
        } else {
            raw.split_whitespace().next().unwrap_or_default().to_string()
        };

        self.expand(&unquoted, vars)
    }

    fn expand(&self, value: &str, vars: &HashMap<String, String>) -> String {
        let expanded = self.variable.replace_all(value, |caps: &Captures| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();

            match vars.get(name) {
                Some(v) => v.clone(),
                None if name == "HOME" => self.home.clone().unwrap_or_else(|| caps[0].to_string()),
                None => caps[0].to_string(),
            }
        });

        if let Some(home) = &self.home
            && let Some(rest) = expanded.strip_prefix('~')
            && (rest.is_empty() || rest.starts_with('/'))
        {
            return format!("{}{}", home, rest);
        }
        expanded.into_owned()
    }

    fn resolve(&self, script_path: &Utf8Path, value: &str) -> Utf8PathBuf {
        let path = Utf8PathBuf::from(value);
        if path.is_absolute() {
            return path;
        }
        script_path
            .parent()
            .map(|dir| dir.join(&path))
            .unwrap_or(path)
    }
}

impl Default for ScriptParser {
    fn default() -> Self {
        Self::new()
    }
}

fn is_env_override(key: &str) -> bool {
    matches!(key, "WINEDLLOVERRIDES" | "WINEESYNC" | "WINEFSYNC")
        || key.starts_with("DXVK_")
        || key.starts_with("VKD3D_")
        || key.starts_with("MANGOHUD")
}

/// Top-level `*.sh` files in `dir`, sorted by name.
pub fn shell_scripts(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, ImportError> {
    let entries = fs::read_dir(dir).map_err(|source| ImportError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut scripts = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ImportError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = match Utf8PathBuf::try_from(entry.path()) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!("Skipping non-UTF-8 path: {}", e);
                continue;
            }
        };
        if path.extension() == Some("sh") && path.is_file() {
            scripts.push(path);
        }
    }

    scripts.sort();
    Ok(scripts)
}

/// Converts every WineZGUI launcher in a prefix directory into a `.charm`
/// file beside it.
#[derive(Debug, Clone, Default)]
pub struct WineZguiConverter {
    parser: ScriptParser,
}

impl WineZguiConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parser(parser: ScriptParser) -> Self {
        Self { parser }
    }
}

impl ScriptConverter for WineZguiConverter {
    fn convert_prefix(&self, prefix_dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, ImportError> {
        let mut created = Vec::new();

        for script_path in shell_scripts(prefix_dir)? {
            let script = match self.parser.parse_file(&script_path) {
                Ok(script) => script,
                Err(e) => {
                    tracing::warn!("Skipping unreadable script: {}", e);
                    continue;
                }
            };

            let Some(charm) = script.to_charm(prefix_dir) else {
                tracing::debug!("No executable in {}, skipping", script_path);
                continue;
            };

            let target = prefix_dir.join(charm.file_name());
            match write_new_charm(&target, &charm) {
                Ok(true) => {
                    tracing::debug!("Created {} from {}", target, script_path);
                    created.push(target);
                }
                Ok(false) => tracing::debug!("{} already exists, leaving it alone", target),
                Err(e) => tracing::warn!("Skipping {}: {}", script_path, e),
            }
        }

        Ok(created)
    }
}

/// Write `charm` to `target` unless something is already there.
///
/// The YAML goes to a staging sibling first and is hard-linked into place,
/// so `target` either holds a complete file or does not exist.
///
/// # Returns
/// `true` if the file was created
fn write_new_charm(target: &Utf8Path, charm: &CharmFile) -> Result<bool, ImportError> {
    let yaml = serde_yaml_ng::to_string(charm).map_err(|source| ImportError::Serialize {
        path: target.to_path_buf(),
        source,
    })?;

    if target.exists() {
        return Ok(false);
    }

    let staging = staging_path(target);
    let result = fs::write(&staging, yaml.as_bytes()).and_then(|()| fs::hard_link(&staging, target));
    if let Err(cleanup) = fs::remove_file(&staging)
        && cleanup.kind() != io::ErrorKind::NotFound
    {
        tracing::warn!("Failed to remove staging file {}: {}", staging, cleanup);
    }

    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(source) => Err(ImportError::Io {
            path: target.to_path_buf(),
            source,
        }),
    }
}
