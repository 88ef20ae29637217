//! Console settings: parse/write `console.conf` and locate the config directory.
//!
//! The file uses the same `key = value` format as `theme.conf` and
//! `keybinds.conf`. A missing file is created with defaults so users have
//! something to edit.
//!
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::ConfigError;

pub const CONSOLE_FILE: &str = "console.conf";
pub const THEME_FILE: &str = "theme.conf";
pub const KEYBINDS_FILE: &str = "keybinds.conf";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsoleConfig {
    /// Quiet period before a typed search query is applied.
    pub search_debounce_ms: u64,
    /// Table page size used until the first frame reports the real height.
    pub rows_per_page: usize,
    /// Network prefilled in the new location form.
    pub default_network: String,
    pub show_keybinds: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            search_debounce_ms: 200,
            rows_per_page: 10,
            default_network: "10.0.0.0/24".to_string(),
            show_keybinds: false,
        }
    }
}

impl ConsoleConfig {
    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let file_name = path.display().to_string();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: file_name.clone(),
            source,
        })?;
        let mut cfg = Self::default();
        for (idx, raw) in contents.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else {
                continue;
            };
            let (key, val) = (key.trim(), val.trim());
            let invalid = || ConfigError::InvalidValue {
                path: file_name.clone(),
                line: idx + 1,
                key: key.to_string(),
                value: val.to_string(),
            };
            match key {
                "search_debounce_ms" => cfg.search_debounce_ms = val.parse().map_err(|_| invalid())?,
                "rows_per_page" => {
                    cfg.rows_per_page = val.parse::<usize>().ok().filter(|n| *n > 0).ok_or_else(invalid)?;
                }
                "default_network" => {
                    crate::form::ip::Ipv4Network::parse(val).map_err(|_| invalid())?;
                    cfg.default_network = val.to_string();
                }
                "show_keybinds" => cfg.show_keybinds = parse_bool(val).ok_or_else(invalid)?,
                other => warn!(key = other, path = %file_name, "unknown console setting ignored"),
            }
        }
        Ok(cfg)
    }

    pub fn write_file(&self, path: &Path) -> std::io::Result<()> {
        use std::fmt::Write as _;
        let mut buf = String::new();
        buf.push_str("# wgadm console configuration\n\n");
        let _ = writeln!(buf, "search_debounce_ms = {}", self.search_debounce_ms);
        let _ = writeln!(buf, "rows_per_page = {}", self.rows_per_page);
        let _ = writeln!(buf, "default_network = {}", self.default_network);
        let _ = writeln!(buf, "show_keybinds = {}", self.show_keybinds);
        std::fs::write(path, buf)
    }

    /// Load `path`, or write defaults there when it does not exist yet.
    pub fn load_or_init(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            return Self::from_file(path);
        }
        let cfg = Self::default();
        match cfg.write_file(path) {
            Ok(()) => debug!(path = %path.display(), "wrote default console config"),
            Err(e) => warn!(path = %path.display(), error = %e, "cannot write default console config"),
        }
        Ok(cfg)
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// Directory holding the `.conf` files: `explicit` if given, otherwise
/// `$XDG_CONFIG_HOME/wgadm`, then `~/.config/wgadm`, then the working directory.
pub fn resolve_config_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")));
    match base {
        Some(base) => base.join("wgadm"),
        None => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("wgadm-config-{}-{name}", std::process::id()));
        let _ = std::fs::create_dir_all(&dir);
        dir.join(CONSOLE_FILE)
    }

    #[test]
    fn load_or_init_writes_defaults() {
        let path = temp_path("init");
        let _ = std::fs::remove_file(&path);
        let cfg = ConsoleConfig::load_or_init(&path).unwrap();
        assert_eq!(cfg, ConsoleConfig::default());
        assert!(path.exists());
        assert_eq!(ConsoleConfig::from_file(&path).unwrap(), cfg);
    }

    #[test]
    fn invalid_value_reports_line() {
        let path = temp_path("invalid");
        std::fs::write(&path, "# comment\nrows_per_page = 0\n").unwrap();
        match ConsoleConfig::from_file(&path) {
            Err(ConfigError::InvalidValue { line, key, .. }) => {
                assert_eq!(line, 2);
                assert_eq!(key, "rows_per_page");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unknown_key_is_skipped() {
        let path = temp_path("unknown");
        std::fs::write(&path, "theme = dark\nrows_per_page = 7\n").unwrap();
        let cfg = ConsoleConfig::from_file(&path).unwrap();
        assert_eq!(cfg.rows_per_page, 7);
        assert_eq!(cfg.search_debounce_ms, ConsoleConfig::default().search_debounce_ms);
    }

    #[test]
    fn explicit_dir_wins() {
        assert_eq!(resolve_config_dir(Some(Path::new("/tmp/x"))), PathBuf::from("/tmp/x"));
    }
}
