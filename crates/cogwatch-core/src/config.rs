//! Watcher configuration.
//!
//! Defaults live in [`defaults`], environment variable names in
//! [`env_vars`]. A [`WatcherConfig`] can be built from defaults, from the
//! environment, or from a TOML file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default values.
pub mod defaults {
    pub const ROOT: &str = "commands";
    pub const FILE_EXTENSION: &str = "rs";
    pub const DEBOUNCE_MS: u64 = 300;
    /// Pause before re-subscribing when an event stream ends while the root still exists.
    pub const RESTART_DELAY_MS: u64 = 1000;
    pub const ROOT_POLL_INITIAL_MS: u64 = 50;
    pub const ROOT_POLL_MAX_MS: u64 = 2000;
    pub const LOG_LEVEL: &str = "info";
}

/// Environment variable names.
pub mod env_vars {
    pub const ROOT: &str = "COGWATCH_ROOT";
    pub const BASE_DIR: &str = "COGWATCH_BASE_DIR";
    pub const DEBUG: &str = "COGWATCH_DEBUG";
    pub const PRELOAD: &str = "COGWATCH_PRELOAD";
    pub const FILE_EXTENSION: &str = "COGWATCH_FILE_EXTENSION";
    pub const DEBOUNCE_MS: &str = "COGWATCH_DEBOUNCE_MS";
    pub const LOG_LEVEL: &str = "COGWATCH_LOG";
    pub const LOG_JSON: &str = "COGWATCH_LOG_JSON";
}

/// Configuration of a lifecycle manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Watched root relative to `base_dir`, always written with forward slashes.
    pub root: String,
    /// Directory the root is resolved against. Defaults to the current directory.
    pub base_dir: PathBuf,
    /// When true, the watch loop only runs in debug builds.
    pub debug: bool,
    /// Load every discovered extension on startup.
    pub preload: bool,
    /// File extension (without the dot) that marks an extension source file.
    pub file_extension: String,
    /// Window used to collapse raw filesystem events into one batch.
    pub debounce_ms: u64,
    pub restart_delay_ms: u64,
    pub root_poll_initial_ms: u64,
    pub root_poll_max_ms: u64,
    /// Default log filter when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            root: defaults::ROOT.to_string(),
            base_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            debug: true,
            preload: false,
            file_extension: defaults::FILE_EXTENSION.to_string(),
            debounce_ms: defaults::DEBOUNCE_MS,
            restart_delay_ms: defaults::RESTART_DELAY_MS,
            root_poll_initial_ms: defaults::ROOT_POLL_INITIAL_MS,
            root_poll_max_ms: defaults::ROOT_POLL_MAX_MS,
            log_level: defaults::LOG_LEVEL.to_string(),
        }
    }
}

impl WatcherConfig {
    /// Create a configuration watching `root` with every other field defaulted.
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Defaults overridden by any `COGWATCH_*` environment variables that are set.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(root) = std::env::var(env_vars::ROOT) {
            config.root = root;
        }
        if let Ok(dir) = std::env::var(env_vars::BASE_DIR) {
            config.base_dir = PathBuf::from(dir);
        }
        if let Some(debug) = env_flag(env_vars::DEBUG) {
            config.debug = debug;
        }
        if let Some(preload) = env_flag(env_vars::PRELOAD) {
            config.preload = preload;
        }
        if let Ok(ext) = std::env::var(env_vars::FILE_EXTENSION) {
            config.file_extension = ext;
        }
        if let Some(ms) = std::env::var(env_vars::DEBOUNCE_MS)
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.debounce_ms = ms;
        }
        if let Ok(level) = std::env::var(env_vars::LOG_LEVEL) {
            config.log_level = level;
        }

        config
    }

    /// Load a configuration from a TOML file. Missing keys take their defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::Parse {
            location: path.display().to_string(),
            message: e.to_string(),
        })
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_preload(mut self, preload: bool) -> Self {
        self.preload = preload;
        self
    }

    pub fn with_file_extension(mut self, ext: impl Into<String>) -> Self {
        self.file_extension = ext.into();
        self
    }

    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.debounce_ms = ms;
        self
    }

    pub fn with_restart_delay_ms(mut self, ms: u64) -> Self {
        self.restart_delay_ms = ms;
        self
    }

    pub fn with_root_poll(mut self, initial_ms: u64, max_ms: u64) -> Self {
        self.root_poll_initial_ms = initial_ms;
        self.root_poll_max_ms = max_ms;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Check the root is usable as a forward-slash relative path.
    pub fn validate(&self) -> Result<()> {
        let root = self.root.trim();
        if root.is_empty() {
            return Err(Error::invalid_configuration("watched root must not be empty"));
        }
        if root.contains('\\') {
            return Err(crate::config_err!(
                "use forward slashes in the watched root: {}",
                root
            ));
        }
        if root.starts_with('/') || Path::new(root).is_absolute() {
            return Err(crate::config_err!(
                "watched root must be relative to the base directory: {}",
                root
            ));
        }
        if self.root_name().is_empty() {
            return Err(Error::invalid_configuration(format!(
                "watched root has no usable component: {root}"
            )));
        }
        Ok(())
    }

    /// Absolute location of the watched root.
    pub fn root_dir(&self) -> PathBuf {
        self.root
            .split('/')
            .filter(|c| !c.is_empty() && *c != ".")
            .fold(self.base_dir.clone(), |dir, c| dir.join(c))
    }

    /// Leading component of the root; extension identifiers start with it.
    pub fn root_name(&self) -> &str {
        self.root
            .split('/')
            .find(|c| !c.is_empty() && *c != ".")
            .unwrap_or("")
    }

    /// Whether the debug gate allows the watch loop to run in this build.
    pub fn should_watch(&self) -> bool {
        !self.debug || cfg!(debug_assertions)
    }
}

/// Read a boolean environment flag, accepting `1/0`, `true/false`, `yes/no`.
pub fn env_flag(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WatcherConfig::default();
        assert_eq!(config.root, "commands");
        assert!(config.debug);
        assert!(!config.preload);
        assert_eq!(config.file_extension, "rs");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_root_helpers() {
        let config = WatcherConfig::new("bot/cogs").with_base_dir("/srv/app");
        assert_eq!(config.root_name(), "bot");
        assert_eq!(config.root_dir(), PathBuf::from("/srv/app/bot/cogs"));

        let config = WatcherConfig::new("./cogs/").with_base_dir("/srv/app");
        assert_eq!(config.root_name(), "cogs");
        assert_eq!(config.root_dir(), PathBuf::from("/srv/app/cogs"));
    }

    #[test]
    fn test_validate_rejects_bad_roots() {
        assert!(matches!(
            WatcherConfig::new("bot\\cogs").validate(),
            Err(Error::InvalidConfiguration(_))
        ));
        assert!(WatcherConfig::new("").validate().is_err());
        assert!(WatcherConfig::new("/abs/cogs").validate().is_err());
        assert!(WatcherConfig::new("./").validate().is_err());
    }

    #[test]
    fn test_should_watch_without_debug_gate() {
        assert!(WatcherConfig::default().with_debug(false).should_watch());
        assert_eq!(
            WatcherConfig::default().with_debug(true).should_watch(),
            cfg!(debug_assertions)
        );
    }

    #[test]
    fn test_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cogwatch.toml");
        std::fs::write(&path, "root = \"cogs\"\npreload = true\ndebounce_ms = 10\n").unwrap();

        let config = WatcherConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.root, "cogs");
        assert!(config.preload);
        assert_eq!(config.debounce_ms, 10);
        assert_eq!(config.file_extension, "rs");
    }

    #[test]
    fn test_from_toml_file_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "root = [").unwrap();

        assert!(matches!(
            WatcherConfig::from_toml_file(&path),
            Err(Error::Parse { .. })
        ));
    }
}
