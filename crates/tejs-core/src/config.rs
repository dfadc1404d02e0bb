use crate::error::{Result, TejsError};
use crate::monitor::MonitorPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_PREFIX: &str = ";;";
pub const DEFAULT_SUFFIX: &str = ";";
pub const SETTINGS_FILENAME: &str = "settings.json";

/// Shortcuts available before any shortcut-file is configured.
pub const DEFAULT_SETTINGS_SHORTCUTS: &str = "\
~~
^hi$
~~
return \"Hello! How are you?\";
~~
hi - Expands to a friendly greeting.
~~
^d([0-9]+)$
~~
return Math.floor(Math.random() * Number($1)) + 1;
~~
d{sides} - Rolls a die with the given number of sides.
";

/// User settings, persisted as JSON in the config directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Text that opens a trigger inside a document line.
    pub prefix: String,
    /// Text that closes a trigger inside a document line.
    pub suffix: String,
    /// Shortcut-files, in the order their rules are added to the table.
    pub shortcut_files: Vec<String>,
    /// Shortcut-file text defined directly in the settings. These rules
    /// come before every shortcut-file rule.
    pub settings_shortcuts: String,
    /// Gate for the `runExternal` script binding.
    pub allow_external: bool,
    pub monitor_policy: MonitorPolicy,
    /// Directory that relative shortcut-file identities resolve against.
    pub vault_root: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            prefix: DEFAULT_PREFIX.to_string(),
            suffix: DEFAULT_SUFFIX.to_string(),
            shortcut_files: Vec::new(),
            settings_shortcuts: DEFAULT_SETTINGS_SHORTCUTS.to_string(),
            allow_external: false,
            monitor_policy: MonitorPolicy::OnModify,
            vault_root: None,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.prefix.is_empty() {
            return Err(TejsError::InvalidConfig("prefix must not be empty".into()));
        }
        if self.suffix.is_empty() {
            return Err(TejsError::InvalidConfig("suffix must not be empty".into()));
        }
        if self.prefix == self.suffix {
            return Err(TejsError::InvalidConfig(
                "prefix and suffix must differ".into(),
            ));
        }
        Ok(())
    }

    /// The root that shortcut-file identities resolve against.
    pub fn resolved_vault_root(&self) -> PathBuf {
        self.vault_root
            .clone()
            .unwrap_or_else(|| env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }

    /// Load settings from `path`, or return the defaults if it doesn't exist.
    pub fn load_from(path: &Path) -> Result<Settings> {
        if !path.exists() {
            return Ok(Settings::default());
        }
        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Settings::default());
        }
        let settings: Settings = serde_json::from_str(&content)
            .map_err(|e| TejsError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)?;
        Ok(())
    }

    /// Load settings from the default location, creating the file on first use.
    pub fn load() -> Result<Settings> {
        let path = ensure_config_dir()?.join(SETTINGS_FILENAME);
        Settings::load_from(&path)
    }
}

/// Get the tejs configuration directory
pub fn get_config_dir() -> PathBuf {
    env::var("HOME")
        .map(|home| PathBuf::from(home).join(".tejs"))
        .unwrap_or_else(|_| PathBuf::from(".tejs"))
}

/// Get the path to the settings file
pub fn get_settings_file_path() -> PathBuf {
    get_config_dir().join(SETTINGS_FILENAME)
}

/// Ensure the configuration directory and settings file exist
pub fn ensure_config_dir() -> Result<PathBuf> {
    let config_dir = get_config_dir();
    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }

    let settings_path = get_settings_file_path();
    if !settings_path.exists() {
        info!(path = %settings_path.display(), "creating default settings file");
        Settings::default().save_to(&settings_path)?;
    }

    Ok(config_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILENAME);
        fs::write(&path, r#"{ "prefix": "[[", "allow_external": true }"#).unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.prefix, "[[");
        assert_eq!(settings.suffix, DEFAULT_SUFFIX);
        assert!(settings.allow_external);
        assert_eq!(settings.monitor_policy, MonitorPolicy::OnModify);
    }

    #[test]
    fn save_then_load_keeps_file_list_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILENAME);
        let settings = Settings {
            shortcut_files: vec!["b.md".into(), "a.md".into()],
            monitor_policy: MonitorPolicy::OnTouch,
            ..Settings::default()
        };
        settings.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path).unwrap(), settings);
    }

    #[test]
    fn rejects_matching_prefix_and_suffix() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILENAME);
        fs::write(&path, r#"{ "prefix": ";", "suffix": ";" }"#).unwrap();
        assert!(matches!(
            Settings::load_from(&path),
            Err(TejsError::InvalidConfig(_))
        ));
    }

    #[test]
    fn malformed_json_is_invalid_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILENAME);
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Settings::load_from(&path),
            Err(TejsError::InvalidConfig(_))
        ));
    }
}
