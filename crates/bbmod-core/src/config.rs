//! Configuration management for bbmod
//!
//! Handles loading of `bbmod.toml`. Every field has a default, so a missing
//! file or a partial one is fine.

use crate::error::ConfigError;
use crate::logging::{LogConfig, LogFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "bbmod.toml";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BridgeConfig {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Addon discovery and the entry script
    #[serde(default)]
    pub addons: AddonsConfig,

    /// Facts about the host process
    #[serde(default)]
    pub host: HostConfig,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,

    /// Optional log file, appended to
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            log_file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Addon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddonsConfig {
    /// Directory holding addons, the entry script and the fonts folder
    #[serde(default = "default_addons_dir")]
    pub dir: PathBuf,

    /// Entry script, relative to `dir`
    #[serde(default = "default_entry_script")]
    pub entry_script: PathBuf,

    /// Fonts folder, relative to `dir`
    #[serde(default = "default_fonts_dir")]
    pub fonts_dir: PathBuf,

    /// Sub-directories of `dir` that are not addons
    #[serde(default = "default_excluded_dirs")]
    pub excluded_dirs: Vec<String>,
}

impl Default for AddonsConfig {
    fn default() -> Self {
        Self {
            dir: default_addons_dir(),
            entry_script: default_entry_script(),
            fonts_dir: default_fonts_dir(),
            excluded_dirs: default_excluded_dirs(),
        }
    }
}

fn default_addons_dir() -> PathBuf {
    PathBuf::from("addons")
}

fn default_entry_script() -> PathBuf {
    PathBuf::from("init.lua")
}

fn default_fonts_dir() -> PathBuf {
    PathBuf::from("fonts")
}

fn default_excluded_dirs() -> Vec<String> {
    vec!["fonts".to_string(), "customdlls".to_string()]
}

impl AddonsConfig {
    pub fn entry_script_path(&self) -> PathBuf {
        self.dir.join(&self.entry_script)
    }

    pub fn fonts_path(&self) -> PathBuf {
        self.dir.join(&self.fonts_dir)
    }
}

/// Host process configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Load address of the host image, exposed to scripts as `pso.base_address`
    #[serde(default = "default_base_address")]
    pub base_address: u64,

    /// Language reported by `pso.get_language()` until a script changes it
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            base_address: default_base_address(),
            language: default_language(),
        }
    }
}

fn default_base_address() -> u64 {
    0x0040_0000
}

fn default_language() -> String {
    "EN".to_string()
}

impl BridgeConfig {
    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, else `bbmod.toml` in the working directory if it
    /// exists, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.is_file() {
                    Self::load_from(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.addons.entry_script.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                field: "addons.entry_script",
                reason: "must not be empty".to_string(),
            });
        }
        if self.host.language.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "host.language",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Logging settings derived from `[general]`.
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.general.log_level.clone(),
            format: self.general.log_format,
            file: self.general.log_file.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_is_valid() {
        let config = BridgeConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.addons.entry_script_path(), Path::new("addons/init.lua"));
        assert_eq!(config.addons.fonts_path(), Path::new("addons/fonts"));
        assert_eq!(config.host.base_address, 0x0040_0000);
        assert_eq!(config.host.language, "EN");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bbmod.toml");
        std::fs::write(
            &path,
            "[addons]\ndir = \"mods\"\n\n[host]\nlanguage = \"JP\"\n",
        )
        .unwrap();

        let config = BridgeConfig::load_from(&path).unwrap();
        assert_eq!(config.addons.dir, Path::new("mods"));
        assert_eq!(config.addons.entry_script, Path::new("init.lua"));
        assert_eq!(config.host.language, "JP");
        assert_eq!(config.general.log_format, LogFormat::Pretty);
    }

    #[test]
    fn parse_error_names_the_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.toml");
        std::fs::write(&path, "[addons\n").unwrap();
        let err = BridgeConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn empty_entry_script_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bbmod.toml");
        std::fs::write(&path, "[addons]\nentry_script = \"\"\n").unwrap();
        assert!(matches!(
            BridgeConfig::load_from(&path).unwrap_err(),
            ConfigError::Invalid { field: "addons.entry_script", .. }
        ));
    }
}
