//! Adapter configuration loading and validation.

use anyhow::{Context, Result};
use lib_redd_ffi::{BindingOptions, DynamicLoader, FileConfig};
use lib_storage::DEFAULT_PERMISSIONS;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReddConfig {
    /// Client library settings.
    #[serde(default)]
    pub library: LibraryConfig,

    /// File I/O settings.
    #[serde(default)]
    pub file: FileSettings,
}

/// Client library settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Library name or path. Bare names go through the loader search path.
    #[serde(default = "default_library_name")]
    pub name: String,

    /// Unload the library once no file uses it.
    #[serde(default = "default_true")]
    pub unload_when_idle: bool,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            name: default_library_name(),
            unload_when_idle: true,
        }
    }
}

impl LibraryConfig {
    pub fn loader(&self) -> DynamicLoader {
        DynamicLoader::new(&self.name)
    }

    pub fn binding_options(&self) -> BindingOptions {
        BindingOptions {
            unload_when_idle: self.unload_when_idle,
        }
    }
}

fn default_library_name() -> String {
    DynamicLoader::default_library_name()
        .to_string_lossy()
        .into_owned()
}

fn default_true() -> bool { true }

/// File I/O settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileSettings {
    /// Consecutive zero-byte writes tolerated before failing.
    #[serde(default = "default_max_stalled_writes")]
    pub max_stalled_writes: u32,

    /// Permission bits for files created by `put`.
    #[serde(default = "default_permissions")]
    pub permissions: u32,

    /// Transfer buffer size in bytes.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_max_stalled_writes() -> u32 { FileConfig::default().max_stalled_writes }
fn default_permissions() -> u32 { DEFAULT_PERMISSIONS }
fn default_buffer_size() -> usize { 1 << 20 }

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            max_stalled_writes: default_max_stalled_writes(),
            permissions: default_permissions(),
            buffer_size: default_buffer_size(),
        }
    }
}

impl FileSettings {
    pub fn file_config(&self) -> FileConfig {
        FileConfig {
            max_stalled_writes: self.max_stalled_writes,
        }
    }
}

/// Load configuration from a file, or defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<ReddConfig> {
    let Some(path) = path else {
        return Ok(ReddConfig::default());
    };

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: ReddConfig = if path.extension().map_or(false, |e| e == "json") {
        serde_json::from_str(&content)
            .with_context(|| "Failed to parse config as JSON")?
    } else {
        // Assume TOML
        toml::from_str(&content)
            .with_context(|| "Failed to parse config as TOML")?
    };

    validate_config(&config)?;

    Ok(config)
}

/// Validate configuration.
fn validate_config(config: &ReddConfig) -> Result<()> {
    if config.library.name.trim().is_empty() {
        anyhow::bail!("library.name must not be empty");
    }

    if config.file.buffer_size == 0 {
        anyhow::bail!("file.buffer_size must be at least 1 byte");
    }

    if config.file.max_stalled_writes == 0 {
        anyhow::bail!("file.max_stalled_writes must be at least 1");
    }

    if config.file.permissions > 0o7777 {
        anyhow::bail!(
            "Invalid file.permissions: {:#o}. Must be at most 0o7777",
            config.file.permissions
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let config = load_config(None).unwrap();
        assert!(config.library.name.contains("redd"));
        assert!(config.library.unload_when_idle);
        assert_eq!(config.file.permissions, 0o666);
        assert_eq!(config.file.max_stalled_writes, 8);
    }

    #[test]
    fn test_partial_toml() {
        let config: ReddConfig = toml::from_str(
            r#"
            [library]
            name = "/opt/redd/lib/libredd.so"

            [file]
            permissions = 0o640
            "#,
        )
        .unwrap();

        assert_eq!(config.library.name, "/opt/redd/lib/libredd.so");
        assert!(config.library.unload_when_idle);
        assert_eq!(config.file.permissions, 0o640);
        assert_eq!(config.file.buffer_size, 1 << 20);
        validate_config(&config).unwrap();
    }

    #[test]
    fn test_load_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        writeln!(
            file,
            r#"{{"library": {{"name": "libredd-test.so", "unload_when_idle": false}}, "file": {{"buffer_size": 4096}}}}"#
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.library.name, "libredd-test.so");
        assert!(!config.library.binding_options().unload_when_idle);
        assert_eq!(config.file.buffer_size, 4096);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[file]\nbuffer_size = 0").unwrap();

        let err = load_config(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("buffer_size"));
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Some(Path::new("/nonexistent/redd.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
