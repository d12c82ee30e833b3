//! Configuration loading and root folder resolution
//!
//! Every service resolves its settings in the same priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing TOML file is never fatal: the service logs a warning and starts
//! with compiled defaults.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder for every module
pub const ROOT_FOLDER_ENV: &str = "CONFREG_ROOT_FOLDER";

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Root folder resolution for a named module
///
/// The root folder holds the module's local state (the pending registration
/// queue for `confreg-submit`).
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
}

impl RootFolderResolver {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
        }
    }

    /// Resolve the root folder: CLI → `CONFREG_ROOT_FOLDER` → TOML → OS default
    pub fn resolve(&self, cli_arg: Option<&Path>, toml_value: Option<&Path>) -> PathBuf {
        if let Some(path) = cli_arg {
            return path.to_path_buf();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = toml_value {
            return path.to_path_buf();
        }

        self.default_root_folder()
    }

    /// OS-dependent default root folder for this module
    pub fn default_root_folder(&self) -> PathBuf {
        dirs::data_local_dir()
            .map(|d| d.join("confreg").join(&self.module_name))
            .unwrap_or_else(|| PathBuf::from("./confreg_data").join(&self.module_name))
    }
}

/// Create the root folder (and parents) if missing
pub fn ensure_directory_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
        info!("Created root folder: {}", path.display());
    }
    Ok(())
}

/// Candidate TOML config paths for a module, highest priority first
///
/// `~/.config/confreg/<module>.toml`, then `/etc/confreg/<module>.toml` on Linux.
pub fn config_file_candidates(module_name: &str) -> Vec<PathBuf> {
    let file_name = format!("{}.toml", module_name);
    let mut candidates = Vec::new();

    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("confreg").join(&file_name));
    }
    if cfg!(target_os = "linux") {
        candidates.push(PathBuf::from("/etc/confreg").join(&file_name));
    }

    candidates
}

/// Load a module's TOML configuration
///
/// An explicit path must exist and parse. Without one, the first existing
/// candidate from [`config_file_candidates`] is used; if none exists the
/// compiled defaults are returned with a warning.
pub fn load_toml_config<T>(module_name: &str, explicit_path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let path = match explicit_path {
        Some(path) => path.to_path_buf(),
        None => match config_file_candidates(module_name)
            .into_iter()
            .find(|p| p.exists())
        {
            Some(path) => path,
            None => {
                warn!(
                    module = module_name,
                    "No config file found, using compiled defaults"
                );
                return Ok(T::default());
            }
        },
    };

    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Write a TOML configuration atomically
///
/// Serializes to `<path>.tmp` and renames over the target, so readers never
/// observe a half-written file. On Unix the file is restricted to 0600 since
/// it may carry API keys.
pub fn write_toml_config<T: Serialize>(config: &T, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = temp_path_for(path);
    std::fs::write(&tmp_path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))?;
    }

    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Sibling temp path used for atomic replacement (`file.toml` → `file.toml.tmp`)
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Resolve a secret or endpoint from environment first, then TOML
///
/// Blank values are ignored. When both sources are set the environment wins
/// and a warning is logged, since that usually means a stale TOML entry.
pub fn resolve_setting(env_var: &str, toml_value: Option<&str>) -> Option<String> {
    let env_value = std::env::var(env_var)
        .ok()
        .filter(|v| is_valid_value(v));
    let toml_value = toml_value.filter(|v| is_valid_value(v));

    match (env_value, toml_value) {
        (Some(env), Some(_)) => {
            warn!(
                env_var,
                "Setting found in both environment and TOML, using environment"
            );
            Some(env)
        }
        (Some(env), None) => Some(env),
        (None, Some(toml)) => Some(toml.to_string()),
        (None, None) => None,
    }
}

/// Non-empty, non-whitespace
pub fn is_valid_value(value: &str) -> bool {
    !value.trim().is_empty()
}
