//! Configuration file support for xcresolve.
//!
//! An `xcresolve.toml` next to (or above) the working directory persists
//! project settings so they don't have to be passed as flags on every
//! invocation. CLI flags always win over file values.
//!
//! ## Example Configuration
//!
//! ```toml
//! [project]
//! workspace = "Example.xcworkspace"
//! scheme = "Example"
//! configuration = "Release"
//!
//! [signing]
//! export_method = "app-store"
//!
//! [signing.profiles]
//! "tools.example.app" = "match AppStore tools.example.app"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// The default configuration file name.
pub const CONFIG_FILE_NAME: &str = "xcresolve.toml";

/// Root structure of `xcresolve.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub project: ProjectSection,
    pub signing: SigningSection,
}

/// Build-container settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSection {
    /// Path to an `.xcodeproj` bundle. Mutually exclusive with `workspace`.
    pub project: Option<PathBuf>,

    /// Path to an `.xcworkspace` bundle. Mutually exclusive with `project`.
    pub workspace: Option<PathBuf>,

    /// Scheme to resolve against; left empty, it is selected at runtime.
    pub scheme: Option<String>,

    /// Build configuration (e.g. "Debug", "Release").
    pub configuration: Option<String>,
}

/// Code-signing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningSection {
    /// Distribution channel used to arbitrate profile conflicts
    /// (e.g. "app-store", "ad-hoc").
    pub export_method: Option<String>,

    /// Pre-resolved profile mapping, merged with the one detected from
    /// the project files.
    pub profiles: BTreeMap<String, String>,
}

impl FileConfig {
    /// Loads configuration from the given file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: FileConfig = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Searches for `xcresolve.toml` from `start_dir` upward, stopping at
    /// a repository root (a directory containing `.git`) or the
    /// filesystem root.
    pub fn discover_from(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);
            if config_path.is_file() {
                let config = Self::load_from_file(&config_path)?;
                return Ok(Some((config, config_path)));
            }
            if current.join(".git").exists() || !current.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Discovery starting from the current working directory.
    pub fn discover() -> Result<Option<(Self, PathBuf)>> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        Self::discover_from(&cwd)
    }
}
