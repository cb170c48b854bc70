//! Where config files live and how their layers combine.
//!
//! Two layers are read, later ones overriding earlier ones:
//! 1. `config.toml` in the user config directory (`$SIGIL_CONFIG_DIR`, or
//!    `sigil/` under the platform config dir)
//! 2. `sigil.toml` in the project directory
//!
//! An explicit `--config` file replaces both layers.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::{ConfigError, Result, SigilConfig};

/// Environment variable that relocates the user config directory.
pub const CONFIG_DIR_ENV: &str = "SIGIL_CONFIG_DIR";

const USER_FILE: &str = "config.toml";
const PROJECT_FILE: &str = "sigil.toml";

/// Which layer a config file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    User,
    Project,
    /// A file named on the command line.
    Explicit,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::User => write!(f, "user"),
            Layer::Project => write!(f, "project"),
            Layer::Explicit => write!(f, "explicit"),
        }
    }
}

/// One file that was looked for.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSource {
    pub layer: Layer,
    pub path: PathBuf,
    pub loaded: bool,
}

/// The merged config plus what went into it.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: SigilConfig,
    /// Every file looked for, lowest precedence first.
    pub sources: Vec<ConfigSource>,
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Read exactly one file. Missing or malformed is an error, not a warning.
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut loaded = Self::empty();
        loaded.config = read_file(path)?;
        loaded.sources.push(ConfigSource {
            layer: Layer::Explicit,
            path: path.to_path_buf(),
            loaded: true,
        });
        loaded.flag_plaintext_secret();
        Ok(loaded)
    }

    fn empty() -> Self {
        Self {
            config: SigilConfig::new(),
            sources: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }

    fn flag_plaintext_secret(&mut self) {
        if self.config.has_plaintext_secret() {
            self.warnings.push(format!(
                "[client] contains a plaintext secret. Consider setting {} instead.",
                crate::CLIENT_SECRET_ENV
            ));
        }
    }
}

/// What [`ConfigLocator::init`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    Created(PathBuf),
    /// Left untouched.
    AlreadyExists(PathBuf),
}

/// Knows where each config layer lives.
#[derive(Debug, Clone)]
pub struct ConfigLocator {
    user_dir: Option<PathBuf>,
    project_dir: PathBuf,
}

impl ConfigLocator {
    /// User directory from the environment, project directory `.`.
    pub fn from_env() -> Self {
        Self::new(user_config_dir(), PathBuf::new())
    }

    pub fn new(user_dir: Option<PathBuf>, project_dir: impl Into<PathBuf>) -> Self {
        Self {
            user_dir,
            project_dir: project_dir.into(),
        }
    }

    /// Path of the file for `layer`. `None` for [`Layer::Explicit`] or when
    /// no user directory could be determined.
    pub fn path_for(&self, layer: Layer) -> Option<PathBuf> {
        match layer {
            Layer::User => self.user_dir.as_ref().map(|d| d.join(USER_FILE)),
            Layer::Project => Some(self.project_dir.join(PROJECT_FILE)),
            Layer::Explicit => None,
        }
    }

    /// Merge the user and project layers.
    ///
    /// Absent files are skipped. A file that exists but does not parse is
    /// skipped with a warning so one bad layer does not hide the other.
    pub fn load(&self) -> Result<LoadedConfig> {
        let mut loaded = LoadedConfig::empty();

        for layer in [Layer::User, Layer::Project] {
            let Some(path) = self.path_for(layer) else {
                continue;
            };
            let mut source = ConfigSource {
                layer,
                path,
                loaded: false,
            };
            if source.path.is_file() {
                match read_file(&source.path) {
                    Ok(config) => {
                        loaded.config.merge(config);
                        source.loaded = true;
                    }
                    Err(e) => loaded.warnings.push(format!(
                        "Skipped {} config {}: {}",
                        layer,
                        source.path.display(),
                        e
                    )),
                }
            }
            loaded.sources.push(source);
        }

        loaded.flag_plaintext_secret();
        Ok(loaded)
    }

    /// Write `contents` as the user (or, with `local`, project) config file
    /// unless one is already there.
    pub fn init(&self, local: bool, contents: &str) -> Result<InitOutcome> {
        let layer = if local { Layer::Project } else { Layer::User };
        let path = self.path_for(layer).ok_or(ConfigError::NoConfigDir)?;
        if path.exists() {
            return Ok(InitOutcome::AlreadyExists(path));
        }

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| write_err(parent, e))?;
        }
        std::fs::write(&path, contents).map_err(|e| write_err(&path, e))?;
        Ok(InitOutcome::Created(path))
    }
}

/// The user config directory: `$SIGIL_CONFIG_DIR` if set, otherwise
/// `sigil/` under the platform config dir.
pub fn user_config_dir() -> Option<PathBuf> {
    match std::env::var(CONFIG_DIR_ENV) {
        Ok(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => dirs::config_dir().map(|d| d.join("sigil")),
    }
}

fn write_err(path: &Path, source: std::io::Error) -> ConfigError {
    ConfigError::WriteFile {
        path: path.display().to_string(),
        source,
    }
}

fn read_file(path: &Path) -> Result<SigilConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    SigilConfig::from_toml(&contents)
}
