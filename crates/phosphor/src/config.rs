//! `phosphor.toml` loading and command-line overrides.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cli::RunArgs;

pub const BUILTIN_VERTEX: &str = "builtin:crt.vert";
pub const BUILTIN_FRAGMENT: &str = "builtin:crt.frag";
pub const DEFAULT_TESTCARD: &str = "assets/testcard.svg";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub window: WindowSection,
    pub assets: AssetsSection,
    pub render: RenderSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowSection {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowSection {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            title: "Phosphor".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssetsSection {
    /// Shader file path or built-in identifier.
    pub vertex: String,
    pub fragment: String,
    pub testcard: PathBuf,
}

impl Default for AssetsSection {
    fn default() -> Self {
        Self {
            vertex: BUILTIN_VERTEX.to_string(),
            fragment: BUILTIN_FRAGMENT.to_string(),
            testcard: PathBuf::from(DEFAULT_TESTCARD),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub vsync: bool,
}

impl Default for RenderSection {
    fn default() -> Self {
        Self {
            seed: None,
            vsync: true,
        }
    }
}

impl Config {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let input = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&input)
    }

    /// Loads `explicit` when given (it must exist), otherwise `discovered`
    /// when present, otherwise the defaults.
    pub fn resolve(explicit: Option<&Path>, discovered: &Path) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load(path),
            None if discovered.is_file() => Self::load(discovered),
            None => {
                tracing::debug!(path = %discovered.display(), "no configuration file; using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }
        for (field, value) in [
            ("assets.vertex", &self.assets.vertex),
            ("assets.fragment", &self.assets.fragment),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{field} must not be empty")));
            }
        }
        if self.assets.testcard.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "assets.testcard must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Applies command-line flags on top of the file values.
    pub fn apply_overrides(&mut self, args: &RunArgs) {
        if let Some(vertex) = &args.vertex {
            self.assets.vertex = vertex.clone();
        }
        if let Some(fragment) = &args.fragment {
            self.assets.fragment = fragment.clone();
        }
        if let Some(testcard) = &args.testcard {
            self.assets.testcard = testcard.clone();
        }
        if let Some((width, height)) = args.size {
            self.window.width = width;
            self.window.height = height;
        }
        if args.seed.is_some() {
            self.render.seed = args.seed;
        }
        if args.no_vsync {
            self.render.vsync = false;
        }
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
