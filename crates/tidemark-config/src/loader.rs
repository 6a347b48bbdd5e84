use std::path::{Path, PathBuf};

use tidemark_common::{Error, Result};
use tracing::{debug, info};

use crate::model::TidemarkConfig;

/// File names tried, in order, when no config path is given.
const DEFAULT_CONFIG_FILES: &[&str] = &["tidemark.yml", "tidemark.yaml", "tidemark.toml"];

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load `path` if given, otherwise the first default config file found in
    /// `dir`, otherwise built-in defaults. The result is validated.
    pub fn load(path: Option<&Path>, dir: &Path) -> Result<TidemarkConfig> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::discover(dir) {
                Some(found) => Self::from_file(&found)?,
                None => {
                    debug!("no config file in {}, using defaults", dir.display());
                    TidemarkConfig::default()
                }
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn discover(dir: &Path) -> Option<PathBuf> {
        DEFAULT_CONFIG_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.is_file())
    }

    pub fn from_file(path: &Path) -> Result<TidemarkConfig> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {e}", path.display()))
        })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let config = Self::parse(&contents, ext)?;
        info!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(contents: &str, ext: &str) -> Result<TidemarkConfig> {
        match ext {
            "yml" | "yaml" => serde_yaml::from_str(contents)
                .map_err(|e| Error::Config(format!("YAML parse error: {e}"))),
            "toml" => {
                toml::from_str(contents).map_err(|e| Error::Config(format!("TOML parse error: {e}")))
            }
            other => Err(Error::Config(format!(
                "unsupported config extension: {other}"
            ))),
        }
    }
}
