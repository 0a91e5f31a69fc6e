use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::{self, DEFAULT_BASE_PATH, DEFAULT_DATABASE_PATH, DEFAULT_LOG_DIR};
use crate::domain::SourceTableSpec;
use crate::error::{PipelineError, Result};

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineSettings,
    /// Overrides the built-in source table list when present
    #[serde(default)]
    pub sources: Option<Vec<SourceTableSpec>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSettings {
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default)]
    pub parallel_loads: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

fn default_base_path() -> PathBuf {
    PathBuf::from(DEFAULT_BASE_PATH)
}

fn default_database_path() -> PathBuf {
    PathBuf::from(DEFAULT_DATABASE_PATH)
}

fn default_log_dir() -> String {
    DEFAULT_LOG_DIR.to_string()
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            database_path: default_database_path(),
            parallel_loads: false,
            log_dir: default_log_dir(),
        }
    }
}

impl Config {
    /// Loads `config.toml` from the working directory if it exists, then applies
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let path = Path::new(CONFIG_FILE);
        let config = if path.exists() {
            Self::from_path(path)?
        } else {
            Self::default()
        };
        config.with_env_overrides()
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// `MEDALLION_BASE_PATH`, `MEDALLION_DATABASE` and `MEDALLION_PARALLEL`
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(base) = std::env::var("MEDALLION_BASE_PATH") {
            if !base.trim().is_empty() {
                self.pipeline.base_path = PathBuf::from(base.trim());
            }
        }
        if let Ok(db) = std::env::var("MEDALLION_DATABASE") {
            if !db.trim().is_empty() {
                self.pipeline.database_path = PathBuf::from(db.trim());
            }
        }
        if let Ok(parallel) = std::env::var("MEDALLION_PARALLEL") {
            self.pipeline.parallel_loads = match parallel.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" | "" => false,
                other => {
                    return Err(PipelineError::Config(format!(
                        "MEDALLION_PARALLEL must be a boolean, got '{}'",
                        other
                    )))
                }
            };
        }
        Ok(self)
    }

    pub fn sources(&self) -> Vec<SourceTableSpec> {
        self.sources.clone().unwrap_or_else(constants::default_sources)
    }

    fn validate(&self) -> Result<()> {
        if let Some(sources) = &self.sources {
            let mut seen = std::collections::HashSet::new();
            for spec in sources {
                if spec.columns.is_empty() {
                    return Err(PipelineError::Config(format!(
                        "source '{}' declares no columns",
                        spec.table_name
                    )));
                }
                if !seen.insert(spec.table_name.as_str()) {
                    return Err(PipelineError::Config(format!(
                        "source '{}' is configured twice",
                        spec.table_name
                    )));
                }
            }
        }
        Ok(())
    }
}
