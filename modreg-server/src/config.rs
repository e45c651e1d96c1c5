use modreg_core::{RegistryError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub bind_addr: String,
    pub data_dir: PathBuf,
}

impl Config {
    /// Load configuration from an optional file plus MODREG_* environment
    /// variables, falling back to defaults for anything unset.
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = ::config::Config::builder()
            .set_default("bind_addr", "0.0.0.0:8080")
            .map_err(|e| RegistryError::Config(e.to_string()))?
            .set_default("data_dir", "/tmp/modules")
            .map_err(|e| RegistryError::Config(e.to_string()))?
            .add_source(::config::File::with_name(path).required(false))
            .add_source(::config::Environment::with_prefix("MODREG"))
            .build()
            .map_err(|e| RegistryError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| RegistryError::Config(e.to_string()))?;

        Ok(config)
    }
}
