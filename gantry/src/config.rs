use cartridge::catalog::CartridgeDefinition;
use cartridge::policy::GearSizePolicy;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    pub sentry_dsn: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CommonConfig {
    pub metrics: Option<MetricsConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Deserialize)]
pub struct GearSizesConfig {
    pub allowed: Vec<String>,
    #[serde(default)]
    pub default: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(flatten)]
    pub common: CommonConfig,
    pub gear_sizes: GearSizesConfig,
    /// Cartridge definitions the deployment offers by name.
    #[serde(default)]
    pub catalog: Vec<CartridgeDefinition>,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let config = serde_yaml::from_reader(file)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gear_sizes.allowed.is_empty() {
            return Err(ConfigError::NoGearSizes);
        }
        if let Some(default) = &self.gear_sizes.default
            && !self.gear_sizes.allowed.contains(default)
        {
            return Err(ConfigError::DefaultSizeNotAllowed(default.clone()));
        }

        let mut names = HashSet::new();
        for entry in &self.catalog {
            if !names.insert(&entry.name) {
                return Err(ConfigError::DuplicateCatalogEntry(entry.name.clone()));
            }
        }
        Ok(())
    }

    pub fn gear_size_policy(&self) -> GearSizePolicy {
        GearSizePolicy::new(self.gear_sizes.allowed.iter().cloned())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    Load(#[from] std::io::Error),

    #[error("could not parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("no gear sizes are configured")]
    NoGearSizes,

    #[error("default gear size '{0}' is not in the allowed list")]
    DefaultSizeNotAllowed(String),

    #[error("duplicate catalog entry '{0}'")]
    DuplicateCatalogEntry(String),
}
