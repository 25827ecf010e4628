use crate::config::AppConfig;
use crate::error::ConfigError;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Builds the layered figment: defaults, then the TOML file, then `SURGE_`
    /// environment variables (`SURGE_RISK__MAX_DRAWDOWN=250`).
    #[must_use]
    pub fn figment(path: impl AsRef<Path>) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("SURGE_").split("__"))
    }

    /// Loads and validates the application configuration.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or validation fails.
    pub fn load(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
        let config: AppConfig = Self::figment(path).extract()?;
        config.validate()?;
        tracing::debug!(?config, "configuration loaded");
        Ok(config)
    }
}
