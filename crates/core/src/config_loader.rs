use crate::config::AppConfig;
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration by merging `config/Config.toml` and `OPTRADE_`
    /// environment variables, then validates it.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed, or
    /// if a setting is invalid.
    pub fn load() -> Result<AppConfig> {
        Self::load_from(Self::base().merge(Self::env()))
    }

    /// Loads configuration with a profile file layered over the base file.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed, or
    /// if a setting is invalid.
    pub fn load_with_profile(profile: &str) -> Result<AppConfig> {
        Self::load_from(
            Self::base()
                .merge(Toml::file(format!("config/Config.{profile}.toml")))
                .merge(Self::env()),
        )
    }

    /// Loads configuration from an explicit file plus the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or a setting is invalid.
    pub fn load_file(path: &Path) -> Result<AppConfig> {
        Self::load_from(
            Figment::new()
                .merge(Toml::file(path))
                .merge(Self::env()),
        )
    }

    fn base() -> Figment {
        Figment::new().merge(Toml::file("config/Config.toml"))
    }

    fn env() -> Env {
        Env::prefixed("OPTRADE_").split("__")
    }

    fn load_from(figment: Figment) -> Result<AppConfig> {
        let config: AppConfig = figment.extract().context("Failed to load configuration")?;
        config.validate().context("Invalid configuration")?;
        tracing::debug!(
            subscriptions = config.subscriptions.len(),
            timezone = %config.engine.timezone,
            "Configuration loaded"
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::StrategyKind;
    use figment::providers::Toml;

    #[test]
    fn parses_engine_and_subscriptions_from_toml() {
        let toml = r#"
            [engine]
            timezone = "Asia/Kolkata"
            session_anchor = "09:15:00"
            max_entries_per_cycle = 2

            [retry]
            max_attempts = 4

            [[subscriptions]]
            symbol = "NIFTY"
            broker = "paper"
            strategy = "Ema10_Ema20_Supertrend"
            interval_minutes = 5
            lots = 1
            target_pct = "10"
        "#;

        let config =
            ConfigLoader::load_from(Figment::new().merge(Toml::string(toml))).unwrap();

        assert_eq!(config.engine.max_entries_per_cycle, 2);
        assert_eq!(config.engine.worker_count, 4);
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.subscriptions.len(), 1);
        assert_eq!(
            config.subscriptions[0].strategy,
            StrategyKind::Ema10Ema20Supertrend
        );
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let toml = r#"
            [[subscriptions]]
            symbol = "NIFTY"
            broker = "paper"
            strategy = "RSI_Divergence"
            interval_minutes = 5
            lots = 1
            target_pct = "10"
        "#;
        assert!(ConfigLoader::load_from(Figment::new().merge(Toml::string(toml))).is_err());
    }

    #[test]
    fn zero_interval_is_rejected() {
        let toml = r#"
            [[subscriptions]]
            symbol = "NIFTY"
            broker = "paper"
            strategy = "Ema10_Ema20_Supertrend"
            interval_minutes = 0
            lots = 1
            target_pct = "10"
        "#;
        assert!(ConfigLoader::load_from(Figment::new().merge(Toml::string(toml))).is_err());
    }
}
