//! Process configuration from the environment

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::moderation::DEFAULT_COOLDOWN;

pub const TOKEN_VAR: &str = "DISCORD_TOKEN";
pub const OWNER_VAR: &str = "OWNER_ID";
pub const DATA_DIR_VAR: &str = "BAILIFF_DATA_DIR";
pub const COOLDOWN_VAR: &str = "BAILIFF_COOLDOWN_SECS";

/// Default directory for the YAML tables
pub const DEFAULT_DATA_DIR: &str = "data";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} is not valid: {value}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Clone)]
pub struct BotConfig {
    pub discord_token: String,
    /// The system owner, authorized in every chat
    pub owner_id: u64,
    pub data_dir: PathBuf,
    pub cooldown: Duration,
}

impl std::fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig")
            .field("discord_token", &"<redacted>")
            .field("owner_id", &self.owner_id)
            .field("data_dir", &self.data_dir)
            .field("cooldown", &self.cooldown)
            .finish()
    }
}

impl BotConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, which returns a variable's value
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let discord_token = lookup(TOKEN_VAR)
            .filter(|token| !token.trim().is_empty())
            .ok_or(ConfigError::Missing(TOKEN_VAR))?;

        let owner_raw = lookup(OWNER_VAR).ok_or(ConfigError::Missing(OWNER_VAR))?;
        let owner_id = owner_raw
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|id| *id != 0)
            .ok_or_else(|| ConfigError::Invalid {
                var: OWNER_VAR,
                value: owner_raw.clone(),
            })?;

        let data_dir = lookup(DATA_DIR_VAR)
            .filter(|dir| !dir.trim().is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_DATA_DIR), PathBuf::from);

        let cooldown = match lookup(COOLDOWN_VAR) {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::Invalid {
                    var: COOLDOWN_VAR,
                    value: raw.clone(),
                })?,
            None => DEFAULT_COOLDOWN,
        };

        Ok(Self {
            discord_token,
            owner_id,
            data_dir,
            cooldown,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config =
            BotConfig::from_lookup(lookup(&[(TOKEN_VAR, "token"), (OWNER_VAR, "1234")])).unwrap();

        assert_eq!(config.owner_id, 1234);
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.cooldown, Duration::from_secs(2));
        assert!(format!("{config:?}").contains("<redacted>"));
    }

    #[test]
    fn test_overrides() {
        let config = BotConfig::from_lookup(lookup(&[
            (TOKEN_VAR, "token"),
            (OWNER_VAR, "1234"),
            (DATA_DIR_VAR, "/var/lib/bailiff"),
            (COOLDOWN_VAR, "5"),
        ]))
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/var/lib/bailiff"));
        assert_eq!(config.cooldown, Duration::from_secs(5));
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            BotConfig::from_lookup(lookup(&[(OWNER_VAR, "1")])).unwrap_err(),
            ConfigError::Missing(TOKEN_VAR)
        );
        assert_eq!(
            BotConfig::from_lookup(lookup(&[(TOKEN_VAR, "t")])).unwrap_err(),
            ConfigError::Missing(OWNER_VAR)
        );
        assert_eq!(
            BotConfig::from_lookup(lookup(&[(TOKEN_VAR, "t"), (OWNER_VAR, "me")]))
                .unwrap_err()
                .to_string(),
            "OWNER_ID is not valid: me"
        );
        assert!(matches!(
            BotConfig::from_lookup(lookup(&[
                (TOKEN_VAR, "t"),
                (OWNER_VAR, "1"),
                (COOLDOWN_VAR, "soon")
            ])),
            Err(ConfigError::Invalid { var: COOLDOWN_VAR, .. })
        ));
    }
}
