use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::structs::snowflake;

#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("{name} has an invalid value `{value}`: expected {expected}")]
    Invalid {
        name: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Where the documents live.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageTarget {
    JsonDir(PathBuf),
    Sqlite(String),
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub token: String,
    pub storage: StorageTarget,
    pub bot_owner_id: Option<u64>,
    pub config_debounce: Duration,
    pub store_retry: Duration,
    pub close_grace: Duration,
    pub dm_summary: bool,
}

impl Settings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_vars(&env::vars().collect())
    }

    fn from_vars(vars: &HashMap<String, String>) -> Result<Self, SettingsError> {
        let get = |name: &str| vars.get(name).map(|v| v.trim()).filter(|v| !v.is_empty());

        let token = get("DISCORD_TOKEN").ok_or(SettingsError::Missing("DISCORD_TOKEN"))?.to_string();

        let storage = match get("DATABASE_URL") {
            Some(url) if url.starts_with("sqlite:") => StorageTarget::Sqlite(url.to_string()),
            Some(url) => {
                return Err(SettingsError::Invalid {
                    name: "DATABASE_URL",
                    value: url.to_string(),
                    expected: "a sqlite: url",
                })
            }
            None => StorageTarget::JsonDir(PathBuf::from(get("DATA_DIR").unwrap_or("./data"))),
        };

        let bot_owner_id = match get("BOT_OWNER_ID") {
            Some(raw) => Some(snowflake::parse(raw).ok_or_else(|| SettingsError::Invalid {
                name: "BOT_OWNER_ID",
                value: raw.to_string(),
                expected: "a user id",
            })?),
            None => None,
        };

        Ok(Self {
            token,
            storage,
            bot_owner_id,
            config_debounce: Duration::from_millis(number(get("CONFIG_DEBOUNCE_MS"), "CONFIG_DEBOUNCE_MS", 250)?),
            store_retry: Duration::from_secs(number(get("STORE_RETRY_SECS"), "STORE_RETRY_SECS", 30)?),
            close_grace: Duration::from_secs(number(get("CLOSE_GRACE_SECS"), "CLOSE_GRACE_SECS", 2)?),
            dm_summary: flag(get("DM_SUMMARY"), "DM_SUMMARY")?,
        })
    }
}

fn number(raw: Option<&str>, name: &'static str, default: u64) -> Result<u64, SettingsError> {
    match raw {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| SettingsError::Invalid {
            name,
            value: raw.to_string(),
            expected: "a whole number",
        }),
    }
}

fn flag(raw: Option<&str>, name: &'static str) -> Result<bool, SettingsError> {
    match raw.map(str::to_ascii_lowercase).as_deref() {
        None | Some("0" | "false" | "no" | "off") => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some(other) => Err(SettingsError::Invalid {
            name,
            value: other.to_string(),
            expected: "true or false",
        }),
    }
}
