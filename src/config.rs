use std::env;

use chrono::Duration;
use dotenvy::dotenv;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_DRAFT_TTL_MINUTES: i64 = 60;
const DEFAULT_SUPPORT_CONTACT: &str = "support@snowschoolers.com";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub draft_ttl: Duration,
    pub support_contact: String,
}

impl Config {
    /// Reads the configuration from the process environment, after loading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?;
        let draft_ttl_minutes = parse_or(&lookup, "DRAFT_TTL_MINUTES", DEFAULT_DRAFT_TTL_MINUTES)?;
        let draft_ttl = Duration::try_minutes(draft_ttl_minutes)
            .filter(|ttl| *ttl > Duration::zero())
            .ok_or(ConfigError::Invalid {
                name: "DRAFT_TTL_MINUTES",
                value: draft_ttl_minutes.to_string(),
            })?;
        let support_contact =
            lookup("SUPPORT_CONTACT").unwrap_or_else(|| DEFAULT_SUPPORT_CONTACT.to_string());

        Ok(Config {
            database_url,
            max_connections,
            draft_ttl,
            support_contact,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}
