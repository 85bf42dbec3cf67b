use anyhow::{Context, Result};
use std::str::FromStr;
use std::time::Duration;

/// Process settings read from the environment (and `.env`, when present).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    /// Requests slower than this are logged at warn.
    pub slow_request: Duration,
    pub sql_logging: bool,
    /// Apply `migrations/schema.sql` on start-up.
    pub init_schema: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Missing optional keys fall
    /// back to their defaults; present but malformed keys are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL must be set")?;

        Ok(Self {
            database_url,
            bind_address: lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:5000".to_owned()),
            db_max_connections: parse(&lookup, "DB_MAX_CONNECTIONS", 100)?,
            db_min_connections: parse(&lookup, "DB_MIN_CONNECTIONS", 5)?,
            slow_request: Duration::from_millis(parse(&lookup, "SLOW_REQUEST_MS", 90)?),
            sql_logging: parse(&lookup, "SQL_LOGGING", false)?,
            init_schema: parse(&lookup, "DB_INIT_SCHEMA", true)?,
        })
    }
}

fn parse<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{} cannot be parsed: {:?}", key, raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/forum")]))
            .unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:5000");
        assert_eq!(config.db_max_connections, 100);
        assert_eq!(config.db_min_connections, 5);
        assert_eq!(config.slow_request, Duration::from_millis(90));
        assert!(!config.sql_logging);
        assert!(config.init_schema);
    }

    #[test]
    fn test_overrides_and_errors() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db/forum"),
            ("DB_MAX_CONNECTIONS", "20"),
            ("SQL_LOGGING", "true"),
        ]))
        .unwrap();
        assert_eq!(config.db_max_connections, 20);
        assert!(config.sql_logging);

        assert!(Config::from_lookup(lookup(&[])).is_err());
        assert!(Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db/forum"),
            ("SLOW_REQUEST_MS", "soon"),
        ]))
        .is_err());
    }
}
