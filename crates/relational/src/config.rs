//! Connection configuration read from the environment.
//!
//! Every key of a named connection lives under
//! `TMD_DATABASE_<CONNECTION>_<KEY>`:
//!
//! | key | required | default |
//! |---|---|---|
//! | `TYPE` | yes | |
//! | `HOST` | yes | |
//! | `PORT` | no | `5432` |
//! | `SSL_MODE` | no | `prefer` |
//! | `NAME` | yes | |
//! | `USER` | yes | |
//! | `PASSWORD` | no | empty |
//! | `MAX_CONNECTIONS` | no | `10` |
//! | `MIN_CONNECTIONS` | no | `1` |
//! | `CONNECT_TIMEOUT` | no | `30` (seconds) |
//! | `CONNECT_RETRIES` | no | `3` |
//!
//! An empty value counts as unset.

use std::fmt;
use std::str::FromStr;

use sqlx::postgres::{PgConnectOptions, PgSslMode};

use crate::connection::PoolConfig;
use crate::{RelationalError, Result};

/// Namespace of every connection key.
pub const ENV_PREFIX: &str = "TMD_DATABASE";

const DEFAULT_PORT: u16 = 5432;
const DEFAULT_SSL_MODE: &str = "prefer";
const SSL_MODES: &[&str] = &["disable", "allow", "prefer", "require", "verify-ca", "verify-full"];

/// Builds the environment variable name for `key` of connection `name`.
pub fn env_key(name: &str, key: &str) -> String {
    format!("{}_{}_{}", ENV_PREFIX, name, key)
}

/// Database engines a connection can point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseType {
    Postgres,
}

impl DatabaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseType::Postgres => "postgres",
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatabaseType {
    type Err = RelationalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(DatabaseType::Postgres),
            other => Err(RelationalError::Config(format!(
                "unsupported database type \"{}\"",
                other
            ))),
        }
    }
}

/// Everything needed to open one named connection.
#[derive(Clone)]
pub struct ConnectionConfig {
    pub name: String,
    pub database_type: DatabaseType,
    pub host: String,
    pub port: u16,
    pub ssl_mode: String,
    pub database: String,
    pub user: String,
    pub password: String,
    pub pool: PoolConfig,
}

impl ConnectionConfig {
    /// Reads the configuration of connection `name` from the process
    /// environment.
    pub fn from_env(name: &str) -> Result<Self> {
        Self::from_lookup(name, |key| std::env::var(key).ok())
    }

    /// Reads the configuration of connection `name` through `lookup`.
    ///
    /// # Errors
    ///
    /// `Config` listing every missing required key at once, or naming the
    /// first key whose value does not parse.
    pub fn from_lookup<F>(name: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(&env_key(name, key)).filter(|v| !v.is_empty());

        let required = ["TYPE", "HOST", "NAME", "USER"];
        let missing: Vec<String> = required
            .iter()
            .filter(|key| get(**key).is_none())
            .map(|key| env_key(name, key))
            .collect();
        if !missing.is_empty() {
            return Err(RelationalError::Config(format!(
                "connection \"{}\" is missing {}",
                name,
                missing.join(", ")
            )));
        }

        let require = |key: &str| {
            get(key).ok_or_else(|| {
                RelationalError::Config(format!("{} is not set", env_key(name, key)))
            })
        };
        let parse = |key: &str| -> Result<Option<u64>> {
            get(key)
                .map(|raw| {
                    raw.trim().parse::<u64>().map_err(|e| {
                        RelationalError::Config(format!(
                            "invalid value \"{}\" for {}: {}",
                            raw,
                            env_key(name, key),
                            e
                        ))
                    })
                })
                .transpose()
        };

        let database_type = require("TYPE")?.parse::<DatabaseType>()?;

        let port = match parse("PORT")? {
            Some(port) => u16::try_from(port).map_err(|_| {
                RelationalError::Config(format!("{} is out of range", env_key(name, "PORT")))
            })?,
            None => DEFAULT_PORT,
        };

        let ssl_mode = get("SSL_MODE").unwrap_or_else(|| DEFAULT_SSL_MODE.to_string());
        if !SSL_MODES.contains(&ssl_mode.as_str()) {
            return Err(RelationalError::Config(format!(
                "invalid value \"{}\" for {}: expected one of {}",
                ssl_mode,
                env_key(name, "SSL_MODE"),
                SSL_MODES.join(", ")
            )));
        }

        let mut pool = PoolConfig::default();
        if let Some(max) = parse("MAX_CONNECTIONS")? {
            pool.max_connections = saturate_u32(max);
        }
        if let Some(min) = parse("MIN_CONNECTIONS")? {
            pool.min_connections = saturate_u32(min);
        }
        if let Some(timeout) = parse("CONNECT_TIMEOUT")? {
            pool.connect_timeout = timeout;
        }
        if let Some(retries) = parse("CONNECT_RETRIES")? {
            pool.retry.max_retries = saturate_u32(retries);
        }
        if pool.min_connections > pool.max_connections {
            return Err(RelationalError::Config(format!(
                "{} ({}) exceeds {} ({})",
                env_key(name, "MIN_CONNECTIONS"),
                pool.min_connections,
                env_key(name, "MAX_CONNECTIONS"),
                pool.max_connections
            )));
        }

        Ok(Self {
            name: name.to_string(),
            database_type,
            host: require("HOST")?,
            port,
            ssl_mode,
            database: require("NAME")?,
            user: require("USER")?,
            password: get("PASSWORD").unwrap_or_default(),
            pool,
        })
    }

    /// Key/value connection string in libpq format.
    pub fn dsn(&self) -> String {
        self.format_dsn(&self.password)
    }

    /// `dsn()` with the password masked, safe to log.
    pub fn redacted_dsn(&self) -> String {
        if self.password.is_empty() {
            self.format_dsn("")
        } else {
            self.format_dsn("********")
        }
    }

    fn format_dsn(&self, password: &str) -> String {
        format!(
            "host={} port={} sslmode={} dbname={} user={} password={}",
            self.host, self.port, self.ssl_mode, self.database, self.user, password
        )
    }

    /// sqlx connect options equivalent to `dsn()`.
    pub fn connect_options(&self) -> Result<PgConnectOptions> {
        let ssl_mode = PgSslMode::from_str(&self.ssl_mode)
            .map_err(|e| RelationalError::Config(format!("invalid ssl mode: {}", e)))?;

        let mut options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .ssl_mode(ssl_mode)
            .database(&self.database)
            .username(&self.user)
            .statement_cache_capacity(self.pool.statement_cache_capacity);
        if !self.password.is_empty() {
            options = options.password(&self.password);
        }
        Ok(options)
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("name", &self.name)
            .field("database_type", &self.database_type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("ssl_mode", &self.ssl_mode)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"********")
            .field("pool", &self.pool)
            .finish()
    }
}

fn saturate_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| env.get(key).cloned()
    }

    fn minimal() -> Vec<(&'static str, &'static str)> {
        vec![
            ("TMD_DATABASE_MAIN_TYPE", "postgres"),
            ("TMD_DATABASE_MAIN_HOST", "db.local"),
            ("TMD_DATABASE_MAIN_NAME", "app"),
            ("TMD_DATABASE_MAIN_USER", "svc"),
        ]
    }

    #[test]
    fn test_defaults() {
        let config = ConnectionConfig::from_lookup("MAIN", lookup(&minimal())).unwrap();
        assert_eq!(config.database_type, DatabaseType::Postgres);
        assert_eq!(config.port, 5432);
        assert_eq!(config.ssl_mode, "prefer");
        assert_eq!(config.password, "");
        assert_eq!(config.pool.max_connections, 10);
        assert_eq!(config.pool.retry.max_retries, 3);
        assert_eq!(
            config.dsn(),
            "host=db.local port=5432 sslmode=prefer dbname=app user=svc password="
        );
    }

    #[test]
    fn test_port_uses_unified_namespace() {
        let mut env = minimal();
        env.push(("TMD_DATABASE_MAIN_PORT", "6543"));
        env.push(("TMD_DB_MAIN_POSTGRES_PORT", "1111"));
        let config = ConnectionConfig::from_lookup("MAIN", lookup(&env)).unwrap();
        assert_eq!(config.port, 6543);
    }

    #[test]
    fn test_full_config_and_redaction() {
        let mut env = minimal();
        env.extend([
            ("TMD_DATABASE_MAIN_TYPE", "PostgreSQL"),
            ("TMD_DATABASE_MAIN_SSL_MODE", "require"),
            ("TMD_DATABASE_MAIN_PASSWORD", "s3cret"),
            ("TMD_DATABASE_MAIN_MAX_CONNECTIONS", "25"),
            ("TMD_DATABASE_MAIN_MIN_CONNECTIONS", "5"),
            ("TMD_DATABASE_MAIN_CONNECT_TIMEOUT", "7"),
            ("TMD_DATABASE_MAIN_CONNECT_RETRIES", "0"),
        ]);
        let config = ConnectionConfig::from_lookup("MAIN", lookup(&env)).unwrap();

        assert_eq!(
            config.dsn(),
            "host=db.local port=5432 sslmode=require dbname=app user=svc password=s3cret"
        );
        assert!(!config.redacted_dsn().contains("s3cret"));
        assert!(!format!("{:?}", config).contains("s3cret"));
        assert_eq!(config.pool.max_connections, 25);
        assert_eq!(config.pool.min_connections, 5);
        assert_eq!(config.pool.connect_timeout, 7);
        assert_eq!(config.pool.retry.max_retries, 0);
        assert!(config.connect_options().is_ok());
    }

    #[test]
    fn test_missing_keys_reported_together() {
        let env = [("TMD_DATABASE_MAIN_TYPE", "postgres"), ("TMD_DATABASE_MAIN_HOST", "")];
        let err = ConnectionConfig::from_lookup("MAIN", lookup(&env)).unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, RelationalError::Config(_)));
        assert!(msg.contains("TMD_DATABASE_MAIN_HOST"));
        assert!(msg.contains("TMD_DATABASE_MAIN_NAME"));
        assert!(msg.contains("TMD_DATABASE_MAIN_USER"));
        assert!(!msg.contains("TMD_DATABASE_MAIN_TYPE"));
    }

    #[test]
    fn test_unsupported_type() {
        let mut env = minimal();
        env.push(("TMD_DATABASE_MAIN_TYPE", "mysql"));
        let err = ConnectionConfig::from_lookup("MAIN", lookup(&env)).unwrap_err();
        assert!(err.to_string().contains("unsupported database type \"mysql\""));
    }

    #[test]
    fn test_invalid_values() {
        for (key, value) in [
            ("TMD_DATABASE_MAIN_PORT", "abc"),
            ("TMD_DATABASE_MAIN_PORT", "70000"),
            ("TMD_DATABASE_MAIN_SSL_MODE", "sometimes"),
            ("TMD_DATABASE_MAIN_MIN_CONNECTIONS", "50"),
        ] {
            let mut env = minimal();
            env.push((key, value));
            let err = ConnectionConfig::from_lookup("MAIN", lookup(&env)).unwrap_err();
            assert!(matches!(err, RelationalError::Config(_)), "{key}={value}");
        }
    }

    #[test]
    fn test_env_key() {
        assert_eq!(env_key("orders", "HOST"), "TMD_DATABASE_orders_HOST");
    }
}
