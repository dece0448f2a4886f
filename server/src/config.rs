//! Configuration management for the server.

use std::env;
use std::path::PathBuf;

use crate::db::Dialect;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Content store URL (`mysql://`, `postgres://` or `sqlite:`)
    pub database_url: String,
    /// Prefix of the host tables
    pub table_prefix: String,
    /// Where snapshot files are written
    pub backup_dir: PathBuf,
    /// Where policy settings and restore jobs are kept
    pub state_dir: PathBuf,
    /// File name prefix of snapshots
    pub backup_prefix: String,
    /// Items applied per restore step when the request does not say
    pub restore_batch_size: usize,
    /// Bearer token required on admin routes; open access when unset
    pub admin_token: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let database_url = env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)?;
        if Dialect::from_url(&database_url).is_none() {
            return Err(ConfigError::UnsupportedDatabase);
        }

        let table_prefix = env::var("TABLE_PREFIX").unwrap_or_else(|_| "typecho_".to_string());
        if !is_plain_name(&table_prefix) {
            return Err(ConfigError::InvalidName("TABLE_PREFIX"));
        }

        let backup_prefix = env::var("BACKUP_PREFIX").unwrap_or_else(|_| "AMD_backup".to_string());
        if backup_prefix.is_empty() || !is_plain_name(&backup_prefix) {
            return Err(ConfigError::InvalidName("BACKUP_PREFIX"));
        }

        let restore_batch_size = match env::var("RESTORE_BATCH_SIZE") {
            Ok(raw) => raw
                .parse()
                .ok()
                .filter(|size| *size > 0)
                .ok_or(ConfigError::InvalidBatchSize)?,
            Err(_) => 200,
        };

        let admin_token = env::var("ADMIN_TOKEN").ok().filter(|t| !t.is_empty());

        Ok(Self {
            host,
            port,
            database_url,
            table_prefix,
            backup_dir: env_path("BACKUP_DIR", "./backups"),
            state_dir: env_path("STATE_DIR", "./state"),
            backup_prefix,
            restore_batch_size,
            admin_token,
        })
    }
}

fn env_path(key: &str, default: &str) -> PathBuf {
    env::var(key)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

/// Names that end up inside SQL identifiers or file names.
fn is_plain_name(value: &str) -> bool {
    value
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URL environment variable is required")]
    MissingDatabaseUrl,

    #[error("DATABASE_URL must start with mysql://, postgres:// or sqlite:")]
    UnsupportedDatabase,

    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("RESTORE_BATCH_SIZE must be a positive integer")]
    InvalidBatchSize,

    #[error("{0} may only contain letters, digits, '_' and '-'")]
    InvalidName(&'static str),
}
