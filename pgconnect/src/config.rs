// Connection configuration with defaults and layered loading (file, env)

use crate::errors::DatabaseError;
use config::{ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use sqlx::ConnectOptions;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix used by [`Config::load`]
pub const ENV_PREFIX: &str = "PGCONNECT";

/// Statements slower than this are logged at `warn` for [`LogLevel::Warn`] and above
pub const SLOW_STATEMENT_THRESHOLD: Duration = Duration::from_millis(200);

const SSL_MODES: [&str; 6] = [
    "disable",
    "allow",
    "prefer",
    "require",
    "verify-ca",
    "verify-full",
];

/// Verbosity of SQL statement logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Silent,
    Error,
    Warn,
    Info,
}

impl LogLevel {
    /// Configure sqlx statement logging for this level
    ///
    /// Failed statements are not logged by the driver; repositories log them
    /// at `error` for every level except `Silent`.
    pub fn apply(self, options: PgConnectOptions) -> PgConnectOptions {
        match self {
            LogLevel::Silent | LogLevel::Error => options.disable_statement_logging(),
            LogLevel::Warn => options
                .log_statements(log::LevelFilter::Off)
                .log_slow_statements(log::LevelFilter::Warn, SLOW_STATEMENT_THRESHOLD),
            LogLevel::Info => options
                .log_statements(log::LevelFilter::Info)
                .log_slow_statements(log::LevelFilter::Warn, SLOW_STATEMENT_THRESHOLD),
        }
    }

    /// Whether failed statements should be reported
    pub fn logs_errors(self) -> bool {
        !matches!(self, LogLevel::Silent)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Silent => "silent",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
        };
        write!(f, "{}", s)
    }
}

/// Database connection parameters and pool limits
///
/// Values are passed to the driver as-is; nothing is validated on connect.
/// Call [`Config::validate`] to check them up front.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: String,
    pub user: String,
    pub password: String,
    pub database_name: String,
    pub ssl_mode: String,
    pub time_zone: String,
    pub max_idle_conns: u32,
    pub max_open_conns: u32,
    pub log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: "5432".to_string(),
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            database_name: "postgres".to_string(),
            ssl_mode: "disable".to_string(),
            time_zone: "UTC".to_string(),
            max_idle_conns: 10,
            max_open_conns: 100,
            log_level: LogLevel::Silent,
        }
    }
}

impl Config {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific directory
    ///
    /// Reads `default.toml` then `local.toml` (both optional), then
    /// `PGCONNECT__*` environment variables.
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = config::Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Not committed to git
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.host.is_empty() {
            return Err("Database host cannot be empty".to_string());
        }
        match self.port.parse::<u16>() {
            Ok(0) | Err(_) => {
                return Err(format!("Database port '{}' is not a valid port", self.port));
            }
            Ok(_) => {}
        }
        if self.user.is_empty() {
            return Err("Database user cannot be empty".to_string());
        }
        if self.database_name.is_empty() {
            return Err("Database name cannot be empty".to_string());
        }
        if !SSL_MODES.contains(&self.ssl_mode.as_str()) {
            return Err(format!("Unknown sslmode '{}'", self.ssl_mode));
        }
        if self.max_open_conns == 0 {
            return Err("max_open_conns must be greater than 0".to_string());
        }

        Ok(())
    }

    /// libpq-style connection string
    pub fn dsn(&self) -> String {
        self.render_dsn(&self.password)
    }

    /// Connection string safe to log
    pub fn redacted_dsn(&self) -> String {
        self.render_dsn("***")
    }

    fn render_dsn(&self, password: &str) -> String {
        format!(
            "host={} port={} user={} password={} dbname={} sslmode={} TimeZone={}",
            self.host,
            self.port,
            self.user,
            password,
            self.database_name,
            self.ssl_mode,
            self.time_zone
        )
    }

    /// Driver options carrying every connection field
    ///
    /// sqlx's startup packet sets `TimeZone=UTC` ahead of these options, so
    /// `Database::connect` also applies `time_zone` on each new connection.
    ///
    /// # Errors
    /// Returns `DatabaseError::ConnectionFailed` when the port or sslmode
    /// cannot be understood by the driver.
    pub fn connect_options(&self) -> Result<PgConnectOptions, DatabaseError> {
        let port = self.port.parse::<u16>().map_err(|e| {
            DatabaseError::connection(format!("invalid port '{}': {}", self.port, e))
        })?;
        let ssl_mode = self.ssl_mode.parse::<PgSslMode>().map_err(|e| {
            DatabaseError::connection_with(format!("invalid sslmode '{}'", self.ssl_mode), e)
        })?;

        let options = PgConnectOptions::new()
            .host(&self.host)
            .port(port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database_name)
            .ssl_mode(ssl_mode)
            .options([("TimeZone", self.time_zone.as_str())]);

        Ok(self.log_level.apply(options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, "5432");
        assert_eq!(config.user, "postgres");
        assert_eq!(config.password, "postgres");
        assert_eq!(config.database_name, "postgres");
        assert_eq!(config.ssl_mode, "disable");
        assert_eq!(config.time_zone, "UTC");
        assert_eq!(config.max_idle_conns, 10);
        assert_eq!(config.max_open_conns, 100);
        assert_eq!(config.log_level, LogLevel::Silent);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_dsn_key_order() {
        let config = Config::default();
        assert_eq!(
            config.dsn(),
            "host=localhost port=5432 user=postgres password=postgres dbname=postgres sslmode=disable TimeZone=UTC"
        );
    }

    #[test]
    fn test_redacted_dsn_hides_password() {
        let mut config = Config::default();
        config.password = "s3cret".to_string();
        let dsn = config.redacted_dsn();
        assert!(!dsn.contains("s3cret"));
        assert!(dsn.contains("password=***"));
    }

    #[test]
    fn test_validation_catches_bad_port() {
        let mut config = Config::default();
        config.port = "not-a-port".to_string();
        assert!(config.validate().is_err());

        config.port = "0".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_catches_unknown_sslmode() {
        let mut config = Config::default();
        config.ssl_mode = "sometimes".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_catches_zero_open_conns() {
        let mut config = Config::default();
        config.max_open_conns = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_connect_options_rejects_bad_port() {
        let mut config = Config::default();
        config.port = "54x2".to_string();
        let err = config.connect_options().unwrap_err();
        assert!(matches!(err, DatabaseError::ConnectionFailed { .. }));
    }

    #[test]
    fn test_connect_options_rejects_bad_sslmode() {
        let mut config = Config::default();
        config.ssl_mode = "sometimes".to_string();
        let err = config.connect_options().unwrap_err();
        assert!(matches!(err, DatabaseError::ConnectionFailed { .. }));
    }

    #[test]
    fn test_connect_options_carries_fields() {
        let mut config = Config::default();
        config.host = "db.internal".to_string();
        config.port = "6543".to_string();
        config.database_name = "orders".to_string();
        config.time_zone = "Asia/Tokyo".to_string();
        let options = config.connect_options().unwrap();
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 6543);
        assert_eq!(options.get_database(), Some("orders"));
        assert!(options
            .get_options()
            .is_some_and(|o| o.contains("TimeZone=Asia/Tokyo")));
    }

    #[test]
    fn test_load_from_path_reads_file_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.toml"),
            "host = \"db.example\"\nmax_open_conns = 20\nlog_level = \"info\"\n",
        )
        .unwrap();

        let config = Config::load_from_path(dir.path()).unwrap();
        assert_eq!(config.host, "db.example");
        assert_eq!(config.max_open_conns, 20);
        assert_eq!(config.log_level, LogLevel::Info);
        // Untouched keys keep their defaults
        assert_eq!(config.port, "5432");
        assert_eq!(config.max_idle_conns, 10);
    }

    #[test]
    fn test_load_from_missing_dir_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_path(dir.path().join("absent")).unwrap();
        assert_eq!(config.database_name, "postgres");
    }
}
