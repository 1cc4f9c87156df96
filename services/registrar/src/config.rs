//! Registrar configuration.
//!
//! Flags come from the command line; database credentials come from a MySQL
//! option file (`[client]` section, INI syntax) in the tool's home directory.

use std::path::{Path, PathBuf};

use clap::Parser;
use config::{ConfigError, File, FileFormat};
use sqlx::mysql::MySqlConnectOptions;

use crate::error::RegistrarError;
use crate::logging::LogFormat;

/// Default directory host when neither the flag nor the option file names one.
pub const DEFAULT_DB_HOST: &str = "tools-db";

/// Default MySQL port.
pub const DEFAULT_DB_PORT: u16 = 3306;

/// Option file name under `$HOME`.
pub const OPTION_FILE_NAME: &str = "replica.my.cnf";

/// Publish this pod's address for each task name, then stay up.
#[derive(Debug, Clone, Parser)]
#[command(name = "toolpod-registrar")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Task name to register (repeatable).
    #[arg(long = "task-name", value_name = "NAME", required = true)]
    pub task_names: Vec<String>,

    /// MySQL option file with the `[client]` credentials.
    #[arg(long, env = "TOOLPOD_OPTION_FILE", value_name = "PATH")]
    pub option_file: Option<PathBuf>,

    /// Directory database host. Falls back to the option file, then tools-db.
    #[arg(long, env = "TOOLPOD_DB_HOST")]
    pub db_host: Option<String>,

    /// Directory database name.
    #[arg(long, env = "TOOLPOD_DATABASE", default_value = "s52585__cb")]
    pub database: String,

    /// Directory table.
    #[arg(long, default_value = "cluster_node")]
    pub table: String,

    /// Write the registration time as a third column.
    #[arg(long)]
    pub record_timestamp: bool,

    /// Log format (text or json).
    #[arg(long, env = "TOOLPOD_LOG_FORMAT", default_value = "text")]
    pub log_format: LogFormat,
}

/// Resolved registrar settings, captured once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrarConfig {
    pub task_names: Vec<String>,
    pub option_file: PathBuf,
    pub db_host: Option<String>,
    pub database: String,
    pub table: String,
    pub record_timestamp: bool,
}

impl RegistrarConfig {
    /// Build from parsed flags. `home` locates the default option file.
    pub fn from_args(args: &Args, home: Option<&Path>) -> Result<Self, RegistrarError> {
        if args.task_names.is_empty() {
            return Err(RegistrarError::NoTaskNames);
        }

        let option_file = match (&args.option_file, home) {
            (Some(path), _) => path.clone(),
            (None, Some(home)) => home.join(OPTION_FILE_NAME),
            (None, None) => PathBuf::from(OPTION_FILE_NAME),
        };

        Ok(Self {
            task_names: args.task_names.clone(),
            option_file,
            db_host: args.db_host.clone(),
            database: args.database.clone(),
            table: args.table.clone(),
            record_timestamp: args.record_timestamp,
        })
    }

    /// Connection options for the directory database.
    pub fn connect_options(&self, client: &ClientOptions) -> MySqlConnectOptions {
        let host = self
            .db_host
            .as_deref()
            .or(client.host.as_deref())
            .unwrap_or(DEFAULT_DB_HOST);

        MySqlConnectOptions::new()
            .host(host)
            .port(client.port.unwrap_or(DEFAULT_DB_PORT))
            .username(&client.user)
            .password(&client.password)
            .database(&self.database)
    }
}

/// `[client]` section of a MySQL option file.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientOptions {
    pub user: String,
    pub password: String,
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl std::fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientOptions")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

impl ClientOptions {
    /// Read the `[client]` section of the option file at `path`.
    pub fn load(path: &Path) -> Result<Self, RegistrarError> {
        let option_error = |source| RegistrarError::OptionFile {
            path: path.to_path_buf(),
            source,
        };

        let settings = config::Config::builder()
            .add_source(File::new(&path.to_string_lossy(), FileFormat::Ini))
            .build()
            .map_err(option_error)?;

        let required = |key: &'static str| match settings.get_string(&format!("client.{key}")) {
            Ok(value) => Ok(unquote(&value).to_string()),
            Err(ConfigError::NotFound(_)) => Err(RegistrarError::CredentialMissing {
                path: path.to_path_buf(),
                key,
            }),
            Err(e) => Err(option_error(e)),
        };
        let user = required("user")?;
        let password = required("password")?;

        let host = match settings.get_string("client.host") {
            Ok(value) => Some(unquote(&value).to_string()),
            Err(ConfigError::NotFound(_)) => None,
            Err(e) => return Err(option_error(e)),
        };
        let port = match settings.get::<u16>("client.port") {
            Ok(port) => Some(port),
            Err(ConfigError::NotFound(_)) => None,
            Err(e) => return Err(option_error(e)),
        };

        Ok(Self {
            user,
            password,
            host,
            port,
        })
    }
}

/// Strip one pair of matching quotes, as the MySQL client does.
fn unquote(value: &str) -> &str {
    let value = value.trim();
    for quote in ['\'', '"'] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
