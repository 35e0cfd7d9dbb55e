//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand, ValueEnum, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::application::display::{BoardVersion, format_user_date};
use crate::cache::{CacheBackend, DEFAULT_TABLE_PREFIX};
use crate::events::EventName;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "userstats";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_CACHE_QUERY_LIMIT: usize = 1000;
const DEFAULT_CACHE_DIRECTORY: &str = "./cache/userstats";
const DEFAULT_BOARD_ROOT_PATH: &str = "./";
const DEFAULT_PHP_EXT: &str = "php";
const DEFAULT_DATE_FORMAT: &str = "%a %b %d, %Y %-I:%M %P";
const DEFAULT_BOARD_VERSION: &str = "3.2.0";

/// Command-line arguments for the userstats binary.
#[derive(Debug, Parser)]
#[command(name = "userstats", version, about = "Board user statistics")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "USERSTATS_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Print the statistics block for one member as JSON.
    Show(ShowArgs),
    /// Fire a mutation event and evict cached topic counts.
    Invalidate(InvalidateArgs),
    /// Apply the embedded database migrations.
    Migrate(MigrateArgs),
}

#[derive(Debug, Args, Clone)]
pub struct ShowArgs {
    #[command(flatten)]
    pub overrides: RuntimeOverrides,

    /// Member whose statistics are rendered.
    #[arg(long = "user-id", value_name = "ID")]
    pub user_id: i64,
}

#[derive(Debug, Args, Clone)]
pub struct InvalidateArgs {
    #[command(flatten)]
    pub overrides: RuntimeOverrides,

    #[arg(value_enum, value_name = "EVENT")]
    pub event: MutationEvent,
}

#[derive(Debug, Args, Default, Clone)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,
}

/// Board events that can be fired from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MutationEvent {
    SubmitPost,
    DeleteTopics,
}

impl From<MutationEvent> for EventName {
    fn from(value: MutationEvent) -> Self {
        match value {
            MutationEvent::SubmitPost => EventName::SubmitPostEnd,
            MutationEvent::DeleteTopics => EventName::DeleteTopicsAfterQuery,
        }
    }
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RuntimeOverrides {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the board table prefix.
    #[arg(long = "table-prefix", value_name = "PREFIX")]
    pub table_prefix: Option<String>,

    /// Override the query cache backend (memory|file).
    #[arg(long = "cache-backend", value_name = "BACKEND")]
    pub cache_backend: Option<CacheBackend>,

    /// Override the file cache directory.
    #[arg(long = "cache-directory", value_name = "PATH")]
    pub cache_directory: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub board: BoardSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
    pub table_prefix: String,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub backend: CacheBackend,
    pub directory: PathBuf,
    pub query_limit: NonZeroUsize,
    pub ttl: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct BoardSettings {
    pub root_path: String,
    pub php_ext: String,
    pub default_timezone: Tz,
    pub default_date_format: String,
    pub version: BoardVersion,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("USERSTATS").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match &cli.command {
        Command::Show(args) => raw.apply_runtime_overrides(&args.overrides),
        Command::Invalidate(args) => raw.apply_runtime_overrides(&args.overrides),
        Command::Migrate(args) => raw.apply_database_override(&args.database),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    board: RawBoardSettings,
}

impl RawSettings {
    fn apply_runtime_overrides(&mut self, overrides: &RuntimeOverrides) {
        self.apply_database_override(&overrides.database);

        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(prefix) = overrides.table_prefix.as_ref() {
            self.database.table_prefix = Some(prefix.clone());
        }
        if let Some(backend) = overrides.cache_backend {
            self.cache.backend = Some(backend);
        }
        if let Some(directory) = overrides.cache_directory.as_ref() {
            self.cache.directory = Some(directory.clone());
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            cache,
            board,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            board: build_board_settings(board)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_connections = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);
    let max_connections = NonZeroU32::new(max_connections)
        .ok_or_else(|| LoadError::invalid("database.max_connections", "must be greater than zero"))?;

    // The prefix is spliced into query text, so only identifier characters are allowed.
    let table_prefix = database
        .table_prefix
        .unwrap_or_else(|| DEFAULT_TABLE_PREFIX.to_string());
    if !table_prefix
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
    {
        return Err(LoadError::invalid(
            "database.table_prefix",
            "only ASCII letters, digits and underscores are allowed",
        ));
    }

    Ok(DatabaseSettings {
        url,
        max_connections,
        table_prefix,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    // Separate CLI invocations only share entries through the file backend.
    let backend = cache.backend.unwrap_or(CacheBackend::File);

    let directory = cache
        .directory
        .filter(|directory| !directory.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIRECTORY));

    let query_limit = NonZeroUsize::new(cache.query_limit.unwrap_or(DEFAULT_CACHE_QUERY_LIMIT))
        .ok_or_else(|| LoadError::invalid("cache.query_limit", "must be greater than zero"))?;

    let ttl = match cache.ttl_seconds {
        Some(0) => {
            return Err(LoadError::invalid(
                "cache.ttl_seconds",
                "must be greater than zero",
            ));
        }
        Some(seconds) => Some(Duration::from_secs(seconds)),
        None => None,
    };

    Ok(CacheSettings {
        backend,
        directory,
        query_limit,
        ttl,
    })
}

fn build_board_settings(board: RawBoardSettings) -> Result<BoardSettings, LoadError> {
    let root_path = board
        .root_path
        .unwrap_or_else(|| DEFAULT_BOARD_ROOT_PATH.to_string());
    let php_ext = board.php_ext.unwrap_or_else(|| DEFAULT_PHP_EXT.to_string());
    if php_ext.is_empty() {
        return Err(LoadError::invalid("board.php_ext", "must not be empty"));
    }

    let default_timezone = match board.default_timezone {
        Some(name) => name.parse::<Tz>().map_err(|err| {
            LoadError::invalid("board.default_timezone", format!("failed to parse: {err}"))
        })?,
        None => Tz::UTC,
    };

    let default_date_format = board
        .default_date_format
        .unwrap_or_else(|| DEFAULT_DATE_FORMAT.to_string());
    format_user_date(0, Tz::UTC, &default_date_format)
        .map_err(|err| LoadError::invalid("board.default_date_format", err.to_string()))?;

    let version = board
        .version
        .as_deref()
        .unwrap_or(DEFAULT_BOARD_VERSION)
        .parse::<BoardVersion>()
        .map_err(|err| LoadError::invalid("board.version", err.to_string()))?;

    Ok(BoardSettings {
        root_path,
        php_ext,
        default_timezone,
        default_date_format,
        version,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
    table_prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    backend: Option<CacheBackend>,
    directory: Option<PathBuf>,
    query_limit: Option<usize>,
    ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBoardSettings {
    root_path: Option<String>,
    php_ext: Option<String>,
    default_timezone: Option<String>,
    default_date_format: Option<String>,
    version: Option<String>,
}
