//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    num::{NonZeroU32, NonZeroU64, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
};

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use uuid::Uuid;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "orderloom";
const ENV_PREFIX: &str = "ORDERLOOM";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 4;
const DEFAULT_CACHE_OPERATION_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_NAV_FLUSH_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_NAV_HISTORY_LIMIT: usize = 10;
const DEFAULT_AUDIT_COLLECTION: &str = "audit_logs";

/// Command-line arguments for the orderloom binary.
#[derive(Debug, Parser)]
#[command(
    name = "orderloom",
    version,
    about = "Write-path coordination tooling: cache invalidation rules and the order audit trail"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "ORDERLOOM_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath,
        global = true
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL", global = true)]
    pub database_url: Option<String>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Print the cache keys a domain event invalidates.
    Resolve(ResolveArgs),
    /// Append to or read the order audit trail.
    Audit(AuditArgs),
    /// Apply pending database migrations.
    Migrate,
}

#[derive(Debug, Args, Clone)]
pub struct ResolveArgs {
    /// Domain event name, e.g. `onOrderChange`.
    #[arg(value_name = "EVENT")]
    pub event: String,
}

#[derive(Debug, Args, Clone)]
pub struct AuditArgs {
    #[command(subcommand)]
    pub command: AuditCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum AuditCommand {
    /// Append one audit entry.
    Append(AuditAppendArgs),
    /// List the entries of one order, oldest first.
    List(AuditListArgs),
}

#[derive(Debug, Args, Clone)]
pub struct AuditAppendArgs {
    #[arg(long = "order-id", value_name = "UUID")]
    pub order_id: Uuid,

    /// Action name from the audit taxonomy, e.g. `STATUS_CHANGED`.
    #[arg(long, value_name = "ACTION")]
    pub action: String,

    #[arg(long = "entity-type", value_name = "TYPE")]
    pub entity_type: String,

    #[arg(long = "user-id", value_name = "UUID")]
    pub user_id: Option<Uuid>,

    #[arg(long = "entity-id", value_name = "UUID")]
    pub entity_id: Option<Uuid>,

    /// Name of the changed field.
    #[arg(long, value_name = "FIELD")]
    pub field: Option<String>,

    /// Previous value as JSON.
    #[arg(long, value_name = "JSON", value_parser = parse_json)]
    pub old: Option<Value>,

    /// New value as JSON.
    #[arg(long, value_name = "JSON", value_parser = parse_json)]
    pub new: Option<Value>,

    #[arg(long, value_name = "TEXT")]
    pub summary: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct AuditListArgs {
    #[arg(long = "order-id", value_name = "UUID")]
    pub order_id: Uuid,
}

fn parse_json(raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|err| format!("invalid JSON: {err}"))
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub navigation: NavigationSettings,
    pub audit: AuditSettings,
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
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    /// Bound on backend loads; zero disables it.
    pub operation_timeout_ms: u64,
    pub coalesce_refetch: bool,
}

#[derive(Debug, Clone)]
pub struct NavigationSettings {
    pub flush_timeout_ms: NonZeroU64,
    pub history_limit: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct AuditSettings {
    pub enabled: bool,
    pub collection: String,
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

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Parse the process arguments and resolve settings, returning both.
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
    navigation: RawNavigationSettings,
    audit: RawAuditSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
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
            navigation,
            audit,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache),
            navigation: build_navigation_settings(navigation)?,
            audit: build_audit_settings(audit)?,
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
    let max_connections = NonZeroU32::new(max_connections).ok_or_else(|| {
        LoadError::invalid("database.max_connections", "must be greater than zero")
    })?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> CacheSettings {
    CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        operation_timeout_ms: cache
            .operation_timeout_ms
            .unwrap_or(DEFAULT_CACHE_OPERATION_TIMEOUT_MS),
        coalesce_refetch: cache.coalesce_refetch.unwrap_or(true),
    }
}

fn build_navigation_settings(
    navigation: RawNavigationSettings,
) -> Result<NavigationSettings, LoadError> {
    let flush_timeout_ms = navigation
        .flush_timeout_ms
        .unwrap_or(DEFAULT_NAV_FLUSH_TIMEOUT_MS);
    let flush_timeout_ms = NonZeroU64::new(flush_timeout_ms).ok_or_else(|| {
        LoadError::invalid("navigation.flush_timeout_ms", "must be greater than zero")
    })?;

    let history_limit = navigation
        .history_limit
        .unwrap_or(DEFAULT_NAV_HISTORY_LIMIT);
    let history_limit = NonZeroUsize::new(history_limit).ok_or_else(|| {
        LoadError::invalid("navigation.history_limit", "must be greater than zero")
    })?;

    Ok(NavigationSettings {
        flush_timeout_ms,
        history_limit,
    })
}

fn build_audit_settings(audit: RawAuditSettings) -> Result<AuditSettings, LoadError> {
    let collection = audit
        .collection
        .unwrap_or_else(|| DEFAULT_AUDIT_COLLECTION.to_string());
    let collection = collection.trim();
    if collection.is_empty() {
        return Err(LoadError::invalid(
            "audit.collection",
            "collection name must not be empty",
        ));
    }

    Ok(AuditSettings {
        enabled: audit.enabled.unwrap_or(true),
        collection: collection.to_string(),
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
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    operation_timeout_ms: Option<u64>,
    coalesce_refetch: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawNavigationSettings {
    flush_timeout_ms: Option<u64>,
    history_limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAuditSettings {
    enabled: Option<bool>,
    collection: Option<String>,
}
