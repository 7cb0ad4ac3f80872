use clap::{Parser, Subcommand, ValueEnum};
use hexlink_shortener::config::{DEFAULT_CODE_LENGTH, DEFAULT_MAX_ATTEMPTS};
use hexlink_shortener::ShortenerConfig;
use hexlink_storage::SnapshotPolicy;
use hexlink_telemetry::LogFormat;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

pub const BASE_URL_ENV: &str = "BASE_URL";
pub const FILE_STORAGE_PATH_ENV: &str = "FILE_STORAGE_PATH";
pub const DATABASE_DSN_ENV: &str = "DATABASE_DSN";
pub const CODE_LENGTH_ENV: &str = "CODE_LENGTH";
pub const MAX_ATTEMPTS_ENV: &str = "MAX_ATTEMPTS";
pub const SNAPSHOT_POLICY_ENV: &str = "SNAPSHOT_POLICY";
pub const SNAPSHOT_INTERVAL_ENV: &str = "SNAPSHOT_INTERVAL_SECS";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_SNAPSHOT_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SnapshotPolicyArg {
    #[value(name = "write-through")]
    WriteThrough,
    #[value(name = "interval")]
    Interval,
    #[value(name = "on-shutdown")]
    OnShutdown,
}

impl Display for SnapshotPolicyArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotPolicyArg::WriteThrough => write!(f, "write-through"),
            SnapshotPolicyArg::Interval => write!(f, "interval"),
            SnapshotPolicyArg::OnShutdown => write!(f, "on-shutdown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

/// Which record store backs this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreKind {
    Memory,
    File(PathBuf),
    MySql(String),
}

impl Display for StoreKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKind::Memory => write!(f, "in-memory"),
            StoreKind::File(path) => write!(f, "file({})", path.display()),
            StoreKind::MySql(_) => write!(f, "mysql"),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "hexlink", version, about = "Shorten URLs and resolve short codes")]
pub struct CLI {
    #[arg(long, env = BASE_URL_ENV, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Snapshot file for the file-backed store.
    #[arg(long, env = FILE_STORAGE_PATH_ENV)]
    pub file_storage_path: Option<PathBuf>,

    /// MySQL DSN. Takes precedence over the snapshot file.
    #[arg(long, env = DATABASE_DSN_ENV)]
    pub database_dsn: Option<String>,

    /// Random bytes per short code.
    #[arg(long, env = CODE_LENGTH_ENV, default_value_t = DEFAULT_CODE_LENGTH)]
    pub code_length: usize,

    #[arg(long, env = MAX_ATTEMPTS_ENV, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,

    #[arg(
        long,
        env = SNAPSHOT_POLICY_ENV,
        value_enum,
        default_value_t = SnapshotPolicyArg::OnShutdown
    )]
    pub snapshot_policy: SnapshotPolicyArg,

    #[arg(long, env = SNAPSHOT_INTERVAL_ENV, default_value_t = DEFAULT_SNAPSHOT_INTERVAL_SECS)]
    pub snapshot_interval_secs: u64,

    #[arg(long, env = LOG_FORMAT_ENV, value_enum, default_value_t = LogFormatArg::Text)]
    pub log_format: LogFormatArg,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Print the short URL for a URL, creating it if needed.
    Shorten {
        url: String,
        #[arg(long, default_value = "")]
        correlation_id: String,
        #[arg(long)]
        user_id: Option<i64>,
    },
    /// Shorten several URLs at once.
    ///
    /// Without URL arguments, reads a JSON array of
    /// `{"correlation_id": "...", "original_url": "..."}` from stdin.
    ShortenBatch {
        urls: Vec<String>,
        #[arg(long)]
        user_id: Option<i64>,
    },
    /// Print the original URL behind a short code.
    Resolve { code: String },
    /// Soft-delete a short code.
    Delete {
        code: String,
        /// Only delete if the record belongs to this user.
        #[arg(long)]
        user_id: Option<i64>,
    },
    /// List the active short URLs owned by a user.
    List {
        #[arg(long)]
        user_id: i64,
    },
}

impl CLI {
    pub fn store_kind(&self) -> StoreKind {
        if let Some(dsn) = self.database_dsn.as_ref().filter(|dsn| !dsn.is_empty()) {
            return StoreKind::MySql(dsn.clone());
        }
        match &self.file_storage_path {
            Some(path) if !path.as_os_str().is_empty() => StoreKind::File(path.clone()),
            _ => StoreKind::Memory,
        }
    }

    pub fn snapshot_policy(&self) -> SnapshotPolicy {
        match self.snapshot_policy {
            SnapshotPolicyArg::WriteThrough => SnapshotPolicy::WriteThrough,
            SnapshotPolicyArg::Interval => {
                SnapshotPolicy::Interval(Duration::from_secs(self.snapshot_interval_secs.max(1)))
            }
            SnapshotPolicyArg::OnShutdown => SnapshotPolicy::OnShutdown,
        }
    }

    pub fn shortener_config(&self) -> ShortenerConfig {
        ShortenerConfig::builder()
            .base_url(self.base_url.clone())
            .code_length(self.code_length)
            .max_attempts(self.max_attempts)
            .build()
    }
}

/// The CLI definition with every environment fallback removed, so parsing
/// depends on the arguments alone.
#[cfg(test)]
pub(crate) fn command_without_env() -> clap::Command {
    use clap::CommandFactory;
    CLI::command().mut_args(|arg| arg.env(None::<&str>))
}

#[cfg(test)]
pub(crate) fn parse_without_env(args: &[&str]) -> Result<CLI, clap::Error> {
    use clap::FromArgMatches;
    let matches = command_without_env()
        .try_get_matches_from(std::iter::once("hexlink").chain(args.iter().copied()))?;
    CLI::from_arg_matches(&matches)
}
