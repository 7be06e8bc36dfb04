use crate::domain::attachment::{DEFAULT_KEY_PREFIX, DEFAULT_MAX_SIZE_BYTES};
use clap::{Args, Parser, ValueEnum};
use std::time::Duration;

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[command(flatten)]
    pub database: DatabaseConfig,

    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub storage: StorageConfig,

    #[command(flatten)]
    pub upload: UploadConfig,

    #[command(flatten)]
    pub reaper: ReaperConfig,

    #[command(flatten)]
    pub health: HealthConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Debug, Args)]
pub struct DatabaseConfig {
    /// Database connection URL
    #[arg(long = "database-url", env = "ATTACHMENTS_DATABASE_URL")]
    pub url: String,

    /// Maximum number of pooled connections
    #[arg(long = "db-max-connections", env = "ATTACHMENTS_DB_MAX_CONNECTIONS", default_value_t = 10)]
    pub max_connections: u32,

    /// Minimum number of idle connections kept open
    #[arg(long = "db-min-connections", env = "ATTACHMENTS_DB_MIN_CONNECTIONS", default_value_t = 1)]
    pub min_connections: u32,

    /// Seconds to wait for a free connection
    #[arg(long = "db-acquire-timeout-secs", env = "ATTACHMENTS_DB_ACQUIRE_TIMEOUT_SECS", default_value_t = 5)]
    pub acquire_timeout_secs: u64,

    /// Seconds before an idle connection is closed
    #[arg(long = "db-idle-timeout-secs", env = "ATTACHMENTS_DB_IDLE_TIMEOUT_SECS", default_value_t = 600)]
    pub idle_timeout_secs: u64,

    /// Maximum lifetime of a connection in seconds
    #[arg(long = "db-max-lifetime-secs", env = "ATTACHMENTS_DB_MAX_LIFETIME_SECS", default_value_t = 1800)]
    pub max_lifetime_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct ServerConfig {
    /// Host to listen on
    #[arg(long, env = "ATTACHMENTS_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port for the public API
    #[arg(long, env = "ATTACHMENTS_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Port for liveness and readiness probes
    #[arg(long, env = "ATTACHMENTS_MGMT_PORT", default_value_t = 9090)]
    pub mgmt_port: u16,

    /// Seconds to wait for background tasks during shutdown
    #[arg(long, env = "ATTACHMENTS_SHUTDOWN_TIMEOUT_SECS", default_value_t = 10)]
    pub shutdown_timeout_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct StorageConfig {
    /// Bucket holding attachment objects
    #[arg(long = "storage-bucket", env = "ATTACHMENTS_STORAGE_BUCKET", default_value = "attachments")]
    pub bucket: String,

    /// S3 region
    #[arg(long = "storage-region", env = "ATTACHMENTS_STORAGE_REGION", default_value = "us-east-1")]
    pub region: String,

    /// Custom S3 endpoint (MinIO, Supabase Storage, R2)
    #[arg(long = "storage-endpoint", env = "ATTACHMENTS_STORAGE_ENDPOINT")]
    pub endpoint: Option<String>,

    /// S3 access key
    #[arg(long = "storage-access-key", env = "ATTACHMENTS_STORAGE_ACCESS_KEY")]
    pub access_key: Option<String>,

    /// S3 secret key
    #[arg(long = "storage-secret-key", env = "ATTACHMENTS_STORAGE_SECRET_KEY")]
    pub secret_key: Option<String>,

    /// Force path style (required for many MinIO setups: http://host/bucket/key)
    #[arg(long = "storage-force-path-style", env = "ATTACHMENTS_STORAGE_FORCE_PATH_STYLE", default_value_t = false)]
    pub force_path_style: bool,

    /// Base of public object URLs; objects resolve to `{base}/{bucket}/{key}`.
    /// Without it no public URL can be issued and every upload is reverted.
    #[arg(long = "storage-public-base-url", env = "ATTACHMENTS_STORAGE_PUBLIC_BASE_URL")]
    pub public_base_url: Option<String>,
}

#[derive(Clone, Debug, Args)]
pub struct UploadConfig {
    /// Max attachment size in bytes (Default: 10MiB)
    #[arg(long = "upload-max-size-bytes", env = "ATTACHMENTS_UPLOAD_MAX_SIZE_BYTES", default_value_t = DEFAULT_MAX_SIZE_BYTES)]
    pub max_size_bytes: usize,

    /// Key namespace for stored objects
    #[arg(long = "upload-key-prefix", env = "ATTACHMENTS_UPLOAD_KEY_PREFIX", default_value = DEFAULT_KEY_PREFIX)]
    pub key_prefix: String,

    /// Timeout applied to every object store and metadata store call
    #[arg(long = "upload-call-timeout-ms", env = "ATTACHMENTS_UPLOAD_CALL_TIMEOUT_MS", default_value_t = 10_000)]
    pub call_timeout_ms: u64,
}

impl UploadConfig {
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self { max_size_bytes: DEFAULT_MAX_SIZE_BYTES, key_prefix: DEFAULT_KEY_PREFIX.to_string(), call_timeout_ms: 10_000 }
    }
}

#[derive(Clone, Debug, Args)]
pub struct ReaperConfig {
    /// How often to sweep abandoned records
    #[arg(
        long = "reaper-interval-secs",
        env = "ATTACHMENTS_REAPER_INTERVAL_SECS",
        default_value_t = 300,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub interval_secs: u64,

    /// Maximum number of records handled per batch
    #[arg(
        long = "reaper-batch-size",
        env = "ATTACHMENTS_REAPER_BATCH_SIZE",
        default_value_t = 100,
        value_parser = clap::value_parser!(i64).range(1..)
    )]
    pub batch_size: i64,

    /// Age after which a pending record is considered abandoned
    #[arg(
        long = "reaper-pending-grace-secs",
        env = "ATTACHMENTS_REAPER_PENDING_GRACE_SECS",
        default_value_t = 86_400,
        value_parser = clap::value_parser!(i64).range(1..)
    )]
    pub pending_grace_secs: i64,
}

#[derive(Clone, Debug, Args)]
pub struct HealthConfig {
    /// Timeout for the database readiness check
    #[arg(long = "health-db-timeout-ms", env = "ATTACHMENTS_HEALTH_DB_TIMEOUT_MS", default_value_t = 2000)]
    pub db_timeout_ms: u64,

    /// Timeout for the storage readiness check
    #[arg(long = "health-storage-timeout-ms", env = "ATTACHMENTS_HEALTH_STORAGE_TIMEOUT_MS", default_value_t = 2000)]
    pub storage_timeout_ms: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Args)]
pub struct TelemetryConfig {
    /// OTLP collector endpoint; tracing stays local when unset
    #[arg(long = "otlp-endpoint", env = "ATTACHMENTS_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    /// Log output format
    #[arg(long = "log-format", env = "ATTACHMENTS_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}
